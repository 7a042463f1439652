//! Migrations for both supported engines and the logical schema they must
//! both produce.
//!
//! The DDL lives under `migrations/postgres` and `migrations/sqlite` and is
//! embedded at compile time. Type spelling differs per engine:
//! - keys: `BIGSERIAL` vs `INTEGER PRIMARY KEY AUTOINCREMENT`
//! - `is_private`: `BOOLEAN` vs `BOOLEAN` stored as INTEGER 0/1
//! - `lists`/`items` timestamps: `TIMESTAMP` vs INTEGER unix seconds
//! - `users`/`user_sessions` timestamps: `TIMESTAMP` vs RFC3339 text

use sqlx::migrate::Migrator;
use std::fmt;
use url::Url;

use crate::db::introspect::{ColumnShape, SchemaShape, TableShape};
use crate::error::DataError;

pub static POSTGRES_MIGRATOR: Migrator = sqlx::migrate!("./migrations/postgres");
pub static SQLITE_MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Postgres,
    Sqlite,
}

impl Engine {
    /// Pick the engine from the scheme of a database url.
    pub fn from_url(database_url: &str) -> Result<Self, DataError> {
        let url = Url::parse(database_url)?;
        match url.scheme() {
            "postgres" | "postgresql" => Ok(Engine::Postgres),
            "sqlite" => Ok(Engine::Sqlite),
            other => Err(DataError::UnsupportedDatabase(other.to_string())),
        }
    }

    pub fn migrator(self) -> &'static Migrator {
        match self {
            Engine::Postgres => &POSTGRES_MIGRATOR,
            Engine::Sqlite => &SQLITE_MIGRATOR,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Postgres => f.write_str("postgres"),
            Engine::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// The engine-independent shape every fully migrated database must have.
///
/// Lists and items carry no owner; nothing links them to `users`.
pub fn logical_schema() -> SchemaShape {
    let key = ColumnShape::key;
    let required = ColumnShape::required;
    let optional = ColumnShape::optional;

    SchemaShape::default()
        .table(
            "lists",
            TableShape::default()
                .column("id", key())
                .column("key", required())
                .column("is_private", required())
                .column("title", required())
                .column("description", required())
                .column("created_at", required())
                .column("updated_at", required()),
        )
        .table(
            "items",
            TableShape::default()
                .column("id", key())
                .column("list_id", required())
                .column("title", required())
                .column("description", optional())
                .column("price", optional())
                .column("created_at", required())
                .column("updated_at", required())
                .references("list_id", "lists", "id"),
        )
        .table(
            "users",
            TableShape::default()
                .column("id", key())
                .column("username", required())
                .column("email", required())
                .column("password_hash", required())
                .column("created_at", required())
                .column("updated_at", required())
                .unique("username"),
        )
        .table(
            "user_sessions",
            TableShape::default()
                .column("id", key())
                .column("user_id", required())
                .column("token", required())
                .column("created_at", required())
                .column("updated_at", required())
                .unique("token")
                .references("user_id", "users", "id"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_follows_url_scheme() {
        assert_eq!(Engine::from_url("sqlite::memory:").unwrap(), Engine::Sqlite);
        assert_eq!(
            Engine::from_url("sqlite:data/wishlists.sqlite").unwrap(),
            Engine::Sqlite
        );
        assert_eq!(
            Engine::from_url("postgres://app@localhost/wishlists").unwrap(),
            Engine::Postgres
        );
        assert_eq!(
            Engine::from_url("postgresql://localhost/wishlists").unwrap(),
            Engine::Postgres
        );
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let err = Engine::from_url("mysql://localhost/wishlists").unwrap_err();
        assert!(matches!(err, DataError::UnsupportedDatabase(s) if s == "mysql"));
        assert!(Engine::from_url("not a url").is_err());
    }

    #[test]
    fn both_engines_ship_the_same_number_of_migrations() {
        assert_eq!(
            POSTGRES_MIGRATOR.iter().count(),
            SQLITE_MIGRATOR.iter().count()
        );
    }

    #[test]
    fn logical_schema_has_no_owner_link() {
        let schema = logical_schema();
        assert_eq!(schema.tables.len(), 4);
        assert!(
            schema.tables["lists"].foreign_keys.is_empty(),
            "lists must not reference users"
        );
        assert!(!schema.tables["lists"].columns.contains_key("user_id"));
    }
}
