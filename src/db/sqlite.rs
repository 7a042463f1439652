use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};
use validator::Validate;

use crate::db::introspect::{self, SchemaShape};
use crate::db::models::{
    Item, ItemChanges, List, ListChanges, NewItem, NewList, NewUser, User, UserChanges,
    UserSession,
};
use crate::db::schema::{Engine, SQLITE_MIGRATOR};
use crate::db::store::WishlistStore;
use crate::error::DataError;
use crate::util;

pub type SqlitePool = Pool<Sqlite>;

/// SQLite flavour of the store. `lists`/`items` keep timestamps as unix
/// seconds, `users`/`user_sessions` as RFC3339 text.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn connect(database_url: &str) -> Result<Self, DataError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database lives and dies with its one connection.
        let pool = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        }
        .connect_with(connect_opts)
        .await?;

        Ok(Self::new(pool))
    }

    /// Make sure the database file and its directory exist before connecting.
    pub fn prepare_file(database_url: &str) -> Result<(), DataError> {
        if let Some(path) = file_path(database_url)
            && util::ensure_file_exists(&path)?
        {
            info!(path = %path.display(), "created sqlite database file");
        }
        Ok(())
    }

    fn row_to_list(row: SqliteRow) -> Result<List, DataError> {
        Ok(List {
            id: row.try_get("id")?,
            key: row.try_get("key")?,
            is_private: row.try_get("is_private")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            created_at: from_unix(row.try_get("created_at")?)?,
            updated_at: from_unix(row.try_get("updated_at")?)?,
        })
    }

    fn row_to_item(row: SqliteRow) -> Result<Item, DataError> {
        Ok(Item {
            id: row.try_get("id")?,
            list_id: row.try_get("list_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price: row.try_get("price")?,
            created_at: from_unix(row.try_get("created_at")?)?,
            updated_at: from_unix(row.try_get("updated_at")?)?,
        })
    }

    fn row_to_user(row: SqliteRow) -> Result<User, DataError> {
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            created_at: from_text(&created_at)?,
            updated_at: from_text(&updated_at)?,
        })
    }

    fn row_to_session(row: SqliteRow) -> Result<UserSession, DataError> {
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(UserSession {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            token: row.try_get("token")?,
            created_at: from_text(&created_at)?,
            updated_at: from_text(&updated_at)?,
        })
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn file_path(database_url: &str) -> Option<PathBuf> {
    if is_in_memory(database_url) {
        return None;
    }
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split_once('?').map_or(rest, |(p, _)| p);
    (!path.is_empty()).then(|| PathBuf::from(path))
}

fn from_unix(secs: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| sqlx::Error::Decode(format!("timestamp out of range: {secs}").into()))
}

// Fixed width with a `Z` suffix so stored values sort lexicographically.
fn to_text(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_text(s: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

impl WishlistStore for SqliteStore {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    async fn migrate(&self) -> Result<(), DataError> {
        SQLITE_MIGRATOR.run(&self.pool).await?;
        debug!(engine = "sqlite", "migrations up to date");
        Ok(())
    }

    async fn introspect(&self) -> Result<SchemaShape, DataError> {
        introspect::introspect_sqlite(&self.pool).await
    }

    // ----- Lists -----

    async fn create_list(&self, list: &NewList) -> Result<List, DataError> {
        list.validate()?;
        let key = util::random_key();
        let now = Utc::now().timestamp();

        let row = match list.is_private {
            Some(is_private) => {
                sqlx::query(
                    r#"
                    INSERT INTO lists (key, is_private, title, description, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    RETURNING id, key, is_private, title, description, created_at, updated_at
                    "#,
                )
                .bind(&key)
                .bind(is_private)
                .bind(&list.title)
                .bind(&list.description)
                .bind(now)
                .bind(now)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO lists (key, title, description, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    RETURNING id, key, is_private, title, description, created_at, updated_at
                    "#,
                )
                .bind(&key)
                .bind(&list.title)
                .bind(&list.description)
                .bind(now)
                .bind(now)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Self::row_to_list(row)
    }

    async fn find_list(&self, id: i64) -> Result<Option<List>, DataError> {
        sqlx::query(
            r#"SELECT id, key, is_private, title, description, created_at, updated_at
               FROM lists WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_list)
        .transpose()
    }

    async fn find_list_by_key(&self, key: &str) -> Result<Option<List>, DataError> {
        sqlx::query(
            r#"SELECT id, key, is_private, title, description, created_at, updated_at
               FROM lists WHERE key = ?"#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_list)
        .transpose()
    }

    async fn all_public_lists(&self) -> Result<Vec<List>, DataError> {
        let rows = sqlx::query(
            r#"SELECT id, key, is_private, title, description, created_at, updated_at
               FROM lists WHERE NOT is_private ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_list).collect()
    }

    async fn update_list(
        &self,
        id: i64,
        changes: &ListChanges,
    ) -> Result<Option<List>, DataError> {
        changes.validate()?;
        sqlx::query(
            r#"
            UPDATE lists SET
                is_private = ?,
                title = ?,
                description = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING id, key, is_private, title, description, created_at, updated_at
            "#,
        )
        .bind(changes.is_private)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(Utc::now().timestamp())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_list)
        .transpose()
    }

    async fn delete_list(&self, id: i64) -> Result<bool, DataError> {
        let res = sqlx::query("DELETE FROM lists WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count_lists(&self) -> Result<i64, DataError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM lists")
            .fetch_one(&self.pool)
            .await?)
    }

    // ----- Items -----

    async fn create_item(&self, item: &NewItem) -> Result<Item, DataError> {
        item.validate()?;
        let now = Utc::now().timestamp();
        let row = sqlx::query(
            r#"
            INSERT INTO items (list_id, title, description, price, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, list_id, title, description, price, created_at, updated_at
            "#,
        )
        .bind(item.list_id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.price)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_item(row)
    }

    async fn find_item(&self, id: i64) -> Result<Option<Item>, DataError> {
        sqlx::query(
            r#"SELECT id, list_id, title, description, price, created_at, updated_at
               FROM items WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_item)
        .transpose()
    }

    async fn items_by_list(&self, list_id: i64) -> Result<Vec<Item>, DataError> {
        let rows = sqlx::query(
            r#"SELECT id, list_id, title, description, price, created_at, updated_at
               FROM items WHERE list_id = ? ORDER BY id"#,
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn update_item(
        &self,
        id: i64,
        changes: &ItemChanges,
    ) -> Result<Option<Item>, DataError> {
        changes.validate()?;
        sqlx::query(
            r#"
            UPDATE items SET
                list_id = ?,
                title = ?,
                description = ?,
                price = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING id, list_id, title, description, price, created_at, updated_at
            "#,
        )
        .bind(changes.list_id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(&changes.price)
        .bind(Utc::now().timestamp())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_item)
        .transpose()
    }

    async fn delete_item(&self, id: i64) -> Result<bool, DataError> {
        let res = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count_items(&self) -> Result<i64, DataError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await?)
    }

    // ----- Users -----

    async fn create_user(&self, user: &NewUser) -> Result<User, DataError> {
        user.validate()?;
        let now = to_text(Utc::now());
        let row = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, username, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_user(row)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, DataError> {
        sqlx::query(
            r#"SELECT id, username, email, password_hash, created_at, updated_at
               FROM users WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_user)
        .transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DataError> {
        sqlx::query(
            r#"SELECT id, username, email, password_hash, created_at, updated_at
               FROM users WHERE username = ?"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_user)
        .transpose()
    }

    async fn all_users(&self) -> Result<Vec<User>, DataError> {
        let rows = sqlx::query(
            r#"SELECT id, username, email, '' AS password_hash, created_at, updated_at
               FROM users ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_user).collect()
    }

    async fn update_user(
        &self,
        id: i64,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, DataError> {
        UserChanges {
            username: username.to_string(),
            email: email.to_string(),
        }
        .validate()?;
        sqlx::query(
            r#"
            UPDATE users SET
                username = ?,
                email = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING id, username, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(to_text(Utc::now()))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_user)
        .transpose()
    }

    async fn delete_user(&self, id: i64) -> Result<bool, DataError> {
        let res = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count_users(&self) -> Result<i64, DataError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?)
    }

    // ----- Sessions -----

    async fn create_session(&self, user_id: i64, token: &str) -> Result<UserSession, DataError> {
        let now = to_text(Utc::now());
        let row = sqlx::query(
            r#"
            INSERT INTO user_sessions (user_id, token, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, user_id, token, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_session(row)
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<UserSession>, DataError> {
        sqlx::query(
            r#"SELECT id, user_id, token, created_at, updated_at
               FROM user_sessions WHERE token = ?"#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_session)
        .transpose()
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<bool, DataError> {
        let res = sqlx::query("DELETE FROM user_sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn purge_sessions_older_than(&self, max_age: ChronoDuration) -> Result<u64, DataError> {
        // A cutoff before the representable range means nothing is old enough.
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return Ok(0);
        };
        let res = sqlx::query("DELETE FROM user_sessions WHERE created_at < ?")
            .bind(to_text(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}
