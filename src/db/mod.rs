//! Database module: schema, models and storage for both engines.
//!
//! Layout:
//! - `schema.rs`: embedded migrations per engine and the logical schema
//! - `models.rs`: Rust structs mirroring DB rows, plus validated inputs
//! - `store.rs`: the `WishlistStore` operations and the `Database` switch
//! - `sqlite.rs` / `postgres.rs`: one store implementation per engine
//! - `introspect.rs`: reading the live schema back for comparison

pub mod introspect;
pub mod models;
pub mod postgres;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use introspect::{SchemaDifference, SchemaShape};
pub use models::{
    Item, ItemChanges, List, ListChanges, NewItem, NewList, NewUser, User, UserSession,
};
pub use postgres::{PgPool, PostgresStore};
pub use schema::{Engine, logical_schema};
pub use sqlite::{SqlitePool, SqliteStore};
pub use store::{Database, WishlistStore};
