use backon::{ExponentialBuilder, Retryable};
use chrono::Duration as ChronoDuration;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::introspect::SchemaShape;
use crate::db::models::{
    Item, ItemChanges, List, ListChanges, NewItem, NewList, NewUser, User, UserSession,
};
use crate::db::postgres::PostgresStore;
use crate::db::schema::Engine;
use crate::db::sqlite::SqliteStore;
use crate::error::DataError;

/// Storage operations over the wishlist schema, implemented once per engine.
///
/// Lookups return `Ok(None)` for missing rows, updates of a missing row
/// return `Ok(None)` and deletes report whether a row was removed.
#[allow(async_fn_in_trait)]
pub trait WishlistStore {
    fn engine(&self) -> Engine;

    /// Apply every pending migration for this engine.
    async fn migrate(&self) -> Result<(), DataError>;

    async fn introspect(&self) -> Result<SchemaShape, DataError>;

    // ----- Lists -----

    async fn create_list(&self, list: &NewList) -> Result<List, DataError>;
    async fn find_list(&self, id: i64) -> Result<Option<List>, DataError>;
    async fn find_list_by_key(&self, key: &str) -> Result<Option<List>, DataError>;
    async fn all_public_lists(&self) -> Result<Vec<List>, DataError>;
    async fn update_list(&self, id: i64, changes: &ListChanges)
    -> Result<Option<List>, DataError>;
    async fn delete_list(&self, id: i64) -> Result<bool, DataError>;
    async fn count_lists(&self) -> Result<i64, DataError>;

    // ----- Items -----

    async fn create_item(&self, item: &NewItem) -> Result<Item, DataError>;
    async fn find_item(&self, id: i64) -> Result<Option<Item>, DataError>;
    async fn items_by_list(&self, list_id: i64) -> Result<Vec<Item>, DataError>;
    async fn update_item(&self, id: i64, changes: &ItemChanges)
    -> Result<Option<Item>, DataError>;
    async fn delete_item(&self, id: i64) -> Result<bool, DataError>;
    async fn count_items(&self) -> Result<i64, DataError>;

    // ----- Users -----

    async fn create_user(&self, user: &NewUser) -> Result<User, DataError>;
    async fn find_user(&self, id: i64) -> Result<Option<User>, DataError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DataError>;
    /// All users, with `password_hash` left empty.
    async fn all_users(&self) -> Result<Vec<User>, DataError>;
    async fn update_user(
        &self,
        id: i64,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, DataError>;
    async fn delete_user(&self, id: i64) -> Result<bool, DataError>;
    async fn count_users(&self) -> Result<i64, DataError>;

    // ----- Sessions -----

    /// Open a session for `user_id`. See [`crate::util::random_token`].
    async fn create_session(&self, user_id: i64, token: &str) -> Result<UserSession, DataError>;
    async fn find_session_by_token(&self, token: &str) -> Result<Option<UserSession>, DataError>;
    async fn delete_session_by_token(&self, token: &str) -> Result<bool, DataError>;
    /// Remove sessions created more than `max_age` ago. Returns how many went.
    async fn purge_sessions_older_than(&self, max_age: ChronoDuration) -> Result<u64, DataError>;
}

/// A connected store for whichever engine the database url names.
#[derive(Clone)]
pub enum Database {
    Sqlite(SqliteStore),
    Postgres(PostgresStore),
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            Database::Sqlite($store) => $call,
            Database::Postgres($store) => $call,
        }
    };
}

impl Database {
    /// Connect to `database_url`, retrying transient failures up to
    /// `retries` extra times with exponential backoff.
    pub async fn connect(database_url: &str, retries: usize) -> Result<Self, DataError> {
        let engine = Engine::from_url(database_url)?;
        let policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(250))
            .with_max_delay(Duration::from_secs(3))
            .with_max_times(retries)
            .with_jitter();

        let db = match engine {
            Engine::Sqlite => {
                SqliteStore::prepare_file(database_url)?;
                let store = (|| SqliteStore::connect(database_url))
                    .retry(policy)
                    .when(is_transient)
                    .notify(|e, delay| warn!(error = %e, ?delay, "sqlite connect failed; retrying"))
                    .await?;
                Database::Sqlite(store)
            }
            Engine::Postgres => {
                let store = (|| PostgresStore::connect(database_url))
                    .retry(policy)
                    .when(is_transient)
                    .notify(|e, delay| warn!(error = %e, ?delay, "postgres connect failed; retrying"))
                    .await?;
                Database::Postgres(store)
            }
        };

        info!(engine = %engine, "database connected");
        Ok(db)
    }

    /// Connect and bring the schema up to date.
    pub async fn open(database_url: &str, retries: usize) -> Result<Self, DataError> {
        let db = Self::connect(database_url, retries).await?;
        db.migrate().await?;
        Ok(db)
    }
}

fn is_transient(e: &DataError) -> bool {
    matches!(
        e,
        DataError::Io(_)
            | DataError::Database(sqlx::Error::Io(_))
            | DataError::Database(sqlx::Error::PoolTimedOut)
    )
}

impl WishlistStore for Database {
    fn engine(&self) -> Engine {
        dispatch!(self, s => s.engine())
    }

    async fn migrate(&self) -> Result<(), DataError> {
        dispatch!(self, s => s.migrate().await)
    }

    async fn introspect(&self) -> Result<SchemaShape, DataError> {
        dispatch!(self, s => s.introspect().await)
    }

    async fn create_list(&self, list: &NewList) -> Result<List, DataError> {
        dispatch!(self, s => s.create_list(list).await)
    }

    async fn find_list(&self, id: i64) -> Result<Option<List>, DataError> {
        dispatch!(self, s => s.find_list(id).await)
    }

    async fn find_list_by_key(&self, key: &str) -> Result<Option<List>, DataError> {
        dispatch!(self, s => s.find_list_by_key(key).await)
    }

    async fn all_public_lists(&self) -> Result<Vec<List>, DataError> {
        dispatch!(self, s => s.all_public_lists().await)
    }

    async fn update_list(
        &self,
        id: i64,
        changes: &ListChanges,
    ) -> Result<Option<List>, DataError> {
        dispatch!(self, s => s.update_list(id, changes).await)
    }

    async fn delete_list(&self, id: i64) -> Result<bool, DataError> {
        dispatch!(self, s => s.delete_list(id).await)
    }

    async fn count_lists(&self) -> Result<i64, DataError> {
        dispatch!(self, s => s.count_lists().await)
    }

    async fn create_item(&self, item: &NewItem) -> Result<Item, DataError> {
        dispatch!(self, s => s.create_item(item).await)
    }

    async fn find_item(&self, id: i64) -> Result<Option<Item>, DataError> {
        dispatch!(self, s => s.find_item(id).await)
    }

    async fn items_by_list(&self, list_id: i64) -> Result<Vec<Item>, DataError> {
        dispatch!(self, s => s.items_by_list(list_id).await)
    }

    async fn update_item(
        &self,
        id: i64,
        changes: &ItemChanges,
    ) -> Result<Option<Item>, DataError> {
        dispatch!(self, s => s.update_item(id, changes).await)
    }

    async fn delete_item(&self, id: i64) -> Result<bool, DataError> {
        dispatch!(self, s => s.delete_item(id).await)
    }

    async fn count_items(&self) -> Result<i64, DataError> {
        dispatch!(self, s => s.count_items().await)
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, DataError> {
        dispatch!(self, s => s.create_user(user).await)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, DataError> {
        dispatch!(self, s => s.find_user(id).await)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DataError> {
        dispatch!(self, s => s.find_user_by_username(username).await)
    }

    async fn all_users(&self) -> Result<Vec<User>, DataError> {
        dispatch!(self, s => s.all_users().await)
    }

    async fn update_user(
        &self,
        id: i64,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, DataError> {
        dispatch!(self, s => s.update_user(id, username, email).await)
    }

    async fn delete_user(&self, id: i64) -> Result<bool, DataError> {
        dispatch!(self, s => s.delete_user(id).await)
    }

    async fn count_users(&self) -> Result<i64, DataError> {
        dispatch!(self, s => s.count_users().await)
    }

    async fn create_session(&self, user_id: i64, token: &str) -> Result<UserSession, DataError> {
        dispatch!(self, s => s.create_session(user_id, token).await)
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<UserSession>, DataError> {
        dispatch!(self, s => s.find_session_by_token(token).await)
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<bool, DataError> {
        dispatch!(self, s => s.delete_session_by_token(token).await)
    }

    async fn purge_sessions_older_than(&self, max_age: ChronoDuration) -> Result<u64, DataError> {
        dispatch!(self, s => s.purge_sessions_older_than(max_age).await)
    }
}
