use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row};
use std::time::Duration;
use tracing::debug;
use validator::Validate;

use crate::db::introspect::{self, SchemaShape};
use crate::db::models::{
    Item, ItemChanges, List, ListChanges, NewItem, NewList, NewUser, User, UserChanges,
    UserSession,
};
use crate::db::schema::{Engine, POSTGRES_MIGRATOR};
use crate::db::store::WishlistStore;
use crate::error::DataError;
use crate::util;

pub type PgPool = Pool<Postgres>;

const MAX_CONNECTIONS: u32 = 5;

/// Postgres flavour of the store. Every timestamp column is a plain
/// `TIMESTAMP` holding UTC.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(database_url: &str) -> Result<Self, DataError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    fn row_to_list(row: PgRow) -> Result<List, DataError> {
        Ok(List {
            id: row.try_get("id")?,
            key: row.try_get("key")?,
            is_private: row.try_get("is_private")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            created_at: utc(row.try_get("created_at")?),
            updated_at: utc(row.try_get("updated_at")?),
        })
    }

    fn row_to_item(row: PgRow) -> Result<Item, DataError> {
        Ok(Item {
            id: row.try_get("id")?,
            list_id: row.try_get("list_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price: row.try_get("price")?,
            created_at: utc(row.try_get("created_at")?),
            updated_at: utc(row.try_get("updated_at")?),
        })
    }

    fn row_to_user(row: PgRow) -> Result<User, DataError> {
        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            created_at: utc(row.try_get("created_at")?),
            updated_at: utc(row.try_get("updated_at")?),
        })
    }

    fn row_to_session(row: PgRow) -> Result<UserSession, DataError> {
        Ok(UserSession {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            token: row.try_get("token")?,
            created_at: utc(row.try_get("created_at")?),
            updated_at: utc(row.try_get("updated_at")?),
        })
    }
}

fn utc(naive: NaiveDateTime) -> DateTime<Utc> {
    naive.and_utc()
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl WishlistStore for PostgresStore {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    async fn migrate(&self) -> Result<(), DataError> {
        POSTGRES_MIGRATOR.run(&self.pool).await?;
        debug!(engine = "postgres", "migrations up to date");
        Ok(())
    }

    async fn introspect(&self) -> Result<SchemaShape, DataError> {
        introspect::introspect_postgres(&self.pool).await
    }

    // ----- Lists -----

    async fn create_list(&self, list: &NewList) -> Result<List, DataError> {
        list.validate()?;
        let key = util::random_key();
        let now = now();

        let row = match list.is_private {
            Some(is_private) => {
                sqlx::query(
                    r#"
                    INSERT INTO lists (key, is_private, title, description, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $5)
                    RETURNING id, key, is_private, title, description, created_at, updated_at
                    "#,
                )
                .bind(&key)
                .bind(is_private)
                .bind(&list.title)
                .bind(&list.description)
                .bind(now)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO lists (key, title, description, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $4)
                    RETURNING id, key, is_private, title, description, created_at, updated_at
                    "#,
                )
                .bind(&key)
                .bind(&list.title)
                .bind(&list.description)
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
               FROM lists WHERE id = $1"#,
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
               FROM lists WHERE key = $1"#,
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
                is_private = $1,
                title = $2,
                description = $3,
                updated_at = $4
            WHERE id = $5
            RETURNING id, key, is_private, title, description, created_at, updated_at
            "#,
        )
        .bind(changes.is_private)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_list)
        .transpose()
    }

    async fn delete_list(&self, id: i64) -> Result<bool, DataError> {
        let res = sqlx::query("DELETE FROM lists WHERE id = $1")
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
        let row = sqlx::query(
            r#"
            INSERT INTO items (list_id, title, description, price, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, list_id, title, description, price, created_at, updated_at
            "#,
        )
        .bind(item.list_id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.price)
        .bind(now())
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_item(row)
    }

    async fn find_item(&self, id: i64) -> Result<Option<Item>, DataError> {
        sqlx::query(
            r#"SELECT id, list_id, title, description, price, created_at, updated_at
               FROM items WHERE id = $1"#,
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
               FROM items WHERE list_id = $1 ORDER BY id"#,
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
                list_id = $1,
                title = $2,
                description = $3,
                price = $4,
                updated_at = $5
            WHERE id = $6
            RETURNING id, list_id, title, description, price, created_at, updated_at
            "#,
        )
        .bind(changes.list_id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(&changes.price)
        .bind(now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_item)
        .transpose()
    }

    async fn delete_item(&self, id: i64) -> Result<bool, DataError> {
        let res = sqlx::query("DELETE FROM items WHERE id = $1")
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
        let row = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, username, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(now())
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_user(row)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, DataError> {
        sqlx::query(
            r#"SELECT id, username, email, password_hash, created_at, updated_at
               FROM users WHERE id = $1"#,
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
               FROM users WHERE username = $1"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_user)
        .transpose()
    }

    async fn all_users(&self) -> Result<Vec<User>, DataError> {
        let rows = sqlx::query(
            r#"SELECT id, username, email, ''::text AS password_hash, created_at, updated_at
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
                username = $1,
                email = $2,
                updated_at = $3
            WHERE id = $4
            RETURNING id, username, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_user)
        .transpose()
    }

    async fn delete_user(&self, id: i64) -> Result<bool, DataError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
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
        let row = sqlx::query(
            r#"
            INSERT INTO user_sessions (user_id, token, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            RETURNING id, user_id, token, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(now())
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_session(row)
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<UserSession>, DataError> {
        sqlx::query(
            r#"SELECT id, user_id, token, created_at, updated_at
               FROM user_sessions WHERE token = $1"#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_session)
        .transpose()
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<bool, DataError> {
        let res = sqlx::query("DELETE FROM user_sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn purge_sessions_older_than(&self, max_age: ChronoDuration) -> Result<u64, DataError> {
        let Some(cutoff) = now().checked_sub_signed(max_age) else {
            return Ok(0);
        };
        let res = sqlx::query("DELETE FROM user_sessions WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}
