//! User persistence.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::UserDbModel;
use crate::database::time::now_ms;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create or refresh a user keyed by upstream login.
    ///
    /// A `None` email or access key leaves the stored value untouched.
    async fn upsert_by_username(
        &self,
        username: &str,
        email: Option<&str>,
        access_key: Option<&str>,
    ) -> Result<UserDbModel>;

    async fn find_by_id(&self, id: &str) -> Result<Option<UserDbModel>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserDbModel>>;

    /// The user's upstream credential; blank counts as none.
    async fn get_access_key(&self, user_id: &str) -> Result<Option<String>>;
}

pub struct SqlxUserRepository {
    pool: SqlitePool,
}

impl SqlxUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn upsert_by_username(
        &self,
        username: &str,
        email: Option<&str>,
        access_key: Option<&str>,
    ) -> Result<UserDbModel> {
        let now = now_ms();
        let user = sqlx::query_as::<_, UserDbModel>(
            r#"
            INSERT INTO app_users (id, username, email, access_key, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (username) DO UPDATE SET
                email = COALESCE(excluded.email, app_users.email),
                access_key = COALESCE(excluded.access_key, app_users.access_key),
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(username)
        .bind(email)
        .bind(access_key)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserDbModel>> {
        let user = sqlx::query_as::<_, UserDbModel>("SELECT * FROM app_users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserDbModel>> {
        let user = sqlx::query_as::<_, UserDbModel>("SELECT * FROM app_users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_access_key(&self, user_id: &str) -> Result<Option<String>> {
        let key: Option<Option<String>> =
            sqlx::query_scalar("SELECT access_key FROM app_users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(key.flatten().filter(|k| !k.trim().is_empty()))
    }
}
