use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::{
        password::{hash_password_blocking, verify_password_blocking},
        repo_types::User,
    },
    error::ModelError,
};

/// Name of the unique index on `lower(users.email)`.
const EMAIL_CONSTRAINT: &str = "users_uc_email";

/// Addresses are stored and looked up trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<(), ModelError>;
    /// Id of the active user owning `email` if `password` matches.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Uuid, ModelError>;
    async fn get(&self, id: Uuid) -> Result<User, ModelError>;
    async fn get_by_email(&self, email: &str) -> Result<User, ModelError>;
    async fn change_password(
        &self,
        id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ModelError>;
    async fn set_password(&self, id: Uuid, new_password: &str) -> Result<(), ModelError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn is_duplicate_email(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(EMAIL_CONSTRAINT)
        }
        _ => false,
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<(), ModelError> {
        let hashed = hash_password_blocking(password).await?;
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, hashed_password, created)
            VALUES ($1, $2, $3, $4, now())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(normalize_email(email))
        .bind(hashed)
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_duplicate_email(&e) {
                ModelError::DuplicateEmail
            } else {
                ModelError::Database(e)
            }
        })?;
        Ok(())
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Uuid, ModelError> {
        let row = sqlx::query_as::<_, (Uuid, String)>(
            r#"SELECT id, hashed_password FROM users WHERE lower(email) = $1 AND active = TRUE"#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.db)
        .await?;

        let Some((id, hashed)) = row else {
            debug!("authenticate: unknown or inactive email");
            return Err(ModelError::InvalidCredentials);
        };

        if !verify_password_blocking(password, &hashed).await? {
            return Err(ModelError::InvalidCredentials);
        }
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<User, ModelError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, hashed_password, created, active
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ModelError::NoRecord)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, ModelError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, hashed_password, created, active
            FROM users
            WHERE lower(email) = $1 AND active = TRUE
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.db)
        .await?
        .ok_or(ModelError::NoRecord)
    }

    async fn change_password(
        &self,
        id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ModelError> {
        let (current_hash,) =
            sqlx::query_as::<_, (String,)>(r#"SELECT hashed_password FROM users WHERE id = $1"#)
                .bind(id)
                .fetch_optional(&self.db)
                .await?
                .ok_or(ModelError::NoRecord)?;

        if !verify_password_blocking(current_password, &current_hash).await? {
            return Err(ModelError::InvalidCredentials);
        }
        self.set_password(id, new_password).await
    }

    async fn set_password(&self, id: Uuid, new_password: &str) -> Result<(), ModelError> {
        let hashed = hash_password_blocking(new_password).await?;
        let result = sqlx::query(r#"UPDATE users SET hashed_password = $1 WHERE id = $2"#)
            .bind(hashed)
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ModelError::NoRecord);
        }
        Ok(())
    }
}
