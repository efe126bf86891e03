use async_trait::async_trait;
use sqlx::PgPool;

use crate::{error::ModelError, snippets::repo_types::Snippet};

/// How many snippets the home page lists.
pub const LATEST_LIMIT: i64 = 10;

#[async_trait]
pub trait SnippetStore: Send + Sync {
    async fn insert(&self, title: &str, content: &str, expires_days: i32)
        -> Result<i64, ModelError>;
    /// Fails with `NoRecord` for unknown and for expired snippets.
    async fn get(&self, id: i64) -> Result<Snippet, ModelError>;
    async fn latest(&self) -> Result<Vec<Snippet>, ModelError>;
}

#[derive(Clone)]
pub struct PgSnippetStore {
    db: PgPool,
}

impl PgSnippetStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SnippetStore for PgSnippetStore {
    async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_days: i32,
    ) -> Result<i64, ModelError> {
        let (id,) = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO snippets (title, content, created, expires)
            VALUES ($1, $2, now(), now() + make_interval(days => $3))
            RETURNING id
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(expires_days)
        .fetch_one(&self.db)
        .await?;
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Snippet, ModelError> {
        sqlx::query_as::<_, Snippet>(
            r#"
            SELECT id, title, content, created, expires
            FROM snippets
            WHERE expires > now() AND id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ModelError::NoRecord)
    }

    async fn latest(&self) -> Result<Vec<Snippet>, ModelError> {
        let rows = sqlx::query_as::<_, Snippet>(
            r#"
            SELECT id, title, content, created, expires
            FROM snippets
            WHERE expires > now()
            ORDER BY created DESC
            LIMIT $1
            "#,
        )
        .bind(LATEST_LIMIT)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
