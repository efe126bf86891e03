use crate::auth::repo::{PgUserStore, UserStore};
use crate::config::AppConfig;
use crate::db;
use crate::mailer::{LogMailer, Mailer};
use crate::snippets::repo::{PgSnippetStore, SnippetStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub snippets: Arc<dyn SnippetStore>,
    pub users: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await?;

        Ok(Self::from_parts(
            config,
            Arc::new(PgSnippetStore::new(pool.clone())),
            Arc::new(PgUserStore::new(pool)),
            Arc::new(LogMailer),
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        snippets: Arc<dyn SnippetStore>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            snippets,
            users,
            mailer,
        }
    }
}
