use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub ttl_minutes: i64,
    pub secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub session: SessionConfig,
    pub static_dir: String,
    /// Public origin used when building links sent by mail.
    pub base_url: String,
    pub reset_ttl_minutes: i64,
    pub mail_from: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let session = SessionConfig {
            secret: std::env::var("SESSION_SECRET")?,
            issuer: std::env::var("SESSION_ISSUER").unwrap_or_else(|_| "snippetbox".into()),
            ttl_minutes: std::env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(12 * 60),
            secure: std::env::var("SESSION_SECURE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        };
        Ok(Self {
            database_url,
            session,
            static_dir: std::env::var("STATIC_DIR").unwrap_or_else(|_| "./ui/static".into()),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:4000".into()),
            reset_ttl_minutes: std::env::var("RESET_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            mail_from: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@snippetbox.local".into()),
        })
    }
}
