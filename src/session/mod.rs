//! Signed-cookie sessions.
//!
//! The whole session lives in a JWT stored in the `session` cookie, so the
//! server keeps no session table. A cookie that fails verification (bad
//! signature, expired, wrong issuer) is replaced by a fresh session.

pub mod csrf;

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error};
use uuid::Uuid;

use crate::{config::SessionConfig, error::AppError, state::AppState};

pub const SESSION_COOKIE: &str = "session";
const SESSION_AUDIENCE: &str = "snippetbox-session";

/// Claims carried in the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>, // path to return to after login
    pub csrf: String,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: Option<Uuid>,
    pub flash: Option<String>,
    pub redirect_after_login: Option<String>,
    pub csrf_token: String,
}

impl SessionData {
    pub fn fresh() -> Self {
        Self {
            user_id: None,
            flash: None,
            redirect_after_login: None,
            csrf_token: generate_csrf_token(),
        }
    }
}

fn generate_csrf_token() -> String {
    let mut buf = [0u8; 32];
    OsRng.fill_bytes(&mut buf);
    Base64UrlUnpadded::encode_string(&buf)
}

/// Signing keys and cookie settings for sessions.
#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub ttl: Duration,
    pub secure: bool,
}

impl SessionKeys {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            ttl: Duration::from_secs((config.ttl_minutes.max(1) as u64) * 60),
            secure: config.secure,
        }
    }

    pub fn encode(&self, data: &SessionData) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = SessionClaims {
            uid: data.user_id,
            flash: data.flash.clone(),
            next: data.redirect_after_login.clone(),
            csrf: data.csrf_token.clone(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: SESSION_AUDIENCE.to_string(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn decode(&self, token: &str) -> anyhow::Result<SessionData> {
        let mut validation = Validation::default();
        validation.set_audience(&[SESSION_AUDIENCE]);
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let claims = decode::<SessionClaims>(token, &self.decoding, &validation)?.claims;
        Ok(SessionData {
            user_id: claims.uid,
            flash: claims.flash,
            redirect_after_login: claims.next,
            csrf_token: claims.csrf,
        })
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(TimeDuration::seconds(self.ttl.as_secs() as i64))
            .build()
    }
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        SessionKeys::new(&state.config.session)
    }
}

struct SessionState {
    data: SessionData,
    modified: bool,
}

/// Per-request handle on the session. Clones share state; changes are
/// written back to the cookie when the response leaves [`load_session`].
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

impl Session {
    pub fn new(data: SessionData, modified: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState { data, modified })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.lock().data.user_id
    }

    pub fn set_user_id(&self, id: Uuid) {
        let mut state = self.lock();
        state.data.user_id = Some(id);
        state.modified = true;
    }

    pub fn remove_user_id(&self) {
        let mut state = self.lock();
        if state.data.user_id.take().is_some() {
            state.modified = true;
        }
    }

    pub fn put_flash(&self, message: impl Into<String>) {
        let mut state = self.lock();
        state.data.flash = Some(message.into());
        state.modified = true;
    }

    /// Returns the flash message and removes it from the session.
    pub fn pop_flash(&self) -> Option<String> {
        let mut state = self.lock();
        let flash = state.data.flash.take();
        if flash.is_some() {
            state.modified = true;
        }
        flash
    }

    pub fn set_redirect_after_login(&self, path: impl Into<String>) {
        let mut state = self.lock();
        state.data.redirect_after_login = Some(path.into());
        state.modified = true;
    }

    pub fn pop_redirect_after_login(&self) -> Option<String> {
        let mut state = self.lock();
        let next = state.data.redirect_after_login.take();
        if next.is_some() {
            state.modified = true;
        }
        next
    }

    pub fn csrf_token(&self) -> String {
        self.lock().data.csrf_token.clone()
    }

    pub fn is_modified(&self) -> bool {
        self.lock().modified
    }

    pub fn snapshot(&self) -> SessionData {
        self.lock().data.clone()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::internal(anyhow::anyhow!("session layer not installed")))
    }
}

/// Loads the session from its cookie before the handler runs and re-issues
/// the cookie afterwards if the handler changed anything.
pub async fn load_session(
    State(keys): State<SessionKeys>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let session = match jar.get(SESSION_COOKIE).map(|c| keys.decode(c.value())) {
        Some(Ok(data)) => Session::new(data, false),
        Some(Err(e)) => {
            debug!(error = %e, "discarding invalid session cookie");
            Session::new(SessionData::fresh(), true)
        }
        None => Session::new(SessionData::fresh(), true),
    };

    req.extensions_mut().insert(session.clone());
    let response = next.run(req).await;

    if !session.is_modified() {
        return response;
    }
    match keys.encode(&session.snapshot()) {
        Ok(token) => (jar.add(keys.cookie(token)), response).into_response(),
        Err(e) => {
            error!(error = %e, "failed to sign session cookie");
            AppError::internal(e).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(secret: &str) -> SessionKeys {
        SessionKeys::new(&SessionConfig {
            secret: secret.into(),
            issuer: "test".into(),
            ttl_minutes: 5,
            secure: true,
        })
    }

    #[test]
    fn fresh_sessions_get_unique_csrf_tokens() {
        let a = SessionData::fresh();
        let b = SessionData::fresh();
        assert_ne!(a.csrf_token, b.csrf_token);
        assert_eq!(a.csrf_token.len(), 43);
        assert!(a.user_id.is_none());
    }

    #[test]
    fn encoded_session_decodes_with_same_secret() {
        let keys = keys("s6Ndh+pPbnzHbS*+9Pk8qGWhTzbpa@ge");
        let mut data = SessionData::fresh();
        data.user_id = Some(Uuid::new_v4());
        data.flash = Some("hello".into());

        let token = keys.encode(&data).expect("encode");
        let decoded = keys.decode(&token).expect("decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn decode_rejects_foreign_signature() {
        let token = keys("secret-one").encode(&SessionData::fresh()).unwrap();
        assert!(keys("secret-two").decode(&token).is_err());
    }

    #[test]
    fn pop_flash_is_one_shot() {
        let session = Session::new(SessionData::fresh(), false);
        assert!(session.pop_flash().is_none());
        assert!(!session.is_modified());

        session.put_flash("saved");
        assert_eq!(session.pop_flash().as_deref(), Some("saved"));
        assert!(session.pop_flash().is_none());
        assert!(session.is_modified());
    }

    #[test]
    fn remove_user_id_only_marks_modified_when_present() {
        let session = Session::new(SessionData::fresh(), false);
        session.remove_user_id();
        assert!(!session.is_modified());

        session.set_user_id(Uuid::new_v4());
        session.remove_user_id();
        assert!(session.user_id().is_none());
        assert!(session.is_modified());
    }

    #[test]
    fn cookie_attributes() {
        let cookie = keys("k").cookie("token".into());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }
}
