use std::time::Duration;

use axum::extract::FromRef;
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{auth::repo_types::User, state::AppState};

const RESET_AUDIENCE: &str = "snippetbox-password-reset";

type HmacSha256 = Hmac<Sha256>;

/// Claims of a password reset link.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResetClaims {
    pub sub: Uuid,
    pub fp: String, // keyed MAC of the password hash at issue time
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

#[derive(Clone)]
pub struct ResetKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    fingerprint_key: Vec<u8>,
    pub issuer: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for ResetKeys {
    fn from_ref(state: &AppState) -> Self {
        let secret = state.config.session.secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            fingerprint_key: secret.to_vec(),
            issuer: state.config.session.issuer.clone(),
            ttl: Duration::from_secs((state.config.reset_ttl_minutes.max(1) as u64) * 60),
        }
    }
}

impl ResetKeys {
    fn mac(&self, hashed_password: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.fingerprint_key).expect("HMAC accepts any key length");
        mac.update(RESET_AUDIENCE.as_bytes());
        mac.update(hashed_password.as_bytes());
        mac
    }

    /// Binds a token to the password hash without exposing any of it.
    fn fingerprint(&self, hashed_password: &str) -> String {
        Base64UrlUnpadded::encode_string(&self.mac(hashed_password).finalize().into_bytes())
    }

    /// A token stops matching once the password it was issued against changes.
    pub fn matches(&self, claims: &ResetClaims, user: &User) -> bool {
        if claims.sub != user.id {
            return false;
        }
        let Ok(fp) = Base64UrlUnpadded::decode_vec(&claims.fp) else {
            return false;
        };
        self.mac(&user.hashed_password).verify_slice(&fp).is_ok()
    }

    pub fn sign(&self, user: &User) -> anyhow::Result<String> {
        self.sign_at(user, OffsetDateTime::now_utc())
    }

    pub fn sign_at(&self, user: &User, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = ResetClaims {
            sub: user.id,
            fp: self.fingerprint(&user.hashed_password),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: RESET_AUDIENCE.to_string(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user.id, "password reset token signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<ResetClaims> {
        let mut validation = Validation::default();
        validation.set_audience(&[RESET_AUDIENCE]);
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<ResetClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}
