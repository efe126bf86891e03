use axum::{
    body::{self, Body},
    extract::Request,
    http::{HeaderName, Method},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use tracing::warn;

use super::Session;
use crate::error::AppError;

pub const CSRF_FIELD: &str = "csrf_token";
pub const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrf-token");

/// Largest body buffered while looking for the token.
const CSRF_BODY_LIMIT: usize = 64 * 1024;

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn token_from_body(body: &Bytes) -> Option<String> {
    url::form_urlencoded::parse(body)
        .find(|(k, _)| k == CSRF_FIELD)
        .map(|(_, v)| v.into_owned())
}

fn tokens_match(expected: &str, given: &str) -> bool {
    let (a, b) = (expected.as_bytes(), given.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Rejects state-changing requests whose token does not match the session.
pub async fn verify_csrf(session: Session, req: Request, next: Next) -> Result<Response, AppError> {
    if is_safe(req.method()) {
        return Ok(next.run(req).await);
    }

    let expected = session.csrf_token();

    let header_token = req
        .headers()
        .get(&CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    if let Some(given) = header_token {
        if tokens_match(&expected, &given) {
            return Ok(next.run(req).await);
        }
        warn!(path = %req.uri().path(), "csrf header mismatch");
        return Err(AppError::BadRequest);
    }

    let (parts, body) = req.into_parts();
    let bytes = body::to_bytes(body, CSRF_BODY_LIMIT).await.map_err(|e| {
        warn!(error = %e, "could not buffer body for csrf check");
        AppError::BadRequest
    })?;

    match token_from_body(&bytes) {
        Some(given) if tokens_match(&expected, &given) => {
            let req = Request::from_parts(parts, Body::from(bytes));
            Ok(next.run(req).await)
        }
        _ => {
            warn!(path = %parts.uri.path(), "csrf token missing or invalid");
            Err(AppError::BadRequest)
        }
    }
}
