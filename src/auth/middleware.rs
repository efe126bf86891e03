use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, warn};

use crate::{
    auth::repo_types::User,
    error::{AppError, ModelError},
    session::Session,
    state::AppState,
};

/// The logged-in user for this request, if any. Inserted by [`authenticate`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<User>);

/// Resolves the session's user id to an active user.
pub async fn authenticate(
    State(state): State<AppState>,
    session: Session,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = match session.user_id() {
        None => None,
        Some(id) => match state.users.get(id).await {
            Ok(user) if user.active => Some(user),
            Ok(_) => {
                warn!(user_id = %id, "session refers to inactive user");
                session.remove_user_id();
                None
            }
            Err(ModelError::NoRecord) => {
                debug!(user_id = %id, "session refers to missing user");
                session.remove_user_id();
                None
            }
            Err(e) => return Err(e.into()),
        },
    };

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Sends anonymous visitors to the login page, remembering where they were
/// going. Pages behind it are never cached.
pub async fn require_authentication(session: Session, req: Request, next: Next) -> Response {
    let authenticated = req
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(|current| current.0.is_some());

    if !authenticated {
        let path = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".into());
        if req.method() == axum::http::Method::GET {
            session.set_redirect_after_login(path);
        }
        return Redirect::to("/user/login").into_response();
    }

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
