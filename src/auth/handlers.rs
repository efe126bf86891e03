use axum::{
    extract::{FromRef, Path, State},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        middleware::{require_authentication, CurrentUser},
        repo_types::User,
        reset::ResetKeys,
    },
    error::{AppError, ModelError},
    forms::{Form, PostedForm, EMAIL_RX},
    mailer::Email,
    session::Session,
    state::AppState,
    views::{Page, Renderer, TemplateData},
};

const MIN_PASSWORD_LEN: usize = 10;

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/user/signup", get(signup_form).post(signup))
        .route("/user/login", get(login_form).post(login))
        .route(
            "/user/passwordreset",
            get(password_reset_form).post(password_reset),
        )
        .route(
            "/user/password/:token",
            get(new_password_form).post(new_password),
        )
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/user/logout", post(logout))
        .route("/user/profile", get(profile))
        .route(
            "/user/change-password",
            get(change_password_form).post(change_password),
        )
        .route_layer(middleware::from_fn(require_authentication))
}

pub async fn signup_form(renderer: Renderer) -> Response {
    renderer.render(Page::Signup, TemplateData::with_form(Form::empty()))
}

#[instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    renderer: Renderer,
    PostedForm(mut form): PostedForm,
) -> Result<Response, AppError> {
    form.required(&["name", "email", "password"]);
    form.matches_pattern("email", &EMAIL_RX);
    form.min_length("password", MIN_PASSWORD_LEN);

    if !form.valid() {
        return Ok(renderer.render(Page::Signup, TemplateData::with_form(form)));
    }

    let inserted = state
        .users
        .insert(form.get("name"), form.get("email"), form.get("password"))
        .await;
    match inserted {
        Ok(()) => {}
        Err(ModelError::DuplicateEmail) => {
            warn!(email = %form.get("email"), "email already registered");
            form.errors.add("email", "Address is already in use");
            return Ok(renderer.render(Page::Signup, TemplateData::with_form(form)));
        }
        Err(e) => return Err(e.into()),
    }

    info!(email = %form.get("email"), "user registered");
    session.put_flash("Your signup was successful. Please log in.");
    Ok(Redirect::to("/user/login").into_response())
}

pub async fn login_form(renderer: Renderer) -> Response {
    renderer.render(Page::Login, TemplateData::with_form(Form::empty()))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    renderer: Renderer,
    PostedForm(mut form): PostedForm,
) -> Result<Response, AppError> {
    let authenticated = state
        .users
        .authenticate(form.get("email"), form.get("password"))
        .await;
    let id = match authenticated {
        Ok(id) => id,
        Err(ModelError::InvalidCredentials) => {
            warn!(email = %form.get("email"), "login rejected");
            form.errors.add("generic", "Email or Password is incorrect");
            return Ok(renderer.render(Page::Login, TemplateData::with_form(form)));
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %id, "user logged in");
    session.set_user_id(id);
    let next = session
        .pop_redirect_after_login()
        .unwrap_or_else(|| "/snippet/create".into());
    Ok(Redirect::to(&next).into_response())
}

#[instrument(skip_all)]
pub async fn logout(session: Session) -> Response {
    if let Some(id) = session.user_id() {
        info!(user_id = %id, "user logged out");
    }
    session.remove_user_id();
    session.put_flash("You've been logged out successfully!");
    Redirect::to("/").into_response()
}

pub async fn profile(
    renderer: Renderer,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    let Some(user) = user else {
        return Redirect::to("/user/login").into_response();
    };
    renderer.render(
        Page::Profile,
        TemplateData {
            user: Some(user),
            ..Default::default()
        },
    )
}

pub async fn change_password_form(renderer: Renderer) -> Response {
    renderer.render(Page::ChangePassword, TemplateData::with_form(Form::empty()))
}

/// Shared rules for choosing a new password.
fn validate_new_password(form: &mut Form) {
    form.min_length("newPassword", MIN_PASSWORD_LEN);
    if form.get("newPassword") != form.get("newPasswordConfirmation") {
        form.errors
            .add("newPasswordConfirmation", "Passwords do not match");
    }
}

#[instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    session: Session,
    renderer: Renderer,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    PostedForm(mut form): PostedForm,
) -> Result<Response, AppError> {
    let Some(user) = user else {
        return Ok(Redirect::to("/user/login").into_response());
    };

    form.required(&["currentPassword", "newPassword", "newPasswordConfirmation"]);
    validate_new_password(&mut form);
    if !form.valid() {
        return Ok(renderer.render(Page::ChangePassword, TemplateData::with_form(form)));
    }

    let changed = state
        .users
        .change_password(user.id, form.get("currentPassword"), form.get("newPassword"))
        .await;
    match changed {
        Ok(()) => {}
        Err(ModelError::InvalidCredentials) => {
            form.errors
                .add("currentPassword", "Current password is incorrect");
            return Ok(renderer.render(Page::ChangePassword, TemplateData::with_form(form)));
        }
        Err(e) => return Err(e.into()),
    }

    info!(user_id = %user.id, "password changed");
    session.put_flash("Your password has been updated!");
    Ok(Redirect::to("/user/profile").into_response())
}

pub async fn password_reset_form(renderer: Renderer) -> Response {
    renderer.render(Page::PasswordReset, TemplateData::with_form(Form::empty()))
}

#[instrument(skip_all)]
pub async fn password_reset(
    State(state): State<AppState>,
    session: Session,
    renderer: Renderer,
    PostedForm(mut form): PostedForm,
) -> Result<Response, AppError> {
    form.required(&["email"]);
    form.matches_pattern("email", &EMAIL_RX);
    if !form.valid() {
        return Ok(renderer.render(Page::PasswordReset, TemplateData::with_form(form)));
    }

    match state.users.get_by_email(form.get("email")).await {
        Ok(user) => {
            let token = ResetKeys::from_ref(&state)
                .sign(&user)
                .map_err(AppError::internal)?;
            let link = format!(
                "{}/user/password/{}",
                state.config.base_url.trim_end_matches('/'),
                token
            );
            let email = Email::new(
                user.email.clone(),
                state.config.mail_from.clone(),
                "Reset your Snippetbox password",
                format!(
                    "Hi {},\n\nFollow this link to choose a new password:\n\n{}\n\n\
                     If you did not ask for this, you can ignore this message.",
                    user.name, link
                ),
            );
            state.mailer.send(email).await.map_err(|e| {
                error!(error = %e, user_id = %user.id, "sending reset email failed");
                AppError::internal(e)
            })?;
            info!(user_id = %user.id, "password reset link sent");
        }
        Err(ModelError::NoRecord) => {
            info!("password reset requested for unknown email");
        }
        Err(e) => return Err(e.into()),
    }

    session.put_flash(
        "If an account exists for that address, we've sent a link to reset your password.",
    );
    Ok(Redirect::to("/user/login").into_response())
}

/// Account a reset token still applies to, or `None` when the token is
/// forged, expired, already used or the account is gone.
async fn resolve_reset_token(state: &AppState, token: &str) -> Result<Option<User>, AppError> {
    let keys = ResetKeys::from_ref(state);
    let claims = match keys.verify(token) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "reset token rejected");
            return Ok(None);
        }
    };
    match state.users.get(claims.sub).await {
        Ok(user) if user.active && keys.matches(&claims, &user) => Ok(Some(user)),
        Ok(_) | Err(ModelError::NoRecord) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn invalid_reset_link(session: &Session) -> Response {
    session.put_flash("That password reset link is invalid or has expired.");
    Redirect::to("/user/passwordreset").into_response()
}

#[instrument(skip_all)]
pub async fn new_password_form(
    State(state): State<AppState>,
    session: Session,
    renderer: Renderer,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    if resolve_reset_token(&state, &token).await?.is_none() {
        return Ok(invalid_reset_link(&session));
    }
    Ok(renderer.render(
        Page::NewPassword,
        TemplateData {
            form: Some(Form::empty()),
            reset_token: Some(token),
            ..Default::default()
        },
    ))
}

#[instrument(skip_all)]
pub async fn new_password(
    State(state): State<AppState>,
    session: Session,
    renderer: Renderer,
    Path(token): Path<String>,
    PostedForm(mut form): PostedForm,
) -> Result<Response, AppError> {
    let Some(user) = resolve_reset_token(&state, &token).await? else {
        return Ok(invalid_reset_link(&session));
    };

    form.required(&["newPassword", "newPasswordConfirmation"]);
    validate_new_password(&mut form);
    if !form.valid() {
        return Ok(renderer.render(
            Page::NewPassword,
            TemplateData {
                form: Some(form),
                reset_token: Some(token),
                ..Default::default()
            },
        ));
    }

    state
        .users
        .set_password(user.id, form.get("newPassword"))
        .await?;

    info!(user_id = %user.id, "password reset");
    session.put_flash("Your password has been reset. Please log in.");
    Ok(Redirect::to("/user/login").into_response())
}
