use axum::{
    extract::{DefaultBodyLimit, Path, State},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use tracing::{info, instrument};

use crate::{
    auth::middleware::require_authentication,
    error::AppError,
    forms::{Form, PostedForm},
    session::Session,
    state::AppState,
    views::{Page, Renderer, TemplateData},
};

/// Upper bound on a create-snippet request body.
const CREATE_BODY_LIMIT: usize = 4096;
const EXPIRY_OPTIONS: [&str; 3] = ["365", "7", "1"];

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/snippet/:id", get(show_snippet))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/snippet/create",
            get(create_snippet_form)
                .post(create_snippet)
                .layer(DefaultBodyLimit::max(CREATE_BODY_LIMIT)),
        )
        .route_layer(middleware::from_fn(require_authentication))
}

#[instrument(skip_all)]
pub async fn home(State(state): State<AppState>, renderer: Renderer) -> Result<Response, AppError> {
    let snippets = state.snippets.latest().await?;
    Ok(renderer.render(
        Page::Home,
        TemplateData {
            snippets,
            ..Default::default()
        },
    ))
}

#[instrument(skip_all)]
pub async fn show_snippet(
    State(state): State<AppState>,
    renderer: Renderer,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = match id.parse::<i64>() {
        Ok(id) if id >= 1 => id,
        _ => return Err(AppError::NotFound),
    };

    let snippet = state.snippets.get(id).await?;
    Ok(renderer.render(
        Page::ShowSnippet,
        TemplateData {
            snippet: Some(snippet),
            ..Default::default()
        },
    ))
}

pub async fn create_snippet_form(renderer: Renderer) -> Response {
    renderer.render(Page::CreateSnippet, TemplateData::with_form(Form::empty()))
}

#[instrument(skip_all)]
pub async fn create_snippet(
    State(state): State<AppState>,
    session: Session,
    renderer: Renderer,
    PostedForm(mut form): PostedForm,
) -> Result<Response, AppError> {
    form.required(&["title", "content", "expires"]);
    form.max_length("title", 20);
    form.max_length("content", 500);
    form.permitted_values("expires", &EXPIRY_OPTIONS);

    if !form.valid() {
        return Ok(renderer.render(Page::CreateSnippet, TemplateData::with_form(form)));
    }

    let expires_days: i32 = form
        .get("expires")
        .parse()
        .map_err(|_| AppError::BadRequest)?;
    let id = state
        .snippets
        .insert(form.get("title"), form.get("content"), expires_days)
        .await?;

    info!(snippet_id = id, "snippet created");
    session.put_flash("Snippet successfully created!");
    Ok(Redirect::to(&format!("/snippet/{id}")).into_response())
}
