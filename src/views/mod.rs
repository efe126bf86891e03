//! Server-side HTML rendering with compiled askama templates.

mod pages;

use std::borrow::Borrow;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{Html, IntoResponse, Response},
};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};

use crate::{
    auth::{middleware::CurrentUser, repo_types::User},
    error::AppError,
    forms::Form,
    session::Session,
    snippets::repo_types::Snippet,
};

const HUMAN_DATE: &[FormatItem<'static>] =
    format_description!("[day] [month repr:short] [year] at [hour]:[minute]");

/// `02 Jan 2006 at 15:04`, always in UTC.
pub fn human_date(t: impl Borrow<OffsetDateTime>) -> String {
    t.borrow()
        .to_offset(time::UtcOffset::UTC)
        .format(HUMAN_DATE)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Home,
    ShowSnippet,
    CreateSnippet,
    Signup,
    Login,
    Profile,
    ChangePassword,
    PasswordReset,
    NewPassword,
}

/// Everything a page may display. The csrf token, flash and nav state are
/// filled in by [`Renderer::render`].
#[derive(Debug, Default)]
pub struct TemplateData {
    pub csrf_token: String,
    pub current_year: i32,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    pub form: Option<Form>,
    pub snippet: Option<Snippet>,
    pub snippets: Vec<Snippet>,
    pub user: Option<User>,
    pub reset_token: Option<String>,
}

impl TemplateData {
    pub fn with_form(form: Form) -> Self {
        Self {
            form: Some(form),
            ..Default::default()
        }
    }
}

/// Renders pages for the current request.
pub struct Renderer {
    session: Session,
    is_authenticated: bool,
}

impl Renderer {
    pub fn render(&self, page: Page, mut data: TemplateData) -> Response {
        data.csrf_token = self.session.csrf_token();
        data.current_year = OffsetDateTime::now_utc().year();
        data.flash = self.session.pop_flash();
        data.is_authenticated = self.is_authenticated;

        match pages::render(page, &data) {
            Ok(html) => Html(html).into_response(),
            Err(e) => e.into_response(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Renderer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        let is_authenticated = parts
            .extensions
            .get::<CurrentUser>()
            .is_some_and(|current| current.0.is_some());
        Ok(Renderer {
            session,
            is_authenticated,
        })
    }
}
