use askama::Template;

use super::{Page, TemplateData};
use crate::{
    auth::repo_types::User, error::AppError, forms::Form, snippets::repo_types::Snippet,
};

// Every page extends `base.html`, which reads the shared fields from `d`.

#[derive(Template)]
#[template(path = "home.html")]
struct HomePage<'a> {
    d: &'a TemplateData,
}

#[derive(Template)]
#[template(path = "show.html")]
struct ShowSnippetPage<'a> {
    d: &'a TemplateData,
    snippet: &'a Snippet,
}

#[derive(Template)]
#[template(path = "create.html")]
struct CreateSnippetPage<'a> {
    d: &'a TemplateData,
    form: &'a Form,
    expires: &'a str,
}

#[derive(Template)]
#[template(path = "signup.html")]
struct SignupPage<'a> {
    d: &'a TemplateData,
    form: &'a Form,
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginPage<'a> {
    d: &'a TemplateData,
    form: &'a Form,
}

#[derive(Template)]
#[template(path = "profile.html")]
struct ProfilePage<'a> {
    d: &'a TemplateData,
    user: &'a User,
}

#[derive(Template)]
#[template(path = "change_password.html")]
struct ChangePasswordPage<'a> {
    d: &'a TemplateData,
    form: &'a Form,
}

#[derive(Template)]
#[template(path = "password_reset.html")]
struct PasswordResetPage<'a> {
    d: &'a TemplateData,
    form: &'a Form,
}

#[derive(Template)]
#[template(path = "new_password.html")]
struct NewPasswordPage<'a> {
    d: &'a TemplateData,
    form: &'a Form,
    token: &'a str,
}

/// Full HTML document for `page`.
pub(super) fn render(page: Page, data: &TemplateData) -> Result<String, AppError> {
    let form = data.form.clone().unwrap_or_default();
    let form = &form;
    let d = data;

    let html = match page {
        Page::Home => HomePage { d }.render(),
        Page::ShowSnippet => {
            let snippet = data.snippet.as_ref().ok_or(AppError::NotFound)?;
            ShowSnippetPage { d, snippet }.render()
        }
        Page::CreateSnippet => {
            let expires = match form.get("expires") {
                "" => "365",
                other => other,
            };
            CreateSnippetPage { d, form, expires }.render()
        }
        Page::Signup => SignupPage { d, form }.render(),
        Page::Login => LoginPage { d, form }.render(),
        Page::Profile => {
            let user = data.user.as_ref().ok_or(AppError::NotFound)?;
            ProfilePage { d, user }.render()
        }
        Page::ChangePassword => ChangePasswordPage { d, form }.render(),
        Page::PasswordReset => PasswordResetPage { d, form }.render(),
        Page::NewPassword => {
            let token = data.reset_token.as_deref().unwrap_or_default();
            NewPasswordPage { d, form, token }.render()
        }
    };
    html.map_err(AppError::internal)
}
