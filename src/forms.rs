use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::{FromRequest, Request};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::error::AppError;

lazy_static! {
    pub static ref EMAIL_RX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    )
    .unwrap();
}

/// Validation messages keyed by form field.
#[derive(Debug, Clone, Default)]
pub struct FormErrors(HashMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// First message recorded for `field`.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(|msgs| msgs.first())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Submitted form values plus the errors found while validating them.
#[derive(Debug, Clone, Default)]
pub struct Form {
    values: HashMap<String, String>,
    pub errors: FormErrors,
}

impl Form {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self {
            values,
            errors: FormErrors::default(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> &str {
        self.values.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn required(&mut self, fields: &[&str]) {
        for field in fields {
            if self.get(field).trim().is_empty() {
                self.errors.add(field, "This field cannot be blank");
            }
        }
    }

    pub fn max_length(&mut self, field: &str, max: usize) {
        let value = self.get(field);
        if value.is_empty() {
            return;
        }
        if value.chars().count() > max {
            self.errors.add(
                field,
                format!("This field is too long (maximum is {max} characters)"),
            );
        }
    }

    pub fn min_length(&mut self, field: &str, min: usize) {
        let value = self.get(field);
        if value.is_empty() {
            return;
        }
        if value.chars().count() < min {
            self.errors.add(
                field,
                format!("This field is too short (minimum is {min} characters)"),
            );
        }
    }

    pub fn permitted_values(&mut self, field: &str, opts: &[&str]) {
        let value = self.get(field);
        if value.is_empty() {
            return;
        }
        if !opts.contains(&value) {
            self.errors.add(field, "This field is invalid");
        }
    }

    pub fn matches_pattern(&mut self, field: &str, pattern: &Regex) {
        let value = self.get(field);
        if value.is_empty() {
            return;
        }
        if !pattern.is_match(value) {
            self.errors.add(field, "This field is invalid");
        }
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// URL-encoded request body as a [`Form`]. Unparseable or oversized bodies
/// are rejected with 400.
pub struct PostedForm(pub Form);

#[async_trait]
impl<S> FromRequest<S> for PostedForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Form(values) =
            axum::Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| {
                    warn!(error = %e, "form body rejected");
                    AppError::BadRequest
                })?;
        Ok(PostedForm(Form::new(values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> Form {
        Form::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn required_flags_blank_and_missing_fields() {
        let mut f = form(&[("title", "   "), ("content", "hello")]);
        f.required(&["title", "content", "expires"]);
        assert!(!f.valid());
        assert_eq!(f.errors.get("title"), Some("This field cannot be blank"));
        assert_eq!(f.errors.get("expires"), Some("This field cannot be blank"));
        assert_eq!(f.errors.get("content"), None);
    }

    #[test]
    fn max_length_counts_characters_not_bytes() {
        let mut f = form(&[("title", "ééééé")]);
        f.max_length("title", 5);
        assert!(f.valid());

        f.max_length("title", 4);
        assert_eq!(
            f.errors.get("title"),
            Some("This field is too long (maximum is 4 characters)")
        );
    }

    #[test]
    fn min_length_skips_empty_values() {
        let mut f = form(&[("password", "")]);
        f.min_length("password", 10);
        assert!(f.valid());

        let mut f = form(&[("password", "short")]);
        f.min_length("password", 10);
        assert_eq!(
            f.errors.get("password"),
            Some("This field is too short (minimum is 10 characters)")
        );
    }

    #[test]
    fn permitted_values_rejects_unknown_option() {
        let mut f = form(&[("expires", "30")]);
        f.permitted_values("expires", &["365", "7", "1"]);
        assert_eq!(f.errors.get("expires"), Some("This field is invalid"));

        let mut f = form(&[("expires", "7")]);
        f.permitted_values("expires", &["365", "7", "1"]);
        assert!(f.valid());
    }

    #[test]
    fn email_pattern() {
        let mut f = form(&[("email", "alice@example.com")]);
        f.matches_pattern("email", &EMAIL_RX);
        assert!(f.valid());

        let mut f = form(&[("email", "not-an-email")]);
        f.matches_pattern("email", &EMAIL_RX);
        assert_eq!(f.errors.get("email"), Some("This field is invalid"));
    }

    #[test]
    fn errors_keep_first_message() {
        let mut errors = FormErrors::default();
        errors.add("email", "first");
        errors.add("email", "second");
        assert_eq!(errors.get("email"), Some("first"));
    }
}
