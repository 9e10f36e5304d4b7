use crate::models::{CreatePoll, UpdatePoll};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_POLL_OPTIONS: usize = 2;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Emails are compared and sent lower-cased and trimmed.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Per-field validation errors. A form with any of these is never submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|error| error.field == field)
            .map(|error| error.message.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self
            .0
            .iter()
            .map(|error| format!("{}: {}", error.field, error.message))
            .collect();
        f.write_str(&lines.join("\n"))
    }
}

impl std::error::Error for FieldErrors {}

#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();

        if self.email.trim().is_empty() {
            errors.push("email", "Email is required");
        } else if !is_valid_email(self.email.trim()) {
            errors.push("email", "Please enter a valid email address");
        }

        if self.password.is_empty() {
            errors.push("password", "Password is required");
        } else if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push("password", format!("Password must be at least {} characters", MIN_PASSWORD_LEN));
        }

        if self.confirm_password.is_empty() {
            errors.push("confirmPassword", "Please confirm your password");
        } else if self.password != self.confirm_password {
            errors.push("confirmPassword", "Passwords do not match");
        }

        errors.into_result(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        if self.email.trim().is_empty() {
            errors.push("email", "Email is required");
        }
        if self.password.is_empty() {
            errors.push("password", "Password is required");
        }
        errors.into_result(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfirmForm {
    pub email: String,
    pub code: String,
}

impl ConfirmForm {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        if self.email.trim().is_empty() {
            errors.push("email", "Email is required");
        }
        if self.code.trim().is_empty() {
            errors.push("code", "Please enter the confirmation code");
        }
        errors.into_result(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PollForm {
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
}

impl PollForm {
    /// Blank options are dropped; a blank description is left out of the request.
    pub fn validate(&self) -> Result<CreatePoll, FieldErrors> {
        let mut errors = FieldErrors::default();

        let title = self.title.trim();
        if title.is_empty() {
            errors.push("title", "Poll title is required");
        }

        let options: Vec<String> = self
            .options
            .iter()
            .map(|option| option.trim())
            .filter(|option| !option.is_empty())
            .map(str::to_string)
            .collect();
        if options.len() < MIN_POLL_OPTIONS {
            errors.push("options", format!("Add at least {} options", MIN_POLL_OPTIONS));
        }

        let description = self.description.trim();
        errors.into_result(CreatePoll {
            title: title.to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            options,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct EditPollForm {
    pub title: String,
    pub description: String,
}

impl EditPollForm {
    pub fn validate(&self) -> Result<UpdatePoll, FieldErrors> {
        let mut errors = FieldErrors::default();
        let title = self.title.trim();
        if title.is_empty() {
            errors.push("title", "Poll title is required");
        }

        errors.into_result(UpdatePoll {
            title: Some(title.to_string()),
            description: Some(self.description.clone()),
            options: None,
        })
    }
}
