use super::{empty_string_as_none, FormErrors};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
}

/// Sign-up form. `password1`/`password2` are the password and its confirmation.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RegisterForm {
    #[serde(default)]
    #[validate(
        length(
            min = 1,
            max = 150,
            message = "Username is required and must be at most 150 characters."
        ),
        regex(
            path = "USERNAME_RE",
            message = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
        )
    )]
    pub username: String,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,

    #[serde(default)]
    pub password1: String,

    #[serde(default)]
    pub password2: String,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 150, message = "Full name must be at most 150 characters."))]
    pub full_name: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 150, message = "Store name must be at most 150 characters."))]
    pub store_name: Option<String>,
}

impl RegisterForm {
    /// Field checks that do not need the database or the password policy.
    pub fn check(&self) -> FormErrors {
        let mut errors = match self.validate() {
            Ok(()) => FormErrors::new(),
            Err(e) => FormErrors::from(e),
        };

        if self.password1.is_empty() {
            errors.add("password1", "This field is required.");
        }
        if self.password2.is_empty() {
            errors.add("password2", "This field is required.");
        } else if self.password1 != self.password2 {
            errors.add("password2", "The two password fields didn't match.");
        }

        errors
    }

    /// Submitted values safe to send back with an invalid form
    pub fn echo(&self) -> RegisterEcho {
        RegisterEcho {
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            store_name: self.store_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegisterEcho {
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub store_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl LoginForm {
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}
