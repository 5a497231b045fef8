use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::PublicUser;
use crate::error::ApiError;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Request body for registration. Missing fields deserialize as empty and
/// are rejected by [`RegisterRequest::validate`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub user_name: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(mut self) -> Result<Self, ApiError> {
        self.user_name = self.user_name.trim().to_string();
        self.email = normalize_email(&self.email);
        if self.user_name.is_empty() || self.email.is_empty() || self.password.is_empty() {
            return Err(ApiError::Validation("All fields are required".into()));
        }
        if !is_valid_email(&self.email) {
            return Err(ApiError::Validation("Invalid email".into()));
        }
        Ok(self)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(mut self) -> Result<Self, ApiError> {
        self.email = normalize_email(&self.email);
        if self.email.is_empty() || self.password.is_empty() {
            return Err(ApiError::Validation("Email and password are required".into()));
        }
        Ok(self)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(self) -> Result<Self, ApiError> {
        if self.current_password.is_empty() || self.new_password.is_empty() {
            return Err(ApiError::Validation(
                "Current and new password are required".into(),
            ));
        }
        Ok(self)
    }
}

/// Text fields of the multipart profile update. A client-supplied
/// `profilePic` is never read; the picture only changes through an upload.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(mut self) -> Result<Self, ApiError> {
        if let Some(name) = self.user_name.as_mut() {
            *name = name.trim().to_string();
            if name.is_empty() {
                return Err(ApiError::Validation("User name cannot be empty".into()));
            }
        }
        if let Some(email) = self.email.as_mut() {
            *email = normalize_email(email);
            if !is_valid_email(email) {
                return Err(ApiError::Validation("Invalid email".into()));
            }
        }
        Ok(self)
    }
}

#[derive(Debug, Serialize)]
pub struct UserData {
    pub user: PublicUser,
}
