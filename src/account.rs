//! Sign-up validation and the per-user profile document.
//!
//! Credentials themselves belong to the identity provider; this module only
//! checks the form and records `users/{uid}` once the provider has issued the
//! user id.

use crate::store::{Document, DocumentStore, StoreError, document_path};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::info;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("password must be at least {} characters", MIN_PASSWORD_LEN)]
    PasswordTooShort,
    #[error("invalid email address")]
    InvalidEmail,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignupForm {
    pub fn validate(&self) -> Result<(), AccountError> {
        if self.password != self.confirm_password {
            return Err(AccountError::PasswordMismatch);
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::PasswordTooShort);
        }
        let email = self.email.trim();
        let valid_email = email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.contains('@')
        });
        if !valid_email {
            return Err(AccountError::InvalidEmail);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub created_at: String,
}

/// Validates `form` and writes the profile document. Nothing is stored when
/// validation fails.
pub async fn initialize_profile<S: DocumentStore>(
    store: &S,
    user_id: &str,
    form: &SignupForm,
) -> Result<UserProfile, AccountError> {
    form.validate()?;

    let profile = UserProfile {
        user_id: user_id.to_string(),
        email: form.email.trim().to_string(),
        created_at: Utc::now().to_rfc3339(),
    };
    let mut document = Document::new();
    document.insert("email".into(), json!(profile.email));
    document.insert("createdAt".into(), json!(profile.created_at));
    store.set(&document_path(&["users", user_id])?, document).await?;

    info!(user_id, "profile initialized");
    Ok(profile)
}
