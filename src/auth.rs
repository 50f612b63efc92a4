use crate::errors::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Header carrying the identity provider's opaque user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller. Requests without a user id are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty() && !value.contains('/'))
            .ok_or_else(|| AppError::unauthorized("not authenticated"))?;
        Ok(Self(user_id.to_string()))
    }
}
