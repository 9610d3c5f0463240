//! Caller identity as forwarded by the API gateway.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use super::error::ApiError;
use crate::{
    error::{Result, ServiceError},
    session::Role,
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: u64,
    pub role: Role,
}

impl CurrentUser {
    pub fn require_author(&self) -> Result<()> {
        if self.role.can_author() {
            Ok(())
        } else {
            Err(ServiceError::forbidden(format!(
                "role {} cannot manage tours",
                self.role
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let id = header(USER_ID_HEADER)
            .and_then(|raw| raw.parse::<u64>().ok())
            .ok_or(ServiceError::Unauthenticated)?;
        let role = match header(USER_ROLE_HEADER) {
            Some(raw) => raw.parse::<Role>().map_err(|_| ServiceError::Unauthenticated)?,
            None => Role::default(),
        };

        Ok(Self { id, role })
    }
}
