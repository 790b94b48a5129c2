//! Caller identity.
//!
//! Sessions live in an outer layer; it forwards the authenticated user id in
//! the `x-user-id` header.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;

use crate::error::ApiError;

pub const USER_HEADER: &str = "x-user-id";

/// The caller's user id, if the request carries a valid one.
#[derive(Debug, Clone, Copy)]
pub struct MaybeUser(pub Option<UserId>);

impl MaybeUser {
    /// Returns the user id or rejects the request as unauthenticated.
    pub fn require(self) -> Result<UserId, ApiError> {
        self.0.ok_or(ApiError::NotAuthenticated)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<UserId>().ok());
        Ok(MaybeUser(user_id))
    }
}
