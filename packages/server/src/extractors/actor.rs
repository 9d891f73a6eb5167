use axum::{extract::FromRequestParts, http::request::Parts};

use crate::auth::Actor;
use crate::error::AppError;
use crate::state::AppState;

/// Actor extracted from the `Authorization: Bearer <token>` header.
///
/// Tokens are configured under `[admin]`; what the actor may do is decided
/// per-resource by the injected `Authorizer`, never here.
impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::TokenMissing)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AppError::TokenInvalid)?;

        let entry = state
            .config
            .admin
            .tokens
            .iter()
            .find(|t| t.token == token)
            .ok_or(AppError::TokenInvalid)?;

        Ok(Actor {
            name: entry.name.clone(),
            role: entry.role.clone(),
        })
    }
}
