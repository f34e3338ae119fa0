// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::debug;

use crate::AppState;
use crate::handlers::AppError;

/// Token claims. The auth frontend puts the user id in `userId`; plain
/// JWT issuers use `sub`. Either is accepted.
#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default, rename = "userId")]
    user_id: Option<String>,
}

/// The authenticated user id, extracted from `Authorization: Bearer <jwt>`.
///
/// Rejects with 401 when the header is missing, the signature is invalid,
/// the token is expired, or no user identifier claim is present.
pub struct AuthUser(pub String);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let token = match header {
            Some(h) if h.starts_with("Bearer ") => h.trim_start_matches("Bearer ").trim(),
            _ => {
                return Err(AppError::unauthorized(
                    "Missing or invalid authorization header",
                ));
            }
        };

        let key = DecodingKey::from_secret(state.config.auth_secret.as_bytes());
        let data = decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                debug!("Rejected bearer token: {}", e);
                AppError::unauthorized("Invalid or expired token")
            })?;

        let user_id = data
            .claims
            .user_id
            .or(data.claims.sub)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::unauthorized("Token missing user identifier"))?;

        Ok(AuthUser(user_id))
    }
}

/// Guards `/api/{user_id}/...` routes: the path owner must be the
/// authenticated user.
pub fn require_user_match(auth: &AuthUser, path_user_id: &str) -> Result<(), AppError> {
    if auth.0 != path_user_id {
        return Err(AppError::forbidden(
            "User ID in path does not match authenticated user",
        ));
    }
    Ok(())
}
