use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::auth::{verify_jwt, Claims};
use crate::database::{RecordStore, StoreError};
use crate::error::ApiError;
use crate::models::user::{changed_password_after, role_of};
use crate::models::Role;

/// Authenticated user context resolved from a valid token
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
    pub issued_at: i64,
}

/// What `protect` needs to resolve a token into a live user
#[derive(Clone)]
pub struct AuthState {
    pub users: Arc<dyn RecordStore>,
    pub jwt_secret: Arc<str>,
    pub jwt_expiry_hours: u64,
}

impl AuthState {
    pub fn issue_token(&self, user_id: &str) -> Result<String, ApiError> {
        let claims = Claims::new(user_id, self.jwt_expiry_hours);
        Ok(crate::auth::generate_jwt(&claims, &self.jwt_secret)?)
    }
}

/// Rejects requests without a valid token for a user that still exists
/// and has not changed their password since the token was issued
pub async fn protect(State(auth): State<AuthState>, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = extract_token(request.headers()).ok_or_else(|| {
        tracing::warn!(uri = %request.uri(), "Request without token");
        ApiError::unauthorized("You are not logged in! Please log in to get access.")
    })?;

    let claims = verify_jwt(&token, &auth.jwt_secret).map_err(|e| {
        tracing::warn!("Token rejected: {}", e);
        ApiError::from(e)
    })?;

    let user = match auth.users.find_by_id(&claims.id).await {
        Ok(Some(user)) => user,
        Ok(None) | Err(StoreError::InvalidId(_)) => {
            tracing::warn!(user_id = %claims.id, "Token for missing user");
            return Err(ApiError::unauthorized("The user belonging to this token does no longer exist."));
        }
        Err(e) => return Err(e.into()),
    };

    if changed_password_after(&user, claims.iat) {
        return Err(ApiError::unauthorized("User recently changed password! Please log in again."));
    }

    request.extensions_mut().insert(AuthUser {
        id: claims.id,
        role: role_of(&user),
        issued_at: claims.iat,
    });

    Ok(next.run(request).await)
}

/// Only lets through users whose role is listed; must run after `protect`
pub async fn restrict_to(State(roles): State<&'static [Role]>, request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::unauthorized("You are not logged in! Please log in to get access."))?;

    if !roles.contains(&user.role) {
        tracing::warn!(user_id = %user.id, role = user.role.as_str(), "Role not permitted");
        return Err(ApiError::forbidden("You do not have permission to perform this action"));
    }

    Ok(next.run(request).await)
}

/// Bearer token from the Authorization header, falling back to the `jwt` cookie
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == "jwt" && !value.is_empty() && *value != "loggedout")
        .map(|(_, value)| value.to_string())
}
