use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::Value;

use crate::auth::password::verify_password;
use crate::database::UpdateOptions;
use crate::error::ApiError;
use crate::filter::{Document, FilterExpression, ID_FIELD};
use crate::handlers::factory::{json_body, require_object};
use crate::middleware::{ApiResponse, ApiResult, AuthState, RequestContext};

/// Fields a visitor may set when signing up
pub const SIGNUP_FIELDS: [&str; 5] = ["name", "email", "photo", "password", "passwordConfirm"];

fn render_user(auth: &AuthState, mut user: Document) -> Document {
    for field in auth.users.hidden_fields() {
        user.remove(*field);
    }
    user
}

fn string_field<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// `201 {status, token, data: {user}}`
pub async fn signup(
    State(auth): State<AuthState>,
    ctx: RequestContext,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let mut body = require_object(json_body(payload)?)?;
    body.retain(|k, _| SIGNUP_FIELDS.contains(&k.as_str()));

    let user = auth.users.create(body).await?;
    let id = user.get(ID_FIELD).and_then(Value::as_str).unwrap_or_default().to_string();
    let token = auth.issue_token(&id)?;

    tracing::info!(request_id = %ctx.request_id, user_id = %id, "User signed up");
    Ok(ApiResponse::created("user", render_user(&auth, user)).with_token(token))
}

/// `200 {status, token}`
pub async fn login(
    State(auth): State<AuthState>,
    ctx: RequestContext,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let body = require_object(json_body(payload)?)?;
    let (Some(email), Some(password)) = (string_field(&body, "email"), string_field(&body, "password")) else {
        return Err(ApiError::bad_request("Please provide email and password"));
    };

    let email = email.trim().to_lowercase();
    let user = auth
        .users
        .find_all(&FilterExpression::new().eq("email", email.as_str()))
        .await?
        .into_iter()
        .next();

    let authenticated = match &user {
        Some(user) => match string_field(user, "password") {
            Some(hash) => verify_password(password, hash)?,
            None => false,
        },
        None => false,
    };

    let Some(user) = user.filter(|_| authenticated) else {
        tracing::warn!(request_id = %ctx.request_id, "Failed login attempt");
        return Err(ApiError::unauthorized("Incorrect email or password"));
    };

    let id = user.get(ID_FIELD).and_then(Value::as_str).unwrap_or_default();
    let token = auth.issue_token(id)?;
    tracing::info!(request_id = %ctx.request_id, user_id = %id, "User logged in");
    Ok(ApiResponse::token(token))
}

/// Requires `passwordCurrent`, `password` and `passwordConfirm`; answers with a fresh token
pub async fn update_my_password(
    State(auth): State<AuthState>,
    ctx: RequestContext,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let caller = ctx
        .user
        .as_ref()
        .ok_or_else(|| ApiError::unauthorized("You are not logged in! Please log in to get access."))?;
    let body = require_object(json_body(payload)?)?;

    let user = auth
        .users
        .find_by_id(&caller.id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("The user belonging to this token does no longer exist."))?;

    let current = string_field(&body, "passwordCurrent")
        .ok_or_else(|| ApiError::bad_request("Please provide your current password"))?;
    let hash = string_field(&user, "password").unwrap_or_default();
    if !verify_password(current, hash)? {
        return Err(ApiError::unauthorized("Your current password is wrong."));
    }

    let mut patch = Document::new();
    for field in ["password", "passwordConfirm"] {
        patch.insert(field.to_string(), body.get(field).cloned().unwrap_or(Value::Null));
    }

    let updated = auth
        .users
        .find_by_id_and_update(&caller.id, patch, UpdateOptions::default())
        .await?
        .ok_or_else(|| ApiError::unauthorized("The user belonging to this token does no longer exist."))?;

    let token = auth.issue_token(&caller.id)?;
    tracing::info!(request_id = %ctx.request_id, user_id = %caller.id, "Password changed");
    Ok(ApiResponse::success("user", render_user(&auth, updated)).with_token(token))
}
