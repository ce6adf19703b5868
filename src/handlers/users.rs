use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::Value;

use crate::database::UpdateOptions;
use crate::error::ApiError;
use crate::filter::Document;
use crate::handlers::factory::{json_body, require_object, CrudHandlers};
use crate::middleware::{ApiResponse, ApiResult, AuthUser, RequestContext};

/// Profile fields a user may change on themselves
pub const SELF_EDITABLE: [&str; 3] = ["name", "email", "photo"];

fn current_user(ctx: &RequestContext) -> Result<&AuthUser, ApiError> {
    ctx.user
        .as_ref()
        .ok_or_else(|| ApiError::unauthorized("You are not logged in! Please log in to get access."))
}

pub async fn get_me(State(h): State<Arc<CrudHandlers>>, ctx: RequestContext) -> ApiResult {
    let id = current_user(&ctx)?.id.clone();
    h.read(&ctx, &id).await
}

pub async fn update_me(
    State(h): State<Arc<CrudHandlers>>,
    ctx: RequestContext,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let user = current_user(&ctx)?;
    let body = require_object(json_body(payload)?)?;

    if body.contains_key("password") || body.contains_key("passwordConfirm") {
        return Err(ApiError::bad_request(
            "This route is not for password updates. Please use /updateMyPassword.",
        ));
    }

    let patch = filter_fields(body, &SELF_EDITABLE);
    let updated = h
        .store()
        .find_by_id_and_update(&user.id, patch, UpdateOptions::default())
        .await?
        .ok_or_else(|| ApiError::not_found("No user found with that ID"))?;

    Ok(ApiResponse::success("user", h.render(updated)))
}

/// Soft delete: the account stays stored but is filtered out of every find
pub async fn delete_me(State(h): State<Arc<CrudHandlers>>, ctx: RequestContext) -> ApiResult {
    let user = current_user(&ctx)?;
    let mut patch = Document::new();
    patch.insert("active".to_string(), Value::Bool(false));

    h.store()
        .find_by_id_and_update(&user.id, patch, UpdateOptions { return_updated: false, run_validators: false })
        .await?
        .ok_or_else(|| ApiError::not_found("No user found with that ID"))?;

    tracing::info!(request_id = %ctx.request_id, user_id = %user.id, "User deactivated");
    Ok(ApiResponse::no_content())
}

fn filter_fields(mut doc: Document, allowed: &[&str]) -> Document {
    doc.retain(|k, _| allowed.contains(&k.as_str()));
    doc
}
