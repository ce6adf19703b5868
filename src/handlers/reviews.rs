use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, RawQuery, State},
    Json,
};
use serde_json::Value;

use crate::error::ApiError;
use crate::filter::FilterExpression;
use crate::handlers::factory::{json_body, raw_params, require_object, CrudHandlers};
use crate::middleware::{ApiResult, RequestContext};

/// Reviews of one tour: `GET /tours/:id/reviews`
pub async fn list_for_tour(
    State(h): State<Arc<CrudHandlers>>,
    ctx: RequestContext,
    Path(tour_id): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResult {
    h.list(&ctx, &raw_params(query), FilterExpression::new().eq("tour", tour_id)).await
}

pub async fn create(
    State(h): State<Arc<CrudHandlers>>,
    ctx: RequestContext,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let body = set_tour_user_ids(json_body(payload)?, None, &ctx)?;
    h.create(&ctx, body).await
}

/// `POST /tours/:id/reviews`
pub async fn create_for_tour(
    State(h): State<Arc<CrudHandlers>>,
    ctx: RequestContext,
    Path(tour_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let body = set_tour_user_ids(json_body(payload)?, Some(tour_id), &ctx)?;
    h.create(&ctx, body).await
}

/// Fill `tour` from the route and `user` from the caller unless the body names them
fn set_tour_user_ids(body: Value, tour_id: Option<String>, ctx: &RequestContext) -> Result<Value, ApiError> {
    let mut doc = require_object(body)?;

    if let Some(tour_id) = tour_id {
        if doc.get("tour").map_or(true, Value::is_null) {
            doc.insert("tour".to_string(), Value::String(tour_id));
        }
    }
    if let Some(user) = &ctx.user {
        if doc.get("user").map_or(true, Value::is_null) {
            doc.insert("user".to_string(), Value::String(user.id.clone()));
        }
    }

    Ok(Value::Object(doc))
}
