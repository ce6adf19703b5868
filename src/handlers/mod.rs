// handlers/mod.rs - request handlers per resource
//
// factory: the generic list/create/read/update/delete handlers every resource uses
// tours, reviews, users: resource-specific extras around the factory
// auth: signup, login and password changes
pub mod auth;
pub mod factory;
pub mod reviews;
pub mod tours;
pub mod users;

use axum::{extract::State, http::Uri, response::IntoResponse, Json};
use serde_json::json;

use crate::error::ApiError;
use crate::routes::AppState;

/// Liveness plus a ping of every record store
pub async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    for store in [state.tours.store(), state.users.store(), state.reviews.store()] {
        if let Err(e) = store.ping().await {
            tracing::error!(collection = store.collection(), "Health check failed: {}", e);
            return Err(ApiError::service_unavailable("Database temporarily unavailable"));
        }
    }

    Ok(Json(json!({
        "status": "success",
        "data": {
            "status": "ok",
            "timestamp": chrono::Utc::now(),
            "database": "ok"
        }
    })))
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("Can't find {} on this server!", uri))
}
