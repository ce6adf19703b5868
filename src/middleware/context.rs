use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::middleware::auth::AuthUser;

/// Per-request facts handed to every handler
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub request_time: DateTime<Utc>,
    pub user: Option<AuthUser>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            request_time: Utc::now(),
            user: None,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Stamp each request with an id and arrival time
pub async fn request_context(mut request: Request, next: Next) -> Response {
    let ctx = RequestContext::new();
    tracing::debug!(
        request_id = %ctx.request_id,
        method = %request.method(),
        uri = %request.uri(),
        "Request received"
    );
    request.extensions_mut().insert(ctx);
    next.run(request).await
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let mut ctx = parts.extensions.get::<RequestContext>().cloned().unwrap_or_default();
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            ctx.user = Some(user.clone());
        }
        Ok(ctx)
    }
}
