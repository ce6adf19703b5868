pub mod auth;
pub mod context;
pub mod response;

pub use auth::{protect, restrict_to, AuthState, AuthUser};
pub use context::{request_context, RequestContext};
pub use response::{ApiResponse, ApiResult};
