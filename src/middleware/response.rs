use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{Map, Value};

/// Success envelope: `{status: "success", results?, token?, data?: {<key>: payload}}`
#[derive(Debug)]
pub struct ApiResponse {
    pub status_code: StatusCode,
    pub results: Option<usize>,
    pub token: Option<String>,
    pub data: Option<Map<String, Value>>,
}

impl ApiResponse {
    /// 200 OK with `data: {key: payload}`
    pub fn success(key: &str, payload: impl Into<Value>) -> Self {
        let mut data = Map::new();
        data.insert(key.to_string(), payload.into());
        Self {
            status_code: StatusCode::OK,
            results: None,
            token: None,
            data: Some(data),
        }
    }

    /// 200 OK with a result count alongside the items
    pub fn list<T: Into<Value>>(key: &str, items: Vec<T>) -> Self {
        let results = items.len();
        Self::success(key, items).with_results(results)
    }

    /// Create a 201 Created response
    pub fn created(key: &str, payload: impl Into<Value>) -> Self {
        Self::success(key, payload).with_status(StatusCode::CREATED)
    }

    /// Create a 204 No Content response
    pub fn no_content() -> Self {
        Self {
            status_code: StatusCode::NO_CONTENT,
            results: None,
            token: None,
            data: None,
        }
    }

    /// Token-only body, e.g. after login
    pub fn token(token: String) -> Self {
        Self {
            status_code: StatusCode::OK,
            results: None,
            token: Some(token),
            data: None,
        }
    }

    pub fn with_status(mut self, status_code: StatusCode) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_results(mut self, results: usize) -> Self {
        self.results = Some(results);
        self
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    pub fn to_json(&self) -> Value {
        let mut envelope = Map::new();
        envelope.insert("status".to_string(), Value::from("success"));
        if let Some(results) = self.results {
            envelope.insert("results".to_string(), Value::from(results));
        }
        if let Some(token) = &self.token {
            envelope.insert("token".to_string(), Value::from(token.as_str()));
        }
        if let Some(data) = &self.data {
            envelope.insert("data".to_string(), Value::Object(data.clone()));
        }
        Value::Object(envelope)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        // For 204 No Content, return empty response
        if self.status_code == StatusCode::NO_CONTENT {
            return self.status_code.into_response();
        }

        (self.status_code, Json(self.to_json())).into_response()
    }
}

pub type ApiResult = Result<ApiResponse, crate::error::ApiError>;
