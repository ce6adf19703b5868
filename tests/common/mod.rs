#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use tourbook_api::config::AppConfig;
use tourbook_api::filter::Document;
use tourbook_api::routes::{self, AppState, Stores};

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const PASSWORD: &str = "test1234";

/// The full router over fresh in-memory stores
pub struct TestApp {
    pub router: Router,
    pub stores: Stores,
}

impl TestApp {
    pub fn new() -> Self {
        let mut config = AppConfig::development();
        config.security.jwt_secret = TEST_SECRET.to_string();

        let stores = Stores::memory();
        let router = routes::app(AppState::new(stores.clone(), &config));
        Self { router, stores }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json)?)
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body)?).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).with_context(|| format!("non-JSON body from {}", uri))?
        };
        Ok((status, json))
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.request(Method::GET, uri, None, token).await
    }

    pub async fn post(&self, uri: &str, body: Value, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.request(Method::POST, uri, Some(body), token).await
    }

    pub async fn patch(&self, uri: &str, body: Value, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.request(Method::PATCH, uri, Some(body), token).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.request(Method::DELETE, uri, None, token).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(StatusCode, Value)> {
        self.post("/api/v1/users/login", json!({"email": email, "password": password}), None)
            .await
    }

    /// Insert a user with any role straight into the store, then log in
    pub async fn user_with_role(&self, email: &str, role: &str) -> Result<(String, String)> {
        let user = self
            .stores
            .users
            .create(object(json!({
                "name": format!("Test {}", role),
                "email": email,
                "role": role,
                "password": PASSWORD,
                "passwordConfirm": PASSWORD
            })))
            .await?;
        let id = user["id"].as_str().context("user without id")?.to_string();

        let (status, body) = self.login(email, PASSWORD).await?;
        anyhow::ensure!(status == StatusCode::OK, "login failed: {} {}", status, body);
        let token = body["token"].as_str().context("login without token")?.to_string();
        Ok((id, token))
    }

    /// Insert a tour straight into the store
    pub async fn seed_tour(&self, name: &str, price: u32, difficulty: &str, rating: f64) -> Result<String> {
        let tour = self.stores.tours.create(tour_body(name, price, difficulty, rating)).await?;
        Ok(tour["id"].as_str().context("tour without id")?.to_string())
    }
}

pub fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

pub fn tour_body(name: &str, price: u32, difficulty: &str, rating: f64) -> Document {
    object(json!({
        "name": name,
        "duration": 7,
        "maxGroupSize": 10,
        "difficulty": difficulty,
        "price": price,
        "ratingsAverage": rating,
        "summary": format!("{} summary", name),
        "imageCover": "tour-cover.jpg",
        "startDates": ["2021-04-25T09:00:00.000Z", "2021-07-20T09:00:00.000Z"],
        "startLocation": {"type": "Point", "coordinates": [-115.570154, 51.178456]}
    }))
}
