mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{TestApp, PASSWORD};

fn signup_body(email: &str) -> serde_json::Value {
    json!({
        "name": "Laura Wilson",
        "email": email,
        "password": PASSWORD,
        "passwordConfirm": PASSWORD
    })
}

#[tokio::test]
async fn signup_returns_token_and_hides_password() -> Result<()> {
    let app = TestApp::new();

    let mut body = signup_body("Laura@Example.com ");
    body["role"] = json!("admin");
    let (status, res) = app.post("/api/v1/users/signup", body, None).await?;

    assert_eq!(status, StatusCode::CREATED, "unexpected body: {}", res);
    assert_eq!(res["status"], "success");
    assert!(res["token"].as_str().is_some_and(|t| !t.is_empty()));

    let user = &res["data"]["user"];
    assert_eq!(user["email"], "laura@example.com");
    assert_eq!(user["role"], "user", "signup must not grant roles");
    assert!(user.get("password").is_none());
    assert!(user.get("passwordConfirm").is_none());
    assert!(user.get("active").is_none());
    Ok(())
}

#[tokio::test]
async fn signup_rejects_mismatched_confirmation() -> Result<()> {
    let app = TestApp::new();

    let mut body = signup_body("mismatch@example.com");
    body["passwordConfirm"] = json!("different1");
    let (status, res) = app.post("/api/v1/users/signup", body, None).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(res["status"], "fail");
    assert_eq!(res["code"], "VALIDATION_ERROR");
    assert!(res["message"].as_str().unwrap_or_default().contains("Passwords are not the same!"));
    Ok(())
}

#[tokio::test]
async fn duplicate_email_is_a_client_error() -> Result<()> {
    let app = TestApp::new();

    let (status, _) = app.post("/api/v1/users/signup", signup_body("dup@example.com"), None).await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, res) = app.post("/api/v1/users/signup", signup_body("dup@example.com"), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(res["message"].as_str().unwrap_or_default().starts_with("Duplicate field value"));
    Ok(())
}

#[tokio::test]
async fn login_checks_credentials() -> Result<()> {
    let app = TestApp::new();
    app.post("/api/v1/users/signup", signup_body("login@example.com"), None).await?;

    let (status, res) = app.post("/api/v1/users/login", json!({"email": "login@example.com"}), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(res["message"], "Please provide email and password");

    let (status, res) = app.login("login@example.com", "wrong-password").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(res["message"], "Incorrect email or password");

    let (status, res) = app.login("nobody@example.com", PASSWORD).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(res["message"], "Incorrect email or password");

    let (status, res) = app.login("LOGIN@example.com", PASSWORD).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(res["token"].is_string());
    assert!(res.get("data").is_none());
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() -> Result<()> {
    let app = TestApp::new();

    let (status, res) = app.get("/api/v1/users/me", None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(res["message"], "You are not logged in! Please log in to get access.");

    let (status, res) = app.get("/api/v1/users/me", Some("not-a-jwt")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(res["message"], "Invalid token. Please log in again!");
    Ok(())
}

#[tokio::test]
async fn roles_are_enforced() -> Result<()> {
    let app = TestApp::new();
    let (_, user_token) = app.user_with_role("plain@example.com", "user").await?;
    let (_, admin_token) = app.user_with_role("admin@example.com", "admin").await?;

    let (status, res) = app.get("/api/v1/users", Some(&user_token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(res["message"], "You do not have permission to perform this action");

    let (status, res) = app.get("/api/v1/users", Some(&admin_token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["results"], 2);
    Ok(())
}

#[tokio::test]
async fn me_update_and_soft_delete() -> Result<()> {
    let app = TestApp::new();
    let (id, token) = app.user_with_role("me@example.com", "user").await?;

    let (status, res) = app.get("/api/v1/users/me", Some(&token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["data"]["user"]["id"], id.as_str());

    let (status, res) = app
        .patch("/api/v1/users/updateMe", json!({"password": "newpass123"}), Some(&token))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        res["message"],
        "This route is not for password updates. Please use /updateMyPassword."
    );

    let (status, res) = app
        .patch("/api/v1/users/updateMe", json!({"name": "Renamed", "role": "admin"}), Some(&token))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["data"]["user"]["name"], "Renamed");
    assert_eq!(res["data"]["user"]["role"], "user");

    let (status, res) = app.delete("/api/v1/users/deleteMe", Some(&token)).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(res.is_null());

    let (status, _) = app.login("me@example.com", common::PASSWORD).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/v1/users/me", Some(&token)).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn update_my_password_rotates_credentials() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.user_with_role("rotate@example.com", "user").await?;

    let (status, res) = app
        .patch(
            "/api/v1/users/updateMyPassword",
            json!({"passwordCurrent": "wrong-pass", "password": "newpass123", "passwordConfirm": "newpass123"}),
            Some(&token),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(res["message"], "Your current password is wrong.");

    let (status, res) = app
        .patch(
            "/api/v1/users/updateMyPassword",
            json!({"passwordCurrent": PASSWORD, "password": "newpass123", "passwordConfirm": "newpass123"}),
            Some(&token),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "unexpected body: {}", res);
    assert!(res["token"].is_string());
    assert!(res["data"]["user"].get("password").is_none());

    let (status, _) = app.login("rotate@example.com", PASSWORD).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.login("rotate@example.com", "newpass123").await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}
