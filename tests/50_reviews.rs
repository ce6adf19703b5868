mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn nested_review_takes_tour_and_user_from_context() -> Result<()> {
    let app = TestApp::new();
    let tour_id = app.seed_tour("The Forest Hiker", 397, "easy", 4.7).await?;
    let (user_id, token) = app.user_with_role("reviewer@example.com", "user").await?;

    let (status, res) = app
        .post(
            &format!("/api/v1/tours/{}/reviews", tour_id),
            json!({"review": "  Amazing trip!  ", "rating": 5}),
            Some(&token),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {}", res);

    let review = &res["data"]["review"];
    assert_eq!(review["tour"], tour_id.as_str());
    assert_eq!(review["user"], user_id.as_str());
    assert_eq!(review["review"], "Amazing trip!");
    assert!(review["createdAt"].is_string());
    Ok(())
}

#[tokio::test]
async fn nested_list_only_shows_that_tour() -> Result<()> {
    let app = TestApp::new();
    let hiker = app.seed_tour("The Forest Hiker", 397, "easy", 4.7).await?;
    let explorer = app.seed_tour("The Sea Explorer", 497, "medium", 4.8).await?;
    let (_, token) = app.user_with_role("reviewer@example.com", "user").await?;

    for (tour, text) in [(&hiker, "Great"), (&hiker, "Lovely"), (&explorer, "Wet")] {
        let (status, _) = app
            .post(
                &format!("/api/v1/tours/{}/reviews", tour),
                json!({"review": text, "rating": 4}),
                Some(&token),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, res) = app.get(&format!("/api/v1/tours/{}/reviews", hiker), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["results"], 2);

    let (status, res) = app.get("/api/v1/reviews?rating=4", Some(&token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["results"], 3);

    let (_, res) = app.get(&format!("/api/v1/tours/{}", hiker), None).await?;
    assert_eq!(res["data"]["tour"]["reviews"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test]
async fn only_plain_users_write_reviews() -> Result<()> {
    let app = TestApp::new();
    let tour_id = app.seed_tour("The Forest Hiker", 397, "easy", 4.7).await?;
    let uri = format!("/api/v1/tours/{}/reviews", tour_id);
    let body = json!({"review": "Nice", "rating": 4});

    let (status, _) = app.post(&uri, body.clone(), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, admin) = app.user_with_role("admin@example.com", "admin").await?;
    let (status, _) = app.post(&uri, body, Some(&admin)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/api/v1/reviews", None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn rating_must_be_in_range() -> Result<()> {
    let app = TestApp::new();
    let tour_id = app.seed_tour("The Forest Hiker", 397, "easy", 4.7).await?;
    let (_, token) = app.user_with_role("reviewer@example.com", "user").await?;

    let (status, res) = app
        .post(
            &format!("/api/v1/tours/{}/reviews", tour_id),
            json!({"review": "Too good", "rating": 6}),
            Some(&token),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(res["field_errors"].get("rating").is_some());
    Ok(())
}

#[tokio::test]
async fn review_read_populates_author() -> Result<()> {
    let app = TestApp::new();
    let tour_id = app.seed_tour("The Forest Hiker", 397, "easy", 4.7).await?;
    let (user_id, token) = app.user_with_role("author@example.com", "user").await?;

    let (_, res) = app
        .post(
            &format!("/api/v1/tours/{}/reviews", tour_id),
            json!({"review": "Fine", "rating": 3}),
            Some(&token),
        )
        .await?;
    let review_id = res["data"]["review"]["id"].as_str().unwrap_or_default().to_string();

    let (status, res) = app.get(&format!("/api/v1/reviews/{}", review_id), Some(&token)).await?;
    assert_eq!(status, StatusCode::OK);
    let author = &res["data"]["review"]["user"];
    assert_eq!(author["id"], user_id.as_str());
    assert_eq!(author["name"], "Test user");
    assert!(author.get("email").is_none());

    let (status, res) = app
        .patch(&format!("/api/v1/reviews/{}", review_id), json!({"rating": 4}), Some(&token))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["data"]["review"]["rating"], 4);

    let (status, _) = app.delete(&format!("/api/v1/reviews/{}", review_id), Some(&token)).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    Ok(())
}
