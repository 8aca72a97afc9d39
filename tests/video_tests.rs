mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{assert_error, Part, TestApp};

fn titles(response: &common::TestResponse) -> Vec<String> {
    response.data()["videos"]
        .as_array()
        .expect("videos array")
        .iter()
        .map(|v| v["title"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn publish_stores_urls_and_duration() {
    let app = TestApp::spawn().await;
    let (user_id, token) = app.signup("nora").await;

    let video_id = app.publish_video(&token, "First cut", "A short clip").await;
    let response = app.get(&format!("/api/v1/videos/{}", video_id), &token).await;

    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    let video = response.data();
    assert_eq!(video["title"], "First cut");
    assert_eq!(video["duration"], 12.5);
    assert_eq!(video["isPublished"], true);
    assert_eq!(video["ownerId"], user_id.as_str());
    assert_eq!(video["owner"]["username"], "nora");
    assert!(video["videoFile"].as_str().unwrap().starts_with("https://media.test/"));
    assert_eq!(app.staged_files(), 0);
}

#[tokio::test]
async fn publish_requires_text_and_both_files() {
    let app = TestApp::spawn().await;
    let (_, token) = app.signup("omar").await;

    let blank = app
        .form(
            Method::POST,
            "/api/v1/videos",
            Some(&token),
            &[
                Part::Text("title", " "),
                Part::Text("description", "desc"),
                Part::File("videoFile", "clip.mp4", b"v"),
                Part::File("thumbnail", "t.png", b"t"),
            ],
        )
        .await;
    assert_error(&blank, StatusCode::BAD_REQUEST);

    let no_thumbnail = app
        .form(
            Method::POST,
            "/api/v1/videos",
            Some(&token),
            &[
                Part::Text("title", "t"),
                Part::Text("description", "d"),
                Part::File("videoFile", "clip.mp4", b"v"),
            ],
        )
        .await;
    assert_error(&no_thumbnail, StatusCode::BAD_REQUEST);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM videos")
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn list_paginates_searches_and_sorts() {
    let app = TestApp::spawn().await;
    let (user_id, token) = app.signup("pia").await;
    let (_, other_token) = app.signup("quinn").await;

    app.publish_video(&token, "Rust ownership", "borrowing explained").await;
    app.publish_video(&token, "Cooking pasta", "dinner").await;
    app.publish_video(&other_token, "Async rust", "tokio deep dive").await;
    let hidden = app.publish_video(&token, "Rust secrets", "draft").await;
    app.json(
        Method::PATCH,
        &format!("/api/v1/videos/toggle/publish/{}", hidden),
        Some(&token),
        None,
    )
    .await;

    let all = app.get("/api/v1/videos", &token).await;
    assert_eq!(all.status, StatusCode::OK, "{:?}", all.body);
    assert_eq!(all.data()["pagination"]["total"], 3);
    assert_eq!(titles(&all), vec!["Async rust", "Cooking pasta", "Rust ownership"]);

    let search = app.get("/api/v1/videos?query=RUST%20tokio", &token).await;
    let mut found = titles(&search);
    found.sort();
    assert_eq!(found, vec!["Async rust", "Rust ownership"]);

    let mine = app
        .get(&format!("/api/v1/videos?userId={}&sortBy=title&sortType=asc", user_id), &token)
        .await;
    assert_eq!(titles(&mine), vec!["Cooking pasta", "Rust ownership"]);

    let page_two = app.get("/api/v1/videos?page=2&limit=2", &token).await;
    assert_eq!(titles(&page_two), vec!["Rust ownership"]);
    assert_eq!(
        page_two.data()["pagination"],
        json!({"page": 2, "limit": 2, "total": 3, "totalPages": 2})
    );

    let bad_sort = app.get("/api/v1/videos?sortBy=password", &token).await;
    assert_error(&bad_sort, StatusCode::BAD_REQUEST);

    let bad_user = app.get("/api/v1/videos?userId=not-an-id", &token).await;
    assert_error(&bad_user, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_ignores_case_beyond_ascii() {
    let app = TestApp::spawn().await;
    let (_, token) = app.signup("zoe").await;

    let school = app.publish_video(&token, "École compilation", "rentrée").await;
    app.publish_video(&token, "Dog compilation", "woof").await;

    // école
    let lower = app.get("/api/v1/videos?query=%C3%A9cole", &token).await;
    assert_eq!(lower.status, StatusCode::OK, "{:?}", lower.body);
    assert_eq!(titles(&lower), vec!["École compilation"]);

    // ÉCOLE
    let upper = app.get("/api/v1/videos?query=%C3%89COLE", &token).await;
    assert_eq!(titles(&upper), vec!["École compilation"]);

    // RENTRÉE matches the description
    let description = app.get("/api/v1/videos?query=RENTR%C3%89E", &token).await;
    assert_eq!(titles(&description), vec!["École compilation"]);

    app.form(
        Method::PATCH,
        &format!("/api/v1/videos/{}", school),
        Some(&token),
        &[Part::Text("title", "Über guide")],
    )
    .await;

    // über
    let renamed = app.get("/api/v1/videos?query=%C3%BCber", &token).await;
    assert_eq!(titles(&renamed), vec!["Über guide"]);
    let old_title = app.get("/api/v1/videos?query=%C3%A9cole", &token).await;
    assert!(titles(&old_title).is_empty());
}

#[tokio::test]
async fn get_counts_views_and_records_history() {
    let app = TestApp::spawn().await;
    let (_, owner_token) = app.signup("rita").await;
    let (_, viewer_token) = app.signup("sam").await;
    let first = app.publish_video(&owner_token, "One", "1").await;
    let second = app.publish_video(&owner_token, "Two", "2").await;

    app.get(&format!("/api/v1/videos/{}", first), &viewer_token).await;
    app.get(&format!("/api/v1/videos/{}", second), &viewer_token).await;
    let again = app.get(&format!("/api/v1/videos/{}", first), &viewer_token).await;
    assert_eq!(again.data()["views"], 2);

    let history = app.get("/api/v1/users/history", &viewer_token).await;
    assert_eq!(history.status, StatusCode::OK);
    let ids: Vec<&str> = history
        .data()
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![first.as_str(), second.as_str()]);
    assert_eq!(history.data()[0]["owner"]["username"], "rita");

    let invalid = app.get("/api/v1/videos/12345", &viewer_token).await;
    assert_error(&invalid, StatusCode::BAD_REQUEST);

    let missing = app
        .get(&format!("/api/v1/videos/{}", uuid::Uuid::new_v4()), &viewer_token)
        .await;
    assert_error(&missing, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unpublished_videos_are_only_visible_to_their_owner() {
    let app = TestApp::spawn().await;
    let (_, owner_token) = app.signup("tara").await;
    let (_, viewer_token) = app.signup("umar").await;
    let video_id = app.publish_video(&owner_token, "Draft", "wip").await;

    let toggled = app
        .json(
            Method::PATCH,
            &format!("/api/v1/videos/toggle/publish/{}", video_id),
            Some(&owner_token),
            None,
        )
        .await;
    assert_eq!(toggled.data()["isPublished"], false);

    let as_viewer = app.get(&format!("/api/v1/videos/{}", video_id), &viewer_token).await;
    assert_error(&as_viewer, StatusCode::NOT_FOUND);

    let as_owner = app.get(&format!("/api/v1/videos/{}", video_id), &owner_token).await;
    assert_eq!(as_owner.status, StatusCode::OK);

    let not_owner = app
        .json(
            Method::PATCH,
            &format!("/api/v1/videos/toggle/publish/{}", video_id),
            Some(&viewer_token),
            None,
        )
        .await;
    assert_error(&not_owner, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn update_checks_input_and_ownership() {
    let app = TestApp::spawn().await;
    let (_, owner_token) = app.signup("vera").await;
    let (_, other_token) = app.signup("walt").await;
    let video_id = app.publish_video(&owner_token, "Old title", "old").await;
    let uri = format!("/api/v1/videos/{}", video_id);

    let empty = app
        .form(Method::PATCH, &uri, Some(&owner_token), &[Part::Text("title", "  ")])
        .await;
    assert_error(&empty, StatusCode::BAD_REQUEST);

    let foreign = app
        .form(Method::PATCH, &uri, Some(&other_token), &[Part::Text("title", "Hijacked")])
        .await;
    assert_error(&foreign, StatusCode::FORBIDDEN);

    let missing = app
        .form(
            Method::PATCH,
            &format!("/api/v1/videos/{}", uuid::Uuid::new_v4()),
            Some(&owner_token),
            &[Part::Text("title", "Ghost")],
        )
        .await;
    assert_error(&missing, StatusCode::NOT_FOUND);

    let updated = app
        .form(
            Method::PATCH,
            &uri,
            Some(&owner_token),
            &[
                Part::Text("title", "New title"),
                Part::File("thumbnail", "new.png", b"new"),
            ],
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK, "{:?}", updated.body);
    assert_eq!(updated.data()["title"], "New title");
    assert_eq!(updated.data()["description"], "old");
}

#[tokio::test]
async fn delete_removes_dependent_rows() {
    let app = TestApp::spawn().await;
    let (_, owner_token) = app.signup("xena").await;
    let (_, fan_token) = app.signup("yuri").await;
    let video_id = app.publish_video(&owner_token, "Doomed", "bye").await;

    let comment = app
        .json(
            Method::POST,
            &format!("/api/v1/comments/{}", video_id),
            Some(&fan_token),
            Some(json!({"content": "nice"})),
        )
        .await;
    let comment_id = comment.data()["id"].as_str().unwrap().to_string();
    app.json(Method::POST, &format!("/api/v1/likes/toggle/c/{}", comment_id), Some(&fan_token), None)
        .await;
    app.json(Method::POST, &format!("/api/v1/likes/toggle/v/{}", video_id), Some(&fan_token), None)
        .await;
    let playlist = app
        .json(
            Method::POST,
            "/api/v1/playlist",
            Some(&fan_token),
            Some(json!({"name": "Faves", "description": "best"})),
        )
        .await;
    let playlist_id = playlist.data()["id"].as_str().unwrap().to_string();
    app.json(
        Method::PATCH,
        &format!("/api/v1/playlist/add/{}/{}", video_id, playlist_id),
        Some(&fan_token),
        None,
    )
    .await;
    app.get(&format!("/api/v1/videos/{}", video_id), &fan_token).await;

    let forbidden = app
        .json(Method::DELETE, &format!("/api/v1/videos/{}", video_id), Some(&fan_token), None)
        .await;
    assert_error(&forbidden, StatusCode::FORBIDDEN);

    let deleted = app
        .json(Method::DELETE, &format!("/api/v1/videos/{}", video_id), Some(&owner_token), None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK, "{:?}", deleted.body);

    for table in ["videos", "comments", "likes", "playlist_videos", "watch_history"] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&app.db)
            .await
            .unwrap();
        assert_eq!(count, 0, "{} should be empty", table);
    }

    let playlist = app.get(&format!("/api/v1/playlist/{}", playlist_id), &fan_token).await;
    assert_eq!(playlist.data()["videos"], Value::Array(vec![]));
}
