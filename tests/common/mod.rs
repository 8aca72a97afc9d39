#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

use vidtube_api::config::AppConfig;
use vidtube_api::db::init_memory_db;
use vidtube_api::errors::AppError;
use vidtube_api::media::{MediaStore, UploadedMedia};
use vidtube_api::{build_app, InnerState};

pub const PASSWORD: &str = "password123";
const BOUNDARY: &str = "vidtube-test-boundary";

/// Media store that never leaves the process.
#[derive(Default)]
pub struct FakeMediaStore {
    pub uploads: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl MediaStore for FakeMediaStore {
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia, AppError> {
        assert!(local_path.exists(), "staged file should exist while uploading");
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::ExternalService(anyhow::anyhow!("media provider unavailable")));
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(UploadedMedia {
            url: format!("https://media.test/{}", n),
            public_id: format!("file-{}", n),
            resource_type: "auto".to_string(),
            duration: Some(12.5),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: SqlitePool,
    pub media: Arc<FakeMediaStore>,
    pub temp_dir: PathBuf,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    /// `name=value` pairs from every Set-Cookie header.
    pub fn cookies(&self) -> HashMap<String, String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect()
    }
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, contents) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(contents);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn test_config(temp_dir: &Path) -> AppConfig {
    let vars: HashMap<&str, String> = HashMap::from([
        ("ACCESS_TOKEN_SECRET", "test-access-secret".to_string()),
        ("REFRESH_TOKEN_SECRET", "test-refresh-secret".to_string()),
        ("CLOUDINARY_CLOUD_NAME", "test".to_string()),
        ("CLOUDINARY_API_KEY", "key".to_string()),
        ("CLOUDINARY_API_SECRET", "secret".to_string()),
        ("COOKIE_SECURE", "false".to_string()),
        ("UPLOAD_TEMP_DIR", temp_dir.to_string_lossy().into_owned()),
    ]);
    AppConfig::from_lookup(|key| vars.get(key).cloned()).expect("test config is valid")
}

impl TestApp {
    pub async fn spawn() -> Self {
        let temp_dir = std::env::temp_dir().join(format!("vidtube-test-{}", uuid::Uuid::new_v4()));
        let db = init_memory_db().await.expect("in-memory database");
        let media = Arc::new(FakeMediaStore::default());
        let state = InnerState::new(db.clone(), media.clone(), test_config(&temp_dir));

        Self {
            router: build_app(state),
            db,
            media,
            temp_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body can be read");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse { status, headers, body }
    }

    pub async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.json(Method::GET, uri, Some(token), None).await
    }

    pub async fn form(&self, method: Method, uri: &str, token: Option<&str>, parts: &[Part<'_>]) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = builder
            .body(Body::from(multipart(parts)))
            .expect("valid request");
        self.send(request).await
    }

    pub async fn register(&self, username: &str) -> TestResponse {
        let email = format!("{}@example.com", username);
        self.form(
            Method::POST,
            "/api/v1/users/register",
            None,
            &[
                Part::Text("fullName", "Test User"),
                Part::Text("email", &email),
                Part::Text("username", username),
                Part::Text("password", PASSWORD),
                Part::File("avatar", "avatar.png", b"avatar-bytes"),
            ],
        )
        .await
    }

    /// Registers and logs in, returning `(user_id, access_token)`.
    pub async fn signup(&self, username: &str) -> (String, String) {
        let registered = self.register(username).await;
        assert_eq!(registered.status, StatusCode::CREATED, "{:?}", registered.body);
        let user_id = registered.data()["id"].as_str().expect("user id").to_string();

        let login = self
            .json(
                Method::POST,
                "/api/v1/users/login",
                None,
                Some(serde_json::json!({"username": username, "password": PASSWORD})),
            )
            .await;
        assert_eq!(login.status, StatusCode::OK, "{:?}", login.body);
        let token = login.data()["accessToken"].as_str().expect("access token").to_string();
        (user_id, token)
    }

    pub async fn publish_video(&self, token: &str, title: &str, description: &str) -> String {
        let response = self
            .form(
                Method::POST,
                "/api/v1/videos",
                Some(token),
                &[
                    Part::Text("title", title),
                    Part::Text("description", description),
                    Part::File("videoFile", "clip.mp4", b"video-bytes"),
                    Part::File("thumbnail", "thumb.png", b"thumb-bytes"),
                ],
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.data()["id"].as_str().expect("video id").to_string()
    }

    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(&self.temp_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.temp_dir);
    }
}

pub fn assert_error(response: &TestResponse, status: StatusCode) {
    assert_eq!(response.status, status, "{:?}", response.body);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["statusCode"], status.as_u16());
    assert_eq!(response.body["data"], Value::Null);
    assert!(response.body["message"].is_string());
}
