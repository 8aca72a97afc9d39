pub mod api;
pub mod authentication;
pub mod config;
pub mod db;
pub mod errors;
pub mod media;
pub mod system;
pub mod uploads;

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::common::tracing::{
    make_custom_span, on_custom_failure, on_custom_request, on_custom_response,
};
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::media::MediaStore;

#[derive(Clone)]
pub struct InnerState {
    pub db: SqlitePool,
    pub media: Arc<dyn MediaStore>,
    pub config: Arc<AppConfig>,
}

impl InnerState {
    pub fn new(db: SqlitePool, media: Arc<dyn MediaStore>, config: AppConfig) -> Self {
        Self {
            db,
            media,
            config: Arc::new(config),
        }
    }
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = origin
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty() && *o != "*")
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}: {:?}", o, e);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        tracing::info!("No CORS origin configured, allowing any origin without credentials");
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Builds the full application router with state applied.
#[tracing::instrument(name = "build_app", skip(state))]
pub fn build_app(state: InnerState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;
    let cors = cors_layer(state.config.cors_origin.as_deref());

    Router::new()
        .nest("/api/v1", api::create_api_router(state.clone()))
        .fallback(|| async { AppError::NotFound("Route not found".to_string()) })
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CookieManagerLayer::new())
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(make_custom_span::<Body>)
                .on_request(on_custom_request::<Body>)
                .on_response(on_custom_response::<Body>)
                .on_failure(on_custom_failure),
        )
        .with_state(state)
}
