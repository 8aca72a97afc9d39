use axum::extract::State;
use serde::Serialize;

use crate::api::common::ApiResponse;
use crate::errors::AppError;
use crate::InnerState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

#[tracing::instrument(name = "Health check", skip(inner))]
pub async fn health_check(
    State(inner): State<InnerState>,
) -> Result<ApiResponse<HealthStatus>, AppError> {
    sqlx::query("SELECT 1").execute(&inner.db).await.map_err(|e| {
        tracing::error!("Database ping failed: {:?}", e);
        AppError::Database(anyhow::Error::new(e).context("Database ping failed"))
    })?;

    Ok(ApiResponse::ok(HealthStatus { status: "OK" }, "Health check passed"))
}
