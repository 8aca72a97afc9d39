use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error as StdError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(#[source] anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict error: {0}")]
    Conflict(String),

    #[error("External service error: {0}")]
    ExternalService(#[source] anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(#[from] anyhow::Error), // Catch-all for other anyhow errors

    #[error("Validation errors")]
    ValidationErrors(BTreeMap<String, Vec<String>>),
}

impl AppError {
    pub fn unauthorized(message: &str) -> Self {
        AppError::Authentication(anyhow::anyhow!(message.to_owned()))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Database(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) | AppError::ValidationErrors(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn public_message(&self) -> String {
        match self {
            // Only the outermost context is shown to clients
            AppError::Authentication(e) => e.to_string(),
            AppError::Forbidden(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::NotFound(msg) => msg.clone(),
            AppError::Database(_) => "Database error".to_string(),
            AppError::ExternalService(e) => format!("External service error: {}", e),
            AppError::Unexpected(_) => "An unexpected error occurred".to_string(),
            AppError::ValidationErrors(_) => "Validation failed".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = self.public_message();

        let errors: Vec<String> = match &self {
            AppError::ValidationErrors(fields) => fields
                .iter()
                .flat_map(|(field, messages)| {
                    messages.iter().map(move |m| format!("{}: {}", field, m))
                })
                .collect(),
            _ => Vec::new(),
        };

        if status.is_server_error() {
            tracing::error!(
                error_type = %self,
                error_message = %error_message,
                status_code = %status,
                "Request error"
            );
        } else {
            tracing::warn!(
                error_type = %self,
                error_message = %error_message,
                status_code = %status,
                "Request rejected"
            );
        }

        // Walk the source chain for the opaque variants
        if let AppError::Unexpected(e) | AppError::Database(e) | AppError::ExternalService(e) =
            &self
        {
            let mut source_chain = String::new();
            let mut current_err: Option<&(dyn StdError + 'static)> = Some(e.as_ref());
            while let Some(err) = current_err {
                source_chain.push_str(&format!("\n  Caused by: {}", err));
                current_err = err.source();
            }
            if !source_chain.is_empty() {
                tracing::error!("Error source chain:{}", source_chain);
            }
        }

        let body = Json(json!({
            "statusCode": status.as_u16(),
            "data": null,
            "message": error_message,
            "success": false,
            "errors": errors,
        }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Database record not found".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                tracing::warn!("Unique constraint violated: {}", db_err);
                AppError::Conflict("Record already exists".to_string())
            }
            _ => AppError::Database(anyhow::Error::new(err).context("SQLx operation failed")),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let mut context_parts = Vec::new();

        if let Some(url) = err.url() {
            context_parts.push(format!("URL: {}", url));
        }

        if let Some(status) = err.status() {
            context_parts.push(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown Status")
            ));
        }

        let error_type = match &err {
            e if e.is_timeout() => "Request Timeout",
            e if e.is_connect() => "Connection Failed",
            e if e.is_decode() => "Response Decode Failed",
            e if e.is_request() => "Invalid Request",
            e if e.is_body() => "Request Body Error",
            _ => "Unknown HTTP Error",
        };
        context_parts.push(format!("Type: {}", error_type));

        let context = format!("Media upload request failed - {}", context_parts.join(", "));

        tracing::error!(
            error = %err,
            url = ?err.url(),
            status = ?err.status(),
            is_timeout = err.is_timeout(),
            is_connect = err.is_connect(),
            "HTTP request failed with detailed context"
        );

        AppError::ExternalService(anyhow::Error::new(err).context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn not_found_renders_error_envelope() {
        let response = AppError::NotFound("Video not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["statusCode"], 404);
        assert_eq!(body["message"], "Video not found");
        assert_eq!(body["success"], false);
        assert!(body["data"].is_null());
        assert_eq!(body["errors"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn field_errors_are_listed() {
        let mut fields = BTreeMap::new();
        fields.insert("email".to_string(), vec!["is required".to_string()]);
        let response = AppError::ValidationErrors(fields).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["errors"], serde_json::json!(["email: is required"]));
    }

    #[tokio::test]
    async fn database_details_are_not_leaked() {
        let err = AppError::Database(anyhow::anyhow!("no such table: secrets"));
        let body = body_json(err.into_response()).await;
        assert_eq!(body["message"], "Database error");
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
