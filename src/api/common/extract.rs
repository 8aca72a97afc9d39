//! Extractors whose rejections render as the error envelope.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::FromRequest;
use axum::extract::FromRequestParts;
use axum_typed_multipart::{TypedMultipart, TypedMultipartError};

use crate::errors::AppError;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

#[derive(FromRequest)]
#[from_request(via(TypedMultipart), rejection(AppError))]
pub struct AppMultipart<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<TypedMultipartError> for AppError {
    fn from(rejection: TypedMultipartError) -> Self {
        AppError::Validation(rejection.to_string())
    }
}

/// Trims and rejects empty values; `None` is treated as empty.
pub fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!("{} is required", field))),
    }
}

/// Trims; an all-whitespace value counts as absent.
pub fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Path ids are UUIDs; anything else is a client error.
pub fn parse_id(raw: &str, what: &str) -> Result<String, AppError> {
    uuid::Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| AppError::Validation(format!("Invalid {} id", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required(Some("  cat ".into()), "title").unwrap(), "cat");
        assert!(required(Some("   ".into()), "title").is_err());
        assert!(required(None, "title").is_err());
    }

    #[test]
    fn optional_drops_blank() {
        assert_eq!(optional(Some(" x ".into())), Some("x".to_string()));
        assert_eq!(optional(Some(" ".into())), None);
        assert_eq!(optional(None), None);
    }

    #[test]
    fn ids_must_be_uuids() {
        let id = uuid::Uuid::new_v4().to_string();
        assert_eq!(parse_id(&id, "video").unwrap(), id);
        let err = parse_id("64b7f0c2e1", "video").unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Invalid video id");
    }
}
