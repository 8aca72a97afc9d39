use axum_typed_multipart::FieldData;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::errors::AppError;
use crate::media::{MediaStore, UploadedMedia};

/// A multipart file part written to the local temp directory.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Keeps letters, digits, dot, dash and underscore; everything else becomes `_`.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[tracing::instrument(name = "Stage upload", skip(dir, contents))]
pub async fn stage_file(
    dir: &Path,
    file_name: Option<&str>,
    contents: &Bytes,
) -> Result<StagedFile, AppError> {
    if contents.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }

    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        AppError::Unexpected(anyhow::Error::new(e).context("Failed to create upload directory"))
    })?;

    let original = file_name.unwrap_or("upload");
    let path = dir.join(format!("{}-{}", Uuid::new_v4(), sanitize_file_name(original)));

    tokio::fs::write(&path, contents).await.map_err(|e| {
        AppError::Unexpected(anyhow::Error::new(e).context("Failed to write staged upload"))
    })?;

    tracing::debug!("Staged {} bytes at {:?}", contents.len(), path);
    Ok(StagedFile { path })
}

async fn discard(staged: StagedFile) {
    if let Err(e) = tokio::fs::remove_file(&staged.path).await {
        tracing::warn!("Failed to remove staged file {:?}: {:?}", staged.path, e);
    }
}

/// Stages the bytes, hands them to the media store and removes the local copy
/// whatever the outcome.
pub async fn upload_bytes(
    media: &dyn MediaStore,
    dir: &Path,
    file_name: Option<&str>,
    contents: &Bytes,
) -> Result<UploadedMedia, AppError> {
    let staged = stage_file(dir, file_name, contents).await?;
    let result = media.upload(staged.path()).await;
    discard(staged).await;

    result.map_err(|e| {
        tracing::error!("Upload failed: {}", e);
        e
    })
}

pub async fn upload_field(
    media: &dyn MediaStore,
    dir: &Path,
    field: &FieldData<Bytes>,
) -> Result<UploadedMedia, AppError> {
    upload_bytes(media, dir, field.metadata.file_name.as_deref(), &field.contents).await
}
