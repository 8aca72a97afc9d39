use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info};

use crate::config::CloudinarySettings;
use crate::errors::AppError;

/// Hosted copy of an uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadedMedia {
    pub url: String,
    pub public_id: String,
    pub resource_type: String,
    /// Seconds, present for audio and video.
    pub duration: Option<f64>,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia, AppError>;
}

#[derive(Debug, Deserialize)]
struct CloudinaryUploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
    public_id: String,
    resource_type: String,
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CloudinaryErrorBody {
    error: CloudinaryErrorMessage,
}

#[derive(Debug, Deserialize)]
struct CloudinaryErrorMessage {
    message: String,
}

#[derive(Clone, Debug)]
pub struct CloudinaryClient {
    http_client: Client,
    base_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: Secret<String>,
}

impl CloudinaryClient {
    pub fn new(settings: &CloudinarySettings) -> Self {
        Self {
            http_client: Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            cloud_name: settings.cloud_name.clone(),
            api_key: settings.api_key.clone(),
            api_secret: settings.api_secret.clone(),
        }
    }

    fn upload_url(&self) -> String {
        format!("{}/v1_1/{}/auto/upload", self.base_url, self.cloud_name)
    }
}

/// Signs the sorted `key=value` parameters joined by `&`, followed by the API secret.
pub fn sign_params(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl MediaStore for CloudinaryClient {
    #[tracing::instrument(name = "Upload media", skip(self), fields(cloud = %self.cloud_name))]
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia, AppError> {
        let bytes = tokio::fs::read(local_path).await.map_err(|e| {
            error!("Failed to read staged file {:?}: {:?}", local_path, e);
            AppError::Unexpected(anyhow::Error::new(e).context("Failed to read staged upload"))
        })?;

        let file_name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut signed = BTreeMap::new();
        signed.insert("timestamp", timestamp.clone());
        let signature = sign_params(&signed, self.api_secret.expose_secret());

        let form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature)
            .part("file", Part::bytes(bytes).file_name(file_name));

        info!("Uploading {:?} to media provider", local_path);
        let response = self
            .http_client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<CloudinaryErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| "unreadable error body".to_string());
            error!("Media provider rejected upload ({}): {}", status, message);
            return Err(AppError::ExternalService(anyhow::anyhow!(
                "Upload rejected with {}: {}",
                status,
                message
            )));
        }

        let body: CloudinaryUploadResponse = response.json().await?;
        let url = body.secure_url.or(body.url).ok_or_else(|| {
            AppError::ExternalService(anyhow::anyhow!("Upload response did not include a url"))
        })?;

        info!("File has been uploaded: {}", url);
        Ok(UploadedMedia {
            url,
            public_id: body.public_id,
            resource_type: body.resource_type,
            duration: body.duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_hex_sha256_of_sorted_params_and_secret() {
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1315060510".to_string());
        params.insert("public_id", "sample_image".to_string());

        let expected = {
            let mut hasher = Sha256::new();
            hasher.update(b"public_id=sample_image&timestamp=1315060510abcd");
            hex::encode(hasher.finalize())
        };

        assert_eq!(sign_params(&params, "abcd"), expected);
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn upload_url_has_no_double_slash() {
        let client = CloudinaryClient::new(&CloudinarySettings {
            base_url: "https://api.cloudinary.com/".into(),
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: Secret::new("secret".into()),
        });
        assert_eq!(
            client.upload_url(),
            "https://api.cloudinary.com/v1_1/demo/auto/upload"
        );
    }
}
