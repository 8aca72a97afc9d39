use crate::config::TokenSettings;
use crate::errors::AppError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub exp: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub exp: usize,
    /// Unique per issue so a rotated token never equals its predecessor.
    pub jti: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

fn expires_at(settings: &TokenSettings) -> usize {
    let lifetime = chrono::Duration::from_std(settings.expiry).unwrap_or(chrono::Duration::days(1));
    (chrono::Utc::now() + lifetime).timestamp() as usize
}

#[tracing::instrument(name = "Generate access token", skip(settings, email, full_name))]
pub fn generate_access_token(
    settings: &TokenSettings,
    user_id: &str,
    email: &str,
    username: &str,
    full_name: &str,
) -> Result<String, AppError> {
    let claims = AccessClaims {
        sub: user_id.to_owned(),
        email: email.to_owned(),
        username: username.to_owned(),
        full_name: full_name.to_owned(),
        exp: expires_at(settings),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(settings.secret.expose_secret().as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("Failed to encode access token for {}: {:?}", user_id, e);
        AppError::Unexpected(anyhow::Error::new(e).context("Failed to encode access token"))
    })
}

#[tracing::instrument(name = "Generate refresh token", skip(settings))]
pub fn generate_refresh_token(settings: &TokenSettings, user_id: &str) -> Result<String, AppError> {
    let claims = RefreshClaims {
        sub: user_id.to_owned(),
        exp: expires_at(settings),
        jti: uuid::Uuid::new_v4().to_string(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(settings.secret.expose_secret().as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("Failed to encode refresh token for {}: {:?}", user_id, e);
        AppError::Unexpected(anyhow::Error::new(e).context("Failed to encode refresh token"))
    })
}

pub fn decode_access_token(settings: &TokenSettings, token: &str) -> Result<AccessClaims, AppError> {
    decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(settings.secret.expose_secret().as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Access token rejected: {:?}", e);
        AppError::unauthorized("Invalid access token")
    })
}

pub fn decode_refresh_token(
    settings: &TokenSettings,
    token: &str,
) -> Result<RefreshClaims, AppError> {
    decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(settings.secret.expose_secret().as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Refresh token rejected: {:?}", e);
        AppError::unauthorized("Invalid refresh token")
    })
}
