use axum::extract::State;
use axum::Extension;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_cookies::Cookies;

use crate::api::common::extract::{optional, AppJson};
use crate::api::common::middleware::CurrentUser;
use crate::api::common::utils::{clear_auth_cookies, setup_auth_cookies, REFRESH_TOKEN_COOKIE};
use crate::api::common::{ApiResponse, Empty};
use crate::api::v1::users::{find_user_by_id, User};
use crate::authentication::{
    check_password, decode_refresh_token, generate_access_token, generate_refresh_token,
    TokenPair,
};
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::InnerState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs a fresh token pair and stores the refresh token on the user row.
#[tracing::instrument(name = "Issue tokens", skip(db, config, user), fields(user_id = %user.id))]
pub async fn issue_tokens(
    db: &SqlitePool,
    config: &AppConfig,
    user: &User,
) -> Result<TokenPair, AppError> {
    let access_token = generate_access_token(
        &config.access_token,
        &user.id,
        &user.email,
        &user.username,
        &user.full_name,
    )?;
    let refresh_token = generate_refresh_token(&config.refresh_token, &user.id)?;

    sqlx::query("UPDATE users SET refresh_token = ?, updated_at = ? WHERE id = ?")
        .bind(&refresh_token)
        .bind(chrono::Utc::now().naive_utc())
        .bind(&user.id)
        .execute(db)
        .await
        .map_err(|e| {
            tracing::error!("Failed to store refresh token: {:?}", e);
            AppError::from(e)
        })?;

    tracing::debug!("Token pair issued");
    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

#[tracing::instrument(name = "User login", skip(cookies, inner, payload))]
pub async fn login_user(
    cookies: Cookies,
    State(inner): State<InnerState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<ApiResponse<LoginResponse>, AppError> {
    let InnerState { db, config, .. } = inner;

    let username = optional(payload.username).map(|u| u.to_lowercase());
    let email = optional(payload.email).map(|e| e.to_lowercase());
    if username.is_none() && email.is_none() {
        return Err(AppError::Validation(
            "username or email is required".to_string(),
        ));
    }
    let password = payload
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::Validation("password is required".to_string()))?;

    tracing::info!("Starting login for {:?} / {:?}", username, email);

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ? OR email = ?")
        .bind(&username)
        .bind(&email)
        .fetch_optional(&db)
        .await?
        .ok_or_else(|| {
            tracing::warn!("Login for unknown user");
            AppError::NotFound("User does not exist".to_string())
        })?;

    check_password(user.password.clone(), password).await?;

    let tokens = issue_tokens(&db, &config, &user).await?;
    setup_auth_cookies(&tokens, &config, &cookies);

    let user = find_user_by_id(&db, &user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))?;

    tracing::info!("Login completed for user {}", user.id);
    Ok(ApiResponse::ok(
        LoginResponse {
            user,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        },
        "User logged in successfully",
    ))
}

#[tracing::instrument(name = "User logout", skip(cookies, inner, current_user), fields(user_id = %current_user.id))]
pub async fn logout_user(
    cookies: Cookies,
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<ApiResponse<Empty>, AppError> {
    let InnerState { db, config, .. } = inner;

    sqlx::query("UPDATE users SET refresh_token = NULL, updated_at = ? WHERE id = ?")
        .bind(chrono::Utc::now().naive_utc())
        .bind(&current_user.id)
        .execute(&db)
        .await?;

    clear_auth_cookies(&config, &cookies);
    tracing::info!("Logout completed");
    Ok(ApiResponse::ok(Empty {}, "User logged out"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Resolves the user owning `token`, which must be validly signed and equal
/// to the one stored on the user row.
async fn user_for_refresh_token(
    db: &SqlitePool,
    config: &AppConfig,
    token: &str,
) -> Result<User, AppError> {
    let claims = decode_refresh_token(&config.refresh_token, token)?;

    let user = find_user_by_id(db, &claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid refresh token"))?;

    if user.refresh_token.as_deref() != Some(token) {
        tracing::warn!("Refresh token for {} does not match the stored one", user.id);
        return Err(AppError::unauthorized("Refresh token is expired or used"));
    }
    Ok(user)
}

/// Accepts the token from the `refreshToken` cookie or the JSON body. The
/// cookie is tried first; a stale cookie falls back to the body token.
#[tracing::instrument(name = "Refresh access token", skip(cookies, inner, payload))]
pub async fn refresh_access_token(
    cookies: Cookies,
    State(inner): State<InnerState>,
    payload: Option<AppJson<RefreshRequest>>,
) -> Result<ApiResponse<TokenPair>, AppError> {
    let InnerState { db, config, .. } = inner;

    let from_cookie = cookies
        .get(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());
    let from_body = payload.and_then(|AppJson(body)| optional(body.refresh_token));

    let mut candidates: Vec<String> = from_cookie.into_iter().collect();
    if let Some(token) = from_body {
        if !candidates.contains(&token) {
            candidates.push(token);
        }
    }

    let mut outcome = Err(AppError::unauthorized("Unauthorized request"));
    for token in &candidates {
        outcome = user_for_refresh_token(&db, &config, token).await;
        if outcome.is_ok() {
            break;
        }
    }
    let user = outcome?;

    let tokens = issue_tokens(&db, &config, &user).await?;
    setup_auth_cookies(&tokens, &config, &cookies);

    tracing::info!("Access token refreshed for {}", user.id);
    Ok(ApiResponse::ok(tokens, "Access token refreshed"))
}
