use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use cookie::Cookie;
use std::ops::Deref;

use crate::api::common::utils::ACCESS_TOKEN_COOKIE;
use crate::api::v1::users::{find_user_by_id, User};
use crate::authentication::decode_access_token;
use crate::errors::AppError;
use crate::InnerState;

/// The authenticated user, attached to request extensions by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl Deref for CurrentUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

#[tracing::instrument(name = "Authenticate request", skip(inner, request, next), fields(path = %request.uri().path()))]
pub async fn auth_middleware(
    State(inner): State<InnerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(request.headers()).ok_or_else(|| {
        tracing::warn!("Request rejected: no access token");
        AppError::unauthorized("Unauthorized request")
    })?;

    let claims = decode_access_token(&inner.config.access_token, &token)?;

    let user = find_user_by_id(&inner.db, &claims.sub)
        .await?
        .ok_or_else(|| {
            tracing::warn!("Token subject {} no longer exists", claims.sub);
            AppError::unauthorized("Invalid access token")
        })?;

    tracing::debug!("Authenticated user {}", user.id);
    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// Extracts the access token from either the `Authorization` header or the `accessToken` cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    for cookie_header in headers.get_all(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Ok(parsed) = Cookie::parse(cookie.trim()) {
                    if parsed.name() == ACCESS_TOKEN_COOKIE && !parsed.value().is_empty() {
                        return Some(parsed.value().to_string());
                    }
                }
            }
        }
    }

    None
}
