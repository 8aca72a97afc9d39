use axum::extract::{Path, State};
use axum::Extension;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use bytes::Bytes;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::api::common::extract::{optional, required, AppJson, AppMultipart};
use crate::api::common::middleware::CurrentUser;
use crate::api::common::{ApiResponse, Empty};
use crate::api::v1::videos::{
    VideoOwnerRow, VideoWithOwner, VIDEO_WITH_OWNER_COLUMNS, VISIBLE_TO_VIEWER,
};
use crate::authentication::{check_password, compute_password_hash, PasswordError};
use crate::errors::AppError;
use crate::uploads::upload_field;
use crate::InnerState;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Public fields of a user embedded in other resources.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub avatar: String,
}

#[tracing::instrument(name = "Find user by id", skip(db))]
pub async fn find_user_by_id(db: &SqlitePool, user_id: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

pub async fn user_exists(db: &SqlitePool, user_id: &str) -> Result<bool, AppError> {
    let found: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(found.is_some())
}

/// Fails with 404 unless the user exists.
pub async fn ensure_user_exists(db: &SqlitePool, user_id: &str) -> Result<(), AppError> {
    if user_exists(db, user_id).await? {
        Ok(())
    } else {
        Err(AppError::NotFound("User not found".to_string()))
    }
}

async fn reload_user(db: &SqlitePool, user_id: &str) -> Result<User, AppError> {
    find_user_by_id(db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

#[derive(TryFromMultipart)]
pub struct RegisterForm {
    #[form_data(field_name = "fullName")]
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[form_data(limit = "unlimited")]
    pub avatar: Option<FieldData<Bytes>>,
    #[form_data(field_name = "coverImage", limit = "unlimited")]
    pub cover_image: Option<FieldData<Bytes>>,
}

#[tracing::instrument(name = "Register user", skip(inner, form))]
pub async fn register_user(
    State(inner): State<InnerState>,
    AppMultipart(form): AppMultipart<RegisterForm>,
) -> Result<ApiResponse<User>, AppError> {
    let InnerState { db, media, config } = inner;

    let full_name = required(form.full_name, "fullName")?;
    let email = required(form.email, "email")?.to_lowercase();
    let username = required(form.username, "username")?.to_lowercase();
    let password = form
        .password
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::Validation("password is required".to_string()))?;

    tracing::info!("Registering user {}", username);

    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM users WHERE username = ? OR email = ?")
            .bind(&username)
            .bind(&email)
            .fetch_optional(&db)
            .await?;
    if existing.is_some() {
        tracing::warn!("Registration conflict for {} / {}", username, email);
        return Err(AppError::Conflict(
            "User with email or username already exists".to_string(),
        ));
    }

    let avatar_field = form
        .avatar
        .ok_or_else(|| AppError::Validation("Avatar file is required".to_string()))?;
    let avatar = upload_field(media.as_ref(), &config.upload_temp_dir, &avatar_field).await?;

    let cover_image = match &form.cover_image {
        Some(field) => Some(
            upload_field(media.as_ref(), &config.upload_temp_dir, field)
                .await?
                .url,
        ),
        None => None,
    };

    let password_hash = compute_password_hash(password).await?;
    let user_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().naive_utc();

    sqlx::query(
        r#"
        INSERT INTO users (id, username, email, full_name, avatar, cover_image, password, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user_id)
    .bind(&username)
    .bind(&email)
    .bind(&full_name)
    .bind(&avatar.url)
    .bind(&cover_image)
    .bind(&password_hash)
    .bind(now)
    .bind(now)
    .execute(&db)
    .await
    .map_err(|e| {
        tracing::error!("Failed to insert user {}: {:?}", username, e);
        AppError::from(e)
    })?;

    let user = reload_user(&db, &user_id).await?;
    tracing::info!("User {} registered", user.id);

    Ok(ApiResponse::created(user, "User registered successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

#[tracing::instrument(name = "Change password", skip(inner, current_user, payload), fields(user_id = %current_user.id))]
pub async fn change_password(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> Result<ApiResponse<Empty>, AppError> {
    let InnerState { db, .. } = inner;

    let old_password = payload
        .old_password
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::Validation("oldPassword is required".to_string()))?;
    let new_password = payload
        .new_password
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::Validation("newPassword is required".to_string()))?;

    match check_password(current_user.password.clone(), old_password).await {
        Ok(()) => {}
        Err(PasswordError::Mismatch) => {
            return Err(AppError::Validation("Invalid old password".to_string()))
        }
        Err(e) => return Err(e.into()),
    }

    let password_hash = compute_password_hash(new_password).await?;
    sqlx::query("UPDATE users SET password = ?, updated_at = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(chrono::Utc::now().naive_utc())
        .bind(&current_user.id)
        .execute(&db)
        .await?;

    tracing::info!("Password changed");
    Ok(ApiResponse::ok(Empty {}, "Password changed successfully"))
}

#[tracing::instrument(name = "Get current user", skip(current_user))]
pub async fn get_current_user(
    Extension(current_user): Extension<CurrentUser>,
) -> Result<ApiResponse<User>, AppError> {
    Ok(ApiResponse::ok(current_user.0, "Current user fetched successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[tracing::instrument(name = "Update account details", skip(inner, current_user, payload), fields(user_id = %current_user.id))]
pub async fn update_account_details(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    AppJson(payload): AppJson<UpdateAccountRequest>,
) -> Result<ApiResponse<User>, AppError> {
    let InnerState { db, .. } = inner;

    let full_name = required(payload.full_name, "fullName")?;
    let email = required(payload.email, "email")?.to_lowercase();

    let taken: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ? AND id != ?")
        .bind(&email)
        .bind(&current_user.id)
        .fetch_optional(&db)
        .await?;
    if taken.is_some() {
        return Err(AppError::Conflict("Email is already in use".to_string()));
    }

    sqlx::query("UPDATE users SET full_name = ?, email = ?, updated_at = ? WHERE id = ?")
        .bind(&full_name)
        .bind(&email)
        .bind(chrono::Utc::now().naive_utc())
        .bind(&current_user.id)
        .execute(&db)
        .await?;

    let user = reload_user(&db, &current_user.id).await?;
    Ok(ApiResponse::ok(user, "Account details updated successfully"))
}

#[derive(TryFromMultipart)]
pub struct AvatarForm {
    #[form_data(limit = "unlimited")]
    pub avatar: Option<FieldData<Bytes>>,
}

#[derive(TryFromMultipart)]
pub struct CoverImageForm {
    #[form_data(field_name = "coverImage", limit = "unlimited")]
    pub cover_image: Option<FieldData<Bytes>>,
}

enum ProfileImage {
    Avatar,
    CoverImage,
}

impl ProfileImage {
    fn column(&self) -> &'static str {
        match self {
            ProfileImage::Avatar => "avatar",
            ProfileImage::CoverImage => "cover_image",
        }
    }
}

async fn replace_profile_image(
    inner: InnerState,
    user_id: &str,
    kind: ProfileImage,
    field: Option<FieldData<Bytes>>,
) -> Result<User, AppError> {
    let InnerState { db, media, config } = inner;

    let field = field.ok_or_else(|| match kind {
        ProfileImage::Avatar => AppError::Validation("Avatar file is missing".to_string()),
        ProfileImage::CoverImage => AppError::Validation("Cover image file is missing".to_string()),
    })?;

    let uploaded = upload_field(media.as_ref(), &config.upload_temp_dir, &field).await?;

    let query = format!(
        "UPDATE users SET {} = ?, updated_at = ? WHERE id = ?",
        kind.column()
    );
    sqlx::query(&query)
        .bind(&uploaded.url)
        .bind(chrono::Utc::now().naive_utc())
        .bind(user_id)
        .execute(&db)
        .await?;

    reload_user(&db, user_id).await
}

#[tracing::instrument(name = "Update avatar", skip(inner, current_user, form), fields(user_id = %current_user.id))]
pub async fn update_user_avatar(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    AppMultipart(form): AppMultipart<AvatarForm>,
) -> Result<ApiResponse<User>, AppError> {
    let user = replace_profile_image(inner, &current_user.id, ProfileImage::Avatar, form.avatar).await?;
    Ok(ApiResponse::ok(user, "Avatar image updated successfully"))
}

#[tracing::instrument(name = "Update cover image", skip(inner, current_user, form), fields(user_id = %current_user.id))]
pub async fn update_user_cover_image(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    AppMultipart(form): AppMultipart<CoverImageForm>,
) -> Result<ApiResponse<User>, AppError> {
    let user = replace_profile_image(
        inner,
        &current_user.id,
        ProfileImage::CoverImage,
        form.cover_image,
    )
    .await?;
    Ok(ApiResponse::ok(user, "Cover image updated successfully"))
}

#[derive(Debug, FromRow)]
struct ChannelProfileRow {
    id: String,
    full_name: String,
    username: String,
    email: String,
    avatar: String,
    cover_image: Option<String>,
    subscribers_count: i64,
    channels_subscribed_to_count: i64,
    is_subscribed: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub subscribers_count: i64,
    pub channels_subscribed_to_count: i64,
    pub is_subscribed: bool,
}

impl From<ChannelProfileRow> for ChannelProfile {
    fn from(row: ChannelProfileRow) -> Self {
        Self {
            id: row.id,
            full_name: row.full_name,
            username: row.username,
            email: row.email,
            avatar: row.avatar,
            cover_image: row.cover_image,
            subscribers_count: row.subscribers_count,
            channels_subscribed_to_count: row.channels_subscribed_to_count,
            is_subscribed: row.is_subscribed != 0,
        }
    }
}

#[tracing::instrument(name = "Get channel profile", skip(inner, current_user))]
pub async fn get_user_channel_profile(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> Result<ApiResponse<ChannelProfile>, AppError> {
    let InnerState { db, .. } = inner;

    let username = optional(Some(username))
        .ok_or_else(|| AppError::Validation("username is missing".to_string()))?
        .to_lowercase();

    let row = sqlx::query_as::<_, ChannelProfileRow>(
        r#"
        SELECT u.id, u.full_name, u.username, u.email, u.avatar, u.cover_image,
            (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = u.id) AS subscribers_count,
            (SELECT COUNT(*) FROM subscriptions s WHERE s.subscriber_id = u.id) AS channels_subscribed_to_count,
            EXISTS (
                SELECT 1 FROM subscriptions s WHERE s.channel_id = u.id AND s.subscriber_id = ?
            ) AS is_subscribed
        FROM users u
        WHERE u.username = ?
        "#,
    )
    .bind(&current_user.id)
    .bind(&username)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| AppError::NotFound("Channel does not exist".to_string()))?;

    Ok(ApiResponse::ok(
        ChannelProfile::from(row),
        "User channel fetched successfully",
    ))
}

#[tracing::instrument(name = "Get watch history", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn get_watch_history(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<ApiResponse<Vec<VideoWithOwner>>, AppError> {
    let InnerState { db, .. } = inner;

    let query = format!(
        r#"
        SELECT {}
        FROM watch_history w
        JOIN videos v ON v.id = w.video_id
        JOIN users u ON u.id = v.owner_id
        WHERE w.user_id = ? AND {}
        ORDER BY w.watched_at DESC, w.rowid DESC
        "#,
        VIDEO_WITH_OWNER_COLUMNS, VISIBLE_TO_VIEWER
    );

    let rows = sqlx::query_as::<_, VideoOwnerRow>(&query)
        .bind(&current_user.id)
        .bind(&current_user.id)
        .fetch_all(&db)
        .await?;

    tracing::debug!("Found {} watched videos", rows.len());
    let history = rows.into_iter().map(VideoWithOwner::from).collect();
    Ok(ApiResponse::ok(history, "Watch history fetched successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_serialization_hides_secrets() {
        let now = chrono::Utc::now().naive_utc();
        let user = User {
            id: "u1".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            full_name: "Alice".into(),
            avatar: "https://media.test/a.png".into(),
            cover_image: None,
            password: "$argon2id$secret".into(),
            refresh_token: Some("token".into()),
            created_at: now,
            updated_at: now,
        };

        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password").is_none());
        assert!(value.get("refreshToken").is_none());
        assert_eq!(value["fullName"], "Alice");
        assert_eq!(value["coverImage"], serde_json::Value::Null);
    }

    #[test]
    fn channel_profile_flag_is_boolean() {
        let row = ChannelProfileRow {
            id: "u1".into(),
            full_name: "Alice".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            avatar: "a".into(),
            cover_image: None,
            subscribers_count: 2,
            channels_subscribed_to_count: 0,
            is_subscribed: 1,
        };
        let value = serde_json::to_value(ChannelProfile::from(row)).unwrap();
        assert_eq!(value["isSubscribed"], true);
        assert_eq!(value["subscribersCount"], 2);
    }
}
