use axum::extract::State;
use axum::Extension;
use serde::Serialize;
use sqlx::FromRow;

use crate::api::common::middleware::CurrentUser;
use crate::api::common::ApiResponse;
use crate::api::v1::videos::Video;
use crate::errors::AppError;
use crate::InnerState;

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub full_name: String,
    pub username: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub subscribers_count: i64,
    pub videos_count: i64,
    pub total_views: i64,
    pub total_likes: i64,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChannelVideo {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub video: Video,
    pub likes_count: i64,
    pub comments_count: i64,
}

#[tracing::instrument(name = "Get channel stats", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn get_channel_stats(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<ApiResponse<ChannelStats>, AppError> {
    let InnerState { db, .. } = inner;

    let stats = sqlx::query_as::<_, ChannelStats>(
        r#"
        SELECT u.full_name, u.username, u.avatar, u.cover_image,
            (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = u.id) AS subscribers_count,
            (SELECT COUNT(*) FROM videos v WHERE v.owner_id = u.id) AS videos_count,
            (SELECT COALESCE(SUM(v.views), 0) FROM videos v WHERE v.owner_id = u.id) AS total_views,
            (
                SELECT COUNT(*) FROM likes l
                JOIN videos v ON v.id = l.video_id
                WHERE v.owner_id = u.id
            ) AS total_likes
        FROM users u
        WHERE u.id = ?
        "#,
    )
    .bind(&current_user.id)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::debug!(
        "Stats: {} videos, {} views, {} likes",
        stats.videos_count,
        stats.total_views,
        stats.total_likes
    );
    Ok(ApiResponse::ok(stats, "Channel stats fetched successfully"))
}

#[tracing::instrument(name = "Get channel videos", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn get_channel_videos(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<ApiResponse<Vec<ChannelVideo>>, AppError> {
    let InnerState { db, .. } = inner;

    let videos = sqlx::query_as::<_, ChannelVideo>(
        r#"
        SELECT v.*,
            (SELECT COUNT(*) FROM likes l WHERE l.video_id = v.id) AS likes_count,
            (SELECT COUNT(*) FROM comments c WHERE c.video_id = v.id) AS comments_count
        FROM videos v
        WHERE v.owner_id = ?
        ORDER BY v.created_at DESC, v.rowid DESC
        "#,
    )
    .bind(&current_user.id)
    .fetch_all(&db)
    .await?;

    Ok(ApiResponse::ok(videos, "Channel videos fetched successfully"))
}
