use axum::extract::{Path, State};
use axum::Extension;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::api::common::extract::parse_id;
use crate::api::common::middleware::CurrentUser;
use crate::api::common::ApiResponse;
use crate::api::v1::videos::{
    VideoOwnerRow, VideoWithOwner, VIDEO_WITH_OWNER_COLUMNS, VISIBLE_TO_VIEWER,
};
use crate::errors::AppError;
use crate::InnerState;

/// What a like points at. Each maps to one nullable column of `likes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeTarget {
    Video,
    Comment,
    Tweet,
}

impl LikeTarget {
    /// Selects the target when it exists and the viewer may see it. Videos and
    /// comments follow the visibility of their video and take the viewer id as
    /// a second bind.
    fn lookup_query(self) -> String {
        match self {
            LikeTarget::Video => format!(
                "SELECT v.id FROM videos v WHERE v.id = ? AND {}",
                VISIBLE_TO_VIEWER
            ),
            LikeTarget::Comment => format!(
                "SELECT c.id FROM comments c JOIN videos v ON v.id = c.video_id WHERE c.id = ? AND {}",
                VISIBLE_TO_VIEWER
            ),
            LikeTarget::Tweet => "SELECT id FROM tweets WHERE id = ?".to_string(),
        }
    }

    fn binds_viewer(self) -> bool {
        !matches!(self, LikeTarget::Tweet)
    }

    fn column(self) -> &'static str {
        match self {
            LikeTarget::Video => "video_id",
            LikeTarget::Comment => "comment_id",
            LikeTarget::Tweet => "tweet_id",
        }
    }

    fn not_found_message(self) -> &'static str {
        match self {
            LikeTarget::Video => "Video not found",
            LikeTarget::Comment => "Comment not found",
            LikeTarget::Tweet => "Tweet not found",
        }
    }

    fn label(self) -> &'static str {
        match self {
            LikeTarget::Video => "video",
            LikeTarget::Comment => "comment",
            LikeTarget::Tweet => "tweet",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeStatus {
    pub is_liked: bool,
}

/// Removes the user's like on the target if present, otherwise adds one.
/// The existence check and both steps run in one transaction; the partial
/// unique indexes on `likes` keep a racing insert from producing a duplicate.
#[tracing::instrument(name = "Toggle like", skip(db))]
pub async fn toggle_like(
    db: &SqlitePool,
    target: LikeTarget,
    target_id: &str,
    user_id: &str,
) -> Result<bool, AppError> {
    let mut transaction = db.begin().await?;

    let lookup_query = target.lookup_query();
    let mut lookup = sqlx::query_scalar::<_, String>(&lookup_query).bind(target_id);
    if target.binds_viewer() {
        lookup = lookup.bind(user_id);
    }
    let exists = lookup.fetch_optional(&mut *transaction).await?;
    if exists.is_none() {
        return Err(AppError::NotFound(target.not_found_message().to_string()));
    }

    let removed = sqlx::query(&format!(
        "DELETE FROM likes WHERE liked_by = ? AND {} = ?",
        target.column()
    ))
    .bind(user_id)
    .bind(target_id)
    .execute(&mut *transaction)
    .await?
    .rows_affected();

    let is_liked = if removed > 0 {
        false
    } else {
        sqlx::query(&format!(
            "INSERT INTO likes (id, {}, liked_by, created_at) VALUES (?, ?, ?, ?) ON CONFLICT DO NOTHING",
            target.column()
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(target_id)
        .bind(user_id)
        .bind(chrono::Utc::now().naive_utc())
        .execute(&mut *transaction)
        .await
        .map_err(|e| match e {
            // Target removed by a writer that committed after our lookup
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(target.not_found_message().to_string())
            }
            other => AppError::from(other),
        })?;
        true
    };

    transaction.commit().await?;
    tracing::info!("{} {} liked={}", target.label(), target_id, is_liked);
    Ok(is_liked)
}

async fn toggle_handler(
    inner: InnerState,
    current_user: CurrentUser,
    target: LikeTarget,
    raw_id: String,
) -> Result<ApiResponse<LikeStatus>, AppError> {
    let InnerState { db, .. } = inner;
    let target_id = parse_id(&raw_id, target.label())?;
    let is_liked = toggle_like(&db, target, &target_id, &current_user.id).await?;

    let message = if is_liked {
        format!("Liked the {}", target.label())
    } else {
        format!("Removed like from the {}", target.label())
    };
    Ok(ApiResponse::ok(LikeStatus { is_liked }, message))
}

#[tracing::instrument(name = "Toggle video like", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn toggle_video_like(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<LikeStatus>, AppError> {
    toggle_handler(inner, current_user, LikeTarget::Video, video_id).await
}

#[tracing::instrument(name = "Toggle comment like", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn toggle_comment_like(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(comment_id): Path<String>,
) -> Result<ApiResponse<LikeStatus>, AppError> {
    toggle_handler(inner, current_user, LikeTarget::Comment, comment_id).await
}

#[tracing::instrument(name = "Toggle tweet like", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn toggle_tweet_like(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(tweet_id): Path<String>,
) -> Result<ApiResponse<LikeStatus>, AppError> {
    toggle_handler(inner, current_user, LikeTarget::Tweet, tweet_id).await
}

#[tracing::instrument(name = "Get liked videos", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn get_liked_videos(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<ApiResponse<Vec<VideoWithOwner>>, AppError> {
    let InnerState { db, .. } = inner;

    let query = format!(
        r#"
        SELECT {}
        FROM likes l
        JOIN videos v ON v.id = l.video_id
        JOIN users u ON u.id = v.owner_id
        WHERE l.liked_by = ? AND (v.is_published = 1 OR v.owner_id = l.liked_by)
        ORDER BY l.created_at DESC, l.rowid DESC
        "#,
        VIDEO_WITH_OWNER_COLUMNS
    );
    let rows = sqlx::query_as::<_, VideoOwnerRow>(&query)
        .bind(&current_user.id)
        .fetch_all(&db)
        .await?;

    tracing::debug!("User has {} liked videos", rows.len());
    Ok(ApiResponse::ok(
        rows.into_iter().map(VideoWithOwner::from).collect(),
        "Liked videos fetched successfully",
    ))
}
