use axum::extract::{Path, State};
use axum::Extension;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::api::common::extract::{parse_id, required, AppJson, AppQuery};
use crate::api::common::middleware::CurrentUser;
use crate::api::common::{ApiResponse, Empty, PaginationInfo, PaginationParams};
use crate::api::v1::users::UserSummary;
use crate::api::v1::videos::find_visible_video;
use crate::errors::AppError;
use crate::InnerState;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub video_id: String,
    pub owner_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, FromRow)]
struct CommentRow {
    #[sqlx(flatten)]
    comment: Comment,
    owner_username: String,
    owner_full_name: String,
    owner_avatar: String,
    likes_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentWithOwner {
    #[serde(flatten)]
    pub comment: Comment,
    pub owner: UserSummary,
    pub likes_count: i64,
}

impl From<CommentRow> for CommentWithOwner {
    fn from(row: CommentRow) -> Self {
        let owner = UserSummary {
            id: row.comment.owner_id.clone(),
            username: row.owner_username,
            full_name: row.owner_full_name,
            avatar: row.owner_avatar,
        };
        Self {
            comment: row.comment,
            owner,
            likes_count: row.likes_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentPage {
    pub comments: Vec<CommentWithOwner>,
    pub pagination: PaginationInfo,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: Option<String>,
}

async fn find_owned_comment(
    db: &sqlx::SqlitePool,
    comment_id: &str,
    user_id: &str,
) -> Result<Comment, AppError> {
    let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = ?")
        .bind(comment_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    if comment.owner_id != user_id {
        tracing::warn!("User {} does not own comment {}", user_id, comment_id);
        return Err(AppError::Forbidden(
            "You are not allowed to modify this comment".to_string(),
        ));
    }
    Ok(comment)
}

#[tracing::instrument(name = "List video comments", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn get_video_comments(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(video_id): Path<String>,
    AppQuery(params): AppQuery<PaginationParams>,
) -> Result<ApiResponse<CommentPage>, AppError> {
    let InnerState { db, .. } = inner;
    let video_id = parse_id(&video_id, "video")?;
    find_visible_video(&db, &video_id, &current_user.id).await?;

    let (page, limit, offset) = params.resolve(10);

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE video_id = ?")
        .bind(&video_id)
        .fetch_one(&db)
        .await?;

    let rows = sqlx::query_as::<_, CommentRow>(
        r#"
        SELECT c.*, u.username AS owner_username, u.full_name AS owner_full_name, u.avatar AS owner_avatar,
            (SELECT COUNT(*) FROM likes l WHERE l.comment_id = c.id) AS likes_count
        FROM comments c
        JOIN users u ON u.id = c.owner_id
        WHERE c.video_id = ?
        ORDER BY c.created_at DESC, c.rowid DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(&video_id)
    .bind(i64::from(limit))
    .bind(i64::from(offset))
    .fetch_all(&db)
    .await?;

    tracing::debug!("Fetched {} of {} comments", rows.len(), total);
    Ok(ApiResponse::ok(
        CommentPage {
            comments: rows.into_iter().map(CommentWithOwner::from).collect(),
            pagination: PaginationInfo::new(page, limit, total),
        },
        "Comments fetched successfully",
    ))
}

#[tracing::instrument(name = "Add comment", skip(inner, current_user, payload), fields(user_id = %current_user.id))]
pub async fn add_comment(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(video_id): Path<String>,
    AppJson(payload): AppJson<CommentRequest>,
) -> Result<ApiResponse<Comment>, AppError> {
    let InnerState { db, .. } = inner;
    let video_id = parse_id(&video_id, "video")?;
    let content = required(payload.content, "content")?;
    find_visible_video(&db, &video_id, &current_user.id).await?;

    let now = chrono::Utc::now().naive_utc();
    let comment = sqlx::query_as::<_, Comment>(
        r#"
        INSERT INTO comments (id, content, video_id, owner_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&content)
    .bind(&video_id)
    .bind(&current_user.id)
    .bind(now)
    .bind(now)
    .fetch_one(&db)
    .await?;

    tracing::info!("Comment {} added to video {}", comment.id, video_id);
    Ok(ApiResponse::created(comment, "Comment added successfully"))
}

#[tracing::instrument(name = "Update comment", skip(inner, current_user, payload), fields(user_id = %current_user.id))]
pub async fn update_comment(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(comment_id): Path<String>,
    AppJson(payload): AppJson<CommentRequest>,
) -> Result<ApiResponse<Comment>, AppError> {
    let InnerState { db, .. } = inner;
    let comment_id = parse_id(&comment_id, "comment")?;
    let content = required(payload.content, "content")?;
    find_owned_comment(&db, &comment_id, &current_user.id).await?;

    let comment = sqlx::query_as::<_, Comment>(
        "UPDATE comments SET content = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(&content)
    .bind(chrono::Utc::now().naive_utc())
    .bind(&comment_id)
    .fetch_one(&db)
    .await?;

    Ok(ApiResponse::ok(comment, "Comment updated successfully"))
}

#[tracing::instrument(name = "Delete comment", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn delete_comment(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(comment_id): Path<String>,
) -> Result<ApiResponse<Empty>, AppError> {
    let InnerState { db, .. } = inner;
    let comment_id = parse_id(&comment_id, "comment")?;
    find_owned_comment(&db, &comment_id, &current_user.id).await?;

    let mut transaction = db.begin().await?;
    sqlx::query("DELETE FROM likes WHERE comment_id = ?")
        .bind(&comment_id)
        .execute(&mut *transaction)
        .await?;
    sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(&comment_id)
        .execute(&mut *transaction)
        .await?;
    transaction.commit().await?;

    tracing::info!("Comment {} deleted", comment_id);
    Ok(ApiResponse::ok(Empty {}, "Comment deleted successfully"))
}
