use axum::extract::{Path, State};
use axum::Extension;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use bytes::Bytes;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::api::common::extract::{optional, parse_id, required, AppMultipart, AppQuery};
use crate::api::common::middleware::CurrentUser;
use crate::api::common::{ApiResponse, Empty, PaginationInfo, PaginationParams};
use crate::api::v1::users::UserSummary;
use crate::errors::AppError;
use crate::uploads::upload_field;
use crate::InnerState;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub owner_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Column list for [`VideoOwnerRow`], with videos aliased `v` and owners `u`.
pub const VIDEO_WITH_OWNER_COLUMNS: &str =
    "v.*, u.username AS owner_username, u.full_name AS owner_full_name, u.avatar AS owner_avatar";

#[derive(Debug, FromRow)]
pub struct VideoOwnerRow {
    #[sqlx(flatten)]
    pub video: Video,
    pub owner_username: String,
    pub owner_full_name: String,
    pub owner_avatar: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct VideoWithOwner {
    #[serde(flatten)]
    pub video: Video,
    pub owner: UserSummary,
}

impl From<VideoOwnerRow> for VideoWithOwner {
    fn from(row: VideoOwnerRow) -> Self {
        let owner = UserSummary {
            id: row.video.owner_id.clone(),
            username: row.owner_username,
            full_name: row.owner_full_name,
            avatar: row.owner_avatar,
        };
        Self {
            video: row.video,
            owner,
        }
    }
}

pub async fn find_video(db: &SqlitePool, video_id: &str) -> Result<Option<Video>, AppError> {
    let video = sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE id = ?")
        .bind(video_id)
        .fetch_optional(db)
        .await?;
    Ok(video)
}

/// Fails with 404 unless the video exists.
pub async fn ensure_video_exists(db: &SqlitePool, video_id: &str) -> Result<Video, AppError> {
    find_video(db, video_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))
}

/// SQL predicate on a videos row aliased `v`: published, or owned by the bound viewer id.
pub const VISIBLE_TO_VIEWER: &str = "(v.is_published = 1 OR v.owner_id = ?)";

/// Loads a video the viewer may see. Unpublished videos of other owners are
/// reported as missing.
pub async fn find_visible_video(
    db: &SqlitePool,
    video_id: &str,
    viewer_id: &str,
) -> Result<Video, AppError> {
    sqlx::query_as::<_, Video>(&format!(
        "SELECT v.* FROM videos v WHERE v.id = ? AND {}",
        VISIBLE_TO_VIEWER
    ))
    .bind(video_id)
    .bind(viewer_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("Video not found".to_string()))
}

/// Loads a video the user is allowed to modify: 404 when missing, 403 for other owners.
pub async fn find_owned_video(
    db: &SqlitePool,
    video_id: &str,
    user_id: &str,
) -> Result<Video, AppError> {
    let video = ensure_video_exists(db, video_id).await?;
    if video.owner_id != user_id {
        tracing::warn!("User {} tried to modify video {} owned by {}", user_id, video_id, video.owner_id);
        return Err(AppError::Forbidden(
            "You are not allowed to modify this video".to_string(),
        ));
    }
    Ok(video)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Views,
    Duration,
    Title,
}

impl SortField {
    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None | Some("createdAt") => Ok(SortField::CreatedAt),
            Some("views") => Ok(SortField::Views),
            Some("duration") => Ok(SortField::Duration),
            Some("title") => Ok(SortField::Title),
            Some(other) => Err(AppError::Validation(format!(
                "Invalid sortBy '{}', expected one of createdAt, views, duration, title",
                other
            ))),
        }
    }

    fn column(self) -> &'static str {
        match self {
            SortField::CreatedAt => "v.created_at",
            SortField::Views => "v.views",
            SortField::Duration => "v.duration",
            SortField::Title => "v.title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("desc") => Ok(SortDirection::Desc),
            Some("asc") => Ok(SortDirection::Asc),
            Some(other) => Err(AppError::Validation(format!(
                "Invalid sortType '{}', expected asc or desc",
                other
            ))),
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Lowercased title and description, matched by [`search_patterns`].
///
/// SQLite's `LIKE` only folds ASCII, so case folding happens here for every
/// Unicode letter and the column is compared against lowercased patterns.
pub fn search_text(title: &str, description: &str) -> String {
    format!("{}\n{}", title.to_lowercase(), description.to_lowercase())
}

/// LIKE patterns for each whitespace separated term, lowercased, with wildcards escaped.
pub fn search_patterns(query: Option<&str>) -> Vec<String> {
    query
        .unwrap_or_default()
        .split_whitespace()
        .map(|term| {
            let escaped = term
                .to_lowercase()
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{}%", escaped)
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub query: Option<String>,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VideoListResponse {
    pub videos: Vec<VideoWithOwner>,
    pub pagination: PaginationInfo,
}

fn push_list_filters(builder: &mut QueryBuilder<'_, Sqlite>, owner_id: &Option<String>, patterns: &[String]) {
    builder.push(" WHERE v.is_published = 1");

    if let Some(owner_id) = owner_id {
        builder.push(" AND v.owner_id = ");
        builder.push_bind(owner_id.clone());
    }

    if !patterns.is_empty() {
        builder.push(" AND (");
        for (i, pattern) in patterns.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            builder.push("v.search_text LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\'");
        }
        builder.push(")");
    }
}

#[tracing::instrument(name = "List videos", skip(inner))]
pub async fn get_all_videos(
    State(inner): State<InnerState>,
    AppQuery(params): AppQuery<VideoListParams>,
) -> Result<ApiResponse<VideoListResponse>, AppError> {
    let InnerState { db, .. } = inner;

    let (page, limit, offset) = PaginationParams {
        page: params.page,
        limit: params.limit,
    }
    .resolve(10);
    let sort_field = SortField::parse(params.sort_by.as_deref())?;
    let direction = SortDirection::parse(params.sort_type.as_deref())?;
    let owner_id = match optional(params.user_id) {
        Some(raw) => Some(parse_id(&raw, "user")?),
        None => None,
    };
    let patterns = search_patterns(params.query.as_deref());

    tracing::debug!(
        "Listing videos page={} limit={} sort={:?} {:?} terms={}",
        page,
        limit,
        sort_field,
        direction,
        patterns.len()
    );

    let mut count_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM videos v");
    push_list_filters(&mut count_builder, &owner_id, &patterns);
    let total: i64 = count_builder.build_query_scalar().fetch_one(&db).await?;

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM videos v JOIN users u ON u.id = v.owner_id",
        VIDEO_WITH_OWNER_COLUMNS
    ));
    push_list_filters(&mut builder, &owner_id, &patterns);
    builder.push(format!(
        " ORDER BY {col} {dir}, v.rowid {dir} LIMIT ",
        col = sort_field.column(),
        dir = direction.keyword()
    ));
    builder.push_bind(i64::from(limit));
    builder.push(" OFFSET ");
    builder.push_bind(i64::from(offset));

    let rows: Vec<VideoOwnerRow> = builder.build_query_as().fetch_all(&db).await?;
    tracing::info!("Fetched {} of {} videos", rows.len(), total);

    Ok(ApiResponse::ok(
        VideoListResponse {
            videos: rows.into_iter().map(VideoWithOwner::from).collect(),
            pagination: PaginationInfo::new(page, limit, total),
        },
        "Videos fetched successfully",
    ))
}

#[derive(TryFromMultipart)]
pub struct PublishVideoForm {
    pub title: Option<String>,
    pub description: Option<String>,
    #[form_data(field_name = "videoFile", limit = "unlimited")]
    pub video_file: Option<FieldData<Bytes>>,
    #[form_data(limit = "unlimited")]
    pub thumbnail: Option<FieldData<Bytes>>,
}

#[tracing::instrument(name = "Publish video", skip(inner, current_user, form), fields(user_id = %current_user.id))]
pub async fn publish_a_video(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    AppMultipart(form): AppMultipart<PublishVideoForm>,
) -> Result<ApiResponse<Video>, AppError> {
    let InnerState { db, media, config } = inner;

    let title = required(form.title, "title")?;
    let description = required(form.description, "description")?;
    let video_field = form
        .video_file
        .ok_or_else(|| AppError::Validation("Video file is required".to_string()))?;
    let thumbnail_field = form
        .thumbnail
        .ok_or_else(|| AppError::Validation("Thumbnail is required".to_string()))?;

    let video_file = upload_field(media.as_ref(), &config.upload_temp_dir, &video_field).await?;
    let thumbnail = upload_field(media.as_ref(), &config.upload_temp_dir, &thumbnail_field).await?;

    let video_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().naive_utc();
    let video = sqlx::query_as::<_, Video>(
        r#"
        INSERT INTO videos (id, video_file, thumbnail, title, description, search_text, duration, views, is_published, owner_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, 1, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&video_id)
    .bind(&video_file.url)
    .bind(&thumbnail.url)
    .bind(&title)
    .bind(&description)
    .bind(search_text(&title, &description))
    .bind(video_file.duration.unwrap_or(0.0))
    .bind(&current_user.id)
    .bind(now)
    .bind(now)
    .fetch_one(&db)
    .await?;

    tracing::info!("Video {} published", video.id);
    Ok(ApiResponse::created(video, "Video published successfully"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    #[serde(flatten)]
    pub video: VideoWithOwner,
    pub likes_count: i64,
    pub is_liked: bool,
}

#[tracing::instrument(name = "Get video", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn get_video_by_id(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<VideoDetails>, AppError> {
    let InnerState { db, .. } = inner;
    let video_id = parse_id(&video_id, "video")?;

    let query = format!(
        "SELECT {} FROM videos v JOIN users u ON u.id = v.owner_id WHERE v.id = ?",
        VIDEO_WITH_OWNER_COLUMNS
    );
    let row = sqlx::query_as::<_, VideoOwnerRow>(&query)
        .bind(&video_id)
        .fetch_optional(&db)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;

    if !row.video.is_published && row.video.owner_id != current_user.id {
        tracing::debug!("Hiding unpublished video {} from non-owner", video_id);
        return Err(AppError::NotFound("Video not found".to_string()));
    }

    let now = chrono::Utc::now().naive_utc();
    let mut transaction = db.begin().await?;
    sqlx::query("UPDATE videos SET views = views + 1 WHERE id = ?")
        .bind(&video_id)
        .execute(&mut *transaction)
        .await?;
    sqlx::query(
        r#"
        INSERT INTO watch_history (user_id, video_id, watched_at) VALUES (?, ?, ?)
        ON CONFLICT (user_id, video_id) DO UPDATE SET watched_at = excluded.watched_at
        "#,
    )
    .bind(&current_user.id)
    .bind(&video_id)
    .bind(now)
    .execute(&mut *transaction)
    .await?;
    transaction.commit().await?;

    let (likes_count, is_liked): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COALESCE(SUM(liked_by = ?), 0)
        FROM likes WHERE video_id = ?
        "#,
    )
    .bind(&current_user.id)
    .bind(&video_id)
    .fetch_one(&db)
    .await?;

    let mut video = VideoWithOwner::from(row);
    video.video.views += 1;

    Ok(ApiResponse::ok(
        VideoDetails {
            video,
            likes_count,
            is_liked: is_liked > 0,
        },
        "Video fetched successfully",
    ))
}

#[derive(TryFromMultipart)]
pub struct UpdateVideoForm {
    pub title: Option<String>,
    pub description: Option<String>,
    #[form_data(limit = "unlimited")]
    pub thumbnail: Option<FieldData<Bytes>>,
}

#[tracing::instrument(name = "Update video", skip(inner, current_user, form), fields(user_id = %current_user.id))]
pub async fn update_video(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(video_id): Path<String>,
    AppMultipart(form): AppMultipart<UpdateVideoForm>,
) -> Result<ApiResponse<Video>, AppError> {
    let InnerState { db, media, config } = inner;
    let video_id = parse_id(&video_id, "video")?;

    let title = optional(form.title);
    let description = optional(form.description);
    if title.is_none() && description.is_none() && form.thumbnail.is_none() {
        return Err(AppError::Validation(
            "Provide a title, description or thumbnail to update".to_string(),
        ));
    }

    let existing = find_owned_video(&db, &video_id, &current_user.id).await?;
    let folded = search_text(
        title.as_deref().unwrap_or(&existing.title),
        description.as_deref().unwrap_or(&existing.description),
    );

    let thumbnail = match &form.thumbnail {
        Some(field) => Some(upload_field(media.as_ref(), &config.upload_temp_dir, field).await?.url),
        None => None,
    };

    let video = sqlx::query_as::<_, Video>(
        r#"
        UPDATE videos
        SET title = COALESCE(?, title),
            description = COALESCE(?, description),
            thumbnail = COALESCE(?, thumbnail),
            search_text = ?,
            updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&title)
    .bind(&description)
    .bind(&thumbnail)
    .bind(&folded)
    .bind(chrono::Utc::now().naive_utc())
    .bind(&video_id)
    .fetch_one(&db)
    .await?;

    tracing::info!("Video {} updated", video.id);
    Ok(ApiResponse::ok(video, "Video updated successfully"))
}

#[tracing::instrument(name = "Delete video", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn delete_video(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<Empty>, AppError> {
    let InnerState { db, .. } = inner;
    let video_id = parse_id(&video_id, "video")?;

    find_owned_video(&db, &video_id, &current_user.id).await?;

    let mut transaction = db.begin().await?;
    let statements = [
        "DELETE FROM likes WHERE comment_id IN (SELECT id FROM comments WHERE video_id = ?)",
        "DELETE FROM likes WHERE video_id = ?",
        "DELETE FROM comments WHERE video_id = ?",
        "DELETE FROM playlist_videos WHERE video_id = ?",
        "DELETE FROM watch_history WHERE video_id = ?",
        "DELETE FROM videos WHERE id = ?",
    ];
    for statement in statements {
        let result = sqlx::query(statement)
            .bind(&video_id)
            .execute(&mut *transaction)
            .await?;
        tracing::debug!("{} -> {} rows", statement, result.rows_affected());
    }
    transaction.commit().await?;

    tracing::info!("Video {} deleted", video_id);
    Ok(ApiResponse::ok(Empty {}, "Video deleted successfully"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishStatus {
    pub is_published: bool,
}

#[tracing::instrument(name = "Toggle publish status", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn toggle_publish_status(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<PublishStatus>, AppError> {
    let InnerState { db, .. } = inner;
    let video_id = parse_id(&video_id, "video")?;

    find_owned_video(&db, &video_id, &current_user.id).await?;

    let is_published: bool = sqlx::query_scalar(
        r#"
        UPDATE videos SET is_published = NOT is_published, updated_at = ?
        WHERE id = ? AND owner_id = ?
        RETURNING is_published
        "#,
    )
    .bind(chrono::Utc::now().naive_utc())
    .bind(&video_id)
    .bind(&current_user.id)
    .fetch_one(&db)
    .await?;

    tracing::info!("Video {} is_published = {}", video_id, is_published);
    Ok(ApiResponse::ok(
        PublishStatus { is_published },
        "Video publish status toggled successfully",
    ))
}
