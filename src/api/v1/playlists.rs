use axum::extract::{Path, State};
use axum::Extension;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::api::common::extract::{optional, parse_id, required, AppJson};
use crate::api::common::middleware::CurrentUser;
use crate::api::common::{ApiResponse, Empty};
use crate::api::v1::users::ensure_user_exists;
use crate::api::v1::videos::{
    find_visible_video, VideoOwnerRow, VideoWithOwner, VIDEO_WITH_OWNER_COLUMNS, VISIBLE_TO_VIEWER,
};
use crate::errors::AppError;
use crate::InnerState;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistWithVideos {
    #[serde(flatten)]
    pub playlist: Playlist,
    pub videos: Vec<VideoWithOwner>,
    pub total_videos: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlaylistRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlaylistRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

async fn find_playlist(db: &SqlitePool, playlist_id: &str) -> Result<Playlist, AppError> {
    sqlx::query_as::<_, Playlist>("SELECT * FROM playlists WHERE id = ?")
        .bind(playlist_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Playlist not found".to_string()))
}

async fn find_owned_playlist(
    db: &SqlitePool,
    playlist_id: &str,
    user_id: &str,
) -> Result<Playlist, AppError> {
    let playlist = find_playlist(db, playlist_id).await?;
    if playlist.owner_id != user_id {
        tracing::warn!("User {} does not own playlist {}", user_id, playlist_id);
        return Err(AppError::Forbidden(
            "You are not allowed to modify this playlist".to_string(),
        ));
    }
    Ok(playlist)
}

/// Playlist videos the viewer may see, in the order they were added.
async fn playlist_videos(
    db: &SqlitePool,
    playlist_id: &str,
    viewer_id: &str,
) -> Result<Vec<VideoWithOwner>, AppError> {
    let query = format!(
        r#"
        SELECT {}
        FROM playlist_videos pv
        JOIN videos v ON v.id = pv.video_id
        JOIN users u ON u.id = v.owner_id
        WHERE pv.playlist_id = ? AND {}
        ORDER BY pv.added_at ASC, pv.rowid ASC
        "#,
        VIDEO_WITH_OWNER_COLUMNS, VISIBLE_TO_VIEWER
    );
    let rows = sqlx::query_as::<_, VideoOwnerRow>(&query)
        .bind(playlist_id)
        .bind(viewer_id)
        .fetch_all(db)
        .await?;
    Ok(rows.into_iter().map(VideoWithOwner::from).collect())
}

async fn with_videos(
    db: &SqlitePool,
    playlist: Playlist,
    viewer_id: &str,
) -> Result<PlaylistWithVideos, AppError> {
    let videos = playlist_videos(db, &playlist.id, viewer_id).await?;
    Ok(PlaylistWithVideos {
        total_videos: videos.len(),
        playlist,
        videos,
    })
}

#[tracing::instrument(name = "Create playlist", skip(inner, current_user, payload), fields(user_id = %current_user.id))]
pub async fn create_playlist(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    AppJson(payload): AppJson<CreatePlaylistRequest>,
) -> Result<ApiResponse<Playlist>, AppError> {
    let InnerState { db, .. } = inner;
    let name = required(payload.name, "name")?;
    let description = required(payload.description, "description")?;

    let now = chrono::Utc::now().naive_utc();
    let playlist = sqlx::query_as::<_, Playlist>(
        r#"
        INSERT INTO playlists (id, name, description, owner_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&name)
    .bind(&description)
    .bind(&current_user.id)
    .bind(now)
    .bind(now)
    .fetch_one(&db)
    .await?;

    tracing::info!("Playlist {} created", playlist.id);
    Ok(ApiResponse::created(playlist, "Playlist created successfully"))
}

#[tracing::instrument(name = "Get playlist", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn get_playlist_by_id(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(playlist_id): Path<String>,
) -> Result<ApiResponse<PlaylistWithVideos>, AppError> {
    let InnerState { db, .. } = inner;
    let playlist_id = parse_id(&playlist_id, "playlist")?;
    let playlist = find_playlist(&db, &playlist_id).await?;

    Ok(ApiResponse::ok(
        with_videos(&db, playlist, &current_user.id).await?,
        "Playlist fetched successfully",
    ))
}

#[tracing::instrument(name = "Update playlist", skip(inner, current_user, payload), fields(user_id = %current_user.id))]
pub async fn update_playlist(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(playlist_id): Path<String>,
    AppJson(payload): AppJson<UpdatePlaylistRequest>,
) -> Result<ApiResponse<Playlist>, AppError> {
    let InnerState { db, .. } = inner;
    let playlist_id = parse_id(&playlist_id, "playlist")?;

    let name = optional(payload.name);
    let description = optional(payload.description);
    if name.is_none() && description.is_none() {
        return Err(AppError::Validation(
            "Provide a name or description to update".to_string(),
        ));
    }

    find_owned_playlist(&db, &playlist_id, &current_user.id).await?;

    let playlist = sqlx::query_as::<_, Playlist>(
        r#"
        UPDATE playlists
        SET name = COALESCE(?, name), description = COALESCE(?, description), updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&name)
    .bind(&description)
    .bind(chrono::Utc::now().naive_utc())
    .bind(&playlist_id)
    .fetch_one(&db)
    .await?;

    Ok(ApiResponse::ok(playlist, "Playlist updated successfully"))
}

#[tracing::instrument(name = "Delete playlist", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn delete_playlist(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(playlist_id): Path<String>,
) -> Result<ApiResponse<Empty>, AppError> {
    let InnerState { db, .. } = inner;
    let playlist_id = parse_id(&playlist_id, "playlist")?;
    find_owned_playlist(&db, &playlist_id, &current_user.id).await?;

    let mut transaction = db.begin().await?;
    sqlx::query("DELETE FROM playlist_videos WHERE playlist_id = ?")
        .bind(&playlist_id)
        .execute(&mut *transaction)
        .await?;
    sqlx::query("DELETE FROM playlists WHERE id = ?")
        .bind(&playlist_id)
        .execute(&mut *transaction)
        .await?;
    transaction.commit().await?;

    tracing::info!("Playlist {} deleted", playlist_id);
    Ok(ApiResponse::ok(Empty {}, "Playlist deleted successfully"))
}

#[tracing::instrument(name = "Add video to playlist", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn add_video_to_playlist(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path((video_id, playlist_id)): Path<(String, String)>,
) -> Result<ApiResponse<PlaylistWithVideos>, AppError> {
    let InnerState { db, .. } = inner;
    let video_id = parse_id(&video_id, "video")?;
    let playlist_id = parse_id(&playlist_id, "playlist")?;

    let playlist = find_owned_playlist(&db, &playlist_id, &current_user.id).await?;
    find_visible_video(&db, &video_id, &current_user.id).await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO playlist_videos (playlist_id, video_id, added_at) VALUES (?, ?, ?)
        ON CONFLICT (playlist_id, video_id) DO NOTHING
        "#,
    )
    .bind(&playlist_id)
    .bind(&video_id)
    .bind(chrono::Utc::now().naive_utc())
    .execute(&db)
    .await?
    .rows_affected();

    if inserted == 0 {
        tracing::debug!("Video {} already in playlist {}", video_id, playlist_id);
    }

    Ok(ApiResponse::ok(
        with_videos(&db, playlist, &current_user.id).await?,
        "Video added to playlist successfully",
    ))
}

#[tracing::instrument(name = "Remove video from playlist", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn remove_video_from_playlist(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path((video_id, playlist_id)): Path<(String, String)>,
) -> Result<ApiResponse<PlaylistWithVideos>, AppError> {
    let InnerState { db, .. } = inner;
    let video_id = parse_id(&video_id, "video")?;
    let playlist_id = parse_id(&playlist_id, "playlist")?;

    let playlist = find_owned_playlist(&db, &playlist_id, &current_user.id).await?;

    let removed = sqlx::query("DELETE FROM playlist_videos WHERE playlist_id = ? AND video_id = ?")
        .bind(&playlist_id)
        .bind(&video_id)
        .execute(&db)
        .await?
        .rows_affected();

    if removed == 0 {
        return Err(AppError::NotFound(
            "Video is not in this playlist".to_string(),
        ));
    }

    Ok(ApiResponse::ok(
        with_videos(&db, playlist, &current_user.id).await?,
        "Video removed from playlist successfully",
    ))
}

#[tracing::instrument(name = "Get user playlists", skip(inner, current_user), fields(viewer_id = %current_user.id))]
pub async fn get_user_playlists(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(user_id): Path<String>,
) -> Result<ApiResponse<Vec<PlaylistWithVideos>>, AppError> {
    let InnerState { db, .. } = inner;
    let user_id = parse_id(&user_id, "user")?;
    ensure_user_exists(&db, &user_id).await?;

    let playlists = sqlx::query_as::<_, Playlist>(
        "SELECT * FROM playlists WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(&user_id)
    .fetch_all(&db)
    .await?;

    let mut result = Vec::with_capacity(playlists.len());
    for playlist in playlists {
        result.push(with_videos(&db, playlist, &current_user.id).await?);
    }

    Ok(ApiResponse::ok(result, "User playlists fetched successfully"))
}
