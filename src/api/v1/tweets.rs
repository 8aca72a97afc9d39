use axum::extract::{Path, State};
use axum::Extension;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::api::common::extract::{parse_id, required, AppJson};
use crate::api::common::middleware::CurrentUser;
use crate::api::common::{ApiResponse, Empty};
use crate::api::v1::users::ensure_user_exists;
use crate::errors::AppError;
use crate::InnerState;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Tweet {
    pub id: String,
    pub content: String,
    pub owner_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TweetWithLikes {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub tweet: Tweet,
    pub likes_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct TweetRequest {
    pub content: Option<String>,
}

async fn find_owned_tweet(db: &SqlitePool, tweet_id: &str, user_id: &str) -> Result<Tweet, AppError> {
    let tweet = sqlx::query_as::<_, Tweet>("SELECT * FROM tweets WHERE id = ?")
        .bind(tweet_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Tweet not found".to_string()))?;

    if tweet.owner_id != user_id {
        return Err(AppError::Forbidden(
            "You are not allowed to modify this tweet".to_string(),
        ));
    }
    Ok(tweet)
}

#[tracing::instrument(name = "Create tweet", skip(inner, current_user, payload), fields(user_id = %current_user.id))]
pub async fn create_tweet(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    AppJson(payload): AppJson<TweetRequest>,
) -> Result<ApiResponse<Tweet>, AppError> {
    let InnerState { db, .. } = inner;
    let content = required(payload.content, "content")?;

    let now = chrono::Utc::now().naive_utc();
    let tweet = sqlx::query_as::<_, Tweet>(
        r#"
        INSERT INTO tweets (id, content, owner_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&content)
    .bind(&current_user.id)
    .bind(now)
    .bind(now)
    .fetch_one(&db)
    .await?;

    tracing::info!("Tweet {} created", tweet.id);
    Ok(ApiResponse::created(tweet, "Tweet created successfully"))
}

#[tracing::instrument(name = "Get user tweets", skip(inner))]
pub async fn get_user_tweets(
    State(inner): State<InnerState>,
    Path(user_id): Path<String>,
) -> Result<ApiResponse<Vec<TweetWithLikes>>, AppError> {
    let InnerState { db, .. } = inner;
    let user_id = parse_id(&user_id, "user")?;
    ensure_user_exists(&db, &user_id).await?;

    let tweets = sqlx::query_as::<_, TweetWithLikes>(
        r#"
        SELECT t.*, (SELECT COUNT(*) FROM likes l WHERE l.tweet_id = t.id) AS likes_count
        FROM tweets t
        WHERE t.owner_id = ?
        ORDER BY t.created_at DESC, t.rowid DESC
        "#,
    )
    .bind(&user_id)
    .fetch_all(&db)
    .await?;

    Ok(ApiResponse::ok(tweets, "Tweets fetched successfully"))
}

#[tracing::instrument(name = "Update tweet", skip(inner, current_user, payload), fields(user_id = %current_user.id))]
pub async fn update_tweet(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(tweet_id): Path<String>,
    AppJson(payload): AppJson<TweetRequest>,
) -> Result<ApiResponse<Tweet>, AppError> {
    let InnerState { db, .. } = inner;
    let tweet_id = parse_id(&tweet_id, "tweet")?;
    let content = required(payload.content, "content")?;
    find_owned_tweet(&db, &tweet_id, &current_user.id).await?;

    let tweet = sqlx::query_as::<_, Tweet>(
        "UPDATE tweets SET content = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(&content)
    .bind(chrono::Utc::now().naive_utc())
    .bind(&tweet_id)
    .fetch_one(&db)
    .await?;

    Ok(ApiResponse::ok(tweet, "Tweet updated successfully"))
}

#[tracing::instrument(name = "Delete tweet", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn delete_tweet(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(tweet_id): Path<String>,
) -> Result<ApiResponse<Empty>, AppError> {
    let InnerState { db, .. } = inner;
    let tweet_id = parse_id(&tweet_id, "tweet")?;
    find_owned_tweet(&db, &tweet_id, &current_user.id).await?;

    let mut transaction = db.begin().await?;
    sqlx::query("DELETE FROM likes WHERE tweet_id = ?")
        .bind(&tweet_id)
        .execute(&mut *transaction)
        .await?;
    sqlx::query("DELETE FROM tweets WHERE id = ?")
        .bind(&tweet_id)
        .execute(&mut *transaction)
        .await?;
    transaction.commit().await?;

    tracing::info!("Tweet {} deleted", tweet_id);
    Ok(ApiResponse::ok(Empty {}, "Tweet deleted successfully"))
}
