use axum::extract::{Path, State};
use axum::Extension;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::api::common::extract::parse_id;
use crate::api::common::middleware::CurrentUser;
use crate::api::common::ApiResponse;
use crate::api::v1::users::{ensure_user_exists, user_exists};
use crate::errors::AppError;
use crate::InnerState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub is_subscribed: bool,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionUser {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub avatar: String,
    pub subscribed_at: chrono::NaiveDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSubscribers {
    pub subscribers: Vec<SubscriptionUser>,
    pub subscribers_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedChannels {
    pub channels: Vec<SubscriptionUser>,
    pub channels_count: usize,
}

/// Flips the subscription in one transaction and returns the new state.
#[tracing::instrument(name = "Toggle subscription", skip(db))]
pub async fn toggle_subscription_row(
    db: &SqlitePool,
    subscriber_id: &str,
    channel_id: &str,
) -> Result<bool, AppError> {
    let mut transaction = db.begin().await?;

    let removed = sqlx::query("DELETE FROM subscriptions WHERE subscriber_id = ? AND channel_id = ?")
        .bind(subscriber_id)
        .bind(channel_id)
        .execute(&mut *transaction)
        .await?
        .rows_affected();

    let is_subscribed = if removed > 0 {
        false
    } else {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, subscriber_id, channel_id, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (subscriber_id, channel_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(subscriber_id)
        .bind(channel_id)
        .bind(chrono::Utc::now().naive_utc())
        .execute(&mut *transaction)
        .await?;
        true
    };

    transaction.commit().await?;
    Ok(is_subscribed)
}

#[tracing::instrument(name = "Toggle channel subscription", skip(inner, current_user), fields(user_id = %current_user.id))]
pub async fn toggle_subscription(
    State(inner): State<InnerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(channel_id): Path<String>,
) -> Result<ApiResponse<SubscriptionStatus>, AppError> {
    let InnerState { db, .. } = inner;
    let channel_id = parse_id(&channel_id, "channel")?;

    if !user_exists(&db, &channel_id).await? {
        return Err(AppError::NotFound("Channel not found".to_string()));
    }
    if channel_id == current_user.id {
        tracing::warn!("User tried to subscribe to their own channel");
        return Err(AppError::Validation(
            "You cannot subscribe to your own channel".to_string(),
        ));
    }

    let is_subscribed = toggle_subscription_row(&db, &current_user.id, &channel_id).await?;
    tracing::info!("Subscription to {} is now {}", channel_id, is_subscribed);

    let message = if is_subscribed {
        "Subscribed successfully"
    } else {
        "Unsubscribed successfully"
    };
    Ok(ApiResponse::ok(SubscriptionStatus { is_subscribed }, message))
}

#[tracing::instrument(name = "Get channel subscribers", skip(inner))]
pub async fn get_user_channel_subscribers(
    State(inner): State<InnerState>,
    Path(channel_id): Path<String>,
) -> Result<ApiResponse<ChannelSubscribers>, AppError> {
    let InnerState { db, .. } = inner;
    let channel_id = parse_id(&channel_id, "channel")?;
    if !user_exists(&db, &channel_id).await? {
        return Err(AppError::NotFound("Channel not found".to_string()));
    }

    let subscribers = sqlx::query_as::<_, SubscriptionUser>(
        r#"
        SELECT u.id, u.username, u.full_name, u.avatar, s.created_at AS subscribed_at
        FROM subscriptions s
        JOIN users u ON u.id = s.subscriber_id
        WHERE s.channel_id = ?
        ORDER BY s.created_at DESC, s.rowid DESC
        "#,
    )
    .bind(&channel_id)
    .fetch_all(&db)
    .await?;

    Ok(ApiResponse::ok(
        ChannelSubscribers {
            subscribers_count: subscribers.len(),
            subscribers,
        },
        "Subscribers fetched successfully",
    ))
}

#[tracing::instrument(name = "Get subscribed channels", skip(inner))]
pub async fn get_subscribed_channels(
    State(inner): State<InnerState>,
    Path(subscriber_id): Path<String>,
) -> Result<ApiResponse<SubscribedChannels>, AppError> {
    let InnerState { db, .. } = inner;
    let subscriber_id = parse_id(&subscriber_id, "subscriber")?;
    ensure_user_exists(&db, &subscriber_id).await?;

    let channels = sqlx::query_as::<_, SubscriptionUser>(
        r#"
        SELECT u.id, u.username, u.full_name, u.avatar, s.created_at AS subscribed_at
        FROM subscriptions s
        JOIN users u ON u.id = s.channel_id
        WHERE s.subscriber_id = ?
        ORDER BY s.created_at DESC, s.rowid DESC
        "#,
    )
    .bind(&subscriber_id)
    .fetch_all(&db)
    .await?;

    Ok(ApiResponse::ok(
        SubscribedChannels {
            channels_count: channels.len(),
            channels,
        },
        "Subscribed channels fetched successfully",
    ))
}
