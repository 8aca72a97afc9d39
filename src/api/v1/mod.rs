//! API Version 1 endpoints
//!
//! One module per resource, each mounted under its own prefix. Everything
//! except registration, login, token refresh and the health check sits
//! behind the auth middleware.

pub mod comments;
pub mod dashboard;
pub mod likes;
pub mod login;
pub mod playlists;
pub mod subscriptions;
pub mod tweets;
pub mod users;
pub mod videos;

use axum::routing::{get, patch, post};
use axum::{middleware, Router};

use crate::api::common::middleware::auth_middleware;
use crate::system::create_system_router;
use crate::InnerState;

fn users_router(state: InnerState) -> Router<InnerState> {
    let protected = Router::new()
        .route("/logout", post(login::logout_user))
        .route("/change-password", post(users::change_password))
        .route("/current-user", get(users::get_current_user))
        .route("/update-account", patch(users::update_account_details))
        .route("/avatar", patch(users::update_user_avatar))
        .route("/cover-image", patch(users::update_user_cover_image))
        .route("/c/:username", get(users::get_user_channel_profile))
        .route("/history", get(users::get_watch_history))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/register", post(users::register_user))
        .route("/login", post(login::login_user))
        .route("/refresh-token", post(login::refresh_access_token))
        .merge(protected)
}

fn videos_router(state: InnerState) -> Router<InnerState> {
    Router::new()
        .route("/", get(videos::get_all_videos).post(videos::publish_a_video))
        .route(
            "/:videoId",
            get(videos::get_video_by_id)
                .patch(videos::update_video)
                .delete(videos::delete_video),
        )
        .route("/toggle/publish/:videoId", patch(videos::toggle_publish_status))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn comments_router(state: InnerState) -> Router<InnerState> {
    Router::new()
        .route(
            "/:videoId",
            get(comments::get_video_comments).post(comments::add_comment),
        )
        .route(
            "/c/:commentId",
            patch(comments::update_comment).delete(comments::delete_comment),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn likes_router(state: InnerState) -> Router<InnerState> {
    Router::new()
        .route("/toggle/v/:videoId", post(likes::toggle_video_like))
        .route("/toggle/c/:commentId", post(likes::toggle_comment_like))
        .route("/toggle/t/:tweetId", post(likes::toggle_tweet_like))
        .route("/videos", get(likes::get_liked_videos))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn subscriptions_router(state: InnerState) -> Router<InnerState> {
    Router::new()
        .route(
            "/c/:channelId",
            post(subscriptions::toggle_subscription)
                .get(subscriptions::get_user_channel_subscribers),
        )
        .route("/u/:subscriberId", get(subscriptions::get_subscribed_channels))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn playlists_router(state: InnerState) -> Router<InnerState> {
    Router::new()
        .route("/", post(playlists::create_playlist))
        .route(
            "/:playlistId",
            get(playlists::get_playlist_by_id)
                .patch(playlists::update_playlist)
                .delete(playlists::delete_playlist),
        )
        .route(
            "/add/:videoId/:playlistId",
            patch(playlists::add_video_to_playlist),
        )
        .route(
            "/remove/:videoId/:playlistId",
            patch(playlists::remove_video_from_playlist),
        )
        .route("/user/:userId", get(playlists::get_user_playlists))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn tweets_router(state: InnerState) -> Router<InnerState> {
    Router::new()
        .route("/", post(tweets::create_tweet))
        .route("/user/:userId", get(tweets::get_user_tweets))
        .route(
            "/:tweetId",
            patch(tweets::update_tweet).delete(tweets::delete_tweet),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn dashboard_router(state: InnerState) -> Router<InnerState> {
    Router::new()
        .route("/stats", get(dashboard::get_channel_stats))
        .route("/videos", get(dashboard::get_channel_videos))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Creates the V1 API router
#[tracing::instrument(name = "create_v1_router", skip(state))]
pub fn create_v1_router(state: InnerState) -> Router<InnerState> {
    tracing::info!("Creating V1 API router");

    Router::new()
        .nest("/healthcheck", create_system_router())
        .nest("/users", users_router(state.clone()))
        .nest("/videos", videos_router(state.clone()))
        .nest("/comments", comments_router(state.clone()))
        .nest("/likes", likes_router(state.clone()))
        .nest("/subscriptions", subscriptions_router(state.clone()))
        .nest("/playlist", playlists_router(state.clone()))
        .nest("/tweets", tweets_router(state.clone()))
        .nest("/dashboard", dashboard_router(state))
}
