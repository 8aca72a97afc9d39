use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use std::error::Error;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use vidtube_api::config::AppConfig;
use vidtube_api::db::init_db;
use vidtube_api::media::CloudinaryClient;
use vidtube_api::{build_app, InnerState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidtube_api=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let port = config.port;

    let db = init_db(&config.database_url).await?;
    let media = Arc::new(CloudinaryClient::new(&config.cloudinary));

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let state = InnerState::new(db, media, config);
    let app = build_app(state)
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
