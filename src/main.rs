mod db;
mod errors;
mod routes;
mod tiktok;

use crate::db::init_db;
use crate::routes::{
    chat, delete_video, get_user_data, health_check, import_video, list_videos,
    method_not_allowed, moderate_video, preflight, update_user_data,
};

use axum::http::{header, HeaderName, Method};
use axum::routing::get;
use axum::Router;
use axum_prometheus::PrometheusMetricLayer;
use sqlx::PgPool;
use std::error::Error;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone)]
pub struct InnerState {
    pub db: PgPool,
    pub http: reqwest::Client,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "goshorts_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = init_db().await?;
    let http = reqwest::Client::new();

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    // Matches what the frontend sends: JSON bodies plus the opaque identity
    // header, with preflight results cacheable for a day.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-user-id")])
        .max_age(Duration::from_secs(86400));

    let app_state = InnerState { db, http };

    let app = Router::new()
        .route(
            "/videos",
            get(list_videos)
                .post(import_video)
                .put(moderate_video)
                .delete(delete_video)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/chat",
            axum::routing::post(chat)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/user-data",
            get(get_user_data)
                .post(update_user_data)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(prometheus_layer)
        .with_state(app_state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("Could not initialize TcpListener");

    tracing::debug!(
        "listening on {}",
        listener
            .local_addr()
            .expect("Could not convert listener address to local address")
    );

    axum::serve(listener, app)
        .await
        .expect("Could not successfully connect");

    Ok(())
}
