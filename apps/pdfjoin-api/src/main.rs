//! pdfjoin API server
//!
//! Accepts uploaded PDFs, merges or splits them, and hands the results back
//! as single-use download links. Every operation is available both
//! synchronously and as a polled background job.
//!
//! ## Architecture
//!
//! - `pdfjoin-core` does the PDF work (range validation, page selection,
//!   merging, encryption)
//! - Outputs are staged on disk and deleted on first download or by the
//!   periodic sweep
//! - Jobs are tracked in memory for the lifetime of the process
//! - Rate limiting via tower-governor, one bucket per client IP

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod error;
mod handlers;
mod jobs;
mod staging;
mod state;
mod upload;

use config::Config;
use staging::{spawn_sweeper, SweepSchedule};
use state::AppState;

/// Routes mounted under `/api/pdf`
fn pdf_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(handlers::status))
        .route("/merge", post(handlers::merge))
        .route("/split", post(handlers::split))
        .route("/split-by-bookmarks", post(handlers::split_by_bookmarks))
        .route("/merge/job", post(handlers::merge_job))
        .route("/split/job", post(handlers::split_job))
        .route(
            "/split-by-bookmarks/job",
            post(handlers::split_by_bookmarks_job),
        )
        .route("/start-merge-job", post(handlers::merge_job))
        .route("/start-split-job", post(handlers::split_job))
        .route("/job/:id", get(handlers::job_status))
        .route("/status/job/:id", get(handlers::job_status))
        .route("/download/:reference", get(handlers::download))
}

/// Build the application router without rate limiting
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/pdf", pdf_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(state.max_upload_bytes)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::parse();

    let default_filter = if config.verbose {
        "pdfjoin_api=debug,pdfjoin_core=debug,tower_http=debug"
    } else {
        "pdfjoin_api=info,pdfjoin_core=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pdfjoin API on {}:{}", config.host, config.port);

    let state = AppState::new(&config).await?;

    let sweeper = spawn_sweeper(
        state.staging.clone(),
        state.jobs.clone(),
        SweepSchedule {
            interval: config.sweep_interval(),
            file_retention: config.retention(),
            job_retention: config.job_retention(),
        },
    );

    // Create rate limiter configuration
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(config.rate_limit_replenish_ms())
            .burst_size(config.rate_limit_burst.max(1))
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?,
    );

    let app = router(state).layer(GovernorLayer {
        config: governor_conf,
    });

    let addr = config.addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!(
        "Rate limit: {} requests per {}s per IP",
        config.rate_limit_burst, config.rate_limit_window_secs
    );
    info!("Range policy: {}", config.range_policy);
    if config.disable_encryption {
        info!("Output encryption disabled");
    }

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    sweeper.abort();
    Ok(())
}
