//! Persona-rs server entry point.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware};
use persona_api::{middleware::AppState, router as api_router};
use persona_common::Config;
use persona_core::{CommentService, TallyReconciler, VoteService, VoteStatsService};
use persona_db::repositories::{CommentRepository, VoteRepository};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "persona=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting persona-rs server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = persona_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    persona_db::migrate(&db).await?;
    info!("Migrations completed");

    let db = Arc::new(db);

    // Initialize repositories
    let comment_repo = CommentRepository::new(Arc::clone(&db));
    let vote_repo = VoteRepository::new(Arc::clone(&db));

    // Initialize services
    let comment_service = CommentService::new(comment_repo.clone());
    let vote_service = VoteService::new(vote_repo.clone(), comment_repo.clone());
    let vote_stats_service = VoteStatsService::new(vote_repo, comment_service.clone());

    // Tally reconciliation
    let reconciler = TallyReconciler::new(comment_repo, config.votes.reconcile_batch_size);
    if config.votes.reconcile_on_startup {
        info!("Reconciling comment tallies...");
        let report = reconciler.reconcile_all().await?;
        info!(
            checked = report.checked,
            repaired = report.repaired,
            "Startup reconciliation completed"
        );
    }
    if config.votes.reconcile_interval_secs > 0 {
        let interval = Duration::from_secs(config.votes.reconcile_interval_secs);
        info!(interval_secs = interval.as_secs(), "Starting periodic tally reconciliation");
        tokio::spawn(reconciler.run_periodic(interval));
    }

    let state = AppState {
        comment_service,
        vote_service,
        vote_stats_service,
        db,
    };

    // Build router
    let app = Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn(
            persona_api::middleware::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let host: IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Peer addresses feed the voter fingerprint when no proxy headers are set.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");
    Ok(())
}
