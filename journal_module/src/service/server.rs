use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tokio::task;
use tracing::info;

use crate::ingestion::IngestionPipeline;
use crate::mailer::start_mailer;
use crate::store::{EntryStore, PromptStore};

use super::config::ServiceConfig;
use super::ses_webhook::ses_webhook;
use super::state::AppState;
use super::webhook::inbound_webhook;
use super::BoxError;

pub const INBOUND_BODY_MAX_BYTES: usize = 10 * 1024 * 1024;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/up", get(up))
        .route("/webhook", post(inbound_webhook))
        .route("/ses-webhook", post(ses_webhook))
        .with_state(state)
        .layer(DefaultBodyLimit::max(INBOUND_BODY_MAX_BYTES))
}

/// Runs the webhook server with the daily prompt mailer alongside it. The
/// mailer is stopped and joined once the server finishes shutting down.
pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let config = Arc::new(config);
    let entries = EntryStore::new(&config.db_path)?;
    let prompts = PromptStore::new(&config.db_path)?;
    let pipeline = Arc::new(IngestionPipeline::new(
        config.required_to_address.clone(),
        entries.clone(),
    ));

    let provider = config.provider.clone();
    let gateway = task::spawn_blocking(move || provider.build_gateway())
        .await
        .map_err(|err| -> BoxError { err.into() })?;
    let mut mailer = start_mailer(config.mailer_config(), gateway, entries, prompts);

    let state = AppState {
        config: config.clone(),
        pipeline,
    };

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!("journal service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_result = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await;
    mailer.stop_and_join();
    serve_result?;
    Ok(())
}

async fn up() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
