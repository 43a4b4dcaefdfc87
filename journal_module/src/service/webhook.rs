use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::task;
use tracing::{error, info};

use crate::ingestion::IngestOutcome;

use super::auth::require_basic_auth;
use super::state::AppState;

/// `POST /webhook` — form-data delivery with the full raw RFC-822 message in
/// the `email` field.
pub(super) async fn inbound_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    if let Err(response) = require_basic_auth(
        &headers,
        &state.config.webhook_username,
        &state.config.webhook_password,
    ) {
        info!("unauthorized webhook delivery rejected");
        return response;
    }

    let raw = match read_email_field(multipart).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            info!("webhook form had no email field");
            return (StatusCode::BAD_REQUEST, "Missing email field").into_response();
        }
        Err(err) => {
            info!("unreadable webhook form: {}", err);
            return (StatusCode::BAD_REQUEST, "Error parsing form").into_response();
        }
    };

    run_pipeline(state, raw, None).await
}

async fn read_email_field(mut multipart: Multipart) -> Result<Option<Vec<u8>>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("email") {
            return Ok(Some(field.bytes().await?.to_vec()));
        }
    }
    Ok(None)
}

/// Shared tail of both webhook routes: run the synchronous pipeline off the
/// async runtime and map its outcome onto the HTTP contract. Discards are a
/// 200 — the delivering provider did nothing wrong.
pub(super) async fn run_pipeline(
    state: AppState,
    raw: Vec<u8>,
    fallback_to: Option<String>,
) -> Response {
    let pipeline = state.pipeline.clone();
    let joined =
        task::spawn_blocking(move || pipeline.process(&raw, fallback_to.as_deref())).await;
    let result = match joined {
        Ok(result) => result,
        Err(err) => {
            error!("ingestion task failed to run: {}", err);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error processing email").into_response();
        }
    };

    match result {
        Ok(IngestOutcome::Stored { day }) => {
            info!("webhook stored entry for {}", day);
            (StatusCode::OK, "ok").into_response()
        }
        Ok(IngestOutcome::Discarded(reason)) => {
            info!("webhook discarded message: {:?}", reason);
            (StatusCode::OK, "ok").into_response()
        }
        Err(err) => {
            error!("webhook failed to process message: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error processing email").into_response()
        }
    }
}
