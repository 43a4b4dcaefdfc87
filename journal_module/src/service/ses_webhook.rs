use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::{error, info};

use super::auth::require_basic_auth;
use super::state::AppState;
use super::webhook::run_pipeline;

/// SNS notification wrapper around one received message.
#[derive(Debug, Deserialize)]
pub(super) struct SesWebhookPayload {
    #[serde(rename = "notificationType")]
    notification_type: String,
    mail: SesMail,
    receipt: SesReceipt,
    content: String,
}

#[derive(Debug, Deserialize)]
struct SesMail {
    #[serde(default)]
    #[allow(dead_code)]
    source: Option<String>,
    #[serde(default)]
    destination: Vec<String>,
    #[serde(default)]
    #[allow(dead_code)]
    subject: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SesReceipt {
    action: SesAction,
}

#[derive(Debug, Deserialize)]
struct SesAction {
    #[serde(rename = "type")]
    action_type: String,
    #[serde(rename = "topicArn")]
    #[allow(dead_code)]
    topic_arn: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    encoding: Option<String>,
}

/// Subscription handshake message; SNS sends it once when the topic is
/// wired up, and expects the endpoint to fetch the confirmation URL.
#[derive(Debug, Deserialize)]
struct SnsControlMessage {
    #[serde(rename = "Type")]
    message_type: Option<String>,
    #[serde(rename = "SubscribeURL")]
    subscribe_url: Option<String>,
}

/// `POST /ses-webhook` — SNS-wrapped delivery with the raw RFC-822 message
/// base64-encoded in `content`.
pub(super) async fn ses_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = require_basic_auth(
        &headers,
        &state.config.webhook_username,
        &state.config.webhook_password,
    ) {
        info!("unauthorized notification delivery rejected");
        return response;
    }

    if let Ok(control) = serde_json::from_slice::<SnsControlMessage>(&body) {
        if control.message_type.as_deref() == Some("SubscriptionConfirmation") {
            return confirm_subscription(control.subscribe_url).await;
        }
    }

    let payload: SesWebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            info!("unparsable notification payload: {}", err);
            return (StatusCode::BAD_REQUEST, "Error parsing JSON").into_response();
        }
    };

    if payload.notification_type != "Received" || payload.receipt.action.action_type != "SNS" {
        info!(
            "rejecting notification type {:?} with action {:?}",
            payload.notification_type, payload.receipt.action.action_type
        );
        return (StatusCode::BAD_REQUEST, "Invalid notification").into_response();
    }

    let raw = match BASE64_STANDARD.decode(payload.content.as_bytes()) {
        Ok(raw) => raw,
        Err(err) => {
            info!("notification content is not valid base64: {}", err);
            return (StatusCode::BAD_REQUEST, "Error decoding email content").into_response();
        }
    };

    let fallback_to = payload.mail.destination.first().cloned();
    run_pipeline(state, raw, fallback_to).await
}

async fn confirm_subscription(subscribe_url: Option<String>) -> Response {
    let Some(url) = subscribe_url else {
        info!("subscription confirmation without a SubscribeURL");
        return (StatusCode::BAD_REQUEST, "Missing SubscribeURL").into_response();
    };
    info!("confirming notification subscription at {}", url);
    match reqwest::get(&url).await {
        Ok(_) => (StatusCode::OK, "ok").into_response(),
        Err(err) => {
            error!("failed to confirm subscription: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error confirming subscription",
            )
                .into_response()
        }
    }
}
