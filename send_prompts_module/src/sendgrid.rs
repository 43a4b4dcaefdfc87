use chrono::Utc;
use reqwest::blocking::Client;
use serde_json::json;

use crate::{SendPromptError, SendPromptParams};

pub const SENDGRID_API_BASE: &str = "https://api.sendgrid.com";

/// Sends prompts through the SendGrid v3 mail send API.
#[derive(Debug, Clone)]
pub struct SendGridMailer {
    client: Client,
    api_key: String,
    api_base: String,
}

impl SendGridMailer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_api_base(api_key, SENDGRID_API_BASE)
    }

    /// Points the client at a different API host. Used by tests.
    pub fn with_api_base(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Dispatches one prompt and returns the provider message id from the
    /// `X-Message-Id` response header. SendGrid occasionally omits the
    /// header on accepted sends; a synthetic timestamped id stands in so the
    /// audit trail still gets a record.
    pub fn send_prompt(&self, params: &SendPromptParams) -> Result<String, SendPromptError> {
        let mut message = json!({
            "personalizations": [{
                "to": [{"email": params.to_email, "name": params.to_name}],
            }],
            "from": {"email": params.from_email, "name": params.from_name},
            "subject": params.subject,
            "content": [{"type": "text/html", "value": params.html_body}],
        });
        if let Some(reply_to) = params.reply_to.as_deref() {
            message["reply_to"] = json!({"email": reply_to});
        }

        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&message)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SendPromptError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = response
            .headers()
            .get("X-Message-Id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        Ok(message_id
            .unwrap_or_else(|| format!("unknown-{}", Utc::now().format("%Y-%m-%dT%H:%M:%SZ"))))
    }
}
