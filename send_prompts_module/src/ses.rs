use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::{SendPromptError, SendPromptParams};

const SES_SERVICE: &str = "ses";
const SEND_EMAIL_PATH: &str = "/v2/email/outbound-emails";

type HmacSha256 = Hmac<Sha256>;

/// Sends prompts through the Amazon SES v2 API with SigV4 request signing.
#[derive(Debug, Clone)]
pub struct SesMailer {
    client: Client,
    access_key_id: String,
    secret_access_key: String,
    region: String,
    endpoint: String,
}

impl SesMailer {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let region = region.into();
        let endpoint = format!("https://email.{region}.amazonaws.com");
        Self {
            client: Client::new(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region,
            endpoint,
        }
    }

    /// Points the client at a different endpoint. Used by tests.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Dispatches one prompt and returns the `MessageId` from the SES
    /// response body.
    pub fn send_prompt(&self, params: &SendPromptParams) -> Result<String, SendPromptError> {
        let payload = self.build_payload(params);
        let body = payload.to_string();
        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let authorization = self.sign_request(&amz_date, body.as_bytes())?;

        let response = self
            .client
            .post(format!("{}{}", self.endpoint, SEND_EMAIL_PATH))
            .header("X-Amz-Date", &amz_date)
            .header("Authorization", authorization)
            .header("Content-Type", "application/json")
            .body(body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SendPromptError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Value = response.json()?;
        parsed
            .get("MessageId")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
            .ok_or(SendPromptError::MissingMessageId)
    }

    fn build_payload(&self, params: &SendPromptParams) -> Value {
        let mut payload = json!({
            "FromEmailAddress": format!("{} <{}>", params.from_name, params.from_email),
            "Destination": {
                "ToAddresses": [format!("{} <{}>", params.to_name, params.to_email)],
            },
            "Content": {
                "Simple": {
                    "Subject": {"Data": params.subject, "Charset": "UTF-8"},
                    "Body": {"Html": {"Data": params.html_body, "Charset": "UTF-8"}},
                },
            },
        });
        if let Some(reply_to) = params.reply_to.as_deref() {
            payload["ReplyToAddresses"] = json!([reply_to]);
        }
        payload
    }

    /// SigV4: canonical request over `host` and `x-amz-date`, signed with the
    /// derived date/region/service key chain.
    fn sign_request(&self, amz_date: &str, body: &[u8]) -> Result<String, SendPromptError> {
        let host = endpoint_host(&self.endpoint)?;
        let date_stamp = &amz_date[..8];
        let payload_hash = hex::encode(Sha256::digest(body));

        let canonical_request = format!(
            "POST\n{SEND_EMAIL_PATH}\n\nhost:{host}\nx-amz-date:{amz_date}\n\nhost;x-amz-date\n{payload_hash}"
        );
        let credential_scope = format!("{date_stamp}/{}/{SES_SERVICE}/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let secret = format!("AWS4{}", self.secret_access_key);
        let key = hmac_sha256(secret.as_bytes(), date_stamp.as_bytes())?;
        let key = hmac_sha256(&key, self.region.as_bytes())?;
        let key = hmac_sha256(&key, SES_SERVICE.as_bytes())?;
        let key = hmac_sha256(&key, b"aws4_request")?;
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

        Ok(format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders=host;x-amz-date, Signature={signature}",
            self.access_key_id
        ))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SendPromptError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| SendPromptError::Signing("invalid hmac key length".to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn endpoint_host(endpoint: &str) -> Result<&str, SendPromptError> {
    let without_scheme = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    let host = without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .trim();
    if host.is_empty() {
        return Err(SendPromptError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn params() -> SendPromptParams {
        SendPromptParams {
            to_name: "Test User".to_string(),
            to_email: "user@example.com".to_string(),
            from_name: "Journal".to_string(),
            from_email: "journal@example.com".to_string(),
            reply_to: None,
            subject: "It's Sunday, Apr. 6, 2025. How are you?".to_string(),
            html_body: "<p>Reply to this prompt to update your journal.</p>".to_string(),
        }
    }

    #[test]
    fn send_prompt_returns_response_message_id() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", SEND_EMAIL_PATH)
            .match_header(
                "authorization",
                Matcher::Regex("AWS4-HMAC-SHA256 Credential=AKIDTEST/.*/us-east-1/ses/aws4_request.*Signature=[0-9a-f]{64}".to_string()),
            )
            .match_header("x-amz-date", Matcher::Regex("[0-9]{8}T[0-9]{6}Z".to_string()))
            .with_status(200)
            .with_body("{\"MessageId\":\"ses-message-1\"}")
            .create();

        let mailer =
            SesMailer::new("AKIDTEST", "secret", "us-east-1").with_endpoint(server.url());
        let message_id = mailer.send_prompt(&params()).expect("send");

        assert_eq!(message_id, "ses-message-1");
        mock.assert();
    }

    #[test]
    fn send_prompt_requires_message_id_in_response() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", SEND_EMAIL_PATH)
            .with_status(200)
            .with_body("{}")
            .create();

        let mailer =
            SesMailer::new("AKIDTEST", "secret", "us-east-1").with_endpoint(server.url());
        let err = mailer.send_prompt(&params()).expect_err("missing id");

        assert!(matches!(err, SendPromptError::MissingMessageId));
    }

    #[test]
    fn send_prompt_surfaces_provider_rejection() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", SEND_EMAIL_PATH)
            .with_status(403)
            .with_body("{\"message\":\"signature mismatch\"}")
            .create();

        let mailer =
            SesMailer::new("AKIDTEST", "secret", "us-east-1").with_endpoint(server.url());
        let err = mailer.send_prompt(&params()).expect_err("rejected");

        match err {
            SendPromptError::Rejected { status, .. } => assert_eq!(status, 403),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn endpoint_host_strips_scheme_and_path() {
        assert_eq!(
            endpoint_host("https://email.us-east-1.amazonaws.com").expect("host"),
            "email.us-east-1.amazonaws.com"
        );
        assert_eq!(
            endpoint_host("http://127.0.0.1:4566/extra").expect("host"),
            "127.0.0.1:4566"
        );
        assert!(endpoint_host("https://").is_err());
    }
}
