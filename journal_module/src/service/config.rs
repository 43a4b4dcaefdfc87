use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::FixedOffset;

use send_prompts_module::{SendGridMailer, SesMailer};

use crate::mailer::{MailerConfig, PromptGateway};

use super::BoxError;

/// Which provider dispatches outbound prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptProvider {
    SendGrid {
        api_key: String,
    },
    Ses {
        access_key_id: String,
        secret_access_key: String,
        region: String,
    },
}

impl PromptProvider {
    pub fn build_gateway(&self) -> Arc<dyn PromptGateway> {
        match self {
            PromptProvider::SendGrid { api_key } => Arc::new(SendGridMailer::new(api_key.clone())),
            PromptProvider::Ses {
                access_key_id,
                secret_access_key,
                region,
            } => Arc::new(SesMailer::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                region.clone(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// The only destination this journal accepts mail for.
    pub required_to_address: String,
    pub recipient_name: String,
    pub recipient_address: String,
    pub sender_name: String,
    pub reply_to_address: Option<String>,
    pub webhook_username: String,
    pub webhook_password: String,
    pub prompt_hour: u32,
    pub utc_offset: FixedOffset,
    pub provider: PromptProvider,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let host = env::var("JOURNAL_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("JOURNAL_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8000);

        let db_dir = env_non_empty("DB_DIR").unwrap_or_else(|| ".".to_string());
        let db_path = PathBuf::from(db_dir).join("journal.db");

        let required_to_address = required_env("REQUIRED_TO_ADDRESS")?;
        let recipient_address = required_env("RECIPIENT_ADDRESS")?;
        let recipient_name =
            env_non_empty("RECIPIENT_NAME").unwrap_or_else(|| recipient_address.clone());
        let sender_name = env_non_empty("SENDER_NAME").unwrap_or_else(|| "Journal".to_string());
        let reply_to_address = env_non_empty("REPLY_TO_ADDRESS");

        let (webhook_username, webhook_password) =
            parse_webhook_auth(&required_env("WEBHOOK_AUTH")?)?;

        let prompt_hour = env::var("PROMPT_HOUR")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value <= 23)
            .unwrap_or(9);
        let utc_offset = parse_utc_offset(
            &env_non_empty("SCHEDULE_UTC_OFFSET").unwrap_or_else(|| "+00:00".to_string()),
        )?;

        let provider = resolve_provider()?;

        Ok(Self {
            host,
            port,
            db_path,
            required_to_address,
            recipient_name,
            recipient_address,
            sender_name,
            reply_to_address,
            webhook_username,
            webhook_password,
            prompt_hour,
            utc_offset,
            provider,
        })
    }

    /// Prompts are sent from the same address replies must come back to.
    pub fn mailer_config(&self) -> MailerConfig {
        MailerConfig {
            recipient_name: self.recipient_name.clone(),
            recipient_address: self.recipient_address.clone(),
            sender_name: self.sender_name.clone(),
            sender_address: self.required_to_address.clone(),
            reply_to: self.reply_to_address.clone(),
            utc_offset: self.utc_offset,
            prompt_hour: self.prompt_hour,
        }
    }
}

fn required_env(key: &str) -> Result<String, BoxError> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("{key} not set").into())
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_webhook_auth(raw: &str) -> Result<(String, String), BoxError> {
    let (username, password) = raw
        .split_once(':')
        .ok_or_else(|| format!("WEBHOOK_AUTH must be in format 'username:password', got: {raw}"))?;
    if username.is_empty() || password.is_empty() {
        return Err(format!("WEBHOOK_AUTH must be in format 'username:password', got: {raw}").into());
    }
    Ok((username.to_string(), password.to_string()))
}

fn parse_utc_offset(raw: &str) -> Result<FixedOffset, BoxError> {
    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1i32, &raw[1..]),
        Some(b'-') => (-1i32, &raw[1..]),
        _ => (1i32, raw),
    };
    let (hours, minutes) = rest
        .split_once(':')
        .ok_or_else(|| format!("invalid SCHEDULE_UTC_OFFSET {raw:?} (expected +HH:MM)"))?;
    let hours: i32 = hours
        .parse()
        .map_err(|_| format!("invalid SCHEDULE_UTC_OFFSET {raw:?} (expected +HH:MM)"))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| format!("invalid SCHEDULE_UTC_OFFSET {raw:?} (expected +HH:MM)"))?;
    if hours > 14 || minutes > 59 {
        return Err(format!("SCHEDULE_UTC_OFFSET {raw:?} out of range").into());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| format!("SCHEDULE_UTC_OFFSET {raw:?} out of range").into())
}

fn resolve_provider() -> Result<PromptProvider, BoxError> {
    let selected = env_non_empty("PROMPT_PROVIDER")
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_else(|| "sendgrid".to_string());
    match selected.as_str() {
        "sendgrid" => Ok(PromptProvider::SendGrid {
            api_key: required_env("SENDGRID_API_KEY")?,
        }),
        "ses" => Ok(PromptProvider::Ses {
            access_key_id: required_env("AWS_ACCESS_KEY_ID")?,
            secret_access_key: required_env("AWS_SECRET_ACCESS_KEY")?,
            region: env_non_empty("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
        }),
        other => Err(format!("unknown PROMPT_PROVIDER {other:?} (expected sendgrid or ses)").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        key: String,
        previous: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let previous = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                previous,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => env::set_var(&self.key, value),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    fn webhook_auth_splits_on_the_first_colon() {
        let (username, password) = parse_webhook_auth("hook:s3cret:extra").expect("parse");
        assert_eq!(username, "hook");
        assert_eq!(password, "s3cret:extra");

        assert!(parse_webhook_auth("no-colon").is_err());
        assert!(parse_webhook_auth(":missing-user").is_err());
    }

    #[test]
    fn utc_offset_parses_signed_offsets() {
        assert_eq!(
            parse_utc_offset("-05:00").expect("parse"),
            FixedOffset::west_opt(5 * 3600).expect("offset")
        );
        assert_eq!(
            parse_utc_offset("+05:30").expect("parse"),
            FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("offset")
        );
        assert_eq!(
            parse_utc_offset("+00:00").expect("parse"),
            FixedOffset::east_opt(0).expect("offset")
        );
        assert!(parse_utc_offset("-0500").is_err());
        assert!(parse_utc_offset("+15:00").is_err());
    }

    #[test]
    fn from_env_reads_the_full_surface() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|poison| poison.into_inner());
        let _guards = [
            EnvGuard::set("JOURNAL_HOST", "127.0.0.1"),
            EnvGuard::set("JOURNAL_PORT", "9100"),
            EnvGuard::set("DB_DIR", "/tmp/journal-test"),
            EnvGuard::set("REQUIRED_TO_ADDRESS", "journal@mail.example.com"),
            EnvGuard::set("RECIPIENT_ADDRESS", "user@example.com"),
            EnvGuard::set("RECIPIENT_NAME", "Test User"),
            EnvGuard::set("SENDER_NAME", "Journal"),
            EnvGuard::set("REPLY_TO_ADDRESS", "journal@mail.example.com"),
            EnvGuard::set("WEBHOOK_AUTH", "hook:s3cret"),
            EnvGuard::set("PROMPT_HOUR", "9"),
            EnvGuard::set("SCHEDULE_UTC_OFFSET", "-05:00"),
            EnvGuard::set("PROMPT_PROVIDER", "sendgrid"),
            EnvGuard::set("SENDGRID_API_KEY", "sg-test-key"),
        ];

        let config = ServiceConfig::from_env().expect("config");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9100);
        assert_eq!(config.db_path, PathBuf::from("/tmp/journal-test/journal.db"));
        assert_eq!(config.required_to_address, "journal@mail.example.com");
        assert_eq!(config.webhook_username, "hook");
        assert_eq!(config.webhook_password, "s3cret");
        assert_eq!(config.prompt_hour, 9);
        assert_eq!(
            config.provider,
            PromptProvider::SendGrid {
                api_key: "sg-test-key".to_string()
            }
        );

        let mailer = config.mailer_config();
        assert_eq!(mailer.sender_address, "journal@mail.example.com");
        assert_eq!(mailer.recipient_name, "Test User");
    }

    #[test]
    fn from_env_requires_the_destination_address() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|poison| poison.into_inner());
        let _cleared = [
            EnvGuard::set("RECIPIENT_ADDRESS", "user@example.com"),
            EnvGuard::set("WEBHOOK_AUTH", "hook:s3cret"),
            EnvGuard::set("SENDGRID_API_KEY", "sg-test-key"),
        ];
        env::remove_var("REQUIRED_TO_ADDRESS");

        let err = ServiceConfig::from_env().expect_err("missing required");
        assert!(err.to_string().contains("REQUIRED_TO_ADDRESS"));
    }

    #[test]
    fn ses_provider_reads_credentials_and_default_region() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|poison| poison.into_inner());
        let _guards = [
            EnvGuard::set("PROMPT_PROVIDER", "ses"),
            EnvGuard::set("AWS_ACCESS_KEY_ID", "AKIDTEST"),
            EnvGuard::set("AWS_SECRET_ACCESS_KEY", "secret"),
        ];
        env::remove_var("AWS_REGION");

        let provider = resolve_provider().expect("provider");
        assert_eq!(
            provider,
            PromptProvider::Ses {
                access_key_id: "AKIDTEST".to_string(),
                secret_access_key: "secret".to_string(),
                region: "us-east-1".to_string(),
            }
        );
    }
}
