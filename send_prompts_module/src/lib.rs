//! Outbound prompt delivery.
//!
//! The journal service only ever sends one kind of message: the daily prompt.
//! This crate carries the shared request/error surface plus one client per
//! provider (SendGrid, Amazon SES). Both clients are synchronous; callers run
//! them from worker threads.

mod sendgrid;
mod ses;

pub use sendgrid::{SendGridMailer, SENDGRID_API_BASE};
pub use ses::SesMailer;

use thiserror::Error;

/// Everything a provider needs to dispatch one prompt email.
#[derive(Debug, Clone)]
pub struct SendPromptParams {
    pub to_name: String,
    pub to_email: String,
    pub from_name: String,
    pub from_email: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Error)]
pub enum SendPromptError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider rejected the message (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("provider response missing a message id")]
    MissingMessageId,
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("request signing failed: {0}")]
    Signing(String),
}
