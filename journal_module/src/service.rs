mod auth;
mod config;
mod server;
mod ses_webhook;
mod state;
mod webhook;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::{PromptProvider, ServiceConfig};
pub use server::{app, run_server, INBOUND_BODY_MAX_BYTES};
pub use state::AppState;
