pub mod ingestion;
pub mod mail;
pub mod service;
pub mod store;

mod mailer;

pub use mailer::{
    run_catch_up_pass, send_prompt_for_day, start_mailer, MailerConfig, MailerControl,
    MailerError, PromptGateway, FALLBACK_PROMPT_BODY,
};
