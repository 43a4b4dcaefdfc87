mod prompt;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;
use tracing::{error, info, warn};

use send_prompts_module::{SendGridMailer, SendPromptError, SendPromptParams, SesMailer};

use crate::mail::prompt_subject;
use crate::store::{EntryStore, PromptStore, StoreError};

pub use prompt::FALLBACK_PROMPT_BODY;

/// Outbound delivery capability. One implementation per provider; the
/// concrete gateway is chosen from configuration at startup.
pub trait PromptGateway: Send + Sync {
    fn send_prompt(&self, params: &SendPromptParams) -> Result<String, SendPromptError>;
}

impl PromptGateway for SendGridMailer {
    fn send_prompt(&self, params: &SendPromptParams) -> Result<String, SendPromptError> {
        SendGridMailer::send_prompt(self, params)
    }
}

impl PromptGateway for SesMailer {
    fn send_prompt(&self, params: &SendPromptParams) -> Result<String, SendPromptError> {
        SesMailer::send_prompt(self, params)
    }
}

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("no prompt history; record a first prompt to seed the catch-up baseline")]
    NoPromptHistory,
    #[error("send failed: {0}")]
    Send(#[from] SendPromptError),
}

#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub recipient_name: String,
    pub recipient_address: String,
    pub sender_name: String,
    pub sender_address: String,
    pub reply_to: Option<String>,
    /// Fixed reference offset for the daily wake.
    pub utc_offset: FixedOffset,
    /// Local hour (0-23) at which the daily pass runs.
    pub prompt_hour: u32,
}

/// Handle on the background mailer thread.
pub struct MailerControl {
    stop: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MailerControl {
    pub fn stop(&self) {
        let _ = self.stop.try_send(());
    }

    pub fn stop_and_join(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Starts the daily prompt mailer: one worker thread that sleeps until the
/// configured hour, runs a catch-up pass, and goes back to sleep. The sleep
/// is a channel wait, so [`MailerControl::stop`] interrupts it immediately.
pub fn start_mailer(
    config: MailerConfig,
    gateway: Arc<dyn PromptGateway>,
    entries: EntryStore,
    prompts: PromptStore,
) -> MailerControl {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let handle = thread::spawn(move || run_loop(config, gateway, entries, prompts, stop_rx));
    MailerControl {
        stop: stop_tx,
        handle: Some(handle),
    }
}

fn run_loop(
    config: MailerConfig,
    gateway: Arc<dyn PromptGateway>,
    entries: EntryStore,
    prompts: PromptStore,
    stop: Receiver<()>,
) {
    loop {
        let now = Utc::now().with_timezone(&config.utc_offset);
        let wake_at = next_wake_after(now, config.prompt_hour);
        let sleep = (wake_at - now).to_std().unwrap_or(Duration::ZERO);
        info!("next prompt pass scheduled for {} (in {:?})", wake_at, sleep);

        match stop.recv_timeout(sleep) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                info!("prompt mailer stopping");
                return;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        let today = Utc::now().with_timezone(&config.utc_offset).date_naive();
        match run_catch_up_pass(&config, gateway.as_ref(), &entries, &prompts, today) {
            Ok(sent) => info!("prompt pass complete; sent {} prompt(s)", sent),
            Err(err) => error!("prompt pass aborted: {}", err),
        }
    }
}

/// "Today at the configured hour if still in the future, else tomorrow."
fn next_wake_after(now: DateTime<FixedOffset>, hour: u32) -> DateTime<FixedOffset> {
    let wake_time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let mut wake = now.date_naive().and_time(wake_time);
    if wake <= now.naive_local() {
        wake = wake + chrono::Duration::days(1);
    }
    now + (wake - now.naive_local())
}

/// One catch-up pass: a prompt for every day strictly after the last
/// recorded prompt through `today`, ascending. A failed send or record is
/// logged and the loop moves on; the day stays unrecorded and is picked up
/// again on the next pass. Returns the number of sends that succeeded.
pub fn run_catch_up_pass(
    config: &MailerConfig,
    gateway: &dyn PromptGateway,
    entries: &EntryStore,
    prompts: &PromptStore,
    today: NaiveDate,
) -> Result<u32, MailerError> {
    let last = prompts.last_prompt_day()?.ok_or(MailerError::NoPromptHistory)?;
    info!("last recorded prompt day: {}", last);

    let mut sent = 0;
    let mut next = last.succ_opt();
    while let Some(current) = next.filter(|value| *value <= today) {
        next = current.succ_opt();

        let html_body = match prompt::prompt_body(entries, today) {
            Ok(body) => body,
            Err(err) => {
                warn!("failed to build prompt body for {}: {}", current, err);
                continue;
            }
        };
        let params = build_params(config, prompt_subject(current), html_body);

        let message_id = match gateway.send_prompt(&params) {
            Ok(message_id) => message_id,
            Err(err) => {
                warn!("failed to send prompt for {}: {}", current, err);
                continue;
            }
        };
        info!("sent prompt for {} with message_id {}", current, message_id);
        sent += 1;

        if let Err(err) = prompts.record_prompt(current, &message_id) {
            // Unrecorded day; the next pass re-sends it.
            warn!("failed to record prompt for {}: {}", current, err);
            continue;
        }
        info!("recorded prompt for {}", current);
    }
    Ok(sent)
}

/// Sends and records a single prompt for `day`, outside the daily schedule.
pub fn send_prompt_for_day(
    config: &MailerConfig,
    gateway: &dyn PromptGateway,
    entries: &EntryStore,
    prompts: &PromptStore,
    day: NaiveDate,
) -> Result<String, MailerError> {
    let today = Utc::now().with_timezone(&config.utc_offset).date_naive();
    let html_body = prompt::prompt_body(entries, today)?;
    let params = build_params(config, prompt_subject(day), html_body);
    let message_id = gateway.send_prompt(&params)?;
    info!("sent prompt for {} with message_id {}", day, message_id);
    prompts.record_prompt(day, &message_id)?;
    Ok(message_id)
}

fn build_params(config: &MailerConfig, subject: String, html_body: String) -> SendPromptParams {
    SendPromptParams {
        to_name: config.recipient_name.clone(),
        to_email: config.recipient_address.clone(),
        from_name: config.sender_name.clone(),
        from_email: config.sender_address.clone(),
        reply_to: config.reply_to.clone(),
        subject,
        html_body,
    }
}
