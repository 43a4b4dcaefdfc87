use chrono::NaiveDate;
use clap::Parser;
use tracing::{error, info};

use journal_module::service::{run_server, ServiceConfig};
use journal_module::store::{EntryStore, PromptStore};

/// Email-driven journal: daily prompt emails out, replies back in.
#[derive(Debug, Parser)]
#[command(name = "journal-service")]
struct Cli {
    /// Send and record a single prompt for the given day (YYYY-MM-DD), then
    /// exit.
    #[arg(long, value_name = "DAY")]
    send_prompt_for: Option<NaiveDate>,

    /// Record a prompt for the given day without sending, then exit. Seeds
    /// the catch-up baseline on a fresh deployment.
    #[arg(long, value_name = "DAY")]
    record_prompt: Option<NaiveDate>,

    /// Print all stored entry days, then exit.
    #[arg(long)]
    list_entry_days: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_target(false).init();
    let cli = Cli::parse();
    let config = ServiceConfig::from_env()?;

    if cli.list_entry_days {
        let entries = EntryStore::new(&config.db_path)?;
        for day in entries.list_entry_days()? {
            println!("{day}");
        }
        return Ok(());
    }

    if let Some(day) = cli.record_prompt {
        let prompts = PromptStore::new(&config.db_path)?;
        prompts.record_prompt(day, "seeded")?;
        info!("recorded prompt for {} without sending", day);
        return Ok(());
    }

    if let Some(day) = cli.send_prompt_for {
        let entries = EntryStore::new(&config.db_path)?;
        let prompts = PromptStore::new(&config.db_path)?;
        let mailer_config = config.mailer_config();
        let provider = config.provider.clone();
        let message_id = tokio::task::spawn_blocking(move || {
            let gateway = provider.build_gateway();
            journal_module::send_prompt_for_day(
                &mailer_config,
                gateway.as_ref(),
                &entries,
                &prompts,
                day,
            )
        })
        .await??;
        info!("sent prompt for {} with message_id {}", day, message_id);
        return Ok(());
    }

    run_server(config, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", err);
    }
}
