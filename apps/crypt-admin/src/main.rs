use std::time::Duration;

use anyhow::{Context, Result};
use chatcrypt::{Codec, CryptoConfig};
use chatstore::RestStore;
use clap::{Parser, Subcommand};
use migrator::{FieldMigration, MessageMigration, DEFAULT_STATUS_SAMPLE};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "crypt-admin",
    about = "Inspect and run the at-rest encryption migrations"
)]
struct Args {
    /// Project URL of the hosted database (e.g., https://xyz.supabase.co)
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: String,
    /// Service role key used for both apikey and bearer auth
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    service_key: String,
    /// Secret mixed into per-user keys
    #[arg(long, env = "ENCRYPTION_SECRET", hide_env_values = true)]
    encryption_secret: Option<String>,
    /// Per-request timeout against the store (seconds)
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Table holding chat messages
    #[arg(long, default_value = chatstore::MESSAGES_TABLE)]
    messages_table: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sample the message table and report how much is still plaintext
    Status {
        #[arg(long, default_value_t = DEFAULT_STATUS_SAMPLE)]
        sample: usize,
    },
    /// Encrypt every plaintext chat message in place
    MigrateMessages,
    /// Encrypt journal entries and profile fields under per-user keys
    MigrateUserData,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn codec(secret: Option<String>) -> Result<Codec> {
    let config = match secret {
        Some(s) => CryptoConfig::new(s),
        None => CryptoConfig::from_env(),
    }
    .context("encryption is not configured")?;
    Ok(Codec::new(config))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level);

    let store = RestStore::new(
        &args.supabase_url,
        &args.service_key,
        Duration::from_secs(args.timeout_secs),
    )
    .context("building store client")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current row");
                cancel.cancel();
            }
        });
    }

    let messages = MessageMigration::new(args.messages_table.clone());
    match args.command {
        Command::Status { sample } => {
            let status = messages
                .status(&store, sample)
                .await
                .context("status check failed")?;
            print_json(&status)?;
        }
        Command::MigrateMessages => {
            let codec = codec(args.encryption_secret)?;
            let report = messages
                .run(&store, &codec, &cancel)
                .await
                .context("message migration failed")?;
            print_json(&report)?;
        }
        Command::MigrateUserData => {
            let codec = codec(args.encryption_secret)?;
            let mut reports = Vec::new();
            for migration in [FieldMigration::mindfulness_entries(), FieldMigration::profiles()] {
                if cancel.is_cancelled() {
                    break;
                }
                let report = migration
                    .run(&store, &codec, &cancel)
                    .await
                    .with_context(|| format!("{} migration failed", migration.table))?;
                reports.push(report);
            }
            print_json(&reports)?;
        }
    }

    Ok(())
}
