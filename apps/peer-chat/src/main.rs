use std::time::Duration;

use anyhow::{Context, Result};
use chatcrypt::{Codec, CryptoConfig};
use chatstore::{MessageRow, Query, RestStore, Row, RowId, Store, MESSAGES_TABLE};
use clap::{Parser, Subcommand};
use realtime::{Backoff, RetryPolicy, Subscription};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod feed;

use feed::PollingFeed;

#[derive(Debug, Parser)]
#[command(name = "peer-chat", about = "Send and read encrypted peer support messages")]
struct Args {
    /// Project URL of the hosted database
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: String,
    /// Service role key used for both apikey and bearer auth
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    service_key: String,
    /// Secret mixed into per-user keys
    #[arg(long, env = "ENCRYPTION_SECRET", hide_env_values = true)]
    encryption_secret: Option<String>,
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Acting user id (already authenticated upstream)
    #[arg(long = "as")]
    user: String,
    /// The other participant
    #[arg(long)]
    peer: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Encrypt and store a message to the peer
    Send {
        message: String,
        #[arg(long)]
        anonymous: bool,
    },
    /// Print the conversation, decrypted
    History,
    /// Follow the conversation as new messages arrive
    Tail {
        /// Poll interval (ms)
        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,
        #[arg(long, default_value_t = 5)]
        max_retries: u32,
    },
}

/// One message as shown to the acting user.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatLine {
    id: RowId,
    sender: &'static str,
    message: String,
    timestamp: Option<String>,
    is_anonymous: bool,
}

impl ChatLine {
    fn render(codec: &Codec, msg: MessageRow, user: &str, peer: &str) -> Self {
        let message = codec.open_message(&msg.message, user, peer);
        Self {
            sender: if msg.sender_id == user { "you" } else { "peer" },
            id: msg.id,
            message,
            timestamp: msg.created_at,
            is_anonymous: msg.is_anonymous.unwrap_or(false),
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = match args.encryption_secret {
        Some(s) => CryptoConfig::new(s),
        None => CryptoConfig::from_env(),
    }
    .context("encryption is not configured")?;
    let codec = Codec::new(config);
    let store = RestStore::new(
        &args.supabase_url,
        &args.service_key,
        Duration::from_secs(args.timeout_secs),
    )
    .context("building store client")?;
    let (user, peer) = (args.user.as_str(), args.peer.as_str());

    match args.command {
        Command::Send { message, anonymous } => {
            let envelope = codec
                .encrypt_for_conversation(&message, user, peer)
                .context("encrypting message")?;
            let saved = store
                .insert(MESSAGES_TABLE, MessageRow::new_outgoing(user, peer, envelope, anonymous))
                .await
                .context("storing message")?;
            let stored = MessageRow::from_row(&saved)?;
            // The sender sees what they typed, not the stored envelope.
            let line = ChatLine {
                message,
                ..ChatLine::render(&codec, stored, user, peer)
            };
            println!("{}", serde_json::to_string(&line)?);
        }
        Command::History => {
            let query = Query::new()
                .filter(MessageRow::conversation_filter(user, peer))
                .order_asc("created_at");
            let rows = store
                .fetch(MESSAGES_TABLE, &query)
                .await
                .context("loading conversation")?;
            let mut unread = Vec::new();
            for raw in &rows {
                match MessageRow::from_row(raw) {
                    Ok(msg) => {
                        if msg.receiver_id == user && msg.is_read != Some(true) {
                            unread.push(msg.id.clone());
                        }
                        let line = ChatLine::render(&codec, msg, user, peer);
                        println!("{}", serde_json::to_string(&line)?);
                    }
                    Err(e) => tracing::warn!(error = %e, "skipping undecodable row"),
                }
            }
            for id in unread {
                let mut fields = Row::new();
                fields.insert("is_read".into(), true.into());
                if let Err(e) = store.update_by_id(MESSAGES_TABLE, &id, fields).await {
                    tracing::warn!(%id, error = %e, "could not mark message read");
                }
            }
        }
        Command::Tail {
            interval_ms,
            max_retries,
        } => {
            let feed = PollingFeed::new(store, user, peer, Duration::from_millis(interval_ms));
            let policy = RetryPolicy {
                max_retries,
                backoff: Backoff {
                    base: Duration::from_millis(interval_ms.max(250)),
                    max: Duration::from_secs(60),
                },
            };
            let cancel = CancellationToken::new();
            let (tx, mut rx) = mpsc::channel(64);
            let driver = tokio::spawn(Subscription::new(feed, policy).run(tx, cancel.clone()));

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        cancel.cancel();
                        break;
                    }
                    msg = rx.recv() => match msg {
                        Some(msg) => {
                            let line = ChatLine::render(&codec, msg, user, peer);
                            println!("{}", serde_json::to_string(&line)?);
                        }
                        None => break,
                    },
                }
            }
            drop(rx);
            driver.await?.context("subscription ended")?;
        }
    }

    Ok(())
}
