mod config;
mod sweeper;
mod view;

use anyhow::{Context, bail};
use cairn_core::{
    Datastore, Disposition, GetByKeyOperationRequest, GetZeroAnonymityOperationRequest,
    PutRecordOperationRequest, Record, RecordKey, RecordOutcome, RecordProcessor,
    RemoveRecordOperationOutcome, RemoveRecordOperationRequest, SqliteDatastore, Timestamp,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use crate::config::Config;
use crate::view::{KeyCountView, PutView, RecordView, StatsView};
use futures_util::TryStreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "cairn")]
#[command(about = "Content-addressed record store for overlay network nodes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Database file, overriding `store.path`
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Args)]
struct KeyArgs {
    /// Key as 128 hex characters
    #[arg(long, conflicts_with = "key_text")]
    key: Option<String>,

    /// Derive the key by hashing this text
    #[arg(long)]
    key_text: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum GetMode {
    /// Walk records under a key (or the whole table)
    Key,
    /// Most replicated record, decrementing its counter
    Replication,
    /// Records with anonymity 0 of one type
    ZeroAnonymity,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the store and run background maintenance until Ctrl+C
    Serve {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Store a record, merging with an identical value under the same key
    Put {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        key: KeyArgs,
        value: String,
        #[arg(long = "type", default_value_t = 0)]
        record_type: u32,
        #[arg(long, default_value_t = 0)]
        priority: u32,
        #[arg(long, default_value_t = 0)]
        anonymity: u32,
        #[arg(long, default_value_t = 0)]
        replication: u32,
        /// Seconds until the record expires; never when omitted
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Select one record
    Get {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        key: KeyArgs,
        #[arg(long, value_enum, default_value_t = GetMode::Key)]
        mode: GetMode,
        #[arg(long = "type")]
        record_type: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Pick a random matching record
        #[arg(long)]
        random: bool,
        /// Delete the selected record
        #[arg(long)]
        take: bool,
    },
    /// List distinct keys with their record counts
    Keys {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Delete the record holding exactly this value
    Remove {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        key: KeyArgs,
        value: String,
    },
    /// Evict every record that has expired
    Sweep {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Show record count and estimated size
    Stats {
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cairn=info,cairn_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve { store } => {
            let (config, store) = open_store(&store)?;
            serve(config, store).await
        }
        Commands::Put {
            store,
            key,
            value,
            record_type,
            priority,
            anonymity,
            replication,
            ttl_secs,
        } => {
            let key = key.resolve()?.context("--key or --key-text is required")?;
            let (_, store) = open_store(&store)?;

            let expiry = ttl_secs
                .map(|secs| Timestamp::after(Duration::from_secs(secs)))
                .unwrap_or(Timestamp::FOREVER);
            let request = PutRecordOperationRequest::new(key, value)
                .record_type(record_type)
                .priority(priority)
                .anonymity(anonymity)
                .replication(replication)
                .expiry(expiry);

            let outcome = store.put(request).await.context("put failed")?;
            print_json(&PutView::from(outcome))
        }
        Commands::Get {
            store,
            key,
            mode,
            record_type,
            offset,
            random,
            take,
        } => {
            let key = key.resolve()?;
            let (_, store) = open_store(&store)?;

            let processor =
                take.then(|| Box::new(|_: &Record| Disposition::Discard) as RecordProcessor);

            let outcome = match mode {
                GetMode::Key => {
                    let mut request = match key {
                        Some(key) => GetByKeyOperationRequest::for_key(key),
                        None => GetByKeyOperationRequest::any_key(),
                    };
                    if let Some(record_type) = record_type {
                        request = request.record_type(record_type);
                    }
                    request = if random {
                        request.random()
                    } else {
                        request.start_offset(offset)
                    };
                    store.get_key(request, processor).await?
                }
                GetMode::Replication => store.get_replication().await?,
                GetMode::ZeroAnonymity => {
                    let Some(record_type) = record_type else {
                        bail!("--type is required for zero-anonymity selection");
                    };
                    let request = GetZeroAnonymityOperationRequest::new(record_type);
                    let request = if random {
                        request.random()
                    } else {
                        request.start_offset(offset)
                    };
                    store.get_zero_anonymity(request, processor).await?
                }
            };

            match outcome {
                RecordOutcome::Found(record) => print_json(&RecordView::from(&record)),
                RecordOutcome::NotFound => bail!("no matching record"),
            }
        }
        Commands::Keys { store } => {
            let (_, store) = open_store(&store)?;
            let mut keys = store.get_keys();
            while let Some(entry) = keys.try_next().await? {
                println!("{}", serde_json::to_string(&KeyCountView::from(&entry))?);
            }
            Ok(())
        }
        Commands::Remove { store, key, value } => {
            let key = key.resolve()?.context("--key or --key-text is required")?;
            let (_, store) = open_store(&store)?;

            let outcome = store
                .remove_key(RemoveRecordOperationRequest {
                    key,
                    value: value.into(),
                })
                .await?;
            match outcome {
                RemoveRecordOperationOutcome::Removed { uid } => {
                    tracing::info!("removed record uid={}", uid);
                    Ok(())
                }
                RemoveRecordOperationOutcome::NotFound => bail!("no record holds that value"),
            }
        }
        Commands::Sweep { store } => {
            let (_, store) = open_store(&store)?;
            let evicted = sweeper::sweep_expired(store.as_ref(), Timestamp::now(), usize::MAX)
                .await
                .context("sweep failed")?;
            tracing::info!("evicted {} expired records", evicted);
            Ok(())
        }
        Commands::Stats { store } => {
            let (config, store) = open_store(&store)?;
            print_json(&StatsView {
                path: config.store.path.map(|p| p.display().to_string()),
                records: store.count().await?,
                estimated_bytes: store.estimate_size().await?,
            })
        }
    }
}

impl KeyArgs {
    fn resolve(self) -> anyhow::Result<Option<RecordKey>> {
        match (self.key, self.key_text) {
            (Some(hex), _) => Ok(Some(RecordKey::from_hex(&hex)?)),
            (None, Some(text)) => Ok(Some(RecordKey::digest(text.as_bytes()))),
            (None, None) => Ok(None),
        }
    }
}

fn open_store(args: &StoreArgs) -> anyhow::Result<(Config, Arc<dyn Datastore>)> {
    let mut config = match args.config.as_deref() {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    }
    .context("failed to load config")?;
    if let Some(db) = &args.db {
        config.store.path = Some(db.clone());
    }

    let store = SqliteDatastore::open(&config.store).context("failed to open store")?;
    Ok((config, Arc::new(store)))
}

async fn serve(config: Config, store: Arc<dyn Datastore>) -> anyhow::Result<()> {
    tracing::info!(
        "Cairn store ready: {} records, ~{} bytes",
        store.count().await?,
        store.estimate_size().await?
    );

    let sweeper = if config.sweeper.enabled {
        tracing::info!(
            "expiry sweeper every {}s, up to {} records per tick",
            config.sweeper.interval_secs,
            config.sweeper.max_per_tick
        );
        Some(sweeper::spawn_sweeper_task(
            Arc::clone(&store),
            config.sweeper.clone(),
        ))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    tracing::info!("received Ctrl+C, shutting down");

    if let Some(handle) = sweeper {
        handle.abort();
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
