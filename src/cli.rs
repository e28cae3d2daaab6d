//
// cli.rs
// dicom-deident
//
// Defines the CLI surface with Clap and runs de-identification against filesystem-backed stores.
//

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tracing::warn;
use walkdir::WalkDir;

use crate::audit::{self, AuditStore, DEFAULT_AUDIT_TABLE};
use crate::config::SubstitutionConfig;
use crate::dicom_access::ElementAccess;
use crate::paths::DEFAULT_OUTPUT_STAGE;
use crate::pipeline::{Pipeline, PipelineSettings, UnmatchedPolicy, DEFAULT_CONFIG_NAME};
use crate::storage::{FsAuditBackend, FsConfigStore, FsObjectStore};
use crate::tag::SUBJECT_ANCHOR;
use crate::{codec, digest, event, logging};

/// Command-line interface glue code: defines the available verbs and dispatches to modules.
#[derive(Parser)]
#[command(name = "dicom-deident")]
#[command(about = "De-identify DICOM objects on ingestion and keep an audit trail", long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "DEIDENT_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// De-identify one object
    Process {
        #[command(flatten)]
        stores: StoreArgs,
        #[arg(short, long)]
        bucket: String,
        #[arg(short, long)]
        key: String,
    },
    /// De-identify the object named by a storage notification
    Event {
        #[command(flatten)]
        stores: StoreArgs,
        /// Notification JSON file
        #[arg(short, long)]
        event: PathBuf,
    },
    /// Run one independent invocation per object under a prefix
    Backfill {
        #[command(flatten)]
        stores: StoreArgs,
        #[arg(short, long)]
        bucket: String,
        /// Key prefix, e.g. dicom/input
        #[arg(short, long)]
        prefix: String,
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },
    /// Validate a substitution config file
    CheckConfig { file: PathBuf },
    /// Print the audit key and digest of a local DICOM file
    AuditKey { file: PathBuf },
}

/// Where the filesystem stores live and how the pipeline is parameterized.
#[derive(Args, Clone)]
pub struct StoreArgs {
    /// Root holding objects/, config/ and audit/
    #[arg(short, long, env = "DEIDENT_ROOT")]
    pub root: PathBuf,
    #[arg(long, env = "DEIDENT_CONFIG_NAME", default_value = DEFAULT_CONFIG_NAME)]
    pub config_name: String,
    #[arg(long, env = "DEIDENT_AUDIT_TABLE", default_value = DEFAULT_AUDIT_TABLE)]
    pub audit_table: String,
    #[arg(long, env = "DEIDENT_OUTPUT_STAGE", default_value = DEFAULT_OUTPUT_STAGE)]
    pub output_stage: String,
    #[arg(long, value_enum, env = "DEIDENT_UNMATCHED_POLICY", default_value_t = Unmatched::Abort)]
    pub unmatched: Unmatched,
    /// Skip audit records whose key is already recorded
    #[arg(long, env = "DEIDENT_AUDIT_DEDUP")]
    pub audit_dedup: bool,
    /// Per-invocation deadline in seconds
    #[arg(long, env = "DEIDENT_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Unmatched {
    Abort,
    PassThrough,
}

impl From<Unmatched> for UnmatchedPolicy {
    fn from(value: Unmatched) -> Self {
        match value {
            Unmatched::Abort => UnmatchedPolicy::Abort,
            Unmatched::PassThrough => UnmatchedPolicy::PassThrough,
        }
    }
}

impl StoreArgs {
    pub fn pipeline(&self) -> Pipeline {
        let backend = Arc::new(FsAuditBackend::new(self.root.join("audit")));
        let audit = AuditStore::new(backend, self.audit_table.clone()).with_dedup(self.audit_dedup);
        Pipeline::new(
            Arc::new(FsObjectStore::new(self.root.join("objects"))),
            Arc::new(FsConfigStore::new(self.root.join("config"))),
            audit,
            PipelineSettings {
                config_name: self.config_name.clone(),
                output_stage: self.output_stage.clone(),
                unmatched: self.unmatched.into(),
            },
        )
    }

    fn deadline(&self) -> Option<Instant> {
        self.timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs))
    }
}

pub async fn run() -> anyhow::Result<()> {
    // Parse the raw CLI arguments once and dispatch to a subcommand handler.
    let cli = Cli::parse();
    logging::init(cli.log_json)?;

    match cli.command {
        Commands::Process { stores, bucket, key } => process_one(&stores, &bucket, &key).await?,
        Commands::Event {
            stores,
            event: notification,
        } => {
            let payload = tokio::fs::read(&notification)
                .await
                .with_context(|| format!("Failed to read event file {notification:?}"))?;
            let target = event::object_from_notification(&payload)?;
            process_one(&stores, &target.bucket, &target.key).await?
        }
        Commands::Backfill {
            stores,
            bucket,
            prefix,
            concurrency,
        } => {
            if concurrency == 0 {
                bail!("Concurrency must be greater than zero");
            }
            backfill(&stores, &bucket, &prefix, concurrency).await?
        }
        Commands::CheckConfig { file } => {
            let blob = std::fs::read(&file).with_context(|| format!("Failed to read {file:?}"))?;
            let config = SubstitutionConfig::from_slice(&blob)?;
            println!("{}", serde_json::to_string_pretty(&config.summary())?);
        }
        Commands::AuditKey { file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("Failed to read {file:?}"))?;
            let tree = codec::parse(&bytes)?;
            println!("Subject:    {}", tree.element_str(SUBJECT_ANCHOR).as_deref().unwrap_or("N/A"));
            println!("Audit key:  {}", audit::derive_key(&tree)?);
            println!("Digest:     {}", digest::digest(&codec::serialize(&tree)?));
        }
    }

    Ok(())
}

async fn process_one(stores: &StoreArgs, bucket: &str, key: &str) -> anyhow::Result<()> {
    let pipeline = stores.pipeline();
    let outcome = match stores.deadline() {
        Some(deadline) => pipeline.process_with_deadline(bucket, key, deadline).await?,
        None => pipeline.process(bucket, key).await?,
    };
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn backfill(
    stores: &StoreArgs,
    bucket: &str,
    prefix: &str,
    concurrency: usize,
) -> anyhow::Result<()> {
    let bucket_root = stores.root.join("objects").join(bucket);
    let keys = object_keys(&bucket_root, prefix)?;
    println!("Found {} objects under {bucket}/{prefix}", keys.len());

    let pipeline = stores.pipeline();
    let mut tasks = JoinSet::new();
    let mut pending = keys.into_iter();
    let (mut ok, mut failed) = (0usize, 0usize);

    loop {
        while tasks.len() < concurrency {
            let Some(key) = pending.next() else { break };
            let pipeline = pipeline.clone();
            let bucket = bucket.to_string();
            let deadline = stores.deadline();
            tasks.spawn(async move {
                match deadline {
                    Some(at) => pipeline.process_with_deadline(&bucket, &key, at).await,
                    None => pipeline.process(&bucket, &key).await,
                }
            });
        }

        let Some(joined) = tasks.join_next().await else { break };
        match joined.context("invocation task panicked")? {
            Ok(outcome) => {
                ok += 1;
                println!("OK     {} -> {}", outcome.processed_key, outcome.output_key);
            }
            Err(err) => {
                failed += 1;
                warn!(error = %err, "invocation failed");
                println!("FAILED {}: {}", err.key, err.kind);
            }
        }
    }

    println!("Done: {ok} succeeded, {failed} failed");
    if failed > 0 {
        bail!("{failed} objects failed");
    }
    Ok(())
}

/// Keys (relative to the bucket root, `/`-separated) of every file directly under `prefix`.
fn object_keys(bucket_root: &Path, prefix: &str) -> anyhow::Result<Vec<String>> {
    let dir = bucket_root.join(prefix.trim_matches('/'));
    if !dir.is_dir() {
        bail!("{dir:?} is not a directory");
    }

    let mut keys: Vec<String> = WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let relative = e.path().strip_prefix(bucket_root).ok()?;
            let parts: Vec<_> = relative.iter().map(|p| p.to_string_lossy()).collect();
            Some(parts.join("/"))
        })
        .collect();
    keys.sort();
    Ok(keys)
}
