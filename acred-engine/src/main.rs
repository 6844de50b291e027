//! acred-engine - accreditation data engine CLI
//!
//! Thin adapter over the library: resolves configuration, opens the
//! store, runs one command and prints its result as JSON.

use std::path::{Path, PathBuf};

use acred_common::config::{resolve_root_folder, TomlConfig};
use acred_common::db::open_database;
use acred_engine::consolidate::{build_profile, list_summaries, SummaryQuery};
use acred_engine::{artifacts, ingest, merge, EngineState};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for acred-engine
#[derive(Parser, Debug)]
#[command(name = "acred-engine")]
#[command(about = "Dataset ingestion and accreditation consolidation engine")]
#[command(version)]
struct Args {
    /// Root folder holding the database, data and output directories
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Explicit acred.toml path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full-load every dataset found in the data directory
    Load {
        /// Reload tables that already hold rows
        #[arg(long)]
        force: bool,
        /// Override the configured data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Merge one file into an existing table
    Upload {
        /// Table name or alias
        #[arg(long)]
        table: String,
        /// CSV/TSV/XLSX file to merge
        #[arg(long)]
        file: PathBuf,
    },
    /// Print one consolidated profile
    Profile {
        #[arg(long)]
        subject: String,
        /// Apply this accreditation's rule set
        #[arg(long)]
        accreditation: Option<String>,
    },
    /// Print a page of subject summaries
    Summaries {
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 20)]
        page_size: i64,
        /// Include subjects without allocations
        #[arg(long)]
        all: bool,
        /// Keep subjects holding any of these accreditations
        #[arg(long = "accreditation")]
        accreditations: Vec<String>,
    },
    /// Generate JSON artifacts for an accreditation
    Run {
        #[arg(long)]
        accreditation: String,
        /// Subject ids (default: every subject)
        #[arg(long = "subject")]
        subjects: Vec<String>,
    },
    /// Show the artifact inventory
    Status {
        /// List individual artifacts for this accreditation
        #[arg(long)]
        accreditation: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config)?;

    // Log build identification immediately after tracing init
    info!(
        "Starting acred-engine v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let location = config.database_location(&root_folder)?;
    let pool = open_database(&location)
        .await
        .context("Failed to open database")?;
    let state = EngineState::from_config(pool, &config)?;

    match args.command {
        Command::Load { force, data_dir } => {
            let data_dir = data_dir.unwrap_or_else(|| config.data_dir(&root_folder));
            info!("Loading datasets from {}", data_dir.display());
            let outcomes = ingest::bootstrap_from_dir(&state, &data_dir, force).await?;
            print_json(&outcomes)?;
        }
        Command::Upload { table, file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let report = merge::merge_upload(&state, &table, &file_name(&file), &bytes).await?;
            print_json(&report)?;
        }
        Command::Profile {
            subject,
            accreditation,
        } => {
            let profile = build_profile(&state, &subject).await?;
            match accreditation {
                Some(id) => print_json(&state.rules.apply(&profile, &id)?)?,
                None => print_json(&profile)?,
            }
        }
        Command::Summaries {
            page,
            page_size,
            all,
            accreditations,
        } => {
            let query = SummaryQuery {
                page,
                page_size,
                allocated_only: !all,
                accreditations,
            };
            print_json(&list_summaries(&state, &query).await?)?;
        }
        Command::Run {
            accreditation,
            subjects,
        } => {
            let output_dir = config.output_dir(&root_folder);
            let records =
                artifacts::run_accreditation(&state, &accreditation, &subjects, &output_dir).await?;
            print_json(&records)?;
        }
        Command::Status { accreditation } => match accreditation {
            Some(id) => print_json(&artifacts::list_artifacts(&state, Some(&id)).await?)?,
            None => print_json(&artifacts::artifact_status(&state).await?)?,
        },
    }

    Ok(())
}

/// Install the fmt subscriber: RUST_LOG first, configured level as default
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
