use chrono::Utc;
use clap::{Parser, Subcommand};
use qa_core::config::{load_qa_config, ConfigError, QaConfig};
use qa_core::types::BotName;
use qa_core::validation::{Validate, ValidationLevel};
use qa_providers::{parse_provider_report, FallbackConfig, FallbackError, FallbackScheduler};
use qa_transport::{BotApiTransport, TransportError};
use qad::{
    export_bundle, install_shutdown_flag, run_service_loop, BotRegistry, BundleError, DaemonError,
    QaService, RegistryError, ServiceError,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "heimdall", about = "Queue-driven QA driver for chat bots")]
struct Cli {
    /// Org-level configuration; defaults apply when the file is absent.
    #[arg(long, default_value = "config/qa.toml")]
    config: PathBuf,
    /// Directory of per-bot TOML records.
    #[arg(long, default_value = "config/bots")]
    bots_dir: PathBuf,
    /// SQLite document store shared by the executor and the provider scheduler.
    #[arg(long, default_value = ".qa/state.sqlite")]
    state_db: PathBuf,
    /// Root of the day-scoped JSONL logbook.
    #[arg(long, default_value = ".qa/logs")]
    log_root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the long-lived executor service loop.
    Run {
        /// Run a single drain cycle and exit.
        #[arg(long)]
        once: bool,
        /// Override the configured poll interval.
        #[arg(long)]
        poll_interval_secs: Option<u64>,
    },
    /// Append one action envelope to a bot queue.
    QueueAction {
        #[arg(long = "type")]
        kind: String,
        /// JSON object payload.
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Target bot; defaults to the selected bot.
        #[arg(long)]
        bot: Option<String>,
    },
    /// Print the merged state snapshot as JSON.
    State,
    /// Select the bot under test.
    SelectBot { name: String },
    /// Provider fallback operations.
    Providers {
        #[command(subcommand)]
        command: ProvidersCommand,
    },
    /// Write the analysis hand-off bundle.
    ExportBundle {
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum ProvidersCommand {
    /// Pick the next available provider.
    Pick,
    /// Record a `<provider>:success|failure` result report.
    Report { report: String },
    /// Print the rotation status record as JSON.
    Status,
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Daemon(#[from] DaemonError),
    #[error(transparent)]
    Fallback(#[from] FallbackError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error("failed to parse action payload json: {source}")]
    PayloadParse {
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid provider report '{raw}': expected <provider>:success|failure")]
    InvalidReport { raw: String },
    #[error("failed to serialize output json: {source}")]
    SerializeOutput {
        #[source]
        source: serde_json::Error,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("heimdall failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), MainError> {
    let cli = Cli::parse();

    let mut config = load_effective_config(&cli.config)?;
    enforce_config(&config)?;

    ensure_parent_dir(&cli.state_db)?;
    let data_root = cli
        .state_db
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let registry = BotRegistry::load_dir(&cli.bots_dir, &data_root)?;
    let service = QaService::open(&cli.state_db, &cli.log_root, registry)?;

    match cli.command {
        Command::Run {
            once,
            poll_interval_secs,
        } => {
            if let Some(secs) = poll_interval_secs {
                config.daemon.poll_interval_secs = secs;
            }
            // Startup is the fatal boundary: a missing token or a dead
            // session must keep the loop from ever starting.
            let transport = BotApiTransport::from_config(&config.transport)?;
            let username = transport.verify_session()?;
            eprintln!(
                "[qad] session verified as @{username}, target {:?}, poll every {}s",
                config.transport.target_chat, config.daemon.poll_interval_secs
            );
            let shutdown = install_shutdown_flag()?;
            run_service_loop(&service, &transport, &config, &shutdown, once);
            Ok(())
        }
        Command::QueueAction { kind, payload, bot } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)
                .map_err(|source| MainError::PayloadParse { source })?;
            let envelope = service.queue_action(&kind, payload, bot.map(BotName::new))?;
            println!("queued {} for {}", envelope.id, envelope.bot);
            Ok(())
        }
        Command::State => {
            let snapshot = service.state_snapshot()?;
            let body = serde_json::to_string_pretty(&snapshot)
                .map_err(|source| MainError::SerializeOutput { source })?;
            println!("{body}");
            Ok(())
        }
        Command::SelectBot { name } => {
            service.select_bot(&name)?;
            println!("selected bot {name}");
            Ok(())
        }
        Command::Providers { command } => {
            let scheduler =
                FallbackScheduler::new(FallbackConfig::from_providers_config(&config.providers));
            run_providers_command(&service, &scheduler, command)
        }
        Command::ExportBundle { output } => {
            export_bundle(&service, &output)?;
            println!("wrote bundle to {}", output.display());
            Ok(())
        }
    }
}

fn run_providers_command(
    service: &QaService,
    scheduler: &FallbackScheduler,
    command: ProvidersCommand,
) -> Result<(), MainError> {
    let now = Utc::now();
    match command {
        ProvidersCommand::Pick => {
            match scheduler.pick_provider(&service.store, now)? {
                Some(provider) => println!("{provider}"),
                None => {
                    let wait = scheduler.all_failed_wait(&service.store, now)?;
                    println!("none (retry in {wait}s)");
                }
            }
            Ok(())
        }
        ProvidersCommand::Report { report } => {
            let parsed =
                parse_provider_report(&report).ok_or_else(|| MainError::InvalidReport {
                    raw: report.clone(),
                })?;
            scheduler.apply_report(&service.store, parsed, now)?;
            println!("recorded {report}");
            Ok(())
        }
        ProvidersCommand::Status => {
            let status = scheduler.load(&service.store, now)?;
            let body = serde_json::to_string_pretty(&status)
                .map_err(|source| MainError::SerializeOutput { source })?;
            println!("{body}");
            Ok(())
        }
    }
}

/// Load the config file when present; an absent file means defaults.
fn load_effective_config(path: &Path) -> Result<QaConfig, MainError> {
    if path.exists() {
        Ok(load_qa_config(path)?)
    } else {
        Ok(QaConfig::default())
    }
}

/// Reject configs with validation errors; print warnings and carry on.
fn enforce_config(config: &QaConfig) -> Result<(), MainError> {
    let issues = config.validate();
    let errors: Vec<String> = issues
        .iter()
        .filter(|issue| issue.level == ValidationLevel::Error)
        .map(|issue| format!("{} ({})", issue.message, issue.code))
        .collect();
    if !errors.is_empty() {
        return Err(MainError::InvalidConfig(errors.join("; ")));
    }
    for issue in issues {
        eprintln!("[qad] config warning: {} ({})", issue.message, issue.code);
    }
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<(), MainError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| MainError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}
