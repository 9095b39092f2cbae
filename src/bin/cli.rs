//! Portwatch CLI
//!
//! Local execution entry point for fetch cycles and offline analysis.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use clap::{Parser, Subcommand};
use portwatch::{
    config,
    error::{AppError, Result},
    models::{Config, CycleReport, PortInfo},
    pipeline,
    services::{
        BulletinFetcher, BulletinParser, CommandLogin, FetchedBulletin, LoginProvider,
        RiskClassifier, SessionManager, extract_station_id,
    },
    storage::{CredentialCache, LocalStorage, RecordStore},
    utils::{Transport, http},
};

/// Portwatch - marine weather risk for ports of call
#[derive(Parser, Debug)]
#[command(
    name = "portwatch",
    version,
    about = "Port marine-weather bulletin fetcher and risk classifier"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Path to the port list
    #[arg(short, long, default_value = "data/ports.toml")]
    ports: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, store and classify bulletins for the configured ports
    Run {
        /// Limit the cycle to these port codes (repeatable)
        #[arg(long = "port")]
        port: Vec<String>,

        /// Threshold profile to classify with
        #[arg(long)]
        profile: Option<String>,

        /// Write the cycle report as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Parse and classify a bulletin file without touching the portal
    Parse {
        file: PathBuf,

        /// Port code to attribute the bulletin to
        #[arg(long)]
        port: Option<String>,

        #[arg(long)]
        profile: Option<String>,
    },

    /// Re-analyse the latest stored bulletin for a port
    Latest {
        port: String,

        #[arg(long)]
        profile: Option<String>,
    },

    /// Force an interactive login and persist the session
    Login,

    /// Validate configuration and port list
    Validate,

    /// Show session cache and stored bulletin status
    Info,
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Apply a `--profile` override and re-check the configuration.
fn with_profile(mut config: Config, profile: Option<String>) -> Result<Config> {
    if let Some(profile) = profile {
        config.risk.profile = profile;
    }
    config.validate()?;
    Ok(config)
}

fn build_fetcher(config: &Config) -> Result<BulletinFetcher> {
    let transport: Arc<dyn Transport> = Arc::new(http::create_async_client(&config.portal)?);
    let login: Arc<dyn LoginProvider> = Arc::new(CommandLogin::from_config(&config.session));
    let session = Arc::new(SessionManager::new(
        config.session.clone(),
        config.portal.clone(),
        login,
        Arc::clone(&transport),
    ));
    Ok(BulletinFetcher::new(
        transport,
        session,
        config.portal.clone(),
        config.fetch.clone(),
    ))
}

fn load_ports(path: &Path) -> Result<portwatch::models::PortRegistry> {
    let registry = config::load_ports(path)?;
    registry.validate()?;
    Ok(registry)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn log_report(report: &CycleReport) {
    for result in &report.results {
        match &result.outcome {
            portwatch::models::PortOutcome::Failed { message, .. } => log::warn!(
                "{:<8} {:<16} {}",
                result.port_code,
                result.outcome.status(),
                message
            ),
            portwatch::models::PortOutcome::Unchanged { assessment, .. } => log::info!(
                "{:<8} {:<16} {}",
                result.port_code,
                result.outcome.status(),
                assessment.level
            ),
            outcome => log::info!("{:<8} {}", result.port_code, outcome.status()),
        }
    }
    if report.cancelled {
        log::warn!("Cycle was cancelled before every port was processed");
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;
    init_logging(cli.verbose, &config.logging.level);

    log::debug!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run {
            port,
            profile,
            output,
        } => {
            let config = with_profile(config, profile)?;
            let ports = load_ports(&cli.ports)?.select(&port)?;
            let fetcher = build_fetcher(&config)?;
            let store = LocalStorage::new(&config.storage.root_dir);

            let cancel = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&cancel);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received, stopping after the current port");
                    flag.store(true, Ordering::SeqCst);
                }
            });

            let report = pipeline::run_cycle(&config, &fetcher, &store, &ports, &cancel).await?;
            log_report(&report);

            if let Some(path) = output {
                std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
                log::info!("Report written to {}", path.display());
            }
        }

        Command::Parse {
            file,
            port,
            profile,
        } => {
            let config = with_profile(config, profile)?;
            let content = std::fs::read_to_string(&file)?;
            let code = port.unwrap_or_else(|| "LOCAL".to_string());
            let info = PortInfo {
                station_id: extract_station_id(&content).unwrap_or_default(),
                name: code.clone(),
                code,
                country: String::new(),
                latitude: None,
                longitude: None,
            };

            let fetched = FetchedBulletin::from_content(content);
            let outcome = pipeline::analyze_content(
                &BulletinParser::new(),
                &RiskClassifier::from_config(&config.risk)?,
                &info,
                &fetched.issued_label,
                &fetched.content,
            )?;
            print_json(&outcome)?;
        }

        Command::Latest { port, profile } => {
            let config = with_profile(config, profile)?;
            let registry = load_ports(&cli.ports)?;
            let info = registry
                .get(&port)
                .ok_or_else(|| AppError::validation(format!("Unknown port code: {}", port)))?;
            let store = LocalStorage::new(&config.storage.root_dir);

            let outcome = pipeline::analyze_latest(
                &store,
                &BulletinParser::new(),
                &RiskClassifier::from_config(&config.risk)?,
                info,
            )
            .await?;
            print_json(&outcome)?;
        }

        Command::Login => {
            config.validate()?;
            let fetcher = build_fetcher(&config)?;
            let bundle = fetcher.session().authenticate().await?;
            log::info!(
                "Session saved to {} ({} cookies)",
                config.session.cache_path.display(),
                bundle.cookies.len()
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK (profile: {})", config.risk.profile);

            let registry = load_ports(&cli.ports)?;
            log::info!("✓ Port list OK ({} ports)", registry.len());

            log::info!("All validations passed!");
        }

        Command::Info => {
            let cache = CredentialCache::new(&config.session.cache_path);
            match cache.load().await {
                Some(bundle) => {
                    let now = Utc::now();
                    log::info!(
                        "Session: {} cookies, token {}, {}h old{}",
                        bundle.cookies.len(),
                        if bundle.token.is_some() { "present" } else { "absent" },
                        bundle.age_at(now).num_hours(),
                        if bundle.is_stale_at(config.session.ttl(), now) {
                            " (stale)"
                        } else {
                            ""
                        }
                    );
                }
                None => log::info!("Session: none cached at {}", cache.path().display()),
            }

            let registry = load_ports(&cli.ports)?;
            let store = LocalStorage::new(&config.storage.root_dir);
            for port in registry.iter() {
                match store.latest_issued_label(&port.code).await? {
                    Some(label) => log::info!("{:<8} {:<24} latest: {}", port.code, port.name, label),
                    None => log::info!("{:<8} {:<24} no bulletin stored", port.code, port.name),
                }
            }
        }
    }

    Ok(())
}
