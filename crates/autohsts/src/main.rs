//! AutoHSTS - Main entry point
//!
//! Gradually raises the HSTS max-age of virtual hosts and makes it
//! permanent after a certificate renewal.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use autohsts::{
    AutoHsts, FileModuleRegistry, FileProgressStore, HostId, KdlVhostTree, Lineage,
    RenewalEvent, RenewalHooks, RenewalScheduler, StepSchedule, SystemClock,
};
use autohsts_common::{logging, LogFormat};
use autohsts_config::{lint_config, Config};

type Manager = AutoHsts<KdlVhostTree, FileModuleRegistry, FileProgressStore, SystemClock>;

/// AutoHSTS - gradual Strict-Transport-Security rollout
#[derive(Parser, Debug)]
#[command(name = "autohsts")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "AUTOHSTS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long = "json-logs", global = true)]
    json_logs: bool,

    /// Override the minimum seconds between two increases
    #[arg(long = "frequency-secs", global = true)]
    frequency_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a gradually increasing HSTS header to a virtual host
    Enable {
        /// Virtual host id
        host: String,
    },
    /// Run one gated update cycle over all tracked hosts
    Update,
    /// Make max-age permanent after a successful renewal
    Deploy {
        /// Renewed certificate lineage
        #[arg(long = "lineage")]
        lineage: String,

        /// Private key path of the renewed certificate
        #[arg(long = "key-path")]
        key_path: PathBuf,
    },
    /// Show tracked hosts
    Status,
    /// Run update cycles periodically until interrupted
    Watch {
        /// Seconds between cycles (minimum 3600)
        #[arg(long = "interval-secs")]
        interval_secs: Option<u64>,
    },
    /// Validate configuration file and exit
    Test,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init(format, cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Test => test_config(&config, cli.config.as_deref()),
        Commands::Enable { host } => {
            let mut manager = build_manager(&config, cli.frequency_secs)?;
            let host = HostId::new(host);
            match manager.activate(&host) {
                Ok(record) => {
                    println!(
                        "Enabled AutoHSTS on {} (max-age={})",
                        record.host_id,
                        manager.schedule().first().max_age
                    );
                    Ok(())
                }
                Err(e) if e.is_already_enabled() => {
                    println!("{e}");
                    Ok(())
                }
                Err(e) => Err(e).context("Failed to enable AutoHSTS"),
            }
        }
        Commands::Update => {
            let mut manager = build_manager(&config, cli.frequency_secs)?;
            let report = manager.on_cycle().context("AutoHSTS update failed")?;
            for host in &report.advanced {
                println!("increased: {host}");
            }
            Ok(())
        }
        Commands::Deploy { lineage, key_path } => {
            let mut manager = build_manager(&config, cli.frequency_secs)?;
            let event = RenewalEvent::succeeded(Lineage::new(lineage, key_path));
            if let Some(report) = manager
                .on_renewal(&event)
                .context("AutoHSTS deploy failed")?
            {
                for host in &report.promoted {
                    println!("permanent: {host}");
                }
            }
            Ok(())
        }
        Commands::Status => {
            let manager = build_manager(&config, cli.frequency_secs)?;
            let hosts = manager.status().context("Failed to read AutoHSTS progress")?;
            if hosts.is_empty() {
                println!("No hosts tracked");
            }
            for host in hosts {
                println!(
                    "{}\tstep {}/{}\tmax-age={}\tlast-updated={}{}",
                    host.record.host_id,
                    host.record.current_index + 1,
                    manager.schedule().len(),
                    host.max_age,
                    host.record.last_updated.to_rfc3339(),
                    if host.due_for_promotion {
                        "\tpermanent on next renewal"
                    } else {
                        ""
                    }
                );
            }
            Ok(())
        }
        Commands::Watch { interval_secs } => {
            let manager = build_manager(&config, cli.frequency_secs)?;
            watch(manager, interval_secs.map(Duration::from_secs))
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            Config::from_file(path).context("Failed to load configuration file")?
        }
        None => {
            info!("No configuration specified, using defaults");
            Config::default()
        }
    };

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

/// Validate configuration and report lint warnings
fn test_config(config: &Config, path: Option<&std::path::Path>) -> Result<()> {
    let lint = lint_config(config);
    for warning in &lint.warnings {
        warn!("{}", warning.message);
    }

    info!("Configuration test successful:");
    info!("  - {} step(s)", config.autohsts.steps.len());
    info!("  - permanent max-age {}s", config.autohsts.permanent_secs);
    info!("  - frequency {}s", config.autohsts.frequency_secs);

    println!(
        "autohsts: configuration file {} test is successful",
        path.map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults)".to_string())
    );
    Ok(())
}

fn build_manager(config: &Config, frequency_override: Option<u64>) -> Result<Manager> {
    let paths = &config.paths;

    let tree = KdlVhostTree::load(&paths.vhosts)
        .with_context(|| format!("Failed to load virtual hosts from {:?}", paths.vhosts))?;
    let modules = FileModuleRegistry::load(&paths.modules)
        .with_context(|| format!("Failed to load modules from {:?}", paths.modules))?;
    let store = FileProgressStore::open(&paths.storage)
        .with_context(|| format!("Failed to open progress store at {:?}", paths.storage))?;
    let schedule =
        StepSchedule::from_settings(&config.autohsts).context("Invalid step schedule")?;

    let frequency = frequency_override.unwrap_or(config.autohsts.frequency_secs);
    Ok(AutoHsts::new(tree, modules, store, schedule).with_frequency(Duration::from_secs(frequency)))
}

fn watch(manager: Manager, interval: Option<Duration>) -> Result<()> {
    let mut scheduler = RenewalScheduler::new(manager);
    if let Some(interval) = interval {
        scheduler = scheduler.with_interval(interval);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    runtime.block_on(async {
        tokio::select! {
            _ = scheduler.run() => {}
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for shutdown signal")?;
                info!("Shutdown signal received, stopping AutoHSTS scheduler");
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
