//! Spooltag - headless RFID programming for filament spools
//!
//! # Usage
//!
//! ```bash
//! # Program both tags of a spool
//! spooltag program --sku PLA001
//!
//! # Exercise the full flow without hardware
//! spooltag program --sku PLA001 --mock
//!
//! # List catalog entries and their payload files
//! spooltag skus
//!
//! # Probe the reader/programmer
//! spooltag device-status
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spooltag_core::EngineConfig;
use spooltag_device::{AnyProgrammerDevice, MockProgrammerHandle, ProgrammerDevice};
use spooltag_engine::{
    DirectoryPayloadStore, FilamentCatalog, SessionManager, SessionSnapshot, SessionState,
    TagPhase, audit_channel,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Spooltag - dual-tag RFID programmer for filament spools
#[derive(Parser)]
#[command(name = "spooltag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the binaries directory
    #[arg(long, global = true, value_name = "DIR")]
    binaries_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Program both tags of a spool
    Program {
        /// SKU to program (case-insensitive)
        #[arg(long)]
        sku: String,

        /// Use the mock device instead of real hardware
        #[arg(long)]
        mock: bool,
    },

    /// List catalog entries and whether their payload files exist
    Skus,

    /// Check reader/programmer status
    DeviceStatus {
        /// Use the mock device instead of real hardware
        #[arg(long)]
        mock: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &cli.binaries_dir {
        config.binaries_dir = dir.clone();
    }

    match cli.command {
        Commands::Program { sku, mock } => {
            config.mock_mode = config.mock_mode || mock;
            program(config, &sku).await
        }
        Commands::Skus => list_skus(&config),
        Commands::DeviceStatus { mock } => {
            config.mock_mode = config.mock_mode || mock;
            device_status(&config).await
        }
    }
}

fn load_catalog(config: &EngineConfig) -> Result<Option<FilamentCatalog>> {
    match &config.catalog_file {
        Some(path) => {
            let catalog = FilamentCatalog::from_file(path)
                .with_context(|| format!("loading catalog from {}", path.display()))?;
            Ok(Some(catalog))
        }
        None => Ok(None),
    }
}

async fn program(config: EngineConfig, sku: &str) -> Result<()> {
    if config.mock_mode {
        println!("running in MOCK MODE - no hardware will be programmed");
    }

    // Long enough for the worker's debounced absence polls to finish
    // before the simulated operator places the next tag.
    let operator_settle = config.detection_interval() * (config.debounce_polls + 1);

    let catalog = load_catalog(&config)?;
    let mut store = DirectoryPayloadStore::new(config.binaries_dir.clone());
    if let Some(catalog) = catalog.clone() {
        store = store.with_catalog(catalog);
    }

    let (audit_tx, mut audit_rx) = audit_channel();
    let mut manager = SessionManager::new(config, Arc::new(store))?.with_audit(audit_tx);
    if let Some(catalog) = catalog {
        manager = manager.with_catalog(catalog);
    }
    let manager = Arc::new(manager);

    // Print audit records as JSON lines for the logging collaborator.
    tokio::spawn(async move {
        while let Some(record) = audit_rx.recv().await {
            if let Ok(line) = serde_json::to_string(&record) {
                println!("audit: {line}");
            }
        }
    });

    let snapshot = manager.start_session(sku).await?;
    println!("session {} started for {}", snapshot.session_id, snapshot.sku);

    // In mock mode nobody is physically placing tags; simulate the
    // operator so the full flow runs end to end.
    if let Some(handle) = manager.mock_handle().cloned() {
        tokio::spawn(mock_operator(handle, manager.watch(), operator_settle));
    }

    // Narrate phase changes while the worker runs.
    let mut rx = manager.watch();
    let narrator = tokio::spawn(async move {
        let mut last: Option<(SessionState, TagPhase, TagPhase)> = None;
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(snapshot) = current {
                let state = (snapshot.state, snapshot.tag1.phase, snapshot.tag2.phase);
                if last != Some(state) {
                    print_progress(&snapshot);
                    last = Some(state);
                }
                if snapshot.state.is_terminal() {
                    return;
                }
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    });

    let final_snapshot = tokio::select! {
        snapshot = manager.wait_until_terminal() => snapshot,
        _ = tokio::signal::ctrl_c() => {
            println!("stop requested, finishing in-flight operation...");
            manager.stop_session().await;
            manager.status()
        }
    };
    let _ = narrator.await;

    match final_snapshot.map(|s| s.state) {
        Some(SessionState::Complete) => {
            println!("both tags programmed");
            Ok(())
        }
        Some(state) => anyhow::bail!("session ended in state {state}"),
        None => anyhow::bail!("no session state available"),
    }
}

fn print_progress(snapshot: &SessionSnapshot) {
    let active = if snapshot.tag1.phase == TagPhase::Pass {
        &snapshot.tag2
    } else {
        &snapshot.tag1
    };
    let error = active
        .last_error
        .as_ref()
        .map(|e| format!(" ({e}, {} attempts left)", active.attempts_remaining))
        .unwrap_or_default();
    println!(
        "[{}] tag{}: {}{}",
        snapshot.state, active.tag_number, active.phase, error
    );
}

/// Simulated operator for mock runs: places a tag whenever one is
/// awaited and removes it once it passes or fails.
async fn mock_operator(
    handle: MockProgrammerHandle,
    mut rx: tokio::sync::watch::Receiver<Option<SessionSnapshot>>,
    settle: Duration,
) {
    loop {
        let snapshot = rx.borrow_and_update().clone();
        if let Some(s) = snapshot {
            if s.state.is_terminal() {
                return;
            }

            let active = if s.tag1.phase == TagPhase::Pass {
                &s.tag2
            } else {
                &s.tag1
            };

            if handle.is_tag_placed() {
                if active.phase == TagPhase::Pass || active.phase == TagPhase::Fail {
                    handle.remove_tag();
                }
            } else if active.phase == TagPhase::AwaitingTag {
                // Give the worker's absence debounce time to finish
                // before the next tag appears.
                tokio::time::sleep(settle).await;
                handle.place_tag();
            }
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn list_skus(config: &EngineConfig) -> Result<()> {
    let Some(catalog) = load_catalog(config)? else {
        println!("no catalog file configured (set catalog_file in the config)");
        return Ok(());
    };

    let store = DirectoryPayloadStore::new(config.binaries_dir.clone()).with_catalog(catalog.clone());

    println!("available filaments ({} total):", catalog.len());
    for entry in catalog.entries() {
        let present = store
            .payload_path(&entry.sku)
            .map(|p| p.exists())
            .unwrap_or(false);
        let marker = if present { "ok" } else { "MISSING PAYLOAD" };
        println!(
            "  {:<12} {:<28} {} [{}]",
            entry.sku.as_str(),
            entry.name,
            entry.binary_file,
            marker
        );
    }
    Ok(())
}

async fn device_status(config: &EngineConfig) -> Result<()> {
    let (mut device, mock_handle) = AnyProgrammerDevice::from_config(config);
    if let Some(handle) = &mock_handle {
        handle.set_latency(Duration::from_millis(50));
    }

    println!("probing reader/programmer...");
    device.connect().await.context("device probe failed")?;

    match &mut device {
        AnyProgrammerDevice::Hardware(programmer) => {
            if let Some(path) = programmer.resolved_path() {
                println!("Proxmark3 detected at {path}");
            }
            let banner = programmer.firmware_info().await?;
            println!("{banner}");
        }
        AnyProgrammerDevice::Mock(_) => {
            println!("mock programmer connected (simulated)");
        }
    }

    device.disconnect().await.ok();
    Ok(())
}
