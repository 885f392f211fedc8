//! Gate Kiosk - workstation simulator
//!
//! Runs one kiosk session against simulated devices and reads operator
//! commands from stdin:
//!
//! ```text
//! tap <card>     present an RFID card
//! pay            confirm payment
//! scan <text>    feed scanner input
//! proceed        submit scanned gatepasses
//! reset          abandon the transaction
//! status         print the current snapshot
//! quit           shut down
//! ```

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use gate_kiosk::config::AppConfig;
use gate_kiosk::kiosk::adapters::{
    SimulatedBackend, SimulatedGate, SimulatedPayment, SimulatedReader, SimulatedSettings,
    TextSlipPrinter,
};
use gate_kiosk::kiosk::types::KioskSettings;
use gate_kiosk::kiosk::{Collaborators, KioskHandle, KioskSession, KioskSnapshot, kiosk_channel};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Environment name; loads config/{env}.yaml
    #[arg(short, long, default_value = "dev")]
    env: String,

    /// Explicit config file, overrides --env
    #[arg(long)]
    config: Option<PathBuf>,

    /// Generate a card tap every N milliseconds
    #[arg(long)]
    auto_tap_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let app_config = match &cli.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(&cli.env),
    }
    .context("loading configuration")?;
    let _log_guard = gate_kiosk::logging::init_logging(&app_config);

    info!(
        "Starting Gate Kiosk {} in {} mode",
        env!("GIT_HASH"),
        cli.env
    );

    let collaborators = build_collaborators(&app_config, cli.auto_tap_ms);
    let (handle, events) = kiosk_channel(app_config.queue_size);
    let mut session = KioskSession::new(
        collaborators,
        handle.clone(),
        app_config.timing.to_kiosk_timing(),
    );

    if let Err(e) = session.start().await {
        // Session stays in ERROR; `reset` retries detection
        error!("Kiosk startup failed: {}", e);
    }

    let mut snapshots = session.subscribe();
    let watcher = tokio::spawn(async move {
        let mut last = snapshots.borrow_and_update().clone();
        print_snapshot(&last);
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if snapshot.state != last.state || snapshot.status_text != last.status_text {
                print_snapshot(&snapshot);
            }
            last = snapshot;
        }
    });

    let status_rx = session.subscribe();
    let runner = tokio::spawn(session.run(events));

    tokio::select! {
        _ = console(handle.clone(), status_rx) => {
            info!("Console closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received");
        }
    }

    if handle.shutdown().await.is_err() {
        warn!("Kiosk loop already stopped");
    }
    runner.await.context("kiosk loop panicked")?;
    watcher.abort();

    info!("Gate Kiosk stopped");
    Ok(())
}

fn build_collaborators(config: &AppConfig, auto_tap_ms: Option<u64>) -> Collaborators {
    let sim = &config.simulator;
    let auto_tap = Some(auto_tap_ms.unwrap_or(sim.auto_tap_interval_ms))
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis);
    let gate_name = sim
        .gate_name
        .clone()
        .unwrap_or_else(|| KioskSettings::DEFAULT_GATE_NAME.to_string());

    Collaborators {
        settings: Arc::new(SimulatedSettings::new(sim.gate_name.clone(), sim.toll_amount)),
        reader: Arc::new(
            SimulatedReader::new(sim.reader_port.clone(), sim.baud_rate).with_auto_tap(auto_tap),
        ),
        backend: Arc::new(SimulatedBackend::new()),
        payment: Arc::new(SimulatedPayment::new(gate_name, sim.opening_balance)),
        printer: Arc::new(TextSlipPrinter::new(&config.printer.output_dir)),
        gate: Arc::new(SimulatedGate::new()),
    }
}

/// Forward stdin lines from a detached thread so a pending read never holds
/// up runtime shutdown
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn console(handle: KioskHandle, status: watch::Receiver<KioskSnapshot>) {
    let mut lines = spawn_stdin_reader();

    while let Some(line) = lines.recv().await {
        let line = line.trim();
        let (command, arg) = match line.split_once(' ') {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        let sent = match command {
            "" => continue,
            "tap" if !arg.is_empty() => handle.card_tapped(arg).await,
            "pay" => handle.confirm_payment().await,
            "scan" if !arg.is_empty() => handle.scan_input(arg).await,
            "proceed" => handle.proceed().await,
            "reset" => handle.reset().await,
            "status" => {
                print_snapshot(&status.borrow());
                continue;
            }
            "quit" | "exit" => return,
            _ => {
                println!("commands: tap <card> | pay | scan <text> | proceed | reset | status | quit");
                continue;
            }
        };

        if let Err(e) = sent {
            warn!("Command {} not delivered: {}", command, e);
            return;
        }
    }
}

fn print_snapshot(snapshot: &KioskSnapshot) {
    let marker = if snapshot.is_error { "!" } else { " " };
    let countdown = snapshot
        .countdown
        .map(|s| format!(" [{}s]", s))
        .unwrap_or_default();
    println!(
        "{} {:<26} {}{}  gate={} toll={} passes={}/{} progress={}%",
        marker,
        snapshot.state.to_string(),
        snapshot.status_text,
        countdown,
        snapshot.gate_name,
        snapshot.toll_amount,
        snapshot.valid_gatepass_count(),
        snapshot.gatepasses.len(),
        snapshot.final_progress,
    );
}
