//! Core firmware for a networked 7-color e-paper photo frame.
//!
//! Drives the image processing pipeline, rotation engine, and power
//! coordinator. HTTP handlers, WiFi provisioning, and the real panel
//! driver are external collaborators this binary does not implement
//! (spec §1 scope boundary).

mod context;
mod display;
mod error;
mod pipeline;
mod power;
mod rotation;
mod store;

use clap::Parser;
use context::AppContext;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "photoframe-core")]
#[command(about = "Core pipeline, rotation, and power coordination for a networked e-paper photo frame")]
#[command(version)]
struct Args {
    /// Path to the persisted key-value document.
    #[arg(short, long, default_value = "/opt/photoframe/config.json")]
    config: String,

    /// Root directory for SDCard-mode albums.
    #[arg(long, default_value = "/opt/photoframe/images")]
    image_root: String,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Run one rotation cycle and exit.
    #[arg(long)]
    rotate: bool,

    /// Show the calibration pattern and exit.
    #[arg(long)]
    calibrate: bool,

    /// Show the setup screen and exit.
    #[arg(long)]
    setup_screen: bool,

    /// Clear the display and exit.
    #[arg(long)]
    clear: bool,
}

/// Using current_thread runtime for the single-core target this firmware
/// ships on.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    tracing::info!("Starting photo frame core");

    let ctx = AppContext::bootstrap(&args.config.clone().into(), args.image_root.clone().into()).await?;

    if args.calibrate {
        tracing::info!("Showing calibration pattern...");
        ctx.display.show_calibration(&store::palette::THEORETICAL_PALETTE).await?;
        tracing::info!("Calibration pattern complete");
        return Ok(());
    }

    if args.setup_screen {
        tracing::info!("Showing setup screen...");
        ctx.display.show_setup_screen(&store::palette::THEORETICAL_PALETTE).await?;
        tracing::info!("Setup screen complete");
        return Ok(());
    }

    if args.clear {
        tracing::info!("Clearing display...");
        ctx.display.clear(&store::palette::THEORETICAL_PALETTE).await?;
        tracing::info!("Display cleared");
        return Ok(());
    }

    if args.rotate {
        tracing::info!("Running one rotation cycle...");
        ctx.rotation.rotate().await?;
        tracing::info!("Rotation complete");
        return Ok(());
    }

    // Classify the wake cause before entering the normal daemon loop
    // (spec §2 data flow: wake classifier -> rotation/display -> power
    // coordinator; spec §4.G).
    match ctx.power.classify_wake().await {
        power::wake::WakeReason::Timer | power::wake::WakeReason::RotateKey => {
            tracing::info!("Wake: running rotation");
            if let Err(e) = ctx.rotation.rotate().await {
                tracing::error!(error = %e, "rotation on wake failed");
            }
        }
        power::wake::WakeReason::ClearKey => {
            tracing::info!("Wake: clearing display");
            if let Err(e) = ctx.display.clear(&store::palette::THEORETICAL_PALETTE).await {
                tracing::error!(error = %e, "clear on wake failed");
            }
        }
        power::wake::WakeReason::WakeKey => {
            tracing::info!("Wake: resetting sleep timer");
            ctx.power.reset_sleep_timer();
        }
        power::wake::WakeReason::Ext1Unknown | power::wake::WakeReason::NotFromDeepSleep => {}
    }

    // Setup shutdown signal handling.
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let sleep_shutdown = shutdown_tx.subscribe();
    let power_sleep = ctx.power.clone();
    let sleep_handle = tokio::spawn(async move {
        power_sleep.run_auto_sleep(sleep_shutdown).await;
    });

    let rotate_shutdown = shutdown_tx.subscribe();
    let power_rotate = ctx.power.clone();
    let rotate_handle = tokio::spawn(async move {
        power_rotate.run_active_rotate(rotate_shutdown).await;
    });

    let periodic_shutdown = shutdown_tx.subscribe();
    let periodic_registry = ctx.periodic.clone();
    let periodic_handle = tokio::spawn(async move {
        run_periodic_tasks(periodic_registry, periodic_shutdown).await;
    });

    wait_for_shutdown().await;
    tracing::info!("Shutdown signal received");

    let _ = shutdown_tx.send(());

    for (name, handle) in [
        ("auto-sleep", sleep_handle),
        ("active-rotate", rotate_handle),
        ("periodic-tasks", periodic_handle),
    ] {
        tokio::select! {
            _ = handle => {},
            _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {
                tracing::warn!("{name} task shutdown timeout");
            }
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Runs due periodic tasks (currently just the SNTP-resync placeholder;
/// real SNTP and OTA-check tasks are external collaborators) once a
/// minute until shutdown.
async fn run_periodic_tasks(
    registry: std::sync::Arc<power::periodic::PeriodicTaskRegistry>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(60)) => {
                let now = chrono::Utc::now().timestamp();
                registry
                    .check_and_run_all(now, |name| {
                        tracing::info!(task = %name, "running periodic task");
                        Ok(())
                    })
                    .await;
            }
            _ = shutdown.recv() => return,
        }
    }
}

/// Initialize tracing/logging.
///
/// Default level is "warn" to minimize flash/SD wear; `--verbose` raises
/// it to "debug".
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("photoframe_core={level}").into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Wait for shutdown signals (SIGTERM, SIGINT).
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to set up SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to set up SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
}
