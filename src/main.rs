//! Facerig - Face Tracking to VMC Motion Capture
//!
//! Main entry point for the CLI application.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use facerig::{
    config::Config, output::OutputDispatcher, pipeline::CalibrationStatus,
    tracking::UdpLandmarkSource, Pipeline, SessionHandle, TrackingSession, Tuning,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Facerig - face tracking to VMC motion capture
#[derive(Parser, Debug)]
#[command(name = "facerig", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Landmark source port (overrides config)
    #[arg(long)]
    source_port: Option<u16>,

    /// VMC receiver host (overrides config)
    #[arg(long)]
    vmc_host: Option<String>,

    /// VMC receiver port (overrides config)
    #[arg(long)]
    vmc_port: Option<u16>,

    /// Disable VMC output
    #[arg(long)]
    no_vmc: bool,

    /// Enable the virtual camera on this device (overrides config)
    #[arg(long)]
    virtual_camera: Option<PathBuf>,

    /// Enable VTube Studio output
    #[arg(long)]
    vtube_studio: bool,

    /// Start a calibration session as soon as tracking starts
    #[arg(long)]
    calibrate: bool,

    /// Read control commands from stdin (calibrate, commit, reset, smooth-reset, status, quit)
    #[arg(long)]
    console: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", facerig::NAME, facerig::VERSION);

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(args));
    // a sink write stuck on the blocking pool must not hold up exit
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result?;

    info!("Facerig stopped");
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    // Load configuration
    let (mut config, config_path) = Config::load(args.config.clone())?;

    // Apply CLI overrides
    if let Some(port) = args.source_port {
        config.source.port = port;
    }
    if let Some(ref host) = args.vmc_host {
        config.vmc.host = host.clone();
    }
    if let Some(port) = args.vmc_port {
        config.vmc.port = port;
    }
    if args.no_vmc {
        config.vmc.enabled = false;
    }
    if args.vtube_studio {
        config.vtube_studio.enabled = true;
    }
    if let Some(ref device) = args.virtual_camera {
        config.virtual_camera.enabled = true;
        config.virtual_camera.device = device.clone();
    }

    // Validate configuration; never start on an invalid one
    config.validate()?;
    let tuning = Tuning::from_config(&config)?;

    info!(
        "Landmark source: {}:{}",
        config.source.listen_address, config.source.port
    );
    info!(
        "VMC output: {}",
        if config.vmc.enabled {
            format!("{}:{}", config.vmc.host, config.vmc.port)
        } else {
            "disabled".to_string()
        }
    );
    if config.vtube_studio.enabled {
        info!(
            "VTube Studio output: {}:{}",
            config.vtube_studio.host, config.vtube_studio.port
        );
    }
    info!(
        "Smoothing alpha: {}, precision mode: {}",
        config.smoothing.alpha, config.precision.enabled
    );

    let mut source = UdpLandmarkSource::new(&config.source);
    source.start().await?;

    let dispatcher = OutputDispatcher::from_config(&config, Handle::current());
    let (session, handle) = TrackingSession::new(
        source,
        Pipeline::from_config(&config),
        dispatcher,
        tuning,
    );
    let session = session.with_target_fps(config.capture.target_fps);

    if args.calibrate {
        info!("Hold a neutral pose for calibration");
        handle.start_calibration();
    }

    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(config_path.clone(), handle.clone()));

    if args.console {
        tokio::spawn(run_console(handle.clone()));
    }

    let mut session_task = tokio::spawn(session.run());

    let stats = tokio::select! {
        result = &mut session_task => result??,
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            handle.stop();
            session_task.await??
        }
    };

    info!(
        "Processed {} ticks ({} without face)",
        stats.ticks, stats.no_face_ticks
    );
    Ok(())
}

/// Reload tuning from the config file on SIGHUP. An invalid file is logged
/// and the running tuning stays in effect.
#[cfg(unix)]
async fn reload_on_hangup(path: Option<PathBuf>, handle: SessionHandle) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!("Config reload unavailable: {}", e);
            return;
        }
    };

    while hangup.recv().await.is_some() {
        let Some(path) = path.as_deref() else {
            warn!("SIGHUP received but no config file is in use");
            continue;
        };
        match load_tuning(path) {
            Ok(tuning) => {
                handle.update_tuning(tuning);
                info!("Tuning reloaded from {}", path.display());
            }
            Err(e) => warn!("Config reload rejected, keeping current tuning: {}", e),
        }
    }
}

#[cfg(unix)]
fn load_tuning(path: &Path) -> facerig::Result<Tuning> {
    let config = Config::from_file(path)?;
    config.validate()?;
    Ok(Tuning::from_config(&config)?)
}

/// Line-based control surface on stdin
async fn run_console(handle: SessionHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                error!("Console read error: {}", e);
                return;
            }
        };

        match line.trim() {
            "" => {}
            "calibrate" => {
                handle.start_calibration();
            }
            "commit" => {
                handle.commit_calibration();
            }
            "reset" => {
                handle.reset_calibration();
            }
            "smooth-reset" => {
                handle.reset_smoothing();
            }
            "status" => match handle.calibration_status() {
                CalibrationStatus::Idle => info!("Calibration: idle"),
                CalibrationStatus::Collecting {
                    collected,
                    required,
                } => info!("Calibration: collecting {}/{}", collected, required),
                CalibrationStatus::Committed => info!("Calibration: committed"),
            },
            "quit" => {
                handle.stop();
                return;
            }
            other => warn!("Unknown command: {}", other),
        }
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
