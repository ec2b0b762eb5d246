//! Noisewatch - unattended noise disturbance monitor
//!
//! Entry point for the long-running console monitor.

use anyhow::{Context, Result};
use chrono::Local;
use noisewatch::{
    AudioEngine, CsvEventSink, EventRecorder, Monitor, MonitorConfig, RetryingSink,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Command line errors
#[derive(Error, Debug, PartialEq, Eq)]
enum CliError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),

    #[error("Unknown argument: {0}")]
    UnknownArgument(String),
}

/// Options for a monitoring run
#[derive(Debug, Default, PartialEq, Eq)]
struct RunOptions {
    device: Option<String>,
    config: Option<PathBuf>,
}

/// What the process was asked to do
#[derive(Debug, PartialEq, Eq)]
enum Command {
    List,
    Version,
    Help,
    InitConfig(PathBuf),
    Run(RunOptions),
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("noisewatch=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_help();
            std::process::exit(2);
        }
    };

    match command {
        Command::List => list_devices(),
        Command::Version => {
            println!("noisewatch {} (built {})", noisewatch::VERSION, noisewatch::BUILD_DATE);
            Ok(())
        }
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::InitConfig(path) => {
            MonitorConfig::default()
                .save(&path)
                .with_context(|| format!("Failed to write config to {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        Command::Run(options) => {
            print_banner();
            run(options)
        }
    }
}

fn parse_args(args: &[String]) -> Result<Command, CliError> {
    let mut options = RunOptions::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--list" | "-l" => return Ok(Command::List),
            "--version" | "-v" => return Ok(Command::Version),
            "--help" | "-h" => return Ok(Command::Help),
            "--init-config" => {
                let path = args.get(i + 1).ok_or(CliError::MissingValue("--init-config"))?;
                return Ok(Command::InitConfig(PathBuf::from(path)));
            }
            "--device" | "-d" => {
                let name = args.get(i + 1).ok_or(CliError::MissingValue("--device"))?;
                options.device = Some(name.clone());
                i += 2;
                continue;
            }
            "--config" | "-c" => {
                let path = args.get(i + 1).ok_or(CliError::MissingValue("--config"))?;
                options.config = Some(PathBuf::from(path));
                i += 2;
                continue;
            }
            arg => return Err(CliError::UnknownArgument(arg.to_string())),
        }
    }

    Ok(Command::Run(options))
}

fn print_banner() {
    println!("╔════════════════════════════════════════════════════════════╗");
    println!(
        "║          Noisewatch v{} - Noise Disturbance Monitor       ║",
        noisewatch::VERSION
    );
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
}

fn print_help() {
    println!("Usage: noisewatch [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -l, --list              List available input devices");
    println!("  -d, --device NAME       Capture from the named input device");
    println!("  -c, --config PATH       Load settings from a JSON config file");
    println!("      --init-config PATH  Write the default config file and exit");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Environment:");
    println!(
        "  NOISE_LEVEL_THRESHOLD   Noise threshold in dB (default: {})",
        noisewatch::DEFAULT_NOISE_LEVEL_THRESHOLD
    );
    println!(
        "  MAX_TIME_BETWEEN_NOISE  Longest quiet gap in seconds (default: {})",
        noisewatch::DEFAULT_MAX_TIME_BETWEEN_NOISE
    );
    println!("  RUST_LOG                Log filter, e.g. noisewatch=debug");
    println!();
    println!("Without arguments, monitors the default input device and appends");
    println!("disturbances to {}.", noisewatch::DEFAULT_LOG_PATH);
}

fn list_devices() -> Result<()> {
    println!("Scanning for input devices...");
    println!();

    match AudioEngine::list_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("No input devices found.");
            } else {
                println!("Found {} device(s):", devices.len());
                println!();
                for (i, device) in devices.iter().enumerate() {
                    let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                    println!("  {}. {}{}", i + 1, device.name, default_marker);
                    println!("     Channels: {} in", device.input_channels);
                    if !device.sample_rates.is_empty() {
                        println!("     Sample rates: {:?}", device.sample_rates);
                    }
                    println!();
                }
            }
        }
        Err(e) => {
            error!("Failed to list devices: {}", e);
            println!("Error: {}", e);
        }
    }

    Ok(())
}

/// Install the Ctrl+C handler and return the flag it clears
///
/// Must run before capture starts; an interrupt during startup then stops
/// the monitor loop on its first check.
fn install_interrupt_flag() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl+C handler");
    }
    running
}

fn run(options: RunOptions) -> Result<()> {
    let running = install_interrupt_flag();

    let mut config =
        MonitorConfig::load(options.config.as_deref()).context("Failed to load configuration")?;
    if options.device.is_some() {
        config.device = options.device;
    }

    // Event writer first, so a bad log path fails before capture starts
    let sink = CsvEventSink::open(&config.log_path).with_context(|| {
        format!("Failed to open disturbance log {}", config.log_path.display())
    })?;
    let sink = RetryingSink::new(
        sink,
        config.sink_retry_attempts,
        Duration::from_millis(config.sink_retry_backoff_ms),
    );
    let mut recorder = EventRecorder::new(sink)
        .start()
        .context("Failed to start event writer")?;

    let mut engine = AudioEngine::new();
    engine.set_sample_rate(config.sample_rate);
    engine.set_frame_size(config.frame_size);

    match config.device.as_deref() {
        Some(name) => engine
            .select_device(name)
            .with_context(|| format!("Could not find input device '{}' (use --list)", name))?,
        None => engine
            .select_default_device()
            .context("No default input device")?,
    }

    let frames = engine.start().context("Failed to start audio capture")?;

    // The level buffer is sized from the rate actually in effect
    if engine.sample_rate() != config.sample_rate {
        info!(
            configured = config.sample_rate,
            effective = engine.sample_rate(),
            "Using device sample rate"
        );
        config.sample_rate = engine.sample_rate();
    }

    let mut monitor = Monitor::new(&config);
    monitor.stats_mut().start(Local::now());
    monitor.stats_mut().set_device_info(
        engine.device_name().map(str::to_string),
        engine.sample_rate(),
    );

    println!(
        "Device: {} @ {} Hz",
        engine.device_name().unwrap_or("unknown"),
        engine.sample_rate()
    );
    println!(
        "Threshold: {} dB | Max quiet gap: {} s | Log: {}",
        config.noise_level_threshold,
        config.max_time_between_noise,
        config.log_path.display()
    );
    println!();
    println!("Monitoring started. Press Ctrl+C to stop.");
    println!();
    println!("Status:");
    println!("────────────────────────────────────────");

    let mut last_status = String::new();
    let mut last_dropped = 0u64;
    monitor.run(
        &frames,
        &running,
        |event| {
            recorder.submit(event);
        },
        |stats| {
            let dropped = engine.dropped_frames();
            if dropped > last_dropped {
                warn!(
                    dropped = dropped - last_dropped,
                    total = dropped,
                    "Frames dropped, monitor falling behind capture"
                );
                last_dropped = dropped;
            }
            stats.set_dropped_frames(dropped);
            stats.set_sink_counters(recorder.written(), recorder.failed());

            // Only print if changed (reduce spam)
            let status_line = stats.status_line();
            if status_line != last_status {
                println!("{}", status_line);
                last_status = status_line;
            }
        },
    );

    println!();
    println!("Stopping noise monitoring...");
    engine.stop()?;
    recorder.finish();

    let stats = monitor.stats_mut();
    stats.set_sink_counters(recorder.written(), recorder.failed());
    println!();
    println!("{}", stats.summary(Local::now()));
    println!("Done.");

    Ok(())
}
