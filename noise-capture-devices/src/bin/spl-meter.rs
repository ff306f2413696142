//! # spl-meter
//!
//! Command line sound level meter.
//!
//! Prints one line per stored measurement window and a session summary at
//! the end, reading either a WAV recording or (with the `cpal` feature) a
//! live input device.
//!
//! ```text
//! spl-meter --input recording.wav
//! spl-meter --input recording.wav --config settings.json --gain-db -3.5 --json
//! spl-meter --duration 30            # live, requires --features cpal
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use noise_capture_core::{
    CaptureProvider, CaptureSupervisor, DelayedMeasurement, LifecycleState, MeasurementConfiguration,
    MeasurementListener, SpectrumSnapshot,
};
use noise_capture_devices::WavReplayCapture;

/// Command line arguments for the sound level meter.
#[derive(Parser, Debug)]
#[command(name = "spl-meter")]
#[command(version)]
#[command(about = "Calibrated third-octave sound level meter", long_about = None)]
struct Args {
    /// WAV file to replay instead of capturing from an input device.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON settings file; missing fields keep their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device calibration gain in dB, overrides the settings file.
    #[arg(short, long, allow_negative_numbers = true)]
    gain_db: Option<f64>,

    /// Stop after this many seconds.
    #[arg(short, long)]
    duration: Option<f64>,

    /// Pace a WAV replay to its sample rate.
    #[arg(long)]
    realtime: bool,

    /// Print measurements and the summary as JSON lines.
    #[arg(long)]
    json: bool,

    /// Input device name (live capture only).
    #[arg(long)]
    device: Option<String>,
}

/// Prints every stored measurement as it is emitted.
struct MeasurementPrinter {
    json: bool,
    nominal_frequencies: Vec<f64>,
}

impl MeasurementListener for MeasurementPrinter {
    fn on_state_changed(&self, old: LifecycleState, new: LifecycleState) {
        log::debug!("{:?} -> {:?}", old, new);
    }

    fn on_spectrum_updated(&self, _snapshot: &SpectrumSnapshot) {}

    fn on_measurement_ready(&self, measurement: &DelayedMeasurement) {
        if self.json {
            match serde_json::to_string(measurement) {
                Ok(line) => println!("{}", line),
                Err(e) => log::error!("failed to serialize measurement: {}", e),
            }
            return;
        }

        let loudest = self
            .nominal_frequencies
            .iter()
            .zip(measurement.band_levels())
            .max_by(|a, b| a.1.total_cmp(b.1));
        match loudest {
            Some((frequency, level)) => println!(
                "{}  {:6.1} dB  (loudest band {} Hz at {:.1} dB)",
                measurement.started_at.format("%H:%M:%S%.3f"),
                measurement.global_level(),
                frequency,
                level
            ),
            None => println!(
                "{}  {:6.1} dB",
                measurement.started_at.format("%H:%M:%S%.3f"),
                measurement.global_level()
            ),
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            MeasurementConfiguration::from_json(&json)?
        }
        None => MeasurementConfiguration::default(),
    };
    if let Some(gain_db) = args.gain_db {
        config.gain_db = gain_db;
    }

    match &args.input {
        Some(path) => {
            let replay = WavReplayCapture::new(path)?.realtime(args.realtime);
            run(replay, config, &args)
        }
        None => run_live(config, &args),
    }
}

#[cfg(feature = "cpal")]
fn run_live(config: MeasurementConfiguration, args: &Args) -> Result<()> {
    use noise_capture_devices::CpalCapture;

    if args.duration.is_none() {
        bail!("live capture needs --duration");
    }
    let capture = match &args.device {
        Some(name) => CpalCapture::with_device(name)?,
        None => CpalCapture::default_device()?,
    };
    run(capture, config, args)
}

#[cfg(not(feature = "cpal"))]
fn run_live(_config: MeasurementConfiguration, _args: &Args) -> Result<()> {
    bail!("no --input given and live capture requires the `cpal` feature")
}

fn run<P: CaptureProvider>(provider: P, config: MeasurementConfiguration, args: &Args) -> Result<()> {
    let mut session = CaptureSupervisor::new(provider, config)?;
    session.add_listener(Arc::new(MeasurementPrinter {
        json: args.json,
        nominal_frequencies: session.delayed_band_plan().nominal_frequencies(),
    }));

    if !args.json {
        println!("capturing at {}", session.format());
    }
    session.start()?;

    while !session.source_exhausted() {
        if args.duration.is_some_and(|limit| session.elapsed_secs() >= limit) {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    let summary = session.stop()?;
    let diagnostics = session.diagnostics();
    log::info!(
        "{} chunks, {} read errors, {} analysis failures",
        diagnostics.chunks_captured,
        diagnostics.read_errors,
        diagnostics.analysis_failures
    );

    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
        return Ok(());
    }
    println!(
        "{} measurements over {:.1} s",
        summary.measurement_count, summary.duration_secs
    );
    if let (Some(min), Some(mean), Some(max)) = (
        summary.statistics.min(),
        summary.statistics.mean(),
        summary.statistics.max(),
    ) {
        println!("min {:.1} dB  Leq {:.1} dB  max {:.1} dB", min, mean, max);
    }
    if !summary.retained {
        println!(
            "session not retained (fewer than {} measurements)",
            session.config().min_measurement_count
        );
    }
    Ok(())
}
