use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::{RecvTimeoutError, bounded};

use pvtrend::config::{
    EstimatorConfig, EstimatorParams, EstimatorSet, EwmDecay, SamplingFrequency, SessionConfig,
    SourceConfig,
};
use pvtrend::output::{OutputFormat, create_formatter};
use pvtrend::simulation::{SIMULATED_PVS, SimulatedSource};
use pvtrend::{SamplingClock, SourceRegistry, Variant};

#[derive(Parser, Debug)]
#[command(name = "pvtrend")]
#[command(about = "Sample simulated process variables and print their trends", long_about = None)]
struct Args {
    /// PV names to sample (default: the four dummy PVs)
    sources: Vec<String>,

    /// Session file (TOML) with sampling settings and sources
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Sampling frequency (e.g., "2", "10hz", "250ms")
    #[arg(long)]
    frequency: Option<SamplingFrequency>,

    /// Number of most recent samples kept per source
    #[arg(short = 'n', long)]
    retention: Option<usize>,

    /// Stop after this many seconds
    #[arg(short = 'd', long)]
    duration: Option<f64>,

    /// Stop after this many ticks
    #[arg(short = 't', long)]
    ticks: Option<u64>,

    /// Output format: text, json, csv
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Estimators to enable for sources given on the command line
    #[arg(short = 'e', long = "enable", value_enum)]
    enable: Vec<Variant>,

    /// Rolling window size
    #[arg(long)]
    window: Option<usize>,

    /// EWM smoothing factor in (0, 1]
    #[arg(long, conflicts_with = "com")]
    alpha: Option<f64>,

    /// EWM center of mass (alpha = 1 / (1 + com))
    #[arg(long)]
    com: Option<f64>,

    /// Adaptive average phase threshold
    #[arg(long)]
    phase_threshold: Option<f64>,

    /// Adaptive average points per phase
    #[arg(long)]
    points_per_phase: Option<usize>,

    /// Seed for the simulated PVs
    #[arg(long)]
    seed: Option<u64>,

    /// Probability of a missing reading (0.0-1.0)
    #[arg(long, default_value = "0.0")]
    dropout: f64,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut session = match &args.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("failed to load session {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(frequency) = args.frequency {
        session.sampling = frequency;
    }
    if let Some(retention) = args.retention {
        session.retention = retention;
    }

    let estimators = cli_estimators(&args);
    let mut names = args.sources.clone();
    if names.is_empty() && session.sources.is_empty() {
        names = SIMULATED_PVS.iter().map(|s| s.to_string()).collect();
    }
    for name in names {
        session.sources.push(SourceConfig {
            estimators: estimators.clone(),
            ..SourceConfig::new(name)
        });
    }

    let source = SimulatedSource::new(args.seed).with_dropout(args.dropout);
    for config in &session.sources {
        if !source.knows(&config.name) {
            log::warn!("{} is not a simulated PV, every read will fail", config.name);
        }
    }

    let registry = Arc::new(SourceRegistry::from_session(&session)?);
    let mut clock = SamplingClock::new(Arc::clone(&registry), Box::new(source), session.sampling);

    let formatter = create_formatter(args.format, args.verbose > 0);
    if let Some(header) = formatter.header() {
        println!("{}", header);
    }

    let (report_tx, report_rx) = bounded(64);
    clock.start(report_tx)?;

    let deadline = match args.duration {
        Some(secs) => Some(
            Instant::now() + Duration::try_from_secs_f64(secs).context("invalid --duration")?,
        ),
        None => None,
    };
    let mut received = 0u64;

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if args.ticks.is_some_and(|n| received >= n) {
            break;
        }

        match report_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(report) => {
                received += 1;
                let text = formatter.format(&report);
                if !text.is_empty() {
                    println!("{}", text);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    clock.stop();

    for snapshot in registry.snapshot_all() {
        log::info!(
            "{}: {} samples retained of {}, {} gaps",
            snapshot.name,
            snapshot.retained,
            snapshot.capacity,
            snapshot.gap_count
        );
    }

    Ok(())
}

/// Estimator settings for sources named on the command line
fn cli_estimators(args: &Args) -> EstimatorSet {
    let mut set = EstimatorSet::default();
    for &variant in &args.enable {
        let params = match EstimatorParams::default_for(variant) {
            EstimatorParams::Original => EstimatorParams::Original,
            EstimatorParams::RollingWindow { window } => EstimatorParams::RollingWindow {
                window: args.window.unwrap_or(window),
            },
            EstimatorParams::ExponentialWeighted { decay } => {
                let decay = match (args.alpha, args.com) {
                    (Some(alpha), _) => EwmDecay::Alpha(alpha),
                    (None, Some(com)) => EwmDecay::CenterOfMass(com),
                    (None, None) => decay,
                };
                EstimatorParams::ExponentialWeighted { decay }
            }
            EstimatorParams::AdaptiveAverage {
                phase_threshold,
                points_per_phase,
            } => EstimatorParams::AdaptiveAverage {
                phase_threshold: args.phase_threshold.unwrap_or(phase_threshold),
                points_per_phase: args.points_per_phase.unwrap_or(points_per_phase),
            },
        };
        set.set(EstimatorConfig::enabled(params));
    }
    set
}
