use clap::Parser;
use rolling_stats::Stats;
use serde::Serialize;
use std::path::{Path, PathBuf};

use anyhow::Context;
use pvtrend::config::{EstimatorConfig, EstimatorParams, EstimatorSet, EwmDecay, SourceConfig};
use pvtrend::constants::{DEFAULT_RETENTION, DEFAULT_SOURCE_COLORS};
use pvtrend::{Color, DerivedSamples, SeriesController, Variant};

#[derive(Parser, Debug)]
#[command(name = "replay_series")]
#[command(about = "Run recorded PV series through the trend estimators", long_about = None)]
struct Args {
    /// CSV files with `timestamp,value` rows; an empty value is a gap
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output format: text, csv, json
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Estimators to run besides the raw series
    #[arg(short = 'e', long = "enable", value_enum)]
    enable: Vec<Variant>,

    /// Rolling window size
    #[arg(long)]
    window: Option<usize>,

    /// EWM smoothing factor in (0, 1]
    #[arg(long, group = "decay")]
    alpha: Option<f64>,

    /// EWM center of mass
    #[arg(long, group = "decay")]
    com: Option<f64>,

    /// EWM span
    #[arg(long, group = "decay")]
    span: Option<f64>,

    /// EWM half-life in samples
    #[arg(long, group = "decay")]
    halflife: Option<f64>,

    /// Adaptive average phase threshold
    #[arg(long)]
    phase_threshold: Option<f64>,

    /// Adaptive average points per phase
    #[arg(long)]
    points_per_phase: Option<usize>,

    /// Number of most recent samples kept, which also bounds the rolling window
    #[arg(short = 'n', long, default_value_t = DEFAULT_RETENTION)]
    retention: usize,

    /// Only print the per-variant summary
    #[arg(short = 's', long)]
    summary_only: bool,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Csv,
    Json,
}

#[derive(Debug, Clone, Serialize)]
struct StatsSummary {
    count: usize,
    mean: f64,
    std_dev: f64,
    min: f64,
    max: f64,
}

impl StatsSummary {
    fn from_stats(stats: &Stats<f64>) -> Option<Self> {
        if stats.count == 0 {
            return None;
        }
        Some(Self {
            count: stats.count,
            mean: stats.mean,
            std_dev: stats.std_dev,
            min: stats.min,
            max: stats.max,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct VariantSummary {
    variant: &'static str,
    #[serde(flatten)]
    stats: StatsSummary,
}

/// Summaries in estimator order, skipping variants that produced nothing
fn summarize(stats: &[Stats<f64>; Variant::COUNT]) -> Vec<VariantSummary> {
    Variant::ALL
        .iter()
        .filter_map(|&v| {
            StatsSummary::from_stats(&stats[v.index()]).map(|stats| VariantSummary {
                variant: v.key(),
                stats,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
struct Row {
    timestamp: f64,
    value: Option<f64>,
    #[serde(skip)]
    derived: DerivedSamples,
}

#[derive(Debug, Clone, Serialize)]
struct FileReplay {
    filename: String,
    sample_count: usize,
    gap_count: u64,
    variants: Vec<VariantSummary>,
    #[serde(skip)]
    rows: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
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

    let estimators = estimator_set(&args);
    estimators.validate()?;

    let results: Vec<FileReplay> = args
        .files
        .iter()
        .enumerate()
        .map(|(i, path)| replay_file(path, i, &estimators, args.retention))
        .collect();

    match args.format {
        OutputFormat::Text => print_text(&results, args.summary_only),
        OutputFormat::Csv => print_csv(&results),
        OutputFormat::Json => print_json(&results)?,
    }

    Ok(())
}

fn estimator_set(args: &Args) -> EstimatorSet {
    let mut set = EstimatorSet::default();
    for &variant in &args.enable {
        let params = match EstimatorParams::default_for(variant) {
            EstimatorParams::RollingWindow { window } => EstimatorParams::RollingWindow {
                window: args.window.unwrap_or(window),
            },
            EstimatorParams::ExponentialWeighted { decay } => {
                let decay = args
                    .alpha
                    .map(EwmDecay::Alpha)
                    .or(args.com.map(EwmDecay::CenterOfMass))
                    .or(args.span.map(EwmDecay::Span))
                    .or(args.halflife.map(EwmDecay::HalfLife))
                    .unwrap_or(decay);
                EstimatorParams::ExponentialWeighted { decay }
            }
            EstimatorParams::AdaptiveAverage {
                phase_threshold,
                points_per_phase,
            } => EstimatorParams::AdaptiveAverage {
                phase_threshold: args.phase_threshold.unwrap_or(phase_threshold),
                points_per_phase: args.points_per_phase.unwrap_or(points_per_phase),
            },
            params => params,
        };
        set.set(EstimatorConfig::enabled(params));
    }
    set
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn replay_file(
    path: &Path,
    index: usize,
    estimators: &EstimatorSet,
    retention: usize,
) -> FileReplay {
    let filename = file_name(path);
    match replay_file_impl(path, index, estimators, retention) {
        Ok(replay) => replay,
        Err(e) => FileReplay {
            filename,
            sample_count: 0,
            gap_count: 0,
            variants: Vec::new(),
            rows: Vec::new(),
            error: Some(format!("{:#}", e)),
        },
    }
}

/// Parse `timestamp,value` lines; a header line and blank lines are skipped
fn read_series(path: &Path) -> anyhow::Result<Vec<(f64, Option<f64>)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut readings = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (ts, value) = line.split_once(',').unwrap_or((line, ""));
        let timestamp: f64 = match ts.trim().parse() {
            Ok(t) => t,
            Err(_) if line_no == 0 => continue,
            Err(e) => anyhow::bail!("line {}: bad timestamp {:?}: {}", line_no + 1, ts, e),
        };
        let value = value.trim();
        let value = if value.is_empty() {
            None
        } else {
            Some(
                value
                    .parse::<f64>()
                    .with_context(|| format!("line {}: bad value {:?}", line_no + 1, value))?,
            )
        };
        readings.push((timestamp, value));
    }
    Ok(readings)
}

fn replay_file_impl(
    path: &Path,
    index: usize,
    estimators: &EstimatorSet,
    retention: usize,
) -> anyhow::Result<FileReplay> {
    let filename = file_name(path);
    let readings = read_series(path)?;

    let color: Color = DEFAULT_SOURCE_COLORS[index % DEFAULT_SOURCE_COLORS.len()]
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let config = SourceConfig {
        estimators: estimators.clone(),
        ..SourceConfig::new(filename.clone())
    };
    let mut series = SeriesController::from_config(&config, color, retention, true)?;

    let mut stats: [Stats<f64>; Variant::COUNT] = Variant::ALL.map(|_| Stats::new());
    let mut rows = Vec::with_capacity(readings.len());
    for (timestamp, value) in readings {
        let derived = series.ingest(value, timestamp);
        for (variant, sample) in derived.iter() {
            stats[variant.index()].update(sample.value);
        }
        rows.push(Row {
            timestamp,
            value,
            derived,
        });
    }
    log::info!(
        "{}: {} readings, {} gaps",
        filename,
        rows.len(),
        series.gap_count()
    );

    let variants = summarize(&stats);

    Ok(FileReplay {
        filename,
        sample_count: rows.len(),
        gap_count: series.gap_count(),
        variants,
        rows,
        error: None,
    })
}

fn cell(value: Option<f64>, width: usize) -> String {
    value
        .map(|v| format!("{:>width$.4}", v))
        .unwrap_or_else(|| format!("{:>width$}", "-"))
}

fn print_text(results: &[FileReplay], summary_only: bool) {
    for result in results {
        if let Some(ref err) = result.error {
            println!("{:<40} ERROR: {}", result.filename, err);
            continue;
        }

        if !summary_only {
            println!("{}", result.filename);
            let mut header = format!("{:>12} {:>12}", "t", "raw");
            for variant in Variant::ALL {
                header.push_str(&format!(" {:>14}", variant.key()));
            }
            println!("{}", header);
            for row in &result.rows {
                let mut line = format!("{:>12.3} {}", row.timestamp, cell(row.value, 12));
                for variant in Variant::ALL {
                    line.push(' ');
                    line.push_str(&cell(row.derived.get(variant).map(|s| s.value), 14));
                }
                println!("{}", line);
            }
            println!();
        }

        eprintln!(
            "Summary for {} ({} readings, {} gaps):",
            result.filename, result.sample_count, result.gap_count
        );
        for summary in &result.variants {
            let stats = &summary.stats;
            eprintln!(
                "  {:<15} n={:<6} mean={:.4} std={:.4} min={:.4} max={:.4}",
                summary.variant, stats.count, stats.mean, stats.std_dev, stats.min, stats.max
            );
        }
    }
}

fn print_csv(results: &[FileReplay]) {
    let mut header = String::from("filename,t,raw");
    for variant in Variant::ALL {
        header.push(',');
        header.push_str(variant.key());
    }
    println!("{}", header);

    for result in results {
        if let Some(ref err) = result.error {
            eprintln!("{}: {}", result.filename, err);
            continue;
        }
        for row in &result.rows {
            let mut line = format!(
                "{},{},{}",
                result.filename,
                row.timestamp,
                row.value.map(|v| v.to_string()).unwrap_or_default()
            );
            for variant in Variant::ALL {
                line.push(',');
                if let Some(sample) = row.derived.get(variant) {
                    line.push_str(&sample.value.to_string());
                }
            }
            println!("{}", line);
        }
    }
}

fn print_json(results: &[FileReplay]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summaries_follow_estimator_order() {
        let mut stats: [Stats<f64>; Variant::COUNT] = Variant::ALL.map(|_| Stats::new());
        for variant in Variant::ALL {
            stats[variant.index()].update(1.0);
        }
        let keys: Vec<_> = summarize(&stats).iter().map(|s| s.variant).collect();
        let expected: Vec<_> = Variant::ALL.iter().map(|v| v.key()).collect();
        assert_eq!(keys, expected);
        assert_eq!(keys, vec!["original", "rolling_window", "ewm", "adaptive"]);
    }

    #[test]
    fn test_summaries_skip_idle_variants() {
        let mut stats: [Stats<f64>; Variant::COUNT] = Variant::ALL.map(|_| Stats::new());
        stats[Variant::AdaptiveAverage.index()].update(2.0);
        stats[Variant::Original.index()].update(2.0);

        let summaries = summarize(&stats);
        let keys: Vec<_> = summaries.iter().map(|s| s.variant).collect();
        assert_eq!(keys, vec![Variant::Original.key(), Variant::AdaptiveAverage.key()]);

        let json = serde_json::to_value(&summaries[0]).unwrap();
        assert_eq!(json["variant"], "original");
        assert_eq!(json["count"], 1);
    }
}
