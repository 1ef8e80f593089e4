//! folio-bench: CLI tool for detector parameter experimentation and diagnostics.
//!
//! Runs the stroke width transform detector on a given image file with
//! configurable parameters, printing detailed per-stage diagnostics. Useful
//! for:
//!
//! - Tuning hysteresis thresholds, ray length and stroke ratio
//! - Measuring per-stage durations to identify bottlenecks
//! - Seeing how many components each filter rule rejects
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin folio-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use folio_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use folio_pipeline::{DetectOutput, EdgeThresholds, OutputMode, Polarity, SwtConfig};

/// Detector parameter experimentation and diagnostics for folio.
///
/// Runs the text detector on a given image with configurable parameters
/// and prints detailed per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "folio-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Output mode to render.
    #[arg(long, default_value_t = OutputMode::default())]
    mode: OutputMode,

    /// Hysteresis low threshold.
    #[arg(long, default_value_t = SwtConfig::DEFAULT_THRESHOLDS.low)]
    low: f32,

    /// Hysteresis high threshold.
    #[arg(long, default_value_t = SwtConfig::DEFAULT_THRESHOLDS.high)]
    high: f32,

    /// Gaussian sigma applied before gradients (0 disables).
    #[arg(long, default_value_t = SwtConfig::DEFAULT_BLUR_SIGMA)]
    blur_sigma: f32,

    /// Text polarity.
    #[arg(long, value_enum, default_value_t = TextPolarity::Both)]
    polarity: TextPolarity,

    /// Longest ray in pixels (default: a quarter of the short side).
    #[arg(long)]
    max_ray_length: Option<f32>,

    /// Disable the median refinement pass.
    #[arg(long)]
    no_median: bool,

    /// Largest stroke width ratio within one component.
    #[arg(long, default_value_t = SwtConfig::DEFAULT_STROKE_RATIO)]
    stroke_ratio: f32,

    /// Smallest component in pixels.
    #[arg(long, default_value_t = SwtConfig::DEFAULT_MIN_COMPONENT_PIXELS)]
    min_component_pixels: usize,

    /// Word gap in stroke widths.
    #[arg(long, default_value_t = SwtConfig::DEFAULT_WORD_GAP_FACTOR)]
    word_gap_factor: f32,

    /// Write the raster output (raster modes only) to file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full detector config as a JSON string.
    ///
    /// When provided, all other detector parameter flags are ignored.
    /// The JSON must be a valid `SwtConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Text polarity selection.
#[derive(Clone, Copy, ValueEnum)]
enum TextPolarity {
    /// Dark text on a light background.
    Dark,
    /// Light text on a dark background.
    Light,
    /// Both polarities, merged by minimum width.
    Both,
}

/// Build a [`SwtConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<SwtConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(SwtConfig {
        thresholds: EdgeThresholds {
            low: cli.low,
            high: cli.high,
        },
        blur_sigma: cli.blur_sigma,
        polarity: match cli.polarity {
            TextPolarity::Dark => Polarity::DarkOnLight,
            TextPolarity::Light => Polarity::LightOnDark,
            TextPolarity::Both => Polarity::Both,
        },
        max_ray_length: cli.max_ray_length,
        median_refinement: !cli.no_median,
        stroke_ratio: cli.stroke_ratio,
        min_component_pixels: cli.min_component_pixels,
        word_gap_factor: cli.word_gap_factor,
        ..SwtConfig::default()
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };
    let image = match folio_pipeline::decode(&image_bytes) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error decoding {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes, {}x{})",
        cli.image_path.display(),
        image_bytes.len(),
        image.width(),
        image.height(),
    );
    eprintln!("Mode: {}", cli.mode);
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match folio_pipeline::detect_text_with_diagnostics(
            image.clone(),
            cli.mode,
            &config,
            &StdClock,
        ) {
            Ok((output, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write the raster on the first run only.
                if run == 0
                    && let Some(ref path) = cli.output
                    && let DetectOutput::Image(ref raster) = output
                {
                    match raster.save(path) {
                        Ok(()) => eprintln!("Output written to {}", path.display()),
                        Err(e) => eprintln!("Error writing output to {}: {e}", path.display()),
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    // Print summary when multiple runs.
    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PipelineDiagnostics) -> Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means.
    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Gradients", |d| d.gradients.duration),
        ("Edges", |d| d.edges.duration),
        ("Stroke Widths", |d| d.stroke_widths.duration),
        ("Clustering", |d| d.clustering.duration),
        ("Filtering", |d| d.filtering.duration),
        ("Rendering", |d| d.rendering.duration),
    ];

    for (name, extractor) in stage_extractors {
        let stage_mean = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
