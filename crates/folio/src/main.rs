//! folio: command-line front end for the document image toolkit.
//!
//! Each subcommand reads an image file, runs one operation from
//! `folio-pipeline`, and writes an image file or prints JSON to stdout.
//! Progress goes through `tracing` to stderr; set `RUST_LOG=debug` for
//! per-stage detail.
//!
//! # Usage
//!
//! ```text
//! folio swt page.png --mode word-boxes
//! folio swt page.png --mode original-boxes -o boxes.png
//! folio border scan.jpg --crop cropped.png
//! folio compare before.png after.png --diff diff.png
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use folio_pipeline::{
    AceConfig, CannyConfig, DetectOutput, EdgeThresholds, NoiseFilterConfig, OutputMode,
    Polarity, RasterImage, ScanBorderConfig, SwtConfig, blur,
};
use tracing::info;

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Scanned-page cleanup and text detection.
#[derive(Parser)]
#[command(name = "folio", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect text with the stroke width transform.
    ///
    /// Box modes print JSON to stdout; raster modes write `--output`.
    Swt(SwtArgs),
    /// Find the page content inside a dark scanner border.
    Border {
        /// Input image path.
        input: PathBuf,
        /// Write the image cropped to the content rectangle.
        #[arg(long)]
        crop: Option<PathBuf>,
        /// Gaussian sigma applied before the gradient.
        #[arg(long, default_value_t = ScanBorderConfig::DEFAULT_BLUR_SIGMA)]
        blur_sigma: f32,
        /// Fraction of each side searched for the border.
        #[arg(long, default_value_t = ScanBorderConfig::DEFAULT_SEARCH_FRACTION)]
        search_fraction: f32,
        /// Minimum mean gradient along a border line.
        #[arg(long, default_value_t = ScanBorderConfig::DEFAULT_MIN_LINE_STRENGTH)]
        min_line_strength: f32,
    },
    /// Automatic color equalization.
    Ace {
        /// Input image path.
        input: PathBuf,
        /// Output image path.
        #[arg(short, long)]
        output: PathBuf,
        /// Sampling seed; equal seeds give equal output.
        #[arg(long, default_value_t = AceConfig::DEFAULT_SEED)]
        seed: u64,
        /// Slope of the contrast saturation.
        #[arg(long, default_value_t = AceConfig::DEFAULT_SLOPE)]
        slope: f32,
        /// Distance at which sample weights stop falling.
        #[arg(long, default_value_t = AceConfig::DEFAULT_LIMIT)]
        limit: f32,
        /// Samples compared against each pixel.
        #[arg(long, default_value_t = AceConfig::DEFAULT_SAMPLES)]
        samples: u32,
    },
    /// Render a Canny edge map.
    Canny {
        /// Input image path.
        input: PathBuf,
        /// Output image path.
        #[arg(short, long)]
        output: PathBuf,
        /// Gaussian sigma applied before gradients.
        #[arg(long, default_value_t = CannyConfig::DEFAULT_BLUR_SIGMA)]
        blur_sigma: f32,
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Render the Sobel gradient magnitude.
    Sobel {
        /// Input image path.
        input: PathBuf,
        /// Output image path.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Remove isolated dark specks.
    Noise {
        /// Input image path.
        input: PathBuf,
        /// Output image path.
        #[arg(short, long)]
        output: PathBuf,
        /// Largest cluster (in pixels) that counts as noise.
        #[arg(long, default_value_t = NoiseFilterConfig::DEFAULT_INTENSITY)]
        intensity: usize,
        /// Lightness fraction at or above which a pixel is white.
        #[arg(long, default_value_t = NoiseFilterConfig::DEFAULT_WHITE_THRESHOLD)]
        white_threshold: f32,
    },
    /// Gaussian blur.
    Gaussian {
        /// Input image path.
        input: PathBuf,
        /// Output image path.
        #[arg(short, long)]
        output: PathBuf,
        /// Standard deviation in pixels.
        #[arg(long)]
        sigma: f32,
        /// Kernel width in standard deviations.
        #[arg(long, default_value_t = blur::DEFAULT_NB_STDDEV)]
        nb_stddev: f32,
    },
    /// Compare two images pixel by pixel.
    Compare {
        /// First image.
        a: PathBuf,
        /// Second image.
        b: PathBuf,
        /// Write the diff image (differences in red).
        #[arg(long)]
        diff: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct ThresholdArgs {
    /// Hysteresis low threshold.
    #[arg(long, default_value_t = SwtConfig::DEFAULT_THRESHOLDS.low)]
    low: f32,
    /// Hysteresis high threshold.
    #[arg(long, default_value_t = SwtConfig::DEFAULT_THRESHOLDS.high)]
    high: f32,
}

impl ThresholdArgs {
    const fn thresholds(&self) -> EdgeThresholds {
        EdgeThresholds {
            low: self.low,
            high: self.high,
        }
    }
}

#[derive(clap::Args)]
struct SwtArgs {
    /// Input image path.
    input: PathBuf,

    /// What to produce.
    #[arg(long, default_value_t = OutputMode::default())]
    mode: OutputMode,

    /// Output image path, required for raster modes.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    thresholds: ThresholdArgs,

    /// Which text polarity to look for.
    #[arg(long, value_enum, default_value_t = TextPolarity::Both)]
    polarity: TextPolarity,

    /// Longest ray in pixels (default: a quarter of the short side).
    #[arg(long)]
    max_ray_length: Option<f32>,

    /// Largest stroke width ratio within one letter.
    #[arg(long, default_value_t = SwtConfig::DEFAULT_STROKE_RATIO)]
    stroke_ratio: f32,

    /// Smallest letter in pixels.
    #[arg(long, default_value_t = SwtConfig::DEFAULT_MIN_COMPONENT_PIXELS)]
    min_component_pixels: usize,

    /// Abort if the detector runs longer than this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Full detector config as a JSON string.
    ///
    /// When provided, all other detector flags are ignored.
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
    /// Both, merged.
    Both,
}

impl From<TextPolarity> for Polarity {
    fn from(p: TextPolarity) -> Self {
        match p {
            TextPolarity::Dark => Self::DarkOnLight,
            TextPolarity::Light => Self::LightOnDark,
            TextPolarity::Both => Self::Both,
        }
    }
}

/// Build a [`SwtConfig`] from CLI arguments.
fn swt_config(args: &SwtArgs) -> CliResult<SwtConfig> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json)
            .map_err(|e| format!("Error parsing --config-json: {e}").into());
    }
    Ok(SwtConfig {
        thresholds: args.thresholds.thresholds(),
        polarity: args.polarity.into(),
        max_ray_length: args.max_ray_length,
        stroke_ratio: args.stroke_ratio,
        min_component_pixels: args.min_component_pixels,
        timeout_ms: args.timeout_ms,
        ..SwtConfig::default()
    })
}

fn load(path: &Path) -> CliResult<RasterImage> {
    info!(path = %path.display(), "reading image");
    let bytes = std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    Ok(folio_pipeline::decode(&bytes)?)
}

fn save(image: &RasterImage, path: &Path) -> CliResult<()> {
    image
        .save(path)
        .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
    info!(path = %path.display(), "image written");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn swt(args: &SwtArgs) -> CliResult<()> {
    let config = swt_config(args)?;
    let image = load(&args.input)?;
    match folio_pipeline::detect_text(&image, args.mode, &config)? {
        DetectOutput::Boxes(boxes) => {
            info!(count = boxes.len(), mode = %args.mode, "text detected");
            print_json(&boxes)
        }
        DetectOutput::Image(raster) => {
            let path = args
                .output
                .as_deref()
                .ok_or_else(|| format!("--output is required for mode {}", args.mode))?;
            save(&raster, path)
        }
    }
}

fn run(command: Command) -> CliResult<()> {
    match command {
        Command::Swt(args) => swt(&args),
        Command::Border {
            input,
            crop,
            blur_sigma,
            search_fraction,
            min_line_strength,
        } => {
            let image = load(&input)?;
            let config = ScanBorderConfig {
                blur_sigma,
                search_fraction,
                min_line_strength,
            };
            let content = folio_pipeline::scan_border(&image, &config)?;
            print_json(&content)?;
            if let Some(path) = crop {
                let cropped = image::imageops::crop_imm(
                    &image,
                    content.left,
                    content.top,
                    content.width(),
                    content.height(),
                )
                .to_image();
                save(&cropped, &path)?;
            }
            Ok(())
        }
        Command::Ace {
            input,
            output,
            seed,
            slope,
            limit,
            samples,
        } => {
            let config = AceConfig {
                seed,
                slope,
                limit,
                samples,
            };
            save(&folio_pipeline::ace(&load(&input)?, &config)?, &output)
        }
        Command::Canny {
            input,
            output,
            blur_sigma,
            thresholds,
        } => {
            let config = CannyConfig {
                blur_sigma,
                thresholds: thresholds.thresholds(),
            };
            save(&folio_pipeline::canny(&load(&input)?, &config)?, &output)
        }
        Command::Sobel { input, output } => save(&folio_pipeline::sobel(&load(&input)?)?, &output),
        Command::Noise {
            input,
            output,
            intensity,
            white_threshold,
        } => {
            let config = NoiseFilterConfig {
                intensity,
                white_threshold,
            };
            save(
                &folio_pipeline::noise_filter(&load(&input)?, &config)?,
                &output,
            )
        }
        Command::Gaussian {
            input,
            output,
            sigma,
            nb_stddev,
        } => save(
            &folio_pipeline::gaussian(&load(&input)?, sigma, nb_stddev)?,
            &output,
        ),
        Command::Compare { a, b, diff } => {
            let (differs, diff_image) = folio_pipeline::compare(&load(&a)?, &load(&b)?)?;
            println!("{}", if differs { "different" } else { "identical" });
            if let Some(path) = diff {
                save(&diff_image, &path)?;
            }
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse().command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn swt_flags_build_config() {
        let cli = Cli::parse_from([
            "folio",
            "swt",
            "page.png",
            "--mode",
            "word-boxes",
            "--polarity",
            "dark",
            "--low",
            "30",
            "--timeout-ms",
            "500",
        ]);
        let Command::Swt(args) = cli.command else {
            unreachable!("parsed swt")
        };
        assert_eq!(args.mode, OutputMode::WordBoxes);
        let config = swt_config(&args).unwrap();
        assert_eq!(config.polarity, Polarity::DarkOnLight);
        assert!((config.thresholds.low - 30.0).abs() < f32::EPSILON);
        assert_eq!(config.timeout_ms, Some(500));
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = Cli::parse_from([
            "folio",
            "swt",
            "page.png",
            "--stroke-ratio",
            "9",
            "--config-json",
            r#"{"stroke_ratio": 2.0}"#,
        ]);
        let Command::Swt(args) = cli.command else {
            unreachable!("parsed swt")
        };
        let config = swt_config(&args).unwrap();
        assert!((config.stroke_ratio - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["folio", "swt", "page.png", "--mode", "glyphs"]).is_err());
    }
}
