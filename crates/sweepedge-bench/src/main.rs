//! sweepedge-bench: CLI tool for running the edge pipeline on image files.
//!
//! Loads an image, optionally resizes and blurs it, runs the Canny
//! pipeline with configurable thresholds, and prints per-stage
//! diagnostics. Useful for:
//!
//! - Tuning the low/high thresholds and the hysteresis switch
//! - Comparing the sequential and parallel backends
//! - Inspecting every intermediate plane with `--dump-dir`
//! - Feeding externally computed gradients with `--gradients`
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin sweepedge-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod dump;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use image::{DynamicImage, GrayImage};
use serde::Deserialize;
use sweepedge_pipeline::diagnostics::{Clock, PipelineDiagnostics, process_with_diagnostics};
use sweepedge_pipeline::{
    Backend, CannyOutput, ChannelImage, GradientSource, NoopObserver, Pipeline, PipelineConfig,
    Plane, StageObserver,
};

use crate::dump::DumpObserver;

/// Canny edge maps with paired directional thinning and density hysteresis.
///
/// Runs the pipeline on a given image with configurable parameters and
/// prints per-stage timing and pixel-count diagnostics.
#[derive(Parser)]
#[command(name = "sweepedge-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Which channels to feed the gradient stage.
    #[arg(long, value_enum, default_value_t = Channels::Gray)]
    channels: Channels,

    /// Resize to WIDTHxHEIGHT before processing.
    #[arg(long, value_parser = parse_size)]
    resize: Option<(u32, u32)>,

    /// Gaussian blur sigma applied to each channel (0 disables).
    #[arg(long, default_value_t = 0.0)]
    blur_sigma: f32,

    /// Low threshold on the thinned magnitude.
    #[arg(long)]
    low: Option<f32>,

    /// High threshold on the thinned magnitude (requires --low).
    #[arg(long)]
    high: Option<f32>,

    /// Promote weak pixels next to other candidates.
    #[arg(long)]
    hysteresis: bool,

    /// Sobel kernel size (odd, at least 3).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SOBEL_SIZE)]
    sobel_size: usize,

    /// Run every stage on the calling thread.
    #[arg(long)]
    sequential: bool,

    /// JSON file holding `grad_x` and `grad_y` planes to use instead of
    /// computing gradients. Samples are numbers, `null`, or one of the
    /// strings `"NaN"`, `"inf"`, `"-inf"`.
    #[arg(long)]
    gradients: Option<PathBuf>,

    /// Write the edge map to a PNG file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write every intermediate plane to this directory as PNG and exact
    /// JSON (first run only).
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, the threshold, Sobel and backend flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Channel selection.
#[derive(Clone, Copy, ValueEnum)]
enum Channels {
    /// Single luma channel.
    Gray,
    /// Red, green and blue as three channels.
    Rgb,
}

/// Gradient pair read from `--gradients`.
#[derive(Deserialize)]
struct GradientFile {
    grad_x: Plane,
    grad_y: Plane,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("bad width {w:?}: {e}"))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("bad height {h:?}: {e}"))?;
    if w == 0 || h == 0 {
        return Err(format!("size must be non-zero, got {w}x{h}"));
    }
    Ok((w, h))
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        low_threshold: cli.low,
        high_threshold: cli.high,
        hysteresis: cli.hysteresis,
        sobel_size: cli.sobel_size,
        backend: if cli.sequential {
            Backend::Sequential
        } else {
            Backend::Parallel
        },
    })
}

fn blur(image: &GrayImage, sigma: f32) -> GrayImage {
    // imageproc panics on non-positive sigma.
    if sigma <= 0.0 {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Decode, resize and blur the input, then split it into channels.
fn load_image(cli: &Cli) -> Result<ChannelImage, String> {
    let mut decoded = image::open(&cli.image_path)
        .map_err(|e| format!("Error reading {}: {e}", cli.image_path.display()))?;
    if let Some((w, h)) = cli.resize {
        decoded = decoded.resize_exact(w, h, image::imageops::FilterType::Triangle);
    }

    let grays: Vec<GrayImage> = match cli.channels {
        Channels::Gray => vec![decoded.to_luma8()],
        Channels::Rgb => split_rgb(&decoded),
    };
    let planes = grays
        .iter()
        .map(|g| Plane::from_gray_image(&blur(g, cli.blur_sigma)))
        .collect();
    ChannelImage::new(planes).map_err(|e| format!("Error building channels: {e}"))
}

fn split_rgb(image: &DynamicImage) -> Vec<GrayImage> {
    let rgb = image.to_rgb8();
    (0..3)
        .map(|c| {
            GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                image::Luma([rgb.get_pixel(x, y).0[c]])
            })
        })
        .collect()
}

fn load_gradients(path: &Path) -> Result<GradientSource, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    let GradientFile { grad_x, grad_y } = serde_json::from_str(&text)
        .map_err(|e| format!("Error parsing {}: {e}", path.display()))?;
    Ok(GradientSource::Supplied { grad_x, grad_y })
}

fn write_edges(path: &Path, output: &CannyOutput, config: &PipelineConfig) -> Result<(), String> {
    // Without a low threshold the edges are raw magnitudes.
    let image = if config.low_threshold.is_some() {
        output.edges.to_gray_image(255.0)
    } else {
        output.edges.to_gray_image_normalized()
    };
    image
        .save(path)
        .map_err(|e| format!("Error writing {}: {e}", path.display()))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image = match load_image(&cli) {
        Ok(image) => image,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let source = match cli.gradients.as_deref().map(load_gradients).transpose() {
        Ok(source) => source.unwrap_or_default(),
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let dimensions = image.dimensions();
    eprintln!(
        "Image: {} ({dimensions}, {} channel(s), {} gradients)",
        cli.image_path.display(),
        image.channel_count(),
        source.kind(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        // Dump intermediates on the first run only.
        let mut dumper = None;
        if run == 0
            && let Some(ref dir) = cli.dump_dir
        {
            match DumpObserver::new(dir) {
                Ok(d) => dumper = Some(d),
                Err(msg) => {
                    eprintln!("{msg}");
                    return ExitCode::FAILURE;
                }
            }
        }
        let mut noop = NoopObserver;
        let observer: &mut dyn StageObserver = match dumper.as_mut() {
            Some(d) => d,
            None => &mut noop,
        };

        let pending = Pipeline::new(image.clone(), config.clone()).with_source(source.clone());
        match process_with_diagnostics(pending, &StdClock, observer) {
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

                if let Some(ref d) = dumper {
                    for msg in d.errors() {
                        eprintln!("{msg}");
                    }
                    if let Some(ref dir) = cli.dump_dir {
                        eprintln!("Dumped {} file(s) to {}", d.written(), dir.display());
                    }
                }

                if run == 0
                    && let Some(ref path) = cli.output
                {
                    match write_edges(path, &output, &config) {
                        Ok(()) => eprintln!("Edges written to {}", path.display()),
                        Err(msg) => eprintln!("{msg}"),
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

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Gradients", |d| d.gradients.duration),
        ("Magnitude/Orientation", |d| d.magnitude_orientation.duration),
        ("Thinning", |d| d.thinning.duration),
        ("Classification", |d| d.classification.duration),
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("sweepedge-bench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("64x48").unwrap(), (64, 48));
        assert_eq!(parse_size("8X8").unwrap(), (8, 8));
        assert!(parse_size("0x4").is_err());
        assert!(parse_size("64").is_err());
        assert!(parse_size("ax4").is_err());
    }

    #[test]
    fn flags_build_config() {
        let cli = parse(&[
            "in.png",
            "--low",
            "0.2",
            "--high",
            "0.6",
            "--hysteresis",
            "--sobel-size",
            "5",
            "--sequential",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.low_threshold, Some(0.2));
        assert_eq!(config.high_threshold, Some(0.6));
        assert!(config.hysteresis);
        assert_eq!(config.sobel_size, 5);
        assert_eq!(config.backend, Backend::Sequential);
    }

    #[test]
    fn defaults_match_pipeline_defaults() {
        let config = config_from_cli(&parse(&["in.png"])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn config_json_overrides_flags() {
        let json = serde_json::to_string(&PipelineConfig {
            low_threshold: Some(1.0),
            ..PipelineConfig::default()
        })
        .unwrap();
        let cli = parse(&["in.png", "--low", "9", "--config-json", &json]);
        assert_eq!(config_from_cli(&cli).unwrap().low_threshold, Some(1.0));
    }

    #[test]
    fn bad_config_json_is_reported() {
        let cli = parse(&["in.png", "--config-json", "{not json"]);
        assert!(config_from_cli(&cli).unwrap_err().contains("--config-json"));
    }

    #[test]
    fn zero_runs_are_rejected() {
        let result = Cli::try_parse_from(["sweepedge-bench", "in.png", "--runs", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn rgb_split_keeps_each_channel() {
        let rgb = image::RgbImage::from_fn(3, 2, |x, y| {
            image::Rgb([10, 20, u8::try_from(x + y).unwrap()])
        });
        let channels = split_rgb(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].get_pixel(2, 1).0, [10]);
        assert_eq!(channels[1].get_pixel(0, 0).0, [20]);
        assert_eq!(channels[2].get_pixel(2, 1).0, [3]);
    }
}
