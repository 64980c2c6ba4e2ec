use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use facereq_acquire::Fetcher;
use facereq_core::{
    DistanceMetric, MatchResult, OnnxFaceDetector, OnnxEmbedder, Pipeline, Registry,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
use config::Config;

#[derive(Parser)]
#[command(name = "facereq", about = "Face enrollment and recognition pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Metric {
    Euclidean,
    Cosine,
}

impl From<Metric> for DistanceMetric {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Euclidean => DistanceMetric::Euclidean,
            Metric::Cosine => DistanceMetric::Cosine,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Download reference images from a JSON manifest (identity → URL)
    Fetch {
        /// Manifest file: a JSON object mapping identity names to URLs
        #[arg(short, long)]
        manifest: PathBuf,
        /// Directory to download into (one <identity>.jpg per entry)
        #[arg(short, long)]
        dir: PathBuf,
    },
    /// Detect the first face in an image and write out the cropped region
    Crop {
        #[arg(short, long)]
        image: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Enroll a directory of reference images, then recognize a query image
    Recognize {
        /// Directory of reference images; filename stem = identity
        #[arg(short, long)]
        known_dir: PathBuf,
        /// Query image
        #[arg(short, long)]
        image: PathBuf,
        /// Match threshold (defaults to FACEREQ_MATCH_THRESHOLD or 0.6)
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Distance metric for the registry
        #[arg(long, value_enum, default_value = "euclidean")]
        metric: Metric,
        /// Write the cropped query face here
        #[arg(long)]
        save_crop: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch { manifest, dir } => run_fetch(manifest, dir).await,
        Commands::Crop { image, output } => run_crop(image, output),
        Commands::Recognize {
            known_dir,
            image,
            threshold,
            metric,
            save_crop,
        } => run_recognize(known_dir, image, threshold, metric, save_crop),
    }
}

/// Parse a manifest: a JSON object of identity → URL. BTreeMap keeps the
/// batch order deterministic.
fn parse_manifest(text: &str) -> Result<Vec<(String, String)>> {
    let entries: BTreeMap<String, String> =
        serde_json::from_str(text).context("manifest must be a JSON object of identity → URL")?;
    Ok(entries.into_iter().collect())
}

async fn run_fetch(manifest: PathBuf, dir: PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(&manifest)
        .with_context(|| format!("reading manifest {}", manifest.display()))?;
    let roster = parse_manifest(&text)?;
    tracing::info!(
        manifest = %manifest.display(),
        entries = roster.len(),
        "fetching roster"
    );

    let report = Fetcher::new().fetch_all(&roster, &dir).await;

    println!(
        "downloaded {}, already present {}, failed {}",
        report.downloaded.len(),
        report.already_present.len(),
        report.failed.len()
    );
    for identity in &report.failed {
        println!("failed: {identity}");
    }
    Ok(())
}

fn run_crop(image_path: PathBuf, output: PathBuf) -> Result<()> {
    let config = Config::from_env();
    let mut detector = OnnxFaceDetector::load(&config.detector_model_path())?;

    let image = image::open(&image_path)
        .with_context(|| format!("loading {}", image_path.display()))?
        .to_rgb8();

    let (face, bounds) = facereq_core::detect_and_crop(&mut detector, &image)?;
    face.save(&output)
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "cropped {}×{} face to {}",
        bounds.width(),
        bounds.height(),
        output.display()
    );
    Ok(())
}

fn run_recognize(
    known_dir: PathBuf,
    image: PathBuf,
    threshold: Option<f32>,
    metric: Metric,
    save_crop: Option<PathBuf>,
) -> Result<()> {
    let config = Config::from_env();
    let threshold = threshold.unwrap_or(config.match_threshold);

    let detector = OnnxFaceDetector::load(&config.detector_model_path())?;
    let embedder = OnnxEmbedder::load(&config.embedder_model_path())?;
    let mut pipeline = Pipeline::new(detector, embedder);

    let mut registry = Registry::new(metric.into());
    tracing::info!(known_dir = %known_dir.display(), threshold, "building registry");
    let report = pipeline.enroll_dir(&mut registry, &known_dir);
    println!(
        "enrolled {} identities ({} skipped)",
        report.enrolled.len(),
        report.skipped.len()
    );

    let recognition = pipeline.recognize_file(&image, &registry, threshold)?;
    match &recognition.result {
        MatchResult::Match { identity, distance } => {
            println!("match: {identity} (distance {distance:.3})");
        }
        MatchResult::Unknown => {
            println!("unknown: no enrolled identity within {threshold}");
        }
    }

    if let Some(path) = save_crop {
        recognition
            .face
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("query face crop written to {}", path.display());
    }
    Ok(())
}
