use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facenorm::{config, report::BatchReport};
use facenorm_vision::{
    detector::YunetDetector, pipeline::ModelPaths, predictor::OnnxLandmarkPredictor,
    scale::parse_filter, MultiFacePolicy, Pipeline, PipelineOptions,
};
use image::DynamicImage;
use log::{info, warn};

#[derive(Parser)]
#[command(name = "facenorm")]
#[command(
    version,
    about = "Facial landmark extraction and batch scale normalization"
)]
struct Cli {
    /// Config file (defaults to the system config path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// YuNet face detector model, overrides the config
    #[arg(long, global = true)]
    detector: Option<PathBuf>,

    /// 68-point landmark model, overrides the config
    #[arg(long, global = true)]
    landmarks: Option<PathBuf>,

    /// Multi-face policy (largest, first, merge, reject), overrides the config
    #[arg(long, global = true)]
    multi_face: Option<MultiFacePolicy>,

    /// Log per-image details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print landmarks, face rectangle and centroid of each image as JSON
    Landmarks {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Do not append the eight frame anchors
        #[arg(long)]
        no_background: bool,
    },
    /// Rescale a batch so every face box matches the smallest one
    Normalize {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Directory for the rescaled images and report.json
        #[arg(short, long)]
        out_dir: PathBuf,

        /// Do not append the eight frame anchors
        #[arg(long)]
        no_background: bool,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_target(false)
        .format_timestamp(None)
        .init();

    let mut cfg = config::load_config(cli.config.as_deref())?;
    if let Some(path) = cli.detector {
        cfg.detector_model = path;
    }
    if let Some(path) = cli.landmarks {
        cfg.landmark_model = path;
    }
    if let Some(policy) = cli.multi_face {
        cfg.multi_face = policy;
    }

    match cli.command {
        Commands::Landmarks {
            images,
            no_background,
        } => landmarks(&cfg, &images, !no_background),
        Commands::Normalize {
            images,
            out_dir,
            no_background,
        } => normalize(&cfg, &images, &out_dir, !no_background),
        Commands::Config => open_config(cli.config.as_deref()),
    }
}

fn build_pipeline(
    cfg: &config::Config,
    background_points: bool,
) -> Result<Pipeline<YunetDetector, OnnxLandmarkPredictor>> {
    let models = ModelPaths {
        detector: &cfg.detector_model,
        landmarks: &cfg.landmark_model,
        score_threshold: cfg.score_threshold,
        nms_threshold: cfg.nms_threshold,
        landmark_input_size: cfg.landmark_input_size,
    };
    let options = PipelineOptions {
        multi_face: cfg.multi_face,
        background_points,
    };
    let filter = parse_filter(&cfg.resize_filter)?;

    Pipeline::from_models(&models, filter, options)
        .context("Failed to initialize landmark pipeline")
}

fn load_images(paths: &[PathBuf]) -> Result<Vec<DynamicImage>> {
    paths
        .iter()
        .map(|p| image::open(p).with_context(|| format!("opening {}", p.display())))
        .collect()
}

fn landmarks(cfg: &config::Config, paths: &[PathBuf], background_points: bool) -> Result<()> {
    let images = load_images(paths)?;
    let mut pipeline = build_pipeline(cfg, background_points)?;

    info!("Extracting landmarks from {} image(s)", images.len());
    let extraction = pipeline.extract(&images)?;

    let report = BatchReport::from_extraction(paths, &extraction);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn output_path(out_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let ext = source
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    out_dir.join(format!("{}_scaled.{}", stem, ext))
}

fn normalize(
    cfg: &config::Config,
    paths: &[PathBuf],
    out_dir: &Path,
    background_points: bool,
) -> Result<()> {
    let images = load_images(paths)?;
    let mut pipeline = build_pipeline(cfg, background_points)?;

    info!("Normalizing {} image(s)", images.len());
    let scaled = pipeline.run(&images)?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut outputs = Vec::with_capacity(scaled.len());
    for (source, face) in paths.iter().zip(&scaled) {
        match face {
            Ok(face) => {
                let out = output_path(out_dir, source);
                face.image
                    .save(&out)
                    .with_context(|| format!("writing {}", out.display()))?;
                info!(
                    "{} -> {} (scale {:.3})",
                    source.display(),
                    out.display(),
                    face.scale
                );
                outputs.push(Some(out));
            }
            Err(e) => {
                warn!("{}: {}", source.display(), e);
                outputs.push(None);
            }
        }
    }

    let report = BatchReport::from_scaled(paths, &scaled, &outputs);
    let report_path = out_dir.join("report.json");
    std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("writing {}", report_path.display()))?;

    info!(
        "✓ {} image(s) normalized, {} excluded. Report: {}",
        report.processed,
        report.excluded,
        report_path.display()
    );
    Ok(())
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        config::save_config(&config::Config::default(), Some(config_path))
            .context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
