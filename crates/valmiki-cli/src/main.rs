use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use valmiki_core::{
    InferenceService, ModelKind, ModelPaths, ModelRegistry, Padding, PipelineConfig, PredictionReport,
    RegistryStatus, SelectionPolicy,
};

#[derive(Parser)]
#[command(name = "valmiki", about = "Valmiki age and gender prediction CLI")]
struct Cli {
    /// Directory containing the ONNX model files
    #[arg(long, global = true, env = "VALMIKI_MODEL_DIR", default_value_os_t = valmiki_core::default_model_dir())]
    model_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict age and gender of the most prominent face in an image
    Predict {
        /// Image file (JPEG, PNG, ...)
        image: PathBuf,
        /// Minimum detector confidence (exclusive)
        #[arg(long)]
        threshold: Option<f32>,
        /// Margin around the face: "20", "20px" or "15%"
        #[arg(long)]
        padding: Option<Padding>,
        /// Face selection policy: "confidence" or "area"
        #[arg(long)]
        selection: Option<SelectionPolicy>,
    },
    /// Load every model and report the first one that fails
    Check,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = ModelPaths::in_dir(&cli.model_dir);
    tracing::debug!(model_dir = %cli.model_dir.display(), "using model directory");

    match cli.command {
        Commands::Predict {
            image,
            threshold,
            padding,
            selection,
        } => {
            let config = pipeline_config(threshold, padding, selection)?;

            let registry = ModelRegistry::new();
            registry
                .initialize(&paths, &config)
                .with_context(|| format!("loading models from {}", cli.model_dir.display()))?;

            let bytes = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let service = InferenceService::new(Arc::new(registry));
            let prediction = service.predict(&bytes)?;

            println!("{}", serde_json::to_string_pretty(&PredictionReport::from(&prediction))?);
        }
        Commands::Check => {
            let registry = ModelRegistry::new();
            let _ = registry.initialize(&paths, &PipelineConfig::default());

            match registry.status() {
                RegistryStatus::Ready => {
                    for kind in ModelKind::ALL {
                        println!("{:<18} ok      {}", kind.as_str(), paths.path(kind).display());
                    }
                }
                RegistryStatus::NotReady { model, reason } => {
                    let failed_at = ModelKind::ALL.iter().position(|k| *k == model).unwrap_or(0);
                    for (i, kind) in ModelKind::ALL.into_iter().enumerate() {
                        let state = match i.cmp(&failed_at) {
                            std::cmp::Ordering::Less => "ok",
                            std::cmp::Ordering::Equal => "FAILED",
                            std::cmp::Ordering::Greater => "skipped",
                        };
                        println!("{:<18} {state:<7} {}", kind.as_str(), paths.path(kind).display());
                    }
                    bail!("{model} failed to load: {reason}");
                }
                RegistryStatus::Uninitialized => bail!("model registry was not initialized"),
            }
        }
    }

    Ok(())
}

/// Defaults overridden by the `predict` flags.
fn pipeline_config(
    threshold: Option<f32>,
    padding: Option<Padding>,
    selection: Option<SelectionPolicy>,
) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::default();
    if let Some(t) = threshold {
        config.detector.confidence_threshold = t;
    }
    if let Some(p) = padding {
        config.detector.padding = p;
    }
    if let Some(s) = selection {
        config.detector.selection = s;
    }
    config.validate().context("invalid detector options")?;
    Ok(config)
}
