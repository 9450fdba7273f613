//! Tissue Classification CLI
//!
//! Classifies histology image tiles with a trained checkpoint and prints one
//! JSON result per image.
//!
//! Usage:
//! ```
//! histo-predict --model-path <checkpoint> [--device auto|cpu|cuda:N] <image_paths>...
//! ```
//!
//! A JSON configuration file can be given with `--config`; command-line flags
//! override its values.

use clap::Parser;
use histo_infer::core::config::{ConfigValidator, DevicePreference, ServiceConfig};
use histo_infer::core::init_tracing;
use histo_infer::predictor::PredictionService;
use std::path::PathBuf;
use tracing::{error, info};

/// Command-line arguments for the tissue classification tool
#[derive(Parser)]
#[command(name = "histo-predict")]
#[command(about = "Classifies histology image tiles into tissue types")]
struct Args {
    /// Path to the model checkpoint (.safetensors or .onnx)
    #[arg(short, long)]
    model_path: Option<PathBuf>,

    /// Compute device: auto, cpu, cuda or cuda:N
    #[arg(short, long)]
    device: Option<DevicePreference>,

    /// JSON service configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated class labels in training order
    #[arg(long, value_delimiter = ',')]
    labels: Option<Vec<String>>,

    /// Number of inference worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Image file paths to classify
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

impl Args {
    fn service_config(&self) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::from_json_file(path)?,
            None => ServiceConfig::default(),
        };
        if let Some(path) = &self.model_path {
            config = config.with_model_path(path);
        }
        if let Some(device) = self.device {
            config = config.with_device(device);
        }
        if let Some(labels) = &self.labels {
            config = config.with_labels(labels.iter().map(|l| l.trim().to_string()));
        }
        if let Some(workers) = self.workers {
            config = config.with_worker_threads(workers);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = Args::parse();
    let config = args.service_config()?;
    info!(
        model = %config.model_path.display(),
        device = %config.device,
        workers = config.worker_threads,
        "starting tissue classification"
    );

    let service = PredictionService::new(config)?;

    let mut tasks = tokio::task::JoinSet::new();
    for (index, image) in args.images.iter().cloned().enumerate() {
        let service = service.clone();
        tasks.spawn(async move {
            let result = service.predict(image.clone()).await;
            (index, image, result)
        });
    }

    let mut results = Vec::with_capacity(args.images.len());
    while let Some(joined) = tasks.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(index, _, _)| *index);

    for (_, image, result) in results {
        match result {
            Ok(prediction) => {
                let payload = serde_json::json!({
                    "image": image.display().to_string(),
                    "label": prediction.label,
                    "confidence": prediction.confidence,
                });
                println!("{payload}");
            }
            Err(e) if e.is_fatal() => {
                error!("{}: {e}", image.display());
                return Err(e.into());
            }
            Err(e) => error!("{}: {e}", image.display()),
        }
    }
    Ok(())
}
