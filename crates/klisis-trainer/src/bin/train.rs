//! Trains the per-aspect models of one cascade stage from a samples file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use klisis_core::{AspectKind, CascadeConfig, Stage};
use klisis_trainer::{StageSamples, TrainConfig, init_logging, train_stage};
use tracing::info;

#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train the Klisis models of one cascade stage")]
#[command(version)]
struct Cli {
    /// Stage to train (lstm1, dnn, lstm2)
    #[arg(short, long)]
    stage: Stage,

    /// Samples file written by build-samples
    #[arg(long)]
    samples: PathBuf,

    /// Separate validation samples; otherwise a split of --samples is held out
    #[arg(long)]
    val_samples: Option<PathBuf>,

    /// Aspects to train (repeatable); all nine when omitted
    #[arg(short, long = "aspect")]
    aspects: Vec<String>,

    /// Cascade configuration (JSON)
    #[arg(short, long, env = "KLISIS_CONFIG")]
    config: Option<PathBuf>,

    /// Training hyperparameters (JSON)
    #[arg(short, long, env = "KLISIS_TRAIN_CONFIG")]
    train_config: Option<PathBuf>,

    /// Directory checkpoints are written to
    #[arg(short, long, env = "KLISIS_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Override the number of epochs
    #[arg(short, long)]
    epochs: Option<usize>,
}

fn main() {
    init_logging();
    if let Err(e) = run(Cli::parse()) {
        eprintln!("Training failed: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut cascade = match &cli.config {
        Some(path) => CascadeConfig::from_json_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => CascadeConfig::new(),
    };
    if let Some(dir) = cli.model_dir {
        cascade = cascade.with_model_dir(dir);
    }

    let mut config = match &cli.train_config {
        Some(path) => TrainConfig::from_json_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => TrainConfig::default(),
    };
    if let Some(epochs) = cli.epochs {
        config.epochs = epochs;
    }

    let aspects = if cli.aspects.is_empty() {
        AspectKind::ALL.to_vec()
    } else {
        cli.aspects
            .iter()
            .map(|title| AspectKind::from_title(title))
            .collect::<klisis_core::Result<Vec<_>>>()?
    };

    let device = cascade.device();
    let train = StageSamples::load(&cli.samples, cli.stage, &device)?;
    let val = cli
        .val_samples
        .as_deref()
        .map(|path| StageSamples::load(path, cli.stage, &device))
        .transpose()?;

    let summaries = train_stage(&cascade, &config, &aspects, &train, val.as_ref())?;
    for summary in &summaries {
        match summary.best() {
            Some(best) => println!(
                "{}/{}: best epoch {} val {:.3} -> {}",
                summary.aspect, summary.stage, best.epoch, best.val_accuracy, best.file_name
            ),
            None => println!(
                "{}/{}: no improvement in {} epochs",
                summary.aspect, summary.stage, summary.epochs
            ),
        }
    }
    info!(models = summaries.len(), "training finished");
    Ok(())
}
