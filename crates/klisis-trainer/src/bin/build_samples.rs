//! Builds the samples file for one cascade stage from a treebank corpus.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use klisis_core::{CascadeConfig, CascadePipeline, Stage, TreebankReader};
use klisis_trainer::{StageSamples, init_logging};
use tracing::info;

#[derive(Parser)]
#[command(name = "build-samples")]
#[command(about = "Build Klisis training samples for one cascade stage")]
#[command(version)]
struct Cli {
    /// Stage the samples feed (lstm1, dnn, lstm2)
    #[arg(short, long)]
    stage: Stage,

    /// Directory of treebank XML files
    #[arg(long)]
    corpus: PathBuf,

    /// Output safetensors file
    #[arg(short, long)]
    output: PathBuf,

    /// Cascade configuration (JSON)
    #[arg(short, long, env = "KLISIS_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the trained earlier-stage models
    #[arg(short, long, env = "KLISIS_MODEL_DIR")]
    model_dir: Option<PathBuf>,
}

fn main() {
    init_logging();
    if let Err(e) = run(Cli::parse()) {
        eprintln!("Sample building failed: {e:#}");
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

    let mut reader = TreebankReader::new()?;
    if let Some(path) = &cascade.short_names {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let short_names: HashMap<String, String> = serde_json::from_str(&text)?;
        reader = reader.with_short_names(short_names);
    }
    let documents = reader
        .read_dir(&cli.corpus)
        .with_context(|| format!("reading corpus {}", cli.corpus.display()))?;
    info!(documents = documents.len(), "corpus read");

    let pipeline = CascadePipeline::load_inputs_for(&cascade, cli.stage)?;
    let (samples, misses) = StageSamples::build(&pipeline, &documents, cli.stage)?;
    samples.save(&cli.output)?;

    println!(
        "{} samples for {} -> {} ({} unknown chars, {} unknown annotators, {} OOV words)",
        samples.len(),
        cli.stage,
        cli.output.display(),
        misses.unknown_chars,
        misses.unknown_annotators,
        misses.oov_words
    );
    Ok(())
}
