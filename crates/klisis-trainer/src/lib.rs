//! # Klisis Trainer
//!
//! Builds per-stage sample sets from a treebank corpus and trains the
//! per-aspect models of the cascade, one stage at a time. Stage 2 samples
//! need trained stage-1 models, and stage 3 samples need both earlier
//! stages, so the usual order is: samples and training for `lstm1`, then
//! `dnn`, then `lstm2`.

pub mod checkpoint;
pub mod data;
pub mod trainer;

pub use checkpoint::{
    BestValidation, CheckpointDecision, CheckpointPolicy, CheckpointRecord, CheckpointSink,
    DirectorySink,
};
pub use data::{SampleSet, StageSamples};
pub use trainer::{TrainConfig, Trainer, TrainingSummary, stage_shapes, train_stage};

/// Installs a `tracing` subscriber filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
