//! Treebank evaluation tool.
//!
//! Runs the full cascade over held-out treebank files and reports per-aspect
//! accuracy and the POS confusion table. Also tags raw text from stdin,
//! extracts vocabulary files from a corpus, and looks up similar words.

use std::collections::HashMap;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use klisis_core::corpus::{collect_annotators, collect_characters};
use klisis_core::encoder::{normalize, tokenize};
use klisis_core::{
    CascadeConfig, CascadePipeline, Evaluation, MorphTag, Stage, TokenInput, TreebankReader,
    WordVectors,
};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "treebank-eval")]
#[command(about = "Evaluate and run the Klisis morphological cascade")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Cascade configuration (JSON)
    #[arg(short, long, global = true, env = "KLISIS_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the model artefacts
    #[arg(short, long, global = true, env = "KLISIS_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Directory holding chars.json, annotators.json and short_annotators.json
    #[arg(short, long, global = true, env = "KLISIS_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score the cascade against the gold tags of a treebank directory
    Evaluate {
        /// Directory of treebank XML files
        corpus: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Show raw counts instead of row percentages in the confusion table
        #[arg(long)]
        counts: bool,
    },
    /// Tag raw text read from stdin, one JSON line per input line
    Tag {
        /// Annotator credited for the text
        #[arg(short, long)]
        annotator: Option<String>,
    },
    /// Write the character and annotator vocabularies of a corpus
    Vocab {
        /// Directory of treebank XML files
        corpus: PathBuf,

        /// Output directory for the JSON files
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Nearest neighbours of a word in the embedding table
    Similar {
        word: String,

        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
}

#[derive(Serialize)]
struct TaggedToken {
    form: String,
    postag: String,
    confidence: Vec<f32>,
}

#[derive(Serialize)]
struct TaggedLine {
    input: String,
    tokens: Vec<TaggedToken>,
    error: Option<String>,
}

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("treebank-eval: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => CascadeConfig::from_json_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => CascadeConfig::new(),
    };
    if let Some(dir) = cli.model_dir {
        config = config.with_model_dir(dir);
    }
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }

    match cli.command {
        Commands::Evaluate {
            corpus,
            json,
            counts,
        } => evaluate(&config, &corpus, json, counts),
        Commands::Tag { annotator } => tag(&config, annotator.as_deref()),
        Commands::Vocab { corpus, output } => vocab(&config, &corpus, &output),
        Commands::Similar { word, count } => similar(&config, &word, count),
    }
}

fn reader(config: &CascadeConfig) -> Result<TreebankReader> {
    let reader = TreebankReader::new()?;
    let Some(path) = &config.short_names else {
        return Ok(reader);
    };
    if !path.exists() {
        warn!(file = %path.display(), "short annotator names not found");
        return Ok(reader);
    }
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let short_names: HashMap<String, String> = serde_json::from_str(&text)?;
    Ok(reader.with_short_names(short_names))
}

fn evaluate(config: &CascadeConfig, corpus: &Path, json: bool, counts: bool) -> Result<()> {
    let documents = reader(config)?
        .read_dir(corpus)
        .with_context(|| format!("reading corpus {}", corpus.display()))?;
    let pipeline = CascadePipeline::load(config, Stage::Sequence2)?;

    let mut evaluation = Evaluation::new();
    for document in &documents {
        let (tokens, gold): (Vec<TokenInput>, Vec<MorphTag>) =
            document.scorable_tokens().into_iter().unzip();
        let output = pipeline
            .run(&tokens)
            .with_context(|| format!("running cascade on {}", document.name))?;
        evaluation.record(&output, &gold)?;
        info!(document = %document.name, tokens = tokens.len(), "document scored");
    }

    let report = evaluation.report();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if counts {
        print!("{}", report.render_counts());
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

fn tag(config: &CascadeConfig, annotator: Option<&str>) -> Result<()> {
    let pipeline = CascadePipeline::load(config, Stage::Sequence2)?;

    for line in io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let forms = tokenize(line);
        let tokens: Vec<TokenInput> = forms
            .iter()
            .map(|form| {
                let token = TokenInput::new(form.as_str());
                match annotator {
                    Some(name) => token.with_annotator(name),
                    None => token,
                }
            })
            .collect();

        let tagged = match pipeline.run(&tokens) {
            Ok(output) => {
                let mut tagged = Vec::with_capacity(forms.len());
                if let Some(last) = output.last() {
                    for (i, form) in forms.iter().enumerate() {
                        let predictions = last.token(i).unwrap_or_default();
                        tagged.push(TaggedToken {
                            form: form.clone(),
                            postag: predictions.iter().map(|p| p.tag).collect(),
                            confidence: predictions.iter().map(|p| p.confidence).collect(),
                        });
                    }
                }
                TaggedLine {
                    input: line.to_string(),
                    tokens: tagged,
                    error: None,
                }
            }
            Err(e) => TaggedLine {
                input: line.to_string(),
                tokens: Vec::new(),
                error: Some(e.to_string()),
            },
        };
        println!("{}", serde_json::to_string(&tagged)?);
    }
    Ok(())
}

fn vocab(config: &CascadeConfig, corpus: &Path, output: &Path) -> Result<()> {
    let documents = reader(config)?
        .read_dir(corpus)
        .with_context(|| format!("reading corpus {}", corpus.display()))?;

    let chars: Vec<String> = collect_characters(&documents)
        .into_iter()
        .map(String::from)
        .collect();
    let (annotators, short_names) = collect_annotators(&documents);

    std::fs::create_dir_all(output)?;
    let write = |name: &str, value: serde_json::Value| -> Result<()> {
        let path = output.join(name);
        std::fs::write(&path, serde_json::to_string_pretty(&value)?)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(file = %path.display(), "vocabulary written");
        Ok(())
    };
    write("chars.json", serde_json::to_value(&chars)?)?;
    write("annotators.json", serde_json::to_value(&annotators)?)?;
    write("short_annotators.json", serde_json::to_value(&short_names)?)?;

    println!(
        "{} characters, {} annotators, {} short names",
        chars.len(),
        annotators.len(),
        short_names.len()
    );
    Ok(())
}

fn similar(config: &CascadeConfig, word: &str, count: usize) -> Result<()> {
    let vectors = WordVectors::load_word2vec(&config.word_vectors)
        .with_context(|| format!("reading {}", config.word_vectors.display()))?;
    let word = normalize(word);
    let neighbours = vectors.most_similar(&word, count);
    if neighbours.is_empty() {
        println!("{word}: not in the embedding table");
    }
    for (other, score) in neighbours {
        println!("{other}\t{score:.4}");
    }
    Ok(())
}
