use anyhow::{Context, Result};
use clap::Parser;
use ranking_core::pairwise::{load_judged_documents, PairwiseBuilder, PairwiseConfig};
use ranking_core::persist::{save_dataset, DatasetFormat};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "datagen")]
#[command(about = "Build a pairwise training set from a libsvm relevance file", long_about = None)]
struct Args {
    /// libsvm input (e.g. MSLR-WEB30K/Fold1/train.txt)
    #[arg(long)]
    input: PathBuf,
    /// Output dataset file
    #[arg(long)]
    output: PathBuf,
    /// bin (alias gob) or csv; defaults to the output extension
    #[arg(long)]
    format: Option<String>,
    /// Number of pairwise examples to keep
    #[arg(long, default_value_t = 1_000_000)]
    example_count: usize,
    /// Minimum relevance difference for a pair
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(i32).range(1..=4))]
    min_diff: i32,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn run(args: Args) -> Result<()> {
    let format = match &args.format {
        Some(name) => DatasetFormat::parse(name)?,
        None => DatasetFormat::from_path(&args.output),
    };
    let config = PairwiseConfig { max_examples: args.example_count, min_diff: args.min_diff, seed: args.seed };
    let mut builder = PairwiseBuilder::new(config)?;

    let start = Instant::now();
    let docs = load_judged_documents(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let dataset = builder.build(&docs)?;
    save_dataset(&args.output, &dataset, format)
        .with_context(|| format!("writing {}", args.output.display()))?;

    tracing::info!(
        examples = dataset.len(),
        output = %args.output.display(),
        format = ?format,
        took_s = start.elapsed().as_secs_f64(),
        "dataset written"
    );
    Ok(())
}

fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
