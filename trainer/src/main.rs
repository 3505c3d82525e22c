use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use ranking_core::logistic::{evaluate, grid_search_cv, ConfusionMatrix, LogisticRegression, TrainConfig};
use ranking_core::pairwise::Dataset;
use ranking_core::persist::{load_dataset, load_model, save_model, ModelFile, MODEL_VERSION};
use std::path::{Path, PathBuf};
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "trainer")]
#[command(about = "Train and evaluate the pairwise logistic ranking model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cross-validate lambda, fit the final model and report test accuracy
    Train {
        /// Pairwise training set (.csv or binary)
        #[arg(long)]
        train_file: PathBuf,
        /// Held-out set; without it 20% of the shuffled training set is held out
        #[arg(long)]
        test_file: Option<PathBuf>,
        /// Regularization strengths to search
        #[arg(long, value_delimiter = ',', default_value = "1.0,1.25,1.5,1.75,2.0,2.25")]
        lambdas: Vec<f64>,
        #[arg(long, default_value_t = 5)]
        folds: usize,
        #[arg(long, default_value_t = 0.02)]
        cv_learning_rate: f64,
        #[arg(long, default_value_t = 100)]
        cv_epochs: usize,
        #[arg(long, default_value_t = 0.02)]
        learning_rate: f64,
        #[arg(long, default_value_t = 1000)]
        epochs: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Skip the L2 penalty on the bias
        #[arg(long, default_value_t = false)]
        no_bias_penalty: bool,
        #[arg(long, default_value = "model.json")]
        model_out: PathBuf,
    },
    /// Score a saved model against a pairwise test set
    Evaluate {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        test_file: PathBuf,
    },
}

fn load(path: &Path) -> Result<Dataset> {
    let data = load_dataset(path).with_context(|| format!("loading {}", path.display()))?;
    tracing::info!(examples = data.len(), path = %path.display(), "loaded dataset");
    Ok(data)
}

fn report(cm: &ConfusionMatrix) {
    println!("Accuracy: {:.2}%", cm.accuracy());
    println!("{cm}");
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            train_file,
            test_file,
            lambdas,
            folds,
            cv_learning_rate,
            cv_epochs,
            learning_rate,
            epochs,
            seed,
            no_bias_penalty,
            model_out,
        } => {
            let start = Instant::now();
            let mut train = load(&train_file)?;
            let test = match test_file {
                Some(path) => load(&path)?,
                None => {
                    train.shuffle(&mut StdRng::seed_from_u64(seed));
                    let (head, tail) = train.split(0.8);
                    train = head;
                    tail
                }
            };

            let base = TrainConfig { seed, regularize_bias: !no_bias_penalty, ..Default::default() };
            let cv = TrainConfig { learning_rate: cv_learning_rate, max_epochs: cv_epochs, ..base };
            let search = grid_search_cv(&train.features, &train.labels, &lambdas, folds, &cv)?;
            println!("Best lambda: {} (cv accuracy {:.2}%)", search.best_lambda, search.best_accuracy);

            let mut model = LogisticRegression::new(search.best_lambda);
            let final_config = TrainConfig { learning_rate, max_epochs: epochs, ..base };
            let fit = model.fit(&train.features, &train.labels, &final_config)?;
            tracing::info!(epochs = fit.epochs, loss = fit.final_loss, stopped_early = fit.stopped_early, "final model trained");

            report(&evaluate(&model, &test.features, &test.labels));

            let trained = model.into_model().context("model was not trained")?;
            let file = ModelFile {
                version: MODEL_VERSION,
                created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
                model: trained,
            };
            save_model(&model_out, &file).with_context(|| format!("writing {}", model_out.display()))?;
            tracing::info!(path = %model_out.display(), took_s = start.elapsed().as_secs_f64(), "model saved");
        }
        Commands::Evaluate { model, test_file } => {
            let file = load_model(&model).with_context(|| format!("loading {}", model.display()))?;
            tracing::info!(lambda = file.model.lambda, created_at = %file.created_at, "loaded model");
            let model = LogisticRegression::from_model(file.model)?;
            let test = load(&test_file)?;
            report(&evaluate(&model, &test.features, &test.labels));
        }
    }
    Ok(())
}
