#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use wikidit::config::{load_config, Config};
use wikidit::dataset::{read_jsonl, write_jsonl, TrainingSet};
use wikidit::evaluation::{evaluate, run_synthetic_suite, synthetic_revisions_with_noise};
use wikidit::features::{FeatureVector, Preprocessor};
use wikidit::model::{load_model, save_model, LogisticRegression, SequentialOrdinalClassifier};
use wikidit::service::{PredictionResult, PredictionService};

#[derive(Parser)]
#[command(name = "wikidit", version, about = "Wikipedia article quality tiers and edit suggestions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write synthetic labeled revisions as JSONL
    Synth {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 50)]
        per_tier: usize,
        #[arg(long, default_value_t = 0.3)]
        noise: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Fit the sequential ordinal classifier and save the model artifact
    Train {
        /// Labeled revisions (JSONL)
        #[arg(long)]
        data: PathBuf,
        /// Model artifact output
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Overrides training.n_jobs
        #[arg(long)]
        n_jobs: Option<usize>,
        /// Held-out metrics JSON output
        #[arg(long)]
        metrics: Option<PathBuf>,
    },
    /// Score a saved model on labeled revisions
    Evaluate {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Predict the tier of one revision and rank candidate edits
    Predict {
        #[arg(long)]
        model: PathBuf,
        /// Feature vector JSON
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// List the candidate edit catalog
    Catalog {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run synthetic evaluation suite
    Eval {
        #[arg(long)]
        case: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Synth {
            out,
            per_tier,
            noise,
            seed,
        } => {
            if per_tier == 0 {
                return Err("--per-tier must be >= 1".into());
            }
            let revisions = synthetic_revisions_with_noise(per_tier, noise, seed);
            write_jsonl(&out, &revisions)?;
            println!("wrote {} revisions to {}", revisions.len(), out.display());
        }
        Commands::Train {
            data,
            out,
            config,
            n_jobs,
            metrics,
        } => {
            let config = read_config(config.as_ref())?;
            let training = config.training;
            let preprocessor = training.preprocessor();
            let revisions = read_jsonl(&data)?;
            let set = TrainingSet::from_revisions(&revisions, &preprocessor)?;
            let (train, test) = set.train_test_split(training.test_fraction, training.seed);

            let mut model = SequentialOrdinalClassifier::for_quality_tiers(
                training.estimator(),
                preprocessor.schema(),
            )
            .with_jobs(n_jobs.or(training.n_jobs));
            model.fit(&train.rows, &train.target)?;
            save_model(&model, &out)?;
            println!(
                "trained on {} revisions; model written to {}",
                train.len(),
                out.display()
            );

            if !test.is_empty() {
                let held_out = evaluate(&model, &test.rows, &test.target)?;
                println!(
                    "held-out ordinal score {:.4}, accuracy {:.4} ({} revisions)",
                    held_out.ordinal_score, held_out.accuracy, held_out.n
                );
                if let Some(path) = metrics {
                    write_json(&path, &held_out)?;
                }
            }
        }
        Commands::Evaluate { model, data, out } => {
            let model: SequentialOrdinalClassifier<LogisticRegression> = load_model(&model)?;
            let preprocessor = Preprocessor::for_schema(model.schema());
            let revisions = read_jsonl(&data)?;
            let set = TrainingSet::from_revisions(&revisions, &preprocessor)?;
            let metrics = evaluate(&model, &set.rows, &set.target)?;
            match out {
                Some(path) => write_json(&path, &metrics)?,
                None => println!("{}", serde_json::to_string_pretty(&metrics)?),
            }
        }
        Commands::Predict {
            model,
            input,
            config,
            out,
            format,
        } => {
            let config = read_config(config.as_ref())?;
            let model: SequentialOrdinalClassifier<LogisticRegression> = load_model(&model)?;
            let preprocessor = Preprocessor::for_schema(model.schema());
            let service =
                PredictionService::from_config(Arc::new(model), preprocessor, &config.service)?;
            let features: FeatureVector = read_json(&input)?;
            let result = service.predict(&features)?;

            let rendered = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&result)?,
                OutputFormat::Text => render_text(&service, &result),
            };
            match out {
                Some(path) => std::fs::write(path, rendered)?,
                None => println!("{rendered}"),
            }
        }
        Commands::Catalog { config } => {
            let config = read_config(config.as_ref())?;
            let catalog = config.service.edit_catalog()?;
            for edit in catalog.edits() {
                match &edit.help_url {
                    Some(url) => println!("{:<18} {}  <{url}>", edit.name, edit.description),
                    None => println!("{:<18} {}", edit.name, edit.description),
                }
            }
        }
        Commands::Eval { case, out } => {
            let results = run_synthetic_suite(case.as_deref())?;
            let mut file = File::create(out)?;
            for result in &results {
                let line = serde_json::to_string(result)?;
                writeln!(file, "{line}")?;
            }
        }
    }

    Ok(())
}

fn read_config(path: Option<&PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(Config::default()),
    }
}

fn render_text(service: &PredictionService, result: &PredictionResult) -> String {
    let mut text = format!(
        "predicted tier: {} ({}), score {:.3}\n",
        result.best_tier,
        result.best_tier.full_name(),
        result.score
    );
    for p in &result.distribution {
        text.push_str(&format!("  {:<6} {:.3}\n", p.tier.label(), p.probability));
    }
    let shown = service.displayed_edits(result);
    if shown.is_empty() {
        text.push_str("no suggested edits\n");
    } else {
        text.push_str("suggested edits:\n");
        for edit in shown {
            text.push_str(&format!("  +{:.3}  {}\n", edit.delta, edit.description));
        }
    }
    text
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}
