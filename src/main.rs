//! Patient Risk Pipeline
//!
//! Trains, evaluates and explains the clinical risk ensemble and writes the
//! dashboard artifacts.

use anyhow::Context;
use clap::{Parser, Subcommand};
use patient_risk::{
    artifacts::{write_json, ArtifactWriter, ModelBundle},
    config::Config,
    data::PatientTable,
    metrics::EvaluationReport,
    pipeline::{self, Pipeline},
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "patient-risk")]
#[command(about = "Clinical risk training, evaluation and explainability pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full training pipeline
    Train {
        /// Processed patient table (defaults to data.input)
        #[arg(long)]
        input: Option<String>,
        /// Artifact directory (defaults to output.dir)
        #[arg(long)]
        outdir: Option<String>,
        /// Skip the explanation stage
        #[arg(long)]
        no_explain: bool,
    },
    /// Score new rows with a persisted model bundle
    Predict {
        #[arg(long)]
        bundle: String,
        #[arg(long)]
        input: String,
        #[arg(long)]
        output: Option<String>,
    },
    /// Evaluate a risk score column that is already present
    Evaluate {
        #[arg(long)]
        input: String,
        #[arg(long)]
        output: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;

    match cli.command {
        Commands::Train {
            input,
            outdir,
            no_explain,
        } => train(config, input, outdir, no_explain),
        Commands::Predict {
            bundle,
            input,
            output,
        } => predict(config, &bundle, &input, output),
        Commands::Evaluate { input, output } => evaluate(config, &input, output),
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn load_table(path: &str) -> anyhow::Result<PatientTable> {
    PatientTable::from_csv_path(expand(path))
        .with_context(|| format!("failed to read patient table {}", path))
}

fn train(
    config: Config,
    input: Option<String>,
    outdir: Option<String>,
    no_explain: bool,
) -> anyhow::Result<()> {
    let input = input.unwrap_or_else(|| config.data.input.clone());
    let table = load_table(&input)?;
    tracing::info!("Loaded {} patients from {}", table.len(), input);

    let writer = match &outdir {
        Some(dir) => ArtifactWriter::with_dir(&config.output, expand(dir)),
        None => ArtifactWriter::new(&config.output),
    };

    let mut pipeline = Pipeline::new(config);
    if no_explain {
        pipeline = pipeline.without_explanations();
    }
    let summary = pipeline.train(&table, &writer).context("training run failed")?;

    println!("\n🩺 Training complete\n");
    println!(
        "Rows: {} (train {}, balanced {}, test {})",
        summary.rows, summary.train_rows, summary.balanced_rows, summary.test_rows
    );
    let members: Vec<String> = summary.members.iter().map(|m| m.to_string()).collect();
    println!("Models: {}", members.join(", "));
    print_report(&summary.evaluation);
    println!("Explained patients: {}", summary.explained_patients);
    println!("\nArtifacts:");
    for path in &summary.written {
        println!("  {}", path.display());
    }
    Ok(())
}

fn predict(
    config: Config,
    bundle: &str,
    input: &str,
    output: Option<String>,
) -> anyhow::Result<()> {
    let bundle = ModelBundle::load(expand(bundle))
        .with_context(|| format!("failed to load model bundle {}", bundle))?;
    let table = load_table(input)?;

    let rows = pipeline::predict(&bundle, &table, &config.data);
    let path = match output {
        Some(path) => expand(&path),
        None => config.output.path_of(&config.output.predictions_file),
    };
    write_json(&path, &rows).with_context(|| format!("failed to write {}", path.display()))?;

    println!("✅ Scored {} patients → {}", rows.len(), path.display());
    Ok(())
}

fn evaluate(config: Config, input: &str, output: Option<String>) -> anyhow::Result<()> {
    let table = load_table(input)?;
    let report = pipeline::evaluate_scores(&table, &config).context("evaluation failed")?;

    let path = match output {
        Some(path) => expand(&path),
        None => config.output.path_of(&config.output.evaluation_file),
    };
    write_json(&path, &report).with_context(|| format!("failed to write {}", path.display()))?;

    println!("\n📈 Evaluation of existing scores\n");
    print_report(&report);
    println!("\nWritten to {}", path.display());
    Ok(())
}

fn print_report(report: &EvaluationReport) {
    let c = &report.confusion;
    println!("AUC:   {:.3}", report.roc.auc);
    println!("AUPRC: {:.3}", report.pr.auprc);
    println!("{:<10} {:>8} {:>8}", "", "pred 0", "pred 1");
    println!("{:<10} {:>8} {:>8}", "actual 0", c.tn, c.fp);
    println!("{:<10} {:>8} {:>8}", "actual 1", c.fn_, c.tp);
}
