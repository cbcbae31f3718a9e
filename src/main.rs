//! coldvec CLI - Cold Item Embedding Inference
//!
//! Command-line interface for fitting cold item vectors against a pretrained
//! context space.

use clap::{Parser, Subcommand};
use coldvec::{load_jobs, Config, EmbeddingSet, Orchestrator, Result};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use log::error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "coldvec")]
#[command(author = "coldvec Contributors")]
#[command(version)]
#[command(about = "Cold item embedding inference", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit vectors for cold items from their token lists
    Infer {
        /// Input file (item_id<TAB>token,token,... per line)
        #[arg(short, long, alias = "item-word")]
        input: PathBuf,

        /// Output prefix (writes <prefix>.npy and <prefix>_id2idx.json)
        #[arg(short, long)]
        output: PathBuf,

        /// Pretrained context matrix (.npy, vocabulary x dimension)
        #[arg(short, long)]
        context: PathBuf,

        /// Vocabulary weights for negative sampling (.npy, one per token)
        #[arg(long)]
        weights: PathBuf,

        /// Configuration file (JSON); flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of workers (default: 4)
        #[arg(short = 'w', long)]
        workers: Option<usize>,

        /// Skip items with more tokens than this (default: 40)
        #[arg(short = 'm', long)]
        max_word_num: Option<usize>,

        /// Training epochs per item (default: 200)
        #[arg(short = 'n', long)]
        iters: Option<usize>,

        /// Initial learning rate (default: 0.01)
        #[arg(long)]
        lr: Option<f32>,

        /// Final learning rate (default: 0.0001)
        #[arg(long)]
        min_lr: Option<f32>,

        /// Negative samples per token (default: 50)
        #[arg(long)]
        negatives: Option<usize>,

        /// Random seed for reproducibility
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Print the default configuration as JSON
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show statistics of a saved output
    Inspect {
        /// Output prefix given to `infer`
        prefix: PathBuf,

        /// Number of item ids to list
        #[arg(short = 'k', long, default_value = "5")]
        count: usize,
    },
}

/// Overrides collected from `infer` flags.
struct InferOverrides {
    workers: Option<usize>,
    max_word_num: Option<usize>,
    iters: Option<usize>,
    lr: Option<f32>,
    min_lr: Option<f32>,
    negatives: Option<usize>,
    seed: Option<u64>,
}

impl InferOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.workers {
            config.pool.num_workers = v;
        }
        if let Some(v) = self.max_word_num {
            config.pool.max_word_num = v;
        }
        if let Some(v) = self.iters {
            config.estimator.num_iters = v;
        }
        if let Some(v) = self.lr {
            config.estimator.learning_rate = v;
        }
        if let Some(v) = self.min_lr {
            config.estimator.min_learning_rate = v;
        }
        if let Some(v) = self.negatives {
            config.estimator.num_negatives = v;
        }
        if self.seed.is_some() {
            config.estimator.seed = self.seed;
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let result = match cli.command {
        Commands::Infer {
            input,
            output,
            context,
            weights,
            config,
            workers,
            max_word_num,
            iters,
            lr,
            min_lr,
            negatives,
            seed,
        } => infer(
            input,
            output,
            context,
            weights,
            config,
            InferOverrides {
                workers,
                max_word_num,
                iters,
                lr,
                min_lr,
                negatives,
                seed,
            },
        ),

        Commands::Config { output } => print_config(output),

        Commands::Inspect { prefix, count } => inspect(prefix, count),
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        eprintln!("coldvec: {}", e);
        std::process::exit(1);
    }
}

fn infer(
    input: PathBuf,
    output: PathBuf,
    context: PathBuf,
    weights: PathBuf,
    config_path: Option<PathBuf>,
    overrides: InferOverrides,
) -> Result<()> {
    let start_time = Instant::now();

    let mut config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;

    println!("coldvec Cold Item Inference");
    println!("   Items from: {}", input.display());
    println!();

    let spinner_style = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap();

    let bar_style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) ETA: {eta}")
        .unwrap()
        .progress_chars("█▓▒░  ");

    // Step 1: Load items
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style.clone());
    pb.set_message("Loading items...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let jobs = load_jobs(&input, &config.input)?;

    pb.finish_and_clear();
    println!("✓ Loaded {} items", format_number(jobs.len()));

    // Step 2: Load model
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style.clone());
    pb.set_message("Loading context matrix and vocabulary weights...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let orchestrator = Orchestrator::load(&context, &weights, config)?;

    pb.finish_and_clear();
    println!(
        "✓ Loaded context matrix ({} tokens, {} dims)",
        format_number(orchestrator.context().rows()),
        orchestrator.context().dim()
    );

    // Step 3: Fit
    let pb = ProgressBar::new(jobs.len() as u64);
    pb.set_style(bar_style);
    pb.set_message(format!(
        "Fitting item vectors ({} workers)...",
        orchestrator.config().pool.num_workers
    ));

    let run = orchestrator.run_with_progress(jobs, |progress| {
        pb.set_position(progress.received as u64);
    });

    pb.finish_and_clear();
    let run = run?;
    println!("✓ Fitted {} item vectors", format_number(run.embeddings.len()));

    // Step 4: Save
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style);
    pb.set_message("Saving embeddings...");
    pb.enable_steady_tick(Duration::from_millis(100));

    run.embeddings.save(&output)?;

    pb.finish_and_clear();
    println!(
        "✓ Saved {} and {}",
        EmbeddingSet::matrix_path(&output).display(),
        EmbeddingSet::index_path(&output).display()
    );

    // Summary
    let stats = run.stats;
    println!();
    println!("Inference complete in {}", HumanDuration(start_time.elapsed()));
    println!("   Submitted:  {}", format_number(stats.submitted));
    println!("   Fitted:     {}", format_number(stats.completed));
    println!("   Skipped:    {} (more than max-word-num tokens)", format_number(stats.skipped));
    println!("   Failed:     {}", format_number(stats.failed));
    println!("   Duplicates: {}", format_number(stats.duplicates));

    Ok(())
}

/// Format large numbers with commas for readability
fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

fn print_config(output: Option<PathBuf>) -> Result<()> {
    let config = Config::default();
    match output {
        Some(path) => {
            config.save(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

fn inspect(prefix: PathBuf, count: usize) -> Result<()> {
    let set = EmbeddingSet::load(&prefix)?;

    println!("Embeddings: {}", prefix.display());
    println!("  Items: {}", format_number(set.len()));
    println!("  Dimension: {}", set.dim());
    for id in set.ids().iter().take(count) {
        if let Some(vector) = set.get(id) {
            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            println!("  {:>6}  {}  (norm {:.4})", set.index_of(id).unwrap_or(0), id, norm);
        }
    }

    Ok(())
}
