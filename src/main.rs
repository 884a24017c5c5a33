use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use ngram_lm::config::Config;
use ngram_lm::executor::LocalExecutor;
use ngram_lm::pipeline;
use ngram_lm::ranker::{DUPLICATE_BASE, MISSING_BASE};
use ngram_lm::store::ShardedStore;

#[derive(Parser, Debug)]
#[command(name = "ngram-lm")]
#[command(about = "Build a top-N next-word model from a text corpus")]
#[command(version)]
struct Args {
    /// Config file path (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the number of map partitions
    #[arg(long, global = true)]
    partitions: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count n-grams in a corpus and write the pruned count table
    Count {
        /// Corpus file, or directory of corpus files
        input: PathBuf,
        /// Count table directory to create
        output: PathBuf,
    },
    /// Build the model table from a count table
    Model {
        /// Count table file or directory
        input: PathBuf,
        /// Predictions kept per context
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        top_n: u64,
        /// Store endpoint directory (overrides the config)
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

fn run(args: Args) -> anyhow::Result<()> {
    // Creates the file with defaults on first run; never rewrites an existing one.
    let mut config = Config::load(args.config.as_deref())?;

    if let Some(partitions) = args.partitions {
        config.partitions = partitions.max(1);
    }
    let executor = LocalExecutor::new(config.partitions);

    match args.command {
        Command::Count { input, output } => {
            let summary = pipeline::run_count_stage(&executor, &config, &input, &output)
                .with_context(|| format!("counting {} failed", input.display()))?;

            println!(
                "Counted {} records ({} skipped), kept {} phrases in {}",
                summary.counters.records_read,
                summary.counters.records_skipped,
                summary.phrases_written,
                output.display()
            );
        }
        Command::Model { input, top_n, store } => {
            let top_n = usize::try_from(top_n).context("top N does not fit in memory")?;
            let endpoint = store.unwrap_or_else(|| config.store.endpoint.clone());
            let table = ShardedStore::new(config.store.column_family.clone(), config.store.shards);

            let summary = pipeline::run_model_stage(&executor, &config, &input, top_n, &table)
                .with_context(|| format!("building model from {} failed", input.display()))?;
            let shards = table
                .flush(&endpoint, &config.store.table)
                .with_context(|| format!("writing model table under {} failed", endpoint.display()))?;

            println!(
                "Wrote {} contexts ({} predictions) to {} shards under {}",
                table.row_count(),
                summary.written.cells,
                shards.len(),
                endpoint.join(&config.store.table).display()
            );
            let missing = summary.counters.anomaly(MISSING_BASE);
            let duplicates = summary.counters.anomaly(DUPLICATE_BASE);
            if missing + duplicates > 0 {
                println!("Skipped {missing} contexts without a base count, saw {duplicates} duplicated bases");
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ngram_lm=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
