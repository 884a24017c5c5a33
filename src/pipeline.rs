//! Stage runners: wire readers, jobs, executor and sinks together.

use std::path::Path;

use crate::config::Config;
use crate::count::NgramCountJob;
use crate::count_table;
use crate::document::DocumentParser;
use crate::error::{PipelineError, Result};
use crate::executor::{CounterSnapshot, Executor};
use crate::model::LanguageModelJob;
use crate::ngram::{self, NgramExtractor};
use crate::store::{ModelStore, ModelStoreWriter, WriteSummary};

/// Outcome of the counting stage.
#[derive(Debug, Clone)]
pub struct CountSummary {
    pub counters: CounterSnapshot,
    pub phrases_written: usize,
}

/// Outcome of the model stage.
#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub counters: CounterSnapshot,
    pub written: WriteSummary,
}

fn log_counters(stage: &str, counters: &CounterSnapshot) {
    tracing::info!(
        stage,
        records_read = counters.records_read,
        records_skipped = counters.records_skipped,
        map_outputs = counters.map_outputs,
        combine_outputs = counters.combine_outputs,
        reduce_groups = counters.reduce_groups,
        reduce_outputs = counters.reduce_outputs,
        "Job counters"
    );
    for (name, count) in &counters.anomalies {
        tracing::warn!(stage, anomaly = *name, count, "Anomalies seen while reducing");
    }
}

/// Count n-grams in the corpus under `input` and write the pruned table to `output`.
///
/// # Errors
/// Fails before doing any work if `output` already exists, and on any I/O
/// failure. Bad corpus records are skipped, not fatal.
pub fn run_count_stage<E: Executor>(
    executor: &E,
    config: &Config,
    input: &Path,
    output: &Path,
) -> Result<CountSummary> {
    if output.exists() {
        return Err(PipelineError::OutputExists(output.to_path_buf()));
    }

    let records = count_table::read_records(input)?;
    tracing::info!("Counting n-grams in {} records from {}", records.len(), input.display());

    let job = NgramCountJob::new(
        DocumentParser::new(config.text_field.clone()),
        NgramExtractor::new(config.max_order),
        config.prune_threshold,
    );
    let result = executor.submit(&job, records);
    log_counters("count", &result.counters);

    count_table::write_table(output, &result.results, config.reduce_tasks)?;
    tracing::info!(
        "Wrote {} phrases to {}",
        result.results.len(),
        output.display()
    );

    let mut by_order = vec![0usize; config.max_order.max(1)];
    for (phrase, _) in &result.results {
        if let Some(slot) = ngram::order(phrase).checked_sub(1).and_then(|i| by_order.get_mut(i)) {
            *slot += 1;
        }
    }
    for (index, phrases) in by_order.iter().enumerate() {
        tracing::debug!(order = index + 1, phrases, "Surviving phrases by order");
    }

    Ok(CountSummary {
        counters: result.counters,
        phrases_written: result.results.len(),
    })
}

/// Build the top-`top_n` continuation model from the count table under
/// `input` and write it to `store`.
pub fn run_model_stage<E: Executor, S: ModelStore>(
    executor: &E,
    config: &Config,
    input: &Path,
    top_n: usize,
    store: &S,
) -> Result<ModelSummary> {
    let records = count_table::read_records(input)?;
    tracing::info!(
        "Building top-{} model from {} count rows in {} ({:?} merge)",
        top_n,
        records.len(),
        input.display(),
        config.merge_policy
    );

    let job = LanguageModelJob::new(top_n, config.merge_policy);
    let result = executor.submit(&job, records);
    log_counters("model", &result.counters);

    let entries: Vec<_> = result.results.into_iter().map(|(_, entry)| entry).collect();
    let written = ModelStoreWriter::new(store).write_all(&entries)?;
    tracing::info!(
        rows = written.rows,
        cells = written.cells,
        column_family = store.column_family(),
        "Model rows written"
    );

    Ok(ModelSummary {
        counters: result.counters,
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalExecutor;
    use crate::store::ShardedStore;
    use std::fs;

    fn config() -> Config {
        Config {
            partitions: 3,
            reduce_tasks: 2,
            ..Config::default()
        }
    }

    fn write_corpus(dir: &Path) -> std::path::PathBuf {
        let corpus = dir.join("corpus");
        fs::create_dir(&corpus).unwrap();

        let pages = [
            "the cat sat on the mat. The cat ran.",
            "The cat sat down; the dog sat up.",
            "the cat sat &amp; the dog barked at http://example.org/dogs",
        ];
        let body: String = pages
            .iter()
            .map(|text| format!("<page><title>x</title><revision><text>{text}</text></revision></page>\n"))
            .collect();
        fs::write(corpus.join("pages-001.xml"), body).unwrap();
        fs::write(corpus.join("pages-002.xml"), "<page><title>broken</title></page>\n").unwrap();
        corpus
    }

    #[test]
    fn test_count_then_model() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = write_corpus(dir.path());
        let counts = dir.path().join("counts");
        let config = config();
        let executor = LocalExecutor::new(config.partitions);

        let counted = run_count_stage(&executor, &config, &corpus, &counts).unwrap();
        assert_eq!(counted.counters.records_read, 4);
        assert_eq!(counted.counters.records_skipped, 1);
        assert!(counts.join(count_table::SUCCESS_MARKER).exists());

        let mut table: Vec<(String, u64)> = count_table::read_records(&counts)
            .unwrap()
            .iter()
            .map(|line| count_table::parse_line(line).unwrap())
            .map(|ngram| (ngram.phrase, ngram.count))
            .collect();
        table.sort();
        assert_eq!(
            table,
            vec![
                ("cat".to_string(), 4),
                ("cat sat".to_string(), 3),
                ("sat".to_string(), 4),
                ("the".to_string(), 7),
                ("the cat".to_string(), 4),
                ("the cat sat".to_string(), 3),
            ]
        );
        assert_eq!(counted.phrases_written, table.len());

        let store = ShardedStore::new(config.store.column_family.clone(), 4);
        let modelled = run_model_stage(&executor, &config, &counts, 2, &store).unwrap();

        // "cat" -> sat 3/4; "the" -> cat 4/7; "the cat" -> sat 3/4
        assert_eq!(modelled.written, WriteSummary { rows: 3, cells: 3 });
        assert_eq!(store.get(b"cat", b"sat"), Some(b"0.75".to_vec()));
        assert_eq!(store.get(b"the cat", b"sat"), Some(b"0.75".to_vec()));
        assert_eq!(
            store.get(b"the", b"cat"),
            Some((4.0f64 / 7.0).to_string().into_bytes())
        );
    }

    #[test]
    fn test_count_stage_refuses_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = write_corpus(dir.path());
        let executor = LocalExecutor::new(1);

        let result = run_count_stage(&executor, &config(), &corpus, dir.path());
        assert!(matches!(result, Err(PipelineError::OutputExists(_))));
    }

    #[test]
    fn test_count_stage_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let executor = LocalExecutor::new(1);

        let result = run_count_stage(
            &executor,
            &config(),
            &dir.path().join("nope"),
            &dir.path().join("out"),
        );
        assert!(matches!(result, Err(PipelineError::MissingInput(_))));
    }
}
