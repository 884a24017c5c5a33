//! Batch map / combine / reduce execution.
//!
//! A [`MapReduceJob`] bundles the three per-stage functions; an [`Executor`]
//! decides how they are scheduled. The pipeline only talks to the trait, so a
//! distributed engine can stand in for [`LocalExecutor`] without touching the
//! statistical code.
//!
//! # Execution model
//!
//! ```text
//! inputs -> split into partitions -> map + combine per partition (parallel)
//!        -> shuffle: group values by key across partitions
//!        -> reduce once per key (parallel) -> results sorted by key
//! ```
//!
//! Values reach `reduce` in no particular order. A record whose `map` call
//! fails is logged and skipped, and anything it emitted before failing is
//! discarded.

use ahash::AHashMap;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::RecordError;

/// The map, combine and reduce functions of one job.
pub trait MapReduceJob: Sync {
    type Input: Send;
    type Key: Eq + Hash + Ord + Clone + Send + Sync;
    type Value: Send;
    type Output: Send;

    /// Name used in log lines.
    fn name(&self) -> &'static str;

    /// Turn one input record into keyed values.
    fn map(
        &self,
        input: Self::Input,
        emit: &mut dyn FnMut(Self::Key, Self::Value),
    ) -> Result<(), RecordError>;

    /// Partition-local pre-reduction of the values gathered for one key.
    ///
    /// Only sound when `reduce` accepts its own combined output as input.
    fn combine(&self, _key: &Self::Key, values: Vec<Self::Value>) -> Vec<Self::Value> {
        values
    }

    /// Final reduction over every value emitted for `key`.
    fn reduce(
        &self,
        key: &Self::Key,
        values: Vec<Self::Value>,
        counters: &JobCounters,
    ) -> Option<Self::Output>;
}

/// Runs jobs. Implemented by [`LocalExecutor`]; a cluster engine would be another.
pub trait Executor {
    fn submit<J: MapReduceJob>(&self, job: &J, inputs: Vec<J::Input>) -> JobOutput<J::Key, J::Output>;
}

/// Keyed results of a job, sorted by key, and its final counters.
#[derive(Debug)]
pub struct JobOutput<K, O> {
    pub results: Vec<(K, O)>,
    pub counters: CounterSnapshot,
}

/// Live counters shared by every task of a job.
#[derive(Debug, Default)]
pub struct JobCounters {
    records_read: AtomicU64,
    records_skipped: AtomicU64,
    map_outputs: AtomicU64,
    combine_outputs: AtomicU64,
    reduce_groups: AtomicU64,
    reduce_outputs: AtomicU64,
    anomalies: Mutex<AHashMap<&'static str, u64>>,
}

impl JobCounters {
    /// Count an unexpected-but-survivable condition seen by a reducer.
    pub fn anomaly(&self, name: &'static str) {
        *self.anomalies.lock().entry(name).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let mut anomalies: Vec<(&'static str, u64)> = self
            .anomalies
            .lock()
            .iter()
            .map(|(name, count)| (*name, *count))
            .collect();
        anomalies.sort();

        CounterSnapshot {
            records_read: self.records_read.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            map_outputs: self.map_outputs.load(Ordering::Relaxed),
            combine_outputs: self.combine_outputs.load(Ordering::Relaxed),
            reduce_groups: self.reduce_groups.load(Ordering::Relaxed),
            reduce_outputs: self.reduce_outputs.load(Ordering::Relaxed),
            anomalies,
        }
    }

    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`JobCounters`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub records_read: u64,
    pub records_skipped: u64,
    pub map_outputs: u64,
    pub combine_outputs: u64,
    pub reduce_groups: u64,
    pub reduce_outputs: u64,
    pub anomalies: Vec<(&'static str, u64)>,
}

impl CounterSnapshot {
    pub fn anomaly(&self, name: &str) -> u64 {
        self.anomalies
            .iter()
            .find(|(n, _)| *n == name)
            .map_or(0, |(_, count)| *count)
    }
}

/// In-process executor backed by the rayon thread pool.
#[derive(Debug, Clone, Copy)]
pub struct LocalExecutor {
    partitions: usize,
}

impl LocalExecutor {
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: partitions.max(1),
        }
    }

    /// Split inputs into contiguous partitions, keeping each record's global index.
    fn split<T>(&self, inputs: Vec<T>) -> Vec<Vec<(usize, T)>> {
        let chunk = inputs.len().div_ceil(self.partitions).max(1);
        let mut partitions: Vec<Vec<(usize, T)>> = Vec::with_capacity(self.partitions);

        for (index, input) in inputs.into_iter().enumerate() {
            if index % chunk == 0 {
                partitions.push(Vec::with_capacity(chunk));
            }
            if let Some(partition) = partitions.last_mut() {
                partition.push((index, input));
            }
        }

        partitions
    }

    fn run_map_task<J: MapReduceJob>(
        job: &J,
        partition: Vec<(usize, J::Input)>,
        counters: &JobCounters,
    ) -> AHashMap<J::Key, Vec<J::Value>> {
        let mut groups: AHashMap<J::Key, Vec<J::Value>> = AHashMap::new();
        let mut emitted: Vec<(J::Key, J::Value)> = Vec::new();

        for (index, input) in partition {
            JobCounters::add(&counters.records_read, 1);
            emitted.clear();

            let mapped = job.map(input, &mut |key, value| emitted.push((key, value)));
            match mapped {
                Ok(()) => {
                    JobCounters::add(&counters.map_outputs, emitted.len() as u64);
                    for (key, value) in emitted.drain(..) {
                        groups.entry(key).or_default().push(value);
                    }
                }
                Err(err) => {
                    JobCounters::add(&counters.records_skipped, 1);
                    tracing::warn!(job = job.name(), record = index, "Skipping record: {err}");
                }
            }
        }

        groups
            .into_iter()
            .map(|(key, values)| {
                let combined = job.combine(&key, values);
                JobCounters::add(&counters.combine_outputs, combined.len() as u64);
                (key, combined)
            })
            .collect()
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new(rayon::current_num_threads())
    }
}

impl Executor for LocalExecutor {
    fn submit<J: MapReduceJob>(&self, job: &J, inputs: Vec<J::Input>) -> JobOutput<J::Key, J::Output> {
        let counters = JobCounters::default();

        let partials: Vec<AHashMap<J::Key, Vec<J::Value>>> = self
            .split(inputs)
            .into_par_iter()
            .map(|partition| Self::run_map_task(job, partition, &counters))
            .collect();

        let mut shuffled: AHashMap<J::Key, Vec<J::Value>> = AHashMap::new();
        for partial in partials {
            for (key, mut values) in partial {
                shuffled.entry(key).or_default().append(&mut values);
            }
        }

        let groups: Vec<(J::Key, Vec<J::Value>)> = shuffled.into_iter().collect();
        JobCounters::add(&counters.reduce_groups, groups.len() as u64);

        let mut results: Vec<(J::Key, J::Output)> = groups
            .into_par_iter()
            .filter_map(|(key, values)| {
                job.reduce(&key, values, &counters)
                    .map(|output| (key, output))
            })
            .collect();
        results.par_sort_unstable_by(|a, b| a.0.cmp(&b.0));
        JobCounters::add(&counters.reduce_outputs, results.len() as u64);

        let counters = counters.snapshot();
        tracing::debug!(job = job.name(), ?counters, "Job finished");

        JobOutput { results, counters }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Word count that refuses records containing "bad".
    struct WordCount;

    impl MapReduceJob for WordCount {
        type Input = &'static str;
        type Key = String;
        type Value = u64;
        type Output = u64;

        fn name(&self) -> &'static str {
            "word-count"
        }

        fn map(
            &self,
            input: Self::Input,
            emit: &mut dyn FnMut(String, u64),
        ) -> Result<(), RecordError> {
            for word in input.split_whitespace() {
                if word == "bad" {
                    return Err(RecordError::MalformedCount(input.to_string()));
                }
                emit(word.to_string(), 1);
            }
            Ok(())
        }

        fn combine(&self, _key: &String, values: Vec<u64>) -> Vec<u64> {
            vec![values.iter().sum()]
        }

        fn reduce(&self, key: &String, values: Vec<u64>, counters: &JobCounters) -> Option<u64> {
            if key == "odd" {
                counters.anomaly("odd_word");
            }
            Some(values.iter().sum())
        }
    }

    #[test]
    fn test_word_count() {
        let inputs = vec!["a b a", "b a", "c"];
        let output = LocalExecutor::new(2).submit(&WordCount, inputs);

        assert_eq!(
            output.results,
            vec![("a".to_string(), 3), ("b".to_string(), 2), ("c".to_string(), 1)]
        );
        assert_eq!(output.counters.records_read, 3);
        assert_eq!(output.counters.map_outputs, 6);
        assert_eq!(output.counters.reduce_groups, 3);
        assert_eq!(output.counters.reduce_outputs, 3);
    }

    #[test]
    fn test_combine_runs_per_partition() {
        let inputs = vec!["a a a a", "a a"];
        let output = LocalExecutor::new(1).submit(&WordCount, inputs);

        assert_eq!(output.results, vec![("a".to_string(), 6)]);
        assert_eq!(output.counters.map_outputs, 6);
        assert_eq!(output.counters.combine_outputs, 1);
    }

    #[test]
    fn test_failed_record_emits_nothing() {
        let inputs = vec!["x y", "x bad y", "y"];
        let output = LocalExecutor::new(3).submit(&WordCount, inputs);

        assert_eq!(output.results, vec![("x".to_string(), 1), ("y".to_string(), 2)]);
        assert_eq!(output.counters.records_read, 3);
        assert_eq!(output.counters.records_skipped, 1);
    }

    #[test]
    fn test_results_independent_of_partitioning() {
        let inputs = vec!["the cat", "the dog", "a cat", "the end", "odd"];
        let expected = LocalExecutor::new(1).submit(&WordCount, inputs.clone()).results;

        for partitions in [2, 3, 5, 16] {
            let output = LocalExecutor::new(partitions).submit(&WordCount, inputs.clone());
            assert_eq!(output.results, expected, "partitions={partitions}");
            assert_eq!(output.counters.anomaly("odd_word"), 1);
        }
    }

    #[test]
    fn test_empty_input() {
        let output = LocalExecutor::new(4).submit(&WordCount, Vec::new());
        assert!(output.results.is_empty());
        assert_eq!(output.counters, CounterSnapshot::default());
    }
}
