//! Counting stage: corpus records to a pruned n-gram count table.

use crate::document::DocumentParser;
use crate::error::RecordError;
use crate::executor::{JobCounters, MapReduceJob};
use crate::ngram::NgramExtractor;

/// Merge two partial counts of the same phrase.
///
/// Associative and commutative, so partial sums can be taken per partition
/// and re-merged in any grouping.
pub fn merge_counts(a: u64, b: u64) -> u64 {
    a + b
}

/// Parses records, extracts n-grams, and sums their occurrences corpus-wide.
#[derive(Debug, Clone)]
pub struct NgramCountJob {
    parser: DocumentParser,
    extractor: NgramExtractor,
    prune_threshold: u64,
}

impl NgramCountJob {
    pub fn new(parser: DocumentParser, extractor: NgramExtractor, prune_threshold: u64) -> Self {
        Self {
            parser,
            extractor,
            prune_threshold,
        }
    }
}

impl MapReduceJob for NgramCountJob {
    type Input = String;
    type Key = String;
    type Value = u64;
    type Output = u64;

    fn name(&self) -> &'static str {
        "ngram-count"
    }

    fn map(&self, record: String, emit: &mut dyn FnMut(String, u64)) -> Result<(), RecordError> {
        let text = self.parser.parse(&record)?;
        for phrase in self.extractor.extract(&text) {
            emit(phrase, 1);
        }
        Ok(())
    }

    fn combine(&self, _phrase: &String, counts: Vec<u64>) -> Vec<u64> {
        vec![counts.into_iter().fold(0, merge_counts)]
    }

    fn reduce(&self, _phrase: &String, counts: Vec<u64>, _counters: &JobCounters) -> Option<u64> {
        let total = counts.into_iter().fold(0, merge_counts);
        (total > self.prune_threshold).then_some(total)
    }
}
