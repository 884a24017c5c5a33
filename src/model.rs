//! Model stage job: count table rows to ranked model entries.

use crate::context::{ContextSplitter, ContextValue, MergePolicy, PartialContextMerger};
use crate::count_table;
use crate::error::RecordError;
use crate::executor::{JobCounters, MapReduceJob};
use crate::ranker::{ContextRanker, ModelEntry};

/// Splits `phrase<TAB>count` rows by context, merges locally, ranks per context.
pub struct LanguageModelJob {
    merger: PartialContextMerger,
    ranker: ContextRanker,
}

impl LanguageModelJob {
    pub fn new(top_n: usize, policy: MergePolicy) -> Self {
        Self {
            merger: PartialContextMerger::new(policy),
            ranker: ContextRanker::new(top_n, policy),
        }
    }
}

impl MapReduceJob for LanguageModelJob {
    type Input = String;
    type Key = String;
    type Value = ContextValue;
    type Output = ModelEntry;

    fn name(&self) -> &'static str {
        "language-model"
    }

    fn map(
        &self,
        line: String,
        emit: &mut dyn FnMut(String, ContextValue),
    ) -> Result<(), RecordError> {
        let ngram = count_table::parse_line(&line)?;
        ContextSplitter::split(ngram, emit);
        Ok(())
    }

    fn combine(&self, _context: &String, values: Vec<ContextValue>) -> Vec<ContextValue> {
        self.merger.merge(values)
    }

    fn reduce(
        &self,
        context: &String,
        values: Vec<ContextValue>,
        counters: &JobCounters,
    ) -> Option<ModelEntry> {
        self.ranker.rank(context, values, counters)
    }
}
