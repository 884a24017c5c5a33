// ranker.rs - Conditional probabilities and top-N selection per context
// P(word | context) = count(context word) / count(context)

use std::cmp::Ordering;

use crate::context::{sum_by_word, Continuation, ContextValue, MergePolicy};
use crate::executor::JobCounters;

/// Anomaly: a context had continuations but no positive base count.
pub const MISSING_BASE: &str = "missing_base";
/// Anomaly: more than one base count reached the same context.
pub const DUPLICATE_BASE: &str = "duplicate_base";

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub word: String,
    pub probability: f64,
}

impl Prediction {
    /// Decimal form stored in the model table.
    pub fn probability_string(&self) -> String {
        self.probability.to_string()
    }
}

/// One model row: a context and its most likely next words, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEntry {
    pub context: String,
    pub predictions: Vec<Prediction>,
}

/// Highest probability first; equal probabilities in word order.
fn compare_predictions(a: &Prediction, b: &Prediction) -> Ordering {
    match b.probability.total_cmp(&a.probability) {
        Ordering::Equal => a.word.cmp(&b.word),
        other => other,
    }
}

pub struct ContextRanker {
    top_n: usize,
    policy: MergePolicy,
}

impl ContextRanker {
    pub fn new(top_n: usize, policy: MergePolicy) -> Self {
        Self { top_n, policy }
    }

    /// Rank every continuation gathered for `context`.
    ///
    /// Values may arrive in any order and from any number of partitions.
    /// Returns `None` when there is nothing to rank, or when the context has
    /// no usable base count (recorded as a [`MISSING_BASE`] anomaly instead
    /// of producing an infinite probability).
    pub fn rank(
        &self,
        context: &str,
        values: Vec<ContextValue>,
        counters: &JobCounters,
    ) -> Option<ModelEntry> {
        let mut bases = Vec::new();
        let mut pairs: Vec<Continuation> = Vec::new();

        for value in values {
            match value {
                ContextValue::Base(count) => bases.push(count),
                ContextValue::Continuations(mut continuations) => pairs.append(&mut continuations),
            }
        }

        if pairs.is_empty() {
            return None;
        }

        if bases.len() > 1 {
            counters.anomaly(DUPLICATE_BASE);
            tracing::debug!(context, bases = ?bases, "Context has several base counts");
        }

        let base = match self.policy {
            MergePolicy::Concatenate => bases.iter().copied().max(),
            MergePolicy::Sum => (!bases.is_empty()).then(|| bases.iter().sum::<u64>()),
        };
        let base = match base {
            Some(base) if base > 0 => base as f64,
            _ => {
                counters.anomaly(MISSING_BASE);
                tracing::debug!(context, "Skipping context without a base count");
                return None;
            }
        };

        let pairs = match self.policy {
            MergePolicy::Concatenate => pairs,
            MergePolicy::Sum => sum_by_word(pairs),
        };

        let mut predictions: Vec<Prediction> = pairs
            .into_iter()
            .map(|Continuation { word, count }| Prediction {
                word,
                probability: count as f64 / base,
            })
            .collect();

        predictions.sort_by(compare_predictions);
        predictions.truncate(self.top_n);

        if predictions.is_empty() {
            return None;
        }

        Some(ModelEntry {
            context: context.to_string(),
            predictions,
        })
    }
}
