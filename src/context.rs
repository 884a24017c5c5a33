//! Reshaping n-gram counts into (context, continuation, count) triples.
//!
//! Every count-table row `phrase -> count` is emitted twice:
//!
//! ```text
//! "the cat sat" 12 -> "the cat sat" : Base(12)
//!                  -> "the cat"     : Continuations[("sat", 12)]
//! ```
//!
//! Grouping by key then brings together, for one context, its own corpus
//! count (the denominator) and every word observed after it, in a single
//! keyed pass with no join.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::count_table::NGram;

/// How continuation pairs for the same word are combined.
///
/// `Concatenate` keeps every pair as it arrives and lets each one be ranked
/// on its own. `Sum` adds up pairs that share a word. The two only differ
/// when the count table holds the same phrase more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    #[default]
    Concatenate,
    Sum,
}

/// A word observed after a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub word: String,
    pub count: u64,
}

impl Continuation {
    pub fn new(word: impl Into<String>, count: u64) -> Self {
        Self {
            word: word.into(),
            count,
        }
    }
}

/// Value grouped under a context key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextValue {
    /// Corpus count of the context phrase itself.
    Base(u64),
    /// Words that followed the context, with their counts.
    Continuations(Vec<Continuation>),
}

pub struct ContextSplitter;

impl ContextSplitter {
    /// Emit the base record for `ngram` and, for multi-word phrases, the
    /// continuation record keyed by the phrase minus its last word.
    pub fn split(ngram: NGram, emit: &mut dyn FnMut(String, ContextValue)) {
        let NGram { phrase, count } = ngram;

        if let Some((context, last)) = phrase.rsplit_once(' ') {
            if !context.trim().is_empty() && !last.is_empty() {
                emit(
                    context.to_string(),
                    ContextValue::Continuations(vec![Continuation::new(last, count)]),
                );
            }
        }

        emit(phrase, ContextValue::Base(count));
    }
}

/// Partition-local merge of the values seen for one context.
#[derive(Debug, Clone, Copy)]
pub struct PartialContextMerger {
    policy: MergePolicy,
}

impl PartialContextMerger {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    /// Forward base values untouched and fold all continuation values into one.
    pub fn merge(&self, values: Vec<ContextValue>) -> Vec<ContextValue> {
        let mut merged = Vec::new();
        let mut pairs = Vec::new();

        for value in values {
            match value {
                ContextValue::Base(_) => merged.push(value),
                ContextValue::Continuations(mut continuations) => pairs.append(&mut continuations),
            }
        }

        if !pairs.is_empty() {
            let pairs = match self.policy {
                MergePolicy::Concatenate => pairs,
                MergePolicy::Sum => sum_by_word(pairs),
            };
            merged.push(ContextValue::Continuations(pairs));
        }

        merged
    }
}

/// Add up the counts of pairs sharing a word. Output is sorted by word.
pub fn sum_by_word(pairs: Vec<Continuation>) -> Vec<Continuation> {
    let mut totals: AHashMap<String, u64> = AHashMap::with_capacity(pairs.len());
    for Continuation { word, count } in pairs {
        *totals.entry(word).or_insert(0) += count;
    }

    let mut summed: Vec<Continuation> = totals
        .into_iter()
        .map(|(word, count)| Continuation { word, count })
        .collect();
    summed.sort_by(|a, b| a.word.cmp(&b.word));
    summed
}
