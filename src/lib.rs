//! ngram-lm - builds a next-word prediction model from a text corpus.
//!
//! # Overview
//!
//! Two batch stages, each a map/combine/reduce job run by an [`Executor`]:
//!
//! ```text
//! ┌─────────────────┐
//! │  Corpus records │ ← one markup record per line
//! └────────┬────────┘
//!          │  DocumentParser, NgramExtractor (count.rs)
//!          ▼
//! ┌─────────────────┐
//! │  Count table    │ ← phrase<TAB>count, counts > threshold (count_table.rs)
//! └────────┬────────┘
//!          │  ContextSplitter, PartialContextMerger (context.rs)
//!          ▼
//! ┌─────────────────┐
//! │  ContextRanker  │ ← top-N continuations per context (ranker.rs)
//! └────────┬────────┘
//!          │  ModelStoreWriter (store.rs)
//!          ▼
//! ┌─────────────────┐
//! │  Model table    │ ← row = context, column = word, value = probability
//! └─────────────────┘
//! ```
//!
//! # Modules
//!
//! - `document.rs`: text extraction and normalization
//! - `ngram.rs`: sliding-window phrase extraction
//! - `count.rs`: the counting job and its prune rule
//! - `count_table.rs`: line readers and the part-file table format
//! - `context.rs`: context/continuation split and partial merge
//! - `ranker.rs`: probability ranking per context
//! - `model.rs`: the model job
//! - `store.rs`: key-value sink and the sharded local table
//! - `executor.rs`: job trait and the rayon-backed local executor
//! - `pipeline.rs`: stage runners used by the CLI
//!
//! [`Executor`]: executor::Executor

pub mod config;
pub mod context;
pub mod count;
pub mod count_table;
pub mod document;
pub mod error;
pub mod executor;
pub mod model;
pub mod ngram;
pub mod pipeline;
pub mod ranker;
pub mod store;
