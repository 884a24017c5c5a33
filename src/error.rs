//! Error types for the counting and model stages.

use std::path::PathBuf;
use thiserror::Error;

/// Failure confined to a single input record.
///
/// The executor logs these, bumps the skipped-records counter and moves on
/// to the next record. Nothing is emitted for the failed record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The record is not well-formed markup.
    #[error("malformed markup: {0}")]
    Markup(#[from] quick_xml::Error),

    /// The record has no element carrying the document text.
    #[error("record has no <{0}> element")]
    MissingTextField(String),

    /// The text element was opened but the record ended before it closed.
    #[error("<{0}> element is never closed")]
    UnclosedTextField(String),

    /// A count-table line that is not `phrase<TAB>count`.
    #[error("malformed count record {0:?}")]
    MalformedCount(String),
}

/// Failure of the key-value sink.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("row key must not be empty")]
    EmptyRowKey,

    #[error("column qualifier must not be empty")]
    EmptyColumn,
}

/// Failure that aborts a whole stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output path {} already exists", .0.display())]
    OutputExists(PathBuf),

    #[error("input path {} does not exist", .0.display())]
    MissingInput(PathBuf),

    #[error("{0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
