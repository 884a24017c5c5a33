//! Line-oriented record files and the n-gram count table.
//!
//! Both stages read their input the same way: the input path is either a
//! single file or a directory of files, and every non-empty line is one
//! record. Inside a directory, files whose names start with `_` or `.` are
//! ignored (markers, editor droppings), and the rest are read in name order.
//!
//! # Count Table Format
//!
//! The counting stage hands its result to the model stage as plain text:
//! ```text
//! the cat<TAB>57
//! the cat sat<TAB>12
//! ```
//!
//! Written as a directory of `part-r-NNNNN` files, phrases hash-partitioned
//! across them and sorted within each one, followed by an empty `_SUCCESS`
//! marker once every part is complete.

use ahash::RandomState;
use std::fs::{self, File};
use std::hash::BuildHasher;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, RecordError, Result};

pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Fixed seeds so a phrase lands in the same part file on every run.
const PARTITION_SEEDS: (u64, u64, u64, u64) = (
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

/// One row of the count table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NGram {
    pub phrase: String,
    pub count: u64,
}

/// Parse a `phrase<TAB>count` line. Fields after the count are ignored.
pub fn parse_line(line: &str) -> std::result::Result<NGram, RecordError> {
    let malformed = || RecordError::MalformedCount(line.to_string());

    let mut fields = line.trim_end_matches(['\r', '\n']).split('\t');
    let phrase = fields.next().filter(|p| !p.trim().is_empty()).ok_or_else(malformed)?;
    let count = fields
        .next()
        .and_then(|c| c.trim().parse::<u64>().ok())
        .ok_or_else(malformed)?;

    Ok(NGram {
        phrase: phrase.to_string(),
        count,
    })
}

/// Files making up an input path, in read order.
pub fn input_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(PipelineError::MissingInput(path.to_path_buf()));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('_') || name.starts_with('.') || !entry.file_type()?.is_file() {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();

    Ok(files)
}

/// Read every non-empty line under `path` as one record.
pub fn read_records(path: &Path) -> Result<Vec<String>> {
    let mut records = Vec::new();

    for file in input_files(path)? {
        let mut reader = BufReader::new(File::open(&file)?);
        let mut buf = Vec::new();
        let before = records.len();

        while reader.read_until(b'\n', &mut buf)? > 0 {
            {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                if !line.trim().is_empty() {
                    records.push(line.to_string());
                }
            }
            buf.clear();
        }

        tracing::debug!("Read {} records from {}", records.len() - before, file.display());
    }

    Ok(records)
}

/// Part file a phrase belongs to.
pub fn partition_for(phrase: &str, reduce_tasks: usize) -> usize {
    let (k0, k1, k2, k3) = PARTITION_SEEDS;
    let hash = RandomState::with_seeds(k0, k1, k2, k3).hash_one(phrase);
    (hash % reduce_tasks.max(1) as u64) as usize
}

/// Write rows as a count table directory.
///
/// `rows` should already be sorted by phrase; each part keeps that order.
/// Parts and the `_SUCCESS` marker are written into a staging directory
/// next to `dir`, which is renamed into place once complete. A failed write
/// leaves `dir` absent, so the run can simply be repeated.
///
/// # Errors
/// Fails with [`PipelineError::OutputExists`] when `dir` is already there,
/// so a previous run is never overwritten.
pub fn write_table(dir: &Path, rows: &[(String, u64)], reduce_tasks: usize) -> Result<Vec<PathBuf>> {
    if dir.exists() {
        return Err(PipelineError::OutputExists(dir.to_path_buf()));
    }
    let parent = dir
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let staging = tempfile::Builder::new().prefix(".staging-").tempdir_in(parent)?;

    let reduce_tasks = reduce_tasks.max(1);
    let mut parts: Vec<Vec<&(String, u64)>> = vec![Vec::new(); reduce_tasks];
    for row in rows {
        parts[partition_for(&row.0, reduce_tasks)].push(row);
    }

    let mut names = Vec::with_capacity(reduce_tasks);
    for (index, part) in parts.iter().enumerate() {
        let name = format!("part-r-{index:05}");
        let mut writer = BufWriter::new(File::create(staging.path().join(&name))?);
        for (phrase, count) in part {
            writeln!(writer, "{phrase}\t{count}")?;
        }
        writer.flush()?;
        names.push(name);
    }
    File::create(staging.path().join(SUCCESS_MARKER))?;

    if dir.exists() {
        return Err(PipelineError::OutputExists(dir.to_path_buf()));
    }
    fs::rename(staging.path(), dir)?;

    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}
