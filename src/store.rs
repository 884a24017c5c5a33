//! Model table sink.
//!
//! The model stage writes through the narrow [`ModelStore`] trait:
//! `put(row_key, column, value)` under one fixed column family. Row keys are
//! unique per context, so concurrent writers never touch the same row and no
//! coordination beyond per-shard locking is needed.
//!
//! [`ShardedStore`] is the local implementation: rows are hash-sharded over
//! a fixed number of in-memory shards and flushed to one text file per
//! shard:
//!
//! ```text
//! <endpoint>/<table>/shard-00003.tsv
//! the cat<TAB>data:sat<TAB>0.4
//! ```

use ahash::{AHashMap, AHashSet, RandomState};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::hash::BuildHasher;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::StoreError;
use crate::ranker::ModelEntry;

const SHARD_SEEDS: (u64, u64, u64, u64) = (
    0x9e37_79b9_7f4a_7c15,
    0xbf58_476d_1ce4_e5b9,
    0x94d0_49bb_1331_11eb,
    0x2545_f491_4f6c_dd1d,
);

/// Key-value sink for model rows.
pub trait ModelStore: Send + Sync {
    /// Column family every cell is written under.
    fn column_family(&self) -> &str;

    /// Write one cell.
    fn put(&self, row_key: &[u8], column: &[u8], value: &[u8]) -> Result<(), StoreError>;
}

type Row = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory table split into independently locked shards.
pub struct ShardedStore {
    column_family: String,
    shards: Vec<RwLock<AHashMap<Vec<u8>, Row>>>,
    hasher: RandomState,
}

impl ShardedStore {
    pub fn new(column_family: impl Into<String>, shards: usize) -> Self {
        let (k0, k1, k2, k3) = SHARD_SEEDS;
        Self {
            column_family: column_family.into(),
            shards: (0..shards.max(1)).map(|_| RwLock::new(AHashMap::new())).collect(),
            hasher: RandomState::with_seeds(k0, k1, k2, k3),
        }
    }

    fn shard_index(&self, row_key: &[u8]) -> usize {
        (self.hasher.hash_one(row_key) % self.shards.len() as u64) as usize
    }

    pub fn get(&self, row_key: &[u8], column: &[u8]) -> Option<Vec<u8>> {
        self.shards[self.shard_index(row_key)]
            .read()
            .get(row_key)
            .and_then(|row| row.get(column).cloned())
    }

    /// All cells of a row, ordered by column.
    pub fn row(&self, row_key: &[u8]) -> Option<Vec<(Vec<u8>, Vec<u8>)>> {
        self.shards[self.shard_index(row_key)]
            .read()
            .get(row_key)
            .map(|row| row.iter().map(|(c, v)| (c.clone(), v.clone())).collect())
    }

    pub fn row_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Write every shard under `<endpoint>/<table>/`.
    ///
    /// Each shard file is written to a temporary file first and renamed into
    /// place, so a reader never sees a half-written shard. Shard files left by
    /// an earlier flush with more shards are removed afterwards.
    pub fn flush(&self, endpoint: &Path, table: &str) -> Result<Vec<PathBuf>, StoreError> {
        let dir = endpoint.join(table);
        fs::create_dir_all(&dir)?;

        let paths = self
            .shards
            .par_iter()
            .enumerate()
            .map(|(index, shard)| -> Result<PathBuf, StoreError> {
                let path = dir.join(format!("shard-{index:05}.tsv"));
                let shard = shard.read();

                let mut rows: Vec<(&Vec<u8>, &Row)> = shard.iter().collect();
                rows.sort_by(|a, b| a.0.cmp(b.0));

                let temp_file = NamedTempFile::new_in(&dir)?;
                {
                    let mut writer = BufWriter::new(&temp_file);
                    for (row_key, row) in rows {
                        for (column, value) in row {
                            writeln!(
                                writer,
                                "{}\t{}:{}\t{}",
                                String::from_utf8_lossy(row_key),
                                self.column_family,
                                String::from_utf8_lossy(column),
                                String::from_utf8_lossy(value)
                            )?;
                        }
                    }
                    writer.flush()?;
                }

                temp_file.persist(&path).map_err(|e| e.error)?;
                Ok(path)
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        remove_stale_shards(&dir, self.shards.len())?;
        Ok(paths)
    }
}

fn shard_file_index(name: &str) -> Option<usize> {
    name.strip_prefix("shard-")?.strip_suffix(".tsv")?.parse().ok()
}

fn remove_stale_shards(dir: &Path, shards: usize) -> Result<(), StoreError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let stale = entry
            .file_name()
            .to_str()
            .and_then(shard_file_index)
            .is_some_and(|index| index >= shards);
        if stale {
            tracing::debug!("Removing stale shard {}", entry.path().display());
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

impl ModelStore for ShardedStore {
    fn column_family(&self) -> &str {
        &self.column_family
    }

    fn put(&self, row_key: &[u8], column: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if row_key.is_empty() {
            return Err(StoreError::EmptyRowKey);
        }
        if column.is_empty() {
            return Err(StoreError::EmptyColumn);
        }

        self.shards[self.shard_index(row_key)]
            .write()
            .entry(row_key.to_vec())
            .or_default()
            .insert(column.to_vec(), value.to_vec());
        Ok(())
    }
}

/// Totals reported by [`ModelStoreWriter::write_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows: usize,
    pub cells: usize,
}

/// Turns model entries into store rows.
pub struct ModelStoreWriter<'a, S: ModelStore> {
    store: &'a S,
}

impl<'a, S: ModelStore> ModelStoreWriter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Write one row keyed by the context, one column per predicted word.
    ///
    /// Predictions are best first, so when a word repeats (concatenated
    /// duplicates) its first, highest probability is the one stored.
    /// Returns the number of cells written; an entry with no predictions
    /// writes nothing.
    pub fn write(&self, entry: &ModelEntry) -> Result<usize, StoreError> {
        let row_key = entry.context.as_bytes();
        let mut written: AHashSet<&str> = AHashSet::with_capacity(entry.predictions.len());

        for prediction in &entry.predictions {
            if !written.insert(prediction.word.as_str()) {
                continue;
            }
            self.store.put(
                row_key,
                prediction.word.as_bytes(),
                prediction.probability_string().as_bytes(),
            )?;
        }
        Ok(written.len())
    }

    /// Write entries in parallel.
    pub fn write_all(&self, entries: &[ModelEntry]) -> Result<WriteSummary, StoreError> {
        let cells: Vec<usize> = entries
            .par_iter()
            .map(|entry| self.write(entry))
            .collect::<Result<_, _>>()?;

        Ok(WriteSummary {
            rows: cells.iter().filter(|&&n| n > 0).count(),
            cells: cells.iter().sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::Prediction;

    fn entry(context: &str, predictions: &[(&str, f64)]) -> ModelEntry {
        ModelEntry {
            context: context.to_string(),
            predictions: predictions
                .iter()
                .map(|(word, probability)| Prediction {
                    word: word.to_string(),
                    probability: *probability,
                })
                .collect(),
        }
    }

    #[test]
    fn test_put_and_get() {
        let store = ShardedStore::new("data", 4);
        store.put(b"the", b"cat", b"0.4").unwrap();
        store.put(b"the", b"dog", b"0.3").unwrap();

        assert_eq!(store.get(b"the", b"cat"), Some(b"0.4".to_vec()));
        assert_eq!(store.get(b"the", b"cow"), None);
        assert_eq!(store.row_count(), 1);
        assert_eq!(store.column_family(), "data");
    }

    #[test]
    fn test_put_rejects_empty_keys() {
        let store = ShardedStore::new("data", 1);
        assert!(matches!(store.put(b"", b"a", b"1"), Err(StoreError::EmptyRowKey)));
        assert!(matches!(store.put(b"a", b"", b"1"), Err(StoreError::EmptyColumn)));
    }

    #[test]
    fn test_writer_rows_and_cells() {
        let store = ShardedStore::new("data", 8);
        let entries = vec![
            entry("the", &[("cat", 0.4), ("dog", 0.3)]),
            entry("the cat", &[("sat", 1.0)]),
            entry("empty", &[]),
        ];

        let summary = ModelStoreWriter::new(&store).write_all(&entries).unwrap();
        assert_eq!(summary, WriteSummary { rows: 2, cells: 3 });
        assert_eq!(store.row_count(), 2);
        assert_eq!(
            store.row(b"the").unwrap(),
            vec![
                (b"cat".to_vec(), b"0.4".to_vec()),
                (b"dog".to_vec(), b"0.3".to_vec()),
            ]
        );
        assert_eq!(store.get(b"the cat", b"sat"), Some(b"1".to_vec()));
        assert!(store.row(b"empty").is_none());
    }

    #[test]
    fn test_repeated_word_keeps_best_probability() {
        let store = ShardedStore::new("data", 2);
        let summary = ModelStoreWriter::new(&store)
            .write_all(&[entry("the", &[("dog", 0.5), ("cat", 0.4), ("cat", 0.3)])])
            .unwrap();

        assert_eq!(summary, WriteSummary { rows: 1, cells: 2 });
        assert_eq!(store.get(b"the", b"cat"), Some(b"0.4".to_vec()));
        assert_eq!(store.row(b"the").unwrap().len(), 2);
    }

    #[test]
    fn test_flush_removes_shards_from_a_wider_table() {
        let dir = tempfile::tempdir().unwrap();

        let wide = ShardedStore::new("data", 4);
        wide.put(b"a", b"b", b"1").unwrap();
        wide.flush(dir.path(), "lmdb").unwrap();

        let narrow = ShardedStore::new("data", 2);
        narrow.put(b"c", b"d", b"1").unwrap();
        narrow.flush(dir.path(), "lmdb").unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path().join("lmdb"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["shard-00000.tsv", "shard-00001.tsv"]);
    }

    #[test]
    fn test_flush_writes_every_shard() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardedStore::new("data", 3);
        ModelStoreWriter::new(&store)
            .write_all(&[entry("a", &[("b", 0.5)]), entry("c d", &[("e", 0.25)])])
            .unwrap();

        let paths = store.flush(dir.path(), "lmdb").unwrap();
        assert_eq!(paths.len(), 3);

        let mut lines: Vec<String> = paths
            .iter()
            .flat_map(|path| {
                fs::read_to_string(path)
                    .unwrap()
                    .lines()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        lines.sort();
        assert_eq!(lines, vec!["a\tdata:b\t0.5", "c d\tdata:e\t0.25"]);
    }
}
