use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::context::MergePolicy;
use crate::ngram::MAX_ORDER;

const APP_NAME: &str = "ngram-lm";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Longest n-gram extracted from a document.
    pub max_order: usize,
    /// Phrases whose corpus count is at or below this are pruned.
    pub prune_threshold: u64,
    /// Map-side batches; each one is combined locally before the shuffle.
    pub partitions: usize,
    /// Number of count-table part files written by the counting stage.
    pub reduce_tasks: usize,
    /// Element holding the document body in each corpus record.
    pub text_field: String,
    pub merge_policy: MergePolicy,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory the sharded table is flushed under.
    pub endpoint: PathBuf,
    pub table: String,
    pub column_family: String,
    pub shards: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_order: MAX_ORDER,
            prune_threshold: 2,
            partitions: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            reduce_tasks: 4,
            text_field: "text".to_string(),
            merge_policy: MergePolicy::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let endpoint = dirs::data_local_dir()
            .map(|dir| dir.join(APP_NAME))
            .unwrap_or_else(|| PathBuf::from(APP_NAME));

        Self {
            endpoint,
            table: "lmdb".to_string(),
            column_family: "data".to_string(),
            shards: 16,
        }
    }
}

impl Config {
    /// Load from `path`, or from the per-user confy location when no path is given.
    ///
    /// A missing file is created with the defaults. A file that fails to
    /// parse is left untouched and the defaults are used for this run.
    pub fn load(path: Option<&Path>) -> Result<Self, confy::ConfyError> {
        let loaded = match path {
            Some(path) => confy::load_path(path),
            None => confy::load(APP_NAME, Some("config")),
        };

        match loaded {
            Ok(config) => Ok(Self::normalized(config)),
            Err(err) => {
                tracing::warn!("Failed to load config, using defaults: {err}");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: Option<&Path>) -> Result<(), confy::ConfyError> {
        match path {
            Some(path) => confy::store_path(path, self),
            None => confy::store(APP_NAME, Some("config"), self),
        }
    }

    /// Clamp sizes a hand-edited config file may have zeroed.
    fn normalized(mut config: Self) -> Self {
        config.max_order = config.max_order.clamp(1, MAX_ORDER);
        config.partitions = config.partitions.max(1);
        config.reduce_tasks = config.reduce_tasks.max(1);
        config.store.shards = config.store.shards.max(1);
        config
    }
}
