//! Durable rate snapshot and append-only history.
//!
//! Both documents are rewritten wholesale through a staged write: the new
//! content goes to `<path>.tmp`, is flushed, then renamed over `<path>`.
//! Readers therefore see either the previous document or the new one, never
//! a partial write.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use valutatrade_common::{format_timestamp, now, parse_timestamp, PairKey, Timestamp};

use crate::config::StoreConfig;
use crate::error::{RatesError, RatesResult};

/// Source label for pairs persisted without attribution.
pub const DEFAULT_SOURCE: &str = "ParserService";

/// Pair to rate mapping produced by sources and merged by the updater.
pub type RateMap = BTreeMap<PairKey, Decimal>;

/// Pair to source name mapping, parallel to a [`RateMap`].
pub type SourceMap = BTreeMap<PairKey, String>;

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

/// Current best-known rate for one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default = "default_source")]
    pub source: String,
}

/// The snapshot document.
///
/// Keys are kept as raw strings so a document written by another tool with
/// an unexpected key still loads.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub pairs: BTreeMap<String, RateRecord>,
    pub last_refresh: Option<String>,
}

impl Snapshot {
    /// Build a snapshot from a parsed document, record by record.
    ///
    /// `last_refresh` is kept whatever state the records are in; records
    /// that do not parse are skipped.
    pub fn from_document(document: &Value) -> Self {
        let last_refresh = document
            .get("last_refresh")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut pairs = BTreeMap::new();
        if let Some(entries) = document.get("pairs").and_then(Value::as_object) {
            for (key, raw) in entries {
                match RateRecord::deserialize(raw) {
                    Ok(record) => {
                        pairs.insert(key.clone(), record);
                    }
                    Err(e) => {
                        warn!(pair = %key, error = %e, "Skipping malformed snapshot record");
                    }
                }
            }
        }

        Self {
            pairs,
            last_refresh,
        }
    }

    /// Look up the record stored under `pair`.
    pub fn get(&self, pair: &PairKey) -> Option<&RateRecord> {
        self.pairs.get(&pair.to_string())
    }

    /// Parsed `last_refresh`, if present and well formed.
    pub fn last_refresh_at(&self) -> Option<Timestamp> {
        self.last_refresh.as_deref().and_then(parse_timestamp)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Source attribution carried in every history entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryMeta {
    pub source_client: String,
}

/// One observed quote. Immutable once written.
///
/// `id` is `FROM_TO_<timestamp>` and is only unique per pair and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub from_currency: String,
    pub to_currency: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
    pub timestamp: String,
    pub source: String,
    #[serde(default)]
    pub meta: HistoryMeta,
}

impl HistoryEntry {
    /// Create an entry for `pair` observed at `timestamp`.
    pub fn new(pair: &PairKey, rate: Decimal, timestamp: &str, source: &str) -> Self {
        Self {
            id: format!("{}_{}", pair, timestamp),
            from_currency: pair.from.to_string(),
            to_currency: pair.to.to_string(),
            rate,
            timestamp: timestamp.to_string(),
            source: source.to_string(),
            meta: HistoryMeta {
                source_client: source.to_string(),
            },
        }
    }
}

/// A fully written temporary file waiting to replace its target.
#[derive(Debug)]
pub struct StagedWrite {
    temp_path: PathBuf,
    target: PathBuf,
}

impl StagedWrite {
    /// Write and flush `contents` next to `target`.
    pub fn stage(target: &Path, contents: &[u8]) -> RatesResult<Self> {
        Self::stage_with(target, |file| {
            file.write_all(contents)?;
            file.sync_all()
        })
    }

    /// Stage by running `write` against the temporary file. A failed write
    /// removes the partial file.
    fn stage_with<F>(target: &Path, write: F) -> RatesResult<Self>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| RatesError::storage(parent, e))?;
        }

        let temp_path = temp_path_for(target);
        let mut file = File::create(&temp_path).map_err(|e| RatesError::storage(&temp_path, e))?;
        if let Err(e) = write(&mut file) {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                warn!(path = %temp_path.display(), error = %cleanup, "Failed to remove partial temp file");
            }
            return Err(RatesError::storage(&temp_path, e));
        }

        Ok(Self {
            temp_path,
            target: target.to_path_buf(),
        })
    }

    /// Path of the staged temporary file.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Atomically replace the target with the staged file.
    pub fn commit(self) -> RatesResult<()> {
        fs::rename(&self.temp_path, &self.target)
            .map_err(|e| RatesError::storage(&self.target, e))
    }
}

fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("document"));
    name.push(".tmp");
    target.with_file_name(name)
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> RatesResult<()> {
    let contents = serde_json::to_vec_pretty(value)?;
    StagedWrite::stage(path, &contents)?.commit()
}

/// Snapshot and history persistence.
#[derive(Debug, Clone)]
pub struct RateStore {
    config: StoreConfig,
}

impl RateStore {
    /// Create a store over the configured files.
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn rates_path(&self) -> &Path {
        &self.config.rates_path
    }

    pub fn history_path(&self) -> &Path {
        &self.config.history_path
    }

    /// Read the snapshot. Missing or unreadable documents yield an empty one.
    pub fn load_snapshot(&self) -> Snapshot {
        let path = self.rates_path();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No readable snapshot");
                return Snapshot::default();
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(document) if document.is_object() => Snapshot::from_document(&document),
            Ok(_) => {
                warn!(path = %path.display(), "Snapshot is not a JSON object, treating as empty");
                Snapshot::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Snapshot is not valid JSON, treating as empty");
                Snapshot::default()
            }
        }
    }

    /// Replace the snapshot with `pairs`, all stamped with one timestamp.
    ///
    /// Pairs without an entry in `sources` are attributed to
    /// [`DEFAULT_SOURCE`]. Returns the timestamp written as `last_refresh`.
    pub fn save_snapshot(&self, pairs: &RateMap, sources: &SourceMap) -> RatesResult<Timestamp> {
        if let Some((pair, rate)) = pairs.iter().find(|(_, rate)| **rate <= Decimal::ZERO) {
            return Err(RatesError::InvalidRate {
                pair: pair.to_string(),
                rate: *rate,
            });
        }

        let refreshed_at = now();
        let stamp = format_timestamp(refreshed_at);

        let records = pairs
            .iter()
            .map(|(pair, rate)| {
                let source = sources.get(pair).cloned().unwrap_or_else(default_source);
                let record = RateRecord {
                    rate: *rate,
                    updated_at: stamp.clone(),
                    source,
                };
                (pair.to_string(), record)
            })
            .collect();

        let snapshot = Snapshot {
            pairs: records,
            last_refresh: Some(stamp),
        };

        write_json_atomic(self.rates_path(), &snapshot)?;
        debug!(path = %self.rates_path().display(), pairs = pairs.len(), "Snapshot written");

        Ok(refreshed_at)
    }

    /// Append one entry per pair, attributed to `source`, and rewrite the
    /// whole history document.
    pub fn append_history(&self, pairs: &RateMap, source: &str) -> RatesResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }

        let stamp = format_timestamp(now());
        let mut history = self.read_history_values();

        for (pair, rate) in pairs {
            let entry = HistoryEntry::new(pair, *rate, &stamp, source);
            history.push(serde_json::to_value(entry)?);
        }

        if let Some(limit) = self.config.history_limit {
            if history.len() > limit {
                let excess = history.len() - limit;
                history.drain(..excess);
                debug!(dropped = excess, limit, "History trimmed to retention limit");
            }
        }

        write_json_atomic(self.history_path(), &history)?;
        debug!(
            path = %self.history_path().display(),
            source,
            appended = pairs.len(),
            total = history.len(),
            "History appended"
        );

        Ok(())
    }

    /// Read every well-formed history entry, oldest first.
    pub fn load_history(&self) -> Vec<HistoryEntry> {
        self.read_history_values()
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect()
    }

    /// Raw history entries. Entries are kept as JSON values so an append
    /// never drops one this version cannot parse.
    fn read_history_values(&self) -> Vec<Value> {
        let path = self.history_path();
        match fs::read(path).map(|bytes| serde_json::from_slice::<Value>(&bytes)) {
            Ok(Ok(Value::Array(entries))) => entries,
            Ok(Ok(_)) | Ok(Err(_)) => {
                warn!(path = %path.display(), "History is not a JSON array, treating as empty");
                Vec::new()
            }
            Err(_) => Vec::new(),
        }
    }
}
