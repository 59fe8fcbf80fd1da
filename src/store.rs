//! Call-record storage.
//!
//! A record is addressed by `(fixture name, 1-based index)` and stored under
//! `{name}-{index:03}.json`. The store only moves canonical text around; the
//! fixture state machine decides when writing is allowed.

use crate::diff::render_record_diff;
use crate::error::{Error, Result};
use crate::record::CallRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const RECORD_EXTENSION: &str = ".json";

/// Identity of one stored call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    name: String,
    index: u32,
}

impl RecordKey {
    /// `index` is 1-based; zero is rejected, as is a name that
    /// [`validate_fixture_name`] refuses.
    pub fn new(name: &str, index: u32) -> Result<Self> {
        validate_fixture_name(name)?;
        if index == 0 {
            return Err(Error::misuse(format!(
                "call record indices start at 1 (fixture {name})"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn index(&self) -> u32 {
        self.index
    }

    pub fn file_name(&self) -> String {
        format!("{}-{:03}{RECORD_EXTENSION}", self.name, self.index)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Checks that a fixture name can be used verbatim in a record file name.
///
/// Only ASCII letters, digits, `-` and `_` are allowed. Names are never
/// rewritten, so two distinct fixtures can not end up sharing records.
pub fn validate_fixture_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::misuse("fixture name must not be empty"));
    }
    match name
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_'))
    {
        Some(ch) => Err(Error::misuse(format!(
            "fixture name {name:?} contains {ch:?}; use ASCII letters, digits, '-' or '_'"
        ))),
        None => Ok(()),
    }
}

/// Parses a stored file name back into its index, if it belongs to `name`.
///
/// Only canonical names count: `div-001.json` is index 1 of `div`, while
/// `div-01.json` and `div-extra-001.json` are not records of `div`.
pub fn parse_record_file_name(name: &str, file_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(name)?.strip_prefix('-')?;
    let digits = rest.strip_suffix(RECORD_EXTENSION)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index: u32 = digits.parse().ok()?;
    (index > 0 && format!("{index:03}") == digits).then_some(index)
}

/// Result of proposing new record content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// No previous content existed.
    Created,
    /// Previous content was byte-identical; nothing was written.
    Unchanged,
    /// Previous content was replaced; `diff` is stored vs written.
    Updated { diff: String },
}

/// Durable storage for call records.
///
/// Implementors provide raw text access; loading, validation and the
/// compare-before-write protocol are provided on top.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Raw stored text, `None` when absent.
    async fn read(&self, key: &RecordKey) -> Result<Option<String>>;

    /// Replace the stored text. Idempotent.
    async fn write(&self, key: &RecordKey, contents: &str) -> Result<()>;

    /// Indices stored for `name`, ascending.
    async fn list_indices(&self, name: &str) -> Result<Vec<u32>>;

    /// Delete a record. Returns whether anything was removed.
    async fn remove(&self, key: &RecordKey) -> Result<bool>;

    /// Where records live, for diagnostics.
    fn describe(&self) -> String;

    /// Loads and validates a record.
    ///
    /// Malformed content is reported and treated as absent so that the
    /// record can be recreated.
    async fn load(&self, key: &RecordKey) -> Result<Option<CallRecord>> {
        let Some(text) = self.read(key).await? else {
            return Ok(None);
        };
        match CallRecord::parse(&key.file_name(), &text) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(
                    store = %self.describe(),
                    record = %key,
                    error = %err,
                    "Ignoring malformed call record"
                );
                Ok(None)
            }
        }
    }

    /// Writes `record` as canonical text, comparing against previous content.
    async fn save(&self, key: &RecordKey, record: &CallRecord) -> Result<WriteOutcome> {
        let proposed = record.to_canonical_string()?;
        let previous = self.read(key).await?;
        let outcome = match previous.as_deref() {
            None => WriteOutcome::Created,
            Some(previous) if previous == proposed => return Ok(WriteOutcome::Unchanged),
            Some(previous) => WriteOutcome::Updated {
                diff: render_record_diff(&key.file_name(), Some(previous), &proposed),
            },
        };
        self.write(key, &proposed).await?;
        Ok(outcome)
    }
}

/// Records stored as files in one folder.
#[derive(Debug, Clone)]
pub struct FsRecordStore {
    dir: PathBuf,
}

impl FsRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &RecordKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Every fixture name with at least one record, with its indices.
    pub fn list_all(&self) -> Result<BTreeMap<String, Vec<u32>>> {
        let mut out: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for file_name in self.file_names()? {
            let Some(stem) = file_name.strip_suffix(RECORD_EXTENSION) else {
                continue;
            };
            let Some((name, _)) = stem.rsplit_once('-') else {
                continue;
            };
            if let Some(index) = parse_record_file_name(name, &file_name) {
                out.entry(name.to_string()).or_default().push(index);
            }
        }
        for indices in out.values_mut() {
            indices.sort_unstable();
        }
        Ok(out)
    }

    fn file_names(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(Error::store(format!(
                    "Failed to list records in {}: {err}",
                    self.dir.display()
                )));
            }
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl RecordStore for FsRecordStore {
    async fn read(&self, key: &RecordKey) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                debug!(path = %path.display(), bytes = text.len(), "Read call record");
                Ok(Some(text))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::store(format!(
                "Failed to read call record {}: {err}",
                path.display()
            ))),
        }
    }

    async fn write(&self, key: &RecordKey, contents: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|err| {
            Error::store(format!(
                "Failed to create records dir {}: {err}",
                self.dir.display()
            ))
        })?;

        let path = self.path_for(key);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|err| {
            Error::store(format!(
                "Failed to persist call record {}: {}",
                path.display(),
                err.error
            ))
        })?;
        debug!(path = %path.display(), bytes = contents.len(), "Wrote call record");
        Ok(())
    }

    async fn list_indices(&self, name: &str) -> Result<Vec<u32>> {
        validate_fixture_name(name)?;
        let mut indices: Vec<u32> = self
            .file_names()?
            .iter()
            .filter_map(|file_name| parse_record_file_name(name, file_name))
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }

    async fn remove(&self, key: &RecordKey) -> Result<bool> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Error::store(format!(
                "Failed to remove call record {}: {err}",
                path.display()
            ))),
        }
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Records kept in memory, keyed by file name.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds raw text, bypassing validation (useful to plant malformed records).
    pub fn insert_raw(&self, key: &RecordKey, contents: impl Into<String>) -> Result<()> {
        self.lock()?.insert(key.file_name(), contents.into());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().map_or(0, |files| files.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.files
            .lock()
            .map_err(|_| Error::store("memory record store lock poisoned"))
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn read(&self, key: &RecordKey) -> Result<Option<String>> {
        Ok(self.lock()?.get(&key.file_name()).cloned())
    }

    async fn write(&self, key: &RecordKey, contents: &str) -> Result<()> {
        self.lock()?.insert(key.file_name(), contents.to_string());
        Ok(())
    }

    async fn list_indices(&self, name: &str) -> Result<Vec<u32>> {
        validate_fixture_name(name)?;
        let mut indices: Vec<u32> = self
            .lock()?
            .keys()
            .filter_map(|file_name| parse_record_file_name(name, file_name))
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }

    async fn remove(&self, key: &RecordKey) -> Result<bool> {
        Ok(self.lock()?.remove(&key.file_name()).is_some())
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}
