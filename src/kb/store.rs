//! Directory-backed knowledge-base stores

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::record::{KnowledgeBaseRecord, PartSummary};
use crate::error::KbError;

/// Record file extensions, in lookup priority order
const RECORD_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Read-side access to per-part records
pub trait KnowledgeBase: Send + Sync {
    /// Look up a record by exact part identifier
    ///
    /// `Ok(None)` means the part is not in the knowledge base. `Err` means a
    /// record file exists but could not be read or parsed.
    fn load(&self, part_id: &str) -> Result<Option<Arc<KnowledgeBaseRecord>>, KbError>;

    /// All known parts, sorted by identifier
    ///
    /// Records that fail to parse are listed with empty metadata.
    fn list(&self) -> Vec<PartSummary>;

    /// Known identifiers close to `part_id`, best match first
    fn suggest(&self, part_id: &str) -> Vec<String> {
        super::suggest_part_ids(&self.list(), part_id)
    }
}

/// Whether `part_id` can name a file inside the KB directory
fn is_valid_part_id(part_id: &str) -> bool {
    !part_id.is_empty()
        && part_id != "."
        && part_id != ".."
        && !part_id.contains(['/', '\\', '\0'])
}

/// Store that reads the record directory on every call
#[derive(Debug, Clone)]
pub struct KbStore {
    dir: PathBuf,
}

impl KbStore {
    /// Create a store over `dir`; the directory need not exist
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The record directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `part_id`, if one exists
    fn record_path(&self, part_id: &str) -> Option<PathBuf> {
        if !is_valid_part_id(part_id) {
            return None;
        }
        RECORD_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", part_id, ext)))
            .find(|path| path.is_file())
    }

    /// Scan the directory for record files, keyed by part identifier
    fn scan(&self) -> BTreeMap<String, PathBuf> {
        let mut found = BTreeMap::new();

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Knowledge base directory {:?} not readable: {}", self.dir, e);
                return found;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let Some(priority) = RECORD_EXTENSIONS.iter().position(|known| *known == ext) else {
                continue;
            };
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            // When both extensions exist, the higher-priority one wins
            let keep_existing = found
                .get(stem)
                .and_then(|existing: &PathBuf| existing.extension().and_then(|e| e.to_str()))
                .and_then(|existing_ext| RECORD_EXTENSIONS.iter().position(|known| *known == existing_ext))
                .is_some_and(|existing_priority| existing_priority < priority);
            if !keep_existing {
                found.insert(stem.to_string(), path);
            }
        }

        found
    }

    /// Parse every record file in the directory
    fn read_all(&self) -> BTreeMap<String, Result<KnowledgeBaseRecord, KbError>> {
        self.scan()
            .into_iter()
            .map(|(part_id, path)| {
                let record = KnowledgeBaseRecord::read(&part_id, &path);
                (part_id, record)
            })
            .collect()
    }
}

impl KnowledgeBase for KbStore {
    fn load(&self, part_id: &str) -> Result<Option<Arc<KnowledgeBaseRecord>>, KbError> {
        let Some(path) = self.record_path(part_id) else {
            return Ok(None);
        };
        debug!("Loading record for '{}' from {:?}", part_id, path);
        KnowledgeBaseRecord::read(part_id, &path).map(|record| Some(Arc::new(record)))
    }

    fn list(&self) -> Vec<PartSummary> {
        self.read_all()
            .into_iter()
            .map(|(part_id, record)| match record {
                Ok(record) => record.summary(),
                Err(e) => {
                    warn!("Listing '{}' without metadata: {}", part_id, e);
                    PartSummary::unreadable(&part_id)
                }
            })
            .collect()
    }
}

/// Immutable view of the record directory at one point in time
#[derive(Debug, Default)]
struct Snapshot {
    records: BTreeMap<String, Result<Arc<KnowledgeBaseRecord>, String>>,
}

/// Store that serves lookups from an in-memory snapshot
///
/// `reload` builds a complete new snapshot before swapping it in, so readers
/// see either the old or the new record set, never a mix.
#[derive(Debug)]
pub struct CachedKbStore {
    source: KbStore,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl CachedKbStore {
    /// Create a cached store and take the initial snapshot
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let source = KbStore::new(dir);
        let snapshot = Self::build_snapshot(&source);
        Self {
            source,
            snapshot: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Re-read the record directory and replace the snapshot
    pub fn reload(&self) {
        let snapshot = Arc::new(Self::build_snapshot(&self.source));
        *self.snapshot.write() = snapshot;
    }

    /// Number of record files in the current snapshot
    pub fn len(&self) -> usize {
        self.current().records.len()
    }

    /// Whether the current snapshot holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    fn build_snapshot(source: &KbStore) -> Snapshot {
        let records: BTreeMap<_, _> = source
            .read_all()
            .into_iter()
            .map(|(part_id, record)| {
                let entry = match record {
                    Ok(record) => Ok(Arc::new(record)),
                    Err(e) => {
                        warn!("Caching '{}' as unreadable: {}", part_id, e);
                        Err(e.to_string())
                    }
                };
                (part_id, entry)
            })
            .collect();

        info!(
            "Knowledge base snapshot of {:?}: {} records",
            source.dir(),
            records.len()
        );
        Snapshot { records }
    }
}

impl KnowledgeBase for CachedKbStore {
    fn load(&self, part_id: &str) -> Result<Option<Arc<KnowledgeBaseRecord>>, KbError> {
        match self.current().records.get(part_id) {
            None => Ok(None),
            Some(Ok(record)) => Ok(Some(Arc::clone(record))),
            Some(Err(message)) => Err(KbError::Unreadable {
                part_id: part_id.to_string(),
                message: message.clone(),
            }),
        }
    }

    fn list(&self) -> Vec<PartSummary> {
        self.current()
            .records
            .iter()
            .map(|(part_id, entry)| match entry {
                Ok(record) => record.summary(),
                Err(_) => PartSummary::unreadable(part_id),
            })
            .collect()
    }
}
