//! sfp_store: per-folder fingerprint cache for songprint.
//!
//! One [`FingerprintStore`] owns one folder's [`FolderCache`], persisted as a
//! JSON document inside the folder. The cache is exactly that — a cache:
//! losing it costs recomputation time, never correctness. Reads fail soft
//! (an absent or unreadable file becomes an empty cache); writes are atomic
//! (temp file + rename) so a crash mid-save never leaves a torn document.
//!
//! All mutations are in-memory until [`FingerprintStore::save`] is called;
//! callers own the save cadence, typically after a generation batch drains.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use sfp_extract::{Signature, SignatureAlgorithm};

/// Name of the cache document inside each folder.
pub const CACHE_FILE_NAME: &str = ".songprint.json";

/// Bumped on any incompatible change to [`FolderCache`] or the signature
/// payload layout.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// All signatures recorded for one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub signatures: BTreeMap<SignatureAlgorithm, Signature>,
}

/// The persisted unit: one folder's records plus its flags.
///
/// `is_reference_folder` and `ignore_fingerprints` are independent booleans;
/// both set at once is odd but allowed without special-casing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderCache {
    pub version: u32,
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,
    #[serde(default)]
    pub excluded_files: BTreeSet<String>,
    #[serde(default)]
    pub is_reference_folder: bool,
    #[serde(default)]
    pub ignore_fingerprints: bool,
}

impl Default for FolderCache {
    fn default() -> Self {
        Self {
            version: CACHE_SCHEMA_VERSION,
            files: BTreeMap::new(),
            excluded_files: BTreeSet::new(),
            is_reference_folder: false,
            ignore_fingerprints: false,
        }
    }
}

/// Per-folder summary for the UI collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderInfo {
    pub total_files: usize,
    pub per_algorithm_coverage: BTreeMap<SignatureAlgorithm, usize>,
    pub excluded_count: usize,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read fingerprint cache {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("fingerprint cache {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode fingerprint cache {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write fingerprint cache {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Live file metadata used for staleness checks: (mtime nanoseconds since
/// the unix epoch, size in bytes).
pub fn file_meta(path: &Path) -> io::Result<(i64, u64)> {
    let meta = fs::metadata(path)?;
    let mtime = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    Ok((mtime, meta.len()))
}

/// In-memory handle over one folder's cache. `put` is callable from
/// concurrent workers; the cache sits behind a mutex.
pub struct FingerprintStore {
    folder: PathBuf,
    cache: Mutex<FolderCache>,
}

impl FingerprintStore {
    /// Load the folder's cache. An absent file yields an empty cache
    /// silently; an unreadable or corrupt file is logged and also yields an
    /// empty cache — blocking the user over a lost cache is worse than
    /// recomputing it.
    pub fn load(folder: impl Into<PathBuf>) -> FingerprintStore {
        let folder = folder.into();
        let cache = match Self::read_cache(&folder) {
            Ok(Some(cache)) => cache,
            Ok(None) => FolderCache::default(),
            Err(err) => {
                warn!(folder = %folder.display(), %err, "unreadable fingerprint cache, starting empty");
                FolderCache::default()
            }
        };
        FingerprintStore {
            folder,
            cache: Mutex::new(cache),
        }
    }

    fn read_cache(folder: &Path) -> Result<Option<FolderCache>, CacheError> {
        let path = folder.join(CACHE_FILE_NAME);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheError::Read { path, source: err }),
        };
        let cache: FolderCache =
            serde_json::from_str(&contents).map_err(|err| CacheError::Parse {
                path: path.clone(),
                source: err,
            })?;
        if cache.version > CACHE_SCHEMA_VERSION {
            warn!(
                folder = %folder.display(),
                version = cache.version,
                supported = CACHE_SCHEMA_VERSION,
                "fingerprint cache written by a newer version, starting empty"
            );
            return Ok(None);
        }
        Ok(Some(cache))
    }

    /// The folder this store belongs to.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn cache_path(&self) -> PathBuf {
        self.folder.join(CACHE_FILE_NAME)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FolderCache> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Recorded signature for `(filename, algorithm)`, if any.
    pub fn get(&self, filename: &str, algorithm: SignatureAlgorithm) -> Option<Signature> {
        self.lock()
            .files
            .get(filename)
            .and_then(|record| record.signatures.get(&algorithm))
            .cloned()
    }

    /// Upsert a signature. The signature's own source stamps become the
    /// recorded metadata for its `(file, algorithm)` slot.
    pub fn put(&self, filename: &str, signature: Signature) {
        let mut cache = self.lock();
        let record = cache
            .files
            .entry(filename.to_string())
            .or_insert_with(|| FileRecord {
                filename: filename.to_string(),
                signatures: BTreeMap::new(),
            });
        record.signatures.insert(signature.algorithm, signature);
    }

    /// True when the recorded metadata disagrees with the live file, the
    /// file has no record, or the live file cannot be inspected. Stale
    /// entries are never trusted; they count as missing.
    pub fn is_stale(&self, filename: &str) -> bool {
        let cache = self.lock();
        let Some(record) = cache.files.get(filename) else {
            return true;
        };
        if record.signatures.is_empty() {
            return true;
        }
        let Ok((mtime, size)) = file_meta(&self.folder.join(filename)) else {
            return true;
        };
        record
            .signatures
            .values()
            .any(|sig| sig.source_mtime != mtime || sig.source_size != size)
    }

    /// Generation-time cache-hit test: a fresh signature exists for this
    /// algorithm specifically.
    pub fn has_fresh(&self, filename: &str, algorithm: SignatureAlgorithm) -> bool {
        let cache = self.lock();
        let Some(sig) = cache
            .files
            .get(filename)
            .and_then(|record| record.signatures.get(&algorithm))
        else {
            return false;
        };
        let Ok((mtime, size)) = file_meta(&self.folder.join(filename)) else {
            return false;
        };
        sig.source_mtime == mtime && sig.source_size == size
    }

    /// Drop records for files no longer present in the folder listing.
    pub fn remove_missing<S: AsRef<str>>(&self, live_files: &[S]) {
        let live: BTreeSet<&str> = live_files.iter().map(|s| s.as_ref()).collect();
        self.lock()
            .files
            .retain(|name, _| live.contains(name.as_str()));
    }

    pub fn set_reference(&self, flag: bool) {
        self.lock().is_reference_folder = flag;
    }

    pub fn is_reference(&self) -> bool {
        self.lock().is_reference_folder
    }

    pub fn set_ignore(&self, flag: bool) {
        self.lock().ignore_fingerprints = flag;
    }

    pub fn ignore_fingerprints(&self) -> bool {
        self.lock().ignore_fingerprints
    }

    /// Exclude a file from generation and matching. A stale signature may
    /// remain recorded; exclusion wins over it everywhere.
    pub fn exclude(&self, filename: &str) {
        self.lock().excluded_files.insert(filename.to_string());
    }

    pub fn unexclude(&self, filename: &str) {
        self.lock().excluded_files.remove(filename);
    }

    pub fn is_excluded(&self, filename: &str) -> bool {
        self.lock().excluded_files.contains(filename)
    }

    /// Files with at least one recorded signature, excluded files filtered
    /// out. The corpus-assembly entry point for the match engine.
    pub fn recorded_files(&self, algorithm: SignatureAlgorithm) -> Vec<(String, Signature)> {
        let cache = self.lock();
        cache
            .files
            .values()
            .filter(|record| !cache.excluded_files.contains(&record.filename))
            .filter_map(|record| {
                record
                    .signatures
                    .get(&algorithm)
                    .map(|sig| (record.filename.clone(), sig.clone()))
            })
            .collect()
    }

    pub fn info(&self) -> FolderInfo {
        let cache = self.lock();
        let mut per_algorithm_coverage: BTreeMap<SignatureAlgorithm, usize> = BTreeMap::new();
        for record in cache.files.values() {
            for algorithm in record.signatures.keys() {
                *per_algorithm_coverage.entry(*algorithm).or_insert(0) += 1;
            }
        }
        FolderInfo {
            total_files: cache.files.len(),
            per_algorithm_coverage,
            excluded_count: cache.excluded_files.len(),
        }
    }

    /// Persist the cache atomically: serialize, write a sibling temp file,
    /// rename over the target. A failed save leaves both the on-disk
    /// document and the in-memory state untouched, so the next save can
    /// retry.
    pub fn save(&self) -> Result<(), CacheError> {
        let path = self.cache_path();
        let json = {
            let cache = self.lock();
            serde_json::to_string_pretty(&*cache).map_err(|err| CacheError::Encode {
                path: path.clone(),
                source: err,
            })?
        };

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|err| CacheError::Write {
            path: tmp.clone(),
            source: err,
        })?;
        fs::rename(&tmp, &path).map_err(|err| CacheError::Write { path, source: err })
    }

    /// Snapshot of the current cache state, for tests and introspection.
    pub fn snapshot(&self) -> FolderCache {
        self.lock().clone()
    }
}
