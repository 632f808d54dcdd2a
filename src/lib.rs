//! Workspace umbrella crate for songprint.
//!
//! Stitches extraction, the per-folder fingerprint stores, the match engine
//! and the batch coordinator behind one entry point — [`SongLibrary`] — the
//! surface the annotation suite's UI talks to. Everything heavier than glue
//! lives in the subsystem crates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::debug;

pub use sfp_batch::{
    default_workers, AudioDecoder, BatchError, BatchHandle, BatchObserver, BatchOutcome,
    BatchState, DecodeError, DecodedAudio, FileFailure, FolderBatch, GenerationCoordinator,
    WavDecoder,
};
pub use sfp_extract::{
    extract, ExtractConfig, ExtractError, Landmark, Signature, SignatureAlgorithm, SignatureData,
};
pub use sfp_match::{
    find_duplicates, find_matches, score_pair, Candidate, DuplicateCluster, MatchConfig,
    MatchError, MatchResult,
};
pub use sfp_store::{
    file_meta, CacheError, FileRecord, FingerprintStore, FolderCache, FolderInfo,
    CACHE_FILE_NAME, CACHE_SCHEMA_VERSION,
};

mod config;

pub use config::{BatchSection, ConfigLoadError, ExtractSection, MatchSection, SuiteConfig};

/// Errors surfaced by the library facade. Per-file batch failures are not
/// errors; they arrive aggregated inside [`BatchOutcome`].
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("match error: {0}")]
    Match(#[from] MatchError),

    #[error("batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("no {algorithm} signature recorded for {file} and the file could not be analyzed")]
    MissingSignature {
        file: PathBuf,
        algorithm: SignatureAlgorithm,
    },
}

/// The suite's fingerprinting facade: one instance per open library.
///
/// Stores are loaded lazily per folder and shared between batches and
/// queries. File enumeration comes from the caller — the file-manager side
/// of the application owns traversal policy, extension filters and hidden
/// folders; this core consumes its listings.
pub struct SongLibrary {
    extract_cfg: ExtractConfig,
    match_cfg: MatchConfig,
    decoder: Arc<dyn AudioDecoder>,
    coordinator: GenerationCoordinator,
    stores: RwLock<HashMap<PathBuf, Arc<FingerprintStore>>>,
}

impl SongLibrary {
    /// Open a library with the default WAV decoder.
    pub fn open(cfg: &SuiteConfig) -> Result<SongLibrary, SuiteError> {
        Self::with_decoder(cfg, Arc::new(WavDecoder))
    }

    /// Open a library with a caller-supplied decode collaborator.
    pub fn with_decoder(
        cfg: &SuiteConfig,
        decoder: Arc<dyn AudioDecoder>,
    ) -> Result<SongLibrary, SuiteError> {
        let extract_cfg = cfg.extract_config();
        let match_cfg = cfg.match_config();
        extract_cfg.validate()?;
        match_cfg.validate()?;
        let coordinator =
            GenerationCoordinator::new(extract_cfg.clone(), Arc::clone(&decoder), cfg.workers())?;
        Ok(SongLibrary {
            extract_cfg,
            match_cfg,
            decoder,
            coordinator,
            stores: RwLock::new(HashMap::new()),
        })
    }

    pub fn extract_config(&self) -> &ExtractConfig {
        &self.extract_cfg
    }

    pub fn match_config(&self) -> &MatchConfig {
        &self.match_cfg
    }

    /// The store for a folder, loading its cache on first touch.
    pub fn store(&self, folder: &Path) -> Arc<FingerprintStore> {
        if let Some(store) = self
            .stores
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(folder)
        {
            return Arc::clone(store);
        }
        let mut stores = self
            .stores
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            stores
                .entry(folder.to_path_buf())
                .or_insert_with(|| Arc::new(FingerprintStore::load(folder))),
        )
    }

    /// Start signature generation over caller-enumerated folder listings.
    /// Returns immediately; completion and progress flow through the handle
    /// and observer.
    pub fn generate(
        &self,
        folders: Vec<(PathBuf, Vec<PathBuf>)>,
        algorithm: SignatureAlgorithm,
        observer: Option<Arc<dyn BatchObserver>>,
    ) -> BatchHandle {
        let batches = folders
            .into_iter()
            .map(|(folder, files)| FolderBatch {
                store: self.store(&folder),
                files,
            })
            .collect();
        self.coordinator.generate(batches, algorithm, observer)
    }

    pub fn folder_info(&self, folder: &Path) -> FolderInfo {
        self.store(folder).info()
    }

    /// Flag a folder as authoritative; its candidates outrank equal scores.
    /// The flag is persisted immediately.
    pub fn set_reference_folder(&self, folder: &Path, flag: bool) -> Result<(), SuiteError> {
        let store = self.store(folder);
        store.set_reference(flag);
        store.save()?;
        Ok(())
    }

    /// Flag a folder as ignored; it neither generates nor contributes match
    /// candidates. The flag is persisted immediately.
    pub fn set_ignore_folder(&self, folder: &Path, flag: bool) -> Result<(), SuiteError> {
        let store = self.store(folder);
        store.set_ignore(flag);
        store.save()?;
        Ok(())
    }

    pub fn exclude_file(&self, folder: &Path, filename: &str) -> Result<(), SuiteError> {
        let store = self.store(folder);
        store.exclude(filename);
        store.save()?;
        Ok(())
    }

    pub fn unexclude_file(&self, folder: &Path, filename: &str) -> Result<(), SuiteError> {
        let store = self.store(folder);
        store.unexclude(filename);
        store.save()?;
        Ok(())
    }

    /// Persist a folder's cache on demand; batches flush themselves.
    pub fn save_folder(&self, folder: &Path) -> Result<(), SuiteError> {
        self.store(folder).save()?;
        Ok(())
    }

    /// Rank matches for one file against every candidate in `folders`.
    ///
    /// The query signature comes from the folder's cache when fresh;
    /// otherwise the file is decoded and analyzed on the spot and the new
    /// signature is recorded (in memory; the next save persists it).
    pub fn find_matches(
        &self,
        query_folder: &Path,
        query_file: &str,
        folders: &[PathBuf],
        algorithm: SignatureAlgorithm,
    ) -> Result<Vec<MatchResult>, SuiteError> {
        let query = self.query_signature(query_folder, query_file, algorithm)?;
        let corpus = self.corpus(folders, algorithm);
        debug!(
            query = query_file,
            corpus = corpus.len(),
            %algorithm,
            "running match query"
        );
        let results = find_matches(
            &query_folder.join(query_file),
            &query,
            &corpus,
            &self.match_cfg,
        )?;
        Ok(results)
    }

    /// Find duplicate clusters across the given folders in one batched
    /// pairwise pass; signatures are loaded once and held in memory.
    pub fn find_duplicates(
        &self,
        folders: &[PathBuf],
        algorithm: SignatureAlgorithm,
    ) -> Result<Vec<DuplicateCluster>, SuiteError> {
        let corpus = self.corpus(folders, algorithm);
        let clusters = find_duplicates(&corpus, &self.match_cfg)?;
        Ok(clusters)
    }

    fn query_signature(
        &self,
        folder: &Path,
        filename: &str,
        algorithm: SignatureAlgorithm,
    ) -> Result<Signature, SuiteError> {
        let store = self.store(folder);
        if store.has_fresh(filename, algorithm) {
            if let Some(signature) = store.get(filename, algorithm) {
                return Ok(signature);
            }
        }

        let path = folder.join(filename);
        let decoded = self.decoder.decode(&path).map_err(|err| {
            debug!(file = %path.display(), %err, "query file has no fresh signature and decode failed");
            SuiteError::MissingSignature {
                file: path.clone(),
                algorithm,
            }
        })?;
        let (mtime, size) = file_meta(&path).unwrap_or((0, 0));
        let signature = extract(&decoded.samples, decoded.sample_rate, algorithm, &self.extract_cfg)?
            .with_source_meta(mtime, size);
        store.put(filename, signature.clone());
        Ok(signature)
    }

    /// Assemble the candidate corpus: ignored folders contribute nothing,
    /// excluded files are already filtered by the store, reference folders
    /// carry the configured boost.
    fn corpus(&self, folders: &[PathBuf], algorithm: SignatureAlgorithm) -> Vec<Candidate> {
        let mut corpus = Vec::new();
        for folder in folders {
            let store = self.store(folder);
            if store.ignore_fingerprints() {
                continue;
            }
            let weight = if store.is_reference() {
                self.match_cfg.reference_boost
            } else {
                1.0
            };
            for (filename, signature) in store.recorded_files(algorithm) {
                corpus.push(Candidate {
                    file: folder.join(filename),
                    signature,
                    folder_weight: weight,
                });
            }
        }
        corpus
    }
}
