//! sfp_batch: batch signature generation for songprint.
//!
//! A [`GenerationCoordinator`] owns a bounded worker pool and runs batches
//! through `Idle -> Scanning -> Extracting -> (Cancelling) -> Idle`.
//! Scanning consults each folder's store so fresh cache entries are skipped;
//! extraction fans the remaining files out across the pool. A single file's
//! decode or extraction failure never aborts the batch; it lands in the
//! outcome's failure list. Cancellation is cooperative: workers check the
//! flag between files, in-flight work completes, and partial progress is
//! kept.
//!
//! All coordinator communication is asynchronous. [`GenerationCoordinator::generate`]
//! returns a [`BatchHandle`] immediately; progress arrives through a
//! [`BatchObserver`] whose implementations must return promptly — they are
//! called from worker threads.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use sfp_extract::{extract, ExtractConfig, ExtractError, SignatureAlgorithm};
use sfp_store::{file_meta, CacheError, FingerprintStore};

mod decode;

pub use decode::{AudioDecoder, DecodeError, DecodedAudio, WavDecoder};

/// Coordinator lifecycle, visible through [`BatchHandle::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BatchState {
    Idle = 0,
    Scanning = 1,
    Extracting = 2,
    Cancelling = 3,
}

impl BatchState {
    fn from_u8(raw: u8) -> BatchState {
        match raw {
            1 => BatchState::Scanning,
            2 => BatchState::Extracting,
            3 => BatchState::Cancelling,
            _ => BatchState::Idle,
        }
    }
}

/// Progress sink for a running batch. Called from worker threads; must not
/// block, or it will stall the pool.
pub trait BatchObserver: Send + Sync {
    /// Called after every processed file, success or failure.
    fn on_progress(&self, completed: usize, total: usize, current: &str);

    /// Called for each per-file failure as it happens.
    fn on_file_failed(&self, _file: &Path, _reason: &str) {}
}

/// One per-file failure, aggregated into the outcome rather than propagated.
#[derive(Debug, Clone, PartialEq)]
pub struct FileFailure {
    pub file: PathBuf,
    pub reason: String,
}

/// Terminal report of a batch. Cancellation is an outcome, not an error,
/// and is reported distinctly from failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    /// Cache hits plus files in excluded or ignored locations.
    pub skipped: usize,
    pub cancelled: bool,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Config(#[from] ExtractError),

    /// Persisting a folder cache failed after the batch drained. In-memory
    /// signatures are retained; a later save can retry.
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("batch worker panicked")]
    Panicked,
}

/// One folder's slice of a batch: its store plus the caller-enumerated
/// audio files inside it. File enumeration policy belongs to the caller.
pub struct FolderBatch {
    pub store: Arc<FingerprintStore>,
    pub files: Vec<PathBuf>,
}

/// Handle to a running batch. Dropping the handle detaches the batch; it
/// keeps running and flushes its stores when done.
pub struct BatchHandle {
    cancel: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    join: thread::JoinHandle<Result<BatchOutcome, BatchError>>,
}

impl BatchHandle {
    /// Request cancellation. Workers stop picking up new files; the
    /// in-flight ones finish and their signatures are kept.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
        let current = self.state.load(Ordering::Relaxed);
        if current == BatchState::Scanning as u8 || current == BatchState::Extracting as u8 {
            self.state.store(BatchState::Cancelling as u8, Ordering::Relaxed);
        }
    }

    pub fn state(&self) -> BatchState {
        BatchState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until the batch drains and return its outcome.
    pub fn wait(self) -> Result<BatchOutcome, BatchError> {
        self.join.join().map_err(|_| BatchError::Panicked)?
    }
}

/// Default pool size: every core but one, so the host UI keeps a thread.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Owns the worker pool and the extraction configuration. Each instance is
/// independent; two coordinators never share cancellation state or threads.
pub struct GenerationCoordinator {
    extract_cfg: ExtractConfig,
    decoder: Arc<dyn AudioDecoder>,
    pool: Arc<rayon::ThreadPool>,
}

struct WorkItem {
    store: Arc<FingerprintStore>,
    path: PathBuf,
    filename: String,
}

impl GenerationCoordinator {
    /// Build a coordinator with `workers` threads (`None` = cores - 1).
    pub fn new(
        extract_cfg: ExtractConfig,
        decoder: Arc<dyn AudioDecoder>,
        workers: Option<usize>,
    ) -> Result<GenerationCoordinator, BatchError> {
        extract_cfg.validate()?;
        let workers = workers.unwrap_or_else(default_workers).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sfp-worker-{i}"))
            .build()
            .map_err(|err| BatchError::WorkerPool(err.to_string()))?;
        Ok(GenerationCoordinator {
            extract_cfg,
            decoder,
            pool: Arc::new(pool),
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Start a batch over the given folders and return immediately.
    pub fn generate(
        &self,
        folders: Vec<FolderBatch>,
        algorithm: SignatureAlgorithm,
        observer: Option<Arc<dyn BatchObserver>>,
    ) -> BatchHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(BatchState::Idle as u8));

        let ctx = BatchContext {
            extract_cfg: self.extract_cfg.clone(),
            decoder: Arc::clone(&self.decoder),
            pool: Arc::clone(&self.pool),
            cancel: Arc::clone(&cancel),
            state: Arc::clone(&state),
            observer,
            algorithm,
        };
        let join = thread::spawn(move || ctx.run(folders));

        BatchHandle {
            cancel,
            state,
            join,
        }
    }
}

struct BatchContext {
    extract_cfg: ExtractConfig,
    decoder: Arc<dyn AudioDecoder>,
    pool: Arc<rayon::ThreadPool>,
    cancel: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    observer: Option<Arc<dyn BatchObserver>>,
    algorithm: SignatureAlgorithm,
}

impl BatchContext {
    fn run(self, folders: Vec<FolderBatch>) -> Result<BatchOutcome, BatchError> {
        self.state
            .store(BatchState::Scanning as u8, Ordering::Relaxed);

        let mut skipped = 0usize;
        let mut work: Vec<WorkItem> = Vec::new();
        for folder in &folders {
            if folder.store.ignore_fingerprints() {
                debug!(
                    folder = %folder.store.folder().display(),
                    files = folder.files.len(),
                    "folder flagged ignore, skipping"
                );
                skipped += folder.files.len();
                continue;
            }

            let mut live_names: Vec<String> = Vec::with_capacity(folder.files.len());
            for path in &folder.files {
                let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned())
                else {
                    warn!(path = %path.display(), "listing entry has no file name, skipping");
                    skipped += 1;
                    continue;
                };
                live_names.push(name.clone());

                if folder.store.is_excluded(&name) {
                    skipped += 1;
                    continue;
                }
                if folder.store.has_fresh(&name, self.algorithm) {
                    skipped += 1;
                    continue;
                }
                work.push(WorkItem {
                    store: Arc::clone(&folder.store),
                    path: path.clone(),
                    filename: name,
                });
            }
            // Records for files the listing no longer contains go away here.
            folder.store.remove_missing(&live_names);
        }

        let total = work.len();
        self.state
            .store(BatchState::Extracting as u8, Ordering::Relaxed);

        let completed = AtomicUsize::new(0);
        let succeeded = AtomicUsize::new(0);
        let failures: Mutex<Vec<FileFailure>> = Mutex::new(Vec::new());

        self.pool.install(|| {
            work.par_iter().for_each(|item| {
                if self.cancel.load(Ordering::Relaxed) {
                    return;
                }
                match self.process_one(item) {
                    Ok(()) => {
                        succeeded.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(reason) => {
                        warn!(file = %item.path.display(), %reason, "file failed, batch continues");
                        if let Some(observer) = &self.observer {
                            observer.on_file_failed(&item.path, &reason);
                        }
                        failures
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .push(FileFailure {
                                file: item.path.clone(),
                                reason,
                            });
                    }
                }
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(observer) = &self.observer {
                    observer.on_progress(done, total, &item.filename);
                }
            });
        });

        // Extracting has fully drained; saving is safe now and only now.
        let cancelled = self.cancel.load(Ordering::Relaxed);
        let mut save_err: Option<CacheError> = None;
        let mut saved: Vec<*const FingerprintStore> = Vec::new();
        for folder in &folders {
            let ptr = Arc::as_ptr(&folder.store);
            if saved.contains(&ptr) {
                continue;
            }
            saved.push(ptr);
            if let Err(err) = folder.store.save() {
                // Keep flushing the remaining stores; report the first error.
                error!(folder = %folder.store.folder().display(), %err, "cache save failed");
                save_err.get_or_insert(err);
            }
        }

        self.state.store(BatchState::Idle as u8, Ordering::Relaxed);

        let failures = failures
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let outcome = BatchOutcome {
            succeeded: succeeded.into_inner(),
            failed: failures.len(),
            skipped,
            cancelled,
            failures,
        };
        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            skipped = outcome.skipped,
            cancelled = outcome.cancelled,
            "batch complete"
        );

        match save_err {
            Some(err) => Err(BatchError::Cache(err)),
            None => Ok(outcome),
        }
    }

    fn process_one(&self, item: &WorkItem) -> Result<(), String> {
        // Stamp with the metadata observed before decoding: if the file
        // changes underneath us, the next scan sees the entry as stale.
        let (mtime, size) =
            file_meta(&item.path).map_err(|err| format!("failed to stat file: {err}"))?;
        let decoded = self
            .decoder
            .decode(&item.path)
            .map_err(|err| err.to_string())?;
        let signature = extract(
            &decoded.samples,
            decoded.sample_rate,
            self.algorithm,
            &self.extract_cfg,
        )
        .map_err(|err| err.to_string())?;
        item.store
            .put(&item.filename, signature.with_source_meta(mtime, size));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn write_tone_wav(path: &Path, freq: f32, secs: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let count = (8000.0 * secs) as usize;
        for i in 0..count {
            let sample =
                (2.0 * std::f32::consts::PI * freq * i as f32 / 8000.0).sin() * 0.8 * 32767.0;
            writer.write_sample(sample as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn coordinator(workers: usize) -> GenerationCoordinator {
        GenerationCoordinator::new(
            ExtractConfig::default(),
            Arc::new(WavDecoder),
            Some(workers),
        )
        .unwrap()
    }

    fn folder_with_tones(dir: &Path, count: usize) -> (Arc<FingerprintStore>, Vec<PathBuf>) {
        let mut files = Vec::new();
        for i in 0..count {
            let path = dir.join(format!("take{i}.wav"));
            write_tone_wav(&path, 220.0 + 20.0 * i as f32, 1.0);
            files.push(path);
        }
        (Arc::new(FingerprintStore::load(dir)), files)
    }

    struct CountingObserver {
        progress_calls: AtomicUsize,
        last_completed: AtomicUsize,
        failed_calls: AtomicUsize,
    }

    impl CountingObserver {
        fn new() -> Arc<CountingObserver> {
            Arc::new(CountingObserver {
                progress_calls: AtomicUsize::new(0),
                last_completed: AtomicUsize::new(0),
                failed_calls: AtomicUsize::new(0),
            })
        }
    }

    impl BatchObserver for CountingObserver {
        fn on_progress(&self, completed: usize, _total: usize, _current: &str) {
            self.progress_calls.fetch_add(1, Ordering::Relaxed);
            self.last_completed.fetch_max(completed, Ordering::Relaxed);
        }

        fn on_file_failed(&self, _file: &Path, _reason: &str) {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn batch_extracts_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (store, files) = folder_with_tones(dir.path(), 4);
        let observer = CountingObserver::new();

        let handle = coordinator(2).generate(
            vec![FolderBatch {
                store: Arc::clone(&store),
                files,
            }],
            SignatureAlgorithm::Spectral,
            Some(observer.clone()),
        );
        let outcome = handle.wait().unwrap();

        assert_eq!(outcome.succeeded, 4);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.skipped, 0);
        assert!(!outcome.cancelled);
        assert_eq!(observer.progress_calls.load(Ordering::Relaxed), 4);
        assert_eq!(observer.last_completed.load(Ordering::Relaxed), 4);

        // Persisted, not just in memory.
        let reloaded = FingerprintStore::load(dir.path());
        assert_eq!(reloaded.info().total_files, 4);
    }

    #[test]
    fn second_run_hits_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (store, files) = folder_with_tones(dir.path(), 3);
        let coordinator = coordinator(2);

        let first = coordinator
            .generate(
                vec![FolderBatch {
                    store: Arc::clone(&store),
                    files: files.clone(),
                }],
                SignatureAlgorithm::Spectral,
                None,
            )
            .wait()
            .unwrap();
        assert_eq!(first.succeeded, 3);

        let second = coordinator
            .generate(
                vec![FolderBatch { store, files }],
                SignatureAlgorithm::Spectral,
                None,
            )
            .wait()
            .unwrap();
        assert_eq!(second.succeeded, 0);
        assert_eq!(second.skipped, 3);
    }

    #[test]
    fn cache_hits_are_per_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let (store, files) = folder_with_tones(dir.path(), 2);
        let coordinator = coordinator(1);

        coordinator
            .generate(
                vec![FolderBatch {
                    store: Arc::clone(&store),
                    files: files.clone(),
                }],
                SignatureAlgorithm::Spectral,
                None,
            )
            .wait()
            .unwrap();

        // Same files, different algorithm: no hits.
        let outcome = coordinator
            .generate(
                vec![FolderBatch { store, files }],
                SignatureAlgorithm::Lightweight,
                None,
            )
            .wait()
            .unwrap();
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.skipped, 0);
    }

    #[test]
    fn per_file_failures_do_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let (store, mut files) = folder_with_tones(dir.path(), 2);
        let broken = dir.path().join("broken.wav");
        std::fs::write(&broken, b"not audio").unwrap();
        files.push(broken.clone());
        let observer = CountingObserver::new();

        let outcome = coordinator(2)
            .generate(
                vec![FolderBatch { store, files }],
                SignatureAlgorithm::Spectral,
                Some(observer.clone()),
            )
            .wait()
            .unwrap();

        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].file, broken);
        assert_eq!(observer.failed_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn too_short_file_is_a_soft_failure() {
        let dir = tempfile::tempdir().unwrap();
        let short = dir.path().join("blip.wav");
        write_tone_wav(&short, 440.0, 0.01);
        let store = Arc::new(FingerprintStore::load(dir.path()));

        let outcome = coordinator(1)
            .generate(
                vec![FolderBatch {
                    store,
                    files: vec![short],
                }],
                SignatureAlgorithm::Spectral,
                None,
            )
            .wait()
            .unwrap();
        assert_eq!(outcome.failed, 1);
        assert!(outcome.failures[0].reason.contains("too short"));
    }

    #[test]
    fn excluded_files_are_skipped_even_when_stale() {
        let dir = tempfile::tempdir().unwrap();
        let (store, files) = folder_with_tones(dir.path(), 2);
        store.exclude("take0.wav");

        let outcome = coordinator(1)
            .generate(
                vec![FolderBatch {
                    store: Arc::clone(&store),
                    files,
                }],
                SignatureAlgorithm::Spectral,
                None,
            )
            .wait()
            .unwrap();
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.skipped, 1);
        assert!(store.get("take0.wav", SignatureAlgorithm::Spectral).is_none());
    }

    #[test]
    fn ignored_folder_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (store, files) = folder_with_tones(dir.path(), 3);
        store.set_ignore(true);

        let outcome = coordinator(1)
            .generate(
                vec![FolderBatch {
                    store: Arc::clone(&store),
                    files,
                }],
                SignatureAlgorithm::Spectral,
                None,
            )
            .wait()
            .unwrap();
        assert_eq!(outcome.succeeded, 0);
        assert_eq!(outcome.skipped, 3);
        assert_eq!(store.info().total_files, 0);
    }

    /// Decoder that lingers long enough for a cancellation request to land
    /// while a file is in flight.
    struct SlowDecoder;

    impl AudioDecoder for SlowDecoder {
        fn decode(&self, path: &Path) -> Result<DecodedAudio, DecodeError> {
            std::thread::sleep(std::time::Duration::from_millis(200));
            WavDecoder.decode(path)
        }
    }

    #[test]
    fn cancellation_keeps_partial_progress() {
        let dir = tempfile::tempdir().unwrap();
        let (store, files) = folder_with_tones(dir.path(), 4);

        let coordinator =
            GenerationCoordinator::new(ExtractConfig::default(), Arc::new(SlowDecoder), Some(1))
                .unwrap();
        let handle = coordinator.generate(
            vec![FolderBatch {
                store: Arc::clone(&store),
                files,
            }],
            SignatureAlgorithm::Spectral,
            None,
        );
        handle.cancel();
        let outcome = handle.wait().unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.failed, 0);
        // The in-flight file finished and was kept; nothing else started.
        assert!(outcome.succeeded < 4);
        assert_eq!(
            outcome.succeeded,
            FingerprintStore::load(dir.path()).info().total_files
        );
    }

    #[test]
    fn stale_entries_are_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let (store, files) = folder_with_tones(dir.path(), 1);
        let coordinator = coordinator(1);

        coordinator
            .generate(
                vec![FolderBatch {
                    store: Arc::clone(&store),
                    files: files.clone(),
                }],
                SignatureAlgorithm::Spectral,
                None,
            )
            .wait()
            .unwrap();

        // Rewrite the source with different content; the entry goes stale.
        write_tone_wav(&files[0], 440.0, 2.0);
        assert!(store.is_stale("take0.wav"));

        let outcome = coordinator
            .generate(
                vec![FolderBatch {
                    store: Arc::clone(&store),
                    files,
                }],
                SignatureAlgorithm::Spectral,
                None,
            )
            .wait()
            .unwrap();
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.skipped, 0);
        assert!(!store.is_stale("take0.wav"));
    }

    #[test]
    fn default_workers_leaves_a_core_for_the_ui() {
        assert!(default_workers() >= 1);
    }
}
