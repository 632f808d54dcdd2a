//! Cancellation and failure-aggregation semantics of the batch coordinator.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use songprint::{
    AudioDecoder, BatchObserver, DecodeError, DecodedAudio, SignatureAlgorithm, SongLibrary,
    SuiteConfig, WavDecoder,
};

fn write_tone_wav(path: &Path, freq: f32) {
    let rate = 8000u32;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..rate {
        let sample =
            (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.8 * 32767.0;
        writer.write_sample(sample as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// WAV decoder with a per-file delay so a test can cancel mid-batch
/// deterministically.
struct PacedDecoder {
    delay: Duration,
}

impl AudioDecoder for PacedDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedAudio, DecodeError> {
        std::thread::sleep(self.delay);
        WavDecoder.decode(path)
    }
}

#[derive(Default)]
struct ProgressProbe {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl BatchObserver for ProgressProbe {
    fn on_progress(&self, completed: usize, total: usize, _current: &str) {
        self.completed.fetch_max(completed, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }
}

fn folder_of_tones(dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("take{i:02}.wav"));
            write_tone_wav(&path, 200.0 + 15.0 * i as f32);
            path
        })
        .collect()
}

#[test]
fn cancelling_mid_batch_keeps_completed_work() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().to_path_buf();
    let files = folder_of_tones(&folder, 12);

    let config = SuiteConfig::from_yaml("version: \"1.0\"\nbatch:\n  workers: 2\n").unwrap();
    let library = SongLibrary::with_decoder(
        &config,
        Arc::new(PacedDecoder {
            delay: Duration::from_millis(30),
        }),
    )
    .unwrap();

    let probe = Arc::new(ProgressProbe::default());
    let handle = library.generate(
        vec![(folder.clone(), files.clone())],
        SignatureAlgorithm::Spectral,
        Some(probe.clone()),
    );

    // Let a few files finish, then cancel while the batch is mid-flight.
    while probe.completed.load(Ordering::Relaxed) < 4 {
        std::thread::sleep(Duration::from_millis(1));
    }
    handle.cancel();
    let outcome = handle.wait().unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.failed, 0);
    assert!(outcome.succeeded >= 4);
    assert!(outcome.succeeded < 12, "cancellation arrived too late");

    // Exactly the completed files are persisted on the post-batch save.
    let info = library.folder_info(&folder);
    assert_eq!(info.total_files, outcome.succeeded);

    // A fresh run finishes the remainder, hitting the cache for the rest.
    let library = SongLibrary::open(&config).unwrap();
    let outcome2 = library
        .generate(vec![(folder.clone(), files)], SignatureAlgorithm::Spectral, None)
        .wait()
        .unwrap();
    assert!(!outcome2.cancelled);
    assert_eq!(outcome2.skipped, outcome.succeeded);
    assert_eq!(outcome2.succeeded, 12 - outcome.succeeded);
    assert_eq!(library.folder_info(&folder).total_files, 12);
}

#[test]
fn progress_reports_reach_the_total() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().to_path_buf();
    let files = folder_of_tones(&folder, 5);

    let library = SongLibrary::open(&SuiteConfig::default()).unwrap();
    let probe = Arc::new(ProgressProbe::default());
    let outcome = library
        .generate(
            vec![(folder, files)],
            SignatureAlgorithm::Spectral,
            Some(probe.clone()),
        )
        .wait()
        .unwrap();

    assert_eq!(outcome.succeeded, 5);
    assert_eq!(probe.completed.load(Ordering::Relaxed), 5);
    assert_eq!(probe.total.load(Ordering::Relaxed), 5);
}

#[test]
fn per_file_failures_are_aggregated_not_thrown() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().to_path_buf();
    let mut files = folder_of_tones(&folder, 3);
    let broken = folder.join("broken.wav");
    std::fs::write(&broken, b"session notes, not audio").unwrap();
    files.push(broken.clone());

    let library = SongLibrary::open(&SuiteConfig::default()).unwrap();
    let outcome = library
        .generate(vec![(folder, files)], SignatureAlgorithm::Spectral, None)
        .wait()
        .unwrap();

    assert_eq!(outcome.succeeded, 3);
    assert_eq!(outcome.failed, 1);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].file, broken);
    assert!(!outcome.failures[0].reason.is_empty());
}
