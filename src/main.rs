use std::error::Error;
use std::path::PathBuf;

use songprint::{SignatureAlgorithm, SongLibrary, SuiteConfig};

/// Fingerprint every WAV file in the given folder and print the duplicate
/// clusters found there. Demo only; the real application supplies its own
/// file listings.
fn main() -> Result<(), Box<dyn Error>> {
    let folder = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or("usage: songprint <folder>")?;

    let mut files: Vec<PathBuf> = std::fs::read_dir(&folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("wav"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    println!("analyzing {} files in {}", files.len(), folder.display());

    let library = SongLibrary::open(&SuiteConfig::default())?;
    let outcome = library
        .generate(
            vec![(folder.clone(), files)],
            SignatureAlgorithm::Spectral,
            None,
        )
        .wait()?;
    println!(
        "generated: {} ok, {} failed, {} cached",
        outcome.succeeded, outcome.failed, outcome.skipped
    );

    let clusters = library.find_duplicates(&[folder], SignatureAlgorithm::Spectral)?;
    if clusters.is_empty() {
        println!("no duplicates found");
    }
    for (i, cluster) in clusters.iter().enumerate() {
        println!("cluster {}:", i + 1);
        for file in &cluster.files {
            println!("  {}", file.display());
        }
    }

    Ok(())
}
