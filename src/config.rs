//! YAML configuration file support.
//!
//! All stage configurations (extraction, matching, batch) live in a single
//! document loaded at startup:
//!
//! ```yaml
//! version: "1.0"
//! name: "band practice library"
//!
//! extract:
//!   frame_size: 2048
//!   hop_size: 512
//!   bands: 32
//!
//! matcher:
//!   threshold: 0.7
//!   max_shift_secs: 2.0
//!   reference_boost: 1.5
//!
//! batch:
//!   workers: 3
//! ```
//!
//! Every field is optional; omitted fields take the stage defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sfp_extract::ExtractConfig;
use sfp_match::MatchConfig;

/// Errors that can occur when loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SuiteConfig {
    /// Configuration format version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Optional configuration name/description.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub extract: ExtractSection,

    #[serde(default, rename = "matcher")]
    pub matcher: MatchSection,

    #[serde(default)]
    pub batch: BatchSection,
}

impl SuiteConfig {
    /// Load a YAML configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: SuiteConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => {}
            v => return Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }
        self.extract_config()
            .validate()
            .map_err(|err| ConfigLoadError::Validation(err.to_string()))?;
        self.match_config()
            .validate()
            .map_err(|err| ConfigLoadError::Validation(err.to_string()))?;
        if self.batch.workers == Some(0) {
            return Err(ConfigLoadError::Validation(
                "batch.workers must be >= 1 when set".into(),
            ));
        }
        Ok(())
    }

    /// The extraction config this document describes.
    pub fn extract_config(&self) -> ExtractConfig {
        let defaults = ExtractConfig::default();
        ExtractConfig {
            frame_size: self.extract.frame_size.unwrap_or(defaults.frame_size),
            hop_size: self.extract.hop_size.unwrap_or(defaults.hop_size),
            bands: self.extract.bands.unwrap_or(defaults.bands),
            light_frame_size: self
                .extract
                .light_frame_size
                .unwrap_or(defaults.light_frame_size),
            light_hop_size: self
                .extract
                .light_hop_size
                .unwrap_or(defaults.light_hop_size),
            light_bands: self.extract.light_bands.unwrap_or(defaults.light_bands),
            chroma_window: self.extract.chroma_window.unwrap_or(defaults.chroma_window),
            peak_neighborhood: self
                .extract
                .peak_neighborhood
                .unwrap_or(defaults.peak_neighborhood),
            peak_magnitude_floor: self
                .extract
                .peak_magnitude_floor
                .unwrap_or(defaults.peak_magnitude_floor),
            peaks_per_frame: self
                .extract
                .peaks_per_frame
                .unwrap_or(defaults.peaks_per_frame),
            target_zone: self.extract.target_zone.unwrap_or(defaults.target_zone),
            max_pair_delta: self.extract.max_pair_delta.unwrap_or(defaults.max_pair_delta),
            seed: self.extract.seed.unwrap_or(defaults.seed),
        }
    }

    /// The match config this document describes.
    pub fn match_config(&self) -> MatchConfig {
        let defaults = MatchConfig::default();
        MatchConfig {
            threshold: self.matcher.threshold.unwrap_or(defaults.threshold),
            max_shift_secs: self
                .matcher
                .max_shift_secs
                .unwrap_or(defaults.max_shift_secs),
            reference_boost: self
                .matcher
                .reference_boost
                .unwrap_or(defaults.reference_boost),
            max_results: self.matcher.max_results.unwrap_or(defaults.max_results),
            use_parallel: self.matcher.use_parallel.unwrap_or(defaults.use_parallel),
        }
    }

    /// Worker override for the batch coordinator; `None` = cores - 1.
    pub fn workers(&self) -> Option<usize> {
        self.batch.workers
    }
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            name: None,
            extract: ExtractSection::default(),
            matcher: MatchSection::default(),
            batch: BatchSection::default(),
        }
    }
}

/// Extraction section; every field defaults to [`ExtractConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractSection {
    pub frame_size: Option<usize>,
    pub hop_size: Option<usize>,
    pub bands: Option<usize>,
    pub light_frame_size: Option<usize>,
    pub light_hop_size: Option<usize>,
    pub light_bands: Option<usize>,
    pub chroma_window: Option<usize>,
    pub peak_neighborhood: Option<usize>,
    pub peak_magnitude_floor: Option<f32>,
    pub peaks_per_frame: Option<usize>,
    pub target_zone: Option<usize>,
    pub max_pair_delta: Option<u32>,
    pub seed: Option<u64>,
}

/// Matcher section; every field defaults to [`MatchConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MatchSection {
    pub threshold: Option<f32>,
    pub max_shift_secs: Option<f32>,
    pub reference_boost: Option<f32>,
    pub max_results: Option<usize>,
    pub use_parallel: Option<bool>,
}

/// Batch section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BatchSection {
    /// Worker pool size; omitted means detected cores minus one.
    pub workers: Option<usize>,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_document_takes_defaults() {
        let config = SuiteConfig::from_yaml("version: \"1.0\"").unwrap();
        assert_eq!(config.extract_config(), ExtractConfig::default());
        assert_eq!(config.match_config(), MatchConfig::default());
        assert_eq!(config.workers(), None);
    }

    #[test]
    fn load_valid_yaml() {
        let yaml = r#"
version: "1.0"
name: "tuesday rehearsals"
extract:
  bands: 24
matcher:
  threshold: 0.8
  reference_boost: 2.0
batch:
  workers: 2
"#;
        let config = SuiteConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name.as_deref(), Some("tuesday rehearsals"));
        assert_eq!(config.extract_config().bands, 24);
        // Unset fields keep their defaults.
        assert_eq!(config.extract_config().frame_size, 2048);
        assert_eq!(config.match_config().threshold, 0.8);
        assert_eq!(config.match_config().reference_boost, 2.0);
        assert_eq!(config.workers(), Some(2));
    }

    #[test]
    fn load_from_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"version: \"1.0\"\nmatcher:\n  threshold: 0.75\n")
            .unwrap();
        let config = SuiteConfig::from_file(temp.path()).unwrap();
        assert_eq!(config.match_config().threshold, 0.75);
    }

    #[test]
    fn unsupported_version_rejected() {
        let result = SuiteConfig::from_yaml("version: \"9.0\"");
        assert!(matches!(result, Err(ConfigLoadError::UnsupportedVersion(_))));
    }

    #[test]
    fn invalid_stage_field_rejected() {
        let yaml = "version: \"1.0\"\nmatcher:\n  threshold: 0.2\n";
        let err = SuiteConfig::from_yaml(yaml).expect_err("threshold out of band");
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn zero_workers_rejected() {
        let yaml = "version: \"1.0\"\nbatch:\n  workers: 0\n";
        let err = SuiteConfig::from_yaml(yaml).expect_err("zero workers");
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn full_yaml_round_trip() {
        let yaml = r#"
version: "1.0"
extract:
  frame_size: 4096
  hop_size: 1024
  bands: 32
  light_frame_size: 8192
  light_hop_size: 4096
  light_bands: 16
  chroma_window: 6
  peaks_per_frame: 4
matcher:
  threshold: 0.7
  max_shift_secs: 1.5
  max_results: 20
  use_parallel: true
batch:
  workers: 4
"#;
        let config = SuiteConfig::from_yaml(yaml).unwrap();
        let extract = config.extract_config();
        assert_eq!(extract.frame_size, 4096);
        assert_eq!(extract.hop_size, 1024);
        assert_eq!(extract.light_frame_size, 8192);
        assert_eq!(extract.chroma_window, 6);
        let matching = config.match_config();
        assert_eq!(matching.max_shift_secs, 1.5);
        assert_eq!(matching.max_results, 20);
        assert!(matching.use_parallel);
    }
}
