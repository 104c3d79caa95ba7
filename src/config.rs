use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::results::ResultFormat;

const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
#[cfg(feature = "backend-tract")]
const DEFAULT_DETECTOR: &str = "tract";
#[cfg(not(feature = "backend-tract"))]
const DEFAULT_DETECTOR: &str = "stub";
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_MAX_WIDTH: u32 = 1280;
const DEFAULT_SKIP_FRAMES: u32 = 0;
const DEFAULT_RESULTS_PATH: &str = "results/detection_results.json";
const DEFAULT_RESOLVER_PROGRAM: &str = "yt-dlp";
const DEFAULT_RESOLVER_MAX_HEIGHT: u32 = 720;
const DEFAULT_WINDOW_TITLE: &str = "Person Counter";
const DEFAULT_QUIT_KEY: char = 'q';

/// Detector backends selectable by name.
pub const KNOWN_DETECTORS: &[&str] = &["stub", "tract"];

#[derive(Debug, Deserialize, Default)]
struct CounterConfigFile {
    model_path: Option<PathBuf>,
    detector: Option<String>,
    confidence_threshold: Option<f32>,
    max_width: Option<u32>,
    skip_frames: Option<u32>,
    results: Option<ResultsConfigFile>,
    resolver: Option<ResolverConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ResultsConfigFile {
    path: Option<PathBuf>,
    format: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ResolverConfigFile {
    program: Option<String>,
    max_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    enabled: Option<bool>,
    window_title: Option<String>,
    quit_key: Option<char>,
}

#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub model_path: PathBuf,
    pub detector: String,
    pub confidence_threshold: f32,
    pub max_width: u32,
    pub skip_frames: u32,
    pub results: ResultsSettings,
    pub resolver: ResolverSettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone)]
pub struct ResultsSettings {
    pub path: PathBuf,
    pub format: ResultFormat,
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// External extractor executable (yt-dlp compatible).
    pub program: String,
    /// Quality ceiling for streamed platform videos.
    pub max_height: u32,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub enabled: bool,
    pub window_title: String,
    pub quit_key: char,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            detector: DEFAULT_DETECTOR.to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE,
            max_width: DEFAULT_MAX_WIDTH,
            skip_frames: DEFAULT_SKIP_FRAMES,
            results: ResultsSettings {
                path: PathBuf::from(DEFAULT_RESULTS_PATH),
                format: ResultFormat::JsonArray,
            },
            resolver: ResolverSettings {
                program: DEFAULT_RESOLVER_PROGRAM.to_string(),
                max_height: DEFAULT_RESOLVER_MAX_HEIGHT,
            },
            display: DisplaySettings {
                enabled: true,
                window_title: DEFAULT_WINDOW_TITLE.to_string(),
                quit_key: DEFAULT_QUIT_KEY,
            },
        }
    }
}

impl CounterConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PERSON_COUNTER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a config file directly, without environment overrides.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Result<Self> {
        let results_format = match file.results.as_ref().and_then(|r| r.format.as_deref()) {
            Some(name) => ResultFormat::parse(name)?,
            None => ResultFormat::JsonArray,
        };
        let results = ResultsSettings {
            path: file
                .results
                .and_then(|results| results.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_PATH)),
            format: results_format,
        };
        let resolver = ResolverSettings {
            program: file
                .resolver
                .as_ref()
                .and_then(|resolver| resolver.program.clone())
                .unwrap_or_else(|| DEFAULT_RESOLVER_PROGRAM.to_string()),
            max_height: file
                .resolver
                .as_ref()
                .and_then(|resolver| resolver.max_height)
                .unwrap_or(DEFAULT_RESOLVER_MAX_HEIGHT),
        };
        let display = DisplaySettings {
            enabled: file
                .display
                .as_ref()
                .and_then(|display| display.enabled)
                .unwrap_or(true),
            window_title: file
                .display
                .as_ref()
                .and_then(|display| display.window_title.clone())
                .unwrap_or_else(|| DEFAULT_WINDOW_TITLE.to_string()),
            quit_key: file
                .display
                .and_then(|display| display.quit_key)
                .unwrap_or(DEFAULT_QUIT_KEY),
        };
        Ok(Self {
            model_path: file
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            detector: file
                .detector
                .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
            confidence_threshold: file.confidence_threshold.unwrap_or(DEFAULT_CONFIDENCE),
            max_width: file.max_width.unwrap_or(DEFAULT_MAX_WIDTH),
            skip_frames: file.skip_frames.unwrap_or(DEFAULT_SKIP_FRAMES),
            results,
            resolver,
            display,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("PERSON_COUNTER_MODEL") {
            if !path.trim().is_empty() {
                self.model_path = PathBuf::from(path);
            }
        }
        if let Ok(detector) = std::env::var("PERSON_COUNTER_DETECTOR") {
            if !detector.trim().is_empty() {
                self.detector = detector.trim().to_string();
            }
        }
        if let Ok(width) = std::env::var("PERSON_COUNTER_MAX_WIDTH") {
            self.max_width = width
                .trim()
                .parse()
                .map_err(|_| anyhow!("PERSON_COUNTER_MAX_WIDTH must be a positive integer"))?;
        }
        if let Ok(skip) = std::env::var("PERSON_COUNTER_SKIP_FRAMES") {
            self.skip_frames = skip
                .trim()
                .parse()
                .map_err(|_| anyhow!("PERSON_COUNTER_SKIP_FRAMES must be an integer"))?;
        }
        if let Ok(path) = std::env::var("PERSON_COUNTER_RESULTS_PATH") {
            if !path.trim().is_empty() {
                self.results.path = PathBuf::from(path);
            }
        }
        if let Ok(format) = std::env::var("PERSON_COUNTER_RESULTS_FORMAT") {
            if !format.trim().is_empty() {
                self.results.format = ResultFormat::parse(&format)?;
            }
        }
        if let Ok(program) = std::env::var("PERSON_COUNTER_RESOLVER") {
            if !program.trim().is_empty() {
                self.resolver.program = program;
            }
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        if self.max_width == 0 {
            return Err(anyhow!("max_width must be greater than zero"));
        }
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            return Err(anyhow!("confidence_threshold must be within (0, 1]"));
        }
        if self.resolver.max_height == 0 {
            return Err(anyhow!("resolver max_height must be greater than zero"));
        }
        self.detector = self.detector.to_lowercase();
        if !KNOWN_DETECTORS.contains(&self.detector.as_str()) {
            return Err(anyhow!(
                "unknown detector '{}' (expected one of: {})",
                self.detector,
                KNOWN_DETECTORS.join(", ")
            ));
        }
        if self.results.path.as_os_str().is_empty() {
            return Err(anyhow!("results path must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = CounterConfig::default();
        assert_eq!(cfg.max_width, 1280);
        assert_eq!(cfg.skip_frames, 0);
        assert_eq!(cfg.results.path, PathBuf::from("results/detection_results.json"));
        assert_eq!(cfg.results.format, ResultFormat::JsonArray);
        assert_eq!(cfg.resolver.max_height, 720);
        assert_eq!(cfg.display.quit_key, 'q');
    }

    #[test]
    fn validate_rejects_zero_width() {
        let mut cfg = CounterConfig::default();
        cfg.max_width = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_detector() {
        let mut cfg = CounterConfig::default();
        cfg.detector = "darknet".to_string();
        assert!(cfg.validate().is_err());
        cfg.detector = "STUB".to_string();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.detector, "stub");
    }
}
