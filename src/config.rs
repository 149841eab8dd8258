use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{ClassifierKind, ClassifierSettings};
use crate::output::{WriterKind, DEFAULT_FFMPEG_BIN};
use crate::segment::{SegmenterConfig, DEFAULT_MIN_CLIP_DURATION_MS};

const DEFAULT_INPUT: &str = "input_videos";
const DEFAULT_OUTPUT_DIR: &str = "output_clips";
const DEFAULT_THRESHOLD: u8 = 30;
const DEFAULT_CONTOUR_AREA_THRESHOLD: f64 = 1000.0;
const DEFAULT_SAMPLE_EVERY: u32 = 2;

pub const CONFIG_ENV: &str = "MOTION_CLIP_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct ClipperConfigFile {
    input: Option<String>,
    detector: Option<DetectorConfigFile>,
    segmenter: Option<SegmenterConfigFile>,
    sampling: Option<SamplingConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    classifier: Option<ClassifierKind>,
    threshold: Option<u8>,
    contour_area_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct SegmenterConfigFile {
    #[serde(alias = "no_motion_duration_ms")]
    min_clip_duration_ms: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    every: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
    writer: Option<WriterKind>,
    ffmpeg_bin: Option<String>,
    length_suffix: Option<bool>,
}

/// Immutable settings for a batch of segmentation runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipperConfig {
    /// Video file, directory of videos, or `stub://` URL.
    pub input: String,
    pub classifier: ClassifierSettings,
    pub segmenter: SegmenterConfig,
    /// Classify every Nth decoded frame.
    pub sample_every: u32,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub writer: WriterKind,
    pub ffmpeg_bin: String,
    /// Append `_<len>s` to kept clip names.
    pub length_suffix: bool,
}

impl Default for ClipperConfig {
    fn default() -> Self {
        Self {
            input: DEFAULT_INPUT.to_string(),
            classifier: ClassifierSettings {
                kind: ClassifierKind::Diff,
                threshold: DEFAULT_THRESHOLD,
                contour_area_threshold: DEFAULT_CONTOUR_AREA_THRESHOLD,
            },
            segmenter: SegmenterConfig {
                min_clip_duration_ms: DEFAULT_MIN_CLIP_DURATION_MS,
            },
            sample_every: DEFAULT_SAMPLE_EVERY,
            output: OutputSettings {
                dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
                writer: WriterKind::Y4m,
                ffmpeg_bin: DEFAULT_FFMPEG_BIN.to_string(),
                length_suffix: true,
            },
        }
    }
}

impl ClipperConfig {
    /// Load from the file named by `MOTION_CLIP_CONFIG` (if set), apply
    /// `MOTION_CLIP_*` overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let cfg = Self::load_from(config_path.as_deref())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit config file (if any) and apply env overrides.
    ///
    /// Not validated: callers layer further overrides (CLI flags) on top and
    /// call `validate` once at the end.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => ClipperConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: ClipperConfigFile) -> Self {
        let defaults = Self::default();
        let detector = file.detector.unwrap_or_default();
        let output = file.output.unwrap_or_default();
        Self {
            input: file.input.unwrap_or(defaults.input),
            classifier: ClassifierSettings {
                kind: detector.classifier.unwrap_or(defaults.classifier.kind),
                threshold: detector.threshold.unwrap_or(defaults.classifier.threshold),
                contour_area_threshold: detector
                    .contour_area_threshold
                    .unwrap_or(defaults.classifier.contour_area_threshold),
            },
            segmenter: SegmenterConfig {
                min_clip_duration_ms: file
                    .segmenter
                    .and_then(|s| s.min_clip_duration_ms)
                    .unwrap_or(defaults.segmenter.min_clip_duration_ms),
            },
            sample_every: file
                .sampling
                .and_then(|s| s.every)
                .unwrap_or(defaults.sample_every),
            output: OutputSettings {
                dir: output.dir.unwrap_or(defaults.output.dir),
                writer: output.writer.unwrap_or(defaults.output.writer),
                ffmpeg_bin: output.ffmpeg_bin.unwrap_or(defaults.output.ffmpeg_bin),
                length_suffix: output.length_suffix.unwrap_or(defaults.output.length_suffix),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(input) = env_non_empty("MOTION_CLIP_INPUT") {
            self.input = input;
        }
        if let Some(dir) = env_non_empty("MOTION_CLIP_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
        if let Some(bin) = env_non_empty("MOTION_CLIP_FFMPEG_BIN") {
            self.output.ffmpeg_bin = bin;
        }
        if let Some(value) = env_non_empty("MOTION_CLIP_THRESHOLD") {
            self.classifier.threshold = value
                .parse()
                .map_err(|_| anyhow!("MOTION_CLIP_THRESHOLD must be an integer in 0..=255"))?;
        }
        if let Some(value) = env_non_empty("MOTION_CLIP_CONTOUR_AREA") {
            self.classifier.contour_area_threshold = value
                .parse()
                .map_err(|_| anyhow!("MOTION_CLIP_CONTOUR_AREA must be a number"))?;
        }
        if let Some(value) = env_non_empty("MOTION_CLIP_MIN_CLIP_MS") {
            self.segmenter.min_clip_duration_ms = value
                .parse()
                .map_err(|_| anyhow!("MOTION_CLIP_MIN_CLIP_MS must be a number of milliseconds"))?;
        }
        if let Some(value) = env_non_empty("MOTION_CLIP_SAMPLE_EVERY") {
            self.sample_every = value
                .parse()
                .map_err(|_| anyhow!("MOTION_CLIP_SAMPLE_EVERY must be a positive integer"))?;
        }
        if let Some(value) = env_non_empty("MOTION_CLIP_CLASSIFIER") {
            self.classifier.kind = ClassifierKind::from_str(&value, true)
                .map_err(|_| anyhow!("MOTION_CLIP_CLASSIFIER must be diff or exact"))?;
        }
        if let Some(value) = env_non_empty("MOTION_CLIP_WRITER") {
            self.output.writer = WriterKind::from_str(&value, true)
                .map_err(|_| anyhow!("MOTION_CLIP_WRITER must be y4m or ffmpeg"))?;
        }
        Ok(())
    }

    /// Check invariants once every layer has been applied.
    pub fn validate(&self) -> Result<()> {
        if self.input.trim().is_empty() {
            bail!("input path cannot be empty");
        }
        if self.output.dir.as_os_str().is_empty() {
            bail!("output dir cannot be empty");
        }
        let min_ms = self.segmenter.min_clip_duration_ms;
        if !min_ms.is_finite() || min_ms < 0.0 {
            bail!("min clip duration must be a non-negative number of milliseconds");
        }
        let area = self.classifier.contour_area_threshold;
        if !area.is_finite() || area < 0.0 {
            bail!("contour area threshold must be non-negative");
        }
        if self.sample_every == 0 {
            bail!("sample_every must be at least 1");
        }
        if self.output.writer == WriterKind::Ffmpeg && self.output.ffmpeg_bin.trim().is_empty() {
            bail!("ffmpeg writer requires an ffmpeg binary path");
        }
        Ok(())
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<ClipperConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_tuning() {
        let cfg = ClipperConfig::default();
        assert_eq!(cfg.classifier.threshold, 30);
        assert_eq!(cfg.classifier.contour_area_threshold, 1000.0);
        assert_eq!(cfg.segmenter.min_clip_duration_ms, 500.0);
        assert_eq!(cfg.sample_every, 2);
        assert_eq!(cfg.output.dir, PathBuf::from("output_clips"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = ClipperConfig::default();
        cfg.sample_every = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ClipperConfig::default();
        cfg.segmenter.min_clip_duration_ms = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = ClipperConfig::default();
        cfg.classifier.contour_area_threshold = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = ClipperConfig::default();
        cfg.input = " ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file: ClipperConfigFile = toml::from_str(
            r#"
            [segmenter]
            no_motion_duration_ms = 750.0
            "#,
        )
        .unwrap();
        let cfg = ClipperConfig::from_file(file);
        assert_eq!(cfg.segmenter.min_clip_duration_ms, 750.0);
        assert_eq!(cfg.classifier, ClipperConfig::default().classifier);
    }
}
