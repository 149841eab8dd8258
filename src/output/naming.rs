//! Clip artifact naming and output directory inventory.
//!
//! Layout of an output directory:
//! - `temp_clip_<n>.<ext>`: in-progress clip, never survives a successful run
//! - `clip_<n>_<len>s.<ext>` or `clip_<n>.<ext>`: kept clip

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::segment::MotionInterval;

const TEMP_PREFIX: &str = "temp_clip_";
const FINAL_PREFIX: &str = "clip_";

fn final_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^clip_(\d+)(?:_(\d+)s)?\.[A-Za-z0-9]+$").expect("valid clip name regex")
    })
}

fn temp_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^temp_clip_(\d+)\.[A-Za-z0-9]+$").expect("valid temp name regex"))
}

/// Builds artifact paths inside one output directory.
#[derive(Clone, Debug)]
pub struct ClipNaming {
    dir: PathBuf,
    extension: String,
    include_length: bool,
}

impl ClipNaming {
    pub fn new(dir: impl Into<PathBuf>, extension: &str, include_length: bool) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_string(),
            include_length,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn temp_path(&self, ordinal: u32) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", TEMP_PREFIX, ordinal, self.extension))
    }

    pub fn final_path(&self, ordinal: u32, interval: &MotionInterval) -> PathBuf {
        let name = if self.include_length {
            format!(
                "{}{}_{}s.{}",
                FINAL_PREFIX,
                ordinal,
                interval.length_secs(),
                self.extension
            )
        } else {
            format!("{}{}.{}", FINAL_PREFIX, ordinal, self.extension)
        };
        self.dir.join(name)
    }
}

/// What a previous run left in the output directory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputInventory {
    /// Highest ordinal among kept clips; equals the clip count for a
    /// directory this tool populated.
    pub existing_clips: u32,
    /// Temporary artifacts from an interrupted run.
    pub stale_temps: Vec<PathBuf>,
}

/// Ordinal of a kept clip file name, if it is one.
pub fn parse_final_ordinal(file_name: &str) -> Option<u32> {
    final_name_re()
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// True for `temp_clip_<n>.<ext>` names.
pub fn is_temp_name(file_name: &str) -> bool {
    temp_name_re().is_match(file_name)
}

/// Scan an output directory. A missing directory is empty.
pub fn scan_output_dir(dir: &Path) -> Result<OutputInventory> {
    let mut inventory = OutputInventory::default();
    if !dir.exists() {
        return Ok(inventory);
    }
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list output dir {}", dir.display()))?;
    let mut count = 0u32;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list output dir {}", dir.display()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(ordinal) = parse_final_ordinal(name) {
            count += 1;
            inventory.existing_clips = inventory.existing_clips.max(ordinal);
        } else if is_temp_name(name) {
            inventory.stale_temps.push(entry.path());
        }
    }
    inventory.existing_clips = inventory.existing_clips.max(count);
    inventory.stale_temps.sort();
    Ok(inventory)
}

/// Create the output directory and delete temp artifacts of an interrupted
/// run. Returns the inventory after cleanup.
pub fn prepare_output_dir(dir: &Path) -> Result<OutputInventory> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir {}", dir.display()))?;
    let mut inventory = scan_output_dir(dir)?;
    for stale in inventory.stale_temps.drain(..) {
        log::warn!("removing stale temporary clip {}", stale.display());
        fs::remove_file(&stale)
            .with_context(|| format!("failed to remove stale temp {}", stale.display()))?;
    }
    Ok(inventory)
}
