//! motion_clip - Cut motion intervals out of videos into standalone clips.
//!
//! For every input video this tool:
//! 1. Removes temporary clips left by an interrupted run
//! 2. Classifies sampled frames as motion / no motion
//! 3. Writes each motion interval longer than the minimum as clip_<n>_<len>s
//!
//! Ctrl-C finishes the clip in progress and stops before the next video.

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use motion_clipper::batch::{run_batch, BatchObserver};
use motion_clipper::{ClassifierKind, ClipperConfig, RunSummary, WriterKind};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Split videos into clips of detected motion"
)]
struct Args {
    /// Video file, directory of videos, or stub:// synthetic scene.
    #[arg(long, value_name = "PATH")]
    input: Option<String>,

    /// Directory receiving the clips.
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Per-pixel luma difference threshold (0-255).
    #[arg(long)]
    threshold: Option<u8>,

    /// Changed regions must be larger than this many pixels.
    #[arg(long)]
    contour_area_threshold: Option<f64>,

    /// Motion intervals must last longer than this to be kept.
    #[arg(long, value_name = "MS")]
    min_clip_ms: Option<f64>,

    /// Classify every Nth frame.
    #[arg(long, value_name = "N")]
    sample_every: Option<u32>,

    /// Motion classifier.
    #[arg(long, value_enum)]
    classifier: Option<ClassifierKind>,

    /// Clip writer.
    #[arg(long, value_enum)]
    writer: Option<WriterKind>,

    /// ffmpeg binary used by the ffmpeg writer.
    #[arg(long, value_name = "PATH")]
    ffmpeg_bin: Option<String>,

    /// Name clips clip_<n> instead of clip_<n>_<len>s.
    #[arg(long)]
    no_length_suffix: bool,

    /// TOML or JSON config file.
    #[arg(long, env = "MOTION_CLIP_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the batch summary as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
}

impl Args {
    fn apply(&self, cfg: &mut ClipperConfig) {
        if let Some(input) = &self.input {
            cfg.input = input.clone();
        }
        if let Some(dir) = &self.output {
            cfg.output.dir = dir.clone();
        }
        if let Some(threshold) = self.threshold {
            cfg.classifier.threshold = threshold;
        }
        if let Some(area) = self.contour_area_threshold {
            cfg.classifier.contour_area_threshold = area;
        }
        if let Some(ms) = self.min_clip_ms {
            cfg.segmenter.min_clip_duration_ms = ms;
        }
        if let Some(n) = self.sample_every {
            cfg.sample_every = n;
        }
        if let Some(kind) = self.classifier {
            cfg.classifier.kind = kind;
        }
        if let Some(kind) = self.writer {
            cfg.output.writer = kind;
        }
        if let Some(bin) = &self.ffmpeg_bin {
            cfg.output.ffmpeg_bin = bin.clone();
        }
        if self.no_length_suffix {
            cfg.output.length_suffix = false;
        }
    }
}

// One UI stage per input, open from start to finish.
struct StageObserver<'a> {
    ui: &'a ui::Ui,
    current: Option<ui::StageGuard>,
}

impl BatchObserver for StageObserver<'_> {
    fn input_started(&mut self, position: usize, total: usize, input: &str) {
        let name = format!("[{}/{}] {}", position, total, input);
        self.current = Some(self.ui.stage(&name));
    }

    fn input_finished(&mut self, _input: &str, result: &Result<RunSummary>) {
        if let Some(mut stage) = self.current.take() {
            match result {
                Ok(run) => stage.note(&format!("{} clips", run.kept.len())),
                Err(_) => stage.fail(),
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::new(args.ui, is_tty, args.json || !stdout_is_tty);

    let mut cfg = ClipperConfig::load_from(args.config.as_deref())?;
    args.apply(&mut cfg);
    cfg.validate()?;
    log::info!(
        "motion_clip: classifier={} threshold={} contour_area>{} min_clip>{}ms sample_every={} writer={} output={}",
        cfg.classifier.kind.as_str(),
        cfg.classifier.threshold,
        cfg.classifier.contour_area_threshold,
        cfg.segmenter.min_clip_duration_ms,
        cfg.sample_every,
        cfg.output.writer.as_str(),
        cfg.output.dir.display()
    );

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let mut stages = StageObserver { ui: &ui, current: None };
    let summary = run_batch(&cfg, &stop, &mut stages)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Total clips saved: {}", summary.clips_kept);
    }

    if !summary.is_success() {
        bail!("{} of {} inputs failed", summary.failed, summary.inputs.len());
    }
    Ok(())
}
