use std::sync::Mutex;

use tempfile::NamedTempFile;

use motion_clipper::config::ClipperConfig;
use motion_clipper::{ClassifierKind, WriterKind};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "MOTION_CLIP_CONFIG",
        "MOTION_CLIP_INPUT",
        "MOTION_CLIP_OUTPUT_DIR",
        "MOTION_CLIP_THRESHOLD",
        "MOTION_CLIP_CONTOUR_AREA",
        "MOTION_CLIP_MIN_CLIP_MS",
        "MOTION_CLIP_SAMPLE_EVERY",
        "MOTION_CLIP_CLASSIFIER",
        "MOTION_CLIP_WRITER",
        "MOTION_CLIP_FFMPEG_BIN",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("temp config");
    let json = r#"{
        "input": "/srv/videos",
        "detector": { "classifier": "exact", "threshold": 40 },
        "segmenter": { "min_clip_duration_ms": 1500.0 },
        "sampling": { "every": 3 },
        "output": { "dir": "/srv/clips", "writer": "ffmpeg", "length_suffix": false }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("MOTION_CLIP_CONFIG", file.path());
    std::env::set_var("MOTION_CLIP_THRESHOLD", "12");
    std::env::set_var("MOTION_CLIP_WRITER", "Y4M");

    let cfg = ClipperConfig::load().expect("load config");
    assert_eq!(cfg.input, "/srv/videos");
    assert_eq!(cfg.classifier.kind, ClassifierKind::Exact);
    assert_eq!(cfg.classifier.threshold, 12);
    assert_eq!(cfg.classifier.contour_area_threshold, 1000.0);
    assert_eq!(cfg.segmenter.min_clip_duration_ms, 1500.0);
    assert_eq!(cfg.sample_every, 3);
    assert_eq!(cfg.output.dir, std::path::PathBuf::from("/srv/clips"));
    assert_eq!(cfg.output.writer, WriterKind::Y4m);
    assert!(!cfg.output.length_suffix);

    clear_env();
}

#[test]
fn toml_config_accepts_legacy_duration_key() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        input = "stub://porch"

        [segmenter]
        no_motion_duration_ms = 250.0

        [output]
        ffmpeg_bin = "/opt/ffmpeg/bin/ffmpeg"
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = ClipperConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.input, "stub://porch");
    assert_eq!(cfg.segmenter.min_clip_duration_ms, 250.0);
    assert_eq!(cfg.output.ffmpeg_bin, "/opt/ffmpeg/bin/ffmpeg");
    assert_eq!(cfg.sample_every, 2);
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("MOTION_CLIP_SAMPLE_EVERY", "0");
    assert!(ClipperConfig::load().is_err());
    clear_env();

    std::env::set_var("MOTION_CLIP_MIN_CLIP_MS", "-5");
    assert!(ClipperConfig::load().is_err());
    clear_env();

    std::env::set_var("MOTION_CLIP_CLASSIFIER", "optical-flow");
    assert!(ClipperConfig::load_from(None).is_err());
    clear_env();

    std::env::set_var("MOTION_CLIP_THRESHOLD", "300");
    assert!(ClipperConfig::load_from(None).is_err());
    clear_env();
}

#[test]
fn later_overrides_can_fix_env_values_before_validation() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("MOTION_CLIP_SAMPLE_EVERY", "0");
    let mut cfg = ClipperConfig::load_from(None).expect("layered config");
    assert_eq!(cfg.sample_every, 0);
    assert!(cfg.validate().is_err());

    // What `--sample-every 2` does on the command line.
    cfg.sample_every = 2;
    cfg.validate().expect("valid after override");
    clear_env();
}

#[test]
fn rejects_unreadable_or_malformed_files() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("missing.toml");
    let err = ClipperConfig::load_from(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"[segmenter\nmin_clip_duration_ms = ").expect("write");
    let err = ClipperConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));
}
