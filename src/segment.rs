//! Motion segmentation state machine.
//!
//! `ClipSegmenter` turns an ordered stream of `MotionSample`s into clip
//! boundary `Action`s. It performs no I/O and never fails; the driver decides
//! how to execute the actions against a `ClipWriter`.
//!
//! Two states:
//! - `Idle`: no interval in flight. Motion opens a clip.
//! - `Active`: one interval in flight. Motion appends, no motion closes the
//!   clip and either keeps or discards it depending on its duration.

use serde::Serialize;

/// Default minimum clip duration in milliseconds.
pub const DEFAULT_MIN_CLIP_DURATION_MS: f64 = 500.0;

/// One classifier verdict on the stream clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionSample {
    pub timestamp_ms: f64,
    pub motion: bool,
}

impl MotionSample {
    pub fn new(timestamp_ms: f64, motion: bool) -> Self {
        Self {
            timestamp_ms,
            motion,
        }
    }
}

/// A closed motion interval on the stream clock.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MotionInterval {
    pub start_ms: f64,
    pub end_ms: f64,
}

impl MotionInterval {
    pub fn duration_ms(&self) -> f64 {
        self.end_ms - self.start_ms
    }

    /// Whole seconds, truncated. Used for the `_<len>s` file name suffix.
    pub fn length_secs(&self) -> u64 {
        let secs = self.duration_ms() / 1000.0;
        if secs.is_finite() && secs > 0.0 {
            secs as u64
        } else {
            0
        }
    }
}

/// Instruction for the clip writer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action {
    /// Start a new temporary clip. The sample's frame is its first frame.
    Open {
        /// Non-decreasing across a run: a discarded clip's ordinal is reused
        /// by the next `Open`, so kept ordinals have no gaps.
        ordinal: u32,
        start_ms: f64,
    },
    /// Append the sample's frame to the open clip.
    Write,
    /// Promote the open clip to its permanent name.
    Keep {
        ordinal: u32,
        interval: MotionInterval,
    },
    /// Delete the open clip.
    Discard {
        ordinal: u32,
        interval: MotionInterval,
    },
}

impl Action {
    /// True for `Keep` and `Discard`.
    pub fn closes_clip(&self) -> bool {
        matches!(self, Action::Keep { .. } | Action::Discard { .. })
    }
}

/// Segmenter tuning.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmenterConfig {
    /// Intervals must last strictly longer than this to be kept.
    pub min_clip_duration_ms: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_clip_duration_ms: DEFAULT_MIN_CLIP_DURATION_MS,
        }
    }
}

/// Snapshot of the segmenter for logging and assertions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmenterState {
    pub motion_active: bool,
    pub pending_start_ms: Option<f64>,
    pub has_open_writer: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Phase {
    Idle,
    Active { start_ms: f64, ordinal: u32 },
}

/// Pure motion segmentation state machine. One instance per video.
#[derive(Clone, Debug)]
pub struct ClipSegmenter {
    min_clip_duration_ms: f64,
    first_ordinal: u32,
    next_ordinal: u32,
    phase: Phase,
    last_timestamp_ms: Option<f64>,
}

impl ClipSegmenter {
    /// `existing_output_count` is the number of clips already present in the
    /// output directory; the first clip of this run gets the next ordinal.
    pub fn new(config: &SegmenterConfig, existing_output_count: u32) -> Self {
        let first_ordinal = existing_output_count.saturating_add(1);
        Self {
            min_clip_duration_ms: config.min_clip_duration_ms,
            first_ordinal,
            next_ordinal: first_ordinal,
            phase: Phase::Idle,
            last_timestamp_ms: None,
        }
    }

    /// Consume one sample and return the action it triggers, if any.
    pub fn step(&mut self, sample: MotionSample) -> Option<Action> {
        let now = self.observe(sample.timestamp_ms);
        match (self.phase, sample.motion) {
            (Phase::Idle, false) => None,
            (Phase::Idle, true) => {
                let ordinal = self.next_ordinal;
                self.phase = Phase::Active {
                    start_ms: now,
                    ordinal,
                };
                Some(Action::Open {
                    ordinal,
                    start_ms: now,
                })
            }
            (Phase::Active { .. }, true) => Some(Action::Write),
            (Phase::Active { start_ms, ordinal }, false) => Some(self.close(start_ms, ordinal, now)),
        }
    }

    /// End-of-stream flush at the last observed timestamp.
    pub fn finish(&mut self) -> Option<Action> {
        let end_ms = self.last_timestamp_ms?;
        self.finish_at(end_ms)
    }

    /// End-of-stream flush at an explicit stream end timestamp.
    ///
    /// Returns exactly one closing action when an interval is open.
    pub fn finish_at(&mut self, end_ms: f64) -> Option<Action> {
        match self.phase {
            Phase::Idle => None,
            Phase::Active { .. } => self.step(MotionSample::new(end_ms, false)),
        }
    }

    /// Return to the initial state for a new video with the same ordinal base.
    pub fn reset(&mut self) {
        self.next_ordinal = self.first_ordinal;
        self.phase = Phase::Idle;
        self.last_timestamp_ms = None;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Active { .. })
    }

    pub fn state(&self) -> SegmenterState {
        match self.phase {
            Phase::Idle => SegmenterState {
                motion_active: false,
                pending_start_ms: None,
                has_open_writer: false,
            },
            Phase::Active { start_ms, .. } => SegmenterState {
                motion_active: true,
                pending_start_ms: Some(start_ms),
                has_open_writer: true,
            },
        }
    }

    /// Ordinal the next `Open` will carry.
    pub fn next_ordinal(&self) -> u32 {
        self.next_ordinal
    }

    fn close(&mut self, start_ms: f64, ordinal: u32, end_ms: f64) -> Action {
        self.phase = Phase::Idle;
        let interval = MotionInterval { start_ms, end_ms };
        if interval.duration_ms() > self.min_clip_duration_ms {
            // Discarded ordinals are reused so kept clips stay contiguous.
            self.next_ordinal = ordinal.saturating_add(1);
            Action::Keep { ordinal, interval }
        } else {
            Action::Discard { ordinal, interval }
        }
    }

    // Stream timestamps are non-decreasing; a regression is clamped.
    fn observe(&mut self, timestamp_ms: f64) -> f64 {
        let now = match self.last_timestamp_ms {
            Some(last) if timestamp_ms < last => last,
            _ => timestamp_ms,
        };
        self.last_timestamp_ms = Some(now);
        now
    }
}

/// Run a full sample sequence through a fresh segmenter and collect the
/// actions, including the end-of-stream flush at `stream_end_ms` (or the last
/// sample when `None`).
pub fn segment_samples(
    config: &SegmenterConfig,
    existing_output_count: u32,
    samples: &[MotionSample],
    stream_end_ms: Option<f64>,
) -> Vec<Action> {
    let mut segmenter = ClipSegmenter::new(config, existing_output_count);
    let mut actions: Vec<Action> = samples
        .iter()
        .filter_map(|sample| segmenter.step(*sample))
        .collect();
    let flush = match stream_end_ms {
        Some(end_ms) => segmenter.finish_at(end_ms),
        None => segmenter.finish(),
    };
    actions.extend(flush);
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(ms: f64) -> SegmenterConfig {
        SegmenterConfig {
            min_clip_duration_ms: ms,
        }
    }

    fn samples(raw: &[(f64, bool)]) -> Vec<MotionSample> {
        raw.iter().map(|(t, m)| MotionSample::new(*t, *m)).collect()
    }

    #[test]
    fn long_burst_is_kept() {
        let actions = segment_samples(
            &cfg(500.0),
            0,
            &samples(&[(0.0, false), (100.0, true), (400.0, true), (900.0, false)]),
            None,
        );
        assert_eq!(
            actions,
            vec![
                Action::Open {
                    ordinal: 1,
                    start_ms: 100.0
                },
                Action::Write,
                Action::Keep {
                    ordinal: 1,
                    interval: MotionInterval {
                        start_ms: 100.0,
                        end_ms: 900.0
                    }
                },
            ]
        );
    }

    #[test]
    fn short_burst_is_discarded() {
        let actions = segment_samples(
            &cfg(500.0),
            0,
            &samples(&[(0.0, false), (100.0, true), (300.0, false)]),
            None,
        );
        assert_eq!(
            actions.last(),
            Some(&Action::Discard {
                ordinal: 1,
                interval: MotionInterval {
                    start_ms: 100.0,
                    end_ms: 300.0
                }
            })
        );
    }

    #[test]
    fn duration_equal_to_threshold_is_discarded() {
        let actions = segment_samples(
            &cfg(500.0),
            0,
            &samples(&[(100.0, true), (600.0, false)]),
            None,
        );
        assert!(matches!(actions.last(), Some(Action::Discard { .. })));

        let actions = segment_samples(
            &cfg(500.0),
            0,
            &samples(&[(100.0, true), (600.5, false)]),
            None,
        );
        assert!(matches!(actions.last(), Some(Action::Keep { .. })));
    }

    #[test]
    fn stream_end_while_active_closes_once() {
        let actions = segment_samples(
            &cfg(500.0),
            0,
            &samples(&[(0.0, true), (50.0, true), (100.0, true)]),
            Some(150.0),
        );
        let closes: Vec<_> = actions.iter().filter(|a| a.closes_clip()).collect();
        assert_eq!(closes.len(), 1);
        assert_eq!(
            closes[0],
            &Action::Discard {
                ordinal: 1,
                interval: MotionInterval {
                    start_ms: 0.0,
                    end_ms: 150.0
                }
            }
        );
    }

    #[test]
    fn finish_uses_last_observed_timestamp() {
        let mut seg = ClipSegmenter::new(&cfg(100.0), 0);
        seg.step(MotionSample::new(0.0, true));
        seg.step(MotionSample::new(250.0, true));
        let action = seg.finish();
        assert_eq!(
            action,
            Some(Action::Keep {
                ordinal: 1,
                interval: MotionInterval {
                    start_ms: 0.0,
                    end_ms: 250.0
                }
            })
        );
        assert!(!seg.is_active());
        assert_eq!(seg.finish(), None);
    }

    #[test]
    fn finish_when_idle_is_a_no_op() {
        let mut seg = ClipSegmenter::new(&cfg(100.0), 0);
        assert_eq!(seg.finish(), None);
        seg.step(MotionSample::new(10.0, false));
        assert_eq!(seg.finish_at(20.0), None);
    }

    #[test]
    fn bursts_split_by_short_gap_stay_independent() {
        let actions = segment_samples(
            &cfg(100.0),
            0,
            &samples(&[
                (0.0, true),
                (200.0, true),
                (210.0, false),
                (220.0, true),
                (500.0, true),
                (600.0, false),
            ]),
            None,
        );
        let opens = actions
            .iter()
            .filter(|a| matches!(a, Action::Open { .. }))
            .count();
        assert_eq!(opens, 2);
        assert_eq!(
            actions.last(),
            Some(&Action::Keep {
                ordinal: 2,
                interval: MotionInterval {
                    start_ms: 220.0,
                    end_ms: 600.0
                }
            })
        );
    }

    #[test]
    fn never_opens_twice_without_closing() {
        // Pseudo-random motion pattern from a small LCG.
        let mut x: u32 = 12345;
        let mut raw = Vec::new();
        for i in 0..2000 {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12345);
            raw.push((i as f64 * 33.3, (x >> 16) % 3 != 0));
        }
        let actions = segment_samples(&cfg(250.0), 4, &samples(&raw), None);

        let mut open = false;
        for action in &actions {
            match action {
                Action::Open { .. } => {
                    assert!(!open, "open while another clip is in flight");
                    open = true;
                }
                Action::Write => assert!(open),
                Action::Keep { .. } | Action::Discard { .. } => {
                    assert!(open);
                    open = false;
                }
            }
        }
        assert!(!open, "stream ended with a leaked interval");
    }

    #[test]
    fn identical_inputs_yield_identical_actions() {
        let raw = samples(&[
            (0.0, false),
            (40.0, true),
            (80.0, true),
            (700.0, false),
            (740.0, true),
        ]);
        let a = segment_samples(&cfg(500.0), 2, &raw, None);
        let b = segment_samples(&cfg(500.0), 2, &raw, None);
        assert_eq!(format!("{a:?}"), format!("{b:?}"));
    }

    #[test]
    fn ordinals_continue_after_existing_outputs_and_reuse_discards() {
        let actions = segment_samples(
            &cfg(500.0),
            3,
            &samples(&[
                (0.0, true),
                (100.0, false), // discarded, ordinal 4 reused
                (200.0, true),
                (1000.0, false), // kept as 4
                (1100.0, true),
                (2000.0, false), // kept as 5
            ]),
            None,
        );
        let kept: Vec<u32> = actions
            .iter()
            .filter_map(|a| match a {
                Action::Keep { ordinal, .. } => Some(*ordinal),
                _ => None,
            })
            .collect();
        let opened: Vec<u32> = actions
            .iter()
            .filter_map(|a| match a {
                Action::Open { ordinal, .. } => Some(*ordinal),
                _ => None,
            })
            .collect();
        assert_eq!(opened, vec![4, 4, 5]);
        assert_eq!(kept, vec![4, 5]);
    }

    #[test]
    fn state_snapshot_tracks_open_interval() {
        let mut seg = ClipSegmenter::new(&cfg(500.0), 0);
        assert!(!seg.state().motion_active);
        seg.step(MotionSample::new(120.0, true));
        let state = seg.state();
        assert!(state.motion_active);
        assert!(state.has_open_writer);
        assert_eq!(state.pending_start_ms, Some(120.0));
        seg.reset();
        assert_eq!(seg.state().pending_start_ms, None);
        assert_eq!(seg.next_ordinal(), 1);
    }

    #[test]
    fn regressing_timestamps_are_clamped() {
        let mut seg = ClipSegmenter::new(&cfg(0.0), 0);
        seg.step(MotionSample::new(500.0, true));
        let action = seg.step(MotionSample::new(400.0, false));
        assert_eq!(
            action,
            Some(Action::Discard {
                ordinal: 1,
                interval: MotionInterval {
                    start_ms: 500.0,
                    end_ms: 500.0
                }
            })
        );
    }

    #[test]
    fn length_secs_truncates() {
        let interval = MotionInterval {
            start_ms: 100.0,
            end_ms: 2_199.0,
        };
        assert_eq!(interval.length_secs(), 2);
    }
}
