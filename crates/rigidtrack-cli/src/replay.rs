//! Replay recorded point clouds through an [`ObjectTracker`].
//!
//! Input is newline-delimited JSON, one frame per line:
//!
//! ```json
//! {"stamp": "2024-05-01T12:00:00.010Z", "points": [[0.1, 0.2, 0.0], [0.3, 0.1, 0.0]]}
//! ```
//!
//! Each processed frame produces one output line carrying the frame stamp,
//! whether the tracker is initialized, and every object's pose snapshot
//! with its status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use rigidtrack_perception::icp::Registration;
use rigidtrack_perception::transform::Vec3;
use rigidtrack_tracker::ObjectTracker;
use rigidtrack_types::{ObjectStatus, PoseSnapshot, TrackError};

/// One recorded frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub stamp: DateTime<Utc>,
    #[serde(default)]
    pub points: Vec<[f32; 3]>,
}

/// Per-object entry of an output line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectOutput {
    #[serde(flatten)]
    pub pose: PoseSnapshot,
    pub status: ObjectStatus,
}

/// One output line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameOutput {
    pub stamp: DateTime<Utc>,
    pub initialized: bool,
    pub objects: Vec<ObjectOutput>,
}

/// Per-object counters gathered over a replay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectTally {
    pub name: String,
    pub accepted: usize,
    pub rejected: usize,
}

/// What a replay did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    pub frames: usize,
    /// Zero-based index of the frame on which initialization succeeded.
    pub initialized_at: Option<usize>,
    pub interrupted: bool,
    pub objects: Vec<ObjectTally>,
}

/// Feed every frame from `input` through `tracker`, writing one JSON line
/// per frame to `output`.
///
/// Stops early, between frames, once `shutdown` is set.  Blank input lines
/// are skipped; a malformed line aborts the replay with its line number.
pub fn replay<R, I, O>(
    tracker: &mut ObjectTracker<R>,
    input: I,
    mut output: O,
    shutdown: &AtomicBool,
) -> Result<ReplaySummary, TrackError>
where
    R: Registration,
    I: BufRead,
    O: Write,
{
    let mut summary = ReplaySummary {
        objects: tracker
            .objects()
            .iter()
            .map(|o| ObjectTally {
                name: o.name().to_string(),
                ..ObjectTally::default()
            })
            .collect(),
        ..ReplaySummary::default()
    };

    for (line_no, line) in input.lines().enumerate() {
        if shutdown.load(Ordering::SeqCst) {
            info!(frames = summary.frames, "replay interrupted");
            summary.interrupted = true;
            break;
        }
        let line = line.map_err(|e| TrackError::Io(format!("failed to read frame: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: RecordedFrame = serde_json::from_str(&line)
            .map_err(|e| TrackError::Config(format!("line {}: invalid frame: {e}", line_no + 1)))?;
        let cloud: Vec<Vec3> = frame.points.iter().copied().map(Vec3::from).collect();

        let was_initialized = tracker.is_initialized();
        let report = tracker.update(&cloud, frame.stamp).clone();
        debug!(line = line_no + 1, points = cloud.len(), "frame processed");

        if !was_initialized && report.initialized {
            summary.initialized_at = Some(summary.frames);
        }
        if was_initialized {
            for (tally, status) in summary.objects.iter_mut().zip(&report.statuses) {
                if status.is_valid() {
                    tally.accepted += 1;
                } else {
                    tally.rejected += 1;
                }
            }
        }

        let out = FrameOutput {
            stamp: report.stamp,
            initialized: report.initialized,
            objects: tracker
                .snapshots()
                .into_iter()
                .zip(report.statuses)
                .map(|(pose, status)| ObjectOutput { pose, status })
                .collect(),
        };
        let json = serde_json::to_string(&out)
            .map_err(|e| TrackError::Config(format!("failed to encode frame output: {e}")))?;
        writeln!(output, "{json}").map_err(|e| TrackError::Io(format!("failed to write output: {e}")))?;
        summary.frames += 1;
    }

    output
        .flush()
        .map_err(|e| TrackError::Io(format!("failed to flush output: {e}")))?;
    Ok(summary)
}
