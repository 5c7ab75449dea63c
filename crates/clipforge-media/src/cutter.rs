//! Multi-track range cutter.
//!
//! Selects a contiguous sample window per track for a `[start, end]`
//! second range. Video tracks snap the start back to the previous
//! keyframe so the copied bitstream stays decodable without re-encoding;
//! audio (and other) tracks cut at the nearest packet boundary.

use crate::mp4::{Track, TrackKind};
use serde::Serialize;

/// Timescale substituted for tracks that carry a zero timescale.
const FALLBACK_TIMESCALE: u32 = 1000;

/// Threshold above which a start shift counts as a keyframe adjustment.
const ADJUSTMENT_THRESHOLD_MS: f64 = 1.0;

/// Per-track outcome of a cut: requested vs actual window and deltas.
#[derive(Debug, Clone, Serialize)]
pub struct CutReport {
    pub kind: TrackKind,
    /// Requested and actual window boundaries, in seconds.
    pub requested_start: f64,
    pub actual_start: f64,
    pub requested_end: f64,
    pub actual_end: f64,
    /// Actual minus requested, in milliseconds.
    pub delta_start_ms: f64,
    pub delta_end_ms: f64,
    /// Number of samples in the narrowed track.
    pub samples_included: usize,
    /// True when a video start was moved to a keyframe by more than 1 ms.
    pub keyframe_adjusted: bool,
}

impl CutReport {
    /// Whether the window contained no samples and the track was dropped.
    pub fn is_empty(&self) -> bool {
        self.samples_included == 0
    }

    fn empty(kind: TrackKind, start_secs: f64, end_secs: f64) -> Self {
        Self {
            kind,
            requested_start: start_secs,
            actual_start: start_secs,
            requested_end: end_secs,
            actual_end: end_secs,
            delta_start_ms: 0.0,
            delta_end_ms: 0.0,
            samples_included: 0,
            keyframe_adjusted: false,
        }
    }
}

/// Narrows a set of tracks to a time window.
pub struct Cutter {
    tracks: Vec<Track>,
}

impl Cutter {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    /// Cut all tracks to `[start_secs, end_secs]`, both inclusive of the
    /// located samples.
    ///
    /// Returns the narrowed tracks and one report per input track.
    /// Tracks whose window is empty are dropped; their report remains,
    /// marked empty.
    pub fn cut(self, start_secs: f64, end_secs: f64) -> (Vec<Track>, Vec<CutReport>) {
        let mut out_tracks = Vec::with_capacity(self.tracks.len());
        let mut reports = Vec::with_capacity(self.tracks.len());

        for mut track in self.tracks {
            let kind = track.kind();
            let timescale = if track.timescale == 0 {
                FALLBACK_TIMESCALE
            } else {
                track.timescale
            };
            let start_units = (start_secs * f64::from(timescale)).floor() as u64;
            let end_units = (end_secs * f64::from(timescale)).floor() as u64;

            // A window that begins at or past the end of the track holds
            // nothing; without this check the snap rules would fall back
            // to the trailing samples.
            let track_end = track
                .samples
                .last()
                .map_or(0, |s| s.decode_time + s.duration);
            if start_units >= track_end {
                tracing::warn!(
                    kind = %kind,
                    start_units,
                    track_end,
                    "cut window starts past end of track; dropping track"
                );
                reports.push(CutReport::empty(kind, start_secs, end_secs));
                continue;
            }

            // Single pass: remember the latest qualifying start sample,
            // stop at the first sample at or past the end.
            let mut start_idx: Option<usize> = None;
            let mut end_idx: Option<usize> = None;
            for (i, sample) in track.samples.iter().enumerate() {
                if sample.decode_time <= start_units && (!kind.is_video() || sample.is_keyframe) {
                    start_idx = Some(i);
                }
                if sample.decode_time >= end_units {
                    end_idx = Some(i);
                    break;
                }
            }
            let start = start_idx.unwrap_or(0);
            let end = end_idx.unwrap_or_else(|| track.samples.len().saturating_sub(1));

            if start > end {
                tracing::warn!(
                    kind = %kind,
                    start_idx = start,
                    end_idx = end,
                    "cut window contains no samples; dropping track"
                );
                reports.push(CutReport::empty(kind, start_secs, end_secs));
                continue;
            }

            let actual_start = track.samples[start].decode_time as f64 / f64::from(timescale);
            let actual_end = track.samples[end].decode_time as f64 / f64::from(timescale);
            let delta_start_ms = (actual_start - start_secs) * 1000.0;
            let delta_end_ms = (actual_end - end_secs) * 1000.0;
            let keyframe_adjusted =
                kind.is_video() && delta_start_ms.abs() > ADJUSTMENT_THRESHOLD_MS;

            track.samples.truncate(end + 1);
            track.samples.drain(..start);

            // cts offsets run parallel to samples; clamp when the source
            // table was shorter than the sample count.
            if !track.cts_offsets.is_empty() {
                let clamped_end = (end + 1).min(track.cts_offsets.len());
                if start < clamped_end {
                    track.cts_offsets.truncate(clamped_end);
                    track.cts_offsets.drain(..start);
                } else {
                    track.cts_offsets.clear();
                }
            }

            if keyframe_adjusted {
                tracing::info!(
                    requested_secs = start_secs,
                    actual_secs = actual_start,
                    delta_ms = delta_start_ms,
                    "cut start moved to previous keyframe"
                );
            }
            tracing::info!(
                kind = %kind,
                timescale,
                samples = track.samples.len(),
                from_secs = actual_start,
                to_secs = actual_end,
                "narrowed track"
            );

            reports.push(CutReport {
                kind,
                requested_start: start_secs,
                actual_start,
                requested_end: end_secs,
                actual_end,
                delta_start_ms,
                delta_end_ms,
                samples_included: track.samples.len(),
                keyframe_adjusted,
            });
            out_tracks.push(track);
        }

        (out_tracks, reports)
    }
}
