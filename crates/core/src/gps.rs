//! Per-job GPS frames, derived speeds, and the frame-to-segment map.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::geometry::{haversine_feet, FEET_PER_MILE};
use crate::types::{EpochMillis, FrameId, LngLat};

/// One row of a job's GPS-frame log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsFrame {
    pub frame_id: FrameId,
    pub timestamp: Option<EpochMillis>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    /// Speed over the pair ending at this frame. `None` for the first frame
    /// and whenever elapsed time is unknown or non-positive.
    #[serde(default)]
    pub speed_mph: Option<f64>,
}

impl GpsFrame {
    pub fn new(frame_id: FrameId, timestamp: Option<EpochMillis>, latitude: f64, longitude: f64) -> Self {
        Self {
            frame_id,
            timestamp,
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
            speed_mph: None,
        }
    }

    pub fn position(&self) -> LngLat {
        LngLat(self.longitude, self.latitude)
    }
}

/// Order frames by id, drop invalid positions and repeated ids, and fill
/// `speed_mph` for each consecutive pair.
pub fn with_speeds(mut frames: Vec<GpsFrame>) -> Vec<GpsFrame> {
    frames.retain(|f| f.position().is_valid());
    frames.sort_by_key(|f| f.frame_id);
    frames.dedup_by_key(|f| f.frame_id);

    let mut prev: Option<(LngLat, Option<EpochMillis>)> = None;
    for frame in &mut frames {
        frame.speed_mph = prev.and_then(|(pos, ts)| {
            let elapsed_secs = (frame.timestamp? - ts?) / 1000.0;
            if !(elapsed_secs > 0.0) {
                return None;
            }
            let feet = haversine_feet(pos, frame.position());
            Some(feet / elapsed_secs * 3600.0 / FEET_PER_MILE)
        });
        prev = Some((frame.position(), frame.timestamp));
    }
    frames
}

// ---------------------------------------------------------------------------
// Segment spans
// ---------------------------------------------------------------------------

/// The stretch of path covered by one segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSpan {
    /// 0-based position along the job's path.
    pub segment_index: usize,
    pub start_feet: f64,
    pub end_feet: f64,
    /// Path positions inside the segment, in travel order.
    pub coordinates: Vec<LngLat>,
    pub first_frame: Option<FrameId>,
    pub last_frame: Option<FrameId>,
}

impl SegmentSpan {
    pub fn start(&self) -> Option<LngLat> {
        self.coordinates.first().copied()
    }

    pub fn end(&self) -> Option<LngLat> {
        self.coordinates.last().copied()
    }
}

// ---------------------------------------------------------------------------
// Frame -> segment map
// ---------------------------------------------------------------------------

/// Maps frame ids to distance-binned segments for one job.
#[derive(Debug, Clone, Default)]
pub struct FrameSegmentMap {
    segment_length_feet: f64,
    total_feet: f64,
    frame_to_segment: BTreeMap<FrameId, usize>,
    speeds: BTreeMap<FrameId, Option<f64>>,
    spans: BTreeMap<usize, SegmentSpan>,
}

impl FrameSegmentMap {
    /// Walk `frames` in frame-id order, accumulating great-circle distance,
    /// and assign `floor(cumulative_feet / segment_length_feet)`.
    pub fn build(frames: &[GpsFrame], segment_length_feet: f64) -> Self {
        let mut ordered: Vec<&GpsFrame> = frames.iter().filter(|f| f.position().is_valid()).collect();
        ordered.sort_by_key(|f| f.frame_id);

        let mut map = Self {
            segment_length_feet,
            ..Self::default()
        };
        if !(segment_length_feet > 0.0) {
            return map;
        }

        let mut cumulative = 0.0;
        let mut prev: Option<LngLat> = None;
        for frame in ordered {
            let pos = frame.position();
            if let Some(p) = prev {
                cumulative += haversine_feet(p, pos);
            }
            prev = Some(pos);

            let index = (cumulative / segment_length_feet).floor() as usize;
            map.frame_to_segment.entry(frame.frame_id).or_insert(index);
            map.speeds.entry(frame.frame_id).or_insert(frame.speed_mph);

            let span = map.spans.entry(index).or_insert_with(|| SegmentSpan {
                segment_index: index,
                start_feet: index as f64 * segment_length_feet,
                end_feet: (index + 1) as f64 * segment_length_feet,
                coordinates: Vec::new(),
                first_frame: Some(frame.frame_id),
                last_frame: None,
            });
            if span.coordinates.last() != Some(&pos) {
                span.coordinates.push(pos);
            }
            span.last_frame = Some(frame.frame_id);
        }
        map.total_feet = cumulative;

        if let Some(last) = map.spans.values_mut().next_back() {
            last.end_feet = cumulative.max(last.start_feet);
        }
        tracing::debug!(
            frames = map.frame_to_segment.len(),
            segments = map.spans.len(),
            total_feet = cumulative,
            "Built frame-to-segment map"
        );
        map
    }

    pub fn is_empty(&self) -> bool {
        self.frame_to_segment.is_empty()
    }

    pub fn segment_length_feet(&self) -> f64 {
        self.segment_length_feet
    }

    pub fn total_feet(&self) -> f64 {
        self.total_feet
    }

    pub fn segment_of(&self, frame_id: FrameId) -> Option<usize> {
        self.frame_to_segment.get(&frame_id).copied()
    }

    pub fn span(&self, segment_index: usize) -> Option<&SegmentSpan> {
        self.spans.get(&segment_index)
    }

    pub fn spans(&self) -> impl Iterator<Item = &SegmentSpan> {
        self.spans.values()
    }

    /// Segments touched by GPS frames whose id lies in `[min, max]`.
    ///
    /// When no GPS frame falls inside the range, the frame nearest to it is
    /// used instead (lower id on ties). Empty only when the map is empty.
    pub fn segments_for_range(&self, min: FrameId, max: FrameId) -> BTreeSet<usize> {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let inside: BTreeSet<usize> = self.frame_to_segment.range(min..=max).map(|(_, s)| *s).collect();
        if !inside.is_empty() {
            return inside;
        }
        let below = self.frame_to_segment.range(..min).next_back();
        let above = self.frame_to_segment.range(max..).next();
        let nearest = match (below, above) {
            (Some(b), Some(a)) => {
                if min - b.0 <= a.0 - max {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (b, a) => b.or(a),
        };
        nearest.map(|(_, s)| *s).into_iter().collect()
    }

    /// Speed at an arbitrary frame id.
    ///
    /// A GPS frame returns its own speed. Between two GPS frames the speed is
    /// interpolated linearly by frame id; when only one neighbor has a speed
    /// that one is used. Outside the GPS frame range there is no datum.
    pub fn speed_at(&self, frame_id: FrameId) -> Option<f64> {
        if let Some(speed) = self.speeds.get(&frame_id) {
            return *speed;
        }
        let (prev_id, prev) = self.speeds.range(..frame_id).next_back()?;
        let (next_id, next) = self.speeds.range(frame_id..).next()?;
        match (prev, next) {
            (Some(a), Some(b)) => {
                let t = (frame_id - prev_id) as f64 / (next_id - prev_id) as f64;
                Some(a + (b - a) * t)
            }
            (a, b) => a.or(*b),
        }
    }
}
