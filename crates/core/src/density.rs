//! Drive-path reconstruction and per-chunk detection density.
//!
//! Frames with a timestamp are ordered in time and split into continuous
//! paths wherever consecutive timestamps are more than `gap_ms` apart.
//! Each path is cut into fixed-length chunks, and every frame with
//! detections inside a chunk's buffer adds its count to that chunk.
//! Classes come from percentiles of the dataset's own densities.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::feature::Feature;
use crate::geometry::{chunk_path, distance_to_path_feet, within_expanded_bounds, Geometry, PathChunk};
use crate::normalize::Frame;
use crate::types::{EpochMillis, LngLat};

pub const PATH_GAP_MS: f64 = 10_000.0;
pub const DENSITY_CHUNK_FEET: f64 = 500.0;
pub const BUFFER_FEET: f64 = 25.0;

#[derive(Debug, Clone, PartialEq)]
pub struct DensityConfig {
    pub gap_ms: f64,
    pub chunk_feet: f64,
    pub buffer_feet: f64,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            gap_ms: PATH_GAP_MS,
            chunk_feet: DENSITY_CHUNK_FEET,
            buffer_feet: BUFFER_FEET,
        }
    }
}

impl DensityConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.gap_ms > 0.0) {
            return Err(CoreError::Validation("gap_ms must be positive".into()));
        }
        if !(self.chunk_feet > 0.0) {
            return Err(CoreError::Validation("chunk_feet must be positive".into()));
        }
        if !(self.buffer_feet >= 0.0) {
            return Err(CoreError::Validation("buffer_feet must not be negative".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityPoint {
    pub coordinate: LngLat,
    pub timestamp: Option<EpochMillis>,
    pub detection_count: usize,
}

/// Frames with a valid coordinate.
pub fn points_from_frames(frames: &[Frame]) -> Vec<DensityPoint> {
    frames
        .iter()
        .filter_map(|f| {
            let coordinate = f.coordinate.filter(|c| c.is_valid())?;
            Some(DensityPoint {
                coordinate,
                timestamp: f.global_timestamp.filter(|t| t.is_finite()),
                detection_count: f.detection_count,
            })
        })
        .collect()
}

/// Continuous paths of at least two positions, split on timestamp gaps.
pub fn split_paths(points: &[DensityPoint], gap_ms: f64) -> Vec<Vec<LngLat>> {
    let mut timed: Vec<(EpochMillis, LngLat)> = points
        .iter()
        .filter_map(|p| Some((p.timestamp?, p.coordinate)))
        .collect();
    timed.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut paths = Vec::new();
    let mut current: Vec<LngLat> = Vec::new();
    let mut last_ts: Option<EpochMillis> = None;
    for (ts, pos) in timed {
        if last_ts.is_some_and(|prev| ts - prev > gap_ms) {
            paths.push(std::mem::take(&mut current));
        }
        current.push(pos);
        last_ts = Some(ts);
    }
    paths.push(current);
    paths.retain(|p| p.len() >= 2);
    paths
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityClass {
    Low,
    Moderate,
    High,
    Severe,
}

/// Percentile cut-offs across all chunks of a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DensityThresholds {
    pub p50: f64,
    pub p70: f64,
    pub p85: f64,
}

impl DensityThresholds {
    pub fn from_densities(densities: &[f64]) -> Self {
        let mut sorted: Vec<f64> = densities.iter().copied().filter(|d| d.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);
        Self {
            p50: percentile(&sorted, 50.0),
            p70: percentile(&sorted, 70.0),
            p85: percentile(&sorted, 85.0),
        }
    }

    pub fn classify(&self, density: f64) -> DensityClass {
        if density > self.p85 {
            DensityClass::Severe
        } else if density > self.p70 {
            DensityClass::High
        } else if density > self.p50 {
            DensityClass::Moderate
        } else {
            DensityClass::Low
        }
    }
}

/// Linear-interpolation percentile of an ascending slice. `0.0` when empty.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted {
        [] => 0.0,
        [only] => *only,
        _ => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// One fixed-length piece of a drive path with its detection density.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityChunk {
    pub path_index: usize,
    pub chunk_index: usize,
    pub start_feet: f64,
    pub end_feet: f64,
    pub length_feet: f64,
    pub detections_in_segment: usize,
    /// Detections per foot.
    pub crack_density: f64,
    pub density_class: DensityClass,
    #[serde(skip)]
    pub coordinates: Vec<LngLat>,
}

impl DensityChunk {
    pub fn into_feature(self) -> Feature<DensityChunk> {
        let geometry = Geometry::LineString(self.coordinates.clone());
        Feature::new(Some(geometry), self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DensityReport {
    pub chunks: Vec<DensityChunk>,
    pub thresholds: DensityThresholds,
}

/// Sum of detection counts of `points` inside the chunk's buffer.
fn count_in_buffer(path: &[LngLat], points: &[DensityPoint], buffer_feet: f64) -> usize {
    points
        .iter()
        .filter(|p| within_expanded_bounds(p.coordinate, path, buffer_feet))
        .filter(|p| distance_to_path_feet(p.coordinate, path) <= buffer_feet)
        .map(|p| p.detection_count)
        .sum()
}

/// Run the full density analysis over normalized frames.
pub fn analyze_density(frames: &[Frame], config: &DensityConfig) -> DensityReport {
    let points = points_from_frames(frames);
    let paths = split_paths(&points, config.gap_ms);
    let detecting: Vec<DensityPoint> = points.iter().copied().filter(|p| p.detection_count > 0).collect();

    let pieces: Vec<(usize, usize, PathChunk)> = paths
        .iter()
        .enumerate()
        .flat_map(|(path_index, path)| {
            chunk_path(path, config.chunk_feet)
                .into_iter()
                .enumerate()
                .map(move |(chunk_index, chunk)| (path_index, chunk_index, chunk))
        })
        .collect();

    let counts: Vec<usize> = pieces
        .par_iter()
        .map(|(_, _, chunk)| count_in_buffer(&chunk.coordinates, &detecting, config.buffer_feet))
        .collect();

    let densities: Vec<f64> = pieces
        .iter()
        .zip(&counts)
        .map(|((_, _, chunk), count)| *count as f64 / chunk.length_feet())
        .collect();
    let thresholds = DensityThresholds::from_densities(&densities);

    let chunks: Vec<DensityChunk> = pieces
        .into_iter()
        .zip(counts)
        .zip(densities)
        .map(|(((path_index, chunk_index, chunk), count), density)| DensityChunk {
            path_index,
            chunk_index,
            start_feet: chunk.start_feet,
            end_feet: chunk.end_feet,
            length_feet: chunk.length_feet(),
            detections_in_segment: count,
            crack_density: density,
            density_class: thresholds.classify(density),
            coordinates: chunk.coordinates,
        })
        .collect();

    tracing::debug!(
        points = points.len(),
        paths = paths.len(),
        chunks = chunks.len(),
        "Computed path density"
    );
    DensityReport { chunks, thresholds }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DefectImages;
    use crate::geometry::feet_to_latitude_degrees;

    const ORIGIN: LngLat = LngLat(-83.0, 42.0);

    fn frame(feet: f64, ts: Option<f64>, count: usize) -> Frame {
        Frame {
            frame_id: None,
            coordinate: Some(LngLat(ORIGIN.0, ORIGIN.1 + feet_to_latitude_degrees(feet))),
            global_timestamp: ts,
            detections: Vec::new(),
            detection_count: count,
            images: DefectImages::default(),
            job_id: None,
        }
    }

    // -- paths -----------------------------------------------------------------

    #[test]
    fn splits_on_gaps_and_drops_single_points() {
        let frames = vec![
            frame(0.0, Some(1000.0), 0),
            frame(10.0, Some(0.0), 0),
            frame(20.0, Some(20_000.0), 0),
            frame(30.0, Some(21_000.0), 0),
            frame(40.0, Some(40_000.0), 0),
            frame(50.0, None, 0),
        ];
        let paths = split_paths(&points_from_frames(&frames), PATH_GAP_MS);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].len(), 2);
        // Ordered by time, not input order.
        assert_eq!(paths[0][0], frames[1].coordinate.unwrap());
    }

    #[test]
    fn exact_gap_does_not_split() {
        let frames = vec![frame(0.0, Some(0.0), 0), frame(10.0, Some(10_000.0), 0)];
        assert_eq!(split_paths(&points_from_frames(&frames), PATH_GAP_MS).len(), 1);
    }

    // -- percentiles -----------------------------------------------------------

    #[test]
    fn percentile_interpolates() {
        let sorted = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 50.0), 2.0);
        assert!((percentile(&sorted, 70.0) - 2.8).abs() < 1e-12);
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[7.0], 85.0), 7.0);
    }

    #[test]
    fn classification_bands() {
        let t = DensityThresholds {
            p50: 1.0,
            p70: 2.0,
            p85: 3.0,
        };
        assert_eq!(t.classify(0.5), DensityClass::Low);
        assert_eq!(t.classify(1.0), DensityClass::Low);
        assert_eq!(t.classify(1.5), DensityClass::Moderate);
        assert_eq!(t.classify(2.5), DensityClass::High);
        assert_eq!(t.classify(3.5), DensityClass::Severe);
    }

    // -- analysis --------------------------------------------------------------

    #[test]
    fn counts_detections_within_buffer() {
        let mut frames: Vec<Frame> = (0..=12)
            .map(|i| frame(i as f64 * 100.0, Some(i as f64 * 1000.0), 0))
            .collect();
        frames[1].detection_count = 2;
        frames[7].detection_count = 1;
        // Off-path detection, 100 ft east of the first chunk.
        let mut far = frame(200.0, None, 5);
        if let Some(c) = far.coordinate.as_mut() {
            c.0 += feet_to_latitude_degrees(100.0) / c.1.to_radians().cos();
        }
        frames.push(far);

        let report = analyze_density(&frames, &DensityConfig::default());
        assert_eq!(report.chunks.len(), 3);
        let counts: Vec<usize> = report.chunks.iter().map(|c| c.detections_in_segment).collect();
        assert_eq!(counts, vec![2, 1, 0]);
        assert!((report.chunks[0].crack_density - 0.004).abs() < 1e-9);
        assert_eq!(report.chunks[0].density_class, DensityClass::Severe);
        assert_eq!(report.chunks[1].density_class, DensityClass::Low);
        assert!((report.thresholds.p50 - 0.002).abs() < 1e-9);
    }

    #[test]
    fn no_paths_no_chunks() {
        let report = analyze_density(&[frame(0.0, None, 3)], &DensityConfig::default());
        assert!(report.chunks.is_empty());
        assert_eq!(report.thresholds, DensityThresholds::default());
    }

    #[test]
    fn config_validation() {
        assert!(DensityConfig::default().validate().is_ok());
        let bad = DensityConfig {
            chunk_feet: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
