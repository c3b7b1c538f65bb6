//! Road segment building: parent/child tracks to fixed-length segments.
//!
//! Placement of tracks along a job's path uses, in order of preference:
//!
//! 1. GPS frames: frames are distance-binned into `segment_length_feet`
//!    segments and tracks are mapped through their frame ids.
//! 2. Geometric chunking: without GPS frames, the concatenated track
//!    coordinates are cut into `geometric_segment_length_feet` chunks.
//! 3. A single segment 0 holding everything.
//!
//! A parent that lands in one segment is assigned there wholesale. A
//! parent spanning several segments has each child assigned to every
//! segment the child touches, so damage is duplicated across overlapping
//! segments rather than split.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rayon::prelude::*;
use serde::Serialize;

use crate::error::CoreError;
use crate::feature::Feature;
use crate::geometry::{chunk_path, haversine_feet, Geometry};
use crate::gps::{with_speeds, FrameSegmentMap, GpsFrame, SegmentSpan};
use crate::pci::{calculate_pci, PciOptions, PciResult, PixelPercentages};
use crate::rating::PciRating;
use crate::tracks::{ChildKey, ChildTrack, TrackIndex, TrackSummary};
use crate::types::{DefectType, FrameId, LngLat};
use crate::video::{VideoRef, VideoSegmentIndex};

/// 0.1 mile.
pub const SEGMENT_LENGTH_FEET: f64 = 528.0;
pub const GEOMETRIC_SEGMENT_LENGTH_FEET: f64 = 500.0;
pub const MIN_SPEED_MPH: f64 = 5.0;

/// Boundary tolerance when mapping distances to chunk indices.
const BOUNDARY_EPSILON_FEET: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentBuilderConfig {
    pub segment_length_feet: f64,
    pub geometric_segment_length_feet: f64,
    /// Defects on frames slower than this do not count as damage.
    pub min_speed_mph: f64,
    /// Chunk track coordinates when a job has no GPS frames.
    pub geometric_fallback: bool,
    pub include_sealed_in_pci: bool,
}

impl Default for SegmentBuilderConfig {
    fn default() -> Self {
        Self {
            segment_length_feet: SEGMENT_LENGTH_FEET,
            geometric_segment_length_feet: GEOMETRIC_SEGMENT_LENGTH_FEET,
            min_speed_mph: MIN_SPEED_MPH,
            geometric_fallback: true,
            include_sealed_in_pci: true,
        }
    }
}

impl SegmentBuilderConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.segment_length_feet > 0.0) {
            return Err(CoreError::Validation(format!(
                "segment_length_feet must be positive, got {}",
                self.segment_length_feet
            )));
        }
        if !(self.geometric_segment_length_feet > 0.0) {
            return Err(CoreError::Validation(format!(
                "geometric_segment_length_feet must be positive, got {}",
                self.geometric_segment_length_feet
            )));
        }
        if !(self.min_speed_mph >= 0.0) {
            return Err(CoreError::Validation(format!(
                "min_speed_mph must not be negative, got {}",
                self.min_speed_mph
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Input / output
// ---------------------------------------------------------------------------

/// Everything known about one job.
#[derive(Debug, Clone, Default)]
pub struct JobInput {
    pub job_id: String,
    pub tracks: TrackIndex,
    pub gps_frames: Vec<GpsFrame>,
    pub video_index: Option<VideoSegmentIndex>,
}

impl JobInput {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Self::default()
        }
    }
}

/// How a segment's position along the path was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentSource {
    Gps,
    Geometric,
    Single,
}

/// One fixed-length stretch of road with its aggregated damage and score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoadSegment {
    pub job_id: String,
    /// 0-based position along the job's path.
    pub segment_index: usize,
    /// 1-based, matches video segment ids.
    pub segment_id: usize,
    pub source: SegmentSource,
    pub start_feet: f64,
    pub end_feet: f64,
    pub start_coordinate: Option<LngLat>,
    pub end_coordinate: Option<LngLat>,
    pub damage_count: u32,
    pub defect_types: BTreeSet<DefectType>,
    pub severity_labels: BTreeSet<String>,
    pub overlapping_tracks: Vec<TrackSummary>,
    pub job_ids: BTreeSet<String>,
    pub pixel_percentages: Option<PixelPercentages>,
    pub video: Option<VideoRef>,
    pub pci_score: f64,
    pub pci_rating: PciRating,
    pub pci_details: PciResult,
    #[serde(skip)]
    pub geometry: Geometry,
}

impl RoadSegment {
    pub fn into_feature(self) -> Feature<RoadSegment> {
        let geometry = self.geometry.clone();
        Feature::new(Some(geometry), self)
    }
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// Track positions from concatenated track coordinates.
#[derive(Debug, Default)]
struct GeometricLayout {
    child_segments: HashMap<ChildKey, BTreeSet<usize>>,
    spans: BTreeMap<usize, SegmentSpan>,
}

impl GeometricLayout {
    fn build(groups: &BTreeMap<&str, Vec<&ChildTrack>>, chunk_feet: f64) -> Option<Self> {
        let mut path: Vec<LngLat> = Vec::new();
        let mut cumulative = 0.0;
        let mut extents: Vec<(ChildKey, f64, f64)> = Vec::new();

        for child in groups.values().flatten() {
            let mut extent: Option<(f64, f64)> = None;
            for &pos in child.coordinates.iter().filter(|p| p.is_valid()) {
                if let Some(&last) = path.last() {
                    cumulative += haversine_feet(last, pos);
                }
                path.push(pos);
                extent = Some(extent.map_or((cumulative, cumulative), |(s, _)| (s, cumulative)));
            }
            if let Some((start, end)) = extent {
                extents.push((child.key(), start, end));
            }
        }

        let chunks = chunk_path(&path, chunk_feet);
        if chunks.is_empty() {
            return None;
        }
        let last_chunk = chunks.len() - 1;
        let index_of = |feet: f64| ((feet / chunk_feet).floor() as usize).min(last_chunk);

        let child_segments = extents
            .into_iter()
            .map(|(key, start, end)| {
                let first = index_of(start);
                let last = if end > start {
                    index_of((end - BOUNDARY_EPSILON_FEET).max(start))
                } else {
                    first
                };
                (key, (first..=last).collect())
            })
            .collect();
        let spans = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                (
                    i,
                    SegmentSpan {
                        segment_index: i,
                        start_feet: chunk.start_feet,
                        end_feet: chunk.end_feet,
                        coordinates: chunk.coordinates,
                        first_frame: None,
                        last_frame: None,
                    },
                )
            })
            .collect();
        Some(Self { child_segments, spans })
    }
}

#[derive(Debug)]
enum Placement {
    Gps(FrameSegmentMap),
    Geometric(GeometricLayout),
    Single,
}

impl Placement {
    fn source(&self) -> SegmentSource {
        match self {
            Placement::Gps(_) => SegmentSource::Gps,
            Placement::Geometric(_) => SegmentSource::Geometric,
            Placement::Single => SegmentSource::Single,
        }
    }

    fn range_segments(map: &FrameSegmentMap, span: Option<(FrameId, FrameId)>) -> BTreeSet<usize> {
        span.map(|(a, b)| map.segments_for_range(a, b)).unwrap_or_default()
    }

    fn parent_segments(&self, tracks: &TrackIndex, parent_id: &str, children: &[&ChildTrack]) -> BTreeSet<usize> {
        match self {
            Placement::Gps(map) => Self::range_segments(map, tracks.parent_frame_span(parent_id, children)),
            Placement::Geometric(_) => children.iter().flat_map(|c| self.child_segments(c)).collect(),
            Placement::Single => BTreeSet::from([0]),
        }
    }

    fn child_segments(&self, child: &ChildTrack) -> BTreeSet<usize> {
        match self {
            Placement::Gps(map) => Self::range_segments(map, child.frame_span()),
            Placement::Geometric(layout) => layout.child_segments.get(&child.key()).cloned().unwrap_or_default(),
            Placement::Single => BTreeSet::from([0]),
        }
    }

    fn span(&self, segment_index: usize) -> Option<&SegmentSpan> {
        match self {
            Placement::Gps(map) => map.span(segment_index),
            Placement::Geometric(layout) => layout.spans.get(&segment_index),
            Placement::Single => None,
        }
    }

    fn speed_at(&self, frame_id: FrameId) -> Option<f64> {
        match self {
            Placement::Gps(map) => map.speed_at(frame_id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SegmentBuilder {
    config: SegmentBuilderConfig,
}

/// Borrowed `(parent_track_id, track_id)`.
type ChildRef<'a> = (&'a str, &'a str);

/// Children assigned to one segment.
type Bucket<'a> = BTreeMap<ChildRef<'a>, &'a ChildTrack>;

fn child_ref(child: &ChildTrack) -> ChildRef<'_> {
    (child.parent_track_id.as_str(), child.track_id.as_str())
}

impl SegmentBuilder {
    pub fn new(config: SegmentBuilderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentBuilderConfig {
        &self.config
    }

    /// Build segments for every job. Jobs are processed in parallel; output
    /// is sorted by job id, then segment index.
    pub fn build(&self, jobs: &[JobInput]) -> Vec<RoadSegment> {
        let mut segments: Vec<RoadSegment> = jobs.par_iter().flat_map_iter(|job| self.build_job(job)).collect();
        segments.sort_by(|a, b| {
            a.job_id
                .cmp(&b.job_id)
                .then(a.segment_index.cmp(&b.segment_index))
        });
        segments
    }

    fn placement_for(&self, job: &JobInput, groups: &BTreeMap<&str, Vec<&ChildTrack>>) -> Placement {
        if !job.gps_frames.is_empty() {
            let frames = with_speeds(job.gps_frames.clone());
            let map = FrameSegmentMap::build(&frames, self.config.segment_length_feet);
            if !map.is_empty() {
                return Placement::Gps(map);
            }
        }
        if self.config.geometric_fallback {
            if let Some(layout) = GeometricLayout::build(groups, self.config.geometric_segment_length_feet) {
                return Placement::Geometric(layout);
            }
        }
        Placement::Single
    }

    /// Build the segments of a single job, sorted by segment index.
    pub fn build_job(&self, job: &JobInput) -> Vec<RoadSegment> {
        let groups = job.tracks.children_by_parent();
        let placement = self.placement_for(job, &groups);

        let mut buckets: BTreeMap<usize, Bucket<'_>> = BTreeMap::new();
        let mut child_spans: HashMap<ChildRef<'_>, (usize, usize)> = HashMap::new();

        for (parent_id, children) in &groups {
            let parent_segments = placement.parent_segments(&job.tracks, parent_id, children);
            let home = parent_segments.first().copied().unwrap_or(0);

            for &child in children {
                let targets = if parent_segments.len() <= 1 {
                    BTreeSet::from([home])
                } else {
                    let own = placement.child_segments(child);
                    if own.is_empty() {
                        BTreeSet::from([home])
                    } else {
                        own
                    }
                };
                for &segment in &targets {
                    buckets
                        .entry(segment)
                        .or_default()
                        .insert(child_ref(child), child);
                }
                if let (Some(&first), Some(&last)) = (targets.first(), targets.last()) {
                    child_spans.insert(child_ref(child), (first, last));
                }
            }
        }

        let total_buckets = buckets.len();
        let segments: Vec<RoadSegment> = buckets
            .into_iter()
            .filter_map(|(index, bucket)| self.finish_segment(job, &placement, index, &bucket, &child_spans))
            .collect();

        tracing::debug!(
            job_id = %job.job_id,
            source = ?placement.source(),
            parents = groups.len(),
            segments = segments.len(),
            dropped = total_buckets - segments.len(),
            "Built road segments"
        );
        segments
    }

    fn finish_segment(
        &self,
        job: &JobInput,
        placement: &Placement,
        index: usize,
        bucket: &Bucket<'_>,
        child_spans: &HashMap<ChildRef<'_>, (usize, usize)>,
    ) -> Option<RoadSegment> {
        let span = placement.span(index);
        let Some(geometry) = resolve_geometry(span, bucket.values().copied()) else {
            tracing::debug!(job_id = %job.job_id, segment_index = index, "Dropping segment without geometry");
            return None;
        };

        let speed_at = |f: FrameId| placement.speed_at(f);
        let mut damage_count = 0;
        let mut defect_types = BTreeSet::new();
        let mut severity_labels = BTreeSet::new();
        let mut defect_counts: BTreeMap<DefectType, u32> = BTreeMap::new();
        let mut job_ids = BTreeSet::from([job.job_id.clone()]);
        let mut overlapping_tracks = Vec::with_capacity(bucket.len());

        for child in bucket.values() {
            let track_damage = child.track_damage(speed_at, self.config.min_speed_mph);
            damage_count += track_damage;
            defect_types.extend(child.defect_types());
            severity_labels.extend(child.severity_labels());
            for (t, n) in child.defect_counts() {
                *defect_counts.entry(t).or_insert(0) += n;
            }
            job_ids.extend(child.job_id.clone());
            overlapping_tracks.push(TrackSummary {
                track_id: child.track_id.clone(),
                parent_track_id: child.parent_track_id.clone(),
                job_id: child.job_id.clone(),
                track_damage,
                defect_types: child.defect_types(),
                severity_labels: child.severity_labels(),
                length_m: child.length_meters(),
                frame_span: child.frame_span(),
                segment_span: child_spans.get(&child_ref(child)).copied().unwrap_or((index, index)),
                representative_thumbnail: child.representative_thumbnail().map(str::to_string),
            });
        }

        let video = job.video_index.as_ref().and_then(|v| v.for_road_segment(index));
        let pixel_percentages = video.and_then(|v| v.pixel_percentages);
        let pci = calculate_pci(
            &pixel_percentages.unwrap_or_default(),
            &PciOptions {
                include_sealed: self.config.include_sealed_in_pci,
                defect_counts,
            },
        );

        let length = match placement.source() {
            SegmentSource::Geometric => self.config.geometric_segment_length_feet,
            _ => self.config.segment_length_feet,
        };
        let (start_feet, end_feet) = span
            .map(|s| (s.start_feet, s.end_feet))
            .unwrap_or((index as f64 * length, (index + 1) as f64 * length));
        let (start_coordinate, end_coordinate) = match span {
            Some(s) => (s.start(), s.end()),
            None => endpoints(&geometry),
        };

        Some(RoadSegment {
            job_id: job.job_id.clone(),
            segment_index: index,
            segment_id: index + 1,
            source: placement.source(),
            start_feet,
            end_feet,
            start_coordinate,
            end_coordinate,
            damage_count,
            defect_types,
            severity_labels,
            overlapping_tracks,
            job_ids,
            pixel_percentages,
            video: video.map(VideoRef::from),
            pci_score: pci.pci_score,
            pci_rating: pci.pci_rating,
            pci_details: pci,
            geometry,
        })
    }
}

/// Span positions first, then the first track with coordinates. Two or
/// more positions make a line; a lone position makes a point.
fn resolve_geometry<'a>(
    span: Option<&SegmentSpan>,
    mut tracks: impl Iterator<Item = &'a ChildTrack>,
) -> Option<Geometry> {
    let span_coords = span.map(|s| s.coordinates.as_slice()).unwrap_or_default();
    if span_coords.len() >= 2 {
        return Some(Geometry::LineString(span_coords.to_vec()));
    }
    let track_coords: Vec<LngLat> = tracks
        .find(|t| t.coordinates.iter().any(|p| p.is_valid()))
        .map(|t| t.coordinates.iter().copied().filter(|p| p.is_valid()).collect())
        .unwrap_or_default();
    if track_coords.len() >= 2 {
        return Some(Geometry::LineString(track_coords));
    }
    span_coords
        .first()
        .or(track_coords.first())
        .map(|p| Geometry::Point(*p))
}

fn endpoints(geometry: &Geometry) -> (Option<LngLat>, Option<LngLat>) {
    match geometry {
        Geometry::Point(p) => (Some(*p), Some(*p)),
        Geometry::LineString(line) => (line.first().copied(), line.last().copied()),
        Geometry::Polygon(rings) => {
            let ring = rings.first();
            (
                ring.and_then(|r| r.first().copied()),
                ring.and_then(|r| r.last().copied()),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Detection;
    use crate::geometry::feet_to_latitude_degrees;
    use crate::tracks::ParentTrack;
    use crate::video::VideoSegment;

    const ORIGIN: LngLat = LngLat(-83.0, 42.0);

    fn north(feet: f64) -> LngLat {
        LngLat(ORIGIN.0, ORIGIN.1 + feet_to_latitude_degrees(feet))
    }

    fn gps(id: FrameId, feet: f64) -> GpsFrame {
        let p = north(feet);
        GpsFrame::new(id, None, p.1, p.0)
    }

    fn child(id: &str, parent: &str, range: Option<(FrameId, FrameId)>, defects: Vec<(DefectType, FrameId)>) -> ChildTrack {
        let mut c = ChildTrack::new(id, parent);
        c.frame_range = range;
        c.defects = defects
            .into_iter()
            .map(|(t, f)| Detection {
                frame_id: Some(f),
                ..Detection::of_type(t)
            })
            .collect();
        c
    }

    fn job_with(children: Vec<ChildTrack>, frames: Vec<GpsFrame>) -> JobInput {
        let mut job = JobInput::new("job-1");
        for c in &children {
            if !job.tracks.parents.contains_key(&c.parent_track_id) {
                job.tracks.insert_parent(ParentTrack::new(c.parent_track_id.clone()));
            }
        }
        for c in children {
            job.tracks.insert_child(c);
        }
        job.gps_frames = frames;
        job
    }

    // -- gps placement ---------------------------------------------------------

    #[test]
    fn child_spanning_two_segments_is_duplicated() {
        let job = job_with(
            vec![child("c1", "p1", Some((0, 2)), vec![(DefectType::Transverse, 1)])],
            vec![gps(0, 0.0), gps(1, 300.0), gps(2, 600.0)],
        );
        let segments = SegmentBuilder::default().build_job(&job);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].segment_id, 1);
        assert_eq!(segments[1].segment_id, 2);
        assert!(segments.iter().all(|s| s.damage_count == 1));
        assert_eq!(segments[0].overlapping_tracks[0].segment_span, (0, 1));
        assert_eq!(segments[0].source, SegmentSource::Gps);
        assert_eq!(segments[0].start_coordinate, Some(north(0.0)));
    }

    #[test]
    fn parent_in_one_segment_is_assigned_wholesale() {
        let job = job_with(
            vec![
                child("a", "p", Some((0, 1)), vec![(DefectType::Alligator, 0)]),
                child("b", "p", None, vec![(DefectType::Pothole, 1), (DefectType::SealedCrack, 1)]),
            ],
            vec![gps(0, 0.0), gps(1, 300.0), gps(2, 600.0)],
        );
        let segments = SegmentBuilder::default().build_job(&job);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].segment_index, 0);
        assert_eq!(segments[0].damage_count, 2);
        assert!(segments[0].defect_types.contains(&DefectType::SealedCrack));
        assert_eq!(segments[0].pci_details.damage_metrics.defect_counts[&DefectType::Pothole], 1);
    }

    #[test]
    fn slow_frames_do_not_count() {
        let mut frames = vec![gps(0, 0.0), gps(1, 1.0), gps(2, 300.0)];
        frames[0].timestamp = Some(0.0);
        frames[1].timestamp = Some(1000.0);
        frames[2].timestamp = Some(2000.0);
        let job = job_with(
            vec![child(
                "a",
                "p",
                Some((0, 2)),
                vec![(DefectType::Alligator, 1), (DefectType::Alligator, 2), (DefectType::Alligator, 0)],
            )],
            frames,
        );
        let segments = SegmentBuilder::default().build_job(&job);
        // Frame 1 moves 1 ft in 1 s; frame 0 has no speed datum.
        assert_eq!(segments[0].damage_count, 2);
    }

    #[test]
    fn shared_child_ids_under_different_parents_both_count() {
        let job = job_with(
            vec![
                child("1", "P1", Some((0, 2)), vec![(DefectType::Alligator, 1)]),
                child("1", "P2", Some((10, 12)), vec![(DefectType::Pothole, 11)]),
            ],
            (0..=12).map(|i| gps(i, i as f64 * 40.0)).collect(),
        );
        assert_eq!(job.tracks.children.len(), 2);

        let segments = SegmentBuilder::default().build_job(&job);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].damage_count, 2);
        let parents: Vec<&str> = segments[0]
            .overlapping_tracks
            .iter()
            .map(|t| t.parent_track_id.as_str())
            .collect();
        assert_eq!(parents, vec!["P1", "P2"]);
    }

    // -- fallbacks -------------------------------------------------------------

    #[test]
    fn no_gps_and_no_path_lands_in_segment_zero() {
        let mut c = child("a", "p", Some((0, 500)), vec![(DefectType::Pothole, 3)]);
        c.coordinates = vec![ORIGIN];
        let job = job_with(vec![c], Vec::new());
        let segments = SegmentBuilder::default().build_job(&job);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].source, SegmentSource::Single);
        assert_eq!(segments[0].geometry, Geometry::Point(ORIGIN));
    }

    #[test]
    fn segment_without_geometry_is_dropped() {
        let job = job_with(vec![child("a", "p", None, vec![(DefectType::Pothole, 3)])], Vec::new());
        assert!(SegmentBuilder::default().build_job(&job).is_empty());
    }

    #[test]
    fn geometric_fallback_chunks_track_coordinates() {
        let mut a = child("a", "p", None, vec![(DefectType::Transverse, 0)]);
        a.coordinates = vec![north(0.0), north(400.0)];
        let mut b = child("b", "p", None, vec![(DefectType::Longitudinal, 0)]);
        b.coordinates = vec![north(450.0), north(700.0)];
        let job = job_with(vec![a, b], Vec::new());

        let segments = SegmentBuilder::default().build_job(&job);
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.source == SegmentSource::Geometric));
        assert_eq!(segments[0].damage_count, 2);
        assert_eq!(segments[1].damage_count, 1);
        assert_eq!(segments[1].start_feet, 500.0);

        let no_fallback = SegmentBuilder::new(SegmentBuilderConfig {
            geometric_fallback: false,
            ..Default::default()
        })
        .build_job(&job);
        assert_eq!(no_fallback.len(), 1);
        assert_eq!(no_fallback[0].source, SegmentSource::Single);
        assert_eq!(no_fallback[0].damage_count, 2);
    }

    #[test]
    fn geometric_layout_keeps_shared_child_ids_apart() {
        let mut a = child("1", "P1", None, vec![(DefectType::Transverse, 0)]);
        a.coordinates = vec![north(0.0), north(100.0)];
        let mut b = child("1", "P2", None, vec![(DefectType::Pothole, 0)]);
        b.coordinates = vec![north(600.0), north(700.0)];
        let job = job_with(vec![a, b], Vec::new());

        let segments = SegmentBuilder::default().build_job(&job);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].overlapping_tracks[0].parent_track_id, "P1");
        assert_eq!(segments[1].overlapping_tracks[0].parent_track_id, "P2");
        assert_eq!(segments.iter().map(|s| s.damage_count).sum::<u32>(), 2);
    }

    // -- video and scoring -----------------------------------------------------

    #[test]
    fn video_pixels_drive_the_score() {
        let mut job = job_with(
            vec![child("a", "p", Some((0, 2)), vec![(DefectType::Alligator, 1)])],
            vec![gps(0, 0.0), gps(1, 300.0), gps(2, 600.0)],
        );
        job.video_index = Some(VideoSegmentIndex::new([VideoSegment {
            segment_id: 1,
            frame_range: Some((0, 1)),
            master_playlist_url: Some("https://v/1.m3u8".into()),
            gps_start: None,
            gps_end: None,
            pixel_percentages: Some(PixelPercentages {
                alligator: 1.0,
                ..Default::default()
            }),
        }]));
        let segments = SegmentBuilder::default().build_job(&job);
        assert_eq!(segments[0].pci_score, 72.0);
        assert_eq!(segments[0].pci_rating, PciRating::Satisfactory);
        assert_eq!(segments[0].video.as_ref().unwrap().segment_id, 1);
        // Unmatched segment keeps a clean score and no pixel data.
        assert_eq!(segments[1].pixel_percentages, None);
        assert_eq!(segments[1].pci_score, 100.0);
    }

    #[test]
    fn output_sorted_by_job_then_segment() {
        let frames = vec![gps(0, 0.0), gps(1, 300.0), gps(2, 600.0)];
        let mut b = job_with(vec![child("x", "p", Some((0, 2)), vec![])], frames.clone());
        b.job_id = "job-b".into();
        let mut a = job_with(vec![child("y", "p", Some((2, 2)), vec![])], frames);
        a.job_id = "job-a".into();

        let segments = SegmentBuilder::default().build(&[b, a]);
        let keys: Vec<(&str, usize)> = segments.iter().map(|s| (s.job_id.as_str(), s.segment_index)).collect();
        assert_eq!(keys, vec![("job-a", 1), ("job-b", 0), ("job-b", 1)]);
    }

    #[test]
    fn config_validation() {
        assert!(SegmentBuilderConfig::default().validate().is_ok());
        let bad = SegmentBuilderConfig {
            segment_length_feet: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
