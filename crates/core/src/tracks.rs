//! Parent and child tracks, kept as two flat indexed collections joined by
//! the child's `parent_track_id`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coerce::{coerce_frame_id, coerce_number, first_number, first_string};
use crate::detection::Detection;
use crate::geometry::{haversine_meters, Geometry};
use crate::normalize::RawFeature;
use crate::storage_url::StorageUrlResolver;
use crate::types::{DefectType, FrameId, LngLat};

const PARENT_ID_KEYS: &[&str] = &["parent_track_id", "parent_id", "id"];
const CHILD_ID_KEYS: &[&str] = &["track_id", "child_track_id", "id"];
const CHILD_LIST_KEYS: &[&str] = &["child_tracks", "children", "tracks"];
const DEFECT_LIST_KEYS: &[&str] = &["defects", "detections", "all_detections"];

/// Job id from a source URL or path: the segment right before the file name.
///
/// `s3://bucket/runs/job-42/detections.geojson` yields `job-42`.
pub fn job_id_from_source(source: &str) -> Option<String> {
    let path = source.split(['?', '#']).next().unwrap_or_default();
    let path = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    let mut parts = path.trim_end_matches('/').rsplit('/');
    parts.next()?;
    parts
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `[start, end]` array or `{start, end}` / `{min, max}` object, ordered.
pub fn parse_frame_range(value: Option<&Value>) -> Option<(FrameId, FrameId)> {
    let (a, b) = match value? {
        Value::Array(items) if items.len() >= 2 => (coerce_frame_id(&items[0])?, coerce_frame_id(&items[1])?),
        Value::Object(obj) => {
            let pick = |keys: &[&str]| keys.iter().find_map(|k| obj.get(*k).and_then(coerce_frame_id));
            (pick(&["start", "min", "from"])?, pick(&["end", "max", "to"])?)
        }
        _ => return None,
    };
    Some((a.min(b), a.max(b)))
}

fn union_span(a: Option<(FrameId, FrameId)>, b: Option<(FrameId, FrameId)>) -> Option<(FrameId, FrameId)> {
    match (a, b) {
        (Some(x), Some(y)) => Some((x.0.min(y.0), x.1.max(y.1))),
        (x, y) => x.or(y),
    }
}

fn parse_coordinates(value: Option<&Value>) -> Vec<LngLat> {
    let Some(value) = value else {
        return Vec::new();
    };
    if value.is_object() {
        return match Geometry::from_value(value) {
            Some(Geometry::LineString(line)) => line,
            Some(Geometry::Point(p)) => vec![p],
            _ => Vec::new(),
        };
    }
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|pos| {
                    let arr = pos.as_array()?;
                    let p = LngLat(coerce_number(arr.first()?)?, coerce_number(arr.get(1)?)?);
                    p.is_valid().then_some(p)
                })
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Child track
// ---------------------------------------------------------------------------

/// A single crack lineage followed across consecutive frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildTrack {
    pub track_id: String,
    pub parent_track_id: String,
    pub job_id: Option<String>,
    pub frame_range: Option<(FrameId, FrameId)>,
    pub coordinates: Vec<LngLat>,
    pub defects: Vec<Detection>,
    /// Ground-truth physical length in meters.
    pub measured_real_length: Option<f64>,
    pub gps_length_m: Option<f64>,
}

impl ChildTrack {
    pub fn new(track_id: impl Into<String>, parent_track_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            parent_track_id: parent_track_id.into(),
            job_id: None,
            frame_range: None,
            coordinates: Vec::new(),
            defects: Vec::new(),
            measured_real_length: None,
            gps_length_m: None,
        }
    }

    /// Length in meters: measured, then GPS-reported, then the geometric
    /// length of `coordinates`.
    pub fn length_meters(&self) -> f64 {
        let positive = |v: Option<f64>| v.filter(|m| m.is_finite() && *m > 0.0);
        positive(self.measured_real_length)
            .or_else(|| positive(self.gps_length_m))
            .unwrap_or_else(|| {
                self.coordinates
                    .windows(2)
                    .map(|w| haversine_meters(w[0], w[1]))
                    .sum()
            })
    }

    /// Frame-id span from the stated range plus every defect's frame.
    pub fn frame_span(&self) -> Option<(FrameId, FrameId)> {
        self.defects
            .iter()
            .filter_map(|d| d.frame_id)
            .fold(self.frame_range, |span, f| union_span(span, Some((f, f))))
    }

    pub fn defect_types(&self) -> BTreeSet<DefectType> {
        self.defects.iter().map(|d| d.defect_type).collect()
    }

    pub fn severity_labels(&self) -> BTreeSet<String> {
        self.defects
            .iter()
            .filter_map(|d| d.severity_label())
            .map(str::to_string)
            .collect()
    }

    pub fn defect_counts(&self) -> BTreeMap<DefectType, u32> {
        let mut counts = BTreeMap::new();
        for d in &self.defects {
            *counts.entry(d.defect_type).or_insert(0) += 1;
        }
        counts
    }

    /// Index key: child ids are only unique within their parent.
    pub fn key(&self) -> ChildKey {
        (self.parent_track_id.clone(), self.track_id.clone())
    }

    /// First thumbnail among the defects, in defect order.
    pub fn representative_thumbnail(&self) -> Option<&str> {
        self.defects.iter().find_map(|d| d.images.thumbnail.as_deref())
    }

    /// Count of damaging defects.
    ///
    /// Sealed cracks never count. A defect whose frame speed is known and
    /// below `min_speed_mph` does not count either; unknown speed counts.
    pub fn track_damage<F>(&self, speed_at: F, min_speed_mph: f64) -> u32
    where
        F: Fn(FrameId) -> Option<f64>,
    {
        self.defects
            .iter()
            .filter(|d| d.counts_as_damage())
            .filter(|d| match d.frame_id.and_then(&speed_at) {
                Some(speed) => speed >= min_speed_mph,
                None => true,
            })
            .count() as u32
    }

    /// Parse one child track object. Missing ids fall back to
    /// `<parent>-<position>`.
    pub fn from_value(
        value: &Value,
        parent_track_id: &str,
        position: usize,
        resolver: &StorageUrlResolver,
    ) -> Option<Self> {
        let obj = value.as_object()?;
        let track_id = first_string(obj, CHILD_ID_KEYS).unwrap_or_else(|| format!("{parent_track_id}-{position}"));
        let defects = DEFECT_LIST_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array))
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .filter_map(|d| Detection::from_properties(d, resolver))
                    .map(|mut d| {
                        if d.track_id.is_none() {
                            d.track_id = Some(track_id.clone());
                        }
                        d
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            parent_track_id: first_string(obj, &["parent_track_id"]).unwrap_or_else(|| parent_track_id.to_string()),
            job_id: first_string(obj, &["job_id"]),
            frame_range: parse_frame_range(obj.get("frame_range")),
            coordinates: parse_coordinates(obj.get("coordinates").or_else(|| obj.get("geometry"))),
            defects,
            measured_real_length: first_number(obj, &["measured_real_length", "real_length_m"]),
            gps_length_m: first_number(obj, &["gps_length_m", "gps_length"]),
            track_id,
        })
    }
}

// ---------------------------------------------------------------------------
// Parent track
// ---------------------------------------------------------------------------

/// Groups the child tracks of one detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentTrack {
    pub parent_track_id: String,
    pub job_id: Option<String>,
    pub frame_range: Option<(FrameId, FrameId)>,
}

impl ParentTrack {
    pub fn new(parent_track_id: impl Into<String>) -> Self {
        Self {
            parent_track_id: parent_track_id.into(),
            job_id: None,
            frame_range: None,
        }
    }
}

/// Summary of one child track as it appears on a road segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub track_id: String,
    pub parent_track_id: String,
    pub job_id: Option<String>,
    pub track_damage: u32,
    pub defect_types: BTreeSet<DefectType>,
    pub severity_labels: BTreeSet<String>,
    pub length_m: f64,
    pub frame_span: Option<(FrameId, FrameId)>,
    /// First and last 0-based segment this track touches.
    pub segment_span: (usize, usize),
    pub representative_thumbnail: Option<String>,
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// `(parent_track_id, track_id)` of a child track.
pub type ChildKey = (String, String);

/// All tracks of one job. Parents are keyed by id, children by
/// [`ChildKey`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackIndex {
    pub parents: BTreeMap<String, ParentTrack>,
    pub children: BTreeMap<ChildKey, ChildTrack>,
}

impl TrackIndex {
    pub fn insert_parent(&mut self, parent: ParentTrack) {
        self.parents.insert(parent.parent_track_id.clone(), parent);
    }

    pub fn insert_child(&mut self, child: ChildTrack) {
        self.children.insert(child.key(), child);
    }

    pub fn child(&self, parent_track_id: &str, track_id: &str) -> Option<&ChildTrack> {
        self.children.get(&(parent_track_id.to_string(), track_id.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty() && self.children.is_empty()
    }

    /// Children grouped by parent id, in child-id order. Children whose
    /// parent is not indexed form their own group under that id.
    pub fn children_by_parent(&self) -> BTreeMap<&str, Vec<&ChildTrack>> {
        let mut groups: BTreeMap<&str, Vec<&ChildTrack>> = self
            .parents
            .keys()
            .map(|id| (id.as_str(), Vec::new()))
            .collect();
        for child in self.children.values() {
            groups.entry(child.parent_track_id.as_str()).or_default().push(child);
        }
        groups
    }

    /// Parent frame span: its own range widened by every child's span.
    pub fn parent_frame_span(&self, parent_track_id: &str, children: &[&ChildTrack]) -> Option<(FrameId, FrameId)> {
        let own = self.parents.get(parent_track_id).and_then(|p| p.frame_range);
        children
            .iter()
            .fold(own, |span, child| union_span(span, child.frame_span()))
    }

    /// Parse `[parent, ...]` or `{"parent_tracks": [...]}`.
    ///
    /// Each parent carries its children inline. Records that are not
    /// objects are skipped.
    pub fn from_value(value: &Value, resolver: &StorageUrlResolver) -> Self {
        let parents = match value {
            Value::Array(items) => Some(items),
            Value::Object(obj) => obj.get("parent_tracks").and_then(Value::as_array),
            _ => None,
        };
        let mut index = Self::default();
        for (position, parent) in parents.into_iter().flatten().enumerate() {
            let Some(obj) = parent.as_object() else {
                continue;
            };
            index.insert_parent_object(obj, position, resolver);
        }
        tracing::debug!(
            parents = index.parents.len(),
            children = index.children.len(),
            "Indexed tracks"
        );
        index
    }

    /// Build an index from hierarchical detection features.
    ///
    /// Features carrying both a parent id and a track id contribute to that
    /// child track: a feature with a `defects` array describes the whole
    /// track, any other feature is one defect whose point is appended to the
    /// track's coordinates. Features without a parent id are ignored.
    pub fn from_raw_features(features: &[RawFeature], resolver: &StorageUrlResolver) -> Self {
        let mut index = Self::default();
        for (position, raw) in features.iter().enumerate() {
            let props = &raw.properties;
            let Some(parent_id) = first_string(props, &["parent_track_id"]) else {
                continue;
            };
            let job_id = first_string(props, &["job_id"]);
            let parent = index
                .parents
                .entry(parent_id.clone())
                .or_insert_with(|| ParentTrack::new(parent_id.clone()));
            if parent.job_id.is_none() {
                parent.job_id.clone_from(&job_id);
            }
            parent.frame_range = union_span(parent.frame_range, parse_frame_range(props.get("parent_frame_range")));

            let geometry = raw.geometry.as_ref().and_then(Geometry::from_value);
            if DEFECT_LIST_KEYS.iter().any(|k| props.get(*k).is_some_and(Value::is_array)) {
                let mut bag = props.clone();
                if let Some(g) = &raw.geometry {
                    bag.entry("geometry").or_insert_with(|| g.clone());
                }
                if let Some(mut child) = ChildTrack::from_value(&Value::Object(bag), &parent_id, position, resolver) {
                    child.parent_track_id.clone_from(&parent_id);
                    index.insert_child(child);
                }
                continue;
            }

            let Some(track_id) = first_string(props, &["track_id", "child_track_id"]) else {
                continue;
            };
            let child = index
                .children
                .entry((parent_id.clone(), track_id.clone()))
                .or_insert_with(|| ChildTrack::new(track_id, parent_id));
            if child.job_id.is_none() {
                child.job_id = job_id;
            }
            if let Some(p) = geometry.and_then(|g| g.representative_point()) {
                child.coordinates.push(p);
            }
            if let Some(defect) = Detection::from_properties(props, resolver) {
                child.defects.push(defect);
            }
        }
        index
    }

    fn insert_parent_object(&mut self, obj: &Map<String, Value>, position: usize, resolver: &StorageUrlResolver) {
        let parent_id = first_string(obj, PARENT_ID_KEYS).unwrap_or_else(|| format!("parent-{position}"));
        let job_id = first_string(obj, &["job_id"]);
        let children = CHILD_LIST_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array));
        for (i, child) in children.into_iter().flatten().enumerate() {
            if let Some(mut child) = ChildTrack::from_value(child, &parent_id, i, resolver) {
                if child.job_id.is_none() {
                    child.job_id.clone_from(&job_id);
                }
                self.insert_child(child);
            }
        }
        self.insert_parent(ParentTrack {
            parent_track_id: parent_id,
            job_id,
            frame_range: parse_frame_range(obj.get("frame_range")),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defect(t: DefectType, frame: FrameId) -> Detection {
        Detection {
            frame_id: Some(frame),
            ..Detection::of_type(t)
        }
    }

    // -- job ids ---------------------------------------------------------------

    #[test]
    fn job_id_is_parent_directory() {
        assert_eq!(
            job_id_from_source("s3://bucket/runs/job-42/detections.geojson").as_deref(),
            Some("job-42")
        );
        assert_eq!(
            job_id_from_source("https://host/a/b/file.json?x=1").as_deref(),
            Some("b")
        );
        assert_eq!(job_id_from_source("/data/job-7/gps_frames.csv").as_deref(), Some("job-7"));
        assert_eq!(job_id_from_source("file.json"), None);
    }

    // -- child tracks ----------------------------------------------------------

    #[test]
    fn length_prefers_measured_then_gps_then_geometry() {
        let mut t = ChildTrack::new("c", "p");
        t.coordinates = vec![LngLat(0.0, 0.0), LngLat(0.0, 0.001)];
        t.gps_length_m = Some(12.0);
        t.measured_real_length = Some(10.0);
        assert_eq!(t.length_meters(), 10.0);
        t.measured_real_length = Some(f64::NAN);
        assert_eq!(t.length_meters(), 12.0);
        t.gps_length_m = None;
        let geo = t.length_meters();
        assert!((geo - 111.2).abs() < 0.5, "{geo}");
    }

    #[test]
    fn damage_skips_sealed_and_slow_frames() {
        let mut t = ChildTrack::new("c", "p");
        t.defects = vec![
            defect(DefectType::Alligator, 1),
            defect(DefectType::SealedCrack, 1),
            defect(DefectType::Transverse, 2),
            defect(DefectType::Pothole, 3),
        ];
        let speed = |f: FrameId| match f {
            1 => Some(20.0),
            2 => Some(2.0),
            _ => None,
        };
        assert_eq!(t.track_damage(speed, 5.0), 2);
        assert_eq!(t.track_damage(|_| None, 5.0), 3);
    }

    #[test]
    fn frame_span_includes_defect_frames() {
        let mut t = ChildTrack::new("c", "p");
        t.frame_range = Some((5, 8));
        t.defects = vec![defect(DefectType::Pothole, 12), defect(DefectType::Pothole, 3)];
        assert_eq!(t.frame_span(), Some((3, 12)));
        assert_eq!(ChildTrack::new("x", "p").frame_span(), None);
    }

    #[test]
    fn representative_thumbnail_is_first_available() {
        let mut t = ChildTrack::new("c", "p");
        let mut with_thumb = defect(DefectType::Pothole, 1);
        with_thumb.images.thumbnail = Some("https://t/2.jpg".into());
        t.defects = vec![defect(DefectType::Pothole, 0), with_thumb];
        assert_eq!(t.representative_thumbnail(), Some("https://t/2.jpg"));
    }

    // -- parsing ---------------------------------------------------------------

    #[test]
    fn parses_parent_with_inline_children() {
        let value = json!({
            "parent_tracks": [{
                "parent_track_id": "P1",
                "job_id": "job-1",
                "frame_range": [10, 0],
                "child_tracks": [
                    {
                        "track_id": "C1",
                        "frame_range": {"start": 0, "end": 4},
                        "coordinates": [[-83.0, 42.0], [-83.0, "42.001"], [null, 1]],
                        "defects": [{"class": "alligator", "frame_id": 2}]
                    },
                    {"defects": []}
                ]
            }, "junk"]
        });
        let index = TrackIndex::from_value(&value, &StorageUrlResolver::default());
        assert_eq!(index.parents.len(), 1);
        assert_eq!(index.parents["P1"].frame_range, Some((0, 10)));
        let c1 = index.child("P1", "C1").unwrap();
        assert_eq!(c1.parent_track_id, "P1");
        assert_eq!(c1.job_id.as_deref(), Some("job-1"));
        assert_eq!(c1.coordinates.len(), 2);
        assert_eq!(c1.defects[0].track_id.as_deref(), Some("C1"));
        assert!(index.child("P1", "P1-1").is_some());
    }

    #[test]
    fn index_from_hierarchical_features() {
        let raws: Vec<RawFeature> = [
            json!({
                "geometry": {"type": "Point", "coordinates": [-83.0, 42.0]},
                "properties": {"parent_track_id": "P", "track_id": "T", "class": "pothole", "frame_id": 4, "job_id": "j"}
            }),
            json!({
                "geometry": {"type": "Point", "coordinates": [-83.0, 42.001]},
                "properties": {"parent_track_id": "P", "track_id": "T", "class": "transverse", "frame_id": 6}
            }),
            json!({
                "geometry": {"type": "LineString", "coordinates": [[-83.1, 42.0], [-83.1, 42.002]]},
                "properties": {"parent_track_id": "P", "track_id": "W", "defects": [{"class": "alligator"}]}
            }),
            json!({"properties": {"track_id": "loose", "class": "pothole"}}),
        ]
        .iter()
        .filter_map(RawFeature::from_value)
        .collect();

        let index = TrackIndex::from_raw_features(&raws, &StorageUrlResolver::default());
        assert_eq!(index.parents.len(), 1);
        assert_eq!(index.parents["P"].job_id.as_deref(), Some("j"));
        let t = index.child("P", "T").unwrap();
        assert_eq!(t.coordinates.len(), 2);
        assert_eq!(t.defects.len(), 2);
        assert_eq!(t.frame_span(), Some((4, 6)));
        let w = index.child("P", "W").unwrap();
        assert_eq!(w.parent_track_id, "P");
        assert_eq!(w.coordinates.len(), 2);
        assert_eq!(index.children.len(), 2);
    }

    #[test]
    fn child_ids_are_scoped_to_their_parent() {
        let value = json!([
            {"parent_track_id": "P1", "child_tracks": [{"track_id": 1, "defects": [{"class": "alligator", "frame_id": 1}]}]},
            {"parent_track_id": "P2", "child_tracks": [{"track_id": 1, "defects": [{"class": "pothole", "frame_id": 11}]}]}
        ]);
        let index = TrackIndex::from_value(&value, &StorageUrlResolver::default());
        assert_eq!(index.children.len(), 2);
        assert_eq!(index.child("P1", "1").unwrap().defects[0].defect_type, DefectType::Alligator);
        assert_eq!(index.child("P2", "1").unwrap().defects[0].defect_type, DefectType::Pothole);

        let raws: Vec<RawFeature> = [
            json!({"properties": {"parent_track_id": "P1", "track_id": "T", "class": "alligator", "frame_id": 1}}),
            json!({"properties": {"parent_track_id": "P2", "track_id": "T", "class": "pothole", "frame_id": 11}}),
        ]
        .iter()
        .filter_map(RawFeature::from_value)
        .collect();
        let index = TrackIndex::from_raw_features(&raws, &StorageUrlResolver::default());
        assert_eq!(index.child("P1", "T").unwrap().defects.len(), 1);
        assert_eq!(index.child("P2", "T").unwrap().frame_span(), Some((11, 11)));
    }

    #[test]
    fn orphan_children_form_their_own_group() {
        let mut index = TrackIndex::default();
        index.insert_parent(ParentTrack::new("P"));
        index.insert_child(ChildTrack::new("a", "P"));
        index.insert_child(ChildTrack::new("b", "missing"));
        let groups = index.children_by_parent();
        assert_eq!(groups["P"].len(), 1);
        assert_eq!(groups["missing"][0].track_id, "b");
    }
}
