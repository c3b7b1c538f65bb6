//! Normalization of raw detection features into per-frame records.
//!
//! Raw features arrive as GeoJSON-like records with loosely-typed
//! property bags. Two shapes exist: records that already carry an
//! `all_detections_in_frame` array, and flat records whose properties
//! describe a single detection. Both become a [`Frame`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coerce::{first_frame_id, first_number, first_string, first_timestamp};
use crate::dedup::dedupe_detections;
use crate::detection::{DefectImages, Detection};
use crate::geometry::Geometry;
use crate::storage_url::StorageUrlResolver;
use crate::types::{EpochMillis, FrameId, LngLat};

const FRAME_KEYS: &[&str] = &["frame_id", "frame_number", "frame", "frame_idx"];
const DETECTION_ARRAY_KEYS: &[&str] = &["all_detections_in_frame", "detections"];
const COUNT_KEYS: &[&str] = &["detection_count_in_frame", "detection_count", "num_detections"];
const GLOBAL_TS_KEYS: &[&str] = &["globalTimestamp", "global_timestamp"];
const SCAN_START_KEYS: &[&str] = &["scan_start_timestamp", "scan_start_time", "scan_start"];
const OFFSET_MS_KEYS: &[&str] = &["frame_offset_ms", "frame_offset", "timestamp_offset_ms"];
const OFFSET_SECS_KEYS: &[&str] = &["frame_offset_s", "frame_offset_seconds"];
const GPS_TS_KEYS: &[&str] = &["gps_timestamp", "timestamp", "gps_time"];

// ---------------------------------------------------------------------------
// Raw input
// ---------------------------------------------------------------------------

/// One raw input record as read from a feature collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFeature {
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub geometry: Option<Value>,
}

impl RawFeature {
    /// Accept any JSON object; a missing or non-object `properties` becomes
    /// an empty bag.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            properties: obj
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            geometry: obj.get("geometry").filter(|g| !g.is_null()).cloned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One capture instant with every detection seen in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub frame_id: Option<FrameId>,
    pub coordinate: Option<LngLat>,
    #[serde(rename = "globalTimestamp")]
    pub global_timestamp: Option<EpochMillis>,
    #[serde(rename = "all_detections_in_frame")]
    pub detections: Vec<Detection>,
    #[serde(rename = "detection_count_in_frame")]
    pub detection_count: usize,
    #[serde(default)]
    pub images: DefectImages,
    pub job_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Turns [`RawFeature`]s into [`Frame`]s.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    pub resolver: StorageUrlResolver,
    /// Job id stamped onto records that do not carry their own.
    pub job_id: Option<String>,
}

impl Normalizer {
    pub fn new(resolver: StorageUrlResolver) -> Self {
        Self {
            resolver,
            job_id: None,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Normalize one record. Returns `None` for records that carry no
    /// coordinate, no frame id and no detections.
    pub fn normalize(&self, raw: &RawFeature) -> Option<Frame> {
        let props = &raw.properties;
        let frame_id = first_frame_id(props, FRAME_KEYS);
        let coordinate = raw
            .geometry
            .as_ref()
            .and_then(Geometry::from_value)
            .and_then(|g| g.representative_point());
        let global_timestamp = resolve_global_timestamp(props);

        let (mut detections, detection_count) = match detection_array(props) {
            Some(items) => {
                let parsed: Vec<Detection> = items
                    .iter()
                    .filter_map(Value::as_object)
                    .filter_map(|obj| Detection::from_properties(obj, &self.resolver))
                    .collect();
                let deduped = dedupe_detections(parsed);
                let count = deduped.len();
                (deduped, count)
            }
            None => {
                let stated = first_number(props, COUNT_KEYS)
                    .filter(|n| *n >= 0.0)
                    .map(|n| n as usize);
                match Detection::from_properties(props, &self.resolver) {
                    Some(d) => (vec![d], stated.unwrap_or(0).max(1)),
                    None => (Vec::new(), stated.unwrap_or(0)),
                }
            }
        };

        for d in &mut detections {
            if d.frame_id.is_none() {
                d.frame_id = frame_id;
            }
            if d.gps_timestamp.is_none() {
                d.gps_timestamp = global_timestamp;
            }
        }

        if coordinate.is_none() && frame_id.is_none() && detections.is_empty() {
            return None;
        }

        let mut images = DefectImages::from_properties(props, &self.resolver);
        if let Some(first) = detections.first() {
            images.fill_missing(&first.images);
        }

        Some(Frame {
            frame_id,
            coordinate,
            global_timestamp,
            detections,
            detection_count,
            images,
            job_id: first_string(props, &["job_id"]).or_else(|| self.job_id.clone()),
        })
    }

    /// Normalize a batch, dropping records that yield nothing.
    pub fn normalize_all(&self, raws: &[RawFeature]) -> Vec<Frame> {
        let frames: Vec<Frame> = raws.iter().filter_map(|r| self.normalize(r)).collect();
        tracing::debug!(
            input = raws.len(),
            output = frames.len(),
            "Normalized raw features"
        );
        frames
    }
}

fn detection_array(props: &Map<String, Value>) -> Option<&Vec<Value>> {
    DETECTION_ARRAY_KEYS
        .iter()
        .find_map(|k| props.get(*k).and_then(Value::as_array))
}

/// Explicit global timestamp, then scan start plus frame offset, then a
/// direct GPS timestamp field.
fn resolve_global_timestamp(props: &Map<String, Value>) -> Option<EpochMillis> {
    if let Some(ts) = first_timestamp(props, GLOBAL_TS_KEYS) {
        return Some(ts);
    }
    if let Some(start) = first_timestamp(props, SCAN_START_KEYS) {
        let offset = first_number(props, OFFSET_MS_KEYS)
            .or_else(|| first_number(props, OFFSET_SECS_KEYS).map(|s| s * 1000.0));
        if let Some(offset) = offset {
            return Some(start + offset);
        }
    }
    first_timestamp(props, GPS_TS_KEYS)
}
