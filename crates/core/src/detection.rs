//! Single defect detections and their parsing from raw property bags.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coerce::{coerce_number, coerce_string, first_frame_id, first_number, first_string, first_timestamp};
use crate::storage_url::StorageUrlResolver;
use crate::types::{DefectType, EpochMillis, FrameId};

const DEFECT_ID_KEYS: &[&str] = &["defect_id", "detection_id"];
const CLASS_KEYS: &[&str] = &["defect_type", "class_name", "class", "label", "category"];
const CONFIDENCE_KEYS: &[&str] = &["confidence", "score", "conf"];
const FRAME_KEYS: &[&str] = &["frame_id", "frame_number", "frame", "frame_idx"];
const TRACK_KEYS: &[&str] = &["track_id", "child_track_id"];
const TIMESTAMP_KEYS: &[&str] = &["gps_timestamp", "globalTimestamp", "timestamp"];
const SEVERITY_VARIANTS: &[&str] = &["joint", "pixel", "mm"];

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Image references attached to a defect, already rewritten to HTTP(S).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectImages {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polygon_overlay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_overlay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_frame: Option<String>,
}

impl DefectImages {
    /// Read image slots from a nested `images` object and flat `*_url` keys.
    pub fn from_properties(props: &Map<String, Value>, resolver: &StorageUrlResolver) -> Self {
        let nested = props.get("images").and_then(Value::as_object);
        let pick = |nested_keys: &[&str], flat_keys: &[&str]| -> Option<String> {
            nested
                .and_then(|obj| first_string(obj, nested_keys))
                .or_else(|| first_string(props, flat_keys))
                .and_then(|uri| resolver.resolve(&uri))
        };
        Self {
            thumbnail: pick(
                &["thumbnail", "thumbnail_url", "thumb"],
                &["thumbnail_url", "thumbnail", "thumb_url"],
            ),
            polygon_overlay: pick(
                &["polygon_overlay", "polygon", "overlay"],
                &["polygon_overlay_url", "polygon_url", "overlay_url"],
            ),
            measurement_overlay: pick(
                &["measurement_overlay", "measurement", "measurements"],
                &["measurement_overlay_url", "measurement_url"],
            ),
            original_frame: pick(
                &["original_frame", "original", "frame"],
                &["original_frame_url", "frame_url", "image_url"],
            ),
        }
    }

    /// Fill empty slots from `other`; existing values are kept.
    pub fn fill_missing(&mut self, other: &DefectImages) {
        fn fill(slot: &mut Option<String>, from: &Option<String>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        fill(&mut self.thumbnail, &other.thumbnail);
        fill(&mut self.polygon_overlay, &other.polygon_overlay);
        fill(&mut self.measurement_overlay, &other.measurement_overlay);
        fill(&mut self.original_frame, &other.original_frame);
    }

    pub fn is_empty(&self) -> bool {
        self.thumbnail.is_none()
            && self.polygon_overlay.is_none()
            && self.measurement_overlay.is_none()
            && self.original_frame.is_none()
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// One detected pavement defect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub defect_id: Option<String>,
    pub defect_type: DefectType,
    /// Class label exactly as the detector reported it.
    pub class_name: Option<String>,
    pub severity: Option<String>,
    /// Per-measurement severity labels (`joint`, `pixel`, `mm`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub severity_variants: BTreeMap<String, String>,
    pub confidence: Option<f64>,
    pub area_px: Option<f64>,
    pub length_mm: Option<f64>,
    pub width_mm: Option<f64>,
    /// `[x1, y1, x2, y2]` in pixels.
    pub bbox: Option<[f64; 4]>,
    pub frame_id: Option<FrameId>,
    pub track_id: Option<String>,
    #[serde(default)]
    pub images: DefectImages,
    pub gps_timestamp: Option<EpochMillis>,
}

impl Detection {
    /// A detection with only a type set. Mostly useful for tests and
    /// callers that build detections programmatically.
    pub fn of_type(defect_type: DefectType) -> Self {
        Self {
            defect_id: None,
            defect_type,
            class_name: Some(defect_type.as_str().to_string()),
            severity: None,
            severity_variants: BTreeMap::new(),
            confidence: None,
            area_px: None,
            length_mm: None,
            width_mm: None,
            bbox: None,
            frame_id: None,
            track_id: None,
            images: DefectImages::default(),
            gps_timestamp: None,
        }
    }

    /// Parse a detection from a property bag.
    ///
    /// Returns `None` when the bag carries neither a class label nor a
    /// defect id, i.e. it does not describe a detection at all.
    pub fn from_properties(props: &Map<String, Value>, resolver: &StorageUrlResolver) -> Option<Self> {
        let defect_id = first_string(props, DEFECT_ID_KEYS);
        let class_name = first_string(props, CLASS_KEYS);
        if defect_id.is_none() && class_name.is_none() {
            return None;
        }

        let defect_type = class_name
            .as_deref()
            .map(DefectType::from_label)
            .unwrap_or(DefectType::Other);
        let (severity, severity_variants) = parse_severity(props);

        Some(Self {
            defect_id,
            defect_type,
            class_name,
            severity,
            severity_variants,
            confidence: first_number(props, CONFIDENCE_KEYS),
            area_px: first_number(props, &["area_px", "pixel_area", "area"])
                .or_else(|| nested_number(props, &["measurements_px", "measurements_pixel"], &["area", "area_px"])),
            length_mm: first_number(props, &["length_mm"])
                .or_else(|| nested_number(props, &["measurements_mm"], &["length", "length_mm"])),
            width_mm: first_number(props, &["width_mm"])
                .or_else(|| nested_number(props, &["measurements_mm"], &["width", "width_mm"])),
            bbox: parse_bbox(props.get("bbox")),
            frame_id: first_frame_id(props, FRAME_KEYS),
            track_id: first_string(props, TRACK_KEYS),
            images: DefectImages::from_properties(props, resolver),
            gps_timestamp: first_timestamp(props, TIMESTAMP_KEYS),
        })
    }

    /// Whether this detection counts toward damage totals.
    pub fn counts_as_damage(&self) -> bool {
        self.defect_type.counts_as_damage()
    }

    /// Best available severity label: the plain label, then the joint,
    /// pixel and mm variants in that order.
    pub fn severity_label(&self) -> Option<&str> {
        self.severity.as_deref().or_else(|| {
            SEVERITY_VARIANTS
                .iter()
                .find_map(|k| self.severity_variants.get(*k).map(String::as_str))
        })
    }
}

/// Severity may be a plain string, an object of per-measurement labels,
/// or flat `severity_<variant>` keys.
fn parse_severity(props: &Map<String, Value>) -> (Option<String>, BTreeMap<String, String>) {
    let mut variants = BTreeMap::new();
    let mut label = None;

    match props.get("severity") {
        Some(Value::Object(obj)) => {
            for (k, v) in obj {
                if let Some(s) = coerce_string(v) {
                    variants.insert(k.clone(), s);
                }
            }
            label = obj.get("label").and_then(coerce_string);
        }
        Some(v) => label = coerce_string(v),
        None => {}
    }
    if label.is_none() {
        label = first_string(props, &["severity_label", "severity_level"]);
    }
    for variant in SEVERITY_VARIANTS {
        if let Some(s) = props.get(&format!("severity_{variant}")).and_then(coerce_string) {
            variants.entry((*variant).to_string()).or_insert(s);
        }
    }
    variants.remove("label");
    (label, variants)
}

fn nested_number(props: &Map<String, Value>, objects: &[&str], keys: &[&str]) -> Option<f64> {
    objects
        .iter()
        .filter_map(|o| props.get(*o).and_then(Value::as_object))
        .find_map(|obj| first_number(obj, keys))
}

/// `[x1, y1, x2, y2]` from an array or an object with those keys.
fn parse_bbox(value: Option<&Value>) -> Option<[f64; 4]> {
    match value? {
        Value::Array(items) if items.len() == 4 => {
            let mut out = [0.0; 4];
            for (slot, item) in out.iter_mut().zip(items) {
                *slot = coerce_number(item)?;
            }
            Some(out)
        }
        Value::Object(obj) => Some([
            first_number(obj, &["x1", "xmin", "x"])?,
            first_number(obj, &["y1", "ymin", "y"])?,
            first_number(obj, &["x2", "xmax"])?,
            first_number(obj, &["y2", "ymax"])?,
        ]),
        _ => None,
    }
}
