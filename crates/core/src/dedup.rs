//! Order-preserving detection deduplication.

use std::collections::HashSet;

use crate::detection::Detection;

/// Identity key for a detection.
///
/// `id:<defect_id>` when an id is present, otherwise a composite of
/// frame, track, class, confidence (4 dp) and bbox (2 dp).
pub fn identity_key(detection: &Detection) -> String {
    if let Some(id) = &detection.defect_id {
        return format!("id:{id}");
    }
    let frame = detection.frame_id.map(|f| f.to_string()).unwrap_or_default();
    let track = detection.track_id.as_deref().unwrap_or_default();
    let class = detection
        .class_name
        .as_deref()
        .unwrap_or_else(|| detection.defect_type.as_str());
    let confidence = detection
        .confidence
        .map(|c| format!("{c:.4}"))
        .unwrap_or_default();
    let bbox = detection
        .bbox
        .map(|b| {
            b.iter()
                .map(|v| format!("{v:.2}"))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();
    format!("{frame}|{track}|{class}|{confidence}|{bbox}")
}

/// Drop repeated detections, keeping the first occurrence of each key.
pub fn dedupe_detections(detections: Vec<Detection>) -> Vec<Detection> {
    let mut seen = HashSet::with_capacity(detections.len());
    detections
        .into_iter()
        .filter(|d| seen.insert(identity_key(d)))
        .collect()
}
