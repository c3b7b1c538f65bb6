//! Merging of frames that share a frame identifier.

use std::collections::{HashMap, HashSet};

use crate::dedup::dedupe_detections;
use crate::geometry::mean_position;
use crate::normalize::Frame;
use crate::types::{FrameId, LngLat};

type FrameKey = (Option<String>, FrameId);

fn key_of(frame: &Frame) -> Option<FrameKey> {
    frame.frame_id.map(|id| (frame.job_id.clone(), id))
}

/// Whether any frame identifier is shared by two or more frames.
pub fn has_collisions(frames: &[Frame]) -> bool {
    let mut seen = HashSet::new();
    frames.iter().filter_map(key_of).any(|k| !seen.insert(k))
}

/// Merge frames sharing a `(job_id, frame_id)` pair.
///
/// Detections are unioned and deduplicated, valid coordinates averaged,
/// the earliest timestamp kept, and the first image per slot kept. A flat
/// record may state more detections than it carries; those extra counts are
/// added on top of the deduplicated detections. Output
/// is sorted by frame id with id-less frames last; ties keep input order.
///
/// When no identifier collides the input is returned untouched.
pub fn aggregate_frames(frames: Vec<Frame>) -> Vec<Frame> {
    if !has_collisions(&frames) {
        return frames;
    }
    let input_len = frames.len();

    let mut groups: Vec<Vec<Frame>> = Vec::new();
    let mut slot_of: HashMap<FrameKey, usize> = HashMap::new();
    for frame in frames {
        match key_of(&frame) {
            Some(key) => {
                let slot = *slot_of.entry(key).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[slot].push(frame);
            }
            None => groups.push(vec![frame]),
        }
    }

    let mut merged: Vec<Frame> = groups.into_iter().filter_map(merge_group).collect();
    merged.sort_by_key(|f| (f.frame_id.is_none(), f.frame_id));
    tracing::debug!(input = input_len, output = merged.len(), "Aggregated frames");
    merged
}

fn merge_group(group: Vec<Frame>) -> Option<Frame> {
    if group.len() <= 1 {
        return group.into_iter().next();
    }
    let coords: Vec<LngLat> = group.iter().filter_map(|f| f.coordinate).collect();
    let coordinate = mean_position(&coords);
    let global_timestamp = group
        .iter()
        .filter_map(|f| f.global_timestamp)
        .filter(|t| t.is_finite())
        .reduce(f64::min);

    let unlisted: usize = group
        .iter()
        .map(|f| f.detection_count.saturating_sub(f.detections.len()))
        .sum();

    let mut iter = group.into_iter();
    let mut base = iter.next()?;
    for frame in iter {
        base.detections.extend(frame.detections);
        base.images.fill_missing(&frame.images);
        if base.job_id.is_none() {
            base.job_id = frame.job_id;
        }
    }
    base.detections = dedupe_detections(base.detections);
    base.detection_count = base.detections.len() + unlisted;
    base.coordinate = coordinate;
    base.global_timestamp = global_timestamp;
    Some(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DefectImages, Detection};
    use crate::types::DefectType;

    fn frame(id: Option<FrameId>, coord: Option<LngLat>, ts: Option<f64>, defect: &str) -> Frame {
        let mut d = Detection::of_type(DefectType::Transverse);
        d.defect_id = Some(defect.to_string());
        d.frame_id = id;
        Frame {
            frame_id: id,
            coordinate: coord,
            global_timestamp: ts,
            detections: vec![d],
            detection_count: 1,
            images: DefectImages::default(),
            job_id: None,
        }
    }

    #[test]
    fn merges_shared_frame_ids() {
        let mut a = frame(Some(5), Some(LngLat(0.0, 0.0)), Some(200.0), "a");
        a.images.original_frame = Some("first".into());
        let mut b = frame(Some(5), Some(LngLat(2.0, 2.0)), Some(100.0), "b");
        b.images.original_frame = Some("second".into());
        b.images.thumbnail = Some("thumb".into());
        let c = frame(Some(5), Some(LngLat(f64::NAN, 1.0)), None, "a");
        let other = frame(Some(1), None, None, "z");

        let out = aggregate_frames(vec![a, b, c, other]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].frame_id, Some(1));
        let merged = &out[1];
        assert_eq!(merged.detection_count, 2);
        assert_eq!(merged.coordinate, Some(LngLat(1.0, 1.0)));
        assert_eq!(merged.global_timestamp, Some(100.0));
        assert_eq!(merged.images.original_frame.as_deref(), Some("first"));
        assert_eq!(merged.images.thumbnail.as_deref(), Some("thumb"));
    }

    #[test]
    fn stated_counts_of_flat_records_survive_a_merge() {
        let mut a = frame(Some(7), None, None, "a");
        a.detection_count = 4;
        let mut b = frame(Some(7), None, None, "b");
        b.detection_count = 3;
        let out = aggregate_frames(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].detections.len(), 2);
        assert_eq!(out[0].detection_count, 7);
    }

    #[test]
    fn repeated_detection_is_counted_once() {
        let mut a = frame(Some(7), None, None, "a");
        a.detection_count = 2;
        let b = frame(Some(7), None, None, "a");
        let out = aggregate_frames(vec![a, b]);
        assert_eq!(out[0].detections.len(), 1);
        assert_eq!(out[0].detection_count, 2);
    }

    #[test]
    fn no_collision_returns_input_unchanged() {
        let input = vec![
            frame(Some(3), None, None, "a"),
            frame(None, None, None, "b"),
            frame(Some(1), None, None, "c"),
        ];
        assert_eq!(aggregate_frames(input.clone()), input);
    }

    #[test]
    fn id_less_frames_sort_last_in_input_order() {
        let out = aggregate_frames(vec![
            frame(None, None, None, "x"),
            frame(Some(2), None, None, "a"),
            frame(Some(2), None, None, "b"),
            frame(None, None, None, "y"),
            frame(Some(1), None, None, "c"),
        ]);
        let ids: Vec<_> = out.iter().map(|f| f.frame_id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), None, None]);
        assert_eq!(out[2].detections[0].defect_id.as_deref(), Some("x"));
        assert_eq!(out[3].detections[0].defect_id.as_deref(), Some("y"));
    }

    #[test]
    fn same_frame_id_in_different_jobs_stays_apart() {
        let mut a = frame(Some(1), None, None, "a");
        a.job_id = Some("j1".into());
        let mut b = frame(Some(1), None, None, "b");
        b.job_id = Some("j2".into());
        assert!(!has_collisions(&[a, b]));
    }

    #[test]
    fn aggregation_is_idempotent() {
        let once = aggregate_frames(vec![
            frame(Some(1), Some(LngLat(0.0, 0.0)), Some(1.0), "a"),
            frame(Some(1), Some(LngLat(0.0, 2.0)), Some(2.0), "b"),
            frame(Some(0), None, None, "c"),
        ]);
        let twice = aggregate_frames(once.clone());
        assert_eq!(once, twice);
    }
}
