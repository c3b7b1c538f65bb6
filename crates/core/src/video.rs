//! Per-job video segment index: 1-indexed video segments with HLS URLs,
//! frame ranges, GPS endpoints and pixel coverage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coerce::{coerce_number, first_number, first_string};
use crate::pci::PixelPercentages;
use crate::storage_url::StorageUrlResolver;
use crate::tracks::parse_frame_range;
use crate::types::{FrameId, LngLat};

const PIXEL_KEYS: &[&str] = &["pixel_percentage_with_projections", "pixel_percentages", "pixel_percentage"];

/// One entry of the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSegment {
    /// 1-indexed.
    pub segment_id: usize,
    pub frame_range: Option<(FrameId, FrameId)>,
    pub master_playlist_url: Option<String>,
    pub gps_start: Option<LngLat>,
    pub gps_end: Option<LngLat>,
    pub pixel_percentages: Option<PixelPercentages>,
}

/// Reference from a road segment to its video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRef {
    pub segment_id: usize,
    pub master_playlist_url: Option<String>,
    pub frame_range: Option<(FrameId, FrameId)>,
    pub gps_start: Option<LngLat>,
    pub gps_end: Option<LngLat>,
}

impl From<&VideoSegment> for VideoRef {
    fn from(s: &VideoSegment) -> Self {
        Self {
            segment_id: s.segment_id,
            master_playlist_url: s.master_playlist_url.clone(),
            frame_range: s.frame_range,
            gps_start: s.gps_start,
            gps_end: s.gps_end,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoSegmentIndex {
    segments: BTreeMap<usize, VideoSegment>,
}

impl VideoSegmentIndex {
    pub fn new(segments: impl IntoIterator<Item = VideoSegment>) -> Self {
        Self {
            segments: segments.into_iter().map(|s| (s.segment_id, s)).collect(),
        }
    }

    /// Parse `{"segments": [...]}` or a bare array. Entries without a
    /// usable `segment_id` are skipped; later duplicates replace earlier.
    pub fn from_value(value: &Value, resolver: &StorageUrlResolver) -> Self {
        let entries = match value {
            Value::Array(items) => Some(items),
            Value::Object(obj) => obj.get("segments").and_then(Value::as_array),
            _ => None,
        };
        let index = Self::new(
            entries
                .into_iter()
                .flatten()
                .filter_map(Value::as_object)
                .filter_map(|obj| parse_segment(obj, resolver)),
        );
        tracing::debug!(segments = index.len(), "Parsed video segment index");
        index
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Look up a 1-indexed video segment.
    pub fn lookup(&self, segment_id: usize) -> Option<&VideoSegment> {
        self.segments.get(&segment_id)
    }

    /// Look up the video segment for a 0-indexed road segment.
    pub fn for_road_segment(&self, segment_index: usize) -> Option<&VideoSegment> {
        self.lookup(segment_index + 1)
    }
}

fn parse_segment(obj: &Map<String, Value>, resolver: &StorageUrlResolver) -> Option<VideoSegment> {
    let segment_id = first_number(obj, &["segment_id", "id"]).filter(|n| *n >= 1.0 && n.fract() == 0.0)? as usize;
    let master_playlist_url = obj
        .get("hls")
        .and_then(Value::as_object)
        .and_then(|hls| first_string(hls, &["master_playlist_url", "url"]))
        .or_else(|| first_string(obj, &["master_playlist_url", "hls_url"]))
        .and_then(|u| resolver.resolve(&u));
    let gps = obj.get("gps").and_then(Value::as_object);
    let gps_point = |flat: &str, nested: &str| {
        obj.get(flat)
            .or_else(|| gps.and_then(|g| g.get(nested)))
            .and_then(parse_lat_lng)
    };

    Some(VideoSegment {
        segment_id,
        frame_range: parse_frame_range(obj.get("frame_range")),
        master_playlist_url,
        gps_start: gps_point("gps_start", "start"),
        gps_end: gps_point("gps_end", "end"),
        pixel_percentages: PIXEL_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(PixelPercentages::from_value),
    })
}

/// `{lat, lon}` / `{latitude, longitude}` objects or `[lng, lat]` arrays.
fn parse_lat_lng(value: &Value) -> Option<LngLat> {
    let p = match value {
        Value::Object(obj) => LngLat(
            first_number(obj, &["lon", "lng", "longitude"])?,
            first_number(obj, &["lat", "latitude"])?,
        ),
        Value::Array(items) if items.len() >= 2 => LngLat(coerce_number(&items[0])?, coerce_number(&items[1])?),
        _ => return None,
    };
    p.is_valid().then_some(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> VideoSegmentIndex {
        VideoSegmentIndex::from_value(
            &json!({
                "segments": [
                    {
                        "segment_id": 1,
                        "frame_range": [0, 299],
                        "hls": {"master_playlist_url": "s3://roadscan-detections/job/seg1/master.m3u8"},
                        "gps": {"start": {"lat": 42.0, "lon": -83.0}, "end": [-83.0, 42.001]},
                        "pixel_percentage_with_projections": {"alligator_crack": 1.5, "pothole": "0.2", "bogus": 3}
                    },
                    {"segment_id": "2", "gps_start": {"latitude": 42.001, "longitude": -83.0}},
                    {"segment_id": 0},
                    {"frame_range": [1, 2]}
                ]
            }),
            &StorageUrlResolver::default(),
        )
    }

    #[test]
    fn parses_entries_and_skips_invalid_ids() {
        let index = sample();
        assert_eq!(index.len(), 2);
        let first = index.lookup(1).unwrap();
        assert_eq!(first.frame_range, Some((0, 299)));
        assert_eq!(
            first.master_playlist_url.as_deref(),
            Some("https://roadscan-detections.s3.us-east-2.amazonaws.com/job/seg1/master.m3u8")
        );
        assert_eq!(first.gps_start, Some(LngLat(-83.0, 42.0)));
        assert_eq!(first.gps_end, Some(LngLat(-83.0, 42.001)));
        let pixels = first.pixel_percentages.unwrap();
        assert_eq!(pixels.alligator, 1.5);
        assert_eq!(pixels.pothole, 0.2);
        assert_eq!(index.lookup(2).unwrap().gps_start, Some(LngLat(-83.0, 42.001)));
    }

    #[test]
    fn road_segments_are_offset_by_one() {
        let index = sample();
        assert_eq!(index.for_road_segment(0).unwrap().segment_id, 1);
        assert_eq!(index.for_road_segment(1).unwrap().segment_id, 2);
        assert!(index.for_road_segment(2).is_none());
    }

    #[test]
    fn non_collection_input_is_empty() {
        assert!(VideoSegmentIndex::from_value(&json!("nope"), &StorageUrlResolver::default()).is_empty());
    }
}
