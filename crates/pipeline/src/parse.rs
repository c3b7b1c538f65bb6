//! Parsers for the four per-job source files.
//!
//! Each parser fails only when the whole document is unreadable. Individual
//! records that are malformed are skipped and, for the GPS log, counted.

use std::io::Read;

use serde_json::Value;

use roadscan_core::coerce::{coerce_frame_id, parse_number, parse_timestamp};
use roadscan_core::gps::GpsFrame;
use roadscan_core::normalize::RawFeature;
use roadscan_core::storage_url::StorageUrlResolver;
use roadscan_core::tracks::TrackIndex;
use roadscan_core::video::VideoSegmentIndex;

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Detections
// ---------------------------------------------------------------------------

/// Parse a feature collection, a bare array of features, or a single
/// feature. Entries that are not JSON objects are dropped.
pub fn parse_features(text: &str) -> Result<Vec<RawFeature>, PipelineError> {
    let value: Value = serde_json::from_str(text)?;
    let features: Vec<RawFeature> = match &value {
        Value::Array(items) => items.iter().filter_map(RawFeature::from_value).collect(),
        Value::Object(obj) => match obj.get("features") {
            Some(Value::Array(items)) => items.iter().filter_map(RawFeature::from_value).collect(),
            _ => RawFeature::from_value(&value).into_iter().collect(),
        },
        _ => Vec::new(),
    };
    tracing::debug!(features = features.len(), "Parsed detection features");
    Ok(features)
}

// ---------------------------------------------------------------------------
// GPS frames
// ---------------------------------------------------------------------------

/// Rows read from a GPS-frame CSV.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsLog {
    pub frames: Vec<GpsFrame>,
    /// Rows dropped for a missing frame id or an unusable position.
    pub skipped_rows: usize,
}

/// Parse `frame_id,timestamp,latitude,longitude,altitude,accuracy` rows.
///
/// Columns are positional and the header row is skipped. Rows may be short;
/// altitude and accuracy are optional. Read failures of the underlying
/// stream are returned as errors, every other bad row is skipped.
pub fn parse_gps_csv<R: Read>(reader: R) -> Result<GpsLog, PipelineError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut log = GpsLog::default();
    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable GPS row");
                log.skipped_rows += 1;
                continue;
            }
        };
        match gps_frame_from_record(&record) {
            Some(frame) => log.frames.push(frame),
            None => log.skipped_rows += 1,
        }
    }
    if log.skipped_rows > 0 {
        tracing::debug!(
            frames = log.frames.len(),
            skipped = log.skipped_rows,
            "Skipped malformed GPS rows"
        );
    }
    Ok(log)
}

fn gps_frame_from_record(record: &csv::StringRecord) -> Option<GpsFrame> {
    let number = |i: usize| record.get(i).and_then(parse_number);
    let frame_id = coerce_frame_id(&Value::String(record.get(0)?.to_string()))?;
    let mut frame = GpsFrame::new(
        frame_id,
        record.get(1).and_then(parse_timestamp),
        number(2)?,
        number(3)?,
    );
    frame.altitude = number(4);
    frame.accuracy = number(5);
    frame.position().is_valid().then_some(frame)
}

// ---------------------------------------------------------------------------
// Video index and parent tracks
// ---------------------------------------------------------------------------

pub fn parse_video_index(text: &str, resolver: &StorageUrlResolver) -> Result<VideoSegmentIndex, PipelineError> {
    let value: Value = serde_json::from_str(text)?;
    Ok(VideoSegmentIndex::from_value(&value, resolver))
}

pub fn parse_parent_tracks(text: &str, resolver: &StorageUrlResolver) -> Result<TrackIndex, PipelineError> {
    let value: Value = serde_json::from_str(text)?;
    Ok(TrackIndex::from_value(&value, resolver))
}
