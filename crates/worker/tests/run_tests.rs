//! Integration tests for the worker run loop.

use std::fs;
use std::path::{Path, PathBuf};

use roadscan_core::segments::SegmentBuilderConfig;
use roadscan_core::storage_url::StorageUrlResolver;
use roadscan_pipeline::OutputMode;
use roadscan_worker::{run, LogFormat, WorkerConfig};

fn config(data_dir: &Path, output_path: PathBuf, output_mode: OutputMode) -> WorkerConfig {
    WorkerConfig {
        data_dir: data_dir.to_path_buf(),
        output_path: Some(output_path),
        output_mode,
        segments: SegmentBuilderConfig::default(),
        resolver: StorageUrlResolver::default(),
        log_format: LogFormat::Pretty,
    }
}

/// One job with a single pothole record whose image is a storage URI.
fn seed(root: &Path) {
    let job = root.join("job-1");
    fs::create_dir_all(&job).unwrap();
    let features = serde_json::json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [-83.05, 42.33]},
            "properties": {
                "frame_id": 7,
                "class": "pothole",
                "parent_track_id": "P",
                "track_id": "T",
                "thumbnail": "s3://roadscan-detections/job-1/t7.jpg"
            }
        }]
    });
    fs::write(job.join("detections.geojson"), features.to_string()).unwrap();
}

// ---------------------------------------------------------------------------
// Test: output files
// ---------------------------------------------------------------------------

/// Without GPS frames the single track lands in segment zero and the output
/// file holds one segment feature.
#[tokio::test]
async fn segments_output_is_written_to_file() {
    let tmp = tempfile::tempdir().unwrap();
    seed(tmp.path());
    let out = tmp.path().join("out.json");

    let summary = run(&config(tmp.path(), out.clone(), OutputMode::Segments)).await.unwrap();
    assert_eq!(summary.feature_count, 1);
    assert_eq!(summary.job_count, 1);
    assert!(summary.failed_sources.is_empty());

    let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["type"], "FeatureCollection");
    assert_eq!(written["features"][0]["properties"]["segment_index"], 0);
    assert_eq!(written["features"][0]["properties"]["damage_count"], 1);
}

#[tokio::test]
async fn frames_output_resolves_storage_urls() {
    let tmp = tempfile::tempdir().unwrap();
    seed(tmp.path());
    let out = tmp.path().join("frames.json");

    run(&config(tmp.path(), out.clone(), OutputMode::Frames)).await.unwrap();
    let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    let thumbnail = written["features"][0]["properties"]["images"]["thumbnail"]
        .as_str()
        .unwrap();
    assert!(thumbnail.starts_with("https://"), "{thumbnail}");
    assert!(thumbnail.ends_with("job-1/t7.jpg"), "{thumbnail}");
}

// ---------------------------------------------------------------------------
// Test: failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_data_dir_fails_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let result = run(&config(&tmp.path().join("nope"), tmp.path().join("out.json"), OutputMode::Segments)).await;
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("failed to load dataset"));
    assert!(!tmp.path().join("out.json").exists());
}
