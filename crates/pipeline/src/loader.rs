//! Concurrent, failure-tolerant loading of a dataset directory.
//!
//! A dataset is a root directory with one sub-directory per job. Each job
//! directory may hold any of [`DETECTIONS_FILE`], [`PARENT_TRACKS_FILE`],
//! [`GPS_FRAMES_FILE`] and [`VIDEO_SEGMENTS_FILE`]. Jobs load in parallel
//! tasks and the four files of a job are read concurrently. A missing file
//! is simply absent; a file that cannot be read or parsed is recorded in
//! [`Dataset::failed_sources`] and the rest of the run continues.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::future::join_all;

use roadscan_core::normalize::RawFeature;
use roadscan_core::segments::JobInput;
use roadscan_core::storage_url::StorageUrlResolver;
use roadscan_core::tracks::TrackIndex;

use crate::error::PipelineError;
use crate::parse::{parse_features, parse_gps_csv, parse_parent_tracks, parse_video_index};

pub const DETECTIONS_FILE: &str = "detections.geojson";
pub const PARENT_TRACKS_FILE: &str = "parent_tracks.json";
pub const GPS_FRAMES_FILE: &str = "gps_frames.csv";
pub const VIDEO_SEGMENTS_FILE: &str = "video_segments.json";

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Everything read from a dataset directory.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Per-job inputs for the segment builder, sorted by job id.
    pub jobs: Vec<JobInput>,
    /// Raw detection features by job id.
    pub features: BTreeMap<String, Vec<RawFeature>>,
    /// Number of source files found.
    pub source_count: usize,
    /// `<job>/<file>` for every source that could not be used.
    pub failed_sources: Vec<String>,
}

impl Dataset {
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Result of loading a single job directory.
#[derive(Debug)]
struct JobLoad {
    input: JobInput,
    features: Vec<RawFeature>,
    source_count: usize,
    failed_sources: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Loads a dataset directory into a [`Dataset`].
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    root: PathBuf,
    resolver: StorageUrlResolver,
}

impl DatasetLoader {
    pub fn new(root: impl Into<PathBuf>, resolver: StorageUrlResolver) -> Self {
        Self {
            root: root.into(),
            resolver,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Job directories under the root, sorted by name. Hidden entries and
    /// plain files are ignored.
    pub async fn job_dirs(&self) -> Result<Vec<(String, PathBuf)>, PipelineError> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::MissingSource(self.root.display().to_string())
            } else {
                PipelineError::Io(e)
            }
        })?;

        let mut dirs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                dirs.push((name, entry.path()));
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Load every job. Only an unreadable root is an error.
    pub async fn load(&self) -> Result<Dataset, PipelineError> {
        let dirs = self.job_dirs().await?;
        tracing::debug!(root = %self.root.display(), jobs = dirs.len(), "Loading dataset");

        let handles: Vec<_> = dirs
            .into_iter()
            .map(|(job_id, dir)| {
                let resolver = self.resolver.clone();
                let label = job_id.clone();
                (label, tokio::spawn(load_job(job_id, dir, resolver)))
            })
            .collect();
        let (labels, tasks): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(tasks).await;

        let mut dataset = Dataset::default();
        for (label, result) in labels.into_iter().zip(results) {
            let load = match result {
                Ok(load) => load,
                Err(e) => {
                    tracing::warn!(job_id = %label, error = %e, "Job load task failed");
                    dataset.failed_sources.push(label);
                    continue;
                }
            };
            dataset.source_count += load.source_count;
            dataset.failed_sources.extend(load.failed_sources);
            if load.source_count == 0 {
                tracing::debug!(job_id = %load.input.job_id, "Skipping directory without sources");
                continue;
            }
            dataset.features.insert(load.input.job_id.clone(), load.features);
            dataset.jobs.push(load.input);
        }

        tracing::info!(
            jobs = dataset.jobs.len(),
            sources = dataset.source_count,
            failed = dataset.failed_sources.len(),
            "Dataset loaded"
        );
        Ok(dataset)
    }
}

// ---------------------------------------------------------------------------
// Per-job loading
// ---------------------------------------------------------------------------

/// Read a file, treating a missing file as `None`.
async fn read_optional(path: PathBuf) -> Result<Option<String>, PipelineError> {
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_with<T>(
    text: Result<Option<String>, PipelineError>,
    parse: impl FnOnce(&str) -> Result<T, PipelineError>,
) -> Result<Option<T>, PipelineError> {
    match text? {
        Some(t) => parse(&t).map(Some),
        None => Ok(None),
    }
}

/// Tracks found and failed sources for one job.
struct SourceTally {
    job_id: String,
    found: usize,
    failed: Vec<String>,
}

impl SourceTally {
    /// Unwrap one source's outcome, recording failures.
    fn take<T>(&mut self, file: &str, outcome: Result<Option<T>, PipelineError>) -> Option<T> {
        match outcome {
            Ok(Some(value)) => {
                self.found += 1;
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                self.found += 1;
                let source = format!("{}/{file}", self.job_id);
                tracing::warn!(source = %source, error = %e, "Skipping unusable source");
                self.failed.push(source);
                None
            }
        }
    }
}

async fn load_job(job_id: String, dir: PathBuf, resolver: StorageUrlResolver) -> JobLoad {
    let (detections, parent_tracks, gps, video) = tokio::join!(
        read_optional(dir.join(DETECTIONS_FILE)),
        read_optional(dir.join(PARENT_TRACKS_FILE)),
        read_optional(dir.join(GPS_FRAMES_FILE)),
        read_optional(dir.join(VIDEO_SEGMENTS_FILE)),
    );

    let mut tally = SourceTally {
        job_id: job_id.clone(),
        found: 0,
        failed: Vec::new(),
    };
    let features = tally
        .take(DETECTIONS_FILE, parse_with(detections, parse_features))
        .unwrap_or_default();
    let tracks = tally.take(
        PARENT_TRACKS_FILE,
        parse_with(parent_tracks, |t| parse_parent_tracks(t, &resolver)),
    );
    let gps_log = tally.take(GPS_FRAMES_FILE, parse_with(gps, |t| parse_gps_csv(t.as_bytes())));
    let video_index = tally.take(
        VIDEO_SEGMENTS_FILE,
        parse_with(video, |t| parse_video_index(t, &resolver)),
    );

    let mut input = JobInput::new(job_id);
    input.tracks = match tracks {
        Some(index) if !index.is_empty() => index,
        _ => TrackIndex::from_raw_features(&features, &resolver),
    };
    input.gps_frames = gps_log.map(|log| log.frames).unwrap_or_default();
    input.video_index = video_index;

    tracing::debug!(
        job_id = %input.job_id,
        features = features.len(),
        children = input.tracks.children.len(),
        gps_frames = input.gps_frames.len(),
        "Loaded job"
    );
    JobLoad {
        input,
        features,
        source_count: tally.found,
        failed_sources: tally.failed,
    }
}
