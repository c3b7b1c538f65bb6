//! Runs the core stages over a loaded [`Dataset`].

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use roadscan_core::density::{analyze_density, DensityChunk, DensityConfig};
use roadscan_core::feature::{Feature, FeatureCollection};
use roadscan_core::frame_aggregation::aggregate_frames;
use roadscan_core::geometry::Geometry;
use roadscan_core::normalize::{Frame, Normalizer};
use roadscan_core::segments::{RoadSegment, SegmentBuilder, SegmentBuilderConfig};
use roadscan_core::storage_url::StorageUrlResolver;

use crate::error::PipelineError;
use crate::loader::Dataset;

/// Which collection a run produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Segments,
    Frames,
    Density,
}

impl OutputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Segments => "segments",
            Self::Frames => "frames",
            Self::Density => "density",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "segments" | "segment" => Ok(Self::Segments),
            "frames" | "frame" => Ok(Self::Frames),
            "density" => Ok(Self::Density),
            other => Err(PipelineError::Config(format!("unknown output mode: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Stage configuration for one run.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub resolver: StorageUrlResolver,
    pub segments: SegmentBuilderConfig,
    pub density: DensityConfig,
}

impl Pipeline {
    pub fn new(resolver: StorageUrlResolver) -> Self {
        Self {
            resolver,
            ..Self::default()
        }
    }

    pub fn with_segment_config(mut self, config: SegmentBuilderConfig) -> Self {
        self.segments = config;
        self
    }

    pub fn with_density_config(mut self, config: DensityConfig) -> Self {
        self.density = config;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.resolver.validate()?;
        self.segments.validate()?;
        self.density.validate()?;
        Ok(())
    }

    /// Normalized frames of every job, merged per `(job, frame)`.
    pub fn frames(&self, dataset: &Dataset) -> Vec<Frame> {
        let frames: Vec<Frame> = dataset
            .features
            .iter()
            .flat_map(|(job_id, features)| {
                Normalizer::new(self.resolver.clone())
                    .with_job_id(job_id.as_str())
                    .normalize_all(features)
            })
            .collect();
        let raw = frames.len();
        let frames = aggregate_frames(frames);
        tracing::debug!(raw, aggregated = frames.len(), "Aggregated frames");
        frames
    }

    pub fn frame_collection(&self, dataset: &Dataset) -> FeatureCollection<Frame> {
        let features = self
            .frames(dataset)
            .into_iter()
            .map(|frame| Feature::new(frame.coordinate.map(Geometry::Point), frame))
            .collect();
        envelope(FeatureCollection::new(features), dataset)
    }

    pub fn segment_collection(&self, dataset: &Dataset) -> FeatureCollection<RoadSegment> {
        let segments = SegmentBuilder::new(self.segments.clone()).build(&dataset.jobs);
        tracing::debug!(segments = segments.len(), "Built road segments");
        let features = segments.into_iter().map(RoadSegment::into_feature).collect();
        envelope(FeatureCollection::new(features), dataset)
    }

    /// Density chunks over the frames of every job, with the percentile
    /// thresholds recorded in the metadata.
    pub fn density_collection(&self, dataset: &Dataset) -> FeatureCollection<DensityChunk> {
        let report = analyze_density(&self.frames(dataset), &self.density);
        let features = report.chunks.into_iter().map(DensityChunk::into_feature).collect();
        envelope(FeatureCollection::new(features), dataset).with_density_thresholds(report.thresholds)
    }

    /// Produce the collection for `mode` as JSON.
    pub fn run(&self, dataset: &Dataset, mode: OutputMode) -> Result<Value, PipelineError> {
        let value = match mode {
            OutputMode::Segments => serde_json::to_value(self.segment_collection(dataset))?,
            OutputMode::Frames => serde_json::to_value(self.frame_collection(dataset))?,
            OutputMode::Density => serde_json::to_value(self.density_collection(dataset))?,
        };
        tracing::info!(
            mode = %mode,
            features = value["features"].as_array().map_or(0, Vec::len),
            "Pipeline run complete"
        );
        Ok(value)
    }
}

fn envelope<P>(collection: FeatureCollection<P>, dataset: &Dataset) -> FeatureCollection<P> {
    collection
        .with_jobs(dataset.job_count())
        .with_sources(dataset.source_count, dataset.failed_sources.clone())
}
