//! Dataset loading and stage orchestration for road condition runs.
//!
//! Reads per-job detection, track, GPS and video-index sources from a
//! dataset directory and feeds them through the `roadscan-core` stages to
//! produce output feature collections.

pub mod error;
pub mod loader;
pub mod parse;
pub mod pipeline;

pub use error::PipelineError;
pub use loader::{Dataset, DatasetLoader};
pub use pipeline::{OutputMode, Pipeline};
