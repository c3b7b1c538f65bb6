//! Pavement condition scoring and road-segment aggregation.
//!
//! Pure, synchronous domain logic: deduct-value lookup and correction,
//! PCI estimation, detection normalization, road-segment building, and
//! drive-path density analysis. No I/O lives in this crate.

pub mod astm;
pub mod cdv;
pub mod coerce;
pub mod deduct_tables;
pub mod dedup;
pub mod density;
pub mod detection;
pub mod error;
pub mod feature;
pub mod frame_aggregation;
pub mod geometry;
pub mod gps;
pub mod normalize;
pub mod pci;
pub mod rating;
pub mod segments;
pub mod storage_url;
pub mod tracks;
pub mod types;
pub mod video;
