//! GeoJSON-style output envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::density::DensityThresholds;
use crate::geometry::Geometry;

/// A GeoJSON `Feature` with typed properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature<P> {
    pub geometry: Option<Geometry>,
    pub properties: P,
}

impl<P> Feature<P> {
    pub fn new(geometry: Option<Geometry>, properties: P) -> Self {
        Self { geometry, properties }
    }
}

/// Counts and provenance for one output collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub feature_count: usize,
    pub job_count: usize,
    pub source_count: usize,
    /// Sources that could not be read or parsed.
    pub failed_sources: Vec<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density_thresholds: Option<DensityThresholds>,
}

/// A GeoJSON `FeatureCollection` plus a `metadata` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection<P> {
    pub features: Vec<Feature<P>>,
    pub metadata: CollectionMetadata,
}

impl<P> FeatureCollection<P> {
    pub fn new(features: Vec<Feature<P>>) -> Self {
        let metadata = CollectionMetadata {
            feature_count: features.len(),
            job_count: 0,
            source_count: 0,
            failed_sources: Vec::new(),
            generated_at: Utc::now(),
            density_thresholds: None,
        };
        Self { features, metadata }
    }

    pub fn with_jobs(mut self, job_count: usize) -> Self {
        self.metadata.job_count = job_count;
        self
    }

    pub fn with_sources(mut self, source_count: usize, failed_sources: Vec<String>) -> Self {
        self.metadata.source_count = source_count;
        self.metadata.failed_sources = failed_sources;
        self
    }

    pub fn with_density_thresholds(mut self, thresholds: DensityThresholds) -> Self {
        self.metadata.density_thresholds = Some(thresholds);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LngLat;
    use serde_json::json;

    #[test]
    fn serializes_with_geojson_type_tags() {
        let collection = FeatureCollection::new(vec![Feature::new(
            Some(Geometry::Point(LngLat(1.0, 2.0))),
            json!({"damage_count": 3}),
        )])
        .with_jobs(1)
        .with_sources(2, vec!["job-2/gps_frames.csv".into()]);

        let value = serde_json::to_value(&collection).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"][0]["type"], "Feature");
        assert_eq!(value["features"][0]["geometry"]["type"], "Point");
        assert_eq!(value["features"][0]["properties"]["damage_count"], 3);
        assert_eq!(value["metadata"]["feature_count"], 1);
        assert_eq!(value["metadata"]["failed_sources"][0], "job-2/gps_frames.csv");
        assert!(value["metadata"].get("density_thresholds").is_none());
    }

    #[test]
    fn deserializes_back() {
        let original = FeatureCollection::new(vec![Feature::new(None, json!({"a": 1}))]);
        let text = serde_json::to_string(&original).unwrap();
        let parsed: FeatureCollection<serde_json::Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, original);
    }
}
