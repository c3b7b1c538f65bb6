use std::path::PathBuf;

use anyhow::{bail, Context};

use roadscan_core::segments::SegmentBuilderConfig;
use roadscan_core::storage_url::{StorageUrlResolver, DEFAULT_BUCKET, DEFAULT_BUCKET_REGION};
use roadscan_pipeline::OutputMode;

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// `json` (any case) selects JSON; anything else is pretty.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Dataset root with one sub-directory per job.
    pub data_dir: PathBuf,
    /// Output file; `None` writes to stdout.
    pub output_path: Option<PathBuf>,
    pub output_mode: OutputMode,
    pub segments: SegmentBuilderConfig,
    pub resolver: StorageUrlResolver,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                         | Default                 |
    /// |---------------------------------|-------------------------|
    /// | `DATA_DIR`                      | required                |
    /// | `OUTPUT_PATH`                   | stdout                  |
    /// | `OUTPUT_MODE`                   | `segments`              |
    /// | `SEGMENT_LENGTH_FEET`           | `528`                   |
    /// | `GEOMETRIC_SEGMENT_LENGTH_FEET` | `500`                   |
    /// | `MIN_SPEED_MPH`                 | `5`                     |
    /// | `DEFAULT_BUCKET`                | `roadscan-detections`   |
    /// | `DEFAULT_BUCKET_REGION`         | `us-east-2`             |
    /// | `BUCKET_BASE_URLS`              | empty                   |
    /// | `LOG_FORMAT`                    | `pretty`                |
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`WorkerConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |key: &str, default: f64| -> anyhow::Result<f64> {
            match var(key) {
                Some(v) => v
                    .parse::<f64>()
                    .with_context(|| format!("{key} must be a number, got {v:?}")),
                None => Ok(default),
            }
        };

        let Some(data_dir) = var("DATA_DIR") else {
            bail!("DATA_DIR must be set");
        };

        let output_mode = match var("OUTPUT_MODE") {
            Some(v) => v.parse::<OutputMode>()?,
            None => OutputMode::default(),
        };

        let defaults = SegmentBuilderConfig::default();
        let segments = SegmentBuilderConfig {
            segment_length_feet: number("SEGMENT_LENGTH_FEET", defaults.segment_length_feet)?,
            geometric_segment_length_feet: number(
                "GEOMETRIC_SEGMENT_LENGTH_FEET",
                defaults.geometric_segment_length_feet,
            )?,
            min_speed_mph: number("MIN_SPEED_MPH", defaults.min_speed_mph)?,
            ..defaults
        };
        segments.validate()?;

        let resolver = StorageUrlResolver::new(
            var("DEFAULT_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.into()),
            var("DEFAULT_BUCKET_REGION").unwrap_or_else(|| DEFAULT_BUCKET_REGION.into()),
        )
        .with_base_url_list(&var("BUCKET_BASE_URLS").unwrap_or_default())?;
        resolver.validate()?;

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            output_path: var("OUTPUT_PATH").map(PathBuf::from),
            output_mode,
            segments,
            resolver,
            log_format: LogFormat::parse(var("LOG_FORMAT").as_deref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_data_dir_is_set() {
        let config = WorkerConfig::from_lookup(lookup(&[("DATA_DIR", "/data")])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.output_path, None);
        assert_eq!(config.output_mode, OutputMode::Segments);
        assert_eq!(config.segments, SegmentBuilderConfig::default());
        assert_eq!(config.resolver.default_bucket, DEFAULT_BUCKET);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides_are_read() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("DATA_DIR", "/data"),
            ("OUTPUT_PATH", "/tmp/out.json"),
            ("OUTPUT_MODE", "density"),
            ("SEGMENT_LENGTH_FEET", "1000"),
            ("MIN_SPEED_MPH", "0"),
            ("BUCKET_BASE_URLS", "frames=https://cdn.example.com/frames/"),
            ("LOG_FORMAT", "JSON"),
        ]))
        .unwrap();
        assert_eq!(config.output_path, Some(PathBuf::from("/tmp/out.json")));
        assert_eq!(config.output_mode, OutputMode::Density);
        assert_eq!(config.segments.segment_length_feet, 1000.0);
        assert_eq!(config.segments.min_speed_mph, 0.0);
        assert_eq!(
            config.resolver.base_urls.get("frames").map(String::as_str),
            Some("https://cdn.example.com/frames")
        );
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn missing_data_dir_is_an_error() {
        let err = WorkerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("DATA_DIR"));
    }

    #[test]
    fn bad_numbers_and_modes_are_errors() {
        assert!(WorkerConfig::from_lookup(lookup(&[("DATA_DIR", "/d"), ("MIN_SPEED_MPH", "fast")])).is_err());
        assert!(WorkerConfig::from_lookup(lookup(&[("DATA_DIR", "/d"), ("SEGMENT_LENGTH_FEET", "-5")])).is_err());
        assert!(WorkerConfig::from_lookup(lookup(&[("DATA_DIR", "/d"), ("OUTPUT_MODE", "tiles")])).is_err());
    }
}
