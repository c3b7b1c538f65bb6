//! Rewrites object-storage URIs into fetchable HTTPS URLs.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Bucket that ships with a dedicated region-specific host.
pub const DEFAULT_BUCKET: &str = "roadscan-detections";

/// Region of [`DEFAULT_BUCKET`].
pub const DEFAULT_BUCKET_REGION: &str = "us-east-2";

static STORAGE_URI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:s3a?|s3n)://([^/]+)/?(.*)$").expect("valid regex"));

/// Maps `s3://bucket/key` URIs to HTTP(S) URLs.
///
/// Resolution order: an explicit base URL for the bucket, then the
/// region-specific host of the default bucket, then the generic
/// virtual-hosted-style URL.
#[derive(Debug, Clone)]
pub struct StorageUrlResolver {
    pub default_bucket: String,
    pub default_region: String,
    pub base_urls: HashMap<String, String>,
}

impl Default for StorageUrlResolver {
    fn default() -> Self {
        Self {
            default_bucket: DEFAULT_BUCKET.to_string(),
            default_region: DEFAULT_BUCKET_REGION.to_string(),
            base_urls: HashMap::new(),
        }
    }
}

impl StorageUrlResolver {
    pub fn new(default_bucket: impl Into<String>, default_region: impl Into<String>) -> Self {
        Self {
            default_bucket: default_bucket.into(),
            default_region: default_region.into(),
            base_urls: HashMap::new(),
        }
    }

    /// Register an explicit base URL for a bucket. Trailing slashes are trimmed.
    pub fn with_base_url(mut self, bucket: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        self.base_urls
            .insert(bucket.into(), base.trim_end_matches('/').to_string());
        self
    }

    /// Parse `bucket=https://base,other=https://base2` overrides.
    pub fn with_base_url_list(mut self, mappings: &str) -> Result<Self, CoreError> {
        for entry in mappings.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (bucket, base) = entry.split_once('=').ok_or_else(|| {
                CoreError::Validation(format!("Invalid bucket mapping '{entry}', expected bucket=url"))
            })?;
            let (bucket, base) = (bucket.trim(), base.trim());
            if bucket.is_empty() || !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(CoreError::Validation(format!(
                    "Invalid bucket mapping '{entry}', expected bucket=http(s)://..."
                )));
            }
            self = self.with_base_url(bucket, base);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.default_bucket.trim().is_empty() {
            return Err(CoreError::Validation("default_bucket must not be empty".into()));
        }
        if self.default_region.trim().is_empty() {
            return Err(CoreError::Validation("default_region must not be empty".into()));
        }
        Ok(())
    }

    /// Resolve one URI. HTTP(S) URLs and unrecognized strings pass through
    /// unchanged; blank input yields `None`.
    pub fn resolve(&self, uri: &str) -> Option<String> {
        let trimmed = uri.trim();
        if trimmed.is_empty() {
            return None;
        }
        let Some(caps) = STORAGE_URI_RE.captures(trimmed) else {
            return Some(trimmed.to_string());
        };
        let bucket = &caps[1];
        let key = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

        let url = if let Some(base) = self.base_urls.get(bucket) {
            format!("{base}/{key}")
        } else if bucket == self.default_bucket {
            format!("https://{bucket}.s3.{}.amazonaws.com/{key}", self.default_region)
        } else {
            format!("https://{bucket}.s3.amazonaws.com/{key}")
        };
        Some(url)
    }
}
