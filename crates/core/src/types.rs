//! Shared primitive types for defects, frames, and coordinates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Milliseconds since the Unix epoch. Fractional values are allowed.
pub type EpochMillis = f64;

/// Frame identifiers are integral across every input source.
pub type FrameId = i64;

/// A `[longitude, latitude]` pair, serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat(pub f64, pub f64);

impl LngLat {
    pub fn lng(self) -> f64 {
        self.0
    }

    pub fn lat(self) -> f64 {
        self.1
    }

    /// Both components are finite and inside the valid WGS84 ranges.
    pub fn is_valid(self) -> bool {
        self.0.is_finite()
            && self.1.is_finite()
            && (-180.0..=180.0).contains(&self.0)
            && (-90.0..=90.0).contains(&self.1)
    }
}

// ---------------------------------------------------------------------------
// DefectType
// ---------------------------------------------------------------------------

/// Category of a detected pavement defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectType {
    Transverse,
    Longitudinal,
    Alligator,
    Pothole,
    SealedCrack,
    Other,
}

impl DefectType {
    pub const ALL: [DefectType; 6] = [
        DefectType::Transverse,
        DefectType::Longitudinal,
        DefectType::Alligator,
        DefectType::Pothole,
        DefectType::SealedCrack,
        DefectType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transverse => "transverse",
            Self::Longitudinal => "longitudinal",
            Self::Alligator => "alligator",
            Self::Pothole => "pothole",
            Self::SealedCrack => "sealed_crack",
            Self::Other => "other",
        }
    }

    /// Whether a defect of this type counts toward segment damage.
    /// Sealed cracks are already repaired and never count.
    pub fn counts_as_damage(self) -> bool {
        self != Self::SealedCrack
    }

    /// Infallible variant of [`FromStr`]: unknown labels become `Other`.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(Self::Other)
    }
}

impl fmt::Display for DefectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefectType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_label(s);
        let key = key
            .strip_suffix("_cracking")
            .or_else(|| key.strip_suffix("_cracks"))
            .or_else(|| key.strip_suffix("_crack"))
            .unwrap_or(&key);
        match key {
            "transverse" => Ok(Self::Transverse),
            "longitudinal" => Ok(Self::Longitudinal),
            "alligator" | "fatigue" => Ok(Self::Alligator),
            "pothole" | "potholes" => Ok(Self::Pothole),
            "sealed" | "crack_seal" | "crack_sealed" => Ok(Self::SealedCrack),
            "other" => Ok(Self::Other),
            _ if key.starts_with("sealed") => Ok(Self::SealedCrack),
            _ => Err(CoreError::UnknownDefectType(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// ASTM distress severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "l" | "low" | "minor" | "light" => Ok(Self::Low),
            "m" | "medium" | "moderate" | "med" => Ok(Self::Medium),
            "h" | "high" | "severe" | "major" => Ok(Self::High),
            _ => Err(CoreError::UnknownSeverity(s.to_string())),
        }
    }
}

/// Lowercase, trim, and collapse spaces/hyphens into underscores.
fn normalize_label(s: &str) -> String {
    s.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defect_type_accepts_aliases() {
        assert_eq!("Alligator Crack".parse::<DefectType>().unwrap(), DefectType::Alligator);
        assert_eq!("longitudinal-crack".parse::<DefectType>().unwrap(), DefectType::Longitudinal);
        assert_eq!("sealed".parse::<DefectType>().unwrap(), DefectType::SealedCrack);
        assert_eq!("sealed_crack".parse::<DefectType>().unwrap(), DefectType::SealedCrack);
        assert_eq!("POTHOLE".parse::<DefectType>().unwrap(), DefectType::Pothole);
    }

    #[test]
    fn defect_type_unknown_is_error() {
        assert_matches!("rutting".parse::<DefectType>(), Err(CoreError::UnknownDefectType(_)));
        assert_eq!(DefectType::from_label("rutting"), DefectType::Other);
    }

    #[test]
    fn defect_type_serializes_snake_case() {
        let json = serde_json::to_string(&DefectType::SealedCrack).unwrap();
        assert_eq!(json, "\"sealed_crack\"");
    }

    #[test]
    fn only_sealed_cracks_are_excluded_from_damage() {
        for t in DefectType::ALL {
            assert_eq!(t.counts_as_damage(), t != DefectType::SealedCrack);
        }
    }

    #[test]
    fn severity_parses_short_and_long_forms() {
        assert_eq!("M".parse::<Severity>().unwrap(), Severity::Medium);
        assert_eq!("moderate".parse::<Severity>().unwrap(), Severity::Medium);
        assert_eq!(" High ".parse::<Severity>().unwrap(), Severity::High);
        assert_matches!("extreme".parse::<Severity>(), Err(CoreError::UnknownSeverity(_)));
    }

    #[test]
    fn lnglat_validity() {
        assert!(LngLat(-83.0, 42.3).is_valid());
        assert!(!LngLat(f64::NAN, 42.3).is_valid());
        assert!(!LngLat(0.0, 95.0).is_valid());
    }
}
