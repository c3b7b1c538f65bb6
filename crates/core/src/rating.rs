//! PCI score to condition band mapping.
//!
//! Two scales are in use: the standard six-band scale for ASTM deduct
//! calculations and a seven-band scale for pixel-coverage estimates, which
//! splits the bottom band at 10.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Condition band for a PCI score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PciRating {
    Good,
    Satisfactory,
    Fair,
    Poor,
    #[serde(rename = "Very Poor")]
    VeryPoor,
    Serious,
    Failed,
}

impl PciRating {
    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Satisfactory => "Satisfactory",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
            Self::VeryPoor => "Very Poor",
            Self::Serious => "Serious",
            Self::Failed => "Failed",
        }
    }

    /// Hex display color for the band.
    pub fn color(self) -> &'static str {
        match self {
            Self::Good => "#22c55e",
            Self::Satisfactory => "#84cc16",
            Self::Fair => "#eab308",
            Self::Poor => "#f97316",
            Self::VeryPoor => "#ef4444",
            Self::Serious => "#b91c1c",
            Self::Failed => "#7f1d1d",
        }
    }
}

impl fmt::Display for PciRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lower bounds, best band first. A score falls in the first band whose
/// bound it meets.
const STANDARD_BANDS: &[(f64, PciRating)] = &[
    (85.0, PciRating::Good),
    (70.0, PciRating::Satisfactory),
    (55.0, PciRating::Fair),
    (40.0, PciRating::Poor),
    (25.0, PciRating::VeryPoor),
];

const PIXEL_BANDS: &[(f64, PciRating)] = &[
    (85.0, PciRating::Good),
    (70.0, PciRating::Satisfactory),
    (55.0, PciRating::Fair),
    (40.0, PciRating::Poor),
    (25.0, PciRating::VeryPoor),
    (10.0, PciRating::Serious),
];

fn band(score: f64, bands: &[(f64, PciRating)]) -> PciRating {
    bands
        .iter()
        .find(|(lower, _)| score >= *lower)
        .map(|(_, rating)| *rating)
        .unwrap_or(PciRating::Failed)
}

/// Standard scale: below 25 is `Failed`.
pub fn get_pci_rating(score: f64) -> PciRating {
    band(score, STANDARD_BANDS)
}

/// Pixel-coverage scale: 10-25 is `Serious`, below 10 is `Failed`.
pub fn get_pixel_based_pci_rating(score: f64) -> PciRating {
    band(score, PIXEL_BANDS)
}

/// Display color for a score on the standard scale.
pub fn get_pci_color(score: f64) -> &'static str {
    get_pci_rating(score).color()
}

/// Display color for a score on the pixel-coverage scale.
pub fn get_pixel_based_pci_color(score: f64) -> &'static str {
    get_pixel_based_pci_rating(score).color()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_thresholds() {
        assert_eq!(get_pci_rating(100.0), PciRating::Good);
        assert_eq!(get_pci_rating(85.0), PciRating::Good);
        assert_eq!(get_pci_rating(84.9), PciRating::Satisfactory);
        assert_eq!(get_pci_rating(70.0), PciRating::Satisfactory);
        assert_eq!(get_pci_rating(55.0), PciRating::Fair);
        assert_eq!(get_pci_rating(40.0), PciRating::Poor);
        assert_eq!(get_pci_rating(25.0), PciRating::VeryPoor);
        assert_eq!(get_pci_rating(24.9), PciRating::Failed);
        assert_eq!(get_pci_rating(12.0), PciRating::Failed);
    }

    #[test]
    fn pixel_thresholds_split_bottom_band() {
        assert_eq!(get_pixel_based_pci_rating(72.0), PciRating::Satisfactory);
        assert_eq!(get_pixel_based_pci_rating(24.9), PciRating::Serious);
        assert_eq!(get_pixel_based_pci_rating(10.0), PciRating::Serious);
        assert_eq!(get_pixel_based_pci_rating(9.9), PciRating::Failed);
    }

    #[test]
    fn nan_falls_to_worst_band() {
        assert_eq!(get_pci_rating(f64::NAN), PciRating::Failed);
    }

    #[test]
    fn colors_follow_bands() {
        assert_eq!(get_pci_color(90.0), "#22c55e");
        assert_eq!(get_pci_color(5.0), "#7f1d1d");
    }

    #[test]
    fn pixel_scale_colors_serious_band_apart_from_failed() {
        assert_eq!(get_pixel_based_pci_color(18.0), PciRating::Serious.color());
        assert_eq!(get_pixel_based_pci_color(5.0), PciRating::Failed.color());
        assert_ne!(get_pixel_based_pci_color(18.0), get_pci_color(18.0));
        assert_eq!(get_pixel_based_pci_color(90.0), get_pci_color(90.0));
    }

    #[test]
    fn rating_serializes_as_label() {
        assert_eq!(serde_json::to_string(&PciRating::VeryPoor).unwrap(), "\"Very Poor\"");
        assert_eq!(PciRating::Satisfactory.to_string(), "Satisfactory");
    }
}
