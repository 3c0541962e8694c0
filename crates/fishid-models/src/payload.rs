//! Versioned identification payload.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{SpeciesCatalog, SpeciesInfo};

/// Current payload schema version.
pub const PAYLOAD_SCHEMA_VERSION: u32 = 1;

/// Identifications below this confidence are flagged for human review.
pub const REVIEW_CONFIDENCE_THRESHOLD: f64 = 0.70;

/// Payload validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("Unsupported payload schema version: {0}")]
    UnsupportedVersion(u32),

    #[error("Species label is empty")]
    EmptySpecies,

    #[error("Confidence out of range: {0}")]
    ConfidenceOutOfRange(f64),

    #[error("needs_review does not match confidence {0}")]
    InconsistentReviewFlag(f64),
}

/// Outcome of a successful classification, as stored and served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IdentificationPayload {
    /// Payload schema version
    pub schema_version: u32,

    /// Classifier label
    pub species: String,

    /// Classifier confidence in `[0, 1]`
    pub confidence: f64,

    /// Set when confidence is below the review threshold
    pub needs_review: bool,

    /// Reference data for the species, when the catalog knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species_info: Option<SpeciesInfo>,
}

impl IdentificationPayload {
    /// Build a payload from a classifier result, enriching it from the catalog.
    pub fn from_classification(
        species: impl Into<String>,
        confidence: f64,
        catalog: &SpeciesCatalog,
    ) -> Self {
        let species = species.into();
        let species_info = catalog.get(&species).cloned();
        Self {
            schema_version: PAYLOAD_SCHEMA_VERSION,
            needs_review: needs_review(confidence),
            species,
            confidence,
            species_info,
        }
    }

    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.schema_version != PAYLOAD_SCHEMA_VERSION {
            return Err(PayloadError::UnsupportedVersion(self.schema_version));
        }
        if self.species.trim().is_empty() {
            return Err(PayloadError::EmptySpecies);
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(PayloadError::ConfidenceOutOfRange(self.confidence));
        }
        if self.needs_review != needs_review(self.confidence) {
            return Err(PayloadError::InconsistentReviewFlag(self.confidence));
        }
        Ok(())
    }

    /// Display name: the catalog's local name, or the raw label.
    pub fn display_name(&self) -> &str {
        self.species_info
            .as_ref()
            .map(|info| info.local_name.as_str())
            .unwrap_or(&self.species)
    }

    /// Subject line for the human-readable notification.
    pub fn summary_subject(&self) -> String {
        format!("Result: {}", self.display_name())
    }

    /// Human-readable notification text.
    pub fn summary_text(&self) -> String {
        let mut text = format!(
            "Identified: {} ({}) - confidence: {:.0}%",
            self.display_name(),
            self.species,
            self.confidence * 100.0
        );
        if let Some(info) = &self.species_info {
            text.push_str(&format!(
                "\nStatus: {} | {}\nMinimum size: {}\nSeasonal ban: {}\nNotes: {}",
                info.native_status,
                info.population_status,
                info.min_size_display(),
                info.seasonal_ban_display(),
                info.notes
            ));
        }
        if self.needs_review {
            text.push_str("\nLow confidence: flagged for review");
        }
        text
    }

    /// JSON Schema for this payload.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(IdentificationPayload)
    }
}

fn needs_review(confidence: f64) -> bool {
    confidence < REVIEW_CONFIDENCE_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_threshold() {
        let catalog = SpeciesCatalog::embedded().unwrap();
        assert!(IdentificationPayload::from_classification("Epinephelus marginatus", 0.69, &catalog).needs_review);
        assert!(!IdentificationPayload::from_classification("Epinephelus marginatus", 0.70, &catalog).needs_review);
    }

    #[test]
    fn test_catalog_enrichment() {
        let catalog = SpeciesCatalog::embedded().unwrap();
        let payload = IdentificationPayload::from_classification("Epinephelus marginatus", 0.93, &catalog);
        assert!(payload.species_info.is_some());
        assert_eq!(payload.display_name(), "Dusky Grouper");

        let unknown = IdentificationPayload::from_classification("Unknownus fishus", 0.93, &catalog);
        assert!(unknown.species_info.is_none());
        assert_eq!(unknown.display_name(), "Unknownus fishus");
        assert!(unknown.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_payloads() {
        let catalog = SpeciesCatalog::embedded().unwrap();
        let good = IdentificationPayload::from_classification("Dicentrarchus labrax", 0.8, &catalog);
        assert_eq!(good.validate(), Ok(()));

        let mut bad = good.clone();
        bad.schema_version = 2;
        assert_eq!(bad.validate(), Err(PayloadError::UnsupportedVersion(2)));

        let mut bad = good.clone();
        bad.species = "  ".into();
        assert_eq!(bad.validate(), Err(PayloadError::EmptySpecies));

        let mut bad = good.clone();
        bad.confidence = 1.5;
        assert!(matches!(bad.validate(), Err(PayloadError::ConfidenceOutOfRange(_))));

        let mut bad = good;
        bad.needs_review = true;
        assert!(matches!(bad.validate(), Err(PayloadError::InconsistentReviewFlag(_))));
    }

    #[test]
    fn test_summary_text() {
        let catalog = SpeciesCatalog::embedded().unwrap();
        let payload = IdentificationPayload::from_classification("Sparus aurata", 0.912, &catalog);
        assert_eq!(payload.summary_subject(), "Result: Gilt-head Bream");
        let text = payload.summary_text();
        assert!(text.starts_with("Identified: Gilt-head Bream (Sparus aurata) - confidence: 91%"));
        assert!(text.contains("Minimum size: no minimum size"));
        assert!(text.contains("Seasonal ban: inactive"));
        assert!(!text.contains("review"));
    }

    #[test]
    fn test_schema_names_required_fields() {
        let schema = serde_json::to_value(IdentificationPayload::json_schema()).unwrap();
        let required = schema["required"].as_array().unwrap();
        for field in ["schema_version", "species", "confidence", "needs_review"] {
            assert!(required.iter().any(|v| v == field), "missing {field}");
        }
    }
}
