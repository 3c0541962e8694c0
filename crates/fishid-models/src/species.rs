//! Species reference data used to enrich identifications.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Catalog shipped with the crate.
const EMBEDDED_CATALOG: &str = include_str!("../data/species.json");

/// Environment variable pointing at a replacement catalog file.
pub const SPECIES_CATALOG_PATH_ENV: &str = "SPECIES_CATALOG_PATH";

#[derive(Debug, Error)]
pub enum SpeciesCatalogError {
    #[error("Failed to read species catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid species catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Reference information for one species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpeciesInfo {
    /// Common name shown to users
    pub local_name: String,
    pub native_status: String,
    pub population_status: String,
    pub avg_size_cm: u32,
    /// Legal minimum catch size; `None` when there is no minimum
    #[serde(default)]
    pub min_size_cm: Option<u32>,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub seasonal_ban: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub description: String,
}

impl SpeciesInfo {
    pub fn min_size_display(&self) -> String {
        match self.min_size_cm {
            Some(cm) => format!("{} cm", cm),
            None => "no minimum size".to_string(),
        }
    }

    pub fn seasonal_ban_display(&self) -> &'static str {
        if self.seasonal_ban {
            "active"
        } else {
            "inactive"
        }
    }
}

/// Lookup table from classifier label to species information.
#[derive(Debug, Clone, Default)]
pub struct SpeciesCatalog {
    species: HashMap<String, SpeciesInfo>,
}

impl SpeciesCatalog {
    /// The catalog bundled with this crate.
    pub fn embedded() -> Result<Self, SpeciesCatalogError> {
        Self::from_json(EMBEDDED_CATALOG)
    }

    pub fn from_json(json: &str) -> Result<Self, SpeciesCatalogError> {
        let species: HashMap<String, SpeciesInfo> = serde_json::from_str(json)?;
        Ok(Self { species })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SpeciesCatalogError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SpeciesCatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Load from `SPECIES_CATALOG_PATH` if set, otherwise the embedded catalog.
    pub fn from_env() -> Result<Self, SpeciesCatalogError> {
        match std::env::var(SPECIES_CATALOG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::load(path),
            _ => Self::embedded(),
        }
    }

    pub fn get(&self, label: &str) -> Option<&SpeciesInfo> {
        self.species.get(label)
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    /// Labels in sorted order.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.species.keys().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_catalog_is_complete() {
        let catalog = SpeciesCatalog::embedded().unwrap();
        assert_eq!(catalog.len(), 20);
        for label in catalog.labels() {
            let info = catalog.get(label).unwrap();
            assert!(!info.local_name.is_empty(), "{label} has no name");
            assert!(info.avg_size_cm > 0, "{label} has no size");
            assert!(info.min_size_cm.map_or(true, |cm| cm > 0));
        }
    }

    #[test]
    fn test_display_helpers() {
        let catalog = SpeciesCatalog::embedded().unwrap();
        let grouper = catalog.get("Epinephelus marginatus").unwrap();
        assert_eq!(grouper.min_size_display(), "40 cm");
        assert_eq!(grouper.seasonal_ban_display(), "active");
        assert!(grouper.protected);

        let bream = catalog.get("Sparus aurata").unwrap();
        assert_eq!(bream.min_size_display(), "no minimum size");
        assert_eq!(bream.seasonal_ban_display(), "inactive");
    }

    #[test]
    fn test_invalid_catalog_rejected() {
        assert!(matches!(
            SpeciesCatalog::from_json("[1, 2, 3]"),
            Err(SpeciesCatalogError::Parse(_))
        ));
        assert!(matches!(
            SpeciesCatalog::load("/nonexistent/species.json"),
            Err(SpeciesCatalogError::Io { .. })
        ));
    }
}
