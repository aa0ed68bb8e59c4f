//! # Embedding Model Catalog
//!
//! The curated set of models the daemon knows how to run. The catalog is a
//! versioned YAML document compiled into the binary and may be replaced by a
//! file at startup.

use errors::ModelError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

/// Catalog compiled into the binary.
pub const EMBEDDED_CATALOG: &str = include_str!("../../catalog.yaml");

/// One curated embedding model.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Describes what a model needs to run and how good it is, so the arbiter
/// can pick one for the detected hardware.
///
/// ## Fields
/// - `id`: Stable identifier stored in configuration
/// - `dimensions`: Embedding vector width
/// - `size_mb`: Download size
/// - `min_memory_mb`: Memory needed to load the model
/// - `requires_gpu`: Whether CPU-only hosts can run it
/// - `languages`: ISO 639-1 codes the model handles well
/// - `quality_rank`: Higher is better
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq, Eq)]
pub struct ModelSpec {
    #[validate(length(min = 1, max = 255))]
    pub id: String,

    #[validate(length(min = 1, max = 255))]
    pub display_name: String,

    #[validate(range(min = 1, max = 16384))]
    pub dimensions: u32,

    pub size_mb: u64,

    pub min_memory_mb: u64,

    #[serde(default)]
    pub requires_gpu: bool,

    #[serde(default)]
    pub languages: Vec<String>,

    pub quality_rank: u32,
}

impl ModelSpec {
    /// Whether the model handles every requested language.
    pub fn supports_languages(&self, languages: &[String]) -> bool {
        languages
            .iter()
            .all(|lang| self.languages.iter().any(|known| known.eq_ignore_ascii_case(lang)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelCatalog {
    pub version: u32,
    pub models: Vec<ModelSpec>,
}

impl ModelCatalog {
    pub fn embedded() -> Result<Self, ModelError> {
        Self::from_yaml_str(EMBEDDED_CATALOG, "<embedded>")
    }

    pub fn from_yaml_str(text: &str, origin: &str) -> Result<Self, ModelError> {
        let catalog: ModelCatalog = serde_yaml::from_str(text).map_err(|e| ModelError::Catalog {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;
        catalog.check(origin)?;
        Ok(catalog)
    }

    pub async fn load(path: &Path) -> Result<Self, ModelError> {
        let origin = path.display().to_string();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ModelError::Catalog {
                origin: origin.clone(),
                reason: e.to_string(),
            })?;
        Self::from_yaml_str(&text, &origin)
    }

    fn check(&self, origin: &str) -> Result<(), ModelError> {
        if self.models.is_empty() {
            return Err(ModelError::CatalogEmpty);
        }
        let mut seen = std::collections::BTreeSet::new();
        for model in &self.models {
            model.validate().map_err(|e| ModelError::Catalog {
                origin: origin.to_string(),
                reason: format!("model `{}`: {e}", model.id),
            })?;
            if !seen.insert(model.id.as_str()) {
                return Err(ModelError::Catalog {
                    origin: origin.to_string(),
                    reason: format!("duplicate model id `{}`", model.id),
                });
            }
        }
        Ok(())
    }

    pub fn models(&self) -> &[ModelSpec] {
        &self.models
    }

    pub fn get(&self, id: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|model| model.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn require(&self, id: &str) -> Result<&ModelSpec, ModelError> {
        self.get(id).ok_or_else(|| ModelError::UnknownModel {
            model_id: id.to_string(),
        })
    }

    /// The smallest model that runs without a GPU. Used when hardware
    /// detection fails.
    pub fn smallest_cpu_model(&self) -> Result<&ModelSpec, ModelError> {
        self.models
            .iter()
            .filter(|model| !model.requires_gpu)
            .min_by_key(|model| (model.min_memory_mb, model.size_mb))
            .ok_or(ModelError::NoCpuModel)
    }

    /// The smallest CPU-only model covering every language in `languages`.
    pub fn smallest_cpu_model_for(&self, languages: &[String]) -> Option<&ModelSpec> {
        self.models
            .iter()
            .filter(|model| !model.requires_gpu && model.supports_languages(languages))
            .min_by_key(|model| (model.min_memory_mb, model.size_mb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_catalog_loads() {
        let catalog = ModelCatalog::embedded().unwrap();
        assert!(catalog.version >= 1);
        assert!(catalog.contains("minilm-l6"));
        assert!(!catalog.contains("modelX"));
    }

    #[test]
    fn test_smallest_cpu_model_from_catalog() {
        let catalog = ModelCatalog::embedded().unwrap();
        assert_eq!(catalog.smallest_cpu_model().unwrap().id, "minilm-l6");
    }

    #[test]
    fn test_smallest_cpu_model_skips_gpu_models() {
        let catalog = ModelCatalog::from_yaml_str(
            r#"
version: 1
models:
  - { id: tiny-gpu, display_name: Tiny GPU, dimensions: 8, size_mb: 1, min_memory_mb: 1, requires_gpu: true, quality_rank: 9 }
  - { id: big-cpu, display_name: Big CPU, dimensions: 8, size_mb: 900, min_memory_mb: 4096, quality_rank: 1 }
"#,
            "test",
        )
        .unwrap();
        assert_eq!(catalog.smallest_cpu_model().unwrap().id, "big-cpu");
    }

    #[test]
    fn test_smallest_cpu_model_for_languages() {
        let catalog = ModelCatalog::embedded().unwrap();
        let german = vec!["de".to_string()];
        assert_eq!(
            catalog.smallest_cpu_model_for(&german).unwrap().id,
            "multilingual-e5-small"
        );
        assert!(catalog.smallest_cpu_model_for(&["tlh".to_string()]).is_none());
    }

    #[test]
    fn test_gpu_only_catalog_has_no_fallback() {
        let catalog = ModelCatalog::from_yaml_str(
            "version: 1\nmodels:\n  - { id: g, display_name: G, dimensions: 8, size_mb: 1, min_memory_mb: 1, requires_gpu: true, quality_rank: 1 }\n",
            "test",
        )
        .unwrap();
        assert!(matches!(catalog.smallest_cpu_model(), Err(ModelError::NoCpuModel)));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        let result = ModelCatalog::from_yaml_str("version: 1\nmodels: []\n", "test");
        assert!(matches!(result, Err(ModelError::CatalogEmpty)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let entry = "{ id: a, display_name: A, dimensions: 8, size_mb: 1, min_memory_mb: 1, quality_rank: 1 }";
        let text = format!("version: 1\nmodels:\n  - {entry}\n  - {entry}\n");
        assert!(matches!(
            ModelCatalog::from_yaml_str(&text, "test"),
            Err(ModelError::Catalog { .. })
        ));
    }

    #[test]
    fn test_invalid_dimensions_rejected() {
        let result = ModelCatalog::from_yaml_str(
            "version: 1\nmodels:\n  - { id: a, display_name: A, dimensions: 0, size_mb: 1, min_memory_mb: 1, quality_rank: 1 }\n",
            "test",
        );
        assert!(matches!(result, Err(ModelError::Catalog { .. })));
    }

    #[test]
    fn test_language_support_is_case_insensitive() {
        let catalog = ModelCatalog::embedded().unwrap();
        let model = catalog.get("multilingual-e5-small").unwrap();
        assert!(model.supports_languages(&["DE".to_string(), "fr".to_string()]));
        assert!(!catalog.get("minilm-l6").unwrap().supports_languages(&["de".to_string()]));
    }

    #[tokio::test]
    async fn test_load_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, EMBEDDED_CATALOG).unwrap();
        let catalog = ModelCatalog::load(&path).await.unwrap();
        assert_eq!(catalog, ModelCatalog::embedded().unwrap());
    }
}
