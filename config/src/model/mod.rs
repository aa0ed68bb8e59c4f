//! # Default Embedding Model
//!
//! Catalog, hardware detection and the arbiter that decides which model is
//! the effective default.

pub mod arbiter;
pub mod catalog;
pub mod probe;

pub use arbiter::{ArbiterState, DEFAULT_MODEL_PATH, ModelArbiter};
pub use catalog::{ModelCatalog, ModelSpec};
pub use probe::{CapabilityProbe, HardwareProfile, StaticProbe, SystemProbe};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who chose the default model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    User,
    Recommended,
}

impl std::fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionSource::User => write!(f, "user"),
            SelectionSource::Recommended => write!(f, "recommended"),
        }
    }
}

/// The effective default embedding model and how it was chosen.
///
/// Persisted under `embedding.default_model` only when chosen by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub model_id: String,
    pub source: SelectionSource,
    pub selected_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
}

impl ModelSelection {
    pub fn new(
        model_id: impl Into<String>,
        source: SelectionSource,
        reason: impl Into<String>,
        languages: Option<Vec<String>>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            source,
            selected_at: Utc::now(),
            reason: reason.into(),
            languages,
        }
    }

    /// Same model, source and languages; timestamps and reasons ignored.
    pub fn same_choice(&self, other: &ModelSelection) -> bool {
        self.model_id == other.model_id
            && self.source == other.source
            && self.languages == other.languages
    }
}

/// Pick the best catalog model for `hardware`.
///
/// Candidates must fit in half the detected memory, have a GPU if they need
/// one and cover every requested language. The highest quality rank wins,
/// the smaller download breaking ties. Without a runnable candidate, or
/// without hardware information, the smallest CPU-only model covering the
/// languages is used, or the smallest CPU-only model when none covers them.
pub fn recommend(
    catalog: &ModelCatalog,
    hardware: Option<&HardwareProfile>,
    languages: Option<&[String]>,
) -> Result<ModelSelection, errors::ModelError> {
    let Some(hardware) = hardware else {
        return fallback(catalog, languages, "hardware detection failed");
    };

    let budget_mb = hardware.memory_mb / 2;
    let best = catalog
        .models()
        .iter()
        .filter(|model| model.min_memory_mb <= budget_mb)
        .filter(|model| !model.requires_gpu || hardware.gpu)
        .filter(|model| languages.is_none_or(|langs| model.supports_languages(langs)))
        .max_by(|a, b| {
            a.quality_rank
                .cmp(&b.quality_rank)
                .then_with(|| b.size_mb.cmp(&a.size_mb))
        });

    match best {
        Some(model) => Ok(ModelSelection::new(
            model.id.clone(),
            SelectionSource::Recommended,
            format!(
                "best fit for {} MB memory, {} cores, {}",
                hardware.memory_mb,
                hardware.cpu_cores,
                if hardware.gpu { "GPU" } else { "no GPU" }
            ),
            languages.map(<[String]>::to_vec),
        )),
        None => fallback(
            catalog,
            languages,
            "no catalog model fits the detected hardware",
        ),
    }
}

/// Smallest CPU-only model, preferring one that covers `languages`.
fn fallback(
    catalog: &ModelCatalog,
    languages: Option<&[String]>,
    cause: &str,
) -> Result<ModelSelection, errors::ModelError> {
    let owned_languages = languages.map(<[String]>::to_vec);
    let Some(langs) = languages.filter(|langs| !langs.is_empty()) else {
        let model = catalog.smallest_cpu_model()?;
        return Ok(ModelSelection::new(
            model.id.clone(),
            SelectionSource::Recommended,
            format!("{cause}, using the smallest CPU model"),
            owned_languages,
        ));
    };

    if let Some(model) = catalog.smallest_cpu_model_for(langs) {
        return Ok(ModelSelection::new(
            model.id.clone(),
            SelectionSource::Recommended,
            format!(
                "{cause}, using the smallest CPU model for {}",
                langs.join(", ")
            ),
            owned_languages,
        ));
    }

    let model = catalog.smallest_cpu_model()?;
    Ok(ModelSelection::new(
        model.id.clone(),
        SelectionSource::Recommended,
        format!(
            "{cause}, using the smallest CPU model; no CPU model covers {}",
            langs.join(", ")
        ),
        owned_languages,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hardware(memory_mb: u64, gpu: bool) -> HardwareProfile {
        HardwareProfile {
            cpu_cores: 8,
            memory_mb,
            gpu,
        }
    }

    #[test]
    fn test_recommend_scales_with_memory() {
        let catalog = ModelCatalog::embedded().unwrap();
        let small = recommend(&catalog, Some(&hardware(2048, false)), None).unwrap();
        assert_eq!(small.model_id, "bge-small-en");

        let large = recommend(&catalog, Some(&hardware(32768, false)), None).unwrap();
        assert_eq!(large.model_id, "bge-m3");
        assert_eq!(large.source, SelectionSource::Recommended);
    }

    #[test]
    fn test_recommend_uses_gpu_models_only_with_gpu() {
        let catalog = ModelCatalog::embedded().unwrap();
        let with_gpu = recommend(&catalog, Some(&hardware(131072, true)), None).unwrap();
        assert_eq!(with_gpu.model_id, "e5-mistral-7b");
        let without = recommend(&catalog, Some(&hardware(131072, false)), None).unwrap();
        assert_eq!(without.model_id, "bge-m3");
    }

    #[test]
    fn test_recommend_respects_languages() {
        let catalog = ModelCatalog::embedded().unwrap();
        let langs = vec!["de".to_string()];
        let pick = recommend(&catalog, Some(&hardware(8192, false)), Some(&langs)).unwrap();
        assert_eq!(pick.model_id, "multilingual-e5-small");
        assert_eq!(pick.languages, Some(langs));
    }

    #[test]
    fn test_recommend_without_hardware_falls_back() {
        let catalog = ModelCatalog::embedded().unwrap();
        let pick = recommend(&catalog, None, None).unwrap();
        assert_eq!(pick.model_id, catalog.smallest_cpu_model().unwrap().id);
    }

    #[test]
    fn test_recommend_tiny_host_falls_back() {
        let catalog = ModelCatalog::embedded().unwrap();
        let pick = recommend(&catalog, Some(&hardware(256, false)), None).unwrap();
        assert_eq!(pick.model_id, "minilm-l6");
    }

    #[test]
    fn test_fallback_keeps_requested_languages() {
        let catalog = ModelCatalog::embedded().unwrap();
        let german = vec!["de".to_string()];

        let tiny = recommend(&catalog, Some(&hardware(256, false)), Some(&german)).unwrap();
        assert_eq!(tiny.model_id, "multilingual-e5-small");
        assert!(catalog.get(&tiny.model_id).unwrap().supports_languages(&german));

        let blind = recommend(&catalog, None, Some(&german)).unwrap();
        assert_eq!(blind.model_id, "multilingual-e5-small");
        assert!(blind.reason.contains("de"));
    }

    #[test]
    fn test_fallback_reports_uncovered_languages() {
        let catalog = ModelCatalog::embedded().unwrap();
        let klingon = vec!["tlh".to_string()];
        let pick = recommend(&catalog, None, Some(&klingon)).unwrap();
        assert_eq!(pick.model_id, "minilm-l6");
        assert!(pick.reason.contains("no CPU model covers tlh"));
    }

    #[test]
    fn test_selection_roundtrips_through_yaml() {
        let selection = ModelSelection::new("bge-m3", SelectionSource::User, "picked", None);
        let text = serde_yaml::to_string(&selection).unwrap();
        assert!(text.contains("source: user"));
        assert!(!text.contains("languages"));
        let back: ModelSelection = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, selection);
    }
}
