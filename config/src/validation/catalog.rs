use super::{CheckOutcome, DOMAIN_PRIORITY, ValidationContext, Validator};
use crate::model::catalog::ModelCatalog;
use crate::path::{ConfigPath, PathMatcher};
use crate::value::Value;
use async_trait::async_trait;
use errors::{ConfigError, IssueKind};
use std::sync::Arc;

/// Model ids in configuration must name a curated catalog entry.
pub struct CatalogModelValidator {
    catalog: Arc<ModelCatalog>,
    matchers: Vec<PathMatcher>,
}

impl CatalogModelValidator {
    pub fn new(catalog: Arc<ModelCatalog>) -> Result<Self, ConfigError> {
        Ok(Self {
            catalog,
            matchers: vec![
                PathMatcher::new("folders[*].model")?,
                PathMatcher::new("embedding.default_model.model_id")?,
            ],
        })
    }
}

#[async_trait]
impl Validator for CatalogModelValidator {
    fn name(&self) -> &str {
        "catalog-model"
    }

    fn description(&self) -> &str {
        "model ids must exist in the model catalog"
    }

    fn priority(&self) -> i32 {
        DOMAIN_PRIORITY + 20
    }

    fn kind(&self) -> IssueKind {
        IssueKind::Domain
    }

    fn applies_to(&self) -> &[PathMatcher] {
        &self.matchers
    }

    async fn check(
        &self,
        path: &ConfigPath,
        value: &Value,
        _ctx: &ValidationContext<'_>,
    ) -> anyhow::Result<CheckOutcome> {
        match value.as_str() {
            Some(id) if !self.catalog.contains(id) => Ok(CheckOutcome::error(
                path,
                format!(
                    "unknown model `{id}` (catalog v{} has {} models)",
                    self.catalog.version,
                    self.catalog.models().len()
                ),
            )),
            _ => Ok(CheckOutcome::ok()),
        }
    }
}
