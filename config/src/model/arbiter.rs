//! # Default-Model Arbiter
//!
//! Decides the effective default embedding model.
//!
//! # States
//! 1. `Unset`: nothing decided yet
//! 2. `Recommended`: derived from the detected hardware
//! 3. `UserSelected`: the user picked a model, which wins from then on
//!
//! The user's choice lives in configuration at `embedding.default_model`.
//! Recommendations are never persisted; they live in the registry's
//! default-model channel.

use super::catalog::ModelCatalog;
use super::probe::CapabilityProbe;
use super::{ModelSelection, SelectionSource, recommend};
use crate::gateway::ConfigGateway;
use crate::path::{ConfigPath, PathFilter};
use crate::registry::ConfigRegistry;
use crate::value::Value;
use errors::{ConfigError, ModelError, ValidationIssue};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where the user's selection is persisted.
pub const DEFAULT_MODEL_PATH: &str = "embedding.default_model";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbiterState {
    Unset,
    Recommended,
    UserSelected,
}

pub struct ModelArbiter {
    catalog: Arc<ModelCatalog>,
    probe: Arc<dyn CapabilityProbe>,
    gateway: Arc<ConfigGateway>,
    registry: Arc<ConfigRegistry>,
    recommended: RwLock<Option<ModelSelection>>,
}

impl ModelArbiter {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        probe: Arc<dyn CapabilityProbe>,
        gateway: Arc<ConfigGateway>,
    ) -> Self {
        let registry = Arc::clone(gateway.registry());
        Self {
            catalog,
            probe,
            gateway,
            registry,
            recommended: RwLock::new(None),
        }
    }

    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }

    /// Startup arbitration.
    ///
    /// A persisted user choice is published as is. Otherwise the hardware
    /// is probed once and the recommendation published.
    pub async fn initialize(&self) -> Result<ModelSelection, ModelError> {
        if let Some(selection) = self.persisted_selection() {
            info!("Default model {} (selected by user)", selection.model_id);
            self.publish(selection.clone());
            return Ok(selection);
        }

        let recommendation = self.get_recommended_model(None).await?;
        *self.recommended.write() = Some(recommendation.clone());
        info!(
            "Default model {} (recommended: {})",
            recommendation.model_id, recommendation.reason
        );
        self.publish(recommendation.clone());
        Ok(recommendation)
    }

    /// The effective default: the user's persisted choice, or else the
    /// recommendation already published. Never probes hardware.
    pub fn get_default_model(&self) -> Option<ModelSelection> {
        self.persisted_selection()
            .or_else(|| self.recommended.read().clone())
            .or_else(|| {
                self.registry
                    .default_model()
                    .filter(|selection| selection.source == SelectionSource::Recommended)
            })
    }

    /// Compute a fresh recommendation without changing any state.
    ///
    /// When detection fails the smallest CPU-only catalog model is used.
    pub async fn get_recommended_model(
        &self,
        languages: Option<&[String]>,
    ) -> Result<ModelSelection, ModelError> {
        match self.probe.detect().await {
            Ok(hardware) => recommend(&self.catalog, Some(&hardware), languages),
            Err(e) => {
                warn!("Hardware detection failed, using fallback model: {}", e);
                recommend(&self.catalog, None, languages)
            }
        }
    }

    /// Persist a user choice and make it the effective default.
    ///
    /// When a profile or override shadows `embedding.default_model`, the
    /// choice is saved but the shadowing value stays published, and the
    /// returned warnings say so.
    pub async fn set_default_model(
        &self,
        model_id: &str,
        languages: Option<Vec<String>>,
    ) -> Result<(ModelSelection, Vec<ValidationIssue>), ModelError> {
        self.catalog.require(model_id)?;

        let selection = ModelSelection::new(
            model_id,
            SelectionSource::User,
            "selected by user",
            languages,
        );
        let value = Value::from_serializable(&selection)
            .map_err(|reason| ModelError::Config(ConfigError::Settings { reason }))?;
        let warnings = self.gateway.set(&default_model_path()?, value).await?;

        info!("Default model set to {} by user", selection.model_id);
        match self.get_default_model() {
            Some(effective) => self.publish(effective),
            None => self.publish(selection.clone()),
        }
        Ok((selection, warnings))
    }

    /// Re-probe the hardware and refresh the recommendation.
    ///
    /// The recommendation is only published when no user choice exists and
    /// the recommended model actually changed.
    pub async fn redetect(&self) -> Result<ModelSelection, ModelError> {
        let languages = self
            .recommended
            .read()
            .as_ref()
            .and_then(|previous| previous.languages.clone());
        let recommendation = self.get_recommended_model(languages.as_deref()).await?;

        let changed = self
            .recommended
            .read()
            .as_ref()
            .is_none_or(|previous| !previous.same_choice(&recommendation));
        *self.recommended.write() = Some(recommendation.clone());

        if changed && self.persisted_selection().is_none() {
            info!(
                "Recommended default model changed to {}",
                recommendation.model_id
            );
            self.publish(recommendation.clone());
        }
        Ok(recommendation)
    }

    pub fn state(&self) -> ArbiterState {
        if self.persisted_selection().is_some() {
            ArbiterState::UserSelected
        } else if self.recommended.read().is_some() {
            ArbiterState::Recommended
        } else {
            ArbiterState::Unset
        }
    }

    /// Republish the effective default whenever the persisted choice
    /// changes outside of [`ModelArbiter::set_default_model`], such as a
    /// hand edit of the user file picked up by the watcher.
    pub fn spawn_follow(self: &Arc<Self>) -> Result<JoinHandle<()>, ModelError> {
        let mut subscription = self
            .registry
            .subscribe(PathFilter::Prefix(default_model_path()?));
        let arbiter = Arc::clone(self);
        Ok(tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                debug!(
                    "Default model configuration changed in generation {}",
                    event.generation
                );
                if let Err(e) = arbiter.refresh().await {
                    warn!("Could not republish the default model: {}", e);
                }
            }
        }))
    }

    /// Publish the effective default, recommending one when no user choice
    /// is left and nothing was recommended yet.
    async fn refresh(&self) -> Result<(), ModelError> {
        if let Some(selection) = self.get_default_model() {
            self.publish(selection);
            return Ok(());
        }

        let recommendation = self.get_recommended_model(None).await?;
        info!(
            "User choice removed, default model {} (recommended: {})",
            recommendation.model_id, recommendation.reason
        );
        *self.recommended.write() = Some(recommendation.clone());
        self.publish(recommendation);
        Ok(())
    }

    fn publish(&self, selection: ModelSelection) {
        if self.registry.publish_default_model(selection.clone()) {
            info!(
                "Publishing default model {} ({})",
                selection.model_id, selection.source
            );
        }
    }

    fn persisted_selection(&self) -> Option<ModelSelection> {
        let path = default_model_path().ok()?;
        let value = self.gateway.get(&path)?;
        match value.deserialize_into::<ModelSelection>() {
            Ok(selection) if selection.source == SelectionSource::User => Some(selection),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", DEFAULT_MODEL_PATH, e);
                None
            }
        }
    }
}

fn default_model_path() -> Result<ConfigPath, ConfigError> {
    ConfigPath::parse(DEFAULT_MODEL_PATH)
}
