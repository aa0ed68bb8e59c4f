//! # Configuration Validation
//!
//! An ordered chain of validators scoped by path matchers. Schema checks
//! run first (low priority numbers), domain rules after. The chain is fixed
//! when the pipeline is built; there is no runtime registration.

pub mod catalog;
pub mod folders;
pub mod schema;

use crate::model::catalog::ModelCatalog;
use crate::path::{ConfigPath, PathMatcher};
use crate::snapshot::ResolvedSnapshot;
use crate::value::Value;
use async_trait::async_trait;
use errors::{ConfigError, IssueKind, ValidationIssue};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Priority band for shape checks.
pub const SCHEMA_PRIORITY: i32 = 10;
/// Priority band for cross-field rules.
pub const DOMAIN_PRIORITY: i32 = 100;

const UNKNOWN_KEY_VALIDATOR: &str = "unknown-key";

/// What a validator sees besides the path and value under test.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Authoritative state before the change.
    pub current: &'a ResolvedSnapshot,
    /// Whole document as it would look if the change were applied.
    pub candidate: &'a Value,
    /// Path being written, `None` when a whole snapshot is checked.
    pub written: Option<&'a ConfigPath>,
}

impl<'a> ValidationContext<'a> {
    pub fn for_write(
        current: &'a ResolvedSnapshot,
        candidate: &'a Value,
        written: &'a ConfigPath,
    ) -> Self {
        Self {
            current,
            candidate,
            written: Some(written),
        }
    }

    pub fn for_snapshot(snapshot: &'a ResolvedSnapshot) -> Self {
        Self {
            current: snapshot,
            candidate: snapshot.tree(),
            written: None,
        }
    }
}

/// Findings of one validator for one path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckOutcome {
    pub errors: Vec<(ConfigPath, String)>,
    pub warnings: Vec<(ConfigPath, String)>,
}

impl CheckOutcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(path: &ConfigPath, message: impl Into<String>) -> Self {
        let mut outcome = Self::default();
        outcome.push_error(path, message);
        outcome
    }

    pub fn warning(path: &ConfigPath, message: impl Into<String>) -> Self {
        let mut outcome = Self::default();
        outcome.push_warning(path, message);
        outcome
    }

    pub fn push_error(&mut self, path: &ConfigPath, message: impl Into<String>) {
        self.errors.push((path.clone(), message.into()));
    }

    pub fn push_warning(&mut self, path: &ConfigPath, message: impl Into<String>) {
        self.warnings.push((path.clone(), message.into()));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A unit of validation logic scoped to path patterns.
///
/// Checks are async because some rules touch the filesystem or the model
/// catalog. A check returning `Err` is reported as a fault issue naming the
/// validator; it never aborts the pipeline itself.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn priority(&self) -> i32;

    /// Kind attached to the errors this validator reports.
    fn kind(&self) -> IssueKind;

    fn applies_to(&self) -> &[PathMatcher];

    async fn check(
        &self,
        path: &ConfigPath,
        value: &Value,
        ctx: &ValidationContext<'_>,
    ) -> anyhow::Result<CheckOutcome>;
}

/// Combined result of running the chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn extend(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Warnings on success, a rejection carrying every error otherwise.
    pub fn into_result(self) -> Result<Vec<ValidationIssue>, ConfigError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(ConfigError::Rejected {
                issues: self.errors,
            })
        }
    }
}

/// How findings are accumulated along one path's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccumulationPolicy {
    /// The first erroring validator aborts the chain and only its errors
    /// are returned.
    StopOnError,
    /// The first erroring validator aborts the chain, warnings from every
    /// validator that ran are kept.
    #[default]
    AccumulateWarnings,
}

/// Collects validators before the chain is frozen.
pub struct PipelineBuilder {
    validators: Vec<Arc<dyn Validator>>,
    policy: AccumulationPolicy,
}

impl PipelineBuilder {
    pub fn new(policy: AccumulationPolicy) -> Self {
        Self {
            validators: Vec::new(),
            policy,
        }
    }

    pub fn register(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn register_arc(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Sort by ascending priority. The sort is stable, so equal priorities
    /// keep registration order.
    pub fn build(mut self) -> ValidationPipeline {
        self.validators.sort_by_key(|validator| validator.priority());
        ValidationPipeline {
            validators: self.validators,
            policy: self.policy,
        }
    }
}

/// The daemon's chain: schema shapes, folder rules and catalog checks.
pub fn standard_pipeline(
    catalog: Arc<ModelCatalog>,
    policy: AccumulationPolicy,
) -> Result<ValidationPipeline, ConfigError> {
    Ok(PipelineBuilder::new(policy)
        .register(schema::SchemaValidator::standard()?)
        .register(folders::FolderOverlapValidator::new()?)
        .register(folders::FolderPathValidator::new()?)
        .register(catalog::CatalogModelValidator::new(catalog)?)
        .build())
}

/// Immutable, priority-ordered validator chain.
pub struct ValidationPipeline {
    validators: Vec<Arc<dyn Validator>>,
    policy: AccumulationPolicy,
}

impl std::fmt::Debug for ValidationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationPipeline")
            .field(
                "validators",
                &self.validators.iter().map(|v| v.name()).collect::<Vec<_>>(),
            )
            .field("policy", &self.policy)
            .finish()
    }
}

impl ValidationPipeline {
    pub fn builder(policy: AccumulationPolicy) -> PipelineBuilder {
        PipelineBuilder::new(policy)
    }

    pub fn policy(&self) -> AccumulationPolicy {
        self.policy
    }

    pub fn validators(&self) -> impl Iterator<Item = &Arc<dyn Validator>> {
        self.validators.iter()
    }

    fn matching<'a>(&'a self, path: &'a ConfigPath) -> impl Iterator<Item = &'a Arc<dyn Validator>> {
        self.validators.iter().filter(move |validator| {
            validator
                .applies_to()
                .iter()
                .any(|matcher| matcher.matches(path))
        })
    }

    /// Whether any validator applies to `path`, an ancestor or a descendant.
    pub fn is_known(&self, path: &ConfigPath) -> bool {
        self.validators.iter().any(|validator| {
            validator
                .applies_to()
                .iter()
                .any(|matcher| matcher.covers(path) || matcher.descends_from(path))
        })
    }

    /// Run the chain for exactly one path/value pair.
    ///
    /// No matching validator means the pair is valid.
    pub async fn validate_node(
        &self,
        path: &ConfigPath,
        value: &Value,
        ctx: &ValidationContext<'_>,
    ) -> ValidationResult {
        let mut warnings = Vec::new();

        for validator in self.matching(path) {
            let outcome = match validator.check(path, value, ctx).await {
                Ok(outcome) => outcome,
                Err(fault) => {
                    warn!("Validator {} failed on {}: {:#}", validator.name(), path, fault);
                    let mut result = ValidationResult {
                        errors: vec![ValidationIssue::new(
                            path.to_string(),
                            format!("validator {} failed: {fault}", validator.name()),
                            IssueKind::Fault,
                            validator.name(),
                        )],
                        warnings: Vec::new(),
                    };
                    if self.policy == AccumulationPolicy::AccumulateWarnings {
                        result.warnings = warnings;
                    }
                    return result;
                }
            };

            let to_issues = |findings: Vec<(ConfigPath, String)>, kind: IssueKind| {
                findings
                    .into_iter()
                    .map(|(at, message)| {
                        ValidationIssue::new(at.to_string(), message, kind, validator.name())
                    })
                    .collect::<Vec<_>>()
            };

            let failed = outcome.has_errors();
            let errors = to_issues(outcome.errors, validator.kind());
            let own_warnings = to_issues(outcome.warnings, validator.kind());

            if failed {
                return match self.policy {
                    AccumulationPolicy::StopOnError => ValidationResult {
                        errors,
                        warnings: Vec::new(),
                    },
                    AccumulationPolicy::AccumulateWarnings => {
                        warnings.extend(own_warnings);
                        ValidationResult { errors, warnings }
                    }
                };
            }
            warnings.extend(own_warnings);
        }

        ValidationResult {
            errors: Vec::new(),
            warnings,
        }
    }

    /// Validate `value` written at `path`, including every node beneath it.
    ///
    /// Each node runs its own chain; errors from different nodes are all
    /// reported. Leaves no validator covers produce an "unrecognized" warning.
    pub async fn validate(
        &self,
        path: &ConfigPath,
        value: &Value,
        ctx: &ValidationContext<'_>,
    ) -> ValidationResult {
        let mut nodes = Vec::new();
        value.walk(path, &mut |at, node| nodes.push((at.clone(), node)));

        let mut result = ValidationResult::default();
        for (at, node) in &nodes {
            result.extend(self.validate_node(at, node, ctx).await);
        }
        result.warnings.extend(self.unknown_leaves(path, value));
        result
    }

    /// Validate without any surrounding configuration.
    pub async fn validate_detached(&self, path: &ConfigPath, value: &Value) -> ValidationResult {
        let current = ResolvedSnapshot::empty();
        let mut candidate = Value::empty_map();
        if candidate.set_path(path, value.clone()).is_err() {
            candidate = Value::empty_map();
        }
        let ctx = ValidationContext::for_write(&current, &candidate, path);
        self.validate(path, value, &ctx).await
    }

    /// Validate every node of a resolved snapshot.
    pub async fn validate_snapshot(&self, snapshot: &ResolvedSnapshot) -> ValidationResult {
        let ctx = ValidationContext::for_snapshot(snapshot);
        self.validate(&ConfigPath::root(), snapshot.tree(), &ctx).await
    }

    fn unknown_leaves(&self, base: &ConfigPath, value: &Value) -> Vec<ValidationIssue> {
        let mut unknown = Vec::new();
        let mut visit = |leaf: ConfigPath| {
            if !leaf.is_root() && !self.is_known(&leaf) {
                unknown.push(ValidationIssue::new(
                    leaf.to_string(),
                    "unrecognized configuration key",
                    IssueKind::Schema,
                    UNKNOWN_KEY_VALIDATOR,
                ));
            }
        };

        match value {
            Value::Map(map) if !map.is_empty() => {
                for (relative, _) in value.leaves() {
                    let mut segments = base.segments().to_vec();
                    segments.extend(relative.segments().iter().cloned());
                    visit(ConfigPath::from_segments(segments));
                }
            }
            _ => visit(base.clone()),
        }
        unknown
    }
}
