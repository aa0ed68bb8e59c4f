//! Shape checks for the known configuration keys.

use super::{CheckOutcome, SCHEMA_PRIORITY, ValidationContext, Validator};
use crate::path::{ConfigPath, PathMatcher};
use crate::value::{Value, ValueKind};
use async_trait::async_trait;
use errors::{ConfigError, IssueKind};
use std::net::IpAddr;
use validator::{ValidateIp, ValidateRange};

pub const THEMES: &[&str] = &["dark", "light", "high-contrast", "system"];
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Expected shape of the value at a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Map { required: &'static [&'static str] },
    List { items: Option<ValueKind> },
    Text { non_empty: bool },
    Integer { min: i64, max: i64 },
    OneOf(&'static [&'static str]),
    /// `localhost`, a loopback address or any IPv4 address.
    Host,
    Timestamp,
}

impl Shape {
    fn check(&self, path: &ConfigPath, value: &Value) -> CheckOutcome {
        let mismatch = |expected: &str| {
            CheckOutcome::error(path, format!("expected {expected}, found {}", value.kind()))
        };

        match self {
            Shape::Map { required } => {
                let Some(map) = value.as_map() else {
                    return mismatch("a map");
                };
                let mut outcome = CheckOutcome::ok();
                for key in *required {
                    if !map.contains_key(*key) {
                        outcome.push_error(path, format!("missing required key `{key}`"));
                    }
                }
                outcome
            }
            Shape::List { items } => {
                let Some(list) = value.as_list() else {
                    return mismatch("a list");
                };
                let mut outcome = CheckOutcome::ok();
                if let Some(kind) = items {
                    for (idx, item) in list.iter().enumerate() {
                        if item.kind() != *kind {
                            outcome.push_error(
                                &path.child_index(idx),
                                format!("expected {kind}, found {}", item.kind()),
                            );
                        }
                    }
                }
                outcome
            }
            Shape::Text { non_empty } => match value.as_str() {
                None => mismatch("a string"),
                Some(text) if *non_empty && text.trim().is_empty() => {
                    CheckOutcome::error(path, "must not be empty")
                }
                Some(_) => CheckOutcome::ok(),
            },
            Shape::Integer { min, max } => match value.as_i64() {
                None => mismatch("an integer"),
                Some(n) if !n.validate_range(Some(*min), Some(*max), None, None) => {
                    CheckOutcome::error(path, format!("{n} is outside {min}..={max}"))
                }
                Some(_) => CheckOutcome::ok(),
            },
            Shape::OneOf(allowed) => match value.as_str() {
                None => mismatch("a string"),
                Some(text) if !allowed.contains(&text) => CheckOutcome::error(
                    path,
                    format!("`{text}` is not one of {}", allowed.join(", ")),
                ),
                Some(_) => CheckOutcome::ok(),
            },
            Shape::Host => match value.as_str() {
                None => mismatch("a string"),
                Some(host) if is_allowed_host(host) => CheckOutcome::ok(),
                Some(host) => CheckOutcome::error(
                    path,
                    format!("`{host}` must be localhost, a loopback address or an IPv4 address"),
                ),
            },
            Shape::Timestamp => match value.as_str() {
                None => mismatch("a timestamp string"),
                Some(text) if chrono::DateTime::parse_from_rfc3339(text).is_err() => {
                    CheckOutcome::error(path, format!("`{text}` is not an RFC 3339 timestamp"))
                }
                Some(_) => CheckOutcome::ok(),
            },
        }
    }
}

fn is_allowed_host(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host.validate_ipv4()
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Table-driven schema validator.
pub struct SchemaValidator {
    rules: Vec<(PathMatcher, Shape)>,
    matchers: Vec<PathMatcher>,
}

impl SchemaValidator {
    pub fn new(rules: Vec<(PathMatcher, Shape)>) -> Self {
        let matchers = rules.iter().map(|(matcher, _)| matcher.clone()).collect();
        Self { rules, matchers }
    }

    /// The schema of every key the daemon understands.
    pub fn standard() -> Result<Self, ConfigError> {
        let table: &[(&str, Shape)] = &[
            ("folders", Shape::List { items: Some(ValueKind::Map) }),
            ("folders[*]", Shape::Map { required: &["path"] }),
            ("folders[*].path", Shape::Text { non_empty: true }),
            ("folders[*].model", Shape::Text { non_empty: true }),
            ("embedding", Shape::Map { required: &[] }),
            ("embedding.batch_size", Shape::Integer { min: 1, max: 512 }),
            ("embedding.default_model", Shape::Map { required: &["model_id", "source"] }),
            ("embedding.default_model.model_id", Shape::Text { non_empty: true }),
            ("embedding.default_model.source", Shape::OneOf(&["user"])),
            ("embedding.default_model.selected_at", Shape::Timestamp),
            ("embedding.default_model.reason", Shape::Text { non_empty: false }),
            (
                "embedding.default_model.languages",
                Shape::List { items: Some(ValueKind::String) },
            ),
            ("server", Shape::Map { required: &[] }),
            ("server.host", Shape::Host),
            ("server.port", Shape::Integer { min: 1024, max: 65535 }),
            ("ui", Shape::Map { required: &[] }),
            ("ui.theme", Shape::OneOf(THEMES)),
            ("logging", Shape::Map { required: &[] }),
            ("logging.level", Shape::OneOf(LOG_LEVELS)),
            ("watcher", Shape::Map { required: &[] }),
            ("watcher.debounce_ms", Shape::Integer { min: 50, max: 10_000 }),
        ];

        let rules = table
            .iter()
            .map(|(pattern, shape)| Ok((PathMatcher::new(pattern)?, shape.clone())))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self::new(rules))
    }
}

#[async_trait]
impl Validator for SchemaValidator {
    fn name(&self) -> &str {
        "schema"
    }

    fn description(&self) -> &str {
        "types, ranges and enumerations of known keys"
    }

    fn priority(&self) -> i32 {
        SCHEMA_PRIORITY
    }

    fn kind(&self) -> IssueKind {
        IssueKind::Schema
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
        let mut outcome = CheckOutcome::ok();
        for (matcher, shape) in &self.rules {
            if matcher.matches(path) {
                let found = shape.check(path, value);
                outcome.errors.extend(found.errors);
                outcome.warnings.extend(found.warnings);
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{AccumulationPolicy, ValidationPipeline};

    fn pipeline() -> ValidationPipeline {
        ValidationPipeline::builder(AccumulationPolicy::AccumulateWarnings)
            .register(SchemaValidator::standard().unwrap())
            .build()
    }

    async fn errors_for(raw: &str, value: Value) -> Vec<String> {
        pipeline()
            .validate_detached(&ConfigPath::parse(raw).unwrap(), &value)
            .await
            .errors
            .into_iter()
            .map(|issue| issue.message)
            .collect()
    }

    #[tokio::test]
    async fn test_port_range() {
        assert!(errors_for("server.port", Value::Int(8080)).await.is_empty());
        assert!(errors_for("server.port", Value::Int(1024)).await.is_empty());
        assert!(errors_for("server.port", Value::Int(65535)).await.is_empty());
        assert_eq!(errors_for("server.port", Value::Int(80)).await.len(), 1);
        assert_eq!(errors_for("server.port", Value::Int(70000)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_port_type_mismatch() {
        let errors = errors_for("server.port", Value::from("eighty")).await;
        assert_eq!(errors, vec!["expected an integer, found string"]);
    }

    #[tokio::test]
    async fn test_batch_size_range() {
        assert!(errors_for("embedding.batch_size", Value::Int(512)).await.is_empty());
        assert_eq!(errors_for("embedding.batch_size", Value::Int(0)).await.len(), 1);
        assert_eq!(errors_for("embedding.batch_size", Value::Int(513)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_host_values() {
        for ok in ["localhost", "127.0.0.1", "0.0.0.0", "192.168.1.20", "::1"] {
            assert!(errors_for("server.host", Value::from(ok)).await.is_empty(), "{ok}");
        }
        for bad in ["example.com", "fe80::1", "300.1.1.1"] {
            assert_eq!(errors_for("server.host", Value::from(bad)).await.len(), 1, "{bad}");
        }
    }

    #[tokio::test]
    async fn test_theme_enumeration() {
        assert!(errors_for("ui.theme", Value::from("high-contrast")).await.is_empty());
        let errors = errors_for("ui.theme", Value::from("neon")).await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("neon"));
    }

    #[tokio::test]
    async fn test_folder_entry_requires_path() {
        let entry: Value = [("model", "minilm-l6")].into_iter().collect();
        let errors = errors_for("folders[0]", entry).await;
        assert_eq!(errors, vec!["missing required key `path`"]);
    }

    #[tokio::test]
    async fn test_whole_section_write_checks_children() {
        let server: Value = [("host", Value::from("localhost")), ("port", Value::Int(22))]
            .into_iter()
            .collect();
        let result = pipeline()
            .validate_detached(&ConfigPath::parse("server").unwrap(), &server)
            .await;
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "server.port");
        assert_eq!(result.errors[0].kind, IssueKind::Schema);
    }

    #[tokio::test]
    async fn test_selected_at_must_be_rfc3339() {
        assert!(
            errors_for(
                "embedding.default_model.selected_at",
                Value::from("2026-01-02T03:04:05Z")
            )
            .await
            .is_empty()
        );
        assert_eq!(
            errors_for("embedding.default_model.selected_at", Value::from("yesterday"))
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_language_list_items_must_be_strings() {
        let langs = Value::List(vec![Value::from("en"), Value::Int(3)]);
        let result = pipeline()
            .validate_detached(&ConfigPath::parse("embedding.default_model.languages").unwrap(), &langs)
            .await;
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "embedding.default_model.languages[1]");
    }
}
