//! # Configuration Paths
//!
//! Dotted configuration paths with bracketed list indices
//! (`server.port`, `folders[0].path`), the matchers validators are scoped
//! with (`folders[*].path`), and the filters registry subscribers use.

use errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One step of a configuration path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed, concrete configuration path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigPath {
    segments: Vec<Segment>,
}

impl ConfigPath {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let parts = parse_parts(raw, false)?;
        let segments = parts
            .into_iter()
            .map(|part| match part {
                Part::Key(key) => Segment::Key(key),
                Part::Index(idx) => Segment::Index(idx),
                Part::AnyIndex => unreachable!("wildcards are rejected when not allowed"),
            })
            .collect();
        Ok(Self { segments })
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child_key(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.to_string()));
        Self { segments }
    }

    pub fn child_index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, parents) = self.segments.split_last()?;
        Some(Self {
            segments: parents.to_vec(),
        })
    }

    /// Last segment when it is a list index.
    pub fn last_index(&self) -> Option<usize> {
        match self.segments.last() {
            Some(Segment::Index(idx)) => Some(*idx),
            _ => None,
        }
    }

    /// The path up to (not including) the first list index, when the path
    /// goes through a list.
    pub fn list_root(&self) -> Option<Self> {
        let position = self
            .segments
            .iter()
            .position(|segment| matches!(segment, Segment::Index(_)))?;
        Some(Self {
            segments: self.segments[..position].to_vec(),
        })
    }

    /// Segment-aware prefix test: `server` is a prefix of `server.port` but
    /// not of `serverless`.
    pub fn starts_with(&self, prefix: &ConfigPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for ConfigPath {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ConfigPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConfigPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ConfigPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MatchSegment {
    Key(String),
    Index(usize),
    AnyIndex,
}

/// Path pattern a validator applies to.
///
/// Supports exact paths and `[*]` in place of a list index, so
/// `folders[*].path` applies to every folder entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatcher {
    pattern: String,
    segments: Vec<MatchSegment>,
}

impl PathMatcher {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let parts = parse_parts(pattern, true)?;
        let wildcards = parts
            .iter()
            .filter(|part| matches!(part, Part::AnyIndex))
            .count();
        if wildcards > 1 {
            return Err(ConfigError::InvalidPath {
                path: pattern.to_string(),
                reason: "only one [*] wildcard is supported".to_string(),
            });
        }
        let segments = parts
            .into_iter()
            .map(|part| match part {
                Part::Key(key) => MatchSegment::Key(key),
                Part::Index(idx) => MatchSegment::Index(idx),
                Part::AnyIndex => MatchSegment::AnyIndex,
            })
            .collect();
        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, path: &ConfigPath) -> bool {
        self.segments.len() == path.segments.len() && self.prefix_matches(path)
    }

    /// True when some path this matcher applies to lies beneath `path`.
    pub fn descends_from(&self, path: &ConfigPath) -> bool {
        self.segments.len() > path.segments.len() && self.prefix_matches(path)
    }

    fn prefix_matches(&self, path: &ConfigPath) -> bool {
        self.segments
            .iter()
            .zip(path.segments.iter())
            .all(|pair| match pair {
                (MatchSegment::Key(want), Segment::Key(got)) => want == got,
                (MatchSegment::Index(want), Segment::Index(got)) => want == got,
                (MatchSegment::AnyIndex, Segment::Index(_)) => true,
                _ => false,
            })
    }

    /// True when the matcher applies to `path` or to one of its ancestors.
    pub fn covers(&self, path: &ConfigPath) -> bool {
        (0..=path.segments.len()).any(|len| {
            self.matches(&ConfigPath {
                segments: path.segments[..len].to_vec(),
            })
        })
    }
}

impl fmt::Display for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Which change notifications a registry subscriber wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathFilter {
    /// Every change.
    All,
    Exact(ConfigPath),
    /// The path itself, anything beneath it, and any ancestor that was
    /// replaced wholesale.
    Prefix(ConfigPath),
}

impl PathFilter {
    pub fn exact(raw: &str) -> Result<Self, ConfigError> {
        Ok(PathFilter::Exact(ConfigPath::parse(raw)?))
    }

    pub fn prefix(raw: &str) -> Result<Self, ConfigError> {
        Ok(PathFilter::Prefix(ConfigPath::parse(raw)?))
    }

    pub fn matches(&self, changed: &ConfigPath) -> bool {
        match self {
            PathFilter::All => true,
            PathFilter::Exact(path) => path == changed,
            PathFilter::Prefix(prefix) => changed.starts_with(prefix) || prefix.starts_with(changed),
        }
    }
}

enum Part {
    Key(String),
    Index(usize),
    AnyIndex,
}

fn parse_parts(raw: &str, allow_wildcard: bool) -> Result<Vec<Part>, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidPath {
        path: raw.to_string(),
        reason: reason.to_string(),
    };

    if raw.trim().is_empty() {
        return Err(invalid("path is empty"));
    }

    let mut parts = Vec::new();
    for piece in raw.split('.') {
        let (key, mut rest) = match piece.find('[') {
            Some(pos) => (&piece[..pos], &piece[pos..]),
            None => (piece, ""),
        };
        if key.is_empty() {
            return Err(invalid("empty key segment"));
        }
        if key.contains(']') {
            return Err(invalid("unbalanced ']'"));
        }
        parts.push(Part::Key(key.to_string()));

        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(|| invalid("unclosed '['"))?;
            let inner = &rest[1..close];
            if inner == "*" {
                if !allow_wildcard {
                    return Err(invalid("wildcards are only allowed in matchers"));
                }
                parts.push(Part::AnyIndex);
            } else {
                let idx = inner
                    .parse::<usize>()
                    .map_err(|_| invalid("list index must be a non-negative integer"))?;
                parts.push(Part::Index(idx));
            }
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(invalid("unexpected characters after ']'"));
            }
        }
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_key() {
        let path = ConfigPath::parse("server.port").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("server".to_string()),
                Segment::Key("port".to_string())
            ]
        );
        assert_eq!(path.to_string(), "server.port");
    }

    #[test]
    fn test_parse_list_index() {
        let path = ConfigPath::parse("folders[2].path").unwrap();
        assert_eq!(path.segments()[1], Segment::Index(2));
        assert_eq!(path.to_string(), "folders[2].path");
        assert_eq!(path.list_root().unwrap().to_string(), "folders");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "a..b", "a[", "a[x]", "a[1]b", ".a", "a]"] {
            assert!(ConfigPath::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_parse_rejects_wildcard_in_concrete_path() {
        assert!(ConfigPath::parse("folders[*].path").is_err());
    }

    #[test]
    fn test_matcher_wildcard_matches_every_index() {
        let matcher = PathMatcher::new("folders[*].path").unwrap();
        assert!(matcher.matches(&ConfigPath::parse("folders[0].path").unwrap()));
        assert!(matcher.matches(&ConfigPath::parse("folders[17].path").unwrap()));
        assert!(!matcher.matches(&ConfigPath::parse("folders[0].model").unwrap()));
        assert!(!matcher.matches(&ConfigPath::parse("folders").unwrap()));
    }

    #[test]
    fn test_matcher_exact() {
        let matcher = PathMatcher::new("server.port").unwrap();
        assert!(matcher.matches(&ConfigPath::parse("server.port").unwrap()));
        assert!(!matcher.matches(&ConfigPath::parse("server.host").unwrap()));
    }

    #[test]
    fn test_matcher_rejects_two_wildcards() {
        assert!(PathMatcher::new("a[*].b[*]").is_err());
    }

    #[test]
    fn test_matcher_covers_descendants() {
        let matcher = PathMatcher::new("embedding.default_model").unwrap();
        assert!(matcher.covers(&ConfigPath::parse("embedding.default_model.reason").unwrap()));
        assert!(!matcher.covers(&ConfigPath::parse("embedding.batch_size").unwrap()));
    }

    #[test]
    fn test_matcher_descends_from_ancestor() {
        let matcher = PathMatcher::new("folders[*].path").unwrap();
        assert!(matcher.descends_from(&ConfigPath::parse("folders").unwrap()));
        assert!(matcher.descends_from(&ConfigPath::parse("folders[3]").unwrap()));
        assert!(!matcher.descends_from(&ConfigPath::parse("folders[3].path").unwrap()));
        assert!(!matcher.descends_from(&ConfigPath::parse("ui").unwrap()));
    }

    #[test]
    fn test_prefix_is_segment_aware() {
        let filter = PathFilter::prefix("server").unwrap();
        assert!(filter.matches(&ConfigPath::parse("server.port").unwrap()));
        assert!(filter.matches(&ConfigPath::parse("server").unwrap()));
        assert!(!filter.matches(&ConfigPath::parse("serverless.port").unwrap()));
    }

    #[test]
    fn test_prefix_matches_replaced_ancestor() {
        let filter = PathFilter::prefix("folders[0].path").unwrap();
        assert!(filter.matches(&ConfigPath::parse("folders").unwrap()));
    }

    #[test]
    fn test_exact_filter() {
        let filter = PathFilter::exact("ui.theme").unwrap();
        assert!(filter.matches(&ConfigPath::parse("ui.theme").unwrap()));
        assert!(!filter.matches(&ConfigPath::parse("ui").unwrap()));
    }
}
