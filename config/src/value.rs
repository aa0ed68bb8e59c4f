//! # Configuration Values
//!
//! Tagged value tree shared by every configuration source. Documents are
//! converted into `Value` once at load time, so validators check an explicit
//! type tag instead of probing format-specific representations.

use crate::path::{ConfigPath, Segment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    List,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "boolean",
            ValueKind::Int => "integer",
            ValueKind::Float => "number",
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Map => "map",
        };
        f.write_str(name)
    }
}

/// A configuration value: scalar, list or map.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn empty_map() -> Self {
        Value::Map(BTreeMap::new())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Parse a process-supplied scalar (`--set server.port=9000`) the way a
    /// YAML document would, so numbers and booleans keep their type.
    pub fn parse_scalar(raw: &str) -> Value {
        match serde_yaml::from_str::<serde_yaml::Value>(raw) {
            Ok(parsed) => Value::from_yaml(parsed).unwrap_or_else(|_| Value::String(raw.to_string())),
            Err(_) => Value::String(raw.to_string()),
        }
    }

    pub fn from_yaml(value: serde_yaml::Value) -> Result<Value, String> {
        Ok(match value {
            serde_yaml::Value::Null => Value::Null,
            serde_yaml::Value::Bool(b) => Value::Bool(b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    return Err(format!("number {n} is out of range"));
                }
            }
            serde_yaml::Value::String(s) => Value::String(s),
            serde_yaml::Value::Sequence(items) => Value::List(
                items
                    .into_iter()
                    .map(Value::from_yaml)
                    .collect::<Result<_, _>>()?,
            ),
            serde_yaml::Value::Mapping(mapping) => {
                let mut map = BTreeMap::new();
                for (key, value) in mapping {
                    map.insert(yaml_key(key)?, Value::from_yaml(value)?);
                }
                Value::Map(map)
            }
            serde_yaml::Value::Tagged(tagged) => Value::from_yaml(tagged.value)?,
        })
    }

    pub fn from_toml(value: toml::Value) -> Value {
        match value {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Int(i),
            toml::Value::Float(f) => Value::Float(f),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(items) => Value::List(items.into_iter().map(Value::from_toml).collect()),
            toml::Value::Table(table) => Value::Map(
                table
                    .into_iter()
                    .map(|(key, value)| (key, Value::from_toml(value)))
                    .collect(),
            ),
        }
    }

    pub fn to_yaml(&self) -> serde_yaml::Value {
        match self {
            Value::Null => serde_yaml::Value::Null,
            Value::Bool(b) => serde_yaml::Value::Bool(*b),
            Value::Int(i) => serde_yaml::Value::Number((*i).into()),
            Value::Float(f) => serde_yaml::Value::Number((*f).into()),
            Value::String(s) => serde_yaml::Value::String(s.clone()),
            Value::List(items) => {
                serde_yaml::Value::Sequence(items.iter().map(Value::to_yaml).collect())
            }
            Value::Map(map) => {
                let mut mapping = serde_yaml::Mapping::new();
                for (key, value) in map {
                    mapping.insert(serde_yaml::Value::String(key.clone()), value.to_yaml());
                }
                serde_yaml::Value::Mapping(mapping)
            }
        }
    }

    /// Convert any serializable type into a value tree.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Value, String> {
        let yaml = serde_yaml::to_value(value).map_err(|e| e.to_string())?;
        Value::from_yaml(yaml)
    }

    /// Deserialize a value tree into a typed structure.
    pub fn deserialize_into<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        serde_yaml::from_value(self.to_yaml()).map_err(|e| e.to_string())
    }

    pub fn get_path(&self, path: &ConfigPath) -> Option<&Value> {
        let mut node = self;
        for segment in path.segments() {
            node = match (segment, node) {
                (Segment::Key(key), Value::Map(map)) => map.get(key)?,
                (Segment::Index(idx), Value::List(items)) => items.get(*idx)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Write `value` at `path`, creating intermediate maps as needed.
    ///
    /// A list index equal to the list length appends. Missing or null
    /// parents are created; a parent holding any other scalar is an error,
    /// never silently replaced.
    pub fn set_path(&mut self, path: &ConfigPath, value: Value) -> Result<(), String> {
        let segments = path.segments();
        let Some((last, parents)) = segments.split_last() else {
            *self = value;
            return Ok(());
        };

        let mut node = self;
        for (i, segment) in parents.iter().enumerate() {
            let next_is_index = matches!(segments[i + 1], Segment::Index(_));
            let at = || ConfigPath::from_segments(segments[..i].to_vec());
            node = match segment {
                Segment::Key(key) => {
                    let child = map_at(node, &at)?
                        .entry(key.clone())
                        .or_insert(Value::Null);
                    if matches!(child, Value::Null) {
                        *child = if next_is_index {
                            Value::List(Vec::new())
                        } else {
                            Value::empty_map()
                        };
                    }
                    child
                }
                Segment::Index(idx) => match node {
                    Value::List(items) => {
                        let len = items.len();
                        items.get_mut(*idx).ok_or_else(|| {
                            format!("index {idx} is out of bounds for a list of {len}")
                        })?
                    }
                    other => {
                        return Err(format!(
                            "expected a list at `{}`, found {}",
                            at(),
                            other.kind()
                        ));
                    }
                },
            };
        }

        let at = || ConfigPath::from_segments(parents.to_vec());
        match last {
            Segment::Key(key) => {
                map_at(node, &at)?.insert(key.clone(), value);
            }
            Segment::Index(idx) => {
                if matches!(node, Value::Null) {
                    *node = Value::List(Vec::new());
                }
                let Value::List(items) = node else {
                    return Err(format!("expected a list at `{}`, found {}", at(), node.kind()));
                };
                if *idx < items.len() {
                    items[*idx] = value;
                } else if *idx == items.len() {
                    items.push(value);
                } else {
                    return Err(format!(
                        "index {idx} is out of bounds for a list of {}",
                        items.len()
                    ));
                }
            }
        }
        Ok(())
    }

    /// Remove the node at `path`, returning it when present.
    pub fn remove_path(&mut self, path: &ConfigPath) -> Option<Value> {
        let (last, parents) = path.segments().split_last()?;
        let mut node = self;
        for segment in parents {
            node = match (segment, node) {
                (Segment::Key(key), Value::Map(map)) => map.get_mut(key)?,
                (Segment::Index(idx), Value::List(items)) => items.get_mut(*idx)?,
                _ => return None,
            };
        }
        match (last, node) {
            (Segment::Key(key), Value::Map(map)) => map.remove(key),
            (Segment::Index(idx), Value::List(items)) if *idx < items.len() => {
                Some(items.remove(*idx))
            }
            _ => None,
        }
    }

    /// Visit every node depth-first, parents before children.
    pub fn walk<'a>(&'a self, path: &ConfigPath, visit: &mut dyn FnMut(&ConfigPath, &'a Value)) {
        visit(path, self);
        match self {
            Value::Map(map) => {
                for (key, child) in map {
                    child.walk(&path.child_key(key), visit);
                }
            }
            Value::List(items) => {
                for (idx, child) in items.iter().enumerate() {
                    child.walk(&path.child_index(idx), visit);
                }
            }
            _ => {}
        }
    }

    /// Leaves for provenance tracking: scalars, whole lists (lists replace
    /// rather than merge) and empty maps.
    pub fn leaves(&self) -> Vec<(ConfigPath, &Value)> {
        let mut out = Vec::new();
        collect_leaves(self, &ConfigPath::root(), &mut out);
        out
    }
}

fn collect_leaves<'a>(value: &'a Value, path: &ConfigPath, out: &mut Vec<(ConfigPath, &'a Value)>) {
    match value {
        Value::Map(map) if !map.is_empty() => {
            for (key, child) in map {
                collect_leaves(child, &path.child_key(key), out);
            }
        }
        _ if path.is_root() => {}
        _ => out.push((path.clone(), value)),
    }
}

fn map_at<'v>(
    node: &'v mut Value,
    at: &dyn Fn() -> ConfigPath,
) -> Result<&'v mut BTreeMap<String, Value>, String> {
    if matches!(node, Value::Null) {
        *node = Value::empty_map();
    }
    match node {
        Value::Map(map) => Ok(map),
        other => Err(format!("expected a map at `{}`, found {}", at(), other.kind())),
    }
}

fn yaml_key(key: serde_yaml::Value) -> Result<String, String> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("unsupported map key: {other:?}")),
    }
}

impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => items.serialize(serializer),
            Value::Map(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let yaml = serde_yaml::Value::deserialize(deserializer)?;
        Value::from_yaml(yaml).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(_) | Value::Map(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}
