//! Node attribute tree with named precedence layers
//!
//! Recipes mutate an [`AttributeBuilder`] while the run is being compiled.
//! Once every mutation has been applied the builder is frozen into a
//! [`Node`]: a single merged, read-only tree that is handed by reference to
//! each recipe while it declares resources.
//!
//! ## Merge rules
//!
//! - Within a layer, `set` replaces whatever was at that exact path and
//!   `append` extends an existing list. Order matters: the last writer wins.
//! - Across layers, maps merge key by key and any other value (lists
//!   included) at a higher layer replaces the lower one.
//! - `null` values read back as absent.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Attribute precedence layer, lowest first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Cookbook attribute files and most recipe writes
    #[default]
    Default,
    /// Site-specific overrides
    Override,
    /// Discovered host facts
    Automatic,
}

/// A path into the attribute tree
///
/// Parsed from a dotted string (`fb_cron.jobs.chef`) or given as explicit
/// segments when a key itself contains a dot (`["fb_postfix", "main.cf"]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AttrPath(Vec<String>);

impl AttrPath {
    pub fn parse(dotted: &str) -> Self {
        Self(
            dotted
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path extended by one more segment
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<&str> for AttrPath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<&[&str]> for AttrPath {
    fn from(segments: &[&str]) -> Self {
        Self::from_segments(segments.iter().copied())
    }
}

impl<'de> Deserialize<'de> for AttrPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Dotted(String),
            Segments(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Dotted(s) => Self::parse(&s),
            Raw::Segments(v) => Self(v),
        })
    }
}

/// Mutable attribute layers, used while compiling a run
#[derive(Debug, Clone, Default)]
pub struct AttributeBuilder {
    layers: BTreeMap<Layer, Value>,
}

impl AttributeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `value` at `path`, replacing anything already there
    pub fn set(&mut self, layer: Layer, path: &AttrPath, value: Value) -> Result<()> {
        let (last, parents) = split_last(path)?;
        let parent = self.walk_create(layer, parents, path)?;
        parent.insert(last.clone(), value);
        Ok(())
    }

    /// Extend the list at `path` with `values`, creating it when absent
    pub fn append(&mut self, layer: Layer, path: &AttrPath, values: Vec<Value>) -> Result<()> {
        let (last, parents) = split_last(path)?;
        let parent = self.walk_create(layer, parents, path)?;
        let slot = parent
            .entry(last.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        if slot.is_null() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(list) => {
                list.extend(values);
                Ok(())
            }
            other => Err(Error::attribute(
                path.to_string(),
                format!("cannot append to {}", kind_name(other)),
            )),
        }
    }

    /// Remove the value at `path` from one layer
    pub fn remove(&mut self, layer: Layer, path: &AttrPath) -> Option<Value> {
        let (last, parents) = path.segments().split_last()?;
        let mut current = self.layers.get_mut(&layer)?;
        for segment in parents {
            current = current.as_object_mut()?.get_mut(segment)?;
        }
        current.as_object_mut()?.remove(last)
    }

    /// Read a value from a single layer
    pub fn get(&self, layer: Layer, path: &AttrPath) -> Option<&Value> {
        let root = self.layers.get(&layer)?;
        lookup(root, path)
    }

    /// Merge all layers into a read-only node
    pub fn build(self) -> Node {
        let mut merged = Value::Object(Map::new());
        for value in self.layers.values() {
            deep_merge(&mut merged, value);
        }
        Node { merged }
    }

    fn walk_create(
        &mut self,
        layer: Layer,
        segments: &[String],
        full: &AttrPath,
    ) -> Result<&mut Map<String, Value>> {
        let mut current = self
            .layers
            .entry(layer)
            .or_insert_with(|| Value::Object(Map::new()));
        for segment in segments {
            let map = as_map_mut(current, full)?;
            current = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
        }
        as_map_mut(current, full)
    }
}

fn split_last(path: &AttrPath) -> Result<(&String, &[String])> {
    path.segments()
        .split_last()
        .ok_or_else(|| Error::attribute("", "empty attribute path"))
}

fn as_map_mut<'a>(value: &'a mut Value, full: &AttrPath) -> Result<&'a mut Map<String, Value>> {
    let kind = kind_name(value);
    value.as_object_mut().ok_or_else(|| {
        Error::attribute(full.to_string(), format!("cannot descend into {kind}"))
    })
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

fn lookup<'a>(root: &'a Value, path: &AttrPath) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.segments() {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn deep_merge(base: &mut Value, top: &Value) {
    match (base, top) {
        (Value::Object(base_map), Value::Object(top_map)) => {
            for (key, value) in top_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, top) => *base = top.clone(),
    }
}

/// Merged, read-only attribute tree for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    merged: Value,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            merged: Value::Object(Map::new()),
        }
    }
}

impl Node {
    /// Value at `path`, or `None` when unset or null
    pub fn get(&self, path: impl Into<AttrPath>) -> Option<&Value> {
        lookup(&self.merged, &path.into()).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, path: impl Into<AttrPath>) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn get_bool(&self, path: impl Into<AttrPath>) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, path: impl Into<AttrPath>) -> Option<i64> {
        self.get(path).and_then(Value::as_i64)
    }

    pub fn get_map(&self, path: impl Into<AttrPath>) -> Option<&Map<String, Value>> {
        self.get(path).and_then(Value::as_object)
    }

    pub fn get_list(&self, path: impl Into<AttrPath>) -> Option<&Vec<Value>> {
        self.get(path).and_then(Value::as_array)
    }

    /// First path that holds a value
    pub fn first_present<'a, I>(&self, paths: I) -> Option<&Value>
    where
        I: IntoIterator<Item = &'a AttrPath>,
    {
        paths.into_iter().find_map(|p| self.get(p.clone()))
    }

    /// Present and not `false`
    pub fn is_truthy(&self, path: impl Into<AttrPath>) -> bool {
        !matches!(self.get(path), None | Some(Value::Bool(false)))
    }

    /// The whole merged tree
    pub fn as_value(&self) -> &Value {
        &self.merged
    }
}
