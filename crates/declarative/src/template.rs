//! `{{ placeholder }}` substitution for template resources
//!
//! `{{ name }}` reads a template variable (dotted paths descend into maps)
//! and `{{ node.some.path }}` reads the node. Anything unresolved is an
//! error so a typo never renders an empty value into a config file.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::attributes::{AttrPath, Node};
use crate::error::{Error, Result};

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid placeholder regex")
    })
}

/// Render `source` against `variables` and the node
pub fn render(source: &str, variables: &Map<String, Value>, node: &Node) -> Result<String> {
    let mut missing: Option<String> = None;
    let rendered = placeholder().replace_all(source, |caps: &Captures| {
        let expr = &caps[1];
        match resolve(expr, variables, node) {
            Some(value) => display(value),
            None => {
                missing.get_or_insert_with(|| expr.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(expr) => Err(Error::Template(format!("unresolved placeholder {{{{ {expr} }}}}"))),
        None => Ok(rendered.into_owned()),
    }
}

fn resolve<'a>(expr: &str, variables: &'a Map<String, Value>, node: &'a Node) -> Option<&'a Value> {
    if let Some(path) = expr.strip_prefix("node.") {
        return node.get(AttrPath::parse(path));
    }
    let mut segments = expr.split('.');
    let mut current = variables.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    (!current.is_null()).then_some(current)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
