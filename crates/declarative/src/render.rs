//! Rendering attribute values into config file syntax

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Keys whose booleans are written as `1`/`0` rather than `True`/`False`
pub const NUMERIC_BOOLEAN_KEYS: &[&str] = &[
    "enabled",
    "gpgcheck",
    "repo_gpgcheck",
    "localpkg_gpgcheck",
    "skip_if_unavailable",
    "keepcache",
    "plugins",
];

/// Render one `key=value` right-hand side
///
/// Strings are written as-is, numbers in decimal, and lists as their
/// rendered items joined by spaces.
pub fn config_value(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) if NUMERIC_BOOLEAN_KEYS.contains(&key) => {
            Ok(if *b { "1" } else { "0" }.to_string())
        }
        Value::Bool(b) => Ok(if *b { "True" } else { "False" }.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Array(items) => {
            let rendered = items
                .iter()
                .map(|item| config_value(key, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(rendered.join(" "))
        }
        Value::Null => Err(Error::Render(format!("{key} has no value"))),
        Value::Object(_) => Err(Error::Render(format!("{key} is a map, not a value"))),
    }
}

/// `key=value` lines for a flat map, skipping unset keys
pub fn key_values(map: &Map<String, Value>) -> Result<String> {
    let mut out = String::new();
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        out.push_str(key);
        out.push('=');
        out.push_str(&config_value(key, value)?);
        out.push('\n');
    }
    Ok(out)
}

/// INI document with one `[section]` per top-level key
pub fn ini(sections: &Map<String, Value>) -> Result<String> {
    let mut blocks = Vec::with_capacity(sections.len());
    for (section, body) in sections {
        let body = body
            .as_object()
            .ok_or_else(|| Error::Render(format!("section {section} is not a map")))?;
        blocks.push(format!("[{section}]\n{}", key_values(body)?));
    }
    Ok(blocks.join("\n"))
}

/// YAML document
pub fn yaml(value: &Value) -> Result<String> {
    serde_yaml::to_string(value).map_err(|e| Error::Render(e.to_string()))
}
