//! Cookbook skeletons
//!
//! The skeleton is an ordinary resource collection: directories plus
//! `create_if_missing` files, so generating over an existing cookbook
//! only fills in what is absent.

use anyhow::{Result, bail};
use declarative::{Action, ResolvedCollection, Resource, ResourceCollection};
use std::path::Path;

use crate::cookbook;

/// SPDX identifier written to `metadata.toml` for a `--license` value
pub fn spdx_license(license: &str) -> &'static str {
    match license {
        "apachev2" => "Apache-2.0",
        "mit" => "MIT",
        "gplv2" => "GPL-2.0",
        "gplv3" => "GPL-3.0",
        _ => "All Rights Reserved",
    }
}

fn metadata(name: &str, license: &str) -> String {
    format!(
        r#"name = "{name}"
version = "0.1.0"
description = "Installs/Configures {name}"
license = "{}"
depends = []
"#,
        spdx_license(license)
    )
}

fn readme(name: &str) -> String {
    format!(
        "# {name}\n\n\
         Describe what this cookbook manages.\n\n\
         ## Attributes\n\n\
         See `attributes/default.toml`.\n\n\
         ## Recipes\n\n\
         - `{name}::default`\n"
    )
}

fn attributes(name: &str) -> String {
    format!(
        r#"# Attribute defaults for {name}
#
# [[attribute]]
# op = "set"
# path = "{name}.enabled"
# value = true
"#
    )
}

fn recipe(name: &str) -> String {
    format!(
        r#"# {name}::default
#
# [[resource]]
# type = "package"
# name = "{name}"
"#
    )
}

/// Resources creating `<root>/<name>`; `root` must be absolute
pub fn cookbook(root: &Path, name: &str, license: &str) -> Result<ResolvedCollection> {
    if !cookbook::is_valid_name(name) {
        bail!("Invalid cookbook name '{name}': use letters, digits, '_' and '-'");
    }
    let dir = root.join(name);
    let file = |rel: &str, content: String| {
        Resource::file(dir.join(rel), Some(content.as_str())).action(Action::CreateIfMissing)
    };

    let mut collection = ResourceCollection::new();
    collection.add(Resource::directory(&dir))?;
    collection.add(file("metadata.toml", metadata(name, license)))?;
    collection.add(file("README.md", readme(name)))?;
    collection.add(Resource::directory(dir.join("attributes")))?;
    collection.add(file("attributes/default.toml", attributes(name)))?;
    collection.add(Resource::directory(dir.join("recipes")))?;
    collection.add(file("recipes/default.toml", recipe(name)))?;
    Ok(collection.resolve()?)
}
