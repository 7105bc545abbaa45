//! Cookbooks written as TOML data
//!
//! ```text
//! <cookbook>/
//!   metadata.toml        name, version, depends
//!   attributes/*.toml    [[attribute]] entries, default.toml first
//!   recipes/*.toml       include, [[attribute]], [[resource]], [[builder]]
//!   templates/*          files named by a template's `source_file`
//! ```
//!
//! Within a recipe, `[[resource]]` entries are declared in file order,
//! followed by the resources of each `[[builder]]`.
//!
//! A recipe with `skip_unless` or `skip_if` paths is skipped as a whole,
//! with a warning, when those files are missing or present:
//!
//! ```toml
//! skip_unless = ["/etc/datadog_secrets"]
//! ```

use anyhow::{Context, Result, bail};
use declarative::{
    AttrPath, AttributeBuilder, BuilderDecl, Cookbook, Facts, Layer, Node, Recipe, RecipeName,
    RecipeRegistry, ResourceCollection, ResourceDecl,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

// ============================================================================
// File Formats
// ============================================================================

/// Restricts an entry to matching hosts
///
/// Path checks look at the host compiling the run.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct When {
    pub platform: Option<String>,
    pub platform_family: Option<String>,
    pub el_min_version: Option<u32>,
    pub el_max_version: Option<u32>,
    pub path_exists: Option<PathBuf>,
    pub path_missing: Option<PathBuf>,
}

impl When {
    pub fn matches(&self, facts: &Facts) -> bool {
        self.platform.as_ref().is_none_or(|p| *p == facts.platform)
            && self
                .platform_family
                .as_ref()
                .is_none_or(|f| *f == facts.platform_family)
            && self.el_min_version.is_none_or(|v| facts.el_min_version(v))
            && self.el_max_version.is_none_or(|v| facts.el_max_version(v))
            && self.path_exists.as_ref().is_none_or(|p| p.exists())
            && self.path_missing.as_ref().is_none_or(|p| !p.exists())
    }
}

fn applies(when: Option<&When>, facts: &Facts) -> bool {
    when.is_none_or(|w| w.matches(facts))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Metadata {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    depends: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum Op {
    Set,
    Append,
    Remove,
    /// Copy `key = value` lines of a secrets file under `path`
    Secrets,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct AttributeEntry {
    op: Op,
    #[serde(default)]
    layer: Layer,
    path: AttrPath,
    #[serde(default)]
    value: Option<Value>,
    /// Secrets file read by `op = "secrets"`
    #[serde(default)]
    file: Option<PathBuf>,
    /// Secrets to copy; every key when empty
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    when: Option<When>,
}

impl AttributeEntry {
    fn check(&self) -> Result<()> {
        if self.path.is_empty() {
            bail!("attribute entry has an empty path");
        }
        if self.op != Op::Secrets && (self.file.is_some() || !self.keys.is_empty()) {
            bail!("attribute {}: only 'secrets' takes a file and keys", self.path);
        }
        match (self.op, &self.value) {
            (Op::Set | Op::Append, None) => {
                bail!("attribute {}: set and append need a value", self.path)
            }
            (Op::Remove, Some(_)) => bail!("attribute {}: 'remove' takes no value", self.path),
            (Op::Secrets, Some(_)) => bail!("attribute {}: 'secrets' takes no value", self.path),
            (Op::Secrets, None) if self.file.is_none() => {
                bail!("attribute {}: 'secrets' needs a file", self.path)
            }
            _ => Ok(()),
        }
    }

    fn apply(&self, attrs: &mut AttributeBuilder, facts: &Facts) -> declarative::Result<()> {
        if !applies(self.when.as_ref(), facts) {
            return Ok(());
        }
        let value = self.value.clone().unwrap_or_default();
        match self.op {
            Op::Set => attrs.set(self.layer, &self.path, value),
            Op::Append => {
                let items = match value {
                    Value::Array(items) => items,
                    single => vec![single],
                };
                attrs.append(self.layer, &self.path, items)
            }
            Op::Remove => {
                attrs.remove(self.layer, &self.path);
                Ok(())
            }
            Op::Secrets => self.apply_secrets(attrs),
        }
    }

    fn apply_secrets(&self, attrs: &mut AttributeBuilder) -> declarative::Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        if !file.exists() {
            log::debug!("No {}, leaving {} unset", file.display(), self.path);
            return Ok(());
        }
        let content = fs::read_to_string(file).map_err(|e| declarative::Error::Attribute {
            path: file.display().to_string(),
            reason: format!("cannot read secrets file: {e}"),
        })?;
        let secrets = parse_secrets(&content).map_err(|line| declarative::Error::Attribute {
            path: file.display().to_string(),
            reason: format!("line {line} is not `key = value`"),
        })?;
        for (key, value) in secrets {
            if self.keys.is_empty() || self.keys.contains(&key) {
                attrs.set(self.layer, &self.path.child(key), Value::String(value))?;
            }
        }
        Ok(())
    }
}

/// `key = value` lines, keys lowercased; `Err` holds the first bad line number
///
/// Blank lines and `#` comments are ignored.
pub fn parse_secrets(content: &str) -> std::result::Result<Vec<(String, String)>, usize> {
    let mut secrets = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(index + 1);
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(index + 1);
        }
        secrets.push((key.to_lowercase(), value.to_string()));
    }
    Ok(secrets)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Include {
    Always(RecipeName),
    When { recipe: RecipeName, when: When },
}

#[derive(Debug, Clone, Deserialize)]
struct ResourceEntry {
    #[serde(default)]
    when: Option<When>,
    #[serde(flatten)]
    decl: ResourceDecl,
}

#[derive(Debug, Clone, Deserialize)]
struct BuilderEntry {
    #[serde(default)]
    when: Option<When>,
    #[serde(flatten)]
    decl: BuilderDecl,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RecipeFile {
    include: Vec<Include>,
    #[serde(rename = "attribute")]
    attributes: Vec<AttributeEntry>,
    #[serde(rename = "resource")]
    resources: Vec<ResourceEntry>,
    #[serde(rename = "builder")]
    builders: Vec<BuilderEntry>,
    skip_unless: Vec<PathBuf>,
    skip_if: Vec<PathBuf>,
}

impl RecipeFile {
    /// Why the whole recipe is skipped on this host, if it is
    fn skip_reason(&self) -> Option<String> {
        if let Some(path) = self.skip_unless.iter().find(|p| !p.exists()) {
            return Some(format!("no {}", path.display()));
        }
        self.skip_if
            .iter()
            .find(|p| p.exists())
            .map(|path| format!("{} is present", path.display()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct AttributesFile {
    #[serde(rename = "attribute")]
    attributes: Vec<AttributeEntry>,
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid {}", path.display()))
}

// ============================================================================
// Recipe and Cookbook Implementations
// ============================================================================

/// A recipe loaded from `recipes/<name>.toml`
#[derive(Debug)]
pub struct DataRecipe {
    name: RecipeName,
    templates_dir: PathBuf,
    file: RecipeFile,
    skip: OnceLock<Option<String>>,
}

impl DataRecipe {
    fn load(name: RecipeName, cookbook_dir: &Path, path: &Path) -> Result<Self> {
        let file: RecipeFile = load_toml(path)?;
        for entry in &file.attributes {
            entry
                .check()
                .with_context(|| format!("in recipe {name}"))?;
        }
        Ok(Self {
            name,
            templates_dir: cookbook_dir.join("templates"),
            file,
            skip: OnceLock::new(),
        })
    }

    /// Checked once; warns the first time
    fn skipped(&self) -> bool {
        self.skip
            .get_or_init(|| {
                let reason = self.file.skip_reason();
                if let Some(reason) = &reason {
                    log::warn!("{}: {reason}, skipping recipe", self.name);
                }
                reason
            })
            .is_some()
    }

    fn read_template(&self, file: &str) -> declarative::Result<String> {
        let relative = Path::new(file);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(declarative::Error::Template(format!(
                "template name '{file}' must stay inside templates/"
            )));
        }
        let path = self.templates_dir.join(relative);
        fs::read_to_string(&path).map_err(|e| {
            declarative::Error::Template(format!("{}: {e}", path.display()))
        })
    }
}

impl Recipe for DataRecipe {
    fn name(&self) -> &RecipeName {
        &self.name
    }

    fn includes(&self, facts: &Facts) -> Vec<RecipeName> {
        if self.skipped() {
            return Vec::new();
        }
        self.file
            .include
            .iter()
            .filter_map(|include| match include {
                Include::Always(name) => Some(name.clone()),
                Include::When { recipe, when } => when.matches(facts).then(|| recipe.clone()),
            })
            .collect()
    }

    fn attributes(&self, attrs: &mut AttributeBuilder, facts: &Facts) -> declarative::Result<()> {
        if self.skipped() {
            return Ok(());
        }
        for entry in &self.file.attributes {
            entry.apply(attrs, facts)?;
        }
        Ok(())
    }

    fn resources(&self, node: &Node, collection: &mut ResourceCollection) -> declarative::Result<()> {
        if self.skipped() {
            return Ok(());
        }
        let facts = facts_from_node(node);
        let loader = |file: &str| self.read_template(file);

        for entry in &self.file.resources {
            if applies(entry.when.as_ref(), &facts) {
                collection.add(entry.decl.clone().into_resource(node, &loader)?)?;
            }
        }
        for entry in &self.file.builders {
            if applies(entry.when.as_ref(), &facts) {
                for resource in entry.decl.build(node)? {
                    collection.add(resource)?;
                }
            }
        }
        Ok(())
    }
}

/// Declaration-phase `when` filters read the automatic attributes
fn facts_from_node(node: &Node) -> Facts {
    let text = |key: &str| node.get_str(key).unwrap_or_default().to_string();
    Facts {
        hostname: text("hostname"),
        fqdn: text("fqdn"),
        platform: text("platform"),
        platform_family: text("platform_family"),
        platform_version: text("platform_version"),
        systemd: node.is_truthy("systemd"),
        container: node.is_truthy("container"),
    }
}

/// A cookbook's metadata and attribute files
#[derive(Debug)]
pub struct DataCookbook {
    name: String,
    depends: Vec<String>,
    attribute_files: Vec<(PathBuf, Vec<AttributeEntry>)>,
}

impl Cookbook for DataCookbook {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends(&self) -> &[String] {
        &self.depends
    }

    fn apply_attributes(&self, attrs: &mut AttributeBuilder, facts: &Facts) -> declarative::Result<()> {
        for (path, entries) in &self.attribute_files {
            log::trace!("Applying {}", path.display());
            for entry in entries {
                entry.apply(attrs, facts)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Summary of one loaded cookbook
#[derive(Debug, Clone)]
pub struct CookbookInfo {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub license: Option<String>,
    pub dir: PathBuf,
    pub depends: Vec<String>,
    pub recipes: Vec<String>,
}

/// Every cookbook found on a cookbook path
pub struct CookbookRepo {
    pub registry: RecipeRegistry,
    pub cookbooks: Vec<CookbookInfo>,
}

impl CookbookRepo {
    /// Load cookbooks; the first directory providing a name wins
    pub fn load(cookbook_path: &[PathBuf]) -> Result<Self> {
        let mut registry = RecipeRegistry::new();
        let mut cookbooks = Vec::new();
        let mut seen = HashSet::new();

        for root in cookbook_path {
            if !root.is_dir() {
                log::warn!("Cookbook directory {} does not exist", root.display());
                continue;
            }
            for entry in WalkDir::new(root)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.with_context(|| format!("Could not list {}", root.display()))?;
                if !entry.file_type().is_dir() {
                    continue;
                }
                let dir = entry.path();
                let metadata_path = dir.join("metadata.toml");
                if !metadata_path.is_file() {
                    log::debug!("Skipping {}: no metadata.toml", dir.display());
                    continue;
                }
                let metadata: Metadata = load_toml(&metadata_path)?;
                if !seen.insert(metadata.name.clone()) {
                    log::debug!(
                        "Cookbook {} in {} is shadowed by an earlier path",
                        metadata.name,
                        dir.display()
                    );
                    continue;
                }
                let info = load_cookbook(&mut registry, dir, metadata)?;
                log::debug!(
                    "Loaded cookbook {} ({} recipes) from {}",
                    info.name,
                    info.recipes.len(),
                    dir.display()
                );
                cookbooks.push(info);
            }
        }

        Ok(Self {
            registry,
            cookbooks,
        })
    }
}

/// Cookbook names are letters, digits, `_` and `-`
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn load_cookbook(registry: &mut RecipeRegistry, dir: &Path, metadata: Metadata) -> Result<CookbookInfo> {
    if !is_valid_name(&metadata.name) {
        bail!("Invalid cookbook name '{}' in {}", metadata.name, dir.display());
    }

    let mut attribute_paths = toml_files(&dir.join("attributes"))?;
    attribute_paths.sort_by_key(|p| p.file_stem().is_none_or(|s| s != "default"));
    let mut attribute_files = Vec::new();
    for path in attribute_paths {
        let file: AttributesFile = load_toml(&path)?;
        for entry in &file.attributes {
            entry
                .check()
                .with_context(|| format!("in {}", path.display()))?;
        }
        attribute_files.push((path, file.attributes));
    }

    let mut recipes = Vec::new();
    for path in toml_files(&dir.join("recipes"))? {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let name: RecipeName = format!("{}::{stem}", metadata.name)
            .parse()
            .with_context(|| format!("Invalid recipe file name {}", path.display()))?;
        registry.register(Box::new(DataRecipe::load(name, dir, &path)?));
        recipes.push(stem);
    }

    registry.register_cookbook(Box::new(DataCookbook {
        name: metadata.name.clone(),
        depends: metadata.depends.clone(),
        attribute_files,
    }));

    Ok(CookbookInfo {
        name: metadata.name,
        version: metadata.version,
        description: metadata.description,
        license: metadata.license,
        dir: dir.to_path_buf(),
        depends: metadata.depends,
        recipes,
    })
}

/// `*.toml` directly inside `dir`, sorted by name
fn toml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Could not list {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "toml") {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}
