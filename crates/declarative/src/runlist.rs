//! Run lists, recipes, and run-list expansion

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::attributes::{AttributeBuilder, Node};
use crate::collection::ResourceCollection;
use crate::error::{Error, Result};
use crate::facts::Facts;

/// `cookbook::recipe`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipeName {
    pub cookbook: String,
    pub recipe: String,
}

impl RecipeName {
    pub fn new(cookbook: impl Into<String>, recipe: impl Into<String>) -> Self {
        Self {
            cookbook: cookbook.into(),
            recipe: recipe.into(),
        }
    }
}

impl fmt::Display for RecipeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.cookbook, self.recipe)
    }
}

impl FromStr for RecipeName {
    type Err = Error;

    /// Accepts `recipe[cb::r]`, `recipe[cb]`, `cb::r`, and `cb`
    fn from_str(entry: &str) -> Result<Self> {
        let invalid = || Error::InvalidRunListEntry(entry.to_string());
        let trimmed = entry.trim();
        let inner = match trimmed.strip_prefix("recipe[") {
            Some(rest) => rest.strip_suffix(']').ok_or_else(invalid)?,
            None => trimmed,
        };
        let (cookbook, recipe) = inner.split_once("::").unwrap_or((inner, "default"));
        let valid = |s: &str| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        };
        if !valid(cookbook) || !valid(recipe) {
            return Err(invalid());
        }
        Ok(Self::new(cookbook, recipe))
    }
}

impl Serialize for RecipeName {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecipeName {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(d)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

/// Ordered list of recipes to converge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunList {
    pub run_list: Vec<RecipeName>,
}

impl RunList {
    pub fn new(entries: Vec<RecipeName>) -> Self {
        Self { run_list: entries }
    }

    /// Parse a `{"run_list": [...]}` manifest
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidRunListEntry(e.to_string()))
    }

    /// Parse entries such as `recipe[fb_init]`
    pub fn parse<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let run_list = entries
            .into_iter()
            .map(|e| e.as_ref().parse())
            .collect::<Result<_>>()?;
        Ok(Self { run_list })
    }

    pub fn is_empty(&self) -> bool {
        self.run_list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecipeName> {
        self.run_list.iter()
    }
}

/// A unit of configuration: attribute mutations followed by declarations
pub trait Recipe {
    fn name(&self) -> &RecipeName;

    /// Recipes whose content comes before this one
    fn includes(&self, _facts: &Facts) -> Vec<RecipeName> {
        Vec::new()
    }

    /// Attribute phase: runs before the node is frozen
    fn attributes(&self, _attrs: &mut AttributeBuilder, _facts: &Facts) -> Result<()> {
        Ok(())
    }

    /// Declaration phase: reads the frozen node
    fn resources(&self, node: &Node, collection: &mut ResourceCollection) -> Result<()>;
}

/// Cookbook-level attribute defaults and dependencies
pub trait Cookbook {
    fn name(&self) -> &str;

    fn depends(&self) -> &[String] {
        &[]
    }

    /// Apply the cookbook's attribute files
    fn apply_attributes(&self, attrs: &mut AttributeBuilder, facts: &Facts) -> Result<()>;
}

/// Every recipe and cookbook known to a run
#[derive(Default)]
pub struct RecipeRegistry {
    recipes: HashMap<RecipeName, Box<dyn Recipe>>,
    cookbooks: HashMap<String, Box<dyn Cookbook>>,
}

impl RecipeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, recipe: Box<dyn Recipe>) {
        self.recipes.insert(recipe.name().clone(), recipe);
    }

    pub fn register_cookbook(&mut self, cookbook: Box<dyn Cookbook>) {
        self.cookbooks.insert(cookbook.name().to_string(), cookbook);
    }

    pub fn get(&self, name: &RecipeName) -> Option<&dyn Recipe> {
        self.recipes.get(name).map(|r| r.as_ref())
    }

    pub fn cookbook(&self, name: &str) -> Option<&dyn Cookbook> {
        self.cookbooks.get(name).map(|c| c.as_ref())
    }

    pub fn recipe_names(&self) -> impl Iterator<Item = &RecipeName> {
        self.recipes.keys()
    }

    /// Flatten a run list into the order recipes are compiled
    ///
    /// Depth first: a recipe's includes come before the recipe itself, and
    /// every recipe appears once, at its first position. Including a recipe
    /// that is already placed (or still being expanded) is a no-op.
    pub fn expand(&self, run_list: &RunList, facts: &Facts) -> Result<Vec<RecipeName>> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        for entry in run_list.iter() {
            self.visit(entry, facts, &mut seen, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        name: &RecipeName,
        facts: &Facts,
        seen: &mut HashSet<RecipeName>,
        order: &mut Vec<RecipeName>,
    ) -> Result<()> {
        if !seen.insert(name.clone()) {
            return Ok(());
        }
        let recipe = self
            .get(name)
            .ok_or_else(|| Error::RecipeNotFound(name.to_string()))?;
        for include in recipe.includes(facts) {
            self.visit(&include, facts, seen, order)?;
        }
        order.push(name.clone());
        Ok(())
    }

    /// Cookbooks whose attribute files apply, dependencies first
    pub fn cookbook_order(&self, recipes: &[RecipeName]) -> Result<Vec<&dyn Cookbook>> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        for recipe in recipes {
            self.visit_cookbook(&recipe.cookbook, None, &mut seen, &mut order)?;
        }
        Ok(order)
    }

    fn visit_cookbook<'a>(
        &'a self,
        name: &str,
        required_by: Option<&str>,
        seen: &mut HashSet<String>,
        order: &mut Vec<&'a dyn Cookbook>,
    ) -> Result<()> {
        if !seen.insert(name.to_string()) {
            return Ok(());
        }
        let Some(cookbook) = self.cookbook(name) else {
            return match required_by {
                Some(parent) => Err(Error::CookbookNotFound {
                    name: name.to_string(),
                    required_by: parent.to_string(),
                }),
                // Recipes registered in code need no cookbook entry
                None => Ok(()),
            };
        };
        for dep in cookbook.depends() {
            self.visit_cookbook(dep, Some(name), seen, order)?;
        }
        order.push(cookbook);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        name: RecipeName,
        includes: Vec<RecipeName>,
    }

    impl Recipe for Stub {
        fn name(&self) -> &RecipeName {
            &self.name
        }

        fn includes(&self, _facts: &Facts) -> Vec<RecipeName> {
            self.includes.clone()
        }

        fn resources(&self, _node: &Node, _collection: &mut ResourceCollection) -> Result<()> {
            Ok(())
        }
    }

    fn name(s: &str) -> RecipeName {
        s.parse().unwrap()
    }

    fn registry(entries: &[(&str, &[&str])]) -> RecipeRegistry {
        let mut reg = RecipeRegistry::new();
        for (recipe, includes) in entries {
            reg.register(Box::new(Stub {
                name: name(recipe),
                includes: includes.iter().map(|i| name(i)).collect(),
            }));
        }
        reg
    }

    #[test]
    fn test_entry_forms() {
        assert_eq!(name("recipe[fb_init::site_settings]"), RecipeName::new("fb_init", "site_settings"));
        assert_eq!(name("recipe[scale_ssh]"), RecipeName::new("scale_ssh", "default"));
        assert_eq!(name("scale_web::default"), RecipeName::new("scale_web", "default"));
        assert_eq!(name("scale_web"), RecipeName::new("scale_web", "default"));
        assert!("recipe[scale_web".parse::<RecipeName>().is_err());
        assert!("role[web]".parse::<RecipeName>().is_err());
        assert!("".parse::<RecipeName>().is_err());
    }

    #[test]
    fn test_manifest() {
        let rl = RunList::from_json(r#"{"run_list": ["recipe[fb_init]", "recipe[scale_web]"]}"#)
            .unwrap();
        assert_eq!(rl.run_list.len(), 2);
        assert!(RunList::from_json(r#"{"run_list": ["role[x]"]}"#).is_err());
    }

    #[test]
    fn test_includes_precede_includer() {
        let reg = registry(&[
            ("fb_init", &["fb_init::site_settings", "scale_ssh"]),
            ("fb_init::site_settings", &[]),
            ("scale_ssh", &[]),
            ("scale_web", &[]),
        ]);
        let rl = RunList::parse(["recipe[fb_init]", "recipe[scale_web]"]).unwrap();
        let order: Vec<String> = reg
            .expand(&rl, &Facts::default())
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            order,
            vec![
                "fb_init::site_settings",
                "scale_ssh::default",
                "fb_init::default",
                "scale_web::default"
            ]
        );
    }

    #[test]
    fn test_recipe_appears_once() {
        let reg = registry(&[("a", &["common"]), ("b", &["common"]), ("common", &[])]);
        let rl = RunList::parse(["a", "b", "common"]).unwrap();
        let order = reg.expand(&rl, &Facts::default()).unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], name("common"));
    }

    #[test]
    fn test_inclusion_cycle_is_harmless() {
        let reg = registry(&[("a", &["b"]), ("b", &["a"])]);
        let order = reg
            .expand(&RunList::parse(["a"]).unwrap(), &Facts::default())
            .unwrap();
        assert_eq!(order, vec![name("b"), name("a")]);
    }

    #[test]
    fn test_unknown_recipe() {
        let reg = registry(&[("a", &["missing"])]);
        let err = reg
            .expand(&RunList::parse(["a"]).unwrap(), &Facts::default())
            .unwrap_err();
        assert!(matches!(err, Error::RecipeNotFound(n) if n == "missing::default"));
    }
}
