//! Two-phase compilation of a run list
//!
//! 1. Expand the run list.
//! 2. Attribute phase: cookbook attribute files (dependencies first), host
//!    facts, then each recipe's own mutations in expansion order.
//! 3. Freeze the node.
//! 4. Declaration phase: each recipe declares resources against the node.
//! 5. Resolve notifications.

use crate::attributes::{AttributeBuilder, Node};
use crate::collection::{ResolvedCollection, ResourceCollection};
use crate::error::{Error, Result};
use crate::facts::Facts;
use crate::runlist::{RecipeName, RecipeRegistry, RunList};

/// Output of compiling a run list
#[derive(Debug)]
pub struct CompiledRun {
    /// Recipes in the order they were compiled
    pub recipes: Vec<RecipeName>,
    pub node: Node,
    pub collection: ResolvedCollection,
}

pub fn compile(registry: &RecipeRegistry, run_list: &RunList, facts: &Facts) -> Result<CompiledRun> {
    let recipes = registry.expand(run_list, facts)?;
    log::debug!(
        "Expanded run list: {}",
        recipes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    );

    let mut attrs = AttributeBuilder::new();
    for cookbook in registry.cookbook_order(&recipes)? {
        log::trace!("Loading attributes from {}", cookbook.name());
        cookbook.apply_attributes(&mut attrs, facts)?;
    }
    facts.apply_to(&mut attrs)?;

    for name in &recipes {
        let recipe = registry
            .get(name)
            .ok_or_else(|| Error::RecipeNotFound(name.to_string()))?;
        recipe.attributes(&mut attrs, facts)?;
    }
    let node = attrs.build();

    let mut collection = ResourceCollection::new();
    for name in &recipes {
        let recipe = registry
            .get(name)
            .ok_or_else(|| Error::RecipeNotFound(name.to_string()))?;
        collection.set_source(Some(name.to_string()));
        recipe.resources(&node, &mut collection)?;
    }
    collection.set_source(None);
    log::info!(
        "Compiled {} resources from {} recipes",
        collection.len(),
        recipes.len()
    );

    Ok(CompiledRun {
        recipes,
        collection: collection.resolve()?,
        node,
    })
}
