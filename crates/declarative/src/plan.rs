//! Current-state report for a compiled collection

use serde::Serialize;

use crate::collection::ResolvedCollection;
use crate::context::ApplyContext;
use crate::provider::provider_for;
use crate::resource::{Action, Resource};
use crate::types::ResourceState;

/// One resource as it stands before converging
#[derive(Debug, Clone, Serialize)]
pub struct PlannedResource {
    pub key: String,
    pub description: String,
    pub actions: Vec<Action>,
    pub current: ResourceState,
    pub declared_in: Option<String>,
    /// `type[name]` targets this resource notifies
    pub notifies: Vec<String>,
}

impl PlannedResource {
    fn from_resource(resource: &Resource, ctx: &ApplyContext) -> Self {
        let current = provider_for(resource)
            .current_state(ctx)
            .unwrap_or_else(|e| {
                log::warn!("Cannot inspect {}: {e:#}", resource.key());
                ResourceState::Unknown
            });
        Self {
            key: resource.key().to_string(),
            description: resource.description(),
            actions: resource.actions.clone(),
            current,
            declared_in: resource.declared_in.clone(),
            notifies: resource
                .notifies
                .iter()
                .map(|n| format!("{} {} ({})", n.action, n.target, n.timing))
                .collect(),
        }
    }
}

/// Inspect every resource without changing anything
pub fn plan(collection: &ResolvedCollection, ctx: &ApplyContext) -> Vec<PlannedResource> {
    collection
        .iter()
        .map(|resource| PlannedResource::from_resource(resource, ctx))
        .collect()
}
