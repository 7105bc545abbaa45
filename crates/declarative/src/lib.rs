//! # Declarative
//!
//! Engine for converging a host toward declared state.
//!
//! A run is compiled in two phases. Recipes first mutate layered node
//! attributes; the layers are then frozen into a read-only [`Node`] and
//! every recipe declares resources against it. The resulting collection
//! is converged strictly in order by [`converge`].
//!
//! ## Core Concepts
//!
//! - **Resource**: one unit of desired state, keyed `type[name]`
//! - **Node**: merged attribute tree (`default` < `override` < `automatic`)
//! - **Notification**: "when I change, run action X on resource Y", either
//!   immediately or once at the end of the run
//! - **Guard**: `only_if` / `not_if` conditions evaluated right before an action
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     converge_simple, ApplyContext, Resource, ResourceCollection, ResourceKey,
//!     ResourceType, SystemRunner, Timing, Action, Node,
//! };
//!
//! let mut collection = ResourceCollection::new();
//! collection.add(Resource::service("sshd"))?;
//! collection.add(
//!     Resource::file("/etc/ssh/sshd_config", Some("PermitRootLogin no\n")).notifies(
//!         Action::Restart,
//!         ResourceKey::new(ResourceType::Service, "sshd"),
//!         Timing::Delayed,
//!     ),
//! )?;
//! let collection = collection.resolve()?;
//!
//! let node = Node::default();
//! let ctx = ApplyContext::new(&SystemRunner, &node);
//! let report = converge_simple(&collection, &ctx);
//! assert!(report.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! - [`CommandRunner`]: spawns `dnf`, `systemctl`, `sh`, ...
//! - [`RunObserver`]: receives progress updates
//! - [`Recipe`] / [`Cookbook`]: supply attributes and declarations
//!
//! This keeps the crate free of any particular UI or process handling.

pub mod attributes;
pub mod builders;
pub mod collection;
pub mod compile;
pub mod context;
pub mod decl;
pub mod error;
pub mod executor;
pub mod facts;
pub mod guard;
pub mod notify;
pub mod plan;
pub mod provider;
pub mod render;
pub mod resource;
pub mod runlist;
pub mod template;
pub mod types;

// Re-export main types at crate root
pub use attributes::{AttrPath, AttributeBuilder, Layer, Node};
pub use collection::{ResolvedCollection, ResourceCollection};
pub use compile::{CompiledRun, compile};
pub use context::{
    ApplyContext, CommandRunner, NoObserver, PackageManager, RunObserver, SystemRunner,
};
pub use decl::{BuilderDecl, NoTemplates, ResourceDecl, TemplateLoader};
pub use error::{Error, Result};
pub use executor::{converge, converge_simple};
pub use facts::Facts;
pub use guard::{Condition, Guards};
pub use notify::{Notification, Timing};
pub use plan::{PlannedResource, plan};
pub use resource::{Action, Permissions, Resource, ResourceKey, ResourceSpec, ResourceType};
pub use runlist::{Cookbook, Recipe, RecipeName, RecipeRegistry, RunList};
pub use types::{
    ActionRecord, ApplyResult, CommandOutput, NotificationRecord, NotificationState,
    ResourceOutcome, ResourceState, RunReport, RunStatus, RunSummary,
};
