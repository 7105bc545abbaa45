//! Error types for compiling and resolving a run

use thiserror::Error;

/// Errors raised while building attributes, recipes, or the resource collection.
///
/// Failures while converging a single resource are not represented here;
/// they become [`ResourceOutcome::Failed`](crate::types::ResourceOutcome)
/// entries in the run report.
#[derive(Error, Debug)]
pub enum Error {
    /// Two resources share the same `type[name]` key
    #[error("duplicate resource {0}")]
    DuplicateResource(String),

    /// A resource declaration failed validation
    #[error("invalid resource {key}: {reason}")]
    InvalidResource { key: String, reason: String },

    /// An action that the resource kind does not implement
    #[error("resource {key} does not support action '{action}'")]
    UnsupportedAction { key: String, action: String },

    /// A `type[name]` reference that cannot be parsed
    #[error("invalid resource reference '{0}' (expected type[name])")]
    InvalidReference(String),

    /// A notification or subscription pointing at a resource that was never declared
    #[error("{from} notifies unknown resource {target}")]
    UnknownNotificationTarget { from: String, target: String },

    /// Immediate notifications that would loop forever
    #[error("immediate notification cycle through {0}")]
    NotificationCycle(String),

    /// A run list entry naming a recipe nobody registered
    #[error("recipe not found: {0}")]
    RecipeNotFound(String),

    /// A cookbook dependency that is not on the cookbook path
    #[error("cookbook {name} (required by {required_by}) not found")]
    CookbookNotFound { name: String, required_by: String },

    /// A run list entry that cannot be parsed
    #[error("invalid run list entry '{0}'")]
    InvalidRunListEntry(String),

    /// An attribute write that conflicts with the existing value's type
    #[error("attribute {path}: {reason}")]
    Attribute { path: String, reason: String },

    /// Template placeholder resolution failed
    #[error("template error: {0}")]
    Template(String),

    /// Config rendering failed
    #[error("render error: {0}")]
    Render(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn attribute(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Attribute {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(key: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidResource {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for compile-time operations
pub type Result<T> = std::result::Result<T, Error>;
