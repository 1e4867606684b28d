//! Error types for the behavior system
//!
//! Listeners never recover from failures: every error raised while handling
//! an event propagates to the flush caller, which rolls the store back.

use crate::config::ConfigError;

/// Result type alias for behavior operations
pub type BehaviorResult<T> = Result<T, BehaviorError>;

/// Error types for behaviors, the unit of work and the entity stores
#[derive(Debug, thiserror::Error)]
pub enum BehaviorError {
    /// A sluggable entity had no usable value to build its slug from
    #[error("Sluggable error: {0}")]
    Sluggable(String),

    /// A configured probe bound was reached before a free slug was found
    #[error("No unique slug found for '{slug}' after {attempts} attempts")]
    SlugExhausted { slug: String, attempts: u32 },

    /// The entity class was never registered with the entity manager
    #[error("Unknown entity class '{0}'")]
    UnknownEntity(String),

    /// The handle does not point to an entity of this unit of work
    #[error("Unknown entity handle #{0}")]
    UnknownHandle(usize),

    /// A record was expected in storage but is not there
    #[error("Record {id} not found in table '{table}'")]
    NotFound { table: String, id: i64 },

    /// A stored row could not be turned back into an entity
    #[error("Hydration error: {0}")]
    Hydration(String),

    /// Storage backend failure that is not a database driver error
    #[error("Store error: {0}")]
    Store(String),

    /// Error raised by an entity's own logic inside a listener
    #[error("Listener error: {0}")]
    Listener(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BehaviorError {
    pub fn listener(message: impl Into<String>) -> Self {
        Self::Listener(message.into())
    }

    pub fn hydration(message: impl Into<String>) -> Self {
        Self::Hydration(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }
}
