//! Error types for the engine.
//!
//! Per-agent and per-tick failures never propagate out of the scheduler's
//! `tick` — they are logged at the nearest boundary and the simulation
//! continues with degraded behavior. These types exist so that boundary
//! can be a single typed match rather than scattered catch-alls.

use thiserror::Error;

use crate::types::AgentId;

/// Top-level error type for all engine operations.
#[derive(Error, Debug)]
pub enum AiError {
    /// The entity is already registered with the scheduler.
    #[error("Entity already registered as agent {0}")]
    AlreadyRegistered(AgentId),

    /// Operation referenced an agent id the scheduler does not know.
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    /// The agent's backing entity has been dropped by the game.
    ///
    /// Recovered automatically by the tick purge; never fatal.
    #[error("Dead entity reference for agent {0}")]
    DeadReference(AgentId),

    /// The entity does not support an optional capability.
    ///
    /// Recovered by skipping the dependent behavior; logged at debug.
    #[error("Entity capability missing: {capability}")]
    CapabilityMissing {
        /// Name of the missing capability call.
        capability: &'static str,
    },

    /// Persisted generation data could not be decoded.
    ///
    /// Recovered by starting from an empty memory store; never fatal.
    #[error("Persisted memory corrupt: {reason}")]
    MemoryCorruption {
        /// Why the data was rejected.
        reason: String,
    },

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, AiError>;
