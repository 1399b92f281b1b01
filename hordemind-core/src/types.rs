//! Core type definitions shared across the engine.
//!
//! Identity newtypes, world-space positions, simulation time, and the
//! decision context handed between subsystems.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Create a new random agent ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random memory ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a memory cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub Uuid);

impl ClusterId {
    /// Create a new random cluster ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClusterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a coordination group ("squad1", "pack_north", ...).
///
/// Groups are named by the game, not generated, so this wraps a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    /// Create a group ID from any string-like value.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

/// A 2D position in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl Position {
    /// Construct a position.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    #[must_use]
    pub fn distance(&self, other: Position) -> f64 {
        self.distance_sq(other).sqrt()
    }

    /// Squared Euclidean distance (cheaper when only comparing).
    #[must_use]
    pub fn distance_sq(&self, other: Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Simulation time in seconds since the scheduler was created.
///
/// Advanced only by `Scheduler::tick(dt)`, so it is monotonic and fully
/// deterministic for a given sequence of tick calls. All cooldowns,
/// expiries, and staleness checks are expressed against this clock —
/// never against a blocking sleep.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct SimTime(pub f64);

impl SimTime {
    /// Time zero.
    pub const ZERO: Self = Self(0.0);

    /// Advance the clock by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        self.0 += dt.max(0.0);
    }

    /// Seconds elapsed since `earlier`. Clamped at zero for skewed inputs.
    #[must_use]
    pub fn since(&self, earlier: SimTime) -> f64 {
        (self.0 - earlier.0).max(0.0)
    }

    /// A time `secs` seconds after this one.
    #[must_use]
    pub fn plus(&self, secs: f64) -> SimTime {
        SimTime(self.0 + secs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

// ---------------------------------------------------------------------------
// Agent tiering
// ---------------------------------------------------------------------------

/// Coarse importance class of an agent, used for update-mode tiering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AgentTier {
    /// Ordinary agent — tiered purely by distance to the focus point.
    #[default]
    Normal,
    /// Elite agent — full updates within the elite radius.
    Elite,
    /// Boss agent — always gets full updates.
    Boss,
}

// ---------------------------------------------------------------------------
// Decision context
// ---------------------------------------------------------------------------

/// Situational context handed to the memory store and tactical advisor
/// when weighing candidate actions.
#[derive(Debug, Clone, Default)]
pub struct DecisionContext {
    /// Kind of the most relevant nearby enemy, if any ("goblin", "boss", ...).
    pub enemy_kind: Option<String>,
    /// Aggregate emotional intensity of the deciding agent, in [0, 1].
    pub emotional_state: f64,
    /// Last-assessed threat level, in [0, 1].
    pub threat: f64,
    /// Last-assessed opportunity level, in [0, 1].
    pub opportunity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn sim_time_is_monotonic() {
        let mut t = SimTime::ZERO;
        t.advance(0.1);
        t.advance(-5.0); // negative dt is ignored
        t.advance(0.4);
        assert!((t.0 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn since_clamps_skew() {
        let early = SimTime(10.0);
        let late = SimTime(12.5);
        assert!((late.since(early) - 2.5).abs() < 1e-9);
        assert_eq!(early.since(late), 0.0);
    }
}
