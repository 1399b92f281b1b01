//! The entity capability interface — the boundary to the host game.
//!
//! The engine never owns game entities. It holds weak handles and talks
//! to them through this trait, in which *every* accessor and capability
//! call is optional: the default bodies return `None`, empty collections,
//! or [`CapabilityOutcome::Unsupported`]. A game implements exactly the
//! surface its entities have, and the decision core degrades gracefully
//! around whatever is missing — the compiler, not runtime reflection,
//! checks the seams.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::types::{AgentId, AgentTier, Position};

/// Shared owning handle to a game entity, as passed in at registration.
pub type EntityRef = Arc<Mutex<dyn Entity>>;

/// Non-owning handle stored in the scheduler's registry.
///
/// Upgraded (liveness-checked) once per tick before any use; a failed
/// upgrade unregisters the agent.
pub type EntityWeak = Weak<Mutex<dyn Entity>>;

/// Result of an optional capability call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityOutcome {
    /// The entity performed the requested action.
    Performed,
    /// The entity does not support this capability; the caller skips the
    /// dependent behavior.
    Unsupported,
}

impl CapabilityOutcome {
    /// True if the action was actually performed.
    #[must_use]
    pub fn performed(self) -> bool {
        matches!(self, Self::Performed)
    }
}

/// Description of one skill an entity can use.
#[derive(Debug, Clone)]
pub struct SkillInfo {
    /// Game-side skill identifier.
    pub id: String,
    /// Resource cost, in whatever unit the game uses.
    pub cost: f64,
    /// Cooldown in seconds.
    pub cooldown: f64,
    /// Free-form tags ("heal", "defense", ...). The decision core selects
    /// skills by tag, never by id.
    pub tags: Vec<String>,
}

/// The external game entity, seen through its optional capabilities.
///
/// Mutated only by its own agent's decision core, on the scheduler's tick
/// thread (single-writer-per-entity rule).
pub trait Entity: Send {
    /// Current world position, if the entity is placed in space.
    fn position(&self) -> Option<Position> {
        None
    }

    /// Current health, if the entity has health.
    fn health(&self) -> Option<f64> {
        None
    }

    /// Maximum health, if the entity has health.
    fn max_health(&self) -> Option<f64> {
        None
    }

    /// Game level, used for threat scoring.
    fn level(&self) -> Option<u32> {
        None
    }

    /// Faction tag; agents sharing a faction are allies.
    fn faction(&self) -> Option<&str> {
        None
    }

    /// Importance tier, used for update-mode tiering.
    fn tier(&self) -> AgentTier {
        AgentTier::Normal
    }

    /// Archetype hint ("berserker", "scout", "leader") used once at
    /// registration to shade the generated personality.
    fn archetype(&self) -> Option<&str> {
        None
    }

    /// Raw attributes, read once at registration to seed personality.
    fn attributes(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }

    /// Skills this entity can use.
    fn skills(&self) -> Vec<SkillInfo> {
        Vec::new()
    }

    /// Whether a skill is currently usable (off cooldown, affordable).
    /// Resource accounting is the game's concern.
    fn skill_ready(&self, _skill_id: &str) -> bool {
        true
    }

    /// Tags of currently active effects ("debuff", "burning", ...).
    fn active_effect_tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Damage taken since the last full update, for the anger response.
    fn recent_damage(&self) -> f64 {
        0.0
    }

    /// Attack the given agent. The game resolves the target id.
    fn attack(&mut self, _target: AgentId) -> CapabilityOutcome {
        CapabilityOutcome::Unsupported
    }

    /// Use a skill with no explicit target.
    fn use_skill(&mut self, _skill_id: &str) -> CapabilityOutcome {
        CapabilityOutcome::Unsupported
    }

    /// Use a skill on a specific agent.
    fn use_skill_on(&mut self, _skill_id: &str, _target: AgentId) -> CapabilityOutcome {
        CapabilityOutcome::Unsupported
    }

    /// Move toward a position at the given speed for one `dt` slice.
    fn move_towards(&mut self, _pos: Position, _speed: f64, _dt: f64) -> CapabilityOutcome {
        CapabilityOutcome::Unsupported
    }

    /// Consume a healing item, if the entity carries any.
    fn use_healing_item(&mut self) -> CapabilityOutcome {
        CapabilityOutcome::Unsupported
    }
}

/// Health as a fraction of maximum, if the entity exposes both.
///
/// Returns `None` (not zero) when health data is absent, so callers treat
/// unknown health as healthy rather than dying.
#[must_use]
pub fn health_ratio(entity: &dyn Entity) -> Option<f64> {
    let health = entity.health()?;
    let max = entity.max_health()?;
    if max <= 0.0 {
        return None;
    }
    Some((health / max).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Featureless;
    impl Entity for Featureless {}

    struct Wounded;
    impl Entity for Wounded {
        fn health(&self) -> Option<f64> {
            Some(30.0)
        }
        fn max_health(&self) -> Option<f64> {
            Some(100.0)
        }
    }

    #[test]
    fn defaults_are_all_unsupported() {
        let mut entity = Featureless;
        assert_eq!(entity.position(), None);
        assert_eq!(entity.health(), None);
        assert!(!entity.attack(AgentId::new()).performed());
        assert!(!entity.use_healing_item().performed());
        assert!(entity.skills().is_empty());
        assert_eq!(health_ratio(&entity), None);
    }

    #[test]
    fn health_ratio_requires_both_fields() {
        let entity = Wounded;
        let ratio = health_ratio(&entity).expect("has health");
        assert!((ratio - 0.3).abs() < 1e-9);
    }
}
