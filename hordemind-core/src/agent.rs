//! Per-agent runtime state: behavior states, priorities, personality,
//! and the emotional signal block recomputed on every full update.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::DecisionConfig;
use crate::memory::MemoryContent;
use crate::types::SimTime;
use crate::weights::Action;

// ---------------------------------------------------------------------------
// Behavior state machine
// ---------------------------------------------------------------------------

/// Behavior state of an agent. `Idle` is initial; no state is terminal —
/// agents persist until unregistered, and every state settles back to
/// `Idle` once threat and opportunity both subside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Nothing to do; default drift leads to exploring.
    #[default]
    Idle,
    /// Wandering (or walking the patrol circuit).
    Exploring,
    /// Closing distance to an out-of-range target.
    Chasing,
    /// Engaging a target in range.
    Attacking,
    /// Withdrawing from danger.
    Retreating,
    /// Restoring own health.
    Healing,
    /// Aiding a wounded ally.
    Supporting,
    /// Holding a group-coordinated position; entered only via group orders.
    Formation,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Exploring => "exploring",
            Self::Chasing => "chasing",
            Self::Attacking => "attacking",
            Self::Retreating => "retreating",
            Self::Healing => "healing",
            Self::Supporting => "supporting",
            Self::Formation => "formation",
        };
        f.write_str(name)
    }
}

/// Scheduling priority. Ordered so that sorting ascending puts Critical
/// first — the candidate-selection order the scheduler relies on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Life-or-death actions (healing, escape).
    Critical,
    /// Combat and protection.
    High,
    /// Exploration and patrol.
    #[default]
    Medium,
    /// Rest and idle social behavior.
    Low,
}

/// Derive priority from the assessed threat and opportunity levels.
#[must_use]
pub fn derive_priority(threat: f64, opportunity: f64, config: &DecisionConfig) -> Priority {
    if threat > config.critical_threat {
        Priority::Critical
    } else if threat > config.high_threat || opportunity > config.high_opportunity {
        Priority::High
    } else {
        Priority::Medium
    }
}

// ---------------------------------------------------------------------------
// Personality
// ---------------------------------------------------------------------------

/// Stable scalar traits in [0, 1], generated once at registration from
/// entity attributes and nudged slowly by reinforcement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Personality {
    /// Willingness to engage (0 = passive, 1 = relentless).
    pub aggression: f64,
    /// Tendency to avoid risk (0 = reckless, 1 = timid).
    pub caution: f64,
    /// Quality of target selection and planning.
    pub intelligence: f64,
    /// Attachment to the group.
    pub loyalty: f64,
    /// Drive to explore.
    pub curiosity: f64,
    /// Speed of behavioral adjustment.
    pub adaptability: f64,
    /// Fitness to lead a group.
    pub leadership: f64,
    /// Willingness to follow group orders.
    pub teamwork: f64,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            aggression: 0.5,
            caution: 0.5,
            intelligence: 0.5,
            loyalty: 0.7,
            curiosity: 0.5,
            adaptability: 0.5,
            leadership: 0.3,
            teamwork: 0.6,
        }
    }
}

impl Personality {
    /// Seed a personality from entity attributes and an optional
    /// archetype hint.
    ///
    /// Strength drives aggression, intelligence drives intelligence,
    /// dexterity inversely drives caution (nimble agents need less of
    /// it); attributes are interpreted on the conventional ~20-point
    /// scale. Archetypes shade the result: berserkers trade caution for
    /// aggression, scouts gain caution and curiosity, leaders gain
    /// leadership and teamwork.
    #[must_use]
    pub fn from_attributes(attributes: &BTreeMap<String, f64>, archetype: Option<&str>) -> Self {
        let mut personality = Self::default();

        if let Some(&strength) = attributes.get("strength") {
            personality.aggression = (strength / 20.0).clamp(0.1, 0.9);
        }
        if let Some(&intelligence) = attributes.get("intelligence") {
            personality.intelligence = (intelligence / 20.0).clamp(0.2, 1.0);
        }
        if let Some(&dexterity) = attributes.get("dexterity") {
            personality.caution = (1.0 - dexterity / 20.0).clamp(0.1, 0.9);
        }

        match archetype {
            Some("berserker") => {
                personality.aggression = (personality.aggression + 0.3).min(0.95);
                personality.caution = (personality.caution - 0.2).max(0.05);
            }
            Some("scout") => {
                personality.caution = (personality.caution + 0.2).min(0.9);
                personality.curiosity = (personality.curiosity + 0.3).min(0.9);
            }
            Some("leader") => {
                personality.leadership = (personality.leadership + 0.4).min(0.9);
                personality.teamwork = (personality.teamwork + 0.3).min(0.9);
            }
            _ => {}
        }

        personality
    }

    /// Nudge traits toward an outcome: successful attacks raise
    /// aggression, successful defense raises caution; failures lower
    /// them. Bounded to avoid trait saturation.
    pub fn reinforce(&mut self, action: Action, success: bool, config: &DecisionConfig) {
        let step = if success {
            config.reinforcement_step
        } else {
            -config.reinforcement_step
        };
        let bound = |v: f64| v.clamp(config.trait_floor, config.trait_ceiling);
        match action {
            Action::Attack | Action::Charge => self.aggression = bound(self.aggression + step),
            Action::Defend | Action::Hide => self.caution = bound(self.caution + step),
            _ => {}
        }
    }

    /// Shift toward self-preservation under sustained low health.
    pub fn adapt_to_low_health(&mut self, config: &DecisionConfig) {
        self.caution = (self.caution + 0.1).min(config.trait_ceiling);
        self.aggression = (self.aggression - 0.1).max(config.trait_floor);
    }
}

// ---------------------------------------------------------------------------
// Emotion signals
// ---------------------------------------------------------------------------

/// The per-agent emotional readout, recomputed on every full update as a
/// pure function of health ratio, threat, opportunity, and recent damage
/// — no hidden history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EmotionSignals {
    /// Belief in own capability; tracks health.
    pub confidence: f64,
    /// Tracks the assessed threat level.
    pub fear: f64,
    /// Aggression amplified by recent damage.
    pub anger: f64,
    /// Tracks the assessed opportunity level.
    pub excitement: f64,
    /// Mean of fear and anger.
    pub stress: f64,
    /// Inverse of stress.
    pub morale: f64,
}

impl Default for EmotionSignals {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            fear: 0.0,
            anger: 0.0,
            excitement: 0.0,
            stress: 0.0,
            morale: 0.7,
        }
    }
}

impl EmotionSignals {
    /// Recompute all signals from the current one-step values.
    pub fn update(
        &mut self,
        health_ratio: Option<f64>,
        threat: f64,
        opportunity: f64,
        aggression: f64,
        recent_damage: f64,
        config: &DecisionConfig,
    ) {
        if let Some(ratio) = health_ratio {
            self.confidence = (ratio * 0.8 + 0.2).clamp(0.0, 1.0);
        }
        self.fear = (threat * 0.8).clamp(0.0, 1.0);
        let damage_factor = (recent_damage / config.damage_saturation).min(1.0);
        self.anger = (aggression * damage_factor).clamp(0.0, 1.0);
        self.excitement = (opportunity * 0.8).clamp(0.0, 1.0);
        self.stress = ((self.fear + self.anger) * 0.5).clamp(0.0, 1.0);
        self.morale = (1.0 - self.stress).max(0.0);
    }

    /// Aggregate intensity used as the emotional-state coordinate when
    /// scoring memory relevance.
    #[must_use]
    pub fn aggregate_intensity(&self) -> f64 {
        ((self.fear + self.anger + self.stress) / 3.0).clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Outcomes and telemetry
// ---------------------------------------------------------------------------

/// One executed action and how it went, kept in the agent's bounded
/// outcome ring.
#[derive(Debug, Clone)]
pub struct OutcomeRecord {
    /// The action dispatched.
    pub action: Action,
    /// Whether the entity actually performed it.
    pub success: bool,
    /// When it was dispatched.
    pub at: SimTime,
    /// Structured details, in memory-content form.
    pub details: MemoryContent,
}

/// Snapshot of an agent's decision state for UI/telemetry consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSummary {
    /// Current behavior state.
    pub state: AgentState,
    /// Current scheduling priority.
    pub priority: Priority,
    /// Last-assessed threat level.
    pub threat: f64,
    /// Last-assessed opportunity level.
    pub opportunity: f64,
    /// Confidence signal.
    pub confidence: f64,
    /// Fear signal.
    pub fear: f64,
    /// Anger signal.
    pub anger: f64,
    /// Stress signal.
    pub stress: f64,
    /// Morale signal.
    pub morale: f64,
    /// Aggression trait.
    pub aggression: f64,
    /// Caution trait.
    pub caution: f64,
    /// Intelligence trait.
    pub intelligence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_thresholds_match_documentation() {
        let config = DecisionConfig::default();
        assert_eq!(derive_priority(0.85, 0.0, &config), Priority::Critical);
        assert_eq!(derive_priority(0.6, 0.0, &config), Priority::High);
        assert_eq!(derive_priority(0.2, 0.8, &config), Priority::High);
        assert_eq!(derive_priority(0.2, 0.2, &config), Priority::Medium);
        // Boundaries are strict.
        assert_eq!(derive_priority(0.8, 0.0, &config), Priority::High);
        assert_eq!(derive_priority(0.5, 0.0, &config), Priority::Medium);
    }

    #[test]
    fn priority_sorts_critical_first() {
        let mut priorities = vec![Priority::Low, Priority::Critical, Priority::Medium, Priority::High];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn personality_seeded_from_attributes() {
        let mut attributes = BTreeMap::new();
        attributes.insert("strength".to_string(), 18.0);
        attributes.insert("intelligence".to_string(), 6.0);
        attributes.insert("dexterity".to_string(), 16.0);

        let personality = Personality::from_attributes(&attributes, None);
        assert!((personality.aggression - 0.9).abs() < 1e-9);
        assert!((personality.intelligence - 0.3).abs() < 1e-9);
        assert!((personality.caution - 0.2).abs() < 1e-9);
    }

    #[test]
    fn berserker_archetype_shades_personality() {
        let base = Personality::from_attributes(&BTreeMap::new(), None);
        let berserker = Personality::from_attributes(&BTreeMap::new(), Some("berserker"));
        assert!(berserker.aggression > base.aggression);
        assert!(berserker.caution < base.caution);
    }

    #[test]
    fn reinforcement_stays_bounded() {
        let config = DecisionConfig::default();
        let mut personality = Personality::default();
        for _ in 0..100 {
            personality.reinforce(Action::Attack, true, &config);
        }
        assert!(personality.aggression <= config.trait_ceiling);
        for _ in 0..200 {
            personality.reinforce(Action::Attack, false, &config);
        }
        assert!(personality.aggression >= config.trait_floor);
    }

    #[test]
    fn emotions_are_pure_functions_of_inputs() {
        let config = DecisionConfig::default();
        let mut a = EmotionSignals::default();
        let mut b = EmotionSignals::default();
        a.update(Some(0.4), 0.6, 0.3, 0.7, 25.0, &config);
        b.update(Some(0.4), 0.6, 0.3, 0.7, 25.0, &config);
        assert!((a.fear - b.fear).abs() < 1e-12);
        assert!((a.morale - b.morale).abs() < 1e-12);

        assert!((a.fear - 0.48).abs() < 1e-9);
        assert!((a.anger - 0.35).abs() < 1e-9);
        assert!((a.stress - (0.48 + 0.35) * 0.5).abs() < 1e-9);
        assert!((a.morale - (1.0 - a.stress)).abs() < 1e-9);
    }

    #[test]
    fn missing_health_leaves_confidence_untouched() {
        let config = DecisionConfig::default();
        let mut signals = EmotionSignals::default();
        let before = signals.confidence;
        signals.update(None, 0.0, 0.0, 0.5, 0.0, &config);
        assert!((signals.confidence - before).abs() < 1e-12);
    }
}
