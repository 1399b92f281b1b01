//! The emotional influence layer.
//!
//! Game events fire triggers; triggers raise emotions; emotions become
//! decaying [`EmotionalModifier`]s that reweight candidate actions until
//! they expire. On top of the per-modifier effects, each agent carries an
//! aggregate mood (stability, momentum, trauma) whose thresholds amplify
//! whole action families.
//!
//! The trigger table and the emotion→influence matrix are fixed data:
//! behavior tuning happens through the intensities the game passes in,
//! not by editing the tables.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmotionConfig;
use crate::memory::{ContentValue, MemoryContent, MemoryKind, MemoryStore};
use crate::types::{AgentId, SimTime};
use crate::weights::{self, Action, WeightMap};

// ---------------------------------------------------------------------------
// Emotions, influences, triggers
// ---------------------------------------------------------------------------

/// An emotion an agent can feel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionCode {
    /// Dread of harm.
    Fear,
    /// Violent anger.
    Rage,
    /// Confidence in others.
    Trust,
    /// Pull toward the unknown.
    Curiosity,
    /// Settled composure.
    Calmness,
    /// Eager arousal.
    Excitement,
    /// Delight.
    Joy,
    /// Dejection.
    Sadness,
    /// Revulsion.
    Disgust,
}

impl EmotionCode {
    /// Emotions that erode stability and can scar.
    #[must_use]
    pub fn is_negative(self) -> bool {
        matches!(self, Self::Fear | Self::Rage | Self::Sadness | Self::Disgust)
    }
}

/// How an emotion expresses itself in action selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfluenceKind {
    /// Drive to engage and overwhelm.
    CombatAggression,
    /// Drive to guard and withdraw.
    DefensiveCaution,
    /// Drive to roam and inspect.
    ExplorationCuriosity,
    /// Drive to cooperate.
    SocialTrust,
    /// Drive to escape at any cost.
    SurvivalFear,
    /// Drive to act and advance.
    EvolutionaryDrive,
    /// Drive to wait for the right moment.
    TacticalPatience,
    /// Drive to try something different.
    CreativeAdaptation,
}

/// An event class that can move an agent emotionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Survived at the brink of death.
    NearDeath,
    /// Won a fight.
    Victory,
    /// Lost a fight.
    Defeat,
    /// Found something notable.
    Discovery,
    /// Was betrayed by a trusted party.
    Betrayal,
    /// Advanced to a stronger form.
    Evolution,
    /// Was caught in an environmental hazard.
    EnvironmentalHazard,
    /// A social exchange went well.
    SocialSuccess,
}

/// Fixed description of how a trigger translates into emotion.
#[derive(Debug, Clone, Copy)]
pub struct TriggerSpec {
    /// The emotion raised.
    pub emotion: EmotionCode,
    /// Intensity before context scaling.
    pub base_intensity: f64,
    /// Context keys that scale the intensity when present.
    pub context_factors: &'static [&'static str],
}

/// The fixed trigger table.
#[must_use]
pub fn trigger_spec(kind: TriggerKind) -> TriggerSpec {
    match kind {
        TriggerKind::NearDeath => TriggerSpec {
            emotion: EmotionCode::Fear,
            base_intensity: 0.8,
            context_factors: &["health_percent", "enemy_strength"],
        },
        TriggerKind::Victory => TriggerSpec {
            emotion: EmotionCode::Excitement,
            base_intensity: 0.6,
            context_factors: &["enemy_difficulty", "battle_duration"],
        },
        TriggerKind::Defeat => TriggerSpec {
            emotion: EmotionCode::Sadness,
            base_intensity: 0.7,
            context_factors: &["progress_lost", "time_invested"],
        },
        TriggerKind::Discovery => TriggerSpec {
            emotion: EmotionCode::Curiosity,
            base_intensity: 0.5,
            context_factors: &["item_rarity", "location_danger"],
        },
        TriggerKind::Betrayal => TriggerSpec {
            emotion: EmotionCode::Disgust,
            base_intensity: 0.9,
            context_factors: &["trust_level", "relationship_duration"],
        },
        TriggerKind::Evolution => TriggerSpec {
            emotion: EmotionCode::Joy,
            base_intensity: 0.8,
            context_factors: &["evolution_stage", "genes_unlocked"],
        },
        TriggerKind::EnvironmentalHazard => TriggerSpec {
            emotion: EmotionCode::Fear,
            base_intensity: 0.6,
            context_factors: &["hazard_damage", "escape_difficulty"],
        },
        TriggerKind::SocialSuccess => TriggerSpec {
            emotion: EmotionCode::Trust,
            base_intensity: 0.5,
            context_factors: &["interaction_quality", "relationship_gain"],
        },
    }
}

/// The emotion→influence matrix. Rows exist for the six emotions that
/// shape action selection; triggers raising other emotions still move
/// the mood but spawn no modifier.
#[must_use]
pub fn influence_row(emotion: EmotionCode) -> Option<&'static [(InfluenceKind, f64); 8]> {
    use InfluenceKind as I;
    match emotion {
        EmotionCode::Fear => Some(&[
            (I::CombatAggression, -0.5),
            (I::DefensiveCaution, 0.8),
            (I::ExplorationCuriosity, -0.3),
            (I::SocialTrust, -0.4),
            (I::SurvivalFear, 0.9),
            (I::EvolutionaryDrive, -0.2),
            (I::TacticalPatience, 0.6),
            (I::CreativeAdaptation, -0.1),
        ]),
        EmotionCode::Rage => Some(&[
            (I::CombatAggression, 0.9),
            (I::DefensiveCaution, -0.6),
            (I::ExplorationCuriosity, -0.2),
            (I::SocialTrust, -0.8),
            (I::SurvivalFear, -0.3),
            (I::EvolutionaryDrive, 0.7),
            (I::TacticalPatience, -0.5),
            (I::CreativeAdaptation, 0.3),
        ]),
        EmotionCode::Trust => Some(&[
            (I::CombatAggression, -0.2),
            (I::DefensiveCaution, -0.3),
            (I::ExplorationCuriosity, 0.4),
            (I::SocialTrust, 0.8),
            (I::SurvivalFear, -0.1),
            (I::EvolutionaryDrive, 0.2),
            (I::TacticalPatience, 0.5),
            (I::CreativeAdaptation, 0.6),
        ]),
        EmotionCode::Curiosity => Some(&[
            (I::CombatAggression, 0.1),
            (I::DefensiveCaution, -0.2),
            (I::ExplorationCuriosity, 0.9),
            (I::SocialTrust, 0.3),
            (I::SurvivalFear, -0.1),
            (I::EvolutionaryDrive, 0.6),
            (I::TacticalPatience, 0.4),
            (I::CreativeAdaptation, 0.8),
        ]),
        EmotionCode::Calmness => Some(&[
            (I::CombatAggression, -0.3),
            (I::DefensiveCaution, 0.4),
            (I::ExplorationCuriosity, 0.2),
            (I::SocialTrust, 0.5),
            (I::SurvivalFear, -0.2),
            (I::EvolutionaryDrive, 0.1),
            (I::TacticalPatience, 0.8),
            (I::CreativeAdaptation, 0.3),
        ]),
        EmotionCode::Excitement => Some(&[
            (I::CombatAggression, 0.6),
            (I::DefensiveCaution, -0.4),
            (I::ExplorationCuriosity, 0.7),
            (I::SocialTrust, 0.2),
            (I::SurvivalFear, -0.3),
            (I::EvolutionaryDrive, 0.8),
            (I::TacticalPatience, -0.2),
            (I::CreativeAdaptation, 0.5),
        ]),
        EmotionCode::Joy | EmotionCode::Sadness | EmotionCode::Disgust => None,
    }
}

/// Actions an influence kind pushes on.
#[must_use]
pub fn influence_targets(kind: InfluenceKind) -> &'static [Action] {
    match kind {
        InfluenceKind::CombatAggression => &[Action::Attack, Action::Charge],
        InfluenceKind::DefensiveCaution => {
            &[Action::Defend, Action::Retreat, Action::Hide, Action::Observe]
        }
        InfluenceKind::ExplorationCuriosity => &[Action::Explore, Action::Patrol, Action::Observe],
        InfluenceKind::SocialTrust => &[Action::Support],
        InfluenceKind::SurvivalFear => &[Action::Flee, Action::Hide, Action::Defend],
        InfluenceKind::EvolutionaryDrive => &[Action::Explore, Action::Charge],
        InfluenceKind::TacticalPatience => &[Action::Wait, Action::Observe, Action::Defend],
        InfluenceKind::CreativeAdaptation => &[Action::Explore, Action::Observe],
    }
}

// ---------------------------------------------------------------------------
// Modifiers
// ---------------------------------------------------------------------------

/// A transient emotional bias on action selection.
///
/// Created by a trigger, read on every decision, discarded once expired.
/// Strength decays exponentially so that roughly the configured residual
/// fraction remains at expiry.
#[derive(Debug, Clone)]
pub struct EmotionalModifier {
    /// The emotion behind the modifier.
    pub emotion: EmotionCode,
    /// Its dominant influence classification.
    pub influence: InfluenceKind,
    /// Initial strength (trigger intensity), in [0, 1].
    pub strength: f64,
    /// When the modifier was created.
    pub created: SimTime,
    /// Absolute expiry time.
    pub expires_at: SimTime,
    /// Exponential decay constant, per second.
    pub decay_rate: f64,
    /// Actions this modifier pushes on.
    pub targets: &'static [Action],
    /// Added per unit of current strength.
    pub boost: f64,
    /// Subtracted per unit of current strength.
    pub penalty: f64,
}

impl EmotionalModifier {
    /// Whether the modifier still applies at `now`. The expiry instant
    /// itself is still active (strength is the residual there).
    #[must_use]
    pub fn is_active(&self, now: SimTime) -> bool {
        now.0 <= self.expires_at.0
    }

    /// Strength at `now`: `strength × exp(-decay_rate × elapsed)`, zero
    /// once expired.
    #[must_use]
    pub fn current_strength(&self, now: SimTime) -> f64 {
        if !self.is_active(now) {
            return 0.0;
        }
        self.strength * (-self.decay_rate * now.since(self.created)).exp()
    }
}

// ---------------------------------------------------------------------------
// Mood
// ---------------------------------------------------------------------------

/// Aggregate emotional condition of one agent.
#[derive(Debug, Clone)]
pub struct AgentMood {
    /// Emotions felt recently, newest last (bounded).
    pub recent_emotions: VecDeque<EmotionCode>,
    /// Resistance to being shaken, in [0, 1].
    pub stability: f64,
    /// Strongest influence currently acting, if any.
    pub dominant: Option<InfluenceKind>,
    /// Carry-over arousal from recent triggers, in [0, 1].
    pub momentum: f64,
    /// Accumulated scarring from intense fear, in [0, 1].
    pub trauma: f64,
    /// When the mood last changed.
    pub last_change: SimTime,
}

impl AgentMood {
    fn new(now: SimTime) -> Self {
        Self {
            recent_emotions: VecDeque::new(),
            stability: 0.8,
            dominant: None,
            momentum: 0.0,
            trauma: 0.0,
            last_change: now,
        }
    }

    /// Stability net of trauma, in [0, 1].
    #[must_use]
    pub fn balance(&self) -> f64 {
        (self.stability - self.trauma).clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// The layer
// ---------------------------------------------------------------------------

/// Tracks every agent's active modifiers and mood, and converts them into
/// action-weight vectors on demand.
#[derive(Debug)]
pub struct EmotionalInfluenceLayer {
    config: EmotionConfig,
    modifiers: HashMap<AgentId, Vec<EmotionalModifier>>,
    moods: HashMap<AgentId, AgentMood>,
}

impl EmotionalInfluenceLayer {
    /// Create an empty layer.
    #[must_use]
    pub fn new(config: EmotionConfig) -> Self {
        Self {
            config,
            modifiers: HashMap::new(),
            moods: HashMap::new(),
        }
    }

    /// Fire a trigger for an agent.
    ///
    /// Context factors scale the base intensity multiplicatively, each
    /// normalized to `clamp(value / 100, 0.5, 1.5)`. Significant negative
    /// triggers are also written to generational memory as trauma, which
    /// is how a scare today biases decisions next session.
    pub fn process_trigger(
        &mut self,
        agent: AgentId,
        trigger: TriggerKind,
        factors: &BTreeMap<String, f64>,
        now: SimTime,
        memory: &mut MemoryStore,
    ) {
        let spec = trigger_spec(trigger);
        let intensity = trigger_intensity(&spec, factors);
        if intensity <= f64::EPSILON {
            return;
        }

        if let Some(modifier) = self.build_modifier(spec.emotion, intensity, now) {
            self.update_mood(agent, spec.emotion, intensity, Some(modifier.influence), now);
            self.modifiers.entry(agent).or_default().push(modifier);
        } else {
            self.update_mood(agent, spec.emotion, intensity, None, now);
        }

        if spec.emotion.is_negative() && intensity >= self.config.trauma_record_threshold {
            let mut content = MemoryContent::new();
            content.insert(
                "trigger".into(),
                ContentValue::Text(format!("{trigger:?}").to_lowercase()),
            );
            content.insert("agent".into(), ContentValue::Text(agent.to_string()));
            for (key, value) in factors {
                content.insert(key.clone(), ContentValue::Num(*value));
            }
            if trigger == TriggerKind::NearDeath {
                content.insert("near_death".into(), ContentValue::Flag(true));
            }
            memory.add_memory(MemoryKind::EmotionalTrauma, content, intensity, intensity);
        }

        debug!(agent = %agent, ?trigger, intensity, "emotional trigger processed");
    }

    fn build_modifier(
        &self,
        emotion: EmotionCode,
        intensity: f64,
        now: SimTime,
    ) -> Option<EmotionalModifier> {
        let row = influence_row(emotion)?;
        let &(influence, value) = row
            .iter()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))?;

        let duration = self.config.base_duration * intensity;
        if duration <= f64::EPSILON {
            return None;
        }
        // Strength reaches the configured residual fraction exactly at expiry.
        let decay_rate = (1.0 / self.config.residual_strength.max(1e-6)).ln() / duration;

        Some(EmotionalModifier {
            emotion,
            influence,
            strength: intensity,
            created: now,
            expires_at: now.plus(duration),
            decay_rate,
            targets: influence_targets(influence),
            boost: value.max(0.0),
            penalty: (-value).max(0.0),
        })
    }

    fn update_mood(
        &mut self,
        agent: AgentId,
        emotion: EmotionCode,
        intensity: f64,
        influence: Option<InfluenceKind>,
        now: SimTime,
    ) {
        let mood = self.moods.entry(agent).or_insert_with(|| AgentMood::new(now));

        if !mood.recent_emotions.contains(&emotion) {
            mood.recent_emotions.push_back(emotion);
        }
        while mood.recent_emotions.len() > self.config.max_tracked_emotions {
            mood.recent_emotions.pop_front();
        }

        match emotion {
            EmotionCode::Fear | EmotionCode::Rage | EmotionCode::Disgust => {
                mood.stability = (mood.stability - intensity * 0.1).max(0.0);
            }
            EmotionCode::Calmness | EmotionCode::Trust | EmotionCode::Joy => {
                mood.stability = (mood.stability + intensity * 0.05).min(1.0);
            }
            _ => {}
        }

        if emotion == EmotionCode::Fear && intensity > 0.7 {
            mood.trauma = (mood.trauma + intensity * 0.2).min(1.0);
        }

        mood.momentum = (mood.momentum + intensity) / 2.0;
        if influence.is_some() {
            mood.dominant = influence;
        }
        mood.last_change = now;
    }

    /// The emotional weight vector over the candidate actions.
    ///
    /// Starts uniform, applies every still-active modifier's boosts and
    /// penalties at its current (decayed) strength, then applies the
    /// mood-level aggregate effects, and renormalizes to sum to 1.
    #[must_use]
    pub fn influenced_actions(
        &self,
        agent: AgentId,
        actions: &[Action],
        now: SimTime,
    ) -> WeightMap {
        let mut action_weights = weights::uniform(actions);

        if let Some(modifiers) = self.modifiers.get(&agent) {
            for modifier in modifiers {
                let strength = modifier.current_strength(now);
                if strength <= 0.0 {
                    continue;
                }
                for action in modifier.targets {
                    if let Some(w) = action_weights.get_mut(action) {
                        *w += strength * modifier.boost;
                        *w -= strength * modifier.penalty;
                    }
                }
            }
        }

        if let Some(mood) = self.moods.get(&agent) {
            self.apply_mood(mood, &mut action_weights);
        }

        weights::normalize(&mut action_weights);
        action_weights
    }

    fn apply_mood(&self, mood: &AgentMood, action_weights: &mut WeightMap) {
        if mood.stability < self.config.low_stability {
            scale(action_weights, Action::Defend, 1.5);
            scale(action_weights, Action::Retreat, 1.3);
        } else if mood.stability > self.config.high_stability {
            scale(action_weights, Action::Attack, 1.2);
            scale(action_weights, Action::Explore, 1.3);
        }

        if mood.momentum > self.config.momentum_threshold {
            for action in [Action::Attack, Action::Charge, Action::Explore] {
                scale(action_weights, action, 1.4);
            }
        }

        if mood.trauma > self.config.trauma_threshold {
            for action in [Action::Flee, Action::Hide, Action::Defend] {
                scale(action_weights, action, 1.6);
            }
            for action in [Action::Attack, Action::Charge] {
                scale(action_weights, action, 0.7);
            }
        }
    }

    /// Drop every modifier past its expiry.
    pub fn cleanup_expired(&mut self, now: SimTime) {
        for modifiers in self.modifiers.values_mut() {
            modifiers.retain(|m| m.is_active(now));
        }
        self.modifiers.retain(|_, v| !v.is_empty());
    }

    /// Forget an agent entirely (unregistration).
    pub fn remove_agent(&mut self, agent: AgentId) {
        self.modifiers.remove(&agent);
        self.moods.remove(&agent);
    }

    /// The agent's current mood, if any trigger has ever touched it.
    #[must_use]
    pub fn mood(&self, agent: AgentId) -> Option<&AgentMood> {
        self.moods.get(&agent)
    }

    /// Number of active modifiers for an agent at `now`.
    #[must_use]
    pub fn active_modifier_count(&self, agent: AgentId, now: SimTime) -> usize {
        self.modifiers
            .get(&agent)
            .map_or(0, |v| v.iter().filter(|m| m.is_active(now)).count())
    }
}

/// Trigger intensity after context scaling, clamped to [0, 1].
fn trigger_intensity(spec: &TriggerSpec, factors: &BTreeMap<String, f64>) -> f64 {
    let mut multiplier = 1.0;
    for factor in spec.context_factors {
        if let Some(value) = factors.get(*factor) {
            multiplier *= (value / 100.0).clamp(0.5, 1.5);
        }
    }
    (spec.base_intensity * multiplier).clamp(0.0, 1.0)
}

fn scale(action_weights: &mut WeightMap, action: Action, factor: f64) {
    if let Some(w) = action_weights.get_mut(&action) {
        *w *= factor;
    }
}
