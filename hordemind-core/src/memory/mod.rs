//! Generational memory — record types, similarity, and fusion.
//!
//! Memories are intensity-weighted experience records that outlive a
//! single play session. This module defines the record shapes and the
//! pure record-level operations (survival-value heuristics, similarity
//! scoring, pairwise fusion); [`store::MemoryStore`] owns the collection
//! and its lifecycle.

pub mod archive;
pub mod store;

pub use store::MemoryStore;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ClusterId, MemoryId};

/// Intensity multiplier applied when two similar records fuse.
pub const FUSION_REINFORCEMENT: f64 = 1.2;

/// Seconds within which two records count as "created close in time".
pub const FUSION_TIME_WINDOW_SECS: i64 = 3600;

// ---------------------------------------------------------------------------
// Record kinds and content
// ---------------------------------------------------------------------------

/// The eight kinds of experience the store retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// A fight and its outcome.
    CombatExperience,
    /// Observed enemy behavior worth countering.
    EnemyPatterns,
    /// What an item did when used.
    ItemUsage,
    /// A hazard encountered in the world.
    EnvironmentalHazard,
    /// A social exchange with another agent.
    SocialInteraction,
    /// A scarring event that biases toward caution.
    EmotionalTrauma,
    /// A change that paid off across generations.
    EvolutionarySuccess,
    /// A strategy that kept the agent alive.
    SurvivalStrategy,
}

impl MemoryKind {
    /// All kinds, for per-kind iteration (caps, statistics, clustering).
    pub const ALL: [Self; 8] = [
        Self::CombatExperience,
        Self::EnemyPatterns,
        Self::ItemUsage,
        Self::EnvironmentalHazard,
        Self::SocialInteraction,
        Self::EmotionalTrauma,
        Self::EvolutionarySuccess,
        Self::SurvivalStrategy,
    ];
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CombatExperience => "combat_experience",
            Self::EnemyPatterns => "enemy_patterns",
            Self::ItemUsage => "item_usage",
            Self::EnvironmentalHazard => "environmental_hazard",
            Self::SocialInteraction => "social_interaction",
            Self::EmotionalTrauma => "emotional_trauma",
            Self::EvolutionarySuccess => "evolutionary_success",
            Self::SurvivalStrategy => "survival_strategy",
        };
        f.write_str(name)
    }
}

/// One value in a record's structured content.
///
/// A tagged variant instead of a free-form map of mixed runtime types, so
/// fusion can combine values by explicit per-kind rules instead of type
/// inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentValue {
    /// A boolean fact ("victory", "near_death").
    Flag(bool),
    /// A numeric measurement ("threat", "damage_taken").
    Num(f64),
    /// A named reference ("enemy_kind", "successful_action").
    Text(String),
}

/// Structured content of a record: named facts about the experience.
pub type MemoryContent = BTreeMap<String, ContentValue>;

/// Look up a boolean fact; absent or non-flag keys read as `false`.
#[must_use]
pub fn content_flag(content: &MemoryContent, key: &str) -> bool {
    matches!(content.get(key), Some(ContentValue::Flag(true)))
}

/// Look up a numeric fact.
#[must_use]
pub fn content_num(content: &MemoryContent, key: &str) -> Option<f64> {
    match content.get(key) {
        Some(ContentValue::Num(n)) => Some(*n),
        _ => None,
    }
}

/// Look up a text fact.
#[must_use]
pub fn content_text<'a>(content: &'a MemoryContent, key: &str) -> Option<&'a str> {
    match content.get(key) {
        Some(ContentValue::Text(s)) => Some(s.as_str()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Records and clusters
// ---------------------------------------------------------------------------

/// One persisted experience record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier.
    pub id: MemoryId,
    /// What kind of experience this is.
    pub kind: MemoryKind,
    /// Structured facts about the experience.
    pub content: MemoryContent,
    /// How vivid the memory is, in [0, 1]. Drives eviction order and
    /// decision influence.
    pub intensity: f64,
    /// Generation the record was created (or last fused) in.
    pub generation: u32,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
    /// Wall-clock time of the last recall.
    pub last_accessed: DateTime<Utc>,
    /// How many times the record has been recalled.
    pub access_count: u32,
    /// How strongly the experience was felt, in [0, 1].
    pub emotional_impact: f64,
    /// Derived usefulness-for-survival score, in [0, 1].
    pub survival_value: f64,
}

impl MemoryRecord {
    /// Create a record at an explicit wall-clock time, computing its
    /// survival value from the kind-specific heuristics.
    #[must_use]
    pub fn new_at(
        kind: MemoryKind,
        content: MemoryContent,
        intensity: f64,
        emotional_impact: f64,
        generation: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let survival_value = survival_value(kind, &content);
        Self {
            id: MemoryId::new(),
            kind,
            content,
            intensity: intensity.clamp(0.0, 1.0),
            generation,
            created_at: now,
            last_accessed: now,
            access_count: 1,
            emotional_impact: emotional_impact.clamp(0.0, 1.0),
            survival_value,
        }
    }
}

/// A named cluster of same-kind records formed at generation turnover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCluster {
    /// Unique identifier.
    pub id: ClusterId,
    /// The kind shared by every member.
    pub theme: MemoryKind,
    /// Member record ids.
    pub members: Vec<MemoryId>,
    /// Mean member intensity.
    pub strength: f64,
    /// How far the cluster's influence reaches (scales with size).
    pub influence_radius: f64,
    /// Mean member emotional impact.
    pub emotional_resonance: f64,
}

// ---------------------------------------------------------------------------
// Survival value
// ---------------------------------------------------------------------------

/// Kind-specific heuristic for how useful a memory is for staying alive.
///
/// Combat memories are worth more when victorious, enemy patterns when
/// the enemy was boss-tier, trauma when the agent nearly died.
#[must_use]
pub fn survival_value(kind: MemoryKind, content: &MemoryContent) -> f64 {
    let mut value = match kind {
        MemoryKind::CombatExperience => {
            let mut v = 0.8;
            if content_flag(content, "victory") {
                v += 0.2;
            }
            if content_flag(content, "critical_situation") {
                v += 0.1;
            }
            v
        }
        MemoryKind::EnemyPatterns => {
            let mut v = 0.9;
            if content_text(content, "enemy_kind") == Some("boss") {
                v += 0.1;
            }
            v
        }
        MemoryKind::EmotionalTrauma => {
            let mut v = 0.7;
            if content_flag(content, "near_death") {
                v += 0.3;
            }
            v
        }
        _ => 0.5,
    };
    if value > 1.0 {
        value = 1.0;
    }
    value
}

// ---------------------------------------------------------------------------
// Similarity and fusion
// ---------------------------------------------------------------------------

/// Similarity of two records in [0, 1]:
/// kind match 0.3 + content-key overlap 0.4 + created-within-an-hour 0.3.
#[must_use]
pub fn similarity(a: &MemoryRecord, b: &MemoryRecord) -> f64 {
    let mut score = 0.0;

    if a.kind == b.kind {
        score += 0.3;
    }

    let common: Vec<&String> = a.content.keys().filter(|k| b.content.contains_key(*k)).collect();
    if !common.is_empty() {
        let matching = common
            .iter()
            .filter(|k| a.content.get(**k) == b.content.get(**k))
            .count();
        score += matching as f64 / common.len() as f64 * 0.4;
    }

    let gap = (a.created_at - b.created_at).num_seconds().abs();
    if gap < FUSION_TIME_WINDOW_SECS {
        score += 0.3;
    }

    score.min(1.0)
}

/// Fuse two similar records into one reinforced record.
///
/// Content keys present in both combine by value kind: flags OR, numbers
/// average, text keeps the stronger (higher-intensity) record's value.
/// Intensity becomes `min(1, 1.2 × max)`, emotional impact the mean,
/// access counts sum, survival value the max. The result replaces both
/// inputs in the store.
#[must_use]
pub fn fuse(a: &MemoryRecord, b: &MemoryRecord, generation: u32, now: DateTime<Utc>) -> MemoryRecord {
    let (stronger, weaker) = if a.intensity >= b.intensity { (a, b) } else { (b, a) };

    let mut content = MemoryContent::new();
    for (key, value) in &stronger.content {
        let merged = match (value, weaker.content.get(key)) {
            (ContentValue::Flag(x), Some(ContentValue::Flag(y))) => ContentValue::Flag(*x || *y),
            (ContentValue::Num(x), Some(ContentValue::Num(y))) => ContentValue::Num((x + y) / 2.0),
            // Mismatched kinds or text: the stronger record wins.
            (v, _) => v.clone(),
        };
        content.insert(key.clone(), merged);
    }
    for (key, value) in &weaker.content {
        content.entry(key.clone()).or_insert_with(|| value.clone());
    }

    MemoryRecord {
        id: MemoryId::new(),
        kind: stronger.kind,
        content,
        intensity: (a.intensity.max(b.intensity) * FUSION_REINFORCEMENT).min(1.0),
        generation,
        created_at: now,
        last_accessed: now,
        access_count: a.access_count + b.access_count,
        emotional_impact: (a.emotional_impact + b.emotional_impact) / 2.0,
        survival_value: a.survival_value.max(b.survival_value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: MemoryKind, content: MemoryContent, intensity: f64) -> MemoryRecord {
        MemoryRecord::new_at(kind, content, intensity, 0.5, 1, Utc::now())
    }

    fn combat_content(victory: bool) -> MemoryContent {
        let mut content = MemoryContent::new();
        content.insert("victory".into(), ContentValue::Flag(victory));
        content.insert("enemy_kind".into(), ContentValue::Text("goblin".into()));
        content
    }

    #[test]
    fn survival_value_rewards_victory() {
        let won = survival_value(MemoryKind::CombatExperience, &combat_content(true));
        let lost = survival_value(MemoryKind::CombatExperience, &combat_content(false));
        assert!(won > lost);
        assert!(won <= 1.0);
    }

    #[test]
    fn survival_value_rewards_boss_patterns() {
        let mut content = MemoryContent::new();
        content.insert("enemy_kind".into(), ContentValue::Text("boss".into()));
        let boss = survival_value(MemoryKind::EnemyPatterns, &content);
        assert!((boss - 1.0).abs() < 1e-9);
    }

    #[test]
    fn survival_value_rewards_near_death_trauma() {
        let mut content = MemoryContent::new();
        content.insert("near_death".into(), ContentValue::Flag(true));
        let trauma = survival_value(MemoryKind::EmotionalTrauma, &content);
        assert!((trauma - 1.0).abs() < 1e-9);
    }

    #[test]
    fn identical_records_are_highly_similar() {
        let a = record(MemoryKind::CombatExperience, combat_content(true), 0.7);
        let b = record(MemoryKind::CombatExperience, combat_content(true), 0.5);
        assert!(similarity(&a, &b) > 0.8);
    }

    #[test]
    fn different_kinds_score_lower() {
        let a = record(MemoryKind::CombatExperience, combat_content(true), 0.7);
        let b = record(MemoryKind::ItemUsage, combat_content(true), 0.7);
        assert!(similarity(&a, &b) < similarity(&a, &a.clone()));
    }

    #[test]
    fn fusion_reinforces_intensity() {
        let a = record(MemoryKind::CombatExperience, combat_content(true), 0.6);
        let b = record(MemoryKind::CombatExperience, combat_content(true), 0.5);
        let fused = fuse(&a, &b, 2, Utc::now());
        assert!((fused.intensity - 0.72).abs() < 1e-9); // 0.6 × 1.2
        assert_eq!(fused.access_count, a.access_count + b.access_count);
        assert_eq!(fused.generation, 2);
    }

    #[test]
    fn fusion_is_commutative_in_outcome() {
        let a = record(MemoryKind::CombatExperience, combat_content(true), 0.9);
        let b = record(MemoryKind::CombatExperience, combat_content(false), 0.4);
        let now = Utc::now();
        let ab = fuse(&a, &b, 1, now);
        let ba = fuse(&b, &a, 1, now);
        assert!((ab.intensity - ba.intensity).abs() < 1e-9);
        assert!((ab.emotional_impact - ba.emotional_impact).abs() < 1e-9);
        assert_eq!(ab.access_count, ba.access_count);
        assert_eq!(ab.content, ba.content);
    }

    #[test]
    fn fusion_caps_intensity_at_one() {
        let a = record(MemoryKind::CombatExperience, combat_content(true), 0.95);
        let b = record(MemoryKind::CombatExperience, combat_content(true), 0.95);
        let fused = fuse(&a, &b, 1, Utc::now());
        assert!(fused.intensity <= 1.0);
    }

    #[test]
    fn fusion_merges_flags_with_or() {
        let a = record(MemoryKind::CombatExperience, combat_content(true), 0.6);
        let b = record(MemoryKind::CombatExperience, combat_content(false), 0.5);
        let fused = fuse(&a, &b, 1, Utc::now());
        assert!(content_flag(&fused.content, "victory"));
    }
}
