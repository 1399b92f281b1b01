//! Engine configuration, loadable from TOML.
//!
//! Every tuning constant the engine relies on — fusion split, priority
//! cutoffs, similarity threshold, radii, intervals, caps — lives here as
//! an explicit field with a serde default, so a game can override any of
//! them from a config file without touching code.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiConfig {
    /// Fleet scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Per-agent decision core settings.
    #[serde(default)]
    pub decision: DecisionConfig,
    /// Emotional influence settings.
    #[serde(default)]
    pub emotion: EmotionConfig,
    /// Generational memory settings.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Memory persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl AiConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `AiError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::AiError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fleet-wide scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Hard cap on agents updated per tick (the backpressure mechanism).
    #[serde(default = "default_max_active")]
    pub max_active_entities: usize,
    /// Spatial grid cell size in world units.
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,
    /// Seconds a group message stays queued before it is dropped.
    #[serde(default = "default_message_ttl")]
    pub group_message_ttl: f64,
    /// Sim-seconds between periodic performance log lines.
    #[serde(default = "default_stats_interval")]
    pub stats_log_interval: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_active_entities: 100,
            cell_size: 100.0,
            group_message_ttl: 5.0,
            stats_log_interval: 5.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision core
// ---------------------------------------------------------------------------

/// Relative weights of the three fused decision sources.
///
/// The split is a tunable heuristic, not a law; the defaults reproduce
/// the engine's documented behavior. Weights are normalized before use,
/// so they need not sum to exactly 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionWeights {
    /// Weight of the external tactical advisor's vector.
    #[serde(default = "default_tactical_weight")]
    pub tactical: f64,
    /// Weight of the emotional influence vector.
    #[serde(default = "default_emotional_weight")]
    pub emotional: f64,
    /// Weight of the generational-memory influence vector.
    #[serde(default = "default_memory_weight")]
    pub memory: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            tactical: 0.4,
            emotional: 0.3,
            memory: 0.3,
        }
    }
}

/// Per-agent decision core configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Update interval for full assessments, seconds.
    #[serde(default = "default_full_interval")]
    pub full_interval: f64,
    /// Update interval for light updates, seconds.
    #[serde(default = "default_light_interval")]
    pub light_interval: f64,
    /// Update interval for minimal (health-check-only) updates, seconds.
    #[serde(default = "default_minimal_interval")]
    pub minimal_interval: f64,
    /// Within this distance of the focus point, normal agents run full updates.
    #[serde(default = "default_full_radius")]
    pub full_radius: f64,
    /// Within this distance, normal agents run light updates; beyond, minimal.
    #[serde(default = "default_light_radius")]
    pub light_radius: f64,
    /// Elite agents run full updates within this distance of the focus.
    #[serde(default = "default_elite_radius")]
    pub elite_full_radius: f64,
    /// Radius scanned for enemies during assessment.
    #[serde(default = "default_scan_radius")]
    pub enemy_scan_radius: f64,
    /// Radius scanned for allies during assessment.
    #[serde(default = "default_scan_radius")]
    pub ally_scan_radius: f64,
    /// Melee/skill engagement range.
    #[serde(default = "default_attack_range")]
    pub attack_range: f64,
    /// How far a retreating agent backs away from the enemy centroid.
    #[serde(default = "default_retreat_distance")]
    pub retreat_distance: f64,
    /// Radius of the generated patrol circuit around the anchor position.
    #[serde(default = "default_patrol_radius")]
    pub patrol_radius: f64,
    /// Distance at which a patrol waypoint counts as reached.
    #[serde(default = "default_patrol_arrive")]
    pub patrol_arrive_distance: f64,
    /// Movement speed passed to `move_towards` when the entity exposes no
    /// `movement_speed` attribute.
    #[serde(default = "default_move_speed")]
    pub default_move_speed: f64,
    /// Threat above this forces Critical priority (and retreat planning).
    #[serde(default = "default_critical_threat")]
    pub critical_threat: f64,
    /// Threat above this forces High priority (and attack planning).
    #[serde(default = "default_high_threat")]
    pub high_threat: f64,
    /// Opportunity above this forces High priority (and support planning).
    #[serde(default = "default_high_opportunity")]
    pub high_opportunity: f64,
    /// Health ratio at or below which the agent is considered low-health.
    #[serde(default = "default_low_health")]
    pub low_health: f64,
    /// Allies below this health ratio attract support.
    #[serde(default = "default_ally_help")]
    pub ally_help_threshold: f64,
    /// Threat and opportunity both below this lets the agent settle to Idle.
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold: f64,
    /// Damage amount that saturates the anger response.
    #[serde(default = "default_damage_saturation")]
    pub damage_saturation: f64,
    /// Per-outcome personality nudge applied by reinforcement.
    #[serde(default = "default_reinforcement_step")]
    pub reinforcement_step: f64,
    /// Lower bound on personality traits (saturation guard).
    #[serde(default = "default_trait_floor")]
    pub trait_floor: f64,
    /// Upper bound on personality traits (saturation guard).
    #[serde(default = "default_trait_ceiling")]
    pub trait_ceiling: f64,
    /// Decision fusion source weights.
    #[serde(default)]
    pub fusion: FusionWeights,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            full_interval: 0.1,
            light_interval: 0.25,
            minimal_interval: 0.5,
            full_radius: 100.0,
            light_radius: 300.0,
            elite_full_radius: 200.0,
            enemy_scan_radius: 150.0,
            ally_scan_radius: 150.0,
            attack_range: 50.0,
            retreat_distance: 100.0,
            patrol_radius: 50.0,
            patrol_arrive_distance: 10.0,
            default_move_speed: 100.0,
            critical_threat: 0.8,
            high_threat: 0.5,
            high_opportunity: 0.7,
            low_health: 0.3,
            ally_help_threshold: 0.5,
            idle_threshold: 0.1,
            damage_saturation: 50.0,
            reinforcement_step: 0.05,
            trait_floor: 0.1,
            trait_ceiling: 0.9,
            fusion: FusionWeights::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Emotion
// ---------------------------------------------------------------------------

/// Emotional influence layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionConfig {
    /// Modifier lifetime at full intensity, seconds (`expiry = now + base_duration × intensity`).
    #[serde(default = "default_base_duration")]
    pub base_duration: f64,
    /// Fraction of the initial strength remaining at expiry.
    #[serde(default = "default_residual_strength")]
    pub residual_strength: f64,
    /// Stability below this amplifies defensive action weights.
    #[serde(default = "default_low_stability")]
    pub low_stability: f64,
    /// Stability above this amplifies assertive action weights.
    #[serde(default = "default_high_stability")]
    pub high_stability: f64,
    /// Emotional momentum above this amplifies fast actions.
    #[serde(default = "default_momentum_threshold")]
    pub momentum_threshold: f64,
    /// Trauma level above this amplifies flight responses.
    #[serde(default = "default_trauma_threshold")]
    pub trauma_threshold: f64,
    /// Maximum distinct emotions tracked per agent mood.
    #[serde(default = "default_max_emotions")]
    pub max_tracked_emotions: usize,
    /// Trigger intensity at or above which a negative emotion is written
    /// to generational memory as trauma.
    #[serde(default = "default_trauma_record")]
    pub trauma_record_threshold: f64,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            base_duration: 30.0,
            residual_strength: 0.1,
            low_stability: 0.3,
            high_stability: 0.7,
            momentum_threshold: 0.7,
            trauma_threshold: 0.5,
            max_tracked_emotions: 3,
            trauma_record_threshold: 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Generational memory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Hard cap on retained records per memory kind.
    #[serde(default = "default_max_per_kind")]
    pub max_per_kind: usize,
    /// Similarity above which two same-kind records fuse into one.
    #[serde(default = "default_fusion_threshold")]
    pub fusion_threshold: f64,
    /// Records below this relevance are never returned from retrieval.
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f64,
    /// Default retrieval result cap.
    #[serde(default = "default_retrieval_limit")]
    pub default_limit: usize,
    /// Intensity multiplier for high-survival-value memories at generation turnover.
    #[serde(default = "default_reinforce_factor")]
    pub reinforce_factor: f64,
    /// Intensity multiplier for weak memories at generation turnover.
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
    /// Magnitude of the imperfect-recall perturbation.
    #[serde(default = "default_perturbation")]
    pub perturbation: f64,
    /// Probability a record is perturbed at generation turnover.
    #[serde(default = "default_perturbation_chance")]
    pub perturbation_chance: f64,
    /// Minimum same-kind records required to form a cluster.
    #[serde(default = "default_cluster_min")]
    pub cluster_min_size: usize,
    /// RNG seed for the perturbation pass; `None` seeds from entropy.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_per_kind: 100,
            fusion_threshold: 0.8,
            relevance_floor: 0.3,
            default_limit: 10,
            reinforce_factor: 1.1,
            decay_factor: 0.9,
            perturbation: 0.1,
            perturbation_chance: 0.1,
            cluster_min_size: 3,
            rng_seed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Memory archive persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable SQLite WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Store and verify a CRC-32 checksum per generation blob.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            checksum_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}
fn default_max_active() -> usize {
    100
}
fn default_cell_size() -> f64 {
    100.0
}
fn default_message_ttl() -> f64 {
    5.0
}
fn default_stats_interval() -> f64 {
    5.0
}
fn default_tactical_weight() -> f64 {
    0.4
}
fn default_emotional_weight() -> f64 {
    0.3
}
fn default_memory_weight() -> f64 {
    0.3
}
fn default_full_interval() -> f64 {
    0.1
}
fn default_light_interval() -> f64 {
    0.25
}
fn default_minimal_interval() -> f64 {
    0.5
}
fn default_full_radius() -> f64 {
    100.0
}
fn default_light_radius() -> f64 {
    300.0
}
fn default_elite_radius() -> f64 {
    200.0
}
fn default_scan_radius() -> f64 {
    150.0
}
fn default_attack_range() -> f64 {
    50.0
}
fn default_retreat_distance() -> f64 {
    100.0
}
fn default_patrol_radius() -> f64 {
    50.0
}
fn default_patrol_arrive() -> f64 {
    10.0
}
fn default_move_speed() -> f64 {
    100.0
}
fn default_critical_threat() -> f64 {
    0.8
}
fn default_high_threat() -> f64 {
    0.5
}
fn default_high_opportunity() -> f64 {
    0.7
}
fn default_low_health() -> f64 {
    0.3
}
fn default_ally_help() -> f64 {
    0.5
}
fn default_idle_threshold() -> f64 {
    0.1
}
fn default_damage_saturation() -> f64 {
    50.0
}
fn default_reinforcement_step() -> f64 {
    0.05
}
fn default_trait_floor() -> f64 {
    0.1
}
fn default_trait_ceiling() -> f64 {
    0.9
}
fn default_base_duration() -> f64 {
    30.0
}
fn default_residual_strength() -> f64 {
    0.1
}
fn default_low_stability() -> f64 {
    0.3
}
fn default_high_stability() -> f64 {
    0.7
}
fn default_momentum_threshold() -> f64 {
    0.7
}
fn default_trauma_threshold() -> f64 {
    0.5
}
fn default_max_emotions() -> usize {
    3
}
fn default_trauma_record() -> f64 {
    0.5
}
fn default_max_per_kind() -> usize {
    100
}
fn default_fusion_threshold() -> f64 {
    0.8
}
fn default_relevance_floor() -> f64 {
    0.3
}
fn default_retrieval_limit() -> usize {
    10
}
fn default_reinforce_factor() -> f64 {
    1.1
}
fn default_decay_factor() -> f64 {
    0.9
}
fn default_perturbation() -> f64 {
    0.1
}
fn default_perturbation_chance() -> f64 {
    0.1
}
fn default_cluster_min() -> usize {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = AiConfig::default();
        assert_eq!(config.scheduler.max_active_entities, 100);
        assert!((config.decision.fusion.tactical - 0.4).abs() < 1e-9);
        assert!((config.decision.fusion.emotional - 0.3).abs() < 1e-9);
        assert!((config.decision.fusion.memory - 0.3).abs() < 1e-9);
        assert!((config.decision.critical_threat - 0.8).abs() < 1e-9);
        assert!((config.decision.high_threat - 0.5).abs() < 1e-9);
        assert!((config.memory.fusion_threshold - 0.8).abs() < 1e-9);
        assert_eq!(config.memory.max_per_kind, 100);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml = r#"
            [scheduler]
            max_active_entities = 8

            [decision]
            critical_threat = 0.9
        "#;
        let config = AiConfig::from_toml(toml).expect("parse");
        assert_eq!(config.scheduler.max_active_entities, 8);
        assert!((config.decision.critical_threat - 0.9).abs() < 1e-9);
        // Untouched sections keep their defaults.
        assert!((config.scheduler.cell_size - 100.0).abs() < 1e-9);
        assert_eq!(config.memory.max_per_kind, 100);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let result = AiConfig::from_toml("scheduler = 3");
        assert!(matches!(result, Err(crate::AiError::Config(_))));
    }
}
