//! The process-wide generational memory store.
//!
//! Shared by every decision core: reads score relevance against the
//! current situation, writes append new experience. The write path
//! (adds, cap eviction, fusion, generation turnover) restructures shared
//! storage, so the scheduler keeps the store behind a single writer lock.
//!
//! Across sessions the store is folded forward by
//! [`MemoryStore::advance_generation`]: the finished generation is
//! archived, strong memories are reinforced, weak ones fade, a small
//! random perturbation models imperfect recall, and same-kind memories
//! condense into named clusters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::{MemoryConfig, PersistenceConfig};
use crate::error::{AiError, Result};
use crate::memory::archive::{GenerationArchive, GenerationSnapshot};
use crate::memory::{
    fuse, similarity, MemoryCluster, MemoryContent, MemoryKind, MemoryRecord,
};
use crate::types::{ClusterId, DecisionContext, MemoryId};
use crate::weights::{self, Action, WeightMap};

/// Aggregate statistics over the store.
#[derive(Debug, Clone)]
pub struct MemoryStats {
    /// Total retained records.
    pub total_records: usize,
    /// Current generation number.
    pub generation: u32,
    /// Record count per kind.
    pub per_kind: Vec<(MemoryKind, usize)>,
    /// Number of clusters.
    pub cluster_count: usize,
    /// Mean record intensity (0 when empty).
    pub mean_intensity: f64,
    /// Summed emotional impact.
    pub total_emotional_impact: f64,
}

/// Append/prune store of intensity-weighted experience records.
#[derive(Debug)]
pub struct MemoryStore {
    config: MemoryConfig,
    generation: u32,
    records: HashMap<MemoryId, MemoryRecord>,
    clusters: HashMap<ClusterId, MemoryCluster>,
    rng: StdRng,
    archive: Option<GenerationArchive>,
}

impl MemoryStore {
    /// Create a store with no durable archive (memories die with the process).
    #[must_use]
    pub fn in_memory(config: MemoryConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            generation: 1,
            records: HashMap::new(),
            clusters: HashMap::new(),
            rng,
            archive: None,
        }
    }

    /// Open a store backed by the SQLite archive at `path`, restoring the
    /// generation the archive's index points at.
    ///
    /// Corrupt persisted data is logged and discarded — the store starts
    /// fresh rather than failing the simulation.
    ///
    /// # Errors
    /// Returns [`AiError::Database`] on SQLite failures.
    pub fn open<P: AsRef<std::path::Path>>(
        config: MemoryConfig,
        persistence: &PersistenceConfig,
        path: P,
    ) -> Result<Self> {
        let archive = GenerationArchive::open(path, persistence)?;
        Ok(Self::from_archive(config, archive))
    }

    /// Build a store from an already-open archive (used by tests with
    /// in-memory databases).
    #[must_use]
    pub fn from_archive(config: MemoryConfig, archive: GenerationArchive) -> Self {
        let mut store = Self::in_memory(config);
        match archive.load_current() {
            Ok(Some(snapshot)) => {
                store.generation = snapshot.generation;
                store.records = snapshot.records.into_iter().map(|r| (r.id, r)).collect();
                store.clusters = snapshot.clusters.into_iter().map(|c| (c.id, c)).collect();
                info!(
                    generation = store.generation,
                    records = store.records.len(),
                    "restored generational memory"
                );
            }
            Ok(None) => {
                debug!("no persisted generations; starting fresh");
            }
            Err(AiError::MemoryCorruption { reason }) => {
                warn!(%reason, "persisted memory corrupt; starting with an empty store");
            }
            Err(e) => {
                warn!(error = %e, "failed to load persisted memory; starting fresh");
            }
        }
        store.archive = Some(archive);
        store
    }

    /// Current generation number.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no records are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by id.
    #[must_use]
    pub fn get(&self, id: MemoryId) -> Option<&MemoryRecord> {
        self.records.get(&id)
    }

    /// Iterate over all retained records (arbitrary order).
    pub fn records(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.records.values()
    }

    /// Iterate over all clusters.
    pub fn clusters(&self) -> impl Iterator<Item = &MemoryCluster> {
        self.clusters.values()
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    /// Record a new experience now.
    ///
    /// Returns the id of the *surviving* record: if the new record
    /// immediately fused with a similar existing one, that is the fused
    /// record's id.
    pub fn add_memory(
        &mut self,
        kind: MemoryKind,
        content: MemoryContent,
        intensity: f64,
        emotional_impact: f64,
    ) -> MemoryId {
        self.add_memory_at(kind, content, intensity, emotional_impact, Utc::now())
    }

    /// Record a new experience at an explicit wall-clock time.
    pub fn add_memory_at(
        &mut self,
        kind: MemoryKind,
        content: MemoryContent,
        intensity: f64,
        emotional_impact: f64,
        now: DateTime<Utc>,
    ) -> MemoryId {
        let record =
            MemoryRecord::new_at(kind, content, intensity, emotional_impact, self.generation, now);
        let id = record.id;
        self.records.insert(id, record);

        self.enforce_kind_cap(kind);

        let surviving = self.attempt_fusion(id, now);
        debug!(kind = %kind, memory = %surviving, "memory recorded");
        surviving
    }

    /// Evict the weakest/oldest records of `kind` down to the cap.
    fn enforce_kind_cap(&mut self, kind: MemoryKind) {
        let mut of_kind: Vec<(OrderedFloat<f64>, DateTime<Utc>, MemoryId)> = self
            .records
            .values()
            .filter(|r| r.kind == kind)
            .map(|r| (OrderedFloat(r.intensity), r.created_at, r.id))
            .collect();
        if of_kind.len() <= self.config.max_per_kind {
            return;
        }
        of_kind.sort();
        let excess = of_kind.len() - self.config.max_per_kind;
        for (_, _, id) in of_kind.into_iter().take(excess) {
            self.records.remove(&id);
        }
    }

    /// Try to fuse the new record with one similar existing record.
    /// Returns the id of whichever record survives.
    fn attempt_fusion(&mut self, new_id: MemoryId, now: DateTime<Utc>) -> MemoryId {
        let Some(new_record) = self.records.get(&new_id) else {
            // The new record itself was cap-evicted.
            return new_id;
        };

        let partner = self
            .records
            .values()
            .filter(|r| r.id != new_id && r.kind == new_record.kind)
            .find(|r| similarity(new_record, r) > self.config.fusion_threshold)
            .map(|r| r.id);

        let Some(partner_id) = partner else {
            return new_id;
        };

        // Both lookups are guaranteed: ids came from the map above.
        let (Some(a), Some(b)) = (self.records.get(&new_id), self.records.get(&partner_id)) else {
            return new_id;
        };
        let fused = fuse(a, b, self.generation, now);
        let fused_id = fused.id;
        debug!(a = %new_id, b = %partner_id, fused = %fused_id, "memories fused");

        self.records.remove(&new_id);
        self.records.remove(&partner_id);
        self.records.insert(fused_id, fused);
        fused_id
    }

    /// Apply every kind's retention cap. Bounded, called at generation
    /// turnover (decay alone never deletes records).
    pub fn prune(&mut self) {
        for kind in MemoryKind::ALL {
            self.enforce_kind_cap(kind);
        }
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// Relevance of a record to the current situation, in [0, 1]:
    /// 0.3·recency + 0.4·content match + 0.3·emotional similarity.
    fn relevance(&self, record: &MemoryRecord, ctx: &DecisionContext, now: DateTime<Utc>) -> f64 {
        let elapsed_hours =
            (now - record.last_accessed).num_seconds().max(0) as f64 / 3600.0;
        let mut score = 1.0 / (1.0 + elapsed_hours) * 0.3;

        let content_match = match record.kind {
            MemoryKind::CombatExperience | MemoryKind::EnemyPatterns => {
                match (&ctx.enemy_kind, super::content_text(&record.content, "enemy_kind")) {
                    (Some(current), Some(remembered)) if current == remembered => 0.4,
                    _ => 0.0,
                }
            }
            _ => 0.0,
        };
        score += content_match;

        let emotional_similarity =
            1.0 - (ctx.emotional_state - record.emotional_impact).abs();
        score += emotional_similarity.max(0.0) * 0.3;

        score.min(1.0)
    }

    /// The most relevant records for the situation, ordered by
    /// (relevance, intensity) descending, capped at `limit`. Records below
    /// the relevance floor are never returned.
    #[must_use]
    pub fn get_relevant(
        &self,
        ctx: &DecisionContext,
        kinds: Option<&[MemoryKind]>,
        limit: usize,
    ) -> Vec<&MemoryRecord> {
        self.get_relevant_at(ctx, kinds, limit, Utc::now())
    }

    /// [`Self::get_relevant`] with an explicit clock, for deterministic tests.
    #[must_use]
    pub fn get_relevant_at(
        &self,
        ctx: &DecisionContext,
        kinds: Option<&[MemoryKind]>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<&MemoryRecord> {
        let mut scored: Vec<(OrderedFloat<f64>, OrderedFloat<f64>, &MemoryRecord)> = self
            .records
            .values()
            .filter(|r| kinds.is_none_or(|ks| ks.contains(&r.kind)))
            .filter_map(|r| {
                let rel = self.relevance(r, ctx, now);
                (rel > self.config.relevance_floor)
                    .then_some((OrderedFloat(rel), OrderedFloat(r.intensity), r))
            })
            .collect();

        scored.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        scored.into_iter().take(limit).map(|(_, _, r)| r).collect()
    }

    /// How remembered outcomes reweight the available actions.
    ///
    /// Actions a memory names as successful or an effective counter gain
    /// weight proportional to `intensity × survival_value`; failed or
    /// dangerous actions lose it; trauma additionally favors defense.
    /// The result is normalized to sum to 1.
    #[must_use]
    pub fn influence_decision(&self, ctx: &DecisionContext, actions: &[Action]) -> WeightMap {
        self.influence_decision_at(ctx, actions, Utc::now())
    }

    /// [`Self::influence_decision`] with an explicit clock.
    #[must_use]
    pub fn influence_decision_at(
        &self,
        ctx: &DecisionContext,
        actions: &[Action],
        now: DateTime<Utc>,
    ) -> WeightMap {
        let mut action_weights = weights::uniform(actions);
        let relevant = self.get_relevant_at(ctx, None, self.config.default_limit, now);

        for record in relevant {
            let influence = record.intensity * record.survival_value;
            match record.kind {
                MemoryKind::CombatExperience => {
                    nudge(&mut action_weights, &record.content, "successful_action", influence * 0.5);
                    nudge(&mut action_weights, &record.content, "failed_action", -influence * 0.3);
                }
                MemoryKind::EnemyPatterns => {
                    nudge(&mut action_weights, &record.content, "effective_counter", influence * 0.6);
                }
                MemoryKind::EmotionalTrauma => {
                    nudge(&mut action_weights, &record.content, "dangerous_action", -influence * 0.4);
                    if let Some(w) = action_weights.get_mut(&Action::Defend) {
                        *w += influence * 0.3;
                    }
                }
                _ => {}
            }
        }

        weights::normalize(&mut action_weights);
        action_weights
    }

    // ------------------------------------------------------------------
    // Generation turnover
    // ------------------------------------------------------------------

    /// Fold the store forward into the next generation.
    ///
    /// Archives the finished generation, reinforces high-survival-value
    /// memories, fades weak ones, perturbs a random few (imperfect
    /// recall), rebuilds clusters, increments the generation counter, and
    /// persists the new state plus the index.
    ///
    /// # Errors
    /// Returns [`AiError::Database`]/[`AiError::Serialization`] on
    /// persistence failures; the in-memory evolution has already happened.
    pub fn advance_generation(
        &mut self,
        survival_rate: f64,
        achievements: &[String],
    ) -> Result<()> {
        let finished = self.generation;
        info!(
            generation = finished,
            records = self.records.len(),
            survival_rate,
            "advancing generation"
        );

        self.prune();

        // Archive the finished generation as it was lived.
        if let Some(archive) = &self.archive {
            archive.save_generation(&self.snapshot(), survival_rate, achievements)?;
        }

        self.evolve_records();
        self.rebuild_clusters();
        self.generation = finished + 1;

        // Persist the evolved state under the new generation so a restart
        // resumes exactly here.
        if let Some(archive) = &self.archive {
            archive.save_generation(&self.snapshot(), survival_rate, achievements)?;
            let record_ids: Vec<String> = self.records.keys().map(ToString::to_string).collect();
            let cluster_ids: Vec<String> = self.clusters.keys().map(ToString::to_string).collect();
            archive.save_index(self.generation, &record_ids, &cluster_ids)?;
        }

        info!(generation = self.generation, "generation active");
        Ok(())
    }

    fn snapshot(&self) -> GenerationSnapshot {
        GenerationSnapshot {
            generation: self.generation,
            records: self.records.values().cloned().collect(),
            clusters: self.clusters.values().cloned().collect(),
        }
    }

    /// Reinforce, fade, and perturb record intensities between generations.
    fn evolve_records(&mut self) {
        let reinforce = self.config.reinforce_factor;
        let decay = self.config.decay_factor;
        let perturbation = self.config.perturbation;
        let chance = self.config.perturbation_chance;

        for record in self.records.values_mut() {
            if record.survival_value > 0.8 {
                record.intensity = (record.intensity * reinforce).min(1.0);
            } else if record.intensity < 0.3 {
                record.intensity *= decay;
            }

            if self.rng.gen_bool(chance.clamp(0.0, 1.0)) {
                let delta = if self.rng.gen_bool(0.5) { perturbation } else { -perturbation };
                record.intensity = (record.intensity + delta).clamp(0.0, 1.0);
            }
        }
    }

    /// Cluster kinds with enough members into named clusters.
    fn rebuild_clusters(&mut self) {
        self.clusters.clear();
        for kind in MemoryKind::ALL {
            let members: Vec<&MemoryRecord> =
                self.records.values().filter(|r| r.kind == kind).collect();
            if members.len() < self.config.cluster_min_size {
                continue;
            }
            let count = members.len() as f64;
            let cluster = MemoryCluster {
                id: ClusterId::new(),
                theme: kind,
                members: members.iter().map(|r| r.id).collect(),
                strength: members.iter().map(|r| r.intensity).sum::<f64>() / count,
                influence_radius: count * 0.1,
                emotional_resonance: members.iter().map(|r| r.emotional_impact).sum::<f64>()
                    / count,
            };
            self.clusters.insert(cluster.id, cluster);
        }
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    /// Aggregate statistics for telemetry.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        let per_kind = MemoryKind::ALL
            .iter()
            .map(|&kind| {
                (kind, self.records.values().filter(|r| r.kind == kind).count())
            })
            .collect();
        let total = self.records.len();
        let mean_intensity = if total == 0 {
            0.0
        } else {
            self.records.values().map(|r| r.intensity).sum::<f64>() / total as f64
        };
        MemoryStats {
            total_records: total,
            generation: self.generation,
            per_kind,
            cluster_count: self.clusters.len(),
            mean_intensity,
            total_emotional_impact: self.records.values().map(|r| r.emotional_impact).sum(),
        }
    }
}

/// Add `delta` to the weight of the action named by `content[key]`,
/// if that action is among the candidates.
fn nudge(action_weights: &mut WeightMap, content: &MemoryContent, key: &str, delta: f64) {
    if let Some(action) = super::content_text(content, key).and_then(|s| s.parse::<Action>().ok()) {
        if let Some(w) = action_weights.get_mut(&action) {
            *w += delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ContentValue;

    fn store() -> MemoryStore {
        MemoryStore::in_memory(MemoryConfig {
            rng_seed: Some(7),
            ..MemoryConfig::default()
        })
    }

    fn combat_content(enemy: &str, successful: Option<&str>, failed: Option<&str>) -> MemoryContent {
        let mut content = MemoryContent::new();
        content.insert("enemy_kind".into(), ContentValue::Text(enemy.into()));
        if let Some(action) = successful {
            content.insert("successful_action".into(), ContentValue::Text(action.into()));
        }
        if let Some(action) = failed {
            content.insert("failed_action".into(), ContentValue::Text(action.into()));
        }
        content
    }

    fn combat_ctx(enemy: &str) -> DecisionContext {
        DecisionContext {
            enemy_kind: Some(enemy.into()),
            emotional_state: 0.5,
            ..DecisionContext::default()
        }
    }

    #[test]
    fn add_returns_surviving_id() {
        let mut store = store();
        let first = store.add_memory(
            MemoryKind::CombatExperience,
            combat_content("goblin", Some("attack"), None),
            0.6,
            0.5,
        );
        // Nearly identical record fuses with the first.
        let second = store.add_memory(
            MemoryKind::CombatExperience,
            combat_content("goblin", Some("attack"), None),
            0.5,
            0.5,
        );
        assert_ne!(first, second, "fusion must mint a fresh id");
        assert_eq!(store.len(), 1);
        assert!(store.get(second).is_some());
        assert!(store.get(first).is_none());
    }

    #[test]
    fn kind_cap_evicts_weakest_first() {
        let mut store = MemoryStore::in_memory(MemoryConfig {
            max_per_kind: 3,
            fusion_threshold: 2.0, // disable fusion for this test
            rng_seed: Some(7),
            ..MemoryConfig::default()
        });

        for i in 0..5 {
            // Distinct content per record so nothing would fuse anyway.
            let mut content = MemoryContent::new();
            content.insert("index".into(), ContentValue::Num(f64::from(i)));
            store.add_memory(
                MemoryKind::ItemUsage,
                content,
                0.1 + f64::from(i) * 0.2,
                0.2,
            );
        }

        assert_eq!(store.len(), 3);
        let min_intensity = store
            .records()
            .map(|r| r.intensity)
            .fold(f64::INFINITY, f64::min);
        assert!(min_intensity > 0.3, "weakest records must be gone");
    }

    #[test]
    fn relevant_memories_respect_floor_and_order() {
        let mut store = store();
        let now = Utc::now();
        store.add_memory_at(
            MemoryKind::CombatExperience,
            combat_content("goblin", Some("attack"), None),
            0.9,
            0.5,
            now,
        );
        store.add_memory_at(
            MemoryKind::EnvironmentalHazard,
            MemoryContent::new(),
            0.2,
            0.5,
            now - chrono::Duration::days(30),
        );

        let relevant = store.get_relevant_at(&combat_ctx("goblin"), None, 10, now);
        assert!(!relevant.is_empty());
        assert_eq!(relevant[0].kind, MemoryKind::CombatExperience);
    }

    #[test]
    fn influence_weights_sum_to_one() {
        let mut store = store();
        store.add_memory(
            MemoryKind::CombatExperience,
            combat_content("goblin", Some("attack"), Some("retreat")),
            0.9,
            0.5,
        );
        let actions = [Action::Attack, Action::Defend, Action::Retreat];
        let map = store.influence_decision(&combat_ctx("goblin"), &actions);

        let total: f64 = map.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(
            map[&Action::Attack] > map[&Action::Retreat],
            "remembered success should outweigh remembered failure"
        );
    }

    #[test]
    fn influence_with_empty_store_is_uniform() {
        let store = store();
        let actions = [Action::Attack, Action::Defend];
        let map = store.influence_decision(&DecisionContext::default(), &actions);
        assert!((map[&Action::Attack] - 0.5).abs() < 1e-6);
        assert!((map[&Action::Defend] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn trauma_boosts_defense() {
        let mut store = store();
        let mut content = MemoryContent::new();
        content.insert("near_death".into(), ContentValue::Flag(true));
        content.insert("dangerous_action".into(), ContentValue::Text("attack".into()));
        store.add_memory(MemoryKind::EmotionalTrauma, content, 0.9, 0.9);

        let ctx = DecisionContext {
            emotional_state: 0.9,
            ..DecisionContext::default()
        };
        let actions = [Action::Attack, Action::Defend];
        let map = store.influence_decision(&ctx, &actions);
        assert!(map[&Action::Defend] > map[&Action::Attack]);
    }

    #[test]
    fn advance_generation_increments_once_per_call() {
        let mut store = store();
        store.add_memory(
            MemoryKind::CombatExperience,
            combat_content("goblin", Some("attack"), None),
            0.9,
            0.5,
        );
        assert_eq!(store.generation(), 1);
        store.advance_generation(0.8, &[]).expect("advance");
        assert_eq!(store.generation(), 2);
        store.advance_generation(0.8, &[]).expect("advance");
        assert_eq!(store.generation(), 3);
    }

    #[test]
    fn evolution_never_collapses_intensity() {
        let mut store = store();
        for i in 0..20 {
            let mut content = MemoryContent::new();
            content.insert("index".into(), ContentValue::Num(f64::from(i)));
            store.add_memory(MemoryKind::SurvivalStrategy, content, 0.5, 0.4);
        }
        let before: f64 = store.records().map(|r| r.intensity).sum();
        store.advance_generation(0.5, &[]).expect("advance");
        let after: f64 = store.records().map(|r| r.intensity).sum();

        let config = MemoryConfig::default();
        let worst_case =
            before * config.decay_factor - store.len() as f64 * config.perturbation;
        assert!(
            after >= worst_case - 1e-9,
            "intensity sum {after} fell below documented bound {worst_case}"
        );
    }

    #[test]
    fn clusters_require_minimum_members() {
        let mut store = MemoryStore::in_memory(MemoryConfig {
            fusion_threshold: 2.0,
            rng_seed: Some(7),
            ..MemoryConfig::default()
        });
        for i in 0..4 {
            let mut content = MemoryContent::new();
            content.insert("index".into(), ContentValue::Num(f64::from(i)));
            store.add_memory(MemoryKind::EnemyPatterns, content, 0.6, 0.3);
        }
        // Only two of another kind — below the cluster minimum.
        for i in 0..2 {
            let mut content = MemoryContent::new();
            content.insert("index".into(), ContentValue::Num(f64::from(i)));
            store.add_memory(MemoryKind::ItemUsage, content, 0.6, 0.3);
        }

        store.advance_generation(0.5, &[]).expect("advance");
        let themes: Vec<MemoryKind> = store.clusters().map(|c| c.theme).collect();
        assert!(themes.contains(&MemoryKind::EnemyPatterns));
        assert!(!themes.contains(&MemoryKind::ItemUsage));
    }

    #[test]
    fn stats_reflect_contents() {
        let mut store = store();
        store.add_memory(
            MemoryKind::CombatExperience,
            combat_content("goblin", None, None),
            0.8,
            0.6,
        );
        let stats = store.stats();
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.generation, 1);
        assert!((stats.mean_intensity - 0.8).abs() < 1e-9);
    }
}
