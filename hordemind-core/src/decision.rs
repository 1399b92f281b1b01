//! The per-agent decision core.
//!
//! One invocation runs the agent's whole thinking cycle: assess the
//! situation, refresh the emotional readout, build a priority-gated
//! action plan, fuse the plan with the tactical, emotional, and memory
//! weight vectors, dispatch the winning action against the entity's
//! capabilities, and record the outcome.
//!
//! Cost is tiered before the fleet scheduler ever sees the agent: bosses
//! and agents near the focus point run the full cycle, mid-range agents
//! run a light threat-and-continue pass, distant agents only check
//! whether they are dying.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::agent::{
    derive_priority, AgentState, EmotionSignals, OutcomeRecord, Personality, Priority,
    StateSummary,
};
use crate::config::DecisionConfig;
use crate::emotion::EmotionalInfluenceLayer;
use crate::entity::{health_ratio, CapabilityOutcome, Entity};
use crate::error::{AiError, Result};
use crate::memory::{ContentValue, MemoryContent, MemoryKind, MemoryStore};
use crate::scheduler::{AgentObservation, WorldView};
use crate::tactics::TacticalAdvisor;
use crate::types::{AgentId, AgentTier, DecisionContext, Position, SimTime};
use crate::weights::{self, Action, WeightMap};

/// Enemy proximity bands for threat scoring.
const CLOSE_RANGE: f64 = 50.0;
const MID_RANGE: f64 = 100.0;

/// Outcome ring capacity and the size it is trimmed to on overflow.
const OUTCOME_CAP: usize = 100;
const OUTCOME_TRIM: usize = 50;

/// How many recent outcomes the reinforcement pass replays.
const REINFORCEMENT_WINDOW: usize = 10;

/// How an update invocation is budgeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Full assessment, planning, fusion, and execution.
    Full,
    /// Threat check plus continuation of the current behavior.
    Light,
    /// Health-critical check only.
    Minimal,
}

/// The decision state machine for one agent.
#[derive(Debug)]
pub struct DecisionCore {
    id: AgentId,
    state: AgentState,
    priority: Priority,
    personality: Personality,
    emotion: EmotionSignals,
    threat: f64,
    opportunity: f64,
    action_plan: Vec<(Action, f64)>,
    target: Option<AgentId>,
    context_enemy: Option<String>,
    outcomes: VecDeque<OutcomeRecord>,
    patrol_route: Vec<Position>,
    group_orders: Option<Vec<(Action, f64)>>,
    update_interval: f64,
    move_speed: f64,
    rng: StdRng,
}

impl DecisionCore {
    /// Build a core for a freshly registered agent, seeding personality
    /// from the entity's attributes and archetype.
    #[must_use]
    pub fn new(id: AgentId, entity: &dyn Entity, config: &DecisionConfig) -> Self {
        let attributes = entity.attributes();
        let personality = Personality::from_attributes(&attributes, entity.archetype());
        let move_speed = attributes
            .get("movement_speed")
            .copied()
            .unwrap_or(config.default_move_speed);

        Self {
            id,
            state: AgentState::Idle,
            priority: Priority::Medium,
            personality,
            emotion: EmotionSignals::default(),
            threat: 0.0,
            opportunity: 0.0,
            action_plan: Vec::new(),
            target: None,
            context_enemy: None,
            outcomes: VecDeque::new(),
            patrol_route: Vec::new(),
            group_orders: None,
            update_interval: config.full_interval,
            move_speed,
            // Per-agent deterministic drift: same id, same wander.
            rng: StdRng::seed_from_u64(id.0.as_u128() as u64),
        }
    }

    /// This agent's id.
    #[must_use]
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Current behavior state.
    #[must_use]
    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Current scheduling priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Override the scheduling priority (external callers; the next
    /// assessment may recompute it).
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Last-assessed threat level.
    #[must_use]
    pub fn threat(&self) -> f64 {
        self.threat
    }

    /// Last-assessed opportunity level.
    #[must_use]
    pub fn opportunity(&self) -> f64 {
        self.opportunity
    }

    /// The stable personality block.
    #[must_use]
    pub fn personality(&self) -> &Personality {
        &self.personality
    }

    /// The ranked action plan from the last full update.
    #[must_use]
    pub fn action_plan(&self) -> &[(Action, f64)] {
        &self.action_plan
    }

    /// Seconds this agent wants between updates, per its current mode.
    #[must_use]
    pub fn update_interval(&self) -> f64 {
        self.update_interval
    }

    /// Install goals mirrored from the group leader; consumed by the
    /// next full update.
    pub fn set_group_orders(&mut self, orders: Vec<(Action, f64)>) {
        self.group_orders = Some(orders);
    }

    /// Telemetry snapshot for UI consumers.
    #[must_use]
    pub fn state_summary(&self) -> StateSummary {
        StateSummary {
            state: self.state,
            priority: self.priority,
            threat: self.threat,
            opportunity: self.opportunity,
            confidence: self.emotion.confidence,
            fear: self.emotion.fear,
            anger: self.emotion.anger,
            stress: self.emotion.stress,
            morale: self.emotion.morale,
            aggression: self.personality.aggression,
            caution: self.personality.caution,
            intelligence: self.personality.intelligence,
        }
    }

    // ------------------------------------------------------------------
    // Update entry point
    // ------------------------------------------------------------------

    /// Run one decision cycle.
    ///
    /// # Errors
    /// Failures are already degraded internally (missing capabilities are
    /// skipped at debug level); an `Err` here means the cycle could not
    /// run at all and is logged by the scheduler boundary.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        dt: f64,
        entity: &mut dyn Entity,
        world: &WorldView,
        memory: &mut MemoryStore,
        emotions: &EmotionalInfluenceLayer,
        advisor: &dyn TacticalAdvisor,
        config: &DecisionConfig,
    ) -> Result<()> {
        let mode = self.select_mode(entity, world, config);
        self.update_interval = match mode {
            UpdateMode::Full => config.full_interval,
            UpdateMode::Light => config.light_interval,
            UpdateMode::Minimal => config.minimal_interval,
        };

        match mode {
            UpdateMode::Full => self.full_update(dt, entity, world, memory, emotions, advisor, config),
            UpdateMode::Light => self.light_update(dt, entity, world, config),
            UpdateMode::Minimal => self.minimal_update(entity, config),
        }
        Ok(())
    }

    /// Tier the intrinsic cost of this update by importance and distance
    /// to the focus point. Without a focus there is no "far", so every
    /// agent gets the full cycle.
    fn select_mode(
        &self,
        entity: &dyn Entity,
        world: &WorldView,
        config: &DecisionConfig,
    ) -> UpdateMode {
        if entity.tier() == AgentTier::Boss {
            return UpdateMode::Full;
        }
        let Some(focus) = world.focus() else {
            return UpdateMode::Full;
        };
        // Missing positions read as infinitely far.
        let distance = entity
            .position()
            .map_or(f64::INFINITY, |p| p.distance(focus));

        match entity.tier() {
            AgentTier::Elite => {
                if distance < config.elite_full_radius {
                    UpdateMode::Full
                } else {
                    UpdateMode::Light
                }
            }
            _ => {
                if distance < config.full_radius {
                    UpdateMode::Full
                } else if distance < config.light_radius {
                    UpdateMode::Light
                } else {
                    UpdateMode::Minimal
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Full update
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn full_update(
        &mut self,
        dt: f64,
        entity: &mut dyn Entity,
        world: &WorldView,
        memory: &mut MemoryStore,
        emotions: &EmotionalInfluenceLayer,
        advisor: &dyn TacticalAdvisor,
        config: &DecisionConfig,
    ) {
        self.assess(entity, world, config);

        self.emotion.update(
            health_ratio(entity),
            self.threat,
            self.opportunity,
            self.personality.aggression,
            entity.recent_damage(),
            config,
        );

        self.plan(entity, config);
        self.apply_group_orders();

        let Some(chosen) = self.fuse_and_choose(world, memory, emotions, advisor, config) else {
            self.settle(config);
            return;
        };

        let success = self.execute(chosen, dt, entity, world, config);
        self.record_outcome(chosen, success, world.now(), memory);
        self.reinforce(config, health_ratio(entity));
        self.settle(config);
    }

    fn light_update(
        &mut self,
        dt: f64,
        entity: &mut dyn Entity,
        world: &WorldView,
        config: &DecisionConfig,
    ) {
        self.assess(entity, world, config);

        match self.state {
            AgentState::Idle | AgentState::Exploring => {
                // Occasional drift keeps distant agents from freezing in place.
                if self.rng.gen_bool(0.05) {
                    self.drift(dt, entity, config);
                    self.state = AgentState::Exploring;
                }
            }
            AgentState::Attacking => {
                if let Some(target) = self.target {
                    if entity.attack(target) == CapabilityOutcome::Unsupported {
                        debug!(agent = %self.id, "attack capability missing; breaking off");
                        self.state = AgentState::Idle;
                    }
                } else {
                    self.state = AgentState::Idle;
                }
            }
            _ => {}
        }
        self.settle(config);
    }

    fn minimal_update(&mut self, entity: &mut dyn Entity, config: &DecisionConfig) {
        let low = health_ratio(entity).is_some_and(|r| r <= config.low_health);
        if low && entity.use_healing_item().performed() {
            self.state = AgentState::Healing;
        }
    }

    // ------------------------------------------------------------------
    // Assessment
    // ------------------------------------------------------------------

    /// Recompute threat, opportunity, priority, and the context enemy.
    fn assess(&mut self, entity: &dyn Entity, world: &WorldView, config: &DecisionConfig) {
        let position = entity.position();
        let faction = entity.faction().map(str::to_owned);

        let enemies = position.map_or_else(Vec::new, |p| {
            world.enemies_near(p, config.enemy_scan_radius, self.id, faction.as_deref())
        });
        let allies = position.map_or_else(Vec::new, |p| {
            world.allies_near(p, config.ally_scan_radius, self.id, faction.as_deref())
        });

        let mut threat = 0.0;
        if let Some(ratio) = health_ratio(entity) {
            threat += (1.0 - ratio) * 0.4;
        }
        if let Some(p) = position {
            for enemy in &enemies {
                threat += enemy_threat(enemy, p);
            }
        }
        let debuffs = entity
            .active_effect_tags()
            .iter()
            .filter(|t| t.as_str() == "debuff")
            .count();
        threat += debuffs as f64 * 0.1;
        self.threat = threat.clamp(0.0, 1.0);

        let usable_skills = entity
            .skills()
            .iter()
            .filter(|s| entity.skill_ready(&s.id))
            .count();
        let mut opportunity = allies.len() as f64 * 0.1 + usable_skills as f64 * 0.05;
        // Positional advantage: outnumbering a present enemy force.
        if !enemies.is_empty() && allies.len() >= enemies.len() {
            opportunity += 0.2;
        }
        self.opportunity = opportunity.clamp(0.0, 1.0);

        self.priority = derive_priority(self.threat, self.opportunity, config);

        self.context_enemy = position.and_then(|p| {
            nearest(&enemies, p).map(|o| match o.tier {
                AgentTier::Boss => "boss".to_string(),
                _ => o.faction.clone().unwrap_or_else(|| "unknown".to_string()),
            })
        });
    }

    // ------------------------------------------------------------------
    // Planning and fusion
    // ------------------------------------------------------------------

    /// Build the priority-gated ranked plan.
    fn plan(&mut self, entity: &dyn Entity, config: &DecisionConfig) {
        self.action_plan.clear();
        let low_health = health_ratio(entity).is_some_and(|r| r <= config.low_health);

        match self.priority {
            Priority::Critical => {
                if self.threat > config.critical_threat {
                    self.action_plan.push((Action::Retreat, 1.0));
                }
                if low_health {
                    self.action_plan.push((Action::Heal, 1.0));
                }
            }
            Priority::High => {
                if self.threat > config.high_threat {
                    self.action_plan.push((Action::Attack, 0.8));
                    self.action_plan.push((Action::Defend, 0.6));
                }
                if self.opportunity > config.high_opportunity {
                    self.action_plan.push((Action::Support, 0.7));
                }
                if low_health {
                    self.action_plan.push((Action::Heal, 0.9));
                }
            }
            Priority::Medium | Priority::Low => match self.state {
                AgentState::Exploring => self.action_plan.push((Action::Patrol, 0.4)),
                _ => self.action_plan.push((Action::Explore, 0.5)),
            },
        }

        if self.action_plan.is_empty() {
            self.action_plan.push((Action::Explore, 0.3));
        }
        self.action_plan
            .sort_by(|a, b| b.1.total_cmp(&a.1));
    }

    /// Shared group goals override individual planning, except in an
    /// emergency. Entering formation is the only way into that state.
    fn apply_group_orders(&mut self) {
        if let Some(orders) = self.group_orders.take() {
            if self.priority != Priority::Critical && !orders.is_empty() {
                self.action_plan = orders;
                self.state = AgentState::Formation;
            }
        }
    }

    /// Fuse plan, tactics, emotion, and memory into one weight vector and
    /// pick the winner (ties go to plan order).
    fn fuse_and_choose(
        &self,
        world: &WorldView,
        memory: &MemoryStore,
        emotions: &EmotionalInfluenceLayer,
        advisor: &dyn TacticalAdvisor,
        config: &DecisionConfig,
    ) -> Option<Action> {
        let plan_order: Vec<Action> = self.action_plan.iter().map(|(a, _)| *a).collect();
        if plan_order.is_empty() {
            return None;
        }

        let ctx = DecisionContext {
            enemy_kind: self.context_enemy.clone(),
            emotional_state: self.emotion.aggregate_intensity(),
            threat: self.threat,
            opportunity: self.opportunity,
        };

        let tactical = advisor
            .tactical_weights(&ctx, &plan_order)
            .unwrap_or_else(|| self.plan_weights());
        let emotional = emotions.influenced_actions(self.id, &plan_order, world.now());
        let remembered = memory.influence_decision(&ctx, &plan_order);

        let fused = weights::fuse(
            &plan_order,
            &tactical,
            &emotional,
            &remembered,
            &config.fusion,
        );
        weights::argmax(&fused, &plan_order)
    }

    fn plan_weights(&self) -> WeightMap {
        let mut map: WeightMap = self.action_plan.iter().map(|&(a, s)| (a, s)).collect();
        weights::normalize(&mut map);
        map
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Dispatch the chosen action against the entity's capabilities.
    /// Returns whether anything was actually performed.
    fn execute(
        &mut self,
        action: Action,
        dt: f64,
        entity: &mut dyn Entity,
        world: &WorldView,
        config: &DecisionConfig,
    ) -> bool {
        match action {
            Action::Attack | Action::Charge => self.execute_attack(dt, entity, world, config),
            Action::Defend | Action::Hide => self.execute_defend(dt, entity, world, config),
            Action::Heal => self.execute_heal(entity),
            Action::Retreat | Action::Flee => self.execute_retreat(dt, entity, world, config),
            Action::Support => self.execute_support(dt, entity, world, config),
            Action::Explore => {
                self.state = AgentState::Exploring;
                self.drift(dt, entity, config);
                true
            }
            Action::Patrol => self.execute_patrol(dt, entity, config),
            Action::Observe | Action::Wait => true,
        }
    }

    fn execute_attack(
        &mut self,
        dt: f64,
        entity: &mut dyn Entity,
        world: &WorldView,
        config: &DecisionConfig,
    ) -> bool {
        let position = match require_position(entity) {
            Ok(p) => p,
            Err(e) => {
                debug!(agent = %self.id, error = %e, "cannot engage");
                return false;
            }
        };
        let faction = entity.faction().map(str::to_owned);
        let enemies = world.enemies_near(
            position,
            config.enemy_scan_radius,
            self.id,
            faction.as_deref(),
        );
        let Some(target) = best_target(&enemies, position) else {
            self.target = None;
            return false;
        };
        self.target = Some(target.id);

        let Some(target_pos) = target.position else {
            return false;
        };
        if position.distance(target_pos) <= config.attack_range {
            let outcome = entity.attack(target.id);
            if outcome.performed() {
                self.state = AgentState::Attacking;
            } else {
                debug!(agent = %self.id, "attack capability missing");
            }
            outcome.performed()
        } else {
            let outcome = entity.move_towards(target_pos, self.move_speed, dt);
            if outcome.performed() {
                self.state = AgentState::Chasing;
            }
            outcome.performed()
        }
    }

    fn execute_defend(
        &mut self,
        dt: f64,
        entity: &mut dyn Entity,
        world: &WorldView,
        config: &DecisionConfig,
    ) -> bool {
        let mut performed = false;
        let defensive: Vec<String> = entity
            .skills()
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == "defense") && entity.skill_ready(&s.id))
            .map(|s| s.id.clone())
            .collect();
        if let Some(skill) = defensive.first() {
            performed |= entity.use_skill(skill).performed();
        }
        if let Some(safe) = self.safe_position(entity, world, config) {
            performed |= entity.move_towards(safe, self.move_speed, dt).performed();
        }
        performed
    }

    fn execute_heal(&mut self, entity: &mut dyn Entity) -> bool {
        self.state = AgentState::Healing;
        let healing: Vec<String> = entity
            .skills()
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == "heal") && entity.skill_ready(&s.id))
            .map(|s| s.id.clone())
            .collect();
        if let Some(skill) = healing.first() {
            if entity.use_skill(skill).performed() {
                return true;
            }
        }
        let outcome = entity.use_healing_item();
        if !outcome.performed() {
            debug!(agent = %self.id, "no healing capability");
        }
        outcome.performed()
    }

    fn execute_retreat(
        &mut self,
        dt: f64,
        entity: &mut dyn Entity,
        world: &WorldView,
        config: &DecisionConfig,
    ) -> bool {
        self.state = AgentState::Retreating;
        let Some(safe) = self.safe_position(entity, world, config) else {
            return false;
        };
        entity.move_towards(safe, self.move_speed, dt).performed()
    }

    fn execute_support(
        &mut self,
        dt: f64,
        entity: &mut dyn Entity,
        world: &WorldView,
        config: &DecisionConfig,
    ) -> bool {
        self.state = AgentState::Supporting;
        let position = match require_position(entity) {
            Ok(p) => p,
            Err(e) => {
                debug!(agent = %self.id, error = %e, "cannot support");
                return false;
            }
        };
        let faction = entity.faction().map(str::to_owned);
        let allies = world.allies_near(
            position,
            config.ally_scan_radius,
            self.id,
            faction.as_deref(),
        );
        let wounded = allies
            .iter()
            .filter(|a| a.health_ratio.is_some_and(|r| r < config.ally_help_threshold))
            .min_by(|a, b| {
                let ra = a.health_ratio.unwrap_or(1.0);
                let rb = b.health_ratio.unwrap_or(1.0);
                ra.total_cmp(&rb)
            });
        let Some(ally) = wounded else {
            return false;
        };

        let healing: Vec<String> = entity
            .skills()
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == "heal") && entity.skill_ready(&s.id))
            .map(|s| s.id.clone())
            .collect();
        if let Some(skill) = healing.first() {
            if entity.use_skill_on(skill, ally.id).performed() {
                return true;
            }
        }
        match ally.position {
            Some(p) => entity.move_towards(p, self.move_speed, dt).performed(),
            None => false,
        }
    }

    fn execute_patrol(&mut self, dt: f64, entity: &mut dyn Entity, config: &DecisionConfig) -> bool {
        self.state = AgentState::Exploring;
        let position = match require_position(entity) {
            Ok(p) => p,
            Err(e) => {
                debug!(agent = %self.id, error = %e, "cannot patrol");
                return false;
            }
        };

        if self.patrol_route.is_empty() {
            self.patrol_route = patrol_route(position, config.patrol_radius);
        }
        let Some(&waypoint) = self.patrol_route.first() else {
            return false;
        };

        if position.distance(waypoint) < config.patrol_arrive_distance {
            self.patrol_route.remove(0);
            if self.patrol_route.is_empty() {
                self.patrol_route = patrol_route(position, config.patrol_radius);
            }
            true
        } else {
            entity.move_towards(waypoint, self.move_speed, dt).performed()
        }
    }

    /// Wander re-aim inside a small disc around the current position.
    fn drift(&mut self, dt: f64, entity: &mut dyn Entity, config: &DecisionConfig) {
        let Some(position) = entity.position() else {
            return;
        };
        if !self.rng.gen_bool(0.1) {
            return;
        }
        let angle = self.rng.gen_range(0.0..std::f64::consts::TAU);
        let distance = self.rng.gen_range(0.0..config.patrol_radius);
        let target = Position::new(
            position.x + distance * angle.cos(),
            position.y + distance * angle.sin(),
        );
        let _ = entity.move_towards(target, self.move_speed, dt);
    }

    /// A point directly away from the enemy centroid.
    fn safe_position(
        &self,
        entity: &dyn Entity,
        world: &WorldView,
        config: &DecisionConfig,
    ) -> Option<Position> {
        let position = entity.position()?;
        let faction = entity.faction().map(str::to_owned);
        let enemies = world.enemies_near(
            position,
            config.enemy_scan_radius,
            self.id,
            faction.as_deref(),
        );
        let spots: Vec<Position> = enemies.iter().filter_map(|e| e.position).collect();
        if spots.is_empty() {
            return None;
        }
        let cx = spots.iter().map(|p| p.x).sum::<f64>() / spots.len() as f64;
        let cy = spots.iter().map(|p| p.y).sum::<f64>() / spots.len() as f64;
        let dx = position.x - cx;
        let dy = position.y - cy;
        let length = (dx * dx + dy * dy).sqrt();
        if length < f64::EPSILON {
            return None;
        }
        Some(Position::new(
            position.x + dx / length * config.retreat_distance,
            position.y + dy / length * config.retreat_distance,
        ))
    }

    // ------------------------------------------------------------------
    // Outcomes, learning, settling
    // ------------------------------------------------------------------

    fn record_outcome(
        &mut self,
        action: Action,
        success: bool,
        now: SimTime,
        memory: &mut MemoryStore,
    ) {
        let mut details = MemoryContent::new();
        details.insert("threat".into(), ContentValue::Num(self.threat));
        if let Some(enemy) = &self.context_enemy {
            details.insert("enemy_kind".into(), ContentValue::Text(enemy.clone()));
        }

        self.outcomes.push_back(OutcomeRecord {
            action,
            success,
            at: now,
            details: details.clone(),
        });
        if self.outcomes.len() > OUTCOME_CAP {
            // Keep only the most recent window.
            while self.outcomes.len() > OUTCOME_TRIM {
                self.outcomes.pop_front();
            }
        }

        // Significant outcomes feed generational memory.
        let combat_relevant = matches!(
            action,
            Action::Attack | Action::Charge | Action::Retreat | Action::Flee | Action::Heal | Action::Support
        );
        if combat_relevant && (self.threat >= 0.3 || !success) {
            let key = if success { "successful_action" } else { "failed_action" };
            details.insert(key.into(), ContentValue::Text(action.as_str().to_string()));
            if self.priority == Priority::Critical {
                details.insert("critical_situation".into(), ContentValue::Flag(true));
            }
            memory.add_memory(
                MemoryKind::CombatExperience,
                details,
                self.threat.max(0.3),
                self.emotion.fear,
            );
        }
    }

    /// Replay the recent outcome window into slow personality nudges.
    fn reinforce(&mut self, config: &DecisionConfig, health: Option<f64>) {
        let start = self.outcomes.len().saturating_sub(REINFORCEMENT_WINDOW);
        let recent: Vec<(Action, bool)> = self
            .outcomes
            .iter()
            .skip(start)
            .map(|o| (o.action, o.success))
            .collect();
        for (action, success) in recent {
            self.personality.reinforce(action, success, config);
        }
        if health.is_some_and(|r| r <= config.low_health) {
            self.personality.adapt_to_low_health(config);
        }
    }

    /// All states settle back to Idle once threat and opportunity subside.
    fn settle(&mut self, config: &DecisionConfig) {
        let calm =
            self.threat <= config.idle_threshold && self.opportunity <= config.idle_threshold;
        let active = matches!(
            self.state,
            AgentState::Chasing
                | AgentState::Attacking
                | AgentState::Retreating
                | AgentState::Healing
                | AgentState::Supporting
                | AgentState::Formation
        );
        if calm && active {
            self.state = AgentState::Idle;
            self.target = None;
        }
    }
}

/// Position, or the typed capability error the caller downgrades to a
/// debug log (a positionless entity skips position-dependent behavior).
fn require_position(entity: &dyn Entity) -> Result<Position> {
    entity.position().ok_or(AiError::CapabilityMissing {
        capability: "position",
    })
}

/// Threat contribution of one nearby enemy: level, remaining health, and
/// proximity.
fn enemy_threat(enemy: &AgentObservation, from: Position) -> f64 {
    let mut threat = f64::from(enemy.level) * 0.1;
    if let Some(ratio) = enemy.health_ratio {
        threat += ratio * 0.2;
    }
    let distance = enemy
        .position
        .map_or(f64::INFINITY, |p| p.distance(from));
    if distance < CLOSE_RANGE {
        threat += 0.3;
    } else if distance < MID_RANGE {
        threat += 0.1;
    }
    threat
}

/// Best attack target: close, frail, and dangerous score highest.
fn best_target<'a>(
    enemies: &[&'a AgentObservation],
    from: Position,
) -> Option<&'a AgentObservation> {
    enemies
        .iter()
        .map(|&enemy| {
            let distance = enemy
                .position
                .map_or(f64::INFINITY, |p| p.distance(from));
            let mut score = ((100.0 - distance) / 100.0).max(0.0);
            if let Some(ratio) = enemy.health_ratio {
                score += (1.0 - ratio) * 0.5;
            }
            score += enemy_threat(enemy, from) * 0.3;
            (score, enemy)
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, enemy)| enemy)
}

fn nearest<'a>(
    observations: &[&'a AgentObservation],
    from: Position,
) -> Option<&'a AgentObservation> {
    observations
        .iter()
        .filter(|o| o.position.is_some())
        .min_by(|a, b| {
            let da = a.position.map_or(f64::INFINITY, |p| p.distance(from));
            let db = b.position.map_or(f64::INFINITY, |p| p.distance(from));
            da.total_cmp(&db)
        })
        .copied()
}

/// Four compass waypoints on a circle around the anchor.
fn patrol_route(anchor: Position, radius: f64) -> Vec<Position> {
    (0..4)
        .map(|i| {
            let angle = f64::from(i) * std::f64::consts::FRAC_PI_2;
            Position::new(
                anchor.x + radius * angle.cos(),
                anchor.y + radius * angle.sin(),
            )
        })
        .collect()
}
