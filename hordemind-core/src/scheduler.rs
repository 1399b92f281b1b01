//! The fleet scheduler.
//!
//! Owns the agent registry, the spatial index, the group coordinators,
//! the shared memory store, the emotional layer, and the tactical
//! advisor — the one context object a game constructs and drives. There
//! is no global state; independent simulations are just independent
//! schedulers.
//!
//! `tick(dt)` is the whole control flow: purge dead references, snapshot
//! the world, select a bounded candidate set ordered by (priority,
//! staleness), run each candidate's decision core, run the group
//! coordinators, and republish the spatial index. The candidate cap is
//! the backpressure mechanism: under overload, the lowest-priority and
//! most-recently-serviced agents starve for a tick and catch up later —
//! agents are delayed, never dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{Priority, StateSummary};
use crate::config::AiConfig;
use crate::decision::DecisionCore;
use crate::emotion::{EmotionalInfluenceLayer, TriggerKind};
use crate::entity::{health_ratio, EntityRef, EntityWeak};
use crate::error::{AiError, Result};
use crate::group::{GroupCoordinator, GroupMember, GroupMessage};
use crate::memory::MemoryStore;
use crate::spatial::SpatialGrid;
use crate::tactics::{NullAdvisor, TacticalAdvisor};
use crate::types::{AgentId, AgentTier, GroupId, Position, SimTime};

// ---------------------------------------------------------------------------
// World snapshot
// ---------------------------------------------------------------------------

/// What one agent looks like from the outside, captured once per tick.
#[derive(Debug, Clone)]
pub struct AgentObservation {
    /// The observed agent.
    pub id: AgentId,
    /// Position, if placed.
    pub position: Option<Position>,
    /// Faction tag, if declared.
    pub faction: Option<String>,
    /// Health fraction, if the entity has health.
    pub health_ratio: Option<f64>,
    /// Game level (1 when undeclared).
    pub level: u32,
    /// Importance tier.
    pub tier: AgentTier,
}

/// Read-only snapshot of the fleet for one tick's updates.
///
/// Decision cores query it instead of touching other agents' entities,
/// which is what keeps per-agent updates independent (and parallelizable
/// in principle): per-agent state plus this snapshot, nothing else.
#[derive(Debug)]
pub struct WorldView {
    now: SimTime,
    focus: Option<Position>,
    grid: SpatialGrid,
    observations: HashMap<AgentId, AgentObservation>,
}

impl WorldView {
    /// The tick's timestamp.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// The focus point (player/camera), if the game set one.
    #[must_use]
    pub fn focus(&self) -> Option<Position> {
        self.focus
    }

    /// Observation of a specific agent.
    #[must_use]
    pub fn observation(&self, id: AgentId) -> Option<&AgentObservation> {
        self.observations.get(&id)
    }

    /// Agents within `radius` of `origin`, exact-filtered (the grid's
    /// false positives are removed here), excluding `exclude`.
    #[must_use]
    pub fn agents_near(
        &self,
        origin: Position,
        radius: f64,
        exclude: AgentId,
    ) -> Vec<&AgentObservation> {
        self.grid
            .query_radius(origin, radius)
            .into_iter()
            .filter(|id| *id != exclude)
            .filter_map(|id| self.observations.get(&id))
            .filter(|o| {
                o.position
                    .is_some_and(|p| p.distance(origin) <= radius)
            })
            .collect()
    }

    /// Nearby agents of a *different* declared faction. Agents without a
    /// faction are neutral: neither enemy nor ally.
    #[must_use]
    pub fn enemies_near(
        &self,
        origin: Position,
        radius: f64,
        exclude: AgentId,
        own_faction: Option<&str>,
    ) -> Vec<&AgentObservation> {
        let Some(mine) = own_faction else {
            return Vec::new();
        };
        self.agents_near(origin, radius, exclude)
            .into_iter()
            .filter(|o| o.faction.as_deref().is_some_and(|f| f != mine))
            .collect()
    }

    /// Nearby agents of the *same* declared faction.
    #[must_use]
    pub fn allies_near(
        &self,
        origin: Position,
        radius: f64,
        exclude: AgentId,
        own_faction: Option<&str>,
    ) -> Vec<&AgentObservation> {
        let Some(mine) = own_faction else {
            return Vec::new();
        };
        self.agents_near(origin, radius, exclude)
            .into_iter()
            .filter(|o| o.faction.as_deref() == Some(mine))
            .collect()
    }

    pub(crate) fn from_parts(
        now: SimTime,
        focus: Option<Position>,
        grid: SpatialGrid,
        observations: HashMap<AgentId, AgentObservation>,
    ) -> Self {
        Self {
            now,
            focus,
            grid,
            observations,
        }
    }

    fn into_grid(self) -> SpatialGrid {
        self.grid
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Per-agent settings supplied at registration.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    /// Group to join, creating its coordinator lazily.
    pub group: Option<GroupId>,
    /// Start excluded from scheduling when `true`.
    pub inactive: bool,
    /// Initial priority override; assessment recomputes it later.
    pub priority: Option<Priority>,
}

/// Fleet-level counters for telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Agents currently eligible for scheduling.
    pub active_count: usize,
    /// All registered agents.
    pub total_count: usize,
    /// Live group coordinators.
    pub group_count: usize,
    /// Wall-clock seconds the last tick took.
    pub last_tick_duration_secs: f64,
}

struct AgentSlot {
    handle: EntityWeak,
    ptr_key: usize,
    core: DecisionCore,
    last_update: SimTime,
    active: bool,
    group: Option<GroupId>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The fleet manager: registry, budgeted tick, and everything the
/// decision cores share.
pub struct Scheduler {
    config: AiConfig,
    now: SimTime,
    agents: HashMap<AgentId, AgentSlot>,
    by_ptr: HashMap<usize, AgentId>,
    grid: SpatialGrid,
    groups: HashMap<GroupId, GroupCoordinator>,
    memory: RwLock<MemoryStore>,
    emotions: EmotionalInfluenceLayer,
    advisor: Box<dyn TacticalAdvisor>,
    focus: Option<Position>,
    last_tick_duration: f64,
    last_stats_log: SimTime,
    tick_count: u64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("agents", &self.agents.len())
            .field("groups", &self.groups.len())
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler with an in-memory store and no tactical advisor.
    #[must_use]
    pub fn new(config: AiConfig) -> Self {
        let memory = MemoryStore::in_memory(config.memory.clone());
        Self::with_parts(config, memory, Box::new(NullAdvisor))
    }

    /// Create a scheduler whose memory persists to the SQLite archive at
    /// `path`.
    ///
    /// # Errors
    /// Returns [`AiError::Database`] if the archive cannot be opened.
    pub fn with_archive<P: AsRef<std::path::Path>>(config: AiConfig, path: P) -> Result<Self> {
        let memory = MemoryStore::open(config.memory.clone(), &config.persistence, path)?;
        Ok(Self::with_parts(config, memory, Box::new(NullAdvisor)))
    }

    /// Create a scheduler from explicit parts (store and advisor).
    #[must_use]
    pub fn with_parts(
        config: AiConfig,
        memory: MemoryStore,
        advisor: Box<dyn TacticalAdvisor>,
    ) -> Self {
        let grid = SpatialGrid::new(config.scheduler.cell_size);
        let emotions = EmotionalInfluenceLayer::new(config.emotion.clone());
        Self {
            config,
            now: SimTime::ZERO,
            agents: HashMap::new(),
            by_ptr: HashMap::new(),
            grid,
            groups: HashMap::new(),
            memory: RwLock::new(memory),
            emotions,
            advisor,
            focus: None,
            last_tick_duration: 0.0,
            last_stats_log: SimTime::ZERO,
            tick_count: 0,
        }
    }

    /// Current simulation time.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Set (or clear) the focus point that drives update-mode tiering.
    pub fn set_focus(&mut self, focus: Option<Position>) {
        self.focus = focus;
    }

    /// The shared memory store, behind its single writer lock.
    #[must_use]
    pub fn memory(&self) -> &RwLock<MemoryStore> {
        &self.memory
    }

    /// The emotional influence layer (read-only access).
    #[must_use]
    pub fn emotions(&self) -> &EmotionalInfluenceLayer {
        &self.emotions
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register an entity and create its decision core.
    ///
    /// # Errors
    /// Returns [`AiError::AlreadyRegistered`] if this entity handle is
    /// already registered.
    pub fn register(&mut self, entity: &EntityRef, agent_config: AgentConfig) -> Result<AgentId> {
        let ptr_key = entity_key(entity);
        if let Some(existing) = self.by_ptr.get(&ptr_key) {
            return Err(AiError::AlreadyRegistered(*existing));
        }

        let id = AgentId::new();
        let position = {
            let guard = entity.lock();
            let mut core = DecisionCore::new(id, &*guard, &self.config.decision);
            if let Some(priority) = agent_config.priority {
                core.set_priority(priority);
            }
            let position = guard.position();
            let slot = AgentSlot {
                handle: Arc::downgrade(entity),
                ptr_key,
                core,
                last_update: self.now,
                active: !agent_config.inactive,
                group: agent_config.group.clone(),
            };
            self.agents.insert(id, slot);
            position
        };

        if let Some(pos) = position {
            self.grid.insert(id, pos);
        }
        if let Some(group) = agent_config.group {
            self.groups
                .entry(group.clone())
                .or_insert_with(|| GroupCoordinator::new(group));
        }
        self.by_ptr.insert(ptr_key, id);

        info!(agent = %id, total = self.agents.len(), "agent registered");
        Ok(id)
    }

    /// Unregister by entity handle. Returns `false` if unknown.
    pub fn unregister(&mut self, entity: &EntityRef) -> bool {
        match self.by_ptr.get(&entity_key(entity)).copied() {
            Some(id) => self.unregister_id(id),
            None => false,
        }
    }

    /// Unregister by agent id. Returns `false` if unknown.
    pub fn unregister_id(&mut self, id: AgentId) -> bool {
        let Some(slot) = self.agents.remove(&id) else {
            return false;
        };
        self.by_ptr.remove(&slot.ptr_key);
        self.grid.remove(id);
        self.emotions.remove_agent(id);

        if let Some(group) = &slot.group {
            let empty = !self.agents.values().any(|s| s.group.as_ref() == Some(group));
            if empty {
                self.groups.remove(group);
                debug!(group = %group, "group emptied; coordinator removed");
            }
        }

        info!(agent = %id, total = self.agents.len(), "agent unregistered");
        true
    }

    /// The agent id registered for this entity handle, if any.
    #[must_use]
    pub fn agent_id_of(&self, entity: &EntityRef) -> Option<AgentId> {
        self.by_ptr.get(&entity_key(entity)).copied()
    }

    /// Resolve an agent id back to a live entity handle.
    ///
    /// # Errors
    /// Returns [`AiError::UnknownAgent`] for unregistered ids and
    /// [`AiError::DeadReference`] when the registry entry exists but the
    /// game has dropped the entity (the next tick's purge will remove it).
    pub fn entity_of(&self, id: AgentId) -> Result<EntityRef> {
        let slot = self.agents.get(&id).ok_or(AiError::UnknownAgent(id))?;
        slot.handle.upgrade().ok_or(AiError::DeadReference(id))
    }

    // ------------------------------------------------------------------
    // Scheduling metadata
    // ------------------------------------------------------------------

    /// Override an agent's priority from the next tick. Returns `false`
    /// if the entity is unknown.
    pub fn set_priority(&mut self, entity: &EntityRef, priority: Priority) -> bool {
        self.agent_id_of(entity)
            .is_some_and(|id| self.set_priority_by_id(id, priority).is_ok())
    }

    /// Override an agent's priority by id.
    ///
    /// # Errors
    /// Returns [`AiError::UnknownAgent`] if the id is not registered.
    pub fn set_priority_by_id(&mut self, id: AgentId, priority: Priority) -> Result<()> {
        let slot = self.agents.get_mut(&id).ok_or(AiError::UnknownAgent(id))?;
        slot.core.set_priority(priority);
        Ok(())
    }

    /// Include or exclude an agent from scheduling. Returns `false` if
    /// the entity is unknown.
    pub fn set_active(&mut self, entity: &EntityRef, active: bool) -> bool {
        self.agent_id_of(entity)
            .is_some_and(|id| self.set_active_by_id(id, active).is_ok())
    }

    /// Include or exclude an agent from scheduling, by id.
    ///
    /// # Errors
    /// Returns [`AiError::UnknownAgent`] if the id is not registered.
    pub fn set_active_by_id(&mut self, id: AgentId, active: bool) -> Result<()> {
        let slot = self.agents.get_mut(&id).ok_or(AiError::UnknownAgent(id))?;
        slot.active = active;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the fleet by `dt` seconds.
    ///
    /// Never panics or propagates per-agent failures; a failing agent is
    /// logged and the rest of the tick proceeds.
    pub fn tick(&mut self, dt: f64) {
        let started = Instant::now();
        self.now.advance(dt);
        let now = self.now;

        // 1. Purge dead references, observing the survivors as we go.
        let mut dead: Vec<AgentId> = Vec::new();
        let mut observations: HashMap<AgentId, AgentObservation> = HashMap::new();
        for (id, slot) in &self.agents {
            match slot.handle.upgrade() {
                None => dead.push(*id),
                Some(arc) => {
                    let guard = arc.lock();
                    observations.insert(
                        *id,
                        AgentObservation {
                            id: *id,
                            position: guard.position(),
                            faction: guard.faction().map(str::to_owned),
                            health_ratio: health_ratio(&*guard),
                            level: guard.level().unwrap_or(1),
                            tier: guard.tier(),
                        },
                    );
                }
            }
        }
        for id in dead {
            debug!(agent = %id, "backing entity gone; purging");
            self.unregister_id(id);
        }

        // 2. Snapshot: a fresh grid over current positions.
        let mut grid = SpatialGrid::new(self.config.scheduler.cell_size);
        for obs in observations.values() {
            if let Some(pos) = obs.position {
                grid.insert(obs.id, pos);
            }
        }
        let view = WorldView::from_parts(now, self.focus, grid, observations);

        // 3. Candidate set: (priority asc, staleness desc, id) then cap.
        let mut eligible: Vec<(Priority, OrderedFloat<f64>, AgentId)> = self
            .agents
            .iter()
            .filter(|(_, slot)| slot.active)
            .filter_map(|(id, slot)| {
                let staleness = now.since(slot.last_update);
                (staleness >= slot.core.update_interval())
                    .then_some((slot.core.priority(), OrderedFloat(staleness), *id))
            })
            .collect();
        eligible.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
        eligible.truncate(self.config.scheduler.max_active_entities);

        // 4. Per-agent updates, each inside its own failure boundary.
        for (_, _, id) in &eligible {
            let Some(slot) = self.agents.get_mut(id) else {
                continue;
            };
            let Some(arc) = slot.handle.upgrade() else {
                continue;
            };
            let mut entity = arc.lock();
            let mut store = self.memory.write();
            let result = slot.core.update(
                dt,
                &mut *entity,
                &view,
                &mut store,
                &self.emotions,
                self.advisor.as_ref(),
                &self.config.decision,
            );
            // Serviced either way; a failing agent must not hog the budget.
            slot.last_update = now;
            if let Err(e) = result {
                warn!(agent = %id, error = %e, "agent update failed");
            }
        }

        // 5. Group coordination, after every member has its fresh plan.
        let ttl = self.config.scheduler.group_message_ttl;
        let mut members_by_group: HashMap<GroupId, Vec<GroupMember<'_>>> = HashMap::new();
        for (id, slot) in &mut self.agents {
            if let Some(group) = slot.group.clone() {
                let alive = slot.handle.strong_count() > 0;
                members_by_group.entry(group).or_default().push(GroupMember {
                    id: *id,
                    alive,
                    core: &mut slot.core,
                });
            }
        }
        for (group_id, coordinator) in &mut self.groups {
            let mut members = members_by_group.remove(group_id).unwrap_or_default();
            coordinator.update(&mut members, now, ttl);
        }

        // 6. Housekeeping and index republication.
        self.emotions.cleanup_expired(now);
        self.grid = view.into_grid();

        self.last_tick_duration = started.elapsed().as_secs_f64();
        self.tick_count += 1;
        if now.since(self.last_stats_log) > self.config.scheduler.stats_log_interval {
            let stats = self.performance_stats();
            info!(
                active = stats.active_count,
                total = stats.total_count,
                groups = stats.group_count,
                tick_secs = stats.last_tick_duration_secs,
                ticks = self.tick_count,
                "fleet stats"
            );
            self.last_stats_log = now;
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Live entities within `radius` of `pos`, optionally filtered by
    /// faction. Dead references are skipped.
    #[must_use]
    pub fn query_nearby(
        &self,
        pos: Position,
        radius: f64,
        faction_filter: Option<&str>,
    ) -> Vec<(AgentId, EntityRef)> {
        let mut found = Vec::new();
        for id in self.grid.query_radius(pos, radius) {
            let Some(slot) = self.agents.get(&id) else {
                continue;
            };
            let Some(arc) = slot.handle.upgrade() else {
                continue;
            };
            let keep = {
                let guard = arc.lock();
                let within = guard
                    .position()
                    .is_some_and(|p| p.distance(pos) <= radius);
                let faction_ok = faction_filter
                    .is_none_or(|f| guard.faction() == Some(f));
                within && faction_ok
            };
            if keep {
                found.push((id, arc));
            }
        }
        found
    }

    /// Telemetry snapshot of one agent's decision state.
    #[must_use]
    pub fn state_summary(&self, id: AgentId) -> Option<StateSummary> {
        self.agents.get(&id).map(|slot| slot.core.state_summary())
    }

    /// Fleet-level counters.
    #[must_use]
    pub fn performance_stats(&self) -> PerformanceStats {
        PerformanceStats {
            active_count: self.agents.values().filter(|s| s.active).count(),
            total_count: self.agents.len(),
            group_count: self.groups.len(),
            last_tick_duration_secs: self.last_tick_duration,
        }
    }

    // ------------------------------------------------------------------
    // Emotion and memory pass-throughs
    // ------------------------------------------------------------------

    /// Fire an emotional trigger for an agent.
    ///
    /// # Errors
    /// Returns [`AiError::UnknownAgent`] if the id is not registered.
    pub fn process_trigger(
        &mut self,
        id: AgentId,
        trigger: TriggerKind,
        factors: &std::collections::BTreeMap<String, f64>,
    ) -> Result<()> {
        if !self.agents.contains_key(&id) {
            return Err(AiError::UnknownAgent(id));
        }
        let mut store = self.memory.write();
        self.emotions
            .process_trigger(id, trigger, factors, self.now, &mut store);
        Ok(())
    }

    /// Fold the shared memory store into the next generation.
    ///
    /// # Errors
    /// Propagates persistence failures from the store.
    pub fn advance_generation(&mut self, survival_rate: f64, achievements: &[String]) -> Result<()> {
        self.memory.write().advance_generation(survival_rate, achievements)
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// The elected leader of a group, if the group exists.
    #[must_use]
    pub fn group_leader(&self, group: &GroupId) -> Option<AgentId> {
        self.groups.get(group).and_then(GroupCoordinator::leader)
    }

    /// Queue a message in a group. Returns `false` if the group does not
    /// exist.
    pub fn send_group_message(&mut self, group: &GroupId, message: GroupMessage) -> bool {
        match self.groups.get_mut(group) {
            Some(coordinator) => {
                coordinator.send(message);
                true
            }
            None => false,
        }
    }
}

/// Thin pointer identity of an entity handle, used to detect
/// re-registration of the same entity.
fn entity_key(entity: &EntityRef) -> usize {
    Arc::as_ptr(entity).cast::<()>() as usize
}
