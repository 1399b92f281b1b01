//! Integration tests — end-to-end fleet flows.
//!
//! Full lifecycle scenarios: register → tick → observe, group
//! coordination, emotional triggers, and generational memory persistence
//! round-trips through a real SQLite archive.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use hordemind_core::config::AiConfig;
use hordemind_core::entity::{CapabilityOutcome, Entity, EntityRef};
use hordemind_core::memory::archive::GenerationArchive;
use hordemind_core::memory::{ContentValue, MemoryContent, MemoryKind, MemoryStore};
use hordemind_core::scheduler::{AgentConfig, Scheduler};
use hordemind_core::types::{AgentId, GroupId, Position};
use hordemind_core::{AgentState, AiError, Priority, TriggerKind};

// ---------------------------------------------------------------------------
// Test entity
// ---------------------------------------------------------------------------

struct Critter {
    pos: Position,
    health: f64,
    max_health: f64,
    faction: &'static str,
    archetype: Option<&'static str>,
    heals_used: u32,
}

impl Critter {
    fn new(x: f64, y: f64, faction: &'static str) -> Self {
        Self {
            pos: Position::new(x, y),
            health: 100.0,
            max_health: 100.0,
            faction,
            archetype: None,
            heals_used: 0,
        }
    }
}

impl Entity for Critter {
    fn position(&self) -> Option<Position> {
        Some(self.pos)
    }
    fn health(&self) -> Option<f64> {
        Some(self.health)
    }
    fn max_health(&self) -> Option<f64> {
        Some(self.max_health)
    }
    fn faction(&self) -> Option<&str> {
        Some(self.faction)
    }
    fn archetype(&self) -> Option<&str> {
        self.archetype
    }
    fn attack(&mut self, _target: AgentId) -> CapabilityOutcome {
        CapabilityOutcome::Performed
    }
    fn move_towards(&mut self, target: Position, speed: f64, dt: f64) -> CapabilityOutcome {
        let step = speed * dt;
        let distance = self.pos.distance(target);
        if distance > f64::EPSILON {
            let t = (step / distance).min(1.0);
            self.pos = Position::new(
                self.pos.x + (target.x - self.pos.x) * t,
                self.pos.y + (target.y - self.pos.y) * t,
            );
        }
        CapabilityOutcome::Performed
    }
    fn use_healing_item(&mut self) -> CapabilityOutcome {
        self.heals_used += 1;
        self.health = (self.health + 25.0).min(self.max_health);
        CapabilityOutcome::Performed
    }
}

fn spawn(critter: Critter) -> (Arc<Mutex<Critter>>, EntityRef) {
    let concrete = Arc::new(Mutex::new(critter));
    let handle: EntityRef = concrete.clone();
    (concrete, handle)
}

// ---------------------------------------------------------------------------
// Fleet lifecycle: register → tick → observe → unregister
// ---------------------------------------------------------------------------

#[test]
fn fleet_lifecycle() {
    let mut scheduler = Scheduler::new(AiConfig::default());

    let handles: Vec<EntityRef> = (0..6)
        .map(|i| {
            let faction = if i % 2 == 0 { "wolves" } else { "boars" };
            spawn(Critter::new(f64::from(i) * 30.0, 0.0, faction)).1
        })
        .collect();
    let ids: Vec<AgentId> = handles
        .iter()
        .map(|h| scheduler.register(h, AgentConfig::default()).expect("register"))
        .collect();

    for _ in 0..5 {
        scheduler.tick(0.2);
    }

    let stats = scheduler.performance_stats();
    assert_eq!(stats.total_count, 6);
    assert_eq!(stats.active_count, 6);

    for id in &ids {
        let summary = scheduler.state_summary(*id).expect("summary");
        // Priority is always one of the four tiers, derived from the
        // last-computed threat/opportunity values.
        assert!(matches!(
            summary.priority,
            Priority::Critical | Priority::High | Priority::Medium | Priority::Low
        ));
        assert!((0.0..=1.0).contains(&summary.threat));
        assert!((0.0..=1.0).contains(&summary.opportunity));
        assert!((0.0..=1.0).contains(&summary.morale));
    }

    assert!(scheduler.unregister(&handles[0]));
    assert_eq!(scheduler.performance_stats().total_count, 5);
}

// ---------------------------------------------------------------------------
// Wounded agent near an enemy: heal enters the plan at High priority
// ---------------------------------------------------------------------------

#[test]
fn wounded_agent_emergency_behavior() {
    let mut scheduler = Scheduler::new(AiConfig::default());

    let mut wounded = Critter::new(0.0, 0.0, "wolves");
    wounded.health = 30.0;
    let (concrete, handle) = spawn(wounded);
    let id = scheduler.register(&handle, AgentConfig::default()).expect("register");

    // Alone: low health by itself must not reach Critical.
    scheduler.tick(0.2);
    let summary = scheduler.state_summary(id).expect("summary");
    assert_ne!(summary.priority, Priority::Critical);

    // A rival appears mid-range: threat crosses 0.5, the agent reacts.
    let (_enemy_concrete, enemy_handle) = spawn(Critter::new(70.0, 0.0, "boars"));
    scheduler.register(&enemy_handle, AgentConfig::default()).expect("register");
    for _ in 0..3 {
        scheduler.tick(0.2);
    }

    let summary = scheduler.state_summary(id).expect("summary");
    assert_ne!(summary.state, AgentState::Idle);
    assert!(summary.threat > 0.0);
    // The wounded agent either healed or withdrew; both are emergency
    // responses to the same assessment.
    let critter = concrete.lock();
    assert!(
        critter.heals_used > 0 || critter.pos.x < 0.0 || critter.pos != Position::new(0.0, 0.0),
        "agent did not react to danger"
    );
}

// ---------------------------------------------------------------------------
// Group coordination: leadership elects the leader, followers mirror
// ---------------------------------------------------------------------------

#[test]
fn group_elects_highest_leadership() {
    let mut scheduler = Scheduler::new(AiConfig::default());
    let squad = GroupId::new("squad1");

    let (_f, follower) = spawn(Critter::new(0.0, 0.0, "wolves"));
    let mut chief_critter = Critter::new(10.0, 0.0, "wolves");
    chief_critter.archetype = Some("leader");
    let (_c, chief) = spawn(chief_critter);

    let follower_id = scheduler
        .register(&follower, AgentConfig { group: Some(squad.clone()), ..AgentConfig::default() })
        .expect("register follower");
    let chief_id = scheduler
        .register(&chief, AgentConfig { group: Some(squad.clone()), ..AgentConfig::default() })
        .expect("register chief");

    scheduler.tick(0.2);

    assert_eq!(scheduler.group_leader(&squad), Some(chief_id));
    assert_ne!(scheduler.group_leader(&squad), Some(follower_id));
}

// ---------------------------------------------------------------------------
// Emotional triggers flow into mood and generational memory
// ---------------------------------------------------------------------------

#[test]
fn triggers_reach_mood_and_memory() {
    let mut scheduler = Scheduler::new(AiConfig::default());
    let (_c, handle) = spawn(Critter::new(0.0, 0.0, "wolves"));
    let id = scheduler.register(&handle, AgentConfig::default()).expect("register");

    let mut factors = BTreeMap::new();
    factors.insert("enemy_strength".to_string(), 150.0);
    scheduler
        .process_trigger(id, TriggerKind::NearDeath, &factors)
        .expect("trigger");

    let mood = scheduler.emotions().mood(id).expect("mood exists");
    assert!(mood.stability < 0.8);

    let store = scheduler.memory().read();
    assert!(
        store.records().any(|r| r.kind == MemoryKind::EmotionalTrauma),
        "near-death must leave a trauma record"
    );
    drop(store);

    // Unknown agents are rejected, not silently accepted.
    let ghost = AgentId::new();
    assert!(matches!(
        scheduler.process_trigger(ghost, TriggerKind::Victory, &BTreeMap::new()),
        Err(AiError::UnknownAgent(_))
    ));
}

// ---------------------------------------------------------------------------
// Generational persistence: advance → restart → restore
// ---------------------------------------------------------------------------

fn combat_memory(enemy: &str) -> MemoryContent {
    let mut content = MemoryContent::new();
    content.insert("enemy_kind".into(), ContentValue::Text(enemy.into()));
    content.insert("victory".into(), ContentValue::Flag(true));
    content
}

#[test]
fn generations_survive_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("horde_memory.db");
    let config = AiConfig::default();

    {
        let mut scheduler =
            Scheduler::with_archive(config.clone(), &db_path).expect("open archive");
        {
            let mut store = scheduler.memory().write();
            store.add_memory(MemoryKind::CombatExperience, combat_memory("troll"), 0.9, 0.7);
            store.add_memory(MemoryKind::SurvivalStrategy, MemoryContent::new(), 0.6, 0.2);
            assert_eq!(store.generation(), 1);
        }
        scheduler
            .advance_generation(0.75, &["cleared_the_warrens".to_string()])
            .expect("advance");
        assert_eq!(scheduler.memory().read().generation(), 2);
    }

    // Fresh process, same archive: the evolved state comes back.
    let scheduler = Scheduler::with_archive(config, &db_path).expect("reopen");
    let store = scheduler.memory().read();
    assert_eq!(store.generation(), 2);
    assert_eq!(store.len(), 2);
    assert!(store.records().any(|r| r.kind == MemoryKind::CombatExperience));
}

#[test]
fn advancing_twice_increments_twice() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("gen_twice.db");
    let config = AiConfig::default();

    let mut store = MemoryStore::open(config.memory.clone(), &config.persistence, &db_path)
        .expect("open");
    store.add_memory(MemoryKind::EnemyPatterns, combat_memory("boss"), 0.8, 0.5);

    store.advance_generation(0.5, &[]).expect("first");
    assert_eq!(store.generation(), 2);
    store.advance_generation(0.5, &[]).expect("second");
    assert_eq!(store.generation(), 3);
}

// ---------------------------------------------------------------------------
// Corrupt archive falls back to an empty store, never a crash
// ---------------------------------------------------------------------------

#[test]
fn corrupt_archive_degrades_to_fresh_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("corrupt.db");
    let config = AiConfig::default();

    {
        let mut store = MemoryStore::open(config.memory.clone(), &config.persistence, &db_path)
            .expect("open");
        store.add_memory(MemoryKind::CombatExperience, combat_memory("troll"), 0.9, 0.7);
        store.advance_generation(0.5, &[]).expect("advance");
    }

    // Vandalize the persisted generation the index points at.
    {
        let archive =
            GenerationArchive::open(&db_path, &config.persistence).expect("open raw");
        let generation = archive
            .current_generation()
            .expect("query")
            .expect("index present");
        archive
            .corrupt_generation_for_test(generation, b"\xde\xad\xbe\xef")
            .expect("corrupt");
    }

    let store = MemoryStore::open(config.memory.clone(), &config.persistence, &db_path)
        .expect("reopen must not fail");
    assert!(store.is_empty(), "corrupt data must yield an empty store");
    assert_eq!(store.generation(), 1);
}

// ---------------------------------------------------------------------------
// Backpressure: every agent is eventually serviced under a tiny budget
// ---------------------------------------------------------------------------

#[test]
fn tiny_budget_services_everyone_eventually() {
    let mut config = AiConfig::default();
    config.scheduler.max_active_entities = 1;
    let mut scheduler = Scheduler::new(config);

    let handles: Vec<EntityRef> = (0..3)
        .map(|i| spawn(Critter::new(f64::from(i) * 500.0, 0.0, "wolves")).1)
        .collect();
    let ids: Vec<AgentId> = handles
        .iter()
        .map(|h| scheduler.register(h, AgentConfig::default()).expect("register"))
        .collect();

    // Budget 1, three agents: three ticks must cycle through all of them
    // because skipped agents only grow staler.
    for _ in 0..3 {
        scheduler.tick(1.0);
    }
    for id in ids {
        let summary = scheduler.state_summary(id).expect("summary");
        assert_ne!(summary.state, AgentState::Idle, "agent {id} was never serviced");
    }
}

// ---------------------------------------------------------------------------
// query_nearby resolves only live, in-radius entities
// ---------------------------------------------------------------------------

#[test]
fn query_nearby_drops_dead_and_far() {
    let mut scheduler = Scheduler::new(AiConfig::default());
    let (_a, near) = spawn(Critter::new(10.0, 0.0, "wolves"));
    let (_b, far) = spawn(Critter::new(9_000.0, 0.0, "wolves"));
    let (_c, doomed) = spawn(Critter::new(20.0, 0.0, "wolves"));

    scheduler.register(&near, AgentConfig::default()).expect("register");
    scheduler.register(&far, AgentConfig::default()).expect("register");
    scheduler.register(&doomed, AgentConfig::default()).expect("register");
    scheduler.tick(0.1);

    // Kill one entity between ticks; the query must skip it even before
    // the next purge runs.
    drop(_c);
    drop(doomed);

    let found = scheduler.query_nearby(Position::new(0.0, 0.0), 200.0, None);
    assert_eq!(found.len(), 1);
}
