//! HORDEMIND benchmark suite.
//!
//! Targets that keep the engine honest about its real-time contract:
//!   fleet_tick_200_agents ........ bounded by the candidate cap
//!   memory_influence_100_records . the per-decision memory read path
//!   spatial_query_500_agents ..... one radius query on a warm grid

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parking_lot::Mutex;

use hordemind_core::config::AiConfig;
use hordemind_core::entity::{CapabilityOutcome, Entity, EntityRef};
use hordemind_core::memory::{ContentValue, MemoryContent, MemoryKind, MemoryStore};
use hordemind_core::scheduler::{AgentConfig, Scheduler};
use hordemind_core::spatial::SpatialGrid;
use hordemind_core::types::{AgentId, DecisionContext, Position};
use hordemind_core::weights::Action;

struct BenchCritter {
    pos: Position,
    health: f64,
    faction: &'static str,
}

impl Entity for BenchCritter {
    fn position(&self) -> Option<Position> {
        Some(self.pos)
    }
    fn health(&self) -> Option<f64> {
        Some(self.health)
    }
    fn max_health(&self) -> Option<f64> {
        Some(100.0)
    }
    fn faction(&self) -> Option<&str> {
        Some(self.faction)
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
}

fn spawn(i: usize) -> EntityRef {
    let faction = if i % 2 == 0 { "red" } else { "blue" };
    Arc::new(Mutex::new(BenchCritter {
        pos: Position::new((i as f64 % 20.0) * 80.0, (i as f64 / 20.0) * 80.0),
        health: 100.0,
        faction,
    }))
}

/// Benchmark: one scheduler tick over 200 registered agents.
fn bench_fleet_tick(c: &mut Criterion) {
    let mut scheduler = Scheduler::new(AiConfig::default());
    let handles: Vec<EntityRef> = (0..200).map(spawn).collect();
    for handle in &handles {
        scheduler
            .register(handle, AgentConfig::default())
            .expect("register");
    }

    c.bench_function("fleet_tick_200_agents", |b| {
        b.iter(|| {
            scheduler.tick(black_box(0.05));
        });
    });
}

/// Benchmark: memory influence over 100 combat records.
fn bench_memory_influence(c: &mut Criterion) {
    let mut store = MemoryStore::in_memory(AiConfig::default().memory);
    for i in 0..100u32 {
        let mut content = MemoryContent::new();
        content.insert("enemy_kind".into(), ContentValue::Text(format!("kind_{}", i % 8)));
        content.insert(
            "successful_action".into(),
            ContentValue::Text("attack".into()),
        );
        store.add_memory(
            MemoryKind::CombatExperience,
            content,
            f64::from(i % 10) / 10.0,
            0.5,
        );
    }

    let ctx = DecisionContext {
        enemy_kind: Some("kind_3".into()),
        emotional_state: 0.4,
        ..DecisionContext::default()
    };
    let actions = [Action::Attack, Action::Defend, Action::Retreat, Action::Heal];

    c.bench_function("memory_influence_100_records", |b| {
        b.iter(|| {
            let map = store.influence_decision(black_box(&ctx), black_box(&actions));
            black_box(map);
        });
    });
}

/// Benchmark: one radius query against 500 indexed agents.
fn bench_spatial_query(c: &mut Criterion) {
    let mut grid = SpatialGrid::new(100.0);
    for i in 0..500 {
        grid.insert(
            AgentId::new(),
            Position::new((i as f64 % 25.0) * 60.0, (i as f64 / 25.0) * 60.0),
        );
    }

    c.bench_function("spatial_query_500_agents", |b| {
        b.iter(|| {
            let found = grid.query_radius(black_box(Position::new(600.0, 600.0)), black_box(250.0));
            black_box(found);
        });
    });
}

criterion_group!(
    benches,
    bench_fleet_tick,
    bench_memory_influence,
    bench_spatial_query
);
criterion_main!(benches);
