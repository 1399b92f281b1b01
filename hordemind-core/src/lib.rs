//! # HORDEMIND Core Library
//!
//! Decision-making and update-scheduling engine for game NPC fleets.
//!
//! Every registered agent gets a [`DecisionCore`] — a small state
//! machine that assesses threat and opportunity, refreshes an emotional
//! readout, plans, fuses the plan with tactical, emotional, and
//! remembered influence, and dispatches one action per cycle. The
//! [`Scheduler`] owns the fleet: it tiers and budgets updates across any
//! number of agents with spatial locality and priority, so total AI cost
//! per frame stays bounded no matter how large the horde grows.
//!
//! Two cross-cutting layers bias every decision:
//!
//! - **Generational memory** ([`MemoryStore`]) — experience records that
//!   persist across play sessions, fused when similar, reinforced or
//!   faded at generation turnover, and converted into action weights.
//! - **Emotional influence** ([`EmotionalInfluenceLayer`]) — decaying
//!   modifiers raised by game triggers, plus per-agent mood aggregates
//!   (stability, momentum, trauma) that amplify whole action families.
//!
//! ## Ownership model
//!
//! The engine never owns game entities: the registry holds weak handles,
//! checks liveness once per tick, and degrades gracefully around any
//! capability an entity does not implement. One `Scheduler` is one
//! independent simulation — there are no globals.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod agent;
pub mod config;
pub mod decision;
pub mod emotion;
pub mod entity;
pub mod error;
pub mod group;
pub mod memory;
pub mod scheduler;
pub mod spatial;
pub mod tactics;
pub mod types;
pub mod weights;

pub use agent::{AgentState, EmotionSignals, Personality, Priority, StateSummary};
pub use config::AiConfig;
pub use decision::DecisionCore;
pub use emotion::{EmotionalInfluenceLayer, TriggerKind};
pub use entity::{CapabilityOutcome, Entity, EntityRef, EntityWeak, SkillInfo};
pub use error::{AiError, Result};
pub use memory::{MemoryKind, MemoryStore};
pub use scheduler::{AgentConfig, PerformanceStats, Scheduler, WorldView};
pub use tactics::{NullAdvisor, TacticalAdvisor};
pub use types::*;
pub use weights::{Action, WeightMap};
