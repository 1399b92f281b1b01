//! Actions and action-weight vectors.
//!
//! Every decision source — the plan, the tactical advisor, the emotional
//! layer, the memory store — speaks in terms of a [`WeightMap`] over the
//! candidate [`Action`]s. Maps are normalized to sum to 1 before fusion
//! and again after, so a source with large raw magnitudes cannot drown
//! out the others.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::FusionWeights;

/// An action the decision core can select and dispatch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Engage the current target.
    Attack,
    /// Aggressive rush at the target (executes as an attack).
    Charge,
    /// Use defensive skills and reposition.
    Defend,
    /// Restore own health via skill or item.
    Heal,
    /// Withdraw away from the enemy centroid.
    Retreat,
    /// Panic withdrawal (executes as a retreat).
    Flee,
    /// Break line of sight and hold position defensively.
    Hide,
    /// Aid the weakest nearby ally.
    Support,
    /// Wander toward unvisited space.
    Explore,
    /// Walk the generated patrol circuit.
    Patrol,
    /// Hold still and watch.
    Observe,
    /// Do nothing this cycle.
    Wait,
}

impl Action {
    /// Stable identifier used in memory content and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attack => "attack",
            Self::Charge => "charge",
            Self::Defend => "defend",
            Self::Heal => "heal",
            Self::Retreat => "retreat",
            Self::Flee => "flee",
            Self::Hide => "hide",
            Self::Support => "support",
            Self::Explore => "explore",
            Self::Patrol => "patrol",
            Self::Observe => "observe",
            Self::Wait => "wait",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attack" => Ok(Self::Attack),
            "charge" => Ok(Self::Charge),
            "defend" => Ok(Self::Defend),
            "heal" => Ok(Self::Heal),
            "retreat" => Ok(Self::Retreat),
            "flee" => Ok(Self::Flee),
            "hide" => Ok(Self::Hide),
            "support" => Ok(Self::Support),
            "explore" => Ok(Self::Explore),
            "patrol" => Ok(Self::Patrol),
            "observe" => Ok(Self::Observe),
            "wait" => Ok(Self::Wait),
            _ => Err(()),
        }
    }
}

/// A weight vector over candidate actions.
///
/// Backed by a `BTreeMap` so iteration order — and therefore every
/// downstream sort and argmax — is deterministic.
pub type WeightMap = BTreeMap<Action, f64>;

/// A map assigning every listed action weight 1.0.
#[must_use]
pub fn uniform(actions: &[Action]) -> WeightMap {
    actions.iter().map(|&a| (a, 1.0)).collect()
}

/// Clamp negatives to zero and rescale so the weights sum to 1.
///
/// A map whose mass is entirely non-positive degenerates to uniform over
/// its keys; an empty map stays empty.
pub fn normalize(weights: &mut WeightMap) {
    if weights.is_empty() {
        return;
    }
    for w in weights.values_mut() {
        if !w.is_finite() || *w < 0.0 {
            *w = 0.0;
        }
    }
    let total: f64 = weights.values().sum();
    if total > f64::EPSILON {
        for w in weights.values_mut() {
            *w /= total;
        }
    } else {
        let even = 1.0 / weights.len() as f64;
        for w in weights.values_mut() {
            *w = even;
        }
    }
}

/// Fuse the tactical, emotional, and memory weight vectors into one.
///
/// Each source is normalized over the candidate set first, then combined
/// by the configured split, then the result is normalized again. Actions
/// absent from a source contribute zero from it.
#[must_use]
pub fn fuse(
    actions: &[Action],
    tactical: &WeightMap,
    emotional: &WeightMap,
    memory: &WeightMap,
    split: &FusionWeights,
) -> WeightMap {
    let sources = [
        (split.tactical, tactical),
        (split.emotional, emotional),
        (split.memory, memory),
    ];

    let mut fused: WeightMap = actions.iter().map(|&a| (a, 0.0)).collect();
    for (source_weight, source) in sources {
        let mut restricted: WeightMap = actions
            .iter()
            .map(|a| (*a, source.get(a).copied().unwrap_or(0.0)))
            .collect();
        normalize(&mut restricted);
        for (action, w) in restricted {
            if let Some(slot) = fused.get_mut(&action) {
                *slot += source_weight * w;
            }
        }
    }
    normalize(&mut fused);
    fused
}

/// Pick the highest-weighted action, breaking ties by the order of
/// `plan_order` (most specific/critical action first).
#[must_use]
pub fn argmax(weights: &WeightMap, plan_order: &[Action]) -> Option<Action> {
    let mut best: Option<(Action, f64)> = None;
    for &action in plan_order {
        let Some(&w) = weights.get(&action) else {
            continue;
        };
        match best {
            Some((_, best_w)) if w <= best_w => {}
            _ => best = Some((action, w)),
        }
    }
    // Actions outside the plan can still win if strictly heavier.
    for (&action, &w) in weights {
        if plan_order.contains(&action) {
            continue;
        }
        match best {
            Some((_, best_w)) if w <= best_w => {}
            _ => best = Some((action, w)),
        }
    }
    best.map(|(a, _)| a)
}
