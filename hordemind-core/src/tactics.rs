//! The combat-tactics advisor boundary.
//!
//! Tactical knowledge (counter-picks, pattern libraries, difficulty
//! shaping) lives outside the engine. It contributes exactly one input to
//! decision fusion: a weight vector over the candidate actions. A game
//! plugs its advisor in at scheduler construction; the engine ships only
//! the null implementation.

use crate::types::DecisionContext;
use crate::weights::{Action, WeightMap};

/// External supplier of the tactical weight vector.
pub trait TacticalAdvisor: Send + Sync {
    /// Weigh the candidate actions for the given situation.
    ///
    /// Returning `None` means "no tactical opinion"; the decision core
    /// then substitutes its own normalized plan scores for the tactical
    /// component, so the plan still steers selection.
    fn tactical_weights(&self, ctx: &DecisionContext, actions: &[Action]) -> Option<WeightMap>;
}

/// Advisor with no opinion — the default when a game supplies none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAdvisor;

impl TacticalAdvisor for NullAdvisor {
    fn tactical_weights(&self, _ctx: &DecisionContext, _actions: &[Action]) -> Option<WeightMap> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_advisor_has_no_opinion() {
        let advisor = NullAdvisor;
        let ctx = DecisionContext::default();
        assert!(advisor
            .tactical_weights(&ctx, &[Action::Attack, Action::Defend])
            .is_none());
    }
}
