//! Group coordination: leader election and shared goals.
//!
//! A coordinator exists per group id, created lazily when the first
//! member registers and destroyed when the group empties. It runs after
//! every member's update in the tick, so the plan it mirrors from the
//! leader is the one computed this tick.

use std::collections::VecDeque;

use tracing::debug;

use crate::decision::DecisionCore;
use crate::types::{AgentId, GroupId, SimTime};
use crate::weights::Action;

/// A message queued within a group.
#[derive(Debug, Clone)]
pub struct GroupMessage {
    /// Who sent it.
    pub sender: AgentId,
    /// Intended recipient; `None` broadcasts to the group.
    pub target: Option<AgentId>,
    /// Free-form body.
    pub body: String,
    /// When it was sent.
    pub sent_at: SimTime,
}

/// One group member as seen by the coordinator during its update.
pub struct GroupMember<'a> {
    /// The member's agent id.
    pub id: AgentId,
    /// Whether the backing entity is still alive this tick.
    pub alive: bool,
    /// The member's decision core.
    pub core: &'a mut DecisionCore,
}

/// Coordinates one group: elects a leader, mirrors the leader's plan as
/// the shared goal list, and relays it to the followers.
#[derive(Debug)]
pub struct GroupCoordinator {
    group_id: GroupId,
    leader: Option<AgentId>,
    shared_goals: Vec<(Action, f64)>,
    inbox: VecDeque<GroupMessage>,
}

impl GroupCoordinator {
    /// Create a coordinator for a new group.
    #[must_use]
    pub fn new(group_id: GroupId) -> Self {
        debug!(group = %group_id, "group coordinator created");
        Self {
            group_id,
            leader: None,
            shared_goals: Vec::new(),
            inbox: VecDeque::new(),
        }
    }

    /// The group this coordinator serves.
    #[must_use]
    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    /// The currently elected leader, if the group has living members.
    #[must_use]
    pub fn leader(&self) -> Option<AgentId> {
        self.leader
    }

    /// The goal list mirrored from the leader's plan.
    #[must_use]
    pub fn shared_goals(&self) -> &[(Action, f64)] {
        &self.shared_goals
    }

    /// Run one coordination pass over the member set.
    ///
    /// Elects the living member with the highest leadership trait (ties
    /// broken by id for determinism), copies that member's freshly
    /// computed plan into the shared goals, pushes the goals to every
    /// follower, and drops messages older than `message_ttl` seconds.
    pub fn update(&mut self, members: &mut [GroupMember<'_>], now: SimTime, message_ttl: f64) {
        self.elect_leader(members);

        if let Some(leader_id) = self.leader {
            if let Some(leader) = members.iter().find(|m| m.id == leader_id) {
                self.shared_goals = leader.core.action_plan().to_vec();
            }
            if !self.shared_goals.is_empty() {
                for member in members.iter_mut() {
                    if member.alive && member.id != leader_id {
                        member.core.set_group_orders(self.shared_goals.clone());
                    }
                }
            }
        }

        self.inbox.retain(|m| now.since(m.sent_at) < message_ttl);
    }

    fn elect_leader(&mut self, members: &[GroupMember<'_>]) {
        let mut best: Option<(f64, AgentId)> = None;
        for member in members.iter().filter(|m| m.alive) {
            let leadership = member.core.personality().leadership;
            let better = match best {
                None => true,
                Some((best_score, best_id)) => {
                    leadership > best_score
                        || (leadership == best_score && member.id < best_id)
                }
            };
            if better {
                best = Some((leadership, member.id));
            }
        }
        self.leader = best.map(|(_, id)| id);
    }

    /// Queue a message in the group.
    pub fn send(&mut self, message: GroupMessage) {
        self.inbox.push_back(message);
    }

    /// Messages currently queued (newest last).
    #[must_use]
    pub fn messages(&self) -> impl Iterator<Item = &GroupMessage> {
        self.inbox.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecisionConfig;
    use crate::entity::Entity;

    struct Plain;
    impl Entity for Plain {}

    struct Leaderly;
    impl Entity for Leaderly {
        fn archetype(&self) -> Option<&str> {
            Some("leader")
        }
    }

    fn core(entity: &dyn Entity) -> DecisionCore {
        DecisionCore::new(AgentId::new(), entity, &DecisionConfig::default())
    }

    #[test]
    fn elects_highest_leadership() {
        let mut follower = core(&Plain);
        let mut chief = core(&Leaderly);
        let chief_id = chief.id();

        let mut coordinator = GroupCoordinator::new(GroupId::new("squad1"));
        let mut members = vec![
            GroupMember { id: follower.id(), alive: true, core: &mut follower },
            GroupMember { id: chief_id, alive: true, core: &mut chief },
        ];
        coordinator.update(&mut members, SimTime::ZERO, 5.0);

        assert_eq!(coordinator.leader(), Some(chief_id));
    }

    #[test]
    fn dead_members_cannot_lead() {
        let mut follower = core(&Plain);
        let mut chief = core(&Leaderly);
        let follower_id = follower.id();

        let mut coordinator = GroupCoordinator::new(GroupId::new("squad1"));
        let mut members = vec![
            GroupMember { id: follower_id, alive: true, core: &mut follower },
            GroupMember { id: chief.id(), alive: false, core: &mut chief },
        ];
        coordinator.update(&mut members, SimTime::ZERO, 5.0);

        assert_eq!(coordinator.leader(), Some(follower_id));
    }

    #[test]
    fn stale_messages_are_dropped() {
        let mut coordinator = GroupCoordinator::new(GroupId::new("squad1"));
        coordinator.send(GroupMessage {
            sender: AgentId::new(),
            target: None,
            body: "fall back".into(),
            sent_at: SimTime(0.0),
        });
        coordinator.send(GroupMessage {
            sender: AgentId::new(),
            target: None,
            body: "regroup".into(),
            sent_at: SimTime(8.0),
        });

        let mut members: Vec<GroupMember<'_>> = Vec::new();
        coordinator.update(&mut members, SimTime(10.0), 5.0);

        let bodies: Vec<&str> = coordinator.messages().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["regroup"]);
    }
}
