//! The algebra of member status transitions and incarnation ordering.
//!
//! Mirrors the `NodeState` ordering used in `jo-goro-swimmers`, extended
//! with the `suspectedBy` set semantics and the `Dead`-is-terminal rule
//! from the spec.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::peer::Node;

pub type Incarnation = u64;

/// A member's believed status, tagged with the incarnation it was
/// asserted at (except `Dead`, which is terminal and incarnation-less
/// from the merge's point of view — it always wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Status {
    Alive(Incarnation),
    Suspect(Incarnation, HashSet<Node>),
    Unreachable(Incarnation),
    Dead,
}

impl Status {
    pub fn incarnation(&self) -> Option<Incarnation> {
        match self {
            Status::Alive(i) | Status::Unreachable(i) => Some(*i),
            Status::Suspect(i, _) => Some(*i),
            Status::Dead => None,
        }
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, Status::Dead)
    }

    pub fn is_suspect(&self) -> bool {
        matches!(self, Status::Suspect(..))
    }

    pub fn is_alive(&self) -> bool {
        matches!(self, Status::Alive(_))
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Status::Unreachable(_))
    }

    /// `{alive, suspect}` are reachable; `{unreachable, dead}` are not.
    /// Used by the shell to decide whether to emit a reachability event.
    pub fn reachability(&self) -> Reachability {
        match self {
            Status::Alive(_) | Status::Suspect(..) => Reachability::Reachable,
            Status::Unreachable(_) | Status::Dead => Reachability::Unreachable,
        }
    }

    /// Rank among statuses at equal incarnation: `alive < suspect <
    /// unreachable < dead`.
    fn rank(&self) -> u8 {
        match self {
            Status::Alive(_) => 0,
            Status::Suspect(..) => 1,
            Status::Unreachable(_) => 2,
            Status::Dead => 3,
        }
    }
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Status::Alive(a), Status::Alive(b)) => a == b,
            (Status::Unreachable(a), Status::Unreachable(b)) => a == b,
            (Status::Suspect(a, sa), Status::Suspect(b, sb)) => a == b && sa == sb,
            (Status::Dead, Status::Dead) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

/// Result of merging an incoming fact against the currently-held status
/// for a member.
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// The incoming fact superseded the current one. Carries the status
    /// that resulted (which may retain the current status's
    /// `suspectedBy` union even when "no-op" per spec §3 rule 3).
    Applied(Status),
    /// The incoming fact was older or equal and changed nothing.
    Ignored,
}

/// Applies the status-ordering merge from spec §3 / §8: `current` is the
/// status already held; `incoming` is the newly observed fact. Returns
/// the merge outcome. `Dead` is terminal: once `current` is `Dead`,
/// nothing overwrites it — not even another `Dead` (that's reported as
/// `Ignored`, matching "marking dead a member that is already dead is
/// ignoredDueToOlderStatus").
pub fn merge(current: &Status, incoming: &Status) -> MergeOutcome {
    if current.is_dead() {
        return MergeOutcome::Ignored;
    }
    if incoming.is_dead() {
        return MergeOutcome::Applied(Status::Dead);
    }

    let ci = current.incarnation().expect("non-dead status has incarnation");
    let ii = incoming.incarnation().expect("non-dead status has incarnation");

    if ii > ci {
        return MergeOutcome::Applied(incoming.clone());
    }
    if ii < ci {
        return MergeOutcome::Ignored;
    }

    // Equal incarnation: compare rank, with a special case for two
    // suspect facts at the same incarnation (union the suspecter sets).
    match (current, incoming) {
        (Status::Suspect(i, sa), Status::Suspect(_, sb)) => {
            if sb.is_subset(sa) {
                MergeOutcome::Ignored
            } else {
                let union: HashSet<Node> = sa.union(sb).cloned().collect();
                MergeOutcome::Applied(Status::Suspect(*i, union))
            }
        }
        _ => {
            if incoming.rank() > current.rank() {
                MergeOutcome::Applied(incoming.clone())
            } else {
                MergeOutcome::Ignored
            }
        }
    }
}

/// Builds a fresh `Suspect` status for `incarnation`, suspected by just
/// the local node (spec §4.1 `makeSuspicion`).
pub fn make_suspicion(incarnation: Incarnation, local: Node) -> Status {
    let mut set = HashSet::with_capacity(1);
    set.insert(local);
    Status::Suspect(incarnation, set)
}
