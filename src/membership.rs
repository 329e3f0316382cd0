//! The set of known peers with their statuses, suspicion metadata, and
//! protocol-period bookkeeping.

use std::collections::HashMap;

use crate::clock::Deadline;
use crate::peer::{Node, Peer};
use crate::status::{self, MergeOutcome, Status};

/// A peer plus its current status plus the protocol period in which that
/// status was last updated plus, if suspect, the monotonic timestamp the
/// suspicion started.
#[derive(Debug, Clone)]
pub struct Member<P> {
    pub peer: P,
    pub status: Status,
    pub last_status_period: u64,
    pub suspicion_started_at: Option<Deadline>,
}

impl<P: Peer + Clone> Member<P> {
    pub fn node(&self) -> Node {
        self.peer.node()
    }
}

/// Outcome of a `mark`/`add_member` call: mirrors spec §4.1.
#[derive(Debug, Clone)]
pub enum MarkResult {
    Applied {
        previous: Status,
        current: Status,
    },
    IgnoredDueToOlderStatus(Status),
}

/// The membership table. Keyed by `Node` (full identity — address plus
/// restart tag), so a restarted peer is a distinct key from its prior
/// incarnation until gossip/probing resolves which one survives.
pub struct Membership<P> {
    local: Node,
    members: HashMap<Node, Member<P>>,
}

impl<P: Peer + Clone> Membership<P> {
    /// Creates a table with the local node pre-seeded as
    /// `alive(local_incarnation)`, per the invariant that the local node
    /// is always present.
    pub fn new(local: Node, local_peer: P, local_incarnation: u64, period: u64) -> Self {
        let mut members = HashMap::new();
        members.insert(
            local,
            Member {
                peer: local_peer,
                status: Status::Alive(local_incarnation),
                last_status_period: period,
                suspicion_started_at: None,
            },
        );
        Membership { local, members }
    }

    pub fn local(&self) -> Node {
        self.local
    }

    pub fn is_member(&self, node: &Node) -> bool {
        self.members.contains_key(node)
    }

    pub fn status(&self, node: &Node) -> Option<&Status> {
        self.members.get(node).map(|m| &m.status)
    }

    pub fn member(&self, node: &Node) -> Option<&Member<P>> {
        self.members.get(node)
    }

    pub fn member_mut(&mut self, node: &Node) -> Option<&mut Member<P>> {
        self.members.get_mut(node)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Deterministic (sorted) iteration over all members, for gossip
    /// ordering and test reproducibility.
    pub fn all_sorted(&self) -> Vec<&Member<P>> {
        let mut out: Vec<&Member<P>> = self.members.values().collect();
        out.sort_by_key(|m| (m.node().addr, m.node().restart_tag));
        out
    }

    pub fn suspects(&self) -> impl Iterator<Item = &Member<P>> {
        self.members.values().filter(|m| m.status.is_suspect())
    }

    /// Non-local, non-dead nodes, in deterministic order.
    pub fn eligible_for_probe(&self) -> Vec<Node> {
        self.all_sorted()
            .into_iter()
            .filter(|m| m.node() != self.local && !m.status.is_dead())
            .map(|m| m.node())
            .collect()
    }

    /// Applies the status-ordering merge to the member for `node`,
    /// creating it (via `peer`) at `status` if absent. `period` stamps
    /// `last_status_period` when the merge actually changes the status.
    pub fn mark(&mut self, node: Node, peer: P, status: Status, period: u64, now: Deadline) -> MarkResult {
        match self.members.get(&node) {
            None => {
                let previous = Status::Alive(0); // a never-seen node is conceptually "unknown"; treat as vacuously applied
                let suspicion_started_at = if status.is_suspect() { Some(now) } else { None };
                self.members.insert(
                    node,
                    Member {
                        peer,
                        status: status.clone(),
                        last_status_period: period,
                        suspicion_started_at,
                    },
                );
                MarkResult::Applied {
                    previous,
                    current: status,
                }
            }
            Some(existing) => {
                let previous = existing.status.clone();
                match status::merge(&existing.status, &status) {
                    MergeOutcome::Ignored => MarkResult::IgnoredDueToOlderStatus(previous),
                    MergeOutcome::Applied(new_status) => {
                        let suspicion_started_at = if new_status.is_suspect() {
                            // Preserve the original suspicion start time if we
                            // were already suspect (union merges don't restart
                            // the clock); otherwise this is a fresh suspicion.
                            existing.suspicion_started_at.or(Some(now))
                        } else {
                            None
                        };
                        let member = self.members.get_mut(&node).expect("just checked Some");
                        member.status = new_status.clone();
                        member.last_status_period = period;
                        member.suspicion_started_at = suspicion_started_at;
                        MarkResult::Applied {
                            previous,
                            current: new_status,
                        }
                    }
                }
            }
        }
    }

    /// Inserts a brand-new member at `alive(0)` if not already present
    /// (spec §3 Lifecycle: "created on first contact ... in alive(0)").
    /// Returns `true` if inserted.
    pub fn insert_if_absent(&mut self, node: Node, peer: P, period: u64) -> bool {
        if self.members.contains_key(&node) {
            return false;
        }
        self.members.insert(
            node,
            Member {
                peer,
                status: Status::Alive(0),
                last_status_period: period,
                suspicion_started_at: None,
            },
        );
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::{node, TestPeer};

    fn table() -> Membership<TestPeer> {
        let local = node(1);
        Membership::new(local, TestPeer::new(local), 0, 0)
    }

    #[test]
    fn local_node_always_alive() {
        let t = table();
        assert_eq!(t.status(&t.local()), Some(&Status::Alive(0)));
    }

    #[test]
    fn mark_creates_absent_member() {
        let mut t = table();
        let b = node(2);
        let result = t.mark(b, TestPeer::new(b), Status::Alive(0), 1, Deadline::default());
        assert!(matches!(result, MarkResult::Applied { .. }));
        assert!(t.is_member(&b));
    }

    #[test]
    fn mark_dead_twice_is_ignored() {
        let mut t = table();
        let b = node(2);
        t.mark(b, TestPeer::new(b), Status::Alive(0), 0, Deadline::default());
        t.mark(b, TestPeer::new(b), Status::Dead, 1, Deadline::default());
        let result = t.mark(b, TestPeer::new(b), Status::Dead, 2, Deadline::default());
        assert!(matches!(result, MarkResult::IgnoredDueToOlderStatus(Status::Dead)));
    }

    #[test]
    fn eligible_for_probe_excludes_local_and_dead() {
        let mut t = table();
        let b = node(2);
        let c = node(3);
        t.mark(b, TestPeer::new(b), Status::Alive(0), 0, Deadline::default());
        t.mark(c, TestPeer::new(c), Status::Dead, 0, Deadline::default());
        let eligible = t.eligible_for_probe();
        assert_eq!(eligible, vec![b]);
    }
}
