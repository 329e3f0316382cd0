//! Decides which member facts to piggyback on outgoing messages, bounds
//! payload size, and tracks per-fact dissemination counts.
//!
//! Grounded in the teacher's `BroadcastStore` (a min-heap of `Broadcast`
//! replayed until their `sends` counter saturates), reworked to the
//! dissemination-count formula and selection ordering from spec §4.5.

use std::collections::HashMap;

use crate::peer::Node;
use crate::status::{self, MergeOutcome, Status};

/// A fact known to the selector, with its dissemination counter.
#[derive(Debug, Clone)]
struct Fact {
    status: Status,
    disseminated: u32,
}

/// Builds bounded gossip payloads and retires facts once they've been
/// disseminated `ceil(lambda * log(N+1))` times.
pub struct GossipSelector {
    facts: HashMap<Node, Fact>,
    lambda: f64,
    max_gossip_bytes: usize,
    max_gossip_facts: usize,
}

/// A rough per-fact size estimate for the byte budget: socket addr (~18
/// bytes worst case for v6) + incarnation (8 bytes) + a fixed allowance
/// per suspecter entry, without pulling in a real codec just to size
/// gossip — the transport is what actually serializes these.
fn estimated_fact_size(status: &Status) -> usize {
    const NODE_ID: usize = 24;
    const BASE: usize = NODE_ID + 8 + 1; // node + incarnation + tag
    match status {
        Status::Suspect(_, suspected_by) => BASE + suspected_by.len() * NODE_ID,
        _ => BASE,
    }
}

impl GossipSelector {
    pub fn new(lambda: f64, max_gossip_bytes: usize, max_gossip_facts: usize) -> Self {
        GossipSelector {
            facts: HashMap::new(),
            lambda,
            max_gossip_bytes,
            max_gossip_facts,
        }
    }

    /// Records (or replaces) the fact to disseminate about `node`,
    /// resetting its dissemination counter — called whenever the
    /// membership table accepts a new status for a member.
    pub fn record(&mut self, node: Node, status: Status) {
        self.facts.insert(node, Fact {
            status,
            disseminated: 0,
        });
    }

    pub fn remove(&mut self, node: &Node) {
        self.facts.remove(node);
    }

    fn expulsion_threshold(&self, member_count: usize) -> u32 {
        let n = (member_count.max(0) + 1) as f64;
        (self.lambda * n.ln()).ceil().max(1.0) as u32
    }

    /// Builds a payload for `target`, in the priority order of spec
    /// §4.5: refutations about the local node first, then facts about
    /// `target` itself (our best proxy for "members the recipient
    /// disagrees with" — the recipient is the single most likely
    /// disagreement source about its own status; see DESIGN.md), then
    /// the remainder ordered by ascending dissemination count with a
    /// deterministic tiebreak on node identity. Entries are truncated by
    /// whichever of `max_gossip_bytes` / `max_gossip_facts` is hit
    /// first, and each selected fact's counter is incremented; facts
    /// that saturate the dissemination-count bound are dropped from the
    /// selector afterward.
    pub fn make_payload(
        &mut self,
        local: Node,
        target: Node,
        member_count: usize,
    ) -> Vec<(Node, Status)> {
        let mut candidates: Vec<Node> = self.facts.keys().cloned().collect();
        candidates.sort_by_key(|n| (n.addr, n.restart_tag));

        candidates.sort_by(|a, b| {
            let a_rank = self.priority_rank(a, &local, &target);
            let b_rank = self.priority_rank(b, &local, &target);
            a_rank
                .cmp(&b_rank)
                .then_with(|| self.facts[a].disseminated.cmp(&self.facts[b].disseminated))
                .then_with(|| (a.addr, a.restart_tag).cmp(&(b.addr, b.restart_tag)))
        });

        let mut out = Vec::new();
        let mut bytes = 0usize;
        for node in candidates {
            if out.len() >= self.max_gossip_facts {
                break;
            }
            let status = self.facts[&node].status.clone();
            let size = estimated_fact_size(&status);
            if bytes + size > self.max_gossip_bytes && !out.is_empty() {
                break;
            }
            bytes += size;
            out.push((node, status));
        }

        let threshold = self.expulsion_threshold(member_count);
        let mut expired = Vec::new();
        for (node, _) in &out {
            if let Some(fact) = self.facts.get_mut(node) {
                fact.disseminated += 1;
                if fact.disseminated >= threshold {
                    expired.push(*node);
                }
            }
        }
        for node in expired {
            self.facts.remove(&node);
        }

        out
    }

    fn priority_rank(&self, node: &Node, local: &Node, target: &Node) -> u8 {
        if node == local {
            0
        } else if node == target {
            1
        } else {
            2
        }
    }

    /// Applies the status-ordering merge on the locally-held copy of
    /// `node`'s status (used when the instance wants to know whether a
    /// fact is worth recording without touching the membership table).
    pub fn would_supersede(&self, node: &Node, incoming: &Status) -> bool {
        match self.facts.get(node) {
            None => true,
            Some(fact) => matches!(status::merge(&fact.status, incoming), MergeOutcome::Applied(_)),
        }
    }

    #[cfg(test)]
    pub fn dissemination_count(&self, node: &Node) -> Option<u32> {
        self.facts.get(node).map(|f| f.disseminated)
    }
}
