//! Picks the next member to probe using a shuffled round-robin over the
//! membership (spec §4.4).
//!
//! Grounded in the teacher's `memberlist: Vec<usize>` cursor-plus-shuffle
//! scheme (`Server::tick`'s `last_pinged`/`memberlist.shuffle`), with one
//! deliberate change: the teacher inserts a newly-discovered peer
//! anywhere in the full list (`rng.gen_range(0..=self.memberlist.len())`),
//! which can place it *before* the cursor and let it dodge this round
//! entirely. The spec requires insertion only within the
//! not-yet-probed remainder, so new members are neither starved nor
//! probed out of turn; see DESIGN.md.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::peer::Node;

#[derive(Default)]
pub struct ProbeScheduler {
    order: Vec<Node>,
    cursor: usize,
}

impl ProbeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the scheduler's working set from the current membership,
    /// preserving existing order/cursor for nodes still present and
    /// inserting newly-seen nodes at a random position in the
    /// not-yet-probed remainder.
    pub fn sync(&mut self, eligible: &[Node], rng: &mut impl Rng) {
        self.order.retain(|n| eligible.contains(n));
        if self.cursor > self.order.len() {
            self.cursor = self.order.len();
        }
        for node in eligible {
            if !self.order.contains(node) {
                self.insert_new_member(*node, rng);
            }
        }
    }

    fn insert_new_member(&mut self, node: Node, rng: &mut impl Rng) {
        let pos = rng.gen_range(self.cursor..=self.order.len());
        self.order.insert(pos, node);
    }

    /// Returns the next member to probe, advancing the cursor;
    /// reshuffles and resets the cursor once it reaches the end. `None`
    /// if there are no eligible members.
    pub fn next(&mut self, rng: &mut impl Rng) -> Option<Node> {
        if self.order.is_empty() {
            return None;
        }
        if self.cursor >= self.order.len() {
            self.order.shuffle(rng);
            self.cursor = 0;
        }
        let node = self.order[self.cursor];
        self.cursor += 1;
        Some(node)
    }
}
