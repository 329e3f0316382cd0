//! The pure SWIM state machine (spec §4.1). No I/O, no timers, no
//! logging side effects live here — every operation is a deterministic
//! function of its inputs and the instance's own state, so it can be
//! driven directly from tests without a transport or an event loop.

use std::sync::Arc;

use log::Level;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::clock::{Clock, Deadline};
use crate::config::SwimConfig;
use crate::error::SwimError;
use crate::gossip::GossipSelector;
use crate::health::{HealthEvent, LocalHealthMultiplier};
use crate::membership::{MarkResult, Member, Membership};
use crate::peer::{Node, Peer, ProbeResponse};
use crate::scheduler::ProbeScheduler;
use crate::status::{self, Incarnation, Status};
use crate::wire::{Ack, GossipPayload};

/// Outcome of `mark`/`add_member`.
#[derive(Debug, Clone)]
pub enum ApplyResult {
    Applied { previous: Status, current: Status },
    IgnoredDueToOlderStatus(Status),
}

impl From<MarkResult> for ApplyResult {
    fn from(r: MarkResult) -> Self {
        match r {
            MarkResult::Applied { previous, current } => ApplyResult::Applied { previous, current },
            MarkResult::IgnoredDueToOlderStatus(s) => ApplyResult::IgnoredDueToOlderStatus(s),
        }
    }
}

/// Outcome of `onPingRequestResponse` (spec §4.1).
#[derive(Debug, Clone)]
pub enum PingRequestOutcome {
    Alive { incarnation: Incarnation, payload: GossipPayload },
    NewlySuspect,
    NackReceived,
    Ignored,
}

/// Outcome of `onGossipPayload` (spec §4.1). `Connect` is the
/// re-architected continuation from the design notes: the instance can't
/// perform I/O itself, so it hands the shell the node/status pair back
/// and expects a follow-up call to `finish_connect` once the shell has
/// ensured a transport association.
#[derive(Debug, Clone)]
pub enum GossipDirective {
    Connect { node: Node, status: Status },
    Applied { node: Node, previous: Status, current: Status },
    Ignored { level: Level, message: String },
}

/// Composes the membership table, gossip selector, probe scheduler and
/// adaptive health multiplier behind the operations the shell drives
/// (spec §4.1).
pub struct SwimInstance<P: Peer + Clone> {
    local: Node,
    membership: Membership<P>,
    scheduler: ProbeScheduler,
    gossip: GossipSelector,
    health: LocalHealthMultiplier,
    protocol_period: u64,
    config: SwimConfig,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    /// The last incarnation the local node was `alive` at, retained so
    /// `local_incarnation` has an answer once the local member's status
    /// has gone terminal (spec §4.2: local can accept a `dead` fact about
    /// itself and keep running).
    last_known_local_incarnation: Incarnation,
}

impl<P: Peer + Clone> SwimInstance<P> {
    pub fn new(local: Node, local_peer: P, config: SwimConfig, clock: Arc<dyn Clock>) -> Self {
        SwimInstance {
            local,
            membership: Membership::new(local, local_peer, 0, 0),
            scheduler: ProbeScheduler::new(),
            gossip: GossipSelector::new(
                config.gossip_fanout_lambda,
                config.max_gossip_bytes,
                config.max_gossip_facts,
            ),
            health: LocalHealthMultiplier::new(config.lhm_max),
            protocol_period: 0,
            config,
            clock,
            rng: StdRng::from_entropy(),
            last_known_local_incarnation: 0,
        }
    }

    /// Builds an instance with a deterministic RNG seed, for reproducible
    /// tests.
    pub fn with_seed(local: Node, local_peer: P, config: SwimConfig, clock: Arc<dyn Clock>, seed: u64) -> Self {
        let mut instance = Self::new(local, local_peer, config, clock);
        instance.rng = StdRng::seed_from_u64(seed);
        instance
    }

    pub fn local_node(&self) -> Node {
        self.local
    }

    /// The local node's current incarnation. Once the local member has
    /// accepted a `dead` fact about itself (spec §4.2: this is accepted,
    /// and "the local process may continue running"), there is no longer
    /// an incarnation on the member's status itself, so this falls back
    /// to the last incarnation the local node was known alive at.
    pub fn local_incarnation(&self) -> Incarnation {
        match self.membership.status(&self.local) {
            Some(Status::Alive(i)) => *i,
            Some(Status::Dead) => self.last_known_local_incarnation,
            other => unreachable!("local member status invariant violated: {other:?}"),
        }
    }

    pub fn protocol_period(&self) -> u64 {
        self.protocol_period
    }

    pub fn config(&self) -> &SwimConfig {
        &self.config
    }

    // ---- §4.1 operations ----

    /// `onPing()`. Replies with an ack carrying the local incarnation and
    /// a gossip payload targeted at the caller.
    pub fn on_ping(&mut self, from: Node) -> Ack {
        let payload = self.make_gossip_payload(from);
        Ack {
            target: self.local,
            incarnation: self.local_incarnation(),
            payload,
        }
    }

    /// `onPingRequestResponse(result, pingedMember)`. On success the
    /// payload is handed back unmodified for the shell to run through
    /// `process_gossip_payload` and the shell marks the target alive
    /// itself (spec §4.7 `handlePingRequestResult`); on failure this
    /// call moves the target toward suspect directly (spec §4.3).
    pub fn on_ping_request_response(
        &mut self,
        result: Result<ProbeResponse, SwimError>,
        pinged_member: Node,
    ) -> PingRequestOutcome {
        match result {
            Ok(ProbeResponse::Ack(ack)) => PingRequestOutcome::Alive {
                incarnation: ack.incarnation,
                payload: ack.payload,
            },
            Ok(ProbeResponse::Nack(_)) => PingRequestOutcome::NackReceived,
            Err(_) => {
                let last_known = self.membership.status(&pinged_member).and_then(|s| s.incarnation());
                match last_known {
                    Some(incarnation) => {
                        self.mark_suspect(pinged_member, incarnation);
                        PingRequestOutcome::NewlySuspect
                    }
                    None => PingRequestOutcome::Ignored,
                }
            }
        }
    }

    fn mark_suspect(&mut self, node: Node, incarnation: Incarnation) {
        if let Some(member) = self.membership.member(&node) {
            let peer = member.peer.clone();
            let status = status::make_suspicion(incarnation, self.local);
            self.apply_mark(node, peer, status);
        }
    }

    /// `mark(peer, as: status)`.
    pub fn mark(&mut self, peer: P, status: Status) -> ApplyResult {
        let node = peer.node();
        self.apply_mark(node, peer, status)
    }

    /// `addMember(peer, status)`. Same merge semantics as `mark`; kept as
    /// a distinct entry point so callers document intent (first-contact
    /// creation vs. a status update for a node already known).
    pub fn add_member(&mut self, peer: P, status: Status) -> ApplyResult {
        self.mark(peer, status)
    }

    fn apply_mark(&mut self, node: Node, peer: P, status: Status) -> ApplyResult {
        let status = self.refute_if_about_self(node, status);
        let now = self.clock.now();
        let result = self.membership.mark(node, peer, status.clone(), self.protocol_period, now);
        if let MarkResult::Applied { ref current, .. } = result {
            self.gossip.record(node, current.clone());
            if node == self.local {
                if let Some(incarnation) = current.incarnation() {
                    self.last_known_local_incarnation = incarnation;
                }
            }
        }
        self.sync_scheduler();
        result.into()
    }

    /// Refutation via incarnation (spec §4.2): if `node` is the local
    /// node and the asserted status is `suspect`/`unreachable`, bump the
    /// local incarnation and become `alive` at the new incarnation
    /// instead of accepting the asserted status.
    fn refute_if_about_self(&mut self, node: Node, status: Status) -> Status {
        if node != self.local {
            return status;
        }
        match &status {
            Status::Suspect(i, _) | Status::Unreachable(i) => {
                let new_incarnation = self.local_incarnation().max(*i) + 1;
                self.health.adjust(HealthEvent::RefutingSuspectMessageAboutSelf);
                Status::Alive(new_incarnation)
            }
            // `Dead` about the local node is accepted as-is (spec §4.2:
            // "the local process may continue running but further
            // probes will continue to see it as dead").
            Status::Dead | Status::Alive(_) => status,
        }
    }

    pub fn status(&self, node: &Node) -> Option<&Status> {
        self.membership.status(node)
    }

    pub fn is_member(&self, node: &Node) -> bool {
        self.membership.is_member(node)
    }

    pub fn member(&self, node: &Node) -> Option<&Member<P>> {
        self.membership.member(node)
    }

    fn sync_scheduler(&mut self) {
        let eligible = self.membership.eligible_for_probe();
        self.scheduler.sync(&eligible, &mut self.rng);
    }

    /// `nextMemberToPing()`.
    pub fn next_member_to_ping(&mut self) -> Option<Node> {
        self.sync_scheduler();
        self.scheduler.next(&mut self.rng)
    }

    /// `membersToPingRequest(target)`: up to `k` random members,
    /// excluding `target` and the local node, drawn from alive/suspect
    /// members.
    pub fn members_to_ping_request(&mut self, target: Node) -> Vec<Node> {
        let mut candidates: Vec<Node> = self
            .membership
            .all_sorted()
            .into_iter()
            .filter(|m| {
                let n = m.node();
                n != target && n != self.local && (m.status.is_alive() || m.status.is_suspect())
            })
            .map(|m| m.node())
            .collect();
        candidates.shuffle(&mut self.rng);
        candidates.truncate(self.config.indirect_checks);
        candidates
    }

    /// `makeGossipPayload(to: target)`.
    pub fn make_gossip_payload(&mut self, target: Node) -> GossipPayload {
        let entries = self.gossip.make_payload(self.local, target, self.membership.len());
        GossipPayload::from_entries(entries)
    }

    /// `onGossipPayload(about: (peer, status))`.
    pub fn on_gossip_payload(&mut self, about: (Node, Status)) -> GossipDirective {
        let (node, status) = about;

        if node == self.local {
            let local_peer = self.local_member_peer();
            let applied = self.apply_mark(node, local_peer, status);
            return match applied {
                ApplyResult::Applied { previous, current } => GossipDirective::Applied { node, previous, current },
                ApplyResult::IgnoredDueToOlderStatus(current) => GossipDirective::Ignored {
                    level: Level::Trace,
                    message: format!("gossip about self ignored, current status {current:?}"),
                },
            };
        }

        match self.membership.member(&node) {
            Some(member) => {
                let peer = member.peer.clone();
                let applied = self.apply_mark(node, peer, status);
                match applied {
                    ApplyResult::Applied { previous, current } => GossipDirective::Applied { node, previous, current },
                    ApplyResult::IgnoredDueToOlderStatus(current) => GossipDirective::Ignored {
                        level: Level::Trace,
                        message: format!("gossip fact about {node} ignored, current status {current:?}"),
                    },
                }
            }
            None => {
                if status.is_dead() {
                    // Nothing to connect to in order to learn about a
                    // node we've never heard of dying; just drop it.
                    GossipDirective::Ignored {
                        level: Level::Debug,
                        message: format!("dropping dead-on-arrival gossip about unknown node {node}"),
                    }
                } else {
                    GossipDirective::Connect { node, status }
                }
            }
        }
    }

    /// Follow-up to a `GossipDirective::Connect`, called by the shell
    /// once it has a live peer handle for `node` (association having
    /// succeeded).
    pub fn finish_connect(&mut self, node: Node, peer: P, status: Status) -> ApplyResult {
        debug_assert_eq!(node, peer.node());
        self.apply_mark(node, peer, status)
    }

    fn local_member_peer(&self) -> P {
        self.membership
            .member(&self.local)
            .expect("local member always present")
            .peer
            .clone()
    }

    /// `makeSuspicion(incarnation)`.
    pub fn make_suspicion(&self, incarnation: Incarnation) -> Status {
        status::make_suspicion(incarnation, self.local)
    }

    /// `incrementProtocolPeriod()`.
    pub fn increment_protocol_period(&mut self) {
        self.protocol_period += 1;
    }

    /// `adjustLHMultiplier(event)`.
    pub fn adjust_lh_multiplier(&mut self, event: HealthEvent) {
        self.health.adjust(event);
    }

    pub fn local_health_multiplier(&self) -> u32 {
        self.health.value()
    }

    /// Suspicion timeout formula (spec §4.3 / resolved in DESIGN.md):
    /// `max(min, max × (1 − ln(n+1) / ln(c+1)))`, where `n` is the number
    /// of *additional* independent suspecters beyond the first
    /// (`suspectedByCount - 1`) and `c` is
    /// `suspicionMaxIndependentSuspicions`. One suspecter (`n = 0`)
    /// yields exactly `maxSuspicionTimeout`; `suspectedByCount >= c`
    /// yields (at least) `minSuspicionTimeout`.
    pub fn suspicion_timeout(&self, suspected_by_count: u32) -> std::time::Duration {
        let min = self.config.min_suspicion_timeout();
        let max = self.config.max_suspicion_timeout();
        let n = suspected_by_count.saturating_sub(1) as f64;
        let c = (self.config.suspicion_max_independent_suspicions.max(1)) as f64;
        let frac = (n + 1.0).ln() / (c + 1.0).ln();
        let scaled = max.as_secs_f64() * (1.0 - frac);
        std::time::Duration::from_secs_f64(scaled.max(min.as_secs_f64()))
    }

    pub fn is_expired(&self, deadline: Deadline) -> bool {
        self.clock.is_expired(deadline)
    }

    pub fn now(&self) -> Deadline {
        self.clock.now()
    }

    pub fn suspects(&self) -> impl Iterator<Item = &Member<P>> {
        self.membership.suspects()
    }

    pub fn all_members(&self) -> impl Iterator<Item = &Member<P>> {
        self.membership.all_sorted().into_iter()
    }

    pub fn dynamic_lhm_protocol_interval(&self) -> std::time::Duration {
        self.health.scale(self.config.probe_interval)
    }

    pub fn dynamic_lhm_ping_timeout(&self) -> std::time::Duration {
        self.health.scale(self.config.ping_timeout)
    }

    pub fn probe_interval(&self) -> std::time::Duration {
        self.config.probe_interval
    }

    /// Checks every suspect member's suspicion age against the lifeguard
    /// timeout and promotes timed-out ones to `unreachable`. Returns the
    /// nodes that transitioned, for the shell to announce reachability
    /// changes on.
    pub fn check_suspicion_timeouts(&mut self) -> Vec<(Node, Status, Status)> {
        let mut timed_out = Vec::new();
        for member in self.membership.suspects() {
            if let Status::Suspect(incarnation, suspected_by) = &member.status {
                let started = member.suspicion_started_at.expect("suspect members have a start time");
                let timeout = self.suspicion_timeout(suspected_by.len() as u32);
                let deadline = Deadline::from_nanos(started.nanos_since_epoch() + timeout.as_nanos() as u64);
                if self.clock.is_expired(deadline) {
                    timed_out.push((member.node(), member.status.clone(), *incarnation));
                }
            }
        }

        let mut transitions = Vec::new();
        for (node, previous, incarnation) in timed_out {
            if let Some(member) = self.membership.member(&node) {
                let peer = member.peer.clone();
                let result = self.apply_mark(node, peer, Status::Unreachable(incarnation));
                if let ApplyResult::Applied { previous: _, current } = result {
                    transitions.push((node, previous, current));
                }
            }
        }
        transitions
    }

    /// `confirmDead`. Any non-dead member can be force-declared dead;
    /// `dead` about `dead` is the one `IgnoredDueToOlderStatus` case that
    /// the shell must treat as fatal (spec §4.7 `handleConfirmDead`).
    pub fn confirm_dead(&mut self, node: Node) -> Option<ApplyResult> {
        let member = self.membership.member(&node)?;
        let peer = member.peer.clone();
        Some(self.apply_mark(node, peer, Status::Dead))
    }
}

