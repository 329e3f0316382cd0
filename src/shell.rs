//! The async SWIM Shell (spec §4.7): owns the event loop, the timers, and
//! all transport I/O. The instance never runs off its own accord — every
//! mutation here is driven by a command pulled off one FIFO queue or by
//! the periodic-ping timer, so instance access never needs a lock (spec
//! §5).
//!
//! Event-loop shape grounded in `percas`'s gossip loop
//! (`crates-gossip-src-gossip.rs`): a `tokio::select!` between a
//! rescheduling timer and an inbound command channel, with probes
//! dispatched as detached tasks that report their outcome back onto the
//! same channel rather than blocking the loop.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant as TokioInstant;

use crate::clock::{Clock, TimerKey, TimerRegistry};
use crate::config::SwimConfig;
use crate::error::SwimError;
use crate::health::HealthEvent;
use crate::instance::{ApplyResult, GossipDirective, PingRequestOutcome, SwimInstance};
use crate::peer::{Node, Peer, ProbeRequest, ProbeResponse, Transport};
use crate::status::{Reachability, Status};
use crate::wire::{Ack, GossipPayload, Nack, PingPayload, PingReqPayload};

/// A reachability-class crossing, emitted to whatever external cluster
/// shell is watching this instance (spec §6 `failureDetectorReachabilityChanged`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachabilityEvent {
    pub node: Node,
    pub reachability: Reachability,
}

/// Local control messages the shell processes, one at a time, off its
/// command channel (spec §6 inbound control messages, plus the
/// probe-completion events that re-enter the loop after a suspension
/// point).
pub enum ShellCommand {
    Monitor(Node),
    ConfirmDead(Node),
    IncomingPing {
        from: Node,
        payload: GossipPayload,
        respond: oneshot::Sender<Ack>,
    },
    IncomingPingReq {
        target: Node,
        reply_to: Node,
        payload: GossipPayload,
        respond: oneshot::Sender<ProbeResponse>,
    },
    GetMembershipState(oneshot::Sender<HashMap<Node, Status>>),
    PingCompleted {
        target: Node,
        relay: Option<oneshot::Sender<ProbeResponse>>,
        result: Result<ProbeResponse, SwimError>,
    },
    PingRequestsCompleted {
        target: Node,
        result: Result<ProbeResponse, SwimError>,
    },
}

pub struct Shell<T: Transport> {
    instance: SwimInstance<T::Peer>,
    transport: T,
    timers: TimerRegistry,
    commands: mpsc::UnboundedSender<ShellCommand>,
    reachability: mpsc::UnboundedSender<ReachabilityEvent>,
}

impl<T: Transport + 'static> Shell<T> {
    pub fn new(
        local: Node,
        transport: T,
        config: SwimConfig,
        clock: Arc<dyn Clock>,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<ShellCommand>,
        mpsc::UnboundedReceiver<ReachabilityEvent>,
    ) {
        let local_peer = transport.peer(local);
        let instance = SwimInstance::new(local, local_peer, config, clock);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (reachability_tx, reachability_rx) = mpsc::unbounded_channel();
        let shell = Shell {
            instance,
            transport,
            timers: TimerRegistry::new(),
            commands: commands_tx,
            reachability: reachability_tx,
        };
        (shell, commands_rx, reachability_rx)
    }

    pub fn command_sender(&self) -> mpsc::UnboundedSender<ShellCommand> {
        self.commands.clone()
    }

    /// Runs the event loop until the command channel is closed. Per spec
    /// §4.7 lifecycle: a `periodic-ping` timer is scheduled at
    /// construction and re-scheduled with `dynamicLHMProtocolInterval`
    /// after every tick; everything else is driven by `commands`.
    pub async fn run(mut self, mut commands_rx: mpsc::UnboundedReceiver<ShellCommand>) {
        self.timers.schedule(TimerKey::PeriodicPing);
        let mut next_tick = TokioInstant::now() + self.instance.probe_interval();

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_tick) => {
                    self.timers.schedule(TimerKey::PeriodicPing);
                    self.on_periodic_tick();
                    next_tick = TokioInstant::now() + self.instance.dynamic_lhm_protocol_interval();
                }
                maybe_cmd = commands_rx.recv() => {
                    match maybe_cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: ShellCommand) {
        match cmd {
            ShellCommand::Monitor(node) => self.handle_monitor(node).await,
            ShellCommand::ConfirmDead(node) => self.handle_confirm_dead(node),
            ShellCommand::IncomingPing { from, payload, respond } => {
                self.handle_incoming_ping(from, payload, respond).await
            }
            ShellCommand::IncomingPingReq { target, reply_to, payload, respond } => {
                self.handle_incoming_ping_req(target, reply_to, payload, respond).await
            }
            ShellCommand::PingCompleted { target, relay, result } => self.handle_ping_response(result, target, relay).await,
            ShellCommand::PingRequestsCompleted { target, result } => {
                self.handle_ping_request_result(result, target).await
            }
            ShellCommand::GetMembershipState(respond) => {
                let _ = respond.send(self.snapshot());
            }
        }
    }

    // ---- §4.7 periodic tick ----

    fn on_periodic_tick(&mut self) {
        let transitions = self.instance.check_suspicion_timeouts();
        for (node, previous, current) in transitions {
            self.try_announce_reachability(node, previous, current);
        }
        if let Some(target) = self.instance.next_member_to_ping() {
            self.send_ping(target, None);
        }
        self.instance.increment_protocol_period();
    }

    // ---- §4.7 sendPing / handlePingResponse ----

    /// `relay` is `Some` when this probe is being performed on behalf of
    /// an inbound `pingReq` (spec's `shellResponseGate`): the eventual
    /// result is handed back through that channel to whoever is holding
    /// the other end of the wire request, instead of being used for our
    /// own LHM bookkeeping or triggering indirect probing.
    fn send_ping(&mut self, target: Node, relay: Option<oneshot::Sender<ProbeResponse>>) {
        let payload = self.instance.make_gossip_payload(target);
        let timeout = self.instance.dynamic_lhm_ping_timeout();
        let local = self.instance.local_node();
        let peer = self.peer_handle(target);
        let tx = self.commands.clone();

        tokio::spawn(async move {
            let result = peer
                .ask(ProbeRequest::Ping(PingPayload { reply_to: local, payload }), timeout)
                .await;
            let _ = tx.send(ShellCommand::PingCompleted { target, relay, result });
        });
    }

    async fn handle_ping_response(
        &mut self,
        result: Result<ProbeResponse, SwimError>,
        pinged_member: Node,
        relay: Option<oneshot::Sender<ProbeResponse>>,
    ) {
        match result {
            Err(_) => {
                if let Some(relay) = relay {
                    self.instance.adjust_lh_multiplier(HealthEvent::ProbeWithMissedNack);
                    let _ = relay.send(ProbeResponse::Nack(Nack { target: pinged_member }));
                } else {
                    self.instance.adjust_lh_multiplier(HealthEvent::FailedProbe);
                    self.send_ping_requests(pinged_member);
                }
            }
            Ok(ProbeResponse::Ack(ack)) => {
                self.process_gossip_payload(ack.payload.clone()).await;
                let peer = self.peer_handle(pinged_member);
                let result = self.instance.mark(peer, Status::Alive(ack.incarnation));
                self.announce_apply_result(pinged_member, result);

                if let Some(relay) = relay {
                    let _ = relay.send(ProbeResponse::Ack(ack));
                } else {
                    self.instance.adjust_lh_multiplier(HealthEvent::SuccessfulProbe);
                }
            }
            Ok(ProbeResponse::Nack(_)) => {}
        }
    }

    // ---- §4.7 sendPingRequests / handlePingRequestResult ----

    fn send_ping_requests(&mut self, to_ping: Node) {
        if !self.instance.is_member(&to_ping) {
            return;
        }
        let helpers = self.instance.members_to_ping_request(to_ping);
        if helpers.is_empty() {
            if let Some(incarnation) = self.instance.status(&to_ping).and_then(|s| s.incarnation()) {
                let suspicion = self.instance.make_suspicion(incarnation);
                let peer = self.peer_handle(to_ping);
                let result = self.instance.mark(peer, suspicion);
                self.announce_apply_result(to_ping, result);
            }
            return;
        }

        let payload = self.instance.make_gossip_payload(to_ping);
        let timeout = self.instance.dynamic_lhm_ping_timeout();
        let local = self.instance.local_node();
        let tx = self.commands.clone();
        let asks: Vec<T::Peer> = helpers.into_iter().map(|helper| self.peer_handle(helper)).collect();

        tokio::spawn(async move {
            let mut pending = FuturesUnordered::new();
            for peer in asks {
                let payload = payload.clone();
                pending.push(async move {
                    peer.ask(
                        ProbeRequest::PingReq(PingReqPayload { target: to_ping, reply_to: local, payload }),
                        timeout,
                    )
                    .await
                });
            }

            let mut last_err = None;
            let mut success = None;
            while let Some(outcome) = pending.next().await {
                match outcome {
                    Ok(resp @ ProbeResponse::Ack(_)) => {
                        success = Some(resp);
                        break;
                    }
                    Ok(ProbeResponse::Nack(_)) => continue,
                    Err(err) => last_err = Some(err),
                }
            }
            // Failures are swallowed at this level; overall failure is
            // modeled as the aggregate's own timeout (spec §4.7 step 5).
            let result = match success {
                Some(resp) => Ok(resp),
                None => Err(last_err.unwrap_or(SwimError::Timeout { node: to_ping })),
            };
            let _ = tx.send(ShellCommand::PingRequestsCompleted { target: to_ping, result });
        });
    }

    async fn handle_ping_request_result(&mut self, result: Result<ProbeResponse, SwimError>, pinged_member: Node) {
        let outcome = self.instance.on_ping_request_response(result, pinged_member);
        match outcome {
            PingRequestOutcome::Alive { incarnation, payload } => {
                self.process_gossip_payload(payload).await;
                let peer = self.peer_handle(pinged_member);
                let result = self.instance.mark(peer, Status::Alive(incarnation));
                self.announce_apply_result(pinged_member, result);
            }
            PingRequestOutcome::NewlySuspect => {
                log::trace!("swim/member={pinged_member} newly suspect, indirect probe exhausted");
            }
            PingRequestOutcome::NackReceived => {
                log::trace!("swim/member={pinged_member} indirect probe nacked");
            }
            PingRequestOutcome::Ignored => {}
        }
    }

    // ---- §4.7 handleMonitor / handleConfirmDead ----

    async fn handle_monitor(&mut self, node: Node) {
        if node.is_same_address_as(&self.instance.local_node()) {
            return;
        }
        let peer = self.transport.peer(node);
        self.instance.add_member(peer, Status::Alive(0));
        self.send_ping(node, None);
    }

    fn handle_confirm_dead(&mut self, node: Node) {
        match self.instance.status(&node) {
            None => log::warn!("swim/target={node} confirmDead for a node that isn't a member"),
            Some(Status::Dead) => {}
            Some(_) => match self.instance.confirm_dead(node) {
                Some(ApplyResult::Applied { previous, current }) => {
                    self.try_announce_reachability(node, previous, current);
                }
                Some(ApplyResult::IgnoredDueToOlderStatus(_)) => {
                    panic!("swim/target={node}: confirmDead was ignored as stale; dead must be terminal");
                }
                None => {}
            },
        }
    }

    // ---- inbound wire requests ----

    async fn handle_incoming_ping(&mut self, from: Node, payload: GossipPayload, respond: oneshot::Sender<Ack>) {
        self.process_gossip_payload(payload).await;
        let ack = self.instance.on_ping(from);
        let _ = respond.send(ack);
    }

    async fn handle_incoming_ping_req(
        &mut self,
        target: Node,
        reply_to: Node,
        payload: GossipPayload,
        respond: oneshot::Sender<ProbeResponse>,
    ) {
        log::trace!("swim/target={target} reply_to={reply_to} handling inbound ping-req");
        self.process_gossip_payload(payload).await;
        self.send_ping(target, Some(respond));
    }

    // ---- §4.7/§4.8 processGossipPayload / tryAnnounceMemberReachability ----

    async fn process_gossip_payload(&mut self, payload: GossipPayload) {
        if payload.is_empty() {
            return;
        }
        for entry in payload.entries().to_vec() {
            let directive = self.instance.on_gossip_payload(entry);
            match directive {
                GossipDirective::Connect { node, status } => match self.transport.ensure_association(node).await {
                    Ok(resolved) => {
                        let peer = self.transport.peer(resolved);
                        let result = self.instance.finish_connect(resolved, peer, status);
                        self.announce_apply_result(resolved, result);
                    }
                    Err(err) => log::warn!("swim/target={node} failed to ensure association: {err}"),
                },
                GossipDirective::Applied { node, previous, current } => {
                    self.try_announce_reachability(node, previous, current);
                }
                GossipDirective::Ignored { level, message } => log::log!(level, "{message}"),
            }
        }
    }

    fn announce_apply_result(&self, node: Node, result: ApplyResult) {
        if let ApplyResult::Applied { previous, current } = result {
            self.try_announce_reachability(node, previous, current);
        }
    }

    fn try_announce_reachability(&self, node: Node, previous: Status, current: Status) {
        if previous.reachability() == current.reachability() {
            return;
        }
        let _ = self.reachability.send(ReachabilityEvent { node, reachability: current.reachability() });
    }

    fn peer_handle(&self, node: Node) -> T::Peer {
        self.instance
            .member(&node)
            .map(|m| m.peer.clone())
            .unwrap_or_else(|| self.transport.peer(node))
    }

    fn snapshot(&self) -> HashMap<Node, Status> {
        self.instance.all_members().map(|m| (m.node(), m.status.clone())).collect()
    }
}
