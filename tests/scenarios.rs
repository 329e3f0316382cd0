//! End-to-end scenarios from the spec's testable-properties section,
//! driven directly against `SwimInstance` with a `ManualClock` — no
//! networking, no real timers, fully deterministic.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use swim_core::{ApplyResult, GossipDirective, ManualClock, PingRequestOutcome, Status, SwimConfig, SwimInstance};

use common::{node, ScriptedPeer, ScriptedTransport};

fn instance_with(local_port: u16, seed: u64) -> (SwimInstance<ScriptedPeer>, Arc<ManualClock>) {
    let local = node(local_port);
    let clock = Arc::new(ManualClock::new());
    let instance = SwimInstance::with_seed(local, ScriptedPeer::new(local), SwimConfig::default(), clock.clone(), seed);
    (instance, clock)
}

#[test]
fn scenario_1_direct_probe_ack_leaves_member_alive_and_lhm_zero() {
    let (mut a, _clock) = instance_with(1, 1);
    let b = node(2);
    a.add_member(ScriptedPeer::new(b), Status::Alive(0));

    // B acks at incarnation 0 with an empty payload; the shell would mark
    // the member alive and, with no ping-req origin, bump LHM down.
    let result = a.mark(ScriptedPeer::new(b), Status::Alive(0));
    assert!(matches!(result, ApplyResult::IgnoredDueToOlderStatus(Status::Alive(0))));
    assert_eq!(a.status(&b), Some(&Status::Alive(0)));
    assert_eq!(a.local_health_multiplier(), 0);
}

#[test]
fn scenario_2_direct_timeout_escalates_to_suspect_then_unreachable() {
    let (mut a, clock) = instance_with(1, 2);
    let b = node(2);
    a.add_member(ScriptedPeer::new(b), Status::Alive(0));

    // Both indirect helpers time out; onPingRequestResponse marks B suspect.
    let outcome = a.on_ping_request_response(Err(swim_core::SwimError::Timeout { node: b }), b);
    assert!(matches!(outcome, PingRequestOutcome::NewlySuspect));
    match a.status(&b) {
        Some(Status::Suspect(0, suspected_by)) => {
            assert_eq!(suspected_by, &HashSet::from([a.local_node()]));
        }
        other => panic!("expected suspect(0, {{A}}), got {other:?}"),
    }

    // count = 1 -> suspicion timeout is the full maxSuspicionTimeout (10s).
    let timeout = a.suspicion_timeout(1);
    assert_eq!(timeout, Duration::from_secs(10));

    clock.advance(Duration::from_secs(9));
    assert!(a.check_suspicion_timeouts().is_empty(), "must not fire before the timeout elapses");

    clock.advance(Duration::from_secs(2));
    let transitions = a.check_suspicion_timeouts();
    assert_eq!(transitions.len(), 1);
    let (node_transitioned, _previous, current) = &transitions[0];
    assert_eq!(*node_transitioned, b);
    assert_eq!(*current, Status::Unreachable(0));
    assert_eq!(a.status(&b), Some(&Status::Unreachable(0)));
}

#[test]
fn scenario_3_refutation_bumps_local_incarnation_and_refutes() {
    let (mut a, _clock) = instance_with(1, 3);
    // incarnation 5 is asserted via five successive self-refutations so
    // the local incarnation actually reaches 5 before the test fact
    // arrives, matching the scenario's starting condition.
    for i in 0..5 {
        let directive = a.on_gossip_payload((a.local_node(), Status::Suspect(i, HashSet::from([node(9)]))));
        assert!(matches!(directive, GossipDirective::Applied { .. }));
    }
    assert_eq!(a.local_incarnation(), 5);

    let directive = a.on_gossip_payload((a.local_node(), Status::Suspect(5, HashSet::from([node(99)]))));
    match directive {
        GossipDirective::Applied { current, .. } => assert_eq!(current, Status::Alive(6)),
        other => panic!("expected applied self-refutation, got {other:?}"),
    }
    assert_eq!(a.local_incarnation(), 6);

    // The next outgoing payload preferentially includes this refutation.
    let payload = a.make_gossip_payload(node(9));
    assert_eq!(payload.entries()[0], (a.local_node(), Status::Alive(6)));
}

#[test]
fn scenario_4_dead_is_terminal_and_silences_later_gossip() {
    let (mut a, _clock) = instance_with(1, 4);
    let b = node(2);
    a.add_member(ScriptedPeer::new(b), Status::Alive(2));

    let confirmed = a.confirm_dead(b).expect("member exists");
    assert!(matches!(confirmed, ApplyResult::Applied { current: Status::Dead, .. }));
    assert_eq!(a.status(&b), Some(&Status::Dead));

    let directive = a.on_gossip_payload((b, Status::Alive(9)));
    match directive {
        GossipDirective::Ignored { .. } => {}
        other => panic!("expected dead-is-terminal to ignore stale alive gossip, got {other:?}"),
    }
    assert_eq!(a.status(&b), Some(&Status::Dead));
}

#[test]
fn scenario_5_indirect_success_marks_alive_and_upserts_gossiped_member() {
    let (mut a, _clock) = instance_with(1, 5);
    let b = node(2);
    let e = node(5);
    a.add_member(ScriptedPeer::new(b), Status::Alive(0));

    let relay_ack = swim_core::ProbeResponse::Ack(swim_core::Ack {
        target: b,
        incarnation: 3,
        payload: swim_core::GossipPayload::Membership {
            entries: vec![(e, Status::Suspect(4, HashSet::from([node(3)])))],
        },
    });

    let outcome = a.on_ping_request_response(Ok(relay_ack), b);
    let (incarnation, payload) = match outcome {
        PingRequestOutcome::Alive { incarnation, payload } => (incarnation, payload),
        other => panic!("expected alive outcome, got {other:?}"),
    };
    assert_eq!(incarnation, 3);

    // The shell would mark B alive(3) itself; do so here to mirror it.
    a.mark(ScriptedPeer::new(b), Status::Alive(incarnation));
    assert_eq!(a.status(&b), Some(&Status::Alive(3)));

    for (gossiped_node, gossiped_status) in payload.entries().to_vec() {
        // E is unknown to A, so `onGossipPayload` hands back a `connect`
        // directive; mirror what the shell would do with a transport
        // that always succeeds at ensuring association.
        match a.on_gossip_payload((gossiped_node, gossiped_status)) {
            GossipDirective::Connect { node, status } => {
                a.finish_connect(node, ScriptedPeer::new(node), status);
            }
            GossipDirective::Applied { .. } | GossipDirective::Ignored { .. } => {}
        }
    }
    match a.status(&e) {
        Some(Status::Suspect(4, suspected_by)) => assert_eq!(suspected_by, &HashSet::from([node(3)])),
        other => panic!("expected E upserted as suspect(4, {{C}}), got {other:?}"),
    }

    // LHM is untouched by the indirect path; only direct-probe-of-A's-
    // own-target events adjust it.
    assert_eq!(a.local_health_multiplier(), 0);
}

#[test]
fn boundary_no_eligible_peers_means_no_probe() {
    let (mut a, _clock) = instance_with(1, 6);
    assert_eq!(a.next_member_to_ping(), None);
}

#[test]
fn boundary_single_other_member_has_no_ping_request_helpers() {
    let (mut a, _clock) = instance_with(1, 7);
    let b = node(2);
    a.add_member(ScriptedPeer::new(b), Status::Alive(0));
    assert!(a.members_to_ping_request(b).is_empty());
}

#[test]
fn boundary_suspicion_timeout_at_max_suspected_by_equals_minimum() {
    let (a, _clock) = instance_with(1, 8);
    assert_eq!(a.suspicion_timeout(a.config().suspicion_max_independent_suspicions), Duration::from_secs(3));
}

#[test]
fn unused_scripted_transport_constructs() {
    // `ScriptedTransport` only exists to prove the `Transport` impl
    // compiles against the public trait; the instance-level scenarios
    // above don't need a transport at all.
    let _ = ScriptedTransport;
}
