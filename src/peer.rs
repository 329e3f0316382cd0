//! Node identity and the peer abstraction used to address it.
//!
//! `Node` is a stable logical identity (host/port plus an
//! incarnation-tagged unique id, so a restarted process is distinguishable
//! from its former self). `Peer` is the opaque, addressable handle the
//! core uses to talk to a node; it is obtained from the transport and
//! never constructed by the core (design note in spec §9: peers are
//! identifiers plus a transport-owned send capability, not a live
//! reference with back-edges into the shell).

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SwimError;
use crate::wire::{Ack, Nack, PingPayload, PingReqPayload};

/// A process-unique tag distinguishing successive incarnations of a node
/// bound to the same address (e.g. after a restart). Generated once at
/// process start by whoever constructs the local `Node`; the core never
/// mints one for a remote node (it copies whatever the wire message
/// carried).
pub type RestartTag = u128;

/// A stable logical identity for a cluster participant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Node {
    pub addr: SocketAddr,
    pub restart_tag: RestartTag,
}

impl Node {
    pub fn new(addr: SocketAddr, restart_tag: RestartTag) -> Self {
        Node { addr, restart_tag }
    }

    /// Full identity comparison: same address *and* same restart tag.
    /// This is the equality used by the membership table (a Node key).
    pub fn is_same_incarnation_as(&self, other: &Node) -> bool {
        self.addr == other.addr && self.restart_tag == other.restart_tag
    }

    /// Address-only identity comparison, ignoring the restart tag. Per
    /// the resolved Open Question in DESIGN.md, `handleMonitor` uses this
    /// relation to decide whether a monitor request targets "myself".
    pub fn is_same_address_as(&self, other: &Node) -> bool {
        self.addr == other.addr
    }
}

// `PartialEq`/`Eq`/`Hash` are the *full* identity relation (address +
// restart tag), since that's what the membership table keys on.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_incarnation_as(other)
    }
}
impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
        self.restart_tag.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:x}", self.addr, self.restart_tag & 0xffff)
    }
}

/// Outbound request sent to a peer. The core only ever issues the two
/// probe-family requests; acks/nacks are replies, not standalone sends.
#[derive(Debug, Clone)]
pub enum ProbeRequest {
    Ping(PingPayload),
    PingReq(PingReqPayload),
}

/// Reply to a probe-family request.
#[derive(Debug, Clone)]
pub enum ProbeResponse {
    Ack(Ack),
    Nack(Nack),
}

/// An addressable handle bound to a `Node`. Supports fire-and-forget
/// delivery (`tell`) and request/response with a timeout (`ask`).
/// Implemented by the transport; the core treats it opaquely.
#[async_trait]
pub trait Peer: fmt::Debug + Send + Sync {
    fn node(&self) -> Node;

    /// Fire-and-forget delivery, used for ack/nack replies.
    async fn tell(&self, msg: ProbeResponse) -> Result<(), SwimError>;

    /// Request/response with a timeout, used for ping and ping-req.
    async fn ask(&self, msg: ProbeRequest, timeout: Duration) -> Result<ProbeResponse, SwimError>;
}

/// Transport-owned lookup from `Node` to a live peer handle, plus the
/// association-ensuring hook used before applying gossip about an
/// unknown node (spec §4.1 `onGossipPayload` → `connect`).
#[async_trait]
pub trait Transport: Send + Sync {
    type Peer: Peer + Clone + 'static;

    /// Resolve (creating if necessary) a peer handle for `node`.
    fn peer(&self, node: Node) -> Self::Peer;

    /// Ensure a live association (e.g. a connection/handshake) exists
    /// with `node` before the core applies a gossip fact about it. Per
    /// the resolved Open Question in DESIGN.md, the default
    /// implementation used in tests short-circuits to success for any
    /// node; production transports may perform a real handshake.
    async fn ensure_association(&self, node: Node) -> Result<Node, SwimError>;
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn full_identity_distinguishes_restarts() {
        let a = Node::new(addr(9000), 1);
        let b = Node::new(addr(9000), 2);
        assert_ne!(a, b);
        assert!(a.is_same_address_as(&b));
        assert!(!a.is_same_incarnation_as(&b));
    }

    #[test]
    fn same_address_and_tag_is_equal() {
        let a = Node::new(addr(9000), 1);
        let b = Node::new(addr(9000), 1);
        assert_eq!(a, b);
    }
}
