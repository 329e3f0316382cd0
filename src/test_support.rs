//! Shared test doubles. Not part of the public API; compiled only under
//! `#[cfg(test)]` via the `mod` declaration in `lib.rs`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SwimError;
use crate::peer::{Node, Peer, ProbeRequest, ProbeResponse, Transport};
use crate::wire::{Ack, GossipPayload};

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

pub fn node(port: u16) -> Node {
    Node::new(addr(port), 0)
}

/// A `Peer` whose responses are scripted by the test rather than sent
/// over a real socket.
#[derive(Debug, Clone)]
pub struct TestPeer {
    node: Node,
    script: Arc<Mutex<Vec<Result<ProbeResponse, SwimError>>>>,
}

impl TestPeer {
    pub fn new(node: Node) -> Self {
        TestPeer {
            node,
            script: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queues the response (or error) the next `ask` call will return,
    /// FIFO.
    pub fn push_response(&self, response: Result<ProbeResponse, SwimError>) {
        self.script.lock().unwrap().push(response);
    }
}

#[async_trait]
impl Peer for TestPeer {
    fn node(&self) -> Node {
        self.node
    }

    async fn tell(&self, _msg: ProbeResponse) -> Result<(), SwimError> {
        Ok(())
    }

    async fn ask(&self, _msg: ProbeRequest, _timeout: Duration) -> Result<ProbeResponse, SwimError> {
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            return Err(SwimError::Timeout { node: self.node });
        }
        script.remove(0)
    }
}

pub fn ack(target: Node, incarnation: u64) -> ProbeResponse {
    ProbeResponse::Ack(Ack {
        target,
        incarnation,
        payload: GossipPayload::None,
    })
}

/// An in-memory transport that hands out `TestPeer`s and always succeeds
/// at "ensuring association".
#[derive(Default, Clone)]
pub struct TestTransport;

#[async_trait]
impl Transport for TestTransport {
    type Peer = TestPeer;

    fn peer(&self, node: Node) -> TestPeer {
        TestPeer::new(node)
    }

    async fn ensure_association(&self, node: Node) -> Result<Node, SwimError> {
        Ok(node)
    }
}
