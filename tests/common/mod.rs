//! Test doubles for the integration suite. Duplicated (rather than
//! reused) from `src/test_support.rs` since that module is
//! `#[cfg(test)]`-gated inside the library crate and isn't visible to
//! these external integration tests.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use swim_core::{Node, Peer, ProbeRequest, ProbeResponse, SwimError, Transport};

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

pub fn node(port: u16) -> Node {
    Node::new(addr(port), 0)
}

#[derive(Debug, Clone)]
pub struct ScriptedPeer {
    node: Node,
    script: Arc<Mutex<Vec<Result<ProbeResponse, SwimError>>>>,
}

impl ScriptedPeer {
    pub fn new(node: Node) -> Self {
        ScriptedPeer {
            node,
            script: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push_response(&self, response: Result<ProbeResponse, SwimError>) {
        self.script.lock().unwrap().push(response);
    }
}

#[async_trait]
impl Peer for ScriptedPeer {
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

#[derive(Default, Clone)]
pub struct ScriptedTransport;

#[async_trait]
impl Transport for ScriptedTransport {
    type Peer = ScriptedPeer;

    fn peer(&self, node: Node) -> ScriptedPeer {
        ScriptedPeer::new(node)
    }

    async fn ensure_association(&self, node: Node) -> Result<Node, SwimError> {
        Ok(node)
    }
}
