//! Wire message schema (spec §6). Encoding/framing is the transport's
//! concern; these types are the payload shapes the core produces and
//! consumes. `serde` derives are provided so a transport can serialize
//! them without the core dictating a wire format.

use serde::{Deserialize, Serialize};

use crate::peer::Node;
use crate::status::Status;

/// Membership facts piggybacked on probes and responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipPayload {
    None,
    Membership { entries: Vec<(Node, Status)> },
}

impl GossipPayload {
    pub fn is_empty(&self) -> bool {
        matches!(self, GossipPayload::None)
    }

    pub fn from_entries(entries: Vec<(Node, Status)>) -> Self {
        if entries.is_empty() {
            GossipPayload::None
        } else {
            GossipPayload::Membership { entries }
        }
    }

    pub fn entries(&self) -> &[(Node, Status)] {
        match self {
            GossipPayload::None => &[],
            GossipPayload::Membership { entries } => entries,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingPayload {
    pub reply_to: Node,
    pub payload: GossipPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingReqPayload {
    pub target: Node,
    pub reply_to: Node,
    pub payload: GossipPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub target: Node,
    pub incarnation: u64,
    pub payload: GossipPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nack {
    pub target: Node,
}
