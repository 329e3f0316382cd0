//! A SWIM-style failure detector core: a pure, deterministic state
//! machine (`SwimInstance`) plus an async driver (`Shell`) that owns
//! timers, probes, and transport I/O. See `SPEC_FULL.md`/`DESIGN.md` for
//! the design this crate implements.
//!
//! Wire framing, socket handling, downing policy, and configuration
//! loading are deliberately out of scope; this crate only specifies the
//! capabilities it consumes from its host (`Transport`/`Peer`) and emits
//! to it (`ReachabilityEvent`).

pub mod clock;
pub mod config;
pub mod error;
pub mod gossip;
pub mod health;
pub mod instance;
pub mod membership;
pub mod peer;
pub mod scheduler;
pub mod shell;
pub mod status;
pub mod wire;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, Deadline, ManualClock, SystemClock, TimerKey, TimerRegistry};
pub use config::SwimConfig;
pub use error::{SwimError, SwimResult};
pub use instance::{ApplyResult, GossipDirective, PingRequestOutcome, SwimInstance};
pub use membership::{MarkResult, Member};
pub use peer::{Node, Peer, ProbeRequest, ProbeResponse, RestartTag, Transport};
pub use shell::{ReachabilityEvent, Shell, ShellCommand};
pub use status::{Incarnation, Reachability, Status};
pub use wire::{Ack, GossipPayload, Nack, PingPayload, PingReqPayload};
