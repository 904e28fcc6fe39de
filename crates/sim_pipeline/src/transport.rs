//! Ordered, reliable, blocking channels between adjacent ranks.
//!
//! The driver only ever talks to [`WorkerLinks`]; the same loop runs over
//! in-process queues or TCP sockets. Channels carry typed handoff batches
//! in tick order, exactly one batch per tick per directed link, so a
//! worker's progress is naturally gated on its left neighbor.

use sim_pipeline_core::wire::{HandoffRecord, StatRecord, WireError};

pub mod channel;
pub mod tcp;

#[derive(Debug)]
pub enum TransportError {
    /// The peer went away; with no fault tolerance this ends the run.
    Disconnected(String),
    Io(String),
    Wire(WireError),
    /// The caller broke the topology contract (e.g. head receiving).
    Protocol(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Disconnected(message) => write!(f, "peer disconnected: {message}"),
            TransportError::Io(message) => write!(f, "channel i/o failed: {message}"),
            TransportError::Wire(error) => write!(f, "malformed frame: {error}"),
            TransportError::Protocol(message) => write!(f, "protocol misuse: {message}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<WireError> for TransportError {
    fn from(error: WireError) -> Self {
        TransportError::Wire(error)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io(error.to_string())
    }
}

/// One rank's endpoints into the pipeline.
///
/// `recv_inbound` blocks for the left neighbor's batch for this tick; the
/// head has no left neighbor and must not call it. `send_outbound` is
/// synchronous for the caller but does not wait for the receiver to drain
/// the batch. `barrier` is the collective rendezvous after the final tick
/// and `gather_stats` the statistics collection that follows it: every
/// rank passes its local record in, and the head gets all of them back in
/// rank order.
pub trait WorkerLinks: Send {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    fn recv_inbound(&mut self) -> Result<Vec<HandoffRecord>, TransportError>;

    fn send_outbound(&mut self, batch: &[HandoffRecord]) -> Result<(), TransportError>;

    fn barrier(&mut self) -> Result<(), TransportError>;

    fn gather_stats(
        &mut self,
        local: StatRecord,
    ) -> Result<Option<Vec<StatRecord>>, TransportError>;
}
