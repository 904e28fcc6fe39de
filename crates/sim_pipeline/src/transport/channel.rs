//! In-process transport: one thread per rank, adjacent ranks joined by
//! mpsc queues, a shared barrier for the end-of-run rendezvous.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Barrier};

use sim_pipeline_core::wire::{HandoffRecord, StatRecord};

use super::{TransportError, WorkerLinks};

pub struct ChannelLinks {
    rank: usize,
    world_size: usize,
    inbound: Option<Receiver<Vec<HandoffRecord>>>,
    outbound: Option<Sender<Vec<HandoffRecord>>>,
    barrier: Arc<Barrier>,
    stats_tx: Sender<(usize, StatRecord)>,
    stats_rx: Option<Receiver<(usize, StatRecord)>>,
}

/// Build the full pipeline topology: element `r` of the result is rank
/// `r`'s endpoints, ready to move into its worker thread.
pub fn build_links(world_size: usize) -> Vec<ChannelLinks> {
    let barrier = Arc::new(Barrier::new(world_size));
    let (stats_tx, stats_rx) = mpsc::channel();

    let mut inbounds: Vec<Option<Receiver<Vec<HandoffRecord>>>> = Vec::new();
    let mut outbounds: Vec<Option<Sender<Vec<HandoffRecord>>>> = Vec::new();
    inbounds.push(None); // the head has no left neighbor
    for _ in 1..world_size {
        let (tx, rx) = mpsc::channel();
        outbounds.push(Some(tx));
        inbounds.push(Some(rx));
    }
    outbounds.push(None); // the tail has no right neighbor

    let mut stats_rx = Some(stats_rx);
    inbounds
        .into_iter()
        .zip(outbounds)
        .enumerate()
        .map(|(rank, (inbound, outbound))| ChannelLinks {
            rank,
            world_size,
            inbound,
            outbound,
            barrier: Arc::clone(&barrier),
            stats_tx: stats_tx.clone(),
            stats_rx: if rank == 0 { stats_rx.take() } else { None },
        })
        .collect()
}

impl WorkerLinks for ChannelLinks {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn recv_inbound(&mut self) -> Result<Vec<HandoffRecord>, TransportError> {
        let inbound = self.inbound.as_ref().ok_or_else(|| {
            TransportError::Protocol("the head rank has no left neighbor".into())
        })?;
        inbound
            .recv()
            .map_err(|_| TransportError::Disconnected("left neighbor hung up".into()))
    }

    fn send_outbound(&mut self, batch: &[HandoffRecord]) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or_else(|| {
            TransportError::Protocol("the tail rank has no right neighbor".into())
        })?;
        outbound
            .send(batch.to_vec())
            .map_err(|_| TransportError::Disconnected("right neighbor hung up".into()))
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        self.barrier.wait();
        Ok(())
    }

    fn gather_stats(
        &mut self,
        local: StatRecord,
    ) -> Result<Option<Vec<StatRecord>>, TransportError> {
        if let Some(stats_rx) = &self.stats_rx {
            let mut records = vec![local; self.world_size];
            for _ in 1..self.world_size {
                let (rank, record) = stats_rx.recv().map_err(|_| {
                    TransportError::Disconnected("worker died before the gather".into())
                })?;
                records[rank] = record;
            }
            Ok(Some(records))
        } else {
            self.stats_tx
                .send((self.rank, local))
                .map_err(|_| TransportError::Disconnected("head died before the gather".into()))?;
            Ok(None)
        }
    }
}
