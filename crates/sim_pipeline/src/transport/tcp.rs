//! TCP transport: one OS process per rank on a shared host list.
//!
//! Rank `r > 0` listens for its left neighbor's boundary stream on
//! `base_port + r` and dials rank 0's control listener on `base_port`.
//! Frames on the boundary stream are the fixed wire layout (count, then
//! records); the control stream carries a one-byte barrier exchange
//! followed by the 24-byte statistics record. Connection setup retries
//! briefly while peers bind their listeners; once a channel is up, any
//! I/O error is fatal.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use sim_pipeline_core::wire::{
    decode_batch, encode_batch, HandoffRecord, StatRecord,
};

use super::{TransportError, WorkerLinks};

const CONNECT_ATTEMPTS: u32 = 200;
const CONNECT_BACKOFF: Duration = Duration::from_millis(50);

const BARRIER_REACHED: u8 = 0x01;
const BARRIER_RELEASE: u8 = 0x02;

#[derive(Debug)]
enum ControlChannel {
    /// Head side: one stream per worker, indexed by `rank - 1`.
    Head { workers: Vec<TcpStream> },
    Worker { to_head: TcpStream },
}

#[derive(Debug)]
pub struct TcpLinks {
    rank: usize,
    world_size: usize,
    left: Option<TcpStream>,
    right: Option<TcpStream>,
    control: ControlChannel,
}

fn connect_retry(host: &str, port: u16) -> Result<TcpStream, TransportError> {
    let mut last_error = None;
    for _ in 0..CONNECT_ATTEMPTS {
        match TcpStream::connect((host, port)) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(error) => {
                last_error = Some(error);
                std::thread::sleep(CONNECT_BACKOFF);
            }
        }
    }
    Err(TransportError::Io(format!(
        "could not reach {host}:{port}: {}",
        last_error.expect("at least one attempt")
    )))
}

impl TcpLinks {
    /// Establish this rank's links. Every rank first binds its listeners,
    /// then dials its peers, then accepts; pending connections queue in
    /// the listener backlog, so the phases cannot deadlock.
    pub fn connect(
        rank: usize,
        world_size: usize,
        host: &str,
        base_port: u16,
    ) -> Result<Self, TransportError> {
        if world_size < 2 {
            return Err(TransportError::Protocol(
                "the pipeline needs at least 2 workers".into(),
            ));
        }
        if rank >= world_size {
            return Err(TransportError::Protocol(format!(
                "rank {rank} is outside the {world_size}-worker topology"
            )));
        }

        let boundary_listener = if rank > 0 {
            Some(TcpListener::bind((host, base_port + rank as u16))?)
        } else {
            None
        };
        let control_listener = if rank == 0 {
            Some(TcpListener::bind((host, base_port))?)
        } else {
            None
        };

        let right = if rank + 1 < world_size {
            Some(connect_retry(host, base_port + (rank as u16 + 1))?)
        } else {
            None
        };

        let control = match control_listener {
            Some(listener) => {
                let mut workers: Vec<Option<TcpStream>> = Vec::new();
                workers.resize_with(world_size - 1, || None);
                for _ in 1..world_size {
                    let (mut stream, _) = listener.accept()?;
                    stream.set_nodelay(true)?;
                    let mut hello = [0u8; 4];
                    stream.read_exact(&mut hello)?;
                    let peer = u32::from_le_bytes(hello) as usize;
                    if peer == 0 || peer >= world_size {
                        return Err(TransportError::Protocol(format!(
                            "control hello from unexpected rank {peer}"
                        )));
                    }
                    workers[peer - 1] = Some(stream);
                }
                let workers = workers
                    .into_iter()
                    .map(|slot| {
                        slot.ok_or_else(|| {
                            TransportError::Protocol("duplicate control hello".into())
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                ControlChannel::Head { workers }
            }
            None => {
                let mut to_head = connect_retry(host, base_port)?;
                to_head.write_all(&(rank as u32).to_le_bytes())?;
                to_head.flush()?;
                ControlChannel::Worker { to_head }
            }
        };

        let left = match boundary_listener {
            Some(listener) => {
                let (stream, _) = listener.accept()?;
                stream.set_nodelay(true)?;
                Some(stream)
            }
            None => None,
        };

        Ok(Self {
            rank,
            world_size,
            left,
            right,
            control,
        })
    }
}

fn read_frame(stream: &mut TcpStream) -> Result<Vec<HandoffRecord>, TransportError> {
    let mut count_bytes = [0u8; 4];
    stream.read_exact(&mut count_bytes)?;
    let count = i32::from_le_bytes(count_bytes);
    // Reassemble the full frame so malformed counts fail in one place.
    let payload_len = usize::try_from(count).unwrap_or(0) * HandoffRecord::WIRE_SIZE;
    let mut frame = Vec::with_capacity(4 + payload_len);
    frame.extend_from_slice(&count_bytes);
    if count > 0 {
        let mut payload = vec![0u8; payload_len];
        stream.read_exact(&mut payload)?;
        frame.extend_from_slice(&payload);
    }
    Ok(decode_batch(&frame)?)
}

impl WorkerLinks for TcpLinks {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn recv_inbound(&mut self) -> Result<Vec<HandoffRecord>, TransportError> {
        let left = self.left.as_mut().ok_or_else(|| {
            TransportError::Protocol("the head rank has no left neighbor".into())
        })?;
        read_frame(left)
    }

    fn send_outbound(&mut self, batch: &[HandoffRecord]) -> Result<(), TransportError> {
        let right = self.right.as_mut().ok_or_else(|| {
            TransportError::Protocol("the tail rank has no right neighbor".into())
        })?;
        right.write_all(&encode_batch(batch))?;
        right.flush()?;
        Ok(())
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        match &mut self.control {
            ControlChannel::Head { workers } => {
                let mut reached = [0u8; 1];
                for stream in workers.iter_mut() {
                    stream.read_exact(&mut reached)?;
                    if reached[0] != BARRIER_REACHED {
                        return Err(TransportError::Protocol(format!(
                            "unexpected barrier byte {:#04x}",
                            reached[0]
                        )));
                    }
                }
                for stream in workers.iter_mut() {
                    stream.write_all(&[BARRIER_RELEASE])?;
                    stream.flush()?;
                }
            }
            ControlChannel::Worker { to_head } => {
                to_head.write_all(&[BARRIER_REACHED])?;
                to_head.flush()?;
                let mut release = [0u8; 1];
                to_head.read_exact(&mut release)?;
                if release[0] != BARRIER_RELEASE {
                    return Err(TransportError::Protocol(format!(
                        "unexpected barrier release byte {:#04x}",
                        release[0]
                    )));
                }
            }
        }
        Ok(())
    }

    fn gather_stats(
        &mut self,
        local: StatRecord,
    ) -> Result<Option<Vec<StatRecord>>, TransportError> {
        match &mut self.control {
            ControlChannel::Head { workers } => {
                let mut records = vec![local; self.world_size];
                for (index, stream) in workers.iter_mut().enumerate() {
                    let mut bytes = [0u8; StatRecord::WIRE_SIZE];
                    stream.read_exact(&mut bytes)?;
                    records[index + 1] = StatRecord::from_bytes(&bytes);
                }
                Ok(Some(records))
            }
            ControlChannel::Worker { to_head } => {
                to_head.write_all(&local.to_bytes())?;
                to_head.flush()?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn record(id: i32) -> HandoffRecord {
        HandoffRecord {
            lane: 1,
            id,
            position: 2,
            speed: 3,
            ticks_on_segment: 4,
        }
    }

    #[test]
    fn two_rank_pipeline_exchanges_batches_and_gathers() {
        let base_port = 47311;

        let tail = thread::spawn(move || {
            let mut links = TcpLinks::connect(1, 2, "127.0.0.1", base_port).expect("tail links");
            let batch = links.recv_inbound().expect("inbound batch");
            assert_eq!(batch, vec![record(7), record(8)]);
            assert!(links.recv_inbound().expect("empty batch").is_empty());
            links.barrier().expect("tail barrier");
            let outcome = links
                .gather_stats(StatRecord {
                    mean: 4.0,
                    variance: 1.0,
                    count: 2.0,
                })
                .expect("tail gather");
            assert!(outcome.is_none());
        });

        let mut links = TcpLinks::connect(0, 2, "127.0.0.1", base_port).expect("head links");
        links
            .send_outbound(&[record(7), record(8)])
            .expect("first send");
        links.send_outbound(&[]).expect("second send");
        links.barrier().expect("head barrier");
        let gathered = links
            .gather_stats(StatRecord {
                mean: 10.0,
                variance: 0.0,
                count: 1.0,
            })
            .expect("head gather")
            .expect("head sees all records");

        assert_eq!(gathered.len(), 2);
        assert_eq!(gathered[0].mean, 10.0);
        assert_eq!(gathered[1].mean, 4.0);
        tail.join().expect("tail thread");
    }

    #[test]
    fn undersized_topology_is_rejected() {
        let err = TcpLinks::connect(0, 1, "127.0.0.1", 47399).expect_err("too few workers");
        assert!(matches!(err, TransportError::Protocol(_)));
    }
}
