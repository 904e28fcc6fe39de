//! Per-rank driver: the tick loop that glues the CA engine to the
//! transport, plus the thread fan-out for in-process runs.
//!
//! Per tick, in order: receive the inbound batch from the left neighbor
//! (skipped on the head), reconstruct its vehicles, run the CA schedule,
//! drain the staged exits, send them right (the tail drops them: that is
//! where vehicles leave the road), advance the clock. After the last tick
//! every rank meets at the barrier and the statistics gather runs.

use std::thread;
use std::time::Instant;

use bevy_ecs::prelude::World;

use sim_core::ecs::SegmentExit;
use sim_core::road::Road;
use sim_core::runner::{
    drain_outbox, inject_arrivals, run_tick, segment_schedule, InjectError,
};
use sim_core::scenario::build_segment;
use sim_core::telemetry::{SegmentLedger, TravelTimeStats};
use sim_pipeline_core::partition::{
    compute_segment_plan, validate_against_speed, ValidationError,
};
use sim_pipeline_core::stats::{combine_stats, GlobalStats};
use sim_pipeline_core::wire::{run_fingerprint, HandoffRecord, StatRecord};

use crate::config::SimulationConfig;
use crate::report::RunReport;
use crate::transport::channel::build_links;
use crate::transport::{TransportError, WorkerLinks};

#[derive(Debug)]
pub enum WorkerError {
    Partition(ValidationError),
    Transport(TransportError),
    Inject(InjectError),
    /// A worker thread died; the whole run halts.
    WorkerFailed(String),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::Partition(error) => write!(f, "partitioning failed: {error}"),
            WorkerError::Transport(error) => write!(f, "transport failed: {error}"),
            WorkerError::Inject(error) => write!(f, "handoff reconstruction failed: {error}"),
            WorkerError::WorkerFailed(message) => write!(f, "worker failed: {message}"),
        }
    }
}

impl std::error::Error for WorkerError {}

impl From<ValidationError> for WorkerError {
    fn from(error: ValidationError) -> Self {
        WorkerError::Partition(error)
    }
}

impl From<TransportError> for WorkerError {
    fn from(error: TransportError) -> Self {
        WorkerError::Transport(error)
    }
}

impl From<InjectError> for WorkerError {
    fn from(error: InjectError) -> Self {
        WorkerError::Inject(error)
    }
}

/// What one rank knows when its loop finishes.
#[derive(Debug, Clone)]
pub struct WorkerSummary {
    pub rank: usize,
    pub ledger: SegmentLedger,
    pub local_stats: StatRecord,
    /// Vehicles still on the segment at the end of the run.
    pub in_flight: u64,
    /// Pooled statistics; `Some` on the head only.
    pub combined: Option<GlobalStats>,
}

fn to_handoff_record(exit: &SegmentExit) -> HandoffRecord {
    HandoffRecord {
        lane: exit.lane_number as i32,
        id: exit.id as i32,
        position: exit.entry_position as i32,
        speed: exit.speed as i32,
        ticks_on_segment: exit.ticks_on_segment as i32,
    }
}

fn to_segment_exit(record: &HandoffRecord) -> SegmentExit {
    SegmentExit {
        lane_number: record.lane as u32,
        id: record.id as u32,
        entry_position: record.position as u32,
        speed: record.speed as u32,
        ticks_on_segment: record.ticks_on_segment as u32,
    }
}

/// Run one rank's full simulation loop over its links.
pub fn run_worker<L: WorkerLinks>(
    links: &mut L,
    config: &SimulationConfig,
) -> Result<WorkerSummary, WorkerError> {
    run_worker_with_hook(links, config, |_| {})
}

/// Like [`run_worker`], invoking `hook` with the tick index after each
/// completed tick (progress reporting on the head).
pub fn run_worker_with_hook<L, F>(
    links: &mut L,
    config: &SimulationConfig,
    mut hook: F,
) -> Result<WorkerSummary, WorkerError>
where
    L: WorkerLinks,
    F: FnMut(u64),
{
    let rank = links.rank();
    let world_size = links.world_size();
    let plan = compute_segment_plan(config.road_length, world_size)?;
    validate_against_speed(&plan, config.max_speed)?;

    let mut world = World::new();
    build_segment(&mut world, &config.segment_params(&plan[rank], world_size));
    let mut schedule = segment_schedule();

    let is_head = rank == 0;
    let is_tail = rank + 1 == world_size;

    for tick in 0..config.max_ticks {
        if !is_head {
            let inbound = links.recv_inbound()?;
            let arrivals: Vec<SegmentExit> = inbound.iter().map(to_segment_exit).collect();
            inject_arrivals(&mut world, &arrivals)?;
        }

        run_tick(&mut world, &mut schedule);

        let exits = drain_outbox(&mut world);
        if !is_tail {
            let batch: Vec<HandoffRecord> = exits.iter().map(to_handoff_record).collect();
            links.send_outbound(&batch)?;
        }

        hook(tick);
    }

    links.barrier()?;

    let stats = *world.resource::<TravelTimeStats>();
    let local_stats = StatRecord {
        mean: stats.mean(),
        variance: stats.variance(),
        count: stats.count() as f64,
    };
    let combined = links
        .gather_stats(local_stats)?
        .as_deref()
        .and_then(combine_stats);

    Ok(WorkerSummary {
        rank,
        ledger: *world.resource::<SegmentLedger>(),
        local_stats,
        in_flight: world.resource::<Road>().vehicle_count() as u64,
        combined,
    })
}

/// Outcome of an in-process run: the head's report plus every rank's
/// summary in rank order.
#[derive(Debug)]
pub struct LocalRunOutcome {
    pub report: RunReport,
    pub summaries: Vec<WorkerSummary>,
}

/// Run the whole pipeline as threads joined by in-process channels.
///
/// `on_tick` is invoked from the head worker's thread after each tick; it
/// drives the progress bar in the CLI.
pub fn run_local<F>(
    config: &SimulationConfig,
    world_size: usize,
    on_tick: F,
) -> Result<LocalRunOutcome, WorkerError>
where
    F: FnMut(u64) + Send + 'static,
{
    // Surface topology errors before any thread starts.
    let plan = compute_segment_plan(config.road_length, world_size)?;
    validate_against_speed(&plan, config.max_speed)?;

    let started = Instant::now();
    let mut handles = Vec::new();
    let mut on_tick = Some(on_tick);
    for mut links in build_links(world_size) {
        let config = config.clone();
        let hook = (links.rank() == 0).then(|| on_tick.take().expect("head hook taken once"));
        handles.push(thread::spawn(move || match hook {
            Some(hook) => run_worker_with_hook(&mut links, &config, hook),
            None => run_worker(&mut links, &config),
        }));
    }

    let mut summaries = Vec::with_capacity(world_size);
    for handle in handles {
        let summary = handle
            .join()
            .map_err(|_| WorkerError::WorkerFailed("worker thread panicked".into()))??;
        summaries.push(summary);
    }
    summaries.sort_by_key(|summary| summary.rank);

    let combined = summaries[0].combined;
    let report = RunReport {
        fingerprint: run_fingerprint(&config.canonical_json()),
        elapsed_secs: started.elapsed().as_secs_f64(),
        ticks: config.max_ticks,
        combined,
    };
    Ok(LocalRunOutcome { report, summaries })
}
