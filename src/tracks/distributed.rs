//! # Master/worker distribution of the endpoint-pair search
//!
//! The master linearizes the endpoint-pair grid (`pair = first * n + last`)
//! and partitions it into contiguous work units, one per numbered worker.
//! Workers never share mutable state: the detection catalog, tracklet list,
//! precomputed time windows and configuration are broadcast once as `Arc`s,
//! read-only for the whole run, and all coordination is explicit message
//! passing — a command channel per worker for dispatch and shutdown, one
//! shared channel for completion reports.
//!
//! A worker cycles Idle → Running → Searching → Reporting → Idle until the
//! shutdown command, accumulating tracks privately per work unit. The master
//! blocks until every worker has reported, bounded by the configured
//! timeout: a missing report past the deadline aborts the run with
//! [`DaylinkError::WorkerStalled`] instead of waiting forever. The merged
//! result is sorted and deduplicated by detection-id set, so it does not
//! depend on the worker count or dispatch order.

use std::ops::Range;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use log::{debug, info};

use crate::daylink_errors::DaylinkError;
use crate::detections::DetectionCatalog;
use crate::tracklets::Tracklet;
use crate::tracks::linking::{evaluate_endpoint_pair, LinkTrackletsConfig, TrackletWindow};
use crate::tracks::Track;

/// Message from the master to one worker.
enum WorkerCommand {
    /// Search a contiguous range of linearized endpoint-pair indices.
    Search(Range<usize>),
    /// Terminate after the current report.
    Shutdown,
}

/// Completion report from one worker back to the master.
struct WorkerReport {
    rank: usize,
    outcome: Result<Vec<Track>, DaylinkError>,
}

/// Immutable inputs broadcast to every worker at startup.
#[derive(Clone)]
struct SearchContext {
    catalog: Arc<DetectionCatalog>,
    tracklets: Arc<Vec<Tracklet>>,
    windows: Arc<Vec<TrackletWindow>>,
    config: Arc<LinkTrackletsConfig>,
}

/// Execute search steps 1–5 over one work unit.
fn search_pair_range(
    ctx: &SearchContext,
    pairs: Range<usize>,
) -> Result<Vec<Track>, DaylinkError> {
    let n = ctx.tracklets.len();
    let mut tracks = Vec::new();
    for pair in pairs {
        let first = pair / n;
        let last = pair % n;
        if first == last {
            continue;
        }
        if let Some(track) = evaluate_endpoint_pair(
            &ctx.catalog,
            &ctx.tracklets,
            &ctx.windows,
            first,
            last,
            &ctx.config,
        )? {
            tracks.push(track);
        }
    }
    Ok(tracks)
}

fn worker_loop(
    rank: usize,
    ctx: SearchContext,
    commands: mpsc::Receiver<WorkerCommand>,
    reports: mpsc::Sender<WorkerReport>,
) {
    // Idle: block on the next command.
    while let Ok(command) = commands.recv() {
        match command {
            WorkerCommand::Search(pairs) => {
                // Running → Searching
                debug!("worker {rank} searching pairs {pairs:?}");
                let outcome = search_pair_range(&ctx, pairs);
                // Reporting → Idle; a closed report channel means the master
                // already gave up on this run.
                if reports.send(WorkerReport { rank, outcome }).is_err() {
                    return;
                }
            }
            WorkerCommand::Shutdown => return, // Terminated
        }
    }
}

/// Partition the pair space, dispatch to workers, await every report and
/// merge.
pub(crate) fn run_distributed_search(
    catalog: &Arc<DetectionCatalog>,
    tracklets: &Arc<Vec<Tracklet>>,
    windows: &Arc<Vec<TrackletWindow>>,
    config: &LinkTrackletsConfig,
) -> Result<Vec<Track>, DaylinkError> {
    let pair_count = tracklets.len() * tracklets.len();
    let num_workers = match config.num_workers {
        0 => thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        n => n,
    }
    .min(pair_count.max(1));

    let ctx = SearchContext {
        catalog: Arc::clone(catalog),
        tracklets: Arc::clone(tracklets),
        windows: Arc::clone(windows),
        config: Arc::new(config.clone()),
    };

    let unit_len = pair_count / num_workers;
    info!(
        "linking {} tracklets: {pair_count} candidate pairs over {num_workers} workers",
        tracklets.len()
    );

    let (report_tx, report_rx) = mpsc::channel();
    let mut command_txs = Vec::with_capacity(num_workers);
    for rank in 0..num_workers {
        let (command_tx, command_rx) = mpsc::channel();
        let ctx = ctx.clone();
        let report_tx = report_tx.clone();
        thread::spawn(move || worker_loop(rank, ctx, command_rx, report_tx));
        command_txs.push(command_tx);
    }
    drop(report_tx);

    // Dispatch one contiguous work unit per worker; the final worker absorbs
    // the remainder of the pair space.
    for (rank, command_tx) in command_txs.iter().enumerate() {
        let start = rank * unit_len;
        let end = if rank == num_workers - 1 {
            pair_count
        } else {
            start + unit_len
        };
        command_tx
            .send(WorkerCommand::Search(start..end))
            .map_err(|_| DaylinkError::WorkerPanicked(rank))?;
    }

    // Completion barrier: wait for exactly one report per worker.
    let mut reported = vec![false; num_workers];
    let mut tracks = Vec::new();
    for _ in 0..num_workers {
        let report = match config.worker_timeout {
            Some(timeout) => report_rx.recv_timeout(timeout).map_err(|_| {
                let rank = reported.iter().position(|done| !done).unwrap_or(0);
                DaylinkError::WorkerStalled { rank, timeout }
            })?,
            None => {
                // Explicit choice to wait without bound; a dead worker then
                // surfaces as a closed channel rather than a silent hang.
                let rank = reported.iter().position(|done| !done).unwrap_or(0);
                report_rx
                    .recv()
                    .map_err(|_| DaylinkError::WorkerPanicked(rank))?
            }
        };
        reported[report.rank] = true;
        tracks.extend(report.outcome?);
    }

    for command_tx in &command_txs {
        // A worker that already exited is fine; shutdown is best-effort.
        let _ = command_tx.send(WorkerCommand::Shutdown);
    }

    // Canonical order + dedup by detection-id set: identical output whatever
    // the partitioning.
    tracks.sort_by(|a, b| {
        a.detection_ids()
            .cmp(b.detection_ids())
            .then(a.first_endpoint.cmp(&b.first_endpoint))
            .then(a.last_endpoint.cmp(&b.last_endpoint))
    });
    tracks.dedup_by(|a, b| a.detection_ids() == b.detection_ids());
    Ok(tracks)
}
