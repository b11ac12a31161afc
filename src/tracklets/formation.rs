//! # Tracklet formation engine
//!
//! Pairs detections taken at different epochs into candidate tracklets under
//! a velocity bound. One spatial index is built per unique epoch (single
//! threaded, before any query runs); a fixed pool of worker threads then
//! statically partitions the ordered query list into contiguous,
//! approximately equal slices — the final worker absorbs the remainder — and
//! each worker accumulates private results before merging into the shared
//! [`IdSetStore`] under a mutex.
//!
//! Pairing is forward-only (a query at epoch E0 is only matched against
//! strictly later epochs), so the symmetric duplicate of each pair is never
//! produced. No ordering guarantee is made on the emitted sequence, but the
//! produced tracklet *set* is independent of the worker count.
//!
//! A worker failure aborts the whole run; there is no partial-result
//! recovery.

use std::sync::Mutex;
use std::thread;

use ahash::AHashMap;
use log::{debug, info};

use crate::constants::{DegPerDay, DEFAULT_LEAF_SIZE, MJD};
use crate::daylink_errors::DaylinkError;
use crate::detections::{Detection, DetectionCatalog};
use crate::output::IdSetStore;
use crate::sky::angular_distance_deg;
use crate::spatial_index::{IndexedPoint, KdTree};
use crate::tracklets::Tracklet;

/// Immutable parameter bundle for tracklet formation.
#[derive(Debug, Clone)]
pub struct FindTrackletsConfig {
    /// Maximum sky-plane rate in degrees per day.
    pub max_velocity: DegPerDay,
    /// Minimum sky-plane rate in degrees per day.
    pub min_velocity: DegPerDay,
    /// Maximum epoch separation of a pair, in days.
    pub max_dt: f64,
    /// Minimum epoch separation of a pair, in days.
    pub min_dt: f64,
    /// Leaf bucket size of the per-epoch spatial indexes.
    pub leaf_size: usize,
    /// Worker thread count; 0 selects the available parallelism.
    pub num_workers: usize,
}

impl Default for FindTrackletsConfig {
    fn default() -> Self {
        FindTrackletsConfig {
            max_velocity: 2.0,
            min_velocity: 0.0,
            max_dt: 0.0625,
            min_dt: 0.01,
            leaf_size: DEFAULT_LEAF_SIZE,
            num_workers: 0,
        }
    }
}

impl FindTrackletsConfig {
    /// Reject threshold combinations that cannot describe a valid search.
    pub fn validate(&self) -> Result<(), DaylinkError> {
        if self.min_velocity < 0. || self.max_velocity < self.min_velocity {
            return Err(DaylinkError::InvalidConfiguration(format!(
                "velocity bounds must satisfy 0 <= min <= max, got [{}, {}]",
                self.min_velocity, self.max_velocity
            )));
        }
        if self.min_dt <= 0. || self.max_dt < self.min_dt {
            return Err(DaylinkError::InvalidConfiguration(format!(
                "epoch separation bounds must satisfy 0 < min <= max, got [{}, {}]",
                self.min_dt, self.max_dt
            )));
        }
        Ok(())
    }
}

/// Group the catalog by exact epoch and build one immutable spatial index per
/// epoch, in ascending epoch order.
fn build_epoch_indexes(
    catalog: &DetectionCatalog,
    leaf_size: usize,
) -> Result<Vec<(MJD, KdTree)>, DaylinkError> {
    let mut slots: AHashMap<u64, usize> = AHashMap::new();
    let mut groups: Vec<(MJD, Vec<IndexedPoint>)> = Vec::new();
    for det in catalog.iter() {
        let slot = *slots.entry(det.epoch_mjd.to_bits()).or_insert_with(|| {
            groups.push((det.epoch_mjd, Vec::new()));
            groups.len() - 1
        });
        groups[slot]
            .1
            .push(IndexedPoint::new(det.ra, det.dec, det.id));
    }
    groups.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    groups
        .into_iter()
        .map(|(epoch, points)| KdTree::build(points, leaf_size).map(|tree| (epoch, tree)))
        .collect()
}

/// Run the pair search for one contiguous slice of the query list.
fn search_queries(
    queries: &[Detection],
    epoch_indexes: &[(MJD, KdTree)],
    config: &FindTrackletsConfig,
) -> Vec<Tracklet> {
    let mut local = Vec::new();
    for query in queries {
        for (epoch, index) in epoch_indexes {
            let dt = epoch - query.epoch_mjd;
            // forward-only: only strictly later epochs within the dt window
            if dt < config.min_dt || dt > config.max_dt {
                continue;
            }
            let max_distance = dt * config.max_velocity;
            let min_distance = dt * config.min_velocity;

            for candidate in index.range_search(query.ra, query.dec, max_distance, &[], &[]) {
                if candidate.value == query.id {
                    continue;
                }
                let distance = angular_distance_deg(
                    query.ra,
                    query.dec,
                    candidate.point[0],
                    candidate.point[1],
                );
                if distance >= min_distance && distance <= max_distance {
                    local.push(Tracklet::new_pair(query.id, candidate.value));
                }
            }
        }
    }
    local
}

/// Form tracklets over the whole catalog and emit them to the store.
///
/// Arguments
/// ---------
/// * `catalog`: the ingested detections; queries run in catalog order
/// * `config`: formation thresholds and worker count
/// * `store`: the output sink; purged before returning
///
/// Return
/// ------
/// * `Ok(())` once every produced tracklet reached the store. An empty
///   catalog is a valid input producing empty output.
pub fn find_tracklets(
    catalog: &DetectionCatalog,
    config: &FindTrackletsConfig,
    store: &mut IdSetStore,
) -> Result<(), DaylinkError> {
    config.validate()?;

    let epoch_indexes = build_epoch_indexes(catalog, config.leaf_size)?;
    let queries = catalog.as_slice();

    let num_workers = match config.num_workers {
        0 => thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        n => n,
    }
    .min(queries.len().max(1));

    let slice_len = queries.len() / num_workers;
    info!(
        "forming tracklets: {} queries over {} epochs, {} workers ({} queries each)",
        queries.len(),
        epoch_indexes.len(),
        num_workers,
        slice_len
    );

    let merge_point = Mutex::new(store);
    thread::scope(|scope| -> Result<(), DaylinkError> {
        let mut handles = Vec::with_capacity(num_workers);
        for rank in 0..num_workers {
            let start = rank * slice_len;
            let end = if rank == num_workers - 1 {
                queries.len()
            } else {
                start + slice_len
            };
            let epoch_indexes = &epoch_indexes;
            let merge_point = &merge_point;
            handles.push(scope.spawn(move || -> Result<(), DaylinkError> {
                let local = search_queries(&queries[start..end], epoch_indexes, config);
                debug!(
                    "worker {rank} finished queries {start}..{end}: {} tracklets",
                    local.len()
                );
                let mut store = merge_point
                    .lock()
                    .map_err(|_| DaylinkError::WorkerPanicked(rank))?;
                for tracklet in &local {
                    store.push(tracklet.detection_ids())?;
                }
                Ok(())
            }));
        }
        for (rank, handle) in handles.into_iter().enumerate() {
            handle
                .join()
                .map_err(|_| DaylinkError::WorkerPanicked(rank))??;
        }
        Ok(())
    })?;

    merge_point
        .into_inner()
        .map_err(|_| DaylinkError::WorkerPanicked(0))?
        .purge()
}
