//! # Track linking engine
//!
//! Distributed combinatorial search over tracklets: every candidate endpoint
//! pair is screened against a bounded-acceleration motion model, then the
//! full tracklet universe is searched for supports confirming the fitted
//! trajectory between the endpoints.
//!
//! Per candidate pair `(first, last)`:
//!
//! 1. reject when the endpoint time separation is below
//!    `min_endpoint_time_separation` (or outside the optional start/end time
//!    windows);
//! 2. fit one least-squares quadratic per sky axis to the endpoints'
//!    detections;
//! 3. reject when a fitted |acceleration| exceeds the per-axis bound;
//! 4. collect support tracklets far enough in time from both endpoints whose
//!    detections all lie within `detection_location_error_thresh +
//!    quadratic_fit_error_thresh` of the model prediction;
//! 5. accept when enough supports and enough unique detections remain.
//!
//! The search space — the linearized endpoint-pair index grid — is
//! partitioned by a master into contiguous work units dispatched to numbered
//! workers over explicit message-passing channels (see
//! [`super::distributed`]). Inputs are broadcast once, read-only; the
//! resulting track set is independent of the worker count and dispatch
//! order.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::constants::{Degree, MJD};
use crate::daylink_errors::DaylinkError;
use crate::detections::DetectionCatalog;
use crate::output::IdSetStore;
use crate::sky::{angular_distance_deg, normalize_degrees, unwrap_degrees};
use crate::tracklets::Tracklet;
use crate::tracks::distributed::run_distributed_search;
use crate::tracks::quadratic::{fit_quadratic, QuadraticFit};
use crate::tracks::Track;

/// Immutable parameter bundle for track linking.
#[derive(Debug, Clone)]
pub struct LinkTrackletsConfig {
    /// Maximum |acceleration| along RA, in deg/day².
    pub max_ra_accel: f64,
    /// Maximum |acceleration| along Dec, in deg/day².
    pub max_dec_accel: f64,
    /// Upper bound on observational position error, in degrees.
    pub detection_location_error_thresh: Degree,
    /// Additional tolerance for quadratic-fit error, in degrees.
    pub quadratic_fit_error_thresh: Degree,
    /// Minimum time between the two endpoint tracklets, in days.
    pub min_endpoint_time_separation: f64,
    /// Minimum time between a support tracklet and either endpoint, in days.
    pub min_support_to_endpoint_time_separation: f64,
    /// Minimum number of support tracklets per track (endpoints excluded).
    pub min_support_tracklets: usize,
    /// Minimum number of unique detections per track.
    pub min_detections_per_track: usize,
    /// Only consider tracks whose first endpoint starts at or before this.
    pub latest_first_endpoint_time: Option<MJD>,
    /// Only consider tracks whose last endpoint starts at or after this.
    pub earliest_last_endpoint_time: Option<MJD>,
    /// Worker count; 0 selects the available parallelism.
    pub num_workers: usize,
    /// How long the master waits for each worker's completion report.
    /// `None` waits indefinitely; on expiry the run aborts with
    /// [`DaylinkError::WorkerStalled`].
    pub worker_timeout: Option<Duration>,
}

impl Default for LinkTrackletsConfig {
    fn default() -> Self {
        LinkTrackletsConfig {
            max_ra_accel: 0.02,
            max_dec_accel: 0.02,
            detection_location_error_thresh: 0.002,
            quadratic_fit_error_thresh: 0.,
            min_endpoint_time_separation: 2.,
            min_support_to_endpoint_time_separation: 0.5,
            min_support_tracklets: 1,
            min_detections_per_track: 6,
            latest_first_endpoint_time: None,
            earliest_last_endpoint_time: None,
            num_workers: 0,
            worker_timeout: Some(Duration::from_secs(3600)),
        }
    }
}

impl LinkTrackletsConfig {
    /// Reject threshold combinations that cannot describe a valid search.
    pub fn validate(&self) -> Result<(), DaylinkError> {
        if self.max_ra_accel < 0. || self.max_dec_accel < 0. {
            return Err(DaylinkError::InvalidConfiguration(
                "acceleration bounds must be non-negative".into(),
            ));
        }
        if self.detection_location_error_thresh < 0. || self.quadratic_fit_error_thresh < 0. {
            return Err(DaylinkError::InvalidConfiguration(
                "error thresholds must be non-negative".into(),
            ));
        }
        if self.min_detections_per_track < 4 {
            return Err(DaylinkError::InvalidConfiguration(
                "a track needs at least the 4 endpoint detections".into(),
            ));
        }
        Ok(())
    }
}

/// Precomputed time bounds of one tracklet, so pair screening never touches
/// the catalog.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TrackletWindow {
    pub first_epoch: MJD,
    pub last_epoch: MJD,
}

pub(crate) fn tracklet_windows(
    tracklets: &[Tracklet],
    catalog: &DetectionCatalog,
) -> Result<Vec<TrackletWindow>, DaylinkError> {
    tracklets
        .iter()
        .map(|t| {
            Ok(TrackletWindow {
                first_epoch: t.first_epoch(catalog)?,
                last_epoch: t.last_epoch(catalog)?,
            })
        })
        .collect()
}

/// Fitted per-axis motion of a candidate endpoint pair.
struct EndpointModel {
    ra: QuadraticFit,
    dec: QuadraticFit,
}

impl EndpointModel {
    /// Great-circle residual between the model prediction and an observed
    /// position at epoch `t`.
    fn residual(&self, t: MJD, ra: Degree, dec: Degree) -> Degree {
        let predicted_ra = normalize_degrees(self.ra.predict(t));
        let predicted_dec = self.dec.predict(t);
        angular_distance_deg(predicted_ra, predicted_dec, ra, dec)
    }
}

/// Fit both axes to the endpoints' detections, time-sorted, RA unwrapped.
fn fit_endpoints(
    catalog: &DetectionCatalog,
    first: &Tracklet,
    last: &Tracklet,
) -> Result<EndpointModel, DaylinkError> {
    let mut members = Vec::with_capacity(4);
    for &id in first.detection_ids().iter().chain(last.detection_ids()) {
        members.push(catalog.get(id)?);
    }
    members.sort_by(|a, b| {
        a.epoch_mjd
            .partial_cmp(&b.epoch_mjd)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let times: Vec<MJD> = members.iter().map(|d| d.epoch_mjd).collect();
    let mut ras: Vec<f64> = members.iter().map(|d| d.ra).collect();
    let decs: Vec<f64> = members.iter().map(|d| d.dec).collect();
    unwrap_degrees(&mut ras);

    Ok(EndpointModel {
        ra: fit_quadratic(&times, &ras)?,
        dec: fit_quadratic(&times, &decs)?,
    })
}

/// Evaluate one candidate endpoint pair (steps 1–5 above).
///
/// Return
/// ------
/// * `Ok(Some(track))` when the pair anchors a valid track, `Ok(None)` when
///   it is rejected. A degenerate endpoint fit (shared or duplicate epochs)
///   rejects the pair; it is not a run failure.
pub(crate) fn evaluate_endpoint_pair(
    catalog: &DetectionCatalog,
    tracklets: &[Tracklet],
    windows: &[TrackletWindow],
    first: usize,
    last: usize,
    config: &LinkTrackletsConfig,
) -> Result<Option<Track>, DaylinkError> {
    let first_start = windows[first].first_epoch;
    let last_start = windows[last].first_epoch;

    if last_start - first_start < config.min_endpoint_time_separation
        || last_start <= first_start
    {
        return Ok(None);
    }
    // the whole first endpoint must precede the whole last endpoint
    if windows[first].last_epoch >= last_start {
        return Ok(None);
    }
    if let Some(latest) = config.latest_first_endpoint_time {
        if first_start > latest {
            return Ok(None);
        }
    }
    if let Some(earliest) = config.earliest_last_endpoint_time {
        if last_start < earliest {
            return Ok(None);
        }
    }

    let model = match fit_endpoints(catalog, &tracklets[first], &tracklets[last]) {
        Ok(model) => model,
        Err(DaylinkError::DegenerateFit(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    if model.ra.acceleration.abs() > config.max_ra_accel
        || model.dec.acceleration.abs() > config.max_dec_accel
    {
        return Ok(None);
    }

    let residual_thresh =
        config.detection_location_error_thresh + config.quadratic_fit_error_thresh;

    let mut support = Vec::new();
    let mut detection_ids: BTreeSet<_> = tracklets[first]
        .detection_ids()
        .iter()
        .chain(tracklets[last].detection_ids())
        .copied()
        .collect();

    for (k, tracklet) in tracklets.iter().enumerate() {
        if k == first || k == last {
            continue;
        }
        let t_k = windows[k].first_epoch;
        if (t_k - first_start).abs() < config.min_support_to_endpoint_time_separation
            || (last_start - t_k).abs() < config.min_support_to_endpoint_time_separation
        {
            continue;
        }

        let mut all_within = true;
        for &id in tracklet.detection_ids() {
            let det = catalog.get(id)?;
            if model.residual(det.epoch_mjd, det.ra, det.dec) > residual_thresh {
                all_within = false;
                break;
            }
        }
        if all_within {
            support.push(k);
            detection_ids.extend(tracklet.detection_ids().iter().copied());
        }
    }

    if support.len() < config.min_support_tracklets
        || detection_ids.len() < config.min_detections_per_track
    {
        return Ok(None);
    }

    Ok(Some(Track::new(
        first,
        last,
        support,
        detection_ids.into_iter().collect(),
    )))
}

/// Link tracklets into tracks and emit them to the store.
///
/// Inputs are shared with the workers as `Arc`s: broadcast once at startup,
/// read-only for the whole run. The master blocks until every worker reports
/// (bounded by `config.worker_timeout`), then merges, orders and
/// deduplicates the union of per-worker results before emitting — so both
/// the track set and the persisted bytes are independent of the worker
/// count.
///
/// Arguments
/// ---------
/// * `catalog`: all detections the tracklets refer to
/// * `tracklets`: the tracklet universe to search
/// * `config`: linking thresholds, worker count and timeout policy
/// * `store`: the output sink; purged before returning
///
/// Return
/// ------
/// * `Ok(())` on completion. Zero tracklets or zero valid endpoint pairs is
///   a valid outcome producing empty output, not an error.
pub fn link_tracklets(
    catalog: &Arc<DetectionCatalog>,
    tracklets: &Arc<Vec<Tracklet>>,
    config: &LinkTrackletsConfig,
    store: &mut IdSetStore,
) -> Result<(), DaylinkError> {
    config.validate()?;

    if tracklets.is_empty() {
        info!("no tracklets to link; emitting empty output");
        return store.purge();
    }

    let windows = Arc::new(tracklet_windows(tracklets, catalog)?);
    let tracks = run_distributed_search(catalog, tracklets, &windows, config)?;

    info!("linking found {} tracks", tracks.len());
    for track in &tracks {
        debug!(
            "track {:?} ({} supports)",
            track.detection_ids(),
            track.support_count()
        );
        store.push(track.detection_ids())?;
    }
    store.purge()
}
