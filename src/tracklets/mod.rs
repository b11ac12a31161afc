//! # Tracklets
//!
//! A [`Tracklet`] pairs detections taken at different epochs under the
//! hypothesis that they are the same moving object. At formation time a
//! tracklet holds exactly two detections, one per epoch; reloaded tracklets
//! may carry more. Member identities are kept sorted and unique.
//!
//! The best-fit sky-plane velocity is **derived** state, computed on demand
//! from the member detections; detections themselves are never mutated.

pub mod formation;

use smallvec::SmallVec;

use crate::constants::{DegPerDay, DetectionId, EPS, MJD};
use crate::daylink_errors::DaylinkError;
use crate::detections::DetectionCatalog;
use crate::sky::unwrap_degrees;

/// A hypothesized same-object pairing of detections across epochs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracklet {
    indices: SmallVec<[DetectionId; 2]>,
}

impl Tracklet {
    /// Form a tracklet from one query/candidate detection pair.
    pub fn new_pair(a: DetectionId, b: DetectionId) -> Self {
        debug_assert_ne!(a, b, "a tracklet never links a detection to itself");
        let indices = if a <= b {
            SmallVec::from_buf([a, b])
        } else {
            SmallVec::from_buf([b, a])
        };
        Tracklet { indices }
    }

    /// Rebuild a tracklet from a persisted id-set; ids are sorted and
    /// deduplicated.
    pub fn from_ids(mut ids: Vec<DetectionId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Tracklet {
            indices: SmallVec::from_vec(ids),
        }
    }

    /// Member detection identities, sorted ascending.
    pub fn detection_ids(&self) -> &[DetectionId] {
        &self.indices
    }

    /// Epoch of the earliest member detection.
    pub fn first_epoch(&self, catalog: &DetectionCatalog) -> Result<MJD, DaylinkError> {
        self.epoch_bound(catalog, f64::min)
    }

    /// Epoch of the latest member detection.
    pub fn last_epoch(&self, catalog: &DetectionCatalog) -> Result<MJD, DaylinkError> {
        self.epoch_bound(catalog, f64::max)
    }

    fn epoch_bound(
        &self,
        catalog: &DetectionCatalog,
        pick: fn(f64, f64) -> f64,
    ) -> Result<MJD, DaylinkError> {
        let mut bound: Option<MJD> = None;
        for &id in &self.indices {
            let epoch = catalog.get(id)?.epoch_mjd;
            bound = Some(match bound {
                Some(current) => pick(current, epoch),
                None => epoch,
            });
        }
        bound.ok_or_else(|| DaylinkError::InvalidConfiguration("empty tracklet".into()))
    }

    /// Best-fit linear sky-plane velocity of the member detections, in
    /// degrees per day along RA and Dec.
    ///
    /// The RA series is unwrapped across the 0°/360° seam before fitting.
    ///
    /// Arguments
    /// ---------
    /// * `catalog`: the detection catalog the member ids refer to
    ///
    /// Return
    /// ------
    /// * `(ra_velocity, dec_velocity)`, or a `DegenerateFit` error when the
    ///   member epochs do not span a non-zero baseline
    pub fn best_fit_velocity(
        &self,
        catalog: &DetectionCatalog,
    ) -> Result<(DegPerDay, DegPerDay), DaylinkError> {
        let mut members: Vec<_> = self
            .indices
            .iter()
            .map(|&id| catalog.get(id))
            .collect::<Result<_, _>>()?;
        members.sort_by(|a, b| {
            a.epoch_mjd
                .partial_cmp(&b.epoch_mjd)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let times: Vec<f64> = members.iter().map(|d| d.epoch_mjd).collect();
        let mut ras: Vec<f64> = members.iter().map(|d| d.ra).collect();
        let decs: Vec<f64> = members.iter().map(|d| d.dec).collect();
        unwrap_degrees(&mut ras);

        Ok((
            linear_slope(&times, &ras)?,
            linear_slope(&times, &decs)?,
        ))
    }
}

/// Least-squares slope of `values` against `times`.
fn linear_slope(times: &[f64], values: &[f64]) -> Result<f64, DaylinkError> {
    let n = times.len() as f64;
    if times.len() < 2 {
        return Err(DaylinkError::DegenerateFit(
            "velocity fit needs at least two detections".into(),
        ));
    }
    let t_mean = times.iter().sum::<f64>() / n;
    let v_mean = values.iter().sum::<f64>() / n;
    let mut cov = 0.;
    let mut var = 0.;
    for (t, v) in times.iter().zip(values) {
        cov += (t - t_mean) * (v - v_mean);
        var += (t - t_mean).powi(2);
    }
    if var < EPS {
        return Err(DaylinkError::DegenerateFit(
            "velocity fit over a zero time baseline".into(),
        ));
    }
    Ok(cov / var)
}
