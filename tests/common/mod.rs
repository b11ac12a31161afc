use std::collections::BTreeSet;

use daylink::output::IdSet;
use daylink::{Detection, DetectionCatalog, DetectionId};

/// Detection with neutral photometry, epoch offsets expressed in days from
/// MJD 53735.
pub fn detection(id: DetectionId, ra: f64, dec: f64, day: f64) -> Detection {
    Detection::new(id, id, -1, ra, dec, 53735.0 + day, 20.0, 10.0)
}

pub fn catalog(detections: Vec<Detection>) -> DetectionCatalog {
    DetectionCatalog::from_vec(detections).unwrap()
}

/// Collapse emitted records into a comparable set of id-sets.
pub fn as_id_set(records: Vec<IdSet>) -> BTreeSet<Vec<DetectionId>> {
    records.into_iter().map(|ids| ids.to_vec()).collect()
}

/// Detections along a constant-acceleration trajectory, one per epoch offset.
///
/// Positions follow `p(dt) = p0 + v*dt + 0.5*a*dt^2` per axis, with `dt` in
/// days from the first epoch.
#[allow(clippy::too_many_arguments)]
pub fn quadratic_trajectory(
    first_id: DetectionId,
    days: &[f64],
    ra0: f64,
    dec0: f64,
    v_ra: f64,
    v_dec: f64,
    a_ra: f64,
    a_dec: f64,
) -> Vec<Detection> {
    days.iter()
        .enumerate()
        .map(|(k, &dt)| {
            detection(
                first_id + k as DetectionId,
                ra0 + v_ra * dt + 0.5 * a_ra * dt * dt,
                dec0 + v_dec * dt + 0.5 * a_dec * dt * dt,
                dt,
            )
        })
        .collect()
}
