//! # Spherical sky geometry
//!
//! Shared angular helpers: canonical RA normalization, the haversine
//! great-circle separation, and RA series unwrapping across the 0°/360° seam.
//!
//! The great-circle distance is the reference metric everywhere in the crate;
//! the spatial index only prunes on bounding boxes and every caller re-checks
//! candidates with [`angular_distance_deg`].

use crate::constants::{Degree, RADEG};

/// Normalize an angle in degrees into the canonical [0, 360) range.
///
/// Arguments
/// ---------
/// * `angle`: an angle in degrees, possibly outside [0, 360)
///
/// Return
/// ------
/// * the equivalent angle in [0, 360)
pub fn normalize_degrees(angle: Degree) -> Degree {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can return 360.0 when angle is a tiny negative number
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Great-circle angular separation between two sky positions, in degrees.
///
/// Uses the haversine formulation, which stays well-conditioned for small
/// separations and is correct across the RA wrap and near the poles.
///
/// Arguments
/// ---------
/// * `ra0`, `dec0`: first position in degrees
/// * `ra1`, `dec1`: second position in degrees
///
/// Return
/// ------
/// * the angular separation in degrees
pub fn angular_distance_deg(ra0: Degree, dec0: Degree, ra1: Degree, dec1: Degree) -> Degree {
    let d_ra = (ra1 - ra0) * RADEG;
    let d_dec = (dec1 - dec0) * RADEG;
    let dec0 = dec0 * RADEG;
    let dec1 = dec1 * RADEG;

    let a = (d_dec / 2.).sin().powi(2) + dec0.cos() * dec1.cos() * (d_ra / 2.).sin().powi(2);
    2. * a.sqrt().clamp(-1., 1.).asin() / RADEG
}

/// Shortest signed difference `b - a` between two angles, in degrees.
///
/// Return
/// ------
/// * a value in (-180, 180]
pub fn shortest_delta_deg(a: Degree, b: Degree) -> Degree {
    let mut delta = (b - a).rem_euclid(360.0);
    if delta > 180.0 {
        delta -= 360.0;
    }
    delta
}

/// Make an angle series continuous by unwrapping each value to within
/// ±180° of its predecessor.
///
/// A right ascension series crossing the 0°/360° seam cannot be fed to a
/// polynomial fit directly; this produces an equivalent continuous series
/// (values may leave [0, 360)).
///
/// Arguments
/// ---------
/// * `series`: angles in degrees, mutated in place
pub fn unwrap_degrees(series: &mut [Degree]) {
    for i in 1..series.len() {
        series[i] = series[i - 1] + shortest_delta_deg(series[i - 1], series[i]);
    }
}
