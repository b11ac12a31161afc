//! # Detection records and catalog
//!
//! A [`Detection`] is one entry of the input time-series catalog: a sky
//! position at an epoch, with photometric attributes and an optional
//! ground-truth object label used only for validation.
//!
//! Detections are read-only after ingestion. The catalog text format is one
//! record per line, 8 whitespace-separated fields:
//!
//! ```text
//! ID imageID ssmId RA Dec MJD mag SNR
//! ```
//!
//! A record that does not parse all 8 fields is a hard error; there is no
//! partial recovery.
//!
//! The topocentric correction is delegated to an opaque astrometry
//! collaborator behind the [`TopocentricModel`] trait, given an immutable
//! [`Observatory`] location threaded through the call (never process-wide
//! mutable state). The correction is computed lazily, once per detection.

use std::collections::HashMap;
use std::str::FromStr;

use ahash::RandomState;
use camino::Utf8Path;
use once_cell::sync::OnceCell;

use crate::constants::{Degree, DetectionId, MJD};
use crate::daylink_errors::DaylinkError;
use crate::sky::normalize_degrees;

/// Immutable observing-site coordinates, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observatory {
    pub latitude: Degree,
    pub longitude: Degree,
}

/// Opaque topocentric astrometric correction collaborator.
///
/// Given the observatory coordinates, the epoch and the apparent position,
/// returns a right-ascension correction in degrees. Implementations wrap a
/// specialized astrometry routine; the crate only carries the interface.
pub trait TopocentricModel {
    fn topo_correction(
        &self,
        observatory_lat: Degree,
        observatory_long: Degree,
        epoch: MJD,
        ra: Degree,
        dec: Degree,
    ) -> Degree;
}

/// One catalog detection. Position angles are stored normalized: RA in
/// [0, 360), Dec in [-90, 90].
#[derive(Debug, Clone)]
pub struct Detection {
    pub id: DetectionId,
    pub image_id: i64,
    /// Ground-truth object label, used only for test validation (-1 = none).
    pub ssm_id: i64,
    pub ra: Degree,
    pub dec: Degree,
    pub ra_err: Degree,
    pub dec_err: Degree,
    pub epoch_mjd: MJD,
    pub mag: f64,
    pub snr: f64,
    ra_topo_corr: OnceCell<Degree>,
}

impl Detection {
    /// Create a new detection. The position is required: there is no "unset"
    /// state that could be mistaken for a valid coordinate.
    ///
    /// Arguments
    /// ---------
    /// * `id`: detection identity
    /// * `image_id`: exposure identity
    /// * `ssm_id`: ground-truth object label (-1 when unknown)
    /// * `ra`, `dec`: sky position in degrees (RA normalized to [0, 360))
    /// * `epoch_mjd`: observation epoch
    /// * `mag`, `snr`: brightness attributes
    ///
    /// Return
    /// ------
    /// * a new Detection with zero position uncertainties
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: DetectionId,
        image_id: i64,
        ssm_id: i64,
        ra: Degree,
        dec: Degree,
        epoch_mjd: MJD,
        mag: f64,
        snr: f64,
    ) -> Self {
        Detection {
            id,
            image_id,
            ssm_id,
            ra: normalize_degrees(ra),
            dec,
            ra_err: 0.,
            dec_err: 0.,
            epoch_mjd,
            mag,
            snr,
            ra_topo_corr: OnceCell::new(),
        }
    }

    /// Topocentric RA correction in degrees, computed on first use and cached.
    ///
    /// Arguments
    /// ---------
    /// * `model`: the astrometry collaborator
    /// * `observatory`: the observing-site coordinates
    ///
    /// Return
    /// ------
    /// * the correction in degrees
    pub fn ra_topo_corr(&self, model: &impl TopocentricModel, observatory: &Observatory) -> Degree {
        *self.ra_topo_corr.get_or_init(|| {
            model.topo_correction(
                observatory.latitude,
                observatory.longitude,
                self.epoch_mjd,
                self.ra,
                self.dec,
            )
        })
    }
}

impl FromStr for Detection {
    type Err = DaylinkError;

    /// Parse one 8-field whitespace-separated catalog record.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        fn field<T: FromStr>(
            fields: &mut std::str::SplitWhitespace<'_>,
            name: &str,
            line: &str,
        ) -> Result<T, DaylinkError> {
            fields
                .next()
                .ok_or_else(|| {
                    DaylinkError::DetectionParseError(format!("missing field {name}: {line:?}"))
                })?
                .parse()
                .map_err(|_| {
                    DaylinkError::DetectionParseError(format!("bad field {name}: {line:?}"))
                })
        }

        let mut fields = line.split_whitespace();
        let detection = Detection::new(
            field(&mut fields, "ID", line)?,
            field(&mut fields, "imageID", line)?,
            field(&mut fields, "ssmId", line)?,
            field(&mut fields, "RA", line)?,
            field(&mut fields, "Dec", line)?,
            field(&mut fields, "MJD", line)?,
            field(&mut fields, "mag", line)?,
            field(&mut fields, "SNR", line)?,
        );
        Ok(detection)
    }
}

/// Owned detection catalog with id-based lookup.
///
/// The vector order is the ingestion order; a hash map resolves detection
/// identities (which need not be contiguous) to slots.
#[derive(Debug, Clone, Default)]
pub struct DetectionCatalog {
    detections: Vec<Detection>,
    by_id: HashMap<DetectionId, usize, RandomState>,
}

impl DetectionCatalog {
    /// Build a catalog from already-parsed detections.
    ///
    /// Arguments
    /// ---------
    /// * `detections`: the ingested records, in input order
    ///
    /// Return
    /// ------
    /// * an error if two records share an identity
    pub fn from_vec(detections: Vec<Detection>) -> Result<Self, DaylinkError> {
        let mut by_id = HashMap::with_capacity_and_hasher(detections.len(), RandomState::new());
        for (slot, det) in detections.iter().enumerate() {
            if by_id.insert(det.id, slot).is_some() {
                return Err(DaylinkError::DetectionParseError(format!(
                    "duplicate detection id {}",
                    det.id
                )));
            }
        }
        Ok(DetectionCatalog { detections, by_id })
    }

    /// Read a whitespace-separated detection file into a catalog.
    ///
    /// Arguments
    /// ---------
    /// * `path`: the catalog file, one 8-field record per line
    ///
    /// Return
    /// ------
    /// * the catalog, or the first IO/parse error encountered
    pub fn read_from_file(path: &Utf8Path) -> Result<Self, DaylinkError> {
        let content = std::fs::read_to_string(path)?;
        let detections = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Detection::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_vec(detections)
    }

    /// Look up a detection by identity.
    pub fn get(&self, id: DetectionId) -> Result<&Detection, DaylinkError> {
        self.by_id
            .get(&id)
            .map(|&slot| &self.detections[slot])
            .ok_or(DaylinkError::DetectionNotFound(id))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

#[cfg(test)]
mod detection_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_record() {
        let det: Detection = "42 1001 7 359.95 -12.5 53735.0 21.3 5.5".parse().unwrap();
        assert_eq!(det.id, 42);
        assert_eq!(det.image_id, 1001);
        assert_eq!(det.ssm_id, 7);
        assert_relative_eq!(det.ra, 359.95);
        assert_relative_eq!(det.dec, -12.5);
        assert_relative_eq!(det.epoch_mjd, 53735.0);
        assert_relative_eq!(det.mag, 21.3);
        assert_relative_eq!(det.snr, 5.5);
    }

    #[test]
    fn test_parse_normalizes_ra() {
        let det: Detection = "0 0 -1 -0.25 10.0 53735.0 20.0 8.0".parse().unwrap();
        assert_relative_eq!(det.ra, 359.75);
    }

    #[test]
    fn test_parse_rejects_short_record() {
        let err = "42 1001 7 359.95 -12.5 53735.0 21.3".parse::<Detection>();
        assert!(matches!(err, Err(DaylinkError::DetectionParseError(_))));
    }

    #[test]
    fn test_parse_rejects_bad_field() {
        let err = "42 1001 7 not-an-angle -12.5 53735.0 21.3 5.5".parse::<Detection>();
        assert!(matches!(err, Err(DaylinkError::DetectionParseError(_))));
    }

    #[test]
    fn test_catalog_rejects_duplicate_ids() {
        let dets = vec![
            Detection::new(1, 0, -1, 10., 0., 53735., 20., 5.),
            Detection::new(1, 0, -1, 11., 0., 53736., 20., 5.),
        ];
        assert!(DetectionCatalog::from_vec(dets).is_err());
    }

    struct FixedCorrection(f64);

    impl TopocentricModel for FixedCorrection {
        fn topo_correction(&self, _: f64, _: f64, _: MJD, _: f64, _: f64) -> Degree {
            self.0
        }
    }

    #[test]
    fn test_topo_corr_is_cached() {
        let det = Detection::new(1, 0, -1, 10., 0., 53735., 20., 5.);
        let site = Observatory {
            latitude: -30.24,
            longitude: -70.74,
        };
        assert_relative_eq!(det.ra_topo_corr(&FixedCorrection(0.01), &site), 0.01);
        // cached value wins over a different model on the second call
        assert_relative_eq!(det.ra_topo_corr(&FixedCorrection(0.99), &site), 0.01);
    }
}
