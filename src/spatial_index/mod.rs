//! # Per-epoch spatial index
//!
//! An arena-backed 2-D k-d tree mapping sky positions (RA, Dec in degrees) to
//! detection identities. The tree is built once, single-threaded, over all
//! detections sharing an epoch; after construction it is immutable — nodes
//! live in a plain `Vec` and no pointer is ever rewritten — so concurrent
//! read-only queries need no locking.
//!
//! ## Query contract
//!
//! [`KdTree::range_search`] returns a **conservative superset**: every indexed
//! point whose true great-circle distance to the query is within the radius is
//! guaranteed to be in the result, along with some points that are not. The
//! index only prunes on axis-aligned bounding boxes; callers re-check
//! candidates with [`crate::sky::angular_distance_deg`]. Two effects make the
//! box wider than the naive `±radius`:
//!
//! * near the poles a degree of RA spans less arc, so the RA half-width is
//!   inflated by the worst-case Dec convergence inside the box;
//! * a box crossing the 0°/360° RA seam is split into two wrapped boxes.
//!
//! Construction partitions on the positional median, so typical queries cost
//! `O(log n + k)` but adversarial distributions degrade toward `O(n)`.

use smallvec::SmallVec;

use crate::constants::{Degree, DetectionId, RADEG};
use crate::daylink_errors::DaylinkError;

/// One indexed entry: an (RA, Dec) position, optional extra non-indexed
/// dimensions, and the detection identity it stands for.
#[derive(Debug, Clone)]
pub struct IndexedPoint {
    pub point: [Degree; 2],
    pub aux: SmallVec<[f64; 2]>,
    pub value: DetectionId,
}

impl IndexedPoint {
    pub fn new(ra: Degree, dec: Degree, value: DetectionId) -> Self {
        IndexedPoint {
            point: [ra, dec],
            aux: SmallVec::new(),
            value,
        }
    }
}

#[derive(Debug)]
enum Node {
    Split {
        dim: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        entries: Vec<IndexedPoint>,
    },
}

/// Immutable arena-backed k-d tree over sky positions.
#[derive(Debug)]
pub struct KdTree {
    nodes: Vec<Node>,
    root: Option<usize>,
    len: usize,
}

impl KdTree {
    /// Build an index over the given points.
    ///
    /// Arguments
    /// ---------
    /// * `points`: the entries to index; RA must already be in [0, 360)
    /// * `leaf_size`: maximum entries per leaf bucket (≥ 1)
    ///
    /// Return
    /// ------
    /// * the index, or an `InvalidConfiguration` error when `leaf_size` is 0
    pub fn build(points: Vec<IndexedPoint>, leaf_size: usize) -> Result<Self, DaylinkError> {
        if leaf_size == 0 {
            return Err(DaylinkError::InvalidConfiguration(
                "spatial index leaf size must be at least 1".into(),
            ));
        }
        let len = points.len();
        let mut tree = KdTree {
            nodes: Vec::new(),
            root: None,
            len,
        };
        if len > 0 {
            let root = tree.build_node(points, 0, leaf_size);
            tree.root = Some(root);
        }
        Ok(tree)
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn build_node(&mut self, mut points: Vec<IndexedPoint>, dim: usize, leaf_size: usize) -> usize {
        if points.len() <= leaf_size {
            self.nodes.push(Node::Leaf { entries: points });
            return self.nodes.len() - 1;
        }

        // Positional median split: cheap, but not distance-balanced, hence the
        // O(n) worst case documented at module level.
        let mid = points.len() / 2;
        points.select_nth_unstable_by(mid, |a, b| {
            a.point[dim]
                .partial_cmp(&b.point[dim])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let threshold = points[mid].point[dim];
        let right_points = points.split_off(mid);

        let next_dim = (dim + 1) % 2;
        let left = self.build_node(points, next_dim, leaf_size);
        let right = self.build_node(right_points, next_dim, leaf_size);
        self.nodes.push(Node::Split {
            dim,
            threshold,
            left,
            right,
        });
        self.nodes.len() - 1
    }

    /// Conservative range query around a sky position.
    ///
    /// Arguments
    /// ---------
    /// * `ra`, `dec`: query position in degrees, RA in [0, 360)
    /// * `radius`: great-circle search radius in degrees
    /// * `aux_point`: query values for the extra non-indexed dimensions
    /// * `aux_tolerances`: half-width tolerance window per extra dimension
    ///
    /// Return
    /// ------
    /// * every indexed point inside the widened bounding box whose aux values
    ///   all fall within their tolerance windows. This is a superset of the
    ///   true in-radius set; the caller must re-check the great-circle metric.
    pub fn range_search(
        &self,
        ra: Degree,
        dec: Degree,
        radius: Degree,
        aux_point: &[f64],
        aux_tolerances: &[f64],
    ) -> Vec<&IndexedPoint> {
        let mut out = Vec::new();
        if self.root.is_none() || radius < 0. {
            return out;
        }

        let dec_lo = (dec - radius).max(-90.);
        let dec_hi = (dec + radius).min(90.);

        // Worst-case Dec inside the box dictates how much a degree of RA
        // shrinks; inflate the RA half-width accordingly.
        let worst_dec = dec_lo.abs().max(dec_hi.abs());
        let ra_half = if worst_dec >= 90. - 1e-9 {
            180.
        } else {
            (radius / (worst_dec * RADEG).cos()).min(180.)
        };

        if ra_half >= 180. {
            self.box_search([0., dec_lo], [360., dec_hi], aux_point, aux_tolerances, &mut out);
            return out;
        }

        let lo = (ra - ra_half).rem_euclid(360.);
        let hi = (ra + ra_half).rem_euclid(360.);
        if lo <= hi {
            self.box_search([lo, dec_lo], [hi, dec_hi], aux_point, aux_tolerances, &mut out);
        } else {
            // The box crosses the 0°/360° seam: search both wrapped halves.
            self.box_search([0., dec_lo], [hi, dec_hi], aux_point, aux_tolerances, &mut out);
            self.box_search([lo, dec_lo], [360., dec_hi], aux_point, aux_tolerances, &mut out);
        }
        out
    }

    /// Collect all entries inside an axis-aligned box, intersected with the
    /// aux tolerance windows.
    fn box_search<'a>(
        &'a self,
        lo: [f64; 2],
        hi: [f64; 2],
        aux_point: &[f64],
        aux_tolerances: &[f64],
        out: &mut Vec<&'a IndexedPoint>,
    ) {
        let Some(root) = self.root else {
            return;
        };
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match &self.nodes[node] {
                Node::Split {
                    dim,
                    threshold,
                    left,
                    right,
                } => {
                    if lo[*dim] <= *threshold {
                        stack.push(*left);
                    }
                    if hi[*dim] >= *threshold {
                        stack.push(*right);
                    }
                }
                Node::Leaf { entries } => {
                    for entry in entries {
                        let in_box = (0..2)
                            .all(|d| entry.point[d] >= lo[d] && entry.point[d] <= hi[d]);
                        if !in_box {
                            continue;
                        }
                        let aux_ok = aux_point.iter().zip(aux_tolerances).enumerate().all(
                            |(k, (center, tol))| {
                                entry
                                    .aux
                                    .get(k)
                                    .is_some_and(|value| (value - center).abs() <= *tol)
                            },
                        );
                        if aux_ok {
                            out.push(entry);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod kdtree_tests {
    use super::*;
    use crate::sky::angular_distance_deg;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn random_points(rng: &mut StdRng, n: usize) -> Vec<IndexedPoint> {
        (0..n)
            .map(|i| {
                // cluster a third of the points near the RA seam and a third
                // at high declination, where the naive box would fail
                let (ra, dec) = match i % 3 {
                    0 => (rng.gen_range(0.0..360.0), rng.gen_range(-30.0..30.0)),
                    1 => (
                        (rng.gen_range(-1.0..1.0f64)).rem_euclid(360.),
                        rng.gen_range(-10.0..10.0),
                    ),
                    _ => (rng.gen_range(0.0..360.0), rng.gen_range(80.0..90.0)),
                };
                IndexedPoint::new(ra, dec, i as i64)
            })
            .collect()
    }

    #[test]
    fn test_rejects_zero_leaf_size() {
        assert!(KdTree::build(Vec::new(), 0).is_err());
    }

    #[test]
    fn test_empty_tree_query() {
        let tree = KdTree::build(Vec::new(), 16).unwrap();
        assert!(tree.is_empty());
        assert!(tree.range_search(10., 0., 1., &[], &[]).is_empty());
    }

    #[test]
    fn test_range_search_is_superset_of_great_circle_set() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let points = random_points(&mut rng, 400);
        let tree = KdTree::build(points.clone(), 8).unwrap();

        for _ in 0..60 {
            let q_ra = rng.gen_range(0.0..360.0);
            let q_dec = rng.gen_range(-89.0..89.0);
            let radius = rng.gen_range(0.1..5.0);

            let found: BTreeSet<i64> = tree
                .range_search(q_ra, q_dec, radius, &[], &[])
                .iter()
                .map(|p| p.value)
                .collect();

            for p in &points {
                let d = angular_distance_deg(q_ra, q_dec, p.point[0], p.point[1]);
                if d <= radius {
                    assert!(
                        found.contains(&p.value),
                        "missed point {} at distance {d} (radius {radius}, query {q_ra} {q_dec})",
                        p.value
                    );
                }
            }
        }
    }

    #[test]
    fn test_range_search_across_ra_seam() {
        let points = vec![
            IndexedPoint::new(359.9, 0., 1),
            IndexedPoint::new(0.1, 0., 2),
            IndexedPoint::new(180., 0., 3),
        ];
        let tree = KdTree::build(points, 1).unwrap();
        let ids: BTreeSet<i64> = tree
            .range_search(0.0, 0.0, 0.5, &[], &[])
            .iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(ids, BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_aux_tolerance_window() {
        let mut bright = IndexedPoint::new(10., 0., 1);
        bright.aux.push(19.0);
        let mut faint = IndexedPoint::new(10.01, 0., 2);
        faint.aux.push(24.0);

        let tree = KdTree::build(vec![bright, faint], 4).unwrap();
        let ids: Vec<i64> = tree
            .range_search(10., 0., 0.5, &[20.0], &[2.0])
            .iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_single_vs_large_leaf_agree() {
        let mut rng = StdRng::seed_from_u64(7);
        let points = random_points(&mut rng, 120);
        let fine = KdTree::build(points.clone(), 1).unwrap();
        let coarse = KdTree::build(points, 64).unwrap();

        let a: BTreeSet<i64> = fine
            .range_search(42., 5., 3., &[], &[])
            .iter()
            .map(|p| p.value)
            .collect();
        let b: BTreeSet<i64> = coarse
            .range_search(42., 5., 3., &[], &[])
            .iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(a, b);
    }
}
