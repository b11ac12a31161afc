mod common;

use std::collections::BTreeSet;

use common::{as_id_set, catalog, detection};
use daylink::{find_tracklets, DetectionId, FindTrackletsConfig, IdSetStore};

fn form(
    dets: Vec<daylink::Detection>,
    config: &FindTrackletsConfig,
) -> BTreeSet<Vec<DetectionId>> {
    let catalog = catalog(dets);
    let mut store = IdSetStore::in_memory();
    find_tracklets(&catalog, config, &mut store).unwrap();
    as_id_set(store.into_records())
}

/// Straight-line mover at 0.5 deg/day observed on two nights, two exposures
/// per night.
fn two_night_line() -> Vec<daylink::Detection> {
    [0.0, 0.02, 2.0, 2.03]
        .iter()
        .enumerate()
        .map(|(id, &day)| detection(id as DetectionId, 10.0 + 0.5 * day, 5.0, day))
        .collect()
}

#[test]
fn test_two_night_scenario_pairs() {
    let config = FindTrackletsConfig {
        max_velocity: 2.0,
        min_velocity: 0.0,
        max_dt: 3.0,
        min_dt: 0.01,
        ..FindTrackletsConfig::default()
    };
    let tracklets = form(two_night_line(), &config);

    // same-night pairs plus every cross-night pair at 0.5 deg/day
    let expected: BTreeSet<Vec<DetectionId>> = [
        vec![0, 1],
        vec![2, 3],
        vec![0, 2],
        vec![0, 3],
        vec![1, 2],
        vec![1, 3],
    ]
    .into_iter()
    .collect();
    assert_eq!(tracklets, expected);
}

#[test]
fn test_same_night_only_with_default_dt_window() {
    // default max_dt (0.0625 d = 90 min) only admits same-night pairs
    let tracklets = form(two_night_line(), &FindTrackletsConfig::default());
    let expected: BTreeSet<Vec<DetectionId>> = [vec![0, 1], vec![2, 3]].into_iter().collect();
    assert_eq!(tracklets, expected);
}

#[test]
fn test_never_links_a_detection_to_itself() {
    let config = FindTrackletsConfig {
        max_dt: 3.0,
        ..FindTrackletsConfig::default()
    };
    let tracklets = form(two_night_line(), &config);
    for ids in &tracklets {
        let unique: BTreeSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len(), "self-link in {ids:?}");
    }
}

#[test]
fn test_min_velocity_discards_slow_movers() {
    let dets = vec![
        // stationary source seen twice
        detection(0, 50.0, -5.0, 0.0),
        detection(1, 50.0, -5.0, 0.02),
        // fast mover
        detection(2, 60.0, 10.0, 0.0),
        detection(3, 60.02, 10.0, 0.02),
    ];
    let config = FindTrackletsConfig {
        min_velocity: 0.5,
        ..FindTrackletsConfig::default()
    };
    let tracklets = form(dets, &config);
    let expected: BTreeSet<Vec<DetectionId>> = [vec![2, 3]].into_iter().collect();
    assert_eq!(tracklets, expected);
}

#[test]
fn test_pairs_across_the_ra_seam() {
    let dets = vec![
        detection(0, 359.995, 0.0, 0.0),
        detection(1, 0.005, 0.0, 0.02),
    ];
    let tracklets = form(dets, &FindTrackletsConfig::default());
    let expected: BTreeSet<Vec<DetectionId>> = [vec![0, 1]].into_iter().collect();
    assert_eq!(tracklets, expected);
}

#[test]
fn test_empty_catalog_is_valid_and_empty() {
    let tracklets = form(Vec::new(), &FindTrackletsConfig::default());
    assert!(tracklets.is_empty());
}

#[test]
fn test_invalid_velocity_bounds_fail_fast() {
    let config = FindTrackletsConfig {
        max_velocity: 0.1,
        min_velocity: 0.5,
        ..FindTrackletsConfig::default()
    };
    let catalog = catalog(two_night_line());
    let mut store = IdSetStore::in_memory();
    let err = find_tracklets(&catalog, &config, &mut store);
    assert!(matches!(
        err,
        Err(daylink::DaylinkError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_result_set_is_independent_of_worker_count() {
    // a denser synthetic field: 3 epochs, a grid of slow movers
    let mut dets = Vec::new();
    let mut id = 0;
    for (night, day) in [0.0, 0.02, 0.04].into_iter().enumerate() {
        for row in 0..6 {
            for col in 0..6 {
                dets.push(detection(
                    id,
                    100.0 + col as f64 * 0.05 + night as f64 * 0.01,
                    -20.0 + row as f64 * 0.05,
                    day,
                ));
                id += 1;
            }
        }
    }

    let mut sets = Vec::new();
    for num_workers in [1, 4, 7] {
        let config = FindTrackletsConfig {
            num_workers,
            ..FindTrackletsConfig::default()
        };
        sets.push(form(dets.clone(), &config));
    }
    assert!(!sets[0].is_empty());
    assert_eq!(sets[0], sets[1]);
    assert_eq!(sets[0], sets[2]);
}
