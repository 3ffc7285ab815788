//! Density-based spatial clustering over great-circle distance
//!
//! DBSCAN with the haversine metric on the unit sphere. `epsilon_km` is
//! converted to an angular radius (divided by the Earth's mean radius) and
//! compared against haversine distances in radians.
//!
//! # Membership rules
//! - Core point: at least `min_samples` points (itself included) within epsilon.
//! - Core points within epsilon of each other share a cluster (transitively).
//! - Border point: non-core with a core point within epsilon. It joins the
//!   cluster of its nearest core neighbor; equal distances go to the core
//!   with the smaller (latitude, longitude), so membership never depends on
//!   input order.
//! - Noise: everything else, labeled `NOISE_CLUSTER`.
//!
//! Cluster ids are numbered 0, 1, 2, ... in order of each cluster's lowest
//! input index. Only membership is meaningful across runs.

use pgeo_common::config::ClusteringConfig;
use pgeo_common::records::NOISE_CLUSTER;
use pgeo_common::{AddressRecord, Coordinate};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tracing::info;

/// Earth's mean radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Clustering parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Neighbor radius in kilometers
    pub epsilon_km: f64,
    /// Minimum neighbors, itself included, for a core point
    pub min_samples: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            epsilon_km: 0.5,
            min_samples: 3,
        }
    }
}

impl From<&ClusteringConfig> for ClusterParams {
    fn from(config: &ClusteringConfig) -> Self {
        Self {
            epsilon_km: config.epsilon_km,
            min_samples: config.min_samples,
        }
    }
}

impl ClusterParams {
    /// Epsilon as an angle on the unit sphere (radians)
    pub fn epsilon_radians(&self) -> f64 {
        self.epsilon_km / EARTH_RADIUS_KM
    }
}

/// Counts from one clustering pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClusterSummary {
    /// Number of real clusters
    pub clusters: usize,
    /// Resolved points labeled noise
    pub noise: usize,
    /// Resolved points inside a real cluster
    pub clustered_points: usize,
}

/// Haversine distance between two (lat, lon) pairs given in radians,
/// as an angle on the unit sphere
pub fn haversine_radians(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = a;
    let (lat2, lon2) = b;
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin()
}

/// DBSCAN over coordinates
#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialClusterer {
    params: ClusterParams,
}

impl SpatialClusterer {
    pub fn new(params: ClusterParams) -> Self {
        Self { params }
    }

    /// Cluster label per point, `NOISE_CLUSTER` for noise
    pub fn cluster_points(&self, points: &[Coordinate]) -> Vec<i64> {
        let n = points.len();
        if n == 0 {
            return Vec::new();
        }

        let radians: Vec<(f64, f64)> = points.iter().map(Coordinate::to_radians).collect();
        let eps = self.params.epsilon_radians();

        // Neighborhoods (self included) with distances; pairwise work is independent
        let neighbors: Vec<Vec<(usize, f64)>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (0..n)
                    .filter_map(|j| {
                        let d = if i == j {
                            0.0
                        } else {
                            haversine_radians(radians[i], radians[j])
                        };
                        (d <= eps).then_some((j, d))
                    })
                    .collect()
            })
            .collect();

        let is_core: Vec<bool> = neighbors
            .iter()
            .map(|nb| nb.len() >= self.params.min_samples)
            .collect();

        let mut labels = vec![NOISE_CLUSTER; n];

        // Connected components of core points, seeded in index order
        let mut next_label: i64 = 0;
        for seed in 0..n {
            if !is_core[seed] || labels[seed] != NOISE_CLUSTER {
                continue;
            }
            labels[seed] = next_label;
            let mut queue = VecDeque::from([seed]);
            while let Some(p) = queue.pop_front() {
                for &(q, _) in &neighbors[p] {
                    if is_core[q] && labels[q] == NOISE_CLUSTER {
                        labels[q] = next_label;
                        queue.push_back(q);
                    }
                }
            }
            next_label += 1;
        }

        // Border points follow their nearest core neighbor
        for i in 0..n {
            if is_core[i] {
                continue;
            }
            let nearest_core = neighbors[i]
                .iter()
                .filter(|(j, _)| is_core[*j])
                .min_by(|(ja, da), (jb, db)| {
                    da.total_cmp(db)
                        .then(points[*ja].latitude.total_cmp(&points[*jb].latitude))
                        .then(points[*ja].longitude.total_cmp(&points[*jb].longitude))
                });
            if let Some(&(core, _)) = nearest_core {
                labels[i] = labels[core];
            }
        }

        renumber_by_first_member(&mut labels);
        labels
    }

    /// Assign cluster ids to every resolved record
    ///
    /// Unresolved records pass through untouched (no cluster id) and are not
    /// part of the clustering input. With zero resolved records no distance
    /// is computed.
    pub fn assign(&self, records: Vec<AddressRecord>) -> (Vec<AddressRecord>, ClusterSummary) {
        let resolved: Vec<(usize, Coordinate)> = records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.coordinate.map(|c| (i, c)))
            .collect();

        if resolved.is_empty() {
            info!("No valid coordinates to cluster");
            return (records, ClusterSummary::default());
        }

        let points: Vec<Coordinate> = resolved.iter().map(|(_, c)| *c).collect();
        let labels = self.cluster_points(&points);

        let mut records = records;
        for ((index, _), label) in resolved.iter().zip(labels.iter()) {
            records[*index].cluster_id = Some(*label);
        }

        let summary = summarize(&labels);
        info!(
            clusters = summary.clusters,
            noise = summary.noise,
            total = points.len(),
            "Found {} clusters, {} noise points out of {} total",
            summary.clusters,
            summary.noise,
            points.len()
        );

        (records, summary)
    }
}

/// Relabel clusters 0.. in order of their lowest member index
fn renumber_by_first_member(labels: &mut [i64]) {
    let mut mapping = std::collections::HashMap::new();
    let mut next = 0i64;
    for label in labels.iter_mut() {
        if *label == NOISE_CLUSTER {
            continue;
        }
        let new = *mapping.entry(*label).or_insert_with(|| {
            let v = next;
            next += 1;
            v
        });
        *label = new;
    }
}

fn summarize(labels: &[i64]) -> ClusterSummary {
    let clusters: HashSet<i64> = labels.iter().copied().filter(|l| *l >= 0).collect();
    let noise = labels.iter().filter(|l| **l == NOISE_CLUSTER).count();
    ClusterSummary {
        clusters: clusters.len(),
        noise,
        clustered_points: labels.len() - noise,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
        haversine_radians(a.to_radians(), b.to_radians()) * EARTH_RADIUS_KM
    }

    /// Point `meters` north of `base`
    fn north_of(base: Coordinate, meters: f64) -> Coordinate {
        let dlat = (meters / 1000.0 / EARTH_RADIUS_KM).to_degrees();
        c(base.latitude + dlat, base.longitude)
    }

    #[test]
    fn test_haversine_known_distance() {
        // Springfield, IL to Chicago, IL is roughly 280 km
        let springfield = c(39.7817, -89.6501);
        let chicago = c(41.8781, -87.6298);
        let d = haversine_km(&springfield, &chicago);
        assert!((d - 285.0).abs() < 10.0, "got {}", d);
        assert_eq!(haversine_km(&springfield, &springfield), 0.0);
    }

    #[test]
    fn test_epsilon_conversion() {
        let params = ClusterParams::default();
        assert!((params.epsilon_radians() - 0.5 / 6371.0).abs() < 1e-15);
    }

    #[test]
    fn test_dense_group_and_noise() {
        let base = c(39.7817, -89.6501);
        let points = vec![
            base,
            north_of(base, 40.0),
            north_of(base, 80.0),
            c(35.0, -95.0),
        ];
        let labels = SpatialClusterer::default().cluster_points(&points);
        assert_eq!(labels, vec![0, 0, 0, NOISE_CLUSTER]);
    }

    #[test]
    fn test_too_few_points_are_all_noise() {
        let base = c(39.7817, -89.6501);
        let points = vec![base, north_of(base, 10.0)];
        let labels = SpatialClusterer::default().cluster_points(&points);
        assert_eq!(labels, vec![NOISE_CLUSTER, NOISE_CLUSTER]);
    }

    #[test]
    fn test_chain_of_cores_is_one_cluster() {
        // 300 m spacing: each interior point sees both neighbors
        let base = c(40.0, -75.0);
        let points: Vec<Coordinate> = (0..8).map(|i| north_of(base, 300.0 * i as f64)).collect();
        let labels = SpatialClusterer::default().cluster_points(&points);
        assert!(labels.iter().all(|l| *l == 0), "{:?}", labels);
    }

    #[test]
    fn test_border_point_joins_cluster() {
        // Three tight core points and one point 490 m from the nearest of them;
        // the far point only has one neighbor besides itself
        let base = c(40.0, -75.0);
        let points = vec![
            base,
            north_of(base, 20.0),
            north_of(base, 40.0),
            north_of(base, 530.0),
        ];
        let labels = SpatialClusterer::default().cluster_points(&points);
        assert_eq!(labels, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_membership_independent_of_order() {
        let a = c(40.0, -75.0);
        let b = c(41.0, -76.0);
        let mut points = vec![
            a,
            north_of(a, 50.0),
            north_of(a, 100.0),
            b,
            north_of(b, 50.0),
            north_of(b, 100.0),
            north_of(b, 150.0),
            c(10.0, 10.0),
        ];
        let clusterer = SpatialClusterer::default();
        let forward = clusterer.cluster_points(&points);

        points.reverse();
        let mut backward = clusterer.cluster_points(&points);
        backward.reverse();

        // same partition, possibly different ids
        for i in 0..forward.len() {
            for j in 0..forward.len() {
                assert_eq!(forward[i] == forward[j], backward[i] == backward[j]);
            }
            assert_eq!(forward[i] == NOISE_CLUSTER, backward[i] == NOISE_CLUSTER);
        }
    }

    #[test]
    fn test_ids_numbered_by_first_member() {
        let a = c(40.0, -75.0);
        let b = c(41.0, -76.0);
        let points = vec![
            c(10.0, 10.0),
            b,
            a,
            north_of(b, 10.0),
            north_of(a, 10.0),
            north_of(b, 20.0),
            north_of(a, 20.0),
        ];
        let labels = SpatialClusterer::default().cluster_points(&points);
        assert_eq!(labels, vec![NOISE_CLUSTER, 0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_assign_skips_unresolved_records() {
        let base = c(39.7817, -89.6501);
        let mut records: Vec<AddressRecord> = (0..4)
            .map(|i| AddressRecord::new(format!("{} Main St", i)))
            .collect();
        records[0].coordinate = Some(base);
        records[2].coordinate = Some(north_of(base, 30.0));
        records[3].coordinate = Some(north_of(base, 60.0));

        let (records, summary) = SpatialClusterer::default().assign(records);

        assert_eq!(records[0].cluster_id, Some(0));
        assert_eq!(records[1].cluster_id, None);
        assert_eq!(records[2].cluster_id, Some(0));
        assert_eq!(records[3].cluster_id, Some(0));
        assert_eq!(
            summary,
            ClusterSummary {
                clusters: 1,
                noise: 0,
                clustered_points: 3
            }
        );
    }

    #[test]
    fn test_assign_with_no_coordinates() {
        let records = vec![AddressRecord::new("a"), AddressRecord::new("b")];
        let (out, summary) = SpatialClusterer::default().assign(records.clone());
        assert_eq!(out, records);
        assert_eq!(summary, ClusterSummary::default());
    }
}
