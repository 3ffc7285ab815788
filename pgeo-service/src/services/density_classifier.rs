//! Density labels from cluster membership
//!
//! Priority order:
//! 1. No coordinate → `NotProcessed`
//! 2. Noise (or never clustered) → `Isolated`
//! 3. Cluster population ≥ 10 → `High`
//! 4. Cluster population 5..=9 → `Medium`
//! 5. Otherwise → `Low`
//!
//! Population counts every record carrying the cluster id, the record itself
//! included.

use pgeo_common::{AddressRecord, DensityLabel};
use std::collections::HashMap;

/// Population at or above which a cluster is `High`
pub const HIGH_DENSITY_MIN: usize = 10;

/// Population at or above which a cluster is `Medium`
pub const MEDIUM_DENSITY_MIN: usize = 5;

/// Label for one record
pub fn classify(has_coordinate: bool, cluster_id: Option<i64>, population: usize) -> DensityLabel {
    if !has_coordinate {
        return DensityLabel::NotProcessed;
    }
    match cluster_id {
        Some(id) if id >= 0 => {
            if population >= HIGH_DENSITY_MIN {
                DensityLabel::High
            } else if population >= MEDIUM_DENSITY_MIN {
                DensityLabel::Medium
            } else {
                DensityLabel::Low
            }
        }
        _ => DensityLabel::Isolated,
    }
}

/// Member count per non-negative cluster id
pub fn cluster_populations(records: &[AddressRecord]) -> HashMap<i64, usize> {
    let mut populations = HashMap::new();
    for record in records {
        if let Some(id) = record.cluster_id.filter(|id| *id >= 0) {
            *populations.entry(id).or_insert(0) += 1;
        }
    }
    populations
}

/// Population of the cluster `record` belongs to (0 for noise/unclustered)
pub fn population_of(record: &AddressRecord, populations: &HashMap<i64, usize>) -> usize {
    record
        .cluster_id
        .and_then(|id| populations.get(&id).copied())
        .unwrap_or(0)
}

/// Annotate every record with its density label
pub fn label_records(records: Vec<AddressRecord>) -> Vec<AddressRecord> {
    let populations = cluster_populations(&records);
    records
        .into_iter()
        .map(|mut record| {
            let population = population_of(&record, &populations);
            record.density_label =
                classify(record.is_resolved(), record.cluster_id, population);
            record
        })
        .collect()
}
