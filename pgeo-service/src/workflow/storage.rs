//! Tabular persistence for address records
//!
//! CSV columns: `address, latitude, longitude, city, zip_code, cluster, density`.
//! Absent values are empty cells. Floats are written in shortest round-trip
//! form, so reading a file back reproduces coordinates bit for bit.

use crate::services::density_classifier;
use pgeo_common::{AddressRecord, Coordinate, DensityLabel, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One CSV row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CsvRow {
    address: String,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    zip_code: Option<String>,
    #[serde(default)]
    cluster: Option<i64>,
    #[serde(default)]
    density: Option<String>,
}

impl From<&AddressRecord> for CsvRow {
    fn from(record: &AddressRecord) -> Self {
        Self {
            address: record.raw_address.clone(),
            latitude: record.coordinate.map(|c| c.latitude),
            longitude: record.coordinate.map(|c| c.longitude),
            city: record.locality.clone(),
            zip_code: record.postal_code.clone(),
            cluster: record.cluster_id,
            density: Some(record.density_label.as_str().to_string()),
        }
    }
}

impl CsvRow {
    /// Convert to a record; `None` label means the cell was empty
    fn into_record(self, line: usize) -> Result<(AddressRecord, Option<DensityLabel>)> {
        let coordinate = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon).map_err(|e| {
                Error::InvalidInput(format!("row {}: {}", line, e))
            })?),
            (None, None) => None,
            _ => {
                return Err(Error::InvalidInput(format!(
                    "row {}: latitude and longitude must both be present or both absent",
                    line
                )))
            }
        };

        let label = self
            .density
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<DensityLabel>)
            .transpose()?;

        let record = AddressRecord {
            raw_address: self.address,
            coordinate,
            locality: self.city.filter(|s| !s.is_empty()),
            postal_code: self.zip_code.filter(|s| !s.is_empty()),
            cluster_id: self.cluster,
            density_label: label.unwrap_or_default(),
        };
        record
            .validate()
            .map_err(|e| Error::InvalidInput(format!("row {}: {}", line, e)))?;

        Ok((record, label))
    }
}

/// Write records as CSV (with header row)
pub fn write_records<W: Write>(writer: W, records: &[AddressRecord]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(CsvRow::from(record))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Read records from CSV
///
/// Only the `address` column is required. Rows without a `density` cell get
/// a label derived from the other rows' cluster populations.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<AddressRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    let mut missing_label = Vec::new();

    for (i, row) in csv_reader.deserialize::<CsvRow>().enumerate() {
        let (record, label) = row?.into_record(i + 2)?;
        if label.is_none() {
            missing_label.push(records.len());
        }
        records.push(record);
    }

    if !missing_label.is_empty() {
        let populations = density_classifier::cluster_populations(&records);
        for idx in missing_label {
            let record = &mut records[idx];
            let population = density_classifier::population_of(record, &populations);
            record.density_label =
                density_classifier::classify(record.is_resolved(), record.cluster_id, population);
        }
    }

    Ok(records)
}

/// Serialize records to an in-memory CSV string
pub fn records_to_csv_string(records: &[AddressRecord]) -> Result<String> {
    let mut buf = Vec::new();
    write_records(&mut buf, records)?;
    String::from_utf8(buf).map_err(|e| Error::Internal(e.to_string()))
}

/// Write records to `path` (temp file + rename)
pub fn save_records(path: &Path, records: &[AddressRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let file = std::fs::File::create(&tmp)?;
        write_records(std::io::BufWriter::new(file), records)?;
    }
    std::fs::rename(&tmp, path)?;
    debug!("Saved {} records to {}", records.len(), path.display());
    Ok(())
}

/// Read records from `path`; a missing file is an empty list
pub fn load_records(path: &Path) -> Result<Vec<AddressRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)?;
    read_records(std::io::BufReader::new(file))
}

/// Outcome of adding addresses to the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    /// Addresses submitted
    pub submitted: usize,
    /// Addresses saved after deduplication
    pub total: usize,
}

/// Saved address list backed by a CSV file
///
/// Mutations load, modify and rewrite the whole file with no locking of
/// their own; concurrent writers must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct AddressBook {
    path: PathBuf,
}

impl AddressBook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Book at the default file name inside `root_folder`
    pub fn in_root(root_folder: &Path) -> Self {
        Self::new(root_folder.join(pgeo_common::config::SAVED_ADDRESSES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<AddressRecord>> {
        load_records(&self.path)
    }

    /// Append addresses, then drop exact duplicates keeping the first occurrence
    pub fn add(&self, addresses: &[String]) -> Result<AddOutcome> {
        let mut records = self.load()?;
        records.extend(addresses.iter().map(AddressRecord::new));

        let mut seen = HashSet::new();
        records.retain(|r| seen.insert(r.raw_address.clone()));

        self.replace(&records)?;
        info!(
            "Added {} address(es). Total: {} saved",
            addresses.len(),
            records.len()
        );
        Ok(AddOutcome {
            submitted: addresses.len(),
            total: records.len(),
        })
    }

    /// Remove every row with exactly this address; returns rows removed
    pub fn remove(&self, address: &str) -> Result<usize> {
        let mut records = self.load()?;
        let before = records.len();
        records.retain(|r| r.raw_address != address);
        let removed = before - records.len();
        if removed > 0 {
            self.replace(&records)?;
        }
        Ok(removed)
    }

    /// Overwrite the book (e.g. with an uploaded list)
    pub fn replace(&self, records: &[AddressRecord]) -> Result<()> {
        save_records(&self.path, records)
    }

    /// Copy run results onto the saved rows with the same address
    ///
    /// The saved list keeps its current membership and order: rows added
    /// since the run started stay unprocessed and rows removed since then
    /// are not brought back. Returns the number of rows updated.
    pub fn merge_results(&self, results: &[AddressRecord]) -> Result<usize> {
        let by_address: HashMap<&str, &AddressRecord> = results
            .iter()
            .map(|r| (r.raw_address.as_str(), r))
            .collect();

        let mut records = self.load()?;
        let mut updated = 0;
        for record in records.iter_mut() {
            if let Some(result) = by_address.get(record.raw_address.as_str()) {
                *record = (*result).clone();
                updated += 1;
            }
        }

        self.replace(&records)?;
        debug!(updated, total = records.len(), "Merged run results into saved list");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(addr: &str, lat: f64, lon: f64, cluster: i64, label: DensityLabel) -> AddressRecord {
        AddressRecord {
            raw_address: addr.to_string(),
            coordinate: Some(Coordinate::new(lat, lon).unwrap()),
            locality: Some("Springfield".to_string()),
            postal_code: Some("62701".to_string()),
            cluster_id: Some(cluster),
            density_label: label,
        }
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let records = vec![
            resolved("1 Main St, Springfield, IL", 39.781721300000001, -89.650148099999994, 0, DensityLabel::Low),
            resolved("2 Main St, Springfield, IL", 0.1 + 0.2, -89.65, 0, DensityLabel::Low),
            resolved("999 Far Ave, Nowhere, ZZ", 35.123456789012345, -95.0, -1, DensityLabel::Isolated),
            AddressRecord::new("Unknown Place, \"Quoted\", Nowhere"),
        ];

        let csv = records_to_csv_string(&records).unwrap();
        let back = read_records(csv.as_bytes()).unwrap();

        assert_eq!(back, records);
        assert_eq!(
            back[1].coordinate.unwrap().latitude.to_bits(),
            (0.1f64 + 0.2).to_bits()
        );
    }

    #[test]
    fn test_header_and_empty_cells() {
        let csv = records_to_csv_string(&[AddressRecord::new("x")]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("address,latitude,longitude,city,zip_code,cluster,density")
        );
        assert_eq!(lines.next(), Some("x,,,,,,NotProcessed"));
    }

    #[test]
    fn test_address_only_file_loads() {
        let records = read_records("address\n1 Main St\n2 Oak Ave\n".as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.is_resolved()));
        assert!(records
            .iter()
            .all(|r| r.density_label == DensityLabel::NotProcessed));
    }

    #[test]
    fn test_missing_density_is_derived() {
        let csv = "address,latitude,longitude,cluster\n\
                   a,40.0,-75.0,0\n\
                   b,40.0,-75.0,0\n\
                   c,40.0,-75.0,0\n\
                   d,41.0,-75.0,-1\n\
                   e,,,\n";
        let records = read_records(csv.as_bytes()).unwrap();
        let labels: Vec<DensityLabel> = records.iter().map(|r| r.density_label).collect();
        assert_eq!(
            labels,
            vec![
                DensityLabel::Low,
                DensityLabel::Low,
                DensityLabel::Low,
                DensityLabel::Isolated,
                DensityLabel::NotProcessed
            ]
        );
    }

    #[test]
    fn test_half_coordinate_is_rejected() {
        let csv = "address,latitude,longitude\na,40.0,\n";
        assert!(matches!(
            read_records(csv.as_bytes()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_cluster_without_coordinate_is_rejected() {
        let csv = "address,latitude,longitude,cluster\na,,,0\n";
        assert!(read_records(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_address_book_add_dedup_remove() {
        let dir = tempfile::tempdir().unwrap();
        let book = AddressBook::in_root(dir.path());

        assert!(book.load().unwrap().is_empty());

        let outcome = book
            .add(&["1 Main St".to_string(), "2 Oak Ave".to_string()])
            .unwrap();
        assert_eq!(outcome, AddOutcome { submitted: 2, total: 2 });

        let outcome = book
            .add(&["2 Oak Ave".to_string(), "3 Elm St".to_string()])
            .unwrap();
        assert_eq!(outcome, AddOutcome { submitted: 2, total: 3 });

        let addresses: Vec<String> = book
            .load()
            .unwrap()
            .into_iter()
            .map(|r| r.raw_address)
            .collect();
        assert_eq!(addresses, vec!["1 Main St", "2 Oak Ave", "3 Elm St"]);

        assert_eq!(book.remove("2 Oak Ave").unwrap(), 1);
        assert_eq!(book.remove("not there").unwrap(), 0);
        assert_eq!(book.load().unwrap().len(), 2);
    }

    #[test]
    fn test_merge_results_keeps_current_membership() {
        let dir = tempfile::tempdir().unwrap();
        let book = AddressBook::in_root(dir.path());
        book.add(&["a".to_string(), "b".to_string(), "c".to_string()])
            .unwrap();

        // List edited while the run was in flight: "b" removed, "d" added
        book.remove("b").unwrap();
        book.add(&["d".to_string()]).unwrap();

        let results = vec![
            resolved("a", 40.0, -75.0, 0, DensityLabel::Low),
            resolved("b", 40.0, -75.0, 0, DensityLabel::Low),
            resolved("c", 41.0, -75.0, -1, DensityLabel::Isolated),
        ];
        assert_eq!(book.merge_results(&results).unwrap(), 2);

        let saved = book.load().unwrap();
        let addresses: Vec<&str> = saved.iter().map(|r| r.raw_address.as_str()).collect();
        assert_eq!(addresses, vec!["a", "c", "d"]);
        assert_eq!(saved[0], results[0]);
        assert_eq!(saved[1], results[2]);
        assert!(!saved[2].is_resolved());
        assert_eq!(saved[2].density_label, DensityLabel::NotProcessed);
    }
}
