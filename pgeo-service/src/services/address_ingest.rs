//! Address intake and cleaning
//!
//! Reads a CSV upload, auto-detects which columns hold address components
//! and produces one cleaned address string per row, in input order.
//!
//! Two layouts are accepted:
//! 1. A single address/street column holding full addresses
//! 2. Separate street, city, state and zip columns, merged with ", "

use pgeo_common::{Error, Result};
use std::io::Read;
use tracing::{debug, info};

/// Address component a column can map to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Street,
    City,
    State,
    Zip,
}

/// Lowercase header aliases, checked in order; first match per component wins
const COLUMN_ALIASES: &[(&str, Component)] = &[
    ("address", Component::Street),
    ("street", Component::Street),
    ("street address", Component::Street),
    ("street_address", Component::Street),
    ("property address", Component::Street),
    ("property_address", Component::Street),
    ("addr", Component::Street),
    ("address1", Component::Street),
    ("address 1", Component::Street),
    ("city", Component::City),
    ("town", Component::City),
    ("municipality", Component::City),
    ("state", Component::State),
    ("st", Component::State),
    ("province", Component::State),
    ("zip", Component::Zip),
    ("zipcode", Component::Zip),
    ("zip code", Component::Zip),
    ("zip_code", Component::Zip),
    ("postal", Component::Zip),
    ("postal code", Component::Zip),
    ("postal_code", Component::Zip),
];

/// Column index per detected component
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectedColumns {
    pub street: Option<usize>,
    pub city: Option<usize>,
    pub state: Option<usize>,
    pub zip: Option<usize>,
}

impl DetectedColumns {
    fn slot(&mut self, component: Component) -> &mut Option<usize> {
        match component {
            Component::Street => &mut self.street,
            Component::City => &mut self.city,
            Component::State => &mut self.state,
            Component::Zip => &mut self.zip,
        }
    }

    /// Number of components found
    pub fn count(&self) -> usize {
        [self.street, self.city, self.state, self.zip]
            .iter()
            .filter(|c| c.is_some())
            .count()
    }

    /// Street, city, state, zip columns that were found, in that order
    fn merge_order(&self) -> Vec<usize> {
        [self.street, self.city, self.state, self.zip]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Match headers against the alias table
pub fn detect_columns<'a>(headers: impl IntoIterator<Item = &'a str>) -> DetectedColumns {
    let normalized: Vec<String> = headers
        .into_iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut found = DetectedColumns::default();
    for (alias, component) in COLUMN_ALIASES {
        if let Some(idx) = normalized.iter().position(|h| h == alias) {
            let slot = found.slot(*component);
            if slot.is_none() {
                *slot = Some(idx);
            }
        }
    }
    found
}

/// Trim and collapse internal whitespace runs to a single space
pub fn clean_address(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_blank_cell(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v.eq_ignore_ascii_case("nan")
}

/// Read addresses from CSV, one per data row
///
/// # Errors
/// `InvalidInput` when no address column can be detected; `Csv` on
/// malformed input.
pub fn load_addresses<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    debug!("Detected columns: {:?}", headers.iter().collect::<Vec<_>>());

    let detected = detect_columns(headers.iter());
    debug!("Matched components: {:?}", detected);

    let Some(street) = detected.street else {
        return Err(Error::InvalidInput(format!(
            "Could not auto-detect address columns. Columns found: {:?}. \
             Expected either a single 'Address' column, or separate \
             'Address'/'Street', 'City', 'State', 'Zip' columns.",
            headers.iter().collect::<Vec<_>>()
        )));
    };

    let merge = detected.count() >= 2;
    let columns = if merge {
        info!("Combining {} address columns", detected.count());
        detected.merge_order()
    } else {
        vec![street]
    };

    let mut addresses = Vec::new();
    let mut total_rows = 0usize;

    for row in csv_reader.records() {
        let row = row?;
        total_rows += 1;

        let joined = columns
            .iter()
            .filter_map(|idx| row.get(*idx))
            .filter(|v| !is_blank_cell(v))
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(", ");

        let cleaned = clean_address(&joined);
        if !cleaned.is_empty() {
            addresses.push(cleaned);
        }
    }

    info!(
        "Loaded {} rows, removed {} invalid, {} remaining",
        total_rows,
        total_rows - addresses.len(),
        addresses.len()
    );

    Ok(addresses)
}

/// Newline-separated free text → cleaned, non-blank addresses
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(clean_address)
        .filter(|line| !line.is_empty())
        .collect()
}
