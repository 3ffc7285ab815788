//! Fallback query construction
//!
//! Produces the ordered list of search strings tried for one address.
//! The list always starts with the address verbatim; fallbacks add a country
//! suffix and, for addresses with no recognizable state, a collapsed
//! `first part, last part, country` variant that drops noisy middle tokens
//! such as misspelled city names.

/// Tokens recognized as a country part (case-insensitive)
pub const COUNTRY_TOKENS: &[&str] = &["USA", "US", "United States"];

/// US states, DC and territories: (abbreviation, name)
const US_STATES: &[(&str, &str)] = &[
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
    ("DC", "District of Columbia"),
    ("PR", "Puerto Rico"),
    ("GU", "Guam"),
    ("VI", "Virgin Islands"),
    ("AS", "American Samoa"),
    ("MP", "Northern Mariana Islands"),
];

/// Builds fallback query lists
///
/// Pure: no I/O, and the same input always yields the same list.
#[derive(Debug, Clone)]
pub struct FallbackQueryBuilder {
    country_suffix: String,
}

impl Default for FallbackQueryBuilder {
    fn default() -> Self {
        Self::new("USA")
    }
}

impl FallbackQueryBuilder {
    /// Builder appending `country_suffix` in the fallback queries
    pub fn new(country_suffix: impl Into<String>) -> Self {
        Self {
            country_suffix: country_suffix.into(),
        }
    }

    /// Ordered, deduplicated candidate queries for `address`
    ///
    /// # Rules
    /// 1. The address itself, unmodified.
    /// 2. `address, USA` unless some comma part already is a country token.
    /// 3. `first, last, USA` when no part is a state, no part is a country,
    ///    and the address has at least two comma parts.
    ///
    /// # Example
    /// ```
    /// use pgeo_service::services::query_builder::FallbackQueryBuilder;
    ///
    /// let queries = FallbackQueryBuilder::default().build("12 Elm St, Smallvile, ZZ");
    /// assert_eq!(queries, vec![
    ///     "12 Elm St, Smallvile, ZZ".to_string(),
    ///     "12 Elm St, Smallvile, ZZ, USA".to_string(),
    ///     "12 Elm St, ZZ, USA".to_string(),
    /// ]);
    /// ```
    pub fn build(&self, address: &str) -> Vec<String> {
        let parts: Vec<&str> = address
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        let has_country = parts.iter().any(|p| self.is_country(p));
        let has_state = parts.iter().any(|p| is_state(p));

        let mut queries = vec![address.to_string()];

        if !has_country {
            push_unique(&mut queries, format!("{}, {}", address, self.country_suffix));
        }

        if !has_state && !has_country && parts.len() >= 2 {
            let collapsed = format!(
                "{}, {}, {}",
                parts[0],
                parts[parts.len() - 1],
                self.country_suffix
            );
            push_unique(&mut queries, collapsed);
        }

        queries
    }

    fn is_country(&self, part: &str) -> bool {
        part.eq_ignore_ascii_case(&self.country_suffix)
            || COUNTRY_TOKENS.iter().any(|t| part.eq_ignore_ascii_case(t))
    }
}

/// Convenience wrapper using the default `USA` suffix
pub fn build_queries(address: &str) -> Vec<String> {
    FallbackQueryBuilder::default().build(address)
}

/// Whether a comma part names a state, optionally followed by a ZIP code
/// (`IL`, `illinois`, `IL 62701`, `New York 10001-1234`)
fn is_state(part: &str) -> bool {
    let candidate = strip_trailing_zip(part);
    US_STATES.iter().any(|(abbr, name)| {
        candidate.eq_ignore_ascii_case(abbr) || candidate.eq_ignore_ascii_case(name)
    })
}

fn strip_trailing_zip(part: &str) -> &str {
    match part.rsplit_once(char::is_whitespace) {
        Some((head, tail)) if looks_like_zip(tail) => head.trim_end(),
        _ => part,
    }
}

fn looks_like_zip(token: &str) -> bool {
    let mut pieces = token.splitn(2, '-');
    let base = pieces.next().unwrap_or_default();
    let base_ok = base.len() == 5 && base.bytes().all(|b| b.is_ascii_digit());
    match pieces.next() {
        None => base_ok,
        Some(ext) => base_ok && ext.len() == 4 && ext.bytes().all(|b| b.is_ascii_digit()),
    }
}

fn push_unique(queries: &mut Vec<String>, candidate: String) {
    if !queries.contains(&candidate) {
        queries.push(candidate);
    }
}
