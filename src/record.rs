use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// Canonical name of the designer column.
pub const DESIGNER_NAME: &str = "Designer Name";
/// Canonical name of the team column.
pub const TEAM_NAME: &str = "Team Name";
/// Canonical name of the project start timestamp column.
pub const START_DATE: &str = "Start Date";
/// Canonical name of the project end timestamp column.
pub const END_DATE: &str = "End Date";
/// Canonical name of the booked hours column.
pub const ACTUAL_HOURS: &str = "Actual Hours";
/// Canonical name of the benchmark hours column.
pub const BENCHMARK_HOURS: &str = "Raised Benchmarking Hours";

// Every historical spelling of the well-known columns. Exact matches after trimming.
const HEADER_ALIASES: &[(&str, &str)] = &[
    ("designerName", DESIGNER_NAME),
    ("Designers", DESIGNER_NAME),
    ("teamName", TEAM_NAME),
    ("team", TEAM_NAME),
    ("Team", TEAM_NAME),
    ("startDate", START_DATE),
    ("Started Date & Time", START_DATE),
    ("endDate", END_DATE),
    ("Ended Date & Time", END_DATE),
    ("actualHours", ACTUAL_HOURS),
    ("Actual Avaliability Hrs", ACTUAL_HOURS),
    ("raisedBenchmarkingHours", BENCHMARK_HOURS),
    ("Raised BM Hrs", BENCHMARK_HOURS),
];

/// Maps a raw header cell to the name records are stored under.
///
/// Known aliases collapse onto the canonical human-readable spelling;
/// anything else is kept as written (minus surrounding whitespace and a
/// leading byte-order mark).
pub fn canonical_field_name(raw: &str) -> String {
    let trimmed = raw.trim_start_matches('\u{feff}').trim();
    HEADER_ALIASES
        .iter()
        .find(|(alias, _)| *alias == trimmed)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// A single cell value after coercion.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }

    /// Numeric view used by aggregations: numbers as-is, text parsed
    /// leniently, anything else counts as zero.
    pub fn numeric_or_zero(&self) -> f64 {
        match self {
            FieldValue::Number(n) => *n,
            FieldValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Number(n) => serializer.serialize_f64(*n),
            FieldValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// One data row: field name to value, in header order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field, replacing the value if the name is already present.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Text of a field, or the formatted number. Empty strings read as absent.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            FieldValue::Text(s) if s.trim().is_empty() => None,
            value => Some(value.to_string()),
        }
    }

    pub fn number_or_zero(&self, name: &str) -> f64 {
        self.get(name).map(FieldValue::numeric_or_zero).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
