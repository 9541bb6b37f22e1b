use crate::error::ParseError;
use crate::record::{FieldValue, Record, canonical_field_name};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::Read;

lazy_static! {
    // Optional sign, integer part without leading zeros (or a bare fraction),
    // optional fraction, optional exponent.
    static ref DECIMAL: Regex =
        Regex::new(r"^[+-]?(?:(?:0|[1-9][0-9]*)(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$")
            .expect("decimal grammar is a valid regex");
}

/// Records parsed from one pass over a delimited file.
///
/// `headers` holds the field names in column order after alias
/// normalization; every record carries exactly this field set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
}

/// Coerce a single cell
///
/// Cells whose trimmed text matches a strict decimal grammar and fits in a
/// finite `f64` become numbers. Everything else, including `Infinity`,
/// `NaN`, hex literals, thousands separators and zero-padded identifiers,
/// keeps its original (untrimmed) text.
///
/// # Examples
/// ```
/// use dashboard::parser::coerce_cell;
/// use dashboard::record::FieldValue;
///
/// assert_eq!(coerce_cell(" 120 "), FieldValue::Number(120.0));
/// assert_eq!(coerce_cell("007"), FieldValue::Text("007".to_string()));
/// ```
pub fn coerce_cell(raw: &str) -> FieldValue {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && DECIMAL.is_match(trimmed) {
        if let Ok(value) = trimmed.parse::<f64>() {
            if value.is_finite() {
                return FieldValue::Number(value);
            }
        }
    }
    FieldValue::Text(raw.to_string())
}

/// Parse delimited text into records
///
/// The first row is the header and defines the field names. Blank lines are
/// skipped. Rows shorter than the header are padded with empty text so every
/// record has the same field set; rows wider than the header are rejected.
///
/// # Arguments
/// * `source` - Anything readable holding comma-separated text
///
/// # Returns
/// * `Result<ParsedTable, ParseError>` - The header and records, or the reason
///   the input could not be parsed. Empty input yields an empty table.
pub fn parse_records<R: Read>(source: R) -> Result<ParsedTable, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let headers = derive_headers(reader.headers()?.iter());
    if headers.is_empty() {
        return Ok(ParsedTable::default());
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.len() > headers.len() {
            return Err(ParseError::RaggedRow {
                line: row.position().map(|p| p.line()).unwrap_or(0),
                expected: headers.len(),
                found: row.len(),
            });
        }

        let mut record = Record::new();
        for (idx, name) in headers.iter().enumerate() {
            let cell = row.get(idx).unwrap_or("");
            record.insert(name.clone(), coerce_cell(cell));
        }
        records.push(record);
    }

    Ok(ParsedTable { headers, records })
}

/// Parse an in-memory buffer. See [`parse_records`].
pub fn parse_bytes(bytes: &[u8]) -> Result<ParsedTable, ParseError> {
    parse_records(bytes)
}

// Canonical names for each header cell. A column whose canonical name is
// already taken keeps its own spelling, and if that is taken too it gets its
// 1-based column position appended, so no column is lost.
fn derive_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for (idx, cell) in raw.enumerate() {
        let canonical = canonical_field_name(cell);
        let name = if !headers.contains(&canonical) {
            canonical
        } else {
            let spelled = cell.trim_start_matches('\u{feff}').trim().to_string();
            if headers.contains(&spelled) {
                unique_name(&headers, &spelled, idx + 1)
            } else {
                spelled
            }
        };
        headers.push(name);
    }
    // A lone empty header cell is what an empty first line looks like.
    if headers.len() == 1 && headers[0].is_empty() {
        headers.clear();
    }
    headers
}

fn unique_name(taken: &[String], base: &str, position: usize) -> String {
    let mut candidate = format!("{base} ({position})");
    let mut n = position;
    while taken.contains(&candidate) {
        n += 1;
        candidate = format!("{base} ({n})");
    }
    candidate
}

/// Convert records back to CSV text
///
/// Writes `headers` as the first row and each record's values in the same
/// column order. Numbers use the shortest representation that parses back
/// to the same `f64`; text is quoted only where CSV requires it.
///
/// # Arguments
/// * `headers` - Column order to write
/// * `records` - Rows to write; missing fields are written as empty cells
///
/// # Returns
/// * `Result<String, ParseError>` - CSV content as a string or an error
pub fn to_csv(headers: &[String], records: &[Record]) -> Result<String, ParseError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(headers)?;
    for record in records {
        let row: Vec<String> = headers
            .iter()
            .map(|h| record.get(h).map(ToString::to_string).unwrap_or_default())
            .collect();
        writer.write_record(&row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ParseError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| ParseError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ACTUAL_HOURS, BENCHMARK_HOURS, DESIGNER_NAME, TEAM_NAME};

    #[test]
    fn parses_designer_row_with_numeric_hours() {
        let input = "Designer Name,Team Name,Actual Hours,Raised Benchmarking Hours\nAlice,Blue,120,100\n";
        let table = parse_bytes(input.as_bytes()).unwrap();

        assert_eq!(table.records.len(), 1);
        let record = &table.records[0];
        assert_eq!(record.get(DESIGNER_NAME), Some(&FieldValue::Text("Alice".into())));
        assert_eq!(record.get(TEAM_NAME), Some(&FieldValue::Text("Blue".into())));
        assert_eq!(record.get(ACTUAL_HOURS), Some(&FieldValue::Number(120.0)));
        assert_eq!(record.get(BENCHMARK_HOURS), Some(&FieldValue::Number(100.0)));
    }

    #[test]
    fn empty_input_is_an_empty_table() {
        assert_eq!(parse_bytes(b"").unwrap(), ParsedTable::default());
        let header_only = parse_bytes(b"a,b,c\n").unwrap();
        assert_eq!(header_only.headers, vec!["a", "b", "c"]);
        assert!(header_only.records.is_empty());
    }

    #[test]
    fn camel_case_headers_are_normalized() {
        let input = "designerName,teamName,actualHours,raisedBenchmarkingHours\nBob,Red,10,20\n";
        let table = parse_bytes(input.as_bytes()).unwrap();
        assert_eq!(
            table.headers,
            vec![DESIGNER_NAME, TEAM_NAME, ACTUAL_HOURS, BENCHMARK_HOURS]
        );
        assert_eq!(table.records[0].number_or_zero(BENCHMARK_HOURS), 20.0);
    }

    #[test]
    fn duplicate_alias_keeps_second_spelling() {
        let input = "Actual Hours,actualHours\n1,2\n";
        let table = parse_bytes(input.as_bytes()).unwrap();
        assert_eq!(table.headers, vec![ACTUAL_HOURS, "actualHours"]);
        assert_eq!(table.records[0].get("actualHours"), Some(&FieldValue::Number(2.0)));
    }

    #[test]
    fn canonical_then_alias_spelling_keeps_both_columns() {
        let table = parse_bytes(b"actualHours,Actual Hours\n1,2\n").unwrap();
        assert_eq!(table.headers, vec![ACTUAL_HOURS, "Actual Hours (2)"]);
        let record = &table.records[0];
        assert_eq!(record.len(), table.headers.len());
        assert_eq!(record.get(ACTUAL_HOURS), Some(&FieldValue::Number(1.0)));
        assert_eq!(record.get("Actual Hours (2)"), Some(&FieldValue::Number(2.0)));
    }

    #[test]
    fn repeated_header_names_stay_distinct() {
        let table = parse_bytes(b"a,a,a\nx,y,z\n").unwrap();
        assert_eq!(table.headers, vec!["a", "a (2)", "a (3)"]);
        let record = &table.records[0];
        assert_eq!(record.len(), 3);
        assert_eq!(record.text("a (3)").as_deref(), Some("z"));
    }

    #[test]
    fn coercion_is_per_cell_in_mixed_columns() {
        let input = "code\n42\nN/A\n 7.5 \n";
        let table = parse_bytes(input.as_bytes()).unwrap();
        let values: Vec<_> = table.records.iter().map(|r| r.get("code").cloned()).collect();
        assert_eq!(
            values,
            vec![
                Some(FieldValue::Number(42.0)),
                Some(FieldValue::Text("N/A".into())),
                Some(FieldValue::Number(7.5)),
            ]
        );
    }

    #[test]
    fn strict_numeric_grammar() {
        for numeric in ["0", "-3", "+4.25", "1.", ".5", "1e3", "2.5E-2", "0.0"] {
            assert!(
                matches!(coerce_cell(numeric), FieldValue::Number(_)),
                "{numeric} should be numeric"
            );
        }
        for text in ["", " ", "Infinity", "-Infinity", "NaN", "0x1F", "007", "1,000", "12abc", "1e999", "."] {
            assert_eq!(coerce_cell(text), FieldValue::Text(text.to_string()), "{text} should stay text");
        }
    }

    #[test]
    fn short_rows_are_padded_and_wide_rows_rejected() {
        let table = parse_bytes(b"a,b,c\n1,2\n").unwrap();
        assert_eq!(table.records[0].len(), 3);
        assert_eq!(table.records[0].get("c"), Some(&FieldValue::Text(String::new())));

        let err = parse_bytes(b"a,b\n1,2,3\n").unwrap_err();
        assert!(matches!(err, ParseError::RaggedRow { expected: 2, found: 3, .. }));
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let err = parse_bytes(b"a,b\n\xff\xfe,1\n").unwrap_err();
        assert!(matches!(err, ParseError::Csv(_)));
    }

    #[test]
    fn quoted_fields_and_blank_lines() {
        let input = "name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n\nDoe,ok\n";
        let table = parse_bytes(input.as_bytes()).unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].text("name").as_deref(), Some("Smith, J"));
        assert_eq!(table.records[0].text("note").as_deref(), Some("said \"hi\""));
    }

    #[test]
    fn reserializing_and_reparsing_is_stable() {
        let input = "Designer Name,Team Name,Actual Hours,Ratio,Notes\n\
                     Alice,Blue,120,0.1,\"a, b\"\n\
                     Bob,Red,1e3,-2.50,007\n";
        let first = parse_bytes(input.as_bytes()).unwrap();
        let written = to_csv(&first.headers, &first.records).unwrap();
        let second = parse_bytes(written.as_bytes()).unwrap();
        assert_eq!(first, second);
        assert!(written.contains("1000"));
    }
}
