//! Historical table loader
//!
//! Reads the delimited export of the historical database: a header row,
//! one timestamp column used as the index, and one numeric column per tag.
//!
//! ```text
//! Date,FUEL OIL CONTROL,COMBUSTION AIR CONTROL,FEED WATER TEMP,RESPONSE
//! 2022-01-25 00:00:00,41.2,63.0,118.4,201.7
//! ```
//!
//! Fields may be double-quoted, so a tag name can contain a comma and `""`
//! stands for a literal quote. Empty cells, `NaN` and any cell that is not a
//! number (a text column, a spreadsheet `#VALUE!`) load as NaN and are
//! counted; only rows with the wrong field count or a bad timestamp are
//! skipped.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::defaults::MAX_LOGGED_PARSE_ERRORS;
use crate::error::ConfigurationError;
use crate::types::TimestepRecord;

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Timestamp-indexed numeric table, rows in file order.
#[derive(Debug, Clone)]
pub struct HistoricalTable {
    source: String,
    timestamp_column: String,
    columns: Vec<String>,
    column_lookup: HashMap<String, usize>,
    timestamps: Vec<NaiveDateTime>,
    rows: Vec<Vec<f64>>,
    skipped_rows: usize,
    unparsed_cells: usize,
}

impl HistoricalTable {
    pub fn load(path: &Path, timestamp_column: &str) -> Result<Self, ConfigurationError> {
        let file = File::open(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(
            BufReader::new(file),
            &path.display().to_string(),
            timestamp_column,
        )
    }

    pub fn from_reader<R: BufRead>(
        reader: R,
        source: &str,
        timestamp_column: &str,
    ) -> Result<Self, ConfigurationError> {
        let fail = |message: String| ConfigurationError::History {
            path: PathBuf::from(source),
            message,
        };

        let mut lines = reader.lines();
        let header_line = lines
            .next()
            .ok_or_else(|| fail("empty file".to_string()))?
            .map_err(|e| fail(format!("failed to read header: {e}")))?;

        let header: Vec<String> = split_fields(&header_line)
            .iter()
            .map(|f| f.trim().to_string())
            .collect();
        let ts_pos = header
            .iter()
            .position(|c| c == timestamp_column)
            .ok_or_else(|| fail(format!("timestamp column '{timestamp_column}' not found")))?;

        let columns: Vec<String> = header
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != ts_pos)
            .map(|(_, c)| c.clone())
            .collect();
        let column_lookup: HashMap<String, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        if column_lookup.len() != columns.len() {
            return Err(fail("duplicate column names in header".to_string()));
        }

        let mut timestamps = Vec::new();
        let mut rows = Vec::new();
        let mut skipped = 0usize;
        let mut unparsed = 0usize;
        let mut line_num = 1usize;

        for line_result in lines {
            line_num += 1;
            let line = match line_result {
                Ok(l) => l,
                Err(e) => {
                    warn!(line = line_num, error = %e, "Error reading line");
                    skipped += 1;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match parse_row(&line, header.len(), ts_pos) {
                Ok(row) => {
                    if row.unparsed > 0 && unparsed == 0 {
                        warn!(line = line_num, "Non-numeric cells load as NaN");
                    }
                    unparsed += row.unparsed;
                    timestamps.push(row.timestamp);
                    rows.push(row.values);
                }
                Err(e) => {
                    if skipped < MAX_LOGGED_PARSE_ERRORS {
                        warn!(line = line_num, error = %e, "Skipping malformed row");
                    }
                    skipped += 1;
                }
            }
        }

        if rows.is_empty() {
            return Err(fail(format!("no valid rows ({skipped} skipped)")));
        }

        info!(
            source = %source,
            rows = rows.len(),
            columns = columns.len(),
            skipped,
            unparsed_cells = unparsed,
            "Historical table loaded"
        );

        Ok(Self {
            source: source.to_string(),
            timestamp_column: timestamp_column.to_string(),
            columns,
            column_lookup,
            timestamps,
            rows,
            skipped_rows: skipped,
            unparsed_cells: unparsed,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Name of the index column the table was loaded with.
    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    /// Value column names (timestamp column excluded), in file order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Non-empty cells that were not numbers and loaded as NaN.
    pub fn unparsed_cells(&self) -> usize {
        self.unparsed_cells
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_lookup.get(name).copied()
    }

    /// Min and max of the finite values of a column.
    pub fn observed_range(&self, name: &str) -> Option<(f64, f64)> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .map(|row| row[idx])
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Split every row by variable role.
    ///
    /// All requested controllable and context columns must exist; every
    /// missing name is reported at once. A missing response column is
    /// tolerated and reported as an absent response.
    pub fn records(
        &self,
        controllable: &[String],
        context: &[String],
        response_column: &str,
    ) -> Result<Vec<TimestepRecord>, ConfigurationError> {
        let missing: Vec<String> = controllable
            .iter()
            .chain(context)
            .filter(|name| self.column_index(name).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ConfigurationError::MissingColumns(missing));
        }

        let lookup = |names: &[String]| -> Vec<usize> {
            names.iter().filter_map(|n| self.column_index(n)).collect()
        };
        let ctrl_idx = lookup(controllable);
        let ctx_idx = lookup(context);
        let resp_idx = self.column_index(response_column);
        if resp_idx.is_none() {
            warn!(column = %response_column, "Response column not found, reporting without it");
        }

        Ok(self
            .timestamps
            .iter()
            .zip(&self.rows)
            .map(|(&timestamp, row)| TimestepRecord {
                timestamp,
                controllable: ctrl_idx.iter().map(|&i| row[i]).collect(),
                context: ctx_idx.iter().map(|&i| row[i]).collect(),
                response: resp_idx.map(|i| row[i]).filter(|v| v.is_finite()),
            })
            .collect())
    }
}

/// Split one delimited line, honouring double quotes. Inside quotes a
/// comma is data and `""` is a literal quote.
pub(crate) fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match (ch, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', _) => quoted = !quoted,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }
    fields.push(field);
    fields
}

struct ParsedRow {
    timestamp: NaiveDateTime,
    values: Vec<f64>,
    /// Cells that held something other than a number or a NaN marker
    unparsed: usize,
}

fn parse_row(line: &str, expected_fields: usize, ts_pos: usize) -> Result<ParsedRow, String> {
    let fields = split_fields(line);
    if fields.len() != expected_fields {
        return Err(format!(
            "expected {expected_fields} fields, found {}",
            fields.len()
        ));
    }

    let timestamp = parse_timestamp(fields[ts_pos].trim())?;
    let mut unparsed = 0;
    let values = fields
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != ts_pos)
        .map(|(_, raw)| {
            parse_value(raw).unwrap_or_else(|| {
                unparsed += 1;
                f64::NAN
            })
        })
        .collect();
    Ok(ParsedRow {
        timestamp,
        values,
        unparsed,
    })
}

/// `None` for a cell that is neither a number nor a NaN marker.
fn parse_value(raw: &str) -> Option<f64> {
    let cleaned = raw.trim();
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("nan") || cleaned.eq_ignore_ascii_case("null") {
        return Some(f64::NAN);
    }
    cleaned.parse::<f64>().ok()
}

/// Accepts the datetime layouts pandas writes, plus bare dates.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("invalid timestamp '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "Date,X,Y,CTX,RESPONSE\n\
                       2022-01-25 00:00:00,41.2,63.0,118.4,201.7\n\
                       2022-01-25 01:00:00,42.0,,119.0,NaN\n\
                       not-a-date,1,2,3,4\n\
                       2022-01-25 02:00:00,1,2,3\n\
                       \n\
                       2022-01-25T03:00:00,43.5,64.0,120.0,205.0\n";

    fn table() -> HistoricalTable {
        HistoricalTable::from_reader(CSV.as_bytes(), "inline", "Date").unwrap()
    }

    #[test]
    fn loads_valid_rows_and_counts_skipped() {
        let t = table();
        assert_eq!(t.len(), 3);
        assert_eq!(t.skipped_rows(), 2);
        assert_eq!(t.columns(), &["X", "Y", "CTX", "RESPONSE"]);
    }

    #[test]
    fn empty_cells_are_nan() {
        let t = table();
        let records = t
            .records(&["Y".to_string()], &[], "RESPONSE")
            .unwrap();
        assert!(records[1].controllable[0].is_nan());
        assert_eq!(records[1].response, None);
        assert_eq!(records[0].response, Some(201.7));
    }

    #[test]
    fn records_split_by_role() {
        let t = table();
        let records = t
            .records(&["Y".to_string(), "X".to_string()], &["CTX".to_string()], "RESPONSE")
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].controllable, vec![63.0, 41.2]);
        assert_eq!(records[0].context, vec![118.4]);
        assert_eq!(records[2].timestamp, parse_timestamp("2022-01-25 03:00:00").unwrap());
    }

    #[test]
    fn missing_columns_reported_together() {
        let t = table();
        let err = t
            .records(&["X".to_string(), "NOPE".to_string()], &["ALSO_NOPE".to_string()], "RESPONSE")
            .unwrap_err();
        match err {
            ConfigurationError::MissingColumns(cols) => {
                assert_eq!(cols, vec!["NOPE", "ALSO_NOPE"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_response_column_is_tolerated() {
        let t = table();
        let records = t.records(&["X".to_string()], &[], "STEAM").unwrap();
        assert!(records.iter().all(|r| r.response.is_none()));
    }

    #[test]
    fn missing_timestamp_column_fails() {
        let err = HistoricalTable::from_reader("Time,X\n2022-01-01,1\n".as_bytes(), "inline", "Date")
            .unwrap_err();
        assert!(err.to_string().contains("timestamp column 'Date' not found"));
    }

    #[test]
    fn no_valid_rows_fails() {
        assert!(HistoricalTable::from_reader("Date,X\nbad,1\n".as_bytes(), "inline", "Date").is_err());
    }

    #[test]
    fn observed_range_skips_nan() {
        let t = table();
        assert_eq!(t.observed_range("Y"), Some((63.0, 64.0)));
        assert_eq!(t.observed_range("NOPE"), None);
    }

    #[test]
    fn bare_dates_parse_as_midnight() {
        let ts = parse_timestamp("2022-04-01").unwrap();
        assert_eq!(ts.to_string(), "2022-04-01 00:00:00");
    }

    #[test]
    fn text_column_loads_as_nan_without_dropping_rows() {
        let csv = "Date,X,CTX,RESPONSE,SHIFT\n\
                   2022-01-25 00:00:00,1.0,2.0,3.0,A\n\
                   2022-01-25 01:00:00,1.5,2.5,3.5,B\n";
        let t = HistoricalTable::from_reader(csv.as_bytes(), "inline", "Date").unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.skipped_rows(), 0);
        assert_eq!(t.unparsed_cells(), 2);
        assert_eq!(t.observed_range("SHIFT"), None);
        assert_eq!(t.observed_range("X"), Some((1.0, 1.5)));
    }

    #[test]
    fn bad_cell_in_unused_column_keeps_its_timestamp() {
        let csv = "Date,X,NOTE\n\
                   2022-01-25 00:00:00,1,0\n\
                   2022-01-25 01:00:00,2,#VALUE!\n\
                   2022-01-25 02:00:00,3,0\n";
        let t = HistoricalTable::from_reader(csv.as_bytes(), "inline", "Date").unwrap();
        assert_eq!(t.len(), 3);
        let records = t.records(&["X".to_string()], &[], "RESPONSE").unwrap();
        assert_eq!(records[1].controllable, vec![2.0]);
    }

    #[test]
    fn quoted_header_keeps_embedded_comma() {
        let csv = "Date,\"FLOW, STEAM\",X\n\
                   2022-01-25 00:00:00,\"1,5\",2\n\
                   2022-01-25 01:00:00,3,4\n";
        let t = HistoricalTable::from_reader(csv.as_bytes(), "inline", "Date").unwrap();
        assert_eq!(t.columns(), &["FLOW, STEAM", "X"]);
        assert_eq!(t.len(), 2);
        // "1,5" is one text cell, not two fields
        assert_eq!(t.unparsed_cells(), 1);
        assert_eq!(t.observed_range("FLOW, STEAM"), Some((3.0, 3.0)));
    }

    #[test]
    fn fractional_seconds_parse() {
        let ts = parse_timestamp("2022-01-01 00:00:00.000").unwrap();
        assert_eq!(ts.to_string(), "2022-01-01 00:00:00");
        assert!(parse_timestamp("2022-01-01T06:30:15.250").is_ok());

        let csv = "Date,X\n2022-01-01 00:00:00.000,1\n";
        let t = HistoricalTable::from_reader(csv.as_bytes(), "inline", "Date").unwrap();
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn split_fields_unescapes_doubled_quotes() {
        assert_eq!(
            split_fields(r#"a,"b ""c"", d",,e"#),
            vec!["a", r#"b "c", d"#, "", "e"]
        );
    }
}
