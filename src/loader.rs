//! Sensor dataset loading.
//!
//! One newline-delimited JSON file per room; each line is a flat object of
//! arbitrary field names. Records are normalized onto the canonical schema,
//! timestamps coerced to naive datetimes, and all rooms concatenated into a
//! single table tagged by room.

use crate::error::{AgentError, Result};
use crate::normalizer::FieldNormalizer;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use polars::prelude::*;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use tracing::{info, warn};

lazy_static! {
    static ref ROOM_PATTERN: Regex = Regex::new(r"Room\s*\d+").unwrap();
}

pub struct DatasetLoader {
    normalizer: FieldNormalizer,
}

impl Default for DatasetLoader {
    fn default() -> Self {
        Self {
            normalizer: FieldNormalizer::default(),
        }
    }
}

impl DatasetLoader {
    pub fn new(normalizer: FieldNormalizer) -> Self {
        Self { normalizer }
    }

    /// Load every `.ndjson` file in `dir` as one room table.
    ///
    /// Files are visited in name order so the combined table has a stable
    /// row order. The room name is the `Room<number>` fragment of the
    /// filename, falling back to the file stem.
    pub fn load_all_rooms(&self, dir: &Path) -> Result<Vec<(String, DataFrame)>> {
        let mut files: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("ndjson"))
            .collect();
        files.sort();

        let mut rooms = Vec::new();
        for path in files {
            let room_name = derive_room_name(&path);
            let df = self.load_room_file(&path)?;
            let df = tag_room(df, &room_name)?;
            info!(
                "Loaded {} rows for {} from {}",
                df.height(),
                room_name,
                path.display()
            );
            rooms.push((room_name, df));
        }
        Ok(rooms)
    }

    /// Load all rooms and concatenate them positionally into one table.
    /// Columns are unioned across rooms with nulls filling the gaps.
    pub fn load_combined(&self, dir: &Path) -> Result<DataFrame> {
        let rooms = self.load_all_rooms(dir)?;
        if rooms.is_empty() {
            return Err(AgentError::DataLoad(format!(
                "No .ndjson files found in {}",
                dir.display()
            )));
        }
        concat_diagonal(rooms.into_iter().map(|(_, df)| df).collect())
    }

    fn load_room_file(&self, path: &Path) -> Result<DataFrame> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);

        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: Map<String, Value> = serde_json::from_str(&line)?;
            records.push(self.normalizer.normalize(&entry));
        }

        let df = records_to_dataframe(&records)?;
        clean_timestamps(df)
    }
}

/// Derive the room name from a file path.
pub fn derive_room_name(path: &Path) -> String {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    match ROOM_PATTERN.find(filename) {
        Some(m) => m.as_str().to_string(),
        None => path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string(),
    }
}

fn tag_room(mut df: DataFrame, room: &str) -> Result<DataFrame> {
    let tags = vec![room.to_string(); df.height()];
    df.with_column(Series::new("room", tags))?;
    Ok(df)
}

/// Assemble normalized JSON records into a DataFrame.
///
/// Columns appear in first-seen order. A column where every present value
/// is numeric becomes Float64, all-boolean becomes Boolean, anything else
/// is stringified.
fn records_to_dataframe(records: &[Map<String, Value>]) -> Result<DataFrame> {
    let mut order: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !order.contains(key) {
                order.push(key.clone());
            }
        }
    }

    let mut columns = Vec::with_capacity(order.len());
    for name in &order {
        let values: Vec<Option<&Value>> = records.iter().map(|r| r.get(name)).collect();
        columns.push(column_from_values(name, &values));
    }

    DataFrame::new(columns).map_err(AgentError::from)
}

fn column_from_values(name: &str, values: &[Option<&Value>]) -> Series {
    let present: Vec<&Value> = values.iter().flatten().copied().collect();

    if !present.is_empty() && present.iter().all(|v| v.is_number()) {
        let vals: Vec<Option<f64>> = values
            .iter()
            .map(|v| v.and_then(|v| v.as_f64()))
            .collect();
        return Series::new(name, vals);
    }
    if !present.is_empty() && present.iter().all(|v| v.is_boolean()) {
        let vals: Vec<Option<bool>> = values
            .iter()
            .map(|v| v.and_then(|v| v.as_bool()))
            .collect();
        return Series::new(name, vals);
    }

    let vals: Vec<Option<String>> = values
        .iter()
        .map(|v| {
            v.map(|v| match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
        })
        .collect();
    Series::new(name, vals)
}

/// Coerce the `timestamp` column to naive millisecond datetimes. String
/// columns are parsed; numeric columns are treated as epoch values.
///
/// Offsets are stripped, not shifted: "2025-07-10T08:00:00+05:30" keeps the
/// 08:00 wall clock. Unparseable entries become null with a warning; a
/// table whose timestamps are already datetimes passes through unchanged.
pub fn clean_timestamps(mut df: DataFrame) -> Result<DataFrame> {
    let series = match df.column("timestamp") {
        Ok(s) => s,
        Err(_) => return Ok(df),
    };
    if matches!(series.dtype(), DataType::Datetime(_, _)) {
        return Ok(df);
    }
    if series.dtype().is_numeric() {
        let millis = epoch_to_millis(series)?;
        let parsed = Series::new("timestamp", millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
        df.with_column(parsed)?;
        return Ok(df);
    }
    let strings = match series.str() {
        Ok(ca) => ca,
        Err(_) => {
            warn!(
                "Timestamp column has unsupported dtype {:?}; left as-is",
                series.dtype()
            );
            return Ok(df);
        }
    };

    let millis: Vec<Option<i64>> = strings
        .into_iter()
        .map(|opt| {
            opt.and_then(|raw| match parse_naive_datetime(raw) {
                Some(ndt) => Some(ndt.and_utc().timestamp_millis()),
                None => {
                    warn!("Unparseable timestamp kept as null: {:?}", raw);
                    None
                }
            })
        })
        .collect();

    let parsed = Series::new("timestamp", millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    df.with_column(parsed)?;
    Ok(df)
}

/// Interpret a numeric timestamp column as epoch values. Magnitude decides
/// the unit: values at or above 1e12 are milliseconds, below are seconds.
fn epoch_to_millis(series: &Series) -> Result<Vec<Option<i64>>> {
    let values = series.cast(&DataType::Float64)?;
    Ok(values
        .f64()?
        .into_iter()
        .map(|opt| {
            opt.map(|v| {
                if v.abs() >= 1e12 {
                    v as i64
                } else {
                    (v * 1000.0) as i64
                }
            })
        })
        .collect())
}

/// Best-effort datetime parsing across the formats room loggers emit.
fn parse_naive_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    // Offset-carrying forms: keep the wall clock, drop the offset.
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.naive_local());
        }
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
        "%d/%m/%Y %H:%M:%S",
    ] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ndt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    None
}

/// Vertically concatenate frames whose column sets may differ.
/// The result carries the column union; gaps are null-filled.
fn concat_diagonal(frames: Vec<DataFrame>) -> Result<DataFrame> {
    let mut order: Vec<String> = Vec::new();
    let mut dtypes: HashMap<String, DataType> = HashMap::new();
    for df in &frames {
        for (name, dtype) in df.get_column_names().iter().zip(df.dtypes()) {
            if !dtypes.contains_key(*name) {
                order.push(name.to_string());
                dtypes.insert(name.to_string(), dtype);
            }
        }
    }

    let mut combined: Option<DataFrame> = None;
    for mut df in frames {
        for name in &order {
            if df.column(name).is_err() {
                df.with_column(Series::full_null(name, df.height(), &dtypes[name]))?;
            }
        }
        let df = df.select(order.iter().map(|s| s.as_str()))?;
        combined = Some(match combined {
            None => df,
            Some(acc) => acc.vstack(&df)?,
        });
    }
    combined.ok_or_else(|| AgentError::DataLoad("No room tables to combine".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_ndjson(dir: &Path, name: &str, lines: &[&str]) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
    }

    #[test]
    fn test_room_name_from_filename() {
        assert_eq!(derive_room_name(Path::new("Room 1.ndjson")), "Room 1");
        assert_eq!(
            derive_room_name(Path::new("sensors_Room12_export.ndjson")),
            "Room12"
        );
        assert_eq!(derive_room_name(Path::new("lobby.ndjson")), "lobby");
    }

    #[test]
    fn test_disjoint_columns_union_with_nulls() {
        let dir = tempfile::tempdir().unwrap();
        write_ndjson(
            dir.path(),
            "Room 1.ndjson",
            &[r#"{"co2": 400, "timestamp": "2025-07-10T10:00:00"}"#],
        );
        write_ndjson(
            dir.path(),
            "Room 2.ndjson",
            &[r#"{"temp": 21.5, "timestamp": "2025-07-10T10:00:00"}"#],
        );

        let loader = DatasetLoader::default();
        let df = loader.load_combined(dir.path()).unwrap();

        let mut cols: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        cols.sort();
        assert_eq!(cols, vec!["co2", "room", "temperature", "timestamp"]);
        assert_eq!(df.height(), 2);

        // Room 2's row has no co2 reading
        assert_eq!(df.column("co2").unwrap().null_count(), 1);
        assert_eq!(df.column("temperature").unwrap().null_count(), 1);

        let rooms = df.column("room").unwrap();
        assert_eq!(rooms.str().unwrap().get(0), Some("Room 1"));
        assert_eq!(rooms.str().unwrap().get(1), Some("Room 2"));
    }

    #[test]
    fn test_bad_timestamp_becomes_null_not_error() {
        let dir = tempfile::tempdir().unwrap();
        write_ndjson(
            dir.path(),
            "Room 1.ndjson",
            &[
                r#"{"co2": 400, "timestamp": "2025-07-10T10:00:00"}"#,
                r#"{"co2": 410, "timestamp": "not a date"}"#,
            ],
        );

        let loader = DatasetLoader::default();
        let df = loader.load_combined(dir.path()).unwrap();
        let ts = df.column("timestamp").unwrap();
        assert!(matches!(ts.dtype(), DataType::Datetime(_, _)));
        assert_eq!(ts.null_count(), 1);
    }

    #[test]
    fn test_epoch_timestamps_become_datetimes() {
        let dir = tempfile::tempdir().unwrap();
        // 1752048000 = 2025-07-10T08:00:00Z, logged as epoch seconds
        write_ndjson(
            dir.path(),
            "Room 1.ndjson",
            &[
                r#"{"co2": 400, "timestamp": 1752048000}"#,
                r#"{"co2": 410, "timestamp": 1752051600}"#,
            ],
        );

        let loader = DatasetLoader::default();
        let df = loader.load_combined(dir.path()).unwrap();
        let ts = df.column("timestamp").unwrap();
        assert!(matches!(ts.dtype(), DataType::Datetime(_, _)));

        let millis: Vec<i64> = ts
            .cast(&DataType::Int64)
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(millis, vec![1_752_048_000_000, 1_752_051_600_000]);
    }

    #[test]
    fn test_epoch_millis_detected_by_magnitude() {
        let df = df!["timestamp" => [1_752_134_400_000i64]].unwrap();
        let millis = epoch_to_millis(df.column("timestamp").unwrap()).unwrap();
        assert_eq!(millis, vec![Some(1_752_134_400_000)]);
    }

    #[test]
    fn test_timezone_offset_stripped_not_shifted() {
        let ndt = parse_naive_datetime("2025-07-10T08:00:00+05:30").unwrap();
        assert_eq!(ndt.to_string(), "2025-07-10 08:00:00");
    }

    #[test]
    fn test_clean_timestamps_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_ndjson(
            dir.path(),
            "Room 1.ndjson",
            &[r#"{"co2": 400, "timestamp": "2025-07-10T10:00:00"}"#],
        );
        let loader = DatasetLoader::default();
        let df = loader.load_combined(dir.path()).unwrap();
        let again = clean_timestamps(df.clone()).unwrap();
        assert!(df.equals_missing(&again));
    }
}
