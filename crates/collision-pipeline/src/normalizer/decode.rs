//! Discovery and decoding of raw batch files.

use crate::config::DataFormat;
use crate::types::Record;
use anyhow::{Context, Result, anyhow};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use serde_json::Value;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Batch files of `format` in `dir`, in window order.
///
/// A file qualifies when its name contains `batch` and ends with the
/// format's extension. A missing directory yields no files.
pub(crate) fn list_batch_files(dir: &Path, format: DataFormat) -> std::io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let suffix = format!(".{}", format.extension());
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.contains("batch") && name.ends_with(&suffix) {
            files.push(entry.path());
        }
    }
    files.sort_by_cached_key(|path| window_order(path));
    Ok(files)
}

/// Sort key of a batch file: name prefix, then the trailing window index
/// compared as a number, so `batch_99999` precedes `batch_100000`.
fn window_order(path: &Path) -> (String, u64, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let split = stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let index = stem[split..].parse().unwrap_or(0);
    let prefix = stem[..split].to_string();
    (prefix, index, stem)
}

/// Decode one raw batch file into records.
pub(crate) fn decode_file(path: &Path, format: DataFormat) -> Result<Vec<Record>> {
    match format {
        DataFormat::Json => decode_json(path),
        DataFormat::Csv => decode_csv(path),
    }
}

/// A JSON batch is an array of objects.
fn decode_json(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let value: Value = serde_json::from_reader(BufReader::new(file))?;

    let Value::Array(items) = value else {
        return Err(anyhow!("expected a JSON array of records"));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(anyhow!(
                "element {} is {}, expected an object",
                i,
                json_kind(&other)
            )),
        })
        .collect()
}

/// A CSV batch has a header row; every cell is read as text and empty cells
/// become null.
fn decode_csv(path: &Path) -> Result<Vec<Record>> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let height = df.height();
    let mut records: Vec<Record> = (0..height).map(|_| Record::new()).collect();

    for column in df.get_columns() {
        let series = column.as_materialized_series().cast(&DataType::String)?;
        let name = series.name().to_string();
        for (record, cell) in records.iter_mut().zip(series.str()?.into_iter()) {
            let value = match cell {
                Some(text) if !text.is_empty() => Value::String(text.to_string()),
                _ => Value::Null,
            };
            record.insert(name.clone(), value);
        }
    }

    Ok(records)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_list_batch_files_filters_and_sorts() {
        let temp = tempfile::tempdir().unwrap();
        for name in [
            "nyc_data_x_batch_00002.json",
            "nyc_data_x_batch_00000.json",
            "nyc_data_x_metadata.json",
            "nyc_data_x_batch_00001.csv",
            "notes.txt",
        ] {
            fs::write(temp.path().join(name), "[]").unwrap();
        }

        let files = list_batch_files(temp.path(), DataFormat::Json).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["nyc_data_x_batch_00000.json", "nyc_data_x_batch_00002.json"]
        );
    }

    #[test]
    fn test_window_index_ordering_past_five_digits() {
        let temp = tempfile::tempdir().unwrap();
        for name in [
            "nyc_data_x_batch_100000.json",
            "nyc_data_x_batch_99999.json",
            "nyc_data_x_batch_00010.json",
        ] {
            fs::write(temp.path().join(name), "[]").unwrap();
        }

        let files = list_batch_files(temp.path(), DataFormat::Json).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "nyc_data_x_batch_00010.json",
                "nyc_data_x_batch_99999.json",
                "nyc_data_x_batch_100000.json",
            ]
        );
    }

    #[test]
    fn test_missing_directory_has_no_files() {
        let temp = tempfile::tempdir().unwrap();
        let files = list_batch_files(&temp.path().join("absent"), DataFormat::Csv).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_decode_json_array() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("batch.json");
        fs::write(&path, r#"[{"a":1},{"b":"x","c":[1,2]}]"#).unwrap();

        let records = decode_file(&path, DataFormat::Json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["c"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_decode_json_rejects_non_objects() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("batch.json");
        fs::write(&path, r#"[{"a":1}, 5]"#).unwrap();
        assert!(decode_file(&path, DataFormat::Json).is_err());

        fs::write(&path, "not json").unwrap();
        assert!(decode_file(&path, DataFormat::Json).is_err());
    }

    #[test]
    fn test_decode_csv_reads_text() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("batch.csv");
        fs::write(&path, "crash_date,latitude,zip_code\n2022-05-01,40.7,\n2022-05-02,40.8,11201\n")
            .unwrap();

        let records = decode_file(&path, DataFormat::Csv).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["latitude"], Value::String("40.7".to_string()));
        assert_eq!(records[0]["zip_code"], Value::Null);
        assert_eq!(records[1]["zip_code"], Value::String("11201".to_string()));
    }
}
