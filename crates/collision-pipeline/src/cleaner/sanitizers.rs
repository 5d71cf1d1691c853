//! Column pruning, missing-value normalization and the (0, 0) location filter.

use crate::utils::column_names;
use anyhow::Result;
use polars::prelude::*;
use tracing::debug;

/// Text values treated as missing.
pub(crate) const MISSING_MARKERS: [&str; 2] = ["", "None"];

/// Drop every column of `names` that is present in `df`.
///
/// Returns the table and the names actually dropped.
pub(crate) fn prune_columns(df: DataFrame, names: &[&str]) -> (DataFrame, Vec<String>) {
    let present = column_names(&df);
    let dropped: Vec<String> = names
        .iter()
        .filter(|name| present.iter().any(|p| p == *name))
        .map(|name| name.to_string())
        .collect();

    if dropped.is_empty() {
        return (df, dropped);
    }

    let cols_ref: Vec<PlSmallStr> = dropped.iter().map(|s| s.as_str().into()).collect();
    (df.drop_many(cols_ref), dropped)
}

/// Replace missing markers with null in every text column.
///
/// Returns the table and the number of cells replaced.
pub(crate) fn normalize_missing(df: DataFrame) -> Result<(DataFrame, usize)> {
    let mut df = df;
    let mut replaced = 0usize;

    for col_name in column_names(&df) {
        let series = df.column(&col_name)?.as_materialized_series();
        if series.dtype() != &DataType::String {
            continue;
        }

        let str_series = series.str()?;
        let mut hits = 0usize;
        let values: Vec<Option<&str>> = str_series
            .into_iter()
            .map(|opt| match opt {
                Some(val) if MISSING_MARKERS.contains(&val) => {
                    hits += 1;
                    None
                }
                other => other,
            })
            .collect();

        if hits > 0 {
            let cleaned = Series::new(col_name.as_str().into(), values);
            df.replace(&col_name, cleaned)?;
            debug!("Column '{}': {} missing markers set to null", col_name, hits);
            replaced += hits;
        }
    }

    Ok((df, replaced))
}

/// Drop rows whose latitude and longitude are both present and both zero.
///
/// A table without either column is returned unchanged. Returns the table
/// and the number of rows dropped.
pub(crate) fn filter_null_island(
    df: DataFrame,
    lat_col: &str,
    lon_col: &str,
) -> Result<(DataFrame, usize)> {
    if df.get_column_index(lat_col).is_none() || df.get_column_index(lon_col).is_none() {
        debug!("Skipping location filter: '{}' or '{}' missing", lat_col, lon_col);
        return Ok((df, 0));
    }

    let lat = df.column(lat_col)?.as_materialized_series().cast(&DataType::Float64)?;
    let lon = df.column(lon_col)?.as_materialized_series().cast(&DataType::Float64)?;

    let keep: Vec<bool> = lat
        .f64()?
        .into_iter()
        .zip(lon.f64()?.into_iter())
        .map(|pair| !matches!(pair, (Some(a), Some(b)) if a == 0.0 && b == 0.0))
        .collect();

    let before = df.height();
    let mask = BooleanChunked::new("mask".into(), &keep);
    let df = df.filter(&mask)?;
    let removed = before - df.height();

    Ok((df, removed))
}
