//! Type conversion functions for data cleaning.
//!
//! All conversions are permissive: a value that cannot be converted becomes
//! null instead of failing the column.

use crate::utils::newly_null;
use anyhow::Result;
use polars::prelude::*;

/// Convert a string series to Float32 or Int64.
///
/// Values are trimmed before parsing. For Int64 a value written as an
/// integral float (`"3.0"`) is accepted; `"2.5"` is not.
pub(crate) fn string_to_numeric(series: &Series, target_dtype: &DataType) -> Result<Series> {
    let str_series = series.str()?;

    match target_dtype {
        DataType::Float32 => {
            let values: Vec<Option<f32>> = str_series
                .into_iter()
                .map(|opt| opt.and_then(parse_float).map(|f| f as f32))
                .collect();
            Ok(Series::new(series.name().clone(), values))
        }
        DataType::Int64 => {
            let values: Vec<Option<i64>> = str_series
                .into_iter()
                .map(|opt| opt.and_then(parse_integer))
                .collect();
            Ok(Series::new(series.name().clone(), values))
        }
        other => Ok(series.cast(other)?),
    }
}

fn parse_float(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn parse_integer(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(i);
    }
    // "3.0" comes through from sources that serialize counts as floats
    parse_float(trimmed)
        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
        .map(|f| f as i64)
}

/// Coerce `series` to `target_dtype`.
///
/// Returns the converted series and the number of values that were present
/// before and are null after the conversion.
pub(crate) fn coerce(series: &Series, target_dtype: &DataType) -> Result<(Series, usize)> {
    if series.dtype() == target_dtype {
        return Ok((series.clone(), 0));
    }

    let converted = if series.dtype() == &DataType::String && target_dtype != &DataType::String {
        string_to_numeric(series, target_dtype)?
    } else {
        // Non-strict cast: unrepresentable values become null.
        series.cast(target_dtype)?
    };

    let lost = newly_null(series, &converted);
    Ok((converted, lost))
}
