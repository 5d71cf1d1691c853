//! Crash date and crash time handling.

use crate::config::DateWindow;
use crate::utils::is_numeric_dtype;
use anyhow::{Result, bail};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;

/// Formats accepted for textual crash dates, tried in order.
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Days between 0001-01-01 (CE day 1) and the Unix epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

const MINUTES_PER_DAY: i64 = 24 * 60;

static CLOCK_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{1,2})$").expect("Invalid regex: HH:MM"));

/// Parse a textual crash date.
pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        })
}

/// Convert a crash date column into a Date column.
///
/// Text is parsed with [`parse_date`]; unparsable values become null.
/// Date columns are returned as-is and Datetime columns are truncated.
pub(crate) fn to_date_series(series: &Series) -> Result<Series> {
    match series.dtype() {
        DataType::Date => Ok(series.clone()),
        DataType::Datetime(_, _) => Ok(series.cast(&DataType::Date)?),
        DataType::String => {
            let days: Vec<Option<i32>> = series
                .str()?
                .into_iter()
                .map(|opt| opt.and_then(parse_date).map(days_since_epoch))
                .collect();
            Ok(Series::new(series.name().clone(), days).cast(&DataType::Date)?)
        }
        other => bail!("cannot read crash dates from a {} column", other),
    }
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE)
}

/// Replace `col_name` with its Date form and keep only rows inside `window`.
///
/// Rows with a null or unparsable date are dropped. Returns the table and
/// the number of rows dropped.
pub(crate) fn filter_date_window(
    df: DataFrame,
    col_name: &str,
    window: &DateWindow,
) -> Result<(DataFrame, usize)> {
    let mut df = df;
    let dates = to_date_series(df.column(col_name)?.as_materialized_series())?;

    let days = dates.cast(&DataType::Int32)?;
    let keep: Vec<bool> = days
        .i32()?
        .into_iter()
        .map(|opt| {
            opt.and_then(date_from_epoch_days)
                .is_some_and(|date| window.contains(date))
        })
        .collect();

    df.replace(col_name, dates)?;

    let before = df.height();
    let mask = BooleanChunked::new("mask".into(), &keep);
    let df = df.filter(&mask)?;
    let removed = before - df.height();

    Ok((df, removed))
}

/// Minutes since midnight of an `H:MM` or `HH:MM` clock time.
pub(crate) fn parse_clock_minutes(value: &str) -> Option<i64> {
    let caps = CLOCK_TIME.captures(value.trim())?;
    let hours: i64 = caps[1].parse().ok()?;
    let minutes: i64 = caps[2].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Convert a crash time column to minutes since midnight (Int64).
///
/// Numeric columns are taken to already hold minutes; values outside a day
/// become null. Returns the converted series and the number of present
/// values that could not be converted.
pub(crate) fn to_minutes_series(series: &Series) -> Result<(Series, usize)> {
    let converted = match series.dtype() {
        DataType::String => {
            let minutes: Vec<Option<i64>> = series
                .str()?
                .into_iter()
                .map(|opt| opt.and_then(parse_clock_minutes))
                .collect();
            Series::new(series.name().clone(), minutes)
        }
        dtype if is_numeric_dtype(dtype) => {
            let minutes: Vec<Option<i64>> = series
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|opt| opt.filter(|m| (0..MINUTES_PER_DAY).contains(m)))
                .collect();
            Series::new(series.name().clone(), minutes)
        }
        other => bail!("cannot read crash times from a {} column", other),
    };

    let unparsed = converted.null_count().saturating_sub(series.null_count());
    Ok((converted, unparsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2022-05-01"), Some(ymd(2022, 5, 1)));
        assert_eq!(parse_date("2022-05-01T00:00:00.000"), Some(ymd(2022, 5, 1)));
        assert_eq!(parse_date("2022-05-01T13:45:00"), Some(ymd(2022, 5, 1)));
        assert_eq!(parse_date("2022-05-01 13:45:00"), Some(ymd(2022, 5, 1)));
        assert_eq!(parse_date("05/01/2022"), Some(ymd(2022, 5, 1)));
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date("2022-13-01"), None);
    }

    #[test]
    fn test_epoch_conversion() {
        assert_eq!(days_since_epoch(ymd(1970, 1, 1)), 0);
        assert_eq!(date_from_epoch_days(19_000), Some(ymd(2022, 1, 8)));
    }

    #[test]
    fn test_filter_date_window() {
        let df = df![
            "crash_date" => [Some("2022-05-01"), Some("2030-01-01"), Some("garbage"), None, Some("12/31/2024")],
        ]
        .unwrap();

        let (df, removed) = filter_date_window(df, "crash_date", &DateWindow::default()).unwrap();

        assert_eq!(removed, 3);
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("crash_date").unwrap().dtype(), &DataType::Date);
    }

    #[test]
    fn test_filter_date_window_is_idempotent() {
        let df = df!["crash_date" => ["2021-01-01", "2020-12-31"]].unwrap();
        let window = DateWindow::default();

        let (once, _) = filter_date_window(df, "crash_date", &window).unwrap();
        let (twice, removed) = filter_date_window(once.clone(), "crash_date", &window).unwrap();

        assert_eq!(removed, 0);
        assert!(once.equals_missing(&twice));
    }

    #[test]
    fn test_parse_clock_minutes() {
        assert_eq!(parse_clock_minutes("08:15"), Some(495));
        assert_eq!(parse_clock_minutes("8:15"), Some(495));
        assert_eq!(parse_clock_minutes("0:00"), Some(0));
        assert_eq!(parse_clock_minutes("23:59"), Some(1439));
        assert_eq!(parse_clock_minutes("24:00"), None);
        assert_eq!(parse_clock_minutes("bad"), None);
        assert_eq!(parse_clock_minutes("08:15:00"), None);
    }

    #[test]
    fn test_minutes_series() {
        let series = Series::new("crash_time".into(), &[Some("08:15"), Some("bad"), None]);
        let (minutes, unparsed) = to_minutes_series(&series).unwrap();

        let values: Vec<Option<i64>> = minutes.i64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(495), None, None]);
        assert_eq!(unparsed, 1);

        // Already in minutes
        let (again, unparsed) = to_minutes_series(&minutes).unwrap();
        assert!(again.equals_missing(&minutes));
        assert_eq!(unparsed, 0);
    }
}
