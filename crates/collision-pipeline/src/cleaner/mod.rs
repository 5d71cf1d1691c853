//! Cleaner: normalized table to analysis-ready table.
//!
//! Cleaning is a fixed sequence of [`CleaningStep`]s over an in-memory
//! DataFrame:
//! 1. Drop columns not used downstream
//! 2. Turn `""` and `"None"` into null
//! 3. Coerce coordinates, casualty counts and categorical codes
//! 4. Parse crash dates and times; keep rows inside the date window
//! 5. Drop rows located at (0, 0)
//! 6. Canonicalize the vehicle type
//! 7. Canonicalize the contributing factor
//!
//! Steps 4 to 7 are idempotent: running them again on their own output
//! changes nothing.

mod categorical;
mod converters;
mod sanitizers;
mod temporal;

pub use categorical::{
    CONTRIBUTING_FACTORS, OTHER_FACTOR, UNDEFINED_VEHICLE, VEHICLE_TYPES,
    canonical_contributing_factor, canonical_vehicle_type,
};

use crate::config::{DateWindow, PipelineConfig};
use crate::context::RunContext;
use crate::error::{PipelineError, Result, ResultExt};
use crate::normalizer::write_parquet;
use crate::types::CleanReport;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use tracing::{debug, info};

/// Columns removed by [`CleaningStep::PruneColumns`].
pub const DROPPED_COLUMNS: [&str; 15] = [
    "vehicle_type_code_5",
    "contributing_factor_vehicle_5",
    "vehicle_type_code_4",
    "contributing_factor_vehicle_4",
    "vehicle_type_code_3",
    "contributing_factor_vehicle_3",
    "cross_street_name",
    "off_street_name",
    "zip_code",
    "borough",
    "on_street_name",
    "vehicle_type_code2",
    "contributing_factor_vehicle_2",
    "location",
    "collision_id",
];

pub const CRASH_DATE: &str = "crash_date";
pub const CRASH_TIME: &str = "crash_time";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const VEHICLE_TYPE: &str = "vehicle_type_code1";
pub const CONTRIBUTING_FACTOR: &str = "contributing_factor_vehicle_1";

/// Target type of every coerced column.
pub const COERCIONS: [(&str, DataType); 12] = [
    (LATITUDE, DataType::Float32),
    (LONGITUDE, DataType::Float32),
    ("number_of_persons_injured", DataType::Int64),
    ("number_of_persons_killed", DataType::Int64),
    ("number_of_pedestrians_injured", DataType::Int64),
    ("number_of_pedestrians_killed", DataType::Int64),
    ("number_of_cyclist_injured", DataType::Int64),
    ("number_of_cyclist_killed", DataType::Int64),
    ("number_of_motorist_injured", DataType::Int64),
    ("number_of_motorist_killed", DataType::Int64),
    (VEHICLE_TYPE, DataType::String),
    (CONTRIBUTING_FACTOR, DataType::String),
];

/// One transformation of the cleaner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningStep {
    PruneColumns,
    NormalizeMissing,
    CoerceTypes,
    FilterTemporal,
    FilterGeospatial,
    CanonicalizeVehicleType,
    CanonicalizeContributingFactor,
}

impl CleaningStep {
    /// Every step, in the order the cleaner applies them.
    pub const ALL: [CleaningStep; 7] = [
        Self::PruneColumns,
        Self::NormalizeMissing,
        Self::CoerceTypes,
        Self::FilterTemporal,
        Self::FilterGeospatial,
        Self::CanonicalizeVehicleType,
        Self::CanonicalizeContributingFactor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::PruneColumns => "prune_columns",
            Self::NormalizeMissing => "normalize_missing",
            Self::CoerceTypes => "coerce_types",
            Self::FilterTemporal => "filter_temporal",
            Self::FilterGeospatial => "filter_geospatial",
            Self::CanonicalizeVehicleType => "canonicalize_vehicle_type",
            Self::CanonicalizeContributingFactor => "canonicalize_contributing_factor",
        }
    }
}

/// Cleans normalized collision tables.
#[derive(Debug, Clone, Default)]
pub struct Cleaner {
    date_window: DateWindow,
}

impl Cleaner {
    pub fn new(date_window: DateWindow) -> Self {
        Self { date_window }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.date_window)
    }

    /// Clean the normalized table of `ctx` and write the cleaned table.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingInput`] if the normalized table does
    /// not exist, or an error if it cannot be read, cleaned or written.
    pub fn run(&self, ctx: &RunContext) -> Result<CleanReport> {
        let input = ctx.normalized_path();
        if !input.exists() {
            return Err(PipelineError::MissingInput(input));
        }

        info!("Loading normalized table from {}", input.display());
        let file = File::open(&input).context(format!("Opening {}", input.display()))?;
        let df = ParquetReader::new(file)
            .finish()
            .context(format!("Reading {}", input.display()))?;

        let (mut df, mut report) = self.clean(df)?;

        fs::create_dir_all(ctx.cleaned_dir())
            .context(format!("Creating {}", ctx.cleaned_dir().display()))?;
        let output_path = ctx.cleaned_path();
        write_parquet(&mut df, &output_path)?;
        info!("Cleaned table written to {}", output_path.display());

        report.output_path = Some(output_path);
        Ok(report)
    }

    /// Apply every step to `df`.
    pub fn clean(&self, df: DataFrame) -> Result<(DataFrame, CleanReport)> {
        self.apply_steps(df, &CleaningStep::ALL)
    }

    /// Apply `steps` to `df` in the given order.
    pub fn apply_steps(
        &self,
        df: DataFrame,
        steps: &[CleaningStep],
    ) -> Result<(DataFrame, CleanReport)> {
        let mut report = CleanReport {
            rows_before: df.height(),
            columns_before: df.width(),
            ..CleanReport::default()
        };

        let mut df = df;
        for step in steps {
            debug!("Cleaning step: {}", step.name());
            df = self
                .apply_step(df, *step, &mut report)
                .map_err(|e| PipelineError::Cleaning {
                    step: step.name(),
                    reason: format!("{e:#}"),
                })?;
        }

        report.rows_after = df.height();
        report.columns_after = df.width();

        info!(
            "Cleaning complete: {} -> {} rows, {} -> {} columns",
            report.rows_before, report.rows_after, report.columns_before, report.columns_after
        );

        Ok((df, report))
    }

    fn apply_step(
        &self,
        df: DataFrame,
        step: CleaningStep,
        report: &mut CleanReport,
    ) -> anyhow::Result<DataFrame> {
        match step {
            CleaningStep::PruneColumns => {
                let (df, dropped) = sanitizers::prune_columns(df, &DROPPED_COLUMNS);
                debug!("Dropped {} columns: {:?}", dropped.len(), dropped);
                report.dropped_columns.extend(dropped);
                Ok(df)
            }
            CleaningStep::NormalizeMissing => {
                let (df, replaced) = sanitizers::normalize_missing(df)?;
                report.missing_normalized += replaced;
                Ok(df)
            }
            CleaningStep::CoerceTypes => self.coerce_types(df, report),
            CleaningStep::FilterTemporal => self.filter_temporal(df, report),
            CleaningStep::FilterGeospatial => {
                let (df, removed) = sanitizers::filter_null_island(df, LATITUDE, LONGITUDE)?;
                if removed > 0 {
                    info!("Removed {} rows located at (0, 0)", removed);
                }
                report.rows_at_null_island += removed;
                Ok(df)
            }
            CleaningStep::CanonicalizeVehicleType => {
                let (df, undefined) = categorical::canonicalize_column(
                    df,
                    VEHICLE_TYPE,
                    canonical_vehicle_type,
                    UNDEFINED_VEHICLE,
                )?;
                debug!("{} vehicle types mapped to '{}'", undefined, UNDEFINED_VEHICLE);
                Ok(df)
            }
            CleaningStep::CanonicalizeContributingFactor => {
                let (df, other) = categorical::canonicalize_column(
                    df,
                    CONTRIBUTING_FACTOR,
                    canonical_contributing_factor,
                    OTHER_FACTOR,
                )?;
                debug!("{} contributing factors mapped to '{}'", other, OTHER_FACTOR);
                Ok(df)
            }
        }
    }

    fn coerce_types(&self, df: DataFrame, report: &mut CleanReport) -> anyhow::Result<DataFrame> {
        let mut df = df;
        for (col_name, target_dtype) in COERCIONS.iter() {
            if df.get_column_index(col_name).is_none() {
                continue;
            }

            let (converted, lost) =
                converters::coerce(df.column(col_name)?.as_materialized_series(), target_dtype)?;
            df.replace(col_name, converted)?;

            if lost > 0 {
                debug!(
                    "Column '{}': {} values could not be coerced to {}",
                    col_name, lost, target_dtype
                );
                *report.coerced_to_null.entry(col_name.to_string()).or_insert(0) += lost;
            }
        }
        Ok(df)
    }

    fn filter_temporal(&self, df: DataFrame, report: &mut CleanReport) -> anyhow::Result<DataFrame> {
        let mut df = df;

        if df.get_column_index(CRASH_DATE).is_some() {
            let (filtered, removed) =
                temporal::filter_date_window(df, CRASH_DATE, &self.date_window)?;
            if removed > 0 {
                info!(
                    "Removed {} rows outside {} ..= {}",
                    removed, self.date_window.start, self.date_window.end
                );
            }
            report.rows_outside_date_window += removed;
            df = filtered;
        } else {
            debug!("No '{}' column; date window not applied", CRASH_DATE);
        }

        if df.get_column_index(CRASH_TIME).is_some() {
            let (minutes, unparsed) =
                temporal::to_minutes_series(df.column(CRASH_TIME)?.as_materialized_series())?;
            df.replace(CRASH_TIME, minutes)?;
            if unparsed > 0 {
                debug!("{} crash times could not be parsed", unparsed);
            }
            report.unparsed_times += unparsed;
        }

        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::build_table;
    use crate::types::Record;
    use pretty_assertions::assert_eq;

    fn table(json: &str) -> DataFrame {
        let records: Vec<Record> = serde_json::from_str(json).unwrap();
        build_table(&records).unwrap().0
    }

    fn strings(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        df.column(name)
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    #[test]
    fn test_date_and_location_filters_remove_everything() {
        let df = table(
            r#"[{"crash_date":"2022-05-01","latitude":0,"longitude":0},
                {"crash_date":"2030-01-01","latitude":40.7,"longitude":-73.9}]"#,
        );

        let (df, report) = Cleaner::default().clean(df).unwrap();

        assert_eq!(df.height(), 0);
        assert_eq!(report.rows_outside_date_window, 1);
        assert_eq!(report.rows_at_null_island, 1);
        assert_eq!(report.rows_removed(), 2);
    }

    #[test]
    fn test_full_clean() {
        let df = table(
            r#"[
                {"crash_date":"2022-05-01T00:00:00.000","crash_time":"08:15","borough":"QUEENS",
                 "latitude":"40.7","longitude":"-73.9","number_of_persons_injured":"2",
                 "vehicle_type_code1":" SEDAN ","contributing_factor_vehicle_1":"UNSAFE SPEED",
                 "collision_id":"1"},
                {"crash_date":"2023-01-02T00:00:00.000","crash_time":"bad","borough":"",
                 "latitude":"None","longitude":"","number_of_persons_injured":"x",
                 "vehicle_type_code1":"spaceship","contributing_factor_vehicle_1":"",
                 "collision_id":"2"}
            ]"#,
        );

        let (df, report) = Cleaner::default().clean(df).unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(report.dropped_columns, vec!["borough", "collision_id"]);
        assert!(df.column("borough").is_err());
        assert_eq!(df.column(LATITUDE).unwrap().dtype(), &DataType::Float32);
        assert_eq!(df.column(CRASH_DATE).unwrap().dtype(), &DataType::Date);
        assert_eq!(report.coerced_to_null.get("number_of_persons_injured"), Some(&1));
        // "None" and two empty strings were normalized before coercion
        assert_eq!(report.missing_normalized, 3);

        let minutes: Vec<Option<i64>> = df
            .column(CRASH_TIME)
            .unwrap()
            .as_materialized_series()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(minutes, vec![Some(495), None]);
        assert_eq!(report.unparsed_times, 1);

        assert_eq!(
            strings(&df, VEHICLE_TYPE),
            vec![Some("sedan".to_string()), Some("undefined".to_string())]
        );
        assert_eq!(
            strings(&df, CONTRIBUTING_FACTOR),
            vec![Some("Unsafe Speed".to_string()), Some("Other".to_string())]
        );
    }

    #[test]
    fn test_late_steps_are_idempotent() {
        let df = table(
            r#"[
                {"crash_date":"2021-03-04","crash_time":"7:05","latitude":40.6,"longitude":-73.8,
                 "vehicle_type_code1":"Box Truck","contributing_factor_vehicle_1":"failure to yield right-of-way"},
                {"crash_date":"2024-12-31","crash_time":"23:59","latitude":0,"longitude":-73.8,
                 "vehicle_type_code1":null,"contributing_factor_vehicle_1":"Alcohol Involvement"},
                {"crash_date":"2020-06-01","crash_time":"12:00","latitude":40.6,"longitude":-73.8,
                 "vehicle_type_code1":"bus","contributing_factor_vehicle_1":"Unspecified"}
            ]"#,
        );
        let cleaner = Cleaner::default();
        let late = &CleaningStep::ALL[3..];

        let (once, _) = cleaner.clean(df).unwrap();
        let (twice, report) = cleaner.apply_steps(once.clone(), late).unwrap();

        assert!(once.equals_missing(&twice));
        assert_eq!(report.rows_removed(), 0);
        assert_eq!(report.unparsed_times, 0);
        assert_eq!(
            strings(&once, CONTRIBUTING_FACTOR),
            vec![
                Some("Other".to_string()),
                Some("Alcohol Involvement".to_string())
            ]
        );
    }

    #[test]
    fn test_custom_date_window() {
        let df = table(r#"[{"crash_date":"2019-01-01"},{"crash_date":"2022-01-01"}]"#);
        let window = DateWindow {
            start: chrono::NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            end: chrono::NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
        };

        let (df, report) = Cleaner::new(window).clean(df).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(report.rows_outside_date_window, 1);
    }

    #[test]
    fn test_unreadable_date_column_names_the_step() {
        let df = df!["crash_date" => [true, false]].unwrap();
        let err = Cleaner::default().clean(df).unwrap_err();
        assert_eq!(err.error_code(), "CLEANING_FAILED");
        assert!(err.to_string().contains("filter_temporal"));
    }

    #[test]
    fn test_run_requires_normalized_table() {
        let temp = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder().data_dir(temp.path()).build().unwrap();
        let ctx = RunContext::from_config(&config);

        let err = Cleaner::from_config(&config).run(&ctx).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_INPUT");
    }
}
