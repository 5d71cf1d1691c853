//! Canonicalization of vehicle types and contributing factors.
//!
//! Free-text values are mapped onto a closed vocabulary; anything outside it
//! (and null) becomes the catch-all label.

use crate::utils::title_case;
use anyhow::Result;
use polars::prelude::*;

/// Catch-all vehicle type.
pub const UNDEFINED_VEHICLE: &str = "undefined";

/// Catch-all contributing factor.
pub const OTHER_FACTOR: &str = "Other";

/// Vehicle types kept verbatim (after trimming and lower-casing).
pub const VEHICLE_TYPES: [&str; 10] = [
    "sedan",
    "station wagon/sport utility vehicle",
    "taxi",
    "4 dr sedan",
    "pick-up truck",
    "box truck",
    "bus",
    "bike",
    "tractor truck diesel",
    "van",
];

/// Contributing factors kept, in their canonical spelling.
pub const CONTRIBUTING_FACTORS: [&str; 20] = [
    "Driver Inattention/Distraction",
    "Unspecified",
    "Following Too Closely",
    "Failure to Yield Right-of-Way",
    "Backing Unsafely",
    "Passing or Lane Usage Improper",
    "Passing Too Closely",
    "Unsafe Lane Changing",
    "Other Vehicular",
    "Turning Improperly",
    "Traffic Control Disregarded",
    "Unsafe Speed",
    "Driver Inexperience",
    "Reaction to Uninvolved Vehicle",
    "Alcohol Involvement",
    "Pavement Slippery",
    "View Obstructed/Limited",
    "Pedestrian/Bicyclist/Other Pedestrian Error/Confusion",
    "Oversized Vehicle",
    "Aggressive Driving/Road Rage",
];

pub fn canonical_vehicle_type(value: Option<&str>) -> &'static str {
    let Some(value) = value else {
        return UNDEFINED_VEHICLE;
    };
    let normalized = value.trim().to_lowercase();
    VEHICLE_TYPES
        .iter()
        .find(|label| **label == normalized)
        .copied()
        .unwrap_or(UNDEFINED_VEHICLE)
}

/// Canonical contributing factor.
///
/// The value is trimmed and title-cased, then kept only if the result is
/// spelled exactly like a vocabulary entry. Entries with lower-case words
/// ("Failure to Yield Right-of-Way", "Passing or Lane Usage Improper",
/// "Reaction to Uninvolved Vehicle") never survive title-casing, so those
/// factors always map to [`OTHER_FACTOR`].
pub fn canonical_contributing_factor(value: Option<&str>) -> &'static str {
    let Some(value) = value else {
        return OTHER_FACTOR;
    };
    let titled = title_case(value.trim());
    CONTRIBUTING_FACTORS
        .iter()
        .find(|label| **label == titled)
        .copied()
        .unwrap_or(OTHER_FACTOR)
}

/// Map every cell of `col_name` through `canonical`.
///
/// A missing column is left alone. Returns the table and the number of
/// cells that ended on the catch-all label.
pub(crate) fn canonicalize_column(
    df: DataFrame,
    col_name: &str,
    canonical: fn(Option<&str>) -> &'static str,
    catch_all: &str,
) -> Result<(DataFrame, usize)> {
    let mut df = df;
    if df.get_column_index(col_name).is_none() {
        return Ok((df, 0));
    }

    let series = df
        .column(col_name)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let values: Vec<&'static str> = series.str()?.into_iter().map(canonical).collect();
    let catch_all_count = values.iter().filter(|v| **v == catch_all).count();

    df.replace(col_name, Series::new(col_name.into(), values))?;
    Ok((df, catch_all_count))
}
