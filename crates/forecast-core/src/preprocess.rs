//! Validation and normalization of raw historical data.
//!
//! Raw history arrives either as JSON-like records (`{"date": "YYYY-MM-DD",
//! "value": 123.4}`) or as a polars [`DataFrame`] with `date` and `value`
//! columns. Both are turned into a [`Series`] here; nothing downstream sees
//! unvalidated input.

use chrono::NaiveDate;
use polars::prelude::{DataFrame, DataType};
use serde_json::Value;

use crate::{
    error::{ForecastError, Result},
    types::{HistoricalPoint, MIN_SERIES_LEN, Series},
};

/// Strict calendar-date format accepted for the `date` field.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Returns true if `records` can be turned into a [`Series`].
///
/// Rejects empty or short input, records missing `date` or `value`, dates
/// that are not valid `YYYY-MM-DD` calendar dates, and non-numeric values.
/// The input is not modified.
#[must_use]
pub fn validate(records: &[Value]) -> bool {
    parse_records(records).is_ok()
}

/// Parses JSON-like records into a [`Series`].
pub fn parse_records(records: &[Value]) -> Result<Series> {
    if records.len() < MIN_SERIES_LEN {
        return Err(ForecastError::InvalidSeries(format!(
            "need at least {MIN_SERIES_LEN} points, got {}",
            records.len()
        )));
    }

    let points = records
        .iter()
        .enumerate()
        .map(|(i, record)| parse_record(i, record))
        .collect::<Result<Vec<_>>>()?;

    Series::new(points)
}

fn parse_record(index: usize, record: &Value) -> Result<HistoricalPoint> {
    let date = match record.get("date") {
        Some(Value::String(s)) => parse_date(s)
            .ok_or_else(|| invalid(index, format!("date {s:?} is not a YYYY-MM-DD date")))?,
        Some(other) => return Err(invalid(index, format!("date {other} is not a string"))),
        None => return Err(invalid(index, "missing date")),
    };

    let value = match record.get("value") {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| invalid(index, format!("value {n} is not representable")))?,
        Some(other) => return Err(invalid(index, format!("value {other} is not numeric"))),
        None => return Err(invalid(index, "missing value")),
    };

    Ok(HistoricalPoint::new(date, value))
}

/// Parses a strict `YYYY-MM-DD` date.
#[must_use]
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    // chrono accepts unpadded fields; insist on the canonical width.
    if s.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

/// Converts a DataFrame with `date` and `value` columns into a [`Series`].
///
/// The `date` column may be of `Date` or `String` dtype; the `value` column
/// must be numeric. Nulls are treated as missing fields.
pub fn parse_dataframe(df: &DataFrame) -> Result<Series> {
    let dates = df
        .column("date")
        .map_err(|e| ForecastError::InvalidSeries(format!("missing date column: {e}")))?;
    let values = df
        .column("value")
        .map_err(|e| ForecastError::InvalidSeries(format!("missing value column: {e}")))?;

    if !(values.dtype().is_integer() || values.dtype().is_float()) {
        return Err(ForecastError::InvalidSeries(format!(
            "value column has non-numeric dtype {}",
            values.dtype()
        )));
    }

    let dates = dates
        .cast(&DataType::String)
        .map_err(|e| ForecastError::InvalidSeries(e.to_string()))?;
    let values = values
        .cast(&DataType::Float64)
        .map_err(|e| ForecastError::InvalidSeries(e.to_string()))?;

    let dates = dates
        .str()
        .map_err(|e| ForecastError::InvalidSeries(e.to_string()))?;
    let values = values
        .f64()
        .map_err(|e| ForecastError::InvalidSeries(e.to_string()))?;

    let points = dates
        .into_iter()
        .zip(values)
        .enumerate()
        .map(|(i, (date, value))| {
            let date = date.ok_or_else(|| invalid(i, "missing date"))?;
            let date = parse_date(date)
                .ok_or_else(|| invalid(i, format!("date {date:?} is not a YYYY-MM-DD date")))?;
            let value = value.ok_or_else(|| invalid(i, "missing value"))?;
            Ok(HistoricalPoint::new(date, value))
        })
        .collect::<Result<Vec<_>>>()?;

    Series::new(points)
}

impl TryFrom<&DataFrame> for Series {
    type Error = ForecastError;

    fn try_from(df: &DataFrame) -> Result<Self> {
        parse_dataframe(df)
    }
}

fn invalid(index: usize, reason: impl std::fmt::Display) -> ForecastError {
    ForecastError::InvalidSeries(format!("record {index}: {reason}"))
}
