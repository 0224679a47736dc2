//! # Station Series
//!
//! Time-indexed table of a station's parameters, backed by a polars
//! [`DataFrame`]. The `time` column holds milliseconds since the Unix epoch
//! (unique, ascending); every other column is a nullable `f64` parameter.

use chrono::{DateTime, Datelike, NaiveDateTime};
use polars::prelude::*;
use std::collections::{BTreeSet, HashMap};

/// Name of the time index column.
pub const TIME_COLUMN: &str = "time";

pub fn to_millis(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

pub fn from_millis(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// How invalid observations are recognised.
///
/// NaN is always missing. The sentinel (999.9 in the station files) is
/// optional so that datasets where it is a real value can switch it off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissingValuePolicy {
    pub sentinel: Option<f64>,
}

impl MissingValuePolicy {
    /// Sentinels stored as `f32` come back as e.g. 999.900024.
    const TOLERANCE: f64 = 1e-3;

    pub fn new(sentinel: Option<f64>) -> Self {
        Self { sentinel }
    }

    pub fn is_sentinel(&self, value: f64) -> bool {
        self.sentinel
            .is_some_and(|s| (value - s).abs() < Self::TOLERANCE)
    }

    pub fn normalize(&self, value: f64) -> Option<f64> {
        if value.is_nan() || self.is_sentinel(value) {
            None
        } else {
            Some(value)
        }
    }
}

impl Default for MissingValuePolicy {
    fn default() -> Self {
        Self::new(Some(999.9))
    }
}

/// The decoded time series of one station.
#[derive(Debug, Clone)]
pub struct StationSeries {
    frame: DataFrame,
}

impl Default for StationSeries {
    fn default() -> Self {
        Self::empty()
    }
}

impl StationSeries {
    pub fn empty() -> Self {
        Self {
            frame: DataFrame::empty(),
        }
    }

    /// Builds a series from a strictly ascending time index and parameter columns.
    ///
    /// # Errors
    ///
    /// Fails if the timestamps are not strictly ascending, a column length
    /// differs from the index length, or two columns share a name.
    pub fn from_columns(
        times: &[NaiveDateTime],
        columns: Vec<(String, Vec<Option<f64>>)>,
    ) -> PolarsResult<Self> {
        if !times.windows(2).all(|w| w[0] < w[1]) {
            return Err(PolarsError::ComputeError(
                "time index must be unique and ascending".into(),
            ));
        }

        let millis: Vec<i64> = times.iter().map(|t| to_millis(*t)).collect();
        let mut frame_columns: Vec<Column> = Vec::with_capacity(columns.len() + 1);
        frame_columns.push(Series::new(TIME_COLUMN.into(), millis).into());
        for (name, values) in columns {
            if values.len() != times.len() {
                return Err(PolarsError::ShapeMismatch(
                    format!(
                        "column '{}' has {} values for {} timestamps",
                        name,
                        values.len(),
                        times.len()
                    )
                    .into(),
                ));
            }
            frame_columns.push(Series::new(name.as_str().into(), values).into());
        }

        Ok(Self {
            frame: DataFrame::new(frame_columns)?,
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn time_millis(&self) -> Vec<i64> {
        let Ok(column) = self.frame.column(TIME_COLUMN) else {
            return Vec::new();
        };
        match column.as_materialized_series().i64() {
            Ok(ca) => ca.into_iter().flatten().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.time_millis()
            .into_iter()
            .filter_map(from_millis)
            .collect()
    }

    pub fn first(&self) -> Option<NaiveDateTime> {
        self.timestamps().first().copied()
    }

    pub fn last(&self) -> Option<NaiveDateTime> {
        self.timestamps().last().copied()
    }

    /// Parameter column names, in table order.
    pub fn parameters(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != TIME_COLUMN)
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_parameter(&self, parameter: &str) -> bool {
        parameter != TIME_COLUMN && self.frame.column(parameter).is_ok()
    }

    /// Values of one parameter, `None` where missing.
    pub fn values(&self, parameter: &str) -> Option<Vec<Option<f64>>> {
        if !self.has_parameter(parameter) {
            return None;
        }
        let column = self.frame.column(parameter).ok()?;
        let values = column.as_materialized_series().f64().ok()?;
        Some(values.into_iter().collect())
    }

    /// `(timestamp, value)` pairs of one parameter.
    pub fn rows(&self, parameter: &str) -> Vec<(NaiveDateTime, Option<f64>)> {
        match self.values(parameter) {
            Some(values) => self.timestamps().into_iter().zip(values).collect(),
            None => Vec::new(),
        }
    }

    pub fn value_at(&self, parameter: &str, ts: NaiveDateTime) -> Option<f64> {
        let idx = self.timestamps().binary_search(&ts).ok()?;
        self.values(parameter)?.get(idx).copied().flatten()
    }

    /// Sorted distinct years of the time index.
    pub fn years(&self) -> Vec<String> {
        self.timestamps()
            .iter()
            .map(|ts| ts.year())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|y| y.to_string())
            .collect()
    }

    /// Rows whose timestamp falls in `year`.
    ///
    /// A year that is absent or not a number yields an empty slice with the
    /// same columns.
    pub fn year_slice(&self, year: &str) -> PolarsResult<StationSeries> {
        if self.frame.width() == 0 {
            return Ok(self.clone());
        }
        let Ok(year) = year.trim().parse::<i32>() else {
            return Ok(Self {
                frame: self.frame.head(Some(0)),
            });
        };

        let mask: BooleanChunked = self
            .time_millis()
            .into_iter()
            .map(|ms| from_millis(ms).is_some_and(|ts| ts.year() == year))
            .collect();
        Ok(Self {
            frame: self.frame.filter(&mask)?,
        })
    }

    /// Overwrites values of `parameter` at matching timestamps.
    ///
    /// Returns how many edits matched a timestamp of the series.
    ///
    /// # Errors
    ///
    /// Fails if the parameter is not a column of the series.
    pub fn apply_edits(
        &mut self,
        parameter: &str,
        edits: &[(NaiveDateTime, Option<f64>)],
    ) -> PolarsResult<usize> {
        let mut values = self.values(parameter).ok_or_else(|| {
            PolarsError::ColumnNotFound(format!("parameter '{}' not in series", parameter).into())
        })?;
        let index: HashMap<NaiveDateTime, usize> = self
            .timestamps()
            .into_iter()
            .enumerate()
            .map(|(i, ts)| (ts, i))
            .collect();

        let mut applied = 0;
        for (ts, value) in edits {
            if let Some(&i) = index.get(ts) {
                values[i] = *value;
                applied += 1;
            }
        }
        self.frame
            .with_column(Series::new(parameter.into(), values))?;
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn decades() -> StationSeries {
        let mut times = Vec::new();
        for year in 1990..=2020 {
            times.push(ts(year, 1, 1));
            times.push(ts(year, 7, 1));
        }
        let values: Vec<Option<f64>> = (0..times.len()).map(|i| Some(i as f64)).collect();
        StationSeries::from_columns(&times, vec![("T".to_string(), values)]).unwrap()
    }

    #[test]
    fn test_years_and_parameters() {
        let series = decades();
        let years = series.years();
        assert_eq!(years.len(), 31);
        assert_eq!(years.first().unwrap(), "1990");
        assert_eq!(years.last().unwrap(), "2020");
        assert_eq!(series.parameters(), vec!["T"]);
        assert_eq!(series.first(), Some(ts(1990, 1, 1)));
        assert_eq!(series.last(), Some(ts(2020, 7, 1)));
    }

    #[test]
    fn test_year_slice_selects_only_that_year() {
        let slice = decades().year_slice("1999").unwrap();
        assert_eq!(slice.len(), 2);
        assert!(slice.timestamps().iter().all(|t| t.year() == 1999));
        assert_eq!(slice.values("T").unwrap(), vec![Some(18.0), Some(19.0)]);
    }

    #[test]
    fn test_absent_year_is_empty_not_error() {
        let series = decades();
        assert!(series.year_slice("1850").unwrap().is_empty());
        assert!(series.year_slice("none").unwrap().is_empty());
        assert!(StationSeries::empty().year_slice("2000").unwrap().is_empty());
    }

    #[test]
    fn test_apply_edits_matches_timestamps() {
        let mut series = decades();
        let applied = series
            .apply_edits("T", &[(ts(2000, 7, 1), Some(-1.5)), (ts(2000, 3, 3), Some(9.0))])
            .unwrap();
        assert_eq!(applied, 1);
        assert_eq!(series.value_at("T", ts(2000, 7, 1)), Some(-1.5));
        assert!(series.apply_edits("missing", &[]).is_err());
    }

    #[test]
    fn test_from_columns_rejects_unsorted_index() {
        let times = vec![ts(2001, 1, 1), ts(2000, 1, 1)];
        let result = StationSeries::from_columns(&times, vec![("T".to_string(), vec![None, None])]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_columns_rejects_length_mismatch() {
        let times = vec![ts(2000, 1, 1)];
        let result = StationSeries::from_columns(&times, vec![("T".to_string(), vec![None, None])]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_value_policy() {
        let policy = MissingValuePolicy::default();
        assert_eq!(policy.normalize(999.9), None);
        assert_eq!(policy.normalize(999.9f32 as f64), None);
        assert_eq!(policy.normalize(f64::NAN), None);
        assert_eq!(policy.normalize(12.5), Some(12.5));

        let off = MissingValuePolicy::new(None);
        assert_eq!(off.normalize(999.9), Some(999.9));
    }

    #[test]
    fn test_empty_series() {
        let series = StationSeries::empty();
        assert!(series.is_empty());
        assert!(series.timestamps().is_empty());
        assert!(series.parameters().is_empty());
        assert!(series.values("T").is_none());
        assert!(series.years().is_empty());
    }
}
