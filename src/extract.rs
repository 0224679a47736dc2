//! # Series Extraction
//!
//! This module loads the NetCDF files of a resolved station into a single
//! [`StationSeries`].
//!
//! ## Key Components
//!
//! - [`SeriesSource`]: seam between the dashboard and the file system
//! - [`NetCdfSeriesLoader`]: reads and combines a station's files by time
//! - [`TimeUnits`]: CF `"<unit> since <reference>"` time coordinate codec
//! - [`SeriesLoad`]: typed outcome of a load (loaded, no data, failed)

use crate::input::{NetCdfConfig, ViewerConfig};
use crate::resolver::ResolvedStation;
use crate::series::{MissingValuePolicy, StationSeries};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use log::{debug, info, warn};
use netcdf::AttributeValue;
use polars::prelude::PolarsError;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or combining station files.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("NetCDF error in '{path}': {source}")]
    NetCdf {
        path: PathBuf,
        #[source]
        source: netcdf::Error,
    },

    #[error("'{path}' has no time variable '{name}'")]
    MissingTimeVariable { path: PathBuf, name: String },

    #[error("'{path}': cannot decode time units '{units}'")]
    TimeUnits { path: PathBuf, units: String },

    #[error("'{path}': time value {value} is outside the representable calendar")]
    InvalidTime { path: PathBuf, value: f64 },

    #[error("'{path}': variable '{variable}' has shape {shape:?}, expected a single location along time")]
    IncompatibleGrid {
        path: PathBuf,
        variable: String,
        shape: Vec<usize>,
    },

    #[error("'{path}': '{variable}' is {found}, other files of the station have {expected}")]
    LocationMismatch {
        path: PathBuf,
        variable: String,
        expected: f64,
        found: f64,
    },

    #[error("Failed to build series table: {0}")]
    Frame(#[from] PolarsError),
}

/// Outcome of loading a station's series.
#[derive(Debug)]
pub enum SeriesLoad {
    Loaded(StationSeries),
    /// Nothing to show: a file is missing or the files hold no observations
    NoData(String),
    Failed(LoadError),
}

/// Source of station series, implemented over NetCDF files.
pub trait SeriesSource {
    fn load(&self, station: &ResolvedStation) -> SeriesLoad;
}

/// Decoder for a CF time coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    /// Length of one unit in milliseconds
    pub unit_millis: f64,
    pub reference: NaiveDateTime,
}

impl TimeUnits {
    /// Parses units such as `days since 1990-01-01 00:00:00`.
    pub fn parse(units: &str) -> Option<Self> {
        let (unit, reference) = units.trim().split_once(" since ")?;
        let unit_millis = match unit.trim().to_lowercase().as_str() {
            "milliseconds" | "millisecond" | "msec" | "ms" => 1.0,
            "seconds" | "second" | "secs" | "sec" | "s" => 1_000.0,
            "minutes" | "minute" | "mins" | "min" => 60_000.0,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3_600_000.0,
            "days" | "day" | "d" => 86_400_000.0,
            _ => return None,
        };
        Some(Self {
            unit_millis,
            reference: parse_reference(reference)?,
        })
    }

    /// `None` for non-finite values and offsets past the calendar range.
    pub fn decode(&self, value: f64) -> Option<NaiveDateTime> {
        let millis = (value * self.unit_millis).round();
        if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
            return None;
        }
        let offset = TimeDelta::try_milliseconds(millis as i64)?;
        self.reference.checked_add_signed(offset)
    }

    pub fn encode(&self, ts: NaiveDateTime) -> f64 {
        (ts - self.reference).num_milliseconds() as f64 / self.unit_millis
    }
}

fn parse_reference(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    let raw = raw.strip_suffix("UTC").unwrap_or(raw).trim();
    let raw = raw.strip_suffix('Z').unwrap_or(raw);
    let raw = raw.strip_suffix("+00:00").unwrap_or(raw).trim();

    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub(crate) fn attribute_text(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Str(s) => Some(s),
        AttributeValue::Strs(mut s) if !s.is_empty() => Some(s.remove(0)),
        _ => None,
    }
}

pub(crate) fn attribute_number(var: &netcdf::Variable, name: &str) -> Option<f64> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(v as f64),
        AttributeValue::Int(v) => Some(v as f64),
        AttributeValue::Short(v) => Some(v as f64),
        AttributeValue::Longlong(v) => Some(v as f64),
        AttributeValue::Doubles(v) => v.first().copied(),
        AttributeValue::Floats(v) => v.first().map(|x| *x as f64),
        _ => None,
    }
}

/// How a variable's stored numbers map to physical values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Encoding {
    pub scale: f64,
    pub offset: f64,
    pub fill: Option<f64>,
}

impl Encoding {
    pub fn of(var: &netcdf::Variable) -> Self {
        Self {
            scale: attribute_number(var, "scale_factor").unwrap_or(1.0),
            offset: attribute_number(var, "add_offset").unwrap_or(0.0),
            fill: attribute_number(var, "_FillValue")
                .or_else(|| attribute_number(var, "missing_value")),
        }
    }

    pub fn decode(&self, raw: f64, missing: &MissingValuePolicy) -> Option<f64> {
        if self.fill.is_some_and(|fill| raw == fill || (raw - fill).abs() <= fill.abs() * 1e-7) {
            return None;
        }
        missing.normalize(raw * self.scale + self.offset)
    }

    /// Missing values are written as the fill value, else the sentinel, else NaN.
    pub fn encode(&self, value: Option<f64>, missing: &MissingValuePolicy) -> f64 {
        match value {
            Some(v) => (v - self.offset) / self.scale,
            None => self
                .fill
                .or_else(|| missing.sentinel.map(|s| (s - self.offset) / self.scale))
                .unwrap_or(f64::NAN),
        }
    }
}

/// Reads the decoded time axis of an open station file.
pub(crate) fn read_time_axis(
    file: &netcdf::File,
    path: &Path,
    time_variable: &str,
) -> Result<(TimeUnits, String, Vec<NaiveDateTime>), LoadError> {
    let var = file
        .variable(time_variable)
        .ok_or_else(|| LoadError::MissingTimeVariable {
            path: path.to_path_buf(),
            name: time_variable.to_string(),
        })?;
    let units_text = attribute_text(&var, "units").unwrap_or_default();
    let units = TimeUnits::parse(&units_text).ok_or_else(|| LoadError::TimeUnits {
        path: path.to_path_buf(),
        units: units_text.clone(),
    })?;
    let dimension = var
        .dimensions()
        .first()
        .map(|d| d.name())
        .unwrap_or_else(|| time_variable.to_string());
    let raw = var
        .get_values::<f64, _>(..)
        .map_err(|source| LoadError::NetCdf {
            path: path.to_path_buf(),
            source,
        })?;
    let times = raw
        .into_iter()
        .map(|value| {
            units.decode(value).ok_or_else(|| LoadError::InvalidTime {
                path: path.to_path_buf(),
                value,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((units, dimension, times))
}

/// One station file, decoded.
#[derive(Debug, Clone)]
pub(crate) struct FileSeries {
    pub path: PathBuf,
    pub times: Vec<NaiveDateTime>,
    pub columns: Vec<(String, Vec<Option<f64>>)>,
    /// First value of every dropped spatial variable present in the file
    pub location: Vec<(String, f64)>,
}

/// Loads station series from `data_path/<parent folder>/<filename>`.
#[derive(Debug, Clone)]
pub struct NetCdfSeriesLoader {
    data_path: PathBuf,
    layout: NetCdfConfig,
    missing: MissingValuePolicy,
}

impl NetCdfSeriesLoader {
    pub fn new(data_path: PathBuf, layout: NetCdfConfig, missing: MissingValuePolicy) -> Self {
        Self {
            data_path,
            layout,
            missing,
        }
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::new(
            config.dir.data_path.clone(),
            config.netcdf.clone(),
            MissingValuePolicy::new(config.settings.invalid_value),
        )
    }

    pub fn file_paths(&self, station: &ResolvedStation) -> Vec<PathBuf> {
        station.file_paths(&self.data_path)
    }

    pub(crate) fn read_file(&self, path: &Path) -> Result<FileSeries, LoadError> {
        debug!("Opening NetCDF file: {}", path.display());
        let netcdf_error = |source| LoadError::NetCdf {
            path: path.to_path_buf(),
            source,
        };
        let file = netcdf::open(path).map_err(netcdf_error)?;
        let (_, time_dimension, times) =
            read_time_axis(&file, path, &self.layout.time_variable)?;

        let mut columns = Vec::new();
        for var in file.variables() {
            let name = var.name();
            if name == self.layout.time_variable || self.layout.drop_variables.contains(&name) {
                continue;
            }
            let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
            if !var.dimensions().iter().any(|d| d.name() == time_dimension) {
                debug!("Skipping '{}': not along '{}'", name, time_dimension);
                continue;
            }
            // Only a singleton spatial extent lines up with the time axis.
            if shape.iter().product::<usize>() != times.len() {
                return Err(LoadError::IncompatibleGrid {
                    path: path.to_path_buf(),
                    variable: name,
                    shape,
                });
            }

            let encoding = Encoding::of(&var);
            let values = var
                .get_values::<f64, _>(..)
                .map_err(netcdf_error)?
                .into_iter()
                .map(|raw| encoding.decode(raw, &self.missing))
                .collect();
            columns.push((name, values));
        }

        let mut location = Vec::new();
        for name in &self.layout.drop_variables {
            if let Some(var) = file.variable(name) {
                let values = var.get_values::<f64, _>(..).map_err(netcdf_error)?;
                if let Some(first) = values.first() {
                    location.push((name.clone(), *first));
                }
            }
        }

        debug!(
            "Read {} timestamps and {} parameters from {}",
            times.len(),
            columns.len(),
            path.display()
        );
        Ok(FileSeries {
            path: path.to_path_buf(),
            times,
            columns,
            location,
        })
    }

    /// Reads every file of the station and combines them by time.
    ///
    /// # Errors
    ///
    /// Fails if a file cannot be read or the files disagree on location.
    pub fn load_series(&self, station: &ResolvedStation) -> Result<StationSeries, LoadError> {
        let parts = self
            .file_paths(station)
            .iter()
            .map(|path| self.read_file(path))
            .collect::<Result<Vec<_>, _>>()?;
        combine(parts)
    }
}

impl SeriesSource for NetCdfSeriesLoader {
    fn load(&self, station: &ResolvedStation) -> SeriesLoad {
        if let Some(missing) = self.file_paths(station).iter().find(|p| !p.exists()) {
            return SeriesLoad::NoData(format!("file not found: {}", missing.display()));
        }
        match self.load_series(station) {
            Ok(series) if series.is_empty() => {
                SeriesLoad::NoData(format!("station {} has no observations", station.number))
            }
            Ok(series) => {
                info!(
                    "Loaded station {}: {} rows, parameters {:?}",
                    station.number,
                    series.len(),
                    series.parameters()
                );
                SeriesLoad::Loaded(series)
            }
            Err(e) => SeriesLoad::Failed(e),
        }
    }
}

/// Combines decoded files along time.
///
/// Timestamps are the sorted union of all files; parameters keep the order
/// in which they first appear. Where two files cover the same timestamp the
/// first non-missing value wins.
pub(crate) fn combine(parts: Vec<FileSeries>) -> Result<StationSeries, LoadError> {
    if let Some(first) = parts.first() {
        for part in &parts[1..] {
            check_location(&first.location, part)?;
        }
    }

    let times: Vec<NaiveDateTime> = parts
        .iter()
        .flat_map(|p| p.times.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let row_of: HashMap<NaiveDateTime, usize> =
        times.iter().enumerate().map(|(i, t)| (*t, i)).collect();

    let mut columns: Vec<(String, Vec<Option<f64>>)> = Vec::new();
    let mut column_of: HashMap<String, usize> = HashMap::new();
    for part in parts {
        for (name, values) in part.columns {
            let idx = *column_of.entry(name.clone()).or_insert_with(|| {
                columns.push((name.clone(), vec![None; times.len()]));
                columns.len() - 1
            });
            let target = &mut columns[idx].1;
            for (ts, value) in part.times.iter().zip(values) {
                let row = row_of[ts];
                match (target[row], value) {
                    (None, v) => target[row] = v,
                    (Some(kept), Some(other)) if kept != other => warn!(
                        "{}: '{}' at {} is {} in another file, keeping it over {}",
                        part.path.display(),
                        name,
                        ts,
                        kept,
                        other
                    ),
                    _ => {}
                }
            }
        }
    }

    Ok(StationSeries::from_columns(&times, columns)?)
}

fn check_location(expected: &[(String, f64)], part: &FileSeries) -> Result<(), LoadError> {
    for (name, found) in &part.location {
        let Some((_, want)) = expected.iter().find(|(n, _)| n == name) else {
            continue;
        };
        if (want - found).abs() > 1e-6 {
            return Err(LoadError::LocationMismatch {
                path: part.path.clone(),
                variable: name.clone(),
                expected: *want,
                found: *found,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn part(path: &str, times: Vec<NaiveDateTime>, columns: Vec<(&str, Vec<Option<f64>>)>) -> FileSeries {
        FileSeries {
            path: PathBuf::from(path),
            times,
            columns: columns
                .into_iter()
                .map(|(n, v)| (n.to_string(), v))
                .collect(),
            location: vec![("lat".to_string(), 47.0), ("lon".to_string(), 11.0)],
        }
    }

    #[test]
    fn test_time_units_parse_and_decode() {
        let units = TimeUnits::parse("days since 1990-01-01 00:00:00").unwrap();
        assert_eq!(units.decode(0.0), Some(ts(1990, 1, 1, 0)));
        assert_eq!(units.decode(1.5), Some(ts(1990, 1, 2, 12)));
        assert_eq!(units.encode(ts(1990, 1, 2, 12)), 1.5);

        let hours = TimeUnits::parse("hours since 2015-01-01T00:00:00Z").unwrap();
        assert_eq!(hours.decode(25.0), Some(ts(2015, 1, 2, 1)));

        let seconds = TimeUnits::parse("seconds since 1970-01-01").unwrap();
        assert_eq!(seconds.decode(86400.0), Some(ts(1970, 1, 2, 0)));

        let minutes = TimeUnits::parse("minutes since 2000-01-01 00:00").unwrap();
        assert_eq!(minutes.encode(ts(2000, 1, 1, 2)), 120.0);
    }

    #[test]
    fn test_time_decode_out_of_range() {
        let units = TimeUnits::parse("days since 1990-01-01").unwrap();
        assert_eq!(units.decode(1e300), None);
        assert_eq!(units.decode(-1e300), None);
        assert_eq!(units.decode(f64::NAN), None);
        assert_eq!(units.decode(f64::INFINITY), None);
        // fits in i64 milliseconds but not in the calendar
        assert_eq!(units.decode(1e11), None);
    }

    #[test]
    fn test_time_units_rejects_unknown() {
        assert!(TimeUnits::parse("fortnights since 2000-01-01").is_none());
        assert!(TimeUnits::parse("days").is_none());
        assert!(TimeUnits::parse("days since yesterday").is_none());
    }

    #[test]
    fn test_encoding_decode_and_encode() {
        let policy = MissingValuePolicy::default();
        let packed = Encoding {
            scale: 0.1,
            offset: 10.0,
            fill: Some(-9999.0),
        };
        assert_eq!(packed.decode(-9999.0, &policy), None);
        assert!((packed.decode(25.0, &policy).unwrap() - 12.5).abs() < 1e-12);
        assert!((packed.encode(Some(12.5), &policy) - 25.0).abs() < 1e-9);
        assert_eq!(packed.encode(None, &policy), -9999.0);

        let plain = Encoding {
            scale: 1.0,
            offset: 0.0,
            fill: None,
        };
        assert_eq!(plain.decode(999.9, &policy), None);
        assert_eq!(plain.encode(None, &policy), 999.9);
        assert!(plain.encode(None, &MissingValuePolicy::new(None)).is_nan());
    }

    #[test]
    fn test_combine_disjoint_files_spans_union() {
        let a = part(
            "a.nc",
            vec![ts(2014, 1, 1, 0), ts(2014, 6, 1, 0)],
            vec![("T", vec![Some(1.0), Some(2.0)])],
        );
        let b = part(
            "b.nc",
            vec![ts(2015, 1, 1, 0), ts(2015, 6, 1, 0)],
            vec![("T", vec![Some(3.0), None])],
        );
        let series = combine(vec![b, a]).unwrap();
        assert_eq!(series.len(), 4);
        assert_eq!(series.years(), vec!["2014", "2015"]);
        assert_eq!(
            series.values("T").unwrap(),
            vec![Some(1.0), Some(2.0), Some(3.0), None]
        );
    }

    #[test]
    fn test_combine_overlapping_keeps_first_value() {
        let a = part(
            "a.nc",
            vec![ts(2015, 1, 1, 0), ts(2015, 1, 2, 0)],
            vec![("T", vec![Some(1.0), None])],
        );
        let b = part(
            "b.nc",
            vec![ts(2015, 1, 2, 0), ts(2015, 1, 3, 0)],
            vec![("T", vec![Some(5.0), Some(6.0)]), ("Q", vec![Some(0.1), Some(0.2)])],
        );
        let series = combine(vec![a, b]).unwrap();
        assert_eq!(series.parameters(), vec!["T", "Q"]);
        assert_eq!(series.values("T").unwrap(), vec![Some(1.0), Some(5.0), Some(6.0)]);
        assert_eq!(series.values("Q").unwrap(), vec![None, Some(0.1), Some(0.2)]);
    }

    #[test]
    fn test_combine_rejects_different_locations() {
        let a = part("a.nc", vec![ts(2015, 1, 1, 0)], vec![("T", vec![Some(1.0)])]);
        let mut b = part("b.nc", vec![ts(2016, 1, 1, 0)], vec![("T", vec![Some(1.0)])]);
        b.location[0].1 = 48.0;
        assert!(matches!(
            combine(vec![a, b]),
            Err(LoadError::LocationMismatch { .. })
        ));
    }
}
