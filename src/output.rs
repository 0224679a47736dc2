//! # Edit Writer
//!
//! Writes edited values of one parameter back to a station's NetCDF files.
//!
//! ## Modes
//!
//! - **armed**: the source file is replaced
//! - **unarmed**: a sibling copy named `<prefix><filename>` is written and the
//!   source file is only ever read
//!
//! Each file is copied into a temporary file in the target directory, updated
//! there and then renamed over the target, so a failed save leaves the target
//! as it was.

use crate::extract::{Encoding, LoadError, read_time_axis};
use crate::input::ViewerConfig;
use crate::resolver::ResolvedStation;
use crate::series::MissingValuePolicy;
use chrono::NaiveDateTime;
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("No file of station {station} holds parameter '{parameter}'")]
    ParameterNotFound { station: i64, parameter: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("NetCDF error in '{path}': {source}")]
    NetCdf {
        path: PathBuf,
        #[source]
        source: netcdf::Error,
    },

    #[error("'{path}' has no variable '{parameter}'")]
    MissingVariable { path: PathBuf, parameter: String },

    #[error("'{path}': parameter '{parameter}' has {values} values for {timestamps} timestamps")]
    Layout {
        path: PathBuf,
        parameter: String,
        values: usize,
        timestamps: usize,
    },

    #[error("Refusing to write '{path}' while unarmed: the prefix must name a sibling copy")]
    UnsafeTarget { path: PathBuf },

    #[error(transparent)]
    TimeAxis(#[from] LoadError),
}

/// Everything needed to persist one save.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub station: ResolvedStation,
    pub year: String,
    pub parameter: String,
    /// Every row of the parameter's column, with the user's edits applied
    pub rows: Vec<(NaiveDateTime, Option<f64>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveReport {
    pub written: Vec<PathBuf>,
    /// Number of stored values that changed across all files
    pub values: usize,
}

#[derive(Debug, Clone)]
pub struct EditWriter {
    data_path: PathBuf,
    armed: bool,
    unarmed_prefix: String,
    time_variable: String,
    missing: MissingValuePolicy,
}

impl EditWriter {
    pub fn new(
        data_path: PathBuf,
        armed: bool,
        unarmed_prefix: String,
        time_variable: String,
        missing: MissingValuePolicy,
    ) -> Self {
        Self {
            data_path,
            armed,
            unarmed_prefix,
            time_variable,
            missing,
        }
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::new(
            config.dir.data_path.clone(),
            config.settings.armed,
            config.settings.unarmed_prefix.clone(),
            config.netcdf.time_variable.clone(),
            MissingValuePolicy::new(config.settings.invalid_value),
        )
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Where a save of `source` lands.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ncstation::output::EditWriter;
    /// use ncstation::series::MissingValuePolicy;
    /// use std::path::{Path, PathBuf};
    ///
    /// let writer = EditWriter::new(
    ///     PathBuf::from("data"),
    ///     false,
    ///     "_new_".to_string(),
    ///     "time".to_string(),
    ///     MissingValuePolicy::default(),
    /// );
    /// assert_eq!(
    ///     writer.output_path(Path::new("data/T-nc/5_T.nc")),
    ///     PathBuf::from("data/T-nc/_new_5_T.nc")
    /// );
    /// ```
    pub fn output_path(&self, source: &Path) -> PathBuf {
        if self.armed {
            return source.to_path_buf();
        }
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        source.with_file_name(format!("{}{}", self.unarmed_prefix, filename))
    }

    /// Writes the request's rows into every file of the station that holds
    /// the parameter.
    ///
    /// Rows are matched to the file by timestamp. Slots whose stored value
    /// already decodes to the row's value are left untouched. The time
    /// coordinate is never rewritten, so its stored values survive exactly.
    ///
    /// # Errors
    ///
    /// Fails if no file holds the parameter, if an unarmed save would land
    /// outside a sibling copy, or if a file cannot be copied, updated or
    /// renamed into place.
    pub fn save(&self, request: &SaveRequest) -> Result<SaveReport, SaveError> {
        let rows: HashMap<NaiveDateTime, Option<f64>> = request.rows.iter().copied().collect();

        let mut report = SaveReport {
            written: Vec::new(),
            values: 0,
        };
        for source in request.station.file_paths(&self.data_path) {
            if !self.holds_parameter(&source, &request.parameter)? {
                debug!("'{}' has no '{}', skipping", source.display(), request.parameter);
                continue;
            }
            let (target, values) = self.write_file(&source, &request.parameter, &rows)?;
            info!(
                "Saved {} changed values of '{}' ({}) to {}",
                values,
                request.parameter,
                request.year,
                target.display()
            );
            report.written.push(target);
            report.values += values;
        }

        if report.written.is_empty() {
            return Err(SaveError::ParameterNotFound {
                station: request.station.number,
                parameter: request.parameter.clone(),
            });
        }
        Ok(report)
    }

    fn holds_parameter(&self, source: &Path, parameter: &str) -> Result<bool, SaveError> {
        let file = netcdf::open(source).map_err(|source_err| SaveError::NetCdf {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        Ok(file.variable(parameter).is_some())
    }

    fn write_file(
        &self,
        source: &Path,
        parameter: &str,
        rows: &HashMap<NaiveDateTime, Option<f64>>,
    ) -> Result<(PathBuf, usize), SaveError> {
        let target = self.output_path(source);
        if !self.armed && (target == source || target.parent() != source.parent()) {
            return Err(SaveError::UnsafeTarget { path: target });
        }
        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source| SaveError::Io { path, source }
        };

        let staged = tempfile::Builder::new()
            .prefix(".ncstation-")
            .suffix(".nc")
            .tempfile_in(dir)
            .map_err(io_error(dir))?;
        fs::copy(source, staged.path()).map_err(io_error(source))?;

        let written = {
            let netcdf_error = |source| SaveError::NetCdf {
                path: target.clone(),
                source,
            };
            let mut file = netcdf::append(staged.path()).map_err(netcdf_error)?;
            let (_, _, times) = read_time_axis(&file, source, &self.time_variable)?;

            let mut var = file.variable_mut(parameter).ok_or_else(|| {
                SaveError::MissingVariable {
                    path: source.to_path_buf(),
                    parameter: parameter.to_string(),
                }
            })?;
            let encoding = Encoding::of(&var);
            let mut raw = var.get_values::<f64, _>(..).map_err(netcdf_error)?;
            if raw.len() != times.len() {
                return Err(SaveError::Layout {
                    path: source.to_path_buf(),
                    parameter: parameter.to_string(),
                    values: raw.len(),
                    timestamps: times.len(),
                });
            }

            let mut written = 0;
            for (slot, ts) in raw.iter_mut().zip(&times) {
                let Some(value) = rows.get(ts) else {
                    continue;
                };
                if encoding.decode(*slot, &self.missing) == *value {
                    continue;
                }
                *slot = encoding.encode(*value, &self.missing);
                written += 1;
            }
            if written > 0 {
                var.put_values(&raw, ..).map_err(netcdf_error)?;
            }
            written
        };

        staged
            .persist(&target)
            .map_err(|e| SaveError::Io {
                path: target.clone(),
                source: e.error,
            })?;
        Ok((target, written))
    }
}
