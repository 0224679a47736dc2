//! # Input Configuration Module
//!
//! This module provides configuration parsing and validation for the station
//! viewer. A configuration document has a `dir` section naming the station
//! manifest, the data directory and an optional correction manifest, and a
//! `settings` section holding the `armed` safety switch.
//!
//! ## Configuration Structure
//!
//! - **dir.list_path**: semicolon-delimited station manifest (required)
//! - **dir.data_path**: root directory of the per-station NetCDF folders (required)
//! - **dir.corr_path**: correction status manifest (optional)
//! - **settings.armed**: overwrite source files on save when true (default false)
//! - **settings.invalid_value**: sentinel treated as missing (default 999.9, `null` disables)
//! - **settings.unarmed_prefix**: filename prefix used while unarmed (default `_new_`)
//! - **netcdf**: time coordinate name and the spatial variables dropped on load
//! - **columns**: manifest column names
//! - **map**: initial map viewport
//!
//! ## Example Usage
//!
//! ```rust
//! use ncstation::input::ViewerConfig;
//!
//! let yaml = r#"
//! dir:
//!   list_path: stations.csv
//!   data_path: data
//! settings:
//!   armed: "False"
//! "#;
//! let config = ViewerConfig::from_yaml(yaml)?;
//! assert!(!config.settings.armed);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::projection::MapViewport;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or validating the configuration.
///
/// All of them are fatal: the viewer refuses to start without a usable
/// configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Required setting '{0}' is empty")]
    EmptySetting(&'static str),

    #[error("Path for '{key}' does not exist: {path}")]
    MissingPath { key: &'static str, path: PathBuf },

    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    #[error("Invalid INI configuration at line {line}: {message}")]
    Ini { line: usize, message: String },
}

/// Main configuration structure of the viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// File locations
    pub dir: DirConfig,
    /// Behaviour switches
    #[serde(default)]
    pub settings: Settings,
    /// NetCDF layout of the station files
    #[serde(default)]
    pub netcdf: NetCdfConfig,
    /// Column names of the station and correction manifests
    #[serde(default)]
    pub columns: ColumnMap,
    /// Initial map extent
    #[serde(default)]
    pub map: MapViewport,
}

/// The `dir` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirConfig {
    /// Station manifest
    pub list_path: PathBuf,
    /// Root of the `<parent folder>/<filename>` tree
    pub data_path: PathBuf,
    /// Optional correction status manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corr_path: Option<PathBuf>,
}

/// The `settings` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// When false, saves go to a prefixed copy and never touch the source file.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub armed: bool,
    /// Sentinel value normalised to missing on load.
    #[serde(default = "default_invalid_value")]
    pub invalid_value: Option<f64>,
    /// Filename prefix of the copies written while unarmed.
    #[serde(default = "default_unarmed_prefix")]
    pub unarmed_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            armed: false,
            invalid_value: default_invalid_value(),
            unarmed_prefix: default_unarmed_prefix(),
        }
    }
}

/// The `netcdf` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetCdfConfig {
    /// Name of the time coordinate variable
    #[serde(default = "default_time_variable")]
    pub time_variable: String,
    /// Spatial coordinate variables dropped after load
    #[serde(default = "default_drop_variables")]
    pub drop_variables: Vec<String>,
}

impl Default for NetCdfConfig {
    fn default() -> Self {
        Self {
            time_variable: default_time_variable(),
            drop_variables: default_drop_variables(),
        }
    }
}

/// Column names of the manifests.
///
/// The defaults match the manifest produced from the station file headers.
/// Latitude and longitude are labelled the other way round upstream, so the
/// latitude column defaults to `Geografische_Länge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub station_number: String,
    pub name: String,
    pub site: String,
    pub parameter: String,
    pub latitude: String,
    pub longitude: String,
    pub filename: String,
    pub parent_folder: String,
    pub correction_status: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            station_number: "Stationsnummer".to_string(),
            name: "Stationsname".to_string(),
            site: "Stationsmessort".to_string(),
            parameter: "Parametername".to_string(),
            latitude: "Geografische_Länge".to_string(),
            longitude: "Geografische_Breite".to_string(),
            filename: "Filename".to_string(),
            parent_folder: "Parent-Folder".to_string(),
            correction_status: "Status".to_string(),
        }
    }
}

fn default_invalid_value() -> Option<f64> {
    Some(999.9)
}

fn default_unarmed_prefix() -> String {
    "_new_".to_string()
}

fn default_time_variable() -> String {
    "time".to_string()
}

fn default_drop_variables() -> Vec<String> {
    vec!["lat".to_string(), "lon".to_string(), "height".to_string()]
}

/// Parses a boolean-like string such as `True`, `no`, `on` or `0`.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(n) => Err(serde::de::Error::custom(format!(
            "invalid boolean-like value: {}",
            n
        ))),
        Flag::Text(s) => parse_flag(&s).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid boolean-like value: '{}'", s))
        }),
    }
}

impl ViewerConfig {
    /// Loads a configuration file, choosing the parser from the extension.
    ///
    /// `.json` files are read as JSON, `.ini` and `.cfg` files as INI
    /// sections; everything else is read as YAML.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or a required key
    /// is missing.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "json" => Self::from_json(&content),
            "ini" | "cfg" => Self::from_ini(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Parses an INI document with `[dir]`, `[settings]` and the other
    /// sections as `key = value` lines.
    ///
    /// Values are read as YAML scalars, so `999.9`, `null` and flow lists
    /// such as `[lat, lon]` keep their types. `#` and `;` start comment lines.
    pub fn from_ini(ini: &str) -> Result<Self, ConfigError> {
        let mut root = serde_yaml::Mapping::new();
        let mut section: Option<String> = None;
        for (idx, raw) in ini.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim().to_string();
                if !root.contains_key(name.as_str()) {
                    root.insert(
                        serde_yaml::Value::String(name.clone()),
                        serde_yaml::Value::Mapping(serde_yaml::Mapping::new()),
                    );
                }
                section = Some(name);
                continue;
            }

            let ini_error = |message: String| ConfigError::Ini {
                line: idx + 1,
                message,
            };
            let split = line
                .find(['=', ':'])
                .ok_or_else(|| ini_error(format!("expected 'key = value', found '{}'", line)))?;
            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            let Some(name) = &section else {
                return Err(ini_error(format!("key '{}' outside of a section", key)));
            };
            let typed = if value.is_empty() {
                serde_yaml::Value::String(String::new())
            } else {
                serde_yaml::from_str(value)
                    .unwrap_or_else(|_| serde_yaml::Value::String(value.to_string()))
            };
            if let Some(serde_yaml::Value::Mapping(entries)) = root.get_mut(name.as_str()) {
                entries.insert(serde_yaml::Value::String(key.to_string()), typed);
            }
        }
        Ok(serde_yaml::from_value(serde_yaml::Value::Mapping(root))?)
    }

    /// Parses a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parses a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks that the configured paths are usable.
    ///
    /// # Errors
    ///
    /// Fails when a required path is empty or any configured path does not
    /// exist on disk.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dir.list_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptySetting("dir.list_path"));
        }
        if self.dir.data_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptySetting("dir.data_path"));
        }
        if self.netcdf.time_variable.trim().is_empty() {
            return Err(ConfigError::EmptySetting("netcdf.time_variable"));
        }
        let prefix = &self.settings.unarmed_prefix;
        if prefix.trim().is_empty() {
            return Err(ConfigError::EmptySetting("settings.unarmed_prefix"));
        }
        if prefix.contains(['/', '\\']) {
            return Err(ConfigError::InvalidSetting {
                key: "settings.unarmed_prefix",
                reason: format!("'{}' holds a path separator", prefix),
            });
        }
        if !self.dir.list_path.is_file() {
            return Err(ConfigError::MissingPath {
                key: "dir.list_path",
                path: self.dir.list_path.clone(),
            });
        }
        if !self.dir.data_path.is_dir() {
            return Err(ConfigError::MissingPath {
                key: "dir.data_path",
                path: self.dir.data_path.clone(),
            });
        }
        if let Some(corr_path) = &self.dir.corr_path
            && !corr_path.is_file()
        {
            return Err(ConfigError::MissingPath {
                key: "dir.corr_path",
                path: corr_path.clone(),
            });
        }
        Ok(())
    }

    /// Starting point written by `ncstation template`.
    pub fn template() -> Self {
        Self {
            dir: DirConfig {
                list_path: PathBuf::from("stations.csv"),
                data_path: PathBuf::from("data"),
                corr_path: Some(PathBuf::from("corrections.csv")),
            },
            settings: Settings::default(),
            netcdf: NetCdfConfig::default(),
            columns: ColumnMap::default(),
            map: MapViewport::default(),
        }
    }
}
