//! # ncstation
//!
//! A Rust library for exploring and editing per-station NetCDF time series.
//!
//! Stations are listed in a semicolon-delimited, Latin-1 encoded manifest;
//! every row names one parameter of one station and the NetCDF file holding
//! it. A map click resolves the nearest station, its files are combined into
//! one time-indexed table, and the user narrows the view by year and
//! parameter, edits table cells and saves them back.
//!
//! ## Features
//!
//! - **Web mercator placement**: stations are projected once when the manifest loads
//! - **Multi-file stations**: files of one station are combined along time
//! - **Event dispatcher**: every input is a typed event handled to completion
//! - **Safe saves**: unless armed, edits go to a prefixed copy of each file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ncstation::dispatch::Event;
//! use ncstation::{input::ViewerConfig, open_dashboard};
//!
//! let config = ViewerConfig::from_file("config.yaml")?;
//! let mut dashboard = open_dashboard(&config)?;
//!
//! dashboard.dispatch(Event::StationClicked { x: 1224514.0, y: 6026275.0 });
//! dashboard.dispatch(Event::YearChanged("2015".to_string()));
//! dashboard.dispatch(Event::ParameterChanged("LT".to_string()));
//! println!("{}", ncstation::surface::render_human(&dashboard.view()));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! dir:
//!   list_path: stations.csv
//!   data_path: data
//!   corr_path: corrections.csv
//! settings:
//!   armed: "False"
//! ```

pub mod catalog;
pub mod cli;
pub mod dispatch;
pub mod extract;
pub mod info;
pub mod input;
pub mod log;
pub mod output;
pub mod projection;
pub mod resolver;
pub mod series;
pub mod session;
pub mod state;
pub mod summary;
pub mod surface;


use crate::catalog::CatalogError;
use crate::dispatch::Dashboard;
use crate::input::{ConfigError, ViewerConfig};
use thiserror::Error;

/// Startup failures. Either one stops the viewer before anything is shown.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Validates the configuration and loads the station catalog.
///
/// # Arguments
///
/// * `config` - Parsed viewer configuration
///
/// # Returns
///
/// A [`Dashboard`] with nothing selected.
///
/// # Errors
///
/// This function will return an error if:
/// - A configured path is empty or does not exist
/// - The station or correction manifest is malformed
pub fn open_dashboard(config: &ViewerConfig) -> Result<Dashboard, StartupError> {
    config.validate()?;
    Ok(Dashboard::from_config(config)?)
}
