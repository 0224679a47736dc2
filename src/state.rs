//! # View State
//!
//! The single owned state of the dashboard: selected station, its loaded
//! series, the year and parameter selections, the summary and the edit
//! buffer. Only the dispatcher mutates it.
//!
//! Menus and the visible rows are re-projections of the loaded series and
//! never touch the disk.

use crate::resolver::ResolvedStation;
use crate::series::StationSeries;
use crate::summary::Summary;
use chrono::NaiveDateTime;
use log::warn;
use serde::Serialize;
use std::fmt;

/// Where the dashboard is in the station selection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing selected yet
    #[default]
    Idle,
    /// A station was picked and its files are being read
    Resolving,
    Loaded,
    /// The last selection could not be loaded
    NoData,
    /// A save is being written
    Editing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Resolving => "resolving",
            Phase::Loaded => "loaded",
            Phase::NoData => "no data",
            Phase::Editing => "saving",
        };
        f.write_str(name)
    }
}

/// Parameter menu selection. Starts out as the "none selected" entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSelection {
    #[default]
    Unselected,
    Selected(String),
}

impl ParameterSelection {
    pub fn name(&self) -> Option<&str> {
        match self {
            ParameterSelection::Unselected => None,
            ParameterSelection::Selected(name) => Some(name),
        }
    }
}

/// One row of the data table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub timestamp: NaiveDateTime,
    pub value: Option<f64>,
    /// Changed in the table since the buffer was built
    pub edited: bool,
}

/// Rows currently shown in the table, as the user edits them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditBuffer {
    rows: Vec<TableRow>,
}

impl EditBuffer {
    pub fn from_rows(rows: Vec<TableRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replaces the value of a row. Returns `false` if the row does not exist.
    pub fn edit(&mut self, row: usize, value: Option<f64>) -> bool {
        match self.rows.get_mut(row) {
            Some(r) => {
                r.value = value;
                r.edited = true;
                true
            }
            None => false,
        }
    }

    pub fn dirty_count(&self) -> usize {
        self.rows.iter().filter(|r| r.edited).count()
    }

    /// Every displayed row as `(timestamp, value)`, ready to merge into the series.
    pub fn entries(&self) -> Vec<(NaiveDateTime, Option<f64>)> {
        self.rows.iter().map(|r| (r.timestamp, r.value)).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub phase: Phase,
    pub station: Option<ResolvedStation>,
    pub series: StationSeries,
    pub year: Option<String>,
    pub parameter: ParameterSelection,
    pub summary: Option<Summary>,
    pub edit_buffer: EditBuffer,
}

impl ViewState {
    /// Sorted distinct years of the loaded series.
    pub fn year_menu(&self) -> Vec<String> {
        self.series.years()
    }

    pub fn parameter_menu(&self) -> Vec<String> {
        self.series.parameters()
    }

    /// The loaded series narrowed to the selected year, or all of it when
    /// no year is selected.
    pub fn visible_series(&self) -> StationSeries {
        let Some(year) = &self.year else {
            return self.series.clone();
        };
        match self.series.year_slice(year) {
            Ok(slice) => slice,
            Err(e) => {
                warn!("Cannot slice year {}: {}", year, e);
                StationSeries::empty()
            }
        }
    }

    /// Table rows of the selected parameter in the selected year.
    ///
    /// Empty while no parameter is selected or when the selection has no
    /// matching rows.
    pub fn visible_rows(&self) -> Vec<TableRow> {
        let Some(parameter) = self.parameter.name() else {
            return Vec::new();
        };
        self.visible_series()
            .rows(parameter)
            .into_iter()
            .map(|(timestamp, value)| TableRow {
                timestamp,
                value,
                edited: false,
            })
            .collect()
    }

    pub fn rebuild_buffer(&mut self) {
        self.edit_buffer = EditBuffer::from_rows(self.visible_rows());
    }
}
