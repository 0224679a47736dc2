//! # Surface View
//!
//! Everything the dashboard shows, as one serialisable snapshot of the view
//! state: station markers on the map, the summary, the year and parameter
//! menus, the plotted line, the editable table and the hover tooltip.
//! A rendering engine draws it; the terminal frontend prints it as text,
//! JSON, YAML or CSV.

use crate::catalog::{Marker, StationCatalog};
use crate::cli::OutputFormat;
use crate::projection::MapViewport;
use crate::state::{Phase, ViewState};
use crate::summary::Summary;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;

/// Date format of the plot tooltip.
pub const TOOLTIP_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";
/// Date format of the table's date column.
pub const TABLE_DATE_FORMAT: &str = "%m/%d/%Y %H:%M:%S";
/// Tick format of the plot's time axis.
pub const AXIS_DATE_FORMAT: &str = "%d %B %Y";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationHeader {
    pub number: i64,
    pub label: String,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Menu {
    pub options: Vec<String>,
    pub selected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotPoint {
    pub date: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotLine {
    pub label: String,
    pub axis_format: &'static str,
    pub points: Vec<PlotPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableLine {
    pub row: usize,
    pub date: String,
    pub value: Option<f64>,
    pub edited: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    /// Date column title, then the parameter
    pub columns: Vec<String>,
    pub rows: Vec<TableLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub date_format: &'static str,
    pub value_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceView {
    pub status: Phase,
    pub armed: bool,
    pub viewport: MapViewport,
    pub markers: Vec<Marker>,
    pub station: Option<StationHeader>,
    pub summary: Option<Summary>,
    pub years: Menu,
    pub parameters: Menu,
    pub plot: Option<PlotLine>,
    pub table: Table,
    pub tooltip: Tooltip,
}

impl SurfaceView {
    pub fn build(
        state: &ViewState,
        catalog: &StationCatalog,
        viewport: &MapViewport,
        armed: bool,
    ) -> Self {
        let parameter = state.parameter.name().map(str::to_string);
        let rows = state.edit_buffer.rows();

        let plot = parameter.as_ref().map(|label| PlotLine {
            label: label.clone(),
            axis_format: AXIS_DATE_FORMAT,
            points: rows
                .iter()
                .map(|r| PlotPoint {
                    date: r.timestamp.format(TOOLTIP_DATE_FORMAT).to_string(),
                    value: r.value,
                })
                .collect(),
        });

        let table = Table {
            columns: vec![
                "date".to_string(),
                parameter.clone().unwrap_or_else(|| "value".to_string()),
            ],
            rows: rows
                .iter()
                .enumerate()
                .map(|(row, r)| TableLine {
                    row,
                    date: r.timestamp.format(TABLE_DATE_FORMAT).to_string(),
                    value: r.value,
                    edited: r.edited,
                })
                .collect(),
        };

        Self {
            status: state.phase,
            armed,
            viewport: *viewport,
            markers: catalog.markers(),
            station: state.station.as_ref().map(|s| StationHeader {
                number: s.number,
                label: s.label(),
                distance: s.distance,
            }),
            summary: state.summary.clone(),
            years: Menu {
                options: state.year_menu(),
                selected: state.year.clone(),
            },
            parameters: Menu {
                options: state.parameter_menu(),
                selected: parameter.clone(),
            },
            plot,
            table,
            tooltip: Tooltip {
                date_format: TOOLTIP_DATE_FORMAT,
                value_label: parameter.unwrap_or_default(),
            },
        }
    }
}

fn menu_line(menu: &Menu, none_label: &str) -> String {
    let mut entries = vec![match &menu.selected {
        None => format!("[{}]", none_label),
        Some(_) => none_label.to_string(),
    }];
    entries.extend(menu.options.iter().map(|o| {
        if menu.selected.as_deref() == Some(o.as_str()) {
            format!("[{}]", o)
        } else {
            o.clone()
        }
    }));
    entries.join(" ")
}

pub fn render_human(view: &SurfaceView) -> String {
    let mut out = String::new();
    let mode = if view.armed { "armed" } else { "unarmed" };
    let _ = writeln!(out, "Status: {} ({})", view.status, mode);
    let _ = writeln!(
        out,
        "Map: {} markers, x {:.0}..{:.0}, y {:.0}..{:.0}",
        view.markers.len(),
        view.viewport.x_range.0,
        view.viewport.x_range.1,
        view.viewport.y_range.0,
        view.viewport.y_range.1
    );
    if let Some(station) = &view.station {
        let _ = writeln!(
            out,
            "Station {}: {} ({:.1} m from click)",
            station.number, station.label, station.distance
        );
    }
    if let Some(summary) = &view.summary {
        let _ = writeln!(out);
        let _ = write!(out, "{}", summary);
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "Year: {}", menu_line(&view.years, "All"));
    let _ = writeln!(out, "Parameter: {}", menu_line(&view.parameters, "None"));

    if let Some(plot) = &view.plot {
        let values = plot.points.iter().filter(|p| p.value.is_some()).count();
        match (plot.points.first(), plot.points.last()) {
            (Some(first), Some(last)) => {
                let _ = writeln!(
                    out,
                    "Plot '{}': {} points ({} valid), {} to {}",
                    plot.label,
                    plot.points.len(),
                    values,
                    first.date,
                    last.date
                );
            }
            _ => {
                let _ = writeln!(out, "Plot '{}': no points", plot.label);
            }
        }
    }

    if !view.table.rows.is_empty() {
        let _ = writeln!(
            out,
            "{:>6}  {:<20} {:>12}",
            "#", view.table.columns[0], view.table.columns[1]
        );
        for line in &view.table.rows {
            let value = line.value.map_or_else(|| "NaN".to_string(), |v| v.to_string());
            let marker = if line.edited { "*" } else { " " };
            let _ = writeln!(out, "{:>5}{}  {:<20} {:>12}", line.row, marker, line.date, value);
        }
    }
    out
}

pub fn render_json(view: &SurfaceView) -> Result<String> {
    serde_json::to_string_pretty(view).context("Failed to serialize view to JSON")
}

pub fn render_yaml(view: &SurfaceView) -> Result<String> {
    serde_yaml::to_string(view).context("Failed to serialize view to YAML")
}

/// The table as CSV: row, date, value, edited.
pub fn render_csv(view: &SurfaceView) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "row",
        view.table.columns[0].as_str(),
        view.table.columns[1].as_str(),
        "edited",
    ])?;
    for line in &view.table.rows {
        writer.write_record([
            line.row.to_string(),
            line.date.clone(),
            line.value.map_or_else(String::new, |v| v.to_string()),
            line.edited.to_string(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}

pub fn render(view: &SurfaceView, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(render_human(view)),
        OutputFormat::Json => render_json(view),
        OutputFormat::Yaml => render_yaml(view),
        OutputFormat::Csv => render_csv(view),
    }
}
