//! # Station File Inspection
//!
//! Summarises the layout of one station NetCDF file: dimensions, variables,
//! the header attributes the manifest is generated from, and the decoded
//! time coverage. Used by `ncstation info` to check a file before it is
//! listed in the manifest.

use crate::extract::read_time_axis;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
    pub is_unlimited: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariableInfo {
    pub name: String,
    pub data_type: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub attributes: BTreeMap<String, String>,
}

/// Time span covered by the file, when its time axis decodes.
#[derive(Debug, Clone, Serialize)]
pub struct TimeCoverage {
    pub steps: usize,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationFileInfo {
    pub path: String,
    pub file_size: Option<u64>,
    pub dimensions: Vec<DimensionInfo>,
    pub variables: Vec<VariableInfo>,
    pub global_attributes: BTreeMap<String, String>,
    pub time: Option<TimeCoverage>,
}

/// Reads the layout of a station file.
///
/// # Arguments
///
/// * `path` - NetCDF file to inspect
/// * `variable` - Restrict the variable listing to this name
/// * `time_variable` - Name of the time coordinate to decode
///
/// # Errors
///
/// Fails if the file cannot be opened. An undecodable time axis is not an
/// error; the coverage is simply left out.
pub fn get_station_file_info(
    path: &Path,
    variable: Option<&str>,
    time_variable: &str,
) -> Result<StationFileInfo> {
    debug!("Opening NetCDF file: {}", path.display());
    let file = netcdf::open(path)
        .with_context(|| format!("Failed to open NetCDF file: {}", path.display()))?;

    let dimensions = file
        .dimensions()
        .map(|dim| DimensionInfo {
            name: dim.name(),
            length: dim.len(),
            is_unlimited: dim.is_unlimited(),
        })
        .collect();

    let variables = file
        .variables()
        .filter(|var| variable.is_none_or(|wanted| var.name() == wanted))
        .map(|var| VariableInfo {
            name: var.name(),
            data_type: format!("{:?}", var.vartype()),
            dimensions: var.dimensions().iter().map(|d| d.name()).collect(),
            shape: var.dimensions().iter().map(|d| d.len()).collect(),
            attributes: var
                .attributes()
                .filter_map(|attr| {
                    let value = attr.value().ok()?;
                    Some((attr.name().to_string(), attribute_text(&value)))
                })
                .collect(),
        })
        .collect();

    let global_attributes = file
        .attributes()
        .filter_map(|attr| {
            let value = attr.value().ok()?;
            Some((attr.name().to_string(), attribute_text(&value)))
        })
        .collect();

    let time = match read_time_axis(&file, path, time_variable) {
        Ok((_, _, times)) => Some(TimeCoverage {
            steps: times.len(),
            first: times.first().copied(),
            last: times.last().copied(),
        }),
        Err(e) => {
            debug!("No time coverage for {}: {}", path.display(), e);
            None
        }
    };

    Ok(StationFileInfo {
        path: path.display().to_string(),
        file_size: std::fs::metadata(path).ok().map(|m| m.len()),
        dimensions,
        variables,
        global_attributes,
        time,
    })
}

/// Attribute values as the manifest shows them: text verbatim, numbers plain.
fn attribute_text(value: &netcdf::AttributeValue) -> String {
    use netcdf::AttributeValue as V;
    match value {
        V::Str(s) => s.clone(),
        V::Strs(s) => s.join(", "),
        V::Double(v) => v.to_string(),
        V::Float(v) => v.to_string(),
        V::Int(v) => v.to_string(),
        V::Short(v) => v.to_string(),
        V::Longlong(v) => v.to_string(),
        V::Doubles(v) => join(v),
        V::Floats(v) => join(v),
        V::Ints(v) => join(v),
        other => format!("{:?}", other),
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_file_info_human(info: &StationFileInfo, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Station file: {}", info.path)?;
    if let Some(size) = info.file_size {
        writeln!(out, "  File Size: {:.2} MB", size as f64 / 1_048_576.0)?;
    }
    match &info.time {
        Some(TimeCoverage {
            steps,
            first: Some(first),
            last: Some(last),
        }) => writeln!(out, "  Time: {} steps, {} to {}", steps, first, last)?,
        Some(_) => writeln!(out, "  Time: empty")?,
        None => writeln!(out, "  Time: not decodable")?,
    }
    writeln!(out, "  Dimensions:")?;
    for dim in &info.dimensions {
        writeln!(
            out,
            "    {} ({}{})",
            dim.name,
            dim.length,
            if dim.is_unlimited { ", unlimited" } else { "" }
        )?;
    }
    writeln!(out, "  Variables:")?;
    for var in &info.variables {
        writeln!(
            out,
            "    {} ({}) [{}]",
            var.name,
            var.data_type,
            var.dimensions.join(", ")
        )?;
        for (name, value) in &var.attributes {
            writeln!(out, "      @{}: {}", name, value)?;
        }
    }
    if !info.global_attributes.is_empty() {
        writeln!(out, "  Header:")?;
        for (name, value) in &info.global_attributes {
            writeln!(out, "    {}: {}", name, value)?;
        }
    }
    Ok(())
}

pub fn print_file_info_json(info: &StationFileInfo, out: &mut impl Write) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(info)?)?;
    Ok(())
}

pub fn print_file_info_yaml(info: &StationFileInfo, out: &mut impl Write) -> Result<()> {
    let yaml = serde_yaml::to_string(info).context("Failed to serialize file info to YAML")?;
    write!(out, "{}", yaml)?;
    Ok(())
}

/// One CSV row per variable.
pub fn print_file_info_csv(info: &StationFileInfo, out: &mut impl Write) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["variable", "data_type", "dimensions", "shape", "attributes"])?;
    for var in &info.variables {
        let shape = var
            .shape
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(";");
        writer.write_record([
            var.name.as_str(),
            var.data_type.as_str(),
            var.dimensions.join(";").as_str(),
            shape.as_str(),
            var.attributes.len().to_string().as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
