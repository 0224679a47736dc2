//! # CLI Module
//!
//! This module provides the command-line interface for ncstation, including:
//! - Argument parsing with clap
//! - Configuration file selection (JSON/YAML, `NCSTATION_CONFIG`)
//! - Subcommands for listing, resolving, showing and editing station data
//! - Line command parsing for the interactive session

use crate::projection::project;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration file used when neither `--config` nor `NCSTATION_CONFIG` is given.
pub const DEFAULT_CONFIG: &str = "config.yaml";

/// Explorer for per-station NetCDF time series
#[derive(Parser, Debug)]
#[command(name = "ncstation")]
#[command(about = "Explore and edit per-station NetCDF time series")]
#[command(version)]
#[command(long_about = "
ncstation explores station time series stored as NetCDF files, indexed by a
semicolon-delimited station manifest.

A point on the map (web mercator x/y, or latitude/longitude) resolves to the
nearest station. Its files are combined into one time-indexed table that can
be narrowed by year and parameter, edited and saved back. Saves overwrite the
source files only when `settings.armed` is true; otherwise a `_new_` prefixed
copy is written next to each source file.

EXAMPLES:
  # List the stations of the manifest
  ncstation -c config.yaml stations

  # Which station is nearest to a point?
  ncstation resolve --lat 47.5 --lon 11.0

  # Show a year of one parameter
  ncstation show --x 1224514 --y 6026275 --year 2015 --parameter LT

  # Edit two values and save them
  ncstation show --lat 47.5 --lon 11.0 --year 2015 --parameter LT \\
    --edit 3=12.5 --edit 4=nan --save

  # Interactive session
  ncstation session

  # File inspection
  ncstation info data/LT-nc/101_LT.nc
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Configuration file path (JSON or YAML)
    #[arg(short, long, global = true, env = "NCSTATION_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
    }
}

/// A map point, either projected or geographic.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct PointArgs {
    /// Projected x (web mercator meters)
    #[arg(long, allow_negative_numbers = true, requires = "y", conflicts_with_all = ["lat", "lon"])]
    pub x: Option<f64>,

    /// Projected y (web mercator meters)
    #[arg(long, allow_negative_numbers = true, requires = "x")]
    pub y: Option<f64>,

    /// Latitude in degrees
    #[arg(long, allow_negative_numbers = true, requires = "lon", conflicts_with_all = ["x", "y"])]
    pub lat: Option<f64>,

    /// Longitude in degrees
    #[arg(long, allow_negative_numbers = true, requires = "lat")]
    pub lon: Option<f64>,
}

impl PointArgs {
    /// The point in projected coordinates.
    pub fn projected(&self) -> Result<(f64, f64), String> {
        match (self.x, self.y, self.lat, self.lon) {
            (Some(x), Some(y), _, _) => Ok((x, y)),
            (_, _, Some(lat), Some(lon)) => Ok(project(lat, lon)),
            _ => Err("a point needs --x and --y, or --lat and --lon".to_string()),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the stations of the manifest
    #[command(long_about = "
List every station-parameter row of the manifest with its projected position
and marker colour.

EXAMPLES:
  ncstation stations
  ncstation stations --parameter LT --output-format csv
")]
    Stations {
        /// Only rows of this parameter
        #[arg(short, long)]
        parameter: Option<String>,
    },

    /// Resolve the station nearest to a point
    Resolve {
        #[command(flatten)]
        point: PointArgs,
    },

    /// Load a station and show its view
    #[command(long_about = "
Resolve the station nearest to a point, load its series and print the view
for the selected year and parameter. Edits given with --edit are applied to
the displayed table rows; --save writes them back.

EXAMPLES:
  ncstation show --x 1224514 --y 6026275
  ncstation show --lat 47.5 --lon 11.0 --year 2015 --parameter LT
  ncstation show --lat 47.5 --lon 11.0 --year 2015 --parameter LT \\
    --edit 0=3.2 --save
")]
    Show {
        #[command(flatten)]
        point: PointArgs,

        /// Year to display
        #[arg(long)]
        year: Option<String>,

        /// Parameter to display
        #[arg(short, long)]
        parameter: Option<String>,

        /// Table edit as ROW=VALUE (`nan` clears the value)
        #[arg(long = "edit", value_parser = parse_edit)]
        edits: Vec<CellEdit>,

        /// Save the displayed rows after applying the edits
        #[arg(long)]
        save: bool,
    },

    /// Interactive line-based session
    #[command(long_about = "
Start an interactive session. Each input line is one command:

  click <x> <y>        select the station nearest to a projected point
  geo <lat> <lon>      select the station nearest to a geographic point
  year <yyyy>          select a year (`year` alone shows all years)
  param <name>         select a parameter (`param none` clears it)
  edit <row> <value>   edit a table cell (`nan` clears it)
  save                 save the displayed rows
  show                 print the current view
  help                 list the commands
  quit                 leave the session
")]
    Session {
        /// Read commands from a file instead of standard input
        #[arg(long)]
        script: Option<PathBuf>,
    },

    /// Show information about a station NetCDF file
    Info {
        /// NetCDF file path
        file: PathBuf,

        /// Show only this variable
        #[arg(short = 'n', long)]
        variable: Option<String>,

        /// Name of the time coordinate
        #[arg(long, default_value = "time")]
        time_variable: String,
    },

    /// Validate the configuration and the manifests
    Validate {
        /// Also check that every data file exists
        #[arg(long)]
        check_files: bool,
    },

    /// Write a configuration template
    Template {
        /// Configuration format
        #[arg(short, long, value_enum, default_value_t = ConfigFormat::Yaml)]
        format: ConfigFormat,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    #[command(long_about = "
Generate shell completion scripts.

EXAMPLES:
  ncstation completions bash > ~/.bash_completion.d/ncstation
  ncstation completions zsh -o _ncstation
")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
    /// CSV output (where applicable)
    Csv,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON configuration format
    Json,
    /// YAML configuration format
    Yaml,
}

/// A table cell edit from the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellEdit {
    pub row: usize,
    pub value: Option<f64>,
}

/// Parses a cell value; `nan`, `none` and the empty string clear the cell.
pub fn parse_cell_value(s: &str) -> Result<Option<f64>, String> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    s.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("Invalid cell value '{}'", s))
}

/// Parse a table edit from command line argument
/// Format: row=value
fn parse_edit(s: &str) -> Result<CellEdit, String> {
    let (row, value) = s
        .split_once('=')
        .ok_or_else(|| "Edit must be in format 'row=value'".to_string())?;
    let row = row
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("Invalid row '{}'", row.trim()))?;
    Ok(CellEdit {
        row,
        value: parse_cell_value(value)?,
    })
}

/// One line of an interactive session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Click { x: f64, y: f64 },
    Geo { lat: f64, lon: f64 },
    Year(Option<String>),
    Param(Option<String>),
    Edit(CellEdit),
    Save,
    Show,
    Help,
    Quit,
}

fn parse_number(word: Option<&str>, what: &str) -> Result<f64, String> {
    let word = word.ok_or_else(|| format!("missing {}", what))?;
    word.parse::<f64>()
        .map_err(|_| format!("invalid {} '{}'", what, word))
}

/// Parses one session line. Blank lines and `#` comments yield `None`.
pub fn parse_session_line(line: &str) -> Result<Option<SessionCommand>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let keyword = words.next().unwrap_or_default().to_lowercase();
    let rest: Vec<&str> = words.collect();
    let mut args = rest.iter().copied();

    let command = match keyword.as_str() {
        "click" => SessionCommand::Click {
            x: parse_number(args.next(), "x")?,
            y: parse_number(args.next(), "y")?,
        },
        "geo" => SessionCommand::Geo {
            lat: parse_number(args.next(), "latitude")?,
            lon: parse_number(args.next(), "longitude")?,
        },
        "year" => SessionCommand::Year(args.next().map(str::to_string)),
        "param" | "parameter" => {
            let name = rest.join(" ");
            if name.is_empty() || name.eq_ignore_ascii_case("none") {
                SessionCommand::Param(None)
            } else {
                SessionCommand::Param(Some(name))
            }
        }
        "edit" => {
            let row = args.next().ok_or("missing row")?;
            let row = row
                .parse::<usize>()
                .map_err(|_| format!("invalid row '{}'", row))?;
            let value = parse_cell_value(args.next().ok_or("missing value")?)?;
            SessionCommand::Edit(CellEdit { row, value })
        }
        "save" => SessionCommand::Save,
        "show" => SessionCommand::Show,
        "help" | "?" => SessionCommand::Help,
        "quit" | "exit" | "q" => SessionCommand::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    if matches!(command, SessionCommand::Click { .. } | SessionCommand::Geo { .. })
        && args.next().is_some()
    {
        return Err(format!("too many arguments for '{}'", keyword));
    }
    Ok(Some(command))
}

pub const SESSION_HELP: &str = "\
click <x> <y>        select the station nearest to a projected point
geo <lat> <lon>      select the station nearest to a geographic point
year [yyyy]          select a year, or all years
param <name|none>    select or clear the parameter
edit <row> <value>   edit a table cell (`nan` clears it)
save                 save the displayed rows
show                 print the current view
help                 list the commands
quit                 leave the session";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edit() {
        assert_eq!(
            parse_edit("3=12.5").unwrap(),
            CellEdit {
                row: 3,
                value: Some(12.5)
            }
        );
        assert_eq!(parse_edit(" 0 = nan ").unwrap().value, None);
        assert_eq!(parse_edit("1=-4").unwrap().value, Some(-4.0));
        assert!(parse_edit("3").is_err());
        assert!(parse_edit("a=1").is_err());
        assert!(parse_edit("1=abc").is_err());
    }

    #[test]
    fn test_parse_cell_value() {
        assert_eq!(parse_cell_value("NaN").unwrap(), None);
        assert_eq!(parse_cell_value("").unwrap(), None);
        assert_eq!(parse_cell_value("1e3").unwrap(), Some(1000.0));
        assert!(parse_cell_value("ten").is_err());
    }

    #[test]
    fn test_point_args() {
        let projected = PointArgs {
            x: Some(1.0),
            y: Some(2.0),
            lat: None,
            lon: None,
        };
        assert_eq!(projected.projected().unwrap(), (1.0, 2.0));

        let geographic = PointArgs {
            x: None,
            y: None,
            lat: Some(51.0),
            lon: Some(10.0),
        };
        let (x, y) = geographic.projected().unwrap();
        assert!((x - 1113194.9079327357).abs() < 1e-3);
        assert!((y - 6621293.72274017).abs() < 1e-3);

        let empty = PointArgs {
            x: None,
            y: None,
            lat: None,
            lon: None,
        };
        assert!(empty.projected().is_err());
    }

    #[test]
    fn test_parse_session_lines() {
        assert_eq!(
            parse_session_line("click 9 9").unwrap(),
            Some(SessionCommand::Click { x: 9.0, y: 9.0 })
        );
        assert_eq!(
            parse_session_line("  GEO 47.5 -11 ").unwrap(),
            Some(SessionCommand::Geo {
                lat: 47.5,
                lon: -11.0
            })
        );
        assert_eq!(
            parse_session_line("year 2015").unwrap(),
            Some(SessionCommand::Year(Some("2015".to_string())))
        );
        assert_eq!(
            parse_session_line("year").unwrap(),
            Some(SessionCommand::Year(None))
        );
        assert_eq!(
            parse_session_line("param none").unwrap(),
            Some(SessionCommand::Param(None))
        );
        assert_eq!(
            parse_session_line("param Wasser Temp").unwrap(),
            Some(SessionCommand::Param(Some("Wasser Temp".to_string())))
        );
        assert_eq!(
            parse_session_line("edit 2 nan").unwrap(),
            Some(SessionCommand::Edit(CellEdit { row: 2, value: None }))
        );
        assert_eq!(parse_session_line("save").unwrap(), Some(SessionCommand::Save));
        assert_eq!(parse_session_line("exit").unwrap(), Some(SessionCommand::Quit));
        assert_eq!(parse_session_line("# comment").unwrap(), None);
        assert_eq!(parse_session_line("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_session_errors() {
        assert!(parse_session_line("click 9").is_err());
        assert!(parse_session_line("click 9 9 9").is_err());
        assert!(parse_session_line("edit x 1").is_err());
        assert!(parse_session_line("edit 1").is_err());
        assert!(parse_session_line("jump").is_err());
    }
}
