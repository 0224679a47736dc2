//! # Terminal Session
//!
//! Line-based frontend for the dashboard. Each input line is parsed into a
//! [`SessionCommand`], turned into an [`Event`] and dispatched; whenever the
//! dispatcher asks for a redraw the current view is printed in the chosen
//! output format. Diagnostics reach the user through the logger.

use crate::cli::{OutputFormat, SESSION_HELP, SessionCommand, parse_session_line};
use crate::dispatch::{Dashboard, Effect, Event};
use crate::extract::{SeriesLoad, SeriesSource};
use crate::projection::project;
use crate::resolver::ResolvedStation;
use crate::surface::render;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use std::io::{BufRead, Write};
use std::time::Duration;

/// Shows a spinner while the wrapped source loads a station.
pub struct SpinnerSource {
    inner: Box<dyn SeriesSource>,
}

impl SpinnerSource {
    pub fn new(inner: Box<dyn SeriesSource>) -> Self {
        Self { inner }
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

impl SeriesSource for SpinnerSource {
    fn load(&self, station: &ResolvedStation) -> SeriesLoad {
        let pb = create_spinner(format!("Loading station {} ({})", station.number, station.label()));
        let load = self.inner.load(station);
        pb.finish_and_clear();
        load
    }
}

/// Counters reported when a session ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub commands: usize,
    pub errors: usize,
}

/// Maps a session command to a dashboard event, if it is one.
pub fn to_event(command: &SessionCommand) -> Option<Event> {
    match command {
        SessionCommand::Click { x, y } => Some(Event::StationClicked { x: *x, y: *y }),
        SessionCommand::Geo { lat, lon } => {
            let (x, y) = project(*lat, *lon);
            Some(Event::StationClicked { x, y })
        }
        SessionCommand::Year(year) => Some(Event::YearChanged(year.clone().unwrap_or_default())),
        SessionCommand::Param(name) => {
            Some(Event::ParameterChanged(name.clone().unwrap_or_default()))
        }
        SessionCommand::Edit(edit) => Some(Event::CellEdited {
            row: edit.row,
            value: edit.value,
        }),
        SessionCommand::Save => Some(Event::SaveClicked),
        SessionCommand::Show | SessionCommand::Help | SessionCommand::Quit => None,
    }
}

/// Runs commands from `input` until it ends or `quit` is read.
///
/// A line that does not parse is reported and skipped; it never ends the
/// session.
pub fn run_session(
    dashboard: &mut Dashboard,
    input: impl BufRead,
    out: &mut impl Write,
    format: &OutputFormat,
    prompt: bool,
) -> Result<SessionStats> {
    let mut stats = SessionStats::default();
    if prompt {
        write!(out, "> ")?;
        out.flush()?;
    }

    for line in input.lines() {
        let line = line?;
        match parse_session_line(&line) {
            Ok(None) => {}
            Ok(Some(SessionCommand::Quit)) => break,
            Ok(Some(SessionCommand::Help)) => writeln!(out, "{}", SESSION_HELP)?,
            Ok(Some(SessionCommand::Show)) => {
                stats.commands += 1;
                writeln!(out, "{}", render(&dashboard.view(), format)?)?;
            }
            Ok(Some(command)) => {
                stats.commands += 1;
                if let Some(event) = to_event(&command) {
                    debug!("Dispatching {:?}", event);
                    let effects = dashboard.dispatch(event);
                    if effects.iter().any(|e| matches!(e, Effect::Render(_))) {
                        writeln!(out, "{}", render(&dashboard.view(), format)?)?;
                    }
                }
            }
            Err(message) => {
                stats.errors += 1;
                warn!("{}", message);
                writeln!(out, "error: {}", message)?;
            }
        }
        if prompt {
            write!(out, "> ")?;
            out.flush()?;
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Station, StationCatalog};
    use crate::cli::CellEdit;
    use crate::input::ColumnMap;
    use crate::output::EditWriter;
    use crate::projection::MapViewport;
    use crate::series::{MissingValuePolicy, StationSeries};
    use crate::state::Phase;
    use chrono::NaiveDate;
    use std::io::Cursor;
    use std::path::PathBuf;

    struct OneYear;

    impl SeriesSource for OneYear {
        fn load(&self, _station: &ResolvedStation) -> SeriesLoad {
            let t = |d| {
                NaiveDate::from_ymd_opt(2015, 1, d)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            };
            SeriesLoad::Loaded(
                StationSeries::from_columns(
                    &[t(1), t(2)],
                    vec![("T".to_string(), vec![Some(1.0), Some(2.0)])],
                )
                .unwrap(),
            )
        }
    }

    fn dashboard() -> Dashboard {
        let station = Station {
            number: 1,
            name: "A".to_string(),
            site: "Site".to_string(),
            parameter: "T".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            x: 0.0,
            y: 0.0,
            filename: "1.nc".to_string(),
            parent_folder: "T-nc".to_string(),
            correction: None,
            metadata: Vec::new(),
        };
        Dashboard::new(
            StationCatalog::from_stations(vec![station]),
            ColumnMap::default(),
            MapViewport::default(),
            Box::new(SpinnerSource::new(Box::new(OneYear))),
            EditWriter::new(
                PathBuf::from("/nonexistent"),
                false,
                "_new_".to_string(),
                "time".to_string(),
                MissingValuePolicy::default(),
            ),
        )
    }

    #[test]
    fn test_to_event() {
        assert!(matches!(
            to_event(&SessionCommand::Geo { lat: 0.0, lon: 0.0 }),
            Some(Event::StationClicked { x, y }) if x.abs() < 1e-9 && y.abs() < 1e-9
        ));
        assert!(matches!(
            to_event(&SessionCommand::Year(None)),
            Some(Event::YearChanged(ref y)) if y.is_empty()
        ));
        assert!(matches!(
            to_event(&SessionCommand::Edit(CellEdit { row: 1, value: None })),
            Some(Event::CellEdited { row: 1, value: None })
        ));
        assert!(to_event(&SessionCommand::Show).is_none());
    }

    #[test]
    fn test_session_script() {
        let mut dashboard = dashboard();
        let script = "click 0 0\nyear 2015\nparam T\nedit 1 5.5\nbogus\n# note\nshow\nquit\nclick 1 1\n";
        let mut out = Vec::new();
        let stats = run_session(
            &mut dashboard,
            Cursor::new(script),
            &mut out,
            &OutputFormat::Csv,
            false,
        )
        .unwrap();

        assert_eq!(stats, SessionStats { commands: 5, errors: 1 });
        assert_eq!(dashboard.state().phase, Phase::Loaded);
        assert_eq!(dashboard.state().edit_buffer.dirty_count(), 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("error: unknown command 'bogus'"));
        assert!(text.contains("1,01/02/2015 00:00:00,5.5,true"));
    }
}
