//! # Event Dispatch
//!
//! The interactive surface as an explicit event dispatcher. Every user input
//! is an [`Event`]; [`update`] maps the current [`ViewState`] and one event to
//! the next state, a list of [`Effect`]s and at most one [`Command`] that
//! needs I/O. [`Dashboard::dispatch`] runs the command and feeds its
//! completion event back into [`update`] until nothing is left, so every
//! input is handled to completion before the next one.
//!
//! ## Selection cycle
//!
//! ```text
//! Idle -> Resolving -> Loaded | NoData       (station click)
//! Loaded -> Editing -> Loaded                (save)
//! Loaded -> Loaded                           (save rejected, diagnostic only)
//! ```

use crate::catalog::{CatalogError, StationCatalog};
use crate::extract::{NetCdfSeriesLoader, SeriesLoad, SeriesSource};
use crate::input::{ColumnMap, ViewerConfig};
use crate::output::{EditWriter, SaveReport, SaveRequest};
use crate::projection::MapViewport;
use crate::resolver::{ResolvedStation, resolve};
use crate::series::StationSeries;
use crate::state::{ParameterSelection, Phase, ViewState};
use crate::summary::Summary;
use crate::surface::SurfaceView;
use log::{Level, info, log};

/// User inputs and the completions of the commands they trigger.
#[derive(Debug)]
pub enum Event {
    /// Map click in projected coordinates
    StationClicked { x: f64, y: f64 },
    YearChanged(String),
    ParameterChanged(String),
    /// Table cell edit; `None` clears the value
    CellEdited { row: usize, value: Option<f64> },
    SaveClicked,
    SeriesLoaded(SeriesLoad),
    SaveCompleted(Result<SaveReport, String>),
}

/// Part of the surface that needs redrawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Status,
    Summary,
    YearMenu,
    ParameterMenu,
    Plot,
    Table,
}

const ALL_PANELS: [Panel; 6] = [
    Panel::Status,
    Panel::Summary,
    Panel::YearMenu,
    Panel::ParameterMenu,
    Panel::Plot,
    Panel::Table,
];

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Render(Vec<Panel>),
    Diagnostic { level: Level, message: String },
}

/// I/O requested by a handler.
#[derive(Debug, Clone)]
pub enum Command {
    Load(ResolvedStation),
    Persist(SaveRequest),
}

#[derive(Debug)]
pub struct Transition {
    pub state: ViewState,
    pub effects: Vec<Effect>,
    pub command: Option<Command>,
}

impl Transition {
    fn new(state: ViewState) -> Self {
        Self {
            state,
            effects: Vec::new(),
            command: None,
        }
    }

    fn render(mut self, panels: &[Panel]) -> Self {
        self.effects.push(Effect::Render(panels.to_vec()));
        self
    }

    /// Logs the message and hands it to the frontend.
    fn diagnostic(mut self, level: Level, message: String) -> Self {
        log!(level, "{}", message);
        self.effects.push(Effect::Diagnostic { level, message });
        self
    }

    fn command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }
}

/// Handles one event.
///
/// Apart from logging this is a pure function of its inputs; disk access
/// happens only through the returned [`Command`].
pub fn update(
    state: ViewState,
    event: Event,
    catalog: &StationCatalog,
    columns: &ColumnMap,
) -> Transition {
    match event {
        Event::StationClicked { x, y } => on_station_clicked(state, x, y, catalog),
        Event::SeriesLoaded(load) => on_series_loaded(state, load, columns),
        Event::YearChanged(year) => on_year_changed(state, year),
        Event::ParameterChanged(parameter) => on_parameter_changed(state, parameter),
        Event::CellEdited { row, value } => on_cell_edited(state, row, value),
        Event::SaveClicked => on_save_clicked(state),
        Event::SaveCompleted(result) => on_save_completed(state, result, columns),
    }
}

fn on_station_clicked(
    mut state: ViewState,
    x: f64,
    y: f64,
    catalog: &StationCatalog,
) -> Transition {
    let Some(station) = resolve(catalog, x, y) else {
        return Transition::new(state)
            .diagnostic(Level::Warn, "No station near the clicked point".to_string());
    };
    info!("Selected station {}: {}", station.number, station.label());

    let dirty = state.edit_buffer.dirty_count();
    state.phase = Phase::Resolving;
    state.station = Some(station.clone());
    discard_warning(Transition::new(state), dirty)
        .render(&[Panel::Status])
        .command(Command::Load(station))
}

fn on_series_loaded(mut state: ViewState, load: SeriesLoad, columns: &ColumnMap) -> Transition {
    let Some(station) = state.station.clone().filter(|_| state.phase == Phase::Resolving) else {
        return Transition::new(state).diagnostic(
            Level::Warn,
            "Ignoring series load without a pending station".to_string(),
        );
    };

    let series = match load {
        SeriesLoad::Loaded(series) => series,
        SeriesLoad::NoData(reason) => {
            let message = format!("No data for station {}: {}", station.number, reason);
            return no_data(state, Level::Warn, message);
        }
        SeriesLoad::Failed(error) => {
            let message = format!("Failed to load station {}: {}", station.number, error);
            return no_data(state, Level::Error, message);
        }
    };

    let mut notes = Vec::new();
    if let ParameterSelection::Selected(name) = &state.parameter
        && !series.has_parameter(name)
    {
        notes.push(format!(
            "Station {} has no parameter '{}', selection cleared",
            station.number, name
        ));
        state.parameter = ParameterSelection::Unselected;
    }

    state.summary = Some(Summary::build(&station, &series, columns));
    state.series = series;
    state.phase = Phase::Loaded;
    state.rebuild_buffer();
    if let Some(miss) = selection_miss(&state) {
        notes.push(miss);
    }

    let mut transition = Transition::new(state).render(&ALL_PANELS);
    for note in notes {
        transition = transition.diagnostic(Level::Info, note);
    }
    transition
}

fn no_data(mut state: ViewState, level: Level, message: String) -> Transition {
    state.series = StationSeries::empty();
    state.summary = None;
    state.phase = Phase::NoData;
    state.rebuild_buffer();
    Transition::new(state)
        .render(&ALL_PANELS)
        .diagnostic(level, message)
}

/// Describes a year/parameter choice that matches no rows.
fn selection_miss(state: &ViewState) -> Option<String> {
    let parameter = state.parameter.name()?;
    if !state.edit_buffer.is_empty() || state.phase != Phase::Loaded {
        return None;
    }
    Some(match &state.year {
        Some(year) => format!("No '{}' values in {}", parameter, year),
        None => format!("No '{}' values", parameter),
    })
}

fn discard_warning(transition: Transition, dirty: usize) -> Transition {
    if dirty == 0 {
        return transition;
    }
    transition.diagnostic(Level::Warn, format!("Discarding {} unsaved edits", dirty))
}

fn on_year_changed(mut state: ViewState, year: String) -> Transition {
    let year = year.trim();
    let dirty = state.edit_buffer.dirty_count();
    state.year = (!year.is_empty()).then(|| year.to_string());
    state.rebuild_buffer();
    let miss = selection_miss(&state);

    let transition = discard_warning(Transition::new(state), dirty)
        .render(&[Panel::YearMenu, Panel::Plot, Panel::Table]);
    match miss {
        Some(note) => transition.diagnostic(Level::Info, note),
        None => transition,
    }
}

fn on_parameter_changed(mut state: ViewState, parameter: String) -> Transition {
    let parameter = parameter.trim();
    let dirty = state.edit_buffer.dirty_count();
    state.parameter = if parameter.is_empty() || parameter.eq_ignore_ascii_case("none") {
        ParameterSelection::Unselected
    } else {
        ParameterSelection::Selected(parameter.to_string())
    };
    state.rebuild_buffer();
    let miss = selection_miss(&state);

    let transition = discard_warning(Transition::new(state), dirty)
        .render(&[Panel::ParameterMenu, Panel::Plot, Panel::Table]);
    match miss {
        Some(note) => transition.diagnostic(Level::Info, note),
        None => transition,
    }
}

fn on_cell_edited(mut state: ViewState, row: usize, value: Option<f64>) -> Transition {
    if state.phase != Phase::Loaded {
        let phase = state.phase;
        return Transition::new(state)
            .diagnostic(Level::Warn, format!("Cannot edit while {}", phase));
    }
    if !state.edit_buffer.edit(row, value) {
        let len = state.edit_buffer.len();
        return Transition::new(state).diagnostic(
            Level::Warn,
            format!("No table row {} ({} rows shown)", row, len),
        );
    }
    Transition::new(state).render(&[Panel::Table])
}

/// Checks the save preconditions in the order the user would fix them.
fn save_blocker(state: &ViewState) -> Option<&'static str> {
    if state.station.is_none() {
        return Some("no station selected");
    }
    if state.phase != Phase::Loaded {
        return Some("no series loaded");
    }
    if state.year.is_none() {
        return Some("no year selected");
    }
    if state.parameter.name().is_none() {
        return Some("no parameter selected");
    }
    None
}

fn on_save_clicked(mut state: ViewState) -> Transition {
    if let Some(reason) = save_blocker(&state) {
        return Transition::new(state).diagnostic(Level::Warn, format!("Save ignored: {}", reason));
    }
    let (Some(station), Some(year), Some(parameter)) = (
        state.station.clone(),
        state.year.clone(),
        state.parameter.name().map(str::to_string),
    ) else {
        return Transition::new(state);
    };

    let edits = state.edit_buffer.entries();
    if let Err(e) = state.series.apply_edits(&parameter, &edits) {
        return Transition::new(state)
            .diagnostic(Level::Error, format!("Cannot apply edits: {}", e));
    }
    // edits of earlier saves live in the series, not in the year's buffer
    let rows = state.series.rows(&parameter);

    state.phase = Phase::Editing;
    Transition::new(state)
        .render(&[Panel::Status])
        .command(Command::Persist(SaveRequest {
            station,
            year,
            parameter,
            rows,
        }))
}

fn on_save_completed(
    mut state: ViewState,
    result: Result<SaveReport, String>,
    columns: &ColumnMap,
) -> Transition {
    state.phase = Phase::Loaded;
    match result {
        Ok(report) => {
            if let Some(station) = &state.station {
                state.summary = Some(Summary::build(station, &state.series, columns));
            }
            state.rebuild_buffer();
            let files: Vec<String> = report
                .written
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            Transition::new(state)
                .render(&ALL_PANELS)
                .diagnostic(
                    Level::Info,
                    format!(
                        "Saved {} changed values to {}",
                        report.values,
                        files.join(", ")
                    ),
                )
        }
        Err(message) => Transition::new(state)
            .render(&[Panel::Status])
            .diagnostic(Level::Error, format!("Save failed: {}", message)),
    }
}

/// Owns the catalog, the I/O collaborators and the view state.
pub struct Dashboard {
    catalog: StationCatalog,
    columns: ColumnMap,
    viewport: MapViewport,
    source: Box<dyn SeriesSource>,
    writer: EditWriter,
    state: ViewState,
}

impl Dashboard {
    pub fn new(
        catalog: StationCatalog,
        columns: ColumnMap,
        viewport: MapViewport,
        source: Box<dyn SeriesSource>,
        writer: EditWriter,
    ) -> Self {
        Self {
            catalog,
            columns,
            viewport,
            source,
            writer,
            state: ViewState::default(),
        }
    }

    /// Loads the manifests named by the configuration.
    ///
    /// # Errors
    ///
    /// Fails if the station or correction manifest cannot be loaded.
    pub fn from_config(config: &ViewerConfig) -> Result<Self, CatalogError> {
        let mut catalog = StationCatalog::load(&config.dir.list_path, &config.columns)?;
        if let Some(corr_path) = &config.dir.corr_path {
            catalog.apply_corrections(corr_path, &config.columns)?;
        }
        Ok(Self::new(
            catalog,
            config.columns.clone(),
            config.map,
            Box::new(NetCdfSeriesLoader::from_config(config)),
            EditWriter::from_config(config),
        ))
    }

    /// Replaces the series source, e.g. to decorate it with progress output.
    pub fn with_source(mut self, source: Box<dyn SeriesSource>) -> Self {
        self.source = source;
        self
    }

    /// Handles one event and every command it triggers.
    pub fn dispatch(&mut self, event: Event) -> Vec<Effect> {
        let mut effects = Vec::new();
        let mut next = Some(event);
        while let Some(event) = next.take() {
            let state = std::mem::take(&mut self.state);
            let transition = update(state, event, &self.catalog, &self.columns);
            self.state = transition.state;
            effects.extend(transition.effects);
            next = transition.command.map(|command| self.execute(command));
        }
        effects
    }

    fn execute(&self, command: Command) -> Event {
        match command {
            Command::Load(station) => Event::SeriesLoaded(self.source.load(&station)),
            Command::Persist(request) => {
                Event::SaveCompleted(self.writer.save(&request).map_err(|e| e.to_string()))
            }
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn catalog(&self) -> &StationCatalog {
        &self.catalog
    }

    pub fn writer(&self) -> &EditWriter {
        &self.writer
    }

    pub fn view(&self) -> SurfaceView {
        SurfaceView::build(&self.state, &self.catalog, &self.viewport, self.writer.is_armed())
    }
}
