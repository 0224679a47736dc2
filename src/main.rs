use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use log::{LevelFilter, debug, error, info, warn};
use ncstation::catalog::Station;
use ncstation::cli::{Cli, Commands, ConfigFormat, OutputFormat, PointArgs};
use ncstation::dispatch::{Dashboard, Effect, Event};
use ncstation::extract::NetCdfSeriesLoader;
use ncstation::info::{
    get_station_file_info, print_file_info_csv, print_file_info_human, print_file_info_json,
    print_file_info_yaml,
};
use ncstation::input::ViewerConfig;
use ncstation::log::{config_echo, show_farewell_with_timing, show_greeting};
use ncstation::open_dashboard;
use ncstation::resolver::resolve;
use ncstation::session::{SpinnerSource, run_session};
use ncstation::surface::render;
use std::fs::{self, File};
use std::io::{self, BufReader, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        if log::max_level() < LevelFilter::Error {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else if cli.quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Stations { parameter } => {
            let dashboard = load_dashboard(cli)?;
            let stations: Vec<&Station> = dashboard
                .catalog()
                .stations()
                .iter()
                .filter(|s| parameter.as_ref().is_none_or(|p| &s.parameter == p))
                .collect();
            print_stations(&stations, &cli.output_format, &mut io::stdout().lock())
        }
        Commands::Resolve { point } => {
            let dashboard = load_dashboard(cli)?;
            let (x, y) = projected(point)?;
            let Some(station) = resolve(dashboard.catalog(), x, y) else {
                bail!("No station lies at a finite distance from the point");
            };
            let mut out = io::stdout().lock();
            match cli.output_format {
                OutputFormat::Human => {
                    writeln!(
                        out,
                        "Station {}: {} ({:.1} m away)",
                        station.number,
                        station.label(),
                        station.distance
                    )?;
                    writeln!(out, "  Parameters: {}", station.parameters().join(", "))?;
                    for row in &station.rows {
                        writeln!(out, "  {}/{}", row.parent_folder, row.filename)?;
                    }
                }
                OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&station)?)?,
                OutputFormat::Yaml => write!(out, "{}", serde_yaml::to_string(&station)?)?,
                OutputFormat::Csv => {
                    let mut writer = csv::Writer::from_writer(out);
                    writer.write_record(["number", "parameter", "file", "distance"])?;
                    for row in &station.rows {
                        writer.write_record([
                            station.number.to_string(),
                            row.parameter.clone(),
                            format!("{}/{}", row.parent_folder, row.filename),
                            format!("{:.1}", station.distance),
                        ])?;
                    }
                    writer.flush()?;
                }
            }
            Ok(())
        }
        Commands::Show {
            point,
            year,
            parameter,
            edits,
            save,
        } => {
            let config = load_config(&cli.config_path())?;
            let mut dashboard = open_dashboard(&config)?;
            if cli.output_format == OutputFormat::Human && !cli.quiet {
                dashboard = with_spinner(dashboard, &config);
            }
            let (x, y) = projected(point)?;

            let mut events = vec![Event::StationClicked { x, y }];
            if let Some(year) = year {
                events.push(Event::YearChanged(year.clone()));
            }
            if let Some(parameter) = parameter {
                events.push(Event::ParameterChanged(parameter.clone()));
            }
            events.extend(edits.iter().map(|e| Event::CellEdited {
                row: e.row,
                value: e.value,
            }));
            if *save {
                events.push(Event::SaveClicked);
            }

            let mut failures = Vec::new();
            for event in events {
                debug!("Dispatching {:?}", event);
                for effect in dashboard.dispatch(event) {
                    if let Effect::Diagnostic {
                        level: log::Level::Error,
                        message,
                    } = effect
                    {
                        failures.push(message);
                    }
                }
            }

            writeln!(
                io::stdout().lock(),
                "{}",
                render(&dashboard.view(), &cli.output_format)?
            )?;
            if !failures.is_empty() {
                bail!("{}", failures.join("; "));
            }
            Ok(())
        }
        Commands::Session { script } => {
            let start_time = Instant::now();
            let config_path = cli.config_path();
            let chatty = cli.output_format == OutputFormat::Human && !cli.quiet;
            let mut out = io::stdout().lock();
            if chatty {
                show_greeting(&mut out, &config_path)?;
            }

            let config = load_config(&config_path)?;
            let mut dashboard = open_dashboard(&config)?;
            if chatty {
                config_echo(&mut out, &config, dashboard.catalog())?;
                writeln!(out)?;
                dashboard = with_spinner(dashboard, &config);
            }

            let stats = match script {
                Some(path) => {
                    let file = File::open(path)
                        .with_context(|| format!("Failed to open script {}", path.display()))?;
                    run_session(
                        &mut dashboard,
                        BufReader::new(file),
                        &mut out,
                        &cli.output_format,
                        false,
                    )?
                }
                None => {
                    let stdin = io::stdin();
                    let prompt = chatty && stdin.is_terminal();
                    run_session(
                        &mut dashboard,
                        stdin.lock(),
                        &mut out,
                        &cli.output_format,
                        prompt,
                    )?
                }
            };
            info!(
                "Session ended: {} commands, {} rejected",
                stats.commands, stats.errors
            );
            if chatty {
                show_farewell_with_timing(&mut out, start_time.elapsed())?;
            }
            Ok(())
        }
        Commands::Info {
            file,
            variable,
            time_variable,
        } => {
            let info = get_station_file_info(file, variable.as_deref(), time_variable)?;
            let mut out = io::stdout().lock();
            match cli.output_format {
                OutputFormat::Human => print_file_info_human(&info, &mut out),
                OutputFormat::Json => print_file_info_json(&info, &mut out),
                OutputFormat::Yaml => print_file_info_yaml(&info, &mut out),
                OutputFormat::Csv => print_file_info_csv(&info, &mut out),
            }
        }
        Commands::Validate { check_files } => validate(cli, *check_files),
        Commands::Template { format, output } => {
            let template = ViewerConfig::template();
            let text = match format {
                ConfigFormat::Yaml => serde_yaml::to_string(&template)?,
                ConfigFormat::Json => format!("{}\n", serde_json::to_string_pretty(&template)?),
            };
            write_output(output.as_deref(), text.as_bytes())?;
            if let Some(path) = output {
                info!("Template written to {}", path.display());
            }
            Ok(())
        }
        Commands::Completions { shell, output } => {
            let mut buffer = Vec::new();
            clap_complete::generate(*shell, &mut Cli::command(), "ncstation", &mut buffer);
            write_output(output.as_deref(), &buffer)
        }
    }
}

fn load_config(path: &Path) -> Result<ViewerConfig> {
    ViewerConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration {}", path.display()))
}

fn load_dashboard(cli: &Cli) -> Result<Dashboard> {
    let config = load_config(&cli.config_path())?;
    Ok(open_dashboard(&config)?)
}

fn with_spinner(dashboard: Dashboard, config: &ViewerConfig) -> Dashboard {
    dashboard.with_source(Box::new(SpinnerSource::new(Box::new(
        NetCdfSeriesLoader::from_config(config),
    ))))
}

fn projected(point: &PointArgs) -> Result<(f64, f64)> {
    point.projected().map_err(anyhow::Error::msg)
}

fn write_output(path: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match path {
        Some(path) => fs::write(path, bytes)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            io::stdout().lock().write_all(bytes)?;
            Ok(())
        }
    }
}

fn print_stations(stations: &[&Station], format: &OutputFormat, out: &mut impl Write) -> Result<()> {
    match format {
        OutputFormat::Human => {
            writeln!(
                out,
                "{:>8}  {:<24} {:<24} {:<10} {:>9} {:>9}  {}",
                "number", "name", "site", "parameter", "lat", "lon", "marker"
            )?;
            for s in stations {
                writeln!(
                    out,
                    "{:>8}  {:<24} {:<24} {:<10} {:>9.4} {:>9.4}  {}",
                    s.number,
                    s.name,
                    s.site,
                    s.parameter,
                    s.latitude,
                    s.longitude,
                    s.marker_color()
                )?;
            }
            writeln!(out, "{} rows", stations.len())?;
        }
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(stations)?)?,
        OutputFormat::Yaml => write!(out, "{}", serde_yaml::to_string(stations)?)?,
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record([
                "number", "name", "site", "parameter", "latitude", "longitude", "x", "y", "file",
                "marker",
            ])?;
            for s in stations {
                writer.write_record([
                    s.number.to_string(),
                    s.name.clone(),
                    s.site.clone(),
                    s.parameter.clone(),
                    s.latitude.to_string(),
                    s.longitude.to_string(),
                    s.x.to_string(),
                    s.y.to_string(),
                    format!("{}/{}", s.parent_folder, s.filename),
                    s.marker_color().to_string(),
                ])?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

fn validate(cli: &Cli, check_files: bool) -> Result<()> {
    let config_path = cli.config_path();
    let config = load_config(&config_path)?;
    let dashboard = open_dashboard(&config)?;
    let catalog = dashboard.catalog();

    let mut missing: Vec<PathBuf> = Vec::new();
    if check_files {
        for station in catalog.stations() {
            let path = station.file_path(&config.dir.data_path);
            if !path.is_file() && !missing.contains(&path) {
                warn!("Station {}: missing file {}", station.number, path.display());
                missing.push(path);
            }
        }
    }

    let mut out = io::stdout().lock();
    match cli.output_format {
        OutputFormat::Json | OutputFormat::Yaml => {
            let report = serde_json::json!({
                "config": config_path,
                "rows": catalog.len(),
                "armed": config.settings.armed,
                "missing_files": missing,
            });
            if cli.output_format == OutputFormat::Json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                write!(out, "{}", serde_yaml::to_string(&report)?)?;
            }
        }
        OutputFormat::Human | OutputFormat::Csv => {
            writeln!(out, "Configuration {} is valid", config_path.display())?;
            writeln!(out, "  Manifest rows: {}", catalog.len())?;
            if check_files {
                writeln!(out, "  Missing data files: {}", missing.len())?;
            }
        }
    }
    if !missing.is_empty() {
        bail!("{} data files are missing", missing.len());
    }
    Ok(())
}
