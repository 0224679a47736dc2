use crate::catalog::{MarkerColor, StationCatalog};
use crate::input::ViewerConfig;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

pub fn show_greeting(out: &mut impl Write, config_path: &Path) -> io::Result<()> {
    writeln!(out, "=== NetCDF Station Explorer ===")?;
    writeln!(out, "Loading configuration from: {}", config_path.display())
}

pub fn config_echo(
    out: &mut impl Write,
    config: &ViewerConfig,
    catalog: &StationCatalog,
) -> io::Result<()> {
    writeln!(out, "\nConfiguration:")?;
    writeln!(out, "  Station manifest: {}", config.dir.list_path.display())?;
    writeln!(out, "  Data directory: {}", config.dir.data_path.display())?;
    match &config.dir.corr_path {
        Some(path) => writeln!(out, "  Correction manifest: {}", path.display())?,
        None => writeln!(out, "  Correction manifest: none")?,
    }
    if config.settings.armed {
        writeln!(out, "  Mode: ARMED, saves overwrite source files")?;
    } else {
        writeln!(
            out,
            "  Mode: unarmed, saves write '{}' copies",
            config.settings.unarmed_prefix
        )?;
    }

    let stations: HashSet<i64> = catalog.stations().iter().map(|s| s.number).collect();
    writeln!(
        out,
        "  Stations: {} ({} manifest rows)",
        stations.len(),
        catalog.len()
    )?;
    for color in [MarkerColor::Green, MarkerColor::Red] {
        let count = catalog
            .markers()
            .iter()
            .filter(|m| m.color == color)
            .count();
        if count > 0 {
            writeln!(out, "    {} markers: {}", color, count)?;
        }
    }
    Ok(())
}

pub fn show_farewell_with_timing(out: &mut impl Write, elapsed: Duration) -> io::Result<()> {
    writeln!(
        out,
        "\n=== Session closed after {:.1}s ===",
        elapsed.as_secs_f64()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CorrectionStatus, Station};

    #[test]
    fn test_config_echo_counts_stations_and_colors() {
        let mut config = ViewerConfig::template();
        config.settings.armed = true;
        let row = |number, correction| Station {
            number,
            name: String::new(),
            site: String::new(),
            parameter: "T".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            x: 0.0,
            y: 0.0,
            filename: format!("{}.nc", number),
            parent_folder: "T-nc".to_string(),
            correction,
            metadata: Vec::new(),
        };
        let catalog = StationCatalog::from_stations(vec![
            row(1, Some(CorrectionStatus::Corrected)),
            row(1, Some(CorrectionStatus::Corrected)),
            row(2, Some(CorrectionStatus::NotCorrected)),
        ]);

        let mut out = Vec::new();
        config_echo(&mut out, &config, &catalog).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Mode: ARMED"));
        assert!(text.contains("Stations: 2 (3 manifest rows)"));
        assert!(text.contains("green markers: 2"));
        assert!(text.contains("red markers: 1"));
    }
}
