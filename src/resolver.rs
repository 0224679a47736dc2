//! # Station Resolver
//!
//! Nearest-station lookup for a map click. The catalog holds stations, not
//! observation points, so a linear scan over projected coordinates is enough.

use crate::catalog::{Station, StationCatalog};
use log::debug;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Every catalog row of the station nearest to a query point.
///
/// A station reporting several parameters has one row per parameter; all of
/// them are returned, in catalog order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedStation {
    pub number: i64,
    pub rows: Vec<Station>,
    /// Distance from the query point to the closest row, in projected meters
    pub distance: f64,
}

impl ResolvedStation {
    /// The row that identifies the station for display.
    pub fn primary(&self) -> &Station {
        &self.rows[0]
    }

    pub fn label(&self) -> String {
        self.primary().label()
    }

    pub fn parameters(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for row in &self.rows {
            if !names.contains(&row.parameter) {
                names.push(row.parameter.clone());
            }
        }
        names
    }

    /// Distinct data files of the station, in catalog order.
    pub fn file_paths(&self, data_path: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for row in &self.rows {
            let path = row.file_path(data_path);
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }
}

/// Resolves the station nearest to the projected point `(x, y)`.
///
/// Ties on the minimum distance go to the earliest catalog row. Stations
/// whose distance is not finite are never chosen. Returns `None` only when
/// no station qualifies; a click far away from every station still
/// resolves to the nearest one.
///
/// # Examples
///
/// ```rust
/// use ncstation::catalog::StationCatalog;
/// use ncstation::resolver::resolve;
///
/// let catalog = StationCatalog::default();
/// assert!(resolve(&catalog, 0.0, 0.0).is_none());
/// ```
pub fn resolve(catalog: &StationCatalog, x: f64, y: f64) -> Option<ResolvedStation> {
    let mut nearest: Option<(usize, f64)> = None;
    for (idx, station) in catalog.stations().iter().enumerate() {
        let distance = (station.x - x).hypot(station.y - y);
        if !distance.is_finite() {
            continue;
        }
        match nearest {
            Some((_, best)) if distance >= best => {}
            _ => nearest = Some((idx, distance)),
        }
    }

    let (idx, distance) = nearest?;
    let number = catalog.stations()[idx].number;
    let rows = catalog.rows_for(number);
    debug!(
        "Click ({:.1}, {:.1}) resolved to station {} at {:.1} m ({} rows)",
        x,
        y,
        number,
        distance,
        rows.len()
    );
    Some(ResolvedStation {
        number,
        rows,
        distance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(number: i64, parameter: &str, x: f64, y: f64) -> Station {
        Station {
            number,
            name: format!("Station {}", number),
            site: format!("Site {}", number),
            parameter: parameter.to_string(),
            latitude: 0.0,
            longitude: 0.0,
            x,
            y,
            filename: format!("{}_{}.nc", number, parameter),
            parent_folder: format!("{}-nc", parameter),
            correction: None,
            metadata: Vec::new(),
        }
    }

    fn catalog() -> StationCatalog {
        StationCatalog::from_stations(vec![
            station(1, "LT", 0.0, 0.0),
            station(2, "LT", 100.0, 100.0),
            station(3, "LT", -50.0, 200.0),
            station(2, "Q", 100.0, 100.0),
        ])
    }

    #[test]
    fn test_exact_hit_returns_all_rows_of_station() {
        let resolved = resolve(&catalog(), 100.0, 100.0).unwrap();
        assert_eq!(resolved.number, 2);
        assert_eq!(resolved.distance, 0.0);
        assert_eq!(resolved.rows.len(), 2);
        assert_eq!(resolved.parameters(), vec!["LT", "Q"]);
        assert_eq!(
            resolved.file_paths(Path::new("/data")),
            vec![
                PathBuf::from("/data/LT-nc/2_LT.nc"),
                PathBuf::from("/data/Q-nc/2_Q.nc")
            ]
        );
    }

    #[test]
    fn test_far_click_resolves_nearest() {
        let resolved = resolve(&catalog(), -1.0e7, 1.0e7).unwrap();
        assert_eq!(resolved.number, 3);
        assert!(resolved.distance > 0.0);
    }

    #[test]
    fn test_tie_goes_to_first_row() {
        let catalog = StationCatalog::from_stations(vec![
            station(7, "LT", -10.0, 0.0),
            station(8, "LT", 10.0, 0.0),
        ]);
        assert_eq!(resolve(&catalog, 0.0, 0.0).unwrap().number, 7);
    }

    #[test]
    fn test_unprojectable_station_never_wins() {
        let catalog = StationCatalog::from_stations(vec![
            station(5, "LT", f64::NAN, 0.0),
            station(6, "LT", 0.0, f64::INFINITY),
            station(7, "LT", 500.0, 0.0),
        ]);
        let resolved = resolve(&catalog, 0.0, 0.0).unwrap();
        assert_eq!(resolved.number, 7);
        assert_eq!(resolved.distance, 500.0);

        let only_nan = StationCatalog::from_stations(vec![station(5, "LT", f64::NAN, f64::NAN)]);
        assert!(resolve(&only_nan, 0.0, 0.0).is_none());
    }

    #[test]
    fn test_empty_catalog() {
        assert!(resolve(&StationCatalog::default(), 1.0, 2.0).is_none());
    }
}
