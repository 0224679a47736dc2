//! # Station Catalog
//!
//! In-memory table of every station-parameter row of the manifest, loaded
//! once at startup. Each row is projected onto the map plane on load and may
//! carry a correction status from a secondary manifest.

use crate::input::ColumnMap;
use crate::projection::project;
use csv::ByteRecord;
use log::{debug, info};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading the station or correction manifest.
///
/// These are startup errors; the viewer does not start on a bad manifest.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read manifest '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Manifest '{path}' has no column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Manifest '{path}', row {row}: invalid {field} '{value}'")]
    InvalidValue {
        path: PathBuf,
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("Manifest '{path}', row {row}: empty {field}")]
    EmptyValue {
        path: PathBuf,
        row: usize,
        field: &'static str,
    },

    #[error("Manifest '{path}' lists file '{filename}' of station {number} twice")]
    DuplicateEntry {
        path: PathBuf,
        number: i64,
        filename: String,
    },

    #[error("Unknown correction code '{code}' for station {number}")]
    UnknownCorrectionCode { number: i64, code: String },
}

/// Correction state of a station, shown as the marker colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    Corrected,
    NotCorrected,
}

impl CorrectionStatus {
    /// Maps a manifest status code. Empty and `nan` mean not corrected.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "" | "nan" | "not corrected" => Some(CorrectionStatus::NotCorrected),
            "corrected" => Some(CorrectionStatus::Corrected),
            _ => None,
        }
    }

    pub fn color(self) -> MarkerColor {
        match self {
            CorrectionStatus::Corrected => MarkerColor::Green,
            CorrectionStatus::NotCorrected => MarkerColor::Red,
        }
    }
}

/// Fill colour of a station marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerColor {
    Blue,
    Green,
    Red,
}

impl std::fmt::Display for MarkerColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MarkerColor::Blue => "blue",
            MarkerColor::Green => "green",
            MarkerColor::Red => "red",
        };
        f.write_str(name)
    }
}

/// One manifest row: a station reporting one parameter from one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub number: i64,
    pub name: String,
    pub site: String,
    pub parameter: String,
    pub latitude: f64,
    pub longitude: f64,
    pub x: f64,
    pub y: f64,
    pub filename: String,
    pub parent_folder: String,
    pub correction: Option<CorrectionStatus>,
    /// Every manifest column of the row, in manifest order
    pub metadata: Vec<(String, String)>,
}

impl Station {
    /// `data_path/parent_folder/filename`
    pub fn file_path(&self, data_path: &Path) -> PathBuf {
        data_path.join(&self.parent_folder).join(&self.filename)
    }

    /// `site / name`, as printed when a station is picked.
    pub fn label(&self) -> String {
        format!("{} / {}", self.site, self.name)
    }

    pub fn marker_color(&self) -> MarkerColor {
        self.correction.map_or(MarkerColor::Blue, CorrectionStatus::color)
    }
}

/// Map marker with the hover fields of a station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub number: i64,
    pub x: f64,
    pub y: f64,
    pub name: String,
    pub site: String,
    pub parameter: String,
    pub color: MarkerColor,
}

/// Ordered collection of stations, loaded once.
#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    stations: Vec<Station>,
}

impl StationCatalog {
    pub fn from_stations(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    /// Loads the semicolon-delimited, Latin-1 encoded station manifest.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, a required column is absent, or a row
    /// carries an unparsable station number or coordinate, an empty file
    /// reference, or duplicates another row's file.
    pub fn load(list_path: &Path, columns: &ColumnMap) -> Result<Self, CatalogError> {
        debug!("Loading station manifest: {}", list_path.display());
        let (headers, records) = read_manifest(list_path)?;
        let layout = ManifestLayout::locate(list_path, &headers, columns)?;

        let mut stations = Vec::with_capacity(records.len());
        let mut seen = HashSet::new();
        for (idx, record) in records.iter().enumerate() {
            let row = idx + 1;
            let station = layout.station(list_path, row, &headers, record)?;
            if !seen.insert((station.number, station.filename.clone())) {
                return Err(CatalogError::DuplicateEntry {
                    path: list_path.to_path_buf(),
                    number: station.number,
                    filename: station.filename,
                });
            }
            stations.push(station);
        }

        info!(
            "Loaded {} station rows ({} stations) from {}",
            stations.len(),
            stations.iter().map(|s| s.number).collect::<HashSet<_>>().len(),
            list_path.display()
        );
        Ok(Self { stations })
    }

    /// Assigns a correction status to every station from a secondary manifest.
    ///
    /// Stations the manifest does not mention are marked not corrected.
    ///
    /// # Errors
    ///
    /// Fails on an unreadable manifest or an unknown status code.
    pub fn apply_corrections(
        &mut self,
        corr_path: &Path,
        columns: &ColumnMap,
    ) -> Result<(), CatalogError> {
        debug!("Loading correction manifest: {}", corr_path.display());
        let (headers, records) = read_manifest(corr_path)?;
        let number_idx = column_index(corr_path, &headers, &columns.station_number)?;
        let status_idx = column_index(corr_path, &headers, &columns.correction_status)?;

        let mut statuses = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            let raw_number = field(record, number_idx);
            let number = parse_station_number(&raw_number).ok_or_else(|| {
                CatalogError::InvalidValue {
                    path: corr_path.to_path_buf(),
                    row: idx + 1,
                    field: "station number",
                    value: raw_number.clone(),
                }
            })?;
            let code = field(record, status_idx);
            let status = CorrectionStatus::from_code(&code)
                .ok_or(CatalogError::UnknownCorrectionCode { number, code })?;
            statuses.insert(number, status);
        }

        for station in &mut self.stations {
            let status = statuses
                .get(&station.number)
                .copied()
                .unwrap_or(CorrectionStatus::NotCorrected);
            station.correction = Some(status);
        }
        info!("Applied {} correction entries", statuses.len());
        Ok(())
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// All rows sharing a station number, in catalog order.
    pub fn rows_for(&self, number: i64) -> Vec<Station> {
        self.stations
            .iter()
            .filter(|s| s.number == number)
            .cloned()
            .collect()
    }

    pub fn markers(&self) -> Vec<Marker> {
        self.stations
            .iter()
            .map(|s| Marker {
                number: s.number,
                x: s.x,
                y: s.y,
                name: s.name.clone(),
                site: s.site.clone(),
                parameter: s.parameter.clone(),
                color: s.marker_color(),
            })
            .collect()
    }
}

struct ManifestLayout {
    number: usize,
    name: usize,
    site: usize,
    parameter: usize,
    latitude: usize,
    longitude: usize,
    filename: usize,
    parent_folder: usize,
}

impl ManifestLayout {
    fn locate(path: &Path, headers: &[String], columns: &ColumnMap) -> Result<Self, CatalogError> {
        Ok(Self {
            number: column_index(path, headers, &columns.station_number)?,
            name: column_index(path, headers, &columns.name)?,
            site: column_index(path, headers, &columns.site)?,
            parameter: column_index(path, headers, &columns.parameter)?,
            latitude: column_index(path, headers, &columns.latitude)?,
            longitude: column_index(path, headers, &columns.longitude)?,
            filename: column_index(path, headers, &columns.filename)?,
            parent_folder: column_index(path, headers, &columns.parent_folder)?,
        })
    }

    fn station(
        &self,
        path: &Path,
        row: usize,
        headers: &[String],
        record: &[String],
    ) -> Result<Station, CatalogError> {
        let invalid = |field: &'static str, value: String| CatalogError::InvalidValue {
            path: path.to_path_buf(),
            row,
            field,
            value,
        };

        let raw_number = field(record, self.number);
        let number =
            parse_station_number(&raw_number).ok_or_else(|| invalid("station number", raw_number.clone()))?;
        let raw_lat = field(record, self.latitude);
        // the poles project to infinity
        let latitude = raw_lat
            .parse::<f64>()
            .ok()
            .filter(|lat| lat.is_finite() && lat.abs() < 90.0)
            .ok_or_else(|| invalid("latitude", raw_lat.clone()))?;
        let raw_lon = field(record, self.longitude);
        let longitude = raw_lon
            .parse::<f64>()
            .ok()
            .filter(|lon| lon.is_finite())
            .ok_or_else(|| invalid("longitude", raw_lon.clone()))?;

        let filename = field(record, self.filename);
        if filename.is_empty() {
            return Err(CatalogError::EmptyValue {
                path: path.to_path_buf(),
                row,
                field: "filename",
            });
        }
        let parent_folder = field(record, self.parent_folder);
        if parent_folder.is_empty() {
            return Err(CatalogError::EmptyValue {
                path: path.to_path_buf(),
                row,
                field: "parent folder",
            });
        }

        let (x, y) = project(latitude, longitude);
        let metadata = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), field(record, i)))
            .collect();

        Ok(Station {
            number,
            name: field(record, self.name),
            site: field(record, self.site),
            parameter: field(record, self.parameter),
            latitude,
            longitude,
            x,
            y,
            filename,
            parent_folder,
            correction: None,
            metadata,
        })
    }
}

fn read_manifest(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), CatalogError> {
    let csv_error = |source| CatalogError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;

    let headers = decode_record(reader.byte_headers().map_err(csv_error)?);
    let mut records = Vec::new();
    let mut record = ByteRecord::new();
    while reader.read_byte_record(&mut record).map_err(csv_error)? {
        records.push(decode_record(&record));
    }
    Ok((headers, records))
}

fn decode_record(record: &ByteRecord) -> Vec<String> {
    record.iter().map(|f| decode_latin1(f).trim().to_string()).collect()
}

/// Latin-1 maps every byte to the code point of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn column_index(path: &Path, headers: &[String], column: &str) -> Result<usize, CatalogError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| CatalogError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        })
}

fn field(record: &[String], idx: usize) -> String {
    record.get(idx).cloned().unwrap_or_default()
}

/// Station numbers are integers, sometimes written as `1234.0`.
fn parse_station_number(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 {
        Some(value as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const HEADER: &str = "Stationsnummer;Stationsname;Stationsmessort;Parametername;Geografische_Länge;Geografische_Breite;Höhe;Filename;Parent-Folder";

    fn latin1_bytes(text: &str) -> Vec<u8> {
        text.chars().map(|c| c as u32 as u8).collect()
    }

    fn write_manifest(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, latin1_bytes(&lines.join("\n"))).unwrap();
        path
    }

    #[test]
    fn test_load_decodes_latin1_and_projects() {
        let dir = tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            "stations.csv",
            &[
                HEADER,
                "101;Mühlbach;Pegel Süd;LT;47.5;11.0;600;101_LT.nc;LT-nc",
                "101;Mühlbach;Pegel Süd;Q;47.5;11.0;600;101_Q.nc;Q-nc",
                "202;Au;Ost;LT;48.0;12.0;450;202_LT.nc;LT-nc",
            ],
        );

        let catalog = StationCatalog::load(&path, &ColumnMap::default()).unwrap();
        assert_eq!(catalog.len(), 3);
        let first = &catalog.stations()[0];
        assert_eq!(first.number, 101);
        assert_eq!(first.name, "Mühlbach");
        assert_eq!(first.site, "Pegel Süd");
        assert_eq!(first.latitude, 47.5);
        assert_eq!(first.longitude, 11.0);
        assert_eq!((first.x, first.y), project(47.5, 11.0));
        assert_eq!(first.metadata[6], ("Höhe".to_string(), "600".to_string()));
        assert_eq!(
            first.file_path(Path::new("/data")),
            PathBuf::from("/data/LT-nc/101_LT.nc")
        );
        assert_eq!(first.marker_color(), MarkerColor::Blue);
        assert_eq!(catalog.rows_for(101).len(), 2);
    }

    #[test]
    fn test_missing_manifest_is_error() {
        let dir = tempdir().unwrap();
        let result = StationCatalog::load(&dir.path().join("absent.csv"), &ColumnMap::default());
        assert!(matches!(result, Err(CatalogError::Csv { .. })));
    }

    #[test]
    fn test_missing_column_is_error() {
        let dir = tempdir().unwrap();
        let path = write_manifest(dir.path(), "s.csv", &["Stationsnummer;Stationsname", "1;A"]);
        let result = StationCatalog::load(&path, &ColumnMap::default());
        assert!(matches!(result, Err(CatalogError::MissingColumn { .. })));
    }

    #[test]
    fn test_malformed_coordinate_is_error() {
        let dir = tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            "s.csv",
            &[HEADER, "1;A;B;LT;north;11.0;0;a.nc;LT-nc"],
        );
        let result = StationCatalog::load(&path, &ColumnMap::default());
        assert!(matches!(
            result,
            Err(CatalogError::InvalidValue { field: "latitude", row: 1, .. })
        ));
    }

    #[test]
    fn test_non_finite_coordinate_is_error() {
        let dir = tempdir().unwrap();
        for (row, field) in [
            ("1;A;B;LT;NaN;11.0;0;a.nc;LT-nc", "latitude"),
            ("1;A;B;LT;90;11.0;0;a.nc;LT-nc", "latitude"),
            ("1;A;B;LT;-inf;11.0;0;a.nc;LT-nc", "latitude"),
            ("1;A;B;LT;47.0;inf;0;a.nc;LT-nc", "longitude"),
        ] {
            let path = write_manifest(dir.path(), "s.csv", &[HEADER, row]);
            let result = StationCatalog::load(&path, &ColumnMap::default());
            assert!(
                matches!(&result, Err(CatalogError::InvalidValue { field: f, .. }) if *f == field),
                "accepted {}",
                row
            );
        }
    }

    #[test]
    fn test_empty_file_reference_is_error() {
        let dir = tempdir().unwrap();
        let path = write_manifest(dir.path(), "s.csv", &[HEADER, "1;A;B;LT;47;11;0;;LT-nc"]);
        let result = StationCatalog::load(&path, &ColumnMap::default());
        assert!(matches!(
            result,
            Err(CatalogError::EmptyValue { field: "filename", .. })
        ));
    }

    #[test]
    fn test_duplicate_entry_is_error() {
        let dir = tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            "s.csv",
            &[
                HEADER,
                "1;A;B;LT;47;11;0;a.nc;LT-nc",
                "1;A;B;LT;47;11;0;a.nc;LT-nc",
            ],
        );
        let result = StationCatalog::load(&path, &ColumnMap::default());
        assert!(matches!(result, Err(CatalogError::DuplicateEntry { number: 1, .. })));
    }

    #[test]
    fn test_float_station_number() {
        assert_eq!(parse_station_number("1234.0"), Some(1234));
        assert_eq!(parse_station_number(" 77 "), Some(77));
        assert_eq!(parse_station_number("12.5"), None);
        assert_eq!(parse_station_number("abc"), None);
    }

    #[test]
    fn test_corrections_assign_colors() {
        let dir = tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            "s.csv",
            &[
                HEADER,
                "1;A;B;LT;47;11;0;a.nc;LT-nc",
                "2;C;D;LT;48;12;0;c.nc;LT-nc",
                "3;E;F;LT;49;13;0;e.nc;LT-nc",
            ],
        );
        let corr = write_manifest(
            dir.path(),
            "corr.csv",
            &["Stationsnummer;Status", "1;corrected", "2;nan"],
        );

        let mut catalog = StationCatalog::load(&path, &ColumnMap::default()).unwrap();
        catalog.apply_corrections(&corr, &ColumnMap::default()).unwrap();

        let colors: Vec<MarkerColor> = catalog.markers().iter().map(|m| m.color).collect();
        assert_eq!(colors, vec![MarkerColor::Green, MarkerColor::Red, MarkerColor::Red]);
    }

    #[test]
    fn test_unknown_correction_code_is_error() {
        let dir = tempdir().unwrap();
        let path = write_manifest(dir.path(), "s.csv", &[HEADER, "1;A;B;LT;47;11;0;a.nc;LT-nc"]);
        let corr = write_manifest(dir.path(), "corr.csv", &["Stationsnummer;Status", "1;pending"]);

        let mut catalog = StationCatalog::load(&path, &ColumnMap::default()).unwrap();
        let result = catalog.apply_corrections(&corr, &ColumnMap::default());
        assert!(matches!(
            result,
            Err(CatalogError::UnknownCorrectionCode { number: 1, .. })
        ));
    }

    #[test]
    fn test_correction_codes() {
        assert_eq!(CorrectionStatus::from_code(""), Some(CorrectionStatus::NotCorrected));
        assert_eq!(CorrectionStatus::from_code("NaN"), Some(CorrectionStatus::NotCorrected));
        assert_eq!(
            CorrectionStatus::from_code("not corrected"),
            Some(CorrectionStatus::NotCorrected)
        );
        assert_eq!(CorrectionStatus::from_code("Corrected"), Some(CorrectionStatus::Corrected));
        assert_eq!(CorrectionStatus::from_code("x"), None);
    }
}
