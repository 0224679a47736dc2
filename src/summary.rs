//! Station summary shown next to the map: time span, manifest metadata and
//! descriptive statistics of every parameter.

use crate::input::ColumnMap;
use crate::resolver::ResolvedStation;
use crate::series::StationSeries;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// Descriptive statistics of one parameter, missing values excluded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterStats {
    pub name: String,
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation (n - 1)
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub median: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

impl ParameterStats {
    pub fn compute(name: &str, values: &[Option<f64>]) -> Self {
        let mut present: Vec<f64> = values.iter().flatten().copied().collect();
        present.sort_by(f64::total_cmp);

        let count = present.len();
        let mean = (count > 0).then(|| present.iter().sum::<f64>() / count as f64);
        let std = mean.filter(|_| count > 1).map(|m| {
            let ss: f64 = present.iter().map(|v| (v - m).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        });

        Self {
            name: name.to_string(),
            count,
            mean,
            std,
            min: present.first().copied(),
            q25: quantile(&present, 0.25),
            median: quantile(&present, 0.5),
            q75: quantile(&present, 0.75),
            max: present.last().copied(),
        }
    }
}

/// Linear interpolation between the closest ranks of sorted data.
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Summary of the selected station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub station: i64,
    pub label: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub metadata: Vec<(String, String)>,
    pub statistics: Vec<ParameterStats>,
}

impl Summary {
    /// Builds the summary of a freshly loaded series.
    ///
    /// Metadata comes from the station's first manifest row without the file
    /// location columns. The parameter column lists every parameter of the
    /// station.
    pub fn build(station: &ResolvedStation, series: &StationSeries, columns: &ColumnMap) -> Self {
        let parameters = station.parameters().join(", ");
        let metadata = station
            .primary()
            .metadata
            .iter()
            .filter(|(key, _)| *key != columns.filename && *key != columns.parent_folder)
            .map(|(key, value)| {
                if *key == columns.parameter {
                    (key.clone(), parameters.clone())
                } else {
                    (key.clone(), value.clone())
                }
            })
            .collect();

        let statistics = series
            .parameters()
            .iter()
            .map(|p| ParameterStats::compute(p, &series.values(p).unwrap_or_default()))
            .collect();

        Self {
            station: station.number,
            label: station.label(),
            start: series.first(),
            end: series.last(),
            metadata,
            statistics,
        }
    }
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v))
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Station {}: {}", self.station, self.label)?;
        match (self.start, self.end) {
            (Some(start), Some(end)) => writeln!(
                f,
                "Period: {} to {}",
                start.format("%Y-%m-%d %H:%M"),
                end.format("%Y-%m-%d %H:%M")
            )?,
            _ => writeln!(f, "Period: no observations")?,
        }

        for (key, value) in &self.metadata {
            writeln!(f, "  {}: {}", key, value)?;
        }

        writeln!(
            f,
            "{:<16} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "parameter", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
        )?;
        for s in &self.statistics {
            writeln!(
                f,
                "{:<16} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
                s.name,
                s.count,
                cell(s.mean),
                cell(s.std),
                cell(s.min),
                cell(s.q25),
                cell(s.median),
                cell(s.q75),
                cell(s.max)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Station;
    use chrono::NaiveDate;

    fn row(parameter: &str) -> Station {
        Station {
            number: 5,
            name: "Au".to_string(),
            site: "Ost".to_string(),
            parameter: parameter.to_string(),
            latitude: 48.0,
            longitude: 12.0,
            x: 0.0,
            y: 0.0,
            filename: format!("5_{}.nc", parameter),
            parent_folder: format!("{}-nc", parameter),
            correction: None,
            metadata: vec![
                ("Stationsnummer".to_string(), "5".to_string()),
                ("Stationsname".to_string(), "Au".to_string()),
                ("Parametername".to_string(), parameter.to_string()),
                ("Filename".to_string(), format!("5_{}.nc", parameter)),
                ("Parent-Folder".to_string(), format!("{}-nc", parameter)),
            ],
        }
    }

    #[test]
    fn test_statistics_match_describe() {
        let stats = ParameterStats::compute("T", &[Some(4.0), None, Some(1.0), Some(3.0), Some(2.0)]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, Some(2.5));
        assert!((stats.std.unwrap() - 1.2909944487358056).abs() < 1e-12);
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.q25, Some(1.75));
        assert_eq!(stats.median, Some(2.5));
        assert_eq!(stats.q75, Some(3.25));
        assert_eq!(stats.max, Some(4.0));
    }

    #[test]
    fn test_statistics_of_empty_and_single() {
        let empty = ParameterStats::compute("T", &[None, None]);
        assert_eq!(empty.count, 0);
        assert_eq!(empty.mean, None);
        assert_eq!(empty.median, None);

        let single = ParameterStats::compute("T", &[Some(7.0)]);
        assert_eq!(single.mean, Some(7.0));
        assert_eq!(single.std, None);
        assert_eq!(single.q75, Some(7.0));
    }

    #[test]
    fn test_build_summary() {
        let station = ResolvedStation {
            number: 5,
            rows: vec![row("T"), row("Q")],
            distance: 0.0,
        };
        let t0 = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let t1 = NaiveDate::from_ymd_opt(2015, 12, 31).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let series = StationSeries::from_columns(
            &[t0, t1],
            vec![
                ("T".to_string(), vec![Some(1.0), Some(3.0)]),
                ("Q".to_string(), vec![None, Some(0.5)]),
            ],
        )
        .unwrap();

        let summary = Summary::build(&station, &series, &ColumnMap::default());
        assert_eq!(summary.start, Some(t0));
        assert_eq!(summary.end, Some(t1));
        assert_eq!(
            summary.metadata,
            vec![
                ("Stationsnummer".to_string(), "5".to_string()),
                ("Stationsname".to_string(), "Au".to_string()),
                ("Parametername".to_string(), "T, Q".to_string()),
            ]
        );
        assert_eq!(summary.statistics.len(), 2);
        assert_eq!(summary.statistics[1].count, 1);

        let text = summary.to_string();
        assert!(text.contains("Station 5: Ost / Au"));
        assert!(text.contains("Period: 2015-01-01 00:00 to 2015-12-31 12:00"));
        assert!(text.contains("Parametername: T, Q"));
    }
}
