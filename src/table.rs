use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};
use clap::ValueEnum;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::aggregate::{Cell, DailyColumn};

/// Days covered by one run
pub const DEFAULT_HORIZON_DAYS: u32 = 16;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Layer at position {0} was already merged")]
    DuplicateLayer(usize),
    #[error("Column '{0}' already exists")]
    DuplicateColumn(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to prepare {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableLayout {
    /// One row per forecast day, one column per statistic
    DaysAsRows,
    /// One row per statistic, one column per forecast day
    DaysAsColumns,
}

/// Consecutive calendar days starting at the model run date
pub fn forecast_horizon(run_date: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..i64::from(days))
        .map(|offset| run_date + Duration::days(offset))
        .collect()
}

/// Forecast days × aggregated columns for one station
///
/// Layers are stored by their catalog position, so the column order of the
/// written table does not depend on the order layers finish in.
#[derive(Debug, Clone, PartialEq)]
pub struct StationTable {
    station: String,
    horizon: Vec<NaiveDate>,
    layers: BTreeMap<usize, Vec<DailyColumn>>,
}

impl StationTable {
    pub fn new(station: impl Into<String>, horizon: Vec<NaiveDate>) -> Self {
        Self {
            station: station.into(),
            horizon,
            layers: BTreeMap::new(),
        }
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn horizon(&self) -> &[NaiveDate] {
        &self.horizon
    }

    /// Left-join a layer's columns onto the horizon.
    ///
    /// Days outside the horizon are dropped; horizon days without a value stay
    /// blank.
    pub fn insert_layer(
        &mut self,
        position: usize,
        columns: Vec<DailyColumn>,
    ) -> Result<(), TableError> {
        if self.layers.contains_key(&position) {
            return Err(TableError::DuplicateLayer(position));
        }

        let existing: HashSet<&str> = self.columns().map(|c| c.name.as_str()).collect();
        let mut incoming = HashSet::new();
        for column in &columns {
            if existing.contains(column.name.as_str()) || !incoming.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
        }

        let joined = columns
            .into_iter()
            .map(|mut column| {
                column.values.retain(|day, _| self.horizon.contains(day));
                column
            })
            .collect();
        self.layers.insert(position, joined);
        Ok(())
    }

    pub fn columns(&self) -> impl Iterator<Item = &DailyColumn> {
        self.layers.values().flatten()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns().map(|c| c.name.as_str()).collect()
    }

    pub fn cell(&self, day: NaiveDate, column: &str) -> Option<&Cell> {
        self.columns()
            .find(|c| c.name == column)
            .and_then(|c| c.values.get(&day))
    }

    pub fn write_csv<W: Write>(&self, writer: W, layout: TableLayout) -> Result<(), csv::Error> {
        let mut csv = csv::Writer::from_writer(writer);
        let columns: Vec<&DailyColumn> = self.columns().collect();
        let blank = String::new();
        let render = |column: &DailyColumn, day: &NaiveDate| {
            column
                .values
                .get(day)
                .map(Cell::to_string)
                .unwrap_or_else(|| blank.clone())
        };

        match layout {
            TableLayout::DaysAsRows => {
                let mut header = vec![String::new()];
                header.extend(columns.iter().map(|c| c.name.clone()));
                csv.write_record(&header)?;
                for day in &self.horizon {
                    let mut row = vec![day.to_string()];
                    row.extend(columns.iter().map(|c| render(c, day)));
                    csv.write_record(&row)?;
                }
            }
            TableLayout::DaysAsColumns => {
                let mut header = vec![String::new()];
                header.extend(self.horizon.iter().map(NaiveDate::to_string));
                csv.write_record(&header)?;
                for column in &columns {
                    let mut row = vec![column.name.clone()];
                    row.extend(self.horizon.iter().map(|day| render(column, day)));
                    csv.write_record(&row)?;
                }
            }
        }

        csv.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self, layout: TableLayout) -> Result<String, csv::Error> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf, layout)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Write `<output_dir>/<station>.csv`, replacing any previous file
    #[instrument(skip(self), fields(station = %self.station))]
    pub fn save(&self, output_dir: &Path, layout: TableLayout) -> Result<PathBuf, PersistenceError> {
        std::fs::create_dir_all(output_dir).map_err(|source| PersistenceError::Io {
            path: output_dir.display().to_string(),
            source,
        })?;

        let path = output_dir.join(format!("{}.csv", self.station));
        let io_error = |source| PersistenceError::Io {
            path: path.display().to_string(),
            source,
        };

        // Written beside the target and renamed, so a failed write leaves the
        // previous file untouched
        let mut staged = tempfile::NamedTempFile::new_in(output_dir).map_err(io_error)?;
        self.write_csv(staged.as_file_mut(), layout)
            .map_err(|source| PersistenceError::Csv {
                path: path.display().to_string(),
                source,
            })?;
        staged.persist(&path).map_err(|e| io_error(e.error))?;

        debug!("Wrote {} ({} columns)", path.display(), self.columns().count());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn column(name: &str, values: &[(u32, f64)]) -> DailyColumn {
        DailyColumn {
            name: name.to_string(),
            values: values
                .iter()
                .map(|&(d, v)| (day(d), Cell::Number(v)))
                .collect(),
        }
    }

    #[test]
    fn test_forecast_horizon() {
        let horizon = forecast_horizon(day(30), 16);
        assert_eq!(horizon.len(), 16);
        assert_eq!(horizon[0], day(30));
        assert_eq!(horizon[2], NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(horizon[15], NaiveDate::from_ymd_opt(2025, 2, 14).unwrap());
    }

    #[test]
    fn test_left_join_drops_out_of_horizon_days() {
        let mut table = StationTable::new("S", forecast_horizon(day(10), 3));
        table
            .insert_layer(0, vec![column("a", &[(9, 1.0), (10, 2.0), (13, 3.0)])])
            .unwrap();

        assert_eq!(table.cell(day(10), "a"), Some(&Cell::Number(2.0)));
        assert_eq!(table.cell(day(9), "a"), None);
        assert_eq!(table.cell(day(13), "a"), None);
        assert_eq!(table.cell(day(11), "a"), None);
    }

    #[test]
    fn test_column_order_follows_position() {
        let mut table = StationTable::new("S", forecast_horizon(day(10), 2));
        table.insert_layer(2, vec![column("c", &[])]).unwrap();
        table
            .insert_layer(0, vec![column("a_min", &[]), column("a_max", &[])])
            .unwrap();
        table.insert_layer(1, vec![column("b", &[])]).unwrap();
        assert_eq!(table.column_names(), vec!["a_min", "a_max", "b", "c"]);
    }

    #[test]
    fn test_rejects_overwrites() {
        let mut table = StationTable::new("S", forecast_horizon(day(10), 2));
        table.insert_layer(0, vec![column("a", &[])]).unwrap();
        assert!(matches!(
            table.insert_layer(0, vec![column("z", &[])]),
            Err(TableError::DuplicateLayer(0))
        ));
        assert!(matches!(
            table.insert_layer(1, vec![column("a", &[])]),
            Err(TableError::DuplicateColumn(_))
        ));
        assert_eq!(table.column_names(), vec!["a"]);
    }

    #[test]
    fn test_csv_days_as_rows() {
        let mut table = StationTable::new("S", forecast_horizon(day(10), 3));
        table
            .insert_layer(0, vec![column("t_min", &[(10, -3.0), (12, 1.0)])])
            .unwrap();
        table
            .insert_layer(
                1,
                vec![DailyColumn {
                    name: "wd".to_string(),
                    values: [(day(11), Cell::Text("SW".to_string()))].into_iter().collect(),
                }],
            )
            .unwrap();

        let csv = table.to_csv_string(TableLayout::DaysAsRows).unwrap();
        assert_eq!(
            csv,
            ",t_min,wd\n2025-01-10,-3,\n2025-01-11,,SW\n2025-01-12,1,\n"
        );
    }

    #[test]
    fn test_csv_days_as_columns() {
        let mut table = StationTable::new("S", forecast_horizon(day(10), 2));
        table
            .insert_layer(0, vec![column("Rain Total", &[(11, 4.0)])])
            .unwrap();

        let csv = table.to_csv_string(TableLayout::DaysAsColumns).unwrap();
        assert_eq!(csv, ",2025-01-10,2025-01-11\nRain Total,,4\n");
    }

    #[test]
    fn test_csv_with_no_columns_keeps_every_day() {
        let table = StationTable::new("S", forecast_horizon(day(10), 16));
        let csv = table.to_csv_string(TableLayout::DaysAsRows).unwrap();
        assert_eq!(csv.lines().count(), 17);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = StationTable::new("Shames", forecast_horizon(day(10), 1));
        let first = table.save(dir.path(), TableLayout::DaysAsRows).unwrap();
        table.insert_layer(0, vec![column("a", &[(10, 1.0)])]).unwrap();
        let second = table.save(dir.path(), TableLayout::DaysAsRows).unwrap();

        assert_eq!(first, second);
        assert_eq!(second, dir.path().join("Shames.csv"));
        let content = std::fs::read_to_string(second).unwrap();
        assert_eq!(content, ",a\n2025-01-10,1\n");
    }

    #[test]
    fn test_failed_save_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = StationTable::new("Shames", forecast_horizon(day(10), 1));
        table.insert_layer(0, vec![column("a", &[(10, 1.0)])]).unwrap();
        let path = table.save(dir.path(), TableLayout::DaysAsRows).unwrap();

        // A directory at the target path makes the final rename fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let result = table.save(dir.path(), TableLayout::DaysAsRows);
        assert!(matches!(result, Err(PersistenceError::Io { .. })));
        assert!(path.join("keep").exists());

        // No staging files are left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|name| name != "Shames.csv")
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
    }
}
