//! CSV directory provider: one `<instrument>.csv` file per instrument with a
//! `date,open,close,volume` header.

use super::provider::{PriceError, PriceProvider, PriceRow};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CsvDirProvider {
    dir: PathBuf,
}

impl CsvDirProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, instrument: &str) -> PathBuf {
        self.dir.join(format!("{instrument}.csv"))
    }

    /// Read every row in the file, unfiltered.
    pub fn read_all(&self, instrument: &str) -> Result<Vec<PriceRow>, PriceError> {
        let path = self.path_for(instrument);
        if !path.exists() {
            return Err(PriceError::NotFound {
                instrument: instrument.to_string(),
            });
        }
        let display = path.display().to_string();
        let mut reader = csv::Reader::from_path(&path).map_err(|e| PriceError::Io {
            path: display.clone(),
            message: e.to_string(),
        })?;
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let row: PriceRow = record.map_err(|e| PriceError::Parse {
                path: display.clone(),
                message: e.to_string(),
            })?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Write `rows` to `<dir>/<instrument>.csv`, creating the directory.
    pub fn write_series(&self, instrument: &str, rows: &[PriceRow]) -> Result<(), PriceError> {
        let path = self.path_for(instrument);
        let display = path.display().to_string();
        let io_err = |message: String| PriceError::Io {
            path: display.clone(),
            message,
        };
        std::fs::create_dir_all(&self.dir).map_err(|e| io_err(e.to_string()))?;
        let mut writer = csv::Writer::from_path(&path).map_err(|e| io_err(e.to_string()))?;
        for row in rows {
            writer.serialize(row).map_err(|e| io_err(e.to_string()))?;
        }
        writer.flush().map_err(|e| io_err(e.to_string()))?;
        Ok(())
    }
}

impl PriceProvider for CsvDirProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(
        &self,
        instrument: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, PriceError> {
        Ok(self
            .read_all(instrument)?
            .into_iter()
            .filter(|r| r.date >= start && r.date <= end)
            .collect())
    }
}
