//! Local contact lists: CSV via `csv`, Excel/ODS via `calamine`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ContactRecord, ContactSource, SourceError};

pub struct FileContactSource {
    path: PathBuf,
}

impl FileContactSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContactSource for FileContactSource {
    async fn load(&self) -> Result<Vec<ContactRecord>, SourceError> {
        if !self.path.exists() {
            return Err(SourceError::NotFound(self.path.clone()));
        }
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let records = match ext.as_str() {
            "csv" => read_csv(&self.path)?,
            "xlsx" | "xlsm" | "xls" | "ods" => read_workbook(&self.path)?,
            _ => return Err(SourceError::UnsupportedFormat(self.path.clone())),
        };
        log::info!(
            "Loaded {} contacts from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }
}

fn read_csv(path: &Path) -> Result<Vec<ContactRecord>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let values: Vec<String> = row?.iter().map(str::to_string).collect();
        records.push(ContactRecord::from_cells(&headers, &values, None));
    }
    Ok(records)
}

fn read_workbook(path: &Path) -> Result<Vec<ContactRecord>, SourceError> {
    use calamine::{open_workbook_auto, Reader};

    let mut workbook =
        open_workbook_auto(path).map_err(|e| SourceError::Workbook(e.to_string()))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| SourceError::Workbook(e.to_string()))?,
        None => return Ok(Vec::new()),
    };

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(cell_to_string).collect(),
        None => return Ok(Vec::new()),
    };

    Ok(rows
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
        .filter(|values| values.iter().any(|v| !v.trim().is_empty()))
        .map(|values| ContactRecord::from_cells(&headers, &values, None))
        .collect())
}

fn cell_to_string(cell: &calamine::Data) -> String {
    use calamine::Data;
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(n) => n.to_string(),
        Data::Float(f) => format!("{}", f),
        Data::Bool(b) => b.to_string(),
        Data::Error(_) => String::new(),
        Data::DateTime(dt) => format!("{}", dt),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}
