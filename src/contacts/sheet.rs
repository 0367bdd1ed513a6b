//! Contacts read from a Google Sheet range.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ContactRecord, ContactSource, SourceError};
use crate::a1;
use crate::google_api::sheets::SheetsApi;

/// Column order assumed when the range has no header row.
pub const POSITIONAL_HEADERS: &[&str] = &[
    "name",
    "email",
    "company",
    "role",
    "personalized_note",
    "template",
    "resume",
];

pub struct SheetContactSource {
    api: Arc<dyn SheetsApi>,
    spreadsheet_id: String,
    range: String,
    has_header: bool,
}

impl SheetContactSource {
    pub fn new(
        api: Arc<dyn SheetsApi>,
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
        has_header: bool,
    ) -> Self {
        Self {
            api,
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
            has_header,
        }
    }

    /// Sheet row of the first data row.
    fn first_data_row(&self) -> u32 {
        a1::start_row(&self.range) + u32::from(self.has_header)
    }
}

/// Split fetched values into headers and data rows.
pub fn split_header(values: Vec<Vec<String>>, has_header: bool) -> (Vec<String>, Vec<Vec<String>>) {
    if has_header {
        let mut rows = values.into_iter();
        let headers = rows.next().unwrap_or_default();
        (headers, rows.collect())
    } else {
        let headers = POSITIONAL_HEADERS.iter().map(|h| h.to_string()).collect();
        (headers, values)
    }
}

#[async_trait]
impl ContactSource for SheetContactSource {
    async fn load(&self) -> Result<Vec<ContactRecord>, SourceError> {
        let values = self
            .api
            .get_values(&self.spreadsheet_id, &self.range)
            .await?;
        if values.is_empty() {
            log::info!("Sheet range {} is empty", self.range);
            return Ok(Vec::new());
        }

        let (headers, rows) = split_header(values, self.has_header);
        let first_row = self.first_data_row();
        let records: Vec<ContactRecord> = rows
            .iter()
            .enumerate()
            .map(|(idx, values)| {
                ContactRecord::from_cells(&headers, values, Some(first_row + idx as u32))
            })
            .collect();
        log::info!(
            "Loaded {} contacts from sheet range {}",
            records.len(),
            self.range
        );
        Ok(records)
    }
}
