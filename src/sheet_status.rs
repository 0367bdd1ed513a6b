//! Status write-back to the Sheet row a contact came from.
//!
//! Column letters are resolved once per run from the header row. An explicit
//! column override wins; otherwise the header position is shifted by the start
//! column of the configured range, so `Contacts!C:H` with `status` in the
//! second header cell writes to column `D`.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::a1;
use crate::config::SheetConfig;
use crate::contacts::sheet::{split_header, POSITIONAL_HEADERS};
use crate::google_api::sheets::{SheetsApi, ValueUpdate};
use crate::google_api::GoogleApiError;
use crate::util::{normalize_header, utc_stamp};

pub const STATUS_SENT: &str = "SENT";
pub const STATUS_DRY_RUN: &str = "DRY_RUN";
pub const STATUS_REQUIRED_FIELD_MISSING: &str = "required_field_missing";

#[derive(Debug, thiserror::Error)]
pub enum StatusColumnError {
    #[error("Sheet range {range} has no header row")]
    EmptyHeader { range: String },
    #[error(
        "No 'status' or 'email_sent' column found in the first row of {range}. \
         Include a status column in SHEETS_RANGE or set SHEETS_STATUS_COLUMN."
    )]
    Missing { range: String },
    #[error("Failed to read sheet headers: {0}")]
    Sheets(#[from] GoogleApiError),
}

/// Resolved write targets for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub sheet_name: Option<String>,
    pub status: Option<String>,
    pub sent_at: Option<String>,
}

fn header_index(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| normalize_header(h) == name)
}

impl ColumnLayout {
    /// Resolve columns from a header row, enforcing the status-column guard.
    pub fn from_headers(headers: &[String], config: &SheetConfig) -> Result<Self, StatusColumnError> {
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(StatusColumnError::EmptyHeader {
                range: config.range.clone(),
            });
        }

        let offset = a1::start_col_index(&config.range);
        let inferred = |idx: Option<usize>| idx.map(|i| a1::num_to_col(offset + i));

        let status_idx =
            header_index(headers, "status").or_else(|| header_index(headers, "email_sent"));
        if status_idx.is_none() && config.status_column.is_none() {
            return Err(StatusColumnError::Missing {
                range: config.range.clone(),
            });
        }

        Ok(Self {
            sheet_name: a1::sheet_name(&config.range).map(str::to_string),
            status: config.status_column.clone().or_else(|| inferred(status_idx)),
            sent_at: config
                .sent_at_column
                .clone()
                .or_else(|| inferred(header_index(headers, "sent_at"))),
        })
    }

    fn cell(&self, column: &str, row: u32) -> String {
        match &self.sheet_name {
            Some(sheet) => format!("{}!{}{}", sheet, column, row),
            None => format!("{}{}", column, row),
        }
    }

    /// Cell updates for one status write; empty when nothing resolves or row is 0.
    pub fn updates_for(&self, row: u32, status: &str, now: DateTime<Utc>) -> Vec<ValueUpdate> {
        if row == 0 {
            return Vec::new();
        }
        let mut updates = Vec::with_capacity(2);
        if let Some(column) = &self.status {
            updates.push(ValueUpdate::cell(self.cell(column, row), status));
        }
        if let Some(column) = &self.sent_at {
            updates.push(ValueUpdate::cell(self.cell(column, row), utc_stamp(now)));
        }
        updates
    }
}

pub struct RemoteStatusWriter {
    api: Arc<dyn SheetsApi>,
    spreadsheet_id: String,
    layout: ColumnLayout,
}

impl RemoteStatusWriter {
    /// Read the header row once and resolve the write columns.
    pub async fn connect(
        api: Arc<dyn SheetsApi>,
        config: &SheetConfig,
    ) -> Result<Self, StatusColumnError> {
        let headers = if config.has_header {
            let values = api.get_values(&config.spreadsheet_id, &config.range).await?;
            split_header(values, true).0
        } else {
            POSITIONAL_HEADERS.iter().map(|h| h.to_string()).collect()
        };
        let layout = ColumnLayout::from_headers(&headers, config)?;
        log::debug!(
            "Status column {:?}, sent_at column {:?}",
            layout.status,
            layout.sent_at
        );
        Ok(Self::with_layout(api, config.spreadsheet_id.clone(), layout))
    }

    pub fn with_layout(api: Arc<dyn SheetsApi>, spreadsheet_id: String, layout: ColumnLayout) -> Self {
        Self {
            api,
            spreadsheet_id,
            layout,
        }
    }

    /// Write `status` (and the current time to `sent_at`) for `row`.
    pub async fn write(&self, row: u32, status: &str) -> Result<(), GoogleApiError> {
        let updates = self.layout.updates_for(row, status, Utc::now());
        if updates.is_empty() {
            return Ok(());
        }
        self.api.batch_update(&self.spreadsheet_id, &updates).await
    }
}
