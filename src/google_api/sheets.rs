//! Sheets API v4: read a value range, write cells back in one batch.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_status, send_with_retry, GoogleApiError, RetryPolicy, TokenSource};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// One cell write inside a `values:batchUpdate` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueUpdate {
    /// A1 reference, e.g. `Contacts!D7`.
    pub range: String,
    pub values: Vec<Vec<String>>,
}

impl ValueUpdate {
    pub fn cell(range: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            range: range.into(),
            values: vec![vec![value.into()]],
        }
    }
}

/// The slice of the Sheets values API the mailer depends on.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Rows of the range as display strings. Trailing empty cells may be absent.
    async fn get_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, GoogleApiError>;

    async fn batch_update(
        &self,
        spreadsheet_id: &str,
        updates: &[ValueUpdate],
    ) -> Result<(), GoogleApiError>;
}

#[derive(Debug, Deserialize)]
struct ValueRangeResponse {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateRequest<'a> {
    value_input_option: &'static str,
    data: &'a [ValueUpdate],
}

pub struct GoogleSheets {
    tokens: Arc<TokenSource>,
}

impl GoogleSheets {
    pub fn new(tokens: Arc<TokenSource>) -> Self {
        Self { tokens }
    }
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetsApi for GoogleSheets {
    async fn get_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, GoogleApiError> {
        let access_token = self.tokens.access_token().await?;
        let url = format!("{}/{}/values/{}", SHEETS_API, spreadsheet_id, range);
        let resp = send_with_retry(
            self.tokens.http().get(&url).bearer_auth(&access_token),
            &RetryPolicy::default(),
        )
        .await?;
        let resp = check_status(resp).await?;

        let body: ValueRangeResponse = resp.json().await?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn batch_update(
        &self,
        spreadsheet_id: &str,
        updates: &[ValueUpdate],
    ) -> Result<(), GoogleApiError> {
        if updates.is_empty() {
            return Ok(());
        }
        let access_token = self.tokens.access_token().await?;
        let url = format!("{}/{}/values:batchUpdate", SHEETS_API, spreadsheet_id);
        let body = BatchUpdateRequest {
            value_input_option: "RAW",
            data: updates,
        };
        let resp = send_with_retry(
            self.tokens
                .http()
                .post(&url)
                .bearer_auth(&access_token)
                .json(&body),
            &RetryPolicy::default(),
        )
        .await?;
        check_status(resp).await?;
        Ok(())
    }
}
