//! Run-fatal errors.
//!
//! Anything here aborts a run before the first send. Per-record failures
//! (composition, attachment, delivery, status write-back) never surface as a
//! `RunError`; they are logged to the run log and counted instead.

use thiserror::Error;

use crate::config::ConfigError;
use crate::contacts::SourceError;
use crate::google_api::GoogleApiError;
use crate::ledger::LedgerError;
use crate::mailer::DeliveryError;
use crate::sheet_status::StatusColumnError;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] GoogleApiError),

    #[error("Failed to load contacts: {0}")]
    Source(#[from] SourceError),

    #[error("{0}")]
    StatusColumn(#[from] StatusColumnError),

    #[error("Failed to load send ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Unable to initialise Gmail: {0}")]
    Transport(#[from] DeliveryError),
}

impl RunError {
    /// Short label used as the alert subject suffix.
    pub fn alert_suffix(&self) -> &'static str {
        match self {
            RunError::Config(_) => "configuration error",
            RunError::Credential(_) => "credential failure",
            RunError::Source(_) => "contacts load failure",
            RunError::StatusColumn(_) => "missing status column",
            RunError::Ledger(_) => "ledger failure",
            RunError::Transport(_) => "gmail service failure",
        }
    }

    /// Returns true if the run could be retried as-is later
    pub fn is_retryable(&self) -> bool {
        match self {
            RunError::Credential(e)
            | RunError::Source(SourceError::Sheets(e))
            | RunError::StatusColumn(StatusColumnError::Sheets(e))
            | RunError::Transport(DeliveryError::Api(e)) => e.is_transient(),
            _ => false,
        }
    }

    /// Process exit status for a failed run: 75 (`EX_TEMPFAIL`) tells a
    /// scheduler the run can be retried as-is, 1 means it needs a fix first.
    pub fn exit_status(&self) -> u8 {
        if self.is_retryable() {
            75
        } else {
            1
        }
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            RunError::Config(_) => "Check the environment variables or your .env file.",
            RunError::Credential(GoogleApiError::MissingScopes(_)) => {
                "Re-authorize token.json with the gmail.send, drive.readonly and spreadsheets scopes."
            }
            RunError::Credential(GoogleApiError::CredentialsNotFound(_))
            | RunError::Credential(GoogleApiError::TokenNotFound(_)) => {
                "Place credentials.json and token.json where GOOGLE_CREDENTIALS_PATH and GOOGLE_TOKEN_PATH point."
            }
            RunError::Credential(_) => {
                "Re-authorize token.json; the stored token could not be used or refreshed."
            }
            RunError::Source(_) => "Check CONTACTS_CSV or the spreadsheet id and range.",
            RunError::StatusColumn(_) => {
                "Add a 'status' column inside SHEETS_RANGE or set SHEETS_STATUS_COLUMN."
            }
            RunError::Ledger(_) => "Fix or remove the file at SENT_LOG_PATH.",
            RunError::Transport(_) => "Set MAIL_FROM or check the Gmail account behind token.json.",
        }
    }
}
