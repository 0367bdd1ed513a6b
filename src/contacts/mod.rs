//! Contact sources: file (CSV / spreadsheet) or a Google Sheet range.
//!
//! Both produce [`ContactRecord`]s with normalized field names. Only
//! Sheet-backed records carry a `source_row` for status write-back.

pub mod file;
pub mod sheet;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::google_api::GoogleApiError;
use crate::util::normalize_header;

pub use file::FileContactSource;
pub use sheet::SheetContactSource;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Contacts file not found: {0}")]
    NotFound(PathBuf),
    #[error("Unsupported contacts file type: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Workbook: {0}")]
    Workbook(String),
    #[error("Sheets: {0}")]
    Sheets(#[from] GoogleApiError),
}

/// One row of the contact list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactRecord {
    pub name: String,
    pub email: String,
    pub company: String,
    pub role: String,
    pub personalized_note: String,
    pub job_link: String,
    pub job_id: String,
    /// Raw `template` column, lower-cased (`cold`, `warm`, `llm-coffee`, ...).
    pub template_kind: String,
    pub resume_flag: String,
    pub status: String,
    /// 1-based sheet row; `None` for file sources.
    pub source_row: Option<u32>,
}

fn first_non_empty(row: &HashMap<String, String>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| row.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

impl ContactRecord {
    /// Build from a row keyed by normalized header names.
    pub fn from_row(row: &HashMap<String, String>, source_row: Option<u32>) -> Self {
        Self {
            name: first_non_empty(row, &["name"]),
            email: first_non_empty(row, &["email"]),
            company: first_non_empty(row, &["company"]),
            role: first_non_empty(row, &["role"]),
            personalized_note: first_non_empty(
                row,
                &["personalized_note", "personalizednote", "personalized_no"],
            ),
            job_link: first_non_empty(row, &["job_link", "job_url", "joburl"]),
            job_id: first_non_empty(row, &["job_id", "jobid"]),
            template_kind: first_non_empty(row, &["template", "template_kind"]).to_lowercase(),
            resume_flag: first_non_empty(row, &["resume_flag", "resume"]),
            status: first_non_empty(row, &["status", "email_sent"]),
            source_row,
        }
    }

    /// Build from raw header and value cells. Missing trailing cells read as empty.
    pub fn from_cells(headers: &[String], values: &[String], source_row: Option<u32>) -> Self {
        let row: HashMap<String, String> = headers
            .iter()
            .enumerate()
            .map(|(pos, header)| {
                (
                    normalize_header(header),
                    values.get(pos).cloned().unwrap_or_default(),
                )
            })
            .collect();
        Self::from_row(&row, source_row)
    }

    /// Required fields that are empty, in a fixed order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("email", &self.email),
            ("company", &self.company),
            ("role", &self.role),
            ("template", &self.template_kind),
            ("resume", &self.resume_flag),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    /// `name (role @ company)` with placeholders for blanks, used in every log line.
    pub fn label(&self) -> String {
        fn or<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
            if value.is_empty() {
                placeholder
            } else {
                value
            }
        }
        format!(
            "{} ({} @ {})",
            or(&self.name, "(no name)"),
            or(&self.role, "(no role)"),
            or(&self.company, "(no company)")
        )
    }
}

#[async_trait]
pub trait ContactSource: Send + Sync {
    async fn load(&self) -> Result<Vec<ContactRecord>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_cells_normalizes_headers_and_aliases() {
        let headers = cells(&[
            " Name ",
            "Email",
            "Company",
            "Role",
            "Personalized-Note",
            "Template",
            "Resume",
            "JobID",
            "Job URL",
            "Email Sent",
        ]);
        let values = cells(&[
            " Ada ",
            "ada@example.com",
            "Analytical",
            "Engineer",
            "Met at RustConf",
            "LLM-Coffee",
            "backend",
            "J-42",
            "https://jobs.example.com/42",
            "yes",
        ]);
        let record = ContactRecord::from_cells(&headers, &values, Some(7));
        assert_eq!(record.name, "Ada");
        assert_eq!(record.personalized_note, "Met at RustConf");
        assert_eq!(record.template_kind, "llm-coffee");
        assert_eq!(record.resume_flag, "backend");
        assert_eq!(record.job_id, "J-42");
        assert_eq!(record.job_link, "https://jobs.example.com/42");
        assert_eq!(record.status, "yes");
        assert_eq!(record.source_row, Some(7));
        assert!(record.missing_fields().is_empty());
    }

    #[test]
    fn test_status_column_preferred_over_email_sent() {
        let headers = cells(&["status", "email_sent"]);
        let record = ContactRecord::from_cells(&headers, &cells(&["pending", "SENT"]), None);
        assert_eq!(record.status, "pending");

        let record = ContactRecord::from_cells(&headers, &cells(&["", "SENT"]), None);
        assert_eq!(record.status, "SENT");
    }

    #[test]
    fn test_resume_flag_falls_back_to_resume_column() {
        let headers = cells(&["resume_flag", "resume"]);
        let record = ContactRecord::from_cells(&headers, &cells(&["  ", "default"]), None);
        assert_eq!(record.resume_flag, "default");
    }

    #[test]
    fn test_short_row_reads_as_empty_and_reports_missing() {
        let headers = cells(&["name", "email", "company", "role", "template", "resume"]);
        let record = ContactRecord::from_cells(&headers, &cells(&["Ada", "ada@example.com"]), None);
        assert_eq!(
            record.missing_fields(),
            vec!["company", "role", "template", "resume"]
        );
    }

    #[test]
    fn test_label_placeholders() {
        let record = ContactRecord {
            name: "Ada".to_string(),
            company: "Analytical".to_string(),
            ..Default::default()
        };
        assert_eq!(record.label(), "Ada ((no role) @ Analytical)");
        assert_eq!(
            ContactRecord::default().label(),
            "(no name) ((no role) @ (no company))"
        );
    }
}
