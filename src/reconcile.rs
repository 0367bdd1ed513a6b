//! Send-state reconciliation.
//!
//! Records are processed one at a time, in source order:
//! - sheet already says sent: skip
//! - required field missing: mark `required_field_missing`, skip
//! - ledger already has the contact: skip
//! - daily cap reached: stop the run
//! - compose (LLM with template fallback), resolve resume
//! - dry run: record `DRY_RUN` in both stores
//! - deliver: record `SENT` in both stores, then pause
//!
//! Both stores are written only after the transport returns success, so a
//! failed or interrupted send is never recorded as sent.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::attachment::AttachmentResolver;
use crate::compose::{ComposeMode, Composer, Draft, TemplateKind};
use crate::contacts::ContactRecord;
use crate::ledger::{LegacyKey, SendKey, SendLedger};
use crate::mailer::{OutgoingEmail, Transport};
use crate::run_log::RunLog;
use crate::sheet_status::{
    RemoteStatusWriter, STATUS_DRY_RUN, STATUS_REQUIRED_FIELD_MISSING, STATUS_SENT,
};

/// Status values that mean "already sent", compared trimmed and case-insensitively.
const SENT_MARKERS: &[&str] = &["SENT", "YES", "TRUE", "1", "DONE"];

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    /// 0 means no cap.
    pub daily_limit: u32,
    /// Pause after every successful delivery.
    pub send_delay: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sent: u32,
    pub dry_run: u32,
    pub skipped_marked: u32,
    pub incomplete: u32,
    pub duplicates: u32,
    pub failed: u32,
    pub status_write_failures: u32,
    pub limit_reached: bool,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} dry_run={} skipped={} incomplete={} duplicates={} failed={} status_write_failures={}",
            self.sent,
            self.dry_run,
            self.skipped_marked,
            self.incomplete,
            self.duplicates,
            self.failed,
            self.status_write_failures
        )?;
        if self.limit_reached {
            f.write_str(" (daily limit reached)")?;
        }
        Ok(())
    }
}

/// Outcome of the status and completeness checks for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    AlreadyMarked,
    Incomplete(Vec<&'static str>),
    /// `revalidate` is set when the row was previously marked incomplete.
    Eligible { revalidate: bool },
}

pub fn status_gate(record: &ContactRecord) -> Gate {
    let status = record.status.trim().to_uppercase();
    if SENT_MARKERS.contains(&status.as_str()) {
        return Gate::AlreadyMarked;
    }
    let missing = record.missing_fields();
    if !missing.is_empty() {
        return Gate::Incomplete(missing);
    }
    Gate::Eligible {
        revalidate: status.eq_ignore_ascii_case(STATUS_REQUIRED_FIELD_MISSING),
    }
}

pub struct Reconciler {
    templates: Box<dyn Composer>,
    llm: Option<Box<dyn Composer>>,
    attachments: Box<dyn AttachmentResolver>,
    transport: Arc<dyn Transport>,
    ledger: Option<SendLedger>,
    status: Option<RemoteStatusWriter>,
    options: RunOptions,
}

impl Reconciler {
    pub fn new(
        templates: Box<dyn Composer>,
        attachments: Box<dyn AttachmentResolver>,
        transport: Arc<dyn Transport>,
        options: RunOptions,
    ) -> Self {
        Self {
            templates,
            llm: None,
            attachments,
            transport,
            ledger: None,
            status: None,
            options,
        }
    }

    pub fn with_llm(mut self, llm: Box<dyn Composer>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_ledger(mut self, ledger: SendLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_status_writer(mut self, writer: RemoteStatusWriter) -> Self {
        self.status = Some(writer);
        self
    }

    pub fn ledger(&self) -> Option<&SendLedger> {
        self.ledger.as_ref()
    }

    /// Process every record in order. Always returns a summary.
    pub async fn run(&mut self, records: &[ContactRecord], log: &mut RunLog) -> RunSummary {
        let mut summary = RunSummary::default();

        for record in records {
            let cap = self.options.daily_limit;
            if cap > 0 && summary.sent >= cap {
                log.info(format!("Daily limit of {} reached. Stopping.", cap));
                summary.limit_reached = true;
                break;
            }
            self.process(record, &mut summary, log).await;
        }

        log.info(format!("Done. {}", summary));
        summary
    }

    async fn process(&mut self, record: &ContactRecord, summary: &mut RunSummary, log: &mut RunLog) {
        let label = record.label();

        match status_gate(record) {
            Gate::AlreadyMarked => {
                log.info(format!("SKIP (sheet marked sent) -> {}", label));
                summary.skipped_marked += 1;
                return;
            }
            Gate::Incomplete(missing) => {
                log.info(format!(
                    "REQUIRED FIELD MISSING [{}] -> {}",
                    missing.join(", "),
                    label
                ));
                summary.incomplete += 1;
                self.write_status(record, STATUS_REQUIRED_FIELD_MISSING, summary, log)
                    .await;
                return;
            }
            Gate::Eligible { revalidate } => {
                if revalidate {
                    log.info(format!("Revalidated previously incomplete row -> {}", label));
                    self.write_status(record, "", summary, log).await;
                }
            }
        }

        let key = SendKey::for_record(record);
        let legacy = LegacyKey::for_record(record);
        if let Some(ledger) = &self.ledger {
            if ledger.already_sent(&key, &legacy) {
                log.info(format!("SKIP already sent -> {}", label));
                summary.duplicates += 1;
                return;
            }
        }

        let draft = match self.compose(record, log).await {
            Some(draft) => draft,
            None => {
                summary.failed += 1;
                return;
            }
        };

        let attachment = match self.attachments.resolve(&record.resume_flag).await {
            Ok(attachment) => attachment,
            Err(e) => {
                log.error(format!(
                    "Failed to fetch resume '{}' for {}: {}",
                    record.resume_flag, label, e
                ));
                None
            }
        };

        if self.options.dry_run {
            log.info(format!(
                "DRY RUN -> {} | Subject: {} | attachment: {}",
                label,
                draft.subject,
                attachment
                    .as_ref()
                    .map_or("none", |a| a.filename.as_str())
            ));
            log::debug!("Dry-run body for {}:\n{}", label, draft.body);
            summary.dry_run += 1;
            self.record_in_ledger(&key, &legacy, STATUS_DRY_RUN, &label, log);
            self.write_status(record, STATUS_DRY_RUN, summary, log).await;
            return;
        }

        let email = OutgoingEmail {
            to: record.email.clone(),
            subject: draft.subject,
            body: draft.body,
            attachment,
            alert: false,
        };
        match self.transport.send(&email).await {
            Ok(message_id) => {
                summary.sent += 1;
                log.info(format!("SENT -> {} (id={})", label, message_id));
                self.record_in_ledger(&key, &legacy, &message_id, &label, log);
                self.write_status(record, STATUS_SENT, summary, log).await;
                if !self.options.send_delay.is_zero() {
                    tokio::time::sleep(self.options.send_delay).await;
                }
            }
            Err(e) => {
                summary.failed += 1;
                log.error(format!("ERROR sending to {}: {}", label, e));
            }
        }
    }

    /// LLM draft when selected, falling back to the template named by the row.
    async fn compose(&self, record: &ContactRecord, log: &mut RunLog) -> Option<Draft> {
        let mut mode = ComposeMode::for_record(record, self.llm.is_some());

        let llm = self
            .llm
            .as_ref()
            .filter(|_| matches!(mode, ComposeMode::Llm { .. }));
        if let Some(llm) = llm {
            match llm.compose(record, &mode).await {
                Ok(draft) => return Some(draft),
                Err(e) => {
                    let fallback = TemplateKind::from_field(&record.template_kind);
                    log.error(format!(
                        "LLM error for {}: {}; falling back to template '{}'",
                        record.label(),
                        e,
                        fallback.as_str()
                    ));
                    mode = ComposeMode::Template(fallback);
                }
            }
        }

        match self.templates.compose(record, &mode).await {
            Ok(draft) => Some(draft),
            Err(e) => {
                log.error(format!("Template error for {}: {}", record.label(), e));
                None
            }
        }
    }

    fn record_in_ledger(
        &mut self,
        key: &SendKey,
        legacy: &LegacyKey,
        message_id: &str,
        label: &str,
        log: &mut RunLog,
    ) {
        if let Some(ledger) = self.ledger.as_mut() {
            if let Err(e) = ledger.mark_sent(key, legacy, message_id) {
                log.error(format!("Failed to persist ledger entry for {}: {}", label, e));
            }
        }
    }

    async fn write_status(
        &self,
        record: &ContactRecord,
        value: &str,
        summary: &mut RunSummary,
        log: &mut RunLog,
    ) {
        let (Some(writer), Some(row)) = (&self.status, record.source_row) else {
            return;
        };
        if let Err(e) = writer.write(row, value).await {
            summary.status_write_failures += 1;
            log.warn(format!(
                "Failed to write status '{}' to sheet row {} for {}: {}",
                value,
                row,
                record.label(),
                e
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::a1;
    use crate::attachment::AttachmentError;
    use crate::compose::CompositionError;
    use crate::config::SheetConfig;
    use crate::contacts::{ContactSource, SheetContactSource};
    use crate::google_api::sheets::{SheetsApi, ValueUpdate};
    use crate::google_api::GoogleApiError;
    use crate::mailer::{Attachment, DeliveryError};

    const RANGE: &str = "Contacts!A:H";
    const HEADERS: &[&str] = &[
        "Name", "Email", "Company", "Role", "Template", "Resume", "Status", "Sent At",
    ];

    /// A spreadsheet held in memory. Cell writes are applied and recorded.
    struct SheetGrid {
        rows: Mutex<Vec<Vec<String>>>,
        writes: Mutex<Vec<ValueUpdate>>,
        fail_writes: bool,
    }

    impl SheetGrid {
        fn new(data: Vec<Vec<&str>>) -> Arc<Self> {
            let mut rows = vec![HEADERS.iter().map(|h| h.to_string()).collect::<Vec<_>>()];
            rows.extend(
                data.into_iter()
                    .map(|row| row.into_iter().map(str::to_string).collect()),
            );
            Arc::new(Self {
                rows: Mutex::new(rows),
                writes: Mutex::new(Vec::new()),
                fail_writes: false,
            })
        }

        fn failing_writes(data: Vec<Vec<&str>>) -> Arc<Self> {
            let grid = Self::new(data);
            let rows = grid.rows.lock().unwrap().clone();
            Arc::new(Self {
                rows: Mutex::new(rows),
                writes: Mutex::new(Vec::new()),
                fail_writes: true,
            })
        }

        /// Cell at a 1-based sheet row and a column letter.
        fn cell(&self, row: usize, column: &str) -> String {
            let rows = self.rows.lock().unwrap();
            rows.get(row - 1)
                .and_then(|r| r.get(a1::col_to_num(column)))
                .cloned()
                .unwrap_or_default()
        }

        fn status_writes_for(&self, row: u32) -> Vec<String> {
            let target = format!("Contacts!G{}", row);
            self.writes
                .lock()
                .unwrap()
                .iter()
                .filter(|u| u.range == target)
                .map(|u| u.values[0][0].clone())
                .collect()
        }
    }

    #[async_trait]
    impl SheetsApi for SheetGrid {
        async fn get_values(&self, _: &str, _: &str) -> Result<Vec<Vec<String>>, GoogleApiError> {
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn batch_update(
            &self,
            _: &str,
            updates: &[ValueUpdate],
        ) -> Result<(), GoogleApiError> {
            if self.fail_writes {
                return Err(GoogleApiError::ApiError {
                    status: 503,
                    message: "backend unavailable".to_string(),
                });
            }
            let mut rows = self.rows.lock().unwrap();
            for update in updates {
                let reference = update.range.split_once('!').map_or(update.range.as_str(), |(_, r)| r);
                let column: String = reference.chars().filter(|c| c.is_ascii_alphabetic()).collect();
                let row: usize = reference
                    .chars()
                    .filter(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse()
                    .unwrap();
                let col = a1::col_to_num(&column);
                while rows.len() < row {
                    rows.push(Vec::new());
                }
                let cells = &mut rows[row - 1];
                while cells.len() <= col {
                    cells.push(String::new());
                }
                cells[col] = update.values[0][0].clone();
            }
            self.writes.lock().unwrap().extend(updates.iter().cloned());
            Ok(())
        }
    }

    /// Records sends; fails for listed recipients.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutgoingEmail>>,
        reject: Vec<String>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, email: &OutgoingEmail) -> Result<String, DeliveryError> {
            if self.reject.contains(&email.to) {
                return Err(DeliveryError::Api(GoogleApiError::ApiError {
                    status: 400,
                    message: "Invalid To header".to_string(),
                }));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(email.clone());
            Ok(format!("msg-{}", sent.len()))
        }
    }

    /// Subject names the template kind used.
    struct KindComposer;

    #[async_trait]
    impl Composer for KindComposer {
        async fn compose(
            &self,
            record: &ContactRecord,
            mode: &ComposeMode,
        ) -> Result<Draft, CompositionError> {
            let subject = match mode {
                ComposeMode::Template(kind) => format!("template:{}", kind.as_str()),
                ComposeMode::Llm { inspiration, .. } => format!("llm:{}", inspiration.as_str()),
            };
            Ok(Draft {
                subject,
                body: format!("Hi {}", record.name),
            })
        }
    }

    struct FailingComposer;

    #[async_trait]
    impl Composer for FailingComposer {
        async fn compose(&self, _: &ContactRecord, _: &ComposeMode) -> Result<Draft, CompositionError> {
            Err(CompositionError::LlmUnavailable("rate limited".to_string()))
        }
    }

    struct FixedResume(Option<Attachment>);

    #[async_trait]
    impl AttachmentResolver for FixedResume {
        async fn resolve(&self, _: &str) -> Result<Option<Attachment>, AttachmentError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenResume;

    #[async_trait]
    impl AttachmentResolver for BrokenResume {
        async fn resolve(&self, _: &str) -> Result<Option<Attachment>, AttachmentError> {
            Err(AttachmentError::Drive(GoogleApiError::AuthExpired))
        }
    }

    fn row<'a>(name: &'a str, role: &'a str, status: &'a str) -> Vec<&'a str> {
        vec![name, "person@example.com", "Analytical", role, "cold", "default", status]
    }

    fn options() -> RunOptions {
        RunOptions {
            dry_run: false,
            daily_limit: 0,
            send_delay: Duration::ZERO,
        }
    }

    fn sheet_config() -> SheetConfig {
        SheetConfig {
            spreadsheet_id: "sheet-id".to_string(),
            range: RANGE.to_string(),
            has_header: true,
            status_column: None,
            sent_at_column: None,
        }
    }

    async fn load(grid: &Arc<SheetGrid>) -> (Vec<ContactRecord>, RemoteStatusWriter) {
        let api: Arc<dyn SheetsApi> = grid.clone();
        let records = SheetContactSource::new(api.clone(), "sheet-id", RANGE, true)
            .load()
            .await
            .unwrap();
        let writer = RemoteStatusWriter::connect(api, &sheet_config()).await.unwrap();
        (records, writer)
    }

    fn reconciler(transport: Arc<RecordingTransport>, options: RunOptions) -> Reconciler {
        Reconciler::new(
            Box::new(KindComposer),
            Box::new(FixedResume(None)),
            transport,
            options,
        )
    }

    #[test]
    fn test_status_gate_sent_vocabulary() {
        for status in ["sent", "YES", "True", "1", " DONE "] {
            let record = ContactRecord {
                status: status.to_string(),
                ..Default::default()
            };
            assert_eq!(status_gate(&record), Gate::AlreadyMarked, "{}", status);
        }
        let record = ContactRecord {
            status: "pending".to_string(),
            ..Default::default()
        };
        assert!(matches!(status_gate(&record), Gate::Incomplete(_)));
        let record = ContactRecord {
            status: "sent-ish".to_string(),
            ..Default::default()
        };
        assert_ne!(status_gate(&record), Gate::AlreadyMarked);
    }

    #[tokio::test]
    async fn test_truthy_statuses_skipped_pending_delivered() {
        let grid = SheetGrid::new(vec![
            row("A", "Eng", "sent"),
            row("B", "Eng", "YES"),
            row("C", "Eng", "True"),
            row("D", "Eng", "1"),
            row("E", "Eng", "DONE"),
            row("F", "Eng", "pending"),
        ]);
        let (records, writer) = load(&grid).await;
        let transport = Arc::new(RecordingTransport::default());
        let mut reconciler =
            reconciler(transport.clone(), options()).with_status_writer(writer);

        let mut log = RunLog::new();
        let summary = reconciler.run(&records, &mut log).await;

        assert_eq!(summary.skipped_marked, 5);
        assert_eq!(summary.sent, 1);
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "Hi F");
        assert_eq!(grid.cell(7, "G"), "SENT");
        assert_eq!(grid.cell(2, "G"), "sent");
    }

    #[tokio::test]
    async fn test_daily_limit_is_a_hard_stop() {
        let mut rows: Vec<_> = (0..5).map(|_| row("Ada", "Eng", "")).collect();
        // Fourth contact has no role; past the cap it must not be gated either.
        rows[3][3] = "";
        let grid = SheetGrid::new(rows);
        let (mut records, writer) = load(&grid).await;
        for (i, record) in records.iter_mut().enumerate() {
            record.name = format!("Person {}", i);
        }
        let transport = Arc::new(RecordingTransport::default());
        let mut reconciler = reconciler(
            transport.clone(),
            RunOptions {
                daily_limit: 2,
                ..options()
            },
        )
        .with_status_writer(writer);

        let mut log = RunLog::new();
        let summary = reconciler.run(&records, &mut log).await;

        assert_eq!(summary.sent, 2);
        assert!(summary.limit_reached);
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
        assert_eq!(grid.cell(2, "G"), "SENT");
        assert_eq!(grid.cell(3, "G"), "SENT");
        for row in 4..=6 {
            assert_eq!(grid.cell(row, "G"), "");
            assert_eq!(grid.cell(row, "H"), "");
        }
        assert_ne!(grid.cell(5, "G"), STATUS_REQUIRED_FIELD_MISSING);
        assert_eq!(summary.incomplete, 0);
    }

    #[tokio::test]
    async fn test_dry_runs_do_not_count_toward_limit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let grid = SheetGrid::new(vec![
            row("A", "Eng", ""),
            row("B", "Eng", ""),
            row("C", "Eng", ""),
        ]);
        let (records, writer) = load(&grid).await;
        let transport = Arc::new(RecordingTransport::default());
        let ledger = SendLedger::load(&dir.path().join("sent_log.json")).unwrap();
        let mut reconciler = reconciler(
            transport.clone(),
            RunOptions {
                dry_run: true,
                daily_limit: 1,
                ..options()
            },
        )
        .with_status_writer(writer)
        .with_ledger(ledger);

        let mut log = RunLog::new();
        let summary = reconciler.run(&records, &mut log).await;

        assert_eq!(summary.dry_run, 3);
        assert_eq!(summary.sent, 0);
        assert!(!summary.limit_reached);
        assert!(transport.sent.lock().unwrap().is_empty());
        for row in 2..=4 {
            assert_eq!(grid.cell(row, "G"), "DRY_RUN");
        }
        let reloaded = SendLedger::load(&dir.path().join("sent_log.json")).unwrap();
        let entry = reloaded.get("a::eng::analytical").unwrap();
        assert_eq!(entry.message_id, "DRY_RUN");
    }

    #[tokio::test]
    async fn test_missing_role_marks_row_and_never_sends() {
        let grid = SheetGrid::new(vec![row("Ada", "", "")]);
        let (records, writer) = load(&grid).await;
        let transport = Arc::new(RecordingTransport::default());
        let mut reconciler = reconciler(transport.clone(), options()).with_status_writer(writer);

        let mut log = RunLog::new();
        let summary = reconciler.run(&records, &mut log).await;

        assert_eq!(summary.incomplete, 1);
        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(grid.cell(2, "G"), "required_field_missing");
        assert!(log
            .entries()
            .iter()
            .any(|e| e.message.contains("REQUIRED FIELD MISSING [role]")));
    }

    #[tokio::test]
    async fn test_revalidated_row_is_cleared_then_sent() {
        let grid = SheetGrid::new(vec![row("Ada", "Eng", "required_field_missing")]);
        let (records, writer) = load(&grid).await;
        let transport = Arc::new(RecordingTransport::default());
        let mut reconciler = reconciler(transport.clone(), options()).with_status_writer(writer);

        let mut log = RunLog::new();
        let summary = reconciler.run(&records, &mut log).await;

        assert_eq!(summary.sent, 1);
        assert_eq!(grid.status_writes_for(2), vec!["".to_string(), "SENT".to_string()]);
        assert_eq!(grid.cell(2, "G"), "SENT");
    }

    #[tokio::test]
    async fn test_rerun_with_ledger_sends_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sent_log.json");
        let transport = Arc::new(RecordingTransport::default());

        // First run sends; the file source has no status column to update.
        let records = vec![ContactRecord {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            company: "Analytical".to_string(),
            role: "Eng".to_string(),
            template_kind: "cold".to_string(),
            resume_flag: "default".to_string(),
            ..Default::default()
        }];
        let mut first = reconciler(transport.clone(), options())
            .with_ledger(SendLedger::load(&path).unwrap());
        let summary = first.run(&records, &mut RunLog::new()).await;
        assert_eq!(summary.sent, 1);

        let mut second = reconciler(transport.clone(), options())
            .with_ledger(SendLedger::load(&path).unwrap());
        let summary = second.run(&records, &mut RunLog::new()).await;
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_ledger_key_blocks_send() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sent_log.json");
        std::fs::write(
            &path,
            r#"{"person@example.com::eng::analytical": {"msg_id": "old", "ts": 1700000000}}"#,
        )
        .unwrap();
        let grid = SheetGrid::new(vec![row("Ada", "Eng", "")]);
        let (records, writer) = load(&grid).await;
        let transport = Arc::new(RecordingTransport::default());
        let mut reconciler = reconciler(transport.clone(), options())
            .with_status_writer(writer)
            .with_ledger(SendLedger::load(&path).unwrap());

        let summary = reconciler.run(&records, &mut RunLog::new()).await;
        assert_eq!(summary.duplicates, 1);
        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(grid.cell(2, "G"), "");
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_to_template() {
        let grid = SheetGrid::new(vec![
            vec!["Ada", "ada@example.com", "Analytical", "Eng", "llm-warm", "default", ""],
            vec!["Bob", "bob@example.com", "Analytical", "Eng", "llm", "default", ""],
        ]);
        let (records, _) = load(&grid).await;
        let transport = Arc::new(RecordingTransport::default());
        let mut reconciler =
            reconciler(transport.clone(), options()).with_llm(Box::new(FailingComposer));

        let mut log = RunLog::new();
        let summary = reconciler.run(&records, &mut log).await;

        assert_eq!(summary.sent, 2);
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "template:cold");
        assert_eq!(sent[1].subject, "template:cold");
        assert_eq!(log.error_count(), 2);
    }

    #[tokio::test]
    async fn test_llm_used_when_enabled() {
        let grid = SheetGrid::new(vec![vec![
            "Ada", "ada@example.com", "Analytical", "Eng", "llm-coffee", "default", "",
        ]]);
        let (records, _) = load(&grid).await;
        let transport = Arc::new(RecordingTransport::default());
        let mut reconciler =
            reconciler(transport.clone(), options()).with_llm(Box::new(KindComposer));

        reconciler.run(&records, &mut RunLog::new()).await;
        assert_eq!(transport.sent.lock().unwrap()[0].subject, "llm:coffee");
    }

    #[tokio::test]
    async fn test_template_failure_leaves_record_for_later() {
        let grid = SheetGrid::new(vec![row("Ada", "Eng", "")]);
        let (records, writer) = load(&grid).await;
        let transport = Arc::new(RecordingTransport::default());
        let mut reconciler = Reconciler::new(
            Box::new(FailingComposer),
            Box::new(FixedResume(None)),
            transport.clone(),
            options(),
        )
        .with_status_writer(writer);

        let mut log = RunLog::new();
        let summary = reconciler.run(&records, &mut log).await;
        assert_eq!(summary.failed, 1);
        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(grid.cell(2, "G"), "");
        assert!(log.has_errors());
    }

    #[tokio::test]
    async fn test_attachment_failure_sends_without_attachment() {
        let grid = SheetGrid::new(vec![row("Ada", "Eng", "")]);
        let (records, _) = load(&grid).await;
        let transport = Arc::new(RecordingTransport::default());
        let mut reconciler = Reconciler::new(
            Box::new(KindComposer),
            Box::new(BrokenResume),
            transport.clone(),
            options(),
        );

        let mut log = RunLog::new();
        let summary = reconciler.run(&records, &mut log).await;
        assert_eq!(summary.sent, 1);
        assert!(transport.sent.lock().unwrap()[0].attachment.is_none());
        assert_eq!(log.error_count(), 1);
    }

    #[tokio::test]
    async fn test_attachment_is_passed_to_transport() {
        let grid = SheetGrid::new(vec![row("Ada", "Eng", "")]);
        let (records, _) = load(&grid).await;
        let transport = Arc::new(RecordingTransport::default());
        let resume = Attachment {
            bytes: b"%PDF".to_vec(),
            filename: "resume.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
        };
        let mut reconciler = Reconciler::new(
            Box::new(KindComposer),
            Box::new(FixedResume(Some(resume.clone()))),
            transport.clone(),
            options(),
        );

        reconciler.run(&records, &mut RunLog::new()).await;
        assert_eq!(transport.sent.lock().unwrap()[0].attachment, Some(resume));
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_both_stores_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sent_log.json");
        let grid = SheetGrid::new(vec![
            vec!["Ada", "bounce@example.com", "Analytical", "Eng", "cold", "default", ""],
            vec!["Bob", "bob@example.com", "Analytical", "Eng", "cold", "default", ""],
        ]);
        let (records, writer) = load(&grid).await;
        let transport = Arc::new(RecordingTransport {
            reject: vec!["bounce@example.com".to_string()],
            ..Default::default()
        });
        let mut reconciler = reconciler(transport.clone(), options())
            .with_status_writer(writer)
            .with_ledger(SendLedger::load(&path).unwrap());

        let mut log = RunLog::new();
        let summary = reconciler.run(&records, &mut log).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(grid.cell(2, "G"), "");
        assert_eq!(grid.cell(3, "G"), "SENT");
        let ledger = reconciler.ledger().unwrap();
        assert!(ledger.get("ada::eng::analytical").is_none());
        assert_eq!(ledger.get("bob::eng::analytical").unwrap().message_id, "msg-1");
        assert!(log
            .entries()
            .iter()
            .any(|e| e.message.starts_with("ERROR sending to Ada (Eng @ Analytical)")));
    }

    #[tokio::test]
    async fn test_status_write_failure_keeps_send() {
        let grid = SheetGrid::failing_writes(vec![row("Ada", "Eng", "")]);
        let (records, writer) = load(&grid).await;
        let transport = Arc::new(RecordingTransport::default());
        let mut reconciler = reconciler(transport.clone(), options()).with_status_writer(writer);

        let mut log = RunLog::new();
        let summary = reconciler.run(&records, &mut log).await;

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.status_write_failures, 1);
        assert!(!log.has_errors());
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            sent: 2,
            limit_reached: true,
            ..Default::default()
        };
        assert_eq!(
            summary.to_string(),
            "sent=2 dry_run=0 skipped=0 incomplete=0 duplicates=0 failed=0 status_write_failures=0 (daily limit reached)"
        );
    }
}
