//! Entry points: a full mailer run and the credentials precheck.

use std::sync::Arc;

use crate::alerts::send_report;
use crate::attachment::DriveResumeResolver;
use crate::compose::{LlmComposer, TemplateComposer, TemplateStore};
use crate::config::AppConfig;
use crate::contacts::{ContactSource, FileContactSource, SheetContactSource};
use crate::error::RunError;
use crate::google_api::drive::{DriveClient, DriveFiles};
use crate::google_api::gmail::GmailTransport;
use crate::google_api::sheets::{GoogleSheets, SheetsApi};
use crate::google_api::{preflight_validate, GoogleApiError, TokenSource};
use crate::ledger::SendLedger;
use crate::mailer::Transport;
use crate::reconcile::{Reconciler, RunOptions, RunSummary};
use crate::run_log::RunLog;
use crate::sheet_status::RemoteStatusWriter;

/// Validate credentials.json and token.json without sending anything.
pub async fn run_precheck(config: &AppConfig) -> Result<(), GoogleApiError> {
    preflight_validate(&config.google, &reqwest::Client::new()).await
}

/// Run the mailer once. Fatal errors abort before any send; the run report
/// is emailed (or printed) either way.
pub async fn execute_mailer(config: &AppConfig) -> Result<RunSummary, RunError> {
    let mut log = RunLog::new();
    log.info(format!(
        "Run {} started{}",
        log.run_id(),
        if config.dry_run { " (dry run)" } else { "" }
    ));

    let mut transport: Option<Arc<GmailTransport>> = None;
    let outcome = run_pipeline(config, &mut log, &mut transport).await;

    let report_transport = transport.as_deref().map(|t| t as &dyn Transport);
    match &outcome {
        Ok(_) => send_report(report_transport, &config.alert, &log, None).await,
        Err(e) => {
            log.error(format!("{}. {}", e, e.recovery_suggestion()));
            send_report(report_transport, &config.alert, &log, Some(e.alert_suffix())).await;
        }
    }
    outcome
}

async fn run_pipeline(
    config: &AppConfig,
    log: &mut RunLog,
    transport_slot: &mut Option<Arc<GmailTransport>>,
) -> Result<RunSummary, RunError> {
    let http = reqwest::Client::new();
    let tokens = Arc::new(TokenSource::load(&config.google.token_path, http.clone())?);

    let sheets: Option<Arc<dyn SheetsApi>> = if config.sheets.enabled() {
        Some(Arc::new(GoogleSheets::new(tokens.clone())))
    } else {
        None
    };

    let records = match &sheets {
        Some(api) => {
            SheetContactSource::new(
                api.clone(),
                config.sheets.spreadsheet_id.clone(),
                config.sheets.range.clone(),
                config.sheets.has_header,
            )
            .load()
            .await?
        }
        None => FileContactSource::new(&config.contacts_file).load().await?,
    };
    log.info(format!("Loaded {} contacts", records.len()));

    let gmail =
        Arc::new(GmailTransport::connect(tokens.clone(), config.mail_from.as_deref()).await?);
    *transport_slot = Some(gmail.clone());

    let status_writer = match &sheets {
        Some(api) => Some(RemoteStatusWriter::connect(api.clone(), &config.sheets).await?),
        None => None,
    };

    let store = TemplateStore::new(&config.templates_dir, config.templates.clone());
    let drive: Arc<dyn DriveFiles> = Arc::new(DriveClient::new(tokens.clone()));
    let options = RunOptions {
        dry_run: config.dry_run,
        daily_limit: config.daily_limit,
        send_delay: std::time::Duration::from_millis(config.send_delay_ms),
    };

    let mut reconciler = Reconciler::new(
        Box::new(TemplateComposer::new(store.clone())),
        Box::new(DriveResumeResolver::new(Some(drive), config.resume.clone())),
        gmail,
        options,
    );
    if config.llm.enabled {
        reconciler = reconciler.with_llm(Box::new(LlmComposer::new(
            http.clone(),
            config.llm.clone(),
            store,
        )));
    }
    if config.use_sent_log {
        reconciler = reconciler.with_ledger(SendLedger::load(&config.sent_log_path)?);
    }
    if let Some(writer) = status_writer {
        reconciler = reconciler.with_status_writer(writer);
    }

    Ok(reconciler.run(&records, log).await)
}
