//! End-of-run report email.

use chrono::Utc;

use crate::config::{AlertConfig, AlertMode};
use crate::mailer::{Attachment, OutgoingEmail, Transport};
use crate::run_log::RunLog;

pub fn should_send_alert(config: &AlertConfig, log: &RunLog) -> bool {
    if config.email.trim().is_empty() {
        return false;
    }
    match config.mode {
        AlertMode::Always => true,
        AlertMode::ErrorOnly => log.has_errors(),
        AlertMode::Never => false,
    }
}

/// Report email: subject reflects whether errors happened; body and
/// `run.log.txt` attachment carry the log text.
pub fn build_report(config: &AlertConfig, log: &RunLog, suffix: Option<&str>) -> OutgoingEmail {
    let core = if log.has_errors() {
        "Run errors"
    } else {
        "Run report"
    };
    let suffix = suffix
        .filter(|s| !s.is_empty())
        .map(|s| format!(" - {}", s))
        .unwrap_or_default();
    let subject = format!("{} {}{}", config.subject_prefix, core, suffix)
        .trim()
        .to_string();

    let body = format!(
        "Run summary: errors={}, entries={}, run={}.\nTime: {}\n\n{}",
        log.error_count(),
        log.entries().len(),
        log.run_id(),
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        log.render_text()
    );

    OutgoingEmail {
        to: config.email.clone(),
        subject,
        attachment: Some(Attachment {
            bytes: body.as_bytes().to_vec(),
            filename: "run.log.txt".to_string(),
            mime_type: "text/plain".to_string(),
        }),
        body,
        alert: true,
    }
}

/// Send the report when the mode calls for it. Without a transport the log
/// goes to stderr instead.
pub async fn send_report(
    transport: Option<&dyn Transport>,
    config: &AlertConfig,
    log: &RunLog,
    suffix: Option<&str>,
) {
    if !should_send_alert(config, log) {
        return;
    }
    let Some(transport) = transport else {
        eprintln!("Unable to send alert email: Gmail is unavailable.");
        eprintln!("{}", log.render_text());
        return;
    };

    let report = build_report(config, log, suffix);
    match transport.send(&report).await {
        Ok(id) => log::info!("Alert email sent to {} (id={})", config.email, id),
        Err(e) => log::error!("Failed to send alert email to {}: {}", config.email, e),
    }
}
