//! Gmail API v1: send a raw message as the authorized account.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::Mailbox;
use serde::Deserialize;

use super::{check_status, send_with_retry, GoogleApiError, RetryPolicy, TokenSource};
use crate::mailer::message::{build_message, encode_raw, sender_mailbox};
use crate::mailer::{DeliveryError, OutgoingEmail, Transport};

const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Recorded when Gmail accepted a send but its reply carried no usable id.
pub const UNKNOWN_MESSAGE_ID: &str = "UNKNOWN";

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    #[serde(default)]
    email_address: Option<String>,
}

pub struct GmailTransport {
    tokens: Arc<TokenSource>,
    from: Mailbox,
}

impl GmailTransport {
    /// Resolve the sender address and build the transport.
    ///
    /// Order: configured address, token account, Gmail profile.
    pub async fn connect(
        tokens: Arc<TokenSource>,
        mail_from: Option<&str>,
    ) -> Result<Self, DeliveryError> {
        let address = match mail_from.map(str::trim).filter(|s| !s.is_empty()) {
            Some(configured) => configured.to_string(),
            None => match tokens.account().await {
                Some(account) => account,
                None => fetch_profile_address(&tokens).await?,
            },
        };
        log::debug!("Sending as {}", address);
        Ok(Self {
            from: sender_mailbox(&address)?,
            tokens,
        })
    }

    pub fn from_address(&self) -> String {
        self.from.email.to_string()
    }
}

async fn fetch_profile_address(tokens: &TokenSource) -> Result<String, DeliveryError> {
    let access_token = tokens.access_token().await?;
    let resp = send_with_retry(
        tokens
            .http()
            .get(format!("{}/profile", GMAIL_API))
            .bearer_auth(&access_token),
        &RetryPolicy::default(),
    )
    .await?;
    let profile: ProfileResponse = check_status(resp)
        .await?
        .json()
        .await
        .map_err(GoogleApiError::from)?;
    profile
        .email_address
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| {
            DeliveryError::Api(GoogleApiError::UnexpectedResponse(
                "Gmail profile has no emailAddress".to_string(),
            ))
        })
}

#[async_trait]
impl Transport for GmailTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<String, DeliveryError> {
        let message = build_message(&self.from, email)?;
        let raw = encode_raw(&message);
        let access_token = self.tokens.access_token().await?;

        // A send is not idempotent: only retry when Gmail cannot have accepted it.
        let resp = send_with_retry(
            self.tokens
                .http()
                .post(format!("{}/messages/send", GMAIL_API))
                .bearer_auth(&access_token)
                .json(&serde_json::json!({ "raw": raw })),
            &RetryPolicy::non_idempotent(),
        )
        .await?;
        let resp = check_status(resp).await?;

        // Past this point Gmail has accepted the message; never report a failure.
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Could not read Gmail send response for {}: {}", email.to, e);
                String::new()
            }
        };
        Ok(parse_message_id(&body))
    }
}

fn parse_message_id(body: &str) -> String {
    let id = serde_json::from_str::<SendResponse>(body)
        .ok()
        .and_then(|r| r.id)
        .filter(|id| !id.is_empty());
    match id {
        Some(id) => id,
        None => {
            log::warn!(
                "Gmail send response carried no message id; recording {}",
                UNKNOWN_MESSAGE_ID
            );
            UNKNOWN_MESSAGE_ID.to_string()
        }
    }
}
