//! Outgoing mail: the transport seam and the message types it carries.

pub mod message;

use async_trait::async_trait;

use crate::google_api::GoogleApiError;

/// A resolved file to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

/// A message ready to hand to a [`Transport`].
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
    /// Marks run reports so mail filters can route them.
    pub alert: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Failed to build message: {0}")]
    Build(String),
    #[error("Send failed: {0}")]
    Api(#[from] GoogleApiError),
}

/// Sends one message and returns the provider's message id.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<String, DeliveryError>;
}
