//! RFC 5322 message construction via lettre.

use base64::Engine;
use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;

use super::{DeliveryError, OutgoingEmail};

#[derive(Debug, Clone)]
struct ReferralsBot;

impl Header for ReferralsBot {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Referrals-Bot")
    }

    fn parse(_s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self)
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), "1".to_string())
    }
}

#[derive(Debug, Clone)]
struct ReferralsAlert;

impl Header for ReferralsAlert {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Referrals-Alert")
    }

    fn parse(_s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self)
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), "1".to_string())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .trim()
        .parse()
        .map_err(|_| DeliveryError::InvalidAddress(address.to_string()))
}

/// Build the full message: plain-text UTF-8 body plus the optional attachment.
pub fn build_message(from: &Mailbox, email: &OutgoingEmail) -> Result<Message, DeliveryError> {
    let mut builder = Message::builder()
        .from(from.clone())
        .to(parse_mailbox(&email.to)?)
        .subject(email.subject.as_str());

    if email.alert {
        builder = builder.header(ReferralsBot).header(ReferralsAlert);
    }

    let text = SinglePart::plain(email.body.clone());

    let message = match &email.attachment {
        Some(attachment) if !attachment.bytes.is_empty() => {
            let content_type = ContentType::parse(&attachment.mime_type)
                .or_else(|_| ContentType::parse("application/octet-stream"))
                .map_err(|e| DeliveryError::Build(e.to_string()))?;
            let part = MimeAttachment::new(attachment.filename.clone())
                .body(attachment.bytes.clone(), content_type);
            builder.multipart(MultiPart::mixed().singlepart(text).singlepart(part))
        }
        _ => builder.singlepart(text),
    };

    message.map_err(|e| DeliveryError::Build(e.to_string()))
}

/// Encode a message the way the Gmail API expects in its `raw` field.
pub fn encode_raw(message: &Message) -> String {
    base64::engine::general_purpose::URL_SAFE.encode(message.formatted())
}

pub fn sender_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    parse_mailbox(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::Attachment;

    fn outgoing(attachment: Option<Attachment>, alert: bool) -> OutgoingEmail {
        OutgoingEmail {
            to: "ada@example.com".to_string(),
            subject: "Referral for Staff Engineer".to_string(),
            body: "Hi Ada,\nWould you refer me?".to_string(),
            attachment,
            alert,
        }
    }

    fn render(email: &OutgoingEmail) -> String {
        let from = sender_mailbox("me@example.com").unwrap();
        let message = build_message(&from, email).unwrap();
        String::from_utf8(message.formatted()).unwrap()
    }

    #[test]
    fn test_plain_message_headers() {
        let raw = render(&outgoing(None, false));
        assert!(raw.contains("To: ada@example.com"));
        assert!(raw.contains("From: me@example.com"));
        assert!(raw.contains("Subject: Referral for Staff Engineer"));
        assert!(raw.contains("Would you refer me?"));
        assert!(!raw.contains("X-Referrals-Alert"));
        assert!(!raw.contains("multipart/mixed"));
    }

    #[test]
    fn test_attachment_makes_multipart() {
        let attachment = Attachment {
            bytes: b"%PDF-1.4 fake".to_vec(),
            filename: "resume.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
        };
        let raw = render(&outgoing(Some(attachment), false));
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("application/pdf"));
        assert!(raw.contains("resume.pdf"));
        assert!(raw.contains("attachment"));
    }

    #[test]
    fn test_bad_mime_type_falls_back_to_octet_stream() {
        let attachment = Attachment {
            bytes: vec![1, 2, 3],
            filename: "blob.bin".to_string(),
            mime_type: "not a mime".to_string(),
        };
        let raw = render(&outgoing(Some(attachment), false));
        assert!(raw.contains("application/octet-stream"));
    }

    #[test]
    fn test_alert_headers() {
        let raw = render(&outgoing(None, true));
        assert!(raw.contains("X-Referrals-Bot: 1"));
        assert!(raw.contains("X-Referrals-Alert: 1"));
    }

    #[test]
    fn test_invalid_recipient() {
        let from = sender_mailbox("me@example.com").unwrap();
        let mut email = outgoing(None, false);
        email.to = "not-an-address".to_string();
        assert!(matches!(
            build_message(&from, &email),
            Err(DeliveryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_encode_raw_is_url_safe() {
        let from = sender_mailbox("me@example.com").unwrap();
        let message = build_message(&from, &outgoing(None, false)).unwrap();
        let raw = encode_raw(&message);
        assert!(!raw.contains('+'));
        assert!(!raw.contains('/'));
        let decoded = base64::engine::general_purpose::URL_SAFE
            .decode(raw.as_bytes())
            .unwrap();
        assert_eq!(decoded, message.formatted());
    }
}
