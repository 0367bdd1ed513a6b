//! Message composition: Tera templates or an LLM draft.

pub mod llm;
pub mod templates;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::contacts::ContactRecord;

pub use llm::LlmComposer;
pub use templates::{TemplateComposer, TemplateStore};

#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("Template {path} unreadable and no cold fallback: {source}")]
    TemplateMissing {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Template render failed: {0}")]
    Render(#[from] tera::Error),
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("LLM returned an empty reply")]
    EmptyReply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Cold,
    Warm,
    Coffee,
    Direct,
}

impl TemplateKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "cold" => Some(TemplateKind::Cold),
            "warm" => Some(TemplateKind::Warm),
            "coffee" => Some(TemplateKind::Coffee),
            "direct" => Some(TemplateKind::Direct),
            _ => None,
        }
    }

    /// Kind named by a raw template field; anything unknown is `cold`.
    pub fn from_field(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(TemplateKind::Cold)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKind::Cold => "cold",
            TemplateKind::Warm => "warm",
            TemplateKind::Coffee => "coffee",
            TemplateKind::Direct => "direct",
        }
    }
}

/// What the LLM draft is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Auto,
    Coffee,
    Direct,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Auto => "auto",
            Intent::Coffee => "coffee",
            Intent::Direct => "direct",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeMode {
    Template(TemplateKind),
    Llm {
        inspiration: TemplateKind,
        intent: Intent,
    },
}

impl ComposeMode {
    /// `llm` / `llm-<kind>` selects an LLM draft when enabled; anything else
    /// renders the named template.
    pub fn for_record(record: &ContactRecord, llm_enabled: bool) -> Self {
        let raw = record.template_kind.as_str();
        if !(llm_enabled && raw.starts_with("llm")) {
            return ComposeMode::Template(TemplateKind::from_field(raw));
        }

        let explicit = raw
            .split_once('-')
            .and_then(|(_, kind)| TemplateKind::parse(kind));
        let inspiration = explicit.unwrap_or(if record.personalized_note.is_empty() {
            TemplateKind::Cold
        } else {
            TemplateKind::Warm
        });
        let intent = match inspiration {
            TemplateKind::Coffee => Intent::Coffee,
            TemplateKind::Direct => Intent::Direct,
            _ => Intent::Auto,
        };
        ComposeMode::Llm {
            inspiration,
            intent,
        }
    }
}

#[async_trait]
pub trait Composer: Send + Sync {
    async fn compose(
        &self,
        record: &ContactRecord,
        mode: &ComposeMode,
    ) -> Result<Draft, CompositionError>;
}

/// Split a leading `Subject:` line off rendered text.
pub fn split_subject(rendered: &str) -> Draft {
    let mut lines = rendered.lines();
    if let Some(first) = lines.next() {
        if first.to_lowercase().starts_with("subject:") {
            let subject = first
                .split_once(':')
                .map(|(_, rest)| rest.trim())
                .unwrap_or_default();
            let body = lines.collect::<Vec<_>>().join("\n");
            return Draft {
                subject: subject.to_string(),
                body: body.trim_start().to_string(),
            };
        }
    }
    Draft {
        subject: "Hello".to_string(),
        body: rendered.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(template: &str, note: &str) -> ContactRecord {
        ContactRecord {
            template_kind: template.to_string(),
            personalized_note: note.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_template_mode_kinds() {
        assert_eq!(
            ComposeMode::for_record(&record("warm", ""), true),
            ComposeMode::Template(TemplateKind::Warm)
        );
        assert_eq!(
            ComposeMode::for_record(&record("fancy", ""), true),
            ComposeMode::Template(TemplateKind::Cold)
        );
    }

    #[test]
    fn test_llm_mode_inspiration_and_intent() {
        assert_eq!(
            ComposeMode::for_record(&record("llm-coffee", ""), true),
            ComposeMode::Llm {
                inspiration: TemplateKind::Coffee,
                intent: Intent::Coffee
            }
        );
        assert_eq!(
            ComposeMode::for_record(&record("llm", "Met at RustConf"), true),
            ComposeMode::Llm {
                inspiration: TemplateKind::Warm,
                intent: Intent::Auto
            }
        );
        assert_eq!(
            ComposeMode::for_record(&record("llm-bogus", ""), true),
            ComposeMode::Llm {
                inspiration: TemplateKind::Cold,
                intent: Intent::Auto
            }
        );
    }

    #[test]
    fn test_llm_disabled_uses_templates() {
        assert_eq!(
            ComposeMode::for_record(&record("llm-direct", ""), false),
            ComposeMode::Template(TemplateKind::Cold)
        );
    }

    #[test]
    fn test_split_subject() {
        let draft = split_subject("SUBJECT: Referral for Engineer\n\nHi Ada,\nThanks");
        assert_eq!(draft.subject, "Referral for Engineer");
        assert_eq!(draft.body, "Hi Ada,\nThanks");

        let draft = split_subject("Hi Ada,\nThanks");
        assert_eq!(draft.subject, "Hello");
        assert_eq!(draft.body, "Hi Ada,\nThanks");
    }
}
