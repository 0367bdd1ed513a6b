//! Template files per kind, rendered with Tera (Jinja-compatible syntax).

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use super::{split_subject, ComposeMode, Composer, CompositionError, Draft, TemplateKind};
use crate::contacts::ContactRecord;

/// Resolves template kinds to files; unreadable files fall back to `cold`.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
    files: HashMap<String, String>,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>, files: HashMap<String, String>) -> Self {
        Self {
            dir: dir.into(),
            files,
        }
    }

    fn path_for(&self, kind: TemplateKind) -> PathBuf {
        let file = self
            .files
            .get(kind.as_str())
            .or_else(|| self.files.get("cold"))
            .cloned()
            .unwrap_or_else(|| format!("template_{}.txt", kind.as_str()));
        self.dir.join(file)
    }

    pub fn load_text(&self, kind: TemplateKind) -> Result<String, CompositionError> {
        let path = self.path_for(kind);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if kind != TemplateKind::Cold => {
                log::warn!(
                    "Template {} unreadable ({}); using cold template",
                    path.display(),
                    e
                );
                self.load_text(TemplateKind::Cold)
            }
            Err(source) => Err(CompositionError::TemplateMissing { path, source }),
        }
    }
}

pub struct TemplateComposer {
    store: TemplateStore,
}

impl TemplateComposer {
    pub fn new(store: TemplateStore) -> Self {
        Self { store }
    }

    pub fn render(
        &self,
        record: &ContactRecord,
        kind: TemplateKind,
    ) -> Result<Draft, CompositionError> {
        let text = self.store.load_text(kind)?;
        let mut context = tera::Context::new();
        context.insert("name", &record.name);
        context.insert("company", &record.company);
        context.insert("role", &record.role);
        context.insert("personalized_note", &record.personalized_note);
        context.insert("job_link", &record.job_link);
        context.insert("job_id", &record.job_id);
        let rendered = tera::Tera::one_off(&text, &context, false)?;
        Ok(split_subject(&rendered))
    }
}

#[async_trait]
impl Composer for TemplateComposer {
    async fn compose(
        &self,
        record: &ContactRecord,
        mode: &ComposeMode,
    ) -> Result<Draft, CompositionError> {
        let kind = match mode {
            ComposeMode::Template(kind) => *kind,
            ComposeMode::Llm { inspiration, .. } => *inspiration,
        };
        self.render(record, kind)
    }
}
