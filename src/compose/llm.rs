//! LLM drafts through an OpenAI-compatible chat completions API.
//!
//! Providers: `openai`, `azure` (Azure OpenAI deployment) and `github`
//! (GitHub Models). The provider is resolved on every call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ComposeMode, Composer, CompositionError, Draft, Intent, TemplateKind, TemplateStore};
use crate::config::{LlmConfig, LlmProvider};
use crate::contacts::ContactRecord;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const GITHUB_MODELS_ENDPOINT: &str = "https://models.github.ai/inference";

const SYSTEM_PROMPT: &str = "You write short, respectful referral request emails. \
Keep it between 120 and 170 words with a single clear ask, professional and warm. \
Add one concise line on why the sender fits this company and role, and use the \
personalization when one is given. Plain text only, no markdown. \
Reply with JSON only, with the keys \"subject\" and \"body\".";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Auth {
    Bearer(String),
    ApiKey(String),
}

/// Where and how one chat completion request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChatEndpoint {
    url: String,
    auth: Auth,
    model: String,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn resolve_endpoint(config: &LlmConfig) -> Result<ChatEndpoint, CompositionError> {
    match config.provider_kind() {
        Some(LlmProvider::OpenAi) => {
            let key = non_empty(&config.openai_api_key).ok_or_else(|| {
                CompositionError::LlmUnavailable(
                    "OPENAI_API_KEY not set for the openai provider".to_string(),
                )
            })?;
            Ok(ChatEndpoint {
                url: OPENAI_CHAT_URL.to_string(),
                auth: Auth::Bearer(key.to_string()),
                model: config.model.clone(),
            })
        }
        Some(LlmProvider::Azure) => {
            let (endpoint, key, deployment) = match (
                non_empty(&config.azure_endpoint),
                non_empty(&config.azure_api_key),
                non_empty(&config.azure_deployment),
            ) {
                (Some(e), Some(k), Some(d)) => (e, k, d),
                _ => {
                    return Err(CompositionError::LlmUnavailable(
                        "azure provider needs AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_API_KEY and \
                         AZURE_OPENAI_DEPLOYMENT"
                            .to_string(),
                    ))
                }
            };
            Ok(ChatEndpoint {
                url: format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    endpoint.trim_end_matches('/'),
                    deployment,
                    config.azure_api_version
                ),
                auth: Auth::ApiKey(key.to_string()),
                model: deployment.to_string(),
            })
        }
        Some(LlmProvider::Github) => {
            let token = non_empty(&config.github_token).ok_or_else(|| {
                CompositionError::LlmUnavailable(
                    "LLM_GITHUB_TOKEN not set for the github provider".to_string(),
                )
            })?;
            let base = non_empty(&config.github_endpoint).unwrap_or(GITHUB_MODELS_ENDPOINT);
            let model = non_empty(&config.github_model).unwrap_or(&config.model);
            let model = if model.contains('/') {
                model.to_string()
            } else {
                format!("openai/{}", model)
            };
            Ok(ChatEndpoint {
                url: format!("{}/chat/completions", base.trim_end_matches('/')),
                auth: Auth::Bearer(token.to_string()),
                model,
            })
        }
        None => Err(CompositionError::LlmUnavailable(format!(
            "unsupported LLM_PROVIDER '{}'",
            config.provider
        ))),
    }
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.is_empty() {
        placeholder
    } else {
        value
    }
}

/// User prompt: optional style sample, intent line, recipient facts.
fn build_user_prompt(
    record: &ContactRecord,
    style_text: Option<&str>,
    intent: Intent,
    candidate_profile: Option<&str>,
) -> String {
    let mut prompt = String::new();
    if let Some(style) = style_text {
        prompt.push_str(
            "Style sample (match its tone, pacing and structure; do not copy it, \
             and ignore placeholders like {{...}} and any Subject: line):\n",
        );
        prompt.push_str(style);
        prompt.push('\n');
    }
    match intent {
        Intent::Coffee => prompt.push_str(
            "Intent: coffee chat. Do not ask for a referral outright; suggest a short \
             15 to 20 minute conversation about their experience at the company.\n",
        ),
        Intent::Direct => prompt.push_str(
            "Intent: direct referral. Ask clearly and briefly for a referral, thank them \
             for their time, and mention that a resume is attached.\n",
        ),
        Intent::Auto => {}
    }
    prompt.push_str(&format!(
        "\nRecipient: {}\nCompany: {}\nRole: {}\nPersonalization: {}\nJob Link: {}\nJob ID: {}\n",
        record.name,
        record.company,
        record.role,
        or_placeholder(&record.personalized_note, "(none)"),
        or_placeholder(&record.job_link, "(not provided)"),
        or_placeholder(&record.job_id, "(not provided)"),
    ));
    if let Some(profile) = candidate_profile {
        prompt.push_str(&format!("Candidate: {}\n", profile));
    }
    prompt.push_str("Return JSON only.");
    prompt
}

#[derive(Debug, Deserialize)]
struct ReplyPayload {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

/// Parse the model reply: JSON `{subject, body}`, else first line is the subject.
fn parse_reply(content: &str) -> Result<Draft, CompositionError> {
    let content = strip_code_fence(content);
    if content.is_empty() {
        return Err(CompositionError::EmptyReply);
    }

    match serde_json::from_str::<ReplyPayload>(content) {
        Ok(payload) => Ok(Draft {
            subject: payload
                .subject
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "Referral request".to_string()),
            body: payload.body.unwrap_or_else(|| content.to_string()),
        }),
        Err(e) => {
            log::warn!("LLM returned non-JSON reply: {}", e);
            let mut lines = content.lines();
            let first = lines.next().unwrap_or_default();
            let subject = first.replace("Subject:", "").trim().to_string();
            Ok(Draft {
                subject,
                body: lines.collect::<Vec<_>>().join("\n").trim().to_string(),
            })
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct LlmComposer {
    client: reqwest::Client,
    config: LlmConfig,
    templates: TemplateStore,
}

impl LlmComposer {
    pub fn new(client: reqwest::Client, config: LlmConfig, templates: TemplateStore) -> Self {
        Self {
            client,
            config,
            templates,
        }
    }

    async fn complete(&self, endpoint: &ChatEndpoint, user_prompt: &str) -> Result<String, CompositionError> {
        let body = ChatRequest {
            model: &endpoint.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: 0.6,
            max_tokens: 600,
        };

        let request = self.client.post(&endpoint.url).json(&body);
        let request = match &endpoint.auth {
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::ApiKey(key) => request.header("api-key", key),
        };
        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(CompositionError::Api { status, message });
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(CompositionError::EmptyReply)
    }
}

#[async_trait]
impl Composer for LlmComposer {
    async fn compose(
        &self,
        record: &ContactRecord,
        mode: &ComposeMode,
    ) -> Result<Draft, CompositionError> {
        let (inspiration, intent) = match mode {
            ComposeMode::Llm {
                inspiration,
                intent,
            } => (*inspiration, *intent),
            ComposeMode::Template(kind) => (*kind, Intent::Auto),
        };
        let endpoint = resolve_endpoint(&self.config)?;
        log::info!(
            "LLM draft for {} via {} ({}), style {}, intent {}",
            record.label(),
            self.config.provider,
            endpoint.model,
            inspiration.as_str(),
            intent.as_str()
        );

        let style_text = match inspiration {
            TemplateKind::Cold | TemplateKind::Warm => self.templates.load_text(inspiration).ok(),
            _ => None,
        };
        let prompt = build_user_prompt(
            record,
            style_text.as_deref(),
            intent,
            non_empty(&self.config.candidate_profile),
        );
        let content = self.complete(&endpoint, &prompt).await?;
        parse_reply(&content)
    }
}
