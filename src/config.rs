//! Runtime configuration.
//!
//! Everything comes from environment variables (optionally seeded from a
//! `.env` file). Parsing goes through a lookup closure so tests can feed a
//! plain map instead of mutating the process environment.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::util::parse_flag;

/// Template kind → file name inside `TEMPLATES_DIR`.
pub const DEFAULT_TEMPLATES: &[(&str, &str)] = &[
    ("cold", "template_cold.txt"),
    ("warm", "template_warm.txt"),
    ("coffee", "template_coffee.txt"),
    ("direct", "template_direct.txt"),
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// When the end-of-run report is emailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertMode {
    ErrorOnly,
    Always,
    Never,
}

impl AlertMode {
    /// Unknown spellings behave like `error-only`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "always" => AlertMode::Always,
            "never" => AlertMode::Never,
            _ => AlertMode::ErrorOnly,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub email: String,
    pub mode: AlertMode,
    pub subject_prefix: String,
}

#[derive(Debug, Clone)]
pub struct SheetConfig {
    /// Empty means "no spreadsheet": contacts come from the file source.
    pub spreadsheet_id: String,
    pub range: String,
    pub has_header: bool,
    pub status_column: Option<String>,
    pub sent_at_column: Option<String>,
}

impl SheetConfig {
    pub fn enabled(&self) -> bool {
        !self.spreadsheet_id.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ResumeConfig {
    pub default_name: String,
    pub default_id: Option<String>,
    pub folder_id: Option<String>,
    /// Resume flag (lower-case) → Drive file id or `name:<file name>`.
    pub resume_map: HashMap<String, String>,
    pub local_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Azure,
    Github,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub enabled: bool,
    /// Raw provider name; resolved per call so an unknown provider is a
    /// per-record composition failure, not a startup failure.
    pub provider: String,
    pub model: String,
    pub github_model: Option<String>,
    pub github_endpoint: Option<String>,
    pub github_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub azure_api_key: Option<String>,
    pub azure_endpoint: Option<String>,
    pub azure_api_version: String,
    pub azure_deployment: Option<String>,
    /// One-line sender profile included in the prompt.
    pub candidate_profile: Option<String>,
}

impl LlmConfig {
    pub fn provider_kind(&self) -> Option<LlmProvider> {
        match self.provider.as_str() {
            "openai" => Some(LlmProvider::OpenAi),
            "azure" => Some(LlmProvider::Azure),
            "github" => Some(LlmProvider::Github),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub contacts_file: PathBuf,
    pub templates_dir: PathBuf,
    pub templates: HashMap<String, String>,
    pub daily_limit: u32,
    pub dry_run: bool,
    pub verbose: bool,
    pub use_sent_log: bool,
    pub sent_log_path: PathBuf,
    pub send_delay_ms: u64,
    pub mail_from: Option<String>,
    pub alert: AlertConfig,
    pub llm: LlmConfig,
    pub sheets: SheetConfig,
    pub resume: ResumeConfig,
    pub google: GoogleConfig,
}

impl AppConfig {
    /// Load from the process environment, reading `.env` first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let alert = AlertConfig {
            email: env.string("ALERT_EMAIL", ""),
            mode: AlertMode::parse(&env.string("ALERT_ON", "error")),
            subject_prefix: env.string("ALERT_SUBJECT_PREFIX", "[Referrals Bot]"),
        };

        let llm = LlmConfig {
            enabled: env.flag("USE_LLM", true),
            provider: env.string("LLM_PROVIDER", "github").to_lowercase(),
            model: env.string("LLM_MODEL", "gpt-4o-mini"),
            github_model: env.optional("LLM_GITHUB_MODEL"),
            github_endpoint: env.optional("LLM_GITHUB_MODELS_ENDPOINT"),
            github_token: env.optional("LLM_GITHUB_TOKEN"),
            openai_api_key: env.optional("OPENAI_API_KEY"),
            azure_api_key: env.optional("AZURE_OPENAI_API_KEY"),
            azure_endpoint: env
                .optional("AZURE_OPENAI_ENDPOINT")
                .map(|e| e.trim_end_matches('/').to_string()),
            azure_api_version: env.string("AZURE_OPENAI_API_VERSION", "2024-02-15-preview"),
            azure_deployment: env.optional("AZURE_OPENAI_DEPLOYMENT"),
            candidate_profile: env.optional("CANDIDATE_PROFILE"),
        };

        let sheets = SheetConfig {
            spreadsheet_id: env.string("SHEETS_SPREADSHEET_ID", ""),
            range: env.string("SHEETS_RANGE", "Contacts!A:F"),
            has_header: env.flag("SHEETS_HAS_HEADER", true),
            status_column: env.column("SHEETS_STATUS_COLUMN")?,
            sent_at_column: env.column("SHEETS_SENT_AT_COLUMN")?,
        };

        let resume = ResumeConfig {
            default_name: env.string("RESUME_DEFAULT_NAME", ""),
            default_id: env.optional("RESUME_DEFAULT_ID"),
            folder_id: env.optional("RESUME_FOLDER_ID"),
            resume_map: parse_resume_map(env.optional("RESUME_MAP").as_deref()),
            local_path: PathBuf::from(env.string("RESUME_PATH", "resume.pdf")),
        };

        let google = GoogleConfig {
            credentials_path: PathBuf::from(
                env.string("GOOGLE_CREDENTIALS_PATH", "credentials.json"),
            ),
            token_path: PathBuf::from(env.string("GOOGLE_TOKEN_PATH", "token.json")),
        };

        Ok(Self {
            contacts_file: PathBuf::from(env.string("CONTACTS_CSV", "leads.csv")),
            templates_dir: PathBuf::from(env.string("TEMPLATES_DIR", "templates")),
            templates: DEFAULT_TEMPLATES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            daily_limit: env.number("DAILY_LIMIT", 0),
            dry_run: env.flag("DRY_RUN", false),
            verbose: env.flag("VERBOSE", false),
            use_sent_log: env.flag("USE_SENT_LOG", false),
            sent_log_path: PathBuf::from(env.string("SENT_LOG_PATH", "sent_log.json")),
            send_delay_ms: env.number("SEND_DELAY_MS", 1500),
            mail_from: env.optional("MAIL_FROM"),
            alert,
            llm,
            sheets,
            resume,
            google,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str, default: &str) -> String {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| default.to_string())
    }

    /// Unset and blank both mean `None`.
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn flag(&self, name: &str, default: bool) -> bool {
        match (self.0)(name) {
            Some(raw) => parse_flag(&raw),
            None => default,
        }
    }

    fn number<T: std::str::FromStr>(&self, name: &str, default: T) -> T {
        (self.0)(name)
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(default)
    }

    /// A column override must be plain letters (`F`, `AA`).
    fn column(&self, name: &'static str) -> Result<Option<String>, ConfigError> {
        match self.optional(name) {
            None => Ok(None),
            Some(col) if col.chars().all(|c| c.is_ascii_alphabetic()) => {
                Ok(Some(col.to_ascii_uppercase()))
            }
            Some(col) => Err(ConfigError::Invalid {
                name,
                reason: format!("'{}' is not a column letter", col),
            }),
        }
    }
}

/// Parse `RESUME_MAP`: either a JSON object or `key:value,key:value` pairs.
/// Keys are lower-cased; values keep their case (Drive ids are case-sensitive).
pub fn parse_resume_map(raw: Option<&str>) -> HashMap<String, String> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return HashMap::new();
    };

    if let Ok(serde_json::Value::Object(obj)) = serde_json::from_str::<serde_json::Value>(raw) {
        return obj
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k.to_lowercase(), value)
            })
            .collect();
    }

    raw.split(',')
        .filter_map(|pair| pair.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect()
}
