//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default chat-completions endpoint (Groq's OpenAI-compatible API).
pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Default completion model.
pub const DEFAULT_MODEL: &str = "llama3-8b-8192";

/// Sessions idle for longer than this are dropped.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Consultation policy.
#[derive(Debug, Clone)]
pub struct ConsultConfig {
    /// Maximum number of follow-up questions per consultation.
    pub max_questions: usize,
    /// Sampling temperature for follow-up questions.
    pub question_temperature: f32,
    /// Token cap for a follow-up question.
    pub question_max_tokens: u32,
    /// Sampling temperature for the advice report.
    pub advice_temperature: f32,
    /// Token cap for the advice report.
    pub advice_max_tokens: u32,
    /// Adapter calls that take longer than this are treated as failures.
    pub request_timeout: Duration,
}

impl Default for ConsultConfig {
    fn default() -> Self {
        Self {
            max_questions: 3,
            question_temperature: 0.7,
            question_max_tokens: 50,
            advice_temperature: 0.7,
            advice_max_tokens: 2048,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Process configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub http_port: u16,
    pub export_dir: PathBuf,
    pub log_dir: PathBuf,
    pub session_ttl: Duration,
    pub consult: ConsultConfig,
}

impl ServiceConfig {
    /// Build config from environment variables.
    ///
    /// `GROQ_API_KEY` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("GROQ_API_KEY".to_string()))?;

        let api_url =
            std::env::var("AI_HOSPITAL_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let model =
            std::env::var("AI_HOSPITAL_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let http_port = parse_var("AI_HOSPITAL_HTTP_PORT")?.unwrap_or(8080);

        let export_dir = std::env::var("AI_HOSPITAL_EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./reports"));
        let log_dir = std::env::var("AI_HOSPITAL_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./logs"));

        let session_ttl = match parse_var::<u64>("AI_HOSPITAL_SESSION_TTL_SECS")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "AI_HOSPITAL_SESSION_TTL_SECS".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_SESSION_TTL,
        };

        let mut consult = ConsultConfig::default();
        if let Some(max) = parse_var::<usize>("AI_HOSPITAL_MAX_QUESTIONS")? {
            if max == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "AI_HOSPITAL_MAX_QUESTIONS".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            consult.max_questions = max;
        }
        if let Some(secs) = parse_var::<u64>("AI_HOSPITAL_TIMEOUT_SECS")? {
            consult.request_timeout = Duration::from_secs(secs);
        }

        Ok(Self {
            api_url,
            api_key: SecretString::from(api_key),
            model,
            http_port,
            export_dir,
            log_dir,
            session_ttl,
            consult,
        })
    }
}

/// Read and parse an optional environment variable.
fn parse_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
