use thiserror::Error;

/// Failure modes of a task execution, a model discovery call or a settings
/// write. Every variant renders to the message returned in `{success:false}`
/// payloads.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),
    #[error("Provider is disabled: {0}")]
    ProviderDisabled(String),
    #[error("Failed to build prompt: {0}")]
    PromptBuild(String),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Empty response from model")]
    EmptyResponse,
    #[error("Failed to parse model response as JSON: {snippet}")]
    ResponseParse { snippet: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response format from models endpoint")]
    InvalidResponseFormat,
    #[error("Settings persistence failed: {0}")]
    Persistence(String),
}

impl TaskError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProviderNotFound(_) => "LLM-1001",
            Self::ProviderDisabled(_) => "LLM-1002",
            Self::PromptBuild(_) => "LLM-1101",
            Self::Api { .. } => "LLM-1201",
            Self::EmptyResponse => "LLM-1202",
            Self::ResponseParse { .. } => "LLM-1203",
            Self::Network(_) => "LLM-1204",
            Self::InvalidResponseFormat => "LLM-1301",
            Self::Persistence(_) => "CFG-1001",
        }
    }

    pub fn explain(&self) -> &'static str {
        match self {
            Self::ProviderNotFound(_) => "No provider is configured under that identifier.",
            Self::ProviderDisabled(_) => "The provider exists but is switched off in settings.",
            Self::PromptBuild(_) => "The task type is unknown or its parameters are incomplete.",
            Self::Api { .. } => "The provider answered with a non-success HTTP status.",
            Self::EmptyResponse => "The provider returned no message content.",
            Self::ResponseParse { .. } => "The model output was not valid JSON once unfenced.",
            Self::Network(_) => "The provider could not be reached.",
            Self::InvalidResponseFormat => "The models listing did not contain a `data` array.",
            Self::Persistence(_) => "The settings document could not be read or written.",
        }
    }
}
