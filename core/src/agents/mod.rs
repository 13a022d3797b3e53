pub mod client;
pub mod config;
pub mod discovery;
pub mod prompts;
pub mod store;

pub use client::{LlmClient, TokenUsage};
pub use config::{ModelParams, ModelSelection, ParamOverrides, ProviderConfig, Settings};
pub use prompts::{TaskKind, TaskOutput};
pub use store::{DeleteOutcome, ProviderStore};
