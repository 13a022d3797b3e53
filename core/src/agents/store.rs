//! Durable storage of the settings document and the provider CRUD built on
//! top of it.
//!
//! Every mutation is a read/modify/write of the whole document with no lock
//! held across the three steps, so two concurrent writers resolve as
//! last-write-wins. Callers needing stricter consistency serialise writes
//! themselves.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::Level;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::config::{self, ModelParams, ModelSelection, ParamOverrides, ProviderConfig, Settings};
use crate::errors::TaskError;
use crate::logging::log_event;

/// Raw access to wherever the settings document lives.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// `Ok(None)` when nothing has been persisted yet.
    async fn read(&self) -> Result<Option<String>>;
    async fn write(&self, contents: &str) -> Result<()>;
}

/// JSON file at a fixed path, created (with parent directories) on first
/// write.
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling `<name>.<uuid>.tmp`, unique per write so concurrent saves
    /// never share a staging file.
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "settings.json".into());
        name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SettingsRepository for JsonFileRepository {
    async fn read(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        }
    }

    async fn write(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        // Rename over the target so readers never observe a half-written file.
        let staging = self.staging_path();
        tokio::fs::write(&staging, contents)
            .await
            .with_context(|| format!("failed to write {}", staging.display()))?;
        if let Err(err) = tokio::fs::rename(&staging, &self.path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(err).with_context(|| format!("failed to replace {}", self.path.display()));
        }
        Ok(())
    }
}

/// Process-local repository, handy for embedding and tests.
#[derive(Default)]
pub struct MemoryRepository {
    contents: Mutex<Option<String>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(raw: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(raw.into())),
        }
    }
}

#[async_trait]
impl SettingsRepository for MemoryRepository {
    async fn read(&self) -> Result<Option<String>> {
        Ok(self.contents.lock().await.clone())
    }

    async fn write(&self, contents: &str) -> Result<()> {
        *self.contents.lock().await = Some(contents.to_string());
        Ok(())
    }
}

/// Outcome of [`ProviderStore::delete_provider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    PersistFailed,
}

/// Settings access shared by the executor and the HTTP layer.
#[derive(Clone)]
pub struct ProviderStore {
    repo: Arc<dyn SettingsRepository>,
}

impl ProviderStore {
    pub fn new(repo: Arc<dyn SettingsRepository>) -> Self {
        Self { repo }
    }

    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(JsonFileRepository::new(path)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRepository::new()))
    }

    /// Persisted settings, or the defaults when nothing usable is stored.
    pub async fn load_settings(&self) -> Settings {
        let raw = match self.repo.read().await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Settings::default(),
            Err(err) => {
                report(&TaskError::Persistence(format!("{err:#}")), "Settings read failed");
                return Settings::default();
            }
        };
        match config::parse_settings(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                report(
                    &TaskError::Persistence(err.to_string()),
                    "Settings document is malformed, using defaults",
                );
                Settings::default()
            }
        }
    }

    /// Overwrite the whole document. Failures are logged, never raised.
    pub async fn save_settings(&self, settings: &Settings) -> bool {
        let result = match serde_json::to_string_pretty(settings) {
            Ok(body) => self.repo.write(&body).await,
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(()) => {
                log_event(
                    Level::Debug,
                    Some("CFG-0001"),
                    "llm.settings",
                    "Settings saved",
                    None,
                    Some(json!({ "providers": settings.providers.len() })),
                );
                true
            }
            Err(err) => {
                report(&TaskError::Persistence(format!("{err:#}")), "Settings write failed");
                false
            }
        }
    }

    pub async fn get_provider(&self, provider_id: &str) -> Option<ProviderConfig> {
        self.load_settings()
            .await
            .providers
            .into_iter()
            .find(|p| p.id == provider_id)
    }

    /// Upsert by id, then persist.
    pub async fn save_provider_config(&self, provider: ProviderConfig) -> bool {
        let mut settings = self.load_settings().await;
        let provider_id = provider.id.clone();
        config::upsert_provider(&mut settings, provider);
        let saved = self.save_settings(&settings).await;
        if saved {
            log_event(
                Level::Info,
                Some("CFG-0002"),
                "llm.settings",
                "Provider saved",
                None,
                Some(json!({ "provider": provider_id })),
            );
        }
        saved
    }

    pub async fn delete_provider(&self, provider_id: &str) -> DeleteOutcome {
        let mut settings = self.load_settings().await;
        if !config::remove_provider(&mut settings, provider_id) {
            return DeleteOutcome::NotFound;
        }
        if !self.save_settings(&settings).await {
            return DeleteOutcome::PersistFailed;
        }
        log_event(
            Level::Info,
            Some("CFG-0003"),
            "llm.settings",
            "Provider deleted",
            Some("Dangling default and task references cleared"),
            Some(json!({ "provider": provider_id })),
        );
        DeleteOutcome::Deleted
    }

    pub async fn get_effective_params(
        &self,
        task_type: &str,
        request: Option<&ParamOverrides>,
    ) -> ModelParams {
        let settings = self.load_settings().await;
        config::effective_params(&settings, task_type, request)
    }

    pub async fn get_default_model_for_task(&self, task_type: &str) -> Option<ModelSelection> {
        let settings = self.load_settings().await;
        config::default_model_for_task(&settings, task_type)
    }
}

fn report(error: &TaskError, message: &str) {
    log_event(
        Level::Error,
        Some(error.code()),
        "llm.settings",
        message,
        Some(error.explain()),
        Some(json!({ "error": error.to_string() })),
    );
}
