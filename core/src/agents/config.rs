//! Settings document: provider records, sampling parameters and per-task
//! overrides, plus the pure operations the store performs on them.
//!
//! Everything here works on an in-memory [`Settings`] value so the rules
//! (parameter precedence, reference clearing on delete, default model
//! resolution) can be exercised without touching disk.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote OpenAI-compatible endpoint plus the credential forwarded to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
}

fn enabled_by_default() -> bool {
    true
}

impl ProviderConfig {
    pub fn known_models(&self) -> &[String] {
        self.models.as_deref().unwrap_or_default()
    }
}

/// Fully resolved sampling parameters sent with a chat completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParams {
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

/// Built-in parameters, the lowest precedence layer.
impl Default for ModelParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_tokens: None,
            seed: None,
        }
    }
}

impl ModelParams {
    /// Overlay the fields `overrides` sets; unset fields keep their value.
    pub fn apply(&mut self, overrides: &ParamOverrides) {
        if let Some(v) = overrides.temperature {
            self.temperature = v;
        }
        if let Some(v) = overrides.top_p {
            self.top_p = v;
        }
        if let Some(v) = overrides.frequency_penalty {
            self.frequency_penalty = v;
        }
        if let Some(v) = overrides.presence_penalty {
            self.presence_penalty = v;
        }
        if let Some(v) = overrides.max_tokens {
            self.max_tokens = Some(v);
        }
        if let Some(v) = overrides.seed {
            self.seed = Some(v);
        }
    }
}

/// Partial [`ModelParams`]; only the fields that are `Some` take effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

impl ParamOverrides {
    /// Global defaults written into a fresh settings document.
    pub fn zeroed() -> Self {
        Self {
            temperature: Some(0.0),
            top_p: Some(1.0),
            frequency_penalty: Some(0.0),
            presence_penalty: Some(0.0),
            max_tokens: None,
            seed: None,
        }
    }
}

/// Provider/model pinned to one task type, with optional parameter tweaks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<ParamOverrides>,
}

/// Root of the persisted configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "ParamOverrides::zeroed")]
    pub default_params: ParamOverrides,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model_id: Option<String>,
    #[serde(default)]
    pub task_overrides: BTreeMap<String, TaskOverride>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            default_params: ParamOverrides::zeroed(),
            default_provider_id: None,
            default_model_id: None,
            task_overrides: BTreeMap::new(),
        }
    }
}

/// Provider/model pair chosen for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSelection {
    pub provider_id: String,
    pub model_id: String,
}

/// Decode a persisted document and deep-merge it onto [`Settings::default`],
/// so files written before a field existed still load complete.
pub fn parse_settings(raw: &str) -> serde_json::Result<Settings> {
    let overlay: Value = serde_json::from_str(raw)?;
    let mut merged = serde_json::to_value(Settings::default())?;
    merge_json(&mut merged, overlay);
    serde_json::from_value(merged)
}

/// Recursive object merge. `null` in the overlay never replaces a value;
/// arrays and scalars replace wholesale.
pub fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        if !value.is_null() {
                            base.insert(key, value);
                        }
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Replace the record with the same id, or append a new one.
pub fn upsert_provider(settings: &mut Settings, config: ProviderConfig) {
    match settings.providers.iter_mut().find(|p| p.id == config.id) {
        Some(existing) => *existing = config,
        None => settings.providers.push(config),
    }
}

/// Remove a provider and every reference to it. Returns `false` and leaves
/// `settings` untouched when no record matched.
pub fn remove_provider(settings: &mut Settings, provider_id: &str) -> bool {
    let before = settings.providers.len();
    settings.providers.retain(|p| p.id != provider_id);
    if settings.providers.len() == before {
        return false;
    }

    prune_dangling_references(settings);
    true
}

/// Clear the default pair and drop task overrides whose provider id names no
/// record in `settings.providers`.
pub fn prune_dangling_references(settings: &mut Settings) {
    let Settings {
        providers,
        default_provider_id,
        default_model_id,
        task_overrides,
        ..
    } = settings;
    let known = |id: &str| providers.iter().any(|p| p.id == id);

    if default_provider_id.as_deref().is_some_and(|id| !known(id)) {
        *default_provider_id = None;
        *default_model_id = None;
    }
    task_overrides.retain(|_, o| o.provider_id.as_deref().map_or(true, known));
}

/// Four-tier precedence: built-in → global defaults → task override →
/// request. A layer only wins for the fields it sets.
pub fn effective_params(
    settings: &Settings,
    task_type: &str,
    request: Option<&ParamOverrides>,
) -> ModelParams {
    let mut params = ModelParams::default();
    params.apply(&settings.default_params);
    if let Some(task) = settings
        .task_overrides
        .get(task_type)
        .and_then(|o| o.params.as_ref())
    {
        params.apply(task);
    }
    if let Some(request) = request {
        params.apply(request);
    }
    params
}

/// Task override, then the global default pair, then the first enabled
/// provider with a known model.
pub fn default_model_for_task(settings: &Settings, task_type: &str) -> Option<ModelSelection> {
    if let Some(selection) = settings
        .task_overrides
        .get(task_type)
        .and_then(|o| selection_of(o.provider_id.as_deref(), o.model_id.as_deref()))
    {
        return Some(selection);
    }

    if let Some(selection) = selection_of(
        settings.default_provider_id.as_deref(),
        settings.default_model_id.as_deref(),
    ) {
        return Some(selection);
    }

    settings
        .providers
        .iter()
        .filter(|p| p.enabled)
        .find_map(|p| {
            p.known_models().first().map(|model| ModelSelection {
                provider_id: p.id.clone(),
                model_id: model.clone(),
            })
        })
}

fn selection_of(provider_id: Option<&str>, model_id: Option<&str>) -> Option<ModelSelection> {
    match (provider_id, model_id) {
        (Some(p), Some(m)) if !p.is_empty() && !m.is_empty() => Some(ModelSelection {
            provider_id: p.to_string(),
            model_id: m.to_string(),
        }),
        _ => None,
    }
}

const MASK_PREFIX: &str = "***";

/// `***` followed by the last four characters. Short keys are fully hidden.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 4 {
        return MASK_PREFIX.to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{MASK_PREFIX}{tail}")
}

/// Copy of `settings` safe to hand to a client.
pub fn masked(settings: &Settings) -> Settings {
    let mut copy = settings.clone();
    for provider in &mut copy.providers {
        provider.api_key = mask_api_key(&provider.api_key);
    }
    copy
}

/// A client that read masked settings may post them back unchanged; keep the
/// stored credential when the incoming key is exactly its mask.
pub fn restore_masked_key(incoming: &mut ProviderConfig, stored: Option<&ProviderConfig>) {
    if let Some(stored) = stored {
        if incoming.api_key.starts_with(MASK_PREFIX)
            && incoming.api_key == mask_api_key(&stored.api_key)
        {
            incoming.api_key = stored.api_key.clone();
        }
    }
}

pub fn restore_masked_keys(incoming: &mut Settings, stored: &Settings) {
    for provider in &mut incoming.providers {
        let previous = stored.providers.iter().find(|p| p.id == provider.id);
        restore_masked_key(provider, previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider(id: &str, enabled: bool, models: &[&str]) -> ProviderConfig {
        ProviderConfig {
            id: id.into(),
            name: id.to_uppercase(),
            base_url: format!("https://{id}.example/v1"),
            api_key: "sk-test-123456".into(),
            enabled,
            models: if models.is_empty() {
                None
            } else {
                Some(models.iter().map(|m| m.to_string()).collect())
            },
        }
    }

    #[test]
    fn partial_document_loads_structurally_complete() {
        let settings =
            parse_settings(r#"{"defaultParams":{"temperature":0.3},"taskOverrides":null}"#)
                .unwrap();
        assert!(settings.providers.is_empty());
        assert!(settings.task_overrides.is_empty());
        assert_eq!(settings.default_params.temperature, Some(0.3));
        assert_eq!(settings.default_params.top_p, Some(1.0));
        assert_eq!(settings.default_params.frequency_penalty, Some(0.0));
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(parse_settings("{not json").is_err());
        assert!(parse_settings("[1,2,3]").is_err());
    }

    #[test]
    fn each_layer_only_overrides_what_it_sets() {
        let mut settings = Settings::default();
        settings.default_params = ParamOverrides {
            temperature: Some(0.2),
            top_p: None,
            max_tokens: Some(256),
            ..Default::default()
        };
        settings.task_overrides.insert(
            "translate".into(),
            TaskOverride {
                provider_id: None,
                model_id: None,
                params: Some(ParamOverrides {
                    frequency_penalty: Some(0.5),
                    seed: Some(7),
                    ..Default::default()
                }),
            },
        );
        let request = ParamOverrides {
            temperature: Some(0.9),
            ..Default::default()
        };

        let params = effective_params(&settings, "translate", Some(&request));
        assert_eq!(params.temperature, 0.9);
        // nobody above the built-in layer set these
        assert_eq!(params.top_p, 1.0);
        assert_eq!(params.presence_penalty, 0.0);
        assert_eq!(params.frequency_penalty, 0.5);
        assert_eq!(params.max_tokens, Some(256));
        assert_eq!(params.seed, Some(7));

        let other = effective_params(&settings, "segment", None);
        assert_eq!(other.temperature, 0.2);
        assert_eq!(other.frequency_penalty, 0.0);
        assert_eq!(other.seed, None);
    }

    #[test]
    fn absent_request_fields_fall_through() {
        let settings = Settings::default();
        let request: ParamOverrides = serde_json::from_value(json!({ "topP": 0.8 })).unwrap();
        let params = effective_params(&settings, "score", Some(&request));
        assert_eq!(params.temperature, 0.0);
        assert_eq!(params.top_p, 0.8);
    }

    #[test]
    fn remove_provider_clears_only_its_references() {
        let mut settings = Settings::default();
        settings.providers = vec![provider("a", true, &["m1"]), provider("b", true, &["m2"])];
        settings.default_provider_id = Some("a".into());
        settings.default_model_id = Some("m1".into());
        settings.task_overrides.insert(
            "translate".into(),
            TaskOverride {
                provider_id: Some("a".into()),
                model_id: Some("m1".into()),
                params: None,
            },
        );
        settings.task_overrides.insert(
            "score".into(),
            TaskOverride {
                provider_id: Some("b".into()),
                model_id: Some("m2".into()),
                params: None,
            },
        );

        assert!(remove_provider(&mut settings, "a"));
        assert_eq!(settings.providers.len(), 1);
        assert_eq!(settings.default_provider_id, None);
        assert_eq!(settings.default_model_id, None);
        assert!(!settings.task_overrides.contains_key("translate"));
        assert!(settings.task_overrides.contains_key("score"));
    }

    #[test]
    fn remove_unknown_provider_leaves_settings_unchanged() {
        let mut settings = Settings::default();
        settings.providers = vec![provider("a", true, &[])];
        settings.default_provider_id = Some("a".into());
        let before = settings.clone();
        assert!(!remove_provider(&mut settings, "missing"));
        assert_eq!(settings, before);
    }

    #[test]
    fn pruning_drops_references_to_absent_providers() {
        let mut settings = Settings::default();
        settings.providers = vec![provider("b", true, &["m2"])];
        settings.default_provider_id = Some("ghost".into());
        settings.default_model_id = Some("m".into());
        for (task, id) in [("translate", Some("ghost")), ("score", Some("b")), ("segment", None)] {
            settings.task_overrides.insert(
                task.into(),
                TaskOverride {
                    provider_id: id.map(String::from),
                    model_id: Some("m".into()),
                    params: None,
                },
            );
        }

        prune_dangling_references(&mut settings);
        assert_eq!(settings.default_provider_id, None);
        assert_eq!(settings.default_model_id, None);
        let kept: Vec<&str> = settings.task_overrides.keys().map(String::as_str).collect();
        assert_eq!(kept, vec!["score", "segment"]);
    }

    #[test]
    fn upsert_replaces_whole_record() {
        let mut settings = Settings::default();
        upsert_provider(&mut settings, provider("a", true, &["m1"]));
        let mut replacement = provider("a", false, &[]);
        replacement.name = "Renamed".into();
        upsert_provider(&mut settings, replacement.clone());
        assert_eq!(settings.providers, vec![replacement]);
    }

    #[test]
    fn default_model_resolution_order() {
        let mut settings = Settings::default();
        assert_eq!(default_model_for_task(&settings, "translate"), None);

        settings.providers = vec![
            provider("off", false, &["x"]),
            provider("empty", true, &[]),
            provider("on", true, &["first", "second"]),
        ];
        assert_eq!(
            default_model_for_task(&settings, "translate"),
            Some(ModelSelection {
                provider_id: "on".into(),
                model_id: "first".into()
            })
        );

        settings.default_provider_id = Some("empty".into());
        settings.default_model_id = Some("custom-model".into());
        assert_eq!(
            default_model_for_task(&settings, "translate").map(|s| s.model_id),
            Some("custom-model".into())
        );

        settings.task_overrides.insert(
            "translate".into(),
            TaskOverride {
                provider_id: Some("off".into()),
                model_id: Some("x".into()),
                params: None,
            },
        );
        assert_eq!(
            default_model_for_task(&settings, "translate").map(|s| s.provider_id),
            Some("off".into())
        );
        assert_eq!(
            default_model_for_task(&settings, "segment").map(|s| s.provider_id),
            Some("empty".into())
        );
    }

    #[test]
    fn masking_keeps_last_four_characters() {
        assert_eq!(mask_api_key("sk-abcdef1234"), "***1234");
        assert_eq!(mask_api_key("abcd"), "***");
        assert_eq!(mask_api_key(""), "");
    }

    #[test]
    fn masked_key_posted_back_keeps_stored_secret() {
        let stored = provider("a", true, &[]);
        let mut incoming = masked(&Settings {
            providers: vec![stored.clone()],
            ..Default::default()
        });
        restore_masked_keys(
            &mut incoming,
            &Settings {
                providers: vec![stored.clone()],
                ..Default::default()
            },
        );
        assert_eq!(incoming.providers[0].api_key, stored.api_key);

        let mut rotated = stored.clone();
        rotated.api_key = "sk-new-key-9999".into();
        restore_masked_key(&mut rotated, Some(&stored));
        assert_eq!(rotated.api_key, "sk-new-key-9999");
    }
}
