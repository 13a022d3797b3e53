use log::Level;
use serde_json::Value;

/// Emit a structured event through the `log` facade. `module` becomes the log
/// target so filters such as `RUST_LOG=llm.executor=debug` apply per area.
pub fn log_event(
    level: Level,
    code: Option<&str>,
    module: &str,
    message: &str,
    explain: Option<&str>,
    data: Option<Value>,
) {
    if !log::log_enabled!(target: module, level) {
        return;
    }
    let code = code.unwrap_or("-");
    let explain = explain.map(|e| format!(" ({e})")).unwrap_or_default();
    let data = data.map(|v| format!(" {v}")).unwrap_or_default();
    log::log!(target: module, level, "[{code}] {message}{explain}{data}");
}

