// utils.rs
use crate::error::ConnectError;

/// Websocket address of a hub served under `base_url`.
pub fn hub_url(base_url: &str, hub_name: &str) -> Result<String, ConnectError> {
    let base = base_url.trim().trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(ConnectError::InvalidAddress(format!(
            "base url must start with http:// or https://: {base_url}"
        )));
    };
    let hub = hub_name.trim().trim_matches('/');
    if hub.is_empty() {
        return Ok(ws_base);
    }
    Ok(format!("{ws_base}/{hub}"))
}

/// Blank strings from the REST snapshot mean "not set".
pub fn trim_to_option(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
