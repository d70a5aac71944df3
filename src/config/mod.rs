// config/mod.rs
use config::{Config, ConfigBuilder, builder::DefaultState};
use serde::Deserialize;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::error::{ConnectError, SettingsError};
use crate::utils;

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_timing"))]
pub struct Settings {
    #[validate(nested)]
    pub hub: HubSettings,
    #[serde(default)]
    #[validate(nested)]
    pub api: ApiSettings,
    #[validate(nested)]
    pub backoff: BackoffSettings,
    #[validate(nested)]
    pub countdown: CountdownSettings,
    #[validate(nested)]
    pub events: EventSettings,
    pub metrics: MetricsSettings,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HubSettings {
    #[validate(url)]
    pub base_url: String,
    #[validate(length(min = 1))]
    pub hub_name: String,
    /// Upper bound on one connect attempt, upgrade included.
    #[validate(range(min = 1))]
    pub connect_timeout_ms: u64,
    /// Websocket ping interval while the link is idle.
    #[validate(range(min = 1))]
    pub keepalive_ms: u64,
    /// Silence longer than this drops the link.
    #[validate(range(min = 1))]
    pub idle_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ApiSettings {
    /// Falls back to the hub base url when unset.
    #[validate(url)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BackoffSettings {
    #[validate(range(min = 1))]
    pub floor_ms: u64,
    #[validate(range(min = 1))]
    pub max_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CountdownSettings {
    #[validate(range(min = 1))]
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EventSettings {
    #[validate(range(min = 1))]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub port: u16,
}

impl Settings {
    /// Defaults, then `config/signal-sync.*` if present, then
    /// environment variables named `SIGNAL_SYNC_<SECTION>__<KEY>`,
    /// e.g. `SIGNAL_SYNC_HUB__BASE_URL`.
    pub fn new() -> Result<Self, SettingsError> {
        let builder = Self::defaults()?
            .add_source(config::File::with_name("config/signal-sync").required(false))
            .add_source(environment());
        Self::build(builder)
    }

    /// Defaults overlaid with a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, SettingsError> {
        let builder =
            Self::defaults()?.add_source(config::File::from_str(text, config::FileFormat::Toml));
        Self::build(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
        Config::builder()
            .set_default("hub.base_url", "http://127.0.0.1/TLC")?
            .set_default("hub.hub_name", "messageHub")?
            .set_default("hub.connect_timeout_ms", 10_000_i64)?
            .set_default("hub.keepalive_ms", 15_000_i64)?
            .set_default("hub.idle_timeout_ms", 30_000_i64)?
            .set_default("backoff.floor_ms", 1000_i64)?
            .set_default("backoff.max_ms", 10_000_i64)?
            .set_default("countdown.tick_ms", 1000_i64)?
            .set_default("events.capacity", 256_i64)?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.port", 9100_i64)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, SettingsError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn hub_url(&self) -> Result<String, ConnectError> {
        utils::hub_url(&self.hub.base_url, &self.hub.hub_name)
    }

    pub fn control_box_url(&self) -> String {
        let base = self.api.base_url.as_deref().unwrap_or(&self.hub.base_url);
        format!("{}/api/get/control-box", base.trim_end_matches('/'))
    }

    pub fn backoff_floor(&self) -> Duration {
        Duration::from_millis(self.backoff.floor_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff.max_ms)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.countdown.tick_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.hub.connect_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.hub.keepalive_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.hub.idle_timeout_ms)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("SIGNAL_SYNC")
        .prefix_separator("_")
        .separator("__")
}

fn validate_timing(settings: &Settings) -> Result<(), ValidationError> {
    if settings.backoff.floor_ms > settings.backoff.max_ms {
        return Err(ValidationError::new("backoff_floor_exceeds_max"));
    }
    // At least one ping must fit inside the idle window.
    if settings.hub.keepalive_ms >= settings.hub.idle_timeout_ms {
        return Err(ValidationError::new("keepalive_not_below_idle_timeout"));
    }
    Ok(())
}
