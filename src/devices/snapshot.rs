// devices/snapshot.rs
use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::error::SnapshotError;
use crate::models::{ControlBoxRow, Device};

/// Source of the device table loaded at startup and on manual refresh.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn load(&self) -> Result<Vec<Device>, SnapshotError>;
}

/// Reads `GET /api/get/control-box`.
pub struct HttpSnapshotSource {
    client: Client,
    url: String,
}

impl HttpSnapshotSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn load(&self) -> Result<Vec<Device>, SnapshotError> {
        info!(url = %self.url, "Loading device snapshot");
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_control_boxes(&body)
    }
}

pub fn parse_control_boxes(body: &str) -> Result<Vec<Device>, SnapshotError> {
    let rows: Vec<ControlBoxRow> =
        serde_json::from_str(body).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    Ok(rows.into_iter().map(Device::from).collect())
}

/// Fixed device list, for demos and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSnapshot {
    devices: Vec<Device>,
}

impl StaticSnapshot {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshot {
    async fn load(&self) -> Result<Vec<Device>, SnapshotError> {
        Ok(self.devices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_control_box_rows() {
        let devices = parse_control_boxes(
            r#"[
                {"ID": 1, "Name": "Ramses", "IpAddress": "10.0.0.1", "Latitude": " 30.06 ", "Longitude": "31.24"},
                {"ID": 2, "Name": "Giza", "IpAddress": "10.0.0.2", "Latitude": "", "Longitude": null, "LightPatternId": 5}
            ]"#,
        )
        .unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].latitude.as_deref(), Some("30.06"));
        assert!(devices[0].is_geocoded());
        assert_eq!(devices[1].latitude, None);
        assert_eq!(devices[1].light_pattern_id, Some(5));
        assert!(devices.iter().all(|d| d.active && d.remaining1.is_none()));
    }

    #[test]
    fn rejects_non_array_body() {
        assert!(matches!(
            parse_control_boxes(r#"{"ID": 1}"#),
            Err(SnapshotError::Decode(_))
        ));
    }
}
