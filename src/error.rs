// error.rs
use thiserror::Error;

use crate::models::DeviceId;

/// Failure to bring up a link to the control server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),
    #[error("Invalid hub address: {0}")]
    InvalidAddress(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("Not connected")]
    NotConnected,
    #[error("Invoke failed: {0}")]
    Transport(String),
}

/// Reasons a unit-action payload is rejected. Every variant is a
/// malformed payload; none of them stops the inbound stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload is not valid JSON: {0}")]
    Unparseable(String),
    #[error("Payload is not a JSON object")]
    NotAnObject,
    #[error("Payload has no resolvable device id")]
    MissingDeviceId,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown device {0}")]
    UnknownDevice(DeviceId),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Snapshot payload invalid: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}
