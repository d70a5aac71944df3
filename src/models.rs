// models.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::utils;

pub type DeviceId = i64;

/// Display state of one lamp. Anything unrecognised is treated as red.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    #[default]
    Red,
    Green,
    Yellow,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Red, Phase::Green, Phase::Yellow];

    /// Accepts the short wire codes (`R`, `G`, `Y`) and the full names,
    /// ignoring case and surrounding whitespace.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "R" | "RED" => Some(Phase::Red),
            "G" | "GREEN" => Some(Phase::Green),
            "Y" | "YELLOW" => Some(Phase::Yellow),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Phase::Red => "R",
            Phase::Green => "G",
            Phase::Yellow => "Y",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Red => "RED",
            Phase::Green => "GREEN",
            Phase::Yellow => "YELLOW",
        };
        f.write_str(name)
    }
}

/// One physical signal controller as the dashboard knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub ip_address: String,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub lamp1_phase: Phase,
    pub lamp2_phase: Phase,
    pub remaining1: Option<u32>,
    pub remaining2: Option<u32>,
    /// Larger of the two lamp timers, or the single timer older servers send.
    pub remaining: Option<u32>,
    pub active: bool,
    pub light_pattern_id: Option<i64>,
}

impl Device {
    pub fn new(id: DeviceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ip_address: String::new(),
            latitude: None,
            longitude: None,
            lamp1_phase: Phase::Red,
            lamp2_phase: Phase::Red,
            remaining1: None,
            remaining2: None,
            remaining: None,
            active: true,
            light_pattern_id: None,
        }
    }

    /// Row status shown in the device table; mirrors lamp 1.
    pub fn status(&self) -> Phase {
        self.lamp1_phase
    }

    pub fn is_geocoded(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Row shape of `GET /api/get/control-box`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ControlBoxRow {
    #[serde(rename = "ID")]
    pub id: DeviceId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
    #[serde(default)]
    pub light_pattern_id: Option<i64>,
}

impl From<ControlBoxRow> for Device {
    fn from(row: ControlBoxRow) -> Self {
        let mut device = Device::new(row.id, row.name.unwrap_or_default());
        device.ip_address = row.ip_address.unwrap_or_default();
        device.latitude = utils::trim_to_option(row.latitude);
        device.longitude = utils::trim_to_option(row.longitude);
        device.light_pattern_id = row.light_pattern_id;
        device
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// A decoded phase/timer update for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseAction {
    pub device_id: DeviceId,
    pub lamp1_phase: Phase,
    pub lamp2_phase: Phase,
    pub remaining1: Option<u32>,
    pub remaining2: Option<u32>,
    /// Single-timer field (`T`) from servers that do not split per lamp.
    pub remaining: Option<u32>,
}

/// Inbound hub event names.
pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
pub const RECEIVE_UNIT_ACTION: &str = "ReceiveUnitAction";
/// Outbound diagnostics method.
pub const SEND_MESSAGE: &str = "SendMessage";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitAction {
    pub room_id: String,
    pub action_id: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    Message { name: String, text: String },
    UnitAction(UnitAction),
}

/// A named method call sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub method: String,
    pub args: Vec<Value>,
}

/// JSON text frame exchanged with the hub over a websocket.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubFrame {
    Invocation {
        target: String,
        #[serde(default)]
        arguments: Vec<Value>,
    },
    Ping,
}

impl HubFrame {
    /// Maps an inbound frame onto a hub event. Unknown targets and
    /// short argument lists yield `None`.
    pub fn into_event(self) -> Option<HubEvent> {
        let HubFrame::Invocation { target, arguments } = self else {
            return None;
        };
        let mut args = arguments.iter().map(arg_text);
        match target.as_str() {
            RECEIVE_MESSAGE => {
                let name = args.next()?;
                let text = args.next()?;
                Some(HubEvent::Message { name, text })
            }
            RECEIVE_UNIT_ACTION => {
                let room_id = args.next()?;
                let action_id = args.next()?;
                let payload = args.next()?;
                Some(HubEvent::UnitAction(UnitAction {
                    room_id,
                    action_id,
                    payload,
                }))
            }
            _ => None,
        }
    }
}

impl From<Invocation> for HubFrame {
    fn from(invocation: Invocation) -> Self {
        HubFrame::Invocation {
            target: invocation.method,
            arguments: invocation.args,
        }
    }
}

// Servers are not consistent about sending the payload as a string or
// as an inline object.
fn arg_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
