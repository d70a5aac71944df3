// decoder/mod.rs
//! Turns raw unit-action payloads into [`PhaseAction`]s.
//!
//! The server has used several field names for the same value over the
//! years. Each logical field has an ordered alias list; the first alias
//! present with a non-null value wins.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::DecodeError;
use crate::metrics;
use crate::models::{DeviceId, Phase, PhaseAction};

pub const DEVICE_ID_ALIASES: &[&str] = &["id", "ID", "signId", "SignId", "signedId", "SignedId"];
pub const LAMP1_ALIASES: &[&str] = &["L1", "status1", "status"];
pub const LAMP2_ALIASES: &[&str] = &["L2", "status2"];
pub const REMAINING1_ALIASES: &[&str] = &["T1", "remaining1"];
pub const REMAINING2_ALIASES: &[&str] = &["T2", "remaining2"];
pub const REMAINING_ALIASES: &[&str] = &["T", "timer", "countdown"];

/// Decodes one payload, dropping (and counting) anything malformed.
pub fn decode(raw: &str) -> Option<PhaseAction> {
    match try_decode(raw) {
        Ok(action) => Some(action),
        Err(err) => {
            debug!(error = %err, "Dropping malformed unit action");
            metrics::record_malformed_payload();
            None
        }
    }
}

pub fn try_decode(raw: &str) -> Result<PhaseAction, DecodeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::Unparseable(e.to_string()))?;
    let fields = value.as_object().ok_or(DecodeError::NotAnObject)?;

    let device_id = first_alias(fields, DEVICE_ID_ALIASES)
        .and_then(device_id)
        .ok_or(DecodeError::MissingDeviceId)?;

    Ok(PhaseAction {
        device_id,
        lamp1_phase: phase(first_alias(fields, LAMP1_ALIASES)),
        lamp2_phase: phase(first_alias(fields, LAMP2_ALIASES)),
        remaining1: first_alias(fields, REMAINING1_ALIASES).and_then(seconds),
        remaining2: first_alias(fields, REMAINING2_ALIASES).and_then(seconds),
        remaining: first_alias(fields, REMAINING_ALIASES).and_then(seconds),
    })
}

fn first_alias<'a>(fields: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|alias| fields.get(*alias).filter(|value| !value.is_null()))
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn device_id(value: &Value) -> Option<DeviceId> {
    if let Some(id) = value.as_i64() {
        return Some(id);
    }
    let n = number(value)?;
    if n.fract() != 0.0 || n < i64::MIN as f64 || n > i64::MAX as f64 {
        return None;
    }
    Some(n as DeviceId)
}

// Unknown or missing codes fall back to red.
fn phase(value: Option<&Value>) -> Phase {
    value
        .and_then(Value::as_str)
        .and_then(Phase::from_code)
        .unwrap_or_default()
}

// Fractional seconds round up so the display never shows 0 early.
fn seconds(value: &Value) -> Option<u32> {
    let n = number(value)?;
    if n < 0.0 {
        return None;
    }
    Some(n.ceil().min(u32::MAX as f64) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_canonical_payload() {
        let action = decode(r#"{"id":7,"L1":"G","L2":"R","T1":12,"T2":0}"#).unwrap();
        assert_eq!(
            action,
            PhaseAction {
                device_id: 7,
                lamp1_phase: Phase::Green,
                lamp2_phase: Phase::Red,
                remaining1: Some(12),
                remaining2: Some(0),
                remaining: None,
            }
        );
    }

    #[test]
    fn resolves_aliases_in_order() {
        let action =
            decode(r#"{"SignId":"15","status1":"Y","status2":"G","remaining1":"4","T":9}"#)
                .unwrap();
        assert_eq!(action.device_id, 15);
        assert_eq!(action.lamp1_phase, Phase::Yellow);
        assert_eq!(action.lamp2_phase, Phase::Green);
        assert_eq!(action.remaining1, Some(4));
        assert_eq!(action.remaining2, None);
        assert_eq!(action.remaining, Some(9));

        // `id` outranks `signId`; a null alias is skipped.
        let action = decode(r#"{"signId":2,"id":1,"L1":null,"status":"G"}"#).unwrap();
        assert_eq!(action.device_id, 1);
        assert_eq!(action.lamp1_phase, Phase::Green);
    }

    #[test]
    fn invalid_phases_fall_back_to_red() {
        let action = decode(r#"{"id":3,"L1":"purple","L2":5}"#).unwrap();
        assert_eq!(action.lamp1_phase, Phase::Red);
        assert_eq!(action.lamp2_phase, Phase::Red);
    }

    #[test]
    fn negative_or_junk_remaining_is_absent() {
        let action = decode(r#"{"id":3,"T1":-1,"T2":"soon"}"#).unwrap();
        assert_eq!(action.remaining1, None);
        assert_eq!(action.remaining2, None);

        let action = decode(r#"{"id":3,"T1":2.2,"T2":null}"#).unwrap();
        assert_eq!(action.remaining1, Some(3));
        assert_eq!(action.remaining2, None);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            try_decode("{not json"),
            Err(DecodeError::Unparseable(_))
        ));
        assert_eq!(try_decode("[1,2]"), Err(DecodeError::NotAnObject));
        assert_eq!(
            try_decode(r#"{"L1":"G"}"#),
            Err(DecodeError::MissingDeviceId)
        );
        assert_eq!(
            try_decode(r#"{"id":"seven"}"#),
            Err(DecodeError::MissingDeviceId)
        );
        assert_eq!(try_decode(r#"{"id":1.5}"#), Err(DecodeError::MissingDeviceId));
        assert_eq!(try_decode(r#"{"id":""}"#), Err(DecodeError::MissingDeviceId));
        assert_eq!(decode(""), None);
    }
}
