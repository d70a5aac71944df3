// lib.rs
//! Real-time signal-state synchronization for the traffic-signal
//! operator dashboard.

pub mod channel;
pub mod config;
pub mod countdown;
pub mod decoder;
pub mod devices;
pub mod engine;
pub mod error;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod supervisor;
pub mod utils;

pub use engine::SignalSync;
pub use error::AppError;
pub use models::{ConnectionState, Device, DeviceId, Phase, PhaseAction};
