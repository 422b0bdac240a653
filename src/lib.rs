//! Availability monitoring for hosts and services
//!
//! Sensors poll services on a schedule, each observation is stored as an
//! event and drives the per-service state machine. Hosts take their status
//! from a designated availability service. State transitions are published
//! on a broadcast bus for notification sinks.

pub mod actors;
pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod clock;
pub mod config;
pub mod discord;
pub mod engine;
pub mod monitors;
pub mod sensors;
pub mod storage;
pub mod tracking;
