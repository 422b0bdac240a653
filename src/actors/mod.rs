//! Actors driving the monitoring engine
//!
//! Each actor runs as an independent tokio task and is controlled through a
//! cloneable handle that sends commands over an mpsc channel.
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────┐
//!                    │   Hub (main)    │
//!                    └────────┬────────┘
//!                             │ spawns
//!                ┌────────────┴────────────┐
//!                │                         │
//!        ┌───────▼────────┐                │
//!        │ SchedulerActor │                │
//!        │ (poll cycles)  │                │
//!        └───────┬────────┘                │
//!                │ run_cycle / check_now   │
//!        ┌───────▼────────┐                │
//!        │     Engine     │                │
//!        └───────┬────────┘                │
//!                │ broadcast<MonitorEvent> │
//!                │                 ┌───────▼───────────┐
//!                └────────────────►│ NotificationActor │──► sinks
//!                                  └───────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: The engine publishes state transitions to a broadcast channel
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod messages;
pub mod notifier;
pub mod scheduler;

pub use notifier::{NotificationActor, NotifierHandle};
pub use scheduler::{SchedulerActor, SchedulerHandle};
