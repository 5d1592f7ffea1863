//! Background Tasks Module
//!
//! Contains background tasks that run while the gateway is serving.
//!
//! # Tasks
//! - Health Monitor: pings the store connection at a fixed interval

mod health;

pub use health::spawn_health_monitor;
