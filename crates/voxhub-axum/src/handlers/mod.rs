//! HTTP handlers.

pub mod device_ws;
pub mod health;
