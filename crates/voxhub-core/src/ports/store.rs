//! Record store ports.
//!
//! The record store is an external platform. These traits cover the few
//! query and save operations the session engine needs, returning plain
//! records from [`crate::domain::records`].

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AgentConfig, DeviceRecord, HistoryRole};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Device is not bound: {0}")]
    NotBound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Look up a device by MAC address; it must exist and be bound.
    async fn validate_device(&self, mac_address: &str) -> Result<DeviceRecord, StoreError>;

    /// Record whether the device currently holds a live connection.
    async fn set_presence(&self, device_id: &str, online: bool) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a chat session record and return its id.
    async fn create_session(&self, device_id: &str) -> Result<String, StoreError>;
}

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn save_message(
        &self,
        session_id: &str,
        role: HistoryRole,
        content: &str,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Agent behaviour for a device; `None` selects the default agent.
    async fn agent_config(&self, agent_id: Option<&str>) -> Result<AgentConfig, StoreError>;
}
