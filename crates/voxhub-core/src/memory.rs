//! In-memory record store.
//!
//! Backs the server when no external record platform is wired in, and gives
//! tests a real implementation of every store port.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{AgentConfig, DeviceRecord, DeviceStatus, HistoryEntry, HistoryRole};
use crate::ports::{
    AgentRepository, DeviceRepository, HistoryRepository, SessionRepository, StoreError,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Keyed by normalized MAC address.
    devices: RwLock<HashMap<String, DeviceRecord>>,
    sessions: RwLock<HashMap<String, String>>,
    history: RwLock<Vec<HistoryEntry>>,
    agents: RwLock<HashMap<String, AgentConfig>>,
    default_agent: AgentConfig,
    allow_unknown_devices: bool,
}

fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_lowercase()
}

impl MemoryStore {
    #[must_use]
    pub fn new(default_agent: AgentConfig) -> Self {
        Self {
            default_agent,
            ..Self::default()
        }
    }

    /// Bind unknown devices on first contact instead of rejecting them.
    #[must_use]
    pub const fn allow_unknown_devices(mut self, allow: bool) -> Self {
        self.allow_unknown_devices = allow;
        self
    }

    /// Register a bound device and return its id.
    pub async fn bind_device(&self, mac_address: &str) -> String {
        let mac = normalize_mac(mac_address);
        let mut devices = self.devices.write().await;
        let record = devices
            .entry(mac.clone())
            .or_insert_with(|| DeviceRecord::bound(Uuid::new_v4().to_string(), mac));
        record.status = DeviceStatus::Bound;
        record.id.clone()
    }

    pub async fn unbind_device(&self, mac_address: &str) {
        if let Some(record) = self
            .devices
            .write()
            .await
            .get_mut(&normalize_mac(mac_address))
        {
            record.status = DeviceStatus::Unbound;
        }
    }

    pub async fn set_agent(&self, agent_id: impl Into<String>, config: AgentConfig) {
        self.agents.write().await.insert(agent_id.into(), config);
    }

    pub async fn device(&self, mac_address: &str) -> Option<DeviceRecord> {
        self.devices
            .read()
            .await
            .get(&normalize_mac(mac_address))
            .cloned()
    }

    pub async fn history(&self, session_id: &str) -> Vec<HistoryEntry> {
        self.history
            .read()
            .await
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .cloned()
            .collect()
    }

    pub async fn session_device(&self, session_id: &str) -> Option<String> {
        self.sessions.read().await.get(session_id).cloned()
    }
}

#[async_trait]
impl DeviceRepository for MemoryStore {
    async fn validate_device(&self, mac_address: &str) -> Result<DeviceRecord, StoreError> {
        let mac = normalize_mac(mac_address);
        if mac.is_empty() {
            return Err(StoreError::NotFound(mac_address.to_string()));
        }

        if let Some(record) = self.devices.read().await.get(&mac) {
            return if record.is_bound() {
                Ok(record.clone())
            } else {
                Err(StoreError::NotBound(mac))
            };
        }

        if !self.allow_unknown_devices {
            return Err(StoreError::NotFound(mac));
        }

        self.bind_device(&mac).await;
        tracing::info!(mac = %mac, "Auto-bound unknown device");
        self.devices
            .read()
            .await
            .get(&mac)
            .cloned()
            .ok_or(StoreError::NotFound(mac))
    }

    async fn set_presence(&self, device_id: &str, online: bool) -> Result<(), StoreError> {
        let mut devices = self.devices.write().await;
        let record = devices
            .values_mut()
            .find(|record| record.id == device_id)
            .ok_or_else(|| StoreError::NotFound(device_id.to_string()))?;
        record.online = online;
        record.last_seen = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn create_session(&self, device_id: &str) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.sessions
            .write()
            .await
            .insert(id.clone(), device_id.to_string());
        Ok(id)
    }
}

#[async_trait]
impl HistoryRepository for MemoryStore {
    async fn save_message(
        &self,
        session_id: &str,
        role: HistoryRole,
        content: &str,
    ) -> Result<(), StoreError> {
        self.history.write().await.push(HistoryEntry {
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl AgentRepository for MemoryStore {
    async fn agent_config(&self, agent_id: Option<&str>) -> Result<AgentConfig, StoreError> {
        let Some(agent_id) = agent_id else {
            return Ok(self.default_agent.clone());
        };
        Ok(self
            .agents
            .read()
            .await
            .get(agent_id)
            .cloned()
            .unwrap_or_else(|| self.default_agent.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bound_device_validates() {
        let store = MemoryStore::default();
        let id = store.bind_device("AA:BB:CC:DD:EE:FF").await;
        let record = store.validate_device("aa:bb:cc:dd:ee:ff").await.unwrap();
        assert_eq!(record.id, id);
        assert!(record.is_bound());
    }

    #[tokio::test]
    async fn unknown_device_is_rejected_by_default() {
        let store = MemoryStore::default();
        let err = store.validate_device("11:22:33:44:55:66").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_device_auto_binds_when_allowed() {
        let store = MemoryStore::default().allow_unknown_devices(true);
        let record = store.validate_device("11:22:33:44:55:66").await.unwrap();
        assert!(record.is_bound());
        assert!(store.device("11:22:33:44:55:66").await.is_some());
    }

    #[tokio::test]
    async fn unbound_device_is_rejected() {
        let store = MemoryStore::default();
        store.bind_device("aa").await;
        store.unbind_device("aa").await;
        let err = store.validate_device("aa").await.unwrap_err();
        assert!(matches!(err, StoreError::NotBound(_)));
    }

    #[tokio::test]
    async fn history_is_scoped_to_session() {
        let store = MemoryStore::default();
        let device = store.bind_device("aa").await;
        let first = store.create_session(&device).await.unwrap();
        let second = store.create_session(&device).await.unwrap();
        store
            .save_message(&first, HistoryRole::User, "hello")
            .await
            .unwrap();
        store
            .save_message(&second, HistoryRole::Assistant, "hi")
            .await
            .unwrap();

        let entries = store.history(&first).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "hello");
        assert_eq!(store.session_device(&second).await, Some(device));
    }

    #[tokio::test]
    async fn presence_is_recorded() {
        let store = MemoryStore::default();
        let id = store.bind_device("aa").await;
        store.set_presence(&id, true).await.unwrap();
        assert!(store.device("aa").await.unwrap().online);
        assert!(store.set_presence("missing", false).await.is_err());
    }
}
