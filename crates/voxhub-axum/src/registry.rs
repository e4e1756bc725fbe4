//! Live connections, one per device.
//!
//! Every registration gets a fresh generation number. A new connection for a
//! device replaces the previous one and hands it back so the caller can shut
//! it down. Releasing a connection does not mark the device offline at once:
//! a timer waits out the grace period and only then records the device as
//! offline, and only if no newer generation registered in the meantime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use voxhub_core::DeviceRepository;
use voxhub_voice::Session;

struct Entry {
    generation: u64,
    session: Option<Arc<Session>>,
}

/// Result of [`SessionRegistry::register`].
pub struct Registration {
    pub generation: u64,
    /// Session this registration replaced, still running.
    pub replaced: Option<Arc<Session>>,
}

pub struct SessionRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    next_generation: AtomicU64,
    devices: Arc<dyn DeviceRepository>,
    offline_grace: Duration,
}

impl SessionRegistry {
    pub fn new(devices: Arc<dyn DeviceRepository>, offline_grace: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            devices,
            offline_grace,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `session` as the live connection of `device_id`.
    pub fn register(&self, device_id: &str, session: Arc<Session>) -> Registration {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let previous = self.entries().insert(
            device_id.to_string(),
            Entry {
                generation,
                session: Some(session),
            },
        );
        let replaced = previous.and_then(|entry| entry.session);
        if replaced.is_some() {
            tracing::info!(device_id, generation, "Replacing previous connection");
        }
        Registration {
            generation,
            replaced,
        }
    }

    /// Release the connection registered as `generation` and start the
    /// offline timer. Returns `None` if a newer connection already took over.
    pub fn release(self: &Arc<Self>, device_id: &str, generation: u64) -> Option<JoinHandle<()>> {
        {
            let mut entries = self.entries();
            let entry = entries.get_mut(device_id)?;
            if entry.generation != generation {
                return None;
            }
            entry.session = None;
        }

        let registry = Arc::clone(self);
        let device_id = device_id.to_string();
        Some(tokio::spawn(async move {
            tokio::time::sleep(registry.offline_grace).await;
            registry.expire(&device_id, generation).await;
        }))
    }

    async fn expire(&self, device_id: &str, generation: u64) {
        let expired = {
            let mut entries = self.entries();
            let current = entries
                .get(device_id)
                .is_some_and(|e| e.generation == generation && e.session.is_none());
            if current {
                entries.remove(device_id);
            }
            current
        };
        if !expired {
            tracing::debug!(device_id, generation, "Device reconnected within grace period");
            return;
        }
        match self.devices.set_presence(device_id, false).await {
            Ok(()) => tracing::info!(device_id, "Device offline"),
            Err(e) => tracing::warn!(device_id, error = %e, "Failed to record device offline"),
        }
    }

    /// Session currently live for `device_id`.
    pub fn session(&self, device_id: &str) -> Option<Arc<Session>> {
        self.entries()
            .get(device_id)
            .and_then(|entry| entry.session.clone())
    }

    /// Number of devices with a live session.
    pub fn live_sessions(&self) -> usize {
        self.entries()
            .values()
            .filter(|entry| entry.session.is_some())
            .count()
    }
}
