//! Client registry (C5): per-client room/device inventory, TTL cleanup, and
//! an optional persistence backend.

mod fs_store;

pub use fs_store::JsonFileRegistryPersistence;

use crate::config::ClientRegistryConfig;
use crate::error::{Result, RuntimeError};
use crate::providers::RegistryPersistence;
use crate::types::Metadata;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Remote endpoint kind, used for capability negotiation and iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    Esp32,
    Web,
    Mobile,
    Desktop,
    Unknown,
}

/// A controllable device belonging to a client.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Device {
    /// Unique within its owning client.
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub capabilities: HashMap<String, bool>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A registered remote endpoint: its room, language, and device inventory.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub room_name: String,
    pub language: String,
    pub client_type: ClientType,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub capabilities: HashMap<String, bool>,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub source_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ClientRegistration {
    /// `true` once `now - last_seen` exceeds `timeout_s`.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout_s: i64) -> bool {
        (now - self.last_seen).num_seconds() > timeout_s
    }
}

/// A device match found by [`ClientRegistry::find_device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMatchKind {
    Exact,
    Substring,
}

/// Result of a successful fuzzy device lookup.
#[derive(Debug, Clone)]
pub struct DeviceMatch {
    pub client_id: String,
    pub device: Device,
    pub kind: DeviceMatchKind,
}

/// Per-client room/device inventory with TTL cleanup and optional
/// persistence. Shared across sessions; writes are serialized through an
/// async read-write lock guarding the registration map.
pub struct ClientRegistry {
    config: ClientRegistryConfig,
    registrations: RwLock<HashMap<String, ClientRegistration>>,
    persistence: Option<Arc<dyn RegistryPersistence>>,
    persistence_degraded: std::sync::atomic::AtomicBool,
}

impl ClientRegistry {
    pub fn new(config: ClientRegistryConfig, persistence: Option<Arc<dyn RegistryPersistence>>) -> Self {
        Self {
            config,
            registrations: RwLock::new(HashMap::new()),
            persistence,
            persistence_degraded: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Load the initial registration set from the persistence backend, if
    /// configured. A no-op when `client_registry.persistent_storage=false`.
    pub async fn load_persisted(&self) -> Result<()> {
        if !self.config.persistent_storage {
            return Ok(());
        }
        let Some(store) = &self.persistence else {
            return Ok(());
        };
        match store.load().await {
            Ok(loaded) => {
                *self.registrations.write().await = loaded;
                Ok(())
            }
            Err(err) => {
                warn!("failed to load persisted client registrations: {err}");
                self.persistence_degraded
                    .store(true, std::sync::atomic::Ordering::Relaxed);
                Ok(())
            }
        }
    }

    /// Register or refresh a client. Idempotent: calling twice with the
    /// same id updates `last_seen` (and any changed fields) rather than
    /// creating a duplicate.
    pub async fn register(&self, mut registration: ClientRegistration) -> Result<()> {
        let now = Utc::now();
        registration.last_seen = now;
        let mut map = self.registrations.write().await;
        if let Some(existing) = map.get(&registration.client_id) {
            registration.registered_at = existing.registered_at;
        } else {
            registration.registered_at = now;
        }
        map.insert(registration.client_id.clone(), registration);
        drop(map);
        self.persist_best_effort().await;
        Ok(())
    }

    /// Refresh `last_seen` for an already-registered client without
    /// replacing its devices/capabilities.
    pub async fn touch(&self, client_id: &str) -> Result<()> {
        let mut map = self.registrations.write().await;
        match map.get_mut(client_id) {
            Some(reg) => {
                reg.last_seen = Utc::now();
                Ok(())
            }
            None => Err(RuntimeError::Registry(format!("unknown client: {client_id}"))),
        }
    }

    pub async fn unregister(&self, client_id: &str) -> Result<()> {
        self.registrations.write().await.remove(client_id);
        self.persist_best_effort().await;
        Ok(())
    }

    pub async fn get(&self, client_id: &str) -> Option<ClientRegistration> {
        self.registrations.read().await.get(client_id).cloned()
    }

    /// Case-insensitive lookup by room name.
    pub async fn find_by_room(&self, room_name: &str) -> Option<ClientRegistration> {
        let needle = room_name.to_lowercase();
        self.registrations
            .read()
            .await
            .values()
            .find(|reg| reg.room_name.to_lowercase() == needle)
            .cloned()
    }

    pub async fn by_client_type(&self, client_type: ClientType) -> Vec<ClientRegistration> {
        self.registrations
            .read()
            .await
            .values()
            .filter(|reg| reg.client_type == client_type)
            .cloned()
            .collect()
    }

    /// Every distinct room name across all registered clients, used by the
    /// entity resolver's fuzzy location matching.
    pub async fn all_room_names(&self) -> Vec<String> {
        let map = self.registrations.read().await;
        let mut rooms: Vec<String> = map.values().map(|reg| reg.room_name.clone()).collect();
        rooms.sort_unstable();
        rooms.dedup();
        rooms
    }

    pub async fn by_device_type(&self, device_type: &str) -> Vec<ClientRegistration> {
        self.registrations
            .read()
            .await
            .values()
            .filter(|reg| reg.devices.iter().any(|d| d.device_type == device_type))
            .cloned()
            .collect()
    }

    /// Fuzzy device lookup within one client's inventory: exact
    /// (case-insensitive) name match first, then substring.
    pub async fn find_device(&self, client_id: &str, query: &str) -> Option<DeviceMatch> {
        let map = self.registrations.read().await;
        let reg = map.get(client_id)?;
        let needle = query.to_lowercase();

        if let Some(device) = reg.devices.iter().find(|d| d.name.to_lowercase() == needle) {
            return Some(DeviceMatch {
                client_id: client_id.to_owned(),
                device: device.clone(),
                kind: DeviceMatchKind::Exact,
            });
        }
        reg.devices
            .iter()
            .find(|d| d.name.to_lowercase().contains(&needle))
            .map(|device| DeviceMatch {
                client_id: client_id.to_owned(),
                device: device.clone(),
                kind: DeviceMatchKind::Substring,
            })
    }

    /// Remove registrations idle for longer than `registration_timeout_s`.
    /// Returns the ids removed.
    pub async fn cleanup_expired(&self) -> Vec<String> {
        let now = Utc::now();
        let timeout_s = self.config.registration_timeout_s as i64;
        let mut map = self.registrations.write().await;
        let expired: Vec<String> = map
            .iter()
            .filter(|(_, reg)| reg.is_expired(now, timeout_s))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            map.remove(id);
        }
        drop(map);
        if !expired.is_empty() {
            self.persist_best_effort().await;
        }
        expired
    }

    /// `true` if a previous persistence write or load failed; the registry
    /// continues to serve in-memory state regardless.
    pub fn persistence_degraded(&self) -> bool {
        self.persistence_degraded.load(std::sync::atomic::Ordering::Relaxed)
    }

    async fn persist_best_effort(&self) {
        if !self.config.persistent_storage {
            return;
        }
        let Some(store) = &self.persistence else {
            return;
        };
        let snapshot = self.registrations.read().await.clone();
        match store.save(&snapshot).await {
            Ok(()) => self
                .persistence_degraded
                .store(false, std::sync::atomic::Ordering::Relaxed),
            Err(err) => {
                warn!("client registry persistence write failed, retrying on next mutation: {err}");
                self.persistence_degraded
                    .store(true, std::sync::atomic::Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(id: &str, room: &str) -> ClientRegistration {
        let now = Utc::now();
        ClientRegistration {
            client_id: id.to_owned(),
            room_name: room.to_owned(),
            language: "ru".into(),
            client_type: ClientType::Esp32,
            devices: vec![Device {
                id: "d1".into(),
                name: "Кухонный свет".into(),
                device_type: "light".into(),
                capabilities: HashMap::new(),
                location: None,
                metadata: Metadata::new(),
            }],
            capabilities: HashMap::new(),
            registered_at: now,
            last_seen: now,
            source_address: None,
            user_agent: None,
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn register_is_idempotent_except_last_seen() {
        let registry = ClientRegistry::new(ClientRegistryConfig::default(), None);
        registry.register(registration("kitchen", "Кухня")).await.unwrap();
        let first = registry.get("kitchen").await.unwrap();
        registry.register(registration("kitchen", "Кухня")).await.unwrap();
        let second = registry.get("kitchen").await.unwrap();
        assert_eq!(first.registered_at, second.registered_at);
        assert!(second.last_seen >= first.last_seen);
    }

    #[tokio::test]
    async fn find_by_room_is_case_insensitive() {
        let registry = ClientRegistry::new(ClientRegistryConfig::default(), None);
        registry.register(registration("kitchen", "Кухня")).await.unwrap();
        assert!(registry.find_by_room("кухня").await.is_some());
        assert!(registry.find_by_room("КУХНЯ").await.is_some());
    }

    #[tokio::test]
    async fn find_device_prefers_exact_over_substring() {
        let registry = ClientRegistry::new(ClientRegistryConfig::default(), None);
        registry.register(registration("kitchen", "Кухня")).await.unwrap();
        let exact = registry.find_device("kitchen", "кухонный свет").await.unwrap();
        assert_eq!(exact.kind, DeviceMatchKind::Exact);
        let substring = registry.find_device("kitchen", "свет").await.unwrap();
        assert_eq!(substring.kind, DeviceMatchKind::Substring);
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired() {
        let registry = ClientRegistry::new(ClientRegistryConfig::default(), None);
        // register() always refreshes last_seen to now, so the stale entry
        // is seeded directly into the map rather than through register().
        let mut stale = registration("old", "Спальня");
        stale.last_seen = Utc::now() - chrono::Duration::seconds(10_000);
        registry.registrations.write().await.insert("old".to_string(), stale);
        registry.register(registration("fresh", "Кухня")).await.unwrap();

        let removed = registry.cleanup_expired().await;
        assert_eq!(removed, vec!["old".to_string()]);
        assert!(registry.get("fresh").await.is_some());
    }
}
