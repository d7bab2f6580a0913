//! JSON-file-backed persistence for the client registry.
//!
//! The whole registration map is stored as one pretty-printed UTF-8 JSON
//! object at `path`, written via temp-file + rename for crash safety.
//! Non-ASCII names (Cyrillic room/device names) round-trip losslessly:
//! serde_json never escapes valid UTF-8 outside of the control-character
//! range.

use super::ClientRegistration;
use crate::error::{Result, RuntimeError};
use crate::providers::RegistryPersistence;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct JsonFileRegistryPersistence {
    path: PathBuf,
}

impl JsonFileRegistryPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RegistryPersistence for JsonFileRegistryPersistence {
    async fn save(&self, registrations: &HashMap<String, ClientRegistration>) -> Result<()> {
        let path = self.path.clone();
        let json = serde_json::to_string_pretty(registrations)?;
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let tmp_path = path.with_extension("json.tmp");
            std::fs::write(&tmp_path, json.as_bytes())?;
            if let Ok(file) = std::fs::File::open(&tmp_path) {
                let _ = file.sync_all();
            }
            std::fs::rename(&tmp_path, &path)?;
            Ok(())
        })
        .await
        .map_err(|e| RuntimeError::Registry(format!("persistence task panicked: {e}")))??;
        Ok(())
    }

    async fn load(&self) -> Result<HashMap<String, ClientRegistration>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<HashMap<String, ClientRegistration>> {
            if !path.exists() {
                return Ok(HashMap::new());
            }
            let content = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&content)?)
        })
        .await
        .map_err(|e| RuntimeError::Registry(format!("persistence task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ClientType, Device};
    use crate::types::Metadata;
    use chrono::Utc;

    fn sample() -> HashMap<String, ClientRegistration> {
        let now = Utc::now();
        let mut map = HashMap::new();
        map.insert(
            "kitchen".to_string(),
            ClientRegistration {
                client_id: "kitchen".into(),
                room_name: "Кухня".into(),
                language: "ru".into(),
                client_type: ClientType::Esp32,
                devices: vec![Device {
                    id: "d1".into(),
                    name: "Умная колонка".into(),
                    device_type: "speaker".into(),
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
            },
        );
        map
    }

    #[tokio::test]
    async fn round_trip_preserves_cyrillic() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRegistryPersistence::new(dir.path().join("registry.json"));
        let original = sample();
        store.save(&original).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("Кухня"));
        assert!(!raw.contains("\\u"));

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded["kitchen"].room_name, original["kitchen"].room_name);
        assert_eq!(
            loaded["kitchen"].devices[0].name,
            original["kitchen"].devices[0].name
        );
    }

    #[tokio::test]
    async fn load_missing_file_returns_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRegistryPersistence::new(dir.path().join("nope.json"));
        let loaded = store.load().await.unwrap();
        assert!(loaded.is_empty());
    }
}
