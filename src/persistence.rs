use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::messages::{Message, MessageLog};
use crate::room::{Chatroom, ChatroomRegistry};

/// The durable subset of store state. Session fields are never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub chatrooms: Vec<Chatroom>,
    #[serde(default)]
    pub messages: HashMap<String, Vec<Message>>,
    #[serde(default)]
    pub dark_mode: bool,
}

impl Default for Snapshot {
    /// Two seed chatrooms with empty histories.
    fn default() -> Self {
        let now = Utc::now();
        let chatrooms = vec![
            Chatroom {
                id: "1".to_string(),
                title: "General Chat".to_string(),
                created_at: now,
            },
            Chatroom {
                id: "2".to_string(),
                title: "Tech Support".to_string(),
                created_at: now - Duration::hours(1),
            },
        ];
        let messages = chatrooms
            .iter()
            .map(|chatroom| (chatroom.id.clone(), Vec::new()))
            .collect();

        Snapshot {
            chatrooms,
            messages,
            dark_mode: false,
        }
    }
}

impl Snapshot {
    pub fn capture(registry: &ChatroomRegistry, log: &MessageLog, dark_mode: bool) -> Self {
        Snapshot {
            chatrooms: registry.list().to_vec(),
            messages: log.entries().clone(),
            dark_mode,
        }
    }

    /// Rebuilds registry and log, restoring the one-entry-per-chatroom invariant.
    pub fn restore(self) -> (ChatroomRegistry, MessageLog, bool) {
        let registry = ChatroomRegistry::from_chatrooms(self.chatrooms);
        let mut log = MessageLog::from_entries(self.messages);
        log.retain_chatrooms(registry.ids());
        for id in registry.ids() {
            log.ensure_entry(id);
        }
        (registry, log, self.dark_mode)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Durable key-value storage for serialized snapshots.
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }
}

#[async_trait]
impl SnapshotStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().await.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key, replaced atomically on every write.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(FileStorage { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::Validation(format!("invalid storage key '{key}'")));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[async_trait]
impl SnapshotStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(value.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}
