use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chatroom {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Chatroom {
    pub fn new(title: String) -> Self {
        Chatroom {
            id: Uuid::new_v4().to_string(),
            title,
            created_at: Utc::now(),
        }
    }
}

/// Chatrooms in the order they were created.
#[derive(Debug, Clone, Default)]
pub struct ChatroomRegistry {
    chatrooms: Vec<Chatroom>,
}

impl ChatroomRegistry {
    pub fn from_chatrooms(chatrooms: Vec<Chatroom>) -> Self {
        let mut registry = ChatroomRegistry::default();
        for chatroom in chatrooms {
            if registry.contains(&chatroom.id) {
                log::warn!("Skipping duplicate chatroom id {}", chatroom.id);
                continue;
            }
            registry.chatrooms.push(chatroom);
        }
        registry
    }

    /// Validates the title and appends a chatroom with a fresh id.
    pub fn create(&mut self, title: &str) -> Result<Chatroom> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::Validation("chatroom title must not be empty".to_string()));
        }

        let mut chatroom = Chatroom::new(title.to_string());
        while self.contains(&chatroom.id) {
            chatroom.id = Uuid::new_v4().to_string();
        }

        self.chatrooms.push(chatroom.clone());
        Ok(chatroom)
    }

    pub fn remove(&mut self, id: &str) -> Result<Chatroom> {
        let index = self
            .chatrooms
            .iter()
            .position(|chatroom| chatroom.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(self.chatrooms.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&Chatroom> {
        self.chatrooms.iter().find(|chatroom| chatroom.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn list(&self) -> &[Chatroom] {
        &self.chatrooms
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.chatrooms.iter().map(|chatroom| chatroom.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.chatrooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chatrooms.is_empty()
    }
}
