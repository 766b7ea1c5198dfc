use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::room::Chatroom;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: u64,
    /// Plain text, or a data URI when `is_image` is set.
    pub content: String,
    pub is_user: bool,
    #[serde(default)]
    pub is_image: bool,
    pub timestamp: DateTime<Utc>,
}

/// Message content produced by a collaborator, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub content: String,
    pub is_user: bool,
    pub is_image: bool,
    pub timestamp: DateTime<Utc>,
}

impl MessageDraft {
    pub fn user_text(content: impl Into<String>) -> Self {
        MessageDraft {
            content: content.into(),
            is_user: true,
            is_image: false,
            timestamp: Utc::now(),
        }
    }

    pub fn responder_text(content: impl Into<String>) -> Self {
        MessageDraft {
            is_user: false,
            ..MessageDraft::user_text(content)
        }
    }

    pub fn user_image(reference: String) -> Self {
        MessageDraft {
            is_image: true,
            ..MessageDraft::user_text(reference)
        }
    }

    pub fn into_message(self, id: u64) -> Message {
        Message {
            id,
            content: self.content,
            is_user: self.is_user,
            is_image: self.is_image,
            timestamp: self.timestamp,
        }
    }
}

/// Per-chatroom message sequences.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: HashMap<String, Vec<Message>>,
}

impl MessageLog {
    pub fn from_entries(entries: HashMap<String, Vec<Message>>) -> Self {
        MessageLog { entries }
    }

    /// Creates an empty entry unless one already exists.
    pub fn ensure_entry(&mut self, chatroom_id: &str) {
        self.entries.entry(chatroom_id.to_string()).or_default();
    }

    pub fn remove_entry(&mut self, chatroom_id: &str) -> Option<Vec<Message>> {
        self.entries.remove(chatroom_id)
    }

    pub fn has_entry(&self, chatroom_id: &str) -> bool {
        self.entries.contains_key(chatroom_id)
    }

    pub fn append(&mut self, chatroom_id: &str, message: Message) -> Result<()> {
        let entry = self
            .entries
            .get_mut(chatroom_id)
            .ok_or_else(|| StoreError::NotFound(chatroom_id.to_string()))?;
        entry.push(message);
        Ok(())
    }

    /// Inserts `batch` ahead of the earliest message, keeping both orders intact.
    pub fn prepend(&mut self, chatroom_id: &str, batch: Vec<Message>) -> Result<()> {
        let entry = self
            .entries
            .get_mut(chatroom_id)
            .ok_or_else(|| StoreError::NotFound(chatroom_id.to_string()))?;
        entry.splice(0..0, batch);
        Ok(())
    }

    /// Empty for chatrooms with no entry, never an error.
    pub fn get(&self, chatroom_id: &str) -> &[Message] {
        self.entries.get(chatroom_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty_for(&self, chatroom_id: &str) -> bool {
        self.get(chatroom_id).is_empty()
    }

    /// Drops entries whose id is not in `keep`.
    pub fn retain_chatrooms<'a>(&mut self, keep: impl IntoIterator<Item = &'a str>) {
        let keep: Vec<&str> = keep.into_iter().collect();
        self.entries.retain(|id, _| keep.contains(&id.as_str()));
    }

    pub fn max_message_id(&self) -> Option<u64> {
        self.entries.values().flatten().map(|message| message.id).max()
    }

    pub fn entries(&self) -> &HashMap<String, Vec<Message>> {
        &self.entries
    }
}

/// Change notifications pushed to subscribers after each committed mutation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum StoreEvent {
    #[serde(rename = "chatroom_created")]
    ChatroomCreated { chatroom: Chatroom },
    #[serde(rename = "chatroom_deleted")]
    ChatroomDeleted { chatroom_id: String },
    #[serde(rename = "active_chatroom_changed")]
    ActiveChatroomChanged { chatroom_id: Option<String> },
    #[serde(rename = "message_appended")]
    MessageAppended { chatroom_id: String, message: Message },
    #[serde(rename = "history_prepended")]
    HistoryPrepended {
        chatroom_id: String,
        count: usize,
        has_more: bool,
    },
    #[serde(rename = "history_loading")]
    HistoryLoading { chatroom_id: String, loading: bool },
    #[serde(rename = "responder_typing")]
    ResponderTyping { chatroom_id: String, typing: bool },
    #[serde(rename = "dark_mode_changed")]
    DarkModeChanged { dark_mode: bool },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(id: u64, content: &str) -> Message {
        MessageDraft::user_text(content).into_message(id)
    }

    #[test]
    fn append_requires_an_entry() {
        let mut log = MessageLog::default();
        assert!(matches!(
            log.append("ghost", message(1, "hi")),
            Err(StoreError::NotFound(_))
        ));

        log.ensure_entry("room");
        log.append("room", message(1, "hi")).unwrap();
        assert_eq!(log.get("room").len(), 1);
    }

    #[test]
    fn get_on_unknown_chatroom_is_empty() {
        let log = MessageLog::default();
        assert!(log.get("nowhere").is_empty());
    }

    #[test]
    fn prepend_places_batch_before_existing_messages() {
        let mut log = MessageLog::default();
        log.ensure_entry("room");
        log.append("room", message(10, "newer-1")).unwrap();
        log.append("room", message(11, "newer-2")).unwrap();

        log.prepend("room", vec![message(1, "old-1"), message(2, "old-2")])
            .unwrap();

        let contents: Vec<&str> = log.get("room").iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["old-1", "old-2", "newer-1", "newer-2"]);
    }

    #[test]
    fn ensure_entry_does_not_clear_existing_messages() {
        let mut log = MessageLog::default();
        log.ensure_entry("room");
        log.append("room", message(1, "kept")).unwrap();
        log.ensure_entry("room");
        assert_eq!(log.get("room").len(), 1);
    }

    #[test]
    fn retain_drops_orphaned_entries() {
        let mut log = MessageLog::default();
        log.ensure_entry("a");
        log.ensure_entry("b");
        log.retain_chatrooms(["a"]);
        assert!(log.has_entry("a"));
        assert!(!log.has_entry("b"));
    }

    #[test]
    fn text_messages_without_image_flag_deserialize() {
        let raw = r#"{"id":7,"content":"hello","isUser":true,"timestamp":"2024-01-01T00:00:00Z"}"#;
        let message: Message = serde_json::from_str(raw).unwrap();
        assert!(!message.is_image);
        assert_eq!(message.id, 7);
    }

    #[test]
    fn drafts_carry_sender_and_kind() {
        let reply = MessageDraft::responder_text("hi");
        assert!(!reply.is_user && !reply.is_image);

        let image = MessageDraft::user_image("data:image/png;base64,AA==".to_string());
        assert!(image.is_user && image.is_image);
        assert!(image.timestamp <= Utc::now() + Duration::seconds(1));
    }

    #[test]
    fn events_are_tagged_by_type() {
        let event = StoreEvent::DarkModeChanged { dark_mode: true };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "dark_mode_changed");
        assert_eq!(json["dark_mode"], true);
    }
}
