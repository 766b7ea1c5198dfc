use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::files::{DataUriCodec, ImageCodec};
use crate::messages::{Message, MessageDraft, MessageLog, StoreEvent};
use crate::persistence::{FileStorage, MemoryStorage, Snapshot, SnapshotStorage};
use crate::room::{Chatroom, ChatroomRegistry};
use crate::services::{HistoryService, MockHistoryService, MockResponder, Responder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponderState {
    Idle,
    Typing,
}

/// Transient per-session view state. Reset on every load, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub active_chatroom_id: Option<String>,
    /// `Typing` while at least one reply of this activation is pending.
    pub responder: ResponderState,
    pub is_loading_history: bool,
    /// Older pages loaded since the chatroom was activated.
    pub page_cursor: u32,
    pub has_more_history: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState {
            active_chatroom_id: None,
            responder: ResponderState::Idle,
            is_loading_history: false,
            page_cursor: 0,
            has_more_history: true,
        }
    }
}

impl SessionState {
    pub fn is_responder_typing(&self) -> bool {
        self.responder == ResponderState::Typing
    }
}

/// The collaborators a store talks to.
#[derive(Clone)]
pub struct StorePorts {
    pub responder: Arc<dyn Responder>,
    pub history: Arc<dyn HistoryService>,
    pub codec: Arc<dyn ImageCodec>,
    pub storage: Arc<dyn SnapshotStorage>,
}

impl StorePorts {
    /// Latency-simulating mocks; file storage when `storage_dir` is configured.
    pub async fn mocked(config: &StoreConfig) -> Result<Self> {
        let storage: Arc<dyn SnapshotStorage> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStorage::new(dir).await?),
            None => Arc::new(MemoryStorage::new()),
        };

        Ok(StorePorts {
            responder: Arc::new(MockResponder::from_config(config)),
            history: Arc::new(MockHistoryService::from_config(config)),
            codec: Arc::new(DataUriCodec::new(config.max_image_bytes)),
            storage,
        })
    }

    pub fn with_storage(mut self, storage: Arc<dyn SnapshotStorage>) -> Self {
        self.storage = storage;
        self
    }
}

/// Serialized state captured under the lock, written once the lock is released.
struct StagedWrite {
    revision: u64,
    json: String,
}

struct StoreState {
    registry: ChatroomRegistry,
    log: MessageLog,
    dark_mode: bool,
    session: SessionState,
    // Bumped on every activation change; async completions carry the value
    // they were scheduled under.
    epoch: u64,
    pending_replies: usize,
    // Chatrooms that already received their initial history this session.
    seeded: HashSet<String>,
    reply_tasks: HashMap<String, Vec<JoinHandle<()>>>,
    next_message_id: u64,
    revision: u64,
}

impl StoreState {
    fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let (registry, log, dark_mode) = snapshot.restore();
        let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        let after_restored = match log.max_message_id() {
            Some(id) => id
                .checked_add(1)
                .ok_or_else(|| StoreError::Validation(format!("message id {id} leaves no room for new ids")))?,
            None => 0,
        };

        Ok(StoreState {
            registry,
            log,
            dark_mode,
            session: SessionState::default(),
            epoch: 0,
            pending_replies: 0,
            seeded: HashSet::new(),
            reply_tasks: HashMap::new(),
            next_message_id: after_restored.max(now_ms),
            revision: 0,
        })
    }

    fn allocate_id(&mut self) -> Result<u64> {
        let id = self.next_message_id;
        self.next_message_id = id
            .checked_add(1)
            .ok_or_else(|| StoreError::Validation("message ids exhausted".to_string()))?;
        Ok(id)
    }

    fn activate(&mut self, chatroom_id: Option<String>) -> u64 {
        self.epoch += 1;
        self.pending_replies = 0;
        self.session = SessionState {
            active_chatroom_id: chatroom_id,
            ..SessionState::default()
        };
        self.epoch
    }

    fn is_current(&self, chatroom_id: &str, epoch: u64) -> bool {
        self.epoch == epoch
            && self.session.active_chatroom_id.as_deref() == Some(chatroom_id)
            && self.registry.contains(chatroom_id)
    }

    fn stamp(&mut self, drafts: Vec<MessageDraft>) -> Result<Vec<Message>> {
        drafts
            .into_iter()
            .map(|draft| Ok(draft.into_message(self.allocate_id()?)))
            .collect()
    }

    fn stage(&mut self) -> Option<StagedWrite> {
        self.revision += 1;
        match Snapshot::capture(&self.registry, &self.log, self.dark_mode).to_json() {
            Ok(json) => Some(StagedWrite {
                revision: self.revision,
                json,
            }),
            Err(e) => {
                error!("Failed to serialize chat state: {}", e);
                None
            }
        }
    }
}

/// Owns chatrooms, messages and session state; the only writer of all three.
#[derive(Clone)]
pub struct ChatStore {
    state: Arc<RwLock<StoreState>>,
    ports: StorePorts,
    events: broadcast::Sender<StoreEvent>,
    config: Arc<StoreConfig>,
    // Revision of the last snapshot that reached storage.
    written: Arc<Mutex<u64>>,
}

impl ChatStore {
    /// Restores the persisted snapshot, or seeds defaults when none exists
    /// or it cannot be used.
    pub async fn open(config: StoreConfig, ports: StorePorts) -> Result<Self> {
        config.validate()?;

        let snapshot = match ports.storage.get(&config.namespace_key).await? {
            Some(raw) => Snapshot::from_json(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable snapshot '{}': {}", config.namespace_key, e);
                Snapshot::default()
            }),
            None => Snapshot::default(),
        };

        let state = StoreState::from_snapshot(snapshot).or_else(|e| {
            warn!("Discarding unusable snapshot '{}': {}", config.namespace_key, e);
            StoreState::from_snapshot(Snapshot::default())
        })?;
        info!("Chat store opened with {} chatrooms", state.registry.len());

        let (events, _) = broadcast::channel(config.event_capacity);
        Ok(ChatStore {
            state: Arc::new(RwLock::new(state)),
            ports,
            events,
            config: Arc::new(config),
            written: Arc::new(Mutex::new(0)),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Change feed for UI bindings. Slow receivers lag, they never block the store.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Writes a staged snapshot unless a newer one already reached storage.
    async fn flush(&self, staged: Option<StagedWrite>) {
        let Some(staged) = staged else {
            return;
        };

        let mut written = self.written.lock().await;
        if staged.revision <= *written {
            debug!("Skipping superseded snapshot revision {}", staged.revision);
            return;
        }
        match self
            .ports
            .storage
            .put(&self.config.namespace_key, &staged.json)
            .await
        {
            Ok(()) => *written = staged.revision,
            Err(e) => error!("Failed to persist chat state: {}", e),
        }
    }

    /// Adds a chatroom at the end of the list and makes it active.
    pub async fn create_chatroom(&self, title: &str) -> Result<Chatroom> {
        let mut state = self.state.write().await;
        let chatroom = state.registry.create(title)?;
        state.log.ensure_entry(&chatroom.id);
        state.seeded.insert(chatroom.id.clone());
        state.activate(Some(chatroom.id.clone()));
        let staged = state.stage();

        info!("Created chatroom '{}' ({})", chatroom.title, chatroom.id);
        self.emit(StoreEvent::ChatroomCreated {
            chatroom: chatroom.clone(),
        });
        self.emit(StoreEvent::ActiveChatroomChanged {
            chatroom_id: Some(chatroom.id.clone()),
        });
        drop(state);

        self.flush(staged).await;
        Ok(chatroom)
    }

    /// Removes the chatroom and its messages together and cancels its pending replies.
    pub async fn delete_chatroom(&self, id: &str) -> Result<Chatroom> {
        let mut state = self.state.write().await;
        let chatroom = state.registry.remove(id)?;
        state.log.remove_entry(id);
        state.seeded.remove(id);
        if let Some(tasks) = state.reply_tasks.remove(id) {
            for task in tasks {
                task.abort();
            }
        }

        let was_active = state.session.active_chatroom_id.as_deref() == Some(id);
        if was_active {
            state.activate(None);
        }
        let staged = state.stage();

        info!("Deleted chatroom '{}' ({})", chatroom.title, chatroom.id);
        self.emit(StoreEvent::ChatroomDeleted {
            chatroom_id: id.to_string(),
        });
        if was_active {
            self.emit(StoreEvent::ActiveChatroomChanged { chatroom_id: None });
        }
        drop(state);

        self.flush(staged).await;
        Ok(chatroom)
    }

    pub async fn list_chatrooms(&self) -> Vec<Chatroom> {
        self.state.read().await.registry.list().to_vec()
    }

    pub async fn chatroom(&self, id: &str) -> Option<Chatroom> {
        self.state.read().await.registry.get(id).cloned()
    }

    /// Messages of a chatroom in display order; empty for unknown ids.
    pub async fn messages(&self, chatroom_id: &str) -> Vec<Message> {
        self.state.read().await.log.get(chatroom_id).to_vec()
    }

    pub async fn session(&self) -> SessionState {
        self.state.read().await.session.clone()
    }

    pub async fn dark_mode(&self) -> bool {
        self.state.read().await.dark_mode
    }

    /// Flips the theme preference and returns the new value.
    pub async fn toggle_dark_mode(&self) -> bool {
        let mut state = self.state.write().await;
        state.dark_mode = !state.dark_mode;
        let dark_mode = state.dark_mode;
        let staged = state.stage();
        self.emit(StoreEvent::DarkModeChanged { dark_mode });
        drop(state);

        self.flush(staged).await;
        dark_mode
    }

    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.read().await;
        Snapshot::capture(&state.registry, &state.log, state.dark_mode)
    }

    /// Makes `id` the active chatroom and resets pagination. A chatroom with
    /// no messages gets its initial history before this returns.
    ///
    /// Reselecting the active chatroom keeps its pending replies.
    pub async fn set_active_chatroom(&self, id: &str) -> Result<()> {
        let (epoch, needs_seed) = {
            let mut state = self.state.write().await;
            if !state.registry.contains(id) {
                return Err(StoreError::NotFound(id.to_string()));
            }

            if state.session.active_chatroom_id.as_deref() == Some(id) {
                if !state.session.is_loading_history {
                    state.session.page_cursor = 0;
                    state.session.has_more_history = true;
                }
            } else {
                state.activate(Some(id.to_string()));
                self.emit(StoreEvent::ActiveChatroomChanged {
                    chatroom_id: Some(id.to_string()),
                });
            }

            let needs_seed = state.log.is_empty_for(id)
                && !state.seeded.contains(id)
                && !state.session.is_loading_history;
            if needs_seed {
                state.session.is_loading_history = true;
                self.emit(StoreEvent::HistoryLoading {
                    chatroom_id: id.to_string(),
                    loading: true,
                });
            }
            (state.epoch, needs_seed)
        };

        if !needs_seed {
            return Ok(());
        }

        let fetched = self
            .ports
            .history
            .fetch_history(id, 0, self.config.initial_batch_size)
            .await;

        let mut state = self.state.write().await;
        if !state.is_current(id, epoch) {
            debug!("Dropping stale initial history for chatroom {}", id);
            return Ok(());
        }
        state.session.is_loading_history = false;
        self.emit(StoreEvent::HistoryLoading {
            chatroom_id: id.to_string(),
            loading: false,
        });

        let drafts = fetched?;
        if state.seeded.contains(id) {
            return Ok(());
        }

        // Messages sent while the load was in flight stay after the batch.
        let batch = state.stamp(drafts)?;
        let count = batch.len();
        state.log.prepend(id, batch)?;
        state.seeded.insert(id.to_string());
        let staged = state.stage();

        self.emit(StoreEvent::HistoryPrepended {
            chatroom_id: id.to_string(),
            count,
            has_more: state.session.has_more_history,
        });
        drop(state);

        self.flush(staged).await;
        Ok(())
    }

    /// Appends the user's message and schedules exactly one reply for it.
    /// Returns `None` without doing anything when no chatroom is active.
    pub async fn send_message(&self, text: &str) -> Result<Option<Message>> {
        if text.trim().is_empty() {
            return Err(StoreError::Validation("message must not be blank".to_string()));
        }

        let mut state = self.state.write().await;
        let Some(chatroom_id) = state.session.active_chatroom_id.clone() else {
            debug!("Ignoring message, no active chatroom");
            return Ok(None);
        };

        let id = state.allocate_id()?;
        let message = MessageDraft::user_text(text).into_message(id);
        state.log.append(&chatroom_id, message.clone())?;
        state.pending_replies += 1;
        state.session.responder = ResponderState::Typing;
        let staged = state.stage();

        self.emit(StoreEvent::MessageAppended {
            chatroom_id: chatroom_id.clone(),
            message: message.clone(),
        });
        self.emit(StoreEvent::ResponderTyping {
            chatroom_id: chatroom_id.clone(),
            typing: true,
        });

        let epoch = state.epoch;
        let task = tokio::spawn(self.clone().deliver_reply(chatroom_id.clone(), text.to_string(), epoch));
        let tasks = state.reply_tasks.entry(chatroom_id).or_default();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
        drop(state);

        self.flush(staged).await;
        Ok(Some(message))
    }

    async fn deliver_reply(self, chatroom_id: String, user_text: String, epoch: u64) {
        let reply = self.ports.responder.respond(&chatroom_id, &user_text).await;

        let mut state = self.state.write().await;
        if !state.is_current(&chatroom_id, epoch) {
            debug!("Dropping stale reply for chatroom {}", chatroom_id);
            return;
        }

        state.pending_replies = state.pending_replies.saturating_sub(1);
        let typing = state.pending_replies > 0;
        if !typing {
            state.session.responder = ResponderState::Idle;
        }

        let mut staged = None;
        match reply.and_then(|draft| Ok((draft, state.allocate_id()?))) {
            Ok((mut draft, id)) => {
                draft.timestamp = Utc::now();
                let message = draft.into_message(id);
                match state.log.append(&chatroom_id, message.clone()) {
                    Ok(()) => {
                        staged = state.stage();
                        self.emit(StoreEvent::MessageAppended {
                            chatroom_id: chatroom_id.clone(),
                            message,
                        });
                    }
                    Err(e) => debug!("Dropping reply: {}", e),
                }
            }
            Err(e) => warn!("Reply failed for chatroom {}: {}", chatroom_id, e),
        }

        self.emit(StoreEvent::ResponderTyping { chatroom_id, typing });
        drop(state);

        self.flush(staged).await;
    }

    /// Fetches the next older page and prepends it. Returns the number of
    /// messages added; 0 when there was nothing to do.
    pub async fn load_more_history(&self) -> Result<usize> {
        let (chatroom_id, epoch, cursor) = {
            let mut state = self.state.write().await;
            let Some(chatroom_id) = state.session.active_chatroom_id.clone() else {
                debug!("Ignoring history request, no active chatroom");
                return Ok(0);
            };
            if !state.session.has_more_history || state.session.is_loading_history {
                debug!("Ignoring history request for chatroom {}", chatroom_id);
                return Ok(0);
            }

            state.session.is_loading_history = true;
            self.emit(StoreEvent::HistoryLoading {
                chatroom_id: chatroom_id.clone(),
                loading: true,
            });
            (chatroom_id, state.epoch, state.session.page_cursor)
        };

        let fetched = self
            .ports
            .history
            .fetch_history(&chatroom_id, cursor + 1, self.config.page_size)
            .await;

        let mut state = self.state.write().await;
        if !state.is_current(&chatroom_id, epoch) {
            debug!("Dropping stale history page for chatroom {}", chatroom_id);
            return Ok(0);
        }
        state.session.is_loading_history = false;
        self.emit(StoreEvent::HistoryLoading {
            chatroom_id: chatroom_id.clone(),
            loading: false,
        });

        let batch = state.stamp(fetched?)?;
        let count = batch.len();
        state.log.prepend(&chatroom_id, batch)?;
        state.session.page_cursor += 1;
        state.session.has_more_history = state.session.page_cursor < self.config.page_limit;
        let staged = state.stage();

        self.emit(StoreEvent::HistoryPrepended {
            chatroom_id,
            count,
            has_more: state.session.has_more_history,
        });
        drop(state);

        self.flush(staged).await;
        Ok(count)
    }

    /// Decodes an uploaded image into the chatroom that was active when the
    /// upload started, even if another one is active by the time it lands.
    pub async fn upload_image(&self, content: &[u8], mime_type: &str) -> Result<Message> {
        let chatroom_id = self
            .state
            .read()
            .await
            .session
            .active_chatroom_id
            .clone()
            .ok_or(StoreError::NoActiveChatroom)?;

        let reference = self
            .ports
            .codec
            .read_as_displayable_reference(content, mime_type)
            .await?;

        let mut state = self.state.write().await;
        if !state.registry.contains(&chatroom_id) {
            debug!("Dropping image for deleted chatroom {}", chatroom_id);
            return Err(StoreError::NotFound(chatroom_id));
        }

        let id = state.allocate_id()?;
        let message = MessageDraft::user_image(reference).into_message(id);
        state.log.append(&chatroom_id, message.clone())?;
        let staged = state.stage();

        self.emit(StoreEvent::MessageAppended {
            chatroom_id,
            message: message.clone(),
        });
        drop(state);

        self.flush(staged).await;
        Ok(message)
    }
}
