//! Remote collaborators the store calls out to: the AI responder and the
//! history service. Both are mocked here with simulated latency.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as TimeDelta, Utc};
use rand::Rng;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::messages::MessageDraft;

const REPLY_POOL: [&str; 4] = [
    "I'm analyzing your question...",
    "That's an interesting point!",
    "Based on my knowledge...",
    "Here's what I found...",
];

const HISTORY_REPLY_POOL: [&str; 8] = [
    "I'm analyzing your question...",
    "That's an interesting point!",
    "Based on my knowledge...",
    "Here's what I found...",
    "Let me think about that...",
    "The answer to that is...",
    "I'd be happy to help with that!",
    "That's a great question!",
];

/// Produces the single reply to one user message.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, chatroom_id: &str, user_text: &str) -> Result<MessageDraft>;
}

/// Backward pagination over a chatroom's older messages.
///
/// `cursor` 0 is the most recent page; each increment reaches further back.
/// Pages come back oldest first.
#[async_trait]
pub trait HistoryService: Send + Sync {
    async fn fetch_history(
        &self,
        chatroom_id: &str,
        cursor: u32,
        page_size: usize,
    ) -> Result<Vec<MessageDraft>>;
}

pub struct MockResponder {
    min_delay: Duration,
    max_delay: Duration,
}

impl MockResponder {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        MockResponder {
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        let (min_delay, max_delay) = config.reply_delay_bounds();
        MockResponder::new(min_delay, max_delay)
    }

    fn pick_delay(&self) -> Duration {
        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }
}

#[async_trait]
impl Responder for MockResponder {
    async fn respond(&self, chatroom_id: &str, _user_text: &str) -> Result<MessageDraft> {
        let delay = self.pick_delay();
        log::debug!("Responder replying to {} in {:?}", chatroom_id, delay);
        tokio::time::sleep(delay).await;

        let index = rand::thread_rng().gen_range(0..REPLY_POOL.len());
        Ok(MessageDraft::responder_text(REPLY_POOL[index]))
    }
}

pub struct MockHistoryService {
    delay: Duration,
}

impl MockHistoryService {
    pub fn new(delay: Duration) -> Self {
        MockHistoryService { delay }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        MockHistoryService::new(config.history_delay())
    }
}

/// Fabricates `count` messages spread over the 24 hours that page `cursor`
/// covers, sorted oldest first. Page `n + 1` lies entirely before page `n`.
pub fn generate_page(cursor: u32, count: usize) -> Vec<MessageDraft> {
    let mut rng = rand::thread_rng();
    let window_start = Utc::now() - TimeDelta::hours(24 * i64::from(cursor));

    let mut page: Vec<MessageDraft> = (0..count)
        .map(|i| {
            let is_user = rng.gen_bool(0.5);
            let content = if is_user {
                format!("User message {}", i + 1)
            } else {
                HISTORY_REPLY_POOL[rng.gen_range(0..HISTORY_REPLY_POOL.len())].to_string()
            };
            let seconds_back = rng.gen_range(1..=24 * 3600);
            MessageDraft {
                content,
                is_user,
                is_image: false,
                timestamp: window_start - TimeDelta::seconds(seconds_back),
            }
        })
        .collect();

    page.sort_by_key(|draft| draft.timestamp);
    page
}

#[async_trait]
impl HistoryService for MockHistoryService {
    async fn fetch_history(
        &self,
        chatroom_id: &str,
        cursor: u32,
        page_size: usize,
    ) -> Result<Vec<MessageDraft>> {
        log::debug!("Fetching history page {} for {}", cursor, chatroom_id);
        tokio::time::sleep(self.delay).await;
        Ok(generate_page(cursor, page_size))
    }
}
