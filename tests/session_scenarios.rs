use std::time::Duration;

use chat_session::persistence::Snapshot;
use chat_session::{ChatStore, ResponderState, SessionState, StoreConfig, StoreError, StorePorts};
use tokio::time::sleep;

// Upper reply bound of the default config plus slack.
const REPLY_WAIT: Duration = Duration::from_millis(3100);

async fn mocked_store(config: StoreConfig) -> ChatStore {
    let ports = StorePorts::mocked(&config).await.unwrap();
    ChatStore::open(config, ports).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn demo_chatroom_gets_a_reply() {
    let store = mocked_store(StoreConfig::default()).await;

    let demo = store.create_chatroom("Demo").await.unwrap();
    store.send_message("hello").await.unwrap();
    assert_eq!(store.session().await.responder, ResponderState::Typing);

    sleep(REPLY_WAIT).await;

    let messages = store.messages(&demo.id).await;
    assert_eq!(messages.len(), 2);
    assert!(messages[0].is_user);
    assert!(!messages[1].is_user);
    assert_eq!(store.session().await.responder, ResponderState::Idle);
}

#[tokio::test(start_paused = true)]
async fn deleting_the_active_chatroom_mid_reply_leaves_no_trace() {
    let store = mocked_store(StoreConfig::default()).await;

    let demo = store.create_chatroom("Demo").await.unwrap();
    store.send_message("hello").await.unwrap();
    sleep(Duration::from_millis(400)).await;
    store.delete_chatroom(&demo.id).await.unwrap();

    sleep(REPLY_WAIT).await;

    assert!(store.messages(&demo.id).await.is_empty());
    for chatroom in store.list_chatrooms().await {
        assert!(store.messages(&chatroom.id).await.is_empty());
    }
    assert_eq!(store.session().await, SessionState::default());
}

#[tokio::test(start_paused = true)]
async fn only_three_history_loads_succeed() {
    let config = StoreConfig::default();
    let page_size = config.page_size;
    let store = mocked_store(config).await;
    let demo = store.create_chatroom("Demo").await.unwrap();

    let mut sizes = Vec::new();
    for _ in 0..4 {
        sizes.push(store.load_more_history().await.unwrap());
    }

    assert_eq!(sizes, vec![page_size, page_size, page_size, 0]);
    let messages = store.messages(&demo.id).await;
    assert_eq!(messages.len(), 3 * page_size);
    assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(store.session().await.page_cursor, 3);
}

#[tokio::test(start_paused = true)]
async fn seed_chatroom_receives_initial_history_on_first_visit() {
    let config = StoreConfig::default();
    let initial = config.initial_batch_size;
    let store = mocked_store(config).await;

    assert!(store.messages("1").await.is_empty());
    store.set_active_chatroom("1").await.unwrap();

    let messages = store.messages("1").await;
    assert_eq!(messages.len(), initial);
    assert!(messages.windows(2).all(|w| w[0].id != w[1].id));
}

// Real clock: file writes run on the blocking pool.
#[tokio::test]
async fn file_backed_state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        storage_dir: Some(dir.path().to_path_buf()),
        ..StoreConfig::default()
    };

    let store = mocked_store(config.clone()).await;
    let demo = store.create_chatroom("Demo").await.unwrap();
    store.send_message("hello").await.unwrap();
    sleep(REPLY_WAIT).await;
    store.upload_image(b"GIF89a", "image/gif").await.unwrap();
    store.toggle_dark_mode().await;
    let expected = store.snapshot().await;
    drop(store);

    let raw = std::fs::read_to_string(dir.path().join("chat-storage.json")).unwrap();
    assert_eq!(Snapshot::from_json(&raw).unwrap(), expected);

    let restarted = mocked_store(config).await;
    assert_eq!(restarted.snapshot().await, expected);
    assert_eq!(restarted.messages(&demo.id).await.len(), 3);
    assert!(restarted.dark_mode().await);
    assert_eq!(restarted.session().await, SessionState::default());
}

#[tokio::test]
async fn non_image_upload_is_a_decode_error() {
    let store = mocked_store(StoreConfig::default()).await;
    store.create_chatroom("Files").await.unwrap();

    let err = store.upload_image(b"plain text", "text/plain").await.unwrap_err();
    assert!(matches!(err, StoreError::Decode(_)));
}
