use std::time::Duration;

use chat_session::{AuthGate, ChatStore, StoreConfig, StorePorts};
use log::{error, info};

// Smallest valid GIF, used as the demo upload.
const DEMO_IMAGE: [u8; 26] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x00, 0x3B,
];

#[tokio::main]
async fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(e) = run().await {
        error!("Demo session failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> chat_session::Result<()> {
    let config = StoreConfig::load()?;
    let ports = StorePorts::mocked(&config).await?;
    let store = ChatStore::open(config, ports).await?;

    let mut events = store.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                info!("event: {}", json);
            }
        }
    });

    let mut auth = AuthGate::default();
    auth.request_otp("+1 555 010 9999")?;
    auth.verify_otp("123456").await?;
    info!("Signed in as {}", auth.phone().unwrap_or_default());

    for chatroom in store.list_chatrooms().await {
        info!("Chatroom '{}' created {}", chatroom.title, chatroom.created_at);
    }

    let chatroom = store.create_chatroom("Demo").await?;
    store.send_message("hello").await?;
    while store.session().await.is_responder_typing() {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    while store.session().await.has_more_history {
        let loaded = store.load_more_history().await?;
        info!("Loaded {} older messages", loaded);
    }

    let image = store.upload_image(&DEMO_IMAGE, "image/gif").await?;
    info!("Uploaded image message {}", image.id);

    let messages = store.messages(&chatroom.id).await;
    info!("'{}' now holds {} messages", chatroom.title, messages.len());
    for message in messages.iter().rev().take(3) {
        let sender = if message.is_user { "you" } else { "responder" };
        let preview: String = message.content.chars().take(48).collect();
        info!("  [{}] {}: {}", message.timestamp.format("%H:%M"), sender, preview);
    }

    let dark_mode = store.toggle_dark_mode().await;
    info!("Dark mode {}", if dark_mode { "on" } else { "off" });

    store.delete_chatroom(&chatroom.id).await?;
    Ok(())
}
