pub mod auth;
pub mod config;
pub mod error;
pub mod files;
pub mod messages;
pub mod persistence;
pub mod room;
pub mod services;
pub mod store;

pub use auth::AuthGate;
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use messages::{Message, StoreEvent};
pub use room::Chatroom;
pub use store::{ChatStore, ResponderState, SessionState, StorePorts};
