// Library interface for chat_bridge
// Exposes the frame codec, hub and server for embedding in a chat host

pub mod config;
pub mod error;
pub mod frame;
pub mod history;
pub mod hub;
pub mod message;
pub mod pages;
pub mod server;
pub mod session;
pub mod source;

pub use config::Config;
pub use error::{ConfigError, ProtocolError};
pub use frame::{Frame, MessageType};
pub use hub::{Hub, SessionId};
pub use message::ChatMessage;
pub use server::{InstanceLock, Server};
pub use source::{EventSource, LoopbackSource};
