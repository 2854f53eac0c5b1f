pub mod chat_stream;
pub mod config;
pub mod conversation;
pub mod message;
pub mod notification;
pub mod reconciler;
pub mod session;
pub mod store;
