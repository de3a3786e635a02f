pub mod chat;
pub mod events;
pub mod messages;
pub mod models;
