//! Daybreak: calendar-aware morning assistant.

pub mod auth;
pub mod calendar;
pub mod chat;
pub mod config;
pub mod conversations;
pub mod error;
pub mod llm;
pub mod messaging;
pub mod motivation;
pub mod server;
pub mod speech;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;
