//! Consult Desk: a chat-driven consultation booking desk.

pub mod channels;
pub mod config;
pub mod conversation;
pub mod domain;
pub mod error;
pub mod notify;
pub mod reporting;
pub mod store;
pub mod workflow;
