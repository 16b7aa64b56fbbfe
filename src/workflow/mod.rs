//! Chat workflow: registration, the request lifecycle, session
//! confirmation, and admin moderation, driven by [`Engine`].

pub mod action;
mod admin;
mod engine;
mod registration;
mod requests;
mod sessions;
pub mod views;

pub use action::{Action, AdminAction};
pub use engine::Engine;
