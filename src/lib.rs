//! Kabo — school registration and broadcast bot for Telegram.

pub mod cache;
pub mod config;
pub mod error;
pub mod flows;
pub mod messenger;
pub mod model;
pub mod records;
pub mod router;
pub mod store;
pub mod telegram;
pub mod validation;
