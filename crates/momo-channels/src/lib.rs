//! # MoMo Channels
//! Telegram messaging collaborator and chat command parsing.

pub mod commands;
pub mod telegram;

pub use commands::{Command, parse};
pub use telegram::{IncomingMessage, TelegramChannel, TelegramPollingStream};
