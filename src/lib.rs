#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

//! Anonymous message relay bot for Telegram.
//!
//! Strangers write to the bot; the bot forwards their messages to one
//! configured owner, tagged with who sent them. The owner replies to a
//! forwarded copy and the bot routes the reply back without ever exposing
//! the owner's account.

pub mod config;
pub mod gateway;
pub mod relay;
pub mod scheduler;
pub mod storage;
pub mod telegram;

pub use config::Config;
