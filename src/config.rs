//! Environment-driven configuration.
//!
//! Deployment settings come from the environment, matching how webhook bots
//! are usually hosted. Required values fail startup loudly; everything else
//! has a documented default.

use anyhow::{bail, Context, Result};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_WELCOME_TEXT: &str = "Welcome! Send me a message and I will pass it along.";
/// Default correlation retention: three days.
pub const DEFAULT_RELAY_TTL_SECS: u64 = 259_200;
pub const DEFAULT_RELAY_MAX_ENTRIES: usize = 10;
/// How long unauthorized notices stay visible before deferred deletion.
pub const DEFAULT_NOTICE_DELETE_DELAY_MS: u64 = 10_000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DB_PATH: &str = "postbox.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    /// The bot's own user id; used to recognize replies to relayed copies.
    pub bot_id: i64,
    pub owner_id: i64,
    pub api_base: String,
    pub webhook_secret: Option<String>,
    pub welcome_text: String,
    pub relay_ttl: Duration,
    pub relay_max_entries: usize,
    pub notice_delete_delay: Duration,
    pub host: String,
    pub port: u16,
    pub db_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any name -> value lookup; tests inject maps instead of
    /// mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let Some(bot_token) = lookup("TELEGRAM_BOT_TOKEN") else {
            bail!("TELEGRAM_BOT_TOKEN is required");
        };
        let Some(owner_raw) = lookup("TELEGRAM_BOT_OWNER_ID") else {
            bail!("TELEGRAM_BOT_OWNER_ID is required");
        };
        let owner_id: i64 = owner_raw
            .trim()
            .parse()
            .context("TELEGRAM_BOT_OWNER_ID must be a numeric user id")?;

        // Bot tokens look like "<bot id>:<secret>"; the id prefix saves an
        // extra variable in the common case.
        let bot_id = match lookup("TELEGRAM_BOT_ID") {
            Some(raw) => raw
                .trim()
                .parse()
                .context("TELEGRAM_BOT_ID must be a numeric user id")?,
            None => bot_id_from_token(&bot_token)
                .context("TELEGRAM_BOT_ID is not set and the bot id could not be derived from TELEGRAM_BOT_TOKEN")?,
        };

        let relay_ttl_secs = parse_or_default(
            lookup("MESSAGE_RELAY_TTL_SECS"),
            "MESSAGE_RELAY_TTL_SECS",
            DEFAULT_RELAY_TTL_SECS,
        )?;
        let relay_max_entries = parse_or_default(
            lookup("RELAY_MAX_ENTRIES"),
            "RELAY_MAX_ENTRIES",
            DEFAULT_RELAY_MAX_ENTRIES,
        )?;
        let notice_delete_delay_ms = parse_or_default(
            lookup("NOTICE_DELETE_DELAY_MS"),
            "NOTICE_DELETE_DELAY_MS",
            DEFAULT_NOTICE_DELETE_DELAY_MS,
        )?;
        let port = parse_or_default(lookup("PORT"), "PORT", DEFAULT_PORT)?;

        Ok(Self {
            bot_token,
            bot_id,
            owner_id,
            api_base: lookup("TELEGRAM_BOT_API").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            webhook_secret: lookup("WEBHOOK_SECRET_TOKEN"),
            welcome_text: lookup("TELEGRAM_BOT_WELCOME_TEXT")
                .unwrap_or_else(|| DEFAULT_WELCOME_TEXT.to_string()),
            relay_ttl: Duration::from_secs(relay_ttl_secs),
            relay_max_entries,
            notice_delete_delay: Duration::from_millis(notice_delete_delay_ms),
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            db_path: lookup("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
        })
    }
}

fn bot_id_from_token(token: &str) -> Option<i64> {
    let prefix = token.split(':').next()?;
    prefix.parse().ok()
}

fn parse_or_default<T: std::str::FromStr>(
    raw: Option<String>,
    name: &str,
    default: T,
) -> Result<T> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{name} has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}
