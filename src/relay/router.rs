//! Per-update classification and dispatch.
//!
//! Classification order is the core business rule and must not be reordered:
//! blocked sender → command → owner reply → ordinary sender → fallback,
//! first match wins. Nothing in here may escape to the HTTP boundary; every
//! path catches its own failures and degrades to a log line plus, where a
//! sender exists, a best-effort notice.

use super::blacklist::Blacklist;
use super::commands::{self, parse_command};
use super::store::{CorrelationStore, MessageOrigin};
use crate::scheduler::{TaskAction, TaskScheduler};
use crate::telegram::{BotApi, ChatRef, Message, Update, User};
use std::sync::Arc;
use std::time::Duration;

const UNAUTHORIZED_NOTICE: &str = "🚫 **Unauthorized!**";
const RELAY_FAILURE_NOTICE: &str =
    "Sorry, something went wrong relaying your message. Please try again later.";
const COMMAND_FAILURE_NOTICE: &str =
    "Internal error while handling your command. Please try again later.";
const NOT_PERMITTED_NOTICE: &str = "Sorry, you don't have permission to run this command.";

/// Deployment-level knobs the router needs per decision.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// The privileged recipient: all relayed messages land in this chat.
    pub owner_id: i64,
    /// The bot's own user id; replies to messages from this id are replies to
    /// relayed copies.
    pub bot_id: i64,
    pub welcome_text: String,
    /// How long unauthorized notices (and the messages that triggered them)
    /// stay up before deferred deletion.
    pub notice_delete_delay: Duration,
}

pub struct RelayRouter {
    api: Arc<dyn BotApi>,
    correlations: CorrelationStore,
    blacklist: Blacklist,
    scheduler: Arc<TaskScheduler>,
    settings: RelaySettings,
}

impl RelayRouter {
    pub fn new(
        api: Arc<dyn BotApi>,
        correlations: CorrelationStore,
        blacklist: Blacklist,
        scheduler: Arc<TaskScheduler>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            api,
            correlations,
            blacklist,
            scheduler,
            settings,
        }
    }

    fn owner_chat(&self) -> ChatRef {
        ChatRef::Id(self.settings.owner_id)
    }

    /// Classify one update and run exactly one downstream path.
    pub async fn process_update(&self, update: Update) {
        let Some(message) = update.message else {
            tracing::debug!("Ignoring non-message update {}", update.update_id);
            return;
        };
        let Some(user_id) = message.sender_id() else {
            tracing::warn!(
                "Ignoring message {} without sender information",
                message.message_id
            );
            return;
        };

        // Blocked sender wins over everything, including commands.
        if self.blacklist.contains(user_id) {
            tracing::info!("Blocked sender {user_id}, suppressing message");
            self.handle_blocked(&message).await;
            return;
        }

        if message.has_command_entity() {
            self.handle_command(&message, user_id).await;
        } else if user_id == self.settings.owner_id {
            match &message.reply_to_message {
                Some(replied) if replied.sender_id() == Some(self.settings.bot_id) => {
                    self.handle_owner_reply(&message, replied.message_id).await;
                }
                Some(_) => {
                    tracing::debug!("Owner replied to a non-relay message, ignoring");
                }
                None => {
                    tracing::debug!("Owner message without reply or command, ignoring");
                }
            }
        } else {
            self.handle_sender_message(&message, user_id).await;
        }
    }

    /// Path 1: suppress the message, post a short-lived notice, and schedule
    /// deferred deletion of both the notice and the triggering message.
    async fn handle_blocked(&self, message: &Message) {
        let chat = ChatRef::Id(message.chat.id);
        self.schedule_deletion(chat.clone(), message.message_id);

        match self.api.send_message(&chat, UNAUTHORIZED_NOTICE, None).await {
            Ok(notice_id) => self.schedule_deletion(chat, notice_id),
            Err(e) => tracing::warn!("Failed to send unauthorized notice: {e}"),
        }
    }

    fn schedule_deletion(&self, chat: ChatRef, message_id: i64) {
        let action = TaskAction::delete_message(chat, message_id);
        if let Err(e) = self
            .scheduler
            .schedule(&action, self.settings.notice_delete_delay)
        {
            tracing::warn!("Failed to schedule deferred deletion: {e}");
        }
    }

    /// Path 2: admin commands plus /start.
    async fn handle_command(&self, message: &Message, user_id: i64) {
        let chat = ChatRef::Id(message.chat.id);
        let text = message.text.as_deref().unwrap_or("");
        let Some((command, args)) = parse_command(text) else {
            tracing::warn!("Unparseable command: '{text}'");
            return;
        };
        tracing::info!("Command /{command} from {user_id}, args: '{args}'");

        let outcome = match command.as_str() {
            "start" => self.cmd_start(&chat, user_id).await,
            "ban" => self.cmd_ban(&chat, user_id, &args, true).await,
            "unban" => self.cmd_ban(&chat, user_id, &args, false).await,
            _ => {
                self.api
                    .send_message(&chat, &format!("Unknown command: /{command}"), None)
                    .await
                    .map(|_| ())
            }
        };

        if let Err(e) = outcome {
            tracing::warn!("Command /{command} failed: {e}");
            if let Err(e) = self.api.send_message(&chat, COMMAND_FAILURE_NOTICE, None).await {
                tracing::warn!("Failed to send command failure notice: {e}");
            }
        }
    }

    async fn cmd_start(&self, chat: &ChatRef, user_id: i64) -> anyhow::Result<()> {
        self.api
            .send_message(chat, &self.settings.welcome_text, None)
            .await?;
        if user_id == self.settings.owner_id {
            commands::setup_owner_menu(self.api.as_ref(), chat).await;
        }
        Ok(())
    }

    async fn cmd_ban(
        &self,
        chat: &ChatRef,
        user_id: i64,
        args: &str,
        ban: bool,
    ) -> anyhow::Result<()> {
        let verb = if ban { "ban" } else { "unban" };
        if user_id != self.settings.owner_id {
            self.api.send_message(chat, NOT_PERMITTED_NOTICE, None).await?;
            return Ok(());
        }
        let Ok(target) = args.parse::<i64>() else {
            let usage = format!(
                "Bad command format.\nUsage: `/{verb} <user id>` — the id must be numeric."
            );
            self.api.send_message(chat, &usage, None).await?;
            return Ok(());
        };

        let result = if ban {
            self.blacklist.add(target)
        } else {
            self.blacklist.remove(target)
        };
        let reply = match result {
            Ok(()) if ban => format!("✅ User `{target}` added to the blacklist."),
            Ok(()) => format!("✅ User `{target}` removed from the blacklist."),
            Err(e) => {
                tracing::warn!("Blacklist update for {target} failed: {e}");
                format!("❌ Failed to {verb} user `{target}`, check the logs.")
            }
        };
        self.api.send_message(chat, &reply, None).await?;
        Ok(())
    }

    /// Path 3: the owner replied to a relayed copy; route the reply back to
    /// the original sender.
    async fn handle_owner_reply(&self, message: &Message, replied_copy_id: i64) {
        let owner_chat = self.owner_chat();

        let Some(origin) = self.correlations.get(replied_copy_id) else {
            tracing::warn!("No correlation for copy {replied_copy_id}, cannot route reply");
            let days = self.correlations.ttl().as_secs() / 86_400;
            let notice = format!(
                "⚠️ Could not deliver the reply: the original source is unavailable.\n\
                 Possible reasons:\n\
                 - The original message is more than {days} days old.\n\
                 - The record was evicted.\n\
                 - An internal error."
            );
            if let Err(e) = self
                .api
                .send_message(&owner_chat, &notice, Some(message.message_id))
                .await
            {
                tracing::warn!("Failed to send reply-miss notice: {e}");
            }
            return;
        };

        match self
            .api
            .copy_message(
                &origin.chat,
                &owner_chat,
                message.message_id,
                Some(origin.message_id),
            )
            .await
        {
            Ok(copy_id) => {
                tracing::info!(
                    "Relayed owner reply {} to {} as {copy_id}",
                    message.message_id,
                    origin.chat
                );
                // Map the new copy back to the owner's reply so the sender
                // can keep the conversation going.
                self.correlations.put(
                    copy_id,
                    &MessageOrigin {
                        chat: owner_chat,
                        message_id: message.message_id,
                    },
                );
            }
            Err(e) => {
                tracing::warn!("Failed to relay owner reply to {}: {e}", origin.chat);
                let notice = format!("❌ Relaying the reply to `{}` failed: {e}", origin.chat);
                if let Err(e) = self
                    .api
                    .send_message(&owner_chat, &notice, Some(message.message_id))
                    .await
                {
                    tracing::warn!("Failed to send relay-failure notice to owner: {e}");
                }
            }
        }
    }

    /// Path 4: relay an ordinary sender's message to the owner and enrich the
    /// copy with sender identity.
    async fn handle_sender_message(&self, message: &Message, user_id: i64) {
        let from_chat = ChatRef::Id(message.chat.id);
        let owner_chat = self.owner_chat();

        // When the sender replied to one of our relayed owner replies,
        // resolve it so the owner's copy replies to their own message.
        let mut reply_target = None;
        if let Some(replied) = &message.reply_to_message {
            if replied.sender_id() == Some(self.settings.bot_id) {
                match self.correlations.get(replied.message_id) {
                    Some(origin) if origin.chat == owner_chat => {
                        reply_target = Some(origin.message_id);
                    }
                    _ => tracing::debug!(
                        "No owner origin for replied copy {}, relaying without reply target",
                        replied.message_id
                    ),
                }
            }
        }

        let copy_id = match self
            .api
            .copy_message(&owner_chat, &from_chat, message.message_id, reply_target)
            .await
        {
            Ok(copy_id) => copy_id,
            Err(e) => {
                tracing::warn!("Failed to relay message from {user_id}: {e}");
                if let Err(e) = self.api.send_message(&from_chat, RELAY_FAILURE_NOTICE, None).await
                {
                    tracing::warn!("Failed to send relay-failure notice to sender: {e}");
                }
                return;
            }
        };
        tracing::info!(
            "Relayed message {} from {user_id} as copy {copy_id}",
            message.message_id
        );

        // Correlate only after the copy exists; a dangling entry would point
        // at nothing.
        self.correlations.put(
            copy_id,
            &MessageOrigin {
                chat: from_chat.clone(),
                message_id: message.message_id,
            },
        );

        if let Err(e) = self.enrich_owner_copy(message, copy_id).await {
            tracing::warn!("Failed to attach sender identity to copy {copy_id}: {e}");
            if let Err(e) = self.api.send_message(&from_chat, RELAY_FAILURE_NOTICE, None).await {
                tracing::warn!("Failed to send relay-failure notice to sender: {e}");
            }
        }
    }

    /// Prepend sender identity to the owner's copy: edit the text or caption
    /// in place, or post a standalone notice for messages that carry neither
    /// (stickers).
    async fn enrich_owner_copy(&self, message: &Message, copy_id: i64) -> anyhow::Result<()> {
        let owner_chat = self.owner_chat();
        let identity = message
            .from
            .as_ref()
            .map(sender_identity_block)
            .unwrap_or_default();

        if let Some(text) = &message.text {
            self.api
                .edit_message_text(&owner_chat, copy_id, &format!("{identity}\n{text}"))
                .await?;
        } else if message.sticker.is_some() {
            // Sticker copies cannot carry a caption; identity goes out as its
            // own message.
            self.api.send_message(&owner_chat, &identity, None).await?;
        } else if let Some(caption) = &message.caption {
            self.api
                .edit_message_caption(&owner_chat, copy_id, &format!("{identity}\n{caption}"))
                .await?;
        } else {
            self.api
                .edit_message_caption(&owner_chat, copy_id, &identity)
                .await?;
        }
        Ok(())
    }
}

fn sender_identity_block(user: &User) -> String {
    let full_name = user.full_name();
    let mut block = match &user.username {
        Some(username) => {
            let display = if full_name.is_empty() {
                format!("@{username}")
            } else {
                full_name
            };
            format!(
                "From: [{display}](https://t.me/{username}) (ID: `{}`)",
                user.id
            )
        }
        None => {
            let display = if full_name.is_empty() {
                "Unknown".to_string()
            } else {
                full_name
            };
            format!(
                "From: {display} (ID: `{}`)\ntg://user?id={}",
                user.id, user.id
            )
        }
    };
    block.push_str("\n————————————");
    block
}
