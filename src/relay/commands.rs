//! Command parsing and the owner's command menu.

use crate::telegram::{BotApi, BotCommand, ChatRef};

pub const BOT_COMMANDS: &[BotCommand] = &[
    BotCommand {
        command: "start",
        description: "🚀 Show the welcome message",
    },
    BotCommand {
        command: "ban",
        description: "🚫 [admin] Block a sender (usage: /ban <user id>)",
    },
    BotCommand {
        command: "unban",
        description: "✅ [admin] Unblock a sender (usage: /unban <user id>)",
    },
];

/// Split `/cmd args` into a lowercased command name and its trimmed argument
/// tail. A bot mention suffix (`/ban@SomeBot 5`) ends the command name, and
/// its arguments only count when separated by whitespace, matching Telegram
/// client behavior.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let rest = text.strip_prefix('/')?;
    let mut cmd_end = rest.len();
    for (i, ch) in rest.char_indices() {
        if !(ch.is_ascii_alphanumeric() || ch == '_') {
            cmd_end = i;
            break;
        }
    }
    if cmd_end == 0 {
        return None;
    }
    let command = rest[..cmd_end].to_ascii_lowercase();
    let tail = &rest[cmd_end..];
    let args = if tail.starts_with(char::is_whitespace) {
        tail.trim().to_string()
    } else {
        String::new()
    };
    Some((command, args))
}

/// Install the command menu and menu button for the owner's chat. Best
/// effort: a failed menu setup never fails the command that triggered it.
pub async fn setup_owner_menu(api: &dyn BotApi, chat: &ChatRef) {
    match api.set_my_commands(chat, BOT_COMMANDS).await {
        Ok(true) => tracing::info!("Installed command menu for chat {chat}"),
        Ok(false) => tracing::warn!("Command menu install for chat {chat} was rejected"),
        Err(e) => tracing::warn!("Failed to install command menu for chat {chat}: {e}"),
    }
    match api.set_chat_menu_button(chat).await {
        Ok(true) => tracing::info!("Set menu button for chat {chat}"),
        Ok(false) => tracing::warn!("Menu button update for chat {chat} was rejected"),
        Err(e) => tracing::warn!("Failed to set menu button for chat {chat}: {e}"),
    }
}
