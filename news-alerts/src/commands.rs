use std::sync::Arc;
use std::time::Duration;

use interfaces::{Category, CommandSource, Notifier, SubscriberId, SubscriberRegistry};
use tracing::{debug, error, info, warn};

const WELCOME_TEXT: &str = "Greetings. I am your high-impact news monitor.\n\n\
I continuously scan for major geopolitical events and macroeconomic shifts affecting XAUUSD and major fiat currencies.\n\n\
You are now subscribed to all alerts. Use /help to see commands.";

const HELP_TEXT: &str = "<b>Available Commands:</b>\n\
/start - Subscribe to the feed\n\
/status - Check your current settings\n\
/ping - Test bot responsiveness";

const INACTIVE_TEXT: &str = "Status: 🔴 Inactive\nPress /start to activate.";

/// Back-off after the command source fails to deliver a batch.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Status,
    Ping,
}

impl Command {
    /// Parse the leading `/command` of a message, ignoring trailing arguments.
    /// A `/cmd@name` mention only counts when `name` is `bot_username`; without
    /// a known username every mention is accepted.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let word = word.strip_prefix('/')?;
        let (name, mention) = match word.split_once('@') {
            Some((name, mention)) => (name, Some(mention)),
            None => (word, None),
        };

        if let (Some(mention), Some(username)) = (mention, bot_username) {
            if !mention.eq_ignore_ascii_case(username.trim_start_matches('@')) {
                return None;
            }
        }

        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "status" => Some(Command::Status),
            "ping" => Some(Command::Ping),
            _ => None,
        }
    }
}

/// Answers subscriber commands against the registry.
pub struct CommandHandler {
    registry: Arc<dyn SubscriberRegistry>,
    bot_username: Option<String>,
}

impl CommandHandler {
    pub fn new(registry: Arc<dyn SubscriberRegistry>) -> Self {
        Self {
            registry,
            bot_username: None,
        }
    }

    /// Only answer `/cmd@name` mentions addressed to `username`.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    /// Returns the reply for `text`, or `None` when it is not a command.
    pub async fn handle(&self, sender: SubscriberId, text: &str) -> anyhow::Result<Option<String>> {
        let Some(command) = Command::parse(text, self.bot_username.as_deref()) else {
            debug!("Ignoring non-command message from {}", sender);
            return Ok(None);
        };

        let reply = match command {
            Command::Start => {
                self.registry.add_or_ignore(sender).await?;
                WELCOME_TEXT.to_string()
            }
            Command::Help => HELP_TEXT.to_string(),
            Command::Status => match self.registry.get_categories(sender).await? {
                Some(categories) => format!(
                    "Status: 🟢 Active\nListening for: {}",
                    categories
                        .iter()
                        .map(Category::as_str)
                        .collect::<Vec<_>>()
                        .join(",")
                ),
                None => INACTIVE_TEXT.to_string(),
            },
            Command::Ping => "Pong".to_string(),
        };
        Ok(Some(reply))
    }
}

/// Serve inbound commands until the task is dropped. Internal failures are
/// logged and never reported back to the sender.
pub async fn run_command_loop<S: CommandSource>(
    mut source: S,
    notifier: Arc<dyn Notifier>,
    handler: CommandHandler,
) {
    info!("Command loop started");
    loop {
        let messages = match source.receive().await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Failed to receive commands: {:#}", e);
                tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                continue;
            }
        };

        for message in messages {
            match handler.handle(message.sender, &message.text).await {
                Ok(Some(reply)) => {
                    if let Err(e) = notifier.send(message.sender, &reply).await {
                        warn!("Failed to reply to {}: {:#}", message.sender, e);
                    }
                }
                Ok(None) => {}
                Err(e) => error!("Command from {} failed: {:#}", message.sender, e),
            }
        }
    }
}
