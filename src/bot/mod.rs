//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `callbacks`: Inline keyboard callback data and routing
//! - `command_handlers`: Slash commands and the rate-limit middleware
//! - `message_handler`: Entry point for messages, including pending input
//! - `ui_builder`: Creates keyboards and formats messages

pub mod callbacks;
pub mod command_handlers;
pub mod message_handler;
pub mod ui_builder;

use teloxide::prelude::*;
use tracing::debug;
use teloxide::types::{MessageId, ParseMode};
use teloxide::{ApiError, RequestError};

use crate::rate_limiter::RateLimiter;
use crate::shipments::ShipmentService;

use command_handlers::{AdminCommands, RateLimited};
use ui_builder::Screen;

/// Shared dependencies for every handler
#[derive(Clone)]
pub struct AdminContext {
    pub service: ShipmentService,
    pub rate_limiter: RateLimiter,
    /// Slash commands behind the rate limiter
    pub commands: RateLimited<AdminCommands>,
}

impl AdminContext {
    pub fn new(service: ShipmentService, rate_limiter: RateLimiter) -> Self {
        let commands = RateLimited::new(AdminCommands::new(service.clone()), rate_limiter.clone());
        Self {
            service,
            rate_limiter,
            commands,
        }
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.service.admin().is_admin(user_id)
    }
}

// Re-export main handler functions for use in main.rs
pub use callbacks::callback_handler::callback_handler;
pub use message_handler::message_handler;

#[allow(deprecated)]
fn legacy_markdown() -> ParseMode {
    ParseMode::Markdown
}

/// Send `screen` as a new message. If Telegram rejects the Markdown, resend
/// it as plain text.
pub async fn send_screen(bot: &Bot, chat_id: ChatId, screen: &Screen) -> ResponseResult<()> {
    if screen.markdown {
        let mut request = bot
            .send_message(chat_id, screen.text.clone())
            .parse_mode(legacy_markdown());
        if let Some(keyboard) = &screen.keyboard {
            request = request.reply_markup(keyboard.clone());
        }
        match request.await {
            Ok(_) => return Ok(()),
            Err(e) => {
                crate::errors::error_logging::log_internal_error(
                    &e,
                    "send_screen",
                    "Markdown rejected, resending as plain text",
                    Some(chat_id.0),
                );
            }
        }
    }

    let mut request = bot.send_message(chat_id, screen.text.clone());
    if let Some(keyboard) = &screen.keyboard {
        request = request.reply_markup(keyboard.clone());
    }
    request.await?;
    Ok(())
}

/// Telegram refuses an edit that would leave the message as it is
fn is_unchanged(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

/// Replace the content of an existing message with `screen`, falling back to
/// sending a new message when the edit fails. An edit to identical content
/// counts as done.
pub async fn edit_screen(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    screen: &Screen,
) -> ResponseResult<()> {
    let mut request = bot.edit_message_text(chat_id, message_id, screen.text.clone());
    if screen.markdown {
        request = request.parse_mode(legacy_markdown());
    }
    if let Some(keyboard) = &screen.keyboard {
        request = request.reply_markup(keyboard.clone());
    }
    match request.await {
        Ok(_) => Ok(()),
        Err(e) if is_unchanged(&e) => {
            debug!(chat_id = %chat_id, message_id = message_id.0, "Message already shows this screen");
            Ok(())
        }
        Err(e) => {
            crate::errors::error_logging::log_internal_error(
                &e,
                "edit_screen",
                "Failed to edit message, sending a new one",
                Some(chat_id.0),
            );
            send_screen(bot, chat_id, screen).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmodified_edit_is_not_an_error() {
        assert!(is_unchanged(&RequestError::Api(ApiError::MessageNotModified)));
        assert!(!is_unchanged(&RequestError::Api(ApiError::MessageToEditNotFound)));
        assert!(!is_unchanged(&RequestError::Api(ApiError::Unknown(
            "Bad Request: can't parse entities".to_string()
        ))));
    }
}
