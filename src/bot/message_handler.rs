//! Message Handler module for processing incoming Telegram messages
//!
//! Slash commands go through [`AdminContext::commands`]. Any other text is
//! read as the answer to a pending prompt, if the chat has one.

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::{debug, info, warn, Instrument};

use crate::dialogue::{AdminDialogue, AdminDialogueState};
use crate::errors::{error_logging, AppResult};
use crate::observability;
use crate::rate_limiter::RateDecision;
use crate::validation::{parse_shipment_input, parse_shipment_update, parse_speed, sanitize_input};

use super::command_handlers::{error_screen, BotCommand, CommandRequest};
use super::ui_builder::{self, code, format_speed, Screen, ACCESS_DENIED_TEXT, RATE_LIMITED_TEXT};
use super::{send_screen, AdminContext};

/// Replies to one pending-input message
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInputReply {
    pub replies: Vec<Screen>,
    /// Return the chat to idle
    pub reset_state: bool,
}

/// Reply to one slash command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReply {
    pub screen: Screen,
    /// Abandon whatever prompt was open
    pub reset_state: bool,
}

/// Run a command through the rate limiter.
///
/// An admin command that gets past the limiter closes any open prompt. A
/// rate-limited one leaves the prompt alone.
pub async fn handle_command(ctx: &AdminContext, request: &CommandRequest) -> CommandReply {
    if !ctx.commands.admit(request).await {
        return CommandReply {
            screen: Screen::plain(RATE_LIMITED_TEXT),
            reset_state: false,
        };
    }
    CommandReply {
        screen: ctx.commands.handle_admitted(request).await,
        reset_state: ctx.is_admin(request.user_id),
    }
}

/// Handle incoming messages
pub async fn message_handler(
    bot: Bot,
    msg: Message,
    ctx: Arc<AdminContext>,
    dialogue: AdminDialogue,
) -> Result<()> {
    let user_id = msg.from.as_ref().map(|user| user.id.0 as i64);
    let span = observability::telegram_span("message_handler", user_id);

    async move {
        let start_time = std::time::Instant::now();

        let Some(user_id) = user_id else {
            debug!(chat_id = %msg.chat.id, "Ignoring message without a sender");
            return Ok(());
        };
        let Some(text) = msg.text() else {
            debug!(user_id = %user_id, "Ignoring non-text message");
            return Ok(());
        };

        if let Some(command) = BotCommand::parse(text) {
            debug!(user_id = %user_id, command = %command.name(), "Received command");
            let request = CommandRequest {
                user_id,
                chat_id: msg.chat.id.0,
                command,
            };
            let reply = handle_command(&ctx, &request).await;
            if reply.reset_state {
                if let Err(e) = dialogue.update(AdminDialogueState::Idle).await {
                    error_logging::log_internal_error(&e, "message_handler", "reset_dialogue", Some(user_id));
                }
            }
            send_screen(&bot, msg.chat.id, &reply.screen).await?;
            observability::record_request_metrics("telegram_command", 200, start_time.elapsed());
            return Ok(());
        }

        let state = dialogue.get().await?.unwrap_or_default();
        if state.is_idle() {
            debug!(user_id = %user_id, "Ignoring text with no pending prompt");
            return Ok(());
        }

        let reply = handle_pending_input(&ctx, user_id, &state, text).await;
        if reply.reset_state {
            dialogue.update(AdminDialogueState::Idle).await?;
        }
        for screen in &reply.replies {
            send_screen(&bot, msg.chat.id, screen).await?;
        }

        observability::record_request_metrics("telegram_message", 200, start_time.elapsed());
        Ok(())
    }
    .instrument(span)
    .await
}

/// Answer `text` as input for `state`.
///
/// Rate-limited input keeps the prompt open so it can be retried. Otherwise the
/// chat returns to idle and the main menu follows the result.
pub async fn handle_pending_input(
    ctx: &AdminContext,
    user_id: i64,
    state: &AdminDialogueState,
    text: &str,
) -> PendingInputReply {
    if let RateDecision::Rejected(_) = ctx.rate_limiter.check(user_id).await {
        return PendingInputReply {
            replies: vec![Screen::plain(RATE_LIMITED_TEXT)],
            reset_state: false,
        };
    }

    if !ctx.is_admin(user_id) {
        warn!(user_id = %user_id, "Unauthorized input attempt");
        return PendingInputReply {
            replies: vec![Screen::plain(ACCESS_DENIED_TEXT)],
            reset_state: true,
        };
    }

    let operation = pending_operation(state);
    let result = match apply_input(ctx, state, text).await {
        Ok(screen) => screen,
        Err(e) => error_screen(&e, operation, user_id),
    };

    let mut replies = vec![result];
    match ctx.service.list(1).await {
        Ok(first) => replies.push(ui_builder::main_menu(state.menu_page(), first.total)),
        Err(e) => error_logging::log_database_error(&e, "menu_after_input", Some(user_id), None),
    }

    PendingInputReply {
        replies,
        reset_state: true,
    }
}

fn pending_operation(state: &AdminDialogueState) -> &'static str {
    match state {
        AdminDialogueState::Idle => "idle",
        AdminDialogueState::AwaitingNewShipment { .. } => "add_shipment",
        AdminDialogueState::AwaitingShipmentUpdate { .. } => "update_shipment",
        AdminDialogueState::AwaitingSpeed { .. } => "set_speed",
        AdminDialogueState::AwaitingWebhook { .. } => "set_webhook",
    }
}

async fn apply_input(
    ctx: &AdminContext,
    state: &AdminDialogueState,
    text: &str,
) -> AppResult<Screen> {
    let service = &ctx.service;
    match state {
        AdminDialogueState::Idle => Ok(Screen::plain(ui_builder::INVALID_ACTION_TEXT)),
        AdminDialogueState::AwaitingNewShipment { .. } => {
            let input = parse_shipment_input(text)?;
            let outcome = service.save(&input).await?;
            let verb = if outcome.created { "added" } else { "updated" };
            info!(tracking_number = %outcome.shipment.tracking_number, created = outcome.created, "Shipment saved from input");
            Ok(Screen::markdown(format!(
                "Shipment {} {}.",
                code(&outcome.shipment.tracking_number),
                verb
            )))
        }
        AdminDialogueState::AwaitingShipmentUpdate {
            tracking_number, ..
        } => {
            let input = parse_shipment_update(tracking_number, text)?;
            let outcome = service.save(&input).await?;
            Ok(Screen::markdown(format!(
                "Shipment {} updated.",
                code(&outcome.shipment.tracking_number)
            )))
        }
        AdminDialogueState::AwaitingSpeed {
            tracking_number, ..
        } => {
            let speed = parse_speed(text)?;
            service.set_speed(tracking_number, speed).await?;
            Ok(Screen::markdown(format!(
                "Simulation speed for {} set to {}.",
                code(tracking_number),
                code(&format_speed(speed))
            )))
        }
        AdminDialogueState::AwaitingWebhook {
            tracking_number, ..
        } => {
            let url = sanitize_input(text);
            service.set_webhook(tracking_number, &url).await?;
            Ok(Screen::markdown(format!(
                "Webhook URL for {} set to {}.",
                code(tracking_number),
                code(&url)
            )))
        }
    }
}
