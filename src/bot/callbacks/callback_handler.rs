//! Callback Handler module for processing inline keyboard callback queries

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{MaybeInaccessibleMessage, MessageId};
use tracing::{debug, warn, Instrument};

use crate::bot::ui_builder::{ACCESS_DENIED_TEXT, INVALID_ACTION_TEXT};
use crate::bot::{edit_screen, send_screen, AdminContext};
use crate::dialogue::AdminDialogue;
use crate::errors::{error_logging, AppError, AppResult};
use crate::observability;

use super::callback_types::CallbackAction;
use super::{menu_callbacks, selection_callbacks, shipment_callbacks, CallbackOutcome};

/// Handle callback queries from inline keyboards
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    ctx: Arc<AdminContext>,
    dialogue: AdminDialogue,
) -> Result<()> {
    let user_id = q.from.id.0 as i64;
    let span = observability::telegram_span("callback_handler", Some(user_id));

    async move {
        let start_time = std::time::Instant::now();

        let (chat_id, message_id) = match &q.message {
            Some(MaybeInaccessibleMessage::Regular(msg)) => (msg.chat.id, Some(msg.id)),
            _ => (ChatId::from(q.from.id), None),
        };

        let outcome = resolve_callback(&ctx, chat_id.0, user_id, q.data.as_deref()).await;
        apply_outcome(&bot, chat_id, message_id, &dialogue, &outcome).await;

        let mut answer = bot.answer_callback_query(q.id.clone());
        if let Some(notice) = &outcome.notice {
            answer = answer.text(notice.clone()).show_alert(outcome.show_alert);
        }
        answer.await?;

        observability::record_request_metrics("telegram_callback", 200, start_time.elapsed());
        Ok(())
    }
    .instrument(span)
    .await
}

/// Check access, decode and run a callback. Failures come back as an alert.
pub async fn resolve_callback(
    ctx: &AdminContext,
    chat_id: i64,
    user_id: i64,
    data: Option<&str>,
) -> CallbackOutcome {
    if !ctx.is_admin(user_id) {
        warn!(user_id = %user_id, "Unauthorized callback attempt");
        return CallbackOutcome::alert(ACCESS_DENIED_TEXT);
    }

    let raw = data.unwrap_or_default();
    let action: CallbackAction = match raw.parse() {
        Ok(action) => action,
        Err(e) => {
            error_logging::log_validation_error(&e, "callback_parse", Some(user_id), "callback_data", Some(raw));
            return CallbackOutcome::alert(INVALID_ACTION_TEXT);
        }
    };
    debug!(user_id = %user_id, action = %action, "Dispatching callback");

    match dispatch_callback(ctx, chat_id, &action).await {
        Ok(outcome) => outcome,
        Err(e) => {
            log_callback_error(&e, &action, user_id);
            CallbackOutcome::alert(e.user_message())
        }
    }
}

/// Route a decoded action to its handler
pub async fn dispatch_callback(
    ctx: &AdminContext,
    chat_id: i64,
    action: &CallbackAction,
) -> AppResult<CallbackOutcome> {
    let service = &ctx.service;
    match action {
        CallbackAction::MainMenu { page } => menu_callbacks::handle_main_menu(service, *page).await,
        CallbackAction::GenerateId => menu_callbacks::handle_generate_id(service).await,
        CallbackAction::AddShipment => Ok(menu_callbacks::handle_add_shipment()),
        CallbackAction::Settings => Ok(menu_callbacks::handle_settings()),
        CallbackAction::Help => Ok(menu_callbacks::handle_help()),
        CallbackAction::Cancel => Ok(menu_callbacks::handle_cancel()),
        CallbackAction::BulkMenu { page } => Ok(menu_callbacks::handle_bulk_menu(*page)),
        CallbackAction::Picker { purpose, page } => {
            menu_callbacks::handle_picker(service, chat_id, *purpose, *page).await
        }
        CallbackAction::Pick {
            purpose,
            tracking_number,
            page,
        } => {
            shipment_callbacks::handle_pick(service, chat_id, *purpose, tracking_number, *page)
                .await
        }
        CallbackAction::ConfirmSelection { set, .. } => {
            selection_callbacks::handle_confirm(service, chat_id, *set).await
        }
        CallbackAction::SendEmail { tracking_number } => {
            shipment_callbacks::handle_send_email(service, tracking_number).await
        }
        CallbackAction::SendWebhook { tracking_number } => {
            shipment_callbacks::handle_send_webhook(service, tracking_number).await
        }
        CallbackAction::ListActive { page } => {
            menu_callbacks::handle_active_list(service, *page).await
        }
        CallbackAction::ListPaused { page } => {
            menu_callbacks::handle_paused_list(service, *page).await
        }
        CallbackAction::Search { query, page } => {
            menu_callbacks::handle_search(service, query, *page).await
        }
    }
}

fn log_callback_error(error: &AppError, action: &CallbackAction, user_id: i64) {
    let operation = action.to_data();
    match error {
        AppError::Validation(_) | AppError::NotFound(_) => {
            error_logging::log_validation_error(error, &operation, Some(user_id), "callback_action", None);
        }
        AppError::Database(_) => {
            error_logging::log_database_error(error, &operation, Some(user_id), None);
        }
        _ => {
            error_logging::log_internal_error(error, "callback_handler", &operation, Some(user_id));
        }
    }
}

/// Carry out everything in `outcome` except the callback answer.
/// Telegram failures are logged so the query is still answered.
async fn apply_outcome(
    bot: &Bot,
    chat_id: ChatId,
    message_id: Option<MessageId>,
    dialogue: &AdminDialogue,
    outcome: &CallbackOutcome,
) {
    let user_id = Some(chat_id.0);

    if let Some(state) = &outcome.next_state {
        if let Err(e) = dialogue.update(state.clone()).await {
            error_logging::log_internal_error(&e, "callback_handler", "update_dialogue", user_id);
        }
    }

    if outcome.delete_message {
        if let Some(message_id) = message_id {
            if let Err(e) = bot.delete_message(chat_id, message_id).await {
                error_logging::log_internal_error(&e, "callback_handler", "delete_message", user_id);
            }
        }
    }

    if let Some(screen) = &outcome.screen {
        let result = match message_id {
            Some(message_id) => edit_screen(bot, chat_id, message_id, screen).await,
            None => send_screen(bot, chat_id, screen).await,
        };
        if let Err(e) = result {
            error_logging::log_internal_error(&e, "callback_handler", "render_screen", user_id);
        }
    }

    if let Some(reply) = &outcome.reply {
        if let Err(e) = send_screen(bot, chat_id, reply).await {
            error_logging::log_internal_error(&e, "callback_handler", "send_reply", user_id);
        }
    }
}
