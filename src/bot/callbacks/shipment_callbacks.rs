//! Shipment Callbacks module for actions on a single picked shipment

use tracing::info;

use crate::bot::ui_builder::{self, code, format_speed};
use crate::dialogue::AdminDialogueState;
use crate::errors::AppResult;
use crate::notifications::BroadcastOutcome;
use crate::shipments::ShipmentService;

use super::callback_types::MenuPurpose;
use super::menu_callbacks::last_page;
use super::{selection_callbacks, CallbackOutcome};

/// Run `purpose` against the shipment picked from page `page`.
pub async fn handle_pick(
    service: &ShipmentService,
    chat_id: i64,
    purpose: MenuPurpose,
    tracking_number: &str,
    page: u32,
) -> AppResult<CallbackOutcome> {
    let tn = tracking_number;
    match purpose {
        MenuPurpose::View => {
            let details = service.require_details(tn).await?;
            Ok(CallbackOutcome::screen(ui_builder::details_view(&details, page)))
        }
        MenuPurpose::Update => {
            service.require_details(tn).await?;
            Ok(
                CallbackOutcome::screen(ui_builder::input_prompt(ui_builder::update_prompt(tn)))
                    .with_state(AdminDialogueState::AwaitingShipmentUpdate {
                        tracking_number: tn.to_string(),
                        menu_page: page,
                    }),
            )
        }
        MenuPurpose::Delete => {
            service.delete(tn).await?;
            let total = service.list(1).await?.total;
            let page = page.min(last_page(total));
            Ok(CallbackOutcome::notice(format!("Shipment {} deleted.", code(tn)))
                .with_screen(ui_builder::main_menu(page, total)))
        }
        MenuPurpose::BatchDelete | MenuPurpose::BulkPause | MenuPurpose::BulkResume => {
            selection_callbacks::handle_toggle(service, chat_id, purpose, tn, page).await
        }
        MenuPurpose::Broadcast => match service.broadcast(tn).await? {
            BroadcastOutcome::Triggered => Ok(CallbackOutcome::notice(format!(
                "Broadcast triggered for {}.",
                code(tn)
            ))),
            BroadcastOutcome::Failed(status) => Ok(CallbackOutcome::alert(format!(
                "Broadcast failed for {}: HTTP {}",
                code(tn),
                status
            ))),
        },
        MenuPurpose::ToggleEmail => {
            let enabled = service.toggle_email(tn).await?;
            let state = if enabled { "enabled" } else { "disabled" };
            Ok(CallbackOutcome::notice(format!(
                "Email notifications {} for {}.",
                state,
                code(tn)
            )))
        }
        MenuPurpose::Pause => {
            service.pause(tn).await?;
            refreshed_details(service, tn, page, format!("Simulation paused for {}.", code(tn)))
                .await
        }
        MenuPurpose::Resume => {
            service.resume(tn).await?;
            refreshed_details(service, tn, page, format!("Simulation resumed for {}.", code(tn)))
                .await
        }
        MenuPurpose::SetSpeed => {
            service.require_details(tn).await?;
            Ok(
                CallbackOutcome::screen(ui_builder::input_prompt(ui_builder::speed_prompt(tn)))
                    .with_state(AdminDialogueState::AwaitingSpeed {
                        tracking_number: tn.to_string(),
                        menu_page: page,
                    }),
            )
        }
        MenuPurpose::GetSpeed => {
            let speed = service.speed(tn).await?;
            Ok(CallbackOutcome::alert(format!(
                "Simulation speed for {} is {}.",
                code(tn),
                format_speed(speed)
            )))
        }
        MenuPurpose::SetWebhook => {
            service.require_details(tn).await?;
            Ok(
                CallbackOutcome::screen(ui_builder::input_prompt(ui_builder::webhook_prompt(tn)))
                    .with_state(AdminDialogueState::AwaitingWebhook {
                        tracking_number: tn.to_string(),
                        menu_page: page,
                    }),
            )
        }
        MenuPurpose::TestWebhook => {
            let url = service.send_webhook(tn).await?;
            info!(tracking_number = %tn, url = %url, "Test webhook sent");
            Ok(CallbackOutcome::notice(format!(
                "Test webhook notification sent for {}.",
                code(tn)
            )))
        }
        MenuPurpose::Notify => {
            let details = service.require_details(tn).await?;
            Ok(CallbackOutcome::screen(ui_builder::notify_options(
                &details,
                service.has_default_webhook(),
            )))
        }
    }
}

/// Re-read the shipment after a mutation so the controls match its new state.
async fn refreshed_details(
    service: &ShipmentService,
    tracking_number: &str,
    page: u32,
    notice: String,
) -> AppResult<CallbackOutcome> {
    let details = service.require_details(tracking_number).await?;
    Ok(CallbackOutcome::notice(notice).with_screen(ui_builder::details_view(&details, page)))
}

pub async fn handle_send_email(
    service: &ShipmentService,
    tracking_number: &str,
) -> AppResult<CallbackOutcome> {
    service.send_email(tracking_number).await?;
    Ok(CallbackOutcome::notice(format!(
        "Email notification queued for {}.",
        code(tracking_number)
    )))
}

pub async fn handle_send_webhook(
    service: &ShipmentService,
    tracking_number: &str,
) -> AppResult<CallbackOutcome> {
    service.send_webhook(tracking_number).await?;
    Ok(CallbackOutcome::notice(format!(
        "Webhook notification sent for {}.",
        code(tracking_number)
    )))
}
