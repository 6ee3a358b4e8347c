//! Selection Callbacks module for batch delete and bulk simulation control

use crate::bot::ui_builder::{self, code};
use crate::errors::AppResult;
use crate::shipments::{SelectionSet, ShipmentService};

use super::callback_types::MenuPurpose;
use super::menu_callbacks::render_picker;
use super::CallbackOutcome;

/// Add or remove a shipment from the chat's selection and redraw the picker.
pub async fn handle_toggle(
    service: &ShipmentService,
    chat_id: i64,
    purpose: MenuPurpose,
    tracking_number: &str,
    page: u32,
) -> AppResult<CallbackOutcome> {
    let Some(set) = purpose.selection_set() else {
        return Ok(CallbackOutcome::alert(ui_builder::INVALID_ACTION_TEXT));
    };
    let selected = service
        .toggle_selection(set, chat_id, tracking_number)
        .await?;
    let verb = if selected { "Selected" } else { "Deselected" };
    let picker = render_picker(service, chat_id, purpose, page).await?;
    Ok(CallbackOutcome::notice(format!("{} {}.", verb, code(tracking_number))).with_screen(picker))
}

/// Apply the chat's selection and return to the main menu.
pub async fn handle_confirm(
    service: &ShipmentService,
    chat_id: i64,
    set: SelectionSet,
) -> AppResult<CallbackOutcome> {
    let notice = match set {
        SelectionSet::BatchDelete => {
            format!("Deleted {} shipments.", service.batch_delete(chat_id).await?)
        }
        SelectionSet::BulkPause => {
            format!("Paused {} simulations.", service.bulk_pause(chat_id).await?)
        }
        SelectionSet::BulkResume => {
            format!("Resumed {} simulations.", service.bulk_resume(chat_id).await?)
        }
    };
    let total = service.list(1).await?.total;
    Ok(CallbackOutcome::alert(notice).with_screen(ui_builder::main_menu(1, total)))
}
