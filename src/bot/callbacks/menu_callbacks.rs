//! Menu Callbacks module for navigation, pickers and input prompts

use crate::bot::ui_builder::{self, code, Screen, ADD_SHIPMENT_PROMPT, SETTINGS_TEXT};
use crate::db::PAGE_SIZE;
use crate::dialogue::AdminDialogueState;
use crate::errors::AppResult;
use crate::shipments::ShipmentService;

use super::callback_types::MenuPurpose;
use super::CallbackOutcome;

/// Last page that still has shipments on it, at least 1
pub fn last_page(total: u64) -> u32 {
    total.div_ceil(PAGE_SIZE as u64).max(1) as u32
}

/// Main menu at `page`, clamped to the pages that exist. Leaves any pending input.
pub async fn handle_main_menu(service: &ShipmentService, page: u32) -> AppResult<CallbackOutcome> {
    let total = service.list(1).await?.total;
    let page = page.clamp(1, last_page(total));
    Ok(CallbackOutcome::screen(ui_builder::main_menu(page, total))
        .with_state(AdminDialogueState::Idle))
}

pub async fn handle_generate_id(service: &ShipmentService) -> AppResult<CallbackOutcome> {
    let id = service.generate_unique_id().await?;
    Ok(CallbackOutcome {
        reply: Some(Screen::markdown(format!("Generated ID: {}", code(&id)))),
        ..CallbackOutcome::default()
    })
}

pub fn handle_add_shipment() -> CallbackOutcome {
    CallbackOutcome::screen(ui_builder::input_prompt(ADD_SHIPMENT_PROMPT))
        .with_state(AdminDialogueState::AwaitingNewShipment { menu_page: 1 })
}

pub fn handle_settings() -> CallbackOutcome {
    CallbackOutcome::notice(SETTINGS_TEXT)
}

pub fn handle_help() -> CallbackOutcome {
    CallbackOutcome::screen(ui_builder::help_view())
}

/// Close the menu and drop any pending input
pub fn handle_cancel() -> CallbackOutcome {
    CallbackOutcome {
        delete_message: true,
        next_state: Some(AdminDialogueState::Idle),
        ..CallbackOutcome::default()
    }
}

pub fn handle_bulk_menu(page: u32) -> CallbackOutcome {
    CallbackOutcome::screen(ui_builder::bulk_menu(page))
}

/// One page of every shipment, with the chat's current selection marked for
/// multi-select purposes.
pub async fn handle_picker(
    service: &ShipmentService,
    chat_id: i64,
    purpose: MenuPurpose,
    page: u32,
) -> AppResult<CallbackOutcome> {
    Ok(CallbackOutcome::screen(
        render_picker(service, chat_id, purpose, page).await?,
    ))
}

pub(crate) async fn render_picker(
    service: &ShipmentService,
    chat_id: i64,
    purpose: MenuPurpose,
    page: u32,
) -> AppResult<Screen> {
    let shipments = service.list(page).await?;
    let selected = match purpose.selection_set() {
        Some(set) => service.selection(set, chat_id).await?,
        None => Vec::new(),
    };
    Ok(ui_builder::shipment_picker(purpose, page, &shipments, &selected))
}

pub async fn handle_active_list(service: &ShipmentService, page: u32) -> AppResult<CallbackOutcome> {
    let shipments = service.list_active(page).await?;
    Ok(CallbackOutcome::screen(ui_builder::active_list(page, &shipments)))
}

pub async fn handle_paused_list(service: &ShipmentService, page: u32) -> AppResult<CallbackOutcome> {
    let shipments = service.list_paused(page).await?;
    Ok(CallbackOutcome::screen(ui_builder::paused_list(page, &shipments)))
}

pub async fn handle_search(
    service: &ShipmentService,
    query: &str,
    page: u32,
) -> AppResult<CallbackOutcome> {
    let shipments = service.search(query, page).await?;
    Ok(CallbackOutcome::screen(ui_builder::search_results(
        query, page, &shipments,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_page() {
        assert_eq!(last_page(0), 1);
        assert_eq!(last_page(5), 1);
        assert_eq!(last_page(6), 2);
        assert_eq!(last_page(11), 3);
    }

    #[test]
    fn test_cancel_deletes_and_resets() {
        let outcome = handle_cancel();
        assert!(outcome.delete_message);
        assert_eq!(outcome.next_state, Some(AdminDialogueState::Idle));
        assert!(outcome.screen.is_none());
    }

    #[test]
    fn test_add_shipment_enters_pending_state() {
        let outcome = handle_add_shipment();
        assert_eq!(
            outcome.next_state,
            Some(AdminDialogueState::AwaitingNewShipment { menu_page: 1 })
        );
        assert_eq!(outcome.screen.unwrap().button_data(), vec!["menu:1"]);
    }

    #[test]
    fn test_settings_is_a_notice() {
        let outcome = handle_settings();
        assert_eq!(outcome.notice.as_deref(), Some(SETTINGS_TEXT));
        assert!(!outcome.show_alert);
    }
}
