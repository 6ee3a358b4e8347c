//! End-to-end bot behavior over in-memory collaborators: commands, inline
//! callbacks and pending prompts.

mod test_helpers;

use shipment_admin_bot::bot::callbacks::callback_handler::resolve_callback;
use shipment_admin_bot::bot::command_handlers::{BotCommand, CommandHandler, CommandRequest};
use shipment_admin_bot::bot::message_handler::handle_pending_input;
use shipment_admin_bot::bot::ui_builder::{ACCESS_DENIED_TEXT, INVALID_ACTION_TEXT};
use shipment_admin_bot::dialogue::AdminDialogueState;
use shipment_admin_bot::store::{keys, KeyValueStore};
use test_helpers::*;

async fn run(harness: &Harness, user_id: i64, text: &str) -> String {
    let command = BotCommand::parse(text).expect("test input should be a command");
    let request = CommandRequest {
        user_id,
        chat_id: CHAT_ID,
        command,
    };
    harness.ctx.commands.handle(&request).await.text
}

#[cfg(test)]
mod command_tests {
    use super::*;

    #[tokio::test]
    async fn test_non_admin_is_denied_before_any_lookup() {
        let harness = Harness::new(vec![sample_shipment("TRK1", "In_Transit")]);

        for text in ["/stats", "/track TRK1", "/stop TRK1", "/menu"] {
            assert_eq!(run(&harness, STRANGER_ID, text).await, ACCESS_DENIED_TEXT);
        }
        assert_eq!(harness.repository.calls(), 0);
        assert_eq!(harness.notifier.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn test_myid_answers_anyone() {
        let harness = Harness::new(vec![]);
        assert_eq!(
            run(&harness, STRANGER_ID, "/myid").await,
            "Your Telegram user ID: `2002`"
        );
    }

    #[tokio::test]
    async fn test_missing_arguments_show_usage() {
        let harness = Harness::new(vec![]);
        assert_eq!(
            run(&harness, ADMIN_ID, "/track").await,
            "Usage: /track <tracking_number>"
        );
        assert_eq!(
            run(&harness, ADMIN_ID, "/setspeed TRK1").await,
            "Usage: /setspeed <tracking_number> <speed>"
        );
        assert_eq!(
            run(&harness, ADMIN_ID, "/setwebhook").await,
            "Usage: /setwebhook <tracking_number> <url>"
        );
    }

    #[tokio::test]
    async fn test_track_unknown_shipment() {
        let harness = Harness::new(vec![]);
        assert_eq!(
            run(&harness, ADMIN_ID, "/track MISSING").await,
            "Shipment `MISSING` not found."
        );
    }

    #[tokio::test]
    async fn test_track_shows_summary() {
        let harness = Harness::new(vec![sample_shipment("TRK1", "In_Transit")]);
        let text = run(&harness, ADMIN_ID, "/track trk1").await;
        assert!(text.contains("*Shipment*: `TRK1`"));
        assert!(text.contains("*Status*: `In_Transit`"));
        assert!(text.contains("*Paused*: `false`"));
    }

    #[tokio::test]
    async fn test_stop_then_stop_again() {
        let harness = Harness::new(vec![sample_shipment("TRK1", "In_Transit")]);

        assert_eq!(
            run(&harness, ADMIN_ID, "/stop TRK1").await,
            "Simulation paused for `TRK1`."
        );
        assert_eq!(harness.notifier.broadcasts.lock().as_slice(), ["TRK1"]);
        assert_eq!(
            run(&harness, ADMIN_ID, "/stop TRK1").await,
            "Simulation for `TRK1` is already paused."
        );
        assert_eq!(
            run(&harness, ADMIN_ID, "/continue TRK1").await,
            "Simulation resumed for `TRK1`."
        );
        assert_eq!(harness.notifier.broadcast_count(), 2);
    }

    #[tokio::test]
    async fn test_stop_refuses_completed_shipment() {
        let harness = Harness::new(vec![sample_shipment("TRK1", "Delivered")]);
        let text = run(&harness, ADMIN_ID, "/stop TRK1").await;
        assert!(text.contains("already completed"), "got {text}");
        assert_eq!(harness.notifier.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn test_setspeed_bounds() {
        let harness = Harness::new(vec![sample_shipment("TRK1", "In_Transit")]);

        assert_eq!(
            run(&harness, ADMIN_ID, "/setspeed TRK1 11").await,
            "Speed must be between 0.1 and 10.0."
        );
        assert_eq!(
            run(&harness, ADMIN_ID, "/setspeed TRK1 2.5").await,
            "Simulation speed for `TRK1` set to `2.5x`."
        );
        assert_eq!(
            run(&harness, ADMIN_ID, "/getspeed TRK1").await,
            "Simulation speed for `TRK1` is `2.5x`."
        );
    }

    #[tokio::test]
    async fn test_setwebhook_rejects_non_http_url() {
        let harness = Harness::new(vec![sample_shipment("TRK1", "In_Transit")]);
        let text = run(&harness, ADMIN_ID, "/setwebhook TRK1 ftp://example.com").await;
        assert!(text.starts_with("Invalid webhook URL"), "got {text}");
        assert_eq!(harness.repository.get("TRK1").and_then(|s| s.webhook_url), None);
    }

    #[tokio::test]
    async fn test_testwebhook_falls_back_to_default_url() {
        let harness = Harness::new(vec![sample_shipment("TRK1", "In_Transit")]);
        assert_eq!(
            run(&harness, ADMIN_ID, "/testwebhook TRK1").await,
            "Test webhook notification sent for `TRK1`."
        );
        let webhooks = harness.notifier.webhooks.lock();
        assert_eq!(webhooks.len(), 1);
        assert_eq!(webhooks[0].0, DEFAULT_WEBHOOK);
    }

    #[tokio::test]
    async fn test_long_search_uses_same_query_as_pagination() {
        let mut shipment = sample_shipment("TRK1", "In_Transit");
        shipment.delivery_location = "Warehouse 7, Marina Road, Lagos Island, NG".to_string();
        let harness = Harness::new(vec![shipment]);
        let request = CommandRequest {
            user_id: ADMIN_ID,
            chat_id: CHAT_ID,
            command: BotCommand::parse("/search Warehouse 7, Marina Road, Lagos Mainland").unwrap(),
        };

        // Only the first 32 bytes reach the lookup, as on later pages
        let screen = harness.ctx.commands.handle(&request).await;
        assert!(screen.text.contains("'Warehouse 7, Marina Road, Lagos '"), "{}", screen.text);
        assert!(screen.button_labels().contains(&"TRK1".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let harness = Harness::new(vec![]);
        let text = run(&harness, ADMIN_ID, "/frobnicate").await;
        assert!(text.starts_with("Unknown command"));
    }
}

#[cfg(test)]
mod callback_tests {
    use super::*;

    #[tokio::test]
    async fn test_callback_from_stranger_is_denied() {
        let harness = Harness::new(vec![sample_shipment("TRK1", "In_Transit")]);
        let outcome = resolve_callback(&harness.ctx, CHAT_ID, STRANGER_ID, Some("do:pause:1:TRK1")).await;

        assert_eq!(outcome.notice.as_deref(), Some(ACCESS_DENIED_TEXT));
        assert!(outcome.show_alert);
        assert_eq!(harness.repository.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_callback_data() {
        let harness = Harness::new(vec![]);
        for data in [Some("do:warp:1:TRK1"), Some(""), None] {
            let outcome = resolve_callback(&harness.ctx, CHAT_ID, ADMIN_ID, data).await;
            assert_eq!(outcome.notice.as_deref(), Some(INVALID_ACTION_TEXT));
            assert!(outcome.screen.is_none());
        }
    }

    #[tokio::test]
    async fn test_pause_callback_shows_fresh_state() {
        let harness = Harness::new(vec![sample_shipment("TRK1", "In_Transit")]);
        // Warm the cache with the unpaused record
        assert!(run(&harness, ADMIN_ID, "/track TRK1").await.contains("*Paused*: `false`"));

        let outcome = resolve_callback(&harness.ctx, CHAT_ID, ADMIN_ID, Some("do:pause:1:TRK1")).await;

        assert_eq!(outcome.notice.as_deref(), Some("Simulation paused for TRK1."));
        let screen = outcome.screen.expect("details should be re-rendered");
        assert!(screen.text.contains("*Paused*: `true`"));
        assert_eq!(harness.notifier.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn test_batch_delete_toggle_and_confirm() {
        let harness = Harness::new(vec![
            sample_shipment("TRK1", "In_Transit"),
            sample_shipment("TRK2", "Pending"),
        ]);

        let toggled = resolve_callback(&harness.ctx, CHAT_ID, ADMIN_ID, Some("do:bdel:1:TRK1")).await;
        assert_eq!(toggled.notice.as_deref(), Some("Selected TRK1."));
        let picker = toggled.screen.expect("picker should be re-rendered");
        assert!(picker.button_labels().contains(&"✅ TRK1".to_string()));
        assert!(picker.button_labels().contains(&"TRK2".to_string()));

        let confirmed = resolve_callback(&harness.ctx, CHAT_ID, ADMIN_ID, Some("confirm:bdel:1")).await;
        assert_eq!(confirmed.notice.as_deref(), Some("Deleted 1 shipments."));
        assert!(harness.repository.get("TRK1").is_none());
        assert!(harness.repository.get("TRK2").is_some());

        // The selection is consumed by the confirmation
        let again = resolve_callback(&harness.ctx, CHAT_ID, ADMIN_ID, Some("confirm:bdel:1")).await;
        assert_eq!(again.notice.as_deref(), Some("No shipments selected for deletion."));
    }

    #[tokio::test]
    async fn test_generate_id_replies_with_fresh_number() {
        let harness = Harness::new(vec![]);
        let outcome = resolve_callback(&harness.ctx, CHAT_ID, ADMIN_ID, Some("gen_id")).await;
        let reply = outcome.reply.expect("generated id should be sent");
        assert!(reply.text.starts_with("Generated ID: `TRK"), "got {}", reply.text);
    }

    #[tokio::test]
    async fn test_add_shipment_opens_prompt() {
        let harness = Harness::new(vec![]);
        let outcome = resolve_callback(&harness.ctx, CHAT_ID, ADMIN_ID, Some("add")).await;
        assert_eq!(
            outcome.next_state,
            Some(AdminDialogueState::AwaitingNewShipment { menu_page: 1 })
        );
        assert!(outcome.screen.is_some());
    }

    #[tokio::test]
    async fn test_menu_callback_resets_dialogue() {
        let harness = Harness::new(vec![sample_shipment("TRK1", "In_Transit")]);
        let outcome = resolve_callback(&harness.ctx, CHAT_ID, ADMIN_ID, Some("menu:1")).await;
        assert_eq!(outcome.next_state, Some(AdminDialogueState::Idle));
        let menu = outcome.screen.expect("menu should be shown");
        assert!(menu.text.starts_with("*Choose an action (Page 1)*"));
    }
}

#[cfg(test)]
mod pending_input_tests {
    use super::*;

    #[tokio::test]
    async fn test_new_shipment_from_prompt() {
        let harness = Harness::new(vec![]);
        let state = AdminDialogueState::AwaitingNewShipment { menu_page: 1 };

        let reply = handle_pending_input(
            &harness.ctx,
            ADMIN_ID,
            &state,
            "TRK9 Pending 'Lagos, NG' user@example.com",
        )
        .await;

        assert!(reply.reset_state);
        assert_eq!(reply.replies.len(), 2);
        assert_eq!(reply.replies[0].text, "Shipment `TRK9` added.");
        assert!(reply.replies[1].text.starts_with("*Choose an action"));

        let saved = harness.repository.get("TRK9").expect("shipment should be stored");
        assert_eq!(saved.delivery_location, "Lagos, NG");
        assert_eq!(harness.notifier.emails.lock().len(), 1);
        assert_eq!(harness.notifier.broadcasts.lock().as_slice(), ["TRK9"]);
    }

    #[tokio::test]
    async fn test_invalid_input_still_returns_to_menu() {
        let harness = Harness::new(vec![]);
        let state = AdminDialogueState::AwaitingNewShipment { menu_page: 1 };

        let reply = handle_pending_input(&harness.ctx, ADMIN_ID, &state, "TRK9 Teleported 'Lagos, NG'").await;

        assert!(reply.reset_state);
        assert!(reply.replies[0].text.starts_with("Invalid status"));
        assert!(harness.repository.get("TRK9").is_none());
    }

    #[tokio::test]
    async fn test_speed_prompt() {
        let harness = Harness::new(vec![sample_shipment("TRK1", "In_Transit")]);
        let state = AdminDialogueState::AwaitingSpeed {
            tracking_number: "TRK1".to_string(),
            menu_page: 1,
        };

        let reply = handle_pending_input(&harness.ctx, ADMIN_ID, &state, "3").await;
        assert_eq!(reply.replies[0].text, "Simulation speed for `TRK1` set to `3.0x`.");
        let stored = harness
            .store
            .hget(keys::SPEED_MULTIPLIERS, "TRK1")
            .await
            .expect("memory store never fails");
        assert_eq!(stored.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_stranger_input_is_denied() {
        let harness = Harness::new(vec![]);
        let state = AdminDialogueState::AwaitingNewShipment { menu_page: 1 };

        let reply = handle_pending_input(&harness.ctx, STRANGER_ID, &state, "TRK9 Pending 'Lagos, NG'").await;

        assert!(reply.reset_state);
        assert_eq!(reply.replies.len(), 1);
        assert_eq!(reply.replies[0].text, ACCESS_DENIED_TEXT);
        assert_eq!(harness.repository.calls(), 0);
    }
}
