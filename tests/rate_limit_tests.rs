//! Rate limiting as seen from the chat: the middleware in front of commands
//! and pending input.

mod test_helpers;

use std::sync::Arc;
use std::time::Duration;

use shipment_admin_bot::bot::command_handlers::{BotCommand, CommandHandler, CommandRequest};
use shipment_admin_bot::bot::message_handler::{handle_command, handle_pending_input};
use shipment_admin_bot::bot::ui_builder::{ACCESS_DENIED_TEXT, RATE_LIMITED_TEXT};
use shipment_admin_bot::dialogue::AdminDialogueState;
use shipment_admin_bot::rate_limiter::{RateDecision, RateLimiter};
use shipment_admin_bot::store::MemoryStore;
use test_helpers::*;

fn request(command: &str) -> CommandRequest {
    CommandRequest {
        user_id: ADMIN_ID,
        chat_id: CHAT_ID,
        command: BotCommand::parse(command).unwrap(),
    }
}

#[tokio::test]
async fn test_sixth_command_in_window_is_rejected() {
    let harness = Harness::with_store(
        vec![sample_shipment("TRK1", "Pending")],
        Arc::new(MemoryStore::new()),
        Duration::from_secs(10),
        5,
    );

    for _ in 0..5 {
        let reply = harness.ctx.commands.handle(&request("/track TRK1")).await;
        assert_ne!(reply.text, RATE_LIMITED_TEXT);
        assert!(reply.text.contains("TRK1"));
    }

    let reply = harness.ctx.commands.handle(&request("/track TRK1")).await;
    assert_eq!(reply.text, "Rate limit exceeded. Please try again later.");
}

#[tokio::test]
async fn test_rejected_command_never_reaches_backend() {
    let harness = Harness::with_store(
        vec![sample_shipment("TRK1", "Pending")],
        Arc::new(MemoryStore::new()),
        Duration::from_secs(10),
        1,
    );

    harness.ctx.commands.handle(&request("/stats")).await;
    let calls = harness.repository.calls();

    let reply = harness.ctx.commands.handle(&request("/stats")).await;
    assert_eq!(reply.text, RATE_LIMITED_TEXT);
    assert_eq!(harness.repository.calls(), calls);
}

#[tokio::test]
async fn test_commands_allowed_again_after_window() {
    let harness = Harness::with_store(
        Vec::new(),
        Arc::new(MemoryStore::new()),
        Duration::from_millis(100),
        2,
    );

    for _ in 0..2 {
        assert_ne!(harness.ctx.commands.handle(&request("/help")).await.text, RATE_LIMITED_TEXT);
    }
    assert_eq!(harness.ctx.commands.handle(&request("/help")).await.text, RATE_LIMITED_TEXT);

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_ne!(harness.ctx.commands.handle(&request("/help")).await.text, RATE_LIMITED_TEXT);
}

#[tokio::test]
async fn test_lost_expiry_still_resets_window() {
    let store = Arc::new(LostExpiryStore::default());
    let limiter = RateLimiter::new(store, Duration::from_millis(50), 2);

    // First EXPIRE fails: let through, then re-armed on the next hit
    assert_eq!(limiter.check(ADMIN_ID).await, RateDecision::FailedOpen);
    assert_eq!(limiter.check(ADMIN_ID).await, RateDecision::Allowed(2));
    assert_eq!(limiter.check(ADMIN_ID).await, RateDecision::Rejected(3));

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(limiter.check(ADMIN_ID).await, RateDecision::Allowed(1));
}

#[tokio::test]
async fn test_store_down_fails_open() {
    let harness = Harness::with_store(
        vec![sample_shipment("TRK1", "Pending")],
        Arc::new(FailingStore),
        Duration::from_secs(10),
        1,
    );

    // Limiter, cache and simulation state all fail; the command still runs
    for _ in 0..3 {
        let reply = harness.ctx.commands.handle(&request("/track TRK1")).await;
        assert_ne!(reply.text, RATE_LIMITED_TEXT);
        assert!(reply.text.contains("*Status*"));
    }
}

#[tokio::test]
async fn test_myid_is_rate_limited_too() {
    let harness = Harness::with_store(
        Vec::new(),
        Arc::new(MemoryStore::new()),
        Duration::from_secs(10),
        1,
    );
    let stranger = CommandRequest {
        user_id: STRANGER_ID,
        chat_id: STRANGER_ID,
        command: BotCommand::MyId,
    };

    assert!(harness.ctx.commands.handle(&stranger).await.text.contains("2002"));
    assert_eq!(harness.ctx.commands.handle(&stranger).await.text, RATE_LIMITED_TEXT);
}

#[tokio::test]
async fn test_rate_limited_input_keeps_prompt_open() {
    let harness = Harness::with_store(
        vec![sample_shipment("TRK1", "Pending")],
        Arc::new(MemoryStore::new()),
        Duration::from_secs(10),
        1,
    );
    let state = AdminDialogueState::AwaitingSpeed {
        tracking_number: "TRK1".to_string(),
        menu_page: 1,
    };

    let first = handle_pending_input(&harness.ctx, ADMIN_ID, &state, "2.0").await;
    assert!(first.reset_state);

    let second = handle_pending_input(&harness.ctx, ADMIN_ID, &state, "3.0").await;
    assert!(!second.reset_state);
    assert_eq!(second.replies[0].text, RATE_LIMITED_TEXT);
}

#[tokio::test]
async fn test_rate_limited_command_keeps_prompt_open() {
    let harness = Harness::with_store(
        Vec::new(),
        Arc::new(MemoryStore::new()),
        Duration::from_secs(10),
        1,
    );

    let first = handle_command(&harness.ctx, &request("/help")).await;
    assert!(first.reset_state);
    assert_ne!(first.screen.text, RATE_LIMITED_TEXT);

    let second = handle_command(&harness.ctx, &request("/help")).await;
    assert!(!second.reset_state);
    assert_eq!(second.screen.text, RATE_LIMITED_TEXT);
}

#[tokio::test]
async fn test_stranger_command_leaves_dialogue_alone() {
    let harness = Harness::new(Vec::new());
    let stranger = CommandRequest {
        user_id: STRANGER_ID,
        chat_id: STRANGER_ID,
        command: BotCommand::Menu,
    };

    let reply = handle_command(&harness.ctx, &stranger).await;
    assert!(!reply.reset_state);
    assert_eq!(reply.screen.text, ACCESS_DENIED_TEXT);
}
