//! Command Handlers module for processing bot commands
//!
//! Commands are parsed into [`BotCommand`] and served by a [`CommandHandler`].
//! [`AdminCommands`] does the work; [`RateLimited`] wraps any handler with the
//! per-user fixed-window limit.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::{error_logging, AppError, AppResult};
use crate::rate_limiter::{RateDecision, RateLimiter};
use crate::shipments::{require_tracking_number, ShipmentService};
use crate::validation::parse_speed;

use super::ui_builder::{self, code, format_speed, Screen, ACCESS_DENIED_TEXT, RATE_LIMITED_TEXT};
use super::callbacks::callback_types::truncate_query;

pub const UNKNOWN_COMMAND_TEXT: &str = "Unknown command. Use /help to see available commands.";

/// A slash command with its raw argument text
#[derive(Debug, Clone, PartialEq)]
pub enum BotCommand {
    MyId,
    Menu,
    Track(String),
    Stats,
    Notify(String),
    Search(String),
    BulkAction,
    Stop(String),
    Continue(String),
    SetSpeed(String),
    GetSpeed(String),
    Debug(String),
    SetWebhook(String),
    TestWebhook(String),
    Help,
    Unknown(String),
}

impl BotCommand {
    /// Parse `/name[@bot] args...`. Returns `None` for text that is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim().to_string()),
            None => (rest, String::new()),
        };
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        let command = match name.as_str() {
            "myid" => BotCommand::MyId,
            "start" | "menu" => BotCommand::Menu,
            "track" => BotCommand::Track(args),
            "stats" => BotCommand::Stats,
            "notify" => BotCommand::Notify(args),
            "search" => BotCommand::Search(args),
            "bulk_action" => BotCommand::BulkAction,
            "stop" => BotCommand::Stop(args),
            "continue" => BotCommand::Continue(args),
            "setspeed" => BotCommand::SetSpeed(args),
            "getspeed" => BotCommand::GetSpeed(args),
            "debug" => BotCommand::Debug(args),
            "setwebhook" => BotCommand::SetWebhook(args),
            "testwebhook" => BotCommand::TestWebhook(args),
            "help" => BotCommand::Help,
            _ => BotCommand::Unknown(name),
        };
        Some(command)
    }

    /// Command name for logs and metrics
    pub fn name(&self) -> &str {
        match self {
            BotCommand::MyId => "myid",
            BotCommand::Menu => "menu",
            BotCommand::Track(_) => "track",
            BotCommand::Stats => "stats",
            BotCommand::Notify(_) => "notify",
            BotCommand::Search(_) => "search",
            BotCommand::BulkAction => "bulk_action",
            BotCommand::Stop(_) => "stop",
            BotCommand::Continue(_) => "continue",
            BotCommand::SetSpeed(_) => "setspeed",
            BotCommand::GetSpeed(_) => "getspeed",
            BotCommand::Debug(_) => "debug",
            BotCommand::SetWebhook(_) => "setwebhook",
            BotCommand::TestWebhook(_) => "testwebhook",
            BotCommand::Help => "help",
            BotCommand::Unknown(name) => name,
        }
    }

    /// `/myid` is open to everyone; every other command needs an admin.
    pub fn requires_admin(&self) -> bool {
        !matches!(self, BotCommand::MyId)
    }
}

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub user_id: i64,
    pub chat_id: i64,
    pub command: BotCommand,
}

/// Turns a command into the reply to send
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, request: &CommandRequest) -> Screen;
}

/// Rejects the request before `inner` runs once the user exceeds the limit.
/// A store outage lets the request through.
#[derive(Clone)]
pub struct RateLimited<H> {
    inner: H,
    limiter: RateLimiter,
}

impl<H> RateLimited<H> {
    pub fn new(inner: H, limiter: RateLimiter) -> Self {
        Self { inner, limiter }
    }
}

impl<H: CommandHandler> RateLimited<H> {
    /// Count the request against the sender's window; `false` drops it.
    pub async fn admit(&self, request: &CommandRequest) -> bool {
        match self.limiter.check(request.user_id).await {
            RateDecision::Rejected(_) => {
                debug!(
                    user_id = %request.user_id,
                    command = %request.command.name(),
                    "Command dropped by rate limiter"
                );
                false
            }
            RateDecision::Allowed(_) | RateDecision::FailedOpen => true,
        }
    }

    /// Run a request that [`admit`](Self::admit) already let through.
    pub async fn handle_admitted(&self, request: &CommandRequest) -> Screen {
        self.inner.handle(request).await
    }
}

#[async_trait]
impl<H: CommandHandler> CommandHandler for RateLimited<H> {
    async fn handle(&self, request: &CommandRequest) -> Screen {
        if !self.admit(request).await {
            return Screen::plain(RATE_LIMITED_TEXT);
        }
        self.handle_admitted(request).await
    }
}

/// The admin command set, backed by the shipment service
#[derive(Clone)]
pub struct AdminCommands {
    service: ShipmentService,
}

impl AdminCommands {
    pub fn new(service: ShipmentService) -> Self {
        Self { service }
    }

    async fn execute(&self, request: &CommandRequest) -> AppResult<Screen> {
        let service = &self.service;
        match &request.command {
            BotCommand::MyId => Ok(Screen::markdown(format!(
                "Your Telegram user ID: {}",
                code(&request.user_id.to_string())
            ))),
            BotCommand::Menu => {
                let first = service.list(1).await?;
                Ok(ui_builder::main_menu(1, first.total))
            }
            BotCommand::Track(args) => {
                let Some(tn) = single_argument(args) else {
                    return usage("/track <tracking_number>");
                };
                let tn = require_tracking_number(tn)?;
                Ok(ui_builder::track_summary(&service.require_details(&tn).await?))
            }
            BotCommand::Stats => Ok(ui_builder::stats_view(&service.stats().await?)),
            BotCommand::Notify(args) => {
                let Some(tn) = single_argument(args) else {
                    return usage("/notify <tracking_number>");
                };
                let tn = require_tracking_number(tn)?;
                let details = service.require_details(&tn).await?;
                Ok(ui_builder::notify_options(
                    &details,
                    service.has_default_webhook(),
                ))
            }
            BotCommand::Search(query) => {
                if query.is_empty() {
                    return usage("/search <query>");
                }
                // Pagination buttons carry the truncated query; page 1 matches them
                let sanitized = crate::validation::sanitize_input(query);
                let query = truncate_query(&sanitized);
                let results = service.search(query, 1).await?;
                Ok(ui_builder::search_results(query, 1, &results))
            }
            BotCommand::BulkAction => Ok(ui_builder::bulk_menu(1)),
            BotCommand::Stop(args) => {
                let Some(tn) = single_argument(args) else {
                    return usage("/stop <tracking_number>");
                };
                let tn = require_tracking_number(tn)?;
                service.pause(&tn).await?;
                Ok(Screen::markdown(format!("Simulation paused for {}.", code(&tn))))
            }
            BotCommand::Continue(args) => {
                let Some(tn) = single_argument(args) else {
                    return usage("/continue <tracking_number>");
                };
                let tn = require_tracking_number(tn)?;
                service.resume(&tn).await?;
                Ok(Screen::markdown(format!("Simulation resumed for {}.", code(&tn))))
            }
            BotCommand::SetSpeed(args) => {
                let Some([tn, speed]) = two_arguments(args) else {
                    return usage("/setspeed <tracking_number> <speed>");
                };
                let tn = require_tracking_number(tn)?;
                let speed = parse_speed(speed)?;
                service.set_speed(&tn, speed).await?;
                Ok(Screen::markdown(format!(
                    "Simulation speed for {} set to {}.",
                    code(&tn),
                    code(&format_speed(speed))
                )))
            }
            BotCommand::GetSpeed(args) => {
                let Some(tn) = single_argument(args) else {
                    return usage("/getspeed <tracking_number>");
                };
                let tn = require_tracking_number(tn)?;
                let speed = service.speed(&tn).await?;
                Ok(Screen::markdown(format!(
                    "Simulation speed for {} is {}.",
                    code(&tn),
                    code(&format_speed(speed))
                )))
            }
            BotCommand::Debug(args) => {
                let Some(tn) = single_argument(args) else {
                    return usage("/debug <tracking_number>");
                };
                let tn = require_tracking_number(tn)?;
                Ok(ui_builder::debug_view(&service.require_details(&tn).await?))
            }
            BotCommand::SetWebhook(args) => {
                let Some([tn, url]) = two_arguments(args) else {
                    return usage("/setwebhook <tracking_number> <url>");
                };
                let tn = require_tracking_number(tn)?;
                service.set_webhook(&tn, url).await?;
                Ok(Screen::markdown(format!(
                    "Webhook URL for {} set to {}.",
                    code(&tn),
                    code(url)
                )))
            }
            BotCommand::TestWebhook(args) => {
                let Some(tn) = single_argument(args) else {
                    return usage("/testwebhook <tracking_number>");
                };
                let tn = require_tracking_number(tn)?;
                service.send_webhook(&tn).await?;
                Ok(Screen::markdown(format!(
                    "Test webhook notification sent for {}.",
                    code(&tn)
                )))
            }
            BotCommand::Help => Ok(ui_builder::help_view()),
            BotCommand::Unknown(_) => Ok(Screen::plain(UNKNOWN_COMMAND_TEXT)),
        }
    }
}

#[async_trait]
impl CommandHandler for AdminCommands {
    async fn handle(&self, request: &CommandRequest) -> Screen {
        if request.command.requires_admin() && !self.service.admin().is_admin(request.user_id) {
            warn!(
                user_id = %request.user_id,
                command = %request.command.name(),
                "Unauthorized command attempt"
            );
            return Screen::plain(ACCESS_DENIED_TEXT);
        }

        match self.execute(request).await {
            Ok(screen) => screen,
            Err(e) => error_screen(&e, request.command.name(), request.user_id),
        }
    }
}

/// Log `error` by kind and build the reply shown to the admin.
pub(crate) fn error_screen(error: &AppError, operation: &str, user_id: i64) -> Screen {
    match error {
        AppError::Validation(_) | AppError::NotFound(_) => {
            error_logging::log_validation_error(
                error,
                operation,
                Some(user_id),
                "user_input",
                None,
            );
        }
        AppError::Database(_) => {
            error_logging::log_database_error(error, operation, Some(user_id), None);
        }
        _ => {
            error_logging::log_internal_error(error, "bot", operation, Some(user_id));
        }
    }
    Screen::markdown(error.user_message())
}

fn usage(syntax: &str) -> AppResult<Screen> {
    Ok(Screen::plain(format!("Usage: {}", syntax)))
}

/// The only argument, or `None` when there is not exactly one.
fn single_argument(args: &str) -> Option<&str> {
    let mut parts = args.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

/// Exactly two whitespace-separated arguments
fn two_arguments(args: &str) -> Option<[&str; 2]> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    match parts.as_slice() {
        [first, second] => Some([*first, *second]),
        _ => None,
    }
}
