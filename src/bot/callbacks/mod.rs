//! Callbacks module for handling all inline keyboard callback queries
//!
//! This module is organized into submodules for different types of callbacks:
//! - `callback_handler`: Access check, routing and applying the outcome to the chat
//! - `callback_types`: Typed callback data and its wire encoding
//! - `menu_callbacks`: Main menu, pickers, lists and prompts
//! - `shipment_callbacks`: Actions on a single shipment
//! - `selection_callbacks`: Multi-select toggles and bulk confirmations

pub mod callback_handler;
pub mod callback_types;
pub mod menu_callbacks;
pub mod selection_callbacks;
pub mod shipment_callbacks;

use crate::bot::ui_builder::Screen;
use crate::dialogue::AdminDialogueState;

/// What answering one callback does to the chat
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackOutcome {
    /// Text for the callback answer toast
    pub notice: Option<String>,
    /// Show `notice` as a modal alert instead of a toast
    pub show_alert: bool,
    /// Replaces the message the button was on
    pub screen: Option<Screen>,
    /// Sent as a new message below
    pub reply: Option<Screen>,
    pub next_state: Option<AdminDialogueState>,
    pub delete_message: bool,
}

impl CallbackOutcome {
    pub fn screen(screen: Screen) -> Self {
        Self {
            screen: Some(screen),
            ..Self::default()
        }
    }

    /// Toast only. Backticks are dropped since answers are plain text.
    pub fn notice(text: impl Into<String>) -> Self {
        Self {
            notice: Some(plain_notice(text.into())),
            ..Self::default()
        }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            show_alert: true,
            ..Self::notice(text)
        }
    }

    pub fn with_notice(mut self, text: impl Into<String>) -> Self {
        self.notice = Some(plain_notice(text.into()));
        self
    }

    pub fn with_screen(mut self, screen: Screen) -> Self {
        self.screen = Some(screen);
        self
    }

    pub fn with_state(mut self, state: AdminDialogueState) -> Self {
        self.next_state = Some(state);
        self
    }
}

fn plain_notice(text: String) -> String {
    text.replace('`', "")
}
