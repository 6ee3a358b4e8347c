//! Pending-input dialogue for prompts that wait on the admin's next message.

use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

/// What the next plain-text message from a chat should be read as
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum AdminDialogueState {
    #[default]
    Idle,
    AwaitingNewShipment {
        menu_page: u32,
    },
    AwaitingShipmentUpdate {
        tracking_number: String,
        menu_page: u32,
    },
    AwaitingSpeed {
        tracking_number: String,
        menu_page: u32,
    },
    AwaitingWebhook {
        tracking_number: String,
        menu_page: u32,
    },
}

impl AdminDialogueState {
    pub fn is_idle(&self) -> bool {
        matches!(self, AdminDialogueState::Idle)
    }

    /// Main-menu page to return to once the input is handled
    pub fn menu_page(&self) -> u32 {
        match self {
            AdminDialogueState::Idle => 1,
            AdminDialogueState::AwaitingNewShipment { menu_page }
            | AdminDialogueState::AwaitingShipmentUpdate { menu_page, .. }
            | AdminDialogueState::AwaitingSpeed { menu_page, .. }
            | AdminDialogueState::AwaitingWebhook { menu_page, .. } => *menu_page,
        }
    }
}

/// Type alias for the admin dialogue
pub type AdminDialogue = Dialogue<AdminDialogueState, InMemStorage<AdminDialogueState>>;
