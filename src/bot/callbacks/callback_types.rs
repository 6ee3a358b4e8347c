//! Typed callback data for inline keyboards
//!
//! Every button carries a [`CallbackAction`] encoded as colon-separated fields.
//! Telegram caps callback data at 64 bytes. Tracking numbers are at most 50
//! characters, page numbers stop at [`MAX_PAGE`] and search queries are
//! truncated, which keeps `do:{code}:{page}:{tn}` within the limit.

use std::fmt;
use std::str::FromStr;

use crate::shipments::SelectionSet;

/// Telegram's limit on callback data
pub const MAX_CALLBACK_DATA_LEN: usize = 64;
/// Longest search query carried in a pagination button, in bytes
pub const MAX_QUERY_IN_CALLBACK: usize = 32;
/// Highest page a button can point at; three digits keep picks under the cap
pub const MAX_PAGE: u32 = 999;

/// Which operation a shipment picker leads to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuPurpose {
    View,
    Update,
    Delete,
    BatchDelete,
    Broadcast,
    ToggleEmail,
    Pause,
    Resume,
    SetSpeed,
    GetSpeed,
    BulkPause,
    BulkResume,
    SetWebhook,
    TestWebhook,
    Notify,
}

impl MenuPurpose {
    pub const ALL: [MenuPurpose; 15] = [
        MenuPurpose::View,
        MenuPurpose::Update,
        MenuPurpose::Delete,
        MenuPurpose::BatchDelete,
        MenuPurpose::Broadcast,
        MenuPurpose::ToggleEmail,
        MenuPurpose::Pause,
        MenuPurpose::Resume,
        MenuPurpose::SetSpeed,
        MenuPurpose::GetSpeed,
        MenuPurpose::BulkPause,
        MenuPurpose::BulkResume,
        MenuPurpose::SetWebhook,
        MenuPurpose::TestWebhook,
        MenuPurpose::Notify,
    ];

    pub fn code(self) -> &'static str {
        match self {
            MenuPurpose::View => "view",
            MenuPurpose::Update => "upd",
            MenuPurpose::Delete => "del",
            MenuPurpose::BatchDelete => "bdel",
            MenuPurpose::Broadcast => "bcast",
            MenuPurpose::ToggleEmail => "email",
            MenuPurpose::Pause => "pause",
            MenuPurpose::Resume => "resume",
            MenuPurpose::SetSpeed => "speed",
            MenuPurpose::GetSpeed => "getspd",
            MenuPurpose::BulkPause => "bpause",
            MenuPurpose::BulkResume => "bres",
            MenuPurpose::SetWebhook => "hook",
            MenuPurpose::TestWebhook => "thook",
            MenuPurpose::Notify => "notify",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }

    /// Heading shown above the picker
    pub fn prompt(self) -> &'static str {
        match self {
            MenuPurpose::View => "Select a shipment to view",
            MenuPurpose::Update => "Select a shipment to update",
            MenuPurpose::Delete => "Select a shipment to delete",
            MenuPurpose::BatchDelete => "Select shipments to delete",
            MenuPurpose::Broadcast => "Select a shipment to broadcast",
            MenuPurpose::ToggleEmail => "Select a shipment to toggle email notifications",
            MenuPurpose::Pause => "Select a shipment to pause",
            MenuPurpose::Resume => "Select a shipment to resume",
            MenuPurpose::SetSpeed => "Select a shipment to set simulation speed",
            MenuPurpose::GetSpeed => "Select a shipment to view simulation speed",
            MenuPurpose::BulkPause => "Select shipments to pause",
            MenuPurpose::BulkResume => "Select shipments to resume",
            MenuPurpose::SetWebhook => "Select a shipment to set webhook",
            MenuPurpose::TestWebhook => "Select a shipment to test webhook",
            MenuPurpose::Notify => "Select a shipment to notify",
        }
    }

    /// Multi-select pickers keep a per-chat selection set.
    pub fn selection_set(self) -> Option<SelectionSet> {
        match self {
            MenuPurpose::BatchDelete => Some(SelectionSet::BatchDelete),
            MenuPurpose::BulkPause => Some(SelectionSet::BulkPause),
            MenuPurpose::BulkResume => Some(SelectionSet::BulkResume),
            _ => None,
        }
    }
}

fn selection_code(set: SelectionSet) -> &'static str {
    match set {
        SelectionSet::BatchDelete => "bdel",
        SelectionSet::BulkPause => "bpause",
        SelectionSet::BulkResume => "bres",
    }
}

fn selection_from_code(code: &str) -> Option<SelectionSet> {
    match code {
        "bdel" => Some(SelectionSet::BatchDelete),
        "bpause" => Some(SelectionSet::BulkPause),
        "bres" => Some(SelectionSet::BulkResume),
        _ => None,
    }
}

/// An inline-button action with its payload
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackAction {
    MainMenu { page: u32 },
    GenerateId,
    AddShipment,
    Settings,
    Help,
    Cancel,
    BulkMenu { page: u32 },
    Picker { purpose: MenuPurpose, page: u32 },
    Pick {
        purpose: MenuPurpose,
        tracking_number: String,
        page: u32,
    },
    ConfirmSelection { set: SelectionSet, page: u32 },
    SendEmail { tracking_number: String },
    SendWebhook { tracking_number: String },
    ListActive { page: u32 },
    ListPaused { page: u32 },
    Search { query: String, page: u32 },
}

/// Search query as it travels in pagination buttons.
pub fn truncate_query(query: &str) -> &str {
    truncate_bytes(query, MAX_QUERY_IN_CALLBACK)
}

/// Keep at most `max` bytes of `s` without splitting a character.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl CallbackAction {
    /// Wire form placed in `callback_data`
    pub fn to_data(&self) -> String {
        let clamp = |page: &u32| (*page).min(MAX_PAGE);
        match self {
            CallbackAction::MainMenu { page } => format!("menu:{}", clamp(page)),
            CallbackAction::GenerateId => "gen_id".to_string(),
            CallbackAction::AddShipment => "add".to_string(),
            CallbackAction::Settings => "settings".to_string(),
            CallbackAction::Help => "help".to_string(),
            CallbackAction::Cancel => "cancel".to_string(),
            CallbackAction::BulkMenu { page } => format!("bulk:{}", clamp(page)),
            CallbackAction::Picker { purpose, page } => {
                format!("pick:{}:{}", purpose.code(), clamp(page))
            }
            CallbackAction::Pick {
                purpose,
                tracking_number,
                page,
            } => format!("do:{}:{}:{}", purpose.code(), clamp(page), tracking_number),
            CallbackAction::ConfirmSelection { set, page } => {
                format!("confirm:{}:{}", selection_code(*set), clamp(page))
            }
            CallbackAction::SendEmail { tracking_number } => format!("send_email:{}", tracking_number),
            CallbackAction::SendWebhook { tracking_number } => {
                format!("send_hook:{}", tracking_number)
            }
            CallbackAction::ListActive { page } => format!("active:{}", clamp(page)),
            CallbackAction::ListPaused { page } => format!("paused:{}", clamp(page)),
            CallbackAction::Search { query, page } => format!(
                "search:{}:{}",
                clamp(page),
                truncate_query(query)
            ),
        }
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_data())
    }
}

/// Callback data that matches no known action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCallback(pub String);

impl fmt::Display for InvalidCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid callback data: {}", self.0)
    }
}

impl std::error::Error for InvalidCallback {}

fn parse_page(raw: &str) -> Option<u32> {
    raw.parse::<u32>()
        .ok()
        .filter(|p| (1..=MAX_PAGE).contains(p))
}

impl FromStr for CallbackAction {
    type Err = InvalidCallback;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidCallback(data.to_string());
        let (tag, rest) = data.split_once(':').unwrap_or((data, ""));

        let action = match tag {
            "gen_id" if rest.is_empty() => CallbackAction::GenerateId,
            "add" if rest.is_empty() => CallbackAction::AddShipment,
            "settings" if rest.is_empty() => CallbackAction::Settings,
            "help" if rest.is_empty() => CallbackAction::Help,
            "cancel" if rest.is_empty() => CallbackAction::Cancel,
            "menu" => CallbackAction::MainMenu {
                page: parse_page(rest).ok_or_else(invalid)?,
            },
            "bulk" => CallbackAction::BulkMenu {
                page: parse_page(rest).ok_or_else(invalid)?,
            },
            "active" => CallbackAction::ListActive {
                page: parse_page(rest).ok_or_else(invalid)?,
            },
            "paused" => CallbackAction::ListPaused {
                page: parse_page(rest).ok_or_else(invalid)?,
            },
            "pick" => {
                let (code, page) = rest.split_once(':').ok_or_else(invalid)?;
                CallbackAction::Picker {
                    purpose: MenuPurpose::from_code(code).ok_or_else(invalid)?,
                    page: parse_page(page).ok_or_else(invalid)?,
                }
            }
            "do" => {
                let mut fields = rest.splitn(3, ':');
                let purpose = fields
                    .next()
                    .and_then(MenuPurpose::from_code)
                    .ok_or_else(invalid)?;
                let page = fields.next().and_then(parse_page).ok_or_else(invalid)?;
                let tracking_number = fields.next().filter(|tn| !tn.is_empty()).ok_or_else(invalid)?;
                CallbackAction::Pick {
                    purpose,
                    tracking_number: tracking_number.to_string(),
                    page,
                }
            }
            "confirm" => {
                let (code, page) = rest.split_once(':').ok_or_else(invalid)?;
                CallbackAction::ConfirmSelection {
                    set: selection_from_code(code).ok_or_else(invalid)?,
                    page: parse_page(page).ok_or_else(invalid)?,
                }
            }
            "send_email" if !rest.is_empty() => CallbackAction::SendEmail {
                tracking_number: rest.to_string(),
            },
            "send_hook" if !rest.is_empty() => CallbackAction::SendWebhook {
                tracking_number: rest.to_string(),
            },
            "search" => {
                let (page, query) = rest.split_once(':').ok_or_else(invalid)?;
                CallbackAction::Search {
                    query: query.to_string(),
                    page: parse_page(page).ok_or_else(invalid)?,
                }
            }
            _ => return Err(invalid()),
        };
        Ok(action)
    }
}
