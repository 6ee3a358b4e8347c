//! UI Builder module for creating keyboards and formatting messages

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::bot::callbacks::callback_types::{CallbackAction, MenuPurpose, MAX_PAGE};
use crate::cache::ShipmentDetails;
use crate::db::{ShipmentPage, PAGE_SIZE};
use crate::shipments::{SelectionSet, ShipmentStats};

pub const RATE_LIMITED_TEXT: &str = "Rate limit exceeded. Please try again later.";
pub const ACCESS_DENIED_TEXT: &str = "Access denied.";
pub const INVALID_ACTION_TEXT: &str = "Invalid action.";
pub const SETTINGS_TEXT: &str = "Settings not implemented yet.";
pub const NO_SHIPMENTS_TEXT: &str = "No shipments available.";
/// Markdown-escaped; sent with [`input_prompt`]
pub const ADD_SHIPMENT_PROMPT: &str = "Enter shipment details (tracking\\_number status delivery\\_location \\[recipient\\_email] \\[origin\\_location] \\[webhook\\_url]):";

pub const HELP_TEXT: &str = "Help Menu\n\
Available commands:\n\
/start or /menu - Show main menu\n\
/myid - Get your Telegram ID\n\
/track <tracking_number> - Track a shipment\n\
/stats - View system statistics\n\
/notify <tracking_number> - Send manual notification\n\
/search <query> - Search shipments\n\
/bulk_action - Perform bulk operations\n\
/stop <tracking_number> - Pause simulation\n\
/continue <tracking_number> - Resume simulation\n\
/setspeed <tracking_number> <speed> - Set simulation speed\n\
/getspeed <tracking_number> - View simulation speed\n\
/debug <tracking_number> - Show the full shipment record\n\
/setwebhook <tracking_number> <url> - Set webhook URL\n\
/testwebhook <tracking_number> - Send a test webhook\n\
/help - Show this message\n\
Example: /track TRK20231010120000ABC123\n\
Example: /setspeed TRK20231010120000ABC123 2.0";

/// A message body with its keyboard, ready to send or edit in place
#[derive(Debug, Clone, PartialEq)]
pub struct Screen {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
    /// Parse `text` as Telegram Markdown
    pub markdown: bool,
}

impl Screen {
    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            markdown: true,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            markdown: false,
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboardMarkup) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    /// Callback data of every button, row by row
    pub fn button_data(&self) -> Vec<String> {
        use teloxide::types::InlineKeyboardButtonKind;
        self.keyboard
            .iter()
            .flat_map(|k| k.inline_keyboard.iter().flatten())
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Labels of every button, row by row
    pub fn button_labels(&self) -> Vec<String> {
        self.keyboard
            .iter()
            .flat_map(|k| k.inline_keyboard.iter().flatten())
            .map(|b| b.text.clone())
            .collect()
    }
}

/// Inline code span; backticks inside would end the entity early.
pub fn code(value: &str) -> String {
    format!("`{}`", value.replace('`', "'"))
}

/// Drop characters that open Markdown entities.
fn strip_markdown(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '`' | '['))
        .collect()
}

/// `2.0x`, `0.5x`
pub fn format_speed(speed: f64) -> String {
    if speed.fract() == 0.0 {
        format!("{:.1}x", speed)
    } else {
        format!("{}x", speed)
    }
}

fn button(label: impl Into<String>, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label.into(), action.to_data())
}

fn home_button() -> InlineKeyboardButton {
    button("Home", CallbackAction::MainMenu { page: 1 })
}

/// Previous/Next row, only when the result set spans more than one page.
fn nav_row(
    page: u32,
    total: u64,
    target: impl Fn(u32) -> CallbackAction,
) -> Option<Vec<InlineKeyboardButton>> {
    if total <= PAGE_SIZE as u64 {
        return None;
    }
    let mut row = Vec::new();
    if page > 1 {
        row.push(button("Previous", target(page - 1)));
    }
    if page < MAX_PAGE && (page as u64) * (PAGE_SIZE as u64) < total {
        row.push(button("Next", target(page + 1)));
    }
    (!row.is_empty()).then_some(row)
}

/// Lay buttons out two per row.
fn pairs(buttons: Vec<InlineKeyboardButton>) -> Vec<Vec<InlineKeyboardButton>> {
    buttons.chunks(2).map(|c| c.to_vec()).collect()
}

/// Main admin menu
pub fn main_menu(page: u32, total: u64) -> Screen {
    let mut rows = vec![vec![
        button("Generate ID", CallbackAction::GenerateId),
        button("Add Shipment", CallbackAction::AddShipment),
    ]];

    if total > 0 {
        let picker = |label: &str, purpose| vec![button(label, CallbackAction::Picker { purpose, page })];
        rows.push(picker("View Shipment", MenuPurpose::View));
        rows.push(picker("Update Shipment", MenuPurpose::Update));
        rows.push(picker("Delete Shipment", MenuPurpose::Delete));
        rows.push(picker("Batch Delete", MenuPurpose::BatchDelete));
        rows.push(picker("Trigger Broadcast", MenuPurpose::Broadcast));
        rows.push(picker("Toggle Email", MenuPurpose::ToggleEmail));
        rows.push(picker("Pause Simulation", MenuPurpose::Pause));
        rows.push(picker("Resume Simulation", MenuPurpose::Resume));
        rows.push(picker("Set Sim Speed", MenuPurpose::SetSpeed));
        rows.push(picker("View Sim Speed", MenuPurpose::GetSpeed));
        rows.push(vec![button("Bulk Actions", CallbackAction::BulkMenu { page })]);
        rows.push(picker("Set Webhook", MenuPurpose::SetWebhook));
        rows.push(picker("Test Webhook", MenuPurpose::TestWebhook));
        if let Some(nav) = nav_row(page, total, |page| CallbackAction::MainMenu { page }) {
            rows.push(nav);
        }
        rows.push(vec![button(
            "List Shipments",
            CallbackAction::Picker {
                purpose: MenuPurpose::View,
                page,
            },
        )]);
    }

    rows.push(vec![
        button("Settings", CallbackAction::Settings),
        button("Help", CallbackAction::Help),
        button("Cancel", CallbackAction::Cancel),
    ]);

    Screen::markdown(format!(
        "*Choose an action (Page {})*\nAvailable shipments: {}",
        page, total
    ))
    .with_keyboard(InlineKeyboardMarkup::new(rows))
}

/// One page of shipments, each button leading to `purpose`.
///
/// Multi-select pickers mark members of `selected` with ✅ and add a confirm
/// button.
pub fn shipment_picker(
    purpose: MenuPurpose,
    page: u32,
    shipments: &ShipmentPage,
    selected: &[String],
) -> Screen {
    if shipments.tracking_numbers.is_empty() {
        return Screen::plain(NO_SHIPMENTS_TEXT)
            .with_keyboard(InlineKeyboardMarkup::new(vec![vec![home_button()]]));
    }

    let mut rows: Vec<Vec<InlineKeyboardButton>> = shipments
        .tracking_numbers
        .iter()
        .map(|tn| {
            let label = if selected.contains(tn) {
                format!("✅ {}", tn)
            } else {
                tn.clone()
            };
            vec![button(
                label,
                CallbackAction::Pick {
                    purpose,
                    tracking_number: tn.clone(),
                    page,
                },
            )]
        })
        .collect();

    if let Some(nav) = nav_row(page, shipments.total, |page| CallbackAction::Picker { purpose, page }) {
        rows.push(nav);
    }

    let confirm = |label: &str, set: SelectionSet| button(label, CallbackAction::ConfirmSelection { set, page });
    rows.push(match purpose.selection_set() {
        Some(set @ SelectionSet::BatchDelete) => vec![
            confirm("Confirm Delete", set),
            button("Back", CallbackAction::MainMenu { page: 1 }),
        ],
        Some(set @ SelectionSet::BulkPause) => vec![confirm("Confirm Pause", set), home_button()],
        Some(set @ SelectionSet::BulkResume) => vec![confirm("Confirm Resume", set), home_button()],
        None => vec![button("Back", CallbackAction::MainMenu { page }), home_button()],
    });

    Screen::markdown(format!(
        "*{}* (Page {}, {} total):",
        purpose.prompt(),
        page,
        shipments.total
    ))
    .with_keyboard(InlineKeyboardMarkup::new(rows))
}

/// Read-only list whose buttons open the details view.
fn shipment_list(
    title: &str,
    page: u32,
    shipments: &ShipmentPage,
    target: impl Fn(u32) -> CallbackAction,
) -> Screen {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = shipments
        .tracking_numbers
        .iter()
        .map(|tn| {
            vec![button(
                tn.clone(),
                CallbackAction::Pick {
                    purpose: MenuPurpose::View,
                    tracking_number: tn.clone(),
                    page: 1,
                },
            )]
        })
        .collect();
    if let Some(nav) = nav_row(page, shipments.total, target) {
        rows.push(nav);
    }
    rows.push(vec![button("Back", CallbackAction::MainMenu { page: 1 })]);

    Screen::markdown(format!(
        "*{}* (Page {}, {} total):",
        title, page, shipments.total
    ))
    .with_keyboard(InlineKeyboardMarkup::new(rows))
}

pub fn active_list(page: u32, shipments: &ShipmentPage) -> Screen {
    shipment_list("Active Shipments", page, shipments, |page| {
        CallbackAction::ListActive { page }
    })
}

pub fn paused_list(page: u32, shipments: &ShipmentPage) -> Screen {
    shipment_list("Paused Shipments", page, shipments, |page| {
        CallbackAction::ListPaused { page }
    })
}

pub fn search_results(query: &str, page: u32, shipments: &ShipmentPage) -> Screen {
    if shipments.tracking_numbers.is_empty() {
        let text = if page == 1 {
            format!("No shipments found for query: {}", code(query))
        } else {
            format!("No more shipments found for query: {}", code(query))
        };
        return Screen::markdown(text)
            .with_keyboard(InlineKeyboardMarkup::new(vec![vec![home_button()]]));
    }
    let title = format!("Search Results for '{}'", strip_markdown(query));
    shipment_list(&title, page, shipments, |page| CallbackAction::Search {
        query: query.to_string(),
        page,
    })
}

/// Controls under a shipment: simulation buttons while it is still moving,
/// then notifications and navigation.
pub fn shipment_controls(details: &ShipmentDetails, page: u32) -> InlineKeyboardMarkup {
    let tn = details.tracking_number().to_string();
    let pick = |purpose| CallbackAction::Pick {
        purpose,
        tracking_number: tn.clone(),
        page,
    };

    let mut buttons = Vec::new();
    if !details.is_completed() {
        if details.paused {
            buttons.push(button("Resume", pick(MenuPurpose::Resume)));
        } else {
            buttons.push(button("Pause", pick(MenuPurpose::Pause)));
        }
        buttons.push(button("Set Speed", pick(MenuPurpose::SetSpeed)));
    }
    buttons.push(button("Broadcast", pick(MenuPurpose::Broadcast)));
    buttons.push(button("Notify", pick(MenuPurpose::Notify)));
    buttons.push(button("Set Webhook", pick(MenuPurpose::SetWebhook)));
    buttons.push(button("Test Webhook", pick(MenuPurpose::TestWebhook)));
    buttons.push(home_button());

    InlineKeyboardMarkup::new(pairs(buttons))
}

fn summary_lines(details: &ShipmentDetails) -> Vec<String> {
    let shipment = &details.shipment;
    vec![
        format!("*Shipment*: {}", code(&shipment.tracking_number)),
        format!("*Status*: {}", code(&shipment.status)),
        format!("*Paused*: {}", code(&details.paused.to_string())),
        format!(
            "*Speed Multiplier*: {}",
            code(&format_speed(details.speed_multiplier))
        ),
        format!("*Delivery Location*: {}", code(&shipment.delivery_location)),
    ]
}

fn checkpoints_line(details: &ShipmentDetails) -> String {
    let checkpoints = &details.shipment.checkpoints;
    let shown = if checkpoints.is_empty() {
        "None"
    } else {
        checkpoints.as_str()
    };
    format!("*Checkpoints*: {}", code(shown))
}

/// `/track` reply
pub fn track_summary(details: &ShipmentDetails) -> Screen {
    let mut lines = summary_lines(details);
    lines.push(checkpoints_line(details));
    Screen::markdown(lines.join("\n")).with_keyboard(shipment_controls(details, 1))
}

fn full_record_lines(details: &ShipmentDetails) -> Vec<String> {
    let shipment = &details.shipment;
    let mut lines = summary_lines(details);
    lines.push(format!("*Origin Location*: {}", code(&shipment.origin_location)));
    lines.push(format!(
        "*Recipient Email*: {}",
        code(shipment.recipient_email.as_deref().unwrap_or("None"))
    ));
    lines.push(checkpoints_line(details));
    lines.push(format!(
        "*Webhook URL*: {}",
        code(shipment.webhook_url.as_deref().unwrap_or("Default"))
    ));
    lines.push(format!(
        "*Email Notifications*: {}",
        code(if shipment.email_notifications {
            "Enabled"
        } else {
            "Disabled"
        })
    ));
    lines.push(format!(
        "*Last Updated*: {}",
        code(&shipment.last_updated.format("%Y-%m-%d %H:%M:%S UTC").to_string())
    ));
    lines
}

/// Full details view opened from a picker
pub fn details_view(details: &ShipmentDetails, page: u32) -> Screen {
    Screen::markdown(full_record_lines(details).join("\n"))
        .with_keyboard(shipment_controls(details, page))
}

/// `/debug` reply: every stored field including the creation time
pub fn debug_view(details: &ShipmentDetails) -> Screen {
    let mut lines = vec!["*Debug Info*".to_string()];
    lines.extend(full_record_lines(details));
    lines.push(format!(
        "*Created At*: {}",
        code(
            &details
                .shipment
                .created_at
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string()
        )
    ));
    Screen::markdown(lines.join("\n"))
        .with_keyboard(InlineKeyboardMarkup::new(vec![vec![home_button()]]))
}

pub fn stats_view(stats: &ShipmentStats) -> Screen {
    let text = format!(
        "*System Statistics*\n*Total Shipments*: {}\n*Active Shipments*: {}\n*Paused Simulations*: {}\n*Notification Queue Length*: {}",
        code(&stats.total.to_string()),
        code(&stats.active.to_string()),
        code(&stats.paused.to_string()),
        code(&stats.queue_length.to_string()),
    );
    let buttons = vec![
        button("Active Shipments", CallbackAction::ListActive { page: 1 }),
        button("Paused Shipments", CallbackAction::ListPaused { page: 1 }),
        button(
            "All Shipments",
            CallbackAction::Picker {
                purpose: MenuPurpose::View,
                page: 1,
            },
        ),
        home_button(),
    ];
    Screen::markdown(text).with_keyboard(InlineKeyboardMarkup::new(pairs(buttons)))
}

/// Email and webhook choices for one shipment
pub fn notify_options(details: &ShipmentDetails, has_default_webhook: bool) -> Screen {
    let shipment = &details.shipment;
    let tn = shipment.tracking_number.clone();
    let mut rows = Vec::new();
    if shipment.recipient_email.is_some() && shipment.email_notifications {
        rows.push(vec![button(
            "Send Email",
            CallbackAction::SendEmail {
                tracking_number: tn.clone(),
            },
        )]);
    }
    if shipment.webhook_url.is_some() || has_default_webhook {
        rows.push(vec![button(
            "Send Webhook",
            CallbackAction::SendWebhook {
                tracking_number: tn.clone(),
            },
        )]);
    }
    rows.push(vec![home_button()]);
    Screen::markdown(format!("Select notification type for {}:", code(&tn)))
        .with_keyboard(InlineKeyboardMarkup::new(rows))
}

pub fn bulk_menu(page: u32) -> Screen {
    let buttons = vec![
        button(
            "Bulk Pause",
            CallbackAction::Picker {
                purpose: MenuPurpose::BulkPause,
                page,
            },
        ),
        button(
            "Bulk Resume",
            CallbackAction::Picker {
                purpose: MenuPurpose::BulkResume,
                page,
            },
        ),
        button(
            "Bulk Delete",
            CallbackAction::Picker {
                purpose: MenuPurpose::BatchDelete,
                page,
            },
        ),
        home_button(),
    ];
    Screen::markdown("*Select bulk action*:").with_keyboard(InlineKeyboardMarkup::new(pairs(buttons)))
}

pub fn help_view() -> Screen {
    Screen::plain(HELP_TEXT).with_keyboard(InlineKeyboardMarkup::new(vec![vec![home_button()]]))
}

/// Prompt shown while waiting for typed input, with a way back
pub fn input_prompt(text: impl Into<String>) -> Screen {
    Screen::markdown(text).with_keyboard(InlineKeyboardMarkup::new(vec![vec![button(
        "Cancel",
        CallbackAction::MainMenu { page: 1 },
    )]]))
}

pub fn update_prompt(tracking_number: &str) -> String {
    format!(
        "Enter updated details for {} (status delivery\\_location \\[recipient\\_email] \\[origin\\_location] \\[webhook\\_url]):",
        code(tracking_number)
    )
}

pub fn speed_prompt(tracking_number: &str) -> String {
    format!(
        "Enter simulation speed for {} (0.1 to 10.0):",
        code(tracking_number)
    )
}

pub fn webhook_prompt(tracking_number: &str) -> String {
    format!("Enter webhook URL for {}:", code(tracking_number))
}
