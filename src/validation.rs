//! Validation module for admin input
//!
//! Everything typed into the bot passes through here before it reaches the
//! store or the database:
//!
//! - Tracking numbers
//! - Free-text arguments and search queries
//! - Simulation speed multipliers
//! - Recipient emails and webhook URLs
//! - Statuses and route locations
//! - Quoted argument lists for the add/update prompts

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::{AppError, AppResult};

/// Slowest allowed simulation speed multiplier
pub const MIN_SPEED: f64 = 0.1;
/// Fastest allowed simulation speed multiplier
pub const MAX_SPEED: f64 = 10.0;

const MAX_TRACKING_NUMBER_LEN: usize = 50;
const MAX_INPUT_LEN: usize = 500;
const MAX_WEBHOOK_URL_LEN: usize = 200;

lazy_static! {
    static ref TRACKING_NUMBER_PATTERN: Regex =
        Regex::new(r"^[A-Z0-9-]+$").expect("Invalid tracking number regex pattern");
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
            .expect("Invalid email regex pattern");
}

/// Strip markup and control characters from free text and cap its length.
///
/// # Examples
/// ```
/// use shipment_admin_bot::validation::sanitize_input;
///
/// assert_eq!(sanitize_input("  <b>Lagos</b>\u{0007} "), "bLagos/b");
/// ```
pub fn sanitize_input(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(|c| !c.is_control() && *c != '<' && *c != '>')
        .take(MAX_INPUT_LEN)
        .collect()
}

/// Normalize a tracking number: trimmed, uppercased, `[A-Z0-9-]`, at most 50 chars.
///
/// # Examples
/// ```
/// use shipment_admin_bot::validation::sanitize_tracking_number;
///
/// assert_eq!(sanitize_tracking_number(" trk123 "), Some("TRK123".to_string()));
/// assert_eq!(sanitize_tracking_number("TRK 123"), None);
/// assert_eq!(sanitize_tracking_number(""), None);
/// ```
pub fn sanitize_tracking_number(input: &str) -> Option<String> {
    let candidate = input.trim().to_uppercase();
    if candidate.is_empty() || candidate.len() > MAX_TRACKING_NUMBER_LEN {
        return None;
    }
    TRACKING_NUMBER_PATTERN
        .is_match(&candidate)
        .then_some(candidate)
}

/// Parse a simulation speed multiplier in `[0.1, 10.0]`.
///
/// # Examples
/// ```
/// use shipment_admin_bot::validation::parse_speed;
///
/// assert_eq!(parse_speed("2.5").unwrap(), 2.5);
/// assert!(parse_speed("11").is_err());
/// assert!(parse_speed("fast").is_err());
/// ```
pub fn parse_speed(input: &str) -> AppResult<f64> {
    let speed: f64 = input.trim().parse().map_err(|_| {
        AppError::Validation("Speed must be a number between 0.1 and 10.0.".to_string())
    })?;
    if !speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        return Err(AppError::Validation(
            "Speed must be between 0.1 and 10.0.".to_string(),
        ));
    }
    Ok(speed)
}

pub fn validate_email(email: &str) -> bool {
    email.len() <= 120 && EMAIL_PATTERN.is_match(email)
}

/// An absolute http(s) URL with a host.
///
/// # Examples
/// ```
/// use shipment_admin_bot::validation::validate_webhook_url;
///
/// assert!(validate_webhook_url("https://example.com/hooks/shipments"));
/// assert!(!validate_webhook_url("ftp://example.com"));
/// assert!(!validate_webhook_url("not a url"));
/// ```
pub fn validate_webhook_url(url: &str) -> bool {
    if url.len() > MAX_WEBHOOK_URL_LEN {
        return false;
    }
    match reqwest::Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

pub fn validate_status(status: &str, valid_statuses: &[String]) -> bool {
    valid_statuses.iter().any(|s| s == status)
}

/// Locations must name a configured route template.
pub fn validate_location(location: &str, route_templates: &BTreeMap<String, Vec<String>>) -> bool {
    route_templates.contains_key(location)
}

/// Split a line into arguments the way a POSIX shell would: whitespace
/// separates, single quotes are literal, double quotes allow `\"`, a backslash
/// outside quotes escapes the next character.
///
/// # Examples
/// ```
/// use shipment_admin_bot::validation::split_arguments;
///
/// let parts = split_arguments(r#"TRK1 Pending 'Lagos, NG' "a b""#).unwrap();
/// assert_eq!(parts, vec!["TRK1", "Pending", "Lagos, NG", "a b"]);
/// assert!(split_arguments("TRK1 'unclosed").is_err());
/// ```
pub fn split_arguments(input: &str) -> Result<Vec<String>, &'static str> {
    #[derive(PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                } else {
                    current.push(c);
                }
            }
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\')) => current.push(next),
                    Some(next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => return Err("trailing backslash"),
                },
                _ => current.push(c),
            },
            Quote::None => match c {
                '\'' => {
                    quote = Quote::Single;
                    in_word = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_word = true;
                }
                '\\' => {
                    let next = chars.next().ok_or("trailing backslash")?;
                    current.push(next);
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        args.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if quote != Quote::None {
        return Err("unclosed quote");
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}

/// Fields typed into the add-shipment prompt
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentInput {
    pub tracking_number: String,
    pub status: String,
    pub delivery_location: String,
    pub recipient_email: Option<String>,
    pub origin_location: Option<String>,
    pub webhook_url: Option<String>,
}

pub const ADD_SHIPMENT_USAGE: &str = "Usage: tracking_number status delivery_location [recipient_email] [origin_location] [webhook_url]\nExample: TRK20231010120000ABC123 Pending 'Lagos, NG' user@example.com 'Abuja, NG' https://example.com";
pub const UPDATE_SHIPMENT_USAGE: &str = "Usage: status delivery_location [recipient_email] [origin_location] [webhook_url]\nExample: In_Transit 'Lagos, NG' user@example.com";

fn optional(parts: &[String], index: usize) -> Option<String> {
    parts
        .get(index)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse `tracking_number status delivery_location [email] [origin] [webhook]`.
pub fn parse_shipment_input(input: &str) -> AppResult<ShipmentInput> {
    let parts = split_arguments(&sanitize_input(input))
        .map_err(|e| AppError::Validation(format!("Could not parse input: {}.", e)))?;
    if parts.len() < 3 {
        return Err(AppError::Validation(format!(
            "Please provide at least: tracking_number status delivery_location\n{}",
            ADD_SHIPMENT_USAGE
        )));
    }
    Ok(ShipmentInput {
        tracking_number: parts[0].clone(),
        status: parts[1].clone(),
        delivery_location: parts[2].clone(),
        recipient_email: optional(&parts, 3),
        origin_location: optional(&parts, 4),
        webhook_url: optional(&parts, 5),
    })
}

/// Parse `status delivery_location [email] [origin] [webhook]` for an existing shipment.
pub fn parse_shipment_update(tracking_number: &str, input: &str) -> AppResult<ShipmentInput> {
    let parts = split_arguments(&sanitize_input(input))
        .map_err(|e| AppError::Validation(format!("Could not parse input: {}.", e)))?;
    if parts.len() < 2 {
        return Err(AppError::Validation(format!(
            "Please provide at least: status delivery_location\n{}",
            UPDATE_SHIPMENT_USAGE
        )));
    }
    Ok(ShipmentInput {
        tracking_number: tracking_number.to_string(),
        status: parts[0].clone(),
        delivery_location: parts[1].clone(),
        recipient_email: optional(&parts, 2),
        origin_location: optional(&parts, 3),
        webhook_url: optional(&parts, 4),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_number_rules() {
        assert_eq!(
            sanitize_tracking_number("TRK20231010120000ABC123"),
            Some("TRK20231010120000ABC123".to_string())
        );
        assert_eq!(sanitize_tracking_number("abc-1"), Some("ABC-1".to_string()));
        assert_eq!(sanitize_tracking_number(&"A".repeat(50)).map(|s| s.len()), Some(50));
        assert_eq!(sanitize_tracking_number(&"A".repeat(51)), None);
        assert_eq!(sanitize_tracking_number("TRK_1"), None);
        assert_eq!(sanitize_tracking_number("TRK:1"), None);
        assert_eq!(sanitize_tracking_number("   "), None);
    }

    #[test]
    fn test_speed_bounds() {
        assert_eq!(parse_speed("0.1").unwrap(), 0.1);
        assert_eq!(parse_speed("10").unwrap(), 10.0);
        assert_eq!(
            parse_speed("0.09").unwrap_err(),
            AppError::Validation("Speed must be between 0.1 and 10.0.".to_string())
        );
        assert_eq!(
            parse_speed("abc").unwrap_err(),
            AppError::Validation("Speed must be a number between 0.1 and 10.0.".to_string())
        );
        assert!(parse_speed("NaN").is_err());
        assert!(parse_speed("inf").is_err());
    }

    #[test]
    fn test_email_and_url() {
        assert!(validate_email("user@example.com"));
        assert!(!validate_email("user@"));
        assert!(!validate_email("user example.com"));

        assert!(validate_webhook_url("http://localhost:8080/hook"));
        assert!(!validate_webhook_url("https://"));
        assert!(!validate_webhook_url("javascript:alert(1)"));
        assert!(!validate_webhook_url(&format!("https://e.com/{}", "a".repeat(200))));
    }

    #[test]
    fn test_status_and_location() {
        let statuses = vec!["Pending".to_string(), "Delivered".to_string()];
        assert!(validate_status("Pending", &statuses));
        assert!(!validate_status("pending", &statuses));

        let routes = BTreeMap::from([("Lagos, NG".to_string(), vec!["Lagos, NG".to_string()])]);
        assert!(validate_location("Lagos, NG", &routes));
        assert!(!validate_location("Lagos", &routes));
    }

    #[test]
    fn test_split_arguments_escapes() {
        assert_eq!(split_arguments("").unwrap(), Vec::<String>::new());
        assert_eq!(split_arguments("  a   b ").unwrap(), vec!["a", "b"]);
        assert_eq!(split_arguments(r"a\ b").unwrap(), vec!["a b"]);
        assert_eq!(split_arguments(r#""say \"hi\"""#).unwrap(), vec![r#"say "hi""#]);
        assert_eq!(split_arguments("''").unwrap(), vec![""]);
        assert!(split_arguments("a\\").is_err());
    }

    #[test]
    fn test_parse_shipment_input() {
        let input = parse_shipment_input(
            "TRK1 Pending 'Lagos, NG' user@example.com 'Abuja, NG' https://example.com/hook",
        )
        .unwrap();
        assert_eq!(input.tracking_number, "TRK1");
        assert_eq!(input.delivery_location, "Lagos, NG");
        assert_eq!(input.recipient_email.as_deref(), Some("user@example.com"));
        assert_eq!(input.origin_location.as_deref(), Some("Abuja, NG"));
        assert_eq!(input.webhook_url.as_deref(), Some("https://example.com/hook"));

        let short = parse_shipment_input("TRK1 Pending").unwrap_err();
        assert!(short.user_message().starts_with("Please provide at least"));
    }

    #[test]
    fn test_parse_shipment_update() {
        let input = parse_shipment_update("TRK1", "Delayed 'Lagos, NG'").unwrap();
        assert_eq!(input.tracking_number, "TRK1");
        assert_eq!(input.status, "Delayed");
        assert!(input.recipient_email.is_none());
        assert!(parse_shipment_update("TRK1", "Delayed").is_err());
    }
}
