//! Tolerant parsing of moderation report payloads.
//!
//! Report shapes coming off the API vary: mod reports are usually
//! `[reason, moderator]` pairs and user reports `[reason, count]` pairs,
//! but counts show up as strings, pairs arrive truncated, and whole
//! items degenerate to bare strings. Malformed items map to an explicit
//! "Unprocessable report" entry that still counts once, never an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder reason recorded for a report item that fit no known shape.
pub const UNPROCESSABLE_REPORT: &str = "Unprocessable report";

/// Normalized view of a submission's reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReportSummary {
    /// Total report count (moderator reports count one each, user
    /// reports contribute their per-reason counts).
    pub count: u32,
    /// Human-readable formatted reasons.
    pub reasons: Vec<String>,
}

impl ReportSummary {
    /// Summary with no reports.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Normalize raw mod/user report arrays into a [`ReportSummary`].
///
/// `mod_reports` items are expected as `[reason, moderator]`,
/// `user_reports` items as `[reason, count]`; anything else is mapped to
/// [`UNPROCESSABLE_REPORT`] with a count of one.
#[must_use]
pub fn parse_reports(mod_reports: &Value, user_reports: &Value) -> ReportSummary {
    let mut reasons = Vec::new();
    let mut count: u32 = 0;

    for item in as_items(mod_reports) {
        match parse_pair(item) {
            Some((reason, second)) => {
                let moderator = value_text(second).unwrap_or_else(|| "unknown".to_string());
                reasons.push(format!("Moderator {moderator}: {reason}"));
                count += 1;
            }
            None => {
                log::error!("Unrecognized mod report shape: {item}");
                reasons.push(UNPROCESSABLE_REPORT.to_string());
                count += 1;
            }
        }
    }

    for item in as_items(user_reports) {
        match parse_pair(item) {
            Some((reason, second)) => match second.as_u64() {
                Some(n) => {
                    let n = u32::try_from(n).unwrap_or(u32::MAX);
                    if n > 1 {
                        reasons.push(format!("Users ({n}): {reason}"));
                    } else {
                        reasons.push(format!("User: {reason}"));
                    }
                    count = count.saturating_add(n.max(1));
                }
                None => {
                    // Count came in as a string or some other shape;
                    // keep the reason, count the report once.
                    let suffix = value_text(second)
                        .map(|s| format!(" ({s})"))
                        .unwrap_or_default();
                    reasons.push(format!("User: {reason}{suffix}"));
                    count += 1;
                }
            },
            None => {
                if let Some(text) = value_text(item) {
                    reasons.push(format!("Report: {text}"));
                } else {
                    log::error!("Unrecognized user report shape: {item}");
                    reasons.push(UNPROCESSABLE_REPORT.to_string());
                }
                count += 1;
            }
        }
    }

    ReportSummary { count, reasons }
}

/// View a payload as a list of report items; non-arrays have none.
fn as_items(value: &Value) -> &[Value] {
    value.as_array().map_or(&[], Vec::as_slice)
}

/// Split a `[reason, x, ...]` item into its reason text and second slot.
fn parse_pair(item: &Value) -> Option<(String, &Value)> {
    let arr = item.as_array()?;
    if arr.len() < 2 {
        return None;
    }
    let reason = value_text(&arr[0])?;
    Some((reason, &arr[1]))
}

/// Render a scalar JSON value as display text.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
