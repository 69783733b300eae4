//! Message formatting — turns a completed trade record into the chat
//! summary, the forum post title, and the forum post body.

use serde::{Deserialize, Serialize};

use super::model::TradeRecord;

/// The three strings shown for review and used when publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedMission {
    /// Paste-ready chat summary (fenced block).
    pub summary: String,
    /// Single-line forum title.
    pub title: String,
    /// Multi-line forum body.
    pub body: String,
}

impl FormattedMission {
    pub fn from_record(record: &TradeRecord) -> Self {
        Self {
            summary: chat_summary(record),
            title: post_title(record),
            body: post_body(record),
        }
    }
}

fn mission_word(record: &TradeRecord) -> String {
    record
        .mission_type
        .map(|mt| mt.to_string())
        .unwrap_or_default()
}

/// Chat summary:
///
/// ```text
/// **XYZ-123** is loading **Gold** from **Malerba** (L pads) in **Wally Bei** 12k/t profit, 21k demand
/// ```
pub fn chat_summary(record: &TradeRecord) -> String {
    let preposition = match record.mission_type {
        Some(mt) => mt.preposition(),
        None => "to",
    };
    let quantity_type = record.quantity_label().to_lowercase();

    format!(
        "```\n**{carrier}** is {mission} **{commodity}** {preposition} **{station}** ({pad} pads) in **{system}** {profit}/t profit, {quantity} {quantity_type}\n```",
        carrier = record.carrier_name,
        mission = mission_word(record),
        commodity = record.commodity,
        station = record.station_name,
        pad = record.pad_size,
        system = record.system_name,
        profit = record.profit,
        quantity = record.quantity,
    )
}

/// `LOADING | XYZ-123 | Wally Bei - Malerba (L pads) | Gold | 12k/t profit | 21k Demand`
pub fn post_title(record: &TradeRecord) -> String {
    format!(
        "{mission} | {carrier} | {system} - {station} ({pad} pads) | {commodity} | {profit}/t profit | {quantity} {quantity_type}",
        mission = mission_word(record).to_uppercase(),
        carrier = record.carrier_name,
        system = record.system_name,
        station = record.station_name,
        pad = record.pad_size,
        commodity = record.commodity,
        profit = record.profit,
        quantity = record.quantity,
        quantity_type = record.quantity_label(),
    )
}

pub fn post_body(record: &TradeRecord) -> String {
    let mission_title = record.mission_type.map(|mt| mt.title()).unwrap_or("Mission");
    [
        format!("Carrier Name: {}", record.carrier_name),
        format!("{mission_title}: {}", record.commodity),
        format!("Station: {} ({} pads)", record.station_name, record.pad_size),
        format!("System: {}", record.system_name),
        format!("Profit: {}", record.profit),
        format!("{}: {}", record.quantity_label(), record.quantity),
    ]
    .join("\n")
}
