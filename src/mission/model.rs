//! Trade mission data model — the record collected by the form and its
//! completeness check.

use serde::{Deserialize, Serialize};

/// Whether the carrier is buying from a station or selling to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionType {
    /// The carrier loads goods from a station (the carrier has demand).
    Loading,
    /// The carrier unloads goods to a station (the carrier has supply).
    Unloading,
}

impl MissionType {
    /// Label for the quantity field: "Demand" when loading, "Supply" otherwise.
    pub fn quantity_label(&self) -> &'static str {
        match self {
            Self::Loading => "Demand",
            Self::Unloading => "Supply",
        }
    }

    /// Preposition used in the chat summary.
    pub fn preposition(&self) -> &'static str {
        match self {
            Self::Loading => "from",
            Self::Unloading => "to",
        }
    }

    /// "Loading" / "Unloading".
    pub fn title(&self) -> &'static str {
        match self {
            Self::Loading => "Loading",
            Self::Unloading => "Unloading",
        }
    }
}

impl std::fmt::Display for MissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Unloading => write!(f, "unloading"),
        }
    }
}

impl std::str::FromStr for MissionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "loading" | "load" => Ok(Self::Loading),
            "unloading" | "unload" => Ok(Self::Unloading),
            _ => Err(format!("Unknown mission type: {}", s)),
        }
    }
}

/// A single trade mission as collected from the user.
///
/// Every field starts empty. Free-form fields stay strings because the form
/// accepts anything the user types ("12k", "1m"); emptiness is the only
/// thing the completeness check cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Stable key of the hosting conversation/message. Empty until the first
    /// interaction assigns it.
    pub session_key: String,
    /// Identity of the user who filled the form.
    pub username: String,
    pub mission_type: Option<MissionType>,
    pub system_name: String,
    pub station_name: String,
    /// Landing pad size, upper-cased ("S", "M", "L").
    pub pad_size: String,
    pub commodity: String,
    pub carrier_name: String,
    /// Profit per ton, e.g. "12k".
    pub profit: String,
    /// Demand or supply depending on the mission type, e.g. "21k".
    pub quantity: String,
}

impl TradeRecord {
    /// Names of the required fields that are still empty, in form order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let text_fields: [(&'static str, &str); 9] = [
            ("session_key", self.session_key.as_str()),
            ("username", self.username.as_str()),
            ("system_name", self.system_name.as_str()),
            ("station_name", self.station_name.as_str()),
            ("pad_size", self.pad_size.as_str()),
            ("commodity", self.commodity.as_str()),
            ("carrier_name", self.carrier_name.as_str()),
            ("profit", self.profit.as_str()),
            ("quantity", self.quantity.as_str()),
        ];

        let mut missing = Vec::new();
        if self.mission_type.is_none() {
            missing.push("mission_type");
        }
        missing.extend(
            text_fields
                .iter()
                .filter(|(_, value)| value.is_empty())
                .map(|(name, _)| *name),
        );
        missing
    }

    /// True iff every required field has a non-empty value.
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// True if no user-entered field has a value yet.
    pub fn is_blank(&self) -> bool {
        self.mission_type.is_none()
            && [
                &self.system_name,
                &self.station_name,
                &self.pad_size,
                &self.commodity,
                &self.carrier_name,
                &self.profit,
                &self.quantity,
            ]
            .iter()
            .all(|v| v.is_empty())
    }

    /// Quantity label for this record ("Demand" or "Supply").
    ///
    /// Anything that is not `Loading` (including an unset type) is supply.
    pub fn quantity_label(&self) -> &'static str {
        match self.mission_type {
            Some(MissionType::Loading) => "Demand",
            _ => "Supply",
        }
    }
}

/// Title-case a string: the first letter of every run of letters is
/// upper-cased and the rest lower-cased ("wally bei" → "Wally Bei",
/// "o'NEILL" → "O'Neill").
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_is_letter = false;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}
