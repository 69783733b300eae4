//! Interaction hosts: where users fill in trade mission forms.
//!
//! A `Channel` turns its native input (Telegram updates, stdin lines) into
//! `IncomingEvent`s and draws the `Render` directives the workflow returns.

pub mod cli;
pub mod telegram;

pub use cli::CliChannel;
pub use telegram::TelegramChannel;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;
use crate::mission::model::TradeRecord;
use crate::mission::workflow::{Action, Render};
use crate::publish::PostRef;

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a new, empty form.
    NewForm,
    /// Apply a workflow action to the event's session.
    Apply(Action),
    /// Redraw the current form.
    Show,
    Help,
    Quit,
}

/// One user interaction, normalized across channels.
#[derive(Debug, Clone)]
pub struct IncomingEvent {
    /// Channel this came from.
    pub channel: String,
    /// Stable user identity (numeric id, or "local-user" on the CLI).
    pub user_id: String,
    /// Display identity recorded as the mission's submitter.
    pub user_name: String,
    /// Session the interaction targets. `None` for commands outside a form.
    pub session_key: Option<String>,
    pub command: Command,
    /// Channel-specific routing data (chat id, callback id).
    pub metadata: serde_json::Value,
}

impl IncomingEvent {
    pub fn new(channel: &str, user_id: &str, user_name: &str, command: Command) -> Self {
        Self {
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            session_key: None,
            command,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_session(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = IncomingEvent> + Send>>;

/// A host that users interact with.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start listening. The stream ends when the host goes away.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Draw a new, empty form and return the session key it is known by.
    ///
    /// Hosts whose reader already picked a key put it in `event.session_key`.
    async fn open_form(&self, event: &IncomingEvent) -> Result<String, ChannelError>;

    /// Draw `view` for the session.
    async fn render(
        &self,
        event: &IncomingEvent,
        session_key: &str,
        view: &Render,
        can_publish: bool,
    ) -> Result<(), ChannelError>;

    /// Plain text feedback (errors, help).
    async fn notify(&self, event: &IncomingEvent, text: &str) -> Result<(), ChannelError>;

    fn help(&self) -> &str;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

// ── Shared text rendering ───────────────────────────────────────────

/// Shown in place of a field with no value yet.
const UNSET: &str = "-";

fn or_unset(value: &str) -> &str {
    if value.is_empty() { UNSET } else { value }
}

/// Field overview shown while the form is being filled.
pub fn form_text(record: &TradeRecord, submit_enabled: bool) -> String {
    let mission_type = record
        .mission_type
        .map(|mt| mt.title())
        .unwrap_or(UNSET);
    let mut lines = vec![
        "Trade Mission".to_string(),
        String::new(),
        format!("Type: {mission_type}"),
        format!("System: {}", or_unset(&record.system_name)),
        format!("Station: {}", or_unset(&record.station_name)),
        format!("Pad Size: {}", or_unset(&record.pad_size)),
        format!("Commodity: {}", or_unset(&record.commodity)),
        format!("Carrier Name: {}", or_unset(&record.carrier_name)),
        format!("Profit: {}", or_unset(&record.profit)),
        format!("{}: {}", record.quantity_label(), or_unset(&record.quantity)),
    ];
    if !submit_enabled {
        lines.push(String::new());
        lines.push("Fill in every field to submit.".to_string());
    }
    lines.join("\n")
}

fn crosspost_urls(crossposts: &[Option<PostRef>]) -> String {
    crossposts
        .iter()
        .flatten()
        .map(|p| p.url.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Text for any render directive.
pub fn render_text(view: &Render) -> String {
    match view {
        Render::Form {
            record,
            submit_enabled,
        } => form_text(record, *submit_enabled),
        Render::Review { formatted } => format!(
            "Review the Data!\n\nDiscord Paste:\n{}\n\nReddit Title:\n{}\n\nReddit Body:\n{}",
            formatted.summary, formatted.title, formatted.body
        ),
        Render::Published {
            post,
            crossposts,
            summary,
        } => format!(
            "Successfully posted to Reddit\n\nMain Post: {}\nCrossPosts: {}\n\nDiscord Paste:\n{}",
            post.url,
            crosspost_urls(crossposts),
            summary
        ),
        Render::Saved { summary } => {
            format!("Trade Mission Saved, no post to Reddit\n\nDiscord Paste:\n{summary}")
        }
        Render::Discarded => "Trade Mission Deleted".to_string(),
    }
}
