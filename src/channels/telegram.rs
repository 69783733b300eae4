//! Telegram channel — long-polls the Bot API for updates.
//!
//! `/trademission` posts a form message; its `chat_id:message_id` is the
//! session key. Inline buttons map to workflow actions. Location and trade
//! data are collected with a force-reply prompt, one value per line, and
//! the form message is edited in place after every change. Replying
//! `/show` to a form redraws it.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::channels::{Channel, Command, EventStream, IncomingEvent, UNSET, render_text};
use crate::error::ChannelError;
use crate::mission::model::{MissionType, TradeRecord};
use crate::mission::workflow::{Action, Render};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const CB_UNLOAD: &str = "tm:type:unloading";
const CB_LOAD: &str = "tm:type:loading";
const CB_LOCATION: &str = "tm:location";
const CB_TRADE: &str = "tm:trade";
const CB_SUBMIT: &str = "tm:submit";
const CB_PUBLISH: &str = "tm:publish";
const CB_SAVE: &str = "tm:save";
const CB_DISCARD: &str = "tm:discard";

/// Marker tying a force-reply prompt to its form message.
const PROMPT_MARKER: &str = " for trade mission #";

/// Thin Bot API client shared by the channel and its polling task.
#[derive(Clone)]
struct TelegramApi {
    bot_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl TelegramApi {
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.bot_token)
    }

    /// Call a Bot API method and return its `result`.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method}: {e}"),
            })?;

        let data: Value = resp.json().await.map_err(|e| ChannelError::SendFailed {
            name: "telegram".into(),
            reason: format!("{method}: invalid response: {e}"),
        })?;

        if data.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(data.get("result").cloned().unwrap_or(Value::Null));
        }
        let description = data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        Err(ChannelError::SendFailed {
            name: "telegram".into(),
            reason: format!("{method}: {description}"),
        })
    }

    /// Send a message and return its message id.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<i64, ChannelError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        let result = self.call("sendMessage", &body).await?;
        result
            .get("message_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| ChannelError::InvalidMessage("sendMessage: no message_id".into()))
    }

    /// Send feedback text, Markdown first with plain-text fallback.
    /// Splits long messages that exceed Telegram's 4096 char limit.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            let markdown = json!({ "chat_id": chat_id, "text": chunk, "parse_mode": "Markdown" });
            if let Err(e) = self.call("sendMessage", &markdown).await {
                tracing::warn!(error = %e, "Telegram sendMessage with Markdown failed; retrying without parse_mode");
                self.call("sendMessage", &json!({ "chat_id": chat_id, "text": chunk }))
                    .await?;
            }
        }
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Value,
    ) -> Result<(), ChannelError> {
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "reply_markup": reply_markup,
        });
        match self.call("editMessageText", &body).await {
            Ok(_) => Ok(()),
            // Re-selecting the same value produces an identical form.
            Err(ChannelError::SendFailed { reason, .. })
                if reason.contains("message is not modified") =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn answer_callback(&self, callback_id: &str) {
        let body = json!({ "callback_query_id": callback_id });
        if let Err(e) = self.call("answerCallbackQuery", &body).await {
            tracing::debug!(error = %e, "answerCallbackQuery failed");
        }
    }

    async fn send_prompt(
        &self,
        chat_id: i64,
        form_message_id: i64,
        kind: PromptKind,
        current: &[String],
    ) -> Result<(), ChannelError> {
        let markup = json!({
            "force_reply": true,
            "input_field_placeholder": kind.placeholder(),
        });
        let text = kind.prompt_text(form_message_id, current);
        self.send_message(chat_id, &text, Some(markup)).await?;
        Ok(())
    }
}

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    api: TelegramApi,
    allowed_users: Vec<String>,
}

impl TelegramChannel {
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            api: TelegramApi {
                bot_token,
                base_url: TELEGRAM_API_BASE.to_string(),
                client: reqwest::Client::new(),
            },
            allowed_users,
        }
    }

    /// Point the channel at a different Bot API server.
    pub fn with_api_base(mut self, base_url: impl Into<String>) -> Self {
        self.api.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let api = self.api.clone();
        let allowed_users = self.allowed_users.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let results = match api.call("getUpdates", &body).await {
                    Ok(result) => result.as_array().cloned().unwrap_or_default(),
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                for update in &results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(parsed) = parse_update(update) else {
                        continue;
                    };

                    // Dismiss the button spinner whatever happens next
                    if let Some(ref callback_id) = parsed.callback_id {
                        api.answer_callback(callback_id).await;
                    }

                    if !check_user_allowed(&allowed_users, parsed.identities()) {
                        tracing::warn!(
                            "Telegram: ignoring update from unauthorized user: \
                             username={}, user_id={}",
                            parsed.username,
                            parsed.user_id
                        );
                        continue;
                    }

                    match parsed.inbound {
                        Inbound::Prompt {
                            chat_id,
                            form_message_id,
                            kind,
                            current,
                        } => {
                            if let Err(e) =
                                api.send_prompt(chat_id, form_message_id, kind, &current).await
                            {
                                tracing::warn!(chat_id, error = %e, "Failed to send prompt");
                            }
                        }
                        Inbound::Event(event) => {
                            if tx.send(*event).is_err() {
                                tracing::info!("Telegram listener channel closed");
                                return;
                            }
                        }
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn open_form(&self, event: &IncomingEvent) -> Result<String, ChannelError> {
        let chat_id = chat_id_of(event)?;
        let view = Render::Form {
            record: TradeRecord::default(),
            submit_enabled: false,
        };
        let message_id = self
            .api
            .send_message(
                chat_id,
                &fit_message(&render_text(&view), TELEGRAM_MAX_MESSAGE_LENGTH),
                Some(keyboard(&view, false)),
            )
            .await?;
        tracing::info!(chat_id, message_id, user = %event.user_name, "Trade mission form opened");
        Ok(session_key(chat_id, message_id))
    }

    async fn render(
        &self,
        _event: &IncomingEvent,
        session_key: &str,
        view: &Render,
        can_publish: bool,
    ) -> Result<(), ChannelError> {
        let (chat_id, message_id) = parse_session_key(session_key).ok_or_else(|| {
            ChannelError::InvalidMessage(format!("Not a Telegram session key: {session_key}"))
        })?;
        self.api
            .edit_message(
                chat_id,
                message_id,
                &fit_message(&render_text(view), TELEGRAM_MAX_MESSAGE_LENGTH),
                keyboard(view, can_publish),
            )
            .await
    }

    async fn notify(&self, event: &IncomingEvent, text: &str) -> Result<(), ChannelError> {
        self.api.send_text(chat_id_of(event)?, text).await
    }

    fn help(&self) -> &str {
        "Send /trademission to open a new trade mission form. \
         Pick the mission type, fill in Station | System and Trade Data by \
         replying to the prompts, then Submit Trade to review. \
         Reply /show to a form to redraw it."
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.api
            .call("getMe", &json!({}))
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Update parsing ──────────────────────────────────────────────────

/// Multi-value entry collected through a force-reply prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
    Location,
    TradeData,
}

impl PromptKind {
    fn heading(&self) -> &'static str {
        match self {
            Self::Location => "Station | System",
            Self::TradeData => "Trade Data",
        }
    }

    fn placeholder(&self) -> &'static str {
        match self {
            Self::Location => "Wally Bei / Malerba / L",
            Self::TradeData => "Gold / XYZ-123 / 12k / 21k",
        }
    }

    /// Form labels of the fields this prompt fills, in reply order. Each
    /// entry lists the labels the field may be shown under.
    fn form_labels(&self) -> &'static [&'static [&'static str]] {
        match self {
            Self::Location => &[&["System"], &["Station"], &["Pad Size"]],
            Self::TradeData => &[
                &["Commodity"],
                &["Carrier Name"],
                &["Profit"],
                &["Demand", "Supply"],
            ],
        }
    }

    /// Values this prompt's fields currently hold, read from the form text.
    fn current_values(&self, form_text: &str) -> Vec<String> {
        self.form_labels()
            .iter()
            .map(|labels| {
                form_text
                    .lines()
                    .find_map(|line| {
                        labels.iter().find_map(|label| {
                            line.strip_prefix(label)?.strip_prefix(": ")
                        })
                    })
                    .map(str::trim)
                    .filter(|v| *v != UNSET)
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }

    fn prompt_text(&self, form_message_id: i64, current: &[String]) -> String {
        let fields = match self {
            Self::Location => "System (Wally Bei)\nStation (Malerba)\nPad Size (L or M or S)",
            Self::TradeData => {
                "Commodity (Gold)\nCarrier Name (XYZ-123)\nProfit per ton (12k or 1m)\nDemand | Supply (21k)"
            }
        };
        let mut text = format!(
            "{}{PROMPT_MARKER}{form_message_id}\nReply with one value per line:\n{fields}",
            self.heading()
        );
        if current.iter().any(|v| !v.is_empty()) {
            let lines: Vec<&str> = current
                .iter()
                .map(|v| if v.is_empty() { UNSET } else { v.as_str() })
                .collect();
            text.push_str("\n\nCurrent values, copy and edit:\n");
            text.push_str(&lines.join("\n"));
        }
        text
    }

    /// Recover the prompt kind and form message id from a prompt's text.
    fn parse_prompt(text: &str) -> Option<(Self, i64)> {
        let first_line = text.lines().next()?;
        let (heading, id) = first_line.split_once(PROMPT_MARKER)?;
        let kind = [Self::Location, Self::TradeData]
            .into_iter()
            .find(|k| k.heading() == heading)?;
        Some((kind, id.trim().parse().ok()?))
    }

    /// Build the action from a reply; missing lines and `-` become empty
    /// values.
    fn to_action(self, reply: &str) -> Action {
        let mut values = reply.lines().map(str::trim);
        let mut next = || {
            let value = values.next().unwrap_or_default();
            if value == UNSET { String::new() } else { value.to_string() }
        };
        match self {
            Self::Location => Action::SetLocation {
                system: next(),
                station: next(),
                pad_size: next(),
            },
            Self::TradeData => Action::SetTradeData {
                commodity: next(),
                carrier: next(),
                profit: next(),
                quantity: next(),
            },
        }
    }
}

enum CallbackCommand {
    Apply(Action),
    Prompt(PromptKind),
}

fn parse_callback(data: &str) -> Option<CallbackCommand> {
    let command = match data {
        CB_UNLOAD => CallbackCommand::Apply(Action::SelectMissionType(MissionType::Unloading)),
        CB_LOAD => CallbackCommand::Apply(Action::SelectMissionType(MissionType::Loading)),
        CB_LOCATION => CallbackCommand::Prompt(PromptKind::Location),
        CB_TRADE => CallbackCommand::Prompt(PromptKind::TradeData),
        CB_SUBMIT => CallbackCommand::Apply(Action::Submit),
        CB_PUBLISH => CallbackCommand::Apply(Action::ConfirmPublish),
        CB_SAVE => CallbackCommand::Apply(Action::ConfirmSaveOnly),
        CB_DISCARD => CallbackCommand::Apply(Action::Discard),
        _ => return None,
    };
    Some(command)
}

enum Inbound {
    Event(Box<IncomingEvent>),
    Prompt {
        chat_id: i64,
        form_message_id: i64,
        kind: PromptKind,
        /// Values already on the form, in reply order.
        current: Vec<String>,
    },
}

struct ParsedUpdate {
    callback_id: Option<String>,
    username: String,
    user_id: String,
    inbound: Inbound,
}

impl ParsedUpdate {
    fn identities(&self) -> impl Iterator<Item = &str> {
        [self.username.as_str(), self.user_id.as_str()].into_iter()
    }
}

/// Turn a raw update into something the bot acts on.
///
/// Returns `None` for updates that are not for us (other commands, plain
/// chatter, unknown buttons).
fn parse_update(update: &Value) -> Option<ParsedUpdate> {
    if let Some(cb) = update.get("callback_query") {
        let callback_id = cb.get("id").and_then(Value::as_str)?.to_string();
        let (username, user_id) = sender(cb.get("from"));
        let chat_id = cb.pointer("/message/chat/id").and_then(Value::as_i64)?;
        let message_id = cb.pointer("/message/message_id").and_then(Value::as_i64)?;

        let inbound = match cb.get("data").and_then(Value::as_str).and_then(parse_callback) {
            Some(CallbackCommand::Prompt(kind)) => Inbound::Prompt {
                chat_id,
                form_message_id: message_id,
                kind,
                current: kind.current_values(
                    cb.pointer("/message/text")
                        .and_then(Value::as_str)
                        .unwrap_or_default(),
                ),
            },
            Some(CallbackCommand::Apply(action)) => Inbound::Event(Box::new(
                IncomingEvent::new("telegram", &user_id, &username, Command::Apply(action))
                    .with_session(session_key(chat_id, message_id))
                    .with_metadata(json!({ "chat_id": chat_id })),
            )),
            None => return None,
        };
        return Some(ParsedUpdate {
            callback_id: Some(callback_id),
            username,
            user_id,
            inbound,
        });
    }

    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;
    let chat_id = message.pointer("/chat/id").and_then(Value::as_i64)?;
    let (username, user_id) = sender(message.get("from"));

    let prompt = message
        .pointer("/reply_to_message/text")
        .and_then(Value::as_str)
        .and_then(PromptKind::parse_prompt);

    let event = match (bot_command(text), prompt) {
        (Some("trademission"), _) => {
            IncomingEvent::new("telegram", &user_id, &username, Command::NewForm)
        }
        (Some("start" | "help"), _) => {
            IncomingEvent::new("telegram", &user_id, &username, Command::Help)
        }
        (Some("show"), _) => {
            // The form itself, or a prompt that belongs to it
            let form_message_id = prompt.map(|(_, id)| id).or_else(|| {
                message
                    .pointer("/reply_to_message/message_id")
                    .and_then(Value::as_i64)
            });
            let event = IncomingEvent::new("telegram", &user_id, &username, Command::Show);
            match form_message_id {
                Some(id) => event.with_session(session_key(chat_id, id)),
                None => event,
            }
        }
        (Some(_), _) => return None,
        (None, Some((kind, form_message_id))) => IncomingEvent::new(
            "telegram",
            &user_id,
            &username,
            Command::Apply(kind.to_action(text)),
        )
        .with_session(session_key(chat_id, form_message_id)),
        (None, None) => return None,
    };

    Some(ParsedUpdate {
        callback_id: None,
        username,
        user_id,
        inbound: Inbound::Event(Box::new(event.with_metadata(json!({ "chat_id": chat_id })))),
    })
}

/// `/name@botname args` → `name`.
fn bot_command(text: &str) -> Option<&str> {
    let word = text.trim().split_whitespace().next()?.strip_prefix('/')?;
    Some(word.split('@').next().unwrap_or(word))
}

/// (display name, numeric id) of an update's sender.
fn sender(from: Option<&Value>) -> (String, String) {
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let username = from
        .and_then(|f| f.get("username").or_else(|| f.get("first_name")))
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| user_id.clone());
    (username, user_id)
}

fn chat_id_of(event: &IncomingEvent) -> Result<i64, ChannelError> {
    event
        .metadata
        .get("chat_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ChannelError::SendFailed {
            name: "telegram".into(),
            reason: "No chat_id in event metadata".into(),
        })
}

fn session_key(chat_id: i64, message_id: i64) -> String {
    format!("{chat_id}:{message_id}")
}

fn parse_session_key(key: &str) -> Option<(i64, i64)> {
    let (chat, message) = key.split_once(':')?;
    Some((chat.parse().ok()?, message.parse().ok()?))
}

// ── Helpers ─────────────────────────────────────────────────────────

fn button(text: &str, data: &str) -> Value {
    json!({ "text": text, "callback_data": data })
}

/// Inline keyboard for a view. Finished views get an empty keyboard so
/// stale buttons disappear from the edited message.
fn keyboard(view: &Render, can_publish: bool) -> Value {
    let rows: Vec<Vec<Value>> = match view {
        Render::Form { submit_enabled, .. } => {
            let mut last = Vec::new();
            if *submit_enabled {
                last.push(button("Submit Trade", CB_SUBMIT));
            }
            last.push(button("Delete", CB_DISCARD));
            vec![
                vec![button("Unload", CB_UNLOAD), button("Load", CB_LOAD)],
                vec![
                    button("Station | System", CB_LOCATION),
                    button("Trade Data", CB_TRADE),
                ],
                last,
            ]
        }
        Render::Review { .. } => {
            let mut row = Vec::new();
            if can_publish {
                row.push(button("Post to Reddit", CB_PUBLISH));
            }
            row.push(button("Save (no Reddit)", CB_SAVE));
            row.push(button("Delete", CB_DISCARD));
            vec![row]
        }
        Render::Published { .. } | Render::Saved { .. } | Render::Discarded => Vec::new(),
    };
    json!({ "inline_keyboard": rows })
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Cut `text` to fit one Telegram message, marking the cut.
///
/// Forms are edited in place, so they cannot be split like notices.
fn fit_message(text: &str, max_len: usize) -> String {
    const CUT_MARKER: &str = "\n[...]";
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut cut = max_len.saturating_sub(CUT_MARKER.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{CUT_MARKER}", &text[..cut])
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(cut);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
