//! CLI channel — stdin/stdout REPL for filling forms locally.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::channels::{Channel, Command, EventStream, IncomingEvent, render_text};
use crate::error::ChannelError;
use crate::mission::model::{MissionType, TradeRecord};
use crate::mission::workflow::{Action, Render};

const USAGE: &str = "\
Commands:
  new                                         start a new trade mission
  type load|unload                            pick the mission type
  location <system> | <station> | <pad>       set station and system
  trade <commodity> | <carrier> | <profit> | <quantity>
  show                                        redraw the form
  submit                                      review the formatted mission
  publish | save | discard                    finish the mission
  help | quit";

/// A CLI channel that reads from stdin and writes to stdout.
///
/// The reader assigns each `new` form a UUID session key and targets every
/// following command at it, so piped input works without waiting on the
/// bot between lines.
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let user = std::env::var("USER").unwrap_or_else(|_| "local-user".to_string());

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();
            let mut current: Option<String> = None;

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let command = match parse_line(line) {
                            Ok(command) => command,
                            Err(message) => {
                                eprintln!("{message}");
                                eprint!("> ");
                                continue;
                            }
                        };
                        if command == Command::NewForm {
                            current = Some(Uuid::new_v4().to_string());
                        }
                        let mut event = IncomingEvent::new("cli", "local-user", &user, command);
                        if let Some(ref key) = current {
                            event = event.with_session(key.clone());
                        }
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn open_form(&self, event: &IncomingEvent) -> Result<String, ChannelError> {
        let key = event
            .session_key
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let empty = Render::Form {
            record: TradeRecord::default(),
            submit_enabled: false,
        };
        println!("\nTrade mission {key}\n\n{}\n", render_text(&empty));
        eprintln!("{}", next_steps(&empty, false));
        eprint!("> ");
        Ok(key)
    }

    async fn render(
        &self,
        _event: &IncomingEvent,
        _session_key: &str,
        view: &Render,
        can_publish: bool,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", render_text(view));
        eprintln!("{}", next_steps(view, can_publish));
        eprint!("> ");
        Ok(())
    }

    async fn notify(&self, _event: &IncomingEvent, text: &str) -> Result<(), ChannelError> {
        println!("\n{text}\n");
        eprint!("> ");
        Ok(())
    }

    fn help(&self) -> &str {
        USAGE
    }
}

fn next_steps(view: &Render, can_publish: bool) -> &'static str {
    match view {
        Render::Form {
            submit_enabled: true,
            ..
        } => "Ready: submit | discard",
        Render::Form { .. } => "Fill in: type | location | trade",
        Render::Review { .. } if can_publish => "Finish: publish | save | discard",
        Render::Review { .. } => "Finish: save | discard (publishing is not configured)",
        _ => "Start another with: new",
    }
}

/// Split `a | b | c` into exactly `n` trimmed values, padding with empty ones.
fn pipe_values(rest: &str, n: usize) -> Vec<String> {
    let mut values: Vec<String> = rest
        .split('|')
        .map(|v| v.trim().to_string())
        .take(n)
        .collect();
    values.resize(n, String::new());
    values
}

/// Parse one line of CLI input.
pub fn parse_line(line: &str) -> Result<Command, String> {
    let trimmed = line.trim();
    let (word, rest) = trimmed
        .split_once(char::is_whitespace)
        .map(|(w, r)| (w, r.trim()))
        .unwrap_or((trimmed, ""));

    let command = match word.to_lowercase().as_str() {
        "new" => Command::NewForm,
        "type" => {
            let mission_type: MissionType = rest
                .parse()
                .map_err(|e: String| format!("{e} (use load or unload)"))?;
            Command::Apply(Action::SelectMissionType(mission_type))
        }
        "location" => {
            let mut v = pipe_values(rest, 3).into_iter();
            Command::Apply(Action::SetLocation {
                system: v.next().unwrap_or_default(),
                station: v.next().unwrap_or_default(),
                pad_size: v.next().unwrap_or_default(),
            })
        }
        "trade" => {
            let mut v = pipe_values(rest, 4).into_iter();
            Command::Apply(Action::SetTradeData {
                commodity: v.next().unwrap_or_default(),
                carrier: v.next().unwrap_or_default(),
                profit: v.next().unwrap_or_default(),
                quantity: v.next().unwrap_or_default(),
            })
        }
        "show" => Command::Show,
        "submit" => Command::Apply(Action::Submit),
        "publish" | "post" => Command::Apply(Action::ConfirmPublish),
        "save" => Command::Apply(Action::ConfirmSaveOnly),
        "discard" | "delete" => Command::Apply(Action::Discard),
        "help" | "?" => Command::Help,
        "quit" | "exit" | "/quit" => Command::Quit,
        other => return Err(format!("Unknown command: {other}\n{USAGE}")),
    };
    Ok(command)
}
