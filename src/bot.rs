//! FormBot — routes channel events into trade mission sessions and draws
//! the results.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::channels::{Channel, Command, IncomingEvent};
use crate::config::BotConfig;
use crate::error::{Error, WorkflowError};
use crate::mission::sessions::SessionRegistry;
use crate::mission::workflow::{Render, SessionContext};

/// Whether the main loop should keep going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// How often idle sessions are looked for, at most.
const PRUNE_INTERVAL: Duration = Duration::from_secs(600);

pub struct FormBot {
    channel: Arc<dyn Channel>,
    registry: Arc<SessionRegistry>,
    session_idle_timeout: Duration,
}

impl FormBot {
    pub fn new(channel: Arc<dyn Channel>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            channel,
            registry,
            session_idle_timeout: BotConfig::default().session_idle_timeout,
        }
    }

    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    /// Periodically drop forms nobody has touched for the idle timeout.
    pub fn spawn_pruner(&self) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let idle_timeout = self.session_idle_timeout;
        tokio::spawn(async move {
            let period = PRUNE_INTERVAL.min(idle_timeout).max(Duration::from_millis(1));
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // Skip immediate first tick
            loop {
                interval.tick().await;
                registry.prune_idle(idle_timeout).await;
            }
        })
    }

    /// Run until the channel stream ends, `quit`, or Ctrl+C.
    pub async fn run(self) -> Result<(), Error> {
        let mut events = self.channel.start().await?;
        let pruning_handle = self.spawn_pruner();

        tracing::info!(channel = self.channel.name(), "Trade mission bot ready and listening");

        loop {
            let event = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                event = events.next() => {
                    match event {
                        Some(e) => e,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            match self.handle_event(&event).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => {
                    tracing::info!("Quit command received, exiting...");
                    break;
                }
                Err(e) => {
                    tracing::error!(channel = %event.channel, user = %event.user_id, "Error handling event: {}", e);
                }
            }
        }

        pruning_handle.abort();
        self.channel.shutdown().await?;
        Ok(())
    }

    /// Handle one event. Workflow rejections are shown to the user; only
    /// channel failures come back as errors.
    pub async fn handle_event(&self, event: &IncomingEvent) -> Result<Flow, Error> {
        match &event.command {
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => {
                self.channel.notify(event, self.channel.help()).await?;
            }
            Command::NewForm => {
                let key = self.channel.open_form(event).await?;
                self.registry.open(&key).await;
            }
            Command::Show => {
                let view = match &event.session_key {
                    Some(key) => self.registry.current_view(key).await,
                    None => None,
                };
                match (view, &event.session_key) {
                    (Some(view), Some(key)) => self.draw(event, key, &view).await?,
                    _ => self.channel.notify(event, NO_OPEN_FORM).await?,
                }
            }
            Command::Apply(action) => {
                let Some(key) = &event.session_key else {
                    self.channel.notify(event, NO_OPEN_FORM).await?;
                    return Ok(Flow::Continue);
                };
                let ctx = SessionContext::new(key.clone(), event.user_name.clone());
                match self.registry.handle(&ctx, action.clone()).await {
                    Ok(view) => self.draw(event, key, &view).await?,
                    Err(e) => {
                        log_rejection(key, &e);
                        self.channel.notify(event, &e.to_string()).await?;
                        // Publish failures keep the review open; redraw it so
                        // the user can retry or save instead.
                        if matches!(e, WorkflowError::Publish { .. })
                            && let Some(view) = self.registry.current_view(key).await
                        {
                            self.draw(event, key, &view).await?;
                        }
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Draw `view`. The transition behind it is already committed, so a
    /// host that cannot draw it tells the user rather than leaving a stale
    /// form up.
    async fn draw(
        &self,
        event: &IncomingEvent,
        session_key: &str,
        view: &Render,
    ) -> Result<(), Error> {
        if let Err(e) = self
            .channel
            .render(event, session_key, view, self.registry.can_publish())
            .await
        {
            tracing::warn!(session_key, error = %e, "Failed to draw trade mission");
            self.channel
                .notify(event, &format!("{FORM_NOT_UPDATED}: {e}"))
                .await?;
        }
        Ok(())
    }
}

const FORM_NOT_UPDATED: &str = "The trade mission form could not be updated";

const NO_OPEN_FORM: &str = "No open trade mission. Start one first.";

fn log_rejection(session_key: &str, error: &WorkflowError) {
    match error {
        WorkflowError::Persistence(_) | WorkflowError::Publish { .. } => {
            tracing::error!(session_key, error = %error, "Trade mission action failed");
        }
        _ => {
            tracing::debug!(session_key, error = %error, "Trade mission action rejected");
        }
    }
}
