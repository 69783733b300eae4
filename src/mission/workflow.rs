//! TradeWorkflow — one trade mission form from first interaction to
//! publish, save, or discard.
//!
//! Hosts feed it `Action`s as the user interacts. Every transition returns
//! a `Render` telling the host what to show next; rendering itself is the
//! host's business.

use std::sync::Arc;

use serde::Serialize;

use super::format::FormattedMission;
use super::model::{MissionType, TradeRecord, title_case};
use super::state::WorkflowPhase;
use crate::error::{PublishError, WorkflowError};
use crate::publish::{PostRef, PublishGateway};
use crate::store::MissionStore;

/// Who is interacting, and from which hosting conversation/message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_key: String,
    pub submitter: String,
}

impl SessionContext {
    pub fn new(session_key: impl Into<String>, submitter: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            submitter: submitter.into(),
        }
    }
}

/// A user interaction, as delivered by a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SelectMissionType(MissionType),
    SetLocation {
        system: String,
        station: String,
        pad_size: String,
    },
    SetTradeData {
        commodity: String,
        carrier: String,
        profit: String,
        quantity: String,
    },
    Submit,
    ConfirmPublish,
    ConfirmSaveOnly,
    Discard,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Self::SelectMissionType(_) => "select mission type",
            Self::SetLocation { .. } => "set location",
            Self::SetTradeData { .. } => "set trade data",
            Self::Submit => "submit",
            Self::ConfirmPublish => "publish",
            Self::ConfirmSaveOnly => "save",
            Self::Discard => "discard",
        }
    }
}

/// What the host should display after a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum Render {
    /// The form, with the submit action enabled only when complete.
    Form {
        record: TradeRecord,
        submit_enabled: bool,
    },
    /// Formatted output with the publish / save / discard choices.
    Review { formatted: FormattedMission },
    /// Saved and published.
    Published {
        post: PostRef,
        crossposts: Vec<Option<PostRef>>,
        summary: String,
    },
    /// Saved without publishing.
    Saved { summary: String },
    /// Deleted.
    Discarded,
}

/// State machine for one trade mission form.
///
/// Not synchronized: the owner (see `SessionRegistry`) serializes access.
pub struct TradeWorkflow {
    record: TradeRecord,
    phase: WorkflowPhase,
    /// Completeness as of the last field mutation.
    complete: bool,
    formatted: Option<FormattedMission>,
    store: Arc<dyn MissionStore>,
    gateway: Option<Arc<dyn PublishGateway>>,
}

impl TradeWorkflow {
    pub fn new(store: Arc<dyn MissionStore>, gateway: Option<Arc<dyn PublishGateway>>) -> Self {
        Self {
            record: TradeRecord::default(),
            phase: WorkflowPhase::Empty,
            complete: false,
            formatted: None,
            store,
            gateway,
        }
    }

    pub fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    pub fn record(&self) -> &TradeRecord {
        &self.record
    }

    /// Whether the submit action is currently enabled.
    pub fn submit_enabled(&self) -> bool {
        self.complete
    }

    /// Output of the last `submit()`, while reviewing or after.
    pub fn formatted(&self) -> Option<&FormattedMission> {
        self.formatted.as_ref()
    }

    /// Render directive for the current phase, for hosts that need to redraw.
    pub fn current_view(&self) -> Render {
        match self.phase {
            WorkflowPhase::Reviewing => match &self.formatted {
                Some(formatted) => Render::Review {
                    formatted: formatted.clone(),
                },
                None => self.form_view(),
            },
            WorkflowPhase::Discarded => Render::Discarded,
            _ => self.form_view(),
        }
    }

    /// Dispatch a host action to its transition.
    pub async fn apply(
        &mut self,
        ctx: &SessionContext,
        action: Action,
    ) -> Result<Render, WorkflowError> {
        match action {
            Action::SelectMissionType(mission_type) => self.set_mission_type(ctx, mission_type),
            Action::SetLocation {
                system,
                station,
                pad_size,
            } => self.set_location(ctx, &system, &station, &pad_size),
            Action::SetTradeData {
                commodity,
                carrier,
                profit,
                quantity,
            } => self.set_trade_data(ctx, &commodity, &carrier, &profit, &quantity),
            Action::Submit => self.submit(),
            Action::ConfirmPublish => self.confirm_publish().await,
            Action::ConfirmSaveOnly => self.confirm_save_only().await,
            Action::Discard => {
                // A form discarded before any entry still owns its key's row.
                self.check_not_terminal()?;
                self.bind_session(ctx)?;
                self.discard().await
            }
        }
    }

    // ── Field entry ─────────────────────────────────────────────────

    pub fn set_mission_type(
        &mut self,
        ctx: &SessionContext,
        mission_type: MissionType,
    ) -> Result<Render, WorkflowError> {
        self.check_field_update("select mission type")?;
        self.bind_session(ctx)?;
        self.record.username = ctx.submitter.clone();
        self.record.mission_type = Some(mission_type);
        Ok(self.after_field_update())
    }

    pub fn set_location(
        &mut self,
        ctx: &SessionContext,
        system: &str,
        station: &str,
        pad_size: &str,
    ) -> Result<Render, WorkflowError> {
        self.check_field_update("set location")?;
        self.bind_session(ctx)?;
        self.fill_submitter(ctx);
        self.record.system_name = title_case(system);
        self.record.station_name = title_case(station);
        self.record.pad_size = pad_size.to_uppercase();
        Ok(self.after_field_update())
    }

    pub fn set_trade_data(
        &mut self,
        ctx: &SessionContext,
        commodity: &str,
        carrier: &str,
        profit: &str,
        quantity: &str,
    ) -> Result<Render, WorkflowError> {
        self.check_field_update("set trade data")?;
        self.bind_session(ctx)?;
        self.fill_submitter(ctx);
        self.record.commodity = title_case(commodity);
        self.record.carrier_name = carrier.to_string();
        self.record.profit = profit.to_string();
        self.record.quantity = quantity.to_string();
        Ok(self.after_field_update())
    }

    // ── Review ──────────────────────────────────────────────────────

    /// Format the record and move to review.
    ///
    /// Completeness is re-checked here rather than trusting the flag the
    /// host used to enable the button.
    pub fn submit(&mut self) -> Result<Render, WorkflowError> {
        self.check_not_terminal()?;
        if self.phase != WorkflowPhase::Complete {
            if self.phase.accepts_field_updates() {
                return Err(WorkflowError::Incomplete {
                    missing: self.record.missing_fields(),
                });
            }
            return Err(WorkflowError::InvalidTransition {
                phase: self.phase,
                action: Action::Submit.name(),
            });
        }
        let missing = self.record.missing_fields();
        if !missing.is_empty() {
            return Err(WorkflowError::Incomplete { missing });
        }

        let formatted = FormattedMission::from_record(&self.record);
        self.formatted = Some(formatted.clone());
        self.transition(WorkflowPhase::Reviewing);
        Ok(Render::Review { formatted })
    }

    /// Save the record, publish it, and crosspost it.
    ///
    /// On any store or gateway failure the workflow stays in `Reviewing`.
    pub async fn confirm_publish(&mut self) -> Result<Render, WorkflowError> {
        self.check_reviewing(Action::ConfirmPublish.name())?;
        let Some(gateway) = self.gateway.clone() else {
            return Err(WorkflowError::Publish {
                saved: false,
                source: PublishError::NotConfigured,
            });
        };
        let (formatted, mission_type) = self.review_output()?;

        self.persist().await?;

        let post = gateway
            .create_post(&formatted.title, &formatted.body, mission_type)
            .await
            .map_err(|source| {
                tracing::warn!(
                    session_key = %self.record.session_key,
                    error = %source,
                    "Publish failed after save"
                );
                WorkflowError::Publish {
                    saved: true,
                    source,
                }
            })?;
        let crossposts = gateway.crosspost(&post, mission_type).await;

        self.transition(WorkflowPhase::Published);
        Ok(Render::Published {
            post,
            crossposts,
            summary: formatted.summary,
        })
    }

    /// Save the record without publishing.
    pub async fn confirm_save_only(&mut self) -> Result<Render, WorkflowError> {
        self.check_reviewing(Action::ConfirmSaveOnly.name())?;
        let (formatted, _) = self.review_output()?;
        self.persist().await?;
        self.transition(WorkflowPhase::SavedOnly);
        Ok(Render::Saved {
            summary: formatted.summary,
        })
    }

    /// Delete any stored row for this session and retire the form.
    ///
    /// Allowed from every non-terminal phase.
    pub async fn discard(&mut self) -> Result<Render, WorkflowError> {
        self.check_not_terminal()?;
        if !self.record.session_key.is_empty() {
            let existed = self.store.delete_mission(&self.record.session_key).await?;
            tracing::debug!(session_key = %self.record.session_key, existed, "Stored trade mission removed");
        }
        self.transition(WorkflowPhase::Discarded);
        Ok(Render::Discarded)
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn check_not_terminal(&self) -> Result<(), WorkflowError> {
        if self.phase.is_terminal() {
            return Err(WorkflowError::Terminal { phase: self.phase });
        }
        Ok(())
    }

    fn check_field_update(&self, action: &'static str) -> Result<(), WorkflowError> {
        self.check_not_terminal()?;
        if !self.phase.accepts_field_updates() {
            return Err(WorkflowError::InvalidTransition {
                phase: self.phase,
                action,
            });
        }
        Ok(())
    }

    fn check_reviewing(&self, action: &'static str) -> Result<(), WorkflowError> {
        self.check_not_terminal()?;
        if self.phase != WorkflowPhase::Reviewing {
            return Err(WorkflowError::InvalidTransition {
                phase: self.phase,
                action,
            });
        }
        Ok(())
    }

    /// Assign the session key on first use; reject a different one later.
    fn bind_session(&mut self, ctx: &SessionContext) -> Result<(), WorkflowError> {
        if self.record.session_key.is_empty() {
            self.record.session_key = ctx.session_key.clone();
        } else if self.record.session_key != ctx.session_key {
            return Err(WorkflowError::SessionMismatch {
                expected: self.record.session_key.clone(),
                got: ctx.session_key.clone(),
            });
        }
        Ok(())
    }

    fn fill_submitter(&mut self, ctx: &SessionContext) {
        if self.record.username.is_empty() {
            self.record.username = ctx.submitter.clone();
        }
    }

    fn after_field_update(&mut self) -> Render {
        self.complete = self.record.is_complete();
        let next = if self.complete {
            WorkflowPhase::Complete
        } else if self.record.is_blank() {
            WorkflowPhase::Empty
        } else {
            WorkflowPhase::PartiallyFilled
        };
        self.transition(next);
        self.form_view()
    }

    fn form_view(&self) -> Render {
        Render::Form {
            record: self.record.clone(),
            submit_enabled: self.complete,
        }
    }

    fn review_output(&self) -> Result<(FormattedMission, MissionType), WorkflowError> {
        match (&self.formatted, self.record.mission_type) {
            (Some(formatted), Some(mission_type)) => Ok((formatted.clone(), mission_type)),
            _ => Err(WorkflowError::Incomplete {
                missing: self.record.missing_fields(),
            }),
        }
    }

    async fn persist(&self) -> Result<(), WorkflowError> {
        self.store.upsert_mission(&self.record).await.map_err(|e| {
            tracing::warn!(session_key = %self.record.session_key, error = %e, "Failed to save trade mission");
            WorkflowError::Persistence(e)
        })
    }

    fn transition(&mut self, next: WorkflowPhase) {
        if next == self.phase {
            return;
        }
        debug_assert!(
            self.phase.can_transition_to(next),
            "invalid transition {} -> {}",
            self.phase,
            next
        );
        tracing::info!(
            session_key = %self.record.session_key,
            from = %self.phase,
            to = %next,
            "Trade mission phase change"
        );
        self.phase = next;
    }
}
