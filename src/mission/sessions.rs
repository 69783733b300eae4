//! Registry of live trade mission workflows, keyed by session key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use super::workflow::{Action, Render, SessionContext, TradeWorkflow};
use crate::error::WorkflowError;
use crate::publish::PublishGateway;
use crate::store::MissionStore;

/// Shared handle to one workflow. Locking serializes its interactions.
pub type SharedWorkflow = Arc<Mutex<TradeWorkflow>>;

struct SessionEntry {
    workflow: SharedWorkflow,
    last_active: Instant,
}

impl SessionEntry {
    fn new(workflow: SharedWorkflow) -> Self {
        Self {
            workflow,
            last_active: Instant::now(),
        }
    }
}

/// Live workflows. Terminal ones are dropped as soon as they finish;
/// abandoned ones are dropped by `prune_idle`.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    store: Arc<dyn MissionStore>,
    gateway: Option<Arc<dyn PublishGateway>>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn MissionStore>, gateway: Option<Arc<dyn PublishGateway>>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            gateway,
        }
    }

    /// Whether a publish gateway is configured.
    pub fn can_publish(&self) -> bool {
        self.gateway.is_some()
    }

    /// Start a workflow for `session_key`, or return the live one.
    pub async fn open(&self, session_key: &str) -> SharedWorkflow {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get_mut(session_key) {
            existing.last_active = Instant::now();
            return Arc::clone(&existing.workflow);
        }
        let workflow = Arc::new(Mutex::new(TradeWorkflow::new(
            Arc::clone(&self.store),
            self.gateway.clone(),
        )));
        sessions.insert(
            session_key.to_string(),
            SessionEntry::new(Arc::clone(&workflow)),
        );
        tracing::debug!(session_key, "Trade mission session opened");
        workflow
    }

    pub async fn get(&self, session_key: &str) -> Option<SharedWorkflow> {
        self.sessions
            .read()
            .await
            .get(session_key)
            .map(|entry| Arc::clone(&entry.workflow))
    }

    /// Apply `action` to the session named by `ctx`.
    ///
    /// The session is retired once its workflow reaches a terminal phase.
    pub async fn handle(
        &self,
        ctx: &SessionContext,
        action: Action,
    ) -> Result<Render, WorkflowError> {
        let workflow = self
            .get(&ctx.session_key)
            .await
            .ok_or_else(|| WorkflowError::UnknownSession(ctx.session_key.clone()))?;

        let mut guard = workflow.lock().await;
        let result = guard.apply(ctx, action).await;
        let terminal = guard.phase().is_terminal();
        drop(guard);

        if terminal {
            self.retire(&ctx.session_key).await;
        } else {
            self.touch(&ctx.session_key).await;
        }
        result
    }

    /// Current render for a live session.
    pub async fn current_view(&self, session_key: &str) -> Option<Render> {
        let workflow = self.get(session_key).await?;
        let guard = workflow.lock().await;
        Some(guard.current_view())
    }

    pub async fn retire(&self, session_key: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_key).is_some();
        if removed {
            tracing::debug!(session_key, "Trade mission session retired");
        }
        removed
    }

    /// Drop sessions nobody has interacted with for `idle_timeout`.
    ///
    /// A session whose workflow is mid-interaction is kept. Returns the
    /// number of sessions dropped.
    pub async fn prune_idle(&self, idle_timeout: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|session_key, entry| {
            let busy = entry.workflow.try_lock().is_err();
            let keep = busy || entry.last_active.elapsed() < idle_timeout;
            if !keep {
                tracing::debug!(session_key = %session_key, "Idle trade mission session dropped");
            }
            keep
        });
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::info!(pruned, live = sessions.len(), "Pruned idle trade mission sessions");
        }
        pruned
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn touch(&self, session_key: &str) {
        if let Some(entry) = self.sessions.write().await.get_mut(session_key) {
            entry.last_active = Instant::now();
        }
    }
}
