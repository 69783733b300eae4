//! Trade mission form: record, formatting, and the workflow state machine.

pub mod format;
pub mod model;
pub mod sessions;
pub mod state;
pub mod workflow;

pub use format::FormattedMission;
pub use model::{MissionType, TradeRecord};
pub use sessions::SessionRegistry;
pub use state::WorkflowPhase;
pub use workflow::{Action, Render, SessionContext, TradeWorkflow};
