//! Acknowledgment workflow module.
//!
//! - `state`: the pure workflow state machine (`WorkflowState`)
//! - `evidence`: the confirmation file attached on acknowledge (`EvidenceFile`)
//! - `handoff`: one-shot intent passed from the entry screen to the target
//!   screen (`Handoff`, `HandoffSlot`)

mod evidence;
mod handoff;
mod state;

pub use evidence::EvidenceFile;
pub use handoff::{Handoff, HandoffSlot};
pub use state::{
    Submission, WorkflowLimits, WorkflowOutcome, WorkflowState, WorkflowStep, validate_reason,
};
