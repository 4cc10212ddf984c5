//! The acknowledgment workflow state machine.
//!
//! Pure transitions only. Network calls, timers and feed updates are driven by
//! the application layer, which validates with [`WorkflowState::prepare_submission`],
//! performs the remote update, and then calls [`WorkflowState::complete`].
//!
//! ```text
//! Idle ──prompt──▶ Prompted ──dismiss──▶ Idle
//!  │                  │
//!  └──────bind────────┴──▶ AwaitingDecision ──acknowledge──▶ AwaitingEvidence ─┐
//!                              │                                               ├─submit─▶ Completed ──finish──▶ Idle
//!                              └───────reject─────────▶ AwaitingReason ────────┘
//! ```

use serde::{Deserialize, Serialize};

use super::evidence::EvidenceFile;
use crate::config::WorkflowSettings;
use crate::error::{Result, ValidationError, WorkflowError};
use crate::notification::{Notification, NotificationId};

/// Discriminant of [`WorkflowState`], exposed to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Idle,
    Prompted,
    AwaitingDecision,
    AwaitingEvidence,
    AwaitingReason,
    Completed,
}

impl WorkflowStep {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Prompted => "prompted",
            Self::AwaitingDecision => "awaiting decision",
            Self::AwaitingEvidence => "awaiting evidence",
            Self::AwaitingReason => "awaiting reason",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a workflow ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Acknowledged,
    Rejected { reason: String },
}

/// A validated submission, ready to be sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Acknowledge {
        notification_id: NotificationId,
        evidence: EvidenceFile,
    },
    Reject {
        notification_id: NotificationId,
        reason: String,
    },
}

impl Submission {
    pub fn notification_id(&self) -> NotificationId {
        match self {
            Self::Acknowledge { notification_id, .. } | Self::Reject { notification_id, .. } => {
                *notification_id
            }
        }
    }

    pub fn outcome(&self) -> WorkflowOutcome {
        match self {
            Self::Acknowledge { .. } => WorkflowOutcome::Acknowledged,
            Self::Reject { reason, .. } => WorkflowOutcome::Rejected {
                reason: reason.clone(),
            },
        }
    }
}

/// Input limits applied before anything is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowLimits {
    pub max_reason_chars: usize,
    pub max_evidence_bytes: usize,
}

impl From<&WorkflowSettings> for WorkflowLimits {
    fn from(settings: &WorkflowSettings) -> Self {
        Self {
            max_reason_chars: settings.max_reason_chars,
            max_evidence_bytes: settings.max_evidence_bytes,
        }
    }
}

impl Default for WorkflowLimits {
    fn default() -> Self {
        Self::from(&WorkflowSettings::default())
    }
}

/// Validates a rejection reason and returns it trimmed.
pub fn validate_reason(reason: &str, max_chars: usize) -> std::result::Result<String, ValidationError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyReason);
    }
    let actual = trimmed.chars().count();
    if actual > max_chars {
        return Err(ValidationError::ReasonTooLong {
            max: max_chars,
            actual,
        });
    }
    Ok(trimmed.to_string())
}

/// The in-progress flow for a single action-required notification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkflowState {
    #[default]
    Idle,
    Prompted {
        notification: Notification,
    },
    AwaitingDecision {
        notification_id: NotificationId,
    },
    AwaitingEvidence {
        notification_id: NotificationId,
        evidence: Option<EvidenceFile>,
    },
    AwaitingReason {
        notification_id: NotificationId,
        reason: String,
    },
    Completed {
        notification_id: NotificationId,
        outcome: WorkflowOutcome,
    },
}

impl WorkflowState {
    pub fn step(&self) -> WorkflowStep {
        match self {
            Self::Idle => WorkflowStep::Idle,
            Self::Prompted { .. } => WorkflowStep::Prompted,
            Self::AwaitingDecision { .. } => WorkflowStep::AwaitingDecision,
            Self::AwaitingEvidence { .. } => WorkflowStep::AwaitingEvidence,
            Self::AwaitingReason { .. } => WorkflowStep::AwaitingReason,
            Self::Completed { .. } => WorkflowStep::Completed,
        }
    }

    /// The notification this state refers to, if any.
    pub fn notification_id(&self) -> Option<NotificationId> {
        match self {
            Self::Idle => None,
            Self::Prompted { notification } => Some(notification.id),
            Self::AwaitingDecision { notification_id }
            | Self::AwaitingEvidence { notification_id, .. }
            | Self::AwaitingReason { notification_id, .. }
            | Self::Completed { notification_id, .. } => Some(*notification_id),
        }
    }

    /// True while the user is on the target screen working through the flow.
    /// A bound notification cannot be replaced in these steps.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::AwaitingDecision { .. } | Self::AwaitingEvidence { .. } | Self::AwaitingReason { .. }
        )
    }

    /// True when a prompt is showing or a flow is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Prompted { .. }) || self.is_in_progress()
    }

    fn invalid(&self, action: &'static str) -> WorkflowError {
        WorkflowError::InvalidTransition {
            step: self.step().name(),
            action,
        }
    }

    /// `Idle → Prompted`. Also allowed from `Completed`.
    pub fn prompt(&mut self, notification: Notification) -> std::result::Result<(), WorkflowError> {
        match self {
            Self::Idle | Self::Completed { .. } => {
                if !notification.is_actionable() {
                    return Err(WorkflowError::NotActionable(notification.id));
                }
                *self = Self::Prompted { notification };
                Ok(())
            }
            Self::Prompted { notification: current } if current.id == notification.id => Ok(()),
            _ => Err(self.invalid("prompt")),
        }
    }

    /// `Prompted → Idle`.
    pub fn dismiss_prompt(&mut self) -> std::result::Result<NotificationId, WorkflowError> {
        match self {
            Self::Prompted { notification } => {
                let id = notification.id;
                *self = Self::Idle;
                Ok(id)
            }
            _ => Err(self.invalid("dismiss the prompt")),
        }
    }

    /// Enters `AwaitingDecision` for `notification_id`.
    ///
    /// Re-binding the notification that is already in progress is a no-op;
    /// binding a different one while in progress is rejected.
    pub fn bind(&mut self, notification_id: NotificationId) -> std::result::Result<(), WorkflowError> {
        if self.is_in_progress() {
            return match self.notification_id() {
                Some(active) if active == notification_id => Ok(()),
                Some(active) => Err(WorkflowError::AlreadyBound {
                    active,
                    requested: notification_id,
                }),
                None => Err(self.invalid("bind")),
            };
        }
        *self = Self::AwaitingDecision { notification_id };
        Ok(())
    }

    /// `AwaitingDecision → AwaitingEvidence`.
    pub fn choose_acknowledge(&mut self) -> std::result::Result<(), WorkflowError> {
        match self {
            Self::AwaitingDecision { notification_id } => {
                let notification_id = *notification_id;
                *self = Self::AwaitingEvidence {
                    notification_id,
                    evidence: None,
                };
                Ok(())
            }
            _ => Err(self.invalid("acknowledge")),
        }
    }

    /// `AwaitingDecision → AwaitingReason`.
    pub fn choose_reject(&mut self) -> std::result::Result<(), WorkflowError> {
        match self {
            Self::AwaitingDecision { notification_id } => {
                let notification_id = *notification_id;
                *self = Self::AwaitingReason {
                    notification_id,
                    reason: String::new(),
                };
                Ok(())
            }
            _ => Err(self.invalid("reject")),
        }
    }

    /// Steps back to `AwaitingDecision`, discarding any partial input.
    pub fn back(&mut self) -> std::result::Result<(), WorkflowError> {
        match self {
            Self::AwaitingEvidence { notification_id, .. }
            | Self::AwaitingReason { notification_id, .. } => {
                let notification_id = *notification_id;
                *self = Self::AwaitingDecision { notification_id };
                Ok(())
            }
            _ => Err(self.invalid("go back")),
        }
    }

    pub fn attach_evidence(&mut self, file: EvidenceFile) -> std::result::Result<(), WorkflowError> {
        match self {
            Self::AwaitingEvidence { evidence, .. } => {
                *evidence = Some(file);
                Ok(())
            }
            _ => Err(self.invalid("attach evidence")),
        }
    }

    /// Replaces the reason text. Input longer than `max_chars` is refused,
    /// mirroring a `maxlength` input.
    pub fn set_reason(&mut self, text: &str, max_chars: usize) -> Result<()> {
        match self {
            Self::AwaitingReason { reason, .. } => {
                let actual = text.trim().chars().count();
                if actual > max_chars {
                    return Err(ValidationError::ReasonTooLong {
                        max: max_chars,
                        actual,
                    }
                    .into());
                }
                *reason = text.to_string();
                Ok(())
            }
            _ => Err(self.invalid("edit the reason").into()),
        }
    }

    /// Validates the current input without changing state.
    pub fn prepare_submission(&self, limits: WorkflowLimits) -> Result<Submission> {
        match self {
            Self::AwaitingEvidence {
                notification_id,
                evidence,
            } => {
                let evidence = evidence.as_ref().ok_or(ValidationError::MissingEvidence)?;
                evidence.validate(limits.max_evidence_bytes)?;
                Ok(Submission::Acknowledge {
                    notification_id: *notification_id,
                    evidence: evidence.clone(),
                })
            }
            Self::AwaitingReason {
                notification_id,
                reason,
            } => {
                let reason = validate_reason(reason, limits.max_reason_chars)?;
                Ok(Submission::Reject {
                    notification_id: *notification_id,
                    reason,
                })
            }
            _ => Err(self.invalid("submit").into()),
        }
    }

    /// Whether the submit action should be enabled.
    pub fn can_submit(&self, limits: WorkflowLimits) -> bool {
        self.prepare_submission(limits).is_ok()
    }

    /// Enters `Completed` after `submission` was accepted by the backend.
    pub fn complete(&mut self, submission: &Submission) -> std::result::Result<(), WorkflowError> {
        let matches_step = matches!(
            (&*self, submission),
            (Self::AwaitingEvidence { .. }, Submission::Acknowledge { .. })
                | (Self::AwaitingReason { .. }, Submission::Reject { .. })
        );
        if !matches_step {
            return Err(self.invalid("complete"));
        }
        if let Some(active) = self.notification_id()
            && active != submission.notification_id()
        {
            return Err(WorkflowError::AlreadyBound {
                active,
                requested: submission.notification_id(),
            });
        }
        *self = Self::Completed {
            notification_id: submission.notification_id(),
            outcome: submission.outcome(),
        };
        Ok(())
    }

    /// `Completed → Idle`, discarding the workflow.
    pub fn finish(&mut self) -> std::result::Result<(NotificationId, WorkflowOutcome), WorkflowError> {
        match std::mem::take(self) {
            Self::Completed {
                notification_id,
                outcome,
            } => Ok((notification_id, outcome)),
            other => {
                *self = other;
                Err(self.invalid("finish"))
            }
        }
    }
}
