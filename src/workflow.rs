//! Outreach approval state machine and the advisory role gate.
//!
//! The remote store validates every transition. These checks only decide
//! which controls are offered and keep obviously futile requests from being
//! issued.
use crate::model::{ActorRole, OutreachItem, OutreachStatus};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutreachAction {
    Edit,
    Approve,
    Reject,
    Send,
    /// Drafting new items; not tied to any single item's status.
    Generate,
}

impl OutreachAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutreachAction::Edit => "edit",
            OutreachAction::Approve => "approve",
            OutreachAction::Reject => "reject",
            OutreachAction::Send => "send",
            OutreachAction::Generate => "generate",
        }
    }
}

impl fmt::Display for OutreachAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `role` may review, send or generate outreach at all.
pub fn can_act(role: ActorRole) -> bool {
    match role {
        ActorRole::Admin | ActorRole::Reviewer => true,
        ActorRole::Viewer => false,
    }
}

impl OutreachStatus {
    pub fn allows(&self, action: OutreachAction) -> bool {
        self.after(action).is_some()
    }

    /// Status the remote store moves an item to when `action` succeeds.
    pub fn after(&self, action: OutreachAction) -> Option<OutreachStatus> {
        use OutreachAction::*;
        use OutreachStatus::*;
        match (self, action) {
            (Generated | UnderReview, Edit) => Some(Edited),
            (Generated | UnderReview | Edited, Approve) => Some(Approved),
            (Generated | UnderReview | Edited, Reject) => Some(Rejected),
            (Approved, Send) => Some(Sent),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("role {0} is read-only")]
    NotPermitted(ActorRole),
    #[error("cannot {action} an outreach item that is {from}")]
    InvalidState {
        from: OutreachStatus,
        action: OutreachAction,
    },
}

/// Checks the role first, then the source state.
pub fn check_transition(
    role: ActorRole,
    from: OutreachStatus,
    action: OutreachAction,
) -> Result<OutreachStatus, TransitionError> {
    if !can_act(role) {
        return Err(TransitionError::NotPermitted(role));
    }
    from.after(action)
        .ok_or(TransitionError::InvalidState { from, action })
}

/// Enabled state of the per-item review controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub edit: bool,
    pub approve: bool,
    pub reject: bool,
    pub send: bool,
}

impl Controls {
    pub fn for_status(role: ActorRole, status: OutreachStatus) -> Self {
        let enabled = |action| check_transition(role, status, action).is_ok();
        Self {
            edit: enabled(OutreachAction::Edit),
            approve: enabled(OutreachAction::Approve),
            reject: enabled(OutreachAction::Reject),
            send: enabled(OutreachAction::Send),
        }
    }

    pub fn for_item(role: ActorRole, item: &OutreachItem) -> Self {
        Self::for_status(role, item.status)
    }

    pub fn enabled(&self, action: OutreachAction) -> bool {
        match action {
            OutreachAction::Edit => self.edit,
            OutreachAction::Approve => self.approve,
            OutreachAction::Reject => self.reject,
            OutreachAction::Send => self.send,
            OutreachAction::Generate => false,
        }
    }
}
