pub mod handle;

use crate::account::{Permission, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a reported facility issue with a lifecycle status.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Ticket {
    /// The only id of this ticket.
    pub id: u64,
    /// The reporter of this ticket in account id.
    pub reporter: u64,
    pub classroom: String,
    pub unit_id: String,
    pub issue_type: String,
    pub issue_subtype: Option<String>,
    pub description: String,
    /// Hash of an attached image, if any.
    pub image: Option<u64>,
    pub status: TicketStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Required free-text justification recorded when the ticket
    /// transitions to resolved.
    pub resolution_note: Option<String>,
    /// The class representative that approved or rejected this ticket.
    pub reviewed_by: Option<u64>,
}

impl Ticket {
    /// Refresh the update timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

/// Describes the lifecycle status of a ticket.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TicketStatus {
    /// Submitted, waiting for a class representative decision.
    Pending,
    /// Approved by a class representative, waiting for an admin to
    /// start working on it.
    Approved,
    /// An admin is working on the issue.
    InProgress,
    /// Fixed, with a resolution note attached. Terminal.
    Resolved,
    /// Declined by a class representative. Terminal.
    Rejected,
}

impl TicketStatus {
    /// Run the status state machine for one action.
    ///
    /// This is the only legal way to change a ticket's status: the
    /// actor's role must grant the permission the action needs, and the
    /// `(status, action)` pair must be in the transition table below.
    /// Everything else is an error, so no caller can write an arbitrary
    /// status onto a ticket.
    ///
    /// ```text
    /// pending --approve--> approved --start--> in-progress --resolve--> resolved
    /// pending --reject---> rejected
    /// ```
    pub fn transition(
        self,
        action: &TicketAction,
        actor: Role,
    ) -> Result<TicketStatus, TransitionError> {
        if !actor.has_permission(action.required_permission()) {
            return Err(TransitionError::RoleNotAllowed {
                action: action.name(),
                role: actor,
            });
        }

        match (self, action) {
            (TicketStatus::Pending, TicketAction::Approve) => Ok(TicketStatus::Approved),
            (TicketStatus::Pending, TicketAction::Reject) => Ok(TicketStatus::Rejected),
            (TicketStatus::Approved, TicketAction::Start) => Ok(TicketStatus::InProgress),
            (TicketStatus::InProgress, TicketAction::Resolve { note }) => {
                if note.trim().is_empty() {
                    Err(TransitionError::EmptyResolutionNote)
                } else {
                    Ok(TicketStatus::Resolved)
                }
            }
            (from, action) => Err(TransitionError::InvalidStatus {
                from,
                action: action.name(),
            }),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TicketStatus::Pending => "pending",
            TicketStatus::Approved => "approved",
            TicketStatus::InProgress => "in-progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Rejected => "rejected",
        })
    }
}

/// An action performed on a ticket's status.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum TicketAction {
    /// Accept a pending ticket for resolution.
    Approve,
    /// Decline a pending ticket.
    Reject,
    /// Start working on an approved ticket.
    Start,
    /// Mark an in-progress ticket as fixed.
    Resolve {
        /// Justification, must not be blank.
        note: String,
    },
}

impl TicketAction {
    pub fn name(&self) -> &'static str {
        match self {
            TicketAction::Approve => "approve",
            TicketAction::Reject => "reject",
            TicketAction::Start => "start",
            TicketAction::Resolve { .. } => "resolve",
        }
    }

    /// The permission an actor needs to perform this action.
    pub fn required_permission(&self) -> Permission {
        match self {
            TicketAction::Approve | TicketAction::Reject => Permission::Review,
            TicketAction::Start | TicketAction::Resolve { .. } => Permission::Advance,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("role {role} is not allowed to {action} tickets")]
    RoleNotAllowed { action: &'static str, role: Role },
    #[error("cannot {action} a ticket in status {from}")]
    InvalidStatus {
        from: TicketStatus,
        action: &'static str,
    },
    #[error("resolution note must not be empty")]
    EmptyResolutionNote,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(note: &str) -> TicketAction {
        TicketAction::Resolve {
            note: note.to_string(),
        }
    }

    #[test]
    fn legal_path_to_resolved() {
        let status = TicketStatus::Pending
            .transition(&TicketAction::Approve, Role::ClassRepresentative)
            .unwrap();
        assert_eq!(status, TicketStatus::Approved);

        let status = status.transition(&TicketAction::Start, Role::Admin).unwrap();
        assert_eq!(status, TicketStatus::InProgress);

        let status = status
            .transition(&resolve("replaced the bulb"), Role::Admin)
            .unwrap();
        assert_eq!(status, TicketStatus::Resolved);
    }

    #[test]
    fn reject_is_terminal() {
        let status = TicketStatus::Pending
            .transition(&TicketAction::Reject, Role::ClassRepresentative)
            .unwrap();
        assert_eq!(status, TicketStatus::Rejected);

        for action in [
            TicketAction::Approve,
            TicketAction::Reject,
            TicketAction::Start,
            resolve("note"),
        ] {
            let actor = match action.required_permission() {
                Permission::Review => Role::ClassRepresentative,
                _ => Role::Admin,
            };
            assert!(matches!(
                status.transition(&action, actor),
                Err(TransitionError::InvalidStatus { .. })
            ));
        }
    }

    #[test]
    fn resolved_is_terminal() {
        for action in [
            TicketAction::Approve,
            TicketAction::Reject,
            TicketAction::Start,
            resolve("again"),
        ] {
            let actor = match action.required_permission() {
                Permission::Review => Role::ClassRepresentative,
                _ => Role::Admin,
            };
            assert!(TicketStatus::Resolved.transition(&action, actor).is_err());
        }
    }

    #[test]
    fn blank_resolution_note_is_refused() {
        for note in ["", "   ", "\n\t"] {
            assert_eq!(
                TicketStatus::InProgress.transition(&resolve(note), Role::Admin),
                Err(TransitionError::EmptyResolutionNote)
            );
        }

        // The status must not move either way.
        assert!(TicketStatus::InProgress
            .transition(&resolve("fixed"), Role::Admin)
            .is_ok());
    }

    #[test]
    fn students_cannot_run_any_action() {
        for action in [
            TicketAction::Approve,
            TicketAction::Reject,
            TicketAction::Start,
            resolve("note"),
        ] {
            assert!(matches!(
                TicketStatus::Pending.transition(&action, Role::Student),
                Err(TransitionError::RoleNotAllowed { .. })
            ));
        }
    }

    #[test]
    fn review_and_advance_roles_do_not_overlap() {
        // Class representatives cannot move tickets past approval.
        assert!(matches!(
            TicketStatus::Approved.transition(&TicketAction::Start, Role::ClassRepresentative),
            Err(TransitionError::RoleNotAllowed { .. })
        ));

        // Admins do not take part in the triage step.
        assert!(matches!(
            TicketStatus::Pending.transition(&TicketAction::Approve, Role::Admin),
            Err(TransitionError::RoleNotAllowed { .. })
        ));
    }

    #[test]
    fn approved_skips_are_refused() {
        assert!(matches!(
            TicketStatus::Pending.transition(&TicketAction::Start, Role::Admin),
            Err(TransitionError::InvalidStatus { .. })
        ));
        assert!(matches!(
            TicketStatus::Approved.transition(&resolve("too early"), Role::Admin),
            Err(TransitionError::InvalidStatus { .. })
        ));
    }
}
