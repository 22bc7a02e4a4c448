use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct GetImageDescriptor {
    pub hash: u64,
}

#[derive(Serialize, Deserialize)]
pub struct TicketDescriptor {
    pub classroom: String,
    pub unit_id: String,
    pub issue_type: String,
    pub issue_subtype: Option<String>,
    pub description: String,
    /// Hash of a previously uploaded image.
    pub image: Option<u64>,
}

#[derive(Serialize, Deserialize)]
pub struct GetTicketsDescriptor {
    pub filters: Vec<GetTicketsFilter>,
}

#[derive(Serialize, Deserialize, Clone)]
pub enum GetTicketsFilter {
    /// Tickets that match target status.
    Status(super::TicketStatus),
    /// Tickets reported by target account.
    Reporter(u64),
    /// Tickets reported by the requesting account.
    Mine,
    /// Pending tickets reported by somebody else, waiting for the
    /// requesting account's review. Own tickets never show up here.
    ReviewQueue,
    /// Tickets whose description, classroom or issue type contains
    /// target keywords.
    Keyword(String),
}

#[derive(Serialize, Deserialize)]
pub struct EditTicketDescriptor {
    pub ticket: u64,
    pub variants: Vec<EditTicketVariant>,
}

#[derive(Serialize, Deserialize, Clone)]
pub enum EditTicketVariant {
    Classroom(String),
    UnitId(String),
    IssueType(String),
    IssueSubtype(Option<String>),
    Description(String),
    Image(Option<u64>),
}

#[derive(Serialize, Deserialize)]
pub struct GetTicketsInfoDescriptor {
    pub tickets: Vec<u64>,
}

#[derive(Serialize, Deserialize)]
pub enum GetTicketInfoResult {
    Full(super::Ticket),
    NotFound(
        /// Target ticket id
        u64,
    ),
}

#[derive(Serialize, Deserialize)]
pub struct ReviewTicketDescriptor {
    pub ticket: u64,
    pub variant: ReviewTicketVariant,
}

#[derive(Serialize, Deserialize, Clone, Copy)]
pub enum ReviewTicketVariant {
    Approve,
    Reject,
}

impl ReviewTicketVariant {
    pub fn action(self) -> super::TicketAction {
        match self {
            ReviewTicketVariant::Approve => super::TicketAction::Approve,
            ReviewTicketVariant::Reject => super::TicketAction::Reject,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct AdvanceTicketDescriptor {
    pub ticket: u64,
    pub variant: AdvanceTicketVariant,
}

#[derive(Serialize, Deserialize, Clone)]
pub enum AdvanceTicketVariant {
    Start,
    Resolve {
        /// Justification, must not be blank.
        note: String,
    },
}

impl AdvanceTicketVariant {
    pub fn action(self) -> super::TicketAction {
        match self {
            AdvanceTicketVariant::Start => super::TicketAction::Start,
            AdvanceTicketVariant::Resolve { note } => super::TicketAction::Resolve { note },
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct DeleteTicketDescriptor {
    pub ticket: u64,
}

/// Per-status counts over a set of tickets.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct TicketStats {
    pub pending: usize,
    pub approved: usize,
    pub in_progress: usize,
    pub resolved: usize,
    pub rejected: usize,
    pub total: usize,
}

impl TicketStats {
    pub fn count(&mut self, status: super::TicketStatus) {
        match status {
            super::TicketStatus::Pending => self.pending += 1,
            super::TicketStatus::Approved => self.approved += 1,
            super::TicketStatus::InProgress => self.in_progress += 1,
            super::TicketStatus::Resolved => self.resolved += 1,
            super::TicketStatus::Rejected => self.rejected += 1,
        }
        self.total += 1;
    }
}

/// The dashboard payload for one role. Selecting the variant is an
/// exhaustive match on the account's role, with no default arm.
#[derive(Serialize, Deserialize, Debug)]
pub enum DashboardView {
    Student {
        /// Counts over the account's own tickets.
        stats: TicketStats,
    },
    ClassRepresentative {
        stats: TicketStats,
        /// Pending tickets by other reporters waiting for review.
        review_queue: usize,
    },
    Admin {
        /// Counts over every ticket in the store.
        stats: TicketStats,
        /// Accounts with a pending role upgrade request.
        role_requests: usize,
    },
}
