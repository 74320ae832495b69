//! Translation assignments and their state machine.
//!
//! ```text
//! pending ──assign──► assigned ──claim──► in_progress ──submit_review──► review
//!    │                   ▲                    │                            │
//!    └─claim(open_pool)──┼────────────────────┘                  approve / reject
//!                        │                                         │         │
//!            release ◄───┴── assigned | in_progress | rejected   approved  rejected
//!                                                                  │
//!                                                               publish ──► published
//!
//! any non-terminal status except published ──archive──► archived
//! ```

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    /// Assigned by a manager; cannot be claimed while pending
    #[default]
    Direct,
    /// Any translator may claim it
    OpenPool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Review,
    Approved,
    Published,
    Rejected,
    Archived,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Approved => "approved",
            Self::Published => "published",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
        }
    }

    /// Published and archived assignments never move again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Archived)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Queue operations that move an assignment between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueTransition {
    Assign,
    Claim,
    Release,
    SubmitReview,
    Approve,
    Reject,
    Archive,
    Publish,
}

impl QueueTransition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assign => "assign",
            Self::Claim => "claim",
            Self::Release => "release",
            Self::SubmitReview => "submit_review",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Archive => "archive",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for QueueTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reached by applying `transition`, if it is allowed.
pub fn next_status(
    status: AssignmentStatus,
    assignment_type: AssignmentType,
    transition: QueueTransition,
) -> Option<AssignmentStatus> {
    use AssignmentStatus::*;
    use QueueTransition as T;

    if status.is_terminal() {
        return None;
    }
    match (transition, status) {
        (T::Assign, Pending) => Some(Assigned),
        (T::Claim, Pending) if assignment_type == AssignmentType::OpenPool => Some(InProgress),
        (T::Claim, Assigned | Rejected) => Some(InProgress),
        (T::Release, Assigned | InProgress | Rejected) => Some(Pending),
        (T::SubmitReview, InProgress) => Some(Review),
        (T::Approve, Review) => Some(Approved),
        (T::Reject, Review) => Some(Rejected),
        (T::Publish, Approved) => Some(Published),
        (T::Archive, _) => Some(Archived),
        _ => None,
    }
}

/// Work to translate one record into one locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct TranslationAssignment {
    pub id: String,
    pub translation_group_id: String,
    pub entity_type: String,
    pub source_record_id: String,
    pub source_locale: String,
    pub target_locale: String,
    pub assignment_type: AssignmentType,
    pub status: AssignmentStatus,
    pub priority: Priority,
    #[serde(default)]
    pub assignee_id: String,
    #[serde(default)]
    pub assigner_id: String,
    #[serde(default)]
    #[cfg_attr(feature = "typescript", ts(type = "string | null"))]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[cfg_attr(feature = "typescript", ts(type = "string | null"))]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[cfg_attr(feature = "typescript", ts(type = "string | null"))]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[cfg_attr(feature = "typescript", ts(type = "string | null"))]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[cfg_attr(feature = "typescript", ts(type = "string | null"))]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_reviewer_id: String,
    #[serde(default)]
    pub last_rejection_reason: String,
    pub version: u64,
    #[cfg_attr(feature = "typescript", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "typescript", ts(type = "string"))]
    pub updated_at: DateTime<Utc>,
}

impl TranslationAssignment {
    /// Lowercased, trimmed `(group, entity type, source, target)`.
    pub fn active_uniqueness_key(&self) -> String {
        [
            &self.translation_group_id,
            &self.entity_type,
            &self.source_locale,
            &self.target_locale,
        ]
        .iter()
        .map(|part| part.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join("|")
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn next_status(&self, transition: QueueTransition) -> Option<AssignmentStatus> {
        next_status(self.status, self.assignment_type, transition)
    }

    pub fn contract_view(&self, now: DateTime<Utc>) -> ContractView {
        let content_state = match self.status {
            AssignmentStatus::Review | AssignmentStatus::Approved | AssignmentStatus::Published => {
                ContentState::Review
            }
            _ => ContentState::Draft,
        };
        let settled = self.status.is_terminal() || self.status == AssignmentStatus::Approved;
        let due_state = match self.due_date {
            None => DueState::None,
            Some(_) if settled => DueState::None,
            Some(due) if due < now => DueState::Overdue,
            Some(due) if due - now <= Duration::hours(DUE_SOON_HOURS) => DueState::Due,
            Some(_) => DueState::None,
        };
        ContractView {
            queue_state: self.status,
            content_state,
            due_state,
        }
    }
}

/// Window before the due date in which an assignment counts as due.
pub const DUE_SOON_HOURS: i64 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(rename_all = "snake_case")]
pub enum ContentState {
    Draft,
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(rename_all = "snake_case")]
pub enum DueState {
    None,
    Due,
    Overdue,
}

/// Derived view shipped with queue rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
pub struct ContractView {
    pub queue_state: AssignmentStatus,
    pub content_state: ContentState,
    pub due_state: DueState,
}

/// Assignment plus its contract view, flattened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRow {
    #[serde(flatten)]
    pub assignment: TranslationAssignment,
    #[serde(flatten)]
    pub contract: ContractView,
}

impl QueueRow {
    pub fn new(assignment: TranslationAssignment, now: DateTime<Utc>) -> Self {
        let contract = assignment.contract_view(now);
        Self {
            assignment,
            contract,
        }
    }
}
