//! Translation assignment queue: who translates what, and where each
//! assignment sits in its lifecycle.

pub mod assignment;
pub mod repository;
pub mod service;

pub use assignment::{
    next_status, AssignmentStatus, AssignmentType, ContentState, ContractView, DueState, Priority,
    QueueRow, QueueTransition, TranslationAssignment, DUE_SOON_HOURS,
};
pub use repository::{AssignmentFilter, AssignmentRepository, MemoryAssignmentRepository};
pub use service::{
    invalid_transition, required_permission, CreateAssignmentInput,
    DefaultTranslationQueueService, TranslationQueueService, TRANSLATIONS_VIEW,
};
