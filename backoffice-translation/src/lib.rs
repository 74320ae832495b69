//! Backoffice Translation - readiness, policy, exchange and the assignment queue
//!
//! Everything a panel needs to reason about localized records:
//! - [`requirements`]: which locales and fields a transition needs, resolved
//!   per entity, transition and environment
//! - [`readiness`]: per-record readiness summaries, cached per request
//! - [`policy`]: the publish gate that turns missing locales into a structured
//!   `translation_missing` error
//! - [`grouping`]: folding list rows into translation groups
//! - [`exchange`] and [`jobs`]: CSV/JSON export and import of translatable
//!   fields with source-hash conflict detection
//! - [`queue`]: translator assignments with a versioned state machine
//!
//! # Architecture
//!
//! ```text
//!   RequirementsProvider ──► ReadinessEngine ──► panel rows (_action_state)
//!            │
//!            └──────────► TranslationPolicy ──► publish gate
//!
//!   Repository ◄── ExchangeService ──► JobStore
//!   AssignmentRepository ◄── TranslationQueueService ──► ActivitySink
//! ```

pub mod exchange;
pub mod grouping;
pub mod jobs;
pub mod locale;
pub mod policy;
pub mod queue;
pub mod readiness;
pub mod requirements;

pub use exchange::{
    ApplyOptions, ExchangeCodec, ExchangeFormat, ExchangeResult, ExchangeRow, ExchangeService,
    ExchangeSummary, ExportFilter, ExportResult, RowResult, RowStatus,
};
pub use grouping::{group_by_translation, GroupMember, GroupSummary, GroupedRow, TranslationGroup};
pub use jobs::{ExchangeJob, JobKind, JobProgress, JobStatus, JobStore, MemoryJobStore};
pub use locale::normalize_locale;
pub use policy::{
    DefaultTranslationPolicy, PolicyRequirements, RepositoryTranslationService, TranslationCheck,
    TranslationCheckOptions, TranslationPolicy, TranslationService,
};
pub use queue::{
    AssignmentRepository, AssignmentStatus, DefaultTranslationQueueService,
    MemoryAssignmentRepository, QueueRow, TranslationAssignment, TranslationQueueService,
};
pub use readiness::{
    derive_readiness, ReadinessEngine, ReadinessOptions, ReadinessState, TranslationReadiness,
    PUBLISH_TRANSITION,
};
pub use requirements::{
    PolicyInput, RequiredFieldsStrategy, RequirementsConfig, RequirementsProvider,
    StaticRequirementsProvider, TranslationRequirements,
};
