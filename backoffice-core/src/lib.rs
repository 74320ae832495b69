//! Backoffice Core - records, repositories, commands and workflows
//!
//! The foundation every panel sits on:
//! - Untyped [`Record`]s and the [`Repository`] contract with an in-memory
//!   filter pipeline and CMS update merge rules
//! - A typed [`CommandBus`] with a name table for payload-driven dispatch
//! - Per-entity-type [`WorkflowEngine`]s with an action alias table
//! - The shared [`AdminError`] taxonomy, feature flags, permissions and the
//!   activity log
//!
//! # Architecture
//!
//! ```text
//!            AdminContext (user, locale, scope, cancel)
//!                         │
//!      ┌──────────────────┼──────────────────┐
//!      ▼                  ▼                  ▼
//! ┌────────────┐   ┌─────────────┐   ┌────────────────┐
//! │ Repository │   │ CommandBus  │   │ WorkflowEngine │
//! │ (records)  │   │ (handlers)  │   │ (transitions)  │
//! └────────────┘   └─────────────┘   └────────────────┘
//! ```

pub mod activity;
pub mod bus;
pub mod context;
pub mod error;
pub mod features;
pub mod filter;
pub mod permissions;
pub mod record;
pub mod repository;
pub mod workflow;

// Re-export main types for convenience
pub use activity::{ActivityEntry, ActivitySink, MemoryActivitySink};
pub use bus::{
    CommandBus, CommandCatalog, CommandHandler, Message, Query, QueryHandler, Subscription,
};
pub use context::{Actor, AdminContext, CancelHandle, CancelSignal, Scope};
pub use error::{
    AdminError, DefaultErrorPresenter, ErrorKind, ErrorPresenter, Metadata,
    MissingTranslationsError, PresentedError, Result,
};
pub use features::{FeatureFlags, FeatureGate, FeatureKey};
pub use filter::{ListOptions, Operator, Predicate};
pub use permissions::{AllowAll, Authorizer, Permission, StaticAuthorizer};
pub use record::Record;
pub use repository::{
    CreateTranslationInput, ListResult, MemoryRepository, Repository, TranslationCreator,
};
pub use workflow::{
    MemoryWorkflowEngine, TransitionAliases, TransitionInput, TransitionResult,
    WorkflowDefinition, WorkflowEngine, WorkflowTransition,
};
