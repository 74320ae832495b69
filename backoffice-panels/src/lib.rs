//! Backoffice Panels - list/detail screens with action state
//!
//! A panel wraps one repository and decorates every record it returns with
//! `_action_state`: for each declared action, whether it can run now and
//! why not. Publishing is gated by the translation policy; translations are
//! minted with `create_translation`; boot validation catches actions wired to
//! nothing.
//!
//! # Architecture
//!
//! ```text
//!            AdminConfig ──► AdminRuntime
//!                                 │
//!                          PanelRegistry ──► validate_wiring
//!                                 │
//!                           PanelBinding
//!      ┌──────────────┬──────────┴─────────┬───────────────────┐
//!      ▼              ▼                    ▼                   ▼
//! ┌──────────┐  ┌────────────┐   ┌──────────────────┐  ┌──────────────┐
//! │Repository│  │ Readiness  │   │  ActionResolver  │  │ Workflow /   │
//! │          │  │  batch     │   │ (_action_state)  │  │ CommandBus   │
//! └──────────┘  └────────────┘   └──────────────────┘  └──────────────┘
//! ```

pub mod action;
pub mod binding;
pub mod config;
pub mod create_translation;
pub mod envelope;
pub mod panel;
pub mod resolver;
pub mod runtime;
pub mod wiring;

pub use action::{Action, ActionAvailability, ActionType, ReasonCode, CREATE_TRANSLATION};
pub use binding::{ActionOutcome, BulkOutcome, PanelBinding};
pub use config::{AdminConfig, ConfigError, PanelConfig};
pub use create_translation::{
    create_translation, localize_path, localize_slug, prepare_translation,
    CreateTranslationResponse, DRAFT_STATUS,
};
pub use envelope::{GroupEnvelope, ListResponse, ListRow, RecordEnvelope};
pub use panel::{Panel, PanelRegistry};
pub use resolver::{translation_blocker_reason, ActionResolver};
pub use runtime::AdminRuntime;
pub use wiring::{issues_to_error, validate_panel, WiringIssue};
