//! Panel actions and their per-record availability.

use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use backoffice_core::workflow::{is_passive_action, is_workflow_action, normalize_action};
use backoffice_core::FeatureKey;

/// Mints a locale sibling of the record.
pub const CREATE_TRANSLATION: &str = "create_translation";

/// Where an action is offered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    #[default]
    Row,
    Bulk,
}

/// A declared panel action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Action {
    pub name: String,
    /// Name-table entry dispatched through the command bus
    #[serde(default)]
    pub command_name: String,
    #[serde(default)]
    pub permission: String,
    /// Dotted paths that must resolve to non-empty values on the record
    #[serde(default)]
    pub context_required: Vec<String>,
    #[serde(default)]
    pub href: String,
    #[serde(default, rename = "type")]
    pub action_type: ActionType,
    /// Feature the action belongs to, beyond the implicit ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<FeatureKey>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn bulk(name: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Bulk,
            ..Self::new(name)
        }
    }

    pub fn with_command(mut self, command_name: impl Into<String>) -> Self {
        self.command_name = command_name.into();
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = permission.into();
        self
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = href.into();
        self
    }

    pub fn requires(mut self, path: impl Into<String>) -> Self {
        self.context_required.push(path.into());
        self
    }

    pub fn with_feature(mut self, feature: FeatureKey) -> Self {
        self.feature = Some(feature);
        self
    }

    /// Lowercased, trimmed name.
    pub fn key(&self) -> String {
        normalize_action(&self.name)
    }

    /// `view`, `edit` and `delete` without a command or link.
    pub fn is_passive(&self) -> bool {
        self.command_name.is_empty() && self.href.is_empty() && is_passive_action(&self.name)
    }

    pub fn is_workflow(&self) -> bool {
        is_workflow_action(&self.name)
    }

    pub fn is_create_translation(&self) -> bool {
        self.key() == CREATE_TRANSLATION
    }

    pub fn is_bulk(&self) -> bool {
        self.action_type == ActionType::Bulk
    }

    /// Features that must be on: the declared one, `bulk` for bulk actions
    /// and `commands` for command-backed actions.
    pub fn features(&self) -> Vec<FeatureKey> {
        let mut keys: Vec<FeatureKey> = self.feature.into_iter().collect();
        if self.is_bulk() {
            keys.push(FeatureKey::Bulk);
        }
        if !self.command_name.is_empty() {
            keys.push(FeatureKey::Commands);
        }
        keys.dedup();
        keys
    }
}

/// Why an action is disabled. The vocabulary is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    TranslationMissing,
    InvalidStatus,
    PermissionDenied,
    MissingContext,
    FeatureDisabled,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 5] = [
        Self::TranslationMissing,
        Self::InvalidStatus,
        Self::PermissionDenied,
        Self::MissingContext,
        Self::FeatureDisabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TranslationMissing => "TRANSLATION_MISSING",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::MissingContext => "MISSING_CONTEXT",
            Self::FeatureDisabled => "FEATURE_DISABLED",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry under `_action_state[name]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ActionAvailability {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<ReasonCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_transitions: Option<Vec<String>>,
}

impl ActionAvailability {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            reason: None,
            reason_code: None,
            available_transitions: None,
        }
    }

    pub fn disabled(code: ReasonCode, reason: impl Into<String>) -> Self {
        Self {
            enabled: false,
            reason: Some(reason.into()),
            reason_code: Some(code),
            available_transitions: None,
        }
    }

    pub fn with_transitions(mut self, transitions: Vec<String>) -> Self {
        self.available_transitions = Some(transitions);
        self
    }
}
