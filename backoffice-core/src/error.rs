//! Error taxonomy shared by every backoffice crate.
//!
//! Each variant maps to a stable kind, a `TEXT_CODE` for clients and an HTTP
//! status hint. Transports stay out of this crate; they call
//! [`AdminError::status`] and [`ErrorPresenter::present`] to build a body.

use std::collections::BTreeMap;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Free-form error metadata attached to presented errors.
pub type Metadata = Map<String, Value>;

/// Result type alias for backoffice operations
pub type Result<T> = std::result::Result<T, AdminError>;

/// Stable error kinds. Clients branch on these, never on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    PermissionDenied,
    Conflict,
    TranslationMissing,
    FeatureDisabled,
    ServiceUnavailable,
    UnsupportedFormat,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::Conflict => "conflict",
            Self::TranslationMissing => "translation_missing",
            Self::FeatureDisabled => "feature_disabled",
            Self::ServiceUnavailable => "service_unavailable",
            Self::UnsupportedFormat => "unsupported_format",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }

    /// Uppercase code emitted in presented error bodies.
    pub fn text_code(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Conflict => "CONFLICT",
            Self::TranslationMissing => "TRANSLATION_MISSING",
            Self::FeatureDisabled => "FEATURE_DISABLED",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Failure raised when a transition is blocked by missing translations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, thiserror::Error)]
#[error(
    "missing required translations for {entity_type} {entity_id} ({transition}): {}",
    .missing_locales.join(", ")
)]
pub struct MissingTranslationsError {
    pub entity_type: String,
    pub entity_id: String,
    pub transition: String,
    pub requested_locale: String,
    pub environment: String,
    pub policy_entity: String,
    pub missing_locales: Vec<String>,
    pub missing_fields_by_locale: BTreeMap<String, Vec<String>>,
    /// True when required fields were part of the evaluation
    pub required_fields_evaluated: bool,
}

impl MissingTranslationsError {
    fn metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("entity_type".into(), json!(self.entity_type));
        meta.insert("entity_id".into(), json!(self.entity_id));
        meta.insert("transition".into(), json!(self.transition));
        meta.insert("requested_locale".into(), json!(self.requested_locale));
        meta.insert("environment".into(), json!(self.environment));
        meta.insert("policy_entity".into(), json!(self.policy_entity));
        meta.insert("missing_locales".into(), json!(self.missing_locales));
        if self.required_fields_evaluated {
            meta.insert(
                "missing_fields_by_locale".into(),
                json!(self.missing_fields_by_locale),
            );
        }
        meta.insert(
            "required_fields_evaluated".into(),
            json!(self.required_fields_evaluated),
        );
        meta
    }
}

/// Main error type for backoffice operations
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
        component: Option<String>,
        metadata: Metadata,
    },

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("permission denied: {permission}")]
    PermissionDenied { permission: String },

    #[error("{message}")]
    Conflict {
        conflict_type: String,
        message: String,
        metadata: Metadata,
    },

    #[error("workflow not found for entity type {entity_type}")]
    WorkflowNotFound { entity_type: String },

    #[error("transition {transition} is not available from state {from_state} on {entity_type}")]
    InvalidTransition {
        entity_type: String,
        transition: String,
        from_state: String,
        available: Vec<String>,
    },

    #[error(transparent)]
    TranslationMissing(Box<MissingTranslationsError>),

    #[error("feature disabled: {feature}")]
    FeatureDisabled { feature: String },

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AdminError {
    /// Validation failure without a field.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
            component: None,
            metadata: Metadata::new(),
        }
    }

    /// Validation failure pinned to a field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
            component: None,
            metadata: Metadata::new(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn permission_denied(permission: impl Into<String>) -> Self {
        Self::PermissionDenied {
            permission: permission.into(),
        }
    }

    pub fn conflict(
        conflict_type: impl Into<String>,
        message: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self::Conflict {
            conflict_type: conflict_type.into(),
            message: message.into(),
            metadata,
        }
    }

    /// Optimistic concurrency failure.
    pub fn version_mismatch(resource: &str, id: &str, expected: u64, actual: u64) -> Self {
        let mut meta = Metadata::new();
        meta.insert("resource".into(), json!(resource));
        meta.insert("id".into(), json!(id));
        meta.insert("expected_version".into(), json!(expected));
        meta.insert("current_version".into(), json!(actual));
        Self::conflict(
            "version_mismatch",
            format!("{resource} {id} is at version {actual}, expected {expected}"),
            meta,
        )
    }

    /// Slug or path already taken in the target locale.
    pub fn path_conflict(field: &str, value: &str, locale: &str) -> Self {
        let mut meta = Metadata::new();
        meta.insert("field".into(), json!(field));
        meta.insert("value".into(), json!(value));
        meta.insert("locale".into(), json!(locale));
        Self::conflict(
            "path_conflict",
            format!("{field} {value:?} already exists for locale {locale:?}"),
            meta,
        )
    }

    /// Translation for `locale` already exists in the group.
    pub fn translation_already_exists(translation_group_id: &str, locale: &str) -> Self {
        let mut meta = Metadata::new();
        meta.insert("reason".into(), json!("translation_already_exists"));
        meta.insert("translation_group_id".into(), json!(translation_group_id));
        meta.insert("locale".into(), json!(locale));
        Self::conflict(
            "path_conflict",
            format!("translation group {translation_group_id} already has locale {locale}"),
            meta,
        )
    }

    pub fn feature_disabled(feature: impl Into<String>) -> Self {
        Self::FeatureDisabled {
            feature: feature.into(),
        }
    }

    pub fn missing_translations(err: MissingTranslationsError) -> Self {
        Self::TranslationMissing(Box::new(err))
    }

    /// Attach the emitting component to a validation error.
    pub fn with_component(self, name: impl Into<String>) -> Self {
        match self {
            Self::Validation {
                message,
                field,
                metadata,
                ..
            } => Self::Validation {
                message,
                field,
                component: Some(name.into()),
                metadata,
            },
            other => other,
        }
    }

    /// Add a metadata entry to validation and conflict errors.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        if let Self::Validation { metadata, .. } | Self::Conflict { metadata, .. } = &mut self {
            metadata.insert(key.into(), value);
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } | Self::WorkflowNotFound { .. } => ErrorKind::NotFound,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Conflict { .. } | Self::InvalidTransition { .. } => ErrorKind::Conflict,
            Self::TranslationMissing(_) => ErrorKind::TranslationMissing,
            Self::FeatureDisabled { .. } => ErrorKind::FeatureDisabled,
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn text_code(&self) -> &'static str {
        self.kind().text_code()
    }

    /// Convert error to an HTTP status hint
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } | Self::WorkflowNotFound { .. } => StatusCode::NOT_FOUND,
            Self::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            Self::Conflict { .. } | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::TranslationMissing(err) if err.required_fields_evaluated => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::TranslationMissing(_) => StatusCode::CONFLICT,
            Self::FeatureDisabled { .. } => StatusCode::LOCKED,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            // Client closed request
            Self::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured details for presented error bodies.
    pub fn metadata(&self) -> Metadata {
        match self {
            Self::Validation {
                field,
                component,
                metadata,
                ..
            } => {
                let mut meta = metadata.clone();
                if let Some(field) = field {
                    meta.insert("field".into(), json!(field));
                }
                if let Some(component) = component {
                    meta.insert("component".into(), json!(component));
                }
                meta
            }
            Self::NotFound { resource, id } => {
                let mut meta = Metadata::new();
                meta.insert("resource".into(), json!(resource));
                meta.insert("id".into(), json!(id));
                meta
            }
            Self::PermissionDenied { permission } => {
                let mut meta = Metadata::new();
                meta.insert("permission".into(), json!(permission));
                meta
            }
            Self::Conflict {
                conflict_type,
                metadata,
                ..
            } => {
                let mut meta = metadata.clone();
                meta.insert("type".into(), json!(conflict_type));
                meta
            }
            Self::WorkflowNotFound { entity_type } => {
                let mut meta = Metadata::new();
                meta.insert("type".into(), json!("workflow_not_found"));
                meta.insert("entity_type".into(), json!(entity_type));
                meta
            }
            Self::InvalidTransition {
                entity_type,
                transition,
                from_state,
                available,
            } => {
                let mut meta = Metadata::new();
                meta.insert("type".into(), json!("workflow_invalid_transition"));
                meta.insert("entity_type".into(), json!(entity_type));
                meta.insert("transition".into(), json!(transition));
                meta.insert("from_state".into(), json!(from_state));
                meta.insert("available_transitions".into(), json!(available));
                meta
            }
            Self::TranslationMissing(err) => err.metadata(),
            Self::FeatureDisabled { feature } => {
                let mut meta = Metadata::new();
                meta.insert("feature".into(), json!(feature));
                meta
            }
            Self::UnsupportedFormat(format) => {
                let mut meta = Metadata::new();
                meta.insert("format".into(), json!(format));
                meta
            }
            Self::ServiceUnavailable(_) | Self::Cancelled | Self::Internal(_) => Metadata::new(),
        }
    }

    /// Conflict subtype (`version_mismatch`, `path_conflict`, ...), if any.
    pub fn conflict_type(&self) -> Option<&str> {
        match self {
            Self::Conflict { conflict_type, .. } => Some(conflict_type.as_str()),
            Self::InvalidTransition { .. } => Some("workflow_invalid_transition"),
            _ => None,
        }
    }

    pub fn is_missing_translations(&self) -> bool {
        matches!(self, Self::TranslationMissing(_))
    }

    /// Borrow the missing-translations payload when this error carries one.
    pub fn as_missing_translations(&self) -> Option<&MissingTranslationsError> {
        match self {
            Self::TranslationMissing(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MissingTranslationsError> for AdminError {
    fn from(err: MissingTranslationsError) -> Self {
        Self::missing_translations(err)
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation(format!("JSON error: {}", err))
    }
}

// ============================================================================
// Presentation
// ============================================================================

/// Transport-neutral error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentedError {
    pub text_code: String,
    pub message: String,
    pub metadata: Metadata,
    pub status: u16,
}

/// Maps errors to response bodies.
pub trait ErrorPresenter: Send + Sync {
    fn present(&self, err: &AdminError) -> PresentedError;
}

/// Default mapping: text code, display message, metadata and status hint.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorPresenter;

impl ErrorPresenter for DefaultErrorPresenter {
    fn present(&self, err: &AdminError) -> PresentedError {
        PresentedError {
            text_code: err.text_code().to_string(),
            message: err.to_string(),
            metadata: err.metadata(),
            status: err.status().as_u16(),
        }
    }
}
