//! Per-record action availability.
//!
//! Each declared action runs through the same ordered checks and stops at
//! the first failure:
//!
//! ```text
//! context ──► permission ──► workflow ──► translations (publish) ──► feature
//! MISSING_    PERMISSION_    INVALID_     TRANSLATION_               FEATURE_
//! CONTEXT     DENIED         STATUS       MISSING                    DISABLED
//! ```

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use backoffice_core::permissions::authorize;
use backoffice_core::workflow::normalize_action;
use backoffice_core::{AdminContext, FeatureGate, Record, WorkflowTransition};
use backoffice_translation::readiness::PUBLISH_TRANSITION;
use backoffice_translation::TranslationReadiness;

use crate::action::{Action, ActionAvailability, ReasonCode};
use crate::panel::Panel;

/// Reason text for a readiness blocker.
pub fn translation_blocker_reason(readiness: &TranslationReadiness) -> String {
    if readiness.missing_required_locales.is_empty() {
        "required translation fields are incomplete".to_string()
    } else {
        format!(
            "missing required translations: {}",
            readiness.missing_locales_display()
        )
    }
}

/// Resolves `_action_state` for the records of one request. Available
/// transitions are cached per workflow state for the resolver's lifetime.
pub struct ActionResolver<'a> {
    panel: &'a Panel,
    features: Option<&'a dyn FeatureGate>,
    transitions: HashMap<String, Vec<WorkflowTransition>>,
}

impl<'a> ActionResolver<'a> {
    pub fn new(panel: &'a Panel, features: Option<&'a dyn FeatureGate>) -> Self {
        Self {
            panel,
            features,
            transitions: HashMap::new(),
        }
    }

    /// Availability of every row action on `record`.
    pub async fn resolve(
        &mut self,
        ctx: &AdminContext,
        record: &Record,
        readiness: Option<&TranslationReadiness>,
    ) -> BTreeMap<String, ActionAvailability> {
        let panel = self.panel;
        let mut out = BTreeMap::new();
        for action in &panel.actions {
            let state = self.resolve_action(ctx, action, record, readiness).await;
            out.insert(action.name.clone(), state);
        }
        out
    }

    pub async fn resolve_action(
        &mut self,
        ctx: &AdminContext,
        action: &Action,
        record: &Record,
        readiness: Option<&TranslationReadiness>,
    ) -> ActionAvailability {
        if let Some(path) = action
            .context_required
            .iter()
            .find(|path| !record.has_present(path))
        {
            return ActionAvailability::disabled(
                ReasonCode::MissingContext,
                format!("missing required context: {path}"),
            );
        }

        if authorize(
            self.panel.authorizer.as_deref(),
            ctx,
            &action.permission,
            &self.panel.name,
        )
        .await
        .is_err()
        {
            return ActionAvailability::disabled(
                ReasonCode::PermissionDenied,
                format!("permission {} is required", action.permission),
            );
        }

        let mut available_transitions = None;
        if action.is_workflow() {
            match self.check_workflow(ctx, action, record).await {
                Ok(names) => available_transitions = names,
                Err(blocked) => return blocked,
            }
        }

        if action.key() == PUBLISH_TRANSITION {
            if let Some(readiness) = readiness.filter(|r| !r.is_ready()) {
                return ActionAvailability::disabled(
                    ReasonCode::TranslationMissing,
                    translation_blocker_reason(readiness),
                );
            }
        }

        if let Some(features) = self.features {
            if let Some(key) = action.features().into_iter().find(|k| !features.is_enabled(*k)) {
                return ActionAvailability::disabled(
                    ReasonCode::FeatureDisabled,
                    format!("feature {key} is disabled"),
                );
            }
        }

        let state = ActionAvailability::enabled();
        match available_transitions {
            Some(names) => state.with_transitions(names),
            None => state,
        }
    }

    /// `Ok(Some(names))` when a candidate transition is available, `Ok(None)`
    /// when the check passes without an engine.
    async fn check_workflow(
        &mut self,
        ctx: &AdminContext,
        action: &Action,
        record: &Record,
    ) -> Result<Option<Vec<String>>, ActionAvailability> {
        let panel = self.panel;
        let Some(engine) = panel.workflow.as_ref() else {
            if action.command_name.is_empty() && action.href.is_empty() {
                return Err(ActionAvailability::disabled(
                    ReasonCode::InvalidStatus,
                    format!("no workflow is configured for {}", panel.entity_type),
                ));
            }
            return Ok(None);
        };
        if record.id().is_none() {
            return Err(ActionAvailability::disabled(
                ReasonCode::MissingContext,
                "record has no id",
            ));
        }

        let status = record.status().unwrap_or_default().to_string();
        if !self.transitions.contains_key(&status) {
            let fetched = match engine
                .available_transitions(ctx, &panel.entity_type, &status)
                .await
            {
                Ok(transitions) => transitions,
                Err(e) => {
                    debug!(
                        panel = %panel.name,
                        status = %status,
                        error = %e,
                        "No transitions available"
                    );
                    Vec::new()
                }
            };
            self.transitions.insert(status.clone(), fetched);
        }
        let available = self
            .transitions
            .get(&status)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let names: Vec<String> = available.iter().map(|t| normalize_action(&t.name)).collect();

        if panel.aliases.resolve(&action.name, available).is_none() {
            let shown = if status.is_empty() { "(none)" } else { status.as_str() };
            return Err(ActionAvailability::disabled(
                ReasonCode::InvalidStatus,
                format!("{} is not available from status {shown}", action.key()),
            )
            .with_transitions(names));
        }
        Ok(Some(names))
    }
}
