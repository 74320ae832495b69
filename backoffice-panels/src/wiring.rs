//! Boot-time validation of panel action wiring.

use serde::Serialize;
use serde_json::json;
use tracing::warn;

use backoffice_core::workflow::normalize_action;
use backoffice_core::{AdminError, CommandCatalog, Result, WorkflowTransition};

use crate::action::Action;
use crate::panel::Panel;

/// One misconfigured panel/action pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WiringIssue {
    pub panel: String,
    pub action: String,
    pub message: String,
}

impl WiringIssue {
    fn new(panel: &Panel, action: &Action, message: impl Into<String>) -> Self {
        Self {
            panel: panel.name.clone(),
            action: action.name.clone(),
            message: message.into(),
        }
    }
}

/// Issues for every action on `panel`.
pub async fn validate_panel(panel: &Panel, catalog: &dyn CommandCatalog) -> Vec<WiringIssue> {
    let transitions = declared_transitions(panel).await;
    let mut issues = Vec::new();

    for action in panel.actions.iter().chain(panel.bulk_actions.iter()) {
        if action.name.trim().is_empty() {
            issues.push(WiringIssue::new(panel, action, "action name must not be empty"));
            continue;
        }
        if !action.command_name.is_empty() && !catalog.has_command(&action.command_name) {
            issues.push(WiringIssue::new(
                panel,
                action,
                format!("command {} is not registered", action.command_name),
            ));
        }
        if action.is_bulk() {
            if action.command_name.is_empty() {
                issues.push(WiringIssue::new(panel, action, "bulk action has no command binding"));
            }
            continue;
        }

        let has_transition = matches_transition(panel, action, &transitions);
        if action.is_workflow() {
            if !has_transition {
                issues.push(WiringIssue::new(
                    panel,
                    action,
                    format!(
                        "workflow action has no matching transition on {}",
                        panel.entity_type
                    ),
                ));
            }
        } else if !action.is_passive()
            && !action.is_create_translation()
            && action.command_name.is_empty()
            && action.href.is_empty()
            && !has_transition
        {
            issues.push(WiringIssue::new(
                panel,
                action,
                "action has no command, href or workflow transition",
            ));
        }
    }
    issues
}

/// Fold issues into one validation error, or `Ok` when there are none.
pub fn issues_to_error(issues: Vec<WiringIssue>) -> Result<()> {
    if issues.is_empty() {
        return Ok(());
    }
    for issue in &issues {
        warn!(panel = %issue.panel, action = %issue.action, "{}", issue.message);
    }
    let summary = issues
        .iter()
        .map(|i| format!("{}.{}: {}", i.panel, i.action, i.message))
        .collect::<Vec<_>>()
        .join("; ");
    Err(
        AdminError::validation(format!("panel wiring is invalid: {summary}"))
            .with_component("panels")
            .with_metadata("issues", json!(issues)),
    )
}

async fn declared_transitions(panel: &Panel) -> Vec<WorkflowTransition> {
    match &panel.workflow {
        Some(engine) => engine.transitions(&panel.entity_type).await.unwrap_or_default(),
        None => Vec::new(),
    }
}

fn matches_transition(panel: &Panel, action: &Action, transitions: &[WorkflowTransition]) -> bool {
    panel
        .aliases
        .candidates(&action.name)
        .iter()
        .any(|c| transitions.iter().any(|t| normalize_action(&t.name) == *c))
}
