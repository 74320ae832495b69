//! Workflow engine: per-entity-type state machines.
//!
//! Panels map action names onto transitions. Passive actions (`view`, `edit`,
//! `delete`) never route through the engine; workflow actions resolve through
//! a [`TransitionAliases`] table so that a `publish` button can drive an
//! `approve` transition on workflows that model publishing as approval.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::context::AdminContext;
use crate::error::{AdminError, Metadata, Result};

/// Actions handled by convention, never by a transition.
pub const PASSIVE_ACTIONS: &[&str] = &["view", "edit", "delete"];

/// Action names that route through the workflow engine.
pub const WORKFLOW_ACTIONS: &[&str] = &[
    "submit_for_approval",
    "request_approval",
    "approve",
    "reject",
    "publish",
    "unpublish",
    "archive",
];

pub fn normalize_action(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

pub fn is_passive_action(name: &str) -> bool {
    PASSIVE_ACTIONS.contains(&normalize_action(name).as_str())
}

pub fn is_workflow_action(name: &str) -> bool {
    WORKFLOW_ACTIONS.contains(&normalize_action(name).as_str())
}

/// A named edge between two states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTransition {
    pub name: String,
    pub from: String,
    pub to: String,
}

impl WorkflowTransition {
    pub fn new(name: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

/// State machine for one entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub entity_type: String,
    #[serde(default)]
    pub initial_state: Option<String>,
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<WorkflowTransition>,
}

impl WorkflowDefinition {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Self::default()
        }
    }

    pub fn with_initial_state(mut self, state: impl Into<String>) -> Self {
        self.initial_state = Some(state.into());
        self
    }

    /// Add a transition, registering both endpoint states.
    pub fn with_transition(
        mut self,
        name: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        let transition = WorkflowTransition::new(name, from, to);
        for state in [&transition.from, &transition.to] {
            if !self.states.contains(state) {
                self.states.push(state.clone());
            }
        }
        self.transitions.push(transition);
        self
    }

    /// Check that every transition endpoint is a declared state.
    pub fn validate(&self) -> Result<()> {
        if self.entity_type.trim().is_empty() {
            return Err(AdminError::invalid_field(
                "entity_type",
                "workflow entity type must not be empty",
            )
            .with_component("workflow"));
        }
        for t in &self.transitions {
            if t.name.trim().is_empty() {
                return Err(AdminError::invalid_field(
                    "transitions",
                    format!("workflow {} has a transition without a name", self.entity_type),
                )
                .with_component("workflow"));
            }
            if !self.states.is_empty()
                && !(self.states.contains(&t.from) && self.states.contains(&t.to))
            {
                return Err(AdminError::invalid_field(
                    "transitions",
                    format!(
                        "transition {} on {} references an undeclared state",
                        t.name, self.entity_type
                    ),
                )
                .with_component("workflow"));
            }
        }
        Ok(())
    }
}

/// Request to move an entity along a transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionInput {
    pub entity_id: String,
    pub entity_type: String,
    pub current_state: String,
    pub transition: String,
    pub actor_id: Option<String>,
    pub metadata: Metadata,
}

/// Outcome of an applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionResult {
    pub entity_id: String,
    pub entity_type: String,
    pub transition: String,
    pub from_state: String,
    pub to_state: String,
}

/// Workflow engine interface.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Apply a transition from the current state.
    async fn transition(
        &self,
        ctx: &AdminContext,
        input: TransitionInput,
    ) -> Result<TransitionResult>;

    /// Transitions leaving `current_state`.
    async fn available_transitions(
        &self,
        ctx: &AdminContext,
        entity_type: &str,
        current_state: &str,
    ) -> Result<Vec<WorkflowTransition>>;

    /// Every transition declared for the entity type.
    async fn transitions(&self, entity_type: &str) -> Result<Vec<WorkflowTransition>>;
}

/// Workflow engine backed by in-memory definitions.
pub struct MemoryWorkflowEngine {
    definitions: Arc<RwLock<HashMap<String, WorkflowDefinition>>>,
}

impl MemoryWorkflowEngine {
    pub fn new() -> Self {
        Self {
            definitions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build an engine from definitions known at boot.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = WorkflowDefinition>,
    ) -> Result<Self> {
        let mut map = HashMap::new();
        for def in definitions {
            def.validate()?;
            map.insert(def.entity_type.trim().to_ascii_lowercase(), def);
        }
        Ok(Self {
            definitions: Arc::new(RwLock::new(map)),
        })
    }

    /// Register or replace a definition.
    pub async fn register(&self, definition: WorkflowDefinition) -> Result<()> {
        definition.validate()?;
        let key = definition.entity_type.trim().to_ascii_lowercase();
        info!(
            entity_type = %key,
            transitions = definition.transitions.len(),
            "Workflow registered"
        );
        self.definitions.write().await.insert(key, definition);
        Ok(())
    }

    pub async fn definition(&self, entity_type: &str) -> Option<WorkflowDefinition> {
        self.definitions
            .read()
            .await
            .get(&entity_type.trim().to_ascii_lowercase())
            .cloned()
    }

    async fn require(&self, entity_type: &str) -> Result<WorkflowDefinition> {
        self.definition(entity_type)
            .await
            .ok_or_else(|| AdminError::WorkflowNotFound {
                entity_type: entity_type.to_string(),
            })
    }
}

impl Default for MemoryWorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowEngine for MemoryWorkflowEngine {
    async fn transition(
        &self,
        ctx: &AdminContext,
        input: TransitionInput,
    ) -> Result<TransitionResult> {
        ctx.check_cancelled()?;
        let def = self.require(&input.entity_type).await?;
        let name = normalize_action(&input.transition);
        let from = if input.current_state.is_empty() {
            def.initial_state.clone().unwrap_or_default()
        } else {
            input.current_state.clone()
        };

        let Some(edge) = def
            .transitions
            .iter()
            .find(|t| normalize_action(&t.name) == name && t.from == from)
        else {
            let available = def
                .transitions
                .iter()
                .filter(|t| t.from == from)
                .map(|t| t.name.clone())
                .collect();
            return Err(AdminError::InvalidTransition {
                entity_type: input.entity_type,
                transition: input.transition,
                from_state: from,
                available,
            });
        };

        debug!(
            entity_type = %input.entity_type,
            entity_id = %input.entity_id,
            transition = %edge.name,
            from = %edge.from,
            to = %edge.to,
            "Workflow transition applied"
        );
        Ok(TransitionResult {
            entity_id: input.entity_id,
            entity_type: input.entity_type,
            transition: edge.name.clone(),
            from_state: edge.from.clone(),
            to_state: edge.to.clone(),
        })
    }

    async fn available_transitions(
        &self,
        _ctx: &AdminContext,
        entity_type: &str,
        current_state: &str,
    ) -> Result<Vec<WorkflowTransition>> {
        let def = self.require(entity_type).await?;
        let state = if current_state.is_empty() {
            def.initial_state.clone().unwrap_or_default()
        } else {
            current_state.to_string()
        };
        Ok(def
            .transitions
            .into_iter()
            .filter(|t| t.from == state)
            .collect())
    }

    async fn transitions(&self, entity_type: &str) -> Result<Vec<WorkflowTransition>> {
        Ok(self.require(entity_type).await?.transitions)
    }
}

// ============================================================================
// Alias table
// ============================================================================

/// Maps panel action names onto candidate transition names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionAliases {
    table: BTreeMap<String, Vec<String>>,
}

impl TransitionAliases {
    /// Empty table: actions only match transitions of the same name.
    pub fn empty() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    pub fn with_alias(mut self, action: &str, transition: &str) -> Self {
        let entry = self.table.entry(normalize_action(action)).or_default();
        let transition = normalize_action(transition);
        if !entry.contains(&transition) {
            entry.push(transition);
        }
        self
    }

    /// Candidate transition names for an action, the action itself first.
    pub fn candidates(&self, action: &str) -> Vec<String> {
        let action = normalize_action(action);
        let mut out = vec![action.clone()];
        if let Some(aliases) = self.table.get(&action) {
            out.extend(aliases.iter().filter(|a| **a != action).cloned());
        }
        out
    }

    /// First candidate present among `available`.
    pub fn resolve<'a>(
        &self,
        action: &str,
        available: &'a [WorkflowTransition],
    ) -> Option<&'a WorkflowTransition> {
        self.candidates(action).iter().find_map(|candidate| {
            available
                .iter()
                .find(|t| normalize_action(&t.name) == *candidate)
        })
    }
}

impl Default for TransitionAliases {
    fn default() -> Self {
        Self::empty()
            .with_alias("submit_for_approval", "request_approval")
            .with_alias("publish", "approve")
    }
}
