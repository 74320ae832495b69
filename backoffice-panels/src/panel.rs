//! Panels and the registry that owns them.
//!
//! A panel is assembled once at boot and frozen behind an `Arc` when it is
//! registered. Everything request-scoped lives in [`crate::binding`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;
use tracing::info;

use backoffice_core::{
    AdminError, Authorizer, CommandCatalog, Metadata, Repository, Result, TransitionAliases,
    WorkflowEngine,
};
use backoffice_translation::TranslationPolicy;

use crate::action::{Action, ActionType, CREATE_TRANSLATION};
use crate::wiring::{issues_to_error, validate_panel};

/// A list/detail screen over one entity type.
#[derive(Clone)]
pub struct Panel {
    pub name: String,
    pub entity_type: String,
    pub repository: Arc<dyn Repository>,
    pub workflow: Option<Arc<dyn WorkflowEngine>>,
    pub aliases: TransitionAliases,
    pub actions: Vec<Action>,
    pub bulk_actions: Vec<Action>,
    pub authorizer: Option<Arc<dyn Authorizer>>,
    pub policy: Option<Arc<dyn TranslationPolicy>>,
    pub translation_aware: bool,
    pub subresources: Vec<String>,
}

impl Panel {
    /// Panel whose entity type is its name.
    pub fn new(name: impl Into<String>, repository: Arc<dyn Repository>) -> Self {
        let name = name.into();
        Self {
            entity_type: name.clone(),
            name,
            repository,
            workflow: None,
            aliases: TransitionAliases::default(),
            actions: Vec::new(),
            bulk_actions: Vec::new(),
            authorizer: None,
            policy: None,
            translation_aware: false,
            subresources: Vec::new(),
        }
    }

    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = entity_type.into();
        self
    }

    pub fn with_workflow(mut self, workflow: Arc<dyn WorkflowEngine>) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn with_aliases(mut self, aliases: TransitionAliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// Add an action; bulk actions go to the bulk list.
    pub fn with_action(mut self, action: Action) -> Self {
        match action.action_type {
            ActionType::Row => self.actions.push(action),
            ActionType::Bulk => self.bulk_actions.push(action),
        }
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn TranslationPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Mark the panel translation-aware and offer `create_translation`.
    pub fn translatable(mut self) -> Self {
        self.translation_aware = true;
        if !self.actions.iter().any(Action::is_create_translation) {
            self.actions.push(Action::new(CREATE_TRANSLATION).requires("id"));
        }
        self
    }

    pub fn with_subresource(mut self, name: impl Into<String>) -> Self {
        self.subresources.push(name.into());
        self
    }

    /// Row action by (case-insensitive) name.
    pub fn action(&self, name: &str) -> Option<&Action> {
        let key = name.trim().to_ascii_lowercase();
        self.actions.iter().find(|a| a.key() == key)
    }

    pub fn bulk_action(&self, name: &str) -> Option<&Action> {
        let key = name.trim().to_ascii_lowercase();
        self.bulk_actions.iter().find(|a| a.key() == key)
    }
}

impl fmt::Debug for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Panel")
            .field("name", &self.name)
            .field("entity_type", &self.entity_type)
            .field("actions", &self.actions)
            .field("bulk_actions", &self.bulk_actions)
            .field("workflow", &self.workflow.is_some())
            .field("policy", &self.policy.is_some())
            .field("translation_aware", &self.translation_aware)
            .finish()
    }
}

/// Registered panels keyed by lowercased name.
#[derive(Default)]
pub struct PanelRegistry {
    panels: RwLock<BTreeMap<String, Arc<Panel>>>,
}

impl PanelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a panel. Names are unique.
    pub async fn register(&self, panel: Panel) -> Result<Arc<Panel>> {
        let key = panel.name.trim().to_lowercase();
        if key.is_empty() {
            return Err(AdminError::invalid_field("name", "panel name must not be empty")
                .with_component("panels"));
        }

        let mut panels = self.panels.write().await;
        if panels.contains_key(&key) {
            let mut meta = Metadata::new();
            meta.insert("panel".into(), json!(key));
            return Err(AdminError::conflict(
                "duplicate_panel",
                format!("panel {key} is already registered"),
                meta,
            ));
        }
        let panel = Arc::new(panel);
        panels.insert(key.clone(), panel.clone());
        info!(panel = %key, actions = panel.actions.len(), "Panel registered");
        Ok(panel)
    }

    pub async fn get(&self, name: &str) -> Result<Arc<Panel>> {
        let key = name.trim().to_lowercase();
        self.panels
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| AdminError::not_found("panel", key))
    }

    pub async fn names(&self) -> Vec<String> {
        self.panels.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.panels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.panels.read().await.is_empty()
    }

    /// Boot-time check of every panel's action wiring. All issues come back
    /// together as one validation error.
    pub async fn validate_wiring(&self, catalog: &dyn CommandCatalog) -> Result<()> {
        let panels: Vec<Arc<Panel>> = self.panels.read().await.values().cloned().collect();
        let mut issues = Vec::new();
        for panel in &panels {
            issues.extend(validate_panel(panel, catalog).await);
        }
        issues_to_error(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoffice_core::MemoryRepository;

    fn pages() -> Panel {
        Panel::new("pages", Arc::new(MemoryRepository::new("pages")))
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let registry = PanelRegistry::new();
        registry.register(pages()).await.unwrap();

        let err = registry
            .register(Panel::new("Pages", Arc::new(MemoryRepository::new("pages"))))
            .await
            .unwrap_err();
        assert_eq!(err.conflict_type(), Some("duplicate_panel"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let registry = PanelRegistry::new();
        registry.register(pages()).await.unwrap();
        assert_eq!(registry.get(" PAGES ").await.unwrap().name, "pages");
        assert_eq!(registry.get("posts").await.unwrap_err().status().as_u16(), 404);
    }

    #[test]
    fn test_translatable_adds_create_translation_once() {
        let panel = pages().translatable().translatable();
        let count = panel
            .actions
            .iter()
            .filter(|a| a.is_create_translation())
            .count();
        assert_eq!(count, 1);
        assert!(panel.translation_aware);
    }

    #[test]
    fn test_bulk_actions_are_separated() {
        let panel = pages()
            .with_action(Action::new("publish"))
            .with_action(Action::bulk("archive").with_command("pages.archive"));
        assert!(panel.action("PUBLISH").is_some());
        assert!(panel.action("archive").is_none());
        assert!(panel.bulk_action("archive").is_some());
    }
}
