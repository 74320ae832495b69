//! Assemble an in-memory admin runtime from an [`AdminConfig`].
//!
//! ```text
//! AdminConfig ──► FeatureFlags
//!             ──► CommandBus (enabled flag)
//!             ──► MemoryWorkflowEngine (workflows)
//!             ──► StaticRequirementsProvider ──► ReadinessEngine
//!             ──► per panel: MemoryRepository + DefaultTranslationPolicy
//!                            └──► PanelRegistry
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::info;

use backoffice_core::{
    Authorizer, CommandBus, FeatureFlags, MemoryActivitySink, MemoryRepository,
    MemoryWorkflowEngine, Result, StaticAuthorizer,
};
use backoffice_translation::{
    DefaultTranslationPolicy, ReadinessEngine, RepositoryTranslationService,
    StaticRequirementsProvider,
};

use crate::binding::PanelBinding;
use crate::config::{AdminConfig, ConfigError, PanelConfig};
use crate::panel::{Panel, PanelRegistry};

/// Panels plus the shared services they are bound with.
pub struct AdminRuntime {
    config: AdminConfig,
    registry: PanelRegistry,
    repositories: BTreeMap<String, Arc<MemoryRepository>>,
    features: Arc<FeatureFlags>,
    bus: CommandBus,
    activity: Arc<MemoryActivitySink>,
    readiness: ReadinessEngine,
}

impl AdminRuntime {
    pub async fn from_config(config: AdminConfig) -> std::result::Result<Self, ConfigError> {
        let features = Arc::new(config.feature_flags()?);
        let bus = CommandBus::new(config.commands_enabled);
        let workflows = Arc::new(MemoryWorkflowEngine::from_definitions(
            config.workflows.clone(),
        )?);
        let provider = Arc::new(StaticRequirementsProvider::new(config.translations.clone()));
        let readiness = ReadinessEngine::new(provider.clone(), config.readiness_options());
        let authorizer = authorizer(&config);

        let registry = PanelRegistry::new();
        let mut repositories: BTreeMap<String, Arc<MemoryRepository>> = BTreeMap::new();
        for panel_config in &config.panels {
            let entity_type = panel_config.entity_type().to_lowercase();
            let repository = repositories
                .entry(entity_type.clone())
                .or_insert_with(|| Arc::new(MemoryRepository::new(entity_type.as_str())))
                .clone();
            let service = Arc::new(RepositoryTranslationService::new(repository.clone()));
            let policy = Arc::new(DefaultTranslationPolicy::new(provider.clone(), service));

            let mut panel = build_panel(panel_config, repository).with_policy(policy);
            if workflows.definition(&entity_type).await.is_some() {
                panel = panel.with_workflow(workflows.clone());
            }
            if let Some(authorizer) = &authorizer {
                panel = panel.with_authorizer(authorizer.clone());
            }
            registry.register(panel).await?;
        }

        info!(
            panels = registry.len().await,
            workflows = config.workflows.len(),
            environment = %config.environment,
            "Admin runtime assembled"
        );
        Ok(Self {
            config,
            registry,
            repositories,
            features,
            bus,
            activity: Arc::new(MemoryActivitySink::new()),
            readiness,
        })
    }

    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    pub fn registry(&self) -> &PanelRegistry {
        &self.registry
    }

    pub fn features(&self) -> &FeatureFlags {
        &self.features
    }

    pub fn bus(&self) -> &CommandBus {
        &self.bus
    }

    pub fn activity(&self) -> &Arc<MemoryActivitySink> {
        &self.activity
    }

    /// Shared store behind every panel over `entity_type`.
    pub fn repository(&self, entity_type: &str) -> Option<Arc<MemoryRepository>> {
        self.repositories.get(&entity_type.trim().to_lowercase()).cloned()
    }

    /// Bind a registered panel to the runtime's services.
    pub async fn binding(&self, panel: &str) -> Result<PanelBinding> {
        let panel = self.registry.get(panel).await?;
        Ok(PanelBinding::new(panel)
            .with_readiness(self.readiness.clone())
            .with_features(self.features.clone())
            .with_bus(self.bus.clone())
            .with_activity(self.activity.clone()))
    }

    /// Check every panel's wiring against the configured command names.
    pub async fn validate_wiring(&self) -> Result<()> {
        let mut catalog: BTreeSet<String> = self.config.command_catalog();
        catalog.extend(self.bus.factory_names());
        self.registry.validate_wiring(&catalog).await
    }
}

fn build_panel(config: &PanelConfig, repository: Arc<MemoryRepository>) -> Panel {
    let mut panel = Panel::new(config.name.trim(), repository)
        .with_entity_type(config.entity_type())
        .with_aliases(config.aliases());
    for action in config.all_actions() {
        panel = panel.with_action(action);
    }
    for subresource in &config.subresources {
        panel = panel.with_subresource(subresource.as_str());
    }
    if config.translation_aware {
        panel = panel.translatable();
    }
    panel
}

fn authorizer(config: &AdminConfig) -> Option<Arc<dyn Authorizer>> {
    if config.grants.is_empty() {
        return None;
    }
    let authorizer = config
        .grants
        .iter()
        .fold(StaticAuthorizer::new(), |acc, (principal, permissions)| {
            acc.grant(principal.as_str(), permissions.iter().map(String::as_str))
        });
    Some(Arc::new(authorizer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoffice_core::{AdminContext, FeatureGate, FeatureKey, ListOptions, Record, Repository};

    const CONFIG: &str = r#"
environment: staging
commands: [pages.archive]
translations:
  entities:
    pages:
      transitions:
        publish:
          locales: [en, es]
workflows:
  - entity_type: pages
    transitions:
      - { name: request_approval, from: draft, to: pending_approval }
      - { name: approve, from: pending_approval, to: published }
panels:
  - name: pages
    translation_aware: true
    actions:
      - { name: submit_for_approval }
      - { name: publish, permission: admin.pages.publish }
    bulk_actions:
      - { name: archive, command_name: pages.archive }
grants:
  editor: [admin.pages.*]
"#;

    #[tokio::test]
    async fn test_runtime_from_config() {
        let runtime = AdminRuntime::from_config(AdminConfig::from_yaml(CONFIG).unwrap())
            .await
            .unwrap();
        runtime.validate_wiring().await.unwrap();
        assert!(runtime.features().is_enabled(FeatureKey::Commands));

        let repo = runtime.repository("pages").unwrap();
        repo.seed([Record::new()
            .with("id", "page_1")
            .with("status", "draft")
            .with("locale", "en")])
            .await;

        let ctx = AdminContext::new("editor");
        let binding = runtime.binding("pages").await.unwrap();
        let page = binding.list(&ctx, &ListOptions::new()).await.unwrap();
        assert_eq!(page.items.len(), 1);
        let item = &page.items[0];
        assert!(item.action_state["submit_for_approval"].enabled);
        assert!(item.action_state["create_translation"].enabled);
        assert_eq!(
            item.translation_readiness.as_ref().unwrap().evaluated_environment,
            "staging"
        );
        assert_eq!(repo.list(&ctx, &ListOptions::new()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_unregistered_command_fails_wiring() {
        let yaml = CONFIG.replace("commands: [pages.archive]", "commands: []");
        let config = AdminConfig::from_yaml(&yaml).unwrap();
        let runtime = AdminRuntime::from_config(config).await.unwrap();
        let err = runtime.validate_wiring().await.unwrap_err();
        assert!(err.to_string().contains("pages.archive"));
    }

    #[tokio::test]
    async fn test_bad_workflow_is_a_config_error() {
        let config = AdminConfig::from_yaml(
            "workflows:\n  - entity_type: ''\n    transitions: []\n",
        )
        .unwrap();
        let err = AdminRuntime::from_config(config).await.err().unwrap();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
