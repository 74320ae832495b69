//! End-to-end panel flows over in-memory collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_test::assert_ok;

use backoffice_core::activity::{PANEL_TRANSITION, PANEL_TRANSITION_BLOCKED};
use backoffice_core::{
    AdminContext, CommandBus, CommandHandler, FeatureFlags, FeatureKey, ListOptions,
    MemoryActivitySink, MemoryRepository, MemoryWorkflowEngine, Message, Record, Repository,
    Result, StaticAuthorizer, TransitionInput, TransitionResult, WorkflowDefinition,
    WorkflowEngine, WorkflowTransition,
};
use backoffice_panels::{
    Action, ActionOutcome, ListRow, Panel, PanelBinding, ReasonCode, RecordEnvelope,
};
use backoffice_translation::{
    DefaultTranslationPolicy, ReadinessEngine, ReadinessOptions, RepositoryTranslationService,
    RequirementsConfig, StaticRequirementsProvider, TranslationRequirements,
};

/// Workflow engine that counts applied transitions.
struct CountingWorkflow {
    inner: MemoryWorkflowEngine,
    applied: AtomicUsize,
}

impl CountingWorkflow {
    fn new(definition: WorkflowDefinition) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryWorkflowEngine::from_definitions([definition]).unwrap(),
            applied: AtomicUsize::new(0),
        })
    }

    fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowEngine for CountingWorkflow {
    async fn transition(
        &self,
        ctx: &AdminContext,
        input: TransitionInput,
    ) -> Result<TransitionResult> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        self.inner.transition(ctx, input).await
    }

    async fn available_transitions(
        &self,
        ctx: &AdminContext,
        entity_type: &str,
        current_state: &str,
    ) -> Result<Vec<WorkflowTransition>> {
        self.inner
            .available_transitions(ctx, entity_type, current_state)
            .await
    }

    async fn transitions(&self, entity_type: &str) -> Result<Vec<WorkflowTransition>> {
        self.inner.transitions(entity_type).await
    }
}

fn pages_workflow() -> WorkflowDefinition {
    WorkflowDefinition::new("pages")
        .with_transition("request_approval", "draft", "pending_approval")
        .with_transition("approve", "pending_approval", "published")
        .with_transition("approve", "approval", "published")
}

fn requirements() -> Arc<StaticRequirementsProvider> {
    Arc::new(StaticRequirementsProvider::new(RequirementsConfig::default().with(
        "pages",
        "publish",
        TranslationRequirements::new(["en", "es"]),
    )))
}

fn record(value: serde_json::Value) -> Record {
    Record::try_from(value).unwrap()
}

#[tokio::test]
async fn test_publish_blocked_by_missing_locale() {
    let repo = Arc::new(MemoryRepository::new("pages"));
    repo.seed([record(json!({
        "id": "page_1", "status": "approval", "locale": "en", "translation_group_id": "tg_1"
    }))])
    .await;
    let workflow = CountingWorkflow::new(pages_workflow());
    let service = Arc::new(RepositoryTranslationService::new(repo.clone()));
    let panel = Panel::new("pages", repo.clone())
        .with_workflow(workflow.clone())
        .with_policy(Arc::new(DefaultTranslationPolicy::new(requirements(), service)))
        .with_action(Action::new("publish"))
        .translatable();
    let activity = Arc::new(MemoryActivitySink::new());
    let binding = PanelBinding::new(Arc::new(panel)).with_activity(activity.clone());
    let ctx = AdminContext::new("editor");

    let err = binding
        .action(&ctx, "publish", &json!({"id": "page_1", "locale": "en"}))
        .await
        .unwrap_err();

    assert_eq!(err.text_code(), "TRANSLATION_MISSING");
    assert_eq!(err.status().as_u16(), 409);
    assert_eq!(err.metadata()["missing_locales"], json!(["es"]));
    assert_eq!(workflow.applied(), 0);
    assert_eq!(
        repo.get(&ctx, "page_1").await.unwrap().status(),
        Some("approval")
    );

    let blocked = activity.by_verb(PANEL_TRANSITION_BLOCKED).await;
    assert_eq!(blocked.len(), 1);
    let meta = &blocked[0].metadata;
    assert_eq!(meta["panel"], "pages");
    assert_eq!(meta["entity_id"], "page_1");
    assert_eq!(meta["transition"], "publish");
    assert_eq!(meta["locale"], "en");
    assert_eq!(meta["environment"], "production");
    assert_eq!(meta["policy_entity"], "pages");
    assert_eq!(meta["translation_code"], "TRANSLATION_MISSING");
    assert_eq!(meta["missing_locales"], json!(["es"]));
    assert!(activity.by_verb(PANEL_TRANSITION).await.is_empty());
}

#[derive(Debug, Deserialize)]
struct PublishPages {
    ids: Vec<String>,
}

impl Message for PublishPages {
    const NAME: &'static str = "pages.publish";
}

struct PublishCounter(Arc<AtomicUsize>);

#[async_trait]
impl CommandHandler<PublishPages> for PublishCounter {
    async fn execute(&self, _ctx: &AdminContext, message: PublishPages) -> Result<()> {
        self.0.fetch_add(message.ids.len(), Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_command_publish_without_workflow_checks_policy() {
    let repo = Arc::new(MemoryRepository::new("pages"));
    repo.seed([record(json!({
        "id": "page_1", "status": "approval", "locale": "en", "translation_group_id": "tg_1"
    }))])
    .await;
    let service = Arc::new(RepositoryTranslationService::new(repo.clone()));
    let panel = Panel::new("pages", repo.clone())
        .with_policy(Arc::new(DefaultTranslationPolicy::new(requirements(), service)))
        .with_action(Action::new("publish").with_command(PublishPages::NAME))
        .translatable();

    let bus = CommandBus::enabled();
    let published = Arc::new(AtomicUsize::new(0));
    bus.register_command::<PublishPages, _>(PublishCounter(published.clone()))
        .unwrap();
    bus.register_message_factory::<PublishPages>().unwrap();

    let activity = Arc::new(MemoryActivitySink::new());
    let binding = PanelBinding::new(Arc::new(panel))
        .with_bus(bus)
        .with_activity(activity.clone());
    let ctx = AdminContext::new("editor");

    let err = binding
        .action(&ctx, "publish", &json!({"id": "page_1", "locale": "en"}))
        .await
        .unwrap_err();
    assert_eq!(err.text_code(), "TRANSLATION_MISSING");
    assert_eq!(err.metadata()["missing_locales"], json!(["es"]));
    assert_eq!(published.load(Ordering::SeqCst), 0);
    let blocked = activity.by_verb(PANEL_TRANSITION_BLOCKED).await;
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].metadata["entity_id"], "page_1");

    repo.seed([record(json!({
        "id": "page_2", "status": "draft", "locale": "es", "translation_group_id": "tg_1"
    }))])
    .await;
    let outcome = binding
        .action(&ctx, "publish", &json!({"id": "page_1", "locale": "en"}))
        .await
        .unwrap();
    assert!(matches!(outcome, ActionOutcome::Dispatched { .. }));
    assert_eq!(published.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_create_translation_for_sibling_locale() {
    let repo = Arc::new(MemoryRepository::new("pages"));
    repo.seed([record(json!({
        "id": "page_1", "slug": "home", "path": "/", "locale": "en",
        "translation_group_id": "tg_1", "available_locales": ["en"], "status": "published"
    }))])
    .await;
    let binding = PanelBinding::new(Arc::new(Panel::new("pages", repo.clone()).translatable()));
    let ctx = AdminContext::new("editor");

    let outcome = binding
        .action(&ctx, "create_translation", &json!({"id": "page_1", "locale": "es"}))
        .await
        .unwrap();
    let ActionOutcome::TranslationCreated { response, record } = outcome else {
        panic!("expected a created translation");
    };

    assert_eq!(record.str_field("slug"), Some("home-es"));
    assert_eq!(record.str_field("path"), Some("/es"));
    assert_eq!(record.locale(), Some("es"));
    assert_eq!(record.translation_group_id(), Some("tg_1"));
    assert_eq!(record.status(), Some("draft"));

    assert!(!response.id.is_empty());
    assert_ne!(response.id, "page_1");
    assert_eq!(response.id, record.id().unwrap());
    assert_eq!(repo.get(&ctx, &response.id).await.unwrap().locale(), Some("es"));
    assert_eq!(repo.get(&ctx, "page_1").await.unwrap().locale(), Some("en"));
    assert_eq!(response.locale, "es");
    assert_eq!(response.status, "draft");
    assert_eq!(response.translation_group_id, "tg_1");

    let err = binding
        .action(&ctx, "create_translation", &json!({"id": "page_1", "locale": "es"}))
        .await
        .unwrap_err();
    assert_eq!(err.conflict_type(), Some("path_conflict"));
    assert_eq!(repo.len().await, 2);
}

#[tokio::test]
async fn test_workflow_alias_resolution() {
    let repo = Arc::new(MemoryRepository::new("pages"));
    repo.seed([record(json!({"id": "page_1", "status": "draft", "locale": "en"}))])
        .await;
    let workflow = CountingWorkflow::new(pages_workflow());
    let panel = Panel::new("pages", repo.clone())
        .with_workflow(workflow.clone())
        .with_action(Action::new("submit_for_approval"))
        .with_action(Action::new("publish"));
    let binding = PanelBinding::new(Arc::new(panel));
    let ctx = AdminContext::new("editor");

    let submitted = binding
        .action(&ctx, "submit_for_approval", &json!({"id": "page_1"}))
        .await
        .unwrap();
    let ActionOutcome::Transitioned { transition, .. } = submitted else {
        panic!("expected a transition");
    };
    assert_eq!(transition.transition, "request_approval");
    assert_eq!(transition.to_state, "pending_approval");

    let published = binding
        .action(&ctx, "publish", &json!({"id": "page_1"}))
        .await
        .unwrap();
    let ActionOutcome::Transitioned { transition, record } = published else {
        panic!("expected a transition");
    };
    assert_eq!(transition.transition, "approve");
    assert_eq!(record.status(), Some("published"));
    assert_eq!(workflow.applied(), 2);
}

#[tokio::test]
async fn test_grouped_by_translation_list() {
    let repo = Arc::new(MemoryRepository::new("pages"));
    repo.seed([
        record(json!({
            "id": "page_2", "locale": "es", "translation_group_id": "tg_1", "status": "draft"
        })),
        record(json!({
            "id": "page_3", "locale": "en", "translation_group_id": "tg_2", "status": "draft"
        })),
        record(json!({
            "id": "page_1", "locale": "en", "translation_group_id": "tg_1", "status": "draft"
        })),
        record(json!({"id": "page_4", "locale": "fr", "status": "draft"})),
    ])
    .await;
    let readiness = ReadinessEngine::new(requirements(), ReadinessOptions::default());
    let panel = Panel::new("pages", repo)
        .with_workflow(CountingWorkflow::new(pages_workflow()))
        .with_action(Action::new("publish"))
        .translatable();
    let binding = PanelBinding::new(Arc::new(panel)).with_readiness(readiness);
    let ctx = AdminContext::new("editor");

    let page = binding
        .list_grouped(&ctx, &ListOptions::new())
        .await
        .unwrap();
    let groups: Vec<_> = page
        .items
        .iter()
        .filter_map(|row| match row {
            ListRow::Group(group) => Some(group),
            ListRow::Record(_) => None,
        })
        .collect();

    assert_eq!(groups.len(), 2);
    let tg_1 = groups[0];
    assert_eq!(tg_1.id, "group:tg_1");
    assert_eq!(tg_1.summary.child_count, 2);
    let locales: Vec<_> = tg_1.children.iter().map(|c| c.record.locale()).collect();
    assert_eq!(locales, vec![Some("en"), Some("es")]);
    assert_eq!(tg_1.parent.id().as_deref(), Some("page_1"));
    assert!(tg_1.action_state.contains_key("publish"));
    assert_eq!(groups[1].translation_group_id, "tg_2");
    assert_eq!(page.total, 3);

    let value = serde_json::to_value(&page).unwrap();
    assert_eq!(value["items"][0]["_group"]["child_count"], 2);
}

#[tokio::test]
async fn test_every_action_has_a_state() {
    let repo = Arc::new(MemoryRepository::new("pages"));
    repo.seed([
        record(json!({
            "id": "page_1", "status": "draft", "locale": "en", "translation_group_id": "tg_1"
        })),
        record(json!({"id": "page_2", "status": "pending_approval", "locale": "en"})),
        record(json!({"status": "published", "locale": "es"})),
    ])
    .await;
    let authorizer = StaticAuthorizer::new().grant("editor", ["admin.pages.edit"]);
    let panel = Panel::new("pages", repo)
        .with_workflow(CountingWorkflow::new(pages_workflow()))
        .with_authorizer(Arc::new(authorizer))
        .with_action(Action::new("view"))
        .with_action(Action::new("submit_for_approval").with_permission("admin.pages.edit"))
        .with_action(Action::new("publish").with_permission("admin.pages.publish"))
        .with_action(Action::new("duplicate").with_command("pages.duplicate"))
        .with_action(Action::new("preview").with_href("/preview/{id}").requires("slug"))
        .translatable();
    let readiness = ReadinessEngine::new(requirements(), ReadinessOptions::default());
    let binding = PanelBinding::new(Arc::new(panel))
        .with_readiness(readiness)
        .with_features(Arc::new(FeatureFlags::all().disable(FeatureKey::Commands)));
    let ctx = AdminContext::new("editor");

    let page = binding.list(&ctx, &ListOptions::new()).await.unwrap();
    assert_eq!(page.items.len(), 3);
    let declared: Vec<String> = binding
        .panel()
        .actions
        .iter()
        .map(|a| a.name.clone())
        .collect();
    for item in &page.items {
        assert_action_states(item, &declared);
    }
}

fn assert_action_states(item: &RecordEnvelope, declared: &[String]) {
    for name in declared {
        let state = item
            .action_state
            .get(name)
            .unwrap_or_else(|| panic!("no state for {name}"));
        if !state.enabled {
            assert!(!state.reason.as_deref().unwrap_or_default().is_empty());
            let code = state.reason_code.expect("disabled state carries a code");
            assert!(ReasonCode::ALL.contains(&code));
        }
    }
}

#[tokio::test]
async fn test_bulk_publish_checks_every_id() {
    let repo = Arc::new(MemoryRepository::new("pages"));
    repo.seed([
        record(json!({
            "id": "page_1", "status": "approval", "locale": "en", "translation_group_id": "tg_1"
        })),
        record(json!({
            "id": "page_2", "status": "approval", "locale": "es", "translation_group_id": "tg_1"
        })),
        record(json!({
            "id": "page_3", "status": "approval", "locale": "en", "translation_group_id": "tg_3"
        })),
    ])
    .await;
    let service = Arc::new(RepositoryTranslationService::new(repo.clone()));
    let panel = Panel::new("pages", repo)
        .with_policy(Arc::new(DefaultTranslationPolicy::new(requirements(), service)))
        .with_action(Action::bulk("publish").with_command("pages.publish"));
    let activity = Arc::new(MemoryActivitySink::new());
    let binding = PanelBinding::new(Arc::new(panel)).with_activity(activity.clone());
    let ctx = AdminContext::new("editor");

    let ids = ["page_1".to_string(), "page_3".to_string()];
    let err = binding
        .bulk_action(&ctx, "publish", &ids, &json!({}))
        .await
        .unwrap_err();
    assert!(err.is_missing_translations());
    assert_eq!(err.as_missing_translations().unwrap().entity_id, "page_3");
    assert_eq!(activity.by_verb(PANEL_TRANSITION_BLOCKED).await.len(), 1);

    // Both locales present: the policy passes and dispatch needs a bus.
    let err = binding
        .bulk_action(&ctx, "publish", &ids[..1], &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.text_code(), "SERVICE_UNAVAILABLE");
    assert_ok!(repo_unchanged(&binding, &ctx).await);
}

async fn repo_unchanged(binding: &PanelBinding, ctx: &AdminContext) -> Result<()> {
    let records = binding
        .panel()
        .repository
        .list(ctx, &ListOptions::new())
        .await?
        .records;
    assert!(records.iter().all(|r| r.status() == Some("approval")));
    Ok(())
}
