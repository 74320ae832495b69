//! Request-facing panel operations.
//!
//! A [`PanelBinding`] ties a registered panel to the request-scoped services
//! it needs: readiness evaluation, feature flags, the command bus and the
//! activity log. Every read decorates records with `_action_state` (and
//! `translation_readiness` where applicable); every write goes through the
//! same gates the decoration reports.
//!
//! ```text
//!  list / detail ──► Repository ──► ReadinessBatch ──► ActionResolver ──► envelopes
//!
//!  action ──► guard ──┬─► create_translation ──► TranslationCreator | create
//!                     ├─► publish? policy ──✗──► panel.transition.blocked
//!                     │        └─► WorkflowEngine ──► Repository.update
//!                     └─► CommandBus.dispatch_by_name
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use backoffice_core::activity::{
    record_best_effort, PANEL_COMMAND_DISPATCHED, PANEL_TRANSITION, PANEL_TRANSITION_BLOCKED,
};
use backoffice_core::filter::paginate;
use backoffice_core::permissions::authorize;
use backoffice_core::record::{value_to_string, STATUS};
use backoffice_core::workflow::normalize_action;
use backoffice_core::{
    ActivityEntry, ActivitySink, AdminContext, AdminError, CommandBus, FeatureGate, ListOptions,
    Metadata, MissingTranslationsError, Record, Result, TransitionInput, TransitionResult,
};
use backoffice_translation::readiness::PUBLISH_TRANSITION;
use backoffice_translation::{
    group_by_translation, GroupedRow, PolicyInput, ReadinessEngine, TranslationReadiness,
};

use crate::action::Action;
use crate::create_translation::{create_translation, CreateTranslationResponse};
use crate::envelope::{GroupEnvelope, ListResponse, ListRow, RecordEnvelope};
use crate::panel::Panel;
use crate::resolver::ActionResolver;

const DELETE_ACTION: &str = "delete";

/// Result of a row action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionOutcome {
    Transitioned {
        transition: TransitionResult,
        record: Record,
    },
    TranslationCreated {
        #[serde(flatten)]
        response: CreateTranslationResponse,
        record: Record,
    },
    Dispatched {
        command: String,
        ids: Vec<String>,
    },
    Deleted {
        id: String,
    },
}

/// Result of a bulk action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub action: String,
    pub command: String,
    pub ids: Vec<String>,
}

type Decorated = (Record, Option<TranslationReadiness>);

/// A panel bound to its request-time collaborators.
#[derive(Clone)]
pub struct PanelBinding {
    panel: Arc<Panel>,
    readiness: Option<ReadinessEngine>,
    features: Option<Arc<dyn FeatureGate>>,
    bus: Option<CommandBus>,
    activity: Option<Arc<dyn ActivitySink>>,
    environment: String,
    default_locale: String,
}

impl PanelBinding {
    pub fn new(panel: Arc<Panel>) -> Self {
        Self {
            panel,
            readiness: None,
            features: None,
            bus: None,
            activity: None,
            environment: "production".into(),
            default_locale: "en".into(),
        }
    }

    /// Evaluate readiness with `engine`; environment and default locale
    /// follow its options.
    pub fn with_readiness(mut self, engine: ReadinessEngine) -> Self {
        self.environment = engine.options().environment.to_lowercase();
        self.default_locale = engine.options().default_locale.clone();
        self.readiness = Some(engine);
        self
    }

    pub fn with_features(mut self, features: Arc<dyn FeatureGate>) -> Self {
        self.features = Some(features);
        self
    }

    pub fn with_bus(mut self, bus: CommandBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_activity(mut self, activity: Arc<dyn ActivitySink>) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into().trim().to_lowercase();
        self
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// One page of decorated records, in repository order.
    pub async fn list(
        &self,
        ctx: &AdminContext,
        opts: &ListOptions,
    ) -> Result<ListResponse<RecordEnvelope>> {
        let page = self.panel.repository.list(ctx, opts).await?;
        let decorated = self.evaluate(ctx, page.records).await?;

        let mut resolver = ActionResolver::new(&self.panel, self.features.as_deref());
        let mut items = Vec::with_capacity(decorated.len());
        for (record, readiness) in decorated {
            items.push(self.envelope(ctx, &mut resolver, record, readiness).await);
        }
        Ok(ListResponse::page(items, page.total, opts))
    }

    /// Rows folded into translation groups. Paging applies to group rows.
    pub async fn list_grouped(
        &self,
        ctx: &AdminContext,
        opts: &ListOptions,
    ) -> Result<ListResponse<ListRow>> {
        let all = self.panel.repository.list(ctx, &opts.unpaged()).await?;
        let decorated = self.evaluate(ctx, all.records).await?;
        let rows = group_by_translation(decorated, &self.default_locale);
        let total = rows.len();

        let mut resolver = ActionResolver::new(&self.panel, self.features.as_deref());
        let mut items = Vec::new();
        for row in paginate(rows, opts) {
            let item = match row {
                GroupedRow::Group(group) => {
                    let summary_readiness = group.summary.as_readiness(&self.environment);
                    let parent_record = group.parent().0.clone();
                    let action_state = resolver
                        .resolve(ctx, &parent_record, Some(&summary_readiness))
                        .await;

                    let mut children = Vec::with_capacity(group.children.len());
                    for (record, readiness) in group.children {
                        children.push(self.envelope(ctx, &mut resolver, record, readiness).await);
                    }
                    let parent = children[group.parent_index].clone();
                    ListRow::Group(GroupEnvelope {
                        id: group.id,
                        translation_group_id: group.translation_group_id,
                        summary: group.summary,
                        action_state,
                        parent,
                        children,
                    })
                }
                GroupedRow::Ungrouped((record, readiness)) => {
                    ListRow::Record(self.envelope(ctx, &mut resolver, record, readiness).await)
                }
            };
            items.push(item);
        }
        Ok(ListResponse::page(items, total, opts))
    }

    pub async fn detail(&self, ctx: &AdminContext, id: &str) -> Result<RecordEnvelope> {
        let record = self.panel.repository.get(ctx, id).await?;
        let mut decorated = self.evaluate(ctx, vec![record]).await?;
        let (record, readiness) = decorated
            .pop()
            .ok_or_else(|| AdminError::not_found(self.panel.name.as_str(), id))?;
        let mut resolver = ActionResolver::new(&self.panel, self.features.as_deref());
        Ok(self.envelope(ctx, &mut resolver, record, readiness).await)
    }

    async fn evaluate(&self, ctx: &AdminContext, records: Vec<Record>) -> Result<Vec<Decorated>> {
        let Some(engine) = &self.readiness else {
            return Ok(records.into_iter().map(|r| (r, None)).collect());
        };
        let mut batch = engine.batch();
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            ctx.check_cancelled()?;
            let readiness = batch
                .evaluate(
                    ctx,
                    &self.panel.name,
                    &self.panel.entity_type,
                    &record,
                    Some(&self.environment),
                )
                .await?;
            out.push((record, readiness));
        }
        debug!(
            panel = %self.panel.name,
            records = out.len(),
            lookups = batch.lookups(),
            "Readiness evaluated"
        );
        Ok(out)
    }

    async fn envelope(
        &self,
        ctx: &AdminContext,
        resolver: &mut ActionResolver<'_>,
        record: Record,
        readiness: Option<TranslationReadiness>,
    ) -> RecordEnvelope {
        let state = resolver.resolve(ctx, &record, readiness.as_ref()).await;
        RecordEnvelope::new(record, state, readiness)
    }

    // ========================================================================
    // Actions
    // ========================================================================

    /// Run a row action. `payload.id` names the record; `payload.locale` is
    /// the requested (or, for `create_translation`, target) locale.
    pub async fn action(
        &self,
        ctx: &AdminContext,
        name: &str,
        payload: &Value,
    ) -> Result<ActionOutcome> {
        let action = self
            .panel
            .action(name)
            .ok_or_else(|| AdminError::not_found("action", normalize_action(name)))?;
        let id = payload
            .get("id")
            .and_then(value_to_string)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| AdminError::invalid_field("id", "record id is required"))?;
        let record = self.panel.repository.get(ctx, &id).await?;
        self.guard(ctx, action, &record).await?;

        if action.is_create_translation() {
            let locale = payload.get("locale").and_then(Value::as_str).unwrap_or_default();
            let (created, response) =
                create_translation(&self.panel, ctx, &record, locale, self.activity.as_deref())
                    .await?;
            return Ok(ActionOutcome::TranslationCreated {
                response,
                record: created,
            });
        }

        if action.is_workflow() {
            if self.panel.workflow.is_some() {
                return self.transition(ctx, action, record, payload).await;
            }
            if action.command_name.is_empty() {
                return Err(AdminError::ServiceUnavailable(format!(
                    "no workflow engine is configured for {}",
                    self.panel.entity_type
                )));
            }
        }

        if !action.command_name.is_empty() {
            if action.key() == PUBLISH_TRANSITION {
                self.check_publish_policy(ctx, action, &record, payload).await?;
            }
            let ids = vec![id];
            self.dispatch(ctx, action, payload, &ids).await?;
            return Ok(ActionOutcome::Dispatched {
                command: action.command_name.clone(),
                ids,
            });
        }

        if action.key() == DELETE_ACTION {
            self.panel.repository.delete(ctx, &id).await?;
            info!(panel = %self.panel.name, id = %id, "Record deleted");
            return Ok(ActionOutcome::Deleted { id });
        }

        Err(AdminError::validation(format!(
            "action {} has no server-side handler",
            action.key()
        ))
        .with_component("panels"))
    }

    /// Run a bulk action over `ids` through its command.
    pub async fn bulk_action(
        &self,
        ctx: &AdminContext,
        name: &str,
        ids: &[String],
        payload: &Value,
    ) -> Result<BulkOutcome> {
        let action = self
            .panel
            .bulk_action(name)
            .ok_or_else(|| AdminError::not_found("action", normalize_action(name)))?;
        if ids.is_empty() {
            return Err(AdminError::invalid_field("ids", "at least one id is required"));
        }
        authorize(
            self.panel.authorizer.as_deref(),
            ctx,
            &action.permission,
            &self.panel.name,
        )
        .await?;
        self.require_features(action)?;
        if action.command_name.is_empty() {
            return Err(AdminError::validation(format!(
                "bulk action {} has no command binding",
                action.key()
            ))
            .with_component("panels"));
        }

        if action.key() == PUBLISH_TRANSITION {
            for id in ids {
                let record = self.panel.repository.get(ctx, id).await?;
                self.check_publish_policy(ctx, action, &record, payload).await?;
            }
        }

        self.dispatch(ctx, action, payload, ids).await?;
        Ok(BulkOutcome {
            action: action.key(),
            command: action.command_name.clone(),
            ids: ids.to_vec(),
        })
    }

    /// The hard form of the resolver's context, permission and feature
    /// checks.
    async fn guard(&self, ctx: &AdminContext, action: &Action, record: &Record) -> Result<()> {
        if let Some(path) = action
            .context_required
            .iter()
            .find(|path| !record.has_present(path))
        {
            return Err(AdminError::invalid_field(
                path.as_str(),
                format!("missing required context: {path}"),
            )
            .with_component("panels"));
        }
        authorize(
            self.panel.authorizer.as_deref(),
            ctx,
            &action.permission,
            &self.panel.name,
        )
        .await?;
        self.require_features(action)
    }

    fn require_features(&self, action: &Action) -> Result<()> {
        if let Some(features) = &self.features {
            for key in action.features() {
                features.require(key)?;
            }
        }
        Ok(())
    }

    async fn transition(
        &self,
        ctx: &AdminContext,
        action: &Action,
        record: Record,
        payload: &Value,
    ) -> Result<ActionOutcome> {
        let panel = &self.panel;
        let engine = panel.workflow.as_ref().ok_or_else(|| {
            AdminError::ServiceUnavailable(format!(
                "no workflow engine is configured for {}",
                panel.entity_type
            ))
        })?;
        let id = record.id().unwrap_or_default();
        let status = record.status().unwrap_or_default().to_string();

        if action.key() == PUBLISH_TRANSITION {
            self.check_publish_policy(ctx, action, &record, payload).await?;
        }

        let available = engine
            .available_transitions(ctx, &panel.entity_type, &status)
            .await?;
        let Some(edge) = panel.aliases.resolve(&action.name, &available) else {
            return Err(AdminError::InvalidTransition {
                entity_type: panel.entity_type.clone(),
                transition: action.key(),
                from_state: status,
                available: available.iter().map(|t| t.name.clone()).collect(),
            });
        };

        let metadata = match payload.get("metadata") {
            Some(Value::Object(map)) => map.clone(),
            _ => Metadata::new(),
        };
        let result = engine
            .transition(
                ctx,
                TransitionInput {
                    entity_id: id.clone(),
                    entity_type: panel.entity_type.clone(),
                    current_state: status,
                    transition: edge.name.clone(),
                    actor_id: Some(ctx.actor().id.clone()),
                    metadata,
                },
            )
            .await?;

        let patch = Record::new().with(STATUS, result.to_state.as_str());
        let updated = panel.repository.update(ctx, &id, patch).await?;

        info!(
            panel = %panel.name,
            id = %id,
            action = %action.key(),
            transition = %result.transition,
            from = %result.from_state,
            to = %result.to_state,
            "Panel transition applied"
        );
        let entry = ActivityEntry::new(ctx, PANEL_TRANSITION, &panel.entity_type, &id)
            .with("panel", panel.name.as_str())
            .with("action", action.key())
            .with("transition", result.transition.as_str())
            .with("from_state", result.from_state.as_str())
            .with("to_state", result.to_state.as_str());
        record_best_effort(self.activity.as_deref(), ctx, entry).await;

        Ok(ActionOutcome::Transitioned {
            transition: result,
            record: updated,
        })
    }

    /// Run the translation policy for a publish. A block is recorded once
    /// and returned; nothing downstream runs.
    async fn check_publish_policy(
        &self,
        ctx: &AdminContext,
        action: &Action,
        record: &Record,
        payload: &Value,
    ) -> Result<()> {
        let Some(policy) = &self.panel.policy else {
            return Ok(());
        };
        let id = record.id().unwrap_or_default();
        let requested_locale = payload
            .get("locale")
            .and_then(Value::as_str)
            .or_else(|| record.locale())
            .unwrap_or_else(|| ctx.locale());
        let mut input = PolicyInput::new(&self.panel.entity_type, &id, PUBLISH_TRANSITION)
            .with_environment(self.environment.as_str())
            .with_policy_entity(self.panel.name.as_str())
            .with_locale(requested_locale);
        if let Some(status) = record.status() {
            input = input.with_state(status);
        }

        let Err(err) = policy.validate(ctx, &input).await else {
            return Ok(());
        };
        if let Some(missing) = err.as_missing_translations() {
            warn!(
                panel = %self.panel.name,
                id = %id,
                action = %action.key(),
                missing = ?missing.missing_locales,
                "Transition blocked by missing translations"
            );
            self.record_blocked(ctx, &id, &err, missing).await;
        }
        Err(err)
    }

    async fn record_blocked(
        &self,
        ctx: &AdminContext,
        id: &str,
        err: &AdminError,
        missing: &MissingTranslationsError,
    ) {
        let entry = ActivityEntry::new(ctx, PANEL_TRANSITION_BLOCKED, &self.panel.entity_type, id)
            .with("panel", self.panel.name.as_str())
            .with("entity_id", id)
            .with("transition", missing.transition.as_str())
            .with("locale", missing.requested_locale.as_str())
            .with("environment", missing.environment.as_str())
            .with("policy_entity", missing.policy_entity.as_str())
            .with("translation_code", err.text_code())
            .with("missing_locales", json!(missing.missing_locales));
        record_best_effort(self.activity.as_deref(), ctx, entry).await;
    }

    async fn dispatch(
        &self,
        ctx: &AdminContext,
        action: &Action,
        payload: &Value,
        ids: &[String],
    ) -> Result<()> {
        let bus = self.bus.as_ref().ok_or_else(|| {
            AdminError::ServiceUnavailable("command bus is not configured".to_string())
        })?;
        bus.dispatch_by_name(ctx, &action.command_name, payload, ids)
            .await?;

        let entry = ActivityEntry::new(
            ctx,
            PANEL_COMMAND_DISPATCHED,
            &self.panel.entity_type,
            ids.join(","),
        )
        .with("panel", self.panel.name.as_str())
        .with("action", action.key())
        .with("command", action.command_name.as_str())
        .with("ids", json!(ids));
        record_best_effort(self.activity.as_deref(), ctx, entry).await;
        Ok(())
    }
}
