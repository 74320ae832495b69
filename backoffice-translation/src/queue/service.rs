//! Translation queue service.
//!
//! Every transition reads the assignment, checks the caller's expected
//! version, validates the move against the state machine and writes back
//! with the expected version. Nothing retries on conflict.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use backoffice_core::activity::{record_best_effort, TRANSLATION_ASSIGNMENT_CHANGED};
use backoffice_core::permissions::{
    authorize, TRANSLATIONS_APPROVE, TRANSLATIONS_ASSIGN, TRANSLATIONS_CLAIM, TRANSLATIONS_MANAGE,
};
use backoffice_core::{
    ActivityEntry, ActivitySink, AdminContext, AdminError, Authorizer, FeatureGate, FeatureKey,
    Metadata, Result,
};

use super::assignment::{
    AssignmentStatus, AssignmentType, Priority, QueueRow, QueueTransition, TranslationAssignment,
};
use super::repository::{AssignmentFilter, AssignmentRepository};
use crate::locale::normalize_locale;

/// Permission for reading the queue.
pub const TRANSLATIONS_VIEW: &str = "admin.translations.view";

/// Object type used in activity entries.
const ASSIGNMENT_OBJECT: &str = "translation_assignment";

/// Input for creating an assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAssignmentInput {
    /// Defaults to `source_record_id`
    #[serde(default)]
    pub translation_group_id: String,
    pub entity_type: String,
    pub source_record_id: String,
    pub source_locale: String,
    pub target_locale: String,
    #[serde(default)]
    pub assignment_type: AssignmentType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assignee_id: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

/// Queue operations.
#[async_trait]
pub trait TranslationQueueService: Send + Sync {
    async fn create(
        &self,
        ctx: &AdminContext,
        input: CreateAssignmentInput,
    ) -> Result<TranslationAssignment>;
    async fn get(&self, ctx: &AdminContext, id: &str) -> Result<TranslationAssignment>;
    async fn list(&self, ctx: &AdminContext, filter: &AssignmentFilter) -> Result<Vec<QueueRow>>;

    async fn assign(
        &self,
        ctx: &AdminContext,
        id: &str,
        assignee_id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment>;
    async fn claim(
        &self,
        ctx: &AdminContext,
        id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment>;
    async fn release(
        &self,
        ctx: &AdminContext,
        id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment>;
    async fn submit_review(
        &self,
        ctx: &AdminContext,
        id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment>;
    async fn approve(
        &self,
        ctx: &AdminContext,
        id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment>;
    async fn reject(
        &self,
        ctx: &AdminContext,
        id: &str,
        reason: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment>;
    async fn archive(
        &self,
        ctx: &AdminContext,
        id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment>;
    async fn mark_published(
        &self,
        ctx: &AdminContext,
        id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment>;
    async fn update_priority(
        &self,
        ctx: &AdminContext,
        id: &str,
        priority: Priority,
        expected_version: u64,
    ) -> Result<TranslationAssignment>;

    async fn bulk_assign(
        &self,
        ctx: &AdminContext,
        ids: &[String],
        assignee_id: &str,
    ) -> Result<Vec<TranslationAssignment>>;
    async fn bulk_release(
        &self,
        ctx: &AdminContext,
        ids: &[String],
    ) -> Result<Vec<TranslationAssignment>>;
    async fn bulk_priority(
        &self,
        ctx: &AdminContext,
        ids: &[String],
        priority: Priority,
    ) -> Result<Vec<TranslationAssignment>>;
    async fn bulk_archive(
        &self,
        ctx: &AdminContext,
        ids: &[String],
    ) -> Result<Vec<TranslationAssignment>>;
}

/// Permission a transition requires.
pub fn required_permission(transition: QueueTransition) -> &'static str {
    match transition {
        QueueTransition::Claim | QueueTransition::Release | QueueTransition::SubmitReview => {
            TRANSLATIONS_CLAIM
        }
        QueueTransition::Assign => TRANSLATIONS_ASSIGN,
        QueueTransition::Approve | QueueTransition::Reject => TRANSLATIONS_APPROVE,
        QueueTransition::Archive | QueueTransition::Publish => TRANSLATIONS_MANAGE,
    }
}

/// Conflict for a move the state machine does not allow.
pub fn invalid_transition(
    assignment: &TranslationAssignment,
    transition: QueueTransition,
) -> AdminError {
    let mut meta = Metadata::new();
    meta.insert("from_status".into(), json!(assignment.status.as_str()));
    meta.insert("transition".into(), json!(transition.as_str()));
    meta.insert("assignment_id".into(), json!(assignment.id));
    meta.insert("translation_group_id".into(), json!(assignment.translation_group_id));
    meta.insert("entity_type".into(), json!(assignment.entity_type));
    meta.insert("source_locale".into(), json!(assignment.source_locale));
    meta.insert("target_locale".into(), json!(assignment.target_locale));
    AdminError::conflict(
        "invalid_transition",
        format!(
            "cannot {} assignment {} in status {}",
            transition, assignment.id, assignment.status
        ),
        meta,
    )
}

/// Queue service over an [`AssignmentRepository`].
pub struct DefaultTranslationQueueService {
    repository: Arc<dyn AssignmentRepository>,
    activity: Option<Arc<dyn ActivitySink>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    features: Option<Arc<dyn FeatureGate>>,
}

impl DefaultTranslationQueueService {
    pub fn new(repository: Arc<dyn AssignmentRepository>) -> Self {
        Self {
            repository,
            activity: None,
            authorizer: None,
            features: None,
        }
    }

    pub fn with_activity(mut self, activity: Arc<dyn ActivitySink>) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn with_features(mut self, features: Arc<dyn FeatureGate>) -> Self {
        self.features = Some(features);
        self
    }

    async fn gate(&self, ctx: &AdminContext, permission: &str) -> Result<()> {
        if let Some(features) = &self.features {
            features.require(FeatureKey::TranslationQueue)?;
        }
        authorize(self.authorizer.as_deref(), ctx, permission, "translations").await
    }

    /// Read, check version and state, mutate, write with the expected version.
    async fn transition<F>(
        &self,
        ctx: &AdminContext,
        id: &str,
        expected_version: u64,
        transition: QueueTransition,
        mutate: F,
    ) -> Result<TranslationAssignment>
    where
        F: FnOnce(&mut TranslationAssignment) + Send,
    {
        self.gate(ctx, required_permission(transition)).await?;
        let current = self.repository.get(ctx, id).await?;
        if current.version != expected_version {
            return Err(AdminError::version_mismatch(
                ASSIGNMENT_OBJECT,
                id,
                expected_version,
                current.version,
            ));
        }
        let Some(next) = current.next_status(transition) else {
            debug!(
                assignment_id = %id,
                from = %current.status,
                transition = %transition,
                "Rejected queue transition"
            );
            return Err(invalid_transition(&current, transition));
        };

        let mut updated = current.clone();
        updated.status = next;
        mutate(&mut updated);
        let saved = self.repository.update(ctx, updated, expected_version).await?;

        info!(
            assignment_id = %saved.id,
            transition = %transition,
            from = %current.status,
            to = %saved.status,
            version = saved.version,
            "Translation assignment transitioned"
        );
        self.record(ctx, &saved, transition.as_str(), Some(current.status))
            .await;
        Ok(saved)
    }

    async fn record(
        &self,
        ctx: &AdminContext,
        assignment: &TranslationAssignment,
        change: &str,
        from: Option<AssignmentStatus>,
    ) {
        let mut entry = ActivityEntry::new(
            ctx,
            TRANSLATION_ASSIGNMENT_CHANGED,
            ASSIGNMENT_OBJECT,
            &assignment.id,
        )
        .with("change", change)
        .with("to_status", assignment.status.as_str())
        .with("version", assignment.version)
        .with("translation_group_id", assignment.translation_group_id.as_str())
        .with("target_locale", assignment.target_locale.as_str());
        if let Some(from) = from {
            entry = entry.with("from_status", from.as_str());
        }
        record_best_effort(self.activity.as_deref(), ctx, entry).await;
    }

    /// Apply `op` to each id with the version read just before it; stop at the
    /// first failure.
    async fn bulk<'a, F, Fut>(
        &'a self,
        ctx: &'a AdminContext,
        ids: &'a [String],
        op: F,
    ) -> Result<Vec<TranslationAssignment>>
    where
        F: Fn(&'a str, u64) -> Fut + Send,
        Fut: std::future::Future<Output = Result<TranslationAssignment>> + Send + 'a,
    {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let current = self.repository.get(ctx, id).await?;
            out.push(op(id.as_str(), current.version).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl TranslationQueueService for DefaultTranslationQueueService {
    async fn create(
        &self,
        ctx: &AdminContext,
        input: CreateAssignmentInput,
    ) -> Result<TranslationAssignment> {
        self.gate(ctx, TRANSLATIONS_ASSIGN).await?;
        for (field, value) in [
            ("entity_type", &input.entity_type),
            ("source_record_id", &input.source_record_id),
            ("source_locale", &input.source_locale),
            ("target_locale", &input.target_locale),
        ] {
            if value.trim().is_empty() {
                return Err(AdminError::invalid_field(field, format!("{field} is required")));
            }
        }
        let source_locale = normalize_locale(&input.source_locale);
        let target_locale = normalize_locale(&input.target_locale);
        if source_locale == target_locale {
            return Err(AdminError::invalid_field(
                "target_locale",
                "target_locale must differ from source_locale",
            ));
        }

        let translation_group_id = if input.translation_group_id.trim().is_empty() {
            input.source_record_id.trim().to_string()
        } else {
            input.translation_group_id.trim().to_string()
        };
        let now = Utc::now();
        let assignment = TranslationAssignment {
            id: String::new(),
            translation_group_id,
            entity_type: input.entity_type.trim().to_lowercase(),
            source_record_id: input.source_record_id,
            source_locale,
            target_locale,
            assignment_type: input.assignment_type,
            status: AssignmentStatus::Pending,
            priority: input.priority,
            assignee_id: input.assignee_id,
            assigner_id: ctx.user_id().to_string(),
            due_date: input.due_date,
            claimed_at: None,
            submitted_at: None,
            approved_at: None,
            archived_at: None,
            last_reviewer_id: String::new(),
            last_rejection_reason: String::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let created = self.repository.create(ctx, assignment).await?;
        info!(
            assignment_id = %created.id,
            translation_group_id = %created.translation_group_id,
            target_locale = %created.target_locale,
            "Translation assignment created"
        );
        self.record(ctx, &created, "create", None).await;
        Ok(created)
    }

    async fn get(&self, ctx: &AdminContext, id: &str) -> Result<TranslationAssignment> {
        self.gate(ctx, TRANSLATIONS_VIEW).await?;
        self.repository.get(ctx, id).await
    }

    async fn list(&self, ctx: &AdminContext, filter: &AssignmentFilter) -> Result<Vec<QueueRow>> {
        self.gate(ctx, TRANSLATIONS_VIEW).await?;
        let now = Utc::now();
        Ok(self
            .repository
            .list(ctx, filter)
            .await?
            .into_iter()
            .map(|a| QueueRow::new(a, now))
            .collect())
    }

    async fn assign(
        &self,
        ctx: &AdminContext,
        id: &str,
        assignee_id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment> {
        if assignee_id.trim().is_empty() {
            return Err(AdminError::invalid_field("assignee_id", "assignee_id is required"));
        }
        let assigner = ctx.user_id().to_string();
        let assignee = assignee_id.trim().to_string();
        self.transition(ctx, id, expected_version, QueueTransition::Assign, move |a| {
            a.assignee_id = assignee;
            a.assigner_id = assigner;
        })
        .await
    }

    async fn claim(
        &self,
        ctx: &AdminContext,
        id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment> {
        let claimer = ctx.user_id().to_string();
        self.transition(ctx, id, expected_version, QueueTransition::Claim, move |a| {
            a.assignee_id = claimer;
            a.claimed_at = Some(Utc::now());
        })
        .await
    }

    async fn release(
        &self,
        ctx: &AdminContext,
        id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment> {
        self.transition(ctx, id, expected_version, QueueTransition::Release, |a| {
            a.assignee_id.clear();
            a.claimed_at = None;
        })
        .await
    }

    async fn submit_review(
        &self,
        ctx: &AdminContext,
        id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment> {
        self.transition(ctx, id, expected_version, QueueTransition::SubmitReview, |a| {
            a.submitted_at = Some(Utc::now());
        })
        .await
    }

    async fn approve(
        &self,
        ctx: &AdminContext,
        id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment> {
        let reviewer = ctx.user_id().to_string();
        self.transition(ctx, id, expected_version, QueueTransition::Approve, move |a| {
            a.approved_at = Some(Utc::now());
            a.last_reviewer_id = reviewer;
        })
        .await
    }

    async fn reject(
        &self,
        ctx: &AdminContext,
        id: &str,
        reason: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(AdminError::invalid_field("reason", "a rejection reason is required"));
        }
        let reviewer = ctx.user_id().to_string();
        self.transition(ctx, id, expected_version, QueueTransition::Reject, move |a| {
            a.last_reviewer_id = reviewer;
            a.last_rejection_reason = reason;
        })
        .await
    }

    async fn archive(
        &self,
        ctx: &AdminContext,
        id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment> {
        self.transition(ctx, id, expected_version, QueueTransition::Archive, |a| {
            a.archived_at = Some(Utc::now());
        })
        .await
    }

    async fn mark_published(
        &self,
        ctx: &AdminContext,
        id: &str,
        expected_version: u64,
    ) -> Result<TranslationAssignment> {
        self.transition(ctx, id, expected_version, QueueTransition::Publish, |_| {})
            .await
    }

    async fn update_priority(
        &self,
        ctx: &AdminContext,
        id: &str,
        priority: Priority,
        expected_version: u64,
    ) -> Result<TranslationAssignment> {
        self.gate(ctx, TRANSLATIONS_ASSIGN).await?;
        let current = self.repository.get(ctx, id).await?;
        if current.version != expected_version {
            return Err(AdminError::version_mismatch(
                ASSIGNMENT_OBJECT,
                id,
                expected_version,
                current.version,
            ));
        }
        if current.status.is_terminal() {
            let mut meta = Metadata::new();
            meta.insert("assignment_id".into(), json!(current.id));
            meta.insert("from_status".into(), json!(current.status.as_str()));
            return Err(AdminError::conflict(
                "invalid_transition",
                format!("assignment {} is {}", current.id, current.status),
                meta,
            ));
        }

        let mut updated = current;
        updated.priority = priority;
        let saved = self.repository.update(ctx, updated, expected_version).await?;
        debug!(
            assignment_id = %saved.id,
            priority = ?saved.priority,
            "Translation assignment priority changed"
        );
        self.record(ctx, &saved, "priority", None).await;
        Ok(saved)
    }

    async fn bulk_assign(
        &self,
        ctx: &AdminContext,
        ids: &[String],
        assignee_id: &str,
    ) -> Result<Vec<TranslationAssignment>> {
        self.bulk(ctx, ids, |id, version| self.assign(ctx, id, assignee_id, version))
            .await
    }

    async fn bulk_release(
        &self,
        ctx: &AdminContext,
        ids: &[String],
    ) -> Result<Vec<TranslationAssignment>> {
        self.bulk(ctx, ids, |id, version| self.release(ctx, id, version))
            .await
    }

    async fn bulk_priority(
        &self,
        ctx: &AdminContext,
        ids: &[String],
        priority: Priority,
    ) -> Result<Vec<TranslationAssignment>> {
        self.bulk(ctx, ids, |id, version| self.update_priority(ctx, id, priority, version))
            .await
    }

    async fn bulk_archive(
        &self,
        ctx: &AdminContext,
        ids: &[String],
    ) -> Result<Vec<TranslationAssignment>> {
        self.bulk(ctx, ids, |id, version| self.archive(ctx, id, version))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::repository::MemoryAssignmentRepository;
    use backoffice_core::{MemoryActivitySink, StaticAuthorizer};

    fn input(target: &str, assignment_type: AssignmentType) -> CreateAssignmentInput {
        CreateAssignmentInput {
            translation_group_id: "tg_1".into(),
            entity_type: "pages".into(),
            source_record_id: "page_1".into(),
            source_locale: "en".into(),
            target_locale: target.into(),
            assignment_type,
            ..CreateAssignmentInput::default()
        }
    }

    fn service() -> (DefaultTranslationQueueService, Arc<MemoryActivitySink>) {
        let activity = Arc::new(MemoryActivitySink::new());
        let svc = DefaultTranslationQueueService::new(Arc::new(MemoryAssignmentRepository::new()))
            .with_activity(activity.clone());
        (svc, activity)
    }

    #[tokio::test]
    async fn test_group_defaults_to_source_record() {
        let (svc, _) = service();
        let mut req = input("es", AssignmentType::Direct);
        req.translation_group_id = String::new();
        let created = svc.create(&AdminContext::new("mgr"), req).await.unwrap();
        assert_eq!(created.translation_group_id, "page_1");
        assert_eq!(created.assigner_id, "mgr");
    }

    #[tokio::test]
    async fn test_direct_assignment_flow() {
        let (svc, activity) = service();
        let mgr = AdminContext::new("mgr");
        let translator = AdminContext::new("tr");
        let a = svc.create(&mgr, input("es", AssignmentType::Direct)).await.unwrap();

        let err = svc.claim(&translator, &a.id, 0).await.unwrap_err();
        assert_eq!(err.conflict_type(), Some("invalid_transition"));
        let meta = err.metadata();
        assert_eq!(meta["from_status"], "pending");
        assert_eq!(meta["transition"], "claim");
        assert_eq!(meta["target_locale"], "es");

        let a = svc.assign(&mgr, &a.id, "tr", 0).await.unwrap();
        assert_eq!(a.status, AssignmentStatus::Assigned);
        assert_eq!(a.assignee_id, "tr");
        let a = svc.claim(&translator, &a.id, 1).await.unwrap();
        assert_eq!(a.status, AssignmentStatus::InProgress);
        assert!(a.claimed_at.is_some());
        let a = svc.submit_review(&translator, &a.id, 2).await.unwrap();

        let err = svc.reject(&mgr, &a.id, "  ", 3).await.unwrap_err();
        assert_eq!(err.metadata()["field"], "reason");

        let a = svc.reject(&mgr, &a.id, "tone is off", 3).await.unwrap();
        assert_eq!(a.status, AssignmentStatus::Rejected);
        assert_eq!(a.last_rejection_reason, "tone is off");
        assert_eq!(a.last_reviewer_id, "mgr");

        let a = svc.release(&translator, &a.id, 4).await.unwrap();
        assert_eq!(a.status, AssignmentStatus::Pending);
        assert!(a.assignee_id.is_empty());

        assert_eq!(activity.by_verb(TRANSLATION_ASSIGNMENT_CHANGED).await.len(), 6);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let (svc, _) = service();
        let ctx = AdminContext::new("tr");
        let a = svc.create(&ctx, input("es", AssignmentType::OpenPool)).await.unwrap();
        svc.claim(&ctx, &a.id, 0).await.unwrap();

        let err = svc.release(&ctx, &a.id, 0).await.unwrap_err();
        assert_eq!(err.conflict_type(), Some("version_mismatch"));
    }

    #[tokio::test]
    async fn test_publish_then_archive_fails() {
        let (svc, _) = service();
        let ctx = AdminContext::new("tr");
        let a = svc.create(&ctx, input("es", AssignmentType::OpenPool)).await.unwrap();
        let a = svc.claim(&ctx, &a.id, 0).await.unwrap();
        let a = svc.submit_review(&ctx, &a.id, a.version).await.unwrap();
        let a = svc.approve(&ctx, &a.id, a.version).await.unwrap();
        let a = svc.mark_published(&ctx, &a.id, a.version).await.unwrap();
        assert_eq!(a.status, AssignmentStatus::Published);

        let err = svc.archive(&ctx, &a.id, a.version).await.unwrap_err();
        assert_eq!(err.status().as_u16(), 409);
        let err = svc.update_priority(&ctx, &a.id, Priority::High, a.version).await.unwrap_err();
        assert_eq!(err.conflict_type(), Some("invalid_transition"));
    }

    #[tokio::test]
    async fn test_bulk_stops_at_first_failure() {
        let (svc, _) = service();
        let ctx = AdminContext::new("mgr");
        let es = svc.create(&ctx, input("es", AssignmentType::Direct)).await.unwrap();
        let fr = svc.create(&ctx, input("fr", AssignmentType::Direct)).await.unwrap();
        let de = svc.create(&ctx, input("de", AssignmentType::Direct)).await.unwrap();
        svc.archive(&ctx, &fr.id, 0).await.unwrap();

        let ids = vec![es.id.clone(), fr.id.clone(), de.id.clone()];
        let err = svc.bulk_assign(&ctx, &ids, "tr").await.unwrap_err();
        assert_eq!(err.metadata()["assignment_id"], fr.id.as_str());

        assert_eq!(svc.get(&ctx, &es.id).await.unwrap().status, AssignmentStatus::Assigned);
        assert_eq!(svc.get(&ctx, &de.id).await.unwrap().status, AssignmentStatus::Pending);

        let updated = svc
            .bulk_priority(&ctx, &[es.id.clone(), de.id.clone()], Priority::Urgent)
            .await
            .unwrap();
        assert!(updated.iter().all(|a| a.priority == Priority::Urgent));
        assert_eq!(updated[0].version, 2);
        assert_eq!(updated[1].version, 1);
    }

    #[tokio::test]
    async fn test_list_includes_contract_view() {
        let (svc, _) = service();
        let ctx = AdminContext::new("mgr");
        svc.create(&ctx, input("es", AssignmentType::OpenPool)).await.unwrap();
        let rows = svc.list(&ctx, &AssignmentFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].contract.queue_state, AssignmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_permissions_per_operation() {
        let authorizer = StaticAuthorizer::new()
            .grant("translator", [TRANSLATIONS_CLAIM, TRANSLATIONS_VIEW])
            .grant("manager", ["admin.translations.*"]);
        let svc = DefaultTranslationQueueService::new(Arc::new(MemoryAssignmentRepository::new()))
            .with_authorizer(Arc::new(authorizer));
        let translator = AdminContext::new("translator");
        let manager = AdminContext::new("manager");

        let err = svc
            .create(&translator, input("es", AssignmentType::OpenPool))
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 403);

        let a = svc.create(&manager, input("es", AssignmentType::OpenPool)).await.unwrap();
        let a = svc.claim(&translator, &a.id, 0).await.unwrap();
        let a = svc.submit_review(&translator, &a.id, 1).await.unwrap();
        let err = svc.approve(&translator, &a.id, 2).await.unwrap_err();
        assert_eq!(err.status().as_u16(), 403);
        assert!(svc.approve(&manager, &a.id, 2).await.is_ok());
    }
}
