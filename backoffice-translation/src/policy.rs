//! Translation policy.
//!
//! A policy decides whether a transition may proceed given the translations
//! that exist. The default policy resolves requirements, asks a
//! [`TranslationService`] what is missing, and fails with
//! [`MissingTranslationsError`] when locales (or, under the `error` strategy,
//! required fields) are missing.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use backoffice_core::{
    AdminContext, ListOptions, MissingTranslationsError, Predicate, Record, Repository, Result,
};

use crate::locale::{normalize_locale, normalize_locales};
use crate::requirements::{
    PolicyInput, RequiredFieldsStrategy, RequirementsProvider, TranslationRequirements,
};

/// Translation policy interface.
#[async_trait]
pub trait TranslationPolicy: Send + Sync {
    /// Allow or block a transition.
    async fn validate(&self, ctx: &AdminContext, input: &PolicyInput) -> Result<()>;

    /// Requirements for the input, if any are declared.
    async fn requirements(
        &self,
        _ctx: &AdminContext,
        _input: &PolicyInput,
    ) -> Result<Option<TranslationRequirements>> {
        Ok(None)
    }
}

/// Options passed to [`TranslationService::check`].
#[derive(Debug, Clone, Default)]
pub struct TranslationCheckOptions {
    pub state: Option<String>,
    pub environment: String,
    pub required_fields: BTreeMap<String, Vec<String>>,
    pub strategy: RequiredFieldsStrategy,
}

/// What a translation check found missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationCheck {
    pub missing_locales: Vec<String>,
    pub missing_fields_by_locale: BTreeMap<String, Vec<String>>,
}

/// Reports missing translations for an entity.
#[async_trait]
pub trait TranslationService: Send + Sync {
    async fn check(
        &self,
        ctx: &AdminContext,
        entity_id: &str,
        locales: &[String],
        options: &TranslationCheckOptions,
    ) -> Result<TranslationCheck>;
}

/// Requirement lookup plus translation service check.
pub struct DefaultTranslationPolicy {
    provider: Arc<dyn RequirementsProvider>,
    service: Arc<dyn TranslationService>,
}

impl DefaultTranslationPolicy {
    pub fn new(
        provider: Arc<dyn RequirementsProvider>,
        service: Arc<dyn TranslationService>,
    ) -> Self {
        Self { provider, service }
    }
}

#[async_trait]
impl TranslationPolicy for DefaultTranslationPolicy {
    async fn validate(&self, ctx: &AdminContext, input: &PolicyInput) -> Result<()> {
        let Some(requirements) = self.requirements(ctx, input).await? else {
            debug!(
                entity_id = %input.entity_id,
                transition = %input.transition,
                "No translation requirements"
            );
            return Ok(());
        };

        let options = TranslationCheckOptions {
            state: input.state.clone(),
            environment: input.resolved_environment(),
            required_fields: requirements.required_fields.clone(),
            strategy: requirements.required_fields_strategy,
        };
        let check = self
            .service
            .check(ctx, &input.entity_id, &requirements.locales, &options)
            .await?;

        let evaluated = requirements.evaluates_fields();
        let missing_fields: BTreeMap<String, Vec<String>> = if evaluated {
            check
                .missing_fields_by_locale
                .into_iter()
                .filter(|(_, fields)| !fields.is_empty())
                .collect()
        } else {
            BTreeMap::new()
        };
        let missing_locales = normalize_locales(&check.missing_locales);

        let blocked_by_fields = requirements.required_fields_strategy
            == RequiredFieldsStrategy::Error
            && !missing_fields.is_empty();
        if missing_locales.is_empty() && !blocked_by_fields {
            if !missing_fields.is_empty() {
                warn!(
                    entity_id = %input.entity_id,
                    transition = %input.transition,
                    locales = ?missing_fields.keys().collect::<Vec<_>>(),
                    "Required translation fields missing; allowed by warn strategy"
                );
            }
            return Ok(());
        }

        Err(MissingTranslationsError {
            entity_type: input.entity_type.trim().to_lowercase(),
            entity_id: input.entity_id.clone(),
            transition: input.transition.trim().to_lowercase(),
            requested_locale: normalize_locale(&input.requested_locale),
            environment: options.environment,
            policy_entity: input.resolved_policy_entity(),
            missing_locales,
            missing_fields_by_locale: missing_fields,
            required_fields_evaluated: evaluated,
        }
        .into())
    }

    async fn requirements(
        &self,
        ctx: &AdminContext,
        input: &PolicyInput,
    ) -> Result<Option<TranslationRequirements>> {
        Ok(self
            .provider
            .requirements(ctx, input)
            .await?
            .map(|r| r.normalized())
            .filter(|r| !r.is_empty()))
    }
}

/// Adapts a policy into a requirements provider for readiness evaluation.
pub struct PolicyRequirements(pub Arc<dyn TranslationPolicy>);

#[async_trait]
impl RequirementsProvider for PolicyRequirements {
    async fn requirements(
        &self,
        ctx: &AdminContext,
        input: &PolicyInput,
    ) -> Result<Option<TranslationRequirements>> {
        self.0.requirements(ctx, input).await
    }
}

// ============================================================================
// Repository-backed translation service
// ============================================================================

/// Checks translations by reading the entity's locale siblings.
pub struct RepositoryTranslationService {
    repository: Arc<dyn Repository>,
}

impl RepositoryTranslationService {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    async fn siblings(&self, ctx: &AdminContext, record: &Record) -> Result<Vec<Record>> {
        let Some(group) = record.translation_group_id() else {
            return Ok(vec![record.clone()]);
        };
        let opts = ListOptions::new().with_predicate(Predicate::eq("translation_group_id", group));
        let mut siblings = self.repository.list(ctx, &opts).await?.records;
        if !siblings.iter().any(|s| s.id() == record.id()) {
            siblings.push(record.clone());
        }
        Ok(siblings)
    }
}

#[async_trait]
impl TranslationService for RepositoryTranslationService {
    async fn check(
        &self,
        ctx: &AdminContext,
        entity_id: &str,
        locales: &[String],
        options: &TranslationCheckOptions,
    ) -> Result<TranslationCheck> {
        let record = self.repository.get(ctx, entity_id).await?;
        let siblings = self.siblings(ctx, &record).await?;

        let by_locale: BTreeMap<String, &Record> = siblings
            .iter()
            .filter_map(|s| s.locale().map(|l| (normalize_locale(l), s)))
            .collect();
        let mut available: Vec<String> = by_locale.keys().cloned().collect();
        available.extend(record.available_locales());
        let available = normalize_locales(available);

        let missing_locales = normalize_locales(locales)
            .into_iter()
            .filter(|l| !available.contains(l))
            .collect();

        let mut missing_fields_by_locale = BTreeMap::new();
        if options.strategy != RequiredFieldsStrategy::Ignore {
            for (locale, fields) in &options.required_fields {
                let Some(sibling) = by_locale.get(&normalize_locale(locale)) else {
                    continue;
                };
                let missing: Vec<String> = fields
                    .iter()
                    .filter(|f| !sibling.has_present(f))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    missing_fields_by_locale.insert(normalize_locale(locale), missing);
                }
            }
        }

        Ok(TranslationCheck {
            missing_locales,
            missing_fields_by_locale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirements::{RequirementsConfig, StaticRequirementsProvider};
    use backoffice_core::MemoryRepository;
    use serde_json::json;

    async fn repo() -> Arc<MemoryRepository> {
        let repo = MemoryRepository::new("pages");
        repo.seed([
            Record::try_from(json!({
                "id": "p1", "locale": "en", "translation_group_id": "tg", "title": "Home"
            }))
            .unwrap(),
            Record::try_from(json!({
                "id": "p2", "locale": "fr", "translation_group_id": "tg", "title": ""
            }))
            .unwrap(),
        ])
        .await;
        Arc::new(repo)
    }

    fn policy(
        repo: Arc<MemoryRepository>,
        req: TranslationRequirements,
    ) -> DefaultTranslationPolicy {
        let provider = StaticRequirementsProvider::new(
            RequirementsConfig::default().with("pages", "publish", req),
        );
        DefaultTranslationPolicy::new(
            Arc::new(provider),
            Arc::new(RepositoryTranslationService::new(repo)),
        )
    }

    fn input() -> PolicyInput {
        PolicyInput::new("pages", "p1", "publish")
            .with_environment("production")
            .with_locale("en")
    }

    #[tokio::test]
    async fn test_missing_locale_blocks() {
        let policy = policy(repo().await, TranslationRequirements::new(["en", "es"]));
        let err = policy.validate(&AdminContext::new("u"), &input()).await.unwrap_err();

        assert!(err.is_missing_translations());
        let missing = err.as_missing_translations().unwrap();
        assert_eq!(missing.missing_locales, vec!["es"]);
        assert_eq!(missing.policy_entity, "pages");
        assert!(!missing.required_fields_evaluated);
        assert_eq!(err.status().as_u16(), 409);
    }

    #[tokio::test]
    async fn test_missing_fields_follow_strategy() {
        let req = TranslationRequirements::new(["en", "fr"]).with_required_fields("fr", ["title"]);
        let ctx = AdminContext::new("u");

        let err = policy(repo().await, req.clone())
            .validate(&ctx, &input())
            .await
            .unwrap_err();
        let missing = err.as_missing_translations().unwrap();
        assert!(missing.missing_locales.is_empty());
        assert_eq!(missing.missing_fields_by_locale["fr"], vec!["title"]);
        assert_eq!(err.status().as_u16(), 422);

        let warn = req.clone().with_strategy(RequiredFieldsStrategy::Warn);
        assert!(policy(repo().await, warn).validate(&ctx, &input()).await.is_ok());

        let ignore = req.with_strategy(RequiredFieldsStrategy::Ignore);
        assert!(policy(repo().await, ignore).validate(&ctx, &input()).await.is_ok());
    }

    #[tokio::test]
    async fn test_no_requirements_allows() {
        let policy = policy(repo().await, TranslationRequirements::default());
        assert!(policy.validate(&AdminContext::new("u"), &input()).await.is_ok());
    }

    #[tokio::test]
    async fn test_policy_as_requirements_provider() {
        let policy: Arc<dyn TranslationPolicy> =
            Arc::new(policy(repo().await, TranslationRequirements::new(["en"])));
        let provider = PolicyRequirements(policy);
        let req = provider
            .requirements(&AdminContext::new("u"), &input())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.locales, vec!["en"]);
    }
}
