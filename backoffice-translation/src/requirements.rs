//! Translation requirements and their lookup.
//!
//! Requirements are keyed by policy entity, transition and environment. The
//! YAML form mirrors that nesting:
//!
//! ```yaml
//! entities:
//!   pages:
//!     transitions:
//!       publish:
//!         locales: [en, es]
//!         required_fields:
//!           es: [title, summary]
//!         environments:
//!           staging:
//!             locales: [en]
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use backoffice_core::{AdminContext, Result};

use crate::locale::{
    normalize_locale, normalize_locales, normalize_policy_entity, split_environment,
};

/// How missing required fields affect a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum RequiredFieldsStrategy {
    /// Missing fields block the transition
    #[default]
    Error,
    /// Missing fields are reported but allowed
    Warn,
    /// Fields are not evaluated
    Ignore,
}

/// Locales and fields a transition requires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRequirements {
    #[serde(default)]
    pub locales: Vec<String>,
    #[serde(default)]
    pub required_fields: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub required_fields_strategy: RequiredFieldsStrategy,
}

impl TranslationRequirements {
    pub fn new<I, S>(locales: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            locales: normalize_locales(locales),
            ..Self::default()
        }
    }

    pub fn with_required_fields<I, S>(mut self, locale: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields
            .entry(normalize_locale(locale))
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_strategy(mut self, strategy: RequiredFieldsStrategy) -> Self {
        self.required_fields_strategy = strategy;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.locales.is_empty() && self.required_fields.values().all(Vec::is_empty)
    }

    /// Whether required fields take part in evaluation.
    pub fn evaluates_fields(&self) -> bool {
        self.required_fields_strategy != RequiredFieldsStrategy::Ignore
            && self.required_fields.values().any(|f| !f.is_empty())
    }

    /// Locales normalized; field map keyed by normalized locale.
    pub fn normalized(&self) -> Self {
        let mut required_fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (locale, fields) in &self.required_fields {
            let entry = required_fields.entry(normalize_locale(locale)).or_default();
            for field in fields {
                let field = field.trim();
                if !field.is_empty() && !entry.iter().any(|f| f == field) {
                    entry.push(field.to_string());
                }
            }
        }
        Self {
            locales: normalize_locales(&self.locales),
            required_fields,
            required_fields_strategy: self.required_fields_strategy,
        }
    }
}

/// Lookup key for requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyInput {
    pub entity_type: String,
    pub entity_id: String,
    pub transition: String,
    pub environment: String,
    /// Panel or entity name the requirements are declared under; defaults to
    /// the entity type
    pub policy_entity: String,
    pub requested_locale: String,
    /// Current workflow state, when known
    pub state: Option<String>,
}

impl PolicyInput {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        transition: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            transition: transition.into(),
            ..Self::default()
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_policy_entity(mut self, policy_entity: impl Into<String>) -> Self {
        self.policy_entity = policy_entity.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.requested_locale = locale.into();
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Normalized policy entity, falling back to the entity type.
    pub fn resolved_policy_entity(&self) -> String {
        let source = if self.policy_entity.trim().is_empty() {
            &self.entity_type
        } else {
            &self.policy_entity
        };
        normalize_policy_entity(source)
    }

    /// Explicit environment, else the one embedded in the policy entity.
    pub fn resolved_environment(&self) -> String {
        if !self.environment.trim().is_empty() {
            return self.environment.trim().to_lowercase();
        }
        split_environment(&self.policy_entity)
            .1
            .map(str::to_lowercase)
            .unwrap_or_default()
    }
}

/// Source of requirements.
#[async_trait]
pub trait RequirementsProvider: Send + Sync {
    async fn requirements(
        &self,
        ctx: &AdminContext,
        input: &PolicyInput,
    ) -> Result<Option<TranslationRequirements>>;
}

// ============================================================================
// Configuration-backed provider
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequirements {
    #[serde(flatten)]
    pub default: TranslationRequirements,
    /// Per-environment overrides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environments: BTreeMap<String, TranslationRequirements>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRequirements {
    #[serde(default)]
    pub transitions: BTreeMap<String, TransitionRequirements>,
}

/// Requirements declared per policy entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementsConfig {
    #[serde(default)]
    pub entities: BTreeMap<String, EntityRequirements>,
}

impl RequirementsConfig {
    /// Declare requirements for `entity` / `transition`.
    pub fn with(
        mut self,
        entity: &str,
        transition: &str,
        requirements: TranslationRequirements,
    ) -> Self {
        self.entities
            .entry(normalize_policy_entity(entity))
            .or_default()
            .transitions
            .entry(transition.trim().to_lowercase())
            .or_default()
            .default = requirements;
        self
    }

    /// Declare an environment override for `entity` / `transition`.
    pub fn with_environment(
        mut self,
        entity: &str,
        transition: &str,
        environment: &str,
        requirements: TranslationRequirements,
    ) -> Self {
        self.entities
            .entry(normalize_policy_entity(entity))
            .or_default()
            .transitions
            .entry(transition.trim().to_lowercase())
            .or_default()
            .environments
            .insert(environment.trim().to_lowercase(), requirements);
        self
    }

    /// Resolve requirements; environment overrides win over the default.
    pub fn resolve(&self, input: &PolicyInput) -> Option<TranslationRequirements> {
        let entity = input.resolved_policy_entity();
        let transition = input.transition.trim().to_lowercase();
        let environment = input.resolved_environment();

        let entry = self
            .entities
            .iter()
            .find(|(name, _)| normalize_policy_entity(name) == entity)
            .map(|(_, e)| e)?
            .transitions
            .get(&transition)?;

        let requirements = entry
            .environments
            .iter()
            .find(|(env, _)| env.to_lowercase() == environment)
            .map(|(_, r)| r)
            .unwrap_or(&entry.default);

        Some(requirements.normalized()).filter(|r| !r.is_empty())
    }
}

/// Requirements provider over a static configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticRequirementsProvider {
    config: RequirementsConfig,
}

impl StaticRequirementsProvider {
    pub fn new(config: RequirementsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RequirementsConfig {
        &self.config
    }
}

#[async_trait]
impl RequirementsProvider for StaticRequirementsProvider {
    async fn requirements(
        &self,
        _ctx: &AdminContext,
        input: &PolicyInput,
    ) -> Result<Option<TranslationRequirements>> {
        Ok(self.config.resolve(input))
    }
}
