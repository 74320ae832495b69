//! Translation readiness.
//!
//! [`derive_readiness`] is a pure function of a record and its requirements.
//! [`ReadinessEngine`] adds the applicability rules and a per-batch cache so
//! decorating a list page asks the requirements provider once per
//! `(entity type, policy entity, transition, environment)`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use backoffice_core::record::value_to_string;
use backoffice_core::{AdminContext, Record, Result};

use crate::locale::{normalize_locale, normalize_locales};
use crate::requirements::{PolicyInput, RequirementsProvider, TranslationRequirements};

/// Transition readiness is evaluated against.
pub const PUBLISH_TRANSITION: &str = "publish";

/// Panels that are translation-aware without per-record hints.
pub const DEFAULT_TRANSLATION_PANELS: &[&str] = &["pages", "posts", "content"];

/// Readiness verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    Ready,
    MissingLocales,
    MissingFields,
    MissingLocalesAndFields,
}

impl ReadinessState {
    pub fn classify(missing_locales: bool, missing_fields: bool) -> Self {
        match (missing_locales, missing_fields) {
            (false, false) => Self::Ready,
            (true, false) => Self::MissingLocales,
            (false, true) => Self::MissingFields,
            (true, true) => Self::MissingLocalesAndFields,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::MissingLocales => "missing_locales",
            Self::MissingFields => "missing_fields",
            Self::MissingLocalesAndFields => "missing_locales_and_fields",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ready" => Some(Self::Ready),
            "missing_locales" => Some(Self::MissingLocales),
            "missing_fields" => Some(Self::MissingFields),
            "missing_locales_and_fields" => Some(Self::MissingLocalesAndFields),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        *self == Self::Ready
    }
}

/// Whether requirements were found for the evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RequirementsState {
    Resolved,
    Unresolved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
pub struct ReadyForTransition {
    pub publish: bool,
}

/// Last editor of a locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
pub struct LocaleMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Readiness attached to records as `translation_readiness`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct TranslationReadiness {
    pub translation_group_id: String,
    pub required_locales: Vec<String>,
    pub available_locales: Vec<String>,
    pub missing_required_locales: Vec<String>,
    pub missing_required_fields_by_locale: BTreeMap<String, Vec<String>>,
    pub readiness_state: ReadinessState,
    pub ready_for_transition: ReadyForTransition,
    pub evaluated_environment: String,
    pub recommended_locale: String,
    #[serde(default)]
    pub locale_metadata: BTreeMap<String, LocaleMetadata>,
    pub requirements_resolved: bool,
    pub requirements_state: RequirementsState,
}

impl TranslationReadiness {
    pub fn is_ready(&self) -> bool {
        self.readiness_state.is_ready()
    }

    /// Missing locales uppercased for display (`ES, FR`).
    pub fn missing_locales_display(&self) -> String {
        self.missing_required_locales
            .iter()
            .map(|l| l.to_uppercase())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Parse readiness supplied by an upstream service. Unknown states are
    /// rejected unless `coerce_unknown_state` maps them to `ready`.
    pub fn from_upstream(value: &Value, coerce_unknown_state: bool) -> Option<Self> {
        let mut value = value.clone();
        let obj = value.as_object_mut()?;
        let raw_state = obj.get("readiness_state").and_then(Value::as_str)?.to_string();
        if ReadinessState::parse(&raw_state).is_none() {
            if !coerce_unknown_state {
                warn!(state = %raw_state, "Ignoring upstream readiness with unknown state");
                return None;
            }
            debug!(state = %raw_state, "Coercing unknown upstream readiness state to ready");
            obj.insert("readiness_state".into(), Value::from("ready"));
        }
        serde_json::from_value(value).ok()
    }
}

/// Derive readiness for one record.
///
/// Fields are only checked for the record's own locale, and only when that
/// locale is both required and available.
pub fn derive_readiness(
    record: &Record,
    requirements: Option<&TranslationRequirements>,
    environment: &str,
) -> TranslationReadiness {
    let own_locale = record.locale().map(normalize_locale).unwrap_or_default();
    let mut available = record.available_locales();
    if !own_locale.is_empty() {
        available.push(own_locale.clone());
    }
    let available_locales = normalize_locales(available);

    let normalized = requirements.map(TranslationRequirements::normalized);
    let required_locales = normalized
        .as_ref()
        .map(|r| r.locales.clone())
        .unwrap_or_default();

    let missing_required_locales: Vec<String> = required_locales
        .iter()
        .filter(|l| !available_locales.contains(l))
        .cloned()
        .collect();

    let mut missing_required_fields_by_locale = BTreeMap::new();
    if let Some(req) = normalized.as_ref().filter(|r| r.evaluates_fields()) {
        for (locale, fields) in &req.required_fields {
            if *locale != own_locale || !available_locales.contains(locale) {
                continue;
            }
            let mut missing: Vec<String> = fields
                .iter()
                .filter(|f| !record.has_present(f))
                .cloned()
                .collect();
            if !missing.is_empty() {
                missing.sort();
                missing_required_fields_by_locale.insert(locale.clone(), missing);
            }
        }
    }

    let readiness_state = ReadinessState::classify(
        !missing_required_locales.is_empty(),
        !missing_required_fields_by_locale.is_empty(),
    );
    let recommended_locale = missing_required_locales
        .first()
        .or_else(|| required_locales.first())
        .cloned()
        .unwrap_or_default();
    let requirements_resolved = requirements.is_some();

    TranslationReadiness {
        translation_group_id: record.group_or_id().unwrap_or_default(),
        required_locales,
        available_locales,
        missing_required_locales,
        missing_required_fields_by_locale,
        readiness_state,
        ready_for_transition: ReadyForTransition {
            publish: readiness_state.is_ready(),
        },
        evaluated_environment: environment.to_string(),
        recommended_locale,
        locale_metadata: locale_metadata(record, &own_locale),
        requirements_resolved,
        requirements_state: if requirements_resolved {
            RequirementsState::Resolved
        } else {
            RequirementsState::Unresolved
        },
    }
}

fn locale_metadata(record: &Record, own_locale: &str) -> BTreeMap<String, LocaleMetadata> {
    let mut out = BTreeMap::new();
    if let Some(Value::Object(map)) = record.get("locale_metadata") {
        for (locale, meta) in map {
            out.insert(
                normalize_locale(locale),
                LocaleMetadata {
                    updated_by: meta.get("updated_by").and_then(value_to_string),
                    updated_at: meta.get("updated_at").and_then(value_to_string),
                },
            );
        }
    }
    if !own_locale.is_empty() && !out.contains_key(own_locale) {
        let meta = LocaleMetadata {
            updated_by: record.get("updated_by").and_then(value_to_string),
            updated_at: record.get("updated_at").and_then(value_to_string),
        };
        if meta.updated_by.is_some() || meta.updated_at.is_some() {
            out.insert(own_locale.to_string(), meta);
        }
    }
    out
}

// ============================================================================
// Engine
// ============================================================================

/// Readiness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessOptions {
    pub default_locale: String,
    pub environment: String,
    /// Panels treated as translation-aware for every record
    #[serde(default)]
    pub translation_panels: Vec<String>,
    /// Map unknown upstream readiness states to `ready`
    #[serde(default)]
    pub coerce_unknown_state: bool,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            default_locale: "en".into(),
            environment: "production".into(),
            translation_panels: DEFAULT_TRANSLATION_PANELS.iter().map(|s| s.to_string()).collect(),
            coerce_unknown_state: false,
        }
    }
}

impl ReadinessOptions {
    /// Applicability: a translation panel, or a record carrying a group id or
    /// available locales.
    pub fn applies_to(&self, panel: &str, record: &Record) -> bool {
        let panel = panel.trim().to_lowercase();
        self.translation_panels.iter().any(|p| p.to_lowercase() == panel)
            || record.translation_group_id().is_some()
            || !record.available_locales().is_empty()
    }
}

/// Readiness evaluation with requirement lookups.
#[derive(Clone)]
pub struct ReadinessEngine {
    provider: Arc<dyn RequirementsProvider>,
    options: ReadinessOptions,
}

impl ReadinessEngine {
    pub fn new(provider: Arc<dyn RequirementsProvider>, options: ReadinessOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &ReadinessOptions {
        &self.options
    }

    /// Start a batch with its own requirements cache.
    pub fn batch(&self) -> ReadinessBatch<'_> {
        ReadinessBatch {
            engine: self,
            cache: HashMap::new(),
            lookups: 0,
        }
    }
}

type CacheKey = (String, String, String, String);

/// Request-scoped evaluation batch.
pub struct ReadinessBatch<'a> {
    engine: &'a ReadinessEngine,
    cache: HashMap<CacheKey, Option<TranslationRequirements>>,
    lookups: usize,
}

impl ReadinessBatch<'_> {
    /// Readiness for `record` on `panel`, or `None` when not applicable.
    pub async fn evaluate(
        &mut self,
        ctx: &AdminContext,
        panel: &str,
        entity_type: &str,
        record: &Record,
        environment: Option<&str>,
    ) -> Result<Option<TranslationReadiness>> {
        let options = &self.engine.options;
        if !options.applies_to(panel, record) {
            return Ok(None);
        }
        let environment = environment
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(&options.environment)
            .to_lowercase();

        if let Some(upstream) = record.get("translation_readiness") {
            if let Some(readiness) =
                TranslationReadiness::from_upstream(upstream, options.coerce_unknown_state)
            {
                return Ok(Some(readiness));
            }
        }

        let input = PolicyInput::new(
            entity_type,
            record.id().unwrap_or_default(),
            PUBLISH_TRANSITION,
        )
        .with_environment(environment.clone())
        .with_policy_entity(panel);
        let key: CacheKey = (
            entity_type.to_lowercase(),
            input.resolved_policy_entity(),
            PUBLISH_TRANSITION.to_string(),
            environment.clone(),
        );

        let requirements = match self.cache.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                self.lookups += 1;
                let fetched = self.engine.provider.requirements(ctx, &input).await?;
                self.cache.insert(key, fetched.clone());
                fetched
            }
        };

        Ok(Some(derive_readiness(
            record,
            requirements.as_ref(),
            &environment,
        )))
    }

    /// Provider calls made by this batch.
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}
