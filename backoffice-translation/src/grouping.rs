//! Grouped translation view.
//!
//! Collapses locale siblings sharing a `translation_group_id` into one parent
//! row with children and an aggregated readiness summary. Rows without a
//! group id stay ungrouped and keep their input order after the groups.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use backoffice_core::Record;

use crate::locale::{normalize_locale, normalize_locales};
use crate::readiness::{
    LocaleMetadata, ReadinessState, ReadyForTransition, RequirementsState, TranslationReadiness,
};

/// Prefix of synthetic group row ids.
pub const GROUP_ID_PREFIX: &str = "group:";

/// Anything that can be grouped: a record plus its readiness.
pub trait GroupMember {
    fn record(&self) -> &Record;
    fn readiness(&self) -> Option<&TranslationReadiness>;
}

impl GroupMember for (Record, Option<TranslationReadiness>) {
    fn record(&self) -> &Record {
        &self.0
    }

    fn readiness(&self) -> Option<&TranslationReadiness> {
        self.1.as_ref()
    }
}

/// Aggregated readiness of a translation group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub translation_group_id: String,
    pub required_locales: Vec<String>,
    pub available_locales: Vec<String>,
    pub missing_required_locales: Vec<String>,
    pub missing_required_fields_by_locale: BTreeMap<String, Vec<String>>,
    pub readiness_state: ReadinessState,
    pub ready_for_publish: bool,
    pub requirements_resolved: bool,
    pub requirements_state: RequirementsState,
    pub child_count: usize,
    pub recommended_locale: String,
}

impl GroupSummary {
    /// Summary in record-readiness shape, for resolving group row actions.
    pub fn as_readiness(&self, environment: &str) -> TranslationReadiness {
        TranslationReadiness {
            translation_group_id: self.translation_group_id.clone(),
            required_locales: self.required_locales.clone(),
            available_locales: self.available_locales.clone(),
            missing_required_locales: self.missing_required_locales.clone(),
            missing_required_fields_by_locale: self.missing_required_fields_by_locale.clone(),
            readiness_state: self.readiness_state,
            ready_for_transition: ReadyForTransition {
                publish: self.ready_for_publish,
            },
            evaluated_environment: environment.to_string(),
            recommended_locale: self.recommended_locale.clone(),
            locale_metadata: BTreeMap::<String, LocaleMetadata>::new(),
            requirements_resolved: self.requirements_resolved,
            requirements_state: self.requirements_state,
        }
    }
}

/// A translation group: parent row, ordered children, summary.
#[derive(Debug, Clone)]
pub struct TranslationGroup<T> {
    /// `group:<translation_group_id>`
    pub id: String,
    pub translation_group_id: String,
    /// Index into `children` of the parent row
    pub parent_index: usize,
    pub children: Vec<T>,
    pub summary: GroupSummary,
}

impl<T> TranslationGroup<T> {
    pub fn parent(&self) -> &T {
        &self.children[self.parent_index]
    }
}

/// Row of the grouped view.
#[derive(Debug, Clone)]
pub enum GroupedRow<T> {
    Group(TranslationGroup<T>),
    Ungrouped(T),
}

/// Group members by translation group.
///
/// Groups are ordered by `translation_group_id`; children put the default
/// locale first, then sort by `(locale, id)` (stable).
pub fn group_by_translation<T: GroupMember>(
    items: Vec<T>,
    default_locale: &str,
) -> Vec<GroupedRow<T>> {
    let default_locale = normalize_locale(default_locale);
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    let mut ungrouped = Vec::new();

    for item in items {
        match item.record().translation_group_id().map(str::to_string) {
            Some(group) => groups.entry(group).or_default().push(item),
            None => ungrouped.push(item),
        }
    }

    let mut rows: Vec<GroupedRow<T>> = groups
        .into_iter()
        .map(|(group_id, mut children)| {
            children.sort_by_key(|child| {
                let locale = child
                    .record()
                    .locale()
                    .map(normalize_locale)
                    .unwrap_or_default();
                let id = child.record().id().unwrap_or_default();
                (locale != default_locale, locale, id)
            });
            let summary = summarize(&group_id, &children, &default_locale);
            GroupedRow::Group(TranslationGroup {
                id: format!("{GROUP_ID_PREFIX}{group_id}"),
                translation_group_id: group_id,
                parent_index: 0,
                children,
                summary,
            })
        })
        .collect();

    rows.extend(ungrouped.into_iter().map(GroupedRow::Ungrouped));
    rows
}

fn summarize<T: GroupMember>(group_id: &str, children: &[T], default_locale: &str) -> GroupSummary {
    let mut required = BTreeSet::new();
    let mut available = BTreeSet::new();
    let mut missing_fields: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut evaluated = 0usize;
    let mut resolved = true;

    for child in children {
        if let Some(locale) = child.record().locale() {
            available.insert(normalize_locale(locale));
        }
        available.extend(normalize_locales(child.record().available_locales()));

        let Some(readiness) = child.readiness() else {
            continue;
        };
        evaluated += 1;
        resolved &= readiness.requirements_resolved;
        required.extend(readiness.required_locales.iter().cloned());
        available.extend(readiness.available_locales.iter().cloned());
        for (locale, fields) in &readiness.missing_required_fields_by_locale {
            missing_fields
                .entry(locale.clone())
                .or_default()
                .extend(fields.iter().cloned());
        }
    }

    let required_locales: Vec<String> = required.into_iter().collect();
    let available_locales: Vec<String> = available.into_iter().collect();
    let missing_required_locales: Vec<String> = required_locales
        .iter()
        .filter(|l| !available_locales.contains(l))
        .cloned()
        .collect();
    let missing_required_fields_by_locale: BTreeMap<String, Vec<String>> = missing_fields
        .into_iter()
        .filter(|(_, fields)| !fields.is_empty())
        .map(|(locale, fields)| (locale, fields.into_iter().collect()))
        .collect();

    let readiness_state = ReadinessState::classify(
        !missing_required_locales.is_empty(),
        !missing_required_fields_by_locale.is_empty(),
    );
    let requirements_resolved = evaluated > 0 && resolved;
    let recommended_locale = missing_required_locales
        .first()
        .or_else(|| required_locales.first())
        .cloned()
        .unwrap_or_else(|| default_locale.to_string());

    GroupSummary {
        translation_group_id: group_id.to_string(),
        required_locales,
        available_locales,
        missing_required_locales,
        missing_required_fields_by_locale,
        readiness_state,
        ready_for_publish: requirements_resolved && readiness_state.is_ready(),
        requirements_resolved,
        requirements_state: if requirements_resolved {
            RequirementsState::Resolved
        } else {
            RequirementsState::Unresolved
        },
        child_count: children.len(),
        recommended_locale,
    }
}
