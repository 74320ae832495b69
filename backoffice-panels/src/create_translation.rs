//! The `create_translation` action: mint a locale sibling of a record.

use serde::{Deserialize, Serialize};
use tracing::info;

use backoffice_core::activity::{record_best_effort, PANEL_TRANSLATION_CREATED};
use backoffice_core::record::{AVAILABLE_LOCALES, ID, LOCALE, STATUS, TRANSLATION_GROUP_ID};
use backoffice_core::{
    ActivityEntry, ActivitySink, AdminContext, AdminError, CreateTranslationInput, ListOptions,
    Predicate, Record, Result,
};
use backoffice_translation::normalize_locale;

use crate::panel::Panel;

/// Status of freshly minted translations.
pub const DRAFT_STATUS: &str = "draft";

/// Keys never copied from the source record.
const DROPPED_KEYS: &[&str] = &[
    ID,
    AVAILABLE_LOCALES,
    "translation_readiness",
    "_action_state",
    "created_at",
    "updated_at",
    "published_at",
];

/// Response body of a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTranslationResponse {
    pub id: String,
    pub locale: String,
    pub status: String,
    pub translation_group_id: String,
}

/// `home` -> `home-es`; `home-en` -> `home-es` when `en` is the source.
pub fn localize_slug(slug: &str, source_locale: &str, target_locale: &str) -> String {
    let base = strip_suffix_ci(slug, &format!("-{source_locale}")).unwrap_or(slug);
    if base.is_empty() {
        return target_locale.to_string();
    }
    format!("{base}-{target_locale}")
}

/// `/` -> `/es`; `/en/about` -> `/es/about` when `en` is the source.
pub fn localize_path(path: &str, source_locale: &str, target_locale: &str) -> String {
    let trimmed = path.trim();
    let source_prefix = format!("/{source_locale}");
    let rest = match strip_prefix_ci(trimmed, &source_prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => trimmed,
    };
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        format!("/{target_locale}")
    } else {
        format!("/{target_locale}/{rest}")
    }
}

fn strip_suffix_ci<'s>(s: &'s str, suffix: &str) -> Option<&'s str> {
    let split = s.len().checked_sub(suffix.len())?;
    let tail = s.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &s[..split])
}

fn strip_prefix_ci<'s>(s: &'s str, prefix: &str) -> Option<&'s str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// Clone `source` into a draft for `target_locale` in the same group.
pub fn prepare_translation(source: &Record, target_locale: &str) -> Record {
    let source_locale = source.locale().map(normalize_locale).unwrap_or_default();
    let group = source.group_or_id().unwrap_or_default();

    let mut translation = source.clone();
    for key in DROPPED_KEYS {
        translation.remove(key);
    }
    translation.insert(LOCALE, target_locale);
    translation.insert(TRANSLATION_GROUP_ID, group);
    translation.insert(STATUS, DRAFT_STATUS);
    if let Some(slug) = source.str_field("slug") {
        translation.insert("slug", localize_slug(slug, &source_locale, target_locale));
    }
    if let Some(path) = source.str_field("path") {
        translation.insert("path", localize_path(path, &source_locale, target_locale));
    }
    translation
}

/// Create the translation, failing with `translation_already_exists` before
/// any write when the group already has the locale.
pub async fn create_translation(
    panel: &Panel,
    ctx: &AdminContext,
    source: &Record,
    target_locale: &str,
    activity: Option<&dyn ActivitySink>,
) -> Result<(Record, CreateTranslationResponse)> {
    let target_locale = normalize_locale(target_locale);
    if target_locale.is_empty() {
        return Err(AdminError::invalid_field("locale", "target locale is required"));
    }
    let source_id = source
        .id()
        .ok_or_else(|| AdminError::invalid_field("id", "source record has no id"))?;
    let group = source.group_or_id().unwrap_or_else(|| source_id.clone());

    if existing_locales(panel, ctx, source, &group)
        .await?
        .contains(&target_locale)
    {
        return Err(AdminError::translation_already_exists(&group, &target_locale));
    }

    let translation = prepare_translation(source, &target_locale);
    let created = match panel.repository.translation_creator() {
        Some(creator) => {
            creator
                .create_translation(
                    ctx,
                    CreateTranslationInput {
                        source: source.clone(),
                        translation,
                        target_locale: target_locale.clone(),
                    },
                )
                .await?
        }
        None => panel.repository.create(ctx, translation).await?,
    };

    let response = CreateTranslationResponse {
        id: created.id().unwrap_or_default(),
        locale: created.locale().unwrap_or(target_locale.as_str()).to_string(),
        status: created.status().unwrap_or(DRAFT_STATUS).to_string(),
        translation_group_id: created
            .translation_group_id()
            .unwrap_or(group.as_str())
            .to_string(),
    };

    info!(
        panel = %panel.name,
        source_id = %source_id,
        translation_id = %response.id,
        locale = %response.locale,
        "Translation created"
    );
    let entry = ActivityEntry::new(ctx, PANEL_TRANSLATION_CREATED, &panel.entity_type, &response.id)
        .with("panel", panel.name.as_str())
        .with("source_id", source_id)
        .with("locale", response.locale.as_str())
        .with("translation_group_id", response.translation_group_id.as_str());
    record_best_effort(activity, ctx, entry).await;

    Ok((created, response))
}

/// Locales the group already has: the record's own view plus its siblings.
async fn existing_locales(
    panel: &Panel,
    ctx: &AdminContext,
    source: &Record,
    group: &str,
) -> Result<Vec<String>> {
    let mut locales: Vec<String> = source.available_locales();
    locales.extend(source.locale().map(str::to_string));

    let opts = ListOptions::new().with_predicate(Predicate::eq(TRANSLATION_GROUP_ID, group));
    let siblings = panel.repository.list(ctx, &opts).await?.records;
    locales.extend(siblings.iter().filter_map(|r| r.locale().map(str::to_string)));

    Ok(locales.iter().map(|l| normalize_locale(l)).collect())
}
