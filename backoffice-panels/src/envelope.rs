//! Response shapes: records decorated with action state and readiness.

use std::collections::BTreeMap;

use serde::Serialize;

use backoffice_core::{ListOptions, Record};
use backoffice_translation::{GroupSummary, TranslationReadiness};

use crate::action::ActionAvailability;

/// A record plus its request-scoped decoration. The record itself is never
/// mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordEnvelope {
    #[serde(flatten)]
    pub record: Record,
    #[serde(rename = "_action_state")]
    pub action_state: BTreeMap<String, ActionAvailability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation_readiness: Option<TranslationReadiness>,
}

impl RecordEnvelope {
    pub fn new(
        mut record: Record,
        action_state: BTreeMap<String, ActionAvailability>,
        translation_readiness: Option<TranslationReadiness>,
    ) -> Self {
        if translation_readiness.is_some() {
            // Upstream readiness is replaced by the evaluated one.
            record.remove("translation_readiness");
        }
        Self {
            record,
            action_state,
            translation_readiness,
        }
    }

    pub fn id(&self) -> Option<String> {
        self.record.id()
    }
}

/// Parent row of a translation group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupEnvelope {
    /// `group:<translation_group_id>`
    pub id: String,
    pub translation_group_id: String,
    #[serde(rename = "_group")]
    pub summary: GroupSummary,
    /// Actions resolved against the parent record and the group summary
    #[serde(rename = "_action_state")]
    pub action_state: BTreeMap<String, ActionAvailability>,
    pub parent: RecordEnvelope,
    pub children: Vec<RecordEnvelope>,
}

/// Row of the grouped list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ListRow {
    Group(GroupEnvelope),
    Record(RecordEnvelope),
}

/// Page of rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
    pub has_more: bool,
}

impl<T> ListResponse<T> {
    /// Page `items` of `total` requested with `opts`.
    pub fn page(items: Vec<T>, total: usize, opts: &ListOptions) -> Self {
        let end = opts.offset() + items.len();
        let has_more = opts.per_page > 0 && end < total;
        Self {
            items,
            total,
            next_offset: has_more.then_some(end),
            has_more,
        }
    }
}
