//! List options and the in-memory filter pipeline.
//!
//! The pipeline runs `search → predicates → sort → paginate`. Repositories
//! that cannot push filtering down (and derived views such as the grouped
//! translation list) run it over a materialized record set.
//!
//! Legacy `filters` are still accepted; keys may embed an operator as
//! `field__op`. When `predicates` are present they win.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AdminError;
use crate::record::{value_to_string, Record};

/// Predicate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    In,
    Ne,
    Nin,
    Ilike,
    Like,
    Contains,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::In => "in",
            Self::Ne => "ne",
            Self::Nin => "nin",
            Self::Ilike => "ilike",
            Self::Like => "like",
            Self::Contains => "contains",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }
}

impl FromStr for Operator {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eq" => Ok(Self::Eq),
            "in" => Ok(Self::In),
            "ne" | "neq" => Ok(Self::Ne),
            "nin" => Ok(Self::Nin),
            "ilike" => Ok(Self::Ilike),
            "like" => Ok(Self::Like),
            "contains" => Ok(Self::Contains),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            other => Err(AdminError::invalid_field(
                "operator",
                format!("unknown filter operator {other:?}"),
            )),
        }
    }
}

/// Canonical filter predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub values: Vec<Value>,
}

impl Predicate {
    pub fn new(field: impl Into<String>, operator: Operator, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            values,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, vec![value.into()])
    }
}

/// Paging, sorting and filtering options for `list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListOptions {
    /// 1-based page; 0 is treated as 1
    #[serde(default)]
    pub page: usize,
    /// Page size; 0 returns every match
    #[serde(default)]
    pub per_page: usize,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_desc: bool,
    /// Legacy `field` / `field__op` filters
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    #[serde(default)]
    pub search: Option<String>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paged(page: usize, per_page: usize) -> Self {
        Self {
            page,
            per_page,
            ..Self::default()
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn sorted_by(mut self, field: impl Into<String>, desc: bool) -> Self {
        self.sort_by = Some(field.into());
        self.sort_desc = desc;
        self
    }

    /// Same filters without paging.
    pub fn unpaged(&self) -> Self {
        Self {
            page: 0,
            per_page: 0,
            ..self.clone()
        }
    }

    /// Offset of the first row on the requested page.
    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1).saturating_mul(self.per_page)
    }

    /// Predicates in effect: canonical predicates win over legacy filters.
    pub fn effective_predicates(&self) -> Vec<Predicate> {
        if !self.predicates.is_empty() {
            return self.predicates.clone();
        }
        self.filters
            .iter()
            .map(|(key, value)| legacy_predicate(key, value))
            .collect()
    }
}

fn legacy_predicate(key: &str, value: &Value) -> Predicate {
    let (field, operator) = match key.rsplit_once("__") {
        Some((field, op)) => match op.parse::<Operator>() {
            Ok(operator) => (field, operator),
            Err(_) => (key, Operator::Eq),
        },
        None => (key, Operator::Eq),
    };
    let values = match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };
    // An array under a bare key means membership.
    let operator = match (operator, value) {
        (Operator::Eq, Value::Array(_)) => Operator::In,
        (op, _) => op,
    };
    Predicate::new(field, operator, values)
}

/// Lowercase and fold `-` into `_`.
pub fn normalize_field(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('-', "_")
}

/// Resolve a field on a record, matching keys case-insensitively with
/// `-`/`_` folded. Falls back to the nested `data` object.
pub fn resolve_field<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
    if let Some(value) = record.field(field) {
        return Some(value);
    }
    let wanted = normalize_field(field);
    let find = |map: &'a serde_json::Map<String, Value>| {
        map.iter()
            .find(|(key, _)| normalize_field(key) == wanted)
            .map(|(_, value)| value)
    };
    find(record.as_map()).or_else(|| record.data().and_then(find))
}

// ============================================================================
// Pipeline
// ============================================================================

/// Run the full pipeline. Returns the page and the pre-pagination total.
pub fn apply_list_options(records: Vec<Record>, opts: &ListOptions) -> (Vec<Record>, usize) {
    let predicates = opts.effective_predicates();
    let search = opts
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut matched: Vec<Record> = records
        .into_iter()
        .filter(|r| search.as_deref().map_or(true, |term| matches_search(r, term)))
        .filter(|r| predicates.iter().all(|p| matches_predicate(r, p)))
        .collect();

    if let Some(sort_by) = opts.sort_by.as_deref().filter(|s| !s.is_empty()) {
        sort_records(&mut matched, sort_by, opts.sort_desc);
    }

    let total = matched.len();
    (paginate(matched, opts), total)
}

/// Slice a result set by `page`/`per_page`.
pub fn paginate<T>(items: Vec<T>, opts: &ListOptions) -> Vec<T> {
    if opts.per_page == 0 {
        return items;
    }
    items
        .into_iter()
        .skip(opts.offset())
        .take(opts.per_page)
        .collect()
}

/// Case-insensitive substring search over top-level and `data` scalars.
/// `term` must already be lowercase.
pub fn matches_search(record: &Record, term: &str) -> bool {
    let hit = |value: &Value| {
        value_to_string(value)
            .map(|s| s.to_lowercase().contains(term))
            .unwrap_or(false)
    };
    record.iter().any(|(_, v)| hit(v))
        || record
            .data()
            .map(|data| data.values().any(hit))
            .unwrap_or(false)
}

pub fn matches_predicate(record: &Record, predicate: &Predicate) -> bool {
    let value = resolve_field(record, &predicate.field);
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return matches!(predicate.operator, Operator::Ne | Operator::Nin);
    };

    match predicate.operator {
        Operator::Eq | Operator::In => predicate.values.iter().any(|v| loose_eq(value, v)),
        Operator::Ne | Operator::Nin => !predicate.values.iter().any(|v| loose_eq(value, v)),
        Operator::Ilike => predicate
            .values
            .iter()
            .any(|v| like_match(value, v, false)),
        Operator::Like => predicate.values.iter().any(|v| like_match(value, v, true)),
        Operator::Contains => predicate.values.iter().any(|v| contains(value, v)),
        Operator::Gt => compare_any(value, &predicate.values, |o| o == Ordering::Greater),
        Operator::Gte => compare_any(value, &predicate.values, |o| o != Ordering::Less),
        Operator::Lt => compare_any(value, &predicate.values, |o| o == Ordering::Less),
        Operator::Lte => compare_any(value, &predicate.values, |o| o != Ordering::Greater),
    }
}

fn sort_records(records: &mut [Record], field: &str, desc: bool) {
    records.sort_by(|a, b| {
        match (resolve_field(a, field), resolve_field(b, field)) {
            (Some(x), Some(y)) => {
                let ord = compare_values(x, y).unwrap_or(Ordering::Equal);
                if desc {
                    ord.reverse()
                } else {
                    ord
                }
            }
            // Missing values sort last in either direction.
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

fn loose_eq(field: &Value, wanted: &Value) -> bool {
    match field {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, wanted)),
        _ => {
            if field == wanted {
                return true;
            }
            match (as_number(field), as_number(wanted)) {
                (Some(a), Some(b)) => a == b,
                _ => match (value_to_string(field), value_to_string(wanted)) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                },
            }
        }
    }
}

fn contains(field: &Value, wanted: &Value) -> bool {
    match field {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, wanted)),
        _ => match (value_to_string(field), value_to_string(wanted)) {
            (Some(haystack), Some(needle)) => {
                haystack.to_lowercase().contains(&needle.to_lowercase())
            }
            _ => false,
        },
    }
}

fn like_match(field: &Value, pattern: &Value, case_sensitive: bool) -> bool {
    let (Some(text), Some(pattern)) = (value_to_string(field), value_to_string(pattern)) else {
        return false;
    };
    let (text, pattern) = if case_sensitive {
        (text, pattern)
    } else {
        (text.to_lowercase(), pattern.to_lowercase())
    };
    if pattern.contains('%') || pattern.contains('_') {
        wildcard_match(&text, &pattern)
    } else {
        text.contains(&pattern)
    }
}

/// SQL-style wildcard match: `%` any run, `_` any single character.
fn wildcard_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

fn compare_any(field: &Value, values: &[Value], accept: impl Fn(Ordering) -> bool) -> bool {
    values
        .iter()
        .any(|v| compare_values(field, v).map(&accept).unwrap_or(false))
}

/// Compare two values: numerically, then as timestamps, then as strings.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    let (sa, sb) = (value_to_string(a)?, value_to_string(b)?);
    if let (Some(x), Some(y)) = (parse_time(&sa), parse_time(&sb)) {
        return Some(x.cmp(&y));
    }
    Some(sa.to_lowercase().cmp(&sb.to_lowercase()))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records() -> Vec<Record> {
        vec![
            json!({
                "id": "1", "title": "Alpha", "status": "draft", "views": 10,
                "published_at": "2024-01-05"
            }),
            json!({
                "id": "2", "title": "Beta", "status": "published", "views": "25",
                "published_at": "2024-03-01T10:00:00Z"
            }),
            json!({
                "id": "3", "title": "Gamma", "status": "published", "views": 5,
                "Content-Type": "article"
            }),
            json!({
                "id": "4", "title": "Delta", "status": "archived",
                "data": {"summary": "alpha release"}
            }),
        ]
        .into_iter()
        .map(|v| Record::try_from(v).unwrap())
        .collect()
    }

    fn ids(records: &[Record]) -> Vec<String> {
        records.iter().filter_map(Record::id).collect()
    }

    #[test]
    fn test_search_matches_top_level_and_data() {
        let opts = ListOptions::new().with_search("ALPHA");
        let (page, total) = apply_list_options(records(), &opts);
        assert_eq!(total, 2);
        assert_eq!(ids(&page), vec!["1", "4"]);
    }

    #[test]
    fn test_predicates_win_over_filters() {
        let opts = ListOptions::new()
            .with_filter("status", "draft")
            .with_predicate(Predicate::eq("status", "published"));
        let (page, _) = apply_list_options(records(), &opts);
        assert_eq!(ids(&page), vec!["2", "3"]);
    }

    #[test]
    fn test_legacy_operator_suffix() {
        let opts = ListOptions::new().with_filter("views__gte", 10);
        let (page, _) = apply_list_options(records(), &opts);
        assert_eq!(ids(&page), vec!["1", "2"]);

        let opts = ListOptions::new().with_filter("status", json!(["draft", "archived"]));
        let (page, _) = apply_list_options(records(), &opts);
        assert_eq!(ids(&page), vec!["1", "4"]);
    }

    #[test]
    fn test_field_names_are_normalized() {
        let opts = ListOptions::new().with_predicate(Predicate::eq("content_type", "article"));
        let (page, _) = apply_list_options(records(), &opts);
        assert_eq!(ids(&page), vec!["3"]);
    }

    #[test]
    fn test_time_coercion() {
        let opts = ListOptions::new().with_predicate(Predicate::new(
            "published_at",
            Operator::Gt,
            vec![json!("2024-02-01T00:00:00Z")],
        ));
        let (page, _) = apply_list_options(records(), &opts);
        assert_eq!(ids(&page), vec!["2"]);
    }

    #[test]
    fn test_ne_and_nin_match_missing_fields() {
        let opts = ListOptions::new().with_predicate(Predicate::new(
            "content_type",
            Operator::Ne,
            vec![json!("article")],
        ));
        let (page, _) = apply_list_options(records(), &opts);
        assert_eq!(ids(&page), vec!["1", "2", "4"]);
    }

    #[test]
    fn test_like_wildcards() {
        let ilike = Predicate::new("title", Operator::Ilike, vec![json!("%ta")]);
        let (page, _) = apply_list_options(records(), &ListOptions::new().with_predicate(ilike));
        assert_eq!(ids(&page), vec!["2", "4"]);

        let like = Predicate::new("title", Operator::Like, vec![json!("g_mma")]);
        let (page, _) = apply_list_options(records(), &ListOptions::new().with_predicate(like));
        assert!(page.is_empty());
    }

    #[test]
    fn test_sort_and_paginate() {
        let opts = ListOptions::paged(2, 1).sorted_by("views", true);
        let (page, total) = apply_list_options(records(), &opts);
        assert_eq!(total, 4);
        // views: 25, 10, 5, missing
        assert_eq!(ids(&page), vec!["1"]);
    }

    #[test]
    fn test_huge_page_is_empty() {
        let opts = ListOptions::paged(usize::MAX, 2);
        assert_eq!(opts.offset(), usize::MAX);
        assert!(paginate(vec![1, 2, 3], &opts).is_empty());
    }

    #[test]
    fn test_unknown_operator() {
        assert!("between".parse::<Operator>().is_err());
    }
}
