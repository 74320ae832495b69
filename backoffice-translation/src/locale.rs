//! Locale and policy-entity normalization.

use std::collections::BTreeSet;

/// Lowercase and trim a locale code.
pub fn normalize_locale(locale: &str) -> String {
    locale.trim().to_lowercase()
}

/// Normalize, drop blanks, dedupe and sort.
pub fn normalize_locales<I, S>(locales: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    locales
        .into_iter()
        .map(|l| normalize_locale(l.as_ref()))
        .filter(|l| !l.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Split `pages@staging` into `("pages", Some("staging"))`.
pub fn split_environment(name: &str) -> (&str, Option<&str>) {
    match name.split_once('@') {
        Some((base, env)) if !env.trim().is_empty() => (base.trim(), Some(env.trim())),
        Some((base, _)) => (base.trim(), None),
        None => (name.trim(), None),
    }
}

/// Policy entity key: environment suffix stripped, lowercased, and singular
/// panel names pluralized (`page` → `pages`).
pub fn normalize_policy_entity(name: &str) -> String {
    let (base, _) = split_environment(name);
    let base = base.to_lowercase().replace('-', "_");
    pluralize(&base)
}

fn pluralize(name: &str) -> String {
    const UNCOUNTABLE: &[&str] = &["content", "media", "news", "data", "settings"];
    if name.is_empty() || name.ends_with('s') || UNCOUNTABLE.contains(&name) {
        return name.to_string();
    }
    if let Some(stem) = name.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    format!("{name}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_locales() {
        assert_eq!(normalize_locales(["ES", " en ", "es", ""]), vec!["en", "es"]);
    }

    #[test]
    fn test_split_environment() {
        assert_eq!(split_environment("pages@staging"), ("pages", Some("staging")));
        assert_eq!(split_environment("pages@"), ("pages", None));
        assert_eq!(split_environment("pages"), ("pages", None));
    }

    #[test]
    fn test_policy_entity() {
        assert_eq!(normalize_policy_entity("page"), "pages");
        assert_eq!(normalize_policy_entity("Post@staging"), "posts");
        assert_eq!(normalize_policy_entity("pages"), "pages");
        assert_eq!(normalize_policy_entity("content"), "content");
        assert_eq!(normalize_policy_entity("category"), "categories");
        assert_eq!(normalize_policy_entity("landing-page"), "landing_pages");
    }
}
