//! Feature keys and flags.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::error::{AdminError, Result};

/// Closed vocabulary of feature keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum FeatureKey {
    Dashboard,
    Activity,
    Preview,
    Search,
    Export,
    Cms,
    Jobs,
    Commands,
    Settings,
    Notifications,
    Media,
    Bulk,
    Preferences,
    Profile,
    Users,
    Tenants,
    Organizations,
    TranslationExchange,
    TranslationQueue,
    Debug,
}

impl FeatureKey {
    pub const ALL: [FeatureKey; 20] = [
        Self::Dashboard,
        Self::Activity,
        Self::Preview,
        Self::Search,
        Self::Export,
        Self::Cms,
        Self::Jobs,
        Self::Commands,
        Self::Settings,
        Self::Notifications,
        Self::Media,
        Self::Bulk,
        Self::Preferences,
        Self::Profile,
        Self::Users,
        Self::Tenants,
        Self::Organizations,
        Self::TranslationExchange,
        Self::TranslationQueue,
        Self::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Activity => "activity",
            Self::Preview => "preview",
            Self::Search => "search",
            Self::Export => "export",
            Self::Cms => "cms",
            Self::Jobs => "jobs",
            Self::Commands => "commands",
            Self::Settings => "settings",
            Self::Notifications => "notifications",
            Self::Media => "media",
            Self::Bulk => "bulk",
            Self::Preferences => "preferences",
            Self::Profile => "profile",
            Self::Users => "users",
            Self::Tenants => "tenants",
            Self::Organizations => "organizations",
            Self::TranslationExchange => "translation_exchange",
            Self::TranslationQueue => "translation_queue",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureKey {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == wanted)
            .ok_or_else(|| {
                AdminError::invalid_field("feature", format!("unknown feature key {s:?}"))
            })
    }
}

/// Answers whether a feature is on.
pub trait FeatureGate: Send + Sync {
    fn is_enabled(&self, key: FeatureKey) -> bool;

    /// Fail with `feature_disabled` when the key is off.
    fn require(&self, key: FeatureKey) -> Result<()> {
        if self.is_enabled(key) {
            Ok(())
        } else {
            Err(AdminError::feature_disabled(key.as_str()))
        }
    }
}

/// Set of enabled feature keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    enabled: BTreeSet<FeatureKey>,
}

impl FeatureFlags {
    /// Nothing enabled.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            enabled: FeatureKey::ALL.into_iter().collect(),
        }
    }

    /// Parse a list of names; unknown names are rejected.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let enabled = names
            .into_iter()
            .map(|name| name.as_ref().parse::<FeatureKey>())
            .collect::<Result<BTreeSet<_>>>()?;
        Ok(Self { enabled })
    }

    pub fn enable(mut self, key: FeatureKey) -> Self {
        self.enabled.insert(key);
        self
    }

    pub fn disable(mut self, key: FeatureKey) -> Self {
        self.enabled.remove(&key);
        self
    }

    pub fn enabled_keys(&self) -> impl Iterator<Item = FeatureKey> + '_ {
        self.enabled.iter().copied()
    }
}

impl FeatureGate for FeatureFlags {
    fn is_enabled(&self, key: FeatureKey) -> bool {
        self.enabled.contains(&key)
    }
}
