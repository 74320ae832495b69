//! Admin configuration file.
//!
//! One YAML document declares everything a runtime is assembled from:
//!
//! ```yaml
//! default_locale: en
//! environment: production
//! features: [cms, commands, bulk]
//! commands: [pages.archive]
//! translations:
//!   entities:
//!     pages:
//!       transitions:
//!         publish:
//!           locales: [en, es]
//! workflows:
//!   - entity_type: pages
//!     transitions:
//!       - { name: request_approval, from: draft, to: pending_approval }
//!       - { name: approve, from: pending_approval, to: published }
//! panels:
//!   - name: pages
//!     translation_aware: true
//!     actions:
//!       - { name: submit_for_approval }
//!       - { name: publish, permission: admin.pages.publish }
//!     bulk_actions:
//!       - { name: archive, command_name: pages.archive }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use backoffice_core::{AdminError, FeatureFlags, FeatureKey, TransitionAliases, WorkflowDefinition};
use backoffice_translation::{ReadinessOptions, RequirementsConfig};

use crate::action::{Action, ActionType};

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] AdminError),
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub default_locale: String,
    pub environment: String,
    /// Enabled feature keys; every key when omitted
    pub features: Vec<String>,
    pub commands_enabled: bool,
    /// Command names the deployment registers
    pub commands: Vec<String>,
    pub readiness: ReadinessOptions,
    pub translations: RequirementsConfig,
    pub workflows: Vec<WorkflowDefinition>,
    pub panels: Vec<PanelConfig>,
    /// Principal -> granted permissions. Empty means no authorization.
    pub grants: BTreeMap<String, Vec<String>>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            default_locale: "en".into(),
            environment: "production".into(),
            features: FeatureKey::ALL.iter().map(|k| k.to_string()).collect(),
            commands_enabled: true,
            commands: Vec::new(),
            readiness: ReadinessOptions::default(),
            translations: RequirementsConfig::default(),
            workflows: Vec::new(),
            panels: Vec::new(),
            grants: BTreeMap::new(),
        }
    }
}

impl AdminConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Enabled feature flags; unknown names are rejected.
    pub fn feature_flags(&self) -> Result<FeatureFlags, ConfigError> {
        Ok(FeatureFlags::from_names(&self.features)?)
    }

    /// Command names as a wiring catalog.
    pub fn command_catalog(&self) -> BTreeSet<String> {
        self.commands.iter().map(|c| c.trim().to_string()).collect()
    }

    /// Readiness options with the top-level locale and environment applied.
    pub fn readiness_options(&self) -> ReadinessOptions {
        ReadinessOptions {
            default_locale: self.default_locale.clone(),
            environment: self.environment.clone(),
            ..self.readiness.clone()
        }
    }
}

/// One panel declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub name: String,
    /// Defaults to the panel name
    pub entity_type: Option<String>,
    pub translation_aware: bool,
    pub actions: Vec<Action>,
    pub bulk_actions: Vec<Action>,
    /// Extra action -> transition aliases on top of the defaults
    pub aliases: BTreeMap<String, Vec<String>>,
    pub subresources: Vec<String>,
}

impl PanelConfig {
    pub fn entity_type(&self) -> &str {
        self.entity_type.as_deref().unwrap_or(&self.name)
    }

    pub fn aliases(&self) -> TransitionAliases {
        self.aliases
            .iter()
            .flat_map(|(action, transitions)| transitions.iter().map(move |t| (action, t)))
            .fold(TransitionAliases::default(), |table, (action, transition)| {
                table.with_alias(action, transition)
            })
    }

    /// Declared actions, with bulk ones typed as such.
    pub fn all_actions(&self) -> impl Iterator<Item = Action> + '_ {
        let bulk = self.bulk_actions.iter().cloned().map(|mut a| {
            a.action_type = ActionType::Bulk;
            a
        });
        self.actions.iter().cloned().chain(bulk)
    }
}
