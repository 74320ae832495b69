//! Permission names and authorization.
//!
//! Permissions are `domain.subresource.action` strings: lowercase, dot
//! separated, never hyphenated. Every resource carries the standard
//! `view/create/edit/delete` set; the translation resource adds workflow and
//! exchange permissions.

use std::collections::{HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::AdminContext;
use crate::error::{AdminError, Result};

/// Standard actions every resource exposes.
pub const STANDARD_ACTIONS: &[&str] = &["view", "create", "edit", "delete"];

/// Extra actions on the translations resource.
pub const TRANSLATION_ACTIONS: &[&str] = &[
    "claim",
    "assign",
    "approve",
    "manage",
    "export",
    "import.validate",
    "import.apply",
    "import.view",
];

pub const TRANSLATIONS_CLAIM: &str = "admin.translations.claim";
pub const TRANSLATIONS_ASSIGN: &str = "admin.translations.assign";
pub const TRANSLATIONS_APPROVE: &str = "admin.translations.approve";
pub const TRANSLATIONS_MANAGE: &str = "admin.translations.manage";
pub const TRANSLATIONS_EXPORT: &str = "admin.translations.export";
pub const TRANSLATIONS_IMPORT_VALIDATE: &str = "admin.translations.import.validate";
pub const TRANSLATIONS_IMPORT_APPLY: &str = "admin.translations.import.apply";
pub const TRANSLATIONS_IMPORT_VIEW: &str = "admin.translations.import.view";

/// Validated permission name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(String);

impl Permission {
    pub fn parse(name: &str) -> Result<Self> {
        let segments: Vec<&str> = name.split('.').collect();
        let valid_segment = |s: &&str| {
            !s.is_empty()
                && s
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        };
        if segments.len() < 3 || !segments.iter().all(valid_segment) {
            return Err(AdminError::invalid_field(
                "permission",
                format!("permission {name:?} must be lowercase domain.subresource.action"),
            ));
        }
        Ok(Self(name.to_string()))
    }

    /// `domain.resource.action`
    pub fn for_resource(domain: &str, resource: &str, action: &str) -> Result<Self> {
        Self::parse(&format!("{domain}.{resource}.{action}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Permission {
    type Error = AdminError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Permission> for String {
    fn from(p: Permission) -> Self {
        p.0
    }
}

/// Standard permissions for a resource.
pub fn resource_permissions(domain: &str, resource: &str) -> Result<Vec<Permission>> {
    STANDARD_ACTIONS
        .iter()
        .map(|action| Permission::for_resource(domain, resource, action))
        .collect()
}

/// Standard plus translation workflow permissions.
pub fn translation_permissions(domain: &str) -> Result<Vec<Permission>> {
    let mut out = resource_permissions(domain, "translations")?;
    for action in TRANSLATION_ACTIONS {
        out.push(Permission::for_resource(domain, "translations", action)?);
    }
    Ok(out)
}

/// Authorization seam. `resource` names the panel or resource being touched.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn can(&self, ctx: &AdminContext, permission: &str, resource: &str) -> bool;
}

/// Check a permission, failing with `permission_denied`. A missing
/// authorizer or an empty permission allows the call.
pub async fn authorize(
    authorizer: Option<&dyn Authorizer>,
    ctx: &AdminContext,
    permission: &str,
    resource: &str,
) -> Result<()> {
    let Some(authorizer) = authorizer else {
        return Ok(());
    };
    if permission.is_empty() || authorizer.can(ctx, permission, resource).await {
        Ok(())
    } else {
        Err(AdminError::permission_denied(permission))
    }
}

/// Grants everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn can(&self, _ctx: &AdminContext, _permission: &str, _resource: &str) -> bool {
        true
    }
}

/// Grants keyed by user id or role. A grant ending in `.*` covers every
/// permission under that prefix; `*` covers everything.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorizer {
    grants: HashMap<String, HashSet<String>>,
}

impl StaticAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant permissions to a user id or role name.
    pub fn grant<I, S>(mut self, principal: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grants
            .entry(principal.into())
            .or_default()
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    fn covers(grant: &str, permission: &str) -> bool {
        grant == "*"
            || grant == permission
            || grant
                .strip_suffix(".*")
                .is_some_and(|prefix| permission.starts_with(&format!("{prefix}.")))
    }

    fn allows(&self, principal: &str, permission: &str) -> bool {
        self.grants
            .get(principal)
            .is_some_and(|grants| grants.iter().any(|g| Self::covers(g, permission)))
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn can(&self, ctx: &AdminContext, permission: &str, _resource: &str) -> bool {
        self.allows(ctx.user_id(), permission)
            || ctx
                .actor()
                .roles
                .iter()
                .any(|role| self.allows(role, permission))
    }
}
