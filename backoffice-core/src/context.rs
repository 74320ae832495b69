//! Request-scoped context.
//!
//! An [`AdminContext`] is built once per request by the transport and handed
//! down by reference. It carries the acting user, locale, tenant scope and a
//! cancellation signal that long-running operations poll.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{AdminError, Result};

/// Authenticated principal behind a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Tenant and organization scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub tenant_id: Option<String>,
    pub organization_id: Option<String>,
}

/// Sender half of a request cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // Receivers may already be gone; nothing to notify then.
        let _ = self.tx.send(true);
    }
}

/// Receiver half of a request cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Create a linked handle/signal pair.
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Fail with [`AdminError::Cancelled`] once the request is cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AdminError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}

/// Request-scoped context.
#[derive(Debug, Clone, Default)]
pub struct AdminContext {
    cancel: CancelSignal,
    user_id: String,
    locale: String,
    actor: Actor,
    scope: Scope,
}

impl AdminContext {
    /// Context for `user_id`; the actor defaults to the same id.
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            cancel: CancelSignal::never(),
            actor: Actor::new(user_id.clone()),
            user_id,
            locale: String::new(),
            scope: Scope::default(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn cancel(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Shorthand for `self.cancel().check()`.
    pub fn check_cancelled(&self) -> Result<()> {
        self.cancel.check()
    }
}
