use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Identity used for internal maintenance writes.
pub const SYSTEM_USER: &str = "System";

/// Per-operation execution state: who is acting, whether model security is
/// enforced, which listeners are suppressed, and (for tests and replays) a
/// fixed clock. One context per request; nothing here is shared.
#[derive(Debug, Clone)]
pub struct OperationContext {
    user: String,
    system: bool,
    model_security: bool,
    suppressed: BTreeSet<&'static str>,
    clock: Option<DateTime<Utc>>,
}

impl OperationContext {
    pub fn new(user: impl Into<String>) -> Self {
        OperationContext {
            user: user.into(),
            system: false,
            model_security: true,
            suppressed: BTreeSet::new(),
            clock: None,
        }
    }

    pub fn system() -> Self {
        let mut ctx = Self::new(SYSTEM_USER);
        ctx.system = true;
        ctx
    }

    /// Fix "now" for everything run under this context.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn set_clock(&mut self, now: DateTime<Utc>) {
        self.clock = Some(now);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn is_system(&self) -> bool {
        self.system
    }

    pub fn enable_model_security(&mut self) {
        self.model_security = true;
    }

    pub fn disable_model_security(&mut self) {
        self.model_security = false;
    }

    pub fn is_model_security_enabled(&self) -> bool {
        self.model_security
    }

    pub fn is_suppressed(&self, listener: &str) -> bool {
        self.suppressed.contains(listener)
    }

    /// Run `f` with `listener` suppressed, restoring the previous state
    /// afterwards even when `f` fails.
    pub fn with_suppressed<T>(&mut self, listener: &'static str, f: impl FnOnce(&mut Self) -> T) -> T {
        let inserted = self.suppressed.insert(listener);
        let out = f(self);
        if inserted {
            self.suppressed.remove(listener);
        }
        out
    }

    /// Run `f` under the system identity. The caller's identity is restored
    /// afterwards.
    pub fn run_as_system<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let was_system = self.system;
        let user = std::mem::replace(&mut self.user, SYSTEM_USER.to_string());
        self.system = true;
        let out = f(self);
        self.system = was_system;
        self.user = user;
        out
    }

    /// Run `f` with model security disabled for this context only.
    pub fn without_model_security<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let was_enabled = self.model_security;
        self.model_security = false;
        let out = f(self);
        self.model_security = was_enabled;
        out
    }
}
