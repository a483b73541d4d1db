//! Traits for the collaborators the core consumes but does not implement:
//! credential hashing, the session store, rate limiting and auditing.

use crate::context::RequestInfo;
use crate::error::BastionResult;
use crate::models::audit::AuditEvent;
use crate::models::session::Session;

/// One-way credential hashing. `verify` must compare in constant time.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> BastionResult<String>;
    fn verify(&self, hash: &str, plaintext: &str) -> BastionResult<bool>;
}

/// Read-only view of the session layer.
pub trait SessionStore: Send + Sync {
    fn get_session(
        &self,
        request: &RequestInfo,
    ) -> impl Future<Output = BastionResult<Session>> + Send;
}

/// Endpoint classes with separate attempt budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    SignIn,
    TwoFactor,
    Default,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignIn => "sign-in",
            Self::TwoFactor => "two-factor",
            Self::Default => "default",
        }
    }
}

/// Windowed per-client attempt counter.
pub trait RateLimiter: Send + Sync {
    /// Record one attempt and return whether it is within budget.
    fn check(&self, client: &str, class: EndpointClass) -> bool;
}

/// Fire-and-forget audit event emission.
///
/// Implementations must never fail or block the caller.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) {}
}
