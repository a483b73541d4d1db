//! Request-scoped context.
//!
//! A [`RequestContext`] is built once per inbound request by the tenant
//! resolver and passed by reference to every RBAC and 2FA entry point.
//! Nothing in here is shared between requests.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BastionError, BastionResult};
use crate::models::organization::Organization;

/// The parts of an inbound request the core looks at.
///
/// Header names are stored lowercased; values are kept verbatim.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub request_id: Uuid,
    pub path: String,
    headers: HashMap<String, String>,
}

impl RequestInfo {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            path: path.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_host(self, host: impl Into<String>) -> Self {
        self.with_header("host", host)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn host(&self) -> Option<&str> {
        self.header("host")
    }
}

/// How the tenant slug is extracted from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStrategy {
    Subdomain,
    Path,
    Header,
    Custom,
}

impl TenantStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subdomain => "subdomain",
            Self::Path => "path",
            Self::Header => "header",
            Self::Custom => "custom",
        }
    }
}

/// Organization scope of a single request.
///
/// An all-`None` context is valid: it means "no tenant" and downstream code
/// treats it as an unauthenticated scope rather than an error.
#[derive(Debug, Clone, Default)]
pub struct TenantContext {
    pub organization_id: Option<Uuid>,
    pub organization: Option<Organization>,
    /// Strategy that was active when the context was built.
    pub strategy: Option<TenantStrategy>,
}

impl TenantContext {
    pub fn empty(strategy: Option<TenantStrategy>) -> Self {
        Self {
            organization_id: None,
            organization: None,
            strategy,
        }
    }

    pub fn for_organization(organization: Organization, strategy: TenantStrategy) -> Self {
        Self {
            organization_id: Some(organization.id),
            organization: Some(organization),
            strategy: Some(strategy),
        }
    }
}

/// Everything the core knows about one request.
#[derive(Debug)]
pub struct RequestContext {
    pub request: RequestInfo,
    pub tenant: TenantContext,
    /// Super-admin lookups made while serving this request. Dropped with the
    /// context, so a revoked role is seen by the next request.
    super_admin: Mutex<HashMap<Uuid, bool>>,
}

impl RequestContext {
    pub fn new(request: RequestInfo, tenant: TenantContext) -> Self {
        Self {
            request,
            tenant,
            super_admin: Mutex::new(HashMap::new()),
        }
    }

    pub fn organization_id(&self) -> Option<Uuid> {
        self.tenant.organization_id
    }

    pub fn cached_super_admin(&self, user_id: Uuid) -> Option<bool> {
        self.super_admin
            .lock()
            .ok()
            .and_then(|cache| cache.get(&user_id).copied())
    }

    pub fn cache_super_admin(&self, user_id: Uuid, is_super_admin: bool) {
        if let Ok(mut cache) = self.super_admin.lock() {
            cache.insert(user_id, is_super_admin);
        }
    }
}

/// Fail with a 400 unless the request resolved to an organization.
pub fn require_tenant(context: &TenantContext) -> BastionResult<Uuid> {
    context.organization_id.ok_or(BastionError::TenantContext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = RequestInfo::new("/").with_header("X-Tenant-ID", "Acme");
        assert_eq!(req.header("x-tenant-id"), Some("Acme"));
        assert_eq!(req.header("X-TENANT-ID"), Some("Acme"));
        assert_eq!(req.host(), None);
    }

    #[test]
    fn require_tenant_rejects_empty_context() {
        let err = require_tenant(&TenantContext::default()).unwrap_err();
        assert!(matches!(err, BastionError::TenantContext));

        let id = Uuid::new_v4();
        let ctx = TenantContext {
            organization_id: Some(id),
            organization: None,
            strategy: Some(TenantStrategy::Header),
        };
        assert_eq!(require_tenant(&ctx).unwrap(), id);
    }

    #[test]
    fn super_admin_cache_is_per_context() {
        let user = Uuid::new_v4();
        let first = RequestContext::new(RequestInfo::new("/"), TenantContext::default());
        assert_eq!(first.cached_super_admin(user), None);
        first.cache_super_admin(user, true);
        assert_eq!(first.cached_super_admin(user), Some(true));

        let second = RequestContext::new(RequestInfo::new("/"), TenantContext::default());
        assert_eq!(second.cached_super_admin(user), None);
    }
}
