//! Tenant resolution: request -> slug -> organization -> [`RequestContext`].
//!
//! Exactly one strategy is active per configuration. A slug that matches
//! no organization, or a lookup that fails, produces an empty context
//! rather than an error; callers that need a tenant use
//! [`require_tenant`](bastion_core::context::require_tenant).

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use bastion_core::context::{RequestContext, RequestInfo, TenantContext, TenantStrategy};
use bastion_core::error::{BastionError, BastionResult};
use bastion_core::models::organization::Organization;
use bastion_core::repository::OrganizationRepository;
use moka::future::Cache;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::MultiTenantConfig;

/// Injected slug extractor for [`TenantStrategy::Custom`].
pub type CustomResolver = Arc<dyn Fn(&RequestInfo) -> Option<String> + Send + Sync>;

const ORGANIZATION_CACHE_CAPACITY: u64 = 10_000;

/// First label of `host`, unless the host is an IP address, has fewer
/// than three labels, any empty label, or a reserved first label.
pub fn subdomain_slug(host: &str, reserved: &[String]) -> Option<String> {
    let host = host.trim();
    if host.starts_with('[') || host.parse::<IpAddr>().is_ok() {
        return None;
    }
    let hostname = host.split(':').next().unwrap_or(host);
    if hostname.parse::<IpAddr>().is_ok() {
        return None;
    }
    let labels: Vec<&str> = hostname.split('.').collect();

    if labels.len() < 3 || labels.iter().any(|l| l.is_empty()) {
        return None;
    }

    let first = labels[0].to_ascii_lowercase();
    if reserved.iter().any(|r| r.eq_ignore_ascii_case(&first)) {
        return None;
    }
    Some(first)
}

/// Non-empty path segment at `index`, query string ignored.
pub fn path_slug(path: &str, index: usize) -> Option<String> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.split('/')
        .filter(|s| !s.is_empty())
        .nth(index)
        .map(str::to_string)
}

/// Value of `header`, verbatim. Empty values count as absent.
pub fn header_slug(request: &RequestInfo, header: &str) -> Option<String> {
    request
        .header(header)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolves the tenant of each inbound request.
pub struct TenantResolver<O: OrganizationRepository> {
    config: MultiTenantConfig,
    organizations: O,
    cache: Cache<Uuid, Organization>,
    custom: Option<CustomResolver>,
}

impl<O: OrganizationRepository> TenantResolver<O> {
    /// Build a resolver for the subdomain, path or header strategy.
    pub fn new(config: MultiTenantConfig, organizations: O) -> BastionResult<Self> {
        Self::build(config, organizations, None)
    }

    /// Build a resolver whose custom strategy delegates to `resolver`.
    pub fn with_custom_resolver(
        config: MultiTenantConfig,
        organizations: O,
        resolver: CustomResolver,
    ) -> BastionResult<Self> {
        Self::build(config, organizations, Some(resolver))
    }

    fn build(
        config: MultiTenantConfig,
        organizations: O,
        custom: Option<CustomResolver>,
    ) -> BastionResult<Self> {
        if config.enabled && config.strategy == TenantStrategy::Custom && custom.is_none() {
            return Err(BastionError::Configuration(
                "the custom tenant strategy needs an injected resolver".into(),
            ));
        }
        if config.enabled
            && config.strategy == TenantStrategy::Header
            && config.header_name.as_deref().is_none_or(str::is_empty)
        {
            return Err(BastionError::Configuration(
                "the header tenant strategy needs multi_tenant.header_name".into(),
            ));
        }

        let cache = Cache::builder()
            .max_capacity(ORGANIZATION_CACHE_CAPACITY)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();

        Ok(Self {
            config,
            organizations,
            cache,
            custom,
        })
    }

    pub fn strategy(&self) -> TenantStrategy {
        self.config.strategy
    }

    /// Extract a tenant slug with the configured strategy.
    pub fn detect_tenant(&self, request: &RequestInfo) -> Option<String> {
        match self.config.strategy {
            TenantStrategy::Subdomain => request
                .host()
                .and_then(|h| subdomain_slug(h, &self.config.reserved_subdomains)),
            TenantStrategy::Path => path_slug(&request.path, self.config.path_index),
            TenantStrategy::Header => self
                .config
                .header_name
                .as_deref()
                .and_then(|name| header_slug(request, name)),
            TenantStrategy::Custom => self.custom.as_ref().and_then(|f| f(request)),
        }
    }

    /// Build the context for one request. Never fails.
    pub async fn initialize_tenant_context(&self, request: RequestInfo) -> RequestContext {
        let tenant = self.resolve(&request).await;
        RequestContext::new(request, tenant)
    }

    async fn resolve(&self, request: &RequestInfo) -> TenantContext {
        if !self.config.enabled {
            return TenantContext::empty(None);
        }

        let strategy = self.config.strategy;
        let Some(slug) = self.detect_tenant(request) else {
            debug!(strategy = strategy.as_str(), path = %request.path, "No tenant detected");
            return TenantContext::empty(Some(strategy));
        };

        match self.organizations.get_by_slug(&slug).await {
            Ok(organization) => {
                debug!(slug = %slug, organization_id = %organization.id, "Tenant resolved");
                self.cache
                    .insert(organization.id, organization.clone())
                    .await;
                TenantContext::for_organization(organization, strategy)
            }
            Err(BastionError::NotFound { .. }) => {
                debug!(slug = %slug, "Unknown tenant slug");
                TenantContext::empty(Some(strategy))
            }
            Err(e) => {
                warn!(slug = %slug, error = %e, "Tenant lookup failed");
                TenantContext::empty(Some(strategy))
            }
        }
    }

    /// Organization by id, served from the cache while fresh.
    pub async fn get_organization(&self, id: Uuid) -> BastionResult<Organization> {
        if let Some(organization) = self.cache.get(&id).await {
            debug!(organization_id = %id, "Organization cache hit");
            return Ok(organization);
        }
        let organization = self.organizations.get_by_id(id).await?;
        self.cache.insert(id, organization.clone()).await;
        Ok(organization)
    }

    /// Drop a cached organization, e.g. after an update.
    pub async fn invalidate_organization(&self, id: Uuid) {
        self.cache.invalidate(&id).await;
    }

    /// Evict expired cache entries now rather than on next access.
    pub async fn sweep_cache(&self) {
        self.cache.run_pending_tasks().await;
    }

    pub fn cached_organizations(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserved() -> Vec<String> {
        MultiTenantConfig::default().reserved_subdomains
    }

    #[test]
    fn subdomain_detection() {
        let r = reserved();
        assert_eq!(subdomain_slug("acme.example.com", &r).as_deref(), Some("acme"));
        assert_eq!(subdomain_slug("Acme.example.com:8443", &r).as_deref(), Some("acme"));
        assert_eq!(subdomain_slug("www.example.com", &r), None);
        assert_eq!(subdomain_slug("api.example.com", &r), None);
        assert_eq!(subdomain_slug("localhost:3000", &r), None);
        assert_eq!(subdomain_slug("example.com", &r), None);
        assert_eq!(subdomain_slug("...invalid...example.com", &r), None);
        assert_eq!(subdomain_slug("", &r), None);
        assert_eq!(subdomain_slug("10.0.0.1", &r), None);
        assert_eq!(subdomain_slug("10.0.0.1:8080", &r), None);
        assert_eq!(subdomain_slug("[::1]:8080", &r), None);
        assert_eq!(subdomain_slug("::1", &r), None);
        assert_eq!(subdomain_slug("10.example.com", &r).as_deref(), Some("10"));
    }

    #[test]
    fn path_detection() {
        assert_eq!(path_slug("/acme/dashboard", 0).as_deref(), Some("acme"));
        assert_eq!(path_slug("/t/acme/dashboard", 1).as_deref(), Some("acme"));
        assert_eq!(path_slug("//acme//x", 0).as_deref(), Some("acme"));
        assert_eq!(path_slug("/acme?tab=1", 0).as_deref(), Some("acme"));
        assert_eq!(path_slug("/", 0), None);
        assert_eq!(path_slug("/acme", 3), None);
    }

    #[test]
    fn header_detection_is_verbatim() {
        let req = RequestInfo::new("/").with_header("X-Tenant", "Acme-Corp");
        assert_eq!(header_slug(&req, "x-tenant").as_deref(), Some("Acme-Corp"));

        let empty = RequestInfo::new("/").with_header("X-Tenant", "");
        assert_eq!(header_slug(&empty, "X-Tenant"), None);
    }
}
