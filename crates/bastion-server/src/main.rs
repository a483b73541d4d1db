//! Bastion Server — process entry point.
//!
//! Loads configuration, connects to SurrealDB, applies migrations,
//! provisions the super-admin and then runs cache and rate-limit
//! housekeeping until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bastion_auth::{
    Argon2Hasher, BastionConfig, SuperAdminBootstrap, TenantResolver, TracingAuditSink,
    WindowedRateLimiter, validate_super_admin_credentials,
};
use bastion_core::capability::AuditSink;
use bastion_db::{
    DbConfig, DbManager, SurrealAuditSink, SurrealOrganizationRepository,
    SurrealPermissionRepository, SurrealRoleRepository, SurrealUserRepository,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "bastion.toml";
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bastion=info".parse()?))
        .json()
        .init();

    info!("Starting Bastion...");

    let config_path =
        std::env::var("BASTION_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = BastionConfig::load_from_file(&config_path)
        .with_context(|| format!("loading {config_path}"))?;
    config.validate().context("invalid configuration")?;

    let db = DbManager::connect(&DbConfig::from_env())
        .await
        .context("connecting to SurrealDB")?;
    let client = db.client().clone();
    bastion_db::run_migrations(&client)
        .await
        .context("applying schema migrations")?;

    // BASTION_AUDIT_SINK=log keeps audit events out of the database.
    let audit: Arc<dyn AuditSink> = match std::env::var("BASTION_AUDIT_SINK").as_deref() {
        Ok("log") => Arc::new(TracingAuditSink),
        _ => Arc::new(SurrealAuditSink::new(client.clone())),
    };

    match validate_super_admin_credentials().context("super-admin credentials")? {
        Some(credentials) => {
            let user_id = SuperAdminBootstrap::new(
                SurrealUserRepository::new(client.clone()),
                SurrealRoleRepository::new(client.clone()),
                SurrealPermissionRepository::new(client.clone()),
                Argon2Hasher::new(),
            )
            .with_audit(audit.clone())
            .ensure_super_admin_exists(&credentials)
            .await
            .context("provisioning the super-admin")?;
            info!(%user_id, login = %credentials.login, "Super-admin ready");
        }
        None => info!("SUPER_ADMIN_LOGIN not set, skipping super-admin bootstrap"),
    }

    let resolver = Arc::new(
        TenantResolver::new(
            config.multi_tenant.clone(),
            SurrealOrganizationRepository::new(client.clone()),
        )
        .context("building the tenant resolver")?,
    );
    let limiter = Arc::new(WindowedRateLimiter::new(config.rate_limit.clone()));

    let housekeeping = {
        let resolver = resolver.clone();
        let limiter = limiter.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
            loop {
                ticker.tick().await;
                let swept = limiter.sweep_expired();
                resolver.sweep_cache().await;
                tracing::debug!(
                    swept,
                    tracked = limiter.tracked_keys(),
                    cached_organizations = resolver.cached_organizations(),
                    "Housekeeping pass"
                );
            }
        })
    };

    info!(
        multi_tenant = config.multi_tenant.enabled,
        strategy = config.multi_tenant.strategy.as_str(),
        rbac = config.rbac.enabled,
        "Bastion ready"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    housekeeping.abort();

    info!("Bastion stopped.");
    Ok(())
}
