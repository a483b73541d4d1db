//! Bastion Auth — tenant resolution, RBAC, TOTP two-factor and super-admin
//! bootstrap on top of the `bastion-core` traits.

pub mod audit;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod password;
pub mod rate_limit;
pub mod rbac;
pub mod tenant;
pub mod totp;
pub mod two_factor;

pub use audit::TracingAuditSink;
pub use bootstrap::{
    SuperAdminBootstrap, SuperAdminCredentials, get_super_admin_credentials,
    validate_super_admin_credentials,
};
pub use config::{BastionConfig, MultiTenantConfig, RateLimitConfig, RbacConfig, TotpConfig};
pub use error::AuthError;
pub use password::Argon2Hasher;
pub use rate_limit::WindowedRateLimiter;
pub use rbac::{RbacService, RequireOptions};
pub use tenant::{CustomResolver, TenantResolver};
pub use totp::TotpSetup;
pub use two_factor::{TwoFactorService, VerifyOutcome};
