//! Typed configuration, loaded from TOML and validated once at startup.

use std::path::Path;

use bastion_core::context::TenantStrategy;
use bastion_core::error::{BastionError, BastionResult};
use serde::Deserialize;

use crate::error::AuthError;

/// Minimum TOTP secret size accepted by RFC 4226 (128 bits).
pub const MIN_TOTP_KEY_LENGTH: usize = 16;

/// Root configuration for every Bastion service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BastionConfig {
    pub totp: TotpConfig,
    pub multi_tenant: MultiTenantConfig,
    pub rbac: RbacConfig,
    pub rate_limit: RateLimitConfig,
    /// Hex-encoded 256-bit AES-GCM key for encrypting TOTP secrets at rest.
    /// `None` stores secrets as plain base32.
    pub mfa_encryption_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TotpConfig {
    /// Issuer name shown in authenticator apps.
    pub issuer: String,
    /// Secret size in bytes.
    pub key_length: usize,
    /// Step length in seconds.
    pub window: u64,
    pub backup_codes_count: usize,
    pub backup_code_length: usize,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "Bastion".into(),
            key_length: 32,
            window: 30,
            backup_codes_count: 10,
            backup_code_length: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MultiTenantConfig {
    pub enabled: bool,
    pub strategy: TenantStrategy,
    /// Zero-based path segment holding the slug (path strategy).
    pub path_index: usize,
    /// Header carrying the slug (header strategy).
    pub header_name: Option<String>,
    /// First labels that never name a tenant (subdomain strategy).
    pub reserved_subdomains: Vec<String>,
    /// Organization cache time-to-live.
    pub cache_ttl_secs: u64,
}

impl Default for MultiTenantConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: TenantStrategy::Subdomain,
            path_index: 0,
            header_name: None,
            reserved_subdomains: ["www", "api", "admin", "app"]
                .into_iter()
                .map(String::from)
                .collect(),
            cache_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RbacConfig {
    /// When false every check passes for an authenticated user.
    pub enabled: bool,
    /// Role slug handed to new users by `assign_default_role`.
    pub default_role: Option<String>,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_role: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Fixed window length in seconds.
    pub window_secs: u64,
    pub sign_in_max: u32,
    pub two_factor_max: u32,
    pub default_max: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            sign_in_max: 10,
            two_factor_max: 5,
            default_max: 100,
        }
    }
}

impl BastionConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> BastionResult<Self> {
        toml::from_str(raw).map_err(|e| BastionError::Configuration(format!("invalid TOML: {e}")))
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> BastionResult<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(BastionError::Configuration(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Check every value that would otherwise fail later at runtime.
    pub fn validate(&self) -> BastionResult<()> {
        if self.totp.issuer.trim().is_empty() {
            return Err(AuthError::Config("totp.issuer must not be empty".into()).into());
        }
        if self.totp.issuer.contains(':') {
            return Err(AuthError::Config("totp.issuer must not contain ':'".into()).into());
        }
        if self.totp.key_length < MIN_TOTP_KEY_LENGTH {
            return Err(AuthError::Config(format!(
                "totp.key_length must be at least {MIN_TOTP_KEY_LENGTH} bytes"
            ))
            .into());
        }
        if self.totp.window == 0 {
            return Err(AuthError::Config("totp.window must be positive".into()).into());
        }
        if self.totp.backup_codes_count == 0 || self.totp.backup_code_length == 0 {
            return Err(AuthError::Config(
                "totp.backup_codes_count and totp.backup_code_length must be positive".into(),
            )
            .into());
        }
        let (count, length) = (self.totp.backup_codes_count, self.totp.backup_code_length);
        if !crate::totp::backup_codes_fit(count, length) {
            return Err(AuthError::Config(format!(
                "totp.backup_codes_count {count} exceeds the distinct codes of length {length}"
            ))
            .into());
        }
        if self.multi_tenant.enabled
            && self.multi_tenant.strategy == TenantStrategy::Header
            && self
                .multi_tenant
                .header_name
                .as_deref()
                .is_none_or(|h| h.trim().is_empty())
        {
            return Err(AuthError::Config(
                "multi_tenant.header_name is required for the header strategy".into(),
            )
            .into());
        }
        if self.rate_limit.enabled && self.rate_limit.window_secs == 0 {
            return Err(AuthError::Config("rate_limit.window_secs must be positive".into()).into());
        }
        if let Some(role) = &self.rbac.default_role {
            if !bastion_core::models::role::is_valid_role_slug(role) {
                return Err(AuthError::Config(format!(
                    "rbac.default_role '{role}' is not a valid slug"
                ))
                .into());
            }
        }
        self.encryption_key()?;
        Ok(())
    }

    /// Decode `mfa_encryption_key`.
    pub fn encryption_key(&self) -> BastionResult<Option<[u8; 32]>> {
        let Some(raw) = &self.mfa_encryption_key else {
            return Ok(None);
        };
        let bytes = hex::decode(raw.trim())
            .map_err(|_| AuthError::Config("mfa_encryption_key must be hex".into()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AuthError::Config("mfa_encryption_key must be 32 bytes".into()))?;
        Ok(Some(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BastionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.totp.key_length, 32);
        assert_eq!(config.totp.window, 30);
        assert_eq!(config.multi_tenant.cache_ttl_secs, 300);
        assert!(config.rbac.enabled);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = BastionConfig::from_toml_str(
            r#"
            [totp]
            issuer = "Acme"

            [multi_tenant]
            enabled = true
            strategy = "path"
            path_index = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.totp.issuer, "Acme");
        assert_eq!(config.totp.backup_codes_count, 10);
        assert_eq!(config.multi_tenant.strategy, TenantStrategy::Path);
        assert_eq!(config.multi_tenant.path_index, 1);
        assert_eq!(config.multi_tenant.reserved_subdomains.len(), 4);
        config.validate().unwrap();
    }

    #[test]
    fn header_strategy_needs_header_name() {
        let config = BastionConfig::from_toml_str(
            r#"
            [multi_tenant]
            enabled = true
            strategy = "header"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(BastionError::Configuration(_))
        ));
    }

    #[test]
    fn short_keys_and_empty_issuer_rejected() {
        let mut config = BastionConfig::default();
        config.totp.key_length = 0;
        assert!(config.validate().is_err());

        let mut config = BastionConfig::default();
        config.totp.issuer = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn backup_codes_must_fit_code_space() {
        let mut config = BastionConfig::default();
        config.totp.backup_codes_count = 37;
        config.totp.backup_code_length = 1;
        assert!(matches!(
            config.validate(),
            Err(BastionError::Configuration(_))
        ));

        config.totp.backup_codes_count = 36;
        config.validate().unwrap();
    }

    #[test]
    fn encryption_key_must_be_32_hex_bytes() {
        let mut config = BastionConfig {
            mfa_encryption_key: Some("ab".repeat(32)),
            ..Default::default()
        };
        assert_eq!(config.encryption_key().unwrap(), Some([0xab; 32]));

        config.mfa_encryption_key = Some("abcd".into());
        assert!(config.validate().is_err());

        config.mfa_encryption_key = Some("zz".repeat(32));
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = BastionConfig::load_from_file("/nonexistent/bastion.toml").unwrap();
        assert_eq!(config.totp.issuer, "Bastion");
    }
}
