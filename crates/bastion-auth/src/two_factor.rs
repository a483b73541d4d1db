//! The 2FA state machine: Disabled -> PendingSetup -> Enabled -> Disabled.
//!
//! PendingSetup is never persisted. [`TwoFactorService::generate_totp_secret`]
//! hands the caller a secret and backup codes, and nothing is stored until
//! [`TwoFactorService::enable_2fa`] sees a matching code.

use std::sync::Arc;

use bastion_core::capability::{AuditSink, EndpointClass, NoopAuditSink, RateLimiter};
use bastion_core::error::{BastionError, BastionResult};
use bastion_core::models::audit::{AuditEvent, AuditOutcome};
use bastion_core::repository::TwoFactorRepository;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TotpConfig;
use crate::totp::{self, TotpSetup};

/// Drift tolerance, in steps, applied by enable and verify.
pub const DEFAULT_WINDOW: u8 = 1;

/// Result of [`TwoFactorService::verify_2fa`].
///
/// A rejected TOTP code and a rejected recovery code look the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_backup_code: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_backup_codes: Option<u64>,
}

impl VerifyOutcome {
    pub fn invalid() -> Self {
        Self {
            is_valid: false,
            is_backup_code: None,
            remaining_backup_codes: None,
        }
    }

    fn totp() -> Self {
        Self {
            is_valid: true,
            is_backup_code: Some(false),
            remaining_backup_codes: None,
        }
    }

    fn backup(remaining: u64) -> Self {
        Self {
            is_valid: true,
            is_backup_code: Some(true),
            remaining_backup_codes: Some(remaining),
        }
    }
}

/// Two-factor service.
///
/// Generic over the repository so that the auth layer has no dependency on
/// the database crate. Built without a repository (see
/// [`TwoFactorService::unavailable`]) the feature reports itself as off.
pub struct TwoFactorService<T: TwoFactorRepository> {
    repo: Option<T>,
    config: TotpConfig,
    encryption_key: Option<[u8; 32]>,
    audit: Arc<dyn AuditSink>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
}

impl<T: TwoFactorRepository> TwoFactorService<T> {
    pub fn new(repo: T, config: TotpConfig) -> Self {
        Self {
            repo: Some(repo),
            config,
            encryption_key: None,
            audit: Arc::new(NoopAuditSink),
            rate_limiter: None,
        }
    }

    /// A service with no persistence behind it.
    pub fn unavailable(config: TotpConfig) -> Self {
        Self {
            repo: None,
            config,
            encryption_key: None,
            audit: Arc::new(NoopAuditSink),
            rate_limiter: None,
        }
    }

    /// Store secrets AES-256-GCM encrypted under `key`.
    pub fn with_encryption_key(mut self, key: Option<[u8; 32]>) -> Self {
        self.encryption_key = key;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn config(&self) -> &TotpConfig {
        &self.config
    }

    fn repo(&self) -> BastionResult<&T> {
        self.repo.as_ref().ok_or_else(|| {
            BastionError::Configuration("two-factor persistence is not configured".into())
        })
    }

    /// Fresh secret, provisioning URI, QR image and backup codes. Nothing
    /// is persisted.
    pub fn generate_totp_secret(&self, user_id: Uuid, email: &str) -> BastionResult<TotpSetup> {
        let (count, length) = (self.config.backup_codes_count, self.config.backup_code_length);
        if !totp::backup_codes_fit(count, length) {
            return Err(BastionError::validation([
                "totp.backup_codes_count",
                "totp.backup_code_length",
            ]));
        }
        let secret = totp::generate_secret(self.config.key_length);
        let (uri, qr_code_image) =
            totp::provisioning(&secret, self.config.window, &self.config.issuer, email)?;
        let backup_codes = totp::generate_backup_codes(count, length);
        debug!(%user_id, "Generated TOTP enrollment");

        Ok(TotpSetup {
            secret,
            uri,
            qr_code_image,
            backup_codes,
        })
    }

    /// Check a code against a base32 secret with `window` steps of drift.
    pub fn verify_totp_code(&self, secret: &str, token: &str, window: u8) -> bool {
        totp::verify_totp_code(secret, token, window, self.config.window)
    }

    /// Confirm enrollment and persist it.
    ///
    /// Returns `Ok(false)` when the code does not match or the write fails.
    /// Errors only when persistence is not configured.
    pub async fn enable_2fa(
        &self,
        user_id: Uuid,
        secret: &str,
        token: &str,
        backup_codes: Vec<String>,
    ) -> BastionResult<bool> {
        let repo = self.repo()?;

        if !self.verify_totp_code(secret, token, DEFAULT_WINDOW) {
            self.audit.emit(
                AuditEvent::new("twofactor.enable", AuditOutcome::Failure).actor(user_id),
            );
            return Ok(false);
        }

        let stored = match self.seal(secret) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(%user_id, error = %e, "Failed to encrypt TOTP secret");
                return Ok(false);
            }
        };

        let count = backup_codes.len();
        if let Err(e) = repo.enable(user_id, stored, backup_codes).await {
            warn!(%user_id, error = %e, "Failed to enable 2FA");
            return Ok(false);
        }

        info!(%user_id, backup_codes = count, "2FA enabled");
        self.audit
            .emit(AuditEvent::new("twofactor.enabled", AuditOutcome::Success).actor(user_id));
        Ok(true)
    }

    /// Clear the secret and every recovery code. False on any failure.
    pub async fn disable_2fa(&self, user_id: Uuid) -> bool {
        let Some(repo) = &self.repo else {
            return false;
        };

        match repo.disable(user_id).await {
            Ok(()) => {
                info!(%user_id, "2FA disabled");
                self.audit.emit(
                    AuditEvent::new("twofactor.disabled", AuditOutcome::Success).actor(user_id),
                );
                true
            }
            Err(e) => {
                warn!(%user_id, error = %e, "Failed to disable 2FA");
                false
            }
        }
    }

    /// Verify a TOTP code, falling back to an unused recovery code.
    pub async fn verify_2fa(&self, user_id: Uuid, code: &str) -> VerifyOutcome {
        let Some(repo) = &self.repo else {
            return VerifyOutcome::invalid();
        };

        let state = match repo.get_state(user_id).await {
            Ok(state) => state,
            Err(e) => {
                debug!(%user_id, error = %e, "No 2FA state");
                return VerifyOutcome::invalid();
            }
        };
        let Some(stored) = state.secret.filter(|_| state.enabled) else {
            return VerifyOutcome::invalid();
        };

        match self.open(&stored) {
            Ok(secret) if self.verify_totp_code(&secret, code, DEFAULT_WINDOW) => {
                return VerifyOutcome::totp();
            }
            Ok(_) => {}
            Err(e) => warn!(%user_id, error = %e, "Stored TOTP secret is unreadable"),
        }

        match self.consume_recovery_code(repo, user_id, code).await {
            Ok(Some(remaining)) => VerifyOutcome::backup(remaining),
            Ok(None) => {
                self.audit
                    .emit(AuditEvent::new("twofactor.verify", AuditOutcome::Failure).actor(user_id));
                VerifyOutcome::invalid()
            }
            Err(e) => {
                warn!(%user_id, error = %e, "Recovery code lookup failed");
                VerifyOutcome::invalid()
            }
        }
    }

    /// [`Self::verify_2fa`] behind the `two-factor` rate-limit budget of
    /// `client`.
    pub async fn verify_2fa_for_client(
        &self,
        client: &str,
        user_id: Uuid,
        code: &str,
    ) -> BastionResult<VerifyOutcome> {
        if let Some(limiter) = &self.rate_limiter {
            if !limiter.check(client, EndpointClass::TwoFactor) {
                self.audit.emit(
                    AuditEvent::new("twofactor.rate_limited", AuditOutcome::Denied).actor(user_id),
                );
                return Err(BastionError::RateLimited);
            }
        }
        Ok(self.verify_2fa(user_id, code).await)
    }

    async fn consume_recovery_code(
        &self,
        repo: &T,
        user_id: Uuid,
        code: &str,
    ) -> BastionResult<Option<u64>> {
        let Some(found) = repo.find_unused_code(user_id, code).await? else {
            return Ok(None);
        };
        // Another request may have consumed it between find and update.
        if !repo.consume_code(found.id).await? {
            return Ok(None);
        }
        let remaining = repo.count_unused(user_id).await?;

        info!(%user_id, remaining, "Recovery code used");
        self.audit.emit(
            AuditEvent::new("twofactor.recovery_code_used", AuditOutcome::Success)
                .actor(user_id)
                .metadata(serde_json::json!({ "remaining": remaining })),
        );
        Ok(Some(remaining))
    }

    /// Replace every unused recovery code with `backup_codes_count` fresh
    /// ones. Used codes are kept. Errors propagate.
    pub async fn generate_new_backup_codes(&self, user_id: Uuid) -> BastionResult<Vec<String>> {
        self.generate_new_backup_codes_with(
            user_id,
            self.config.backup_codes_count,
            self.config.backup_code_length,
        )
        .await
    }

    pub async fn generate_new_backup_codes_with(
        &self,
        user_id: Uuid,
        count: usize,
        length: usize,
    ) -> BastionResult<Vec<String>> {
        let repo = self.repo()?;
        if count == 0 || length == 0 || !totp::backup_codes_fit(count, length) {
            return Err(BastionError::validation(["count", "length"]));
        }

        let codes = totp::generate_backup_codes(count, length);
        repo.replace_unused_codes(user_id, codes.clone()).await?;

        info!(%user_id, count, "Backup codes regenerated");
        self.audit.emit(
            AuditEvent::new("twofactor.backup_codes_regenerated", AuditOutcome::Success)
                .actor(user_id),
        );
        Ok(codes)
    }

    /// Unused recovery codes left. Zero on error.
    pub async fn get_backup_codes_count(&self, user_id: Uuid) -> u64 {
        let Some(repo) = &self.repo else {
            return 0;
        };
        repo.count_unused(user_id).await.unwrap_or_else(|e| {
            warn!(%user_id, error = %e, "Failed to count backup codes");
            0
        })
    }

    pub async fn is_2fa_enabled(&self, user_id: Uuid) -> bool {
        let Some(repo) = &self.repo else {
            return false;
        };
        match repo.get_state(user_id).await {
            Ok(state) => state.enabled,
            Err(e) => {
                debug!(%user_id, error = %e, "2FA state unavailable");
                false
            }
        }
    }

    fn seal(&self, secret: &str) -> BastionResult<String> {
        match &self.encryption_key {
            Some(key) => Ok(totp::encrypt_secret(key, secret.as_bytes())?),
            None => Ok(secret.to_string()),
        }
    }

    fn open(&self, stored: &str) -> BastionResult<String> {
        match &self.encryption_key {
            Some(key) => {
                let bytes = totp::decrypt_secret(key, stored)?;
                String::from_utf8(bytes)
                    .map_err(|e| BastionError::Crypto(format!("secret is not UTF-8: {e}")))
            }
            None => Ok(stored.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bastion_core::models::recovery_code::{RecoveryCode, TwoFactorState};
    use chrono::Utc;

    use super::*;

    #[derive(Default)]
    struct MemoryRepo {
        fail: bool,
        enabled: Mutex<bool>,
        secret: Mutex<Option<String>>,
        codes: Mutex<Vec<RecoveryCode>>,
    }

    impl MemoryRepo {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn guard(&self) -> BastionResult<()> {
            if self.fail {
                return Err(BastionError::Database("connection refused".into()));
            }
            Ok(())
        }
    }

    impl TwoFactorRepository for MemoryRepo {
        async fn get_state(&self, user_id: Uuid) -> BastionResult<TwoFactorState> {
            self.guard()?;
            Ok(TwoFactorState {
                user_id,
                email: "mfa@example.com".into(),
                enabled: *self.enabled.lock().unwrap(),
                secret: self.secret.lock().unwrap().clone(),
            })
        }

        async fn enable(&self, user_id: Uuid, secret: String, codes: Vec<String>) -> BastionResult<()> {
            self.guard()?;
            *self.enabled.lock().unwrap() = true;
            *self.secret.lock().unwrap() = Some(secret);
            let mut stored = self.codes.lock().unwrap();
            stored.clear();
            stored.extend(codes.into_iter().map(|code| RecoveryCode {
                id: Uuid::new_v4(),
                user_id,
                code,
                used: false,
                used_at: None,
                created_at: Utc::now(),
            }));
            Ok(())
        }

        async fn disable(&self, _user_id: Uuid) -> BastionResult<()> {
            self.guard()?;
            *self.enabled.lock().unwrap() = false;
            *self.secret.lock().unwrap() = None;
            self.codes.lock().unwrap().clear();
            Ok(())
        }

        async fn replace_unused_codes(&self, user_id: Uuid, codes: Vec<String>) -> BastionResult<()> {
            self.guard()?;
            if !*self.enabled.lock().unwrap() {
                return Err(BastionError::validation(["two_factor_enabled"]));
            }
            let mut stored = self.codes.lock().unwrap();
            stored.retain(|c| c.used);
            stored.extend(codes.into_iter().map(|code| RecoveryCode {
                id: Uuid::new_v4(),
                user_id,
                code,
                used: false,
                used_at: None,
                created_at: Utc::now(),
            }));
            Ok(())
        }

        async fn find_unused_code(&self, _user_id: Uuid, code: &str) -> BastionResult<Option<RecoveryCode>> {
            self.guard()?;
            Ok(self
                .codes
                .lock()
                .unwrap()
                .iter()
                .find(|c| !c.used && c.code == code)
                .cloned())
        }

        async fn consume_code(&self, code_id: Uuid) -> BastionResult<bool> {
            self.guard()?;
            let mut stored = self.codes.lock().unwrap();
            match stored.iter_mut().find(|c| c.id == code_id && !c.used) {
                Some(code) => {
                    code.used = true;
                    code.used_at = Some(Utc::now());
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn count_unused(&self, _user_id: Uuid) -> BastionResult<u64> {
            self.guard()?;
            Ok(self.codes.lock().unwrap().iter().filter(|c| !c.used).count() as u64)
        }

        async fn list_codes(&self, _user_id: Uuid) -> BastionResult<Vec<RecoveryCode>> {
            self.guard()?;
            Ok(self.codes.lock().unwrap().clone())
        }
    }

    fn current_code(secret: &str) -> String {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        totp::generate_code_at(secret, 30, now).unwrap()
    }

    async fn enrolled(service: &TwoFactorService<MemoryRepo>, user_id: Uuid) -> TotpSetup {
        let setup = service
            .generate_totp_secret(user_id, "mfa@example.com")
            .unwrap();
        let code = current_code(&setup.secret);
        assert!(
            service
                .enable_2fa(user_id, &setup.secret, &code, setup.backup_codes.clone())
                .await
                .unwrap()
        );
        setup
    }

    #[tokio::test]
    async fn setup_is_not_persisted() {
        let service = TwoFactorService::new(MemoryRepo::default(), TotpConfig::default());
        let user_id = Uuid::new_v4();
        let setup = service
            .generate_totp_secret(user_id, "mfa@example.com")
            .unwrap();

        assert_eq!(setup.backup_codes.len(), 10);
        assert!(setup.uri.starts_with("otpauth://totp/"));
        assert!(!service.is_2fa_enabled(user_id).await);
        assert_eq!(service.get_backup_codes_count(user_id).await, 0);
    }

    #[tokio::test]
    async fn wrong_code_does_not_enable() {
        let service = TwoFactorService::new(MemoryRepo::default(), TotpConfig::default());
        let user_id = Uuid::new_v4();
        let setup = service.generate_totp_secret(user_id, "a@example.com").unwrap();

        let enabled = service
            .enable_2fa(user_id, &setup.secret, "12345", setup.backup_codes)
            .await
            .unwrap();
        assert!(!enabled);
        assert!(!service.is_2fa_enabled(user_id).await);
    }

    #[tokio::test]
    async fn totp_then_recovery_code() {
        let service = TwoFactorService::new(MemoryRepo::default(), TotpConfig::default());
        let user_id = Uuid::new_v4();
        let setup = enrolled(&service, user_id).await;

        let outcome = service.verify_2fa(user_id, &current_code(&setup.secret)).await;
        assert!(outcome.is_valid);
        assert_eq!(outcome.is_backup_code, Some(false));

        let code = &setup.backup_codes[0];
        let first = service.verify_2fa(user_id, code).await;
        assert_eq!(first.is_backup_code, Some(true));
        assert_eq!(first.remaining_backup_codes, Some(9));

        let again = service.verify_2fa(user_id, code).await;
        assert_eq!(again, VerifyOutcome::invalid());
    }

    #[tokio::test]
    async fn encrypted_secret_still_verifies() {
        let service = TwoFactorService::new(MemoryRepo::default(), TotpConfig::default())
            .with_encryption_key(Some([7u8; 32]));
        let user_id = Uuid::new_v4();
        let setup = enrolled(&service, user_id).await;

        let stored = service.repo.as_ref().unwrap().secret.lock().unwrap().clone();
        assert_ne!(stored.as_deref(), Some(setup.secret.as_str()));
        assert!(service.verify_2fa(user_id, &current_code(&setup.secret)).await.is_valid);
    }

    #[tokio::test]
    async fn regenerate_keeps_used_codes() {
        let service = TwoFactorService::new(MemoryRepo::default(), TotpConfig::default());
        let user_id = Uuid::new_v4();
        let setup = enrolled(&service, user_id).await;
        service.verify_2fa(user_id, &setup.backup_codes[0]).await;

        let fresh = service.generate_new_backup_codes_with(user_id, 4, 6).await.unwrap();
        assert_eq!(fresh.len(), 4);
        assert!(fresh.iter().all(|c| c.len() == 6));
        assert_eq!(service.get_backup_codes_count(user_id).await, 4);

        let all = service.repo.as_ref().unwrap().list_codes(user_id).await.unwrap();
        assert_eq!(all.iter().filter(|c| c.used).count(), 1);

        // Old unused codes are gone.
        assert!(!service.verify_2fa(user_id, &setup.backup_codes[1]).await.is_valid);
    }

    #[tokio::test]
    async fn disable_clears_everything() {
        let service = TwoFactorService::new(MemoryRepo::default(), TotpConfig::default());
        let user_id = Uuid::new_v4();
        let setup = enrolled(&service, user_id).await;

        assert!(service.disable_2fa(user_id).await);
        assert!(!service.is_2fa_enabled(user_id).await);
        assert_eq!(service.get_backup_codes_count(user_id).await, 0);
        assert!(!service.verify_2fa(user_id, &current_code(&setup.secret)).await.is_valid);
    }

    #[tokio::test]
    async fn storage_failures_are_soft_except_regeneration() {
        let service = TwoFactorService::new(MemoryRepo::failing(), TotpConfig::default());
        let user_id = Uuid::new_v4();
        let setup = service.generate_totp_secret(user_id, "a@example.com").unwrap();

        let enabled = service
            .enable_2fa(user_id, &setup.secret, &current_code(&setup.secret), setup.backup_codes)
            .await
            .unwrap();
        assert!(!enabled);
        assert!(!service.disable_2fa(user_id).await);
        assert!(!service.is_2fa_enabled(user_id).await);
        assert_eq!(service.get_backup_codes_count(user_id).await, 0);
        assert_eq!(service.verify_2fa(user_id, "123456").await, VerifyOutcome::invalid());

        let err = service.generate_new_backup_codes(user_id).await.unwrap_err();
        assert!(matches!(err, BastionError::Database(_)));
    }

    #[tokio::test]
    async fn unavailable_service_reports_off() {
        let service: TwoFactorService<MemoryRepo> = TwoFactorService::unavailable(TotpConfig::default());
        let user_id = Uuid::new_v4();

        assert!(!service.is_2fa_enabled(user_id).await);
        assert!(!service.disable_2fa(user_id).await);
        assert_eq!(service.get_backup_codes_count(user_id).await, 0);
        assert!(!service.verify_2fa(user_id, "123456").await.is_valid);
        assert!(matches!(
            service.enable_2fa(user_id, "JBSWY3DPEHPK3PXP", "123456", vec![]).await,
            Err(BastionError::Configuration(_))
        ));
        assert!(matches!(
            service.generate_new_backup_codes(user_id).await,
            Err(BastionError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn impossible_backup_batches_are_rejected() {
        let service = TwoFactorService::new(MemoryRepo::default(), TotpConfig::default());
        let user_id = Uuid::new_v4();
        enrolled(&service, user_id).await;

        let err = service
            .generate_new_backup_codes_with(user_id, 37, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, BastionError::Validation { .. }));
        assert_eq!(service.get_backup_codes_count(user_id).await, 10);

        let tight = TwoFactorService::new(
            MemoryRepo::default(),
            TotpConfig {
                backup_codes_count: 37,
                backup_code_length: 1,
                ..TotpConfig::default()
            },
        );
        assert!(matches!(
            tight.generate_totp_secret(user_id, "a@example.com"),
            Err(BastionError::Validation { .. })
        ));
    }

    #[test]
    fn invalid_outcome_serializes_flag_only() {
        let json = serde_json::to_string(&VerifyOutcome::invalid()).unwrap();
        assert_eq!(json, r#"{"isValid":false}"#);
    }
}
