//! Super-admin provisioning at process startup.
//!
//! Credentials come from `SUPER_ADMIN_LOGIN` and `SUPER_ADMIN_PASSWORD`.
//! With neither set the feature is off. Provisioning is idempotent and
//! doubles as credential rotation: a changed password is rehashed on the
//! next start.

use std::sync::Arc;

use bastion_core::capability::{AuditSink, CredentialHasher, NoopAuditSink};
use bastion_core::error::{BastionError, BastionResult};
use bastion_core::models::audit::{AuditEvent, AuditOutcome};
use bastion_core::models::permission::{CreatePermission, Permission};
use bastion_core::models::role::{CreateRole, Role, SUPER_ADMIN_ROLE};
use bastion_core::models::user::{CreateUser, UpdateUser, User};
use bastion_core::repository::{PermissionRepository, RoleRepository, UserRepository};
use tracing::{debug, info};
use uuid::Uuid;

pub const LOGIN_ENV: &str = "SUPER_ADMIN_LOGIN";
pub const PASSWORD_ENV: &str = "SUPER_ADMIN_PASSWORD";
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Cross-tenant permissions held by the super-admin role.
pub const SUPER_ADMIN_PERMISSIONS: [(&str, &str); 4] = [
    ("system.admin", "Full system administration"),
    ("organizations.manage-all", "Manage every organization"),
    ("users.manage-all", "Manage users of every organization"),
    ("audit.view-all", "Read the audit log of every organization"),
];

#[derive(Clone)]
pub struct SuperAdminCredentials {
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for SuperAdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuperAdminCredentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Credentials from the environment. `None` unless both variables are set.
pub fn get_super_admin_credentials() -> Option<SuperAdminCredentials> {
    Some(SuperAdminCredentials {
        login: non_empty_env(LOGIN_ENV)?,
        password: non_empty_env(PASSWORD_ENV)?,
    })
}

/// Read and validate the environment credentials.
///
/// `Ok(None)` when neither variable is set. Setting only one, a short
/// password, or a login that is not an email address is a configuration
/// error.
pub fn validate_super_admin_credentials() -> BastionResult<Option<SuperAdminCredentials>> {
    validate_credentials(non_empty_env(LOGIN_ENV), non_empty_env(PASSWORD_ENV))
}

pub fn validate_credentials(
    login: Option<String>,
    password: Option<String>,
) -> BastionResult<Option<SuperAdminCredentials>> {
    let (login, password) = match (login, password) {
        (None, None) => return Ok(None),
        (Some(login), Some(password)) => (login.trim().to_string(), password),
        (Some(_), None) => {
            return Err(BastionError::Configuration(format!(
                "{LOGIN_ENV} is set but {PASSWORD_ENV} is not; set both or neither"
            )));
        }
        (None, Some(_)) => {
            return Err(BastionError::Configuration(format!(
                "{PASSWORD_ENV} is set but {LOGIN_ENV} is not; set both or neither"
            )));
        }
    };

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(BastionError::Configuration(format!(
            "{PASSWORD_ENV} must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if !looks_like_email(&login) {
        return Err(BastionError::Configuration(format!(
            "{LOGIN_ENV} must be an email address such as admin@example.com"
        )));
    }

    Ok(Some(SuperAdminCredentials { login, password }))
}

/// `local@domain.tld` with no whitespace.
fn looks_like_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        && !domain.ends_with('.')
}

/// Provisions the super-admin permission set, role, and account.
pub struct SuperAdminBootstrap<U, R, P, H>
where
    U: UserRepository,
    R: RoleRepository,
    P: PermissionRepository,
    H: CredentialHasher,
{
    users: U,
    roles: R,
    permissions: P,
    hasher: H,
    audit: Arc<dyn AuditSink>,
}

impl<U, R, P, H> SuperAdminBootstrap<U, R, P, H>
where
    U: UserRepository,
    R: RoleRepository,
    P: PermissionRepository,
    H: CredentialHasher,
{
    pub fn new(users: U, roles: R, permissions: P, hasher: H) -> Self {
        Self {
            users,
            roles,
            permissions,
            hasher,
            audit: Arc::new(NoopAuditSink),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    async fn ensure_permission(&self, slug: &str, description: &str) -> BastionResult<Permission> {
        match self.permissions.get_by_slug(slug).await {
            Ok(permission) => return Ok(permission),
            Err(BastionError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        let input = CreatePermission::from_slug(slug, Some(description.to_string()))
            .ok_or_else(|| BastionError::Internal(format!("malformed permission slug {slug}")))?;
        match self.permissions.create(input).await {
            Ok(permission) => {
                debug!(permission = %slug, "Created permission");
                Ok(permission)
            }
            // Another instance created it first.
            Err(BastionError::AlreadyExists { .. }) => self.permissions.get_by_slug(slug).await,
            Err(e) => Err(e),
        }
    }

    async fn ensure_role(&self) -> BastionResult<Role> {
        match self.roles.get_by_slug(None, SUPER_ADMIN_ROLE).await {
            Ok(role) => return Ok(role),
            Err(BastionError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        let created = self
            .roles
            .create(CreateRole {
                organization_id: None,
                slug: SUPER_ADMIN_ROLE.into(),
                name: "Super Admin".into(),
                description: Some("Unrestricted cross-tenant access".into()),
                is_default: false,
            })
            .await;
        match created {
            Ok(role) => {
                info!(role = SUPER_ADMIN_ROLE, "Created super-admin role");
                Ok(role)
            }
            Err(BastionError::AlreadyExists { .. }) => {
                self.roles.get_by_slug(None, SUPER_ADMIN_ROLE).await
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_user(&self, credentials: &SuperAdminCredentials) -> BastionResult<User> {
        match self.users.get_by_email(None, &credentials.login).await {
            Ok(user) => {
                if self
                    .hasher
                    .verify(&user.password_hash, &credentials.password)
                    .unwrap_or(false)
                {
                    return Ok(user);
                }
                let rotated = self
                    .users
                    .update(
                        user.id,
                        UpdateUser {
                            password_hash: Some(self.hasher.hash(&credentials.password)?),
                            ..Default::default()
                        },
                    )
                    .await?;
                info!(user_id = %rotated.id, "Super-admin password rotated");
                Ok(rotated)
            }
            Err(BastionError::NotFound { .. }) => {
                let user = self
                    .users
                    .create(CreateUser {
                        organization_id: None,
                        email: credentials.login.clone(),
                        name: Some("Super Admin".into()),
                        password_hash: self.hasher.hash(&credentials.password)?,
                    })
                    .await?;
                info!(user_id = %user.id, "Created super-admin user");
                Ok(user)
            }
            Err(e) => Err(e),
        }
    }

    /// Make sure the cross-tenant permission set, the role holding every
    /// existing permission, and the account holding the role all exist. Returns the account id.
    pub async fn ensure_super_admin_exists(
        &self,
        credentials: &SuperAdminCredentials,
    ) -> BastionResult<Uuid> {
        for (slug, description) in SUPER_ADMIN_PERMISSIONS {
            self.ensure_permission(slug, description).await?;
        }

        // Every permission known at startup, the cross-tenant set included.
        let role = self.ensure_role().await?;
        let all = self.permissions.list().await?;
        for permission in &all {
            self.permissions
                .grant_to_role(role.id, permission.id)
                .await?;
        }
        debug!(granted = all.len(), "Super-admin role permissions synced");

        let user = self.ensure_user(credentials).await?;
        let newly_assigned = self.roles.assign_to_user(user.id, role.id, None).await?;

        if newly_assigned {
            info!(user_id = %user.id, "Super-admin provisioned");
            self.audit.emit(
                AuditEvent::new("bootstrap.super_admin.provisioned", AuditOutcome::Success)
                    .actor(user.id),
            );
        } else {
            debug!(user_id = %user.id, "Super-admin already provisioned");
        }
        Ok(user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn neither_variable_disables_the_feature() {
        assert!(validate_credentials(None, None).unwrap().is_none());
    }

    #[test]
    fn half_configured_is_an_error() {
        assert!(matches!(
            validate_credentials(s("admin@example.com"), None),
            Err(BastionError::Configuration(_))
        ));
        assert!(matches!(
            validate_credentials(None, s("long-enough")),
            Err(BastionError::Configuration(_))
        ));
    }

    #[test]
    fn password_must_be_long_enough() {
        let err = validate_credentials(s("admin@example.com"), s("short")).unwrap_err();
        assert!(err.to_string().contains(PASSWORD_ENV));
        assert!(validate_credentials(s("admin@example.com"), s("12345678")).is_ok());
    }

    #[test]
    fn login_must_look_like_email() {
        for bad in ["admin", "admin@", "@example.com", "admin@example", "a b@example.com", "admin@example."] {
            assert!(
                validate_credentials(s(bad), s("long-enough")).is_err(),
                "{bad} should be rejected"
            );
        }
        let creds = validate_credentials(s(" root@example.com "), s("long-enough"))
            .unwrap()
            .unwrap();
        assert_eq!(creds.login, "root@example.com");
    }

    #[test]
    fn env_credentials_need_both_variables() {
        // SAFETY: no other test in this crate touches these variables.
        unsafe {
            std::env::set_var(LOGIN_ENV, "root@example.com");
            std::env::remove_var(PASSWORD_ENV);
        }
        assert!(get_super_admin_credentials().is_none());
        assert!(validate_super_admin_credentials().is_err());

        unsafe { std::env::set_var(PASSWORD_ENV, "long-enough") };
        let creds = get_super_admin_credentials().unwrap();
        assert_eq!(creds.login, "root@example.com");
        assert!(validate_super_admin_credentials().unwrap().is_some());

        unsafe {
            std::env::remove_var(LOGIN_ENV);
            std::env::remove_var(PASSWORD_ENV);
        }
        assert!(validate_super_admin_credentials().unwrap().is_none());
    }

    #[test]
    fn debug_redacts_password() {
        let creds = SuperAdminCredentials {
            login: "root@example.com".into(),
            password: "hunter2hunter2".into(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
