//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Organization-scoped lookups take
//! an `Option<Uuid>`: `Some(id)` matches rows of that organization only,
//! `None` matches system-wide rows only. The two are never combined.
//!
//! Methods documented as atomic must apply all of their writes or none.

use uuid::Uuid;

use crate::error::BastionResult;
use crate::models::{
    audit::{AuditEvent, AuditLogEntry},
    organization::{CreateOrganization, Organization, UpdateOrganization},
    permission::{CreatePermission, Permission},
    recovery_code::{RecoveryCode, TwoFactorState},
    role::{CreateRole, Role, RoleAssignment, UpdateRole},
    user::{CreateUser, UpdateUser, User},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Organizations
// ---------------------------------------------------------------------------

pub trait OrganizationRepository: Send + Sync {
    fn create(
        &self,
        input: CreateOrganization,
    ) -> impl Future<Output = BastionResult<Organization>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = BastionResult<Organization>> + Send;
    fn get_by_slug(&self, slug: &str)
    -> impl Future<Output = BastionResult<Organization>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateOrganization,
    ) -> impl Future<Output = BastionResult<Organization>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = BastionResult<()>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = BastionResult<PaginatedResult<Organization>>> + Send;
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = BastionResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = BastionResult<User>> + Send;
    /// Email is unique per organization scope.
    fn get_by_email(
        &self,
        organization_id: Option<Uuid>,
        email: &str,
    ) -> impl Future<Output = BastionResult<User>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateUser,
    ) -> impl Future<Output = BastionResult<User>> + Send;
    /// Hard delete, including role assignments and recovery codes.
    fn delete(&self, id: Uuid) -> impl Future<Output = BastionResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Roles & permissions
// ---------------------------------------------------------------------------

pub trait RoleRepository: Send + Sync {
    fn create(&self, input: CreateRole) -> impl Future<Output = BastionResult<Role>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = BastionResult<Role>> + Send;
    fn get_by_slug(
        &self,
        organization_id: Option<Uuid>,
        slug: &str,
    ) -> impl Future<Output = BastionResult<Role>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateRole,
    ) -> impl Future<Output = BastionResult<Role>> + Send;
    fn list(
        &self,
        organization_id: Option<Uuid>,
    ) -> impl Future<Output = BastionResult<Vec<Role>>> + Send;

    /// Atomically assign a role unless the pair already exists.
    ///
    /// Returns `true` if a new assignment was written, `false` if the user
    /// already held the role.
    fn assign_to_user(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> impl Future<Output = BastionResult<bool>> + Send;

    /// Remove an assignment. Returns `true` if a row was deleted.
    fn unassign_from_user(
        &self,
        user_id: Uuid,
        role_id: Uuid,
    ) -> impl Future<Output = BastionResult<bool>> + Send;

    /// Roles held by a user within one organization scope.
    fn get_user_roles(
        &self,
        user_id: Uuid,
        organization_id: Option<Uuid>,
    ) -> impl Future<Output = BastionResult<Vec<Role>>> + Send;

    /// Raw `UserRole` records of a user, across all scopes.
    fn get_user_assignments(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = BastionResult<Vec<RoleAssignment>>> + Send;
}

pub trait PermissionRepository: Send + Sync {
    fn create(
        &self,
        input: CreatePermission,
    ) -> impl Future<Output = BastionResult<Permission>> + Send;
    fn get_by_slug(&self, slug: &str) -> impl Future<Output = BastionResult<Permission>> + Send;
    fn list(&self) -> impl Future<Output = BastionResult<Vec<Permission>>> + Send;

    /// Grant a permission to a role. Granting twice is a no-op.
    fn grant_to_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> impl Future<Output = BastionResult<()>> + Send;

    /// Revoke a permission from a role.
    fn revoke_from_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> impl Future<Output = BastionResult<()>> + Send;

    /// Get all permissions granted to a role.
    fn get_role_permissions(
        &self,
        role_id: Uuid,
    ) -> impl Future<Output = BastionResult<Vec<Permission>>> + Send;
}

// ---------------------------------------------------------------------------
// Two-factor state & recovery codes
// ---------------------------------------------------------------------------

pub trait TwoFactorRepository: Send + Sync {
    fn get_state(&self, user_id: Uuid) -> impl Future<Output = BastionResult<TwoFactorState>> + Send;

    /// Atomic: set the flag and secret, delete every existing recovery code,
    /// insert `codes` as unused.
    fn enable(
        &self,
        user_id: Uuid,
        secret: String,
        codes: Vec<String>,
    ) -> impl Future<Output = BastionResult<()>> + Send;

    /// Atomic: clear the flag and secret, delete every recovery code.
    fn disable(&self, user_id: Uuid) -> impl Future<Output = BastionResult<()>> + Send;

    /// Atomic: delete unused codes, insert `codes`. Used codes are kept.
    /// `NotFound` for an unknown user, a validation error when 2FA is off.
    fn replace_unused_codes(
        &self,
        user_id: Uuid,
        codes: Vec<String>,
    ) -> impl Future<Output = BastionResult<()>> + Send;

    /// Find an unused code of this user with exactly this value.
    fn find_unused_code(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> impl Future<Output = BastionResult<Option<RecoveryCode>>> + Send;

    /// Mark a code used, only if it is still unused. Returns `true` if this
    /// call consumed it.
    fn consume_code(&self, code_id: Uuid) -> impl Future<Output = BastionResult<bool>> + Send;

    fn count_unused(&self, user_id: Uuid) -> impl Future<Output = BastionResult<u64>> + Send;

    /// All codes of a user, used and unused.
    fn list_codes(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = BastionResult<Vec<RecoveryCode>>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

/// Query filters for audit log entries.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub actor_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub action: Option<String>,
}

pub trait AuditLogRepository: Send + Sync {
    /// Append a new audit log entry. No update or delete operations exist.
    fn append(
        &self,
        input: AuditEvent,
    ) -> impl Future<Output = BastionResult<AuditLogEntry>> + Send;
    fn list(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> impl Future<Output = BastionResult<PaginatedResult<AuditLogEntry>>> + Send;
}
