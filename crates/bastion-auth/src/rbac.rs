//! Role-based access control.
//!
//! Permissions reach a user only through roles. Every lookup is made in
//! exactly one scope: an organization id, or `None` for system-wide roles.
//! A holder of the system-wide `super-admin` role passes every check
//! before any scoped lookup happens.
//!
//! Reads never fail. A persistence error is logged and the read returns
//! empty or `false`, so an outage denies access rather than granting it.

use std::collections::HashSet;
use std::sync::Arc;

use bastion_core::capability::{AuditSink, NoopAuditSink, SessionStore};
use bastion_core::context::RequestContext;
use bastion_core::error::{BastionError, BastionResult};
use bastion_core::models::audit::{AuditEvent, AuditOutcome};
use bastion_core::models::permission::{Permission, PermissionCheck};
use bastion_core::models::role::{Role, RoleWithPermissions};
use bastion_core::models::session::{RbacUser, SessionUser, SessionWithRbac};
use bastion_core::repository::{PermissionRepository, RoleRepository};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RbacConfig;

pub const DEFAULT_PERMISSION_MESSAGE: &str = "Insufficient permissions";
pub const DEFAULT_ROLE_MESSAGE: &str = "Insufficient role privileges";

/// Overrides for the denial raised by a `require_*` guard.
#[derive(Debug, Clone, Default)]
pub struct RequireOptions {
    pub message: Option<String>,
    pub status: Option<u16>,
}

impl RequireOptions {
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    fn denial(&self, default_message: &str) -> BastionError {
        BastionError::AuthorizationDenied {
            message: self
                .message
                .clone()
                .unwrap_or_else(|| default_message.to_string()),
            status: self.status.unwrap_or(403),
        }
    }
}

/// RBAC service.
///
/// Generic over repository and session implementations so that the auth
/// layer has no dependency on the database crate.
pub struct RbacService<R: RoleRepository, P: PermissionRepository, S: SessionStore> {
    roles: R,
    permissions: P,
    sessions: S,
    config: RbacConfig,
    audit: Arc<dyn AuditSink>,
}

impl<R: RoleRepository, P: PermissionRepository, S: SessionStore> RbacService<R, P, S> {
    pub fn new(roles: R, permissions: P, sessions: S, config: RbacConfig) -> Self {
        Self {
            roles,
            permissions,
            sessions,
            config,
            audit: Arc::new(NoopAuditSink),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    // -----------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------

    async fn scoped_roles(&self, user_id: Uuid, organization_id: Option<Uuid>) -> Vec<Role> {
        match self.roles.get_user_roles(user_id, organization_id).await {
            Ok(roles) => roles,
            Err(e) => {
                warn!(%user_id, organization_id = ?organization_id, error = %e, "Role lookup failed");
                Vec::new()
            }
        }
    }

    /// Roles held in one scope, each with its permissions.
    pub async fn get_user_roles(
        &self,
        user_id: Uuid,
        organization_id: Option<Uuid>,
    ) -> Vec<RoleWithPermissions> {
        let mut resolved = Vec::new();
        for role in self.scoped_roles(user_id, organization_id).await {
            let permissions = match self.permissions.get_role_permissions(role.id).await {
                Ok(permissions) => dedup_by_id(permissions),
                Err(e) => {
                    warn!(%user_id, role = %role.slug, error = %e, "Permission lookup failed");
                    return Vec::new();
                }
            };
            resolved.push(RoleWithPermissions { role, permissions });
        }
        resolved
    }

    /// Union of the permissions of every role held in one scope.
    pub async fn get_user_permissions(
        &self,
        user_id: Uuid,
        organization_id: Option<Uuid>,
    ) -> Vec<Permission> {
        let all = self
            .get_user_roles(user_id, organization_id)
            .await
            .into_iter()
            .flat_map(|r| r.permissions)
            .collect();
        dedup_by_id(all)
    }

    /// Whether the user holds the system-wide `super-admin` role.
    ///
    /// Answers are cached in `ctx` for the rest of the request.
    pub async fn is_super_admin(&self, ctx: &RequestContext, user_id: Uuid) -> bool {
        if let Some(cached) = ctx.cached_super_admin(user_id) {
            return cached;
        }
        let is_super_admin = self
            .scoped_roles(user_id, None)
            .await
            .iter()
            .any(Role::is_super_admin);
        ctx.cache_super_admin(user_id, is_super_admin);
        is_super_admin
    }

    // -----------------------------------------------------------------
    // Checks
    // -----------------------------------------------------------------

    pub async fn has_permission(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        check: impl Into<PermissionCheck>,
        organization_id: Option<Uuid>,
    ) -> bool {
        let check = check.into();
        if !self.config.enabled || self.is_super_admin(ctx, user_id).await {
            return true;
        }
        self.get_user_permissions(user_id, organization_id)
            .await
            .iter()
            .any(|p| check.matches(p))
    }

    /// True if any check passes. An empty list is false.
    pub async fn has_any_permission(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        checks: &[PermissionCheck],
        organization_id: Option<Uuid>,
    ) -> bool {
        if !self.config.enabled || self.is_super_admin(ctx, user_id).await {
            return true;
        }
        let held = self.get_user_permissions(user_id, organization_id).await;
        checks.iter().any(|c| held.iter().any(|p| c.matches(p)))
    }

    /// True if every check passes. An empty list is true.
    pub async fn has_all_permissions(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        checks: &[PermissionCheck],
        organization_id: Option<Uuid>,
    ) -> bool {
        if !self.config.enabled || self.is_super_admin(ctx, user_id).await {
            return true;
        }
        let held = self.get_user_permissions(user_id, organization_id).await;
        checks.iter().all(|c| held.iter().any(|p| c.matches(p)))
    }

    pub async fn has_role(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        role_slug: &str,
        organization_id: Option<Uuid>,
    ) -> bool {
        if !self.config.enabled || self.is_super_admin(ctx, user_id).await {
            return true;
        }
        self.scoped_roles(user_id, organization_id)
            .await
            .iter()
            .any(|r| r.slug == role_slug)
    }

    // -----------------------------------------------------------------
    // Guards
    // -----------------------------------------------------------------

    async fn session_user(&self, ctx: &RequestContext) -> BastionResult<SessionUser> {
        let session = self.sessions.get_session(&ctx.request).await.map_err(|e| {
            debug!(error = %e, "Session lookup failed");
            BastionError::AuthenticationFailed {
                reason: "session unavailable".into(),
            }
        })?;
        session.user.ok_or_else(|| BastionError::AuthenticationFailed {
            reason: "no session user".into(),
        })
    }

    /// Pass only if the session user holds `check` in the request's tenant.
    pub async fn require_permission(
        &self,
        ctx: &RequestContext,
        check: impl Into<PermissionCheck>,
        options: Option<RequireOptions>,
    ) -> BastionResult<SessionUser> {
        let check = check.into();
        let user = self.session_user(ctx).await?;
        let organization_id = ctx.organization_id();

        if self
            .has_permission(ctx, user.id, check.clone(), organization_id)
            .await
        {
            return Ok(user);
        }

        warn!(user_id = %user.id, organization_id = ?organization_id, permission = %check, "Permission denied");
        self.audit.emit(
            AuditEvent::new("rbac.permission.denied", AuditOutcome::Denied)
                .actor(user.id)
                .organization(organization_id)
                .metadata(serde_json::json!({ "permission": check.to_string() })),
        );
        Err(options
            .unwrap_or_default()
            .denial(DEFAULT_PERMISSION_MESSAGE))
    }

    /// Pass only if the session user holds `role_slug` in the request's
    /// tenant.
    pub async fn require_role(
        &self,
        ctx: &RequestContext,
        role_slug: &str,
        options: Option<RequireOptions>,
    ) -> BastionResult<SessionUser> {
        let user = self.session_user(ctx).await?;
        let organization_id = ctx.organization_id();

        if self
            .has_role(ctx, user.id, role_slug, organization_id)
            .await
        {
            return Ok(user);
        }

        warn!(user_id = %user.id, organization_id = ?organization_id, role = %role_slug, "Role denied");
        self.audit.emit(
            AuditEvent::new("rbac.role.denied", AuditOutcome::Denied)
                .actor(user.id)
                .organization(organization_id)
                .metadata(serde_json::json!({ "role": role_slug })),
        );
        Err(options.unwrap_or_default().denial(DEFAULT_ROLE_MESSAGE))
    }

    // -----------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------

    async fn find_role(&self, role_slug: &str, organization_id: Option<Uuid>) -> Option<Role> {
        match self.roles.get_by_slug(organization_id, role_slug).await {
            Ok(role) => Some(role),
            Err(BastionError::NotFound { .. }) => None,
            Err(e) => {
                warn!(role = %role_slug, organization_id = ?organization_id, error = %e, "Role lookup failed");
                None
            }
        }
    }

    /// Give `user_id` the role `role_slug` of one scope.
    ///
    /// True if the user holds the role afterwards, including when they
    /// already did. False for an unknown slug or a failed write.
    pub async fn assign_role(
        &self,
        user_id: Uuid,
        role_slug: &str,
        organization_id: Option<Uuid>,
        assigned_by: Option<Uuid>,
    ) -> bool {
        let Some(role) = self.find_role(role_slug, organization_id).await else {
            return false;
        };

        match self.roles.assign_to_user(user_id, role.id, assigned_by).await {
            Ok(created) => {
                if created {
                    info!(%user_id, role = %role_slug, organization_id = ?organization_id, "Role assigned");
                    let mut event = AuditEvent::new("rbac.role.assigned", AuditOutcome::Success)
                        .organization(organization_id)
                        .metadata(serde_json::json!({
                            "user_id": user_id,
                            "role": role_slug,
                        }));
                    if let Some(actor) = assigned_by {
                        event = event.actor(actor);
                    }
                    self.audit.emit(event);
                }
                true
            }
            Err(e) => {
                warn!(%user_id, role = %role_slug, error = %e, "Role assignment failed");
                false
            }
        }
    }

    /// Take the role `role_slug` of one scope away from `user_id`.
    ///
    /// True if the user no longer holds it. False for an unknown slug or a
    /// failed write.
    pub async fn remove_role(
        &self,
        user_id: Uuid,
        role_slug: &str,
        organization_id: Option<Uuid>,
        removed_by: Option<Uuid>,
    ) -> bool {
        let Some(role) = self.find_role(role_slug, organization_id).await else {
            return false;
        };

        match self.roles.unassign_from_user(user_id, role.id).await {
            Ok(removed) => {
                if removed {
                    info!(%user_id, role = %role_slug, organization_id = ?organization_id, "Role removed");
                    let mut event = AuditEvent::new("rbac.role.removed", AuditOutcome::Success)
                        .organization(organization_id)
                        .metadata(serde_json::json!({
                            "user_id": user_id,
                            "role": role_slug,
                        }));
                    if let Some(actor) = removed_by {
                        event = event.actor(actor);
                    }
                    self.audit.emit(event);
                }
                true
            }
            Err(e) => {
                warn!(%user_id, role = %role_slug, error = %e, "Role removal failed");
                false
            }
        }
    }

    /// Assign `rbac.default_role`, if configured. False when unset.
    pub async fn assign_default_role(&self, user_id: Uuid, organization_id: Option<Uuid>) -> bool {
        match &self.config.default_role {
            Some(slug) => self.assign_role(user_id, slug, organization_id, None).await,
            None => false,
        }
    }

    // -----------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------

    /// The session of the request, with roles and permissions of the
    /// current tenant scope attached.
    pub async fn get_user_session_with_rbac(&self, ctx: &RequestContext) -> SessionWithRbac {
        let user = match self.sessions.get_session(&ctx.request).await {
            Ok(session) => session.user,
            Err(e) => {
                debug!(error = %e, "Session lookup failed");
                None
            }
        };
        let Some(user) = user else {
            return SessionWithRbac::anonymous();
        };

        let organization_id = ctx.organization_id();
        let is_super_admin = self.is_super_admin(ctx, user.id).await;
        let roles = self.get_user_roles(user.id, organization_id).await;
        let permissions = dedup_by_id(
            roles
                .iter()
                .flat_map(|r| r.permissions.iter().cloned())
                .collect(),
        );

        SessionWithRbac {
            user: Some(RbacUser {
                user,
                is_super_admin,
            }),
            roles,
            permissions,
        }
    }
}

fn dedup_by_id(permissions: Vec<Permission>) -> Vec<Permission> {
    let mut seen = HashSet::new();
    permissions
        .into_iter()
        .filter(|p| seen.insert(p.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn permission(slug: &str) -> Permission {
        let (resource, action) = slug.split_once('.').unwrap();
        Permission {
            id: Uuid::new_v4(),
            slug: slug.into(),
            resource: resource.into(),
            action: action.into(),
            description: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let a = permission("users.read");
        let b = permission("users.write");
        let out = dedup_by_id(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(out, vec![a, b]);
    }

    #[test]
    fn denial_defaults_and_overrides() {
        let err = RequireOptions::default().denial(DEFAULT_PERMISSION_MESSAGE);
        assert_eq!(err.to_string(), "Insufficient permissions");
        assert_eq!(err.status_code(), 403);

        let err = RequireOptions::default()
            .message("Not found")
            .status(404)
            .denial(DEFAULT_ROLE_MESSAGE);
        assert_eq!(err.to_string(), "Not found");
        assert_eq!(err.status_code(), 404);
    }
}
