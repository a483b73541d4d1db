//! SurrealDB repository implementations.

mod audit;
mod organization;
mod permission;
mod role;
mod two_factor;
mod user;

pub use audit::{SurrealAuditLogRepository, SurrealAuditSink};
pub use organization::SurrealOrganizationRepository;
pub use permission::SurrealPermissionRepository;
pub use role::SurrealRoleRepository;
pub use two_factor::SurrealTwoFactorRepository;
pub use user::SurrealUserRepository;
