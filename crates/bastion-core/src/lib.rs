//! Bastion Core — domain models, error taxonomy, request context, and the
//! persistence and collaborator traits every other crate builds on.

pub mod capability;
pub mod context;
pub mod error;
pub mod models;
pub mod repository;

pub use context::{RequestContext, RequestInfo, TenantContext, TenantStrategy};
pub use error::{BastionError, BastionResult};
