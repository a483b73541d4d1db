//! Domain models for Bastion.
//!
//! These are the core types shared across all crates.

pub mod audit;
pub mod organization;
pub mod permission;
pub mod recovery_code;
pub mod role;
pub mod session;
pub mod user;
