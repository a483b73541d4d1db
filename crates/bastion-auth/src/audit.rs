//! Audit sink that writes events to the `tracing` pipeline.

use bastion_core::capability::AuditSink;
use bastion_core::models::audit::{AuditEvent, AuditOutcome};
use tracing::{info, warn};

/// Emits each audit event as a structured log line on the
/// `bastion::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let actor_id = event.actor_id.map(|id| id.to_string());
        let organization_id = event.organization_id.map(|id| id.to_string());
        match event.outcome {
            AuditOutcome::Success => info!(
                target: "bastion::audit",
                action = %event.action,
                outcome = event.outcome.as_str(),
                actor_id = actor_id.as_deref(),
                organization_id = organization_id.as_deref(),
                metadata = %event.metadata,
                "audit"
            ),
            AuditOutcome::Failure | AuditOutcome::Denied => warn!(
                target: "bastion::audit",
                action = %event.action,
                outcome = event.outcome.as_str(),
                actor_id = actor_id.as_deref(),
                organization_id = organization_id.as_deref(),
                metadata = %event.metadata,
                "audit"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn emit_never_panics_without_subscriber() {
        let sink = TracingAuditSink;
        sink.emit(AuditEvent::new("rbac.role.assigned", AuditOutcome::Success).actor(Uuid::new_v4()));
        sink.emit(
            AuditEvent::new("rbac.permission.denied", AuditOutcome::Denied)
                .organization(Some(Uuid::new_v4()))
                .metadata(serde_json::json!({ "permission": "users.manage" })),
        );
    }
}
