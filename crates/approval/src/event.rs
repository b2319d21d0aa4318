use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retailops_core::{EntityId, TenantId, UserId};
use retailops_events::Event;

use crate::instance::{ApprovalInstance, ApprovalState};
use crate::kind::EntityKind;

/// Event: ApprovalDecided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecided {
    pub tenant_id: TenantId,
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub state: ApprovalState,
    pub decided_by: Option<UserId>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ApprovalExpired (escalation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalExpired {
    pub tenant_id: TenantId,
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub deadline_at: Option<DateTime<Utc>>,
    /// Set when a late decision triggered the expiry rather than the sweeper.
    pub late_decision_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalEvent {
    Decided(ApprovalDecided),
    Expired(ApprovalExpired),
}

impl ApprovalEvent {
    /// Event for an instance that has just left Pending.
    pub fn for_resolved(instance: &ApprovalInstance, late_decision_by: Option<UserId>) -> Option<Self> {
        let at = instance.decided_at?;
        match instance.state {
            ApprovalState::Pending => None,
            ApprovalState::Expired => Some(ApprovalEvent::Expired(ApprovalExpired {
                tenant_id: instance.tenant_id,
                kind: instance.kind,
                entity_id: instance.entity_id,
                deadline_at: instance.deadline_at,
                late_decision_by,
                occurred_at: at,
            })),
            state => Some(ApprovalEvent::Decided(ApprovalDecided {
                tenant_id: instance.tenant_id,
                kind: instance.kind,
                entity_id: instance.entity_id,
                state,
                decided_by: instance.decided_by,
                reason: instance.reason.clone(),
                occurred_at: at,
            })),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            ApprovalEvent::Decided(e) => e.tenant_id,
            ApprovalEvent::Expired(e) => e.tenant_id,
        }
    }

    pub fn is_escalation(&self) -> bool {
        matches!(self, ApprovalEvent::Expired(_))
    }
}

impl Event for ApprovalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ApprovalEvent::Decided(_) => "approval.instance.decided",
            ApprovalEvent::Expired(_) => "approval.instance.expired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ApprovalEvent::Decided(e) => e.occurred_at,
            ApprovalEvent::Expired(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{ApprovalKey, Resolution};

    #[test]
    fn expired_instances_escalate() {
        let now = Utc::now();
        let mut inst = ApprovalInstance::submit(
            ApprovalKey::new(TenantId::new(), EntityKind::CashCollection, EntityId::new()),
            UserId::new(),
            EntityKind::CashCollection.fixed_window(),
            now,
        )
        .unwrap();
        assert!(ApprovalEvent::for_resolved(&inst, None).is_none());

        inst.apply(&Resolution::expired(now)).unwrap();
        let event = ApprovalEvent::for_resolved(&inst, None).unwrap();
        assert!(event.is_escalation());
        assert_eq!(event.event_type(), "approval.instance.expired");
    }
}
