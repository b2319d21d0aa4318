use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use retailops_core::{ApprovalId, DomainError, EntityId, TenantId, UserId};

use crate::kind::EntityKind;

/// Identity of an approval instance: one per (tenant, kind, entity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApprovalKey {
    pub tenant_id: TenantId,
    pub kind: EntityKind,
    pub entity_id: EntityId,
}

impl ApprovalKey {
    pub fn new(tenant_id: TenantId, kind: EntityKind, entity_id: EntityId) -> Self {
        Self {
            tenant_id,
            kind,
            entity_id,
        }
    }
}

impl core::fmt::Display for ApprovalKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind, self.entity_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalState::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalState::Pending => "pending",
            ApprovalState::Approved => "approved",
            ApprovalState::Rejected => "rejected",
            ApprovalState::Expired => "expired",
        }
    }
}

impl core::fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn target(self) -> ApprovalState {
        match self {
            Decision::Approve => ApprovalState::Approved,
            Decision::Reject => ApprovalState::Rejected,
        }
    }
}

/// Terminal outcome written by a single compare-and-swap from Pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub state: ApprovalState,
    pub at: DateTime<Utc>,
    pub actor: Option<UserId>,
    pub reason: Option<String>,
}

impl Resolution {
    pub fn expired(at: DateTime<Utc>) -> Self {
        Self {
            state: ApprovalState::Expired,
            at,
            actor: None,
            reason: Some("deadline passed".to_string()),
        }
    }
}

/// What a decision request resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The decision is honored.
    Decided(Resolution),
    /// The deadline had passed; the instance expires and the caller is told so.
    Expired(Resolution),
}

impl Outcome {
    pub fn resolution(&self) -> &Resolution {
        match self {
            Outcome::Decided(r) | Outcome::Expired(r) => r,
        }
    }

    pub fn into_resolution(self) -> Resolution {
        match self {
            Outcome::Decided(r) | Outcome::Expired(r) => r,
        }
    }
}

/// Conditional write: apply `resolution` only if `key` is still Pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalTransition {
    pub key: ApprovalKey,
    pub resolution: Resolution,
}

/// One workflow record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalInstance {
    pub id: ApprovalId,
    pub tenant_id: TenantId,
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub state: ApprovalState,
    pub submitted_at: DateTime<Utc>,
    pub submitted_by: UserId,
    pub deadline_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<UserId>,
    pub reason: Option<String>,
    pub version: u64,
}

impl ApprovalInstance {
    /// New pending instance; fails when `now + window` is not a representable time.
    pub fn submit(
        key: ApprovalKey,
        submitted_by: UserId,
        window: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let deadline_at = match window {
            Some(w) => Some(
                now.checked_add_signed(w)
                    .ok_or_else(|| DomainError::validation("deadline window out of range"))?,
            ),
            None => None,
        };
        Ok(Self {
            id: ApprovalId::new(),
            tenant_id: key.tenant_id,
            kind: key.kind,
            entity_id: key.entity_id,
            state: ApprovalState::Pending,
            submitted_at: now,
            submitted_by,
            deadline_at,
            decided_at: None,
            decided_by: None,
            reason: None,
            version: 1,
        })
    }

    pub fn key(&self) -> ApprovalKey {
        ApprovalKey::new(self.tenant_id, self.kind, self.entity_id)
    }

    pub fn is_pending(&self) -> bool {
        self.state == ApprovalState::Pending
    }

    /// A decision at `now` is too late.
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.deadline_at.is_some_and(|d| now > d)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.deadline_passed(now)
    }

    /// Whole minutes left before the deadline (0 once passed); `None` without a deadline.
    pub fn minutes_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.deadline_at
            .map(|d| (d - now).num_minutes().max(0))
    }

    /// State label for display; purchases read "received" once approved.
    pub fn state_label(&self) -> &'static str {
        match self.state {
            ApprovalState::Approved => self.kind.approved_label(),
            other => other.as_str(),
        }
    }

    /// Resolve a human decision made at `now`.
    pub fn evaluate(
        &self,
        decision: Decision,
        actor: UserId,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Outcome, DomainError> {
        if self.state.is_terminal() {
            return Err(DomainError::already_decided(self.state));
        }

        // Past the deadline every decision expires the instance, whatever its input.
        if self.deadline_passed(now) {
            return Ok(Outcome::Expired(Resolution::expired(now)));
        }

        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if decision == Decision::Reject && reason.is_none() {
            return Err(DomainError::validation("a rejection requires a reason"));
        }

        Ok(Outcome::Decided(Resolution {
            state: decision.target(),
            at: now,
            actor: Some(actor),
            reason: reason.map(str::to_string),
        }))
    }

    /// Sweep eligibility: pending with `deadline_at < now`.
    pub fn expire_if_overdue(&self, now: DateTime<Utc>) -> Option<Resolution> {
        match self.deadline_at {
            Some(d) if self.is_pending() && d < now => Some(Resolution::expired(now)),
            _ => None,
        }
    }

    /// Apply a terminal resolution. Only valid from Pending.
    pub fn apply(&mut self, resolution: &Resolution) -> Result<(), DomainError> {
        if self.state.is_terminal() {
            return Err(DomainError::already_decided(self.state));
        }
        if !resolution.state.is_terminal() {
            return Err(DomainError::integrity("resolution must be terminal"));
        }
        self.state = resolution.state;
        self.decided_at = Some(resolution.at);
        self.decided_by = resolution.actor;
        self.reason = resolution.reason.clone();
        self.version += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn cash(at: DateTime<Utc>) -> ApprovalInstance {
        ApprovalInstance::submit(
            ApprovalKey::new(TenantId::new(), EntityKind::CashCollection, EntityId::new()),
            UserId::new(),
            EntityKind::CashCollection.fixed_window(),
            at,
        )
        .unwrap()
    }

    #[test]
    fn approve_just_before_deadline() {
        let inst = cash(t0());
        let deadline = inst.deadline_at.unwrap();
        let outcome = inst
            .evaluate(Decision::Approve, UserId::new(), None, deadline - Duration::seconds(1))
            .unwrap();
        assert!(matches!(outcome, Outcome::Decided(Resolution { state: ApprovalState::Approved, .. })));
    }

    #[test]
    fn approve_after_deadline_expires() {
        let inst = cash(t0());
        let deadline = inst.deadline_at.unwrap();
        let outcome = inst
            .evaluate(Decision::Approve, UserId::new(), None, deadline + Duration::seconds(1))
            .unwrap();
        assert!(matches!(outcome, Outcome::Expired(_)));
    }

    #[test]
    fn decision_exactly_at_deadline_is_on_time() {
        let inst = cash(t0());
        let deadline = inst.deadline_at.unwrap();
        let outcome = inst
            .evaluate(Decision::Approve, UserId::new(), None, deadline)
            .unwrap();
        assert!(matches!(outcome, Outcome::Decided(_)));
        assert!(inst.expire_if_overdue(deadline).is_none());
    }

    #[test]
    fn rejection_needs_reason() {
        let inst = cash(t0());
        let err = inst
            .evaluate(Decision::Reject, UserId::new(), Some("   "), t0())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn late_rejection_without_reason_expires() {
        let inst = cash(t0());
        let late = t0() + Duration::minutes(16);
        for reason in [None, Some("  ")] {
            let outcome = inst.evaluate(Decision::Reject, UserId::new(), reason, late).unwrap();
            assert!(matches!(outcome, Outcome::Expired(Resolution { state: ApprovalState::Expired, .. })));
        }
    }

    #[test]
    fn unrepresentable_deadline_is_rejected() {
        let key = ApprovalKey::new(TenantId::new(), EntityKind::Expense, EntityId::new());
        let err = ApprovalInstance::submit(key, UserId::new(), Some(Duration::MAX), t0()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(ApprovalInstance::submit(key, UserId::new(), Some(Duration::days(365)), t0()).is_ok());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut inst = cash(t0());
        inst.apply(&Resolution::expired(t0() + Duration::minutes(20))).unwrap();
        let err = inst
            .evaluate(Decision::Approve, UserId::new(), None, t0())
            .unwrap_err();
        assert_eq!(err, DomainError::already_decided("expired"));
        assert!(inst.apply(&Resolution::expired(t0())).is_err());
        assert_eq!(inst.version, 2);
    }

    #[test]
    fn minutes_remaining_clamps_at_zero() {
        let inst = cash(t0());
        assert_eq!(inst.minutes_remaining(t0() + Duration::minutes(5)), Some(10));
        assert_eq!(inst.minutes_remaining(t0() + Duration::minutes(30)), Some(0));
        assert!(inst.is_overdue(t0() + Duration::minutes(16)));
    }

    #[test]
    fn purchase_reads_received_when_approved() {
        let mut inst = ApprovalInstance::submit(
            ApprovalKey::new(TenantId::new(), EntityKind::Purchase, EntityId::new()),
            UserId::new(),
            None,
            t0(),
        )
        .unwrap();
        assert_eq!(inst.state_label(), "pending");
        let outcome = inst.evaluate(Decision::Approve, UserId::new(), None, t0()).unwrap();
        inst.apply(outcome.resolution()).unwrap();
        assert_eq!(inst.state_label(), "received");
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn late_decisions_never_approve(offset_secs in -1800i64..1800, approve in any::<bool>()) {
            let inst = cash(t0());
            let now = t0() + Duration::minutes(15) + Duration::seconds(offset_secs);
            let decision = if approve { Decision::Approve } else { Decision::Reject };
            let outcome = inst.evaluate(decision, UserId::new(), Some("checked"), now).unwrap();
            match outcome {
                Outcome::Decided(_) => prop_assert!(offset_secs <= 0),
                Outcome::Expired(r) => {
                    prop_assert!(offset_secs > 0);
                    prop_assert_eq!(r.state, ApprovalState::Expired);
                }
            }
        }
    }
}
