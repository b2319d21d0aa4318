//! Approval workflow engine.
//!
//! Every transition out of Pending is a compare-and-swap on the instance
//! (`ApprovalStore::transition`). Foreground decisions and the deadline sweep
//! share it, so for any instance exactly one terminal state is ever recorded.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use retailops_approval::{
    ApprovalEvent, ApprovalInstance, ApprovalKey, ApprovalTransition, DeadlinePolicy, Decision,
    EntityKind, Outcome, Resolution,
};
use retailops_core::{DomainError, EntityId, TenantId, UserId};

use crate::error::ApprovalError;
use crate::hooks::ApprovalNotifier;
use crate::store::{ApprovalStore, CasResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitApproval {
    pub tenant_id: TenantId,
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub submitted_by: UserId,
    /// Requested window; ignored for kinds with a fixed window.
    pub deadline_window: Option<Duration>,
    pub occurred_at: DateTime<Utc>,
}

impl SubmitApproval {
    pub fn key(&self) -> ApprovalKey {
        ApprovalKey::new(self.tenant_id, self.kind, self.entity_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideApproval {
    pub tenant_id: TenantId,
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub decision: Decision,
    pub actor_id: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl DecideApproval {
    pub fn key(&self) -> ApprovalKey {
        ApprovalKey::new(self.tenant_id, self.kind, self.entity_id)
    }
}

/// Summary of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Overdue candidates found.
    pub scanned: usize,
    /// Instances this pass moved to Expired.
    pub expired: usize,
    /// Candidates resolved by someone else in the meantime.
    pub skipped: usize,
    pub notify_failures: usize,
}

/// Pending instance as shown in approval queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub instance: ApprovalInstance,
    pub state_label: String,
    pub minutes_remaining: Option<i64>,
    pub is_overdue: bool,
}

impl PendingApproval {
    fn at(instance: ApprovalInstance, now: DateTime<Utc>) -> Self {
        Self {
            state_label: instance.state_label().to_string(),
            minutes_remaining: instance.minutes_remaining(now),
            is_overdue: instance.is_overdue(now),
            instance,
        }
    }
}

pub struct ApprovalEngine<S, N> {
    store: S,
    notifier: N,
    policy: DeadlinePolicy,
}

impl<S, N> ApprovalEngine<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            store,
            notifier,
            policy: DeadlinePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DeadlinePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, N> ApprovalEngine<S, N>
where
    S: ApprovalStore,
    N: ApprovalNotifier,
{
    #[instrument(
        name = "approval.submit",
        skip(self, cmd),
        fields(tenant_id = %cmd.tenant_id, entity_kind = %cmd.kind, entity_id = %cmd.entity_id)
    )]
    pub fn submit(&self, cmd: &SubmitApproval) -> Result<ApprovalInstance, ApprovalError> {
        let window = self.policy.window_for(cmd.kind, cmd.deadline_window)?;
        let instance = ApprovalInstance::submit(cmd.key(), cmd.submitted_by, window, cmd.occurred_at)?;
        self.store.insert(instance.clone())?;
        debug!(deadline_at = ?instance.deadline_at, "approval submitted");
        Ok(instance)
    }

    /// Approve or reject a pending instance.
    ///
    /// A decision after the deadline expires the instance and fails with
    /// `DeadlinePassed`; the decision itself is not recorded.
    #[instrument(
        name = "approval.decide",
        skip(self, cmd),
        fields(tenant_id = %cmd.tenant_id, entity_kind = %cmd.kind, entity_id = %cmd.entity_id, decision = ?cmd.decision)
    )]
    pub fn decide(&self, cmd: &DecideApproval) -> Result<ApprovalInstance, ApprovalError> {
        let key = cmd.key();
        let instance = self
            .store
            .get(&key)?
            .ok_or_else(|| DomainError::not_found(format!("approval {key}")))?;

        let outcome = instance.evaluate(cmd.decision, cmd.actor_id, cmd.reason.as_deref(), cmd.occurred_at)?;
        let late = matches!(outcome, Outcome::Expired(_));
        let transition = ApprovalTransition {
            key,
            resolution: outcome.into_resolution(),
        };

        match self.store.transition(&transition)? {
            CasResult::Applied(resolved) if late => {
                warn!(deadline_at = ?resolved.deadline_at, "decision arrived after the deadline; instance expired");
                self.notify(&resolved, Some(cmd.actor_id));
                Err(DomainError::DeadlinePassed.into())
            }
            CasResult::Applied(resolved) => {
                info!(state = %resolved.state, "approval decided");
                self.notify(&resolved, None);
                Ok(resolved)
            }
            CasResult::Stale(current) => {
                warn!(state = %current.state, "approval resolved concurrently");
                Err(DomainError::already_decided(current.state).into())
            }
            CasResult::Missing => Err(DomainError::not_found(format!("approval {key}")).into()),
        }
    }

    /// Expire every pending instance whose deadline is before `now`.
    ///
    /// Instances resolved concurrently are skipped; each instance expired by
    /// this pass produces exactly one escalation signal.
    #[instrument(name = "approval.sweep", skip(self))]
    pub fn sweep(
        &self,
        now: DateTime<Utc>,
        tenant_id: Option<TenantId>,
        batch_size: usize,
    ) -> Result<SweepReport, ApprovalError> {
        let candidates = self.store.overdue(tenant_id, now, batch_size)?;
        let mut report = SweepReport {
            scanned: candidates.len(),
            ..SweepReport::default()
        };

        for key in candidates {
            let transition = ApprovalTransition {
                key,
                resolution: Resolution::expired(now),
            };
            match self.store.transition(&transition)? {
                CasResult::Applied(expired) => {
                    report.expired += 1;
                    if !self.notify(&expired, None) {
                        report.notify_failures += 1;
                    }
                }
                CasResult::Stale(_) | CasResult::Missing => report.skipped += 1,
            }
        }

        if report.expired > 0 {
            info!(expired = report.expired, skipped = report.skipped, "approvals expired");
        }
        Ok(report)
    }

    pub fn get(
        &self,
        tenant_id: TenantId,
        kind: EntityKind,
        entity_id: EntityId,
    ) -> Result<Option<ApprovalInstance>, ApprovalError> {
        Ok(self.store.get(&ApprovalKey::new(tenant_id, kind, entity_id))?)
    }

    /// Pending instances of a tenant, oldest submission first.
    pub fn list_pending(&self, tenant_id: TenantId, now: DateTime<Utc>) -> Result<Vec<PendingApproval>, ApprovalError> {
        Ok(self
            .store
            .pending(tenant_id)?
            .into_iter()
            .map(|i| PendingApproval::at(i, now))
            .collect())
    }

    fn notify(&self, instance: &ApprovalInstance, late_decision_by: Option<UserId>) -> bool {
        let Some(event) = ApprovalEvent::for_resolved(instance, late_decision_by) else {
            return true;
        };
        match self.notifier.notify(&event) {
            Ok(()) => true,
            Err(e) => {
                warn!(approval = %instance.key(), error = %e, "approval notification failed");
                false
            }
        }
    }
}
