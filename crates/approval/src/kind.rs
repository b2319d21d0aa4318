use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use retailops_core::DomainError;

/// Fixed decision window for cash collections.
pub const CASH_COLLECTION_WINDOW_MINUTES: i64 = 15;

/// Kind of business entity an approval instance governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    SaleBatch,
    SaleReturn,
    DailySales,
    Expense,
    CashCollection,
    Purchase,
    StockCount,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::SaleBatch,
        EntityKind::SaleReturn,
        EntityKind::DailySales,
        EntityKind::Expense,
        EntityKind::CashCollection,
        EntityKind::Purchase,
        EntityKind::StockCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::SaleBatch => "sale_batch",
            EntityKind::SaleReturn => "sale_return",
            EntityKind::DailySales => "daily_sales",
            EntityKind::Expense => "expense",
            EntityKind::CashCollection => "cash_collection",
            EntityKind::Purchase => "purchase",
            EntityKind::StockCount => "stock_count",
        }
    }

    /// Window that cannot be overridden by configuration or callers.
    pub fn fixed_window(&self) -> Option<Duration> {
        match self {
            EntityKind::CashCollection => Some(Duration::minutes(CASH_COLLECTION_WINDOW_MINUTES)),
            _ => None,
        }
    }

    /// Display label for the approved state; a purchase that is approved has been received.
    pub fn approved_label(&self) -> &'static str {
        match self {
            EntityKind::Purchase => "received",
            _ => "approved",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown entity kind: {s}")))
    }
}

/// Per-kind deadline windows.
///
/// Cash collection always uses its fixed window. Other kinds take the window
/// supplied at submission, falling back to a configured override.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeadlinePolicy {
    overrides: BTreeMap<EntityKind, Duration>,
}

impl DeadlinePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, kind: EntityKind, window: Duration) -> Self {
        if kind.fixed_window().is_none() && window > Duration::zero() {
            self.overrides.insert(kind, window);
        }
        self
    }

    /// Effective window for a submission.
    pub fn window_for(&self, kind: EntityKind, requested: Option<Duration>) -> Result<Option<Duration>, DomainError> {
        if let Some(fixed) = kind.fixed_window() {
            return Ok(Some(fixed));
        }
        match requested {
            Some(w) if w <= Duration::zero() => Err(DomainError::validation(
                "deadline window must be positive",
            )),
            Some(w) => Ok(Some(w)),
            None => Ok(self.overrides.get(&kind).copied()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("invoice".parse::<EntityKind>().is_err());
    }

    #[test]
    fn cash_collection_window_is_fixed() {
        let policy = DeadlinePolicy::new().with_window(EntityKind::CashCollection, Duration::hours(2));
        let w = policy
            .window_for(EntityKind::CashCollection, Some(Duration::minutes(60)))
            .unwrap();
        assert_eq!(w, Some(Duration::minutes(15)));
    }

    #[test]
    fn other_kinds_use_request_then_override() {
        let policy = DeadlinePolicy::new().with_window(EntityKind::Expense, Duration::hours(24));
        assert_eq!(
            policy.window_for(EntityKind::Expense, None).unwrap(),
            Some(Duration::hours(24))
        );
        assert_eq!(
            policy
                .window_for(EntityKind::Expense, Some(Duration::minutes(30)))
                .unwrap(),
            Some(Duration::minutes(30))
        );
        assert_eq!(policy.window_for(EntityKind::SaleBatch, None).unwrap(), None);
        assert!(policy
            .window_for(EntityKind::SaleBatch, Some(Duration::zero()))
            .is_err());
    }
}
