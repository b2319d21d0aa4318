//! Cost valuation helpers.

use rust_decimal::Decimal;

/// Decimal places kept on a stored average cost.
pub const AVERAGE_COST_SCALE: u32 = 6;

/// `(old_qty * old_avg + in_qty * unit_cost) / (old_qty + in_qty)`, rounded to
/// [`AVERAGE_COST_SCALE`] places.
///
/// With nothing on hand (or a non-positive combined quantity) the incoming unit
/// cost becomes the average. Returns `None` when the valuation does not fit a
/// `Decimal`.
pub fn weighted_average(old_qty: i64, old_avg: Decimal, in_qty: i64, unit_cost: Decimal) -> Option<Decimal> {
    let old_qty = Decimal::from(old_qty.max(0));
    let total_qty = old_qty.checked_add(Decimal::from(in_qty))?;
    if old_qty.is_zero() || total_qty <= Decimal::ZERO {
        return Some(unit_cost.round_dp(AVERAGE_COST_SCALE));
    }

    let value = old_qty
        .checked_mul(old_avg)?
        .checked_add(Decimal::from(in_qty).checked_mul(unit_cost)?)?;
    Some(value.checked_div(total_qty)?.round_dp(AVERAGE_COST_SCALE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_entry_takes_unit_cost() {
        assert_eq!(weighted_average(0, Decimal::from(99), 10, Decimal::new(425, 2)), Some(Decimal::new(425, 2)));
    }

    #[test]
    fn blends_by_quantity() {
        assert_eq!(weighted_average(30, Decimal::from(10), 10, Decimal::from(14)), Some(Decimal::from(11)));
        assert_eq!(weighted_average(1, Decimal::from(1), 2, Decimal::from(2)), Some(Decimal::new(1666667, 6)));
    }

    #[test]
    fn extreme_quantities_do_not_overflow() {
        let avg = weighted_average(i64::MAX, Decimal::from(2), i64::MAX, Decimal::from(4));
        assert_eq!(avg, Some(Decimal::from(3)));
        assert_eq!(weighted_average(i64::MAX, Decimal::MAX, 1, Decimal::ONE), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn average_stays_between_inputs(
            old_qty in 1i64..10_000,
            in_qty in 1i64..10_000,
            old_cents in 0i64..1_000_000,
            new_cents in 0i64..1_000_000,
        ) {
            let old_avg = Decimal::new(old_cents, 2);
            let unit = Decimal::new(new_cents, 2);
            let avg = weighted_average(old_qty, old_avg, in_qty, unit).unwrap();

            let lo = old_avg.min(unit);
            let hi = old_avg.max(unit);
            prop_assert!(avg >= lo && avg <= hi, "{avg} not within [{lo}, {hi}]");
        }
    }
}
