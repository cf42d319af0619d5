use common::StrategyOutput;
use proptest::prelude::*;
use risk::{assess, capital_cap, is_profitable, size_position, TakeProfitPolicy};

proptest! {
    /// Sizing on randomized prices never panics and never exceeds the cap.
    #[test]
    fn sizing_never_exceeds_cap(
        available in 0.0f64..1_000_000.0,
        entry in 0.0001f64..1_000_000.0,
        stop_frac in 0.0f64..0.99,
        max_cap in 0.0f64..100_000.0,
        max_risk_pct in 0.01f64..50.0,
    ) {
        let out = StrategyOutput::enter_long(entry, entry * (1.0 - stop_frac), entry * 2.0);
        let capital = size_position(available, &out, max_cap, max_risk_pct);
        prop_assert!(capital <= max_cap);
        prop_assert!(capital <= available);
        prop_assert!(capital >= 0.0);
    }

    #[test]
    fn cap_is_never_below_floor(
        total in 0.0f64..1_000_000.0,
        divisor in 1.0f64..20.0,
        floor in 0.0f64..100.0,
    ) {
        prop_assert!(capital_cap(total, divisor, floor) >= floor);
    }

    /// Without fees the gate reduces to comparing distances from entry.
    #[test]
    fn zero_fee_gate_compares_distances(
        entry in 1.0f64..10_000.0,
        down in 0.01f64..0.5,
        up in 0.01f64..0.5,
        quantity in 0.001f64..100.0,
    ) {
        prop_assume!((up - down).abs() > 1e-6);
        let out = StrategyOutput::enter_long(entry, entry * (1.0 - down), entry * (1.0 + up));
        prop_assert_eq!(is_profitable(0.0, &out, quantity).unwrap(), up > down);
    }

    #[test]
    fn widened_target_never_moves_down(
        entry in 1.0f64..10_000.0,
        down in 0.005f64..0.2,
        reward in 0.5f64..3.0,
        fee in 0.0f64..0.005,
    ) {
        let stop = entry * (1.0 - down);
        let out = StrategyOutput::enter_long(entry, stop, entry + reward * (entry - stop));
        let policy = TakeProfitPolicy::Widen { accept_min: 1.0, accept_max: 2.5 };
        let assessment = assess(fee, &out, 1.0, policy).unwrap();
        prop_assert!(assessment.output.take_profit >= out.take_profit - 1e-9 * entry);
        prop_assert!((assessment.ratio - reward).abs() < 1e-6 * reward.max(1.0));
    }
}
