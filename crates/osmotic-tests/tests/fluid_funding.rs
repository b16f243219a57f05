//! Adaptive flows end to end: a funding pool streams to a receiver at a rate
//! that eases toward its target with the one-month adaptive period.

use osmotic_core::constants::{AP_1_MONTH, DAY, MONTH};
use osmotic_core::{AccumulationState, FixedPoint, LedgerError};
use osmotic_ledger::{FlowBook, FlowKey};
use osmotic_tests::helpers::*;

/// Absolute tolerance in tokens (and tokens per second).
const DELTA: f64 = 1e-7;

fn ap() -> FixedPoint {
    FixedPoint::from_raw_u128(AP_1_MONTH)
}

/// 5000 tokens per month.
fn target() -> FixedPoint {
    fp_f64(5000.0 / MONTH as f64)
}

fn key() -> FlowKey {
    FlowKey::new("fDAIx", "fluid-funding", "tester1")
}

fn setup() -> FlowBook {
    let book = FlowBook::default();
    book.create_flow(key(), target(), ap(), START).unwrap();
    book
}

#[test]
fn creates_flow_at_rate_zero() {
    let book = setup();
    let flow = book.get_flow(&key()).unwrap();

    assert_eq!(flow.state, AccumulationState::new(FixedPoint::ZERO, START));
    assert_eq!(flow.target_rate, target());
    assert_eq!(flow.decay, ap());
    assert_eq!(book.flow_rate_at(&key(), START).unwrap(), FixedPoint::ZERO);
    assert_eq!(book.len(), 1);
}

#[test]
fn funding_flow_rate_after_three_days() {
    let book = setup();
    let elapsed = 3 * DAY;

    let rate = book.flow_rate_at(&key(), START + elapsed).unwrap();
    let expected = reference_rate(elapsed as f64, 0.0, to_f64(target()), to_f64(ap()));

    assert!((to_f64(rate) - expected).abs() < DELTA, "{rate} vs {expected}");
}

#[test]
fn realtime_balance_after_four_days() {
    let book = setup();
    let elapsed = 4 * DAY;

    let balance = book.balance_at(&key(), START + elapsed).unwrap();
    let expected = reference_integral(elapsed as f64, 0.0, to_f64(target()), to_f64(ap()));

    assert!((to_f64(balance) - expected).abs() < DELTA, "{balance} vs {expected}");
    // Easing up from zero streams less than the target would have.
    assert!(balance < target().checked_mul_int(elapsed as u64).unwrap());
}

#[test]
fn update_checkpoints_last_rate() {
    let book = setup();
    let new_target = fp_f64(7500.0 / MONTH as f64);

    let flow = book.update_flow(&key(), new_target, START + DAY).unwrap();
    let expected = reference_rate(DAY as f64, 0.0, to_f64(target()), to_f64(ap()));

    assert!((to_f64(flow.state.last_value) - expected).abs() < DELTA);
    assert_eq!(flow.state.last_timestamp, START + DAY);
    assert_eq!(flow.target_rate, new_target);
    assert_eq!(flow.decay, ap());
}

#[test]
fn balance_spans_updates() {
    let book = setup();
    let decay = to_f64(ap());
    let first = to_f64(target());
    let second = 7500.0 / MONTH as f64;
    book.update_flow(&key(), fp_f64(second), START + DAY).unwrap();

    let rate_at_update = reference_rate(DAY as f64, 0.0, first, decay);
    let expected = reference_integral(DAY as f64, 0.0, first, decay)
        + reference_integral((3 * DAY) as f64, rate_at_update, second, decay);
    let balance = book.balance_at(&key(), START + 4 * DAY).unwrap();

    assert!((to_f64(balance) - expected).abs() < DELTA, "{balance} vs {expected}");
}

#[test]
fn lowering_the_target_eases_down() {
    let book = setup();
    book.update_flow(&key(), FixedPoint::ZERO, START + MONTH).unwrap();

    let at_update = book.flow_rate_at(&key(), START + MONTH).unwrap();
    let later = book.flow_rate_at(&key(), START + 2 * MONTH).unwrap();
    assert!(later < at_update);
    // 99.9% of the gap closes over one adaptive period.
    assert!((to_f64(later) - to_f64(at_update) * 0.001).abs() < DELTA);

    let b1 = book.balance_at(&key(), START + MONTH + DAY).unwrap();
    let b2 = book.balance_at(&key(), START + MONTH + 2 * DAY).unwrap();
    assert!(b2 > b1);
}

#[test]
fn delete_resets_the_flow() {
    let book = setup();
    book.update_flow(&key(), fp("1"), START + DAY).unwrap();
    book.delete_flow(&key()).unwrap();

    assert_eq!(book.get_flow(&key()), None);
    assert!(book.is_empty());
    assert!(matches!(
        book.balance_at(&key(), START + 2 * DAY),
        Err(LedgerError::FlowNotFound(_))
    ));

    book.create_flow(key(), target(), ap(), START + 3 * DAY).unwrap();
    assert_eq!(book.balance_at(&key(), START + 3 * DAY).unwrap(), FixedPoint::ZERO);
    assert_eq!(book.flow_rate_at(&key(), START + 3 * DAY).unwrap(), FixedPoint::ZERO);
}

#[test]
fn flows_are_independent() {
    let book = setup();
    let other = FlowKey::new("fDAIx", "fluid-funding", "tester2");
    book.create_flow(other.clone(), fp("1"), ap(), START + DAY).unwrap();
    book.update_flow(&other, fp("2"), START + 2 * DAY).unwrap();

    let untouched = book.flow_rate_at(&key(), START + 2 * DAY).unwrap();
    let fresh = FlowBook::default();
    fresh.create_flow(key(), target(), ap(), START).unwrap();
    assert_eq!(untouched, fresh.flow_rate_at(&key(), START + 2 * DAY).unwrap());
}
