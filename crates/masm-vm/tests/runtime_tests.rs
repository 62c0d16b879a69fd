//! The runtime's integer helpers against Rust's own i32 semantics.
//!
//! Every helper takes `#a`/`#b` and leaves its result in `#a`; the reference
//! value is what the corresponding wasm instruction computes.

use std::cell::RefCell;

use masm_codegen::command::Reg;
use masm_codegen::runtime;
use masm_codegen::symbol::{RuntimeFn, Symbol};
use masm_vm::Machine;
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

thread_local! {
    static MACHINE: RefCell<Machine> = RefCell::new(booted());
}

fn booted() -> Machine {
    let mut machine = Machine::default();
    machine.load(&runtime::build());
    machine.reload().expect("runtime load should run");
    machine
}

/// Run helper `f` on `(a, b)` and return `#a`.
fn run(f: RuntimeFn, a: i32, b: i32) -> i32 {
    MACHINE.with(|cell| {
        let mut machine = cell.borrow_mut();
        machine.set_score(Reg::A, a);
        machine.set_score(Reg::B, b);
        machine
            .call(&Symbol::Runtime(f).qualified_name("masm"))
            .unwrap_or_else(|err| panic!("{f:?}({a}, {b}) failed: {err}"));
        machine.score(Reg::A).expect("#a is set")
    })
}

fn nonzero() -> impl Strategy<Value = i32> {
    any::<i32>().prop_filter("nonzero divisor", |b| *b != 0)
}

/// Values biased towards the edges the helpers branch on.
fn edgy() -> impl Strategy<Value = i32> {
    prop_oneof![
        any::<i32>(),
        Just(0),
        Just(1),
        Just(-1),
        Just(i32::MIN),
        Just(i32::MAX),
        Just(i32::MIN + 1),
    ]
}

// ─────────────────────────────────────────────────────────────────────
// Division
// ─────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn test_div_s(a in edgy(), b in nonzero()) {
        prop_assume!(!(a == i32::MIN && b == -1));
        prop_assert_eq!(run(RuntimeFn::DivS, a, b), a / b);
    }

    #[test]
    fn test_rem_s(a in edgy(), b in nonzero()) {
        prop_assert_eq!(run(RuntimeFn::RemS, a, b), a.wrapping_rem(b));
    }

    #[test]
    fn test_div_u(a in edgy(), b in nonzero()) {
        let expected = ((a as u32) / (b as u32)) as i32;
        prop_assert_eq!(run(RuntimeFn::DivU, a, b), expected);
    }

    #[test]
    fn test_rem_u(a in edgy(), b in nonzero()) {
        let expected = ((a as u32) % (b as u32)) as i32;
        prop_assert_eq!(run(RuntimeFn::RemU, a, b), expected);
    }
}

#[test]
fn test_unsigned_division_edges() {
    assert_eq!(run(RuntimeFn::DivU, -1, 1), -1);
    assert_eq!(run(RuntimeFn::DivU, -1, 2), i32::MAX);
    assert_eq!(run(RuntimeFn::DivU, i32::MIN, i32::MIN), 1);
    assert_eq!(run(RuntimeFn::DivU, i32::MAX, i32::MIN), 0);
    assert_eq!(run(RuntimeFn::RemU, -1, i32::MIN), i32::MAX);
    assert_eq!(run(RuntimeFn::RemU, -1, -1), 0);
}

// ─────────────────────────────────────────────────────────────────────
// Shifts and rotates
// ─────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn test_shl(a in edgy(), b in any::<i32>()) {
        prop_assert_eq!(run(RuntimeFn::Shl, a, b), a.wrapping_shl(b as u32));
    }

    #[test]
    fn test_shr_s(a in edgy(), b in any::<i32>()) {
        prop_assert_eq!(run(RuntimeFn::ShrS, a, b), a.wrapping_shr(b as u32));
    }

    #[test]
    fn test_shr_u(a in edgy(), b in any::<i32>()) {
        let expected = (a as u32).wrapping_shr(b as u32) as i32;
        prop_assert_eq!(run(RuntimeFn::ShrU, a, b), expected);
    }

    #[test]
    fn test_rotl(a in edgy(), b in any::<i32>()) {
        prop_assert_eq!(run(RuntimeFn::Rotl, a, b), a.rotate_left(b as u32 % 32));
    }

    #[test]
    fn test_rotr(a in edgy(), b in any::<i32>()) {
        prop_assert_eq!(run(RuntimeFn::Rotr, a, b), a.rotate_right(b as u32 % 32));
    }
}

#[test]
fn test_shift_counts_wrap_at_32() {
    assert_eq!(run(RuntimeFn::Shl, 1, 32), 1);
    assert_eq!(run(RuntimeFn::Shl, 1, 31), i32::MIN);
    assert_eq!(run(RuntimeFn::ShrU, -1, 31), 1);
    assert_eq!(run(RuntimeFn::ShrS, -1, 31), -1);
    assert_eq!(run(RuntimeFn::ShrU, i32::MIN, -1), 1);
    assert_eq!(run(RuntimeFn::Rotl, i32::MIN, 1), 1);
    assert_eq!(run(RuntimeFn::Rotr, 1, 0), 1);
}

// ─────────────────────────────────────────────────────────────────────
// Bitwise and bit counts
// ─────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn test_and(a in edgy(), b in edgy()) {
        prop_assert_eq!(run(RuntimeFn::And, a, b), a & b);
    }

    #[test]
    fn test_or(a in edgy(), b in edgy()) {
        prop_assert_eq!(run(RuntimeFn::Or, a, b), a | b);
    }

    #[test]
    fn test_xor(a in edgy(), b in edgy()) {
        prop_assert_eq!(run(RuntimeFn::Xor, a, b), a ^ b);
    }

    #[test]
    fn test_clz(a in edgy()) {
        prop_assert_eq!(run(RuntimeFn::Clz, a, 0), a.leading_zeros() as i32);
    }

    #[test]
    fn test_ctz(a in edgy()) {
        prop_assert_eq!(run(RuntimeFn::Ctz, a, 0), a.trailing_zeros() as i32);
    }

    #[test]
    fn test_popcnt(a in edgy()) {
        prop_assert_eq!(run(RuntimeFn::Popcnt, a, 0), a.count_ones() as i32);
    }
}

#[test]
fn test_bit_counts_of_zero() {
    assert_eq!(run(RuntimeFn::Clz, 0, 0), 32);
    assert_eq!(run(RuntimeFn::Ctz, 0, 0), 32);
    assert_eq!(run(RuntimeFn::Popcnt, 0, 0), 0);
    assert_eq!(run(RuntimeFn::Ctz, i32::MIN, 0), 31);
}
