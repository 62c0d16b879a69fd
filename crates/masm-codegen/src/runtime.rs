//! The shared runtime library, emitted once under the `masm` namespace.
//!
//! Arithmetic helpers take their operands in `#a` and `#b` and leave the
//! result in `#a`. They may clobber `#b` through `#f`.

use crate::command::{
    Command, Compare, Condition, Nbt, NumericTag, Path, Range, Reg, ScoreOp, Sub, CONSTANTS,
    NO_BRANCH, PAGE_SIZE,
};
use crate::dispatch::DispatchTree;
use crate::memory::{empty_window, zero_page};
use crate::output::{CompiledModule, Sequence};
use crate::symbol::{RuntimeFn, Symbol, TreeBase, RUNTIME_NAMESPACE};

fn call(f: RuntimeFn) -> Command {
    Command::call(Symbol::Runtime(f))
}

fn when(reg: Reg, range: Range, command: Command) -> Command {
    command.guarded(Sub::if_matches(reg, range))
}

fn when_ge(lhs: Reg, rhs: Reg, command: Command) -> Command {
    command.guarded(Sub::If(Condition::Compare(lhs, Compare::Ge, rhs)))
}

/// Build every runtime sequence.
pub fn build() -> CompiledModule {
    let mut sequences: Vec<Sequence> = Vec::new();
    let mut emit = |f: RuntimeFn, commands: Vec<Command>| {
        sequences.push(Sequence {
            symbol: Symbol::Runtime(f),
            commands,
        });
    };

    emit(RuntimeFn::Load, load());
    emit_division(&mut emit);
    emit_shifts(&mut emit);
    emit_bitwise(&mut emit);
    emit_counts(&mut emit);

    let mut trees: Vec<Sequence> = Vec::new();
    let get_root = DispatchTree::new(TreeBase::ByteGet, Reg::Index).build(
        &mut trees,
        0,
        PAGE_SIZE as u32,
        &mut |i| Command::load(Reg::A, Path::runtime("mem").key("data").index(i as i32)),
    );
    let set_root = DispatchTree::new(TreeBase::ByteSet, Reg::Index).build(
        &mut trees,
        0,
        PAGE_SIZE as u32,
        &mut |i| {
            Command::save_as(
                Path::runtime("mem").key("data").index(i as i32),
                NumericTag::Byte,
                Reg::A,
            )
        },
    );
    emit(RuntimeFn::ByteGet, vec![Command::call(get_root)]);
    emit(RuntimeFn::ByteSet, vec![Command::call(set_root)]);
    sequences.extend(trees);

    tracing::debug!(sequences = sequences.len(), "built runtime library");
    CompiledModule {
        namespace: RUNTIME_NAMESPACE.to_string(),
        sequences,
        tags: Vec::new(),
    }
}

fn load() -> Vec<Command> {
    let mut commands = vec![Command::AddObjective];
    commands.extend(CONSTANTS.iter().map(|&c| Command::set(Reg::Const(c), c)));
    commands.push(Command::set(Reg::BrDepth, NO_BRANCH));
    for key in ["stack", "frames", "conditions"] {
        commands.push(Command::DataSetValue(Path::runtime(key), Nbt::empty_list()));
    }
    commands.extend([
        Command::DataSetValue(Path::runtime("tmp"), Nbt::String(String::new())),
        Command::DataSetValue(Path::runtime("mem"), empty_window()),
        Command::DataSetValue(Path::runtime("zero_page"), zero_page()),
    ]);
    commands
}

fn emit_division(emit: &mut impl FnMut(RuntimeFn, Vec<Command>)) {
    use Reg::*;

    // Floor division, corrected towards zero when the remainder is nonzero
    // and the quotient negative.
    emit(
        RuntimeFn::DivS,
        vec![
            Command::copy(C, A),
            Command::op(C, ScoreOp::Mod, B),
            Command::op(A, ScoreOp::Div, B),
            Command::add(A, 1)
                .guarded(Sub::if_matches(A, Range::at_most(-1)))
                .guarded(Sub::unless_matches(C, Range::exact(0))),
        ],
    );
    emit(
        RuntimeFn::RemS,
        vec![
            Command::copy(C, A),
            Command::op(C, ScoreOp::Mod, B),
            Command::copy(D, A),
            Command::op(D, ScoreOp::Div, B),
            Command::op(C, ScoreOp::Sub, B)
                .guarded(Sub::if_matches(D, Range::at_most(-1)))
                .guarded(Sub::unless_matches(C, Range::exact(0))),
            Command::copy(A, C),
        ],
    );

    // Unsigned quotient in #c, remainder in #d.
    emit(
        RuntimeFn::UDivMod,
        vec![
            when(B, Range::exact(0), Command::set(C, 0)),
            when(B, Range::exact(0), Command::copy(D, A)),
            when(B, Range::at_most(-1), call(RuntimeFn::UDivModLarge)),
            when(B, Range::at_least(1), call(RuntimeFn::UDivModSmall)),
        ],
    );
    // Divisor of 2^31 or more: the quotient is 0 or 1.
    emit(
        RuntimeFn::UDivModLarge,
        vec![
            Command::copy(E, A),
            Command::add(E, i32::MIN),
            Command::copy(F, B),
            Command::add(F, i32::MIN),
            Command::set(C, 0),
            when_ge(E, F, Command::set(C, 1)),
            Command::copy(D, A),
            when(C, Range::exact(1), Command::op(D, ScoreOp::Sub, B)),
        ],
    );
    emit(
        RuntimeFn::UDivModSmall,
        vec![
            when(A, Range::at_least(0), call(RuntimeFn::UDivModPos)),
            when(A, Range::at_most(-1), call(RuntimeFn::UDivModNeg)),
        ],
    );
    emit(
        RuntimeFn::UDivModPos,
        vec![
            Command::copy(C, A),
            Command::op(C, ScoreOp::Div, B),
            Command::copy(D, A),
            Command::op(D, ScoreOp::Mod, B),
        ],
    );
    // Dividend of 2^31 or more: divide its upper 31 bits, then fold the low
    // bit back into the remainder.
    emit(
        RuntimeFn::UDivModNeg,
        vec![
            Command::copy(E, A),
            Command::op(E, ScoreOp::Div, Const(2)),
            Command::add(E, i32::MIN),
            Command::copy(F, A),
            Command::op(F, ScoreOp::Mod, Const(2)),
            Command::copy(C, E),
            Command::op(C, ScoreOp::Div, B),
            Command::op(C, ScoreOp::Mul, Const(2)),
            Command::copy(D, E),
            Command::op(D, ScoreOp::Mod, B),
            Command::op(D, ScoreOp::Mul, Const(2)),
            Command::op(D, ScoreOp::Add, F),
            Command::copy(E, D),
            Command::add(E, i32::MIN),
            Command::copy(F, B),
            Command::add(F, i32::MIN),
            when_ge(E, F, Command::op(D, ScoreOp::Sub, B)),
            when_ge(E, F, Command::add(C, 1)),
        ],
    );
    emit(
        RuntimeFn::DivU,
        vec![call(RuntimeFn::UDivMod), Command::copy(A, C)],
    );
    emit(
        RuntimeFn::RemU,
        vec![call(RuntimeFn::UDivMod), Command::copy(A, D)],
    );
}

/// `#b %= 32`, then `body` if anything is left to shift.
fn shift(body: RuntimeFn) -> Vec<Command> {
    vec![
        Command::op(Reg::B, ScoreOp::Mod, Reg::Const(32)),
        when(Reg::B, Range::at_least(1), call(body)),
    ]
}

fn shift_loop(f: RuntimeFn, step: Command) -> Vec<Command> {
    vec![
        step,
        Command::add(Reg::B, -1),
        when(Reg::B, Range::at_least(1), call(f)),
    ]
}

fn emit_shifts(emit: &mut impl FnMut(RuntimeFn, Vec<Command>)) {
    use Reg::*;

    emit(RuntimeFn::Shl, shift(RuntimeFn::ShlLoop));
    emit(
        RuntimeFn::ShlLoop,
        shift_loop(RuntimeFn::ShlLoop, Command::op(A, ScoreOp::Mul, Const(2))),
    );
    emit(RuntimeFn::ShrS, shift(RuntimeFn::ShrSLoop));
    emit(
        RuntimeFn::ShrSLoop,
        shift_loop(RuntimeFn::ShrSLoop, Command::op(A, ScoreOp::Div, Const(2))),
    );
    emit(RuntimeFn::ShrU, shift(RuntimeFn::ShrUFirst));
    // The first step clears the sign bit; the rest are arithmetic.
    emit(
        RuntimeFn::ShrUFirst,
        vec![
            Command::copy(C, A),
            Command::op(A, ScoreOp::Div, Const(2)),
            when(C, Range::at_most(-1), Command::add(A, i32::MIN)),
            Command::add(B, -1),
            when(B, Range::at_least(1), call(RuntimeFn::ShrSLoop)),
        ],
    );
    emit(
        RuntimeFn::Rotl,
        vec![
            Command::copy(E, A),
            Command::copy(F, B),
            Command::op(F, ScoreOp::Mod, Const(32)),
            call(RuntimeFn::Shl),
            Command::copy(D, A),
            Command::copy(A, E),
            Command::copy(B, Const(32)),
            Command::op(B, ScoreOp::Sub, F),
            call(RuntimeFn::ShrU),
            Command::copy(B, D),
            call(RuntimeFn::Or),
        ],
    );
    emit(
        RuntimeFn::Rotr,
        vec![
            Command::op(B, ScoreOp::Mod, Const(32)),
            Command::copy(E, Const(32)),
            Command::op(E, ScoreOp::Sub, B),
            Command::copy(B, E),
            call(RuntimeFn::Rotl),
        ],
    );
}

/// Bit-serial loop over all 32 bits: `#d` walks the bit weights and wraps to
/// zero after the top bit. `#e` is the sum of the operands' current bits.
fn emit_bitwise(emit: &mut impl FnMut(RuntimeFn, Vec<Command>)) {
    use Reg::*;

    for (entry, body, set_when) in [
        (RuntimeFn::And, RuntimeFn::AndLoop, Range::exact(2)),
        (RuntimeFn::Or, RuntimeFn::OrLoop, Range::at_least(1)),
        (RuntimeFn::Xor, RuntimeFn::XorLoop, Range::exact(1)),
    ] {
        emit(
            entry,
            vec![
                Command::set(C, 0),
                Command::set(D, 1),
                call(body),
                Command::copy(A, C),
            ],
        );
        emit(
            body,
            vec![
                Command::copy(E, A),
                Command::op(E, ScoreOp::Mod, Const(2)),
                Command::copy(F, B),
                Command::op(F, ScoreOp::Mod, Const(2)),
                Command::op(E, ScoreOp::Add, F),
                when(E, set_when, Command::op(C, ScoreOp::Add, D)),
                Command::op(A, ScoreOp::Div, Const(2)),
                Command::op(B, ScoreOp::Div, Const(2)),
                Command::op(D, ScoreOp::Mul, Const(2)),
                call(body).guarded(Sub::unless_matches(D, Range::exact(0))),
            ],
        );
    }
}

fn emit_counts(emit: &mut impl FnMut(RuntimeFn, Vec<Command>)) {
    use Reg::*;

    // Shift left until the sign bit is set.
    emit(
        RuntimeFn::Clz,
        vec![
            Command::set(C, 0),
            when(A, Range::exact(0), Command::set(C, 32)),
            when(A, Range::at_least(1), call(RuntimeFn::ClzLoop)),
            Command::copy(A, C),
        ],
    );
    emit(
        RuntimeFn::ClzLoop,
        vec![
            Command::add(C, 1),
            Command::op(A, ScoreOp::Mul, Const(2)),
            when(A, Range::at_least(1), call(RuntimeFn::ClzLoop)),
        ],
    );

    emit(
        RuntimeFn::Ctz,
        vec![
            Command::set(C, 0),
            when(A, Range::exact(0), Command::set(C, 32)),
            call(RuntimeFn::CtzLoop).guarded(Sub::unless_matches(A, Range::exact(0))),
            Command::copy(A, C),
        ],
    );
    emit(
        RuntimeFn::CtzLoop,
        vec![
            Command::copy(E, A),
            Command::op(E, ScoreOp::Mod, Const(2)),
            when(E, Range::exact(0), Command::add(C, 1)),
            when(E, Range::exact(0), Command::op(A, ScoreOp::Div, Const(2))),
            when(E, Range::exact(0), call(RuntimeFn::CtzLoop)),
        ],
    );

    emit(
        RuntimeFn::Popcnt,
        vec![
            Command::set(C, 0),
            Command::set(D, 1),
            call(RuntimeFn::PopcntLoop),
            Command::copy(A, C),
        ],
    );
    emit(
        RuntimeFn::PopcntLoop,
        vec![
            Command::copy(E, A),
            Command::op(E, ScoreOp::Mod, Const(2)),
            Command::op(C, ScoreOp::Add, E),
            Command::op(A, ScoreOp::Div, Const(2)),
            Command::op(D, ScoreOp::Mul, Const(2)),
            call(RuntimeFn::PopcntLoop).guarded(Sub::unless_matches(D, Range::exact(0))),
        ],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_namespace_and_load() {
        let runtime = build();
        assert_eq!(runtime.namespace, "masm");
        let load = runtime
            .sequence(&Symbol::Runtime(RuntimeFn::Load))
            .unwrap();
        assert_eq!(
            load.commands[0].render("masm"),
            "scoreboard objectives add masm dummy"
        );
        let lines: Vec<String> = load.commands.iter().map(|c| c.render("masm")).collect();
        assert!(lines.contains(&"scoreboard players set #-2147483648 masm -2147483648".to_string()));
        assert!(lines.contains(&"scoreboard players set #br_depth masm 2147483647".to_string()));
    }

    #[test]
    fn test_every_helper_is_emitted_once() {
        let runtime = build();
        let helpers: Vec<&Sequence> = runtime
            .sequences
            .iter()
            .filter(|s| matches!(s.symbol, Symbol::Runtime(_)))
            .collect();
        assert_eq!(helpers.len(), 32);
        let mut names: Vec<String> = helpers
            .iter()
            .map(|s| s.symbol.qualified_name("masm"))
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 32);
    }

    #[test]
    fn test_byte_trees_cover_a_page() {
        let runtime = build();
        assert!(runtime
            .sequence(&Symbol::Tree(TreeBase::ByteGet, 0, 65535))
            .is_some());
        let leaf = runtime
            .sequence(&Symbol::Tree(TreeBase::ByteSet, 65520, 65535))
            .unwrap();
        assert_eq!(
            leaf.commands[15].render("masm"),
            "execute if score #index masm matches 65535 store result storage masm:__internal mem.data[65535] byte 1 run scoreboard players get #a masm"
        );
    }
}
