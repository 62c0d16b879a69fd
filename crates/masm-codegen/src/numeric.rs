//! Lowering of i32 numeric operators.
//!
//! Binary operators pop `b` then `a` into `#b`/`#a`, compute into `#a`, and
//! write the result over the slot `a` occupied. Operators without a direct
//! scoreboard equivalent call into the runtime library.

use masm_types::NumericOp;

use crate::command::{
    Command, Compare, Condition, NumericTag, Path, Range, Reg, ScoreOp, StoreKind, StoreTarget,
    Sub,
};
use crate::error::{CodegenResult, CompileError};
use crate::symbol::{RuntimeFn, Symbol};

/// Commands of one lowered operator and its operand stack effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lowered {
    pub pops: u32,
    pub pushes: u32,
    pub commands: Vec<Command>,
}

pub fn lower(op: NumericOp) -> CodegenResult<Lowered> {
    use NumericOp::*;

    let lowered = match op {
        I32Eqz => Lowered {
            pops: 1,
            pushes: 1,
            commands: vec![
                Command::load(Reg::A, Path::stack(-1)),
                store_success(Sub::if_matches(Reg::A, Range::exact(0))),
            ],
        },
        I32Eq => compare(Compare::Eq, false, false),
        I32Ne => compare(Compare::Eq, false, true),
        I32LtS => compare(Compare::Lt, false, false),
        I32LtU => compare(Compare::Lt, true, false),
        I32GtS => compare(Compare::Gt, false, false),
        I32GtU => compare(Compare::Gt, true, false),
        I32LeS => compare(Compare::Le, false, false),
        I32LeU => compare(Compare::Le, true, false),
        I32GeS => compare(Compare::Ge, false, false),
        I32GeU => compare(Compare::Ge, true, false),

        I32Add => binary(vec![Command::op(Reg::A, ScoreOp::Add, Reg::B)]),
        I32Sub => binary(vec![Command::op(Reg::A, ScoreOp::Sub, Reg::B)]),
        I32Mul => binary(vec![Command::op(Reg::A, ScoreOp::Mul, Reg::B)]),
        I32DivS => binary(runtime(RuntimeFn::DivS)),
        I32DivU => binary(runtime(RuntimeFn::DivU)),
        I32RemS => binary(runtime(RuntimeFn::RemS)),
        I32RemU => binary(runtime(RuntimeFn::RemU)),
        I32And => binary(runtime(RuntimeFn::And)),
        I32Or => binary(runtime(RuntimeFn::Or)),
        I32Xor => binary(runtime(RuntimeFn::Xor)),
        I32Shl => binary(runtime(RuntimeFn::Shl)),
        I32ShrS => binary(runtime(RuntimeFn::ShrS)),
        I32ShrU => binary(runtime(RuntimeFn::ShrU)),
        I32Rotl => binary(runtime(RuntimeFn::Rotl)),
        I32Rotr => binary(runtime(RuntimeFn::Rotr)),

        I32Clz => unary(runtime(RuntimeFn::Clz)),
        I32Ctz => unary(runtime(RuntimeFn::Ctz)),
        I32Popcnt => unary(runtime(RuntimeFn::Popcnt)),
        I32Extend8S => unary(sign_extend(256)),
        I32Extend16S => unary(sign_extend(65536)),

        other => return Err(CompileError::UnsupportedInstruction(other.mnemonic().into())),
    };
    Ok(lowered)
}

fn runtime(f: RuntimeFn) -> Vec<Command> {
    vec![Command::call(Symbol::Runtime(f))]
}

fn unary(body: Vec<Command>) -> Lowered {
    let mut commands = vec![Command::load(Reg::A, Path::stack(-1))];
    commands.extend(body);
    commands.push(Command::save(Path::stack(-1), Reg::A));
    Lowered {
        pops: 1,
        pushes: 1,
        commands,
    }
}

/// Pops `#b`, loads `#a` from the slot below, then runs `body`.
fn operands() -> Vec<Command> {
    vec![
        Command::load(Reg::B, Path::stack(-1)),
        Command::DataRemove(Path::stack(-1)),
        Command::load(Reg::A, Path::stack(-1)),
    ]
}

fn binary(body: Vec<Command>) -> Lowered {
    let mut commands = operands();
    commands.extend(body);
    commands.push(Command::save(Path::stack(-1), Reg::A));
    Lowered {
        pops: 2,
        pushes: 1,
        commands,
    }
}

fn store_success(test: Sub) -> Command {
    Command::Execute {
        subs: vec![
            Sub::Store(
                StoreKind::Success,
                StoreTarget::Storage(Path::stack(-1), NumericTag::Int),
            ),
            test,
        ],
        run: None,
    }
}

/// Unsigned comparisons shift both operands by `i32::MIN` first, which maps
/// unsigned order onto signed order.
fn compare(cmp: Compare, unsigned: bool, negate: bool) -> Lowered {
    let mut commands = operands();
    if unsigned {
        commands.push(Command::add(Reg::A, i32::MIN));
        commands.push(Command::add(Reg::B, i32::MIN));
    }
    let condition = Condition::Compare(Reg::A, cmp, Reg::B);
    commands.push(store_success(if negate {
        Sub::Unless(condition)
    } else {
        Sub::If(condition)
    }));
    Lowered {
        pops: 2,
        pushes: 1,
        commands,
    }
}

/// Reduce to the low bits, then subtract the modulus when the top bit is set.
fn sign_extend(modulus: i32) -> Vec<Command> {
    vec![
        Command::op(Reg::A, ScoreOp::Mod, Reg::Const(modulus)),
        Command::add(Reg::A, -modulus).guarded(Sub::if_matches(Reg::A, Range::at_least(modulus / 2))),
    ]
}
