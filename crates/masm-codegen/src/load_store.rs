//! Lowering of loads and stores to byte-wise memory access.
//!
//! Memory is byte-addressed through `Memory(0, Get|Set)`, which take the byte
//! address in `#index` and the byte in `#a`. Multi-byte values are assembled
//! little-endian. `#address`, `#c` and `#d` stay live across the byte calls;
//! the memory sequences never touch them.

use masm_types::ast::{LoadOp, MemArg, StoreOp};

use crate::command::{Command, Path, Range, Reg, ScoreOp, Sub};
use crate::error::{CodegenResult, CompileError};
use crate::symbol::{MemoryOp, Symbol};

/// `(byte width, sign-extending)` of an i32 load.
fn load_shape(kind: LoadOp) -> CodegenResult<(u32, bool)> {
    match kind {
        LoadOp::I32Load => Ok((4, false)),
        LoadOp::I32Load8S => Ok((1, true)),
        LoadOp::I32Load8U => Ok((1, false)),
        LoadOp::I32Load16S => Ok((2, true)),
        LoadOp::I32Load16U => Ok((2, false)),
        other => Err(CompileError::UnsupportedInstruction(other.mnemonic().into())),
    }
}

fn store_width(kind: StoreOp) -> CodegenResult<u32> {
    match kind {
        StoreOp::I32Store => Ok(4),
        StoreOp::I32Store8 => Ok(1),
        StoreOp::I32Store16 => Ok(2),
        other => Err(CompileError::UnsupportedInstruction(other.mnemonic().into())),
    }
}

/// Pop the base address into `#address` and apply the static offset.
fn effective_address(arg: MemArg, commands: &mut Vec<Command>) {
    commands.push(Command::load(Reg::Address, Path::stack(-1)));
    if arg.offset != 0 {
        commands.push(Command::add(Reg::Address, arg.offset as i32));
    }
}

fn byte_address(k: u32, commands: &mut Vec<Command>) {
    commands.push(Command::copy(Reg::Index, Reg::Address));
    if k > 0 {
        commands.push(Command::add(Reg::Index, k as i32));
    }
}

/// Replace the address on top of the stack with the loaded value.
pub fn lower_load(kind: LoadOp, arg: MemArg) -> CodegenResult<Vec<Command>> {
    let (width, signed) = load_shape(kind)?;
    let mut commands = Vec::new();
    effective_address(arg, &mut commands);

    for k in 0..width {
        byte_address(k, &mut commands);
        commands.push(Command::call(Symbol::Memory(0, MemoryOp::Get)));
        // Bytes are stored signed. The top byte keeps its sign when the load
        // sign-extends, and for a full-width load the sign is the wrap.
        let top = k == width - 1;
        if !(top && (signed || width == 4)) {
            commands.push(
                Command::add(Reg::A, 256).guarded(Sub::if_matches(Reg::A, Range::at_most(-1))),
            );
        }
        if k == 0 {
            commands.push(Command::copy(Reg::C, Reg::A));
        } else {
            commands.push(Command::op(Reg::A, ScoreOp::Mul, Reg::Const(1 << (8 * k))));
            commands.push(Command::op(Reg::C, ScoreOp::Add, Reg::A));
        }
    }

    commands.push(Command::save(Path::stack(-1), Reg::C));
    Ok(commands)
}

/// Pop a value and an address and write the value's low bytes.
pub fn lower_store(kind: StoreOp, arg: MemArg) -> CodegenResult<Vec<Command>> {
    let width = store_width(kind)?;
    let mut commands = vec![
        Command::load(Reg::D, Path::stack(-1)),
        Command::DataRemove(Path::stack(-1)),
    ];
    effective_address(arg, &mut commands);
    commands.push(Command::DataRemove(Path::stack(-1)));

    for k in 0..width {
        byte_address(k, &mut commands);
        commands.push(Command::copy(Reg::A, Reg::D));
        commands.push(Command::op(Reg::A, ScoreOp::Mod, Reg::Const(256)));
        commands.push(Command::call(Symbol::Memory(0, MemoryOp::Set)));
        if k + 1 < width {
            commands.push(Command::op(Reg::D, ScoreOp::Div, Reg::Const(256)));
        }
    }
    Ok(commands)
}
