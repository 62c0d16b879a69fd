//! Balanced dispatch trees.
//!
//! The target has no computed jump, so selecting one of `N` actions by the
//! value of a register is done with a tree of guarded calls. Each node
//! splits its range into up to `branch_factor` contiguous parts whose sizes
//! differ by at most one, larger parts first. A part of size one inlines its
//! leaf command; a larger part becomes its own named node.
//!
//! With a branch factor of `b`, a lookup executes at most `ceil(log_b(N))`
//! nested calls.

use crate::command::{Command, Range, Reg, Sub};
use crate::symbol::{Symbol, TreeBase};

/// Branch factor used for every tree the compiler emits.
pub const BRANCH_FACTOR: u32 = 16;

/// Receives the named sequences a builder produces.
pub trait SequenceSink {
    fn emit(&mut self, symbol: Symbol, commands: Vec<Command>);
}

/// Description of one dispatch tree.
#[derive(Debug, Clone, Copy)]
pub struct DispatchTree {
    pub base: TreeBase,
    pub key: Reg,
    pub branch_factor: u32,
}

impl DispatchTree {
    pub fn new(base: TreeBase, key: Reg) -> Self {
        Self {
            base,
            key,
            branch_factor: BRANCH_FACTOR,
        }
    }

    /// Emit the tree over `[start, start + size)` and return the symbol of
    /// its root node. `leaf(i)` produces the command run when the key is `i`.
    pub fn build(
        &self,
        sink: &mut dyn SequenceSink,
        start: u32,
        size: u32,
        leaf: &mut dyn FnMut(u32) -> Command,
    ) -> Symbol {
        let root = Symbol::Tree(self.base, start, (start + size).saturating_sub(1));
        let commands = self.node(sink, start, size, leaf);
        sink.emit(root.clone(), commands);
        root
    }

    fn node(
        &self,
        sink: &mut dyn SequenceSink,
        start: u32,
        size: u32,
        leaf: &mut dyn FnMut(u32) -> Command,
    ) -> Vec<Command> {
        let parts = self.branch_factor.max(2).min(size);
        let mut commands = Vec::with_capacity(parts as usize);
        if parts == 0 {
            return commands;
        }
        let base = size / parts;
        let extra = size % parts;

        let mut lo = start;
        for part in 0..parts {
            let len = base + u32::from(part < extra);
            let hi = lo + len - 1;
            if len == 1 {
                commands.push(leaf(lo).guarded(Sub::if_matches(self.key, Range::exact(lo as i32))));
            } else {
                let child = Symbol::Tree(self.base, lo, hi);
                let inner = self.node(sink, lo, len, leaf);
                sink.emit(child.clone(), inner);
                commands.push(
                    Command::call(child)
                        .guarded(Sub::if_matches(self.key, Range::between(lo as i32, hi as i32))),
                );
            }
            lo += len;
        }
        commands
    }
}
