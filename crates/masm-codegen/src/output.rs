//! Compiled output: named command sequences plus function tag entries.

use crate::command::Command;
use crate::dispatch::SequenceSink;
use crate::symbol::{Symbol, Tag};

/// One named, callable command sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub symbol: Symbol,
    pub commands: Vec<Command>,
}

impl SequenceSink for Vec<Sequence> {
    fn emit(&mut self, symbol: Symbol, commands: Vec<Command>) {
        self.push(Sequence { symbol, commands });
    }
}

/// The result of compiling one module (or the runtime library).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    pub namespace: String,
    pub sequences: Vec<Sequence>,
    /// `(tag, member)` pairs this module contributes.
    pub tags: Vec<(Tag, Symbol)>,
}

impl CompiledModule {
    /// Qualified name of the module's initialization sequence.
    pub fn init_name(&self) -> String {
        Symbol::Init.qualified_name(&self.namespace)
    }

    /// Every sequence as `(qualified name, command lines)`, in emission
    /// order.
    pub fn render(&self) -> Vec<(String, Vec<String>)> {
        self.sequences
            .iter()
            .map(|seq| {
                let lines = seq
                    .commands
                    .iter()
                    .map(|cmd| cmd.render(&self.namespace))
                    .collect();
                (seq.symbol.qualified_name(&self.namespace), lines)
            })
            .collect()
    }

    /// Qualified names of this module's members of `tag`.
    pub fn tag_members(&self, tag: Tag) -> Vec<String> {
        self.tags
            .iter()
            .filter(|(t, _)| *t == tag)
            .map(|(_, symbol)| symbol.qualified_name(&self.namespace))
            .collect()
    }

    /// Look up a sequence by symbol.
    pub fn sequence(&self, symbol: &Symbol) -> Option<&Sequence> {
        self.sequences.iter().find(|seq| &seq.symbol == symbol)
    }

    pub fn command_count(&self) -> usize {
        self.sequences.iter().map(|seq| seq.commands.len()).sum()
    }
}
