//! The executor: scores, storages, functions and tags, and a command loop
//! with an explicit call stack.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use masm_codegen::command::{
    Command, Condition, Nbt, NumericTag, Path, Reg, ScoreOp, StoreKind, StoreTarget, Sub,
};
use masm_codegen::symbol::{RuntimeFn, Symbol, Tag};
use masm_codegen::CompiledModule;

use crate::error::{VmError, VmResult};
use crate::storage::{self, Slot};

/// Commands a single top-level call may run before the machine gives up.
pub const DEFAULT_GAS_LIMIT: u64 = 200_000_000;

/// A loaded sequence and the namespace its module paths resolve against.
#[derive(Debug)]
pub struct Function {
    pub namespace: String,
    pub commands: Vec<Command>,
}

/// What one non-call command reports to an enclosing `execute store`.
#[derive(Debug, Clone, Copy)]
struct Outcome {
    success: bool,
    result: i32,
}

impl Outcome {
    fn ok(result: i32) -> Self {
        Self {
            success: true,
            result,
        }
    }

    fn failed() -> Self {
        Self {
            success: false,
            result: 0,
        }
    }

    fn value(self, kind: StoreKind) -> i32 {
        match kind {
            StoreKind::Result => self.result,
            StoreKind::Success => i32::from(self.success),
        }
    }
}

/// `/=` on scores: floor division. Division by zero is reported as `None`.
pub fn floor_div(lhs: i32, rhs: i32) -> Option<i32> {
    if rhs == 0 {
        return None;
    }
    let q = lhs.wrapping_div(rhs);
    if lhs.wrapping_rem(rhs) != 0 && ((lhs < 0) != (rhs < 0)) {
        Some(q.wrapping_sub(1))
    } else {
        Some(q)
    }
}

/// `%=` on scores: floor modulo, taking the sign of the divisor.
pub fn floor_mod(lhs: i32, rhs: i32) -> Option<i32> {
    if rhs == 0 {
        return None;
    }
    let r = lhs.wrapping_rem(rhs);
    if r != 0 && ((r < 0) != (rhs < 0)) {
        Some(r.wrapping_add(rhs))
    } else {
        Some(r)
    }
}

/// In-memory machine running compiled command sequences.
pub struct Machine {
    scores: HashMap<Reg, i32>,
    storages: BTreeMap<String, Nbt>,
    functions: HashMap<String, Rc<Function>>,
    tags: BTreeMap<String, Vec<String>>,
    /// Commands run by the current top-level call.
    pub gas: u64,
    pub gas_limit: u64,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(DEFAULT_GAS_LIMIT)
    }
}

impl Machine {
    pub fn new(gas_limit: u64) -> Self {
        Self {
            scores: HashMap::new(),
            storages: BTreeMap::new(),
            functions: HashMap::new(),
            tags: BTreeMap::new(),
            gas: 0,
            gas_limit,
        }
    }

    /// Install every sequence and tag entry of `module`.
    ///
    /// The runtime's load sequence is registered first in the load tag and
    /// each module's `__init` after it, in load order.
    pub fn load(&mut self, module: &CompiledModule) {
        for seq in &module.sequences {
            let name = seq.symbol.qualified_name(&module.namespace);
            let load_entry = match seq.symbol {
                Symbol::Runtime(RuntimeFn::Load) => Some(0),
                Symbol::Init => Some(self.tag_len(Tag::Load)),
                _ => None,
            };
            if let Some(at) = load_entry {
                self.tags
                    .entry(Tag::Load.name().to_string())
                    .or_default()
                    .insert(at, name.clone());
            }
            self.functions.insert(
                name,
                Rc::new(Function {
                    namespace: module.namespace.clone(),
                    commands: seq.commands.clone(),
                }),
            );
        }
        for (tag, symbol) in &module.tags {
            self.tags
                .entry(tag.name().to_string())
                .or_default()
                .push(symbol.qualified_name(&module.namespace));
        }
        tracing::debug!(
            namespace = %module.namespace,
            sequences = module.sequences.len(),
            "loaded module"
        );
    }

    fn tag_len(&self, tag: Tag) -> usize {
        self.tags.get(tag.name()).map_or(0, Vec::len)
    }

    /// Run the load tag, as the game does when the pack is (re)loaded.
    pub fn reload(&mut self) -> VmResult<()> {
        self.run(Command::CallTag(Tag::Load), "minecraft")
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Host interface
    // ══════════════════════════════════════════════════════════════════════

    /// Run the function with the given qualified name to completion.
    pub fn call(&mut self, name: &str) -> VmResult<()> {
        let function = self.function(name)?;
        self.gas = 0;
        self.execute_frames(vec![(function, 0)])
    }

    /// Push `args`, call a function exported under the stack convention,
    /// and pop whatever it left above the arguments' base.
    pub fn invoke(&mut self, name: &str, args: &[i32]) -> VmResult<Vec<i32>> {
        let base = self.stack()?.len();
        for arg in args {
            self.push(*arg)?;
        }
        self.call(name)?;
        let stack = self.stack()?;
        let results = stack.get(base..).map(<[i32]>::to_vec).unwrap_or_default();
        self.truncate_stack(base)?;
        Ok(results)
    }

    /// The operand stack, bottom first.
    pub fn stack(&self) -> VmResult<Vec<i32>> {
        let path = Path::runtime("stack");
        match self.lookup(&path, "") {
            Some(Slot::Value(Nbt::List(items))) => items
                .iter()
                .map(|item| match item {
                    Nbt::Int(n) => Ok(*n),
                    other => Err(VmError::TypeMismatch {
                        path: path.render(""),
                        message: format!("stack holds {}", other.render()),
                    }),
                })
                .collect(),
            Some(_) => Err(VmError::TypeMismatch {
                path: path.render(""),
                message: "stack is not a list".into(),
            }),
            None => Err(VmError::MissingPath(path.render(""))),
        }
    }

    pub fn push(&mut self, value: i32) -> VmResult<()> {
        self.append(&Path::runtime("stack"), Nbt::Int(value), "")
    }

    fn truncate_stack(&mut self, len: usize) -> VmResult<()> {
        let path = Path::runtime("stack");
        match storage::lookup_mut(self.root_mut(&path, ""), &path.segments) {
            Some(Nbt::List(items)) => {
                items.truncate(len);
                Ok(())
            }
            _ => Err(VmError::MissingPath(path.render(""))),
        }
    }

    /// The score of `reg`, if anything has written it.
    pub fn score(&self, reg: Reg) -> Option<i32> {
        self.scores.get(&reg).copied()
    }

    pub fn set_score(&mut self, reg: Reg, value: i32) {
        self.scores.insert(reg, value);
    }

    /// The whole storage with the given id, e.g. `demo:__internal`.
    pub fn storage(&self, id: &str) -> Option<&Nbt> {
        self.storages.get(id)
    }

    pub fn gas_used(&self) -> u64 {
        self.gas
    }

    // ══════════════════════════════════════════════════════════════════════
    // Command loop
    // ══════════════════════════════════════════════════════════════════════

    fn tick(&mut self) -> VmResult<()> {
        self.gas += 1;
        if self.gas > self.gas_limit {
            Err(VmError::GasExhausted(self.gas_limit))
        } else {
            Ok(())
        }
    }

    fn function(&self, name: &str) -> VmResult<Rc<Function>> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::UnknownFunction(name.to_string()))
    }

    /// Run a single command outside any loaded function.
    fn run(&mut self, command: Command, namespace: &str) -> VmResult<()> {
        let function = Rc::new(Function {
            namespace: namespace.to_string(),
            commands: vec![command],
        });
        self.gas = 0;
        self.execute_frames(vec![(function, 0)])
    }

    fn execute_frames(&mut self, mut frames: Vec<(Rc<Function>, usize)>) -> VmResult<()> {
        while let Some(top) = frames.last_mut() {
            let function = Rc::clone(&top.0);
            let Some(command) = function.commands.get(top.1) else {
                frames.pop();
                continue;
            };
            top.1 += 1;
            self.tick()?;
            // Callees run in order before the caller's next command.
            for callee in self.step(command, &function.namespace)?.into_iter().rev() {
                frames.push((self.function(&callee)?, 0));
            }
        }
        Ok(())
    }

    /// Run one command; returns the functions it calls.
    fn step(&mut self, command: &Command, namespace: &str) -> VmResult<Vec<String>> {
        match command {
            Command::Execute { subs, run } => self.execute(subs, run.as_deref(), namespace),
            Command::Call(_) | Command::CallTag(_) => self.callees(command, namespace),
            other => self.simple(other, namespace).map(|_| Vec::new()),
        }
    }

    fn callees(&self, command: &Command, namespace: &str) -> VmResult<Vec<String>> {
        match command {
            Command::Call(symbol) => Ok(vec![symbol.qualified_name(namespace)]),
            Command::CallTag(tag) => self
                .tags
                .get(tag.name())
                .cloned()
                .ok_or_else(|| VmError::UnknownFunction(format!("#{}", tag.name()))),
            _ => Ok(Vec::new()),
        }
    }

    fn execute(
        &mut self,
        subs: &[Sub],
        run: Option<&Command>,
        namespace: &str,
    ) -> VmResult<Vec<String>> {
        let mut stores: Vec<&Sub> = Vec::new();
        let mut subs: Vec<&Sub> = subs.iter().collect();
        let mut run = run;
        // Nested `execute ... run execute ...` continues the same chain.
        while let Some(Command::Execute {
            subs: inner,
            run: next,
        }) = run
        {
            subs.extend(inner.iter());
            run = next.as_deref();
        }

        for sub in subs {
            let passed = match sub {
                Sub::If(condition) => self.condition(condition)?,
                Sub::Unless(condition) => !self.condition(condition)?,
                Sub::Store(..) => {
                    stores.push(sub);
                    continue;
                }
            };
            if !passed {
                if run.is_none() {
                    self.apply_stores(&stores, Outcome::failed(), namespace)?;
                }
                return Ok(Vec::new());
            }
        }

        match run {
            None => {
                self.apply_stores(&stores, Outcome::ok(1), namespace)?;
                Ok(Vec::new())
            }
            Some(call @ (Command::Call(_) | Command::CallTag(_))) => {
                if !stores.is_empty() {
                    return Err(VmError::StoreOfCall);
                }
                self.callees(call, namespace)
            }
            Some(command) => {
                let outcome = self.simple(command, namespace)?;
                self.apply_stores(&stores, outcome, namespace)?;
                Ok(Vec::new())
            }
        }
    }

    fn apply_stores(&mut self, stores: &[&Sub], outcome: Outcome, namespace: &str) -> VmResult<()> {
        for sub in stores {
            let Sub::Store(kind, target) = sub else {
                continue;
            };
            let value = outcome.value(*kind);
            match target {
                StoreTarget::Score(reg) => {
                    self.scores.insert(*reg, value);
                }
                StoreTarget::Storage(path, tag) => {
                    let nbt = match tag {
                        NumericTag::Int => Nbt::Int(value),
                        NumericTag::Byte => Nbt::Byte(value as i8),
                    };
                    self.write(path, nbt, namespace)?;
                }
            }
        }
        Ok(())
    }

    fn condition(&self, condition: &Condition) -> VmResult<bool> {
        match condition {
            Condition::Matches(reg, range) => Ok(range.contains(self.read(*reg)?)),
            Condition::Compare(lhs, op, rhs) => Ok(op.holds(self.read(*lhs)?, self.read(*rhs)?)),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Scores and storage
    // ══════════════════════════════════════════════════════════════════════

    fn read(&self, reg: Reg) -> VmResult<i32> {
        self.scores
            .get(&reg)
            .copied()
            .ok_or_else(|| VmError::UnsetScore(reg.name()))
    }

    /// Targets of arithmetic start from 0 when unset.
    fn read_target(&self, reg: Reg) -> i32 {
        self.scores.get(&reg).copied().unwrap_or(0)
    }

    fn simple(&mut self, command: &Command, namespace: &str) -> VmResult<Outcome> {
        match command {
            Command::SetScore(reg, value) => {
                self.scores.insert(*reg, *value);
                Ok(Outcome::ok(*value))
            }
            Command::AddScore(reg, delta) => {
                let value = self.read_target(*reg).wrapping_add(*delta);
                self.scores.insert(*reg, value);
                Ok(Outcome::ok(value))
            }
            Command::Operation(target, op, source) => self.operation(*target, *op, *source),
            Command::GetScore(reg) => self.read(*reg).map(Outcome::ok),
            Command::DataAppendValue(path, value) => {
                self.append(path, value.clone(), namespace)?;
                Ok(Outcome::ok(1))
            }
            Command::DataAppendFrom(path, source) => {
                let value = self.require(source, namespace)?;
                self.append(path, value, namespace)?;
                Ok(Outcome::ok(1))
            }
            Command::DataSetValue(path, value) => self.write(path, value.clone(), namespace),
            Command::DataSetFrom(path, source) => {
                let value = self.require(source, namespace)?;
                self.write(path, value, namespace)
            }
            Command::DataRemove(path) => {
                storage::remove(self.root_mut(path, namespace), &path.segments)
                    .ok_or_else(|| VmError::MissingPath(path.render(namespace)))?;
                Ok(Outcome::ok(1))
            }
            Command::DataGet(path) => Ok(self
                .lookup(path, namespace)
                .map_or(Outcome::failed(), |slot| Outcome::ok(slot.measure()))),
            Command::AddObjective => Ok(Outcome::ok(1)),
            Command::Call(_) | Command::CallTag(_) | Command::Execute { .. } => {
                Err(VmError::StoreOfCall)
            }
        }
    }

    fn operation(&mut self, target: Reg, op: ScoreOp, source: Reg) -> VmResult<Outcome> {
        let rhs = self.read(source)?;
        let lhs = self.read_target(target);
        let value = match op {
            ScoreOp::Assign => rhs,
            ScoreOp::Add => lhs.wrapping_add(rhs),
            ScoreOp::Sub => lhs.wrapping_sub(rhs),
            ScoreOp::Mul => lhs.wrapping_mul(rhs),
            ScoreOp::Div => floor_div(lhs, rhs).unwrap_or(lhs),
            ScoreOp::Mod => floor_mod(lhs, rhs).unwrap_or(lhs),
            ScoreOp::Min => lhs.min(rhs),
            ScoreOp::Max => lhs.max(rhs),
            ScoreOp::Swap => {
                self.scores.insert(source, lhs);
                rhs
            }
        };
        self.scores.insert(target, value);
        Ok(Outcome::ok(value))
    }

    fn root_mut(&mut self, path: &Path, namespace: &str) -> &mut Nbt {
        self.storages
            .entry(path.storage.id(namespace))
            .or_insert_with(|| Nbt::Compound(BTreeMap::new()))
    }

    fn lookup(&self, path: &Path, namespace: &str) -> Option<Slot<'_>> {
        self.storages
            .get(&path.storage.id(namespace))
            .and_then(|root| storage::lookup(root, &path.segments))
    }

    fn require(&self, path: &Path, namespace: &str) -> VmResult<Nbt> {
        self.lookup(path, namespace)
            .map(Slot::to_nbt)
            .ok_or_else(|| VmError::MissingPath(path.render(namespace)))
    }

    fn write(&mut self, path: &Path, value: Nbt, namespace: &str) -> VmResult<Outcome> {
        let changed = storage::write(self.root_mut(path, namespace), &path.segments, value)
            .ok_or_else(|| VmError::MissingPath(path.render(namespace)))?;
        Ok(if changed {
            Outcome::ok(1)
        } else {
            Outcome::failed()
        })
    }

    fn append(&mut self, path: &Path, value: Nbt, namespace: &str) -> VmResult<()> {
        let rendered = path.render(namespace);
        let target = storage::lookup_mut(self.root_mut(path, namespace), &path.segments)
            .ok_or_else(|| VmError::MissingPath(rendered.clone()))?;
        storage::append(target, value).ok_or(VmError::TypeMismatch {
            path: rendered,
            message: "append target is not a list".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_division() {
        assert_eq!(floor_div(7, 2), Some(3));
        assert_eq!(floor_div(-7, 2), Some(-4));
        assert_eq!(floor_div(7, -2), Some(-4));
        assert_eq!(floor_div(-7, -2), Some(3));
        assert_eq!(floor_div(i32::MIN, -1), Some(i32::MIN));
        assert_eq!(floor_div(1, 0), None);
    }

    #[test]
    fn test_floor_modulo() {
        assert_eq!(floor_mod(7, 3), Some(1));
        assert_eq!(floor_mod(-7, 3), Some(2));
        assert_eq!(floor_mod(7, -3), Some(-2));
        assert_eq!(floor_mod(-65536, 65536), Some(0));
        assert_eq!(floor_mod(i32::MIN, -1), Some(0));
        assert_eq!(floor_mod(1, 0), None);
    }
}
