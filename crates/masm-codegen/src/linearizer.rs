//! Structured control flow to flat sequences.
//!
//! The target has no jumps. A pending branch is a value in `#br_depth`: the
//! depth of the targeted construct, or [`NO_BRANCH`]. Sequences run to
//! completion, so after anything that may branch the rest of the current
//! instruction list moves into a fresh pool fragment that is only called
//! while no branch is pending. A construct whose own label is targeted ends
//! with a catch that clears `#br_depth` again.
//!
//! Block bodies are inlined. Loop bodies become self-calling fragments when
//! they branch back to their own label. `if` arms are fragments guarded on
//! the popped condition.
//!
//! Depths count from the function body (depth 0); the label stack holds, per
//! enclosing construct, the operand stack height at entry and the branch
//! arity. Every `compile_block` reports the smallest depth a branch inside
//! it may target, or `u32::MAX` when nothing escapes.

use masm_types::ast::{Expr, FuncType, Instr, ValueType};
use masm_types::MAX_NESTING_DEPTH;

use crate::command::{Command, Nbt, Path, Range, Reg, Sub, NO_BRANCH};
use crate::context::{FragmentId, FragmentPool, Tables};
use crate::error::{CodegenResult, CompileError};
use crate::load_store;
use crate::numeric;
use crate::symbol::{GlobalOp, MemoryOp, Symbol};

/// Minimum branch depth of code that cannot branch out.
pub const NEVER: u32 = NO_BRANCH as u32;

/// An enclosing construct, as seen by branches targeting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    /// Operand stack height outside the construct, below its parameters.
    pub stack_index: u32,
    /// Values a branch to this label carries.
    pub arity: u32,
}

/// What the next instruction in a list should do after one is compiled.
enum Flow {
    Continue,
    /// A branch down to depth `.0` may be pending; continue behind `.1`.
    Guard(u32, Sub),
    /// Control never reaches the next instruction.
    Stop(u32),
}

/// Writes commands to the current list, moving to continuation fragments
/// as control-flow points are passed.
struct Emitter<'o> {
    head: &'o mut Vec<Command>,
    tail: Option<(FragmentId, Vec<Command>)>,
}

impl<'o> Emitter<'o> {
    fn new(head: &'o mut Vec<Command>) -> Self {
        Self { head, tail: None }
    }

    fn current(&mut self) -> &mut Vec<Command> {
        if let Some((_, commands)) = &mut self.tail {
            return commands;
        }
        &mut *self.head
    }

    fn push(&mut self, command: Command) {
        self.current().push(command);
    }

    fn extend(&mut self, commands: impl IntoIterator<Item = Command>) {
        self.current().extend(commands);
    }

    /// Call a new fragment behind `guard` and emit into it from now on.
    fn continue_in(&mut self, pool: &mut FragmentPool, guard: Sub) {
        let id = pool.alloc();
        self.push(Command::call(id.symbol()).guarded(guard));
        if let Some((previous, commands)) = self.tail.replace((id, Vec::new())) {
            pool.set(previous, commands);
        }
    }

    fn finish(self, pool: &mut FragmentPool) {
        if let Some((id, commands)) = self.tail {
            pool.set(id, commands);
        }
    }
}

/// `execute if score #br_depth matches <depth> run scoreboard players set #br_depth MAX`
fn catch(depth: u32) -> Command {
    Command::set(Reg::BrDepth, NO_BRANCH)
        .guarded(Sub::if_matches(Reg::BrDepth, Range::exact(depth as i32)))
}

/// The caller side of the frame convention: move `params` arguments from
/// the operand stack into a new frame, call, then drop the frame.
pub fn call_sequence(target: Symbol, params: u32) -> Vec<Command> {
    let frames = Path::runtime("frames");
    let mut commands = vec![Command::DataAppendValue(frames.clone(), Nbt::empty_list())];
    for i in (1..=params).rev() {
        commands.push(Command::DataAppendFrom(
            frames.clone().index(-1),
            Path::stack(-(i as i32)),
        ));
    }
    for _ in 0..params {
        commands.push(Command::DataRemove(Path::stack(-1)));
    }
    commands.extend([
        Command::call(target),
        Command::DataRemove(frames.index(-1)),
        Command::set(Reg::BrDepth, NO_BRANCH),
    ]);
    commands
}

pub struct Linearizer<'a, 'm> {
    tables: &'a Tables<'m>,
    pool: &'a mut FragmentPool,
    /// Parameters plus declared locals of the function being compiled.
    locals: u32,
}

impl<'a, 'm> Linearizer<'a, 'm> {
    pub fn new(tables: &'a Tables<'m>, pool: &'a mut FragmentPool) -> Self {
        Self {
            tables,
            pool,
            locals: 0,
        }
    }

    /// Body of a function under the frame convention: the caller has pushed
    /// a frame holding the parameters; declared locals start at zero.
    pub fn compile_function(
        &mut self,
        ty: &FuncType,
        locals: &[ValueType],
        body: &Expr,
    ) -> CodegenResult<Vec<Command>> {
        self.locals = (ty.params.len() + locals.len()) as u32;
        let mut out: Vec<Command> = locals
            .iter()
            .map(|_| {
                Command::DataAppendValue(Path::runtime("frames").index(-1), Nbt::Int(0))
            })
            .collect();
        let label = Label {
            stack_index: 0,
            arity: ty.results.len() as u32,
        };
        self.compile_block(&mut out, body, 0, 0, &[label])?;
        Ok(out)
    }

    /// A constant expression; leaves its value on the operand stack.
    pub fn compile_const(&mut self, expr: &Expr) -> CodegenResult<Vec<Command>> {
        self.locals = 0;
        let mut out = Vec::new();
        let label = Label {
            stack_index: 0,
            arity: 1,
        };
        self.compile_block(&mut out, expr, 0, 0, &[label])?;
        Ok(out)
    }

    /// Compile `instrs` at `depth` with `stack` values on the operand stack,
    /// appending to `out`. Returns the minimum depth a branch out of the list
    /// may target.
    pub fn compile_block(
        &mut self,
        out: &mut Vec<Command>,
        instrs: &[Instr],
        depth: u32,
        stack: u32,
        labels: &[Label],
    ) -> CodegenResult<u32> {
        if depth as usize > MAX_NESTING_DEPTH {
            return Err(CompileError::LimitExceeded(format!(
                "control flow nested deeper than {MAX_NESTING_DEPTH}"
            )));
        }
        let mut emitter = Emitter::new(out);
        let result = self.compile_list(&mut emitter, instrs, depth, stack, labels);
        emitter.finish(self.pool);
        result
    }

    fn compile_list(
        &mut self,
        em: &mut Emitter<'_>,
        instrs: &[Instr],
        depth: u32,
        mut stack: u32,
        labels: &[Label],
    ) -> CodegenResult<u32> {
        let mut min = NEVER;
        for (i, instr) in instrs.iter().enumerate() {
            match self.compile_instr(em, instr, depth, &mut stack, labels)? {
                Flow::Continue => {}
                Flow::Guard(target, guard) => {
                    min = min.min(target);
                    if i + 1 < instrs.len() {
                        em.continue_in(self.pool, guard);
                    }
                }
                Flow::Stop(target) => return Ok(min.min(target)),
            }
        }
        Ok(min)
    }

    /// Commands as one callable command: inline when there is exactly one,
    /// a fresh fragment otherwise.
    fn invoke(&mut self, mut commands: Vec<Command>) -> Option<Command> {
        match commands.len() {
            0 => None,
            1 => commands.pop(),
            _ => Some(Command::call(self.pool.add(commands))),
        }
    }

    fn label(&self, labels: &[Label], depth: u32, label: u32) -> CodegenResult<(u32, Label)> {
        if label > depth {
            return Err(CompileError::InvalidLabel { label, depth });
        }
        let target = depth - label;
        labels
            .get(target as usize)
            .map(|l| (target, *l))
            .ok_or(CompileError::InvalidLabel { label, depth })
    }

    /// Drop the values between the label's stack height and its carried
    /// results, then raise the branch.
    fn branch(
        &self,
        stack: u32,
        target: u32,
        label: Label,
        mnemonic: &'static str,
    ) -> CodegenResult<Vec<Command>> {
        let keep = label.stack_index + label.arity;
        let excess = stack
            .checked_sub(keep)
            .ok_or(CompileError::StackUnderflow(mnemonic))?;
        let mut commands: Vec<Command> = (0..excess)
            .map(|_| Command::DataRemove(Path::stack(-(label.arity as i32) - 1)))
            .collect();
        commands.push(Command::set(Reg::BrDepth, target as i32));
        Ok(commands)
    }

    /// Pop the top of the operand stack into `#a`.
    fn pop_to_a(em: &mut Emitter<'_>, stack: &mut u32, mnemonic: &'static str) -> CodegenResult<()> {
        pop(stack, 1, mnemonic)?;
        em.push(Command::load(Reg::A, Path::stack(-1)));
        em.push(Command::DataRemove(Path::stack(-1)));
        Ok(())
    }

    fn compile_instr(
        &mut self,
        em: &mut Emitter<'_>,
        instr: &Instr,
        depth: u32,
        stack: &mut u32,
        labels: &[Label],
    ) -> CodegenResult<Flow> {
        let mnemonic = instr.mnemonic();
        match instr {
            Instr::Nop => Ok(Flow::Continue),

            Instr::Unreachable => {
                em.push(Command::set(Reg::BrDepth, 0));
                Ok(Flow::Stop(0))
            }

            Instr::Block { ty, body } => {
                let (params, results) = self.tables.block_arity(ty)?;
                let base = stack.checked_sub(params).ok_or(CompileError::StackUnderflow(mnemonic))?;
                let inner = with_label(labels, Label {
                    stack_index: base,
                    arity: results,
                });
                let mut body_out = Vec::new();
                let body_min = self.compile_block(&mut body_out, body, depth + 1, *stack, &inner)?;
                em.extend(body_out);
                if body_min <= depth + 1 {
                    em.push(catch(depth + 1));
                }
                *stack = base + results;
                Ok(escape(body_min, depth))
            }

            Instr::Loop { ty, body } => {
                let (params, results) = self.tables.block_arity(ty)?;
                let base = stack.checked_sub(params).ok_or(CompileError::StackUnderflow(mnemonic))?;
                let inner = with_label(labels, Label {
                    stack_index: base,
                    arity: params,
                });
                let mut body_out = Vec::new();
                let body_min = self.compile_block(&mut body_out, body, depth + 1, *stack, &inner)?;
                if body_min <= depth + 1 {
                    let id = self.pool.alloc();
                    let mut fragment = vec![Command::set(Reg::BrDepth, NO_BRANCH)];
                    fragment.extend(body_out);
                    fragment.push(
                        Command::call(id.symbol())
                            .guarded(Sub::if_matches(Reg::BrDepth, Range::exact(depth as i32 + 1))),
                    );
                    self.pool.set(id, fragment);
                    em.push(Command::call(id.symbol()));
                } else {
                    em.extend(body_out);
                }
                *stack = base + results;
                Ok(escape(body_min, depth))
            }

            Instr::If {
                ty,
                consequent,
                alternative,
            } => {
                let (params, results) = self.tables.block_arity(ty)?;
                pop(stack, 1, mnemonic)?;
                let base = stack.checked_sub(params).ok_or(CompileError::StackUnderflow(mnemonic))?;
                let inner = with_label(labels, Label {
                    stack_index: base,
                    arity: results,
                });

                let mut then_out = Vec::new();
                let then_min =
                    self.compile_block(&mut then_out, consequent, depth + 1, *stack, &inner)?;
                let mut else_out = Vec::new();
                let else_min =
                    self.compile_block(&mut else_out, alternative, depth + 1, *stack, &inner)?;
                let then_call = self.invoke(then_out);
                let else_call = self.invoke(else_out);

                let is_zero = Range::exact(0);
                if else_call.is_none() {
                    em.push(Command::load(Reg::A, Path::stack(-1)));
                    em.push(Command::DataRemove(Path::stack(-1)));
                    if let Some(call) = then_call {
                        em.push(call.guarded(Sub::unless_matches(Reg::A, is_zero)));
                    }
                } else {
                    // The condition lives in storage while an arm runs; the
                    // arms clobber `#a`.
                    let conditions = Path::runtime("conditions");
                    em.push(Command::DataAppendFrom(conditions.clone(), Path::stack(-1)));
                    em.push(Command::DataRemove(Path::stack(-1)));
                    if let Some(call) = then_call {
                        em.push(Command::load(Reg::A, conditions.clone().index(-1)));
                        em.push(call.guarded(Sub::unless_matches(Reg::A, is_zero)));
                    }
                    if let Some(call) = else_call {
                        em.push(Command::load(Reg::A, conditions.clone().index(-1)));
                        em.push(call.guarded(Sub::if_matches(Reg::A, is_zero)));
                    }
                    em.push(Command::DataRemove(conditions.index(-1)));
                }

                let body_min = then_min.min(else_min);
                if body_min <= depth + 1 {
                    em.push(catch(depth + 1));
                }
                *stack = base + results;
                Ok(escape(body_min, depth))
            }

            Instr::Br { label } => {
                let (target, l) = self.label(labels, depth, *label)?;
                em.extend(self.branch(*stack, target, l, mnemonic)?);
                Ok(Flow::Stop(target))
            }

            Instr::BrIf { label } => {
                let (target, l) = self.label(labels, depth, *label)?;
                Self::pop_to_a(em, stack, mnemonic)?;
                let commands = self.branch(*stack, target, l, mnemonic)?;
                if let Some(call) = self.invoke(commands) {
                    em.push(call.guarded(Sub::unless_matches(Reg::A, Range::exact(0))));
                }
                Ok(Flow::Guard(
                    target,
                    Sub::if_matches(Reg::A, Range::exact(0)),
                ))
            }

            Instr::BrTable {
                labels: table,
                default,
            } => {
                Self::pop_to_a(em, stack, mnemonic)?;
                let mut min = NEVER;
                for (i, label) in table.iter().enumerate() {
                    let (target, l) = self.label(labels, depth, *label)?;
                    min = min.min(target);
                    let commands = self.branch(*stack, target, l, mnemonic)?;
                    if let Some(call) = self.invoke(commands) {
                        em.push(call.guarded(Sub::if_matches(Reg::A, Range::exact(i as i32))));
                    }
                }
                let (target, l) = self.label(labels, depth, *default)?;
                min = min.min(target);
                let commands = self.branch(*stack, target, l, mnemonic)?;
                if let Some(call) = self.invoke(commands) {
                    if table.is_empty() {
                        em.push(call);
                    } else {
                        let last = table.len() as i32 - 1;
                        em.push(call.guarded(Sub::unless_matches(Reg::A, Range::between(0, last))));
                    }
                }
                Ok(Flow::Stop(min))
            }

            Instr::Return => {
                let (target, l) = self.label(labels, depth, depth)?;
                em.extend(self.branch(*stack, target, l, mnemonic)?);
                Ok(Flow::Stop(target))
            }

            Instr::Call { func } => {
                let ty = self.tables.func(*func)?.ty();
                let params = ty.params.len() as u32;
                let results = ty.results.len() as u32;
                pop(stack, params, mnemonic)?;
                em.extend(call_sequence(Symbol::Func(*func), params));
                *stack += results;
                Ok(Flow::Continue)
            }

            Instr::CallIndirect { .. } => {
                Err(CompileError::UnsupportedInstruction(mnemonic.into()))
            }

            Instr::Drop => {
                pop(stack, 1, mnemonic)?;
                em.push(Command::DataRemove(Path::stack(-1)));
                Ok(Flow::Continue)
            }

            Instr::Select => {
                pop(stack, 3, mnemonic)?;
                em.push(Command::load(Reg::A, Path::stack(-1)));
                em.push(Command::DataRemove(Path::stack(-1)));
                em.push(
                    Command::DataSetFrom(Path::stack(-2), Path::stack(-1))
                        .guarded(Sub::if_matches(Reg::A, Range::exact(0))),
                );
                em.push(Command::DataRemove(Path::stack(-1)));
                *stack += 1;
                Ok(Flow::Continue)
            }

            Instr::LocalGet { local } => {
                self.check_local(*local)?;
                em.push(Command::DataAppendFrom(
                    Path::runtime("stack"),
                    Path::local(*local),
                ));
                *stack += 1;
                Ok(Flow::Continue)
            }

            Instr::LocalSet { local } | Instr::LocalTee { local } => {
                self.check_local(*local)?;
                if *stack == 0 {
                    return Err(CompileError::StackUnderflow(mnemonic));
                }
                em.push(Command::DataSetFrom(Path::local(*local), Path::stack(-1)));
                if matches!(instr, Instr::LocalSet { .. }) {
                    em.push(Command::DataRemove(Path::stack(-1)));
                    *stack -= 1;
                }
                Ok(Flow::Continue)
            }

            Instr::GlobalGet { global } => {
                self.tables.global(*global)?;
                em.push(Command::call(Symbol::Global(*global, GlobalOp::Get)));
                *stack += 1;
                Ok(Flow::Continue)
            }

            Instr::GlobalSet { global } => {
                self.tables.global(*global)?;
                pop(stack, 1, mnemonic)?;
                em.push(Command::call(Symbol::Global(*global, GlobalOp::Set)));
                Ok(Flow::Continue)
            }

            Instr::Load { kind, arg } => {
                self.tables.mem(0)?;
                pop(stack, 1, mnemonic)?;
                em.extend(load_store::lower_load(*kind, *arg)?);
                *stack += 1;
                Ok(Flow::Continue)
            }

            Instr::Store { kind, arg } => {
                self.tables.mem(0)?;
                pop(stack, 2, mnemonic)?;
                em.extend(load_store::lower_store(*kind, *arg)?);
                Ok(Flow::Continue)
            }

            Instr::MemorySize { mem } => {
                self.tables.mem(*mem)?;
                em.push(Command::call(Symbol::Memory(*mem, MemoryOp::Size)));
                *stack += 1;
                Ok(Flow::Continue)
            }

            Instr::MemoryGrow { mem } => {
                self.tables.mem(*mem)?;
                pop(stack, 1, mnemonic)?;
                em.push(Command::call(Symbol::Memory(*mem, MemoryOp::Grow)));
                *stack += 1;
                Ok(Flow::Continue)
            }

            Instr::I32Const { value } => {
                em.push(Command::DataAppendValue(
                    Path::runtime("stack"),
                    Nbt::Int(*value),
                ));
                *stack += 1;
                Ok(Flow::Continue)
            }

            Instr::I64Const { .. } | Instr::F32Const { .. } | Instr::F64Const { .. } => {
                Err(CompileError::UnsupportedInstruction(mnemonic.into()))
            }

            Instr::Numeric { kind } => {
                let lowered = numeric::lower(*kind)?;
                pop(stack, lowered.pops, mnemonic)?;
                em.extend(lowered.commands);
                *stack += lowered.pushes;
                Ok(Flow::Continue)
            }
        }
    }

    fn check_local(&self, local: u32) -> CodegenResult<()> {
        if local < self.locals {
            Ok(())
        } else {
            Err(CompileError::InvalidIndex {
                kind: "local",
                index: local,
            })
        }
    }
}

fn pop(stack: &mut u32, count: u32, mnemonic: &'static str) -> CodegenResult<()> {
    *stack = stack
        .checked_sub(count)
        .ok_or(CompileError::StackUnderflow(mnemonic))?;
    Ok(())
}

fn with_label(labels: &[Label], label: Label) -> Vec<Label> {
    let mut inner = labels.to_vec();
    inner.push(label);
    inner
}

/// Flow after a construct at `depth` whose body may branch to `body_min`.
fn escape(body_min: u32, depth: u32) -> Flow {
    if body_min <= depth {
        Flow::Guard(body_min, Sub::no_branch())
    } else {
        Flow::Continue
    }
}
