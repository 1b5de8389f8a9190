//! The shared context threaded through the stack-analysis walk.
//!
//! [`StackCtx`] bundles everything an opcode handler needs: the program
//! graph, the variable arena, the engine-function database, the globals
//! stack, and the walk state of the current subroutine (active stack, own
//! frame depth, return bookkeeping). The walkers save and restore the walk
//! state around recursion into callees and branch successors; the borrowed
//! arenas are shared across the whole session.
//!
//! The context also provides the stack/variable primitives the handlers are
//! built from: pushing and popping with reader bookkeeping, duplicating
//! entries, and checking or refining entry types.

use crate::analysis::{Stack, VarId, VariableSpace, VariableType, VariableUse};
use crate::bytecode::{Instruction, InstructionId, InstructionType, Opcode, Script, SubRoutineId};
use crate::engine::{FunctionTable, Game};
use crate::{Error, Result};

/// What the current walk is analyzing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AnalyzeMode {
    /// The global-initializer subroutine, in isolation: JSR is inert and
    /// SAVEBP crystallizes the globals.
    Globals,
    /// Normal script control flow from an entry subroutine.
    SubRoutine,
}

/// A cheap copy of the analyzer-relevant fields of the current instruction.
///
/// Captured once per instruction so handlers can read opcode, arguments and
/// address without holding a borrow of the program graph.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InstrView {
    /// Id of the instruction in the program graph.
    pub id: InstructionId,
    /// Instruction address, for error reporting.
    pub address: u32,
    /// The opcode.
    pub opcode: Opcode,
    /// The instruction-type tag.
    pub ty: InstructionType,
    /// Number of direct arguments (at most three).
    pub argc: usize,
    /// The direct arguments; absent slots read as zero.
    pub args: [i32; 3],
    /// First branch destination, if any.
    pub branch: Option<InstructionId>,
}

impl InstrView {
    /// Captures the analyzer-relevant fields of `instruction`.
    pub fn capture(instruction: &Instruction, id: InstructionId) -> Self {
        let mut args = [0i32; 3];
        for (slot, arg) in args.iter_mut().zip(instruction.args.iter()) {
            *slot = *arg;
        }
        Self {
            id,
            address: instruction.address,
            opcode: instruction.opcode,
            ty: instruction.ty,
            argc: instruction.args.len().min(3),
            args,
            branch: instruction.branches.first().copied(),
        }
    }
}

impl Default for InstrView {
    fn default() -> Self {
        Self {
            id: InstructionId::new(0),
            address: 0,
            opcode: Opcode::Nop,
            ty: InstructionType::None,
            argc: 0,
            args: [0; 3],
            branch: None,
        }
    }
}

/// The full stack-analysis context.
pub(crate) struct StackCtx<'a> {
    /// The current analysis mode.
    pub mode: AnalyzeMode,
    /// The game whose engine-function catalog applies.
    pub game: Game,
    /// The program graph being annotated.
    pub script: &'a mut Script,
    /// The arena of inferred variables.
    pub variables: &'a mut VariableSpace,
    /// The engine-function database.
    pub functions: &'a FunctionTable,
    /// The globals stack, once produced by globals analysis.
    pub globals: Option<&'a mut Stack>,
    /// The subroutine currently being walked.
    pub sub: SubRoutineId,
    /// View of the instruction currently being executed.
    pub cur: InstrView,
    /// The active operand stack.
    pub stack: Stack,
    /// How many stack entries belong to the current subroutine's own frame.
    pub sub_stack: usize,
    /// Whether a RETN has already fired in the current subroutine.
    pub sub_retn: bool,
    /// The stack captured at the current subroutine's first RETN; empty
    /// until one fires.
    pub return_stack: Stack,
}

impl StackCtx<'_> {
    // ---- error builders -------------------------------------------------

    /// A malformed-operand error at the current instruction.
    pub fn malformed(&self, message: impl Into<String>) -> Error {
        Error::MalformedOperand {
            address: self.cur.address,
            opcode: self.cur.opcode.mnemonic(),
            message: message.into(),
        }
    }

    /// A stack-underrun error at the current instruction.
    pub fn underrun(&self, message: impl Into<String>) -> Error {
        Error::StackUnderrun {
            address: self.cur.address,
            opcode: self.cur.opcode.mnemonic(),
            message: message.into(),
        }
    }

    /// A type-mismatch error at the current instruction.
    pub fn mismatch(&self, message: impl Into<String>) -> Error {
        Error::TypeMismatch {
            address: self.cur.address,
            opcode: self.cur.opcode.mnemonic(),
            message: message.into(),
        }
    }

    /// A protocol-violation error at the current instruction.
    pub fn protocol(&self, message: impl Into<String>) -> Error {
        Error::Protocol {
            address: self.cur.address,
            opcode: self.cur.opcode.mnemonic(),
            message: message.into(),
        }
    }

    /// A missing-globals error at the current instruction.
    pub fn missing_globals(&self) -> Error {
        Error::MissingGlobals {
            address: self.cur.address,
            opcode: self.cur.opcode.mnemonic(),
        }
    }

    // ---- variable primitives -------------------------------------------

    /// Allocates a fresh variable created by the current instruction.
    pub fn add_variable(&mut self, var_type: VariableType, usage: VariableUse) -> VarId {
        self.variables.allocate(var_type, usage, Some(self.cur.id))
    }

    /// Allocates a fresh variable and pushes it onto the stack, growing the
    /// current subroutine's frame.
    pub fn push_variable(&mut self, var_type: VariableType, usage: VariableUse) -> VarId {
        self.sub_stack += 1;
        let id = self.add_variable(var_type, usage);
        self.stack.push(id);
        id
    }

    /// Pops the top entry, shrinking the current subroutine's frame.
    ///
    /// With `reading` set, the pop counts as a read and the current
    /// instruction is recorded as a reader of the popped variable; the
    /// non-reading form is for bookkeeping pops (clearing parameters,
    /// reconciling call sites).
    pub fn pop_variable(&mut self, reading: bool) -> Result<VarId> {
        if reading {
            self.read_variable(0)?;
        }

        let id = self
            .stack
            .pop()
            .ok_or_else(|| self.underrun("pop from an empty stack"))?;
        self.sub_stack = self.sub_stack.saturating_sub(1);
        Ok(id)
    }

    /// Records the current instruction as a reader of the entry at `offset`
    /// and returns the entry's type.
    pub fn read_variable(&mut self, offset: usize) -> Result<VariableType> {
        let id = self
            .stack
            .get(offset)
            .ok_or_else(|| self.underrun(format!("no stack entry at depth {offset}")))?;
        let var = &mut self.variables[id];
        var.readers.push(self.cur.id);
        Ok(var.var_type)
    }

    /// Records the current instruction as a writer of the entry at `offset`,
    /// refining the entry's type first unless `var_type` is `Any`.
    pub fn write_variable(&mut self, offset: usize, var_type: VariableType) -> Result<()> {
        let id = self
            .stack
            .get(offset)
            .ok_or_else(|| self.underrun(format!("no stack entry at depth {offset}")))?;
        let var = &mut self.variables[id];
        if var_type != VariableType::Any {
            var.var_type = var_type;
        }
        var.writers.push(self.cur.id);
        Ok(())
    }

    /// Duplicates the entry at `offset` onto the top of the stack.
    ///
    /// The source is recorded as read, the copy gets the source's current
    /// type, and the pair is linked as duplicates for the deferred type
    /// unification.
    pub fn duplicate_variable(&mut self, offset: usize) -> Result<()> {
        let source = self
            .stack
            .get(offset)
            .ok_or_else(|| self.underrun(format!("no stack entry at depth {offset}")))?;
        self.variables[source].readers.push(self.cur.id);
        let source_type = self.variables[source].var_type;

        self.sub_stack += 1;
        let copy = self.add_variable(source_type, VariableUse::Unknown);
        self.stack.push(copy);

        self.variables.record_duplicate(source, copy);
        Ok(())
    }

    /// Returns the type of the entry at `offset`.
    pub fn variable_type(&self, offset: usize) -> Result<VariableType> {
        let id = self
            .stack
            .get(offset)
            .ok_or_else(|| self.underrun(format!("no stack entry at depth {offset}")))?;
        Ok(self.variables[id].var_type)
    }

    /// Returns `true` if the entry at `offset` is untyped or already of
    /// `var_type`.
    pub fn check_variable_type(&self, offset: usize, var_type: VariableType) -> Result<bool> {
        let found = self.variable_type(offset)?;
        Ok(found == VariableType::Any || found == var_type)
    }

    /// Refines the entry at `offset` to `var_type` without recording a read
    /// or write. `Any` leaves the entry untouched.
    pub fn set_variable_type(&mut self, offset: usize, var_type: VariableType) -> Result<()> {
        let id = self
            .stack
            .get(offset)
            .ok_or_else(|| self.underrun(format!("no stack entry at depth {offset}")))?;
        if var_type != VariableType::Any {
            self.variables[id].var_type = var_type;
        }
        Ok(())
    }

    /// Requires the entry at `offset` to be compatible with `var_type` and
    /// refines it, failing with a type mismatch otherwise.
    pub fn refine_variable(&mut self, offset: usize, var_type: VariableType) -> Result<()> {
        if !self.check_variable_type(offset, var_type)? {
            let found = self.variable_type(offset)?;
            return Err(self.mismatch(format!(
                "operand at depth {offset} is {found}, expected {var_type}"
            )));
        }
        self.set_variable_type(offset, var_type)
    }

    /// Forces two variables to the same type: the first concrete type among
    /// the pair wins, preferring `a`'s.
    pub fn same_variable_type(&mut self, a: VarId, b: VarId) {
        let mut var_type = self.variables[a].var_type;
        if var_type == VariableType::Any {
            var_type = self.variables[b].var_type;
        }
        self.variables[a].var_type = var_type;
        self.variables[b].var_type = var_type;
    }

    // ---- globals primitives --------------------------------------------

    /// Number of entries in the globals stack; an error if no globals stack
    /// is available.
    pub fn globals_len(&self) -> Result<usize> {
        match &self.globals {
            Some(globals) => Ok(globals.len()),
            None => Err(self.missing_globals()),
        }
    }

    /// Returns the global at `offset` (0 = top of the globals stack).
    pub fn global_at(&self, offset: usize) -> Result<VarId> {
        match &self.globals {
            Some(globals) => globals
                .get(offset)
                .ok_or_else(|| self.underrun(format!("no global at depth {offset}"))),
            None => Err(self.missing_globals()),
        }
    }
}
