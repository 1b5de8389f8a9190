//! Walkers driving the stack analysis across the control-flow graph.
//!
//! Three layers of recursion mirror the program structure:
//!
//! - [`walk_instruction`] records the frame-restricted stack snapshot on the
//!   current instruction, then dispatches its opcode handler.
//! - [`walk_block`] runs a block's instructions in order, then recurses
//!   depth-first into its successor blocks with a cloned stack per branch,
//!   so sibling paths see identical starting conditions.
//! - [`walk_subroutine`] enters a subroutine with a fresh frame, adopts the
//!   stack captured at its first RETN as the caller's view afterwards, and
//!   memoizes the result: repeated calls only reconcile parameter and
//!   return types against the new call site.
//!
//! Blocks are memoized too, so control-flow cycles (loops) terminate: a
//! block's successors are only entered after the block itself is marked
//! finished. A subroutine observed still-in-progress, however, means
//! recursion, which the analysis rejects as a hard error.

use tracing::{debug, trace};

use crate::analysis::context::{AnalyzeMode, InstrView, StackCtx};
use crate::analysis::handlers::HANDLERS;
use crate::analysis::{Stack, VariableSpace, VariableType, VariableUse, DUMMY_FRAME_SIZE};
use crate::bytecode::{AnalyzeState, BlockId, Script, SubRoutineId};
use crate::engine::{FunctionTable, Game};
use crate::{Error, Result};

/// Executes the current instruction: snapshot first, then opcode semantics.
fn walk_instruction(ctx: &mut StackCtx<'_>) -> Result<()> {
    // Only the current subroutine's own frame is visible to an instruction.
    let snapshot = ctx.stack.top_frame(ctx.sub_stack);
    let id = ctx.cur.id;
    ctx.script[id].stack = Some(snapshot);

    match HANDLERS.get(ctx.cur.opcode as usize).copied().flatten() {
        Some(handler) => handler(ctx),
        None => Ok(()),
    }
}

/// Analyzes one block, then its successors depth-first.
pub(crate) fn walk_block(ctx: &mut StackCtx<'_>, block: BlockId) -> Result<()> {
    match ctx.script[block].analyze_state {
        AnalyzeState::Finished => return Ok(()),
        AnalyzeState::InProgress => {
            return Err(Error::Recursion {
                site: "block",
                address: ctx.script[block].address,
            })
        }
        AnalyzeState::Unvisited => {}
    }

    trace!("analyzing block @{:08X}", ctx.script[block].address);
    ctx.script[block].analyze_state = AnalyzeState::InProgress;

    let instructions = ctx.script[block].instructions.clone();
    for id in instructions {
        ctx.cur = InstrView::capture(&ctx.script[id], id);
        walk_instruction(ctx)?;
    }

    ctx.script[block].analyze_state = AnalyzeState::Finished;

    let edges = ctx.script[block].edges.clone();
    for edge in edges {
        // Calls and stored states are entered through their instructions,
        // not through block flow.
        if edge.kind.is_subroutine_boundary() {
            continue;
        }

        let saved_stack = ctx.stack.clone();
        let saved_sub_stack = ctx.sub_stack;
        let saved_sub_retn = ctx.sub_retn;
        let saved_return_stack = ctx.return_stack.clone();

        walk_block(ctx, edge.target)?;

        // Any path reaching a RETN defines the subroutine's exit shape;
        // everything else the branch did to the stack stays local to it.
        ctx.stack = saved_stack;
        ctx.sub_stack = saved_sub_stack;
        ctx.sub_retn = saved_sub_retn || ctx.sub_retn;
        if ctx.return_stack.is_empty() {
            ctx.return_stack = saved_return_stack;
        }
    }

    Ok(())
}

/// Analyzes one subroutine, memoizing the result.
pub(crate) fn walk_subroutine(ctx: &mut StackCtx<'_>, sub: SubRoutineId) -> Result<()> {
    match ctx.script[sub].analyze_state {
        AnalyzeState::Finished => return reconcile_call_site(ctx, sub),
        AnalyzeState::InProgress => {
            return Err(Error::Recursion {
                site: "subroutine",
                address: ctx.script[sub].address,
            })
        }
        AnalyzeState::Unvisited => {}
    }

    debug!("analyzing subroutine @{:08X}", ctx.script[sub].address);
    ctx.script[sub].analyze_state = AnalyzeState::InProgress;

    let saved_sub = ctx.sub;
    ctx.sub = sub;

    if let Some(entry) = ctx.script[sub].entry() {
        let saved_sub_stack = ctx.sub_stack;
        let saved_sub_retn = ctx.sub_retn;
        let saved_return_stack = std::mem::take(&mut ctx.return_stack);

        ctx.sub_stack = 0;
        ctx.sub_retn = false;

        walk_block(ctx, entry)?;

        // The subroutine's return stack is what the caller sees: its own
        // stack with the parameters consumed and return slots in place.
        ctx.stack = std::mem::replace(&mut ctx.return_stack, saved_return_stack);
        ctx.sub_retn = saved_sub_retn;
        ctx.sub_stack = saved_sub_stack.saturating_sub(ctx.script[sub].params.len());
    }

    ctx.sub = saved_sub;
    ctx.script[sub].analyze_state = AnalyzeState::Finished;

    // Copies recorded during this walk now agree on their types.
    ctx.variables.fixup_types();
    Ok(())
}

/// Cross-checks an already-analyzed subroutine against a new call site.
///
/// Pops the callee's parameters off the caller's stack (without counting as
/// reads) while unifying their types with the stored parameters, then
/// unifies the return slots with the cells left on the stack, in place.
fn reconcile_call_site(ctx: &mut StackCtx<'_>, sub: SubRoutineId) -> Result<()> {
    trace!(
        "subroutine @{:08X} already analyzed, reconciling call site",
        ctx.script[sub].address
    );

    let params = ctx.script[sub].params.clone();
    for param in params {
        let argument = ctx
            .stack
            .get(0)
            .ok_or_else(|| ctx.underrun("call site provides too few parameter cells"))?;
        ctx.same_variable_type(param, argument);
        ctx.pop_variable(false)?;
    }

    let returns = ctx.script[sub].returns.clone();
    let count = returns.len();
    for (index, slot) in returns.into_iter().enumerate() {
        let Some(slot) = slot else { continue };
        let cell = ctx
            .stack
            .get(count - 1 - index)
            .ok_or_else(|| ctx.underrun("call site provides too few return cells"))?;
        ctx.same_variable_type(slot, cell);
    }

    Ok(())
}

/// Seeds the dummy caller frame below an entry subroutine's stack.
///
/// The dummy cells have no creator instruction and stay untyped unless the
/// analyzed code reaches down and uses them.
fn seed_dummy_frame(ctx: &mut StackCtx<'_>) {
    for _ in 0..DUMMY_FRAME_SIZE {
        let var = ctx
            .variables
            .allocate(VariableType::Any, VariableUse::Unknown, None);
        ctx.stack.push(var);
        ctx.sub_stack += 1;
    }
}

/// The stack analyzer for one analysis session.
///
/// Borrows the program graph and variable arena for the session's lifetime;
/// all results are written into them (and, for globals analysis, returned
/// as the globals [`Stack`]).
///
/// # Usage
///
/// ```rust,ignore
/// let mut analyzer = StackAnalyzer::new(&mut script, &mut variables, &functions, game);
/// let mut globals = analyzer.analyze_globals(globals_sub)?;
/// analyzer.analyze_subroutine(entry_sub, Some(&mut globals))?;
/// ```
pub struct StackAnalyzer<'a> {
    script: &'a mut Script,
    variables: &'a mut VariableSpace,
    functions: &'a FunctionTable,
    game: Game,
}

impl<'a> StackAnalyzer<'a> {
    /// Creates an analyzer session over the given program graph.
    #[must_use]
    pub fn new(
        script: &'a mut Script,
        variables: &'a mut VariableSpace,
        functions: &'a FunctionTable,
        game: Game,
    ) -> Self {
        Self {
            script,
            variables,
            functions,
            game,
        }
    }

    /// Analyzes the designated global-initializer subroutine in isolation
    /// and returns the globals stack captured at its SAVEBP instruction.
    ///
    /// Subroutine calls are inert in this mode, so only the initializer's
    /// straight-line globals construction is observed.
    ///
    /// # Errors
    ///
    /// Any analysis error is fatal to the session; see [`Error`].
    ///
    /// # Panics
    ///
    /// Panics if `sub` is not an id of the session's script.
    pub fn analyze_globals(&mut self, sub: SubRoutineId) -> Result<Stack> {
        let mut globals = Stack::new();

        let mut ctx = StackCtx {
            mode: AnalyzeMode::Globals,
            game: self.game,
            script: &mut *self.script,
            variables: &mut *self.variables,
            functions: self.functions,
            globals: Some(&mut globals),
            sub,
            cur: InstrView::default(),
            stack: Stack::new(),
            sub_stack: 0,
            sub_retn: false,
            return_stack: Stack::new(),
        };

        seed_dummy_frame(&mut ctx);
        walk_subroutine(&mut ctx, sub)?;

        Ok(globals)
    }

    /// Analyzes normal script control flow starting at `sub`, following
    /// subroutine calls.
    ///
    /// Pass the stack produced by [`analyze_globals`](Self::analyze_globals)
    /// if the script accesses globals; without one, any BP-relative
    /// instruction fails with [`Error::MissingGlobals`].
    ///
    /// # Errors
    ///
    /// Any analysis error is fatal to the session; see [`Error`].
    ///
    /// # Panics
    ///
    /// Panics if `sub` is not an id of the session's script.
    pub fn analyze_subroutine(
        &mut self,
        sub: SubRoutineId,
        globals: Option<&mut Stack>,
    ) -> Result<()> {
        let mut ctx = StackCtx {
            mode: AnalyzeMode::SubRoutine,
            game: self.game,
            script: &mut *self.script,
            variables: &mut *self.variables,
            functions: self.functions,
            globals,
            sub,
            cur: InstrView::default(),
            stack: Stack::new(),
            sub_stack: 0,
            sub_retn: false,
            return_stack: Stack::new(),
        };

        seed_dummy_frame(&mut ctx);
        walk_subroutine(&mut ctx, sub)
    }
}
