//! Per-opcode abstract stack semantics.
//!
//! One handler per opcode family, dispatched through a fixed table indexed
//! by opcode byte. Handlers mutate the shared [`StackCtx`]: they move
//! variable references on the abstract stack, allocate fresh variables for
//! pushed values, refine operand types, and record reads and writes on the
//! variables they touch. Opcodes without a table entry (NOP, JMP, the
//! STORESTATE pair, arrays/references, SCRIPTSIZE) are stack-neutral.
//!
//! # Offset decoding
//!
//! The VM addresses the stack in bytes, one cell being 4 bytes, with
//! negative offsets pointing down from the stack pointer. Handlers decode
//! `stack_index = offset / -4 - 1` and `count = size / 4`; any argument
//! violating the sign or alignment constraints is a malformed operand.

use crate::analysis::context::{AnalyzeMode, StackCtx};
use crate::analysis::walker::walk_subroutine;
use crate::analysis::{VariableType, VariableUse, DUMMY_FRAME_SIZE};
use crate::bytecode::{InstructionType, Opcode};
use crate::Result;

/// An opcode's abstract-semantics rule.
pub(crate) type OpcodeHandler = fn(&mut StackCtx<'_>) -> Result<()>;

/// The opcode-indexed dispatch table. `None` entries are stack-neutral.
pub(crate) const HANDLERS: [Option<OpcodeHandler>; Opcode::TABLE_SIZE] = build_table();

const fn build_table() -> [Option<OpcodeHandler>; Opcode::TABLE_SIZE] {
    let mut table: [Option<OpcodeHandler>; Opcode::TABLE_SIZE] = [None; Opcode::TABLE_SIZE];

    table[Opcode::CpDownSp as usize] = Some(cpdownsp);
    table[Opcode::Rsadd as usize] = Some(push);
    table[Opcode::CpTopSp as usize] = Some(cptopsp);
    table[Opcode::Const as usize] = Some(push);
    table[Opcode::Action as usize] = Some(action);
    table[Opcode::LogAnd as usize] = Some(bool_op);
    table[Opcode::LogOr as usize] = Some(bool_op);
    table[Opcode::IncOr as usize] = Some(bool_op);
    table[Opcode::ExcOr as usize] = Some(bool_op);
    table[Opcode::BoolAnd as usize] = Some(bool_op);
    table[Opcode::Eq as usize] = Some(eq);
    table[Opcode::Neq as usize] = Some(eq);
    table[Opcode::Geq as usize] = Some(eq);
    table[Opcode::Gt as usize] = Some(eq);
    table[Opcode::Lt as usize] = Some(eq);
    table[Opcode::Leq as usize] = Some(eq);
    table[Opcode::ShLeft as usize] = Some(shift);
    table[Opcode::ShRight as usize] = Some(shift);
    table[Opcode::UShRight as usize] = Some(shift);
    table[Opcode::Add as usize] = Some(bin_arithm);
    table[Opcode::Sub as usize] = Some(bin_arithm);
    table[Opcode::Mul as usize] = Some(bin_arithm);
    table[Opcode::Div as usize] = Some(bin_arithm);
    table[Opcode::Mod as usize] = Some(bin_arithm);
    table[Opcode::Neg as usize] = Some(un_arithm);
    table[Opcode::Comp as usize] = Some(un_arithm);
    table[Opcode::MovSp as usize] = Some(pop);
    table[Opcode::Jsr as usize] = Some(jsr);
    table[Opcode::Jz as usize] = Some(cond_jump);
    table[Opcode::Retn as usize] = Some(retn);
    table[Opcode::Destruct as usize] = Some(destruct);
    table[Opcode::Not as usize] = Some(un_arithm);
    table[Opcode::DecSp as usize] = Some(modify_sp);
    table[Opcode::IncSp as usize] = Some(modify_sp);
    table[Opcode::Jnz as usize] = Some(cond_jump);
    table[Opcode::CpDownBp as usize] = Some(cpdownbp);
    table[Opcode::CpTopBp as usize] = Some(cptopbp);
    table[Opcode::DecBp as usize] = Some(modify_bp);
    table[Opcode::IncBp as usize] = Some(modify_bp);
    table[Opcode::SaveBp as usize] = Some(savebp);
    table[Opcode::RestoreBp as usize] = Some(restorebp);

    table
}

/// Decodes a byte offset/size argument pair into a stack index and a cell
/// count, enforcing sign and alignment.
fn decode_offset_size(ctx: &StackCtx<'_>, offset: i32, size: i32) -> Result<(usize, usize)> {
    if size < 0 || size % 4 != 0 || offset > -4 || offset % 4 != 0 {
        return Err(ctx.malformed(format!("invalid arguments {offset}, {size}")));
    }
    Ok(((offset / -4 - 1) as usize, (size / 4) as usize))
}

/// A stack push, from an RSADD or CONST instruction.
fn push(ctx: &mut StackCtx<'_>) -> Result<()> {
    let var_type = ctx.cur.ty.variable_type();
    ctx.push_variable(var_type, VariableUse::Local);
    Ok(())
}

/// A stack pop, from a MOVSP instruction.
///
/// Popping past the bottom of the subroutine's own frame means the
/// subroutine is clearing its parameters: each underrunning pop claims the
/// caller-owned cell as a formal parameter.
fn pop(ctx: &mut StackCtx<'_>) -> Result<()> {
    let arg = ctx.cur.args[0];
    if arg > 0 || arg % 4 != 0 {
        return Err(ctx.malformed(format!("invalid argument {arg}")));
    }

    let mut count = arg / -4;
    while count > 0 {
        if ctx.sub_stack == 0 {
            let param = ctx
                .stack
                .get(0)
                .ok_or_else(|| ctx.underrun("no parameter cell to claim"))?;
            ctx.sub_stack += 1;
            let sub = ctx.sub;
            ctx.script[sub].params.push(param);
            ctx.variables[param].usage = VariableUse::Parameter;
        }

        ctx.pop_variable(false)?;
        count -= 1;
    }
    Ok(())
}

/// A JSR instruction, calling into a subroutine.
fn jsr(ctx: &mut StackCtx<'_>) -> Result<()> {
    // Globals analysis observes only straight-line construction.
    if ctx.mode == AnalyzeMode::Globals {
        return Ok(());
    }

    let target = ctx
        .cur
        .branch
        .ok_or_else(|| ctx.malformed("JSR without a branch destination"))?;
    let block = ctx.script[target].block;
    let block = block.ok_or_else(|| ctx.malformed("JSR destination outside any block"))?;
    let callee = ctx.script[block].sub_routine;
    let callee = callee.ok_or_else(|| ctx.malformed("JSR destination outside any subroutine"))?;

    walk_subroutine(ctx, callee)
}

/// A RETN instruction, returning from a subroutine.
///
/// The first RETN fixes the subroutine's interface: return slots recorded
/// so far that actually were parameter cells are dropped, and the current
/// stack becomes the subroutine's canonical return stack. Later RETNs on
/// other paths change nothing.
fn retn(ctx: &mut StackCtx<'_>) -> Result<()> {
    if ctx.sub_retn {
        return Ok(());
    }

    let sub = ctx.sub;
    let params = ctx.script[sub].params.len();
    let trim = params.min(ctx.script[sub].returns.len());
    ctx.script[sub].returns.drain(..trim);

    let returns: Vec<_> = ctx.script[sub].returns.iter().flatten().copied().collect();
    for var in returns {
        ctx.variables[var].usage = VariableUse::Return;
    }

    ctx.return_stack = ctx.stack.clone();
    ctx.sub_retn = true;
    Ok(())
}

/// A CPTOPSP instruction, duplicating stack cells onto the top.
fn cptopsp(ctx: &mut StackCtx<'_>) -> Result<()> {
    let (offset, count) = decode_offset_size(ctx, ctx.cur.args[0], ctx.cur.args[1])?;

    if offset >= ctx.stack.len() || count > offset + 1 {
        return Err(ctx.underrun("source range outside the stack"));
    }

    // Each push shifts the stack by one, so a fixed source index walks up
    // through the copied range and preserves its order.
    for _ in 0..count {
        ctx.duplicate_variable(offset)?;
    }
    Ok(())
}

/// A CPDOWNSP instruction, copying the top cells down over existing cells.
///
/// Writing below the subroutine's own frame before its first RETN records
/// the destination as a return slot the caller allocated.
fn cpdownsp(ctx: &mut StackCtx<'_>) -> Result<()> {
    let (offset, count) = decode_offset_size(ctx, ctx.cur.args[0], ctx.cur.args[1])?;

    if count > ctx.stack.len() || offset >= ctx.stack.len() || count > offset + 1 {
        return Err(ctx.underrun("destination range outside the stack"));
    }

    for i in 0..count {
        let pos = count - 1 - i;
        let dest = offset - i;

        let mut var_type = ctx.read_variable(pos)?;
        if var_type == VariableType::Any {
            // An untyped source inherits the destination's type.
            var_type = ctx.variable_type(dest)?;
            ctx.set_variable_type(pos, var_type)?;
        }
        ctx.write_variable(dest, var_type)?;

        if !ctx.sub_retn && dest >= ctx.sub_stack {
            let underrun = dest - ctx.sub_stack + 1;
            let slot = ctx
                .stack
                .get(dest)
                .ok_or_else(|| ctx.underrun("missing return slot"))?;

            let sub = ctx.sub;
            let returns = &mut ctx.script[sub].returns;
            if returns.len() < underrun {
                returns.resize(underrun, None);
            }
            returns[underrun - 1] = Some(slot);
        }
    }
    Ok(())
}

/// A CPTOPBP instruction, duplicating globals onto the top of the stack.
fn cptopbp(ctx: &mut StackCtx<'_>) -> Result<()> {
    let (offset, count) = decode_offset_size(ctx, ctx.cur.args[0], ctx.cur.args[1])?;

    let globals_len = ctx.globals_len()?;
    if offset >= globals_len || count > offset + 1 {
        return Err(ctx.underrun("source range outside the globals"));
    }

    for i in 0..count {
        let global = ctx.global_at(offset - i)?;
        ctx.variables[global].readers.push(ctx.cur.id);
        let var_type = ctx.variables[global].var_type;
        ctx.push_variable(var_type, VariableUse::Unknown);
    }
    Ok(())
}

/// A CPDOWNBP instruction, copying the top cells into the globals.
fn cpdownbp(ctx: &mut StackCtx<'_>) -> Result<()> {
    let (offset, count) = decode_offset_size(ctx, ctx.cur.args[0], ctx.cur.args[1])?;

    let globals_len = ctx.globals_len()?;
    if offset >= globals_len || count > offset + 1 {
        return Err(ctx.underrun("destination range outside the globals"));
    }

    for i in 0..count {
        let pos = count - 1 - i;
        let global = ctx.global_at(offset - i)?;

        let mut var_type = ctx.read_variable(pos)?;
        if var_type == VariableType::Any {
            var_type = ctx.variables[global].var_type;
            ctx.set_variable_type(pos, var_type)?;
        }

        ctx.variables[global].writers.push(ctx.cur.id);
        if var_type != VariableType::Any {
            ctx.variables[global].var_type = var_type;
        }
    }
    Ok(())
}

/// An ACTION instruction, calling a game-engine function.
fn action(ctx: &mut StackCtx<'_>) -> Result<()> {
    let function = ctx.cur.args[0];
    let param_count = ctx.cur.args[1];

    if function < 0 || param_count < 0 {
        return Err(ctx.malformed(format!("invalid arguments {function}, {param_count}")));
    }
    let function = function as u32;
    let param_count = param_count as usize;

    let Some(signature) = ctx.functions.signature(ctx.game, function) else {
        return Err(ctx.malformed(format!("unknown engine function {function}")));
    };
    let parameters = signature.parameters.clone();
    let return_type = signature.return_type;

    if parameters.len() < param_count {
        return Err(ctx.malformed(format!(
            "engine function {function} declares {} parameters, {param_count} passed",
            parameters.len()
        )));
    }

    for declared in parameters.iter().take(param_count) {
        // Script-state ("action") parameters are not kept on the stack.
        if *declared == VariableType::ScriptState {
            continue;
        }

        // A vector parameter occupies three float cells.
        let (cells, cell_type) = match declared {
            VariableType::Vector => (3, VariableType::Float),
            other => (1, *other),
        };

        for _ in 0..cells {
            ctx.refine_variable(0, cell_type)?;
            ctx.pop_variable(true)?;
        }
    }

    match return_type {
        VariableType::Void => {}
        VariableType::Vector => {
            ctx.push_variable(VariableType::Float, VariableUse::Local);
            ctx.push_variable(VariableType::Float, VariableUse::Local);
            ctx.push_variable(VariableType::Float, VariableUse::Local);
        }
        other => {
            ctx.push_variable(other, VariableUse::Local);
        }
    }
    Ok(())
}

/// A binary boolean instruction: LOGAND, LOGOR, INCOR, EXCOR, BOOLAND.
fn bool_op(ctx: &mut StackCtx<'_>) -> Result<()> {
    if ctx.stack.len() < 2 {
        return Err(ctx.underrun("two operands required"));
    }

    ctx.refine_variable(0, VariableType::Int)?;
    ctx.refine_variable(1, VariableType::Int)?;

    ctx.pop_variable(true)?;
    ctx.pop_variable(true)?;

    ctx.push_variable(VariableType::Int, VariableUse::Local);
    Ok(())
}

/// A comparison instruction: EQ, NEQ, GEQ, GT, LT, LEQ.
///
/// EQ and NEQ may carry a size argument for structured compares, naming the
/// byte width of each side; both sides are popped and unified pairwise.
fn eq(ctx: &mut StackCtx<'_>) -> Result<()> {
    if ctx.cur.argc == 1 && (ctx.cur.args[0] < 0 || ctx.cur.args[0] % 4 != 0) {
        return Err(ctx.malformed(format!("invalid argument {}", ctx.cur.args[0])));
    }

    let size = if ctx.cur.argc == 1 {
        (ctx.cur.args[0] / 4) as usize
    } else {
        1
    };

    if ctx.stack.len() < 2 * size {
        return Err(ctx.underrun(format!("{} operand cells required", 2 * size)));
    }

    let mut top_side = Vec::with_capacity(size);
    for _ in 0..size {
        top_side.push(ctx.pop_variable(true)?);
    }

    let mut bottom_side = Vec::with_capacity(size);
    for _ in 0..size {
        bottom_side.push(ctx.pop_variable(true)?);
    }

    for (top, bottom) in top_side.iter().zip(bottom_side.iter()) {
        ctx.same_variable_type(*top, *bottom);
    }

    ctx.push_variable(VariableType::Int, VariableUse::Local);
    Ok(())
}

/// A shift instruction: SHLEFT, SHRIGHT, USHRIGHT.
fn shift(ctx: &mut StackCtx<'_>) -> Result<()> {
    if ctx.stack.len() < 2 {
        return Err(ctx.underrun("two operands required"));
    }

    ctx.refine_variable(0, VariableType::Int)?;
    ctx.refine_variable(1, VariableType::Int)?;

    ctx.pop_variable(true)?;
    ctx.pop_variable(true)?;

    ctx.push_variable(VariableType::Int, VariableUse::Local);
    Ok(())
}

/// A unary arithmetic instruction: NEG, COMP, NOT.
fn un_arithm(ctx: &mut StackCtx<'_>) -> Result<()> {
    if ctx.stack.is_empty() {
        return Err(ctx.underrun("one operand required"));
    }

    let var_type = ctx.cur.ty.variable_type();
    if var_type == VariableType::Void {
        return Err(ctx.malformed(format!("invalid instruction type {:?}", ctx.cur.ty)));
    }

    ctx.refine_variable(0, var_type)?;
    ctx.pop_variable(true)?;
    ctx.push_variable(var_type, VariableUse::Local);
    Ok(())
}

/// A binary arithmetic instruction: ADD, SUB, MUL, DIV, MOD.
fn bin_arithm(ctx: &mut StackCtx<'_>) -> Result<()> {
    if ctx.stack.len() < 2 {
        return Err(ctx.underrun("two operands required"));
    }

    let var_type = ctx.cur.ty.variable_type();
    if var_type == VariableType::Void {
        return Err(ctx.malformed(format!("invalid instruction type {:?}", ctx.cur.ty)));
    }

    match ctx.cur.ty {
        InstructionType::IntInt
        | InstructionType::FloatFloat
        | InstructionType::StringString
        | InstructionType::EngineType0EngineType0
        | InstructionType::EngineType1EngineType1
        | InstructionType::EngineType2EngineType2
        | InstructionType::EngineType3EngineType3
        | InstructionType::EngineType4EngineType4
        | InstructionType::EngineType5EngineType5 => {
            for _ in 0..2 {
                ctx.refine_variable(0, var_type)?;
                ctx.pop_variable(true)?;
            }
            ctx.push_variable(var_type, VariableUse::Local);
        }

        InstructionType::IntFloat => {
            ctx.refine_variable(0, VariableType::Float)?;
            ctx.refine_variable(1, VariableType::Int)?;

            ctx.pop_variable(true)?;
            ctx.pop_variable(true)?;

            ctx.push_variable(VariableType::Float, VariableUse::Local);
        }

        InstructionType::FloatInt => {
            ctx.refine_variable(0, VariableType::Int)?;
            ctx.refine_variable(1, VariableType::Float)?;

            ctx.pop_variable(true)?;
            ctx.pop_variable(true)?;

            ctx.push_variable(VariableType::Float, VariableUse::Local);
        }

        InstructionType::VectorVector => {
            if ctx.stack.len() < 6 {
                return Err(ctx.underrun("six float cells required"));
            }
            for offset in 0..6 {
                ctx.refine_variable(offset, VariableType::Float)?;
            }
            for _ in 0..6 {
                ctx.pop_variable(true)?;
            }
            ctx.push_variable(VariableType::Float, VariableUse::Local);
            ctx.push_variable(VariableType::Float, VariableUse::Local);
            ctx.push_variable(VariableType::Float, VariableUse::Local);
        }

        InstructionType::VectorFloat | InstructionType::FloatVector => {
            if ctx.stack.len() < 4 {
                return Err(ctx.underrun("four float cells required"));
            }
            for offset in 0..4 {
                ctx.refine_variable(offset, VariableType::Float)?;
            }
            for _ in 0..4 {
                ctx.pop_variable(true)?;
            }
            ctx.push_variable(VariableType::Float, VariableUse::Local);
            ctx.push_variable(VariableType::Float, VariableUse::Local);
            ctx.push_variable(VariableType::Float, VariableUse::Local);
        }

        _ => return Err(ctx.malformed(format!("invalid instruction type {:?}", ctx.cur.ty))),
    }
    Ok(())
}

/// A conditional jump: JZ, JNZ. Consumes the condition; the block walker
/// handles the successors.
fn cond_jump(ctx: &mut StackCtx<'_>) -> Result<()> {
    ctx.refine_variable(0, VariableType::Int)?;
    ctx.pop_variable(true)?;
    Ok(())
}

/// A DESTRUCT instruction, removing cells while carrying a protected range
/// to the new top.
fn destruct(ctx: &mut StackCtx<'_>) -> Result<()> {
    let stack_size = ctx.cur.args[0];
    let dont_remove_offset = ctx.cur.args[1];
    let dont_remove_size = ctx.cur.args[2];

    if stack_size % 4 != 0
        || dont_remove_offset % 4 != 0
        || dont_remove_size % 4 != 0
        || stack_size < 0
        || dont_remove_offset < 0
        || dont_remove_size < 0
    {
        return Err(ctx.malformed(format!(
            "invalid arguments {stack_size}, {dont_remove_offset}, {dont_remove_size}"
        )));
    }

    if (stack_size / 4) as usize > ctx.stack.len() {
        return Err(ctx.underrun("removal range outside the stack"));
    }

    let mut kept = Vec::new();
    let mut remaining = stack_size;
    while remaining > 0 {
        let survives = remaining <= dont_remove_offset + dont_remove_size
            && remaining > dont_remove_offset;

        // Plain removal, not a read: DESTRUCT discards cells unseen.
        if let Some(var) = ctx.stack.pop() {
            if survives {
                kept.push(var);
            }
        }
        ctx.sub_stack = ctx.sub_stack.saturating_sub(1);

        remaining -= 4;
    }

    for var in kept.into_iter().rev() {
        ctx.sub_stack += 1;
        ctx.stack.push(var);
    }
    Ok(())
}

/// A SAVEBP instruction. Only valid while analyzing the global initializer,
/// and only once: the current stack, minus the dummy caller frame, becomes
/// the script's globals.
fn savebp(ctx: &mut StackCtx<'_>) -> Result<()> {
    if ctx.mode != AnalyzeMode::Globals {
        return Err(ctx.protocol("SAVEBP outside of globals analysis"));
    }
    if ctx.globals.is_none() {
        return Err(ctx.missing_globals());
    }
    if ctx.globals.as_deref().is_some_and(|g| !g.is_empty()) {
        return Err(ctx.protocol("multiple SAVEBP instructions"));
    }

    let mut frame = ctx.stack.clone();
    frame.drop_bottom(frame.len().min(DUMMY_FRAME_SIZE));

    for var in frame.iter() {
        ctx.variables[var].usage = VariableUse::Global;
    }
    if let Some(globals) = ctx.globals.as_deref_mut() {
        *globals = frame;
    }

    // SAVEBP leaves the previous BP value on the stack.
    ctx.push_variable(VariableType::Int, VariableUse::Local);
    Ok(())
}

/// A RESTOREBP instruction, consuming the previously saved BP value.
fn restorebp(ctx: &mut StackCtx<'_>) -> Result<()> {
    ctx.pop_variable(true)?;
    Ok(())
}

/// A DECSP or INCSP instruction, modifying a stack cell in place.
fn modify_sp(ctx: &mut StackCtx<'_>) -> Result<()> {
    let arg = ctx.cur.args[0];
    if arg > -4 || arg % 4 != 0 {
        return Err(ctx.malformed(format!("invalid argument {arg}")));
    }
    let offset = (arg / -4 - 1) as usize;

    if offset >= ctx.stack.len() {
        return Err(ctx.underrun("no cell at the given offset"));
    }

    ctx.refine_variable(offset, VariableType::Int)?;
    ctx.read_variable(offset)?;
    ctx.write_variable(offset, VariableType::Any)?;
    Ok(())
}

/// A DECBP or INCBP instruction, modifying a global cell in place.
fn modify_bp(ctx: &mut StackCtx<'_>) -> Result<()> {
    let arg = ctx.cur.args[0];
    if arg > -4 || arg % 4 != 0 {
        return Err(ctx.malformed(format!("invalid argument {arg}")));
    }
    let offset = (arg / -4 - 1) as usize;

    if offset >= ctx.globals_len()? {
        return Err(ctx.underrun("no global at the given offset"));
    }

    let global = ctx.global_at(offset)?;
    ctx.variables[global].readers.push(ctx.cur.id);
    ctx.variables[global].writers.push(ctx.cur.id);
    Ok(())
}
