//! End-to-end stack analysis tests.
//!
//! Each test assembles a small program through the public construction API,
//! runs the analyzer over it, and checks the outputs written back into the
//! graph: inferred variables, parameter/return lists, globals, and
//! per-instruction stack snapshots.

use aurorascope::prelude::*;

fn inst(address: u32, opcode: Opcode, ty: InstructionType) -> Instruction {
    Instruction::new(address, opcode, ty)
}

fn analyze(script: &mut Script, variables: &mut VariableSpace, entry: SubRoutineId) -> Result<()> {
    let functions = FunctionTable::new();
    analyze_with(script, variables, entry, &functions)
}

fn analyze_with(
    script: &mut Script,
    variables: &mut VariableSpace,
    entry: SubRoutineId,
    functions: &FunctionTable,
) -> Result<()> {
    StackAnalyzer::new(script, variables, functions, Game::Nwn).analyze_subroutine(entry, None)
}

/// Id of the variable sitting on top of the dummy frame.
fn top_dummy() -> VarId {
    VarId::new(DUMMY_FRAME_SIZE - 1)
}

/// First variable id past the dummy frame.
fn var(offset: usize) -> VarId {
    VarId::new(DUMMY_FRAME_SIZE + offset)
}

#[test]
fn test_parameter_capture() -> Result<()> {
    let mut script = Script::new();

    let main = script.add_subroutine(0x00);
    let main_block = script.add_block(main, 0x00);
    let callee = script.add_subroutine(0x10);
    let callee_block = script.add_block(callee, 0x10);

    script.add_instruction(main_block, inst(0x00, Opcode::Rsadd, InstructionType::Int));
    let jsr = script.add_instruction(main_block, inst(0x02, Opcode::Jsr, InstructionType::None));
    let main_retn =
        script.add_instruction(main_block, inst(0x08, Opcode::Retn, InstructionType::None));

    let movsp = script.add_instruction(
        callee_block,
        inst(0x10, Opcode::MovSp, InstructionType::None).with_args(&[-4]),
    );
    script.add_instruction(callee_block, inst(0x12, Opcode::Retn, InstructionType::None));

    script.add_branch(jsr, movsp);
    script.add_edge(main_block, callee_block, BlockEdgeKind::FunctionCall);

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    // The MOVSP underrun claimed the caller's push as a formal parameter.
    assert_eq!(script[callee].params, vec![var(0)]);
    assert_eq!(variables[var(0)].var_type, VariableType::Int);
    assert_eq!(variables[var(0)].usage, VariableUse::Parameter);
    assert!(script[callee].returns.is_empty());

    // The callee starts with an empty frame of its own.
    assert_eq!(script[movsp].stack, Some(Stack::new()));

    // After the call the caller's own frame is empty again.
    assert_eq!(script[main_retn].stack, Some(Stack::new()));

    Ok(())
}

#[test]
fn test_return_capture() -> Result<()> {
    let mut script = Script::new();

    let main = script.add_subroutine(0x00);
    let main_block = script.add_block(main, 0x00);
    let callee = script.add_subroutine(0x10);
    let callee_block = script.add_block(callee, 0x10);

    // The caller allocates a placeholder cell for the return value.
    script.add_instruction(main_block, inst(0x00, Opcode::Rsadd, InstructionType::Int));
    let jsr = script.add_instruction(main_block, inst(0x02, Opcode::Jsr, InstructionType::None));
    let main_retn =
        script.add_instruction(main_block, inst(0x08, Opcode::Retn, InstructionType::None));

    // The callee computes a value, copies it into the caller's placeholder,
    // cleans its local, and returns.
    let const_int = script.add_instruction(
        callee_block,
        inst(0x10, Opcode::Const, InstructionType::Int),
    );
    script.add_instruction(
        callee_block,
        inst(0x16, Opcode::CpDownSp, InstructionType::Direct).with_args(&[-8, 4]),
    );
    script.add_instruction(
        callee_block,
        inst(0x1E, Opcode::MovSp, InstructionType::None).with_args(&[-4]),
    );
    script.add_instruction(callee_block, inst(0x20, Opcode::Retn, InstructionType::None));

    script.add_branch(jsr, const_int);
    script.add_edge(main_block, callee_block, BlockEdgeKind::FunctionCall);

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    // The CPDOWNSP underrun recorded the caller's placeholder as the one
    // return slot.
    assert_eq!(script[callee].returns, vec![Some(var(0))]);
    assert!(script[callee].params.is_empty());
    assert_eq!(variables[var(0)].var_type, VariableType::Int);
    assert_eq!(variables[var(0)].usage, VariableUse::Return);

    // The caller sees the returned int as the single cell of its frame.
    let snapshot = script[main_retn].stack.clone().expect("snapshot recorded");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get(0), Some(var(0)));

    Ok(())
}

#[test]
fn test_vector_action_return() -> Result<()> {
    let mut functions = FunctionTable::new();
    functions.insert(
        Game::Nwn,
        7,
        FunctionSignature::new(vec![], VariableType::Vector),
    );

    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);

    script.add_instruction(block, inst(0x00, Opcode::Const, InstructionType::Float));
    script.add_instruction(block, inst(0x06, Opcode::Const, InstructionType::Float));
    script.add_instruction(block, inst(0x0C, Opcode::Const, InstructionType::Float));
    let action = script.add_instruction(
        block,
        inst(0x12, Opcode::Action, InstructionType::None).with_args(&[7, 0]),
    );
    let retn = script.add_instruction(block, inst(0x18, Opcode::Retn, InstructionType::None));

    let mut variables = VariableSpace::new();
    analyze_with(&mut script, &mut variables, main, &functions)?;

    // Right before the call, exactly the three pushed floats are visible.
    let before = script[action].stack.clone().expect("snapshot recorded");
    assert_eq!(before.len(), 3);
    for cell in before.iter() {
        assert_eq!(variables[cell].var_type, VariableType::Float);
    }

    // The vector return adds three fresh floats on top.
    let after = script[retn].stack.clone().expect("snapshot recorded");
    assert_eq!(after.len(), 6);
    for cell in after.iter() {
        assert_eq!(variables[cell].var_type, VariableType::Float);
    }

    Ok(())
}

#[test]
fn test_duplicate_typing() -> Result<()> {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);

    script.add_instruction(block, inst(0x00, Opcode::Const, InstructionType::Float));
    script.add_instruction(
        block,
        inst(0x06, Opcode::CpTopSp, InstructionType::Direct).with_args(&[-4, 4]),
    );
    script.add_instruction(block, inst(0x0E, Opcode::Retn, InstructionType::None));

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    // The copy inherited the source's concrete type directly.
    assert_eq!(variables[var(0)].var_type, VariableType::Float);
    assert_eq!(variables[var(1)].var_type, VariableType::Float);

    // Fixup has collapsed the duplicate links.
    assert!(variables[var(0)].duplicates.is_empty());
    assert!(variables[var(1)].duplicates.is_empty());

    Ok(())
}

#[test]
fn test_duplicate_fixup_upgrades_untyped_source() -> Result<()> {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);

    // Duplicate the untyped top of the dummy frame, then force the copy to
    // float through use; fixup must upgrade the source as well.
    script.add_instruction(
        block,
        inst(0x00, Opcode::CpTopSp, InstructionType::Direct).with_args(&[-4, 4]),
    );
    script.add_instruction(block, inst(0x08, Opcode::Neg, InstructionType::Float));
    script.add_instruction(
        block,
        inst(0x0A, Opcode::MovSp, InstructionType::None).with_args(&[-4]),
    );
    script.add_instruction(block, inst(0x10, Opcode::Retn, InstructionType::None));

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    assert_eq!(variables[var(0)].var_type, VariableType::Float);
    assert_eq!(variables[top_dummy()].var_type, VariableType::Float);

    Ok(())
}

#[test]
fn test_recursion_detection() {
    let mut script = Script::new();
    let sub = script.add_subroutine(0x40);
    let block = script.add_block(sub, 0x40);

    let jsr = script.add_instruction(block, inst(0x40, Opcode::Jsr, InstructionType::None));
    script.add_branch(jsr, jsr);
    script.add_edge(block, block, BlockEdgeKind::FunctionCall);

    let mut variables = VariableSpace::new();
    let result = analyze(&mut script, &mut variables, sub);

    match result {
        Err(Error::Recursion { site, address }) => {
            assert_eq!(site, "subroutine");
            assert_eq!(address, 0x40);
        }
        other => panic!("expected a recursion error, got {other:?}"),
    }
}

#[test]
fn test_savebp_crystallizes_globals() -> Result<()> {
    let mut script = Script::new();
    let init = script.add_subroutine(0x00);
    let block = script.add_block(init, 0x00);

    script.add_instruction(block, inst(0x00, Opcode::Rsadd, InstructionType::Int));
    script.add_instruction(block, inst(0x02, Opcode::Rsadd, InstructionType::Float));
    script.add_instruction(block, inst(0x04, Opcode::Rsadd, InstructionType::String));
    script.add_instruction(block, inst(0x06, Opcode::Rsadd, InstructionType::Object));
    script.add_instruction(block, inst(0x08, Opcode::Rsadd, InstructionType::Int));
    script.add_instruction(block, inst(0x0A, Opcode::SaveBp, InstructionType::None));
    script.add_instruction(block, inst(0x0C, Opcode::Retn, InstructionType::None));

    let mut variables = VariableSpace::new();
    let functions = FunctionTable::new();
    let globals = StackAnalyzer::new(&mut script, &mut variables, &functions, Game::Nwn)
        .analyze_globals(init)?;

    // Five globals, top of the globals stack being the last one pushed.
    assert_eq!(globals.len(), 5);
    let expected = [
        VariableType::Int,
        VariableType::Object,
        VariableType::String,
        VariableType::Float,
        VariableType::Int,
    ];
    for (cell, expected) in globals.iter().zip(expected) {
        assert_eq!(variables[cell].var_type, expected);
        assert_eq!(variables[cell].usage, VariableUse::Global);
    }

    // SAVEBP left the saved BP value behind as a local int.
    assert_eq!(variables[var(5)].var_type, VariableType::Int);
    assert_eq!(variables[var(5)].usage, VariableUse::Local);

    Ok(())
}

#[test]
fn test_globals_reads_and_writes() -> Result<()> {
    let mut script = Script::new();

    let init = script.add_subroutine(0x00);
    let init_block = script.add_block(init, 0x00);
    script.add_instruction(init_block, inst(0x00, Opcode::Rsadd, InstructionType::Int));
    script.add_instruction(init_block, inst(0x02, Opcode::SaveBp, InstructionType::None));
    script.add_instruction(init_block, inst(0x04, Opcode::Retn, InstructionType::None));

    let main = script.add_subroutine(0x10);
    let main_block = script.add_block(main, 0x10);
    script.add_instruction(
        main_block,
        inst(0x10, Opcode::CpTopBp, InstructionType::Direct).with_args(&[-4, 4]),
    );
    script.add_instruction(main_block, inst(0x18, Opcode::Const, InstructionType::Int));
    script.add_instruction(
        main_block,
        inst(0x1E, Opcode::CpDownBp, InstructionType::Direct).with_args(&[-4, 4]),
    );
    script.add_instruction(
        main_block,
        inst(0x26, Opcode::IncBp, InstructionType::None).with_args(&[-4]),
    );
    script.add_instruction(
        main_block,
        inst(0x2C, Opcode::MovSp, InstructionType::None).with_args(&[-8]),
    );
    let retn = script.add_instruction(main_block, inst(0x32, Opcode::Retn, InstructionType::None));

    let mut variables = VariableSpace::new();
    let functions = FunctionTable::new();
    let mut analyzer = StackAnalyzer::new(&mut script, &mut variables, &functions, Game::Nwn);
    let mut globals = analyzer.analyze_globals(init)?;
    analyzer.analyze_subroutine(main, Some(&mut globals))?;

    let global = globals.get(0).expect("one global");
    assert_eq!(variables[global].var_type, VariableType::Int);
    assert_eq!(variables[global].usage, VariableUse::Global);

    // CPTOPBP and INCBP read it; CPDOWNBP and INCBP write it.
    assert_eq!(variables[global].readers.len(), 2);
    assert_eq!(variables[global].writers.len(), 2);

    assert_eq!(script[retn].stack, Some(Stack::new()));

    Ok(())
}

#[test]
fn test_cptopsp_cpdownsp_roundtrip() -> Result<()> {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);

    script.add_instruction(block, inst(0x00, Opcode::Const, InstructionType::Int));
    script.add_instruction(
        block,
        inst(0x06, Opcode::CpTopSp, InstructionType::Direct).with_args(&[-4, 4]),
    );
    let copy_down = script.add_instruction(
        block,
        inst(0x0E, Opcode::CpDownSp, InstructionType::Direct).with_args(&[-8, 4]),
    );
    let retn = script.add_instruction(block, inst(0x16, Opcode::Retn, InstructionType::None));

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    // The copy-down writes over the source; depth is unchanged and both
    // cells agree on the type.
    let before = script[copy_down].stack.clone().expect("snapshot recorded");
    let after = script[retn].stack.clone().expect("snapshot recorded");
    assert_eq!(before.len(), 2);
    assert_eq!(after.len(), 2);
    assert_eq!(variables[var(0)].var_type, VariableType::Int);
    assert_eq!(variables[var(1)].var_type, VariableType::Int);
    assert!(!variables[var(0)].writers.is_empty());

    Ok(())
}

#[test]
fn test_destruct_keeping_everything_is_a_stack_noop() -> Result<()> {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);

    script.add_instruction(block, inst(0x00, Opcode::Const, InstructionType::Int));
    script.add_instruction(block, inst(0x06, Opcode::Const, InstructionType::Float));
    let destruct = script.add_instruction(
        block,
        inst(0x0C, Opcode::Destruct, InstructionType::None).with_args(&[8, 0, 8]),
    );
    let retn = script.add_instruction(block, inst(0x14, Opcode::Retn, InstructionType::None));

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    let before = script[destruct].stack.clone().expect("snapshot recorded");
    let after = script[retn].stack.clone().expect("snapshot recorded");
    assert_eq!(before, after);
    assert_eq!(after.get(0), Some(var(1)));
    assert_eq!(after.get(1), Some(var(0)));

    Ok(())
}

#[test]
fn test_destruct_carries_protected_range() -> Result<()> {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);

    // Three cells; remove all but the middle one.
    script.add_instruction(block, inst(0x00, Opcode::Const, InstructionType::Int));
    script.add_instruction(block, inst(0x06, Opcode::Const, InstructionType::Float));
    script.add_instruction(block, inst(0x0C, Opcode::Const, InstructionType::String));
    script.add_instruction(
        block,
        inst(0x12, Opcode::Destruct, InstructionType::None).with_args(&[12, 4, 4]),
    );
    let retn = script.add_instruction(block, inst(0x1A, Opcode::Retn, InstructionType::None));

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    let after = script[retn].stack.clone().expect("snapshot recorded");
    assert_eq!(after.len(), 1);
    assert_eq!(after.get(0), Some(var(1)));
    assert_eq!(variables[var(1)].var_type, VariableType::Float);

    Ok(())
}

#[test]
fn test_second_call_reconciles_without_reanalyzing() -> Result<()> {
    let mut script = Script::new();

    let main = script.add_subroutine(0x00);
    let main_block = script.add_block(main, 0x00);
    let callee = script.add_subroutine(0x20);
    let callee_block = script.add_block(callee, 0x20);

    script.add_instruction(main_block, inst(0x00, Opcode::Rsadd, InstructionType::Int));
    let jsr_a = script.add_instruction(main_block, inst(0x02, Opcode::Jsr, InstructionType::None));
    script.add_instruction(main_block, inst(0x08, Opcode::Rsadd, InstructionType::Int));
    let jsr_b = script.add_instruction(main_block, inst(0x0A, Opcode::Jsr, InstructionType::None));
    let retn = script.add_instruction(main_block, inst(0x10, Opcode::Retn, InstructionType::None));

    let movsp = script.add_instruction(
        callee_block,
        inst(0x20, Opcode::MovSp, InstructionType::None).with_args(&[-4]),
    );
    script.add_instruction(callee_block, inst(0x22, Opcode::Retn, InstructionType::None));

    script.add_branch(jsr_a, movsp);
    script.add_branch(jsr_b, movsp);
    script.add_edge(main_block, callee_block, BlockEdgeKind::FunctionCall);

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    // One full analysis, one reconciliation: the interface did not grow.
    assert_eq!(script[callee].params.len(), 1);
    assert!(script[callee].returns.is_empty());
    assert_eq!(script[callee].analyze_state, AnalyzeState::Finished);

    // Both arguments were consumed; only the dummy frame and the two pushes
    // were ever allocated.
    assert_eq!(variables.len(), DUMMY_FRAME_SIZE + 2);
    assert_eq!(variables[var(1)].var_type, VariableType::Int);
    assert_eq!(script[retn].stack, Some(Stack::new()));

    Ok(())
}

#[test]
fn test_branches_see_identical_stacks() -> Result<()> {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);

    let head = script.add_block(main, 0x00);
    let on_true = script.add_block(main, 0x10);
    let on_false = script.add_block(main, 0x20);
    let tail = script.add_block(main, 0x30);

    script.add_instruction(head, inst(0x00, Opcode::Const, InstructionType::Int));
    script.add_instruction(head, inst(0x06, Opcode::Jz, InstructionType::None));

    let true_push = script.add_instruction(on_true, inst(0x10, Opcode::Rsadd, InstructionType::Int));
    script.add_instruction(
        on_true,
        inst(0x12, Opcode::MovSp, InstructionType::None).with_args(&[-4]),
    );

    let false_push =
        script.add_instruction(on_false, inst(0x20, Opcode::Rsadd, InstructionType::Float));
    script.add_instruction(
        on_false,
        inst(0x22, Opcode::MovSp, InstructionType::None).with_args(&[-4]),
    );

    let retn = script.add_instruction(tail, inst(0x30, Opcode::Retn, InstructionType::None));

    script.add_edge(head, on_true, BlockEdgeKind::ConditionalTrue);
    script.add_edge(head, on_false, BlockEdgeKind::ConditionalFalse);
    script.add_edge(on_true, tail, BlockEdgeKind::Unconditional);
    script.add_edge(on_false, tail, BlockEdgeKind::Unconditional);

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    // Both arms started from the same cloned stack and pushed their own
    // variable on an empty frame.
    assert_eq!(script[true_push].stack, Some(Stack::new()));
    assert_eq!(script[false_push].stack, Some(Stack::new()));
    assert_eq!(script[retn].stack, Some(Stack::new()));

    for block in script.blocks() {
        assert_eq!(block.analyze_state, AnalyzeState::Finished);
    }

    Ok(())
}

#[test]
fn test_loops_terminate_via_block_memoization() -> Result<()> {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);

    let head = script.add_block(main, 0x00);
    let body = script.add_block(main, 0x10);
    let exit = script.add_block(main, 0x20);

    script.add_instruction(head, inst(0x00, Opcode::Const, InstructionType::Int));
    script.add_instruction(head, inst(0x06, Opcode::Jz, InstructionType::None));

    script.add_instruction(body, inst(0x10, Opcode::Jmp, InstructionType::None));

    script.add_instruction(exit, inst(0x20, Opcode::Retn, InstructionType::None));

    script.add_edge(head, body, BlockEdgeKind::ConditionalTrue);
    script.add_edge(head, exit, BlockEdgeKind::ConditionalFalse);
    script.add_edge(body, head, BlockEdgeKind::Unconditional);

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    assert_eq!(script[main].analyze_state, AnalyzeState::Finished);
    Ok(())
}

#[test]
fn test_action_parameter_kinds() -> Result<()> {
    let mut functions = FunctionTable::new();
    // An engine function taking an int and a deferred action; the action
    // parameter never occupies a stack cell.
    functions.insert(
        Game::Nwn,
        2,
        FunctionSignature::new(
            vec![VariableType::Int, VariableType::ScriptState],
            VariableType::Void,
        ),
    );
    // An engine function consuming a whole vector (three float cells).
    functions.insert(
        Game::Nwn,
        3,
        FunctionSignature::new(vec![VariableType::Vector], VariableType::Object),
    );

    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);

    script.add_instruction(block, inst(0x00, Opcode::Const, InstructionType::Int));
    script.add_instruction(
        block,
        inst(0x06, Opcode::Action, InstructionType::None).with_args(&[2, 2]),
    );
    script.add_instruction(block, inst(0x0C, Opcode::Const, InstructionType::Float));
    script.add_instruction(block, inst(0x12, Opcode::Const, InstructionType::Float));
    script.add_instruction(block, inst(0x18, Opcode::Const, InstructionType::Float));
    script.add_instruction(
        block,
        inst(0x1E, Opcode::Action, InstructionType::None).with_args(&[3, 1]),
    );
    let retn = script.add_instruction(block, inst(0x24, Opcode::Retn, InstructionType::None));

    let mut variables = VariableSpace::new();
    analyze_with(&mut script, &mut variables, main, &functions)?;

    // Only the object returned by function 3 is left on the frame.
    let snapshot = script[retn].stack.clone().expect("snapshot recorded");
    assert_eq!(snapshot.len(), 1);
    let result = snapshot.get(0).expect("one cell");
    assert_eq!(variables[result].var_type, VariableType::Object);

    Ok(())
}

#[test]
fn test_structured_compare_unifies_both_sides() -> Result<()> {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);

    script.add_instruction(block, inst(0x00, Opcode::Const, InstructionType::Int));
    script.add_instruction(block, inst(0x06, Opcode::Const, InstructionType::Float));
    script.add_instruction(block, inst(0x0C, Opcode::Rsadd, InstructionType::Int));
    script.add_instruction(block, inst(0x0E, Opcode::Rsadd, InstructionType::Float));
    let eq = script.add_instruction(
        block,
        inst(0x10, Opcode::Eq, InstructionType::StructStruct).with_args(&[8]),
    );
    let retn = script.add_instruction(block, inst(0x18, Opcode::Retn, InstructionType::None));

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    // Both sides were popped and the comparison result remains.
    let snapshot = script[retn].stack.clone().expect("snapshot recorded");
    assert_eq!(snapshot.len(), 1);
    let result = snapshot.get(0).expect("one cell");
    assert_eq!(variables[result].var_type, VariableType::Int);
    assert_eq!(variables[result].creator, Some(eq));

    // Pairwise unification: int/int and float/float across the two sides.
    assert_eq!(variables[var(0)].var_type, VariableType::Int);
    assert_eq!(variables[var(2)].var_type, VariableType::Int);
    assert_eq!(variables[var(1)].var_type, VariableType::Float);
    assert_eq!(variables[var(3)].var_type, VariableType::Float);

    Ok(())
}

#[test]
fn test_arithmetic_and_in_place_modification() -> Result<()> {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);

    script.add_instruction(block, inst(0x00, Opcode::Const, InstructionType::Int));
    script.add_instruction(block, inst(0x06, Opcode::Const, InstructionType::Float));
    script.add_instruction(
        block,
        inst(0x0C, Opcode::Add, InstructionType::IntFloat),
    );
    script.add_instruction(
        block,
        inst(0x0E, Opcode::IncSp, InstructionType::None).with_args(&[-4]),
    );
    script.add_instruction(block, inst(0x14, Opcode::Retn, InstructionType::None));

    let mut variables = VariableSpace::new();
    let result = analyze(&mut script, &mut variables, main);

    // Mixed int/float addition produces a float, which INCSP then rejects.
    assert!(matches!(result, Err(Error::TypeMismatch { .. })));

    Ok(())
}

#[test]
fn test_mixed_arithmetic_produces_float() -> Result<()> {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);

    script.add_instruction(block, inst(0x00, Opcode::Const, InstructionType::Int));
    script.add_instruction(block, inst(0x06, Opcode::Const, InstructionType::Float));
    let add = script.add_instruction(block, inst(0x0C, Opcode::Add, InstructionType::IntFloat));
    let retn = script.add_instruction(block, inst(0x0E, Opcode::Retn, InstructionType::None));

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    let snapshot = script[retn].stack.clone().expect("snapshot recorded");
    assert_eq!(snapshot.len(), 1);
    let sum = snapshot.get(0).expect("one cell");
    assert_eq!(variables[sum].var_type, VariableType::Float);
    assert_eq!(variables[sum].creator, Some(add));

    Ok(())
}

#[test]
fn test_vector_arithmetic() -> Result<()> {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);

    for i in 0..6 {
        script.add_instruction(
            block,
            inst(i * 6, Opcode::Const, InstructionType::Float),
        );
    }
    script.add_instruction(block, inst(0x24, Opcode::Add, InstructionType::VectorVector));
    let retn = script.add_instruction(block, inst(0x26, Opcode::Retn, InstructionType::None));

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    // Six floats in, three floats out.
    let snapshot = script[retn].stack.clone().expect("snapshot recorded");
    assert_eq!(snapshot.len(), 3);
    for cell in snapshot.iter() {
        assert_eq!(variables[cell].var_type, VariableType::Float);
    }

    Ok(())
}

#[test]
fn test_analysis_is_deterministic_across_sessions() -> Result<()> {
    fn build() -> (Script, SubRoutineId) {
        let mut script = Script::new();
        let main = script.add_subroutine(0x00);
        let main_block = script.add_block(main, 0x00);
        let callee = script.add_subroutine(0x10);
        let callee_block = script.add_block(callee, 0x10);

        script.add_instruction(main_block, inst(0x00, Opcode::Rsadd, InstructionType::Int));
        let jsr =
            script.add_instruction(main_block, inst(0x02, Opcode::Jsr, InstructionType::None));
        script.add_instruction(main_block, inst(0x08, Opcode::Retn, InstructionType::None));

        let target = script.add_instruction(
            callee_block,
            inst(0x10, Opcode::Const, InstructionType::Int),
        );
        script.add_instruction(
            callee_block,
            inst(0x16, Opcode::CpDownSp, InstructionType::Direct).with_args(&[-8, 4]),
        );
        script.add_instruction(
            callee_block,
            inst(0x1E, Opcode::MovSp, InstructionType::None).with_args(&[-4]),
        );
        script.add_instruction(
            callee_block,
            inst(0x20, Opcode::Retn, InstructionType::None),
        );

        script.add_branch(jsr, target);
        script.add_edge(main_block, callee_block, BlockEdgeKind::FunctionCall);
        (script, main)
    }

    let (mut script_a, main_a) = build();
    let (mut script_b, main_b) = build();
    let mut variables_a = VariableSpace::new();
    let mut variables_b = VariableSpace::new();

    analyze(&mut script_a, &mut variables_a, main_a)?;
    analyze(&mut script_b, &mut variables_b, main_b)?;

    assert_eq!(variables_a.len(), variables_b.len());
    for (a, b) in variables_a.iter().zip(variables_b.iter()) {
        assert_eq!(a.var_type, b.var_type);
        assert_eq!(a.usage, b.usage);
        assert_eq!(a.readers, b.readers);
        assert_eq!(a.writers, b.writers);
    }

    for (a, b) in script_a.instructions().zip(script_b.instructions()) {
        assert_eq!(a.stack, b.stack);
    }

    for (a, b) in script_a.subroutines().zip(script_b.subroutines()) {
        assert_eq!(a.params, b.params);
        assert_eq!(a.returns, b.returns);
    }

    Ok(())
}

#[test]
fn test_snapshot_hides_caller_frames() -> Result<()> {
    let mut script = Script::new();

    let main = script.add_subroutine(0x00);
    let main_block = script.add_block(main, 0x00);
    let callee = script.add_subroutine(0x10);
    let callee_block = script.add_block(callee, 0x10);

    // The caller has two cells of its own; the callee pushes one and must
    // still only see its own frame.
    script.add_instruction(main_block, inst(0x00, Opcode::Const, InstructionType::Int));
    script.add_instruction(main_block, inst(0x06, Opcode::Const, InstructionType::Int));
    let jsr = script.add_instruction(main_block, inst(0x0C, Opcode::Jsr, InstructionType::None));

    let push = script.add_instruction(
        callee_block,
        inst(0x10, Opcode::Const, InstructionType::String),
    );
    let probe = script.add_instruction(
        callee_block,
        inst(0x16, Opcode::MovSp, InstructionType::None).with_args(&[-4]),
    );
    script.add_instruction(callee_block, inst(0x18, Opcode::Retn, InstructionType::None));

    script.add_branch(jsr, push);
    script.add_edge(main_block, callee_block, BlockEdgeKind::FunctionCall);

    let mut variables = VariableSpace::new();
    analyze(&mut script, &mut variables, main)?;

    assert_eq!(script[push].stack, Some(Stack::new()));
    let probe_snapshot = script[probe].stack.clone().expect("snapshot recorded");
    assert_eq!(probe_snapshot.len(), 1);
    assert_eq!(probe_snapshot.get(0), Some(var(2)));

    Ok(())
}

// ---- error surface ------------------------------------------------------

#[test]
fn test_misaligned_movsp_is_rejected() {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);
    script.add_instruction(
        block,
        inst(0x00, Opcode::MovSp, InstructionType::None).with_args(&[-3]),
    );

    let mut variables = VariableSpace::new();
    let result = analyze(&mut script, &mut variables, main);
    assert!(matches!(result, Err(Error::MalformedOperand { .. })));
}

#[test]
fn test_positive_movsp_is_rejected() {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);
    script.add_instruction(
        block,
        inst(0x00, Opcode::MovSp, InstructionType::None).with_args(&[4]),
    );

    let mut variables = VariableSpace::new();
    let result = analyze(&mut script, &mut variables, main);
    assert!(matches!(result, Err(Error::MalformedOperand { .. })));
}

#[test]
fn test_savebp_outside_globals_analysis_is_rejected() {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);
    script.add_instruction(block, inst(0x00, Opcode::SaveBp, InstructionType::None));

    let mut variables = VariableSpace::new();
    let result = analyze(&mut script, &mut variables, main);
    assert!(matches!(result, Err(Error::Protocol { .. })));
}

#[test]
fn test_second_savebp_is_rejected() {
    let mut script = Script::new();
    let init = script.add_subroutine(0x00);
    let block = script.add_block(init, 0x00);
    script.add_instruction(block, inst(0x00, Opcode::Rsadd, InstructionType::Int));
    script.add_instruction(block, inst(0x02, Opcode::SaveBp, InstructionType::None));
    script.add_instruction(block, inst(0x04, Opcode::SaveBp, InstructionType::None));

    let mut script_vars = VariableSpace::new();
    let functions = FunctionTable::new();
    let result = StackAnalyzer::new(&mut script, &mut script_vars, &functions, Game::Nwn)
        .analyze_globals(init);
    assert!(matches!(result, Err(Error::Protocol { .. })));
}

#[test]
fn test_unknown_engine_function_is_rejected() {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);
    script.add_instruction(
        block,
        inst(0x00, Opcode::Action, InstructionType::None).with_args(&[99, 0]),
    );

    let mut variables = VariableSpace::new();
    let result = analyze(&mut script, &mut variables, main);
    assert!(matches!(result, Err(Error::MalformedOperand { .. })));
}

#[test]
fn test_action_passing_more_than_declared_is_rejected() {
    let mut functions = FunctionTable::new();
    functions.insert(Game::Nwn, 1, FunctionSignature::new(vec![], VariableType::Void));

    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);
    script.add_instruction(
        block,
        inst(0x00, Opcode::Action, InstructionType::None).with_args(&[1, 1]),
    );

    let mut variables = VariableSpace::new();
    let result = analyze_with(&mut script, &mut variables, main, &functions);
    assert!(matches!(result, Err(Error::MalformedOperand { .. })));
}

#[test]
fn test_boolean_on_float_operand_is_rejected() {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);
    script.add_instruction(block, inst(0x00, Opcode::Const, InstructionType::Float));
    script.add_instruction(block, inst(0x06, Opcode::Const, InstructionType::Int));
    script.add_instruction(block, inst(0x0C, Opcode::BoolAnd, InstructionType::IntInt));

    let mut variables = VariableSpace::new();
    let result = analyze(&mut script, &mut variables, main);
    assert!(matches!(result, Err(Error::TypeMismatch { .. })));
}

#[test]
fn test_bp_access_without_globals_is_rejected() {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);
    script.add_instruction(
        block,
        inst(0x00, Opcode::CpTopBp, InstructionType::Direct).with_args(&[-4, 4]),
    );

    let mut variables = VariableSpace::new();
    let result = analyze(&mut script, &mut variables, main);
    assert!(matches!(result, Err(Error::MissingGlobals { .. })));
}

#[test]
fn test_deep_copy_source_outside_stack_is_rejected() {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);
    script.add_instruction(
        block,
        inst(0x00, Opcode::CpTopSp, InstructionType::Direct).with_args(&[-160, 4]),
    );

    let mut variables = VariableSpace::new();
    let result = analyze(&mut script, &mut variables, main);
    assert!(matches!(result, Err(Error::StackUnderrun { .. })));
}

#[test]
fn test_oversized_structured_compare_is_rejected() {
    let mut script = Script::new();
    let main = script.add_subroutine(0x00);
    let block = script.add_block(main, 0x00);
    script.add_instruction(block, inst(0x00, Opcode::Const, InstructionType::Int));
    script.add_instruction(block, inst(0x06, Opcode::Const, InstructionType::Int));
    script.add_instruction(
        block,
        inst(0x0C, Opcode::Eq, InstructionType::StructStruct).with_args(&[160]),
    );

    let mut variables = VariableSpace::new();
    let result = analyze(&mut script, &mut variables, main);
    assert!(matches!(result, Err(Error::StackUnderrun { .. })));
}
