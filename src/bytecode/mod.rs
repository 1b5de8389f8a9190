//! The shared NWScript program graph.
//!
//! This module defines the structure a disassembler recovers from a compiled
//! NCS file: [`Instruction`]s grouped into basic [`Block`]s, blocks grouped
//! into [`SubRoutine`]s, and the control-flow edges between them. The whole
//! graph is owned by a [`Script`] arena; nodes refer to each other through
//! lightweight integer ids ([`InstructionId`], [`BlockId`], [`SubRoutineId`]),
//! never through owning pointers, so the cyclic control-flow graph needs no
//! reference counting.
//!
//! Most node fields are immutable inputs filled in by the disassembler. A few
//! are analyzer outputs, written in place during stack analysis:
//!
//! - [`Instruction::stack`] - the frame-restricted operand-stack snapshot
//! - [`Block::analyze_state`] / [`SubRoutine::analyze_state`] - walk
//!   memoization state
//! - [`SubRoutine::params`] / [`SubRoutine::returns`] - the discovered
//!   parameter and return-slot variables
//!
//! # Construction
//!
//! [`Script`] exposes a small construction API (`add_subroutine`,
//! `add_block`, `add_instruction`, `add_edge`, `add_branch`) that keeps the
//! parent/child links consistent. The disassembler is the intended caller;
//! tests use the same API to assemble programs by hand.

mod block;
mod instruction;
mod opcode;
mod script;
mod subroutine;

pub use block::{AnalyzeState, Block, BlockEdge, BlockEdgeKind, BlockId};
pub use instruction::{Instruction, InstructionId};
pub use opcode::{InstructionType, Opcode};
pub use script::Script;
pub use subroutine::{SubRoutine, SubRoutineId};
