//! Abstract stack analysis of NWScript bytecode.
//!
//! The NWScript VM is purely stack-based: every value a script touches lives
//! in a 4-byte operand-stack cell, addressed relative to the stack pointer
//! or, for globals, the base pointer. This module re-executes a script
//! abstractly, tracking *which logical variable* occupies each cell rather
//! than its value, and infers from the instructions how each variable is
//! typed and used.
//!
//! # How it works
//!
//! Analysis walks a subroutine's control-flow graph depth-first, carrying an
//! abstract [`Stack`] of variable references. Every opcode with a stack
//! effect has a handler that mutates the stack and the [`VariableSpace`]:
//! pushes allocate fresh variables, copies link duplicates for later type
//! unification, typed operations refine operand types, JSR re-enters the
//! walk on the callee.
//!
//! Each subroutine starts with a fresh stack padded by a
//! [`DUMMY_FRAME_SIZE`]-entry dummy frame of untyped cells standing in for
//! the unknown caller context. Whenever an instruction reaches *below* the
//! cells the subroutine itself pushed, it is touching caller-owned cells -
//! an underrun. Underruns are not errors but the discovery mechanism for
//! subroutine interfaces: a MOVSP underrun claims parameters, a CPDOWNSP
//! underrun fills return slots the caller allocated.
//!
//! Branches clone the stack so sibling paths see identical starting
//! conditions; blocks and subroutines are memoized so shared suffixes and
//! repeated calls are analyzed once. After each subroutine completes, the
//! duplicate relationships recorded by the copy instructions are collapsed
//! so every copy of a value agrees on its type.
//!
//! # Entry points
//!
//! [`StackAnalyzer::analyze_globals`] runs the designated global-initializer
//! subroutine in isolation (subroutine calls inert) and captures the stack
//! at its SAVEBP instruction as the script's global variables.
//! [`StackAnalyzer::analyze_subroutine`] runs the normal control flow from
//! an entry subroutine, with the produced globals available to the
//! BP-relative instructions.

mod context;
mod handlers;
mod stack;
mod variables;
mod walker;

pub use stack::Stack;
pub use variables::{VarId, Variable, VariableSpace, VariableType, VariableUse};
pub use walker::StackAnalyzer;

/// Number of untyped stack cells seeded below each analyzed subroutine's
/// frame, standing in for the unknown caller context.
pub const DUMMY_FRAME_SIZE: usize = 32;
