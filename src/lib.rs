// Copyright 2026 aurorascope contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![allow(dead_code)]

//! # aurorascope
//!
//! A library for analyzing compiled NWScript (NCS) bytecode as used by the
//! scripting system of BioWare's Aurora engine and its descendants.
//!
//! NWScript compiles to a stack-based bytecode. A disassembler recovers the
//! raw structure of a compiled script: instructions, basic blocks,
//! subroutines, and the branch edges between them. `aurorascope` picks up
//! from there and performs an abstract interpretation of the operand stack
//! over that structure to recover the *logical* program:
//!
//! - every distinct **variable** a script manipulates, with an inferred type
//! - the instructions that **create**, **read**, and **write** each variable
//! - each subroutine's **parameters** and **return values**, discovered by
//!   observing how the subroutine reaches below its own stack frame
//! - the script's **global variables**, captured at the base-pointer save of
//!   the global initializer
//! - per instruction, the **operand-stack snapshot** visible to it,
//!   restricted to the enclosing subroutine's frame
//!
//! # Architecture
//!
//! The library is organized into three layers:
//!
//! - [`bytecode`] - The shared program graph: instructions, blocks,
//!   subroutines and their edges. Produced by a disassembler (or by hand, in
//!   tests), annotated in place by the analyzer.
//! - [`engine`] - The game-engine function database interface. Scripts call
//!   engine functions through the `ACTION` instruction; the analyzer needs
//!   each function's parameter and return types.
//! - [`analysis`] - The stack analyzer itself: the variable store, the
//!   abstract stack, the per-opcode semantics, and the walkers that drive
//!   them across the control-flow graph.
//!
//! # Usage
//!
//! Build a program graph, then run the analyzer over it:
//!
//! ```rust
//! use aurorascope::analysis::{StackAnalyzer, VariableSpace};
//! use aurorascope::bytecode::{Instruction, InstructionType, Opcode, Script};
//! use aurorascope::engine::{FunctionTable, Game};
//!
//! let mut script = Script::new();
//! let main = script.add_subroutine(0x0000);
//! let entry = script.add_block(main, 0x0000);
//! script.add_instruction(entry, Instruction::new(0x0000, Opcode::Rsadd, InstructionType::Int));
//! script.add_instruction(
//!     entry,
//!     Instruction::new(0x0002, Opcode::MovSp, InstructionType::None).with_args(&[-4]),
//! );
//! script.add_instruction(entry, Instruction::new(0x0008, Opcode::Retn, InstructionType::None));
//!
//! let mut variables = VariableSpace::new();
//! let functions = FunctionTable::new();
//! let mut analyzer = StackAnalyzer::new(&mut script, &mut variables, &functions, Game::Nwn);
//! analyzer.analyze_subroutine(main, None)?;
//!
//! // The 32-entry dummy caller frame plus the one pushed int.
//! assert_eq!(variables.len(), 33);
//! # Ok::<(), aurorascope::Error>(())
//! ```
//!
//! For the full flow of a real script, run
//! [`analysis::StackAnalyzer::analyze_globals`] on the global-initializer
//! subroutine first and pass the produced globals stack to
//! [`analysis::StackAnalyzer::analyze_subroutine`] for the entry point.
//!
//! # Errors
//!
//! All analysis errors are fatal to the current session and carry the
//! offending instruction's address and opcode mnemonic; see [`Error`]. A
//! failed analysis leaves the program graph partially annotated and should
//! be discarded.

pub mod analysis;
pub mod bytecode;
pub mod engine;
pub mod prelude;

mod error;

pub use error::Error;

/// Convenience `Result` alias for all fallible operations of this crate.
pub type Result<T> = std::result::Result<T, Error>;
