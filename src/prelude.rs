//! Convenient re-exports of the most commonly used types.
//!
//! ```rust,ignore
//! use aurorascope::prelude::*;
//! ```

pub use crate::analysis::{
    Stack, StackAnalyzer, VarId, Variable, VariableSpace, VariableType, VariableUse,
    DUMMY_FRAME_SIZE,
};
pub use crate::bytecode::{
    AnalyzeState, Block, BlockEdge, BlockEdgeKind, BlockId, Instruction, InstructionId,
    InstructionType, Opcode, Script, SubRoutine, SubRoutineId,
};
pub use crate::engine::{FunctionSignature, FunctionTable, Game};
pub use crate::{Error, Result};
