//! Subroutines: connected block subgraphs entered via JSR.

use std::fmt;

use crate::analysis::VarId;
use crate::bytecode::{AnalyzeState, BlockId};

/// Identifier of a [`SubRoutine`] within its owning
/// [`Script`](crate::bytecode::Script).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubRoutineId(usize);

impl SubRoutineId {
    /// Creates a subroutine identifier from a raw arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SubRoutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// A subroutine: a connected subgraph of blocks with a designated entry
/// block, entered via JSR and exited via RETN.
///
/// `params` and `returns` are analyzer outputs. Both are discovered from
/// stack underruns: a subroutine popping cells it never pushed is clearing
/// its parameters, and one writing below its own frame before returning is
/// filling return slots its caller allocated. Once the subroutine's analysis
/// is [`AnalyzeState::Finished`], neither list changes shape again; later
/// calls only cross-check types against the call site.
#[derive(Debug, Clone)]
pub struct SubRoutine {
    /// The address of the subroutine's entry point.
    pub address: u32,
    /// The blocks of this subroutine; `blocks[0]` is the entry block.
    pub blocks: Vec<BlockId>,
    /// The formal parameters, in the order the subroutine pops them
    /// (stack-top first).
    pub params: Vec<VarId>,
    /// The return slots the caller allocated, deepest slot first.
    ///
    /// A slot is `None` if it was reserved by a deeper underrun but never
    /// itself written on the analyzed path.
    pub returns: Vec<Option<VarId>>,
    /// Stack-analysis memoization state.
    pub analyze_state: AnalyzeState,
}

impl SubRoutine {
    /// Creates an empty subroutine at `address`.
    #[must_use]
    pub fn new(address: u32) -> Self {
        Self {
            address,
            blocks: Vec::new(),
            params: Vec::new(),
            returns: Vec::new(),
            analyze_state: AnalyzeState::Unvisited,
        }
    }

    /// Returns the entry block, if the subroutine has any blocks.
    #[must_use]
    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }
}
