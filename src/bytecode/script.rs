//! The arena owning a disassembled script's program graph.

use std::ops::{Index, IndexMut};

use crate::bytecode::{
    Block, BlockEdge, BlockEdgeKind, BlockId, Instruction, InstructionId, SubRoutine, SubRoutineId,
};

/// A disassembled NWScript program.
///
/// Owns every [`Instruction`], [`Block`], and [`SubRoutine`] of the script in
/// append-only arenas. All cross-references between nodes are ids into these
/// arenas, which keeps the cyclic control-flow graph free of ownership
/// cycles and keeps ids stable for the lifetime of the script.
///
/// The `add_*` methods maintain the parent/child links (an instruction knows
/// its block, a block its subroutine) and are the construction seam for the
/// disassembler.
#[derive(Debug, Default)]
pub struct Script {
    instructions: Vec<Instruction>,
    blocks: Vec<Block>,
    subroutines: Vec<SubRoutine>,
}

impl Script {
    /// Creates an empty program graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new, empty subroutine with the given entry address.
    pub fn add_subroutine(&mut self, address: u32) -> SubRoutineId {
        let id = SubRoutineId::new(self.subroutines.len());
        self.subroutines.push(SubRoutine::new(address));
        id
    }

    /// Appends a new, empty block to `sub`.
    ///
    /// The first block added to a subroutine becomes its entry block.
    ///
    /// # Panics
    ///
    /// Panics if `sub` is not an id of this script.
    pub fn add_block(&mut self, sub: SubRoutineId, address: u32) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        let mut block = Block::new(address);
        block.sub_routine = Some(sub);
        self.blocks.push(block);
        self.subroutines[sub.index()].blocks.push(id);
        id
    }

    /// Appends `instruction` to `block`.
    ///
    /// # Panics
    ///
    /// Panics if `block` is not an id of this script.
    pub fn add_instruction(&mut self, block: BlockId, mut instruction: Instruction) -> InstructionId {
        let id = InstructionId::new(self.instructions.len());
        instruction.block = Some(block);
        self.instructions.push(instruction);
        self.blocks[block.index()].instructions.push(id);
        id
    }

    /// Adds a control-flow edge from `from` to `to`.
    ///
    /// # Panics
    ///
    /// Panics if `from` is not an id of this script.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId, kind: BlockEdgeKind) {
        self.blocks[from.index()].edges.push(BlockEdge::new(to, kind));
    }

    /// Adds a branch destination to `instruction`.
    ///
    /// # Panics
    ///
    /// Panics if `instruction` is not an id of this script.
    pub fn add_branch(&mut self, instruction: InstructionId, target: InstructionId) {
        self.instructions[instruction.index()].branches.push(target);
    }

    /// Returns the instruction with the given id, if it exists.
    #[must_use]
    pub fn instruction(&self, id: InstructionId) -> Option<&Instruction> {
        self.instructions.get(id.index())
    }

    /// Returns the block with the given id, if it exists.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    /// Returns the subroutine with the given id, if it exists.
    #[must_use]
    pub fn subroutine(&self, id: SubRoutineId) -> Option<&SubRoutine> {
        self.subroutines.get(id.index())
    }

    /// Iterates over all instructions in creation order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    /// Iterates over all blocks in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Iterates over all subroutines in creation order.
    pub fn subroutines(&self) -> impl Iterator<Item = &SubRoutine> {
        self.subroutines.iter()
    }

    /// Number of instructions in the script.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Number of blocks in the script.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of subroutines in the script.
    #[must_use]
    pub fn subroutine_count(&self) -> usize {
        self.subroutines.len()
    }
}

impl Index<InstructionId> for Script {
    type Output = Instruction;

    fn index(&self, id: InstructionId) -> &Instruction {
        &self.instructions[id.index()]
    }
}

impl IndexMut<InstructionId> for Script {
    fn index_mut(&mut self, id: InstructionId) -> &mut Instruction {
        &mut self.instructions[id.index()]
    }
}

impl Index<BlockId> for Script {
    type Output = Block;

    fn index(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }
}

impl IndexMut<BlockId> for Script {
    fn index_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }
}

impl Index<SubRoutineId> for Script {
    type Output = SubRoutine;

    fn index(&self, id: SubRoutineId) -> &SubRoutine {
        &self.subroutines[id.index()]
    }
}

impl IndexMut<SubRoutineId> for Script {
    fn index_mut(&mut self, id: SubRoutineId) -> &mut SubRoutine {
        &mut self.subroutines[id.index()]
    }
}
