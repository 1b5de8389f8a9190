//! Inferred variables and the arena that owns them.
//!
//! A [`Variable`] is a logical storage cell the analyzer has identified: a
//! local pushed by an instruction, a global captured at the base-pointer
//! save, a parameter claimed from the caller's frame. Variables are owned by
//! the append-only [`VariableSpace`]; everything else - stacks, subroutine
//! parameter lists, instruction links - refers to them through [`VarId`]
//! indices, which stay stable for the lifetime of the analysis.
//!
//! # Typing
//!
//! Variable types form a flat lattice with [`VariableType::Any`] at the
//! bottom: a variable starts untyped and is refined *upward at most once*
//! to the concrete type demanded by an instruction that consumes it. Types
//! never change between concrete types and never fall back to `Any`.
//!
//! The copy instructions (CPTOPSP and friends) complicate this: the copy
//! and its source are the same logical value, but the type might only
//! become known - through later use - on one of them. Rather than chasing
//! that ordering, the analyzer records the pair as *duplicates* and defers
//! unification to [`VariableSpace::fixup_types`], run after each
//! subroutine's analysis completes.

use std::fmt;
use std::ops::{Index, IndexMut};

use crate::bytecode::InstructionId;

/// Identifier of a [`Variable`] within a [`VariableSpace`].
///
/// A dense index reflecting creation order; stable for the lifetime of the
/// analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(usize);

impl VarId {
    /// Creates a variable identifier from a raw arena index.
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

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The inferred type of a variable.
///
/// [`VariableType::Any`] is the lattice bottom: not yet constrained by any
/// use. A vector is not a variable type of its own on the stack - it is
/// three consecutive [`VariableType::Float`] cells - but it appears in
/// engine-function signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableType {
    /// Not yet constrained; may be refined to any concrete type.
    Any,
    /// A 32-bit signed integer (also the NWScript boolean).
    Int,
    /// A 32-bit float.
    Float,
    /// A string.
    String,
    /// A resource reference (resref).
    Resource,
    /// An object id.
    Object,
    /// A vector of three floats; occupies three stack cells.
    Vector,
    /// Engine type 0 (e.g. `effect` in NWN).
    EngineType0,
    /// Engine type 1 (e.g. `event` in NWN).
    EngineType1,
    /// Engine type 2 (e.g. `location` in NWN).
    EngineType2,
    /// Engine type 3 (e.g. `talent` in NWN).
    EngineType3,
    /// Engine type 4 (e.g. `itemproperty` in NWN).
    EngineType4,
    /// Engine type 5 (e.g. `mod` in The Witcher).
    EngineType5,
    /// A stored script state (an `action` parameter); never on the stack.
    ScriptState,
    /// No value.
    Void,
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariableType::Any => "any",
            VariableType::Int => "int",
            VariableType::Float => "float",
            VariableType::String => "string",
            VariableType::Resource => "resref",
            VariableType::Object => "object",
            VariableType::Vector => "vector",
            VariableType::EngineType0 => "engine0",
            VariableType::EngineType1 => "engine1",
            VariableType::EngineType2 => "engine2",
            VariableType::EngineType3 => "engine3",
            VariableType::EngineType4 => "engine4",
            VariableType::EngineType5 => "engine5",
            VariableType::ScriptState => "action",
            VariableType::Void => "void",
        };
        f.write_str(name)
    }
}

/// How a variable is used by the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableUse {
    /// Not yet determined.
    Unknown,
    /// A local of some subroutine.
    Local,
    /// A global, addressed relative to the saved base pointer.
    Global,
    /// A formal parameter of a subroutine.
    Parameter,
    /// A return slot of a subroutine.
    Return,
}

/// One inferred storage cell.
#[derive(Debug, Clone)]
pub struct Variable {
    /// This variable's id in its [`VariableSpace`].
    pub id: VarId,
    /// The inferred type.
    pub var_type: VariableType,
    /// How the variable is used.
    pub usage: VariableUse,
    /// The instruction that produced this variable (a push, an engine-call
    /// return, a duplicate). `None` for the synthetic dummy-frame cells.
    pub creator: Option<InstructionId>,
    /// Instructions that read this variable, in discovery order. An
    /// instruction reading twice appears twice.
    pub readers: Vec<InstructionId>,
    /// Instructions that write this variable, in discovery order.
    pub writers: Vec<InstructionId>,
    /// Peer variables holding the same logical value, pending type
    /// unification. Cleared by [`VariableSpace::fixup_types`].
    pub duplicates: Vec<VarId>,
}

/// The append-only arena owning all variables of an analysis session.
#[derive(Debug, Clone, Default)]
pub struct VariableSpace {
    variables: Vec<Variable>,
}

impl VariableSpace {
    /// Creates an empty variable space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of variables allocated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns `true` if no variable has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Allocates a fresh variable and returns its id.
    pub fn allocate(
        &mut self,
        var_type: VariableType,
        usage: VariableUse,
        creator: Option<InstructionId>,
    ) -> VarId {
        let id = VarId::new(self.variables.len());
        self.variables.push(Variable {
            id,
            var_type,
            usage,
            creator,
            readers: Vec::new(),
            writers: Vec::new(),
            duplicates: Vec::new(),
        });
        id
    }

    /// Returns the variable with the given id, if it exists.
    #[must_use]
    pub fn get(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.index())
    }

    /// Returns the variable with the given id mutably, if it exists.
    #[must_use]
    pub fn get_mut(&mut self, id: VarId) -> Option<&mut Variable> {
        self.variables.get_mut(id.index())
    }

    /// Iterates over all variables in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    /// Records that `a` and `b` hold the same logical value.
    ///
    /// Each side's existing duplicate set is folded into the other, so both
    /// end up with the union and [`fixup_types`](Self::fixup_types) sees the
    /// whole clique from either member.
    ///
    /// # Panics
    ///
    /// Panics if either id is not of this space.
    pub fn record_duplicate(&mut self, a: VarId, b: VarId) {
        let dups_a = self.variables[a.index()].duplicates.clone();
        let dups_b = self.variables[b.index()].duplicates.clone();

        let var_a = &mut self.variables[a.index()];
        var_a.duplicates.push(b);
        var_a.duplicates.extend_from_slice(&dups_b);

        let var_b = &mut self.variables[b.index()];
        var_b.duplicates.push(a);
        var_b.duplicates.extend_from_slice(&dups_a);
    }

    /// Unifies types across all recorded duplicate relationships.
    ///
    /// For each variable, any concrete type found among its duplicates wins
    /// over `Any` and is broadcast to every peer; the duplicate lists are
    /// then cleared. Duplicates recorded after this pass are handled by the
    /// next one.
    pub fn fixup_types(&mut self) {
        for index in 0..self.variables.len() {
            let duplicates = std::mem::take(&mut self.variables[index].duplicates);

            let mut var_type = self.variables[index].var_type;
            for dup in &duplicates {
                let dup_type = self.variables[dup.index()].var_type;
                if dup_type != VariableType::Any {
                    var_type = dup_type;
                }
            }

            self.variables[index].var_type = var_type;
            for dup in &duplicates {
                self.variables[dup.index()].var_type = var_type;
            }
        }
    }
}

impl Index<VarId> for VariableSpace {
    type Output = Variable;

    fn index(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }
}

impl IndexMut<VarId> for VariableSpace {
    fn index_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.variables[id.index()]
    }
}
