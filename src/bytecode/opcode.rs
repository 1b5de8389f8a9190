//! NWScript opcode and instruction-type encodings.
//!
//! Both enums mirror the byte values used in compiled NCS files. An
//! instruction is a pair of opcode and instruction type: the opcode selects
//! the operation, the type tag selects the operand types it works on (for
//! example `ADD` with [`InstructionType::IntFloat`] adds an int to a float
//! and produces a float).

use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::analysis::VariableType;

/// An instruction opcode, defining what the instruction does.
///
/// The discriminants are the opcode bytes of the NCS format. The variants
/// past [`Opcode::Nop`] (arrays, references, SCRIPTSIZE) appear only in the
/// bytecode of later Aurora titles and are stack-neutral as far as this
/// crate's analysis is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, EnumIter, IntoStaticStr)]
pub enum Opcode {
    /// CPDOWNSP - copy the top stack cells down over existing cells.
    #[strum(serialize = "CPDOWNSP")]
    CpDownSp = 0x01,
    /// RSADD - reserve a new, uninitialized cell on the stack.
    #[strum(serialize = "RSADD")]
    Rsadd = 0x02,
    /// CPTOPSP - duplicate stack cells onto the top of the stack.
    #[strum(serialize = "CPTOPSP")]
    CpTopSp = 0x03,
    /// CONST - push a constant value.
    #[strum(serialize = "CONST")]
    Const = 0x04,
    /// ACTION - call a game-engine function.
    #[strum(serialize = "ACTION")]
    Action = 0x05,
    /// LOGAND - logical AND of two ints.
    #[strum(serialize = "LOGAND")]
    LogAnd = 0x06,
    /// LOGOR - logical OR of two ints.
    #[strum(serialize = "LOGOR")]
    LogOr = 0x07,
    /// INCOR - bitwise inclusive OR of two ints.
    #[strum(serialize = "INCOR")]
    IncOr = 0x08,
    /// EXCOR - bitwise exclusive OR of two ints.
    #[strum(serialize = "EXCOR")]
    ExcOr = 0x09,
    /// BOOLAND - bitwise AND of two ints.
    #[strum(serialize = "BOOLAND")]
    BoolAnd = 0x0A,
    /// EQ - equality comparison.
    #[strum(serialize = "EQ")]
    Eq = 0x0B,
    /// NEQ - inequality comparison.
    #[strum(serialize = "NEQ")]
    Neq = 0x0C,
    /// GEQ - greater-or-equal comparison.
    #[strum(serialize = "GEQ")]
    Geq = 0x0D,
    /// GT - greater-than comparison.
    #[strum(serialize = "GT")]
    Gt = 0x0E,
    /// LT - less-than comparison.
    #[strum(serialize = "LT")]
    Lt = 0x0F,
    /// LEQ - less-or-equal comparison.
    #[strum(serialize = "LEQ")]
    Leq = 0x10,
    /// SHLEFT - arithmetic shift left.
    #[strum(serialize = "SHLEFT")]
    ShLeft = 0x11,
    /// SHRIGHT - arithmetic shift right.
    #[strum(serialize = "SHRIGHT")]
    ShRight = 0x12,
    /// USHRIGHT - unsigned shift right.
    #[strum(serialize = "USHRIGHT")]
    UShRight = 0x13,
    /// ADD - addition, or string/vector composition.
    #[strum(serialize = "ADD")]
    Add = 0x14,
    /// SUB - subtraction.
    #[strum(serialize = "SUB")]
    Sub = 0x15,
    /// MUL - multiplication.
    #[strum(serialize = "MUL")]
    Mul = 0x16,
    /// DIV - division.
    #[strum(serialize = "DIV")]
    Div = 0x17,
    /// MOD - modulo.
    #[strum(serialize = "MOD")]
    Mod = 0x18,
    /// NEG - arithmetic negation.
    #[strum(serialize = "NEG")]
    Neg = 0x19,
    /// COMP - bitwise complement.
    #[strum(serialize = "COMP")]
    Comp = 0x1A,
    /// MOVSP - move the stack pointer, popping cells.
    #[strum(serialize = "MOVSP")]
    MovSp = 0x1B,
    /// STORESTATEALL - legacy form of STORESTATE.
    #[strum(serialize = "STORESTATEALL")]
    StoreStateAll = 0x1C,
    /// JMP - unconditional jump.
    #[strum(serialize = "JMP")]
    Jmp = 0x1D,
    /// JSR - jump to subroutine.
    #[strum(serialize = "JSR")]
    Jsr = 0x1E,
    /// JZ - jump if the top of the stack is zero.
    #[strum(serialize = "JZ")]
    Jz = 0x1F,
    /// RETN - return from a subroutine.
    #[strum(serialize = "RETN")]
    Retn = 0x20,
    /// DESTRUCT - remove cells from the stack, keeping a protected range.
    #[strum(serialize = "DESTRUCT")]
    Destruct = 0x21,
    /// NOT - logical negation of an int.
    #[strum(serialize = "NOT")]
    Not = 0x22,
    /// DECSP - decrement a stack cell in place.
    #[strum(serialize = "DECSP")]
    DecSp = 0x23,
    /// INCSP - increment a stack cell in place.
    #[strum(serialize = "INCSP")]
    IncSp = 0x24,
    /// JNZ - jump if the top of the stack is non-zero.
    #[strum(serialize = "JNZ")]
    Jnz = 0x25,
    /// CPDOWNBP - copy the top stack cells into the global frame.
    #[strum(serialize = "CPDOWNBP")]
    CpDownBp = 0x26,
    /// CPTOPBP - duplicate cells of the global frame onto the stack top.
    #[strum(serialize = "CPTOPBP")]
    CpTopBp = 0x27,
    /// DECBP - decrement a global cell in place.
    #[strum(serialize = "DECBP")]
    DecBp = 0x28,
    /// INCBP - increment a global cell in place.
    #[strum(serialize = "INCBP")]
    IncBp = 0x29,
    /// SAVEBP - save the base pointer, fixing the global frame.
    #[strum(serialize = "SAVEBP")]
    SaveBp = 0x2A,
    /// RESTOREBP - restore a previously saved base pointer.
    #[strum(serialize = "RESTOREBP")]
    RestoreBp = 0x2B,
    /// STORESTATE - store a script state for a deferred action closure.
    #[strum(serialize = "STORESTATE")]
    StoreState = 0x2C,
    /// NOP - no operation.
    #[strum(serialize = "NOP")]
    Nop = 0x2D,
    /// WRITEARRAY - write an array element (Dragon Age and later).
    #[strum(serialize = "WRITEARRAY")]
    WriteArray = 0x30,
    /// READARRAY - read an array element (Dragon Age and later).
    #[strum(serialize = "READARRAY")]
    ReadArray = 0x32,
    /// GETREF - take a reference to a stack cell (Dragon Age and later).
    #[strum(serialize = "GETREF")]
    GetRef = 0x37,
    /// GETREFARRAY - take a reference to an array element.
    #[strum(serialize = "GETREFARRAY")]
    GetRefArray = 0x39,
    /// SCRIPTSIZE - script size marker prefixing newer NCS files.
    #[strum(serialize = "SCRIPTSIZE")]
    ScriptSize = 0x42,
}

impl Opcode {
    /// Number of slots an opcode-indexed dispatch table needs.
    pub const TABLE_SIZE: usize = Opcode::ScriptSize as usize + 1;

    /// Returns the canonical mnemonic of this opcode, e.g. `"CPDOWNSP"`.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }
}

/// An instruction type, defining the operand types an opcode works on.
///
/// The discriminants are the type bytes of the NCS format. Unary tags name
/// the single type an instruction produces or consumes; binary tags name the
/// two operand types of an arithmetic or comparison instruction, second
/// operand first (`IntFloat` is an int below a float on the stack).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionType {
    /// No type information.
    None = 0,
    /// Direct operand (used by stack-manipulation instructions).
    Direct = 1,
    /// A single int.
    Int = 3,
    /// A single float.
    Float = 4,
    /// A single string.
    String = 5,
    /// A single object id.
    Object = 6,
    /// A single engine type 0 (e.g. `effect` in NWN).
    EngineType0 = 16,
    /// A single engine type 1 (e.g. `event` in NWN).
    EngineType1 = 17,
    /// A single engine type 2 (e.g. `location` in NWN).
    EngineType2 = 18,
    /// A single engine type 3 (e.g. `talent` in NWN).
    EngineType3 = 19,
    /// A single engine type 4 (e.g. `itemproperty` in NWN).
    EngineType4 = 20,
    /// A single engine type 5 (e.g. `mod` in The Witcher).
    EngineType5 = 21,
    /// Two ints.
    IntInt = 32,
    /// Two floats.
    FloatFloat = 33,
    /// Two object ids.
    ObjectObject = 34,
    /// Two strings.
    StringString = 35,
    /// Two structs, compared memberwise.
    StructStruct = 36,
    /// An int below a float.
    IntFloat = 37,
    /// A float below an int.
    FloatInt = 38,
    /// Two engine type 0 values.
    EngineType0EngineType0 = 48,
    /// Two engine type 1 values.
    EngineType1EngineType1 = 49,
    /// Two engine type 2 values.
    EngineType2EngineType2 = 50,
    /// Two engine type 3 values.
    EngineType3EngineType3 = 51,
    /// Two engine type 4 values.
    EngineType4EngineType4 = 52,
    /// Two engine type 5 values.
    EngineType5EngineType5 = 53,
    /// Two vectors.
    VectorVector = 58,
    /// A vector below a float.
    VectorFloat = 59,
    /// A float below a vector.
    FloatVector = 60,
    /// A single resource reference (resref).
    Resource = 96,
}

impl InstructionType {
    /// Maps this type tag to the variable type an instruction of this tag
    /// produces.
    ///
    /// For unary tags that is the type itself; for binary tags the result
    /// type of the operation (mixed int/float arithmetic produces a float).
    /// Tags without type content map to [`VariableType::Void`], which the
    /// opcode semantics treat as "no concrete type derivable from this tag".
    #[must_use]
    pub fn variable_type(self) -> VariableType {
        match self {
            InstructionType::Int | InstructionType::IntInt => VariableType::Int,
            InstructionType::Float
            | InstructionType::FloatFloat
            | InstructionType::IntFloat
            | InstructionType::FloatInt => VariableType::Float,
            InstructionType::String | InstructionType::StringString => VariableType::String,
            InstructionType::Object | InstructionType::ObjectObject => VariableType::Object,
            InstructionType::Resource => VariableType::Resource,
            InstructionType::VectorVector
            | InstructionType::VectorFloat
            | InstructionType::FloatVector => VariableType::Vector,
            InstructionType::EngineType0 | InstructionType::EngineType0EngineType0 => {
                VariableType::EngineType0
            }
            InstructionType::EngineType1 | InstructionType::EngineType1EngineType1 => {
                VariableType::EngineType1
            }
            InstructionType::EngineType2 | InstructionType::EngineType2EngineType2 => {
                VariableType::EngineType2
            }
            InstructionType::EngineType3 | InstructionType::EngineType3EngineType3 => {
                VariableType::EngineType3
            }
            InstructionType::EngineType4 | InstructionType::EngineType4EngineType4 => {
                VariableType::EngineType4
            }
            InstructionType::EngineType5 | InstructionType::EngineType5EngineType5 => {
                VariableType::EngineType5
            }
            InstructionType::None | InstructionType::Direct | InstructionType::StructStruct => {
                VariableType::Void
            }
        }
    }
}
