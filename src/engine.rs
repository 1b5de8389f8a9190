//! The game-engine function database interface.
//!
//! NWScript's `ACTION` instruction calls into the hosting game engine by
//! function id, and the meaning of an id differs per game: function 23 is
//! one thing in Neverwinter Nights and another in The Witcher. The stack
//! analyzer only needs each function's signature - how many cells it pops
//! and what it pushes - so this module models the database as a plain
//! signature lookup keyed by game and function id.
//!
//! The per-game function catalogs themselves are not part of this crate;
//! the hosting tool populates a [`FunctionTable`] from whatever source it
//! has (typically generated tables extracted from the games' `nwscript.nss`
//! headers).

use rustc_hash::FxHashMap;

use crate::analysis::VariableType;

/// The Aurora-engine game a script was compiled for.
///
/// Selects which engine-function catalog applies and what the engine types
/// 0 through 5 mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Game {
    /// Neverwinter Nights.
    Nwn,
    /// Neverwinter Nights 2.
    Nwn2,
    /// Star Wars: Knights of the Old Republic.
    Kotor,
    /// Star Wars: Knights of the Old Republic II - The Sith Lords.
    Kotor2,
    /// Jade Empire.
    Jade,
    /// The Witcher.
    Witcher,
    /// Dragon Age: Origins.
    DragonAge,
    /// Dragon Age II.
    DragonAge2,
}

/// The signature of one engine function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    /// Parameter types in caller-push order.
    ///
    /// A [`VariableType::Vector`] parameter occupies three float cells on
    /// the stack; a [`VariableType::ScriptState`] parameter occupies none.
    pub parameters: Vec<VariableType>,
    /// The type the function leaves on the stack.
    ///
    /// [`VariableType::Void`] pushes nothing; [`VariableType::Vector`]
    /// pushes three float cells.
    pub return_type: VariableType,
}

impl FunctionSignature {
    /// Creates a signature from parameter types and a return type.
    #[must_use]
    pub fn new(parameters: Vec<VariableType>, return_type: VariableType) -> Self {
        Self {
            parameters,
            return_type,
        }
    }
}

/// A lookup table of engine-function signatures, keyed by game and
/// function id.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: FxHashMap<(Game, u32), FunctionSignature>,
}

impl FunctionTable {
    /// Creates an empty function table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the signature of `function` for `game`, replacing any
    /// previous entry.
    pub fn insert(&mut self, game: Game, function: u32, signature: FunctionSignature) {
        self.functions.insert((game, function), signature);
    }

    /// Returns the full signature of `function` for `game`.
    #[must_use]
    pub fn signature(&self, game: Game, function: u32) -> Option<&FunctionSignature> {
        self.functions.get(&(game, function))
    }

    /// Returns how many parameters `function` declares for `game`.
    #[must_use]
    pub fn parameter_count(&self, game: Game, function: u32) -> Option<usize> {
        self.signature(game, function).map(|s| s.parameters.len())
    }

    /// Returns the declared parameter types of `function` for `game`, in
    /// caller-push order.
    #[must_use]
    pub fn parameter_types(&self, game: Game, function: u32) -> Option<&[VariableType]> {
        self.signature(game, function).map(|s| s.parameters.as_slice())
    }

    /// Returns the return type of `function` for `game`.
    #[must_use]
    pub fn return_type(&self, game: Game, function: u32) -> Option<VariableType> {
        self.signature(game, function).map(|s| s.return_type)
    }

    /// Number of registered signatures across all games.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns `true` if no signature has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
