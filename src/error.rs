use thiserror::Error;

/// The generic error type covering every failure the analyzer can report.
///
/// All analysis errors are fatal to the current analysis session: there is no
/// local recovery, and internal calls short-circuit on the first error. Each
/// variant carries the address and opcode mnemonic of the instruction that
/// triggered it, plus a short reason, so a failure can be traced back to a
/// specific byte offset of the script.
///
/// # Error Categories
///
/// - [`Error::MalformedOperand`] - Alignment or sign constraint violated on an
///   offset/size argument, or an unknown engine function was referenced
/// - [`Error::StackUnderrun`] - An instruction required more stack depth than
///   available, outside the designed parameter/return underrun patterns
/// - [`Error::TypeMismatch`] - An operand was not compatible with the concrete
///   type an instruction requires
/// - [`Error::Recursion`] - A subroutine or block was re-entered while its
///   analysis was still in progress
/// - [`Error::MissingGlobals`] - A globals-dependent instruction executed with
///   no globals stack in the analysis context
/// - [`Error::Protocol`] - A SAVEBP instruction outside globals analysis, or a
///   second SAVEBP
#[derive(Error, Debug)]
pub enum Error {
    /// An instruction argument violated an alignment or sign constraint.
    ///
    /// Stack offsets and sizes are expressed in bytes and must be multiples
    /// of 4 (one stack cell); offsets must point down into the stack. This
    /// error also covers `ACTION` instructions referencing a function id the
    /// engine-function database does not know.
    #[error("malformed operand @{address:08X} {opcode}: {message}")]
    MalformedOperand {
        /// Address of the offending instruction.
        address: u32,
        /// Mnemonic of the offending instruction's opcode.
        opcode: &'static str,
        /// What was malformed about the operand.
        message: String,
    },

    /// An instruction required more operand-stack depth than was available.
    ///
    /// Reaching below the current subroutine's frame is how parameters and
    /// return values are discovered, so *designed* underruns do not raise
    /// this error; it fires only when an access falls outside those patterns
    /// (or below the globals stack for the BP-relative instructions).
    #[error("stack underrun @{address:08X} {opcode}: {message}")]
    StackUnderrun {
        /// Address of the offending instruction.
        address: u32,
        /// Mnemonic of the offending instruction's opcode.
        opcode: &'static str,
        /// Which access underran.
        message: String,
    },

    /// An operand's inferred type was incompatible with the required type.
    ///
    /// Untyped (`Any`) operands are always compatible and are refined to the
    /// required type instead.
    #[error("type mismatch @{address:08X} {opcode}: {message}")]
    TypeMismatch {
        /// Address of the offending instruction.
        address: u32,
        /// Mnemonic of the offending instruction's opcode.
        opcode: &'static str,
        /// The incompatible operand and the expectation it violated.
        message: String,
    },

    /// A subroutine or block was re-entered while still being analyzed.
    ///
    /// Direct or indirect subroutine recursion is not supported by the
    /// analyzer; encountering it terminates the analysis.
    #[error("recursion detected in {site} @{address:08X}")]
    Recursion {
        /// Whether a `"subroutine"` or a `"block"` was re-entered.
        site: &'static str,
        /// Entry address of the re-entered subroutine or block.
        address: u32,
    },

    /// A globals-dependent instruction executed without a globals stack.
    ///
    /// The BP-relative instructions (CPTOPBP, CPDOWNBP, DECBP, INCBP) only
    /// make sense after the globals analysis has produced a globals stack.
    #[error("no globals stack available @{address:08X} {opcode}")]
    MissingGlobals {
        /// Address of the offending instruction.
        address: u32,
        /// Mnemonic of the offending instruction's opcode.
        opcode: &'static str,
    },

    /// The script violated the base-pointer save protocol.
    ///
    /// SAVEBP is valid only during globals analysis, and only once: it is the
    /// single event that crystallizes the global variables.
    #[error("protocol violation @{address:08X} {opcode}: {message}")]
    Protocol {
        /// Address of the offending instruction.
        address: u32,
        /// Mnemonic of the offending instruction's opcode.
        opcode: &'static str,
        /// Which part of the protocol was violated.
        message: String,
    },
}
