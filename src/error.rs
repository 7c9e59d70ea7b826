//! Interpreter error types.
//!
//! Mirrors the teacher's split between a per-instruction *recoverable*
//! reason and a driver-facing error: [`AbortReason`] is the fixed set of
//! user-visible messages from spec §4.4/§7, and [`VmError`] is what the
//! evaluator actually returns, adding source location and a `Fatal` variant
//! for internal-invariant violations that are bugs rather than reachable
//! user aborts.

use std::fmt;

use thiserror::Error;

/// The fixed set of user-visible abort messages.
///
/// Every message string here is load-bearing: spec §7/§8 requires these
/// exact texts to appear in the `"<msg>" in <file> on line <N>` abort line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortReason {
    /// `Nat` addition overflowed its representable range.
    #[error("Nat addition overflow")]
    NatAdditionOverflow,
    /// `Nat` subtraction underflowed.
    #[error("Nat subtraction underflow")]
    NatSubtractionUnderflow,
    /// `Nat` multiplication overflowed.
    #[error("Nat multiplication overflow")]
    NatMultiplicationOverflow,
    /// `Int` addition over/underflowed.
    #[error("Int addition overflow/underflow")]
    IntAdditionOverflow,
    /// `Int` subtraction over/underflowed.
    #[error("Int subtraction overflow/underflow")]
    IntSubtractionOverflow,
    /// `Int` multiplication over/underflowed.
    #[error("Int multiplication overflow/underflow")]
    IntMultiplicationOverflow,
    /// `Int` negation overflowed (negating `Int::MIN`).
    #[error("Int negation overflow")]
    IntNegationOverflow,
    /// Integer division or remainder by zero.
    #[error("Division by zero")]
    DivisionByZero,
    /// `Int` division overflowed (`Int::MIN / -1`).
    #[error("Int division overflow/underflow")]
    IntDivisionOverflow,
    /// A float/decimal `less`/`le` comparison involved `NaN`.
    #[error("NaN cannot be ordered")]
    NaNOrder,
    /// A float/decimal `less`/`le` comparison involved opposite infinities.
    #[error("Infinite values cannot be ordered")]
    InfiniteOrder,
    /// `Nat` to `Int` narrowing was out of range.
    #[error("Out-of-bounds Nat to Int")]
    OutOfBoundsNatToInt,
    /// `Int` to `Nat` narrowing was out of range.
    #[error("Out-of-bounds Int to Nat")]
    OutOfBoundsIntToNat,
    /// `BigInt` to `Int` narrowing was out of range.
    #[error("Out-of-bounds BigInt to Int")]
    OutOfBoundsBigIntToInt,
    /// `BigNat` to `Nat` narrowing was out of range.
    #[error("Out-of-bounds BigNat to Nat")]
    OutOfBoundsBigNatToNat,
    /// A user `Assert` opcode failed; carries the opcode's own message.
    #[error("{0}")]
    AssertionFailed(String),
    /// A user `Abort` opcode fired; carries the opcode's own message.
    #[error("{0}")]
    Aborted(String),
}

/// Where in the source an abort or internal error occurred, as carried by
/// an opcode's `sinfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Source file name (from the opcode's debug info).
    pub file: String,
    /// Source line number.
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line)
    }
}

/// A bug-level internal-invariant violation: `DeadFlow`, an unexpected
/// opcode tag, a malformed mask, or a union-narrowing mismatch that upstream
/// code should have proven impossible. These are not user-reachable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalReason {
    /// Control reached a `DeadFlow` opcode.
    #[error("unreachable control flow reached")]
    DeadFlow,
    /// A runtime union-variant narrowing (`Extract`) did not match.
    #[error("union narrowing failed: runtime variant did not match")]
    UnionNarrowingFailed,
    /// An opcode tag was not recognized by the dispatcher.
    #[error("unrecognized opcode tag {0}")]
    UnknownOpcodeTag(String),
    /// A guard/optional-argument mask read or write was out of bounds or
    /// otherwise malformed.
    #[error("malformed mask access at offset {0}, index {1}")]
    MalformedMask(u32, u8),
    /// A metadata word held bits inconsistent with any valid state.
    #[error("corrupt heap metadata word: {0:#018x}")]
    CorruptMetadata(u64),
    /// An address did not resolve to a live page/slot.
    #[error("invalid heap address {0:#x}")]
    InvalidAddress(u64),
    /// A field/index/property lookup failed that the compiler should have
    /// statically guaranteed to exist.
    #[error("no such field/index: {0}")]
    MissingMember(String),
}

/// Top-level error returned by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// A user-visible abort: an assertion, an explicit `Abort`, or a
    /// checked-arithmetic/bounds/order failure.
    #[error("{reason} in {location}")]
    Abort {
        /// The abort's message.
        reason: AbortReason,
        /// Source location carried by the faulting opcode.
        location: SourceLocation,
    },
    /// An internal-invariant violation. Always a bug in the program loader
    /// or compiler that produced the bytecode, never a user mistake.
    #[error("internal invariant violated: {0}")]
    Fatal(#[from] FatalReason),
}

impl From<AbortReason> for VmError {
    /// Built without an opcode's own `sinfo` in scope — used by builtin
    /// dispatch helpers (`number_*` narrowing, `s_map_union_fast`'s
    /// disjointness check, ...) that run a level below the opcode loop and
    /// have no `SourceInfo` passed down to them, the same "no location
    /// available" fallback `FatalReason`'s own `report_line` rendering
    /// already uses.
    fn from(reason: AbortReason) -> Self {
        VmError::Abort {
            reason,
            location: SourceLocation { file: "<builtin>".into(), line: 0 },
        }
    }
}

impl VmError {
    /// Build an [`VmError::Abort`] from a reason and the opcode's location.
    pub fn abort(reason: AbortReason, location: SourceLocation) -> Self {
        VmError::Abort { reason, location }
    }

    /// The numeric process exit code this error should produce, per spec §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            VmError::Abort {
                reason: AbortReason::AssertionFailed(_),
                ..
            } => crate::consts::exit_codes::ASSERTION,
            VmError::Abort {
                reason: AbortReason::Aborted(_),
                ..
            } => crate::consts::exit_codes::ABORT,
            VmError::Abort { .. } => crate::consts::exit_codes::UNCATEGORIZED,
            VmError::Fatal(_) => crate::consts::exit_codes::UNCATEGORIZED,
        }
    }

    /// Render the `"<msg>" in <file> on line <N>` line spec §6 requires on
    /// abort.
    pub fn report_line(&self) -> String {
        match self {
            VmError::Abort { reason, location } => {
                format!("\"{reason}\" in {} on line {}", location.file, location.line)
            }
            VmError::Fatal(reason) => format!("\"{reason}\" in <internal> on line 0"),
        }
    }
}

/// Convenience alias used throughout the evaluator.
pub type VmResult<T> = Result<T, VmError>;
