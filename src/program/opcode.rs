//! The opcode stream model (spec §4.4, §6 "Opcode encoding").
//!
//! Several opcode families the spec enumerates as separate tags
//! (`LoadTupleIndexDirect` / `LoadTupleIndexVirtual` / their `SetGuard`
//! counterparts for each of Tuple/Record/Entity, and similarly for
//! Project/Update/Constructor) are collapsed here into one variant per
//! family carrying a [`FieldShape`] and the relevant mode flags, rather
//! than enumerated as a dozen near-identical variants. The set of
//! operations and their semantics are unchanged; only the wire tag
//! granularity is. See `DESIGN.md`.

use crate::types::TypeId;

use super::invoke::InvokeId;

/// Source-position info carried by every opcode, for `Abort`/`Assert`
/// messages and debugger line reporting (spec §6 "sinfo").
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceInfo {
    pub line: u32,
    pub column: u32,
}

/// Where one argument's value is read from (spec §6 "Argument references").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Constant,
    Parameter,
    Local,
    Register,
}

/// A reference to an argument's storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgRef {
    pub kind: ArgKind,
    pub location: u32,
}

/// A destination slot's byte offset within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetVar {
    pub offset: u32,
}

/// A boolean guard read, resolved from either the local mask or a frame
/// variable (spec §4.4 "Masks", "Statement guard").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    pub mask_offset: u32,
    pub index: u32,
    pub var_offset: u32,
}

/// A full statement guard wrapping an opcode's effect (spec §4.4
/// "Statement guard").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementGuard {
    pub guard: Guard,
    pub default_var: u32,
    pub use_default_on: bool,
    pub enabled: bool,
}

/// Which struct-shaped aggregate a field/projection/update/constructor
/// opcode targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Tuple,
    Record,
    Entity,
    /// Constructors only: a stack-only ephemeral list.
    EphemeralList,
}

/// One selected field/index/property to project, update, or read, keyed
/// generically by its declared offset and (for Record/Entity) an interned
/// property/field id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldKey {
    /// Tuple index, or interned property/field id for Record/Entity.
    pub key: u32,
    pub offset: u32,
    pub ttype: TypeId,
}

/// One `(field, value)` assignment in an `Update` opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldUpdate {
    pub field: FieldKey,
    pub value: ArgRef,
}

/// Which checked fixed-width arithmetic operation a `CheckedArith` opcode
/// performs (spec §4.4 "Primitive arithmetic": negate/add/sub/mul, plus
/// checked divide).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckedArithOp {
    Negate,
    Add,
    Sub,
    Mul,
    Div,
}

/// Key-eq/key-less specialization (spec §4.4 "Key-eq / key-less"): whether
/// both operands are already known-concrete of the same descriptor
/// (`Fast`), one/both are statically inside the same union (`Static`), or
/// descriptors may differ at runtime (`Virtual`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCompareMode {
    Fast,
    Static,
    Virtual,
}

/// The decoded operation an opcode performs, independent of its source
/// position (spec §4.4).
#[derive(Debug, Clone, PartialEq)]
pub enum InterpOp {
    // --- Control & debug ---
    DeadFlow,
    Abort { msg: String },
    Assert { arg: ArgRef, msg: String },
    Debug { arg: Option<ArgRef> },

    // --- Initialization ---
    LoadUninit { dst: TargetVar, ttype: TypeId },
    NoneInitUnion { dst: TargetVar, union_type: TypeId },
    LoadConst { dst: TargetVar, const_ref: u32, ttype: TypeId },
    StoreConstantMask { mask_offset: u32, index: u32, flag: bool },

    // --- Direct assign / box / extract ---
    DirectAssign { dst: TargetVar, into: TypeId, src: ArgRef, sguard: Option<StatementGuard> },
    Box { dst: TargetVar, into: TypeId, src: ArgRef, from: TypeId, sguard: Option<StatementGuard> },
    Extract { dst: TargetVar, into: TypeId, src: ArgRef, from: TypeId, sguard: Option<StatementGuard> },

    // --- Field access ---
    LoadField {
        shape: FieldShape,
        dst: TargetVar,
        arg: ArgRef,
        /// Static type of `arg`'s value — needed to know whether it must
        /// be dereferenced (`Ref`), tag-decoded (union), or read in place
        /// (`Struct`) before the field offset applies.
        arg_type: TypeId,
        field: FieldKey,
        /// `true` for the `*Virtual` variants: resolve the offset from the
        /// runtime variant's descriptor instead of a statically-known one.
        virtual_access: bool,
        /// `Some` for the `SetGuard*` variants: also write whether the
        /// load was legal to the local mask.
        set_guard: Option<Guard>,
    },

    // --- Projections ---
    Project {
        shape: FieldShape,
        trgt: TargetVar,
        trgt_ephemeral_type: TypeId,
        arg: ArgRef,
        /// Static type of `arg`'s value (spec §4.4 "layout").
        arg_type: TypeId,
        picks: Vec<FieldKey>,
    },

    // --- Updates ---
    Update {
        shape: FieldShape,
        trgt: TargetVar,
        trgt_type: TypeId,
        arg: ArgRef,
        /// Static type of `arg`'s value (spec §4.4 "layout").
        arg_type: TypeId,
        updates: Vec<FieldUpdate>,
    },

    // --- Constructors ---
    Constructor {
        shape: FieldShape,
        trgt: TargetVar,
        oftype: TypeId,
        args: Vec<ArgRef>,
        /// `true` for the `*FromEphemeralList` variants: skip per-argument
        /// evaluation and memcpy the ephemeral payload instead.
        from_ephemeral: bool,
    },
    EphemeralListExtendOp {
        trgt: TargetVar,
        base: ArgRef,
        /// Static ephemeral-list type of `base`.
        base_type: TypeId,
        extra: Vec<ArgRef>,
    },

    // --- Invocation ---
    Invoke {
        trgt: TargetVar,
        invoke_id: InvokeId,
        args: Vec<ArgRef>,
        sguard: Option<StatementGuard>,
        optmask_offset: Option<u32>,
        /// `true` for `InvokeVirtualFunction`: resolve `invoke_id` through
        /// the receiver's runtime `TypeID` vtable instead of calling it
        /// directly.
        virtual_dispatch: bool,
    },

    // --- Branches ---
    Jump { offset: i32 },
    JumpCond { arg: ArgRef, t_offset: i32, f_offset: i32 },
    JumpNone { arg: ArgRef, layout: TypeId, n_offset: i32, s_offset: i32 },

    // --- Boolean ---
    PrefixNot { dst: TargetVar, arg: ArgRef },
    AllTrue { dst: TargetVar, args: Vec<ArgRef> },
    SomeTrue { dst: TargetVar, args: Vec<ArgRef> },

    // --- Key-eq / key-less ---
    KeyEq { dst: TargetVar, mode: KeyCompareMode, lhs: ArgRef, rhs: ArgRef, lhs_type: TypeId, rhs_type: TypeId },
    KeyLess { dst: TargetVar, mode: KeyCompareMode, lhs: ArgRef, rhs: ArgRef, lhs_type: TypeId, rhs_type: TypeId },

    // --- Type tests ---
    IsNone { dst: TargetVar, arg: ArgRef },
    IsSome { dst: TargetVar, arg: ArgRef },
    IsNothing { dst: TargetVar, arg: ArgRef },
    TypeTagIs { dst: TargetVar, arg: ArgRef, of: TypeId },
    TypeTagSubtypeOf { dst: TargetVar, arg: ArgRef, of: TypeId },

    // --- Return ---
    ReturnAssign { dst: TargetVar, src: ArgRef },
    ReturnAssignOfCons { dst: TargetVar, args: Vec<ArgRef>, entity_type: TypeId },

    // --- Primitive arithmetic (spec §4.4 "Primitive arithmetic") ---
    CheckedArith { dst: TargetVar, op: CheckedArithOp, ttype: TypeId, lhs: ArgRef, rhs: Option<ArgRef> },
    FloatOrder { dst: TargetVar, less_or_equal: bool, lhs: ArgRef, rhs: ArgRef },

    // --- Primitive built-ins (spec §4.4 "Primitive built-ins") ---
    Builtin { dst: TargetVar, tag: String, args: Vec<ArgRef> },
}

/// One opcode in an invocation body: the decoded operation plus its
/// source position and original source text (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct Opcode {
    pub op: InterpOp,
    pub sinfo: SourceInfo,
    pub ssrc: String,
}
