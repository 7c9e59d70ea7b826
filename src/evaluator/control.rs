//! Argument resolution and the bulk of the non-arithmetic opcode handlers
//! (spec §4.4: control/debug, initialization, direct-assign/box/extract,
//! field access, projections, updates, constructors, branches, boolean,
//! type tests, return).
//!
//! Each handler mirrors the shape `crate::value::coerce` already
//! established: a plain function per opcode family, one inner match per
//! mode, no indirect dispatch table.

use crate::consts::well_known;
use crate::error::{FatalReason, SourceLocation, VmError, VmResult};
use crate::gc::{Heap, HeapAddr};
use crate::program::{
    ArgKind, ArgRef, ConstPool, FieldKey, FieldShape, FieldUpdate, Guard, SourceInfo, TargetVar,
};
use crate::types::{Category, StructShape, TypeId, TypeRegistry};
use crate::value;

use super::frame::Frame;

fn loc(sinfo: &SourceInfo) -> SourceLocation {
    SourceLocation { file: "<program>".into(), line: sinfo.line }
}

fn fatal<T>(r: FatalReason) -> VmResult<T> {
    Err(VmError::Fatal(r))
}

/// Resolve `arg`'s bytes, cloned out of whichever buffer it lives in
/// (const pool or the current frame). `width` is the number of bytes to
/// read, determined by the caller from the argument's declared type.
pub fn arg_bytes(arg: ArgRef, width: usize, frame: &Frame, const_pool: &ConstPool) -> VmResult<Vec<u8>> {
    match arg.kind {
        ArgKind::Constant => {
            let bytes = const_pool
                .bytes(arg.location)
                .ok_or_else(|| FatalReason::MissingMember(format!("const pool ref {}", arg.location)))?;
            if bytes.len() < width {
                return fatal(FatalReason::MissingMember(format!(
                    "const pool ref {} shorter than requested width {width}",
                    arg.location
                )));
            }
            Ok(bytes[..width].to_vec())
        }
        ArgKind::Parameter | ArgKind::Local | ArgKind::Register => {
            let start = arg.location as usize;
            let end = start + width;
            frame
                .locals
                .get(start..end)
                .map(|s| s.to_vec())
                .ok_or_else(|| FatalReason::MissingMember(format!("frame offset {start}..{end} out of range")))
                .map_err(VmError::Fatal)
        }
    }
}

/// Write `value` into a frame-local target slot, recording `ttype` as that
/// slot's current declared type so the collector's root walk can trace it
/// correctly (see [`Frame::slot_types`]).
pub fn write_target(dst: TargetVar, value: &[u8], ttype: TypeId, frame: &mut Frame) -> VmResult<()> {
    let start = dst.offset as usize;
    let end = start + value.len();
    frame
        .locals
        .get_mut(start..end)
        .ok_or_else(|| FatalReason::MissingMember(format!("target offset {start}..{end} out of range")))?
        .copy_from_slice(value);
    frame.record_type(dst.offset, ttype);
    Ok(())
}

// --- Control & debug ---

/// `DeadFlow` (spec §4.4 "Control & debug").
pub fn op_dead_flow() -> VmResult<()> {
    fatal(FatalReason::DeadFlow)
}

/// `Abort(msg)`.
pub fn op_abort(msg: &str, sinfo: &SourceInfo) -> VmResult<()> {
    Err(VmError::abort(crate::error::AbortReason::Aborted(msg.to_string()), loc(sinfo)))
}

/// `Assert(arg, msg)`.
pub fn op_assert(arg: ArgRef, msg: &str, sinfo: &SourceInfo, frame: &Frame, const_pool: &ConstPool) -> VmResult<()> {
    let bytes = arg_bytes(arg, 1, frame, const_pool)?;
    if bytes[0] == 0 {
        return Err(VmError::abort(crate::error::AbortReason::AssertionFailed(msg.to_string()), loc(sinfo)));
    }
    Ok(())
}

/// `Debug(arg)`: renders the value's display form. With no debugger
/// attached, `arg` absent is a no-op (there is nothing to break into).
pub fn op_debug(
    arg: Option<ArgRef>,
    ttype: Option<TypeId>,
    frame: &Frame,
    const_pool: &ConstPool,
    heap: &Heap,
    registry: &TypeRegistry,
) -> VmResult<Option<String>> {
    let (Some(arg), Some(ttype)) = (arg, ttype) else {
        return Ok(None);
    };
    let width = value::store_width(ttype, registry)?;
    let bytes = arg_bytes(arg, width, frame, const_pool)?;
    Ok(Some(value::display(&bytes, ttype, registry, heap)?))
}

// --- Initialization ---

/// `LoadUninit(dst, type)`.
pub fn op_load_uninit(dst: TargetVar, ttype: TypeId, frame: &mut Frame, registry: &TypeRegistry) -> VmResult<()> {
    let n = value::store_width(ttype, registry)?;
    let start = dst.offset as usize;
    let slot = frame
        .locals
        .get_mut(start..start + n)
        .ok_or_else(|| FatalReason::MissingMember(format!("target offset {start} out of range")))?;
    Ok(value::clear(slot, ttype, registry)?)
}

/// `NoneInitUnion(dst, unionType)`: writes a None-tagged inline-union
/// header.
pub fn op_none_init_union(dst: TargetVar, union_type: TypeId, frame: &mut Frame, registry: &TypeRegistry) -> VmResult<()> {
    let desc = registry.require(union_type)?;
    let width = desc.slot_width();
    let start = dst.offset as usize;
    let slot = frame
        .locals
        .get_mut(start..start + width)
        .ok_or_else(|| FatalReason::MissingMember(format!("target offset {start} out of range")))?;
    for b in slot.iter_mut() {
        *b = 0;
    }
    match &desc.category {
        Category::UnionRef(_) => {} // null pointer already means None
        Category::UnionInline(_) | Category::UnionUniversal(_) => {
            slot[..4].copy_from_slice(&well_known::NONE.to_le_bytes());
        }
        _ => return fatal(FatalReason::MissingMember(format!("TypeID {union_type} is not a union"))),
    }
    Ok(())
}

/// `LoadConst(dst, constRef, type)`.
pub fn op_load_const(
    dst: TargetVar,
    const_ref: u32,
    ttype: TypeId,
    frame: &mut Frame,
    const_pool: &ConstPool,
    registry: &TypeRegistry,
) -> VmResult<()> {
    let width = value::store_width(ttype, registry)?;
    let bytes = const_pool
        .bytes(const_ref)
        .ok_or_else(|| FatalReason::MissingMember(format!("const pool ref {const_ref}")))?;
    if bytes.len() < width {
        return fatal(FatalReason::MissingMember(format!("const {const_ref} shorter than type width")));
    }
    write_target(dst, &bytes[..width], ttype, frame)
}

/// `StoreConstantMask(maskOffset, index, flag)`.
pub fn op_store_constant_mask(mask_offset: u32, index: u32, flag: bool, frame: &mut Frame) {
    frame.set_mask_bit(mask_offset, index, flag);
}

// --- Direct assign / box / extract ---

/// `DirectAssign(dst, into, src, sguard)`.
pub fn op_direct_assign(
    dst: TargetVar,
    into: TypeId,
    src: ArgRef,
    frame: &mut Frame,
    const_pool: &ConstPool,
    registry: &TypeRegistry,
) -> VmResult<()> {
    let width = value::store_width(into, registry)?;
    let bytes = arg_bytes(src, width, frame, const_pool)?;
    write_target(dst, &bytes, into, frame)
}

/// `Box(dst, into, src, fromDesc, sguard)`.
pub fn op_box(
    dst: TargetVar,
    into: TypeId,
    src: ArgRef,
    from: TypeId,
    frame: &mut Frame,
    const_pool: &ConstPool,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> VmResult<()> {
    let src_width = value::store_width(from, registry)?;
    let src_bytes = arg_bytes(src, src_width, frame, const_pool)?;
    let dst_width = value::store_width(into, registry)?;
    let mut out = vec![0u8; dst_width];
    value::coerce(&mut out, &src_bytes, from, into, heap, registry)?;
    write_target(dst, &out, into, frame)
}

/// `Extract(dst, into, src, fromDesc, sguard)`: narrows a union to an
/// atomic, checking that the runtime variant actually matches `into`
/// before delegating to `coerce` (which assumes that's already proven).
pub fn op_extract(
    dst: TargetVar,
    into: TypeId,
    src: ArgRef,
    from: TypeId,
    frame: &mut Frame,
    const_pool: &ConstPool,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> VmResult<()> {
    let src_width = value::store_width(from, registry)?;
    let src_bytes = arg_bytes(src, src_width, frame, const_pool)?;
    let runtime_tid = runtime_tag_of(&src_bytes, from, heap, registry)?;
    if runtime_tid != into && !registry.is_subtype_of(runtime_tid, into) {
        return fatal(FatalReason::UnionNarrowingFailed);
    }
    let dst_width = value::store_width(into, registry)?;
    let mut out = vec![0u8; dst_width];
    value::coerce(&mut out, &src_bytes, from, into, heap, registry)?;
    write_target(dst, &out, into, frame)
}

/// The runtime concrete `TypeID` a union value (in any of the three
/// disciplines) currently holds.
fn runtime_tag_of(bytes: &[u8], tid: TypeId, heap: &Heap, registry: &TypeRegistry) -> VmResult<TypeId> {
    let desc = registry.require(tid)?;
    Ok(match &desc.category {
        Category::UnionRef(_) => {
            let addr = HeapAddr::from_bits(u64::from_le_bytes(bytes[..8].try_into().unwrap()));
            if addr.to_bits() == 0 {
                well_known::NONE
            } else {
                heap.page(addr.page_index()).owning_type
            }
        }
        Category::UnionInline(_) | Category::UnionUniversal(_) => u32::from_le_bytes(bytes[..4].try_into().unwrap()),
        _ => tid,
    })
}

// --- Presence tests (spec §4.4 "Type tests": IsNone/IsSome/IsNothing) ---
//
// The opcode carries no declared type for `arg` (unlike every other
// type-test opcode), so there is no way to know which of the three union
// disciplines it uses. We read the first 8 bytes uniformly: an
// all-zero word means a null `UnionRef` pointer (the same "null means
// absent" convention collections/strings use for None); otherwise the low
// 32 bits are read as a tag and compared against the reserved
// `NONE`/`NOTHING` TypeIDs. See `DESIGN.md`, Open Question decisions.

fn presence_word(bytes: &[u8]) -> u64 {
    let n = bytes.len().min(8);
    let mut buf = [0u8; 8];
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

/// `IsNone(arg)`.
pub fn is_none_bytes(bytes: &[u8]) -> bool {
    let w = presence_word(bytes);
    w == 0 || (w as u32) == well_known::NONE
}

/// `IsNothing(arg)`.
pub fn is_nothing_bytes(bytes: &[u8]) -> bool {
    presence_word(bytes) as u32 == well_known::NOTHING
}

/// `IsSome(arg)`.
pub fn is_some_bytes(bytes: &[u8]) -> bool {
    !is_none_bytes(bytes)
}

// --- Type tags ---

/// `TypeTagIs(dst, arg, of)`: `true` iff `arg`'s runtime `TypeID` equals
/// `of` exactly.
pub fn type_tag_is(arg_bytes: &[u8], arg_type: TypeId, of: TypeId, heap: &Heap, registry: &TypeRegistry) -> VmResult<bool> {
    Ok(runtime_tag_of(arg_bytes, arg_type, heap, registry)? == of)
}

/// `TypeTagSubtypeOf(dst, arg, of)`.
pub fn type_tag_subtype_of(arg_bytes: &[u8], arg_type: TypeId, of: TypeId, heap: &Heap, registry: &TypeRegistry) -> VmResult<bool> {
    let runtime = runtime_tag_of(arg_bytes, arg_type, heap, registry)?;
    Ok(registry.is_subtype_of(runtime, of))
}

// --- Boolean ---

/// `PrefixNot(dst, arg)`.
pub fn prefix_not(b: bool) -> bool {
    !b
}

// --- Field access / Project / Update / Constructor ---

fn struct_shape_of<'r>(tid: TypeId, registry: &'r TypeRegistry) -> VmResult<&'r StructShape> {
    let desc = registry.require(tid)?;
    match &desc.category {
        Category::Struct(s) | Category::BoxedStruct(s) | Category::Ref(s) => Ok(s),
        _ => fatal(FatalReason::MissingMember(format!("TypeID {tid} is not struct-shaped"))),
    }
}

fn shape_fields(shape: &StructShape) -> Vec<(u32, u32, TypeId)> {
    match shape {
        StructShape::Tuple(t) => t
            .idx_offsets
            .iter()
            .zip(&t.ttypes)
            .enumerate()
            .map(|(i, (&o, &ty))| (i as u32, o, ty))
            .collect(),
        StructShape::Record(r) => r
            .property_ids
            .iter()
            .zip(&r.property_offsets)
            .zip(&r.rtypes)
            .map(|((&id, &o), &ty)| (id, o, ty))
            .collect(),
        StructShape::Entity(e) => e
            .field_ids
            .iter()
            .zip(&e.field_offsets)
            .zip(&e.ftypes)
            .map(|((&id, &o), &ty)| (id, o, ty))
            .collect(),
        StructShape::EphemeralList(e) => e
            .idx_offsets
            .iter()
            .zip(&e.etypes)
            .enumerate()
            .map(|(i, (&o, &ty))| (i as u32, o, ty))
            .collect(),
    }
}

/// `LoadTupleIndexDirect`/`LoadRecordPropertyDirect`/`LoadEntityFieldDirect`
/// and their `Virtual`/`SetGuard*` variants, collapsed into `LoadField`.
#[allow(clippy::too_many_arguments)]
pub fn op_load_field(
    dst: TargetVar,
    arg: ArgRef,
    arg_type: TypeId,
    shape: FieldShape,
    field: FieldKey,
    virtual_access: bool,
    set_guard: Option<Guard>,
    frame: &mut Frame,
    const_pool: &ConstPool,
    heap: &Heap,
    registry: &TypeRegistry,
) -> VmResult<()> {
    let arg_width = value::store_width(arg_type, registry)?;
    let arg_val = arg_bytes(arg, arg_width, frame, const_pool)?;
    let result = if virtual_access {
        value::resolve_virtual_field(&arg_val, arg_type, shape, field.key, registry, heap)
    } else {
        value::index(&arg_val, field.offset, arg_type, registry, heap).map(|l| (l, field.ttype))
    };
    match result {
        Ok((location, ftype)) => {
            let width = value::store_width(ftype, registry)?;
            let bytes = value::read_field(&arg_val, location, width, heap).to_vec();
            write_target(dst, &bytes, ftype, frame)?;
            if let Some(g) = set_guard {
                frame.set_mask_bit(g.mask_offset, g.index, true);
            }
            Ok(())
        }
        Err(e) => {
            if let Some(g) = set_guard {
                frame.set_mask_bit(g.mask_offset, g.index, false);
                Ok(())
            } else {
                Err(VmError::Fatal(e))
            }
        }
    }
}

/// `ProjectTuple|Record|Entity(trgt, trgtEL, arg, layout, picks[])`.
#[allow(clippy::too_many_arguments)]
pub fn op_project(
    trgt: TargetVar,
    trgt_ephemeral_type: TypeId,
    arg: ArgRef,
    arg_type: TypeId,
    picks: &[FieldKey],
    frame: &mut Frame,
    const_pool: &ConstPool,
    heap: &Heap,
    registry: &TypeRegistry,
) -> VmResult<()> {
    let arg_width = value::store_width(arg_type, registry)?;
    let arg_val = arg_bytes(arg, arg_width, frame, const_pool)?;
    let out_shape = struct_shape_of(trgt_ephemeral_type, registry)?;
    let out_fields = shape_fields(out_shape);
    let out_desc = registry.require(trgt_ephemeral_type)?;
    let mut out = vec![0u8; out_desc.size_info.inline_size as usize];
    for (i, field) in picks.iter().enumerate() {
        let loc = value::index(&arg_val, field.offset, arg_type, registry, heap)?;
        let width = value::store_width(field.ttype, registry)?;
        let bytes = value::read_field(&arg_val, loc, width, heap);
        let (_, out_offset, _) = out_fields
            .get(i)
            .ok_or_else(|| FatalReason::MissingMember(format!("projection slot {i}")))?;
        out[*out_offset as usize..*out_offset as usize + width].copy_from_slice(bytes);
    }
    write_target(trgt, &out, trgt_ephemeral_type, frame)
}

/// `UpdateTuple|Record|Entity(trgt, trgtType, arg, layout, updates[])`.
#[allow(clippy::too_many_arguments)]
pub fn op_update(
    trgt: TargetVar,
    trgt_type: TypeId,
    arg: ArgRef,
    arg_type: TypeId,
    updates: &[FieldUpdate],
    frame: &mut Frame,
    const_pool: &ConstPool,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> VmResult<()> {
    let arg_width = value::store_width(arg_type, registry)?;
    let arg_val = arg_bytes(arg, arg_width, frame, const_pool)?;
    let source_base = value::index(&arg_val, 0, arg_type, registry, heap)?;
    let trgt_desc = registry.require(trgt_type)?;
    let payload_len = trgt_desc.size_info.heap_size.max(trgt_desc.size_info.inline_size) as usize;
    let mut payload = value::read_field(&arg_val, source_base, payload_len, heap).to_vec();
    for u in updates {
        let field_width = value::store_width(u.field.ttype, registry)?;
        let bytes = arg_bytes(u.value, field_width, frame, const_pool)?;
        let off = u.field.offset as usize;
        payload[off..off + field_width].copy_from_slice(&bytes);
    }
    match &trgt_desc.category {
        Category::Struct(_) => write_target(trgt, &payload, trgt_type, frame),
        Category::Ref(_) | Category::BoxedStruct(_) => {
            let addr = heap.allocate(trgt_type, registry)?;
            heap.bytes_at_mut(addr)[..payload.len()].copy_from_slice(&payload);
            write_target(trgt, &addr.to_bits().to_le_bytes(), trgt_type, frame)
        }
        _ => fatal(FatalReason::MissingMember(format!("TypeID {trgt_type} is not updatable"))),
    }
}

/// `ConstructorTuple|Record|Entity|EphemeralList(trgt, oftype, args[])` and
/// the `*FromEphemeralList` memcpy variants.
pub fn op_constructor(
    trgt: TargetVar,
    oftype: TypeId,
    args: &[ArgRef],
    from_ephemeral: bool,
    frame: &mut Frame,
    const_pool: &ConstPool,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> VmResult<()> {
    let desc = registry.require(oftype)?;
    let payload_len = desc.size_info.heap_size.max(desc.size_info.inline_size) as usize;
    let mut payload = vec![0u8; payload_len];
    if from_ephemeral {
        let src = args.first().copied().ok_or_else(|| FatalReason::MissingMember("FromEphemeralList with no source".into()))?;
        let bytes = arg_bytes(src, payload_len, frame, const_pool)?;
        payload.copy_from_slice(&bytes);
    } else {
        let fields = shape_fields(struct_shape_of(oftype, registry)?);
        for (arg, (_, offset, ty)) in args.iter().zip(fields.iter()) {
            let width = value::store_width(*ty, registry)?;
            let bytes = arg_bytes(*arg, width, frame, const_pool)?;
            payload[*offset as usize..*offset as usize + width].copy_from_slice(&bytes);
        }
    }
    match &desc.category {
        Category::Struct(_) => write_target(trgt, &payload, oftype, frame),
        Category::Ref(_) | Category::BoxedStruct(_) => {
            let addr = heap.allocate(oftype, registry)?;
            heap.bytes_at_mut(addr)[..payload.len()].copy_from_slice(&payload);
            write_target(trgt, &addr.to_bits().to_le_bytes(), oftype, frame)
        }
        _ => fatal(FatalReason::MissingMember(format!("TypeID {oftype} is not constructible"))),
    }
}

/// `EphemeralListExtendOp(trgt, base, extra[])`: concatenates an ephemeral
/// list with extra arguments into a new, wider ephemeral list.
///
/// The opcode names no widened target type (unlike `Project`/`Update`/
/// `LoadField`, which all carry the aggregate type they operate over), so
/// there's no declared field-offset table to place `extra`'s elements
/// into. Ephemeral lists only ever stage a later
/// `ConstructorFromEphemeralList`'s payload, one fixed machine word per
/// slot, so each extra argument is simply appended as one 8-byte word —
/// the same uniform-word assumption `dispatch::resolve_builtin_args` makes
/// for an inline `Builtin`'s arguments. See `DESIGN.md`, Open Question
/// decisions.
pub fn op_ephemeral_list_extend(
    trgt: TargetVar,
    base: ArgRef,
    base_type: TypeId,
    extra: &[ArgRef],
    frame: &mut Frame,
    const_pool: &ConstPool,
    registry: &TypeRegistry,
) -> VmResult<()> {
    let base_desc = registry.require(base_type)?;
    let base_len = base_desc.size_info.inline_size as usize;
    let mut out = arg_bytes(base, base_len, frame, const_pool)?;
    for arg in extra {
        let bytes = arg_bytes(*arg, crate::consts::WORD_SIZE, frame, const_pool)?;
        out.extend_from_slice(&bytes);
    }
    write_target(trgt, &out, base_type, frame)
}

// --- Return ---

/// `ReturnAssign(dst, src)`: copies `src` from the returning frame into
/// `dst`, a slot offset in the *caller's* frame — the caller is
/// responsible for translating `dst` (given by the callee's own
/// `result_offset`) before this is invoked; see `evaluator::mod`'s
/// `Invoke` handling.
pub fn op_return_assign(src_bytes: &[u8], result_type: TypeId, caller: &mut Frame, caller_offset: u32) -> VmResult<()> {
    write_target(TargetVar { offset: caller_offset }, src_bytes, result_type, caller)
}
