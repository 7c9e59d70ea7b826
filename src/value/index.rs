//! `index` (spec §4.3): resolve a field/element address from a value's
//! static type, following `Ref`/union indirection until a struct-shaped
//! (or `BoxedStruct`-shaped) payload is reached.
//!
//! Spec §4.3 states the contract in terms of pointer arithmetic ("returns
//! `src + offset`" for a struct, "returns `*src + offset`" for a ref). We
//! cannot literally return a raw address out of a borrow-checked slice, so
//! [`Location`] names *which buffer* the final offset is relative to
//! (the caller's own slot, or a specific heap object) instead.

use crate::consts::{UNION_UNIVERSAL_PAYLOAD_WORDS, WORD_SIZE};
use crate::error::FatalReason;
use crate::gc::{Heap, HeapAddr};
use crate::program::FieldShape;
use crate::types::{Category, StructShape, TypeId, TypeRegistry};

use super::bytes_util::{read_u32, read_u64};

/// Where a resolved field's bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// `offset` bytes into the same buffer the caller passed to [`index`].
    SameBuffer(usize),
    /// `offset` bytes into the heap object at this address.
    Heap(HeapAddr, usize),
}

/// Follow `tid`'s category down to its innermost struct/boxed-struct
/// payload, returning the buffer that payload's fields live in (offset 0)
/// together with the concrete `TypeId` reached. `current` must hold
/// exactly `tid`'s slot bytes.
fn resolve_base(current: &[u8], tid: TypeId, registry: &TypeRegistry, heap: &Heap) -> Result<(Location, TypeId), FatalReason> {
    let desc = registry.require(tid)?;
    match &desc.category {
        Category::Struct(_) | Category::BoxedStruct(_) => Ok((Location::SameBuffer(0), tid)),
        Category::Ref(_) => {
            let addr = HeapAddr::from_bits(read_u64(current, 0));
            Ok((Location::Heap(addr, 0), tid))
        }
        Category::UnionRef(_) => {
            let addr = HeapAddr::from_bits(read_u64(current, 0));
            let concrete = heap.page(addr.page_index()).owning_type;
            let payload = heap.bytes_at(addr);
            let (inner, concrete) = resolve_base(payload, concrete, registry, heap)?;
            // Any offset `resolve_base` found within `payload` is relative
            // to the heap object at `addr`, not the caller's `current`.
            let offset = match inner {
                Location::SameBuffer(o) => o,
                Location::Heap(inner_addr, o) => return Ok((Location::Heap(inner_addr, o), concrete)),
            };
            Ok((Location::Heap(addr, offset), concrete))
        }
        Category::UnionInline(_) => {
            let tag = read_u32(current, 0);
            let member = registry.require(tag)?;
            let width = member.slot_width();
            let (inner, concrete) = resolve_base(&current[WORD_SIZE..WORD_SIZE + width], tag, registry, heap)?;
            let offset = match inner {
                Location::SameBuffer(o) => WORD_SIZE + o,
                heap_loc @ Location::Heap(..) => return Ok((heap_loc, concrete)),
            };
            Ok((Location::SameBuffer(offset), concrete))
        }
        Category::UnionUniversal(_) => {
            let tag = read_u32(current, 0);
            let member = registry.require(tag)?;
            let budget = WORD_SIZE * UNION_UNIVERSAL_PAYLOAD_WORDS;
            if member.slot_width() <= budget {
                let width = member.slot_width();
                let (inner, concrete) = resolve_base(&current[WORD_SIZE..WORD_SIZE + width], tag, registry, heap)?;
                let offset = match inner {
                    Location::SameBuffer(o) => WORD_SIZE + o,
                    heap_loc @ Location::Heap(..) => return Ok((heap_loc, concrete)),
                };
                Ok((Location::SameBuffer(offset), concrete))
            } else {
                let addr = HeapAddr::from_bits(read_u64(current, WORD_SIZE));
                let concrete_boxed = heap.page(addr.page_index()).owning_type;
                Ok((Location::Heap(addr, 0), concrete_boxed))
            }
        }
        _ => Err(FatalReason::MissingMember(format!(
            "index not supported for TypeID {tid}"
        ))),
    }
}

/// Resolve the address of a statically-known field at `offset` within a
/// value of type `tid` (spec §4.3 `index`).
pub fn index(src: &[u8], offset: u32, tid: TypeId, registry: &TypeRegistry, heap: &Heap) -> Result<Location, FatalReason> {
    let (base, _concrete) = resolve_base(src, tid, registry, heap)?;
    Ok(match base {
        Location::SameBuffer(o) => Location::SameBuffer(o + offset as usize),
        Location::Heap(addr, o) => Location::Heap(addr, o + offset as usize),
    })
}

/// Read `width` bytes at a resolved [`Location`], given the original
/// buffer `index`/`resolve_virtual_field` were called with.
pub fn read_field<'a>(original_src: &'a [u8], loc: Location, width: usize, heap: &'a Heap) -> &'a [u8] {
    match loc {
        Location::SameBuffer(off) => &original_src[off..off + width],
        Location::Heap(addr, off) => &heap.bytes_at(addr)[off..off + width],
    }
}

fn shape_lookup(shape: &StructShape, field_shape: FieldShape, key: u32) -> Option<(u32, TypeId)> {
    match (field_shape, shape) {
        (FieldShape::Tuple, StructShape::Tuple(t)) => t
            .idx_offsets
            .get(key as usize)
            .zip(t.ttypes.get(key as usize))
            .map(|(&o, &ty)| (o, ty)),
        (FieldShape::Record, StructShape::Record(r)) => r
            .property_ids
            .iter()
            .position(|&id| id == key)
            .map(|i| (r.property_offsets[i], r.rtypes[i])),
        (FieldShape::Entity, StructShape::Entity(e)) => e
            .field_ids
            .iter()
            .position(|&id| id == key)
            .map(|i| (e.field_offsets[i], e.ftypes[i])),
        (FieldShape::EphemeralList, StructShape::EphemeralList(e)) => e
            .idx_offsets
            .get(key as usize)
            .zip(e.etypes.get(key as usize))
            .map(|(&o, &ty)| (o, ty)),
        _ => None,
    }
}

/// Resolve a field whose offset is not statically known: follow `tid`'s
/// indirection down to its concrete struct/boxed-struct payload the same
/// way [`index`] does, then search *that* concrete type's own layout for
/// `key` (spec §4.4 "Virtual" field access: "resolve the offset from the
/// runtime variant's descriptor"). Returns the field's location and its
/// declared type.
pub fn resolve_virtual_field(
    src: &[u8],
    tid: TypeId,
    field_shape: FieldShape,
    key: u32,
    registry: &TypeRegistry,
    heap: &Heap,
) -> Result<(Location, TypeId), FatalReason> {
    let (base, concrete) = resolve_base(src, tid, registry, heap)?;
    let concrete_desc = registry.require(concrete)?;
    let shape = match &concrete_desc.category {
        Category::Struct(s) | Category::BoxedStruct(s) | Category::Ref(s) => s,
        _ => {
            return Err(FatalReason::MissingMember(format!(
                "virtual field lookup on non-struct TypeID {concrete}"
            )))
        }
    };
    let (offset, ftype) = shape_lookup(shape, field_shape, key)
        .ok_or_else(|| FatalReason::MissingMember(format!("field {key} not found on TypeID {concrete}")))?;
    let loc = match base {
        Location::SameBuffer(o) => Location::SameBuffer(o + offset as usize),
        Location::Heap(addr, o) => Location::Heap(addr, o + offset as usize),
    };
    Ok((loc, ftype))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::types::{EntityLayout, SizeInfo, TypeDescriptor};

    fn entity_desc(tid: TypeId, field_ty: TypeId) -> TypeDescriptor {
        TypeDescriptor {
            tid,
            name: "Point".into(),
            category: Category::Struct(StructShape::Entity(EntityLayout {
                field_ids: vec![10, 11],
                field_offsets: vec![0, 8],
                ftypes: vec![field_ty, field_ty],
            })),
            size_info: SizeInfo {
                heap_size: 16,
                inline_size: 16,
                assign_size: 16,
            },
            heap_mask: Default::default(),
            inline_mask: Default::default(),
            vtable: Vec::new(),
            key_comparable: false,
            boxed_envelope: None,
        }
    }

    fn nat_desc(tid: TypeId) -> TypeDescriptor {
        TypeDescriptor {
            tid,
            name: "Nat".into(),
            category: Category::Register,
            size_info: SizeInfo {
                heap_size: 8,
                inline_size: 8,
                assign_size: 8,
            },
            heap_mask: Default::default(),
            inline_mask: Default::default(),
            vtable: Vec::new(),
            key_comparable: true,
            boxed_envelope: None,
        }
    }

    fn ref_desc(tid: TypeId, shape_tid: TypeId) -> TypeDescriptor {
        TypeDescriptor {
            tid,
            name: "PointRef".into(),
            category: Category::Ref(StructShape::Entity(EntityLayout {
                field_ids: vec![10, 11],
                field_offsets: vec![0, 8],
                ftypes: vec![shape_tid, shape_tid],
            })),
            size_info: SizeInfo::default(),
            heap_mask: Default::default(),
            inline_mask: Default::default(),
            vtable: Vec::new(),
            key_comparable: false,
            boxed_envelope: None,
        }
    }

    #[test]
    fn struct_index_is_same_buffer_plus_offset() {
        let reg = TypeRegistry::new([entity_desc(1, 2), nat_desc(2)]);
        let heap = Heap::new(VmConfig::default());
        let src = [0u8; 16];
        let loc = index(&src, 8, 1, &reg, &heap).unwrap();
        assert_eq!(loc, Location::SameBuffer(8));
    }

    #[test]
    fn ref_index_dereferences_then_offsets() {
        let reg = TypeRegistry::new([ref_desc(1, 2), nat_desc(2)]);
        let mut heap = Heap::new(VmConfig::default());
        let addr = heap.allocate(1, &reg).unwrap();
        heap.bytes_at_mut(addr)[8..16].copy_from_slice(&99u64.to_le_bytes());
        let mut src = [0u8; 8];
        src.copy_from_slice(&addr.to_bits().to_le_bytes());
        let loc = index(&src, 8, 1, &reg, &heap).unwrap();
        assert_eq!(loc, Location::Heap(addr, 8));
        let bytes = read_field(&src, loc, 8, &heap);
        assert_eq!(u64::from_le_bytes(bytes.try_into().unwrap()), 99);
    }

    #[test]
    fn virtual_field_resolves_by_entity_id() {
        let reg = TypeRegistry::new([entity_desc(1, 2), nat_desc(2)]);
        let heap = Heap::new(VmConfig::default());
        let src = [0u8; 16];
        let (loc, ftype) = resolve_virtual_field(&src, 1, FieldShape::Entity, 11, &reg, &heap).unwrap();
        assert_eq!(loc, Location::SameBuffer(8));
        assert_eq!(ftype, 2);
    }
}
