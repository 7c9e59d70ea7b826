//! `keyCmp` (spec §4.3 "Key comparison"): a total order over key-comparable
//! values, used by map/set keys and the `KeyEq`/`KeyLess` opcode family.
//!
//! Spec §4.3: "Float, Decimal, Rational, and non-comparable aggregates have
//! `keyCmp = ⊥`" — we surface that as an error rather than a panic, since a
//! well-formed program should never reach it (the compiler is expected to
//! reject non-comparable map/set keys statically); reaching it here is an
//! internal-invariant violation, not a user mistake.

use std::cmp::Ordering;

use crate::consts::well_known;
use crate::error::FatalReason;
use crate::gc::{Heap, HeapAddr};
use crate::types::{Category, StructShape, TypeId, TypeRegistry};

use super::bytes_util::{read_u32, read_u64};

/// Compare two values of the same static type `tid` for key ordering.
pub fn key_cmp(a: &[u8], b: &[u8], tid: TypeId, registry: &TypeRegistry, heap: &Heap) -> Result<Ordering, FatalReason> {
    let desc = registry.require(tid)?;
    if !desc.key_comparable {
        return Err(FatalReason::MissingMember(format!("TypeID {tid} is not key-comparable")));
    }
    match &desc.category {
        Category::Empty => Ok(Ordering::Equal),
        Category::Register => cmp_register(a, b, tid),
        Category::BigNum => Ok(cmp_bignum(a, b, tid)),
        Category::String => cmp_string(a, b, heap),
        Category::ByteBuffer => Ok(crate::strings::bytebuffer::flatten(a, heap).cmp(&crate::strings::bytebuffer::flatten(b, heap))),
        Category::Struct(shape) | Category::BoxedStruct(shape) => cmp_struct(a, b, shape, registry, heap),
        Category::Ref(shape) => {
            let addr_a = HeapAddr::from_bits(read_u64(a, 0));
            let addr_b = HeapAddr::from_bits(read_u64(b, 0));
            cmp_struct(heap.bytes_at(addr_a), heap.bytes_at(addr_b), shape, registry, heap)
        }
        Category::Collection => Err(FatalReason::MissingMember(format!(
            "TypeID {tid}: collections are not key-comparable by identity"
        ))),
        Category::UnionRef(_) | Category::UnionInline(_) | Category::UnionUniversal(_) => cmp_union(a, b, tid, registry, heap),
    }
}

fn cmp_register(a: &[u8], b: &[u8], tid: TypeId) -> Result<Ordering, FatalReason> {
    match tid {
        well_known::BOOL => Ok(a[0].cmp(&b[0])),
        well_known::NAT => Ok(read_u64(a, 0).cmp(&read_u64(b, 0))),
        well_known::INT => Ok((read_u64(a, 0) as i64).cmp(&(read_u64(b, 0) as i64))),
        well_known::FLOAT | well_known::DECIMAL | well_known::RATIONAL => Err(FatalReason::MissingMember(format!(
            "TypeID {tid} has keyCmp = bottom"
        ))),
        // Other fixed-width register types (DateTime, UUID, hashes, ...):
        // treat as an unsigned little-endian integer, since that's the
        // natural ordering for every well-known register type other than
        // the three excluded above.
        _ => Ok(a.iter().rev().cmp(b.iter().rev())),
    }
}

fn cmp_bignum(a: &[u8], b: &[u8], tid: TypeId) -> Ordering {
    if tid == well_known::BIG_INT {
        let ai = ethnum::I256::from_le_bytes(a[..32].try_into().unwrap());
        let bi = ethnum::I256::from_le_bytes(b[..32].try_into().unwrap());
        ai.cmp(&bi)
    } else {
        let au = ethnum::U256::from_le_bytes(a[..32].try_into().unwrap());
        let bu = ethnum::U256::from_le_bytes(b[..32].try_into().unwrap());
        au.cmp(&bu)
    }
}

fn cmp_string(a: &[u8], b: &[u8], heap: &Heap) -> Result<Ordering, FatalReason> {
    Ok(crate::strings::flatten(a, heap).cmp(&crate::strings::flatten(b, heap)))
}

fn cmp_struct(a: &[u8], b: &[u8], shape: &StructShape, registry: &TypeRegistry, heap: &Heap) -> Result<Ordering, FatalReason> {
    let fields: Vec<(TypeId, u32)> = match shape {
        StructShape::Tuple(t) => t.ttypes.iter().copied().zip(t.idx_offsets.iter().copied()).collect(),
        StructShape::Record(r) => r.rtypes.iter().copied().zip(r.property_offsets.iter().copied()).collect(),
        StructShape::Entity(e) => e.ftypes.iter().copied().zip(e.field_offsets.iter().copied()).collect(),
        StructShape::EphemeralList(e) => e.etypes.iter().copied().zip(e.idx_offsets.iter().copied()).collect(),
    };
    for (fty, off) in fields {
        let width = registry.require(fty)?.slot_width();
        let o = off as usize;
        let ord = key_cmp(&a[o..o + width], &b[o..o + width], fty, registry, heap)?;
        if ord != Ordering::Equal {
            return Ok(ord);
        }
    }
    Ok(Ordering::Equal)
}

fn cmp_union(a: &[u8], b: &[u8], tid: TypeId, registry: &TypeRegistry, heap: &Heap) -> Result<Ordering, FatalReason> {
    let desc = registry.require(tid)?;
    match &desc.category {
        Category::UnionRef(_) => {
            let addr_a = HeapAddr::from_bits(read_u64(a, 0));
            let addr_b = HeapAddr::from_bits(read_u64(b, 0));
            let tag_a = heap.page(addr_a.page_index()).owning_type;
            let tag_b = heap.page(addr_b.page_index()).owning_type;
            if tag_a != tag_b {
                return Ok(tag_a.cmp(&tag_b));
            }
            key_cmp(heap.bytes_at(addr_a), heap.bytes_at(addr_b), tag_a, registry, heap)
        }
        Category::UnionInline(_) => {
            let tag_a = read_u32(a, 0);
            let tag_b = read_u32(b, 0);
            if tag_a != tag_b {
                return Ok(tag_a.cmp(&tag_b));
            }
            let width = registry.require(tag_a)?.slot_width();
            key_cmp(&a[8..8 + width], &b[8..8 + width], tag_a, registry, heap)
        }
        Category::UnionUniversal(_) => {
            let tag_a = read_u32(a, 0);
            let tag_b = read_u32(b, 0);
            if tag_a != tag_b {
                return Ok(tag_a.cmp(&tag_b));
            }
            let member = registry.require(tag_a)?;
            let budget = crate::consts::WORD_SIZE * crate::consts::UNION_UNIVERSAL_PAYLOAD_WORDS;
            if member.slot_width() <= budget {
                let width = member.slot_width();
                key_cmp(&a[8..8 + width], &b[8..8 + width], tag_a, registry, heap)
            } else {
                let addr_a = HeapAddr::from_bits(read_u64(a, crate::consts::WORD_SIZE));
                let addr_b = HeapAddr::from_bits(read_u64(b, crate::consts::WORD_SIZE));
                key_cmp(heap.bytes_at(addr_a), heap.bytes_at(addr_b), tag_a, registry, heap)
            }
        }
        _ => unreachable!("cmp_union only called for union categories"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::types::{SizeInfo, TypeDescriptor};

    fn nat_desc() -> TypeDescriptor {
        TypeDescriptor {
            tid: well_known::NAT,
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

    fn float_desc() -> TypeDescriptor {
        TypeDescriptor {
            tid: well_known::FLOAT,
            name: "Float".into(),
            category: Category::Register,
            size_info: SizeInfo {
                heap_size: 8,
                inline_size: 8,
                assign_size: 8,
            },
            heap_mask: Default::default(),
            inline_mask: Default::default(),
            vtable: Vec::new(),
            key_comparable: false,
            boxed_envelope: None,
        }
    }

    #[test]
    fn nat_compares_unsigned() {
        let reg = TypeRegistry::new([nat_desc()]);
        let heap = Heap::new(VmConfig::default());
        let a = 3u64.to_le_bytes();
        let b = 9u64.to_le_bytes();
        assert_eq!(key_cmp(&a, &b, well_known::NAT, &reg, &heap).unwrap(), Ordering::Less);
    }

    #[test]
    fn float_key_cmp_is_bottom() {
        let reg = TypeRegistry::new([float_desc()]);
        let heap = Heap::new(VmConfig::default());
        let a = 1.0f64.to_le_bytes();
        let b = 2.0f64.to_le_bytes();
        assert!(key_cmp(&a, &b, well_known::FLOAT, &reg, &heap).is_err());
    }
}
