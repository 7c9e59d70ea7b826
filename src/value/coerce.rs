//! `coerce` (spec §4.3): move a value between an atomic/struct/ref type and
//! one of the three union disciplines, or between two union disciplines.
//!
//! The 4x4 table (rows/cols: atomic-or-struct-or-ref, `UnionRef`,
//! `UnionInline`, `UnionUniversal`) is implemented as a match over a small
//! [`Bucket`] classification of `from`'s and `into`'s categories, following
//! the shape the teacher's own `interpreter/executors` dispatch uses: one
//! function per opcode family, one inner match per mode combination, no
//! generic "interpreter" indirection.

use crate::consts::{UNION_UNIVERSAL_PAYLOAD_WORDS, WORD_SIZE};
use crate::error::FatalReason;
use crate::gc::Heap;
use crate::types::{Category, TypeId, TypeRegistry};

use super::bytes_util::{read_u32, read_u64, write_u32, write_u64};
use super::ops::store_width;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Atomic,
    UnionRef,
    UnionInline,
    UnionUniversal,
}

fn bucket_of(desc: &crate::types::TypeDescriptor) -> Bucket {
    match &desc.category {
        Category::UnionRef(_) => Bucket::UnionRef,
        Category::UnionInline(_) => Bucket::UnionInline,
        Category::UnionUniversal(_) => Bucket::UnionUniversal,
        _ => Bucket::Atomic,
    }
}

const UNIVERSAL_BUDGET: usize = WORD_SIZE * UNION_UNIVERSAL_PAYLOAD_WORDS;

/// Coerce a value of type `from` at `src` into a value of type `into`,
/// writing it to `dst` (spec §4.3 "Coerce table"). `dst` must be at least
/// `into`'s slot width; `src` must be at least `from`'s slot width.
pub fn coerce(
    dst: &mut [u8],
    src: &[u8],
    from: TypeId,
    into: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<(), FatalReason> {
    let from_desc = registry.require(from)?;
    let into_desc = registry.require(into)?;
    match (bucket_of(from_desc), bucket_of(into_desc)) {
        (Bucket::Atomic, Bucket::Atomic) => {
            let n = store_width(from, registry)?;
            dst[..n].copy_from_slice(&src[..n]);
        }
        (Bucket::Atomic, Bucket::UnionRef) => {
            // `from` is already ref-compatible (a single heap pointer).
            dst[..WORD_SIZE].copy_from_slice(&src[..WORD_SIZE]);
        }
        (Bucket::Atomic, Bucket::UnionInline) => {
            write_atomic_into_inline(dst, src, from, registry)?;
        }
        (Bucket::Atomic, Bucket::UnionUniversal) => {
            write_atomic_into_universal(dst, src, from, from_desc, heap, registry)?;
        }
        (Bucket::UnionRef, Bucket::Atomic) => {
            dst[..WORD_SIZE].copy_from_slice(&src[..WORD_SIZE]);
        }
        (Bucket::UnionRef, Bucket::UnionRef) => {
            dst[..WORD_SIZE].copy_from_slice(&src[..WORD_SIZE]);
        }
        (Bucket::UnionRef, Bucket::UnionInline) => {
            let addr = crate::gc::HeapAddr::from_bits(read_u64(src, 0));
            let concrete = heap.page(addr.page_index()).owning_type;
            let width = registry.require(concrete)?.slot_width();
            let bytes = heap.bytes_at(addr)[..width].to_vec();
            write_u32(dst, 0, concrete);
            dst[WORD_SIZE..WORD_SIZE + width].copy_from_slice(&bytes);
        }
        (Bucket::UnionRef, Bucket::UnionUniversal) => {
            let addr = crate::gc::HeapAddr::from_bits(read_u64(src, 0));
            let concrete = heap.page(addr.page_index()).owning_type;
            let width = registry.require(concrete)?.slot_width();
            write_u32(dst, 0, concrete);
            if width <= UNIVERSAL_BUDGET {
                let bytes = heap.bytes_at(addr)[..width].to_vec();
                dst[WORD_SIZE..WORD_SIZE + width].copy_from_slice(&bytes);
            } else {
                // Already heap-resident and box-shaped: reuse the pointer
                // rather than allocating a second box.
                write_u64(dst, WORD_SIZE, addr.to_bits());
            }
        }
        (Bucket::UnionInline, Bucket::Atomic) => {
            let width = store_width(into, registry)?;
            dst[..width].copy_from_slice(&src[WORD_SIZE..WORD_SIZE + width]);
        }
        (Bucket::UnionInline, Bucket::UnionRef) => {
            dst[..WORD_SIZE].copy_from_slice(&src[WORD_SIZE..WORD_SIZE + WORD_SIZE]);
        }
        (Bucket::UnionInline, Bucket::UnionInline) => {
            let tag = read_u32(src, 0);
            let width = registry.require(tag)?.slot_width();
            write_u32(dst, 0, tag);
            dst[WORD_SIZE..WORD_SIZE + width].copy_from_slice(&src[WORD_SIZE..WORD_SIZE + width]);
        }
        (Bucket::UnionInline, Bucket::UnionUniversal) => {
            let tag = read_u32(src, 0);
            let member = registry.require(tag)?;
            let width = member.slot_width();
            write_u32(dst, 0, tag);
            if width <= UNIVERSAL_BUDGET {
                dst[WORD_SIZE..WORD_SIZE + width].copy_from_slice(&src[WORD_SIZE..WORD_SIZE + width]);
            } else {
                let envelope = member
                    .boxed_envelope
                    .ok_or_else(|| FatalReason::MissingMember(format!("no boxed envelope for TypeID {tag}")))?;
                let addr = heap.allocate(envelope, registry)?;
                let payload = src[WORD_SIZE..WORD_SIZE + width].to_vec();
                heap.bytes_at_mut(addr)[..width].copy_from_slice(&payload);
                write_u64(dst, WORD_SIZE, addr.to_bits());
            }
        }
        (Bucket::UnionUniversal, Bucket::Atomic) => {
            let tag = read_u32(src, 0);
            let member = registry.require(tag)?;
            let width = store_width(into, registry)?;
            if member.slot_width() <= UNIVERSAL_BUDGET {
                dst[..width].copy_from_slice(&src[WORD_SIZE..WORD_SIZE + width]);
            } else {
                let addr = crate::gc::HeapAddr::from_bits(read_u64(src, WORD_SIZE));
                let bytes = heap.bytes_at(addr)[..width].to_vec();
                dst[..width].copy_from_slice(&bytes);
            }
        }
        (Bucket::UnionUniversal, Bucket::UnionRef) => {
            dst[..WORD_SIZE].copy_from_slice(&src[WORD_SIZE..WORD_SIZE + WORD_SIZE]);
        }
        (Bucket::UnionUniversal, Bucket::UnionInline) => {
            let tag = read_u32(src, 0);
            let member = registry.require(tag)?;
            let width = member.slot_width();
            write_u32(dst, 0, tag);
            if member.slot_width() <= UNIVERSAL_BUDGET {
                dst[WORD_SIZE..WORD_SIZE + width].copy_from_slice(&src[WORD_SIZE..WORD_SIZE + width]);
            } else {
                let addr = crate::gc::HeapAddr::from_bits(read_u64(src, WORD_SIZE));
                let bytes = heap.bytes_at(addr)[..width].to_vec();
                dst[WORD_SIZE..WORD_SIZE + width].copy_from_slice(&bytes);
            }
        }
        (Bucket::UnionUniversal, Bucket::UnionUniversal) => {
            let n = into_desc.slot_width();
            dst[..n].copy_from_slice(&src[..n]);
        }
    }
    Ok(())
}

fn write_atomic_into_inline(dst: &mut [u8], src: &[u8], from: TypeId, registry: &TypeRegistry) -> Result<(), FatalReason> {
    let width = store_width(from, registry)?;
    write_u32(dst, 0, from);
    dst[WORD_SIZE..WORD_SIZE + width].copy_from_slice(&src[..width]);
    Ok(())
}

fn write_atomic_into_universal(
    dst: &mut [u8],
    src: &[u8],
    from: TypeId,
    from_desc: &crate::types::TypeDescriptor,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<(), FatalReason> {
    let width = store_width(from, registry)?;
    if width <= UNIVERSAL_BUDGET {
        write_u32(dst, 0, from);
        dst[WORD_SIZE..WORD_SIZE + width].copy_from_slice(&src[..width]);
        return Ok(());
    }
    let envelope = from_desc
        .boxed_envelope
        .ok_or_else(|| FatalReason::MissingMember(format!("no boxed envelope for TypeID {from}")))?;
    let addr = heap.allocate(envelope, registry)?;
    let payload = src[..width].to_vec();
    heap.bytes_at_mut(addr)[..width].copy_from_slice(&payload);
    write_u32(dst, 0, envelope);
    write_u64(dst, WORD_SIZE, addr.to_bits());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::types::{Category, SizeInfo, TypeDescriptor, UnionLayout};

    fn nat_desc() -> TypeDescriptor {
        TypeDescriptor {
            tid: 4,
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

    fn inline_union_desc(tid: TypeId, budget: u32) -> TypeDescriptor {
        TypeDescriptor {
            tid,
            name: "U".into(),
            category: Category::UnionInline(UnionLayout { subtypes: vec![4] }),
            size_info: SizeInfo {
                heap_size: budget,
                inline_size: budget,
                assign_size: budget,
            },
            heap_mask: Default::default(),
            inline_mask: Default::default(),
            vtable: Vec::new(),
            key_comparable: false,
            boxed_envelope: None,
        }
    }

    fn universal_union_desc(tid: TypeId) -> TypeDescriptor {
        TypeDescriptor {
            tid,
            name: "Uni".into(),
            category: Category::UnionUniversal(UnionLayout { subtypes: vec![4] }),
            size_info: SizeInfo::default(),
            heap_mask: Default::default(),
            inline_mask: Default::default(),
            vtable: Vec::new(),
            key_comparable: false,
            boxed_envelope: None,
        }
    }

    #[test]
    fn atomic_into_inline_writes_tag_and_payload() {
        let reg = TypeRegistry::new([nat_desc(), inline_union_desc(100, 8)]);
        let mut heap = Heap::new(VmConfig::default());
        let src = 7u64.to_le_bytes();
        let mut dst = [0u8; 16];
        coerce(&mut dst, &src, 4, 100, &mut heap, &reg).unwrap();
        assert_eq!(read_u32(&dst, 0), 4);
        assert_eq!(read_u64(&dst, WORD_SIZE), 7);
    }

    #[test]
    fn atomic_into_universal_small_is_inline() {
        let reg = TypeRegistry::new([nat_desc(), universal_union_desc(200)]);
        let mut heap = Heap::new(VmConfig::default());
        let src = 9u64.to_le_bytes();
        let mut dst = [0u8; 40];
        coerce(&mut dst, &src, 4, 200, &mut heap, &reg).unwrap();
        assert_eq!(read_u32(&dst, 0), 4);
        assert_eq!(read_u64(&dst, WORD_SIZE), 9);
    }

    #[test]
    fn inline_union_extract_reads_back_payload() {
        let reg = TypeRegistry::new([nat_desc(), inline_union_desc(100, 8)]);
        let mut heap = Heap::new(VmConfig::default());
        let src = 7u64.to_le_bytes();
        let mut slot = [0u8; 16];
        coerce(&mut slot, &src, 4, 100, &mut heap, &reg).unwrap();
        let mut out = [0u8; 8];
        coerce(&mut out, &slot, 100, 4, &mut heap, &reg).unwrap();
        assert_eq!(u64::from_le_bytes(out), 7);
    }
}
