//! `store`/`clear` (spec §4.3): the per-category byte-copy width a plain
//! assignment or zeroing of a storage slot uses.

use crate::error::FatalReason;
use crate::types::{Category, TypeId, TypeRegistry};

/// Number of bytes a value of `tid` occupies when copied by assignment —
/// `assignSize` for structs (may differ from `inlineSize`/`heapSize` for a
/// struct whose declared fields don't use every byte of its heap layout),
/// one pointer word for ref-like categories, 16 for `String`, and the full
/// slot width for unions (spec §4.3 `store`).
pub fn store_width(tid: TypeId, registry: &TypeRegistry) -> Result<usize, FatalReason> {
    let desc = registry.require(tid)?;
    Ok(match &desc.category {
        Category::Empty => 0,
        Category::Register | Category::BigNum => desc.size_info.inline_size as usize,
        Category::Struct(_) => desc.size_info.assign_size as usize,
        Category::BoxedStruct(_) => crate::consts::WORD_SIZE,
        Category::Ref(_) | Category::Collection | Category::UnionRef(_) => crate::consts::WORD_SIZE,
        Category::String | Category::ByteBuffer => 16,
        Category::UnionInline(_) | Category::UnionUniversal(_) => desc.slot_width(),
    })
}

/// Copy a value of `tid` from `src` into `dst` (spec §4.3 `store`). Both
/// slices must be at least [`store_width`] bytes; only that many are read
/// or written.
pub fn store(dst: &mut [u8], src: &[u8], tid: TypeId, registry: &TypeRegistry) -> Result<(), FatalReason> {
    let n = store_width(tid, registry)?;
    dst[..n].copy_from_slice(&src[..n]);
    Ok(())
}

/// Zero a value's storage slot (spec §4.3 `clear`). Zeros the *full* slot
/// width, not just the assign width, so a cleared struct slot's padding
/// (if any) and a cleared union's header both read as "absent".
pub fn clear(dst: &mut [u8], tid: TypeId, registry: &TypeRegistry) -> Result<(), FatalReason> {
    let desc = registry.require(tid)?;
    let n = desc.slot_width();
    for b in &mut dst[..n] {
        *b = 0;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SizeInfo, TypeDescriptor};

    fn reg(tid: TypeId, cat: Category, size: u32) -> TypeRegistry {
        TypeRegistry::new([TypeDescriptor {
            tid,
            name: "T".into(),
            category: cat,
            size_info: SizeInfo {
                heap_size: size,
                inline_size: size,
                assign_size: size,
            },
            heap_mask: Default::default(),
            inline_mask: Default::default(),
            vtable: Vec::new(),
            key_comparable: true,
            boxed_envelope: None,
        }])
    }

    #[test]
    fn store_copies_register_width() {
        let r = reg(1, Category::Register, 8);
        let src = 42u64.to_le_bytes();
        let mut dst = [0u8; 8];
        store(&mut dst, &src, 1, &r).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn clear_zeroes_full_slot() {
        let r = reg(1, Category::Register, 8);
        let mut dst = [0xFFu8; 8];
        clear(&mut dst, 1, &r).unwrap();
        assert_eq!(dst, [0u8; 8]);
    }

    #[test]
    fn collection_store_width_is_one_word() {
        let r = reg(1, Category::Collection, 0);
        assert_eq!(store_width(1, &r).unwrap(), 8);
    }
}
