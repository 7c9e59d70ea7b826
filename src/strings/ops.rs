//! String operations built on top of [`super::repr`] (spec §4.6
//! "Operations").

use crate::consts::INLINE_STRING_MAX_LEN;
use crate::error::FatalReason;
use crate::gc::Heap;
use crate::types::TypeRegistry;

use super::repr;

fn copy_slot(slot: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(slot);
    out
}

/// `concat(a, b)`: an inline string if the sum fits, else a single K-repr
/// leaf if the sum still fits one, else a concat-tree node over the two
/// operands' existing heap representations (materializing either operand
/// into a fresh leaf first if it was inline) — so concatenating two
/// already-heap-resident strings is O(1), not a full flatten/rebuild.
pub fn concat(a: &[u8], b: &[u8], heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 16], FatalReason> {
    if repr::is_empty(a) {
        return Ok(copy_slot(b));
    }
    if repr::is_empty(b) {
        return Ok(copy_slot(a));
    }
    let total = repr::len(a, heap) + repr::len(b, heap);
    if total <= INLINE_STRING_MAX_LEN {
        let mut buf = repr::flatten(a, heap);
        buf.extend(repr::flatten(b, heap));
        return Ok(repr::make_inline(&buf));
    }
    if total <= repr::max_leaf_data_len() {
        let mut buf = repr::flatten(a, heap);
        buf.extend(repr::flatten(b, heap));
        let addr = repr::allocate_leaf(&buf, heap, registry)?;
        return Ok(repr::heap_slot_for(addr));
    }
    let left = repr::ensure_heap_addr(a, heap, registry)?;
    let right = repr::ensure_heap_addr(b, heap, registry)?;
    let node = repr::allocate_concat_node(left, right, total as u64, heap, registry)?;
    Ok(repr::heap_slot_for(node))
}

/// `slice(a, i, j)`: the smallest repr covering byte range `[i, j)`.
///
/// Implemented by materializing the full string and handing the requested
/// range to [`super::repr::build`]; unlike the persistent-list slice
/// operations this is not a sub-structural-sharing tree walk, since the
/// spec does not hold string `slice` to the same O(log n) requirement it
/// states explicitly for list operations.
pub fn slice(a: &[u8], i: usize, j: usize, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 16], FatalReason> {
    let full = repr::flatten(a, heap);
    let i = i.min(full.len());
    let j = j.clamp(i, full.len());
    repr::build(&full[i..j], heap, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;

    fn registry() -> TypeRegistry {
        TypeRegistry::new(repr::internal_type_descriptors())
    }

    #[test]
    fn concat_small_strings_stays_inline() {
        let mut heap = Heap::new(VmConfig::default());
        let reg = registry();
        let a = repr::build(b"foo", &mut heap, &reg).unwrap();
        let b = repr::build(b"bar", &mut heap, &reg).unwrap();
        let c = concat(&a, &b, &mut heap, &reg).unwrap();
        assert!(!repr::is_heap(&c));
        assert_eq!(repr::flatten(&c, &heap), b"foobar");
    }

    #[test]
    fn concat_two_heap_strings_builds_concat_node() {
        let mut heap = Heap::new(VmConfig::default());
        let reg = registry();
        let a = repr::build(&vec![b'a'; 60], &mut heap, &reg).unwrap();
        let b = repr::build(&vec![b'b'; 60], &mut heap, &reg).unwrap();
        let c = concat(&a, &b, &mut heap, &reg).unwrap();
        assert!(repr::is_heap(&c));
        let mut expected = vec![b'a'; 60];
        expected.extend(vec![b'b'; 60]);
        assert_eq!(repr::flatten(&c, &heap), expected);
        assert_eq!(repr::len(&c, &heap), 120);
    }

    #[test]
    fn slice_extracts_middle_range() {
        let mut heap = Heap::new(VmConfig::default());
        let reg = registry();
        let s = repr::build(b"hello world", &mut heap, &reg).unwrap();
        let sub = slice(&s, 6, 11, &mut heap, &reg).unwrap();
        assert_eq!(repr::flatten(&sub, &heap), b"world");
    }
}
