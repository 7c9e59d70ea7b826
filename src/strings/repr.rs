//! String representation (spec §4.6): the 16-byte slot, heap-allocated
//! K-repr leaf buffers, and concat-tree nodes.
//!
//! The wire format only specifies the slot's inline/heap disambiguation and
//! the K-repr capacity ladder; the *internal* heap layout of a K-repr buffer
//! and a concat node is this engine's own business, never serialized. Every
//! K-repr buffer carries its own little-endian `u64` length prefix so a
//! directly-referenced single leaf (no concat-tree parent tracking a size)
//! is still self-describing; this takes 8 bytes out of each capacity, so
//! the usable data capacity of the largest (128-byte) leaf is 120 bytes, not
//! 128 — strings longer than that are represented as a concat tree even
//! though they would nominally still fit under the ladder's top capacity.
//! Concat-tree children are declared with [`crate::consts::well_known::STRING_CHILD_PTR`],
//! a `Category::Collection` placeholder type that means exactly "one owned
//! pointer, concrete type recovered from the pointee's page" — precisely
//! the discipline a concat child (leaf or another node) needs, without
//! inventing a new `Category` variant.

use crate::consts::{well_known, KREPR_CAPACITIES, STRING_SLOT_LEN_BYTE, WORD_SIZE};
use crate::error::FatalReason;
use crate::gc::{Heap, HeapAddr};
use crate::types::{Category, EntityLayout, SizeInfo, TypeDescriptor, TypeId, TypeRegistry};

/// Bytes of header every K-repr leaf spends on its own length.
const KREPR_HEADER: usize = WORD_SIZE;

fn read_u64(bytes: &[u8], word_index: usize) -> u64 {
    let start = word_index * WORD_SIZE;
    u64::from_le_bytes(bytes[start..start + WORD_SIZE].try_into().unwrap())
}

fn write_u64(bytes: &mut [u8], word_index: usize, value: u64) {
    let start = word_index * WORD_SIZE;
    bytes[start..start + WORD_SIZE].copy_from_slice(&value.to_le_bytes());
}

/// The fixed set of internal `TypeDescriptor`s the string engine needs —
/// never part of a program blob's own `typeDecls`, always injected by the
/// loader (spec §6's wire schema says nothing about them; they are purely
/// this engine's heap layout).
pub fn internal_type_descriptors() -> Vec<TypeDescriptor> {
    let mut out: Vec<TypeDescriptor> = KREPR_CAPACITIES
        .iter()
        .zip([
            well_known::KREPR_16,
            well_known::KREPR_32,
            well_known::KREPR_64,
            well_known::KREPR_96,
            well_known::KREPR_128,
        ])
        .map(|(&cap, tid)| TypeDescriptor {
            tid,
            name: format!("$KRepr{cap}"),
            category: Category::BigNum,
            size_info: SizeInfo {
                heap_size: cap as u32,
                inline_size: cap as u32,
                assign_size: cap as u32,
            },
            heap_mask: Default::default(),
            inline_mask: Default::default(),
            vtable: Vec::new(),
            key_comparable: false,
            boxed_envelope: None,
        })
        .collect();

    out.push(TypeDescriptor {
        tid: well_known::STRING_CHILD_PTR,
        name: "$StringChildPtr".into(),
        category: Category::Collection,
        size_info: SizeInfo::default(),
        heap_mask: Default::default(),
        inline_mask: Default::default(),
        vtable: Vec::new(),
        key_comparable: false,
        boxed_envelope: None,
    });

    out.push(TypeDescriptor {
        tid: well_known::STRING_CONCAT_NODE,
        name: "$StringConcatNode".into(),
        category: Category::Struct(crate::types::StructShape::Entity(EntityLayout {
            field_ids: vec![0, 1, 2],
            field_offsets: vec![0, WORD_SIZE as u32, 2 * WORD_SIZE as u32],
            ftypes: vec![
                well_known::STRING_CHILD_PTR,
                well_known::STRING_CHILD_PTR,
                well_known::NAT,
            ],
        })),
        size_info: SizeInfo {
            heap_size: 3 * WORD_SIZE as u32,
            inline_size: 3 * WORD_SIZE as u32,
            assign_size: 3 * WORD_SIZE as u32,
        },
        heap_mask: Default::default(),
        inline_mask: Default::default(),
        vtable: Vec::new(),
        key_comparable: false,
        boxed_envelope: None,
    });

    out
}

/// `true` if a 16-byte string slot's payload lives on the heap (spec §4.6:
/// "If the 16th byte is nonzero OR the first pointer word is null with
/// length zero, the slot holds an inline string... Otherwise the first word
/// points to...").
pub fn is_heap(slot: &[u8]) -> bool {
    slot[STRING_SLOT_LEN_BYTE] == 0 && read_u64(slot, 0) != 0
}

/// Logical byte length of an inline slot. Meaningless if [`is_heap`].
pub fn inline_len(slot: &[u8]) -> usize {
    slot[STRING_SLOT_LEN_BYTE] as usize
}

/// The all-zero slot: the canonical empty string (spec §4.6 `empty(s)`).
pub fn empty_slot() -> [u8; 16] {
    [0u8; 16]
}

/// `true` iff `slot` is the canonical empty string.
pub fn is_empty(slot: &[u8]) -> bool {
    slot.iter().all(|&b| b == 0)
}

/// Build an inline slot directly from up to 15 bytes. Panics if `data` is
/// longer than [`crate::consts::INLINE_STRING_MAX_LEN`] — callers must
/// route longer data through [`build`].
pub(crate) fn make_inline(data: &[u8]) -> [u8; 16] {
    assert!(data.len() <= crate::consts::INLINE_STRING_MAX_LEN);
    let mut slot = [0u8; 16];
    slot[..data.len()].copy_from_slice(data);
    slot[STRING_SLOT_LEN_BYTE] = data.len() as u8;
    slot
}

fn krepr_tid_for_capacity(capacity: usize) -> TypeId {
    match capacity {
        16 => well_known::KREPR_16,
        32 => well_known::KREPR_32,
        64 => well_known::KREPR_64,
        96 => well_known::KREPR_96,
        128 => well_known::KREPR_128,
        _ => unreachable!("capacity must be one of KREPR_CAPACITIES"),
    }
}

/// Smallest ladder capacity that can hold `data_len` bytes plus the length
/// header, if any.
fn smallest_capacity_for(data_len: usize) -> Option<usize> {
    KREPR_CAPACITIES
        .iter()
        .copied()
        .find(|&cap| cap >= data_len + KREPR_HEADER)
}

/// Maximum data payload a single K-repr leaf can hold.
pub fn max_leaf_data_len() -> usize {
    KREPR_CAPACITIES.iter().copied().max().unwrap() - KREPR_HEADER
}

pub(crate) fn allocate_leaf(data: &[u8], heap: &mut Heap, registry: &TypeRegistry) -> Result<HeapAddr, FatalReason> {
    let capacity = smallest_capacity_for(data.len()).expect("caller ensures data fits a leaf");
    let tid = krepr_tid_for_capacity(capacity);
    let addr = heap.allocate(tid, registry)?;
    let bytes = heap.bytes_at_mut(addr);
    write_u64(bytes, 0, data.len() as u64);
    bytes[KREPR_HEADER..KREPR_HEADER + data.len()].copy_from_slice(data);
    Ok(addr)
}

pub(crate) fn allocate_concat_node(
    left: HeapAddr,
    right: HeapAddr,
    size: u64,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<HeapAddr, FatalReason> {
    let addr = heap.allocate(well_known::STRING_CONCAT_NODE, registry)?;
    let bytes = heap.bytes_at_mut(addr);
    write_u64(bytes, 0, left.to_bits());
    write_u64(bytes, 1, right.to_bits());
    write_u64(bytes, 2, size);
    Ok(addr)
}

pub(crate) fn heap_slot_for(addr: HeapAddr) -> [u8; 16] {
    let mut slot = [0u8; 16];
    slot[..WORD_SIZE].copy_from_slice(&addr.to_bits().to_le_bytes());
    slot
}

/// Build a string slot holding exactly `data` (spec §4.6 construction): a
/// single inline slot for ≤15 bytes, a single K-repr leaf for data up to
/// [`max_leaf_data_len`], else a balanced concat tree of leaves.
pub fn build(data: &[u8], heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 16], FatalReason> {
    if data.is_empty() {
        return Ok(empty_slot());
    }
    if data.len() <= crate::consts::INLINE_STRING_MAX_LEN {
        return Ok(make_inline(data));
    }
    let addr = build_addr(data, heap, registry)?;
    Ok(heap_slot_for(addr))
}

fn build_addr(data: &[u8], heap: &mut Heap, registry: &TypeRegistry) -> Result<HeapAddr, FatalReason> {
    let max_leaf = max_leaf_data_len();
    if data.len() <= max_leaf {
        return allocate_leaf(data, heap, registry);
    }
    let mid = (data.len() / 2).clamp(1, data.len() - 1);
    let left = build_addr(&data[..mid], heap, registry)?;
    let right = build_addr(&data[mid..], heap, registry)?;
    allocate_concat_node(left, right, data.len() as u64, heap, registry)
}

/// Heap-resident node kind, for the concat-tree walkers (used directly by
/// string-builtin ops and by the lazy byte iterators).
pub(crate) enum Node<'h> {
    /// A K-repr leaf's raw data bytes (header stripped).
    Leaf(&'h [u8]),
    /// A concat-tree node's `(left, right)` children.
    Concat(HeapAddr, HeapAddr),
}

pub(crate) fn node_at(addr: HeapAddr, heap: &Heap) -> Node<'_> {
    let owning_type = heap.page(addr.page_index()).owning_type;
    let bytes = heap.bytes_at(addr);
    if owning_type == well_known::STRING_CONCAT_NODE {
        Node::Concat(
            HeapAddr::from_bits(read_u64(bytes, 0)),
            HeapAddr::from_bits(read_u64(bytes, 1)),
        )
    } else {
        let len = read_u64(bytes, 0) as usize;
        Node::Leaf(&bytes[KREPR_HEADER..KREPR_HEADER + len])
    }
}

/// The heap address a slot's payload lives at, materializing an inline
/// value into a fresh leaf first if needed — used by [`super::ops::concat`]
/// to fold an existing heap-resident operand into a new concat node in
/// O(1) rather than flattening it.
pub(crate) fn ensure_heap_addr(
    slot: &[u8],
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<HeapAddr, FatalReason> {
    if is_heap(slot) {
        return Ok(HeapAddr::from_bits(read_u64(slot, 0)));
    }
    allocate_leaf(&slot[..inline_len(slot)], heap, registry)
}

fn flatten_addr(addr: HeapAddr, heap: &Heap, out: &mut Vec<u8>) {
    let owning_type = heap.page(addr.page_index()).owning_type;
    let bytes = heap.bytes_at(addr);
    if owning_type == well_known::STRING_CONCAT_NODE {
        let left = HeapAddr::from_bits(read_u64(bytes, 0));
        let right = HeapAddr::from_bits(read_u64(bytes, 1));
        flatten_addr(left, heap, out);
        flatten_addr(right, heap, out);
    } else {
        let len = read_u64(bytes, 0) as usize;
        out.extend_from_slice(&bytes[KREPR_HEADER..KREPR_HEADER + len]);
    }
}

/// Total logical byte length of a string slot, without materializing its
/// content.
pub fn len(slot: &[u8], heap: &Heap) -> usize {
    if is_empty(slot) {
        return 0;
    }
    if !is_heap(slot) {
        return inline_len(slot);
    }
    let addr = HeapAddr::from_bits(read_u64(slot, 0));
    let owning_type = heap.page(addr.page_index()).owning_type;
    let bytes = heap.bytes_at(addr);
    if owning_type == well_known::STRING_CONCAT_NODE {
        read_u64(bytes, 2) as usize
    } else {
        read_u64(bytes, 0) as usize
    }
}

/// Materialize a string slot's full byte content.
pub fn flatten(slot: &[u8], heap: &Heap) -> Vec<u8> {
    if is_empty(slot) {
        return Vec::new();
    }
    if !is_heap(slot) {
        return slot[..inline_len(slot)].to_vec();
    }
    let addr = HeapAddr::from_bits(read_u64(slot, 0));
    let mut out = Vec::with_capacity(len(slot, heap));
    flatten_addr(addr, heap, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;

    fn registry() -> TypeRegistry {
        TypeRegistry::new(internal_type_descriptors())
    }

    #[test]
    fn empty_and_inline_roundtrip() {
        let mut heap = Heap::new(VmConfig::default());
        let reg = registry();
        let slot = build(b"", &mut heap, &reg).unwrap();
        assert!(is_empty(&slot));
        assert_eq!(flatten(&slot, &heap), Vec::<u8>::new());

        let slot = build(b"hello", &mut heap, &reg).unwrap();
        assert!(!is_heap(&slot));
        assert_eq!(flatten(&slot, &heap), b"hello");
    }

    #[test]
    fn single_leaf_roundtrip() {
        let mut heap = Heap::new(VmConfig::default());
        let reg = registry();
        let data = vec![b'x'; 40];
        let slot = build(&data, &mut heap, &reg).unwrap();
        assert!(is_heap(&slot));
        assert_eq!(flatten(&slot, &heap), data);
        assert_eq!(len(&slot, &heap), 40);
    }

    #[test]
    fn concat_tree_roundtrip() {
        let mut heap = Heap::new(VmConfig::default());
        let reg = registry();
        let data: Vec<u8> = (0u32..500).map(|i| (i % 251) as u8).collect();
        let slot = build(&data, &mut heap, &reg).unwrap();
        assert!(is_heap(&slot));
        assert_eq!(flatten(&slot, &heap), data);
        assert_eq!(len(&slot, &heap), data.len());
    }
}
