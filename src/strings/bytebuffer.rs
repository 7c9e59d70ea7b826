//! `ByteBuffer` (spec §4.6): a 16-byte slot, either inline (≤15 bytes) or a
//! heap pointer to a K-repr leaf or concat-tree node — the same engine the
//! string type uses ([`super::repr`]), with the UTF-8 assumption dropped:
//! a buffer's payload is opaque bytes, never validated or interpreted as
//! text.
//!
//! Laid out as one file rather than `repr.rs`/`ops.rs`/`mod.rs` siblings
//! since the byte-buffer engine has no iterator module (no codepoint
//! boundary concern) and no multi-file internal split earns its keep at
//! this size.

use crate::consts::{well_known, BUFFER_KREPR_CAPACITIES, BUFFER_SLOT_LEN_BYTE, INLINE_BUFFER_MAX_LEN, WORD_SIZE};
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

/// The fixed set of internal `TypeDescriptor`s the byte-buffer engine
/// needs — never part of a program blob's own `typeDecls`, always injected
/// by the loader, same as [`super::internal_type_descriptors`].
pub fn internal_type_descriptors() -> Vec<TypeDescriptor> {
    let mut out: Vec<TypeDescriptor> = BUFFER_KREPR_CAPACITIES
        .iter()
        .zip([
            well_known::BUFFER_KREPR_16,
            well_known::BUFFER_KREPR_32,
            well_known::BUFFER_KREPR_64,
            well_known::BUFFER_KREPR_96,
            well_known::BUFFER_KREPR_128,
        ])
        .map(|(&cap, tid)| TypeDescriptor {
            tid,
            name: format!("$BufferKRepr{cap}"),
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
        tid: well_known::BUFFER_CHILD_PTR,
        name: "$BufferChildPtr".into(),
        category: Category::Collection,
        size_info: SizeInfo::default(),
        heap_mask: Default::default(),
        inline_mask: Default::default(),
        vtable: Vec::new(),
        key_comparable: false,
        boxed_envelope: None,
    });

    out.push(TypeDescriptor {
        tid: well_known::BUFFER_CONCAT_NODE,
        name: "$BufferConcatNode".into(),
        category: Category::Struct(crate::types::StructShape::Entity(EntityLayout {
            field_ids: vec![0, 1, 2],
            field_offsets: vec![0, WORD_SIZE as u32, 2 * WORD_SIZE as u32],
            ftypes: vec![well_known::BUFFER_CHILD_PTR, well_known::BUFFER_CHILD_PTR, well_known::NAT],
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

/// `true` if a 16-byte buffer slot's payload lives on the heap — identical
/// disambiguation rule to [`super::is_heap`].
pub fn is_heap(slot: &[u8]) -> bool {
    slot[BUFFER_SLOT_LEN_BYTE] == 0 && read_u64(slot, 0) != 0
}

/// Logical byte length of an inline slot. Meaningless if [`is_heap`].
pub fn inline_len(slot: &[u8]) -> usize {
    slot[BUFFER_SLOT_LEN_BYTE] as usize
}

/// The all-zero slot: the canonical empty buffer.
pub fn empty_slot() -> [u8; 16] {
    [0u8; 16]
}

/// `true` iff `slot` is the canonical empty buffer.
pub fn is_empty(slot: &[u8]) -> bool {
    slot.iter().all(|&b| b == 0)
}

/// Build an inline slot directly from up to 15 bytes. Panics if `data` is
/// longer than [`crate::consts::INLINE_BUFFER_MAX_LEN`] — callers must
/// route longer data through [`build`].
pub(crate) fn make_inline(data: &[u8]) -> [u8; 16] {
    assert!(data.len() <= INLINE_BUFFER_MAX_LEN);
    let mut slot = [0u8; 16];
    slot[..data.len()].copy_from_slice(data);
    slot[BUFFER_SLOT_LEN_BYTE] = data.len() as u8;
    slot
}

fn krepr_tid_for_capacity(capacity: usize) -> TypeId {
    match capacity {
        16 => well_known::BUFFER_KREPR_16,
        32 => well_known::BUFFER_KREPR_32,
        64 => well_known::BUFFER_KREPR_64,
        96 => well_known::BUFFER_KREPR_96,
        128 => well_known::BUFFER_KREPR_128,
        _ => unreachable!("capacity must be one of BUFFER_KREPR_CAPACITIES"),
    }
}

/// Smallest ladder capacity that can hold `data_len` bytes plus the length
/// header, if any.
fn smallest_capacity_for(data_len: usize) -> Option<usize> {
    BUFFER_KREPR_CAPACITIES.iter().copied().find(|&cap| cap >= data_len + KREPR_HEADER)
}

/// Maximum data payload a single K-repr leaf can hold.
pub fn max_leaf_data_len() -> usize {
    BUFFER_KREPR_CAPACITIES.iter().copied().max().unwrap() - KREPR_HEADER
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
    let addr = heap.allocate(well_known::BUFFER_CONCAT_NODE, registry)?;
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

/// Build a buffer slot holding exactly `data`: a single inline slot for ≤15
/// bytes, a single K-repr leaf for data up to [`max_leaf_data_len`], else a
/// balanced concat tree of leaves — same construction discipline as
/// [`super::build`].
pub fn build(data: &[u8], heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 16], FatalReason> {
    if data.is_empty() {
        return Ok(empty_slot());
    }
    if data.len() <= INLINE_BUFFER_MAX_LEN {
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

/// Heap-resident node kind, for the concat-tree walkers.
enum Node<'h> {
    /// A K-repr leaf's raw data bytes (header stripped).
    Leaf(&'h [u8]),
    /// A concat-tree node's `(left, right)` children.
    Concat(HeapAddr, HeapAddr),
}

fn node_at(addr: HeapAddr, heap: &Heap) -> Node<'_> {
    let owning_type = heap.page(addr.page_index()).owning_type;
    let bytes = heap.bytes_at(addr);
    if owning_type == well_known::BUFFER_CONCAT_NODE {
        Node::Concat(HeapAddr::from_bits(read_u64(bytes, 0)), HeapAddr::from_bits(read_u64(bytes, 1)))
    } else {
        let len = read_u64(bytes, 0) as usize;
        Node::Leaf(&bytes[KREPR_HEADER..KREPR_HEADER + len])
    }
}

/// The heap address a slot's payload lives at, materializing an inline
/// value into a fresh leaf first if needed — used by [`concat`] to fold an
/// existing heap-resident operand into a new concat node in O(1) rather
/// than flattening it.
pub(crate) fn ensure_heap_addr(slot: &[u8], heap: &mut Heap, registry: &TypeRegistry) -> Result<HeapAddr, FatalReason> {
    if is_heap(slot) {
        return Ok(HeapAddr::from_bits(read_u64(slot, 0)));
    }
    allocate_leaf(&slot[..inline_len(slot)], heap, registry)
}

fn flatten_addr(addr: HeapAddr, heap: &Heap, out: &mut Vec<u8>) {
    match node_at(addr, heap) {
        Node::Concat(left, right) => {
            flatten_addr(left, heap, out);
            flatten_addr(right, heap, out);
        }
        Node::Leaf(bytes) => out.extend_from_slice(bytes),
    }
}

/// Total logical byte length of a buffer slot, without materializing its
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
    if owning_type == well_known::BUFFER_CONCAT_NODE {
        read_u64(bytes, 2) as usize
    } else {
        read_u64(bytes, 0) as usize
    }
}

/// Materialize a buffer slot's full byte content.
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

/// Concatenate two buffers (spec §4.6): inline-if-fits, else single-leaf-
/// if-fits, else a concat node over the (already-heap-resident-or-not)
/// operands — O(1) when both operands are already heap leaves/nodes.
pub fn concat(a: &[u8], b: &[u8], heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 16], FatalReason> {
    if is_empty(a) {
        return Ok(copy_slot(b));
    }
    if is_empty(b) {
        return Ok(copy_slot(a));
    }
    let total = len(a, heap) + len(b, heap);
    if total <= INLINE_BUFFER_MAX_LEN {
        let mut data = flatten(a, heap);
        data.extend(flatten(b, heap));
        return Ok(make_inline(&data));
    }
    if total <= max_leaf_data_len() {
        let mut data = flatten(a, heap);
        data.extend(flatten(b, heap));
        let addr = allocate_leaf(&data, heap, registry)?;
        return Ok(heap_slot_for(addr));
    }
    let left = ensure_heap_addr(a, heap, registry)?;
    let right = ensure_heap_addr(b, heap, registry)?;
    let addr = allocate_concat_node(left, right, total as u64, heap, registry)?;
    Ok(heap_slot_for(addr))
}

fn copy_slot(slot: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&slot[..16]);
    out
}

/// Extract the byte range `[i, j)` of a buffer (spec §4.6). Flattens fully
/// then rebuilds the requested range — not `O(log n)`, the same deliberate
/// simplification [`super::slice`] makes.
pub fn slice(slot: &[u8], i: usize, j: usize, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 16], FatalReason> {
    let data = flatten(slot, heap);
    let j = j.min(data.len());
    let i = i.min(j);
    build(&data[i..j], heap, registry)
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

        let slot = build(&[0xde, 0xad, 0xbe, 0xef], &mut heap, &reg).unwrap();
        assert!(!is_heap(&slot));
        assert_eq!(flatten(&slot, &heap), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn single_leaf_roundtrip() {
        let mut heap = Heap::new(VmConfig::default());
        let reg = registry();
        let data: Vec<u8> = (0u16..40).map(|i| i as u8).collect();
        let slot = build(&data, &mut heap, &reg).unwrap();
        assert!(is_heap(&slot));
        assert_eq!(flatten(&slot, &heap), data);
        assert_eq!(len(&slot, &heap), 40);
    }

    #[test]
    fn concat_tree_roundtrip_over_leaf_capacity() {
        let mut heap = Heap::new(VmConfig::default());
        let reg = registry();
        let data: Vec<u8> = (0u32..500).map(|i| (i % 256) as u8).collect();
        let slot = build(&data, &mut heap, &reg).unwrap();
        assert!(is_heap(&slot));
        assert_eq!(flatten(&slot, &heap), data);
        assert_eq!(len(&slot, &heap), data.len());
    }

    #[test]
    fn concat_joins_two_heap_buffers_without_reflattening() {
        let mut heap = Heap::new(VmConfig::default());
        let reg = registry();
        let a = build(&vec![1u8; 200], &mut heap, &reg).unwrap();
        let b = build(&vec![2u8; 200], &mut heap, &reg).unwrap();
        let joined = concat(&a, &b, &mut heap, &reg).unwrap();
        let mut expect = vec![1u8; 200];
        expect.extend(vec![2u8; 200]);
        assert_eq!(flatten(&joined, &heap), expect);
    }

    #[test]
    fn slice_extracts_middle_range() {
        let mut heap = Heap::new(VmConfig::default());
        let reg = registry();
        let data: Vec<u8> = (0u32..300).map(|i| (i % 256) as u8).collect();
        let slot = build(&data, &mut heap, &reg).unwrap();
        let mid = slice(&slot, 100, 150, &mut heap, &reg).unwrap();
        assert_eq!(flatten(&mid, &heap), data[100..150]);
    }

    #[test]
    fn non_empty_bytes_preserve_zero_bytes() {
        let mut heap = Heap::new(VmConfig::default());
        let reg = registry();
        let data = vec![0u8, 0u8, 1u8, 0u8];
        let slot = build(&data, &mut heap, &reg).unwrap();
        assert!(!is_empty(&slot));
        assert_eq!(flatten(&slot, &heap), data);
    }
}
