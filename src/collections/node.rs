//! Low-level node construction/reading shared by [`super::list`] and
//! [`super::map`].
//!
//! The byte layout itself — and the reason every node self-describes its
//! element/key/value `TypeID`(s) in its own header rather than relying on
//! the registry — is documented on `crate::gc::collection_layout`, which
//! both this module and the tracer build on. A collection's own slot (the
//! `Category::Collection` pointer a local/field holds) is `None` when it is
//! the all-zero null pointer: the same "null means absent" convention
//! already used for `Ref`/`UnionRef` elsewhere (spec §3), reused here for
//! the empty list/map rather than inventing a new sentinel.

use crate::error::FatalReason;
use crate::gc::collection_layout as layout;
use crate::gc::{Heap, HeapAddr};
use crate::types::{TypeId, TypeRegistry};

/// `None` if the slot is the empty-collection null pointer.
pub(crate) fn addr_of(slot: &[u8]) -> Option<HeapAddr> {
    let bits = u64::from_le_bytes(slot[..8].try_into().unwrap());
    (bits != 0).then(|| HeapAddr::from_bits(bits))
}

pub(crate) fn slot_for(addr: Option<HeapAddr>) -> [u8; 8] {
    match addr {
        Some(a) => a.to_bits().to_le_bytes(),
        None => [0u8; 8],
    }
}

fn alloc(tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<HeapAddr, FatalReason> {
    heap.allocate(tid, registry)
}

/// Allocate a fresh list PV leaf holding `elems` (each `elem_width` bytes,
/// already concatenated), at most [`crate::consts::PARTIAL_VECTOR_MAX`].
pub(crate) fn alloc_list_pv(
    list_tid: TypeId,
    elem_tid: TypeId,
    elem_width: usize,
    elems: &[u8],
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<HeapAddr, FatalReason> {
    debug_assert_eq!(elems.len() % elem_width, 0);
    let n = elems.len() / elem_width;
    debug_assert!(n <= crate::consts::PARTIAL_VECTOR_MAX);
    let addr = alloc(list_tid, heap, registry)?;
    let bytes = heap.bytes_at_mut(addr);
    layout::set_shape(bytes, layout::SHAPE_LIST_PV);
    layout::set_primary_tid(bytes, elem_tid);
    layout::set_count(bytes, n as u64);
    bytes[layout::PAYLOAD_OFFSET..layout::PAYLOAD_OFFSET + elems.len()].copy_from_slice(elems);
    Ok(addr)
}

/// Allocate a fresh list tree fork over `left`/`right`.
pub(crate) fn alloc_list_tree(
    list_tid: TypeId,
    elem_tid: TypeId,
    left: HeapAddr,
    right: HeapAddr,
    total_count: u64,
    red: bool,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<HeapAddr, FatalReason> {
    let addr = alloc(list_tid, heap, registry)?;
    let bytes = heap.bytes_at_mut(addr);
    layout::set_shape(bytes, layout::SHAPE_LIST_TREE);
    layout::set_color(bytes, red as u8);
    layout::set_primary_tid(bytes, elem_tid);
    layout::set_count(bytes, total_count);
    layout::set_left_bits(bytes, left.to_bits());
    layout::set_right_bits(bytes, right.to_bits());
    Ok(addr)
}

/// Allocate a fresh map tree fork holding one key/value pair plus
/// `left`/`right` subtrees.
#[allow(clippy::too_many_arguments)]
pub(crate) fn alloc_map_node(
    map_tid: TypeId,
    key_tid: TypeId,
    val_tid: TypeId,
    key: &[u8],
    value: &[u8],
    left: Option<HeapAddr>,
    right: Option<HeapAddr>,
    total_count: u64,
    red: bool,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<HeapAddr, FatalReason> {
    let addr = alloc(map_tid, heap, registry)?;
    let bytes = heap.bytes_at_mut(addr);
    layout::set_shape(bytes, layout::SHAPE_MAP_TREE);
    layout::set_color(bytes, red as u8);
    layout::set_primary_tid(bytes, key_tid);
    layout::set_secondary_tid(bytes, val_tid);
    layout::set_count(bytes, total_count);
    layout::set_left_bits(bytes, left.map(HeapAddr::to_bits).unwrap_or(0));
    layout::set_right_bits(bytes, right.map(HeapAddr::to_bits).unwrap_or(0));
    let key_off = layout::MAP_KEY_OFFSET;
    bytes[key_off..key_off + key.len()].copy_from_slice(key);
    bytes[key_off + key.len()..key_off + key.len() + value.len()].copy_from_slice(value);
    Ok(addr)
}

pub(crate) fn shape(bytes: &[u8]) -> u8 {
    layout::shape(bytes)
}

pub(crate) fn is_red(bytes: &[u8]) -> bool {
    layout::color(bytes) != 0
}

pub(crate) fn count(bytes: &[u8]) -> u64 {
    layout::count(bytes)
}

pub(crate) fn elem_tid(bytes: &[u8]) -> TypeId {
    layout::primary_tid(bytes)
}

pub(crate) fn key_tid(bytes: &[u8]) -> TypeId {
    layout::primary_tid(bytes)
}

pub(crate) fn val_tid(bytes: &[u8]) -> TypeId {
    layout::secondary_tid(bytes)
}

pub(crate) fn left(bytes: &[u8]) -> Option<HeapAddr> {
    (layout::left_bits(bytes) != 0).then(|| HeapAddr::from_bits(layout::left_bits(bytes)))
}

pub(crate) fn right(bytes: &[u8]) -> Option<HeapAddr> {
    (layout::right_bits(bytes) != 0).then(|| HeapAddr::from_bits(layout::right_bits(bytes)))
}

pub(crate) fn pv_elements<'h>(bytes: &'h [u8], elem_width: usize) -> &'h [u8] {
    let n = layout::count(bytes) as usize;
    &bytes[layout::PAYLOAD_OFFSET..layout::PAYLOAD_OFFSET + n * elem_width]
}

pub(crate) fn map_key<'h>(bytes: &'h [u8], key_width: usize) -> &'h [u8] {
    &bytes[layout::MAP_KEY_OFFSET..layout::MAP_KEY_OFFSET + key_width]
}

pub(crate) fn map_value<'h>(bytes: &'h [u8], key_width: usize, val_width: usize) -> &'h [u8] {
    let start = layout::MAP_KEY_OFFSET + key_width;
    &bytes[start..start + val_width]
}

/// The `heap_size` a `TypeDecl` for this list must declare so every shape
/// (PV leaf or tree fork) fits one fixed-size block.
pub fn min_heap_size_for_list(elem_width: usize) -> usize {
    layout::min_heap_size_for_list(elem_width)
}

/// The `heap_size` a `TypeDecl` for this map must declare.
pub fn min_heap_size_for_map(key_width: usize, val_width: usize) -> usize {
    layout::min_heap_size_for_map(key_width, val_width)
}
