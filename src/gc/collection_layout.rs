//! Byte layout of a persistent-collection heap node (spec §4.5), shared by
//! [`super::trace`] (which must recognize and trace into one) and
//! `crate::collections` (which builds and reads them).
//!
//! Spec §3's `TypeDescriptor` carries no element/key/value `TypeID` for a
//! `Collection`-category type — a `List<T>`/`Map<K,V>` is declared with
//! exactly one opaque `TypeID`, the same "one pointer, concrete type
//! recovered from the payload's page" discipline as `Ref`/`UnionRef` (spec
//! §3 invariants). That leaves GC tracing with no registry-held way to
//! learn a node's element type, since every node of a given collection
//! shares that one `TypeID` as its page's `owning_type`. We resolve this by
//! having every node self-describe its element/key/value type(s) in its own
//! header, never relying on the registry for it — the header word layout
//! below is this engine's own business, never part of the wire format,
//! exactly as the string engine's concat-node layout is.
//!
//! A `Collection`-typed *slot* (a local, a struct field) is 8 bytes: one
//! heap pointer, traced by [`super::trace::trace_value`] the same as
//! `Ref`/`UnionRef`. A `Collection`-typed *node* (the heap object that
//! pointer refers to) is wider and self-describing via this layout — the
//! two are disambiguated purely by length, since a slot is always exactly
//! [`crate::consts::WORD_SIZE`] bytes and a node never is (its minimum
//! heap_size is 40 bytes, see [`min_heap_size_for`]).

use crate::consts::WORD_SIZE;
use crate::types::TypeId;

/// A list leaf: `[count:u64][elements...]` inline, ≤
/// [`crate::consts::PARTIAL_VECTOR_MAX`] elements.
pub(crate) const SHAPE_LIST_PV: u8 = 0;
/// A list tree fork: owns two `List` subtrees.
pub(crate) const SHAPE_LIST_TREE: u8 = 1;
/// A map tree fork: owns one key/value pair plus two `Map` subtrees.
pub(crate) const SHAPE_MAP_TREE: u8 = 2;

const SHAPE_OFFSET: usize = 0;
const COLOR_OFFSET: usize = 1;
const PRIMARY_TID_OFFSET: usize = 2;
const COUNT_OFFSET: usize = WORD_SIZE;
const SECONDARY_TID_OFFSET: usize = 2 * WORD_SIZE;
/// Where shape-specific payload (children pointers, elements, key/value)
/// begins in every node, regardless of shape.
pub(crate) const PAYLOAD_OFFSET: usize = 3 * WORD_SIZE;
/// Byte offset of a map tree fork's key, relative to the node start
/// (after the two child pointers).
pub(crate) const MAP_KEY_OFFSET: usize = PAYLOAD_OFFSET + 2 * WORD_SIZE;

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + WORD_SIZE].try_into().unwrap())
}

pub(crate) fn write_u64(bytes: &mut [u8], offset: usize, value: u64) {
    bytes[offset..offset + WORD_SIZE].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn shape(bytes: &[u8]) -> u8 {
    bytes[SHAPE_OFFSET]
}

pub(crate) fn set_shape(bytes: &mut [u8], value: u8) {
    bytes[SHAPE_OFFSET] = value;
}

pub(crate) fn color(bytes: &[u8]) -> u8 {
    bytes[COLOR_OFFSET]
}

pub(crate) fn set_color(bytes: &mut [u8], value: u8) {
    bytes[COLOR_OFFSET] = value;
}

/// List: element `TypeID`. Map: key `TypeID`.
pub(crate) fn primary_tid(bytes: &[u8]) -> TypeId {
    read_u32(bytes, PRIMARY_TID_OFFSET)
}

pub(crate) fn set_primary_tid(bytes: &mut [u8], tid: TypeId) {
    write_u32(bytes, PRIMARY_TID_OFFSET, tid);
}

/// Map only: value `TypeID`. Meaningless for list nodes.
pub(crate) fn secondary_tid(bytes: &[u8]) -> TypeId {
    read_u32(bytes, SECONDARY_TID_OFFSET)
}

pub(crate) fn set_secondary_tid(bytes: &mut [u8], tid: TypeId) {
    write_u32(bytes, SECONDARY_TID_OFFSET, tid);
}

pub(crate) fn count(bytes: &[u8]) -> u64 {
    read_u64(bytes, COUNT_OFFSET)
}

pub(crate) fn set_count(bytes: &mut [u8], value: u64) {
    write_u64(bytes, COUNT_OFFSET, value);
}

pub(crate) fn left_bits(bytes: &[u8]) -> u64 {
    read_u64(bytes, PAYLOAD_OFFSET)
}

pub(crate) fn set_left_bits(bytes: &mut [u8], value: u64) {
    write_u64(bytes, PAYLOAD_OFFSET, value);
}

pub(crate) fn right_bits(bytes: &[u8]) -> u64 {
    read_u64(bytes, PAYLOAD_OFFSET + WORD_SIZE)
}

pub(crate) fn set_right_bits(bytes: &mut [u8], value: u64) {
    write_u64(bytes, PAYLOAD_OFFSET + WORD_SIZE, value);
}

/// Smallest `heap_size` a node of this shape can be allocated at, given its
/// element (list) or key+value (map) widths — the convention a program's
/// `TypeDecl` for a `Collection` type must honor so both the PV-leaf and
/// tree-fork shapes of the same collection fit one fixed-size block.
pub(crate) fn min_heap_size_for_list(elem_width: usize) -> usize {
    (PAYLOAD_OFFSET + crate::consts::PARTIAL_VECTOR_MAX * elem_width).max(PAYLOAD_OFFSET + 2 * WORD_SIZE)
}

pub(crate) fn min_heap_size_for_map(key_width: usize, val_width: usize) -> usize {
    MAP_KEY_OFFSET + key_width + val_width
}
