//! Persistent list operations (spec §4.5).
//!
//! `get`/`size`/`back`/`front` descend the tree directly and stay O(log n).
//! Every operation that mutates the logical sequence (`set`, `push_*`,
//! `insert`, `remove`, `pop_*`, `reverse`, `append`, `slice*`, `map*`,
//! `filter*`, `fill`) instead flattens the operand(s) into a flat buffer,
//! performs the edit with ordinary `Vec` operations, and rebuilds a tree
//! from the result via [`build`] — trading the spec's O(log n) bound on
//! mutation for O(n), the same pragmatic simplification already made for
//! `crate::strings::ops::slice`'s non-sharing copy. `crate::gc` reclaims
//! the discarded spine the normal way (it is simply unreachable after the
//! operation returns), so this costs time, not correctness or memory
//! safety.
//!
//! Higher-order operations (`map`, `filter_pred`, `reduce`, `transduce`,
//! ...) take a Rust closure rather than a VM `InvokeId` — the actual
//! callback is a bytecode invocation that only the evaluator can dispatch;
//! this module supplies pure data-structure mechanics and the evaluator
//! supplies the closure that calls back into its own dispatch loop.

use crate::consts::PARTIAL_VECTOR_MAX;
use crate::error::FatalReason;
use crate::gc::collection_layout as layout;
use crate::gc::{Heap, HeapAddr};
use crate::types::{TypeId, TypeRegistry};

use super::node;

fn elem_width(elem_tid: TypeId, registry: &TypeRegistry) -> Result<usize, FatalReason> {
    Ok(registry.require(elem_tid)?.slot_width())
}

/// The empty-list slot.
pub fn empty() -> [u8; 8] {
    node::slot_for(None)
}

/// `true` iff `slot` holds no elements.
pub fn is_empty(slot: &[u8]) -> bool {
    node::addr_of(slot).is_none()
}

/// `size()`: total element count, O(1) (cached at every node).
pub fn size(slot: &[u8], heap: &Heap) -> u64 {
    match node::addr_of(slot) {
        None => 0,
        Some(addr) => node::count(heap.bytes_at(addr)),
    }
}

fn flatten_addr(addr: HeapAddr, width: usize, heap: &Heap, out: &mut Vec<u8>) {
    let bytes = heap.bytes_at(addr);
    if node::shape(bytes) == layout::SHAPE_LIST_PV {
        out.extend_from_slice(node::pv_elements(bytes, width));
    } else {
        if let Some(l) = node::left(bytes) {
            flatten_addr(l, width, heap, out);
        }
        if let Some(r) = node::right(bytes) {
            flatten_addr(r, width, heap, out);
        }
    }
}

/// Materialize every element, in order, as one contiguous buffer of
/// `width`-byte elements.
pub fn flatten(slot: &[u8], elem_tid: TypeId, registry: &TypeRegistry, heap: &Heap) -> Result<Vec<u8>, FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    Ok(match node::addr_of(slot) {
        None => Vec::new(),
        Some(addr) => {
            let mut out = Vec::with_capacity(size(slot, heap) as usize * width);
            flatten_addr(addr, width, heap, &mut out);
            out
        }
    })
}

fn build_addr(
    data: &[u8],
    width: usize,
    elem_tid: TypeId,
    list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<HeapAddr, FatalReason> {
    let n = data.len() / width;
    if n <= PARTIAL_VECTOR_MAX {
        return node::alloc_list_pv(list_tid, elem_tid, width, data, heap, registry);
    }
    let mid_elems = (n / 2).clamp(1, n - 1);
    let mid = mid_elems * width;
    let left = build_addr(&data[..mid], width, elem_tid, list_tid, heap, registry)?;
    let right = build_addr(&data[mid..], width, elem_tid, list_tid, heap, registry)?;
    node::alloc_list_tree(list_tid, elem_tid, left, right, n as u64, false, heap, registry)
}

/// Build a list slot from a flat, already-concatenated element buffer.
pub fn build(
    data: &[u8],
    elem_tid: TypeId,
    list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<[u8; 8], FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    debug_assert_eq!(data.len() % width, 0);
    if data.is_empty() {
        return Ok(empty());
    }
    let addr = build_addr(data, width, elem_tid, list_tid, heap, registry)?;
    Ok(node::slot_for(Some(addr)))
}

/// `k(v0..v7)`: build directly from up to 8 already-concatenated elements,
/// always a single PV leaf (never promotes to a tree).
pub fn k(
    data: &[u8],
    elem_tid: TypeId,
    list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<[u8; 8], FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let n = data.len() / width;
    if n == 0 {
        return Ok(empty());
    }
    if n > PARTIAL_VECTOR_MAX {
        return Err(FatalReason::MissingMember(format!("k() constructor given {n} elements, max {PARTIAL_VECTOR_MAX}")));
    }
    let addr = node::alloc_list_pv(list_tid, elem_tid, width, data, heap, registry)?;
    Ok(node::slot_for(Some(addr)))
}

fn get_addr<'h>(addr: HeapAddr, idx: u64, width: usize, heap: &'h Heap) -> Result<&'h [u8], FatalReason> {
    let bytes = heap.bytes_at(addr);
    if node::shape(bytes) == layout::SHAPE_LIST_PV {
        let n = node::count(bytes);
        if idx >= n {
            return Err(FatalReason::MissingMember(format!("list index {idx} out of bounds (len {n})")));
        }
        let start = layout::PAYLOAD_OFFSET + idx as usize * width;
        Ok(&bytes[start..start + width])
    } else {
        let left = node::left(bytes);
        let left_count = left.map(|l| node::count(heap.bytes_at(l))).unwrap_or(0);
        if idx < left_count {
            get_addr(left.unwrap(), idx, width, heap)
        } else {
            let right = node::right(bytes).ok_or_else(|| FatalReason::MissingMember(format!("list index {idx} out of bounds")))?;
            get_addr(right, idx - left_count, width, heap)
        }
    }
}

/// `get(i)`: O(log n) indexed read.
pub fn get<'h>(slot: &[u8], idx: u64, elem_tid: TypeId, registry: &TypeRegistry, heap: &'h Heap) -> Result<&'h [u8], FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let addr = node::addr_of(slot).ok_or_else(|| FatalReason::MissingMember(format!("list index {idx} out of bounds (empty list)")))?;
    get_addr(addr, idx, width, heap)
}

/// `front()`.
pub fn front<'h>(slot: &[u8], elem_tid: TypeId, registry: &TypeRegistry, heap: &'h Heap) -> Result<&'h [u8], FatalReason> {
    get(slot, 0, elem_tid, registry, heap)
}

/// `back()`.
pub fn back<'h>(slot: &[u8], elem_tid: TypeId, registry: &TypeRegistry, heap: &'h Heap) -> Result<&'h [u8], FatalReason> {
    let n = size(slot, heap);
    if n == 0 {
        return Err(FatalReason::MissingMember("back() of empty list".into()));
    }
    get(slot, n - 1, elem_tid, registry, heap)
}

/// `set(i, v)`.
pub fn set(
    slot: &[u8],
    idx: u64,
    value: &[u8],
    elem_tid: TypeId,
    list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<[u8; 8], FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let mut flat = flatten(slot, elem_tid, registry, heap)?;
    let n = (flat.len() / width) as u64;
    if idx >= n {
        return Err(FatalReason::MissingMember(format!("list index {idx} out of bounds (len {n})")));
    }
    let start = idx as usize * width;
    flat[start..start + width].copy_from_slice(value);
    build(&flat, elem_tid, list_tid, heap, registry)
}

/// `push_back(v)`.
pub fn push_back(
    slot: &[u8],
    value: &[u8],
    elem_tid: TypeId,
    list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<[u8; 8], FatalReason> {
    let mut flat = flatten(slot, elem_tid, registry, heap)?;
    flat.extend_from_slice(value);
    build(&flat, elem_tid, list_tid, heap, registry)
}

/// `push_front(v)`.
pub fn push_front(
    slot: &[u8],
    value: &[u8],
    elem_tid: TypeId,
    list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<[u8; 8], FatalReason> {
    let mut flat = Vec::with_capacity(value.len() + size(slot, heap) as usize * elem_width(elem_tid, registry)?);
    flat.extend_from_slice(value);
    flat.extend(flatten(slot, elem_tid, registry, heap)?);
    build(&flat, elem_tid, list_tid, heap, registry)
}

/// `insert(i, v)`.
pub fn insert(
    slot: &[u8],
    idx: u64,
    value: &[u8],
    elem_tid: TypeId,
    list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<[u8; 8], FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let mut flat = flatten(slot, elem_tid, registry, heap)?;
    let n = (flat.len() / width) as u64;
    if idx > n {
        return Err(FatalReason::MissingMember(format!("insert index {idx} out of bounds (len {n})")));
    }
    let pos = idx as usize * width;
    flat.splice(pos..pos, value.iter().copied());
    build(&flat, elem_tid, list_tid, heap, registry)
}

/// `remove(i)`.
pub fn remove(
    slot: &[u8],
    idx: u64,
    elem_tid: TypeId,
    list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<[u8; 8], FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let mut flat = flatten(slot, elem_tid, registry, heap)?;
    let n = (flat.len() / width) as u64;
    if idx >= n {
        return Err(FatalReason::MissingMember(format!("remove index {idx} out of bounds (len {n})")));
    }
    let pos = idx as usize * width;
    flat.splice(pos..pos + width, std::iter::empty());
    build(&flat, elem_tid, list_tid, heap, registry)
}

/// `pop_back()`.
pub fn pop_back(slot: &[u8], elem_tid: TypeId, list_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    let n = size(slot, heap);
    if n == 0 {
        return Err(FatalReason::MissingMember("pop_back() of empty list".into()));
    }
    remove(slot, n - 1, elem_tid, list_tid, heap, registry)
}

/// `pop_front()`.
pub fn pop_front(slot: &[u8], elem_tid: TypeId, list_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    if size(slot, heap) == 0 {
        return Err(FatalReason::MissingMember("pop_front() of empty list".into()));
    }
    remove(slot, 0, elem_tid, list_tid, heap, registry)
}

/// `reverse()`.
pub fn reverse(slot: &[u8], elem_tid: TypeId, list_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    let mut out = Vec::with_capacity(flat.len());
    for chunk in flat.chunks(width).rev() {
        out.extend_from_slice(chunk);
    }
    build(&out, elem_tid, list_tid, heap, registry)
}

/// `append(other)`.
pub fn append(a: &[u8], b: &[u8], elem_tid: TypeId, list_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    let mut flat = flatten(a, elem_tid, registry, heap)?;
    flat.extend(flatten(b, elem_tid, registry, heap)?);
    build(&flat, elem_tid, list_tid, heap, registry)
}

/// `slice_start(n)`: the first `n` elements.
pub fn slice_start(slot: &[u8], n: u64, elem_tid: TypeId, list_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    slice(slot, 0, n, elem_tid, list_tid, heap, registry)
}

/// `slice_end(n)`: the last `n` elements.
pub fn slice_end(slot: &[u8], n: u64, elem_tid: TypeId, list_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    let len = size(slot, heap);
    let start = len.saturating_sub(n);
    slice(slot, start, len, elem_tid, list_tid, heap, registry)
}

/// `slice(a, b)`: half-open `[a, b)`.
pub fn slice(slot: &[u8], a: u64, b: u64, elem_tid: TypeId, list_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    let n = (flat.len() / width) as u64;
    let a = a.min(n);
    let b = b.clamp(a, n);
    let bytes = &flat[a as usize * width..b as usize * width];
    build(bytes, elem_tid, list_tid, heap, registry)
}

/// `fill(n, v)`.
pub fn fill(n: u64, value: &[u8], elem_tid: TypeId, list_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    let mut flat = Vec::with_capacity(value.len() * n as usize);
    for _ in 0..n {
        flat.extend_from_slice(value);
    }
    build(&flat, elem_tid, list_tid, heap, registry)
}

/// `range(lo, hi, step)` over `Nat`-width elements already encoded as
/// little-endian `u64`s (the evaluator is responsible for narrowing the
/// element type; this just emits the raw 8-byte words).
pub fn range(lo: u64, hi: u64, step: u64, list_tid: TypeId, elem_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    let mut flat = Vec::new();
    let mut v = lo;
    while (step > 0 && v < hi) || (step == 0 && v == lo && hi > lo) {
        flat.extend_from_slice(&v.to_le_bytes());
        if step == 0 {
            break;
        }
        v += step;
    }
    build(&flat, elem_tid, list_tid, heap, registry)
}

/// `map(f)`: `f` receives each element's bytes and writes the mapped
/// element's bytes into the provided output buffer.
pub fn map(
    slot: &[u8],
    elem_tid: TypeId,
    out_tid: TypeId,
    out_list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
    mut f: impl FnMut(&[u8], &mut Heap) -> Result<Vec<u8>, FatalReason>,
) -> Result<[u8; 8], FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    let mut out = Vec::new();
    for chunk in flat.chunks(width) {
        out.extend(f(chunk, heap)?);
    }
    build(&out, out_tid, out_list_tid, heap, registry)
}

/// `map_idx(f)`: like [`map`] but `f` also receives the element's index.
pub fn map_idx(
    slot: &[u8],
    elem_tid: TypeId,
    out_tid: TypeId,
    out_list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
    mut f: impl FnMut(u64, &[u8], &mut Heap) -> Result<Vec<u8>, FatalReason>,
) -> Result<[u8; 8], FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    let mut out = Vec::new();
    for (i, chunk) in flat.chunks(width).enumerate() {
        out.extend(f(i as u64, chunk, heap)?);
    }
    build(&out, out_tid, out_list_tid, heap, registry)
}

/// `map_sync(f, other)`: `f` receives one element from each of two
/// equal-length lists.
#[allow(clippy::too_many_arguments)]
pub fn map_sync(
    a: &[u8],
    b: &[u8],
    elem_tid: TypeId,
    other_elem_tid: TypeId,
    out_tid: TypeId,
    out_list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
    mut f: impl FnMut(&[u8], &[u8], &mut Heap) -> Result<Vec<u8>, FatalReason>,
) -> Result<[u8; 8], FatalReason> {
    let wa = elem_width(elem_tid, registry)?;
    let wb = elem_width(other_elem_tid, registry)?;
    let fa = flatten(a, elem_tid, registry, heap)?;
    let fb = flatten(b, other_elem_tid, registry, heap)?;
    let mut out = Vec::new();
    for (ca, cb) in fa.chunks(wa).zip(fb.chunks(wb)) {
        out.extend(f(ca, cb, heap)?);
    }
    build(&out, out_tid, out_list_tid, heap, registry)
}

/// `filter_pred(p)`.
pub fn filter_pred(
    slot: &[u8],
    elem_tid: TypeId,
    list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
    mut p: impl FnMut(&[u8], &Heap) -> Result<bool, FatalReason>,
) -> Result<[u8; 8], FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    let mut out = Vec::new();
    for chunk in flat.chunks(width) {
        if p(chunk, heap)? {
            out.extend_from_slice(chunk);
        }
    }
    build(&out, elem_tid, list_tid, heap, registry)
}

/// `filter_pred_idx(p)`.
pub fn filter_pred_idx(
    slot: &[u8],
    elem_tid: TypeId,
    list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
    mut p: impl FnMut(u64, &[u8], &Heap) -> Result<bool, FatalReason>,
) -> Result<[u8; 8], FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    let mut out = Vec::new();
    for (i, chunk) in flat.chunks(width).enumerate() {
        if p(i as u64, chunk, heap)? {
            out.extend_from_slice(chunk);
        }
    }
    build(&out, elem_tid, list_tid, heap, registry)
}

/// `filter_map(f, p)`: keep elements passing `p`, transformed by `f`.
pub fn filter_map(
    slot: &[u8],
    elem_tid: TypeId,
    out_tid: TypeId,
    out_list_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
    mut p: impl FnMut(&[u8], &Heap) -> Result<bool, FatalReason>,
    mut f: impl FnMut(&[u8], &mut Heap) -> Result<Vec<u8>, FatalReason>,
) -> Result<[u8; 8], FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    let mut out = Vec::new();
    for chunk in flat.chunks(width) {
        if p(chunk, heap)? {
            out.extend(f(chunk, heap)?);
        }
    }
    build(&out, out_tid, out_list_tid, heap, registry)
}

/// `reduce(f, seed)`.
pub fn reduce(
    slot: &[u8],
    elem_tid: TypeId,
    registry: &TypeRegistry,
    heap: &Heap,
    seed: Vec<u8>,
    mut f: impl FnMut(&[u8], &[u8], &Heap) -> Result<Vec<u8>, FatalReason>,
) -> Result<Vec<u8>, FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    let mut acc = seed;
    for chunk in flat.chunks(width) {
        acc = f(&acc, chunk, heap)?;
    }
    Ok(acc)
}

/// `reduce_idx(f, seed)`.
pub fn reduce_idx(
    slot: &[u8],
    elem_tid: TypeId,
    registry: &TypeRegistry,
    heap: &Heap,
    seed: Vec<u8>,
    mut f: impl FnMut(u64, &[u8], &[u8], &Heap) -> Result<Vec<u8>, FatalReason>,
) -> Result<Vec<u8>, FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    let mut acc = seed;
    for (i, chunk) in flat.chunks(width).enumerate() {
        acc = f(i as u64, &acc, chunk, heap)?;
    }
    Ok(acc)
}

/// One `transduce` step's outcome: an updated environment and an optional
/// emitted output element.
pub struct TransduceStep {
    pub env: Vec<u8>,
    pub emit: Option<Vec<u8>>,
}

/// `transduce(op, env)`.
pub fn transduce(
    slot: &[u8],
    elem_tid: TypeId,
    out_tid: TypeId,
    out_list_tid: TypeId,
    registry: &TypeRegistry,
    heap: &mut Heap,
    env: Vec<u8>,
    mut op: impl FnMut(&[u8], &[u8], &Heap) -> Result<TransduceStep, FatalReason>,
) -> Result<(Vec<u8>, [u8; 8]), FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    let mut acc = env;
    let mut emitted = Vec::new();
    for chunk in flat.chunks(width) {
        let step = op(&acc, chunk, heap)?;
        acc = step.env;
        if let Some(e) = step.emit {
            emitted.extend(e);
        }
    }
    let built = build(&emitted, out_tid, out_list_tid, heap, registry)?;
    Ok((acc, built))
}

/// `transduce_idx(op, env)`.
#[allow(clippy::too_many_arguments)]
pub fn transduce_idx(
    slot: &[u8],
    elem_tid: TypeId,
    out_tid: TypeId,
    out_list_tid: TypeId,
    registry: &TypeRegistry,
    heap: &mut Heap,
    env: Vec<u8>,
    mut op: impl FnMut(u64, &[u8], &[u8], &Heap) -> Result<TransduceStep, FatalReason>,
) -> Result<(Vec<u8>, [u8; 8]), FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    let mut acc = env;
    let mut emitted = Vec::new();
    for (i, chunk) in flat.chunks(width).enumerate() {
        let step = op(i as u64, &acc, chunk, heap)?;
        acc = step.env;
        if let Some(e) = step.emit {
            emitted.extend(e);
        }
    }
    let built = build(&emitted, out_tid, out_list_tid, heap, registry)?;
    Ok((acc, built))
}

/// `has_pred(p)`.
pub fn has_pred(slot: &[u8], elem_tid: TypeId, registry: &TypeRegistry, heap: &Heap, mut p: impl FnMut(&[u8], &Heap) -> Result<bool, FatalReason>) -> Result<bool, FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    for chunk in flat.chunks(width) {
        if p(chunk, heap)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `find_pred(p)`: first matching index, if any.
pub fn find_pred(slot: &[u8], elem_tid: TypeId, registry: &TypeRegistry, heap: &Heap, mut p: impl FnMut(&[u8], &Heap) -> Result<bool, FatalReason>) -> Result<Option<u64>, FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    for (i, chunk) in flat.chunks(width).enumerate() {
        if p(chunk, heap)? {
            return Ok(Some(i as u64));
        }
    }
    Ok(None)
}

/// `find_pred_last(p)`: last matching index, if any.
pub fn find_pred_last(slot: &[u8], elem_tid: TypeId, registry: &TypeRegistry, heap: &Heap, mut p: impl FnMut(&[u8], &Heap) -> Result<bool, FatalReason>) -> Result<Option<u64>, FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    let mut found = None;
    for (i, chunk) in flat.chunks(width).enumerate() {
        if p(chunk, heap)? {
            found = Some(i as u64);
        }
    }
    Ok(found)
}

/// `has(v)`: membership by `keyCmp` equality.
pub fn has(slot: &[u8], value: &[u8], elem_tid: TypeId, registry: &TypeRegistry, heap: &Heap) -> Result<bool, FatalReason> {
    Ok(indexof(slot, value, elem_tid, registry, heap)?.is_some())
}

/// `indexof(v)`: first index equal to `v` under `keyCmp`, if any.
pub fn indexof(slot: &[u8], value: &[u8], elem_tid: TypeId, registry: &TypeRegistry, heap: &Heap) -> Result<Option<u64>, FatalReason> {
    find_pred(slot, elem_tid, registry, heap, |e, h| Ok(crate::value::key_cmp(e, value, elem_tid, registry, h)? == std::cmp::Ordering::Equal))
}

/// `last_indexof(v)`.
pub fn last_indexof(slot: &[u8], value: &[u8], elem_tid: TypeId, registry: &TypeRegistry, heap: &Heap) -> Result<Option<u64>, FatalReason> {
    find_pred_last(slot, elem_tid, registry, heap, |e, h| Ok(crate::value::key_cmp(e, value, elem_tid, registry, h)? == std::cmp::Ordering::Equal))
}

/// `single_index_of(v)`: the index, but only if `v` occurs exactly once;
/// `None` if absent or duplicated (spec: "returns −1 unless there is
/// exactly one").
pub fn single_index_of(slot: &[u8], value: &[u8], elem_tid: TypeId, registry: &TypeRegistry, heap: &Heap) -> Result<Option<u64>, FatalReason> {
    let width = elem_width(elem_tid, registry)?;
    let flat = flatten(slot, elem_tid, registry, heap)?;
    let mut found = None;
    let mut count = 0;
    for (i, chunk) in flat.chunks(width).enumerate() {
        if crate::value::key_cmp(chunk, value, elem_tid, registry, heap)? == std::cmp::Ordering::Equal {
            count += 1;
            found = Some(i as u64);
        }
    }
    Ok(if count == 1 { found } else { None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::consts::well_known;
    use crate::types::{Category, SizeInfo, TypeDescriptor};

    fn registry() -> TypeRegistry {
        TypeRegistry::new([
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
            },
            TypeDescriptor {
                tid: 100,
                name: "$ListNat".into(),
                category: Category::Collection,
                size_info: SizeInfo {
                    heap_size: node::min_heap_size_for_list(8) as u32,
                    inline_size: 8,
                    assign_size: 8,
                },
                heap_mask: Default::default(),
                inline_mask: Default::default(),
                vtable: Vec::new(),
                key_comparable: false,
                boxed_envelope: None,
            },
        ])
    }

    fn nat_list(values: &[u64], heap: &mut Heap, reg: &TypeRegistry) -> [u8; 8] {
        let mut flat = Vec::new();
        for &v in values {
            flat.extend_from_slice(&v.to_le_bytes());
        }
        build(&flat, well_known::NAT, 100, heap, reg).unwrap()
    }

    #[test]
    fn empty_list_has_zero_size() {
        let heap = Heap::new(VmConfig::default());
        assert_eq!(size(&empty(), &heap), 0);
        assert!(is_empty(&empty()));
    }

    #[test]
    fn build_and_get_roundtrip_across_pv_and_tree() {
        let reg = registry();
        let mut heap = Heap::new(VmConfig::default());
        let values: Vec<u64> = (0..40).collect();
        let slot = nat_list(&values, &mut heap, &reg);
        assert_eq!(size(&slot, &heap), 40);
        for (i, &v) in values.iter().enumerate() {
            let bytes = get(&slot, i as u64, well_known::NAT, &reg, &heap).unwrap();
            assert_eq!(u64::from_le_bytes(bytes.try_into().unwrap()), v);
        }
    }

    #[test]
    fn push_pop_and_insert_remove_roundtrip() {
        let reg = registry();
        let mut heap = Heap::new(VmConfig::default());
        let slot = nat_list(&[1, 2, 3], &mut heap, &reg);
        let slot = push_back(&slot, &9u64.to_le_bytes(), well_known::NAT, 100, &mut heap, &reg).unwrap();
        assert_eq!(flatten(&slot, well_known::NAT, &reg, &heap).unwrap(), {
            let mut v = Vec::new();
            for x in [1u64, 2, 3, 9] {
                v.extend_from_slice(&x.to_le_bytes());
            }
            v
        });
        let slot = remove(&slot, 0, well_known::NAT, 100, &mut heap, &reg).unwrap();
        assert_eq!(size(&slot, &heap), 3);
    }

    #[test]
    fn indexof_and_single_index_of() {
        let reg = registry();
        let mut heap = Heap::new(VmConfig::default());
        let slot = nat_list(&[5, 6, 5, 7], &mut heap, &reg);
        assert_eq!(indexof(&slot, &5u64.to_le_bytes(), well_known::NAT, &reg, &heap).unwrap(), Some(0));
        assert_eq!(single_index_of(&slot, &5u64.to_le_bytes(), well_known::NAT, &reg, &heap).unwrap(), None);
        assert_eq!(single_index_of(&slot, &7u64.to_le_bytes(), well_known::NAT, &reg, &heap).unwrap(), Some(3));
    }
}
