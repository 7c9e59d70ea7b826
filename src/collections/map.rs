//! Persistent map operations (spec §4.5): an ordered tree, always `Tree`
//! shape (the spec defines no partial-vector variant for maps), keyed by
//! [`crate::value::key_cmp`].
//!
//! As with `crate::collections::list`, every mutating operation (`add`,
//! `set`, `remove`, `submap`, `remap`, `union_fast`) flattens the map to its
//! ascending-by-key entry sequence, edits that sequence with ordinary `Vec`
//! operations, and rebuilds a tree by recursive middle-split — balanced by
//! construction, so lookups stay O(log n), at the cost of an O(n) rebuild
//! per mutation rather than the spec's O(log n) update. `get`/`find`/`has`/
//! `min_key`/`max_key` descend the existing tree directly and are O(log n).

use std::cmp::Ordering;

use crate::error::FatalReason;
use crate::gc::{Heap, HeapAddr};
use crate::types::{TypeId, TypeRegistry};
use crate::value::key_cmp;

use super::node;

fn widths(key_tid: TypeId, val_tid: TypeId, registry: &TypeRegistry) -> Result<(usize, usize), FatalReason> {
    Ok((registry.require(key_tid)?.slot_width(), registry.require(val_tid)?.slot_width()))
}

/// The empty-map slot.
pub fn empty() -> [u8; 8] {
    node::slot_for(None)
}

/// `count()`: O(1).
pub fn count(slot: &[u8], heap: &Heap) -> u64 {
    match node::addr_of(slot) {
        None => 0,
        Some(addr) => node::count(heap.bytes_at(addr)),
    }
}

fn find_addr<'h>(addr: HeapAddr, key: &[u8], key_tid: TypeId, registry: &TypeRegistry, heap: &'h Heap) -> Result<Option<HeapAddr>, FatalReason> {
    let bytes = heap.bytes_at(addr);
    let kw = registry.require(node::key_tid(bytes))?.slot_width();
    let node_key = node::map_key(bytes, kw);
    match key_cmp(key, node_key, key_tid, registry, heap)? {
        Ordering::Equal => Ok(Some(addr)),
        Ordering::Less => match node::left(bytes) {
            Some(l) => find_addr(l, key, key_tid, registry, heap),
            None => Ok(None),
        },
        Ordering::Greater => match node::right(bytes) {
            Some(r) => find_addr(r, key, key_tid, registry, heap),
            None => Ok(None),
        },
    }
}

/// `find(k)`: the value bytes plus a present flag.
pub fn find<'h>(slot: &[u8], key: &[u8], key_tid: TypeId, val_tid: TypeId, registry: &TypeRegistry, heap: &'h Heap) -> Result<Option<&'h [u8]>, FatalReason> {
    let (kw, vw) = widths(key_tid, val_tid, registry)?;
    let Some(root) = node::addr_of(slot) else { return Ok(None) };
    match find_addr(root, key, key_tid, registry, heap)? {
        None => Ok(None),
        Some(addr) => Ok(Some(node::map_value(heap.bytes_at(addr), kw, vw))),
    }
}

/// `has(k)`.
pub fn has(slot: &[u8], key: &[u8], key_tid: TypeId, val_tid: TypeId, registry: &TypeRegistry, heap: &Heap) -> Result<bool, FatalReason> {
    Ok(find(slot, key, key_tid, val_tid, registry, heap)?.is_some())
}

/// `get(k)`: asserts present (spec §4.5).
pub fn get<'h>(slot: &[u8], key: &[u8], key_tid: TypeId, val_tid: TypeId, registry: &TypeRegistry, heap: &'h Heap) -> Result<&'h [u8], FatalReason> {
    find(slot, key, key_tid, val_tid, registry, heap)?.ok_or_else(|| FatalReason::MissingMember("get(): key not present".into()))
}

fn entries_addr(addr: HeapAddr, kw: usize, vw: usize, heap: &Heap, out: &mut Vec<u8>) {
    let bytes = heap.bytes_at(addr);
    if let Some(l) = node::left(bytes) {
        entries_addr(l, kw, vw, heap, out);
    }
    out.extend_from_slice(node::map_key(bytes, kw));
    out.extend_from_slice(node::map_value(bytes, kw, vw));
    if let Some(r) = node::right(bytes) {
        entries_addr(r, kw, vw, heap, out);
    }
}

/// `entries()`: ascending `(key, value)` pairs as one flat buffer of
/// `key_width + val_width`-byte records.
pub fn entries(slot: &[u8], key_tid: TypeId, val_tid: TypeId, registry: &TypeRegistry, heap: &Heap) -> Result<Vec<u8>, FatalReason> {
    let (kw, vw) = widths(key_tid, val_tid, registry)?;
    let mut out = Vec::new();
    if let Some(addr) = node::addr_of(slot) {
        entries_addr(addr, kw, vw, heap, &mut out);
    }
    Ok(out)
}

fn build_from_sorted(
    flat: &[u8],
    kw: usize,
    vw: usize,
    key_tid: TypeId,
    val_tid: TypeId,
    map_tid: TypeId,
    heap: &mut Heap,
    registry: &TypeRegistry,
) -> Result<Option<HeapAddr>, FatalReason> {
    let rec = kw + vw;
    let n = flat.len() / rec;
    if n == 0 {
        return Ok(None);
    }
    let mid = n / 2;
    let left = build_from_sorted(&flat[..mid * rec], kw, vw, key_tid, val_tid, map_tid, heap, registry)?;
    let right = build_from_sorted(&flat[(mid + 1) * rec..], kw, vw, key_tid, val_tid, map_tid, heap, registry)?;
    let rec_bytes = &flat[mid * rec..(mid + 1) * rec];
    let addr = node::alloc_map_node(
        map_tid,
        key_tid,
        val_tid,
        &rec_bytes[..kw],
        &rec_bytes[kw..],
        left,
        right,
        n as u64,
        false,
        heap,
        registry,
    )?;
    Ok(Some(addr))
}

/// Build a map slot from an already key-sorted, deduplicated flat entry
/// buffer (as returned by [`entries`]).
pub fn build_sorted(flat: &[u8], key_tid: TypeId, val_tid: TypeId, map_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    let (kw, vw) = widths(key_tid, val_tid, registry)?;
    let addr = build_from_sorted(flat, kw, vw, key_tid, val_tid, map_tid, heap, registry)?;
    Ok(node::slot_for(addr))
}

fn insert_sorted(flat: &mut Vec<u8>, kw: usize, vw: usize, key: &[u8], value: &[u8], key_tid: TypeId, registry: &TypeRegistry, heap: &Heap, allow_replace: bool) -> Result<bool, FatalReason> {
    let rec = kw + vw;
    let n = flat.len() / rec;
    let mut lo = 0usize;
    let mut hi = n;
    while lo < hi {
        let mid = (lo + hi) / 2;
        let mid_key = &flat[mid * rec..mid * rec + kw];
        match key_cmp(key, mid_key, key_tid, registry, heap)? {
            Ordering::Equal => {
                if !allow_replace {
                    return Ok(false);
                }
                flat[mid * rec + kw..(mid + 1) * rec].copy_from_slice(value);
                return Ok(true);
            }
            Ordering::Less => hi = mid,
            Ordering::Greater => lo = mid + 1,
        }
    }
    let pos = lo * rec;
    let mut record = Vec::with_capacity(rec);
    record.extend_from_slice(key);
    record.extend_from_slice(value);
    flat.splice(pos..pos, record);
    Ok(true)
}

/// `add(k, v)`: `k` must be absent.
#[allow(clippy::too_many_arguments)]
pub fn add(slot: &[u8], key: &[u8], value: &[u8], key_tid: TypeId, val_tid: TypeId, map_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    let (kw, vw) = widths(key_tid, val_tid, registry)?;
    let mut flat = entries(slot, key_tid, val_tid, registry, heap)?;
    if !insert_sorted(&mut flat, kw, vw, key, value, key_tid, registry, heap, false)? {
        return Err(FatalReason::MissingMember("add(): key already present".into()));
    }
    build_sorted(&flat, key_tid, val_tid, map_tid, heap, registry)
}

/// `set(k, v)`: may replace.
#[allow(clippy::too_many_arguments)]
pub fn set(slot: &[u8], key: &[u8], value: &[u8], key_tid: TypeId, val_tid: TypeId, map_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    let (kw, vw) = widths(key_tid, val_tid, registry)?;
    let mut flat = entries(slot, key_tid, val_tid, registry, heap)?;
    insert_sorted(&mut flat, kw, vw, key, value, key_tid, registry, heap, true)?;
    build_sorted(&flat, key_tid, val_tid, map_tid, heap, registry)
}

/// `remove(k)`.
pub fn remove(slot: &[u8], key: &[u8], key_tid: TypeId, val_tid: TypeId, map_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    let (kw, vw) = widths(key_tid, val_tid, registry)?;
    let rec = kw + vw;
    let flat = entries(slot, key_tid, val_tid, registry, heap)?;
    let n = flat.len() / rec;
    let mut out = Vec::with_capacity(flat.len());
    for i in 0..n {
        let rec_bytes = &flat[i * rec..(i + 1) * rec];
        if key_cmp(&rec_bytes[..kw], key, key_tid, registry, heap)? != Ordering::Equal {
            out.extend_from_slice(rec_bytes);
        }
    }
    build_sorted(&out, key_tid, val_tid, map_tid, heap, registry)
}

/// `min_key()`.
pub fn min_key<'h>(slot: &[u8], key_tid: TypeId, registry: &TypeRegistry, heap: &'h Heap) -> Result<Option<&'h [u8]>, FatalReason> {
    let Some(mut addr) = node::addr_of(slot) else { return Ok(None) };
    loop {
        let bytes = heap.bytes_at(addr);
        match node::left(bytes) {
            Some(l) => addr = l,
            None => {
                let kw = registry.require(key_tid)?.slot_width();
                return Ok(Some(node::map_key(heap.bytes_at(addr), kw)));
            }
        }
    }
}

/// `max_key()`.
pub fn max_key<'h>(slot: &[u8], key_tid: TypeId, registry: &TypeRegistry, heap: &'h Heap) -> Result<Option<&'h [u8]>, FatalReason> {
    let Some(mut addr) = node::addr_of(slot) else { return Ok(None) };
    loop {
        let bytes = heap.bytes_at(addr);
        match node::right(bytes) {
            Some(r) => addr = r,
            None => {
                let kw = registry.require(key_tid)?.slot_width();
                return Ok(Some(node::map_key(heap.bytes_at(addr), kw)));
            }
        }
    }
}

/// `submap(p)`: entries whose key satisfies `p`.
pub fn submap(slot: &[u8], key_tid: TypeId, val_tid: TypeId, map_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry, mut p: impl FnMut(&[u8], &Heap) -> Result<bool, FatalReason>) -> Result<[u8; 8], FatalReason> {
    let (kw, vw) = widths(key_tid, val_tid, registry)?;
    let rec = kw + vw;
    let flat = entries(slot, key_tid, val_tid, registry, heap)?;
    let mut out = Vec::new();
    for chunk in flat.chunks(rec) {
        if p(&chunk[..kw], heap)? {
            out.extend_from_slice(chunk);
        }
    }
    build_sorted(&out, key_tid, val_tid, map_tid, heap, registry)
}

/// `remap(f)`: transform every value, keys unchanged (so ordering is
/// preserved without re-sorting).
pub fn remap(slot: &[u8], key_tid: TypeId, val_tid: TypeId, out_val_tid: TypeId, map_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry, mut f: impl FnMut(&[u8], &[u8], &mut Heap) -> Result<Vec<u8>, FatalReason>) -> Result<[u8; 8], FatalReason> {
    let (kw, vw) = widths(key_tid, val_tid, registry)?;
    let rec = kw + vw;
    let flat = entries(slot, key_tid, val_tid, registry, heap)?;
    let out_vw = registry.require(out_val_tid)?.slot_width();
    let mut out = Vec::with_capacity((flat.len() / rec) * (kw + out_vw));
    for chunk in flat.chunks(rec) {
        out.extend_from_slice(&chunk[..kw]);
        out.extend(f(&chunk[..kw], &chunk[kw..], heap)?);
    }
    build_sorted(&out, key_tid, out_val_tid, map_tid, heap, registry)
}

/// `union_fast(other)`: keys must be disjoint (checked with `debug_assert!`,
/// per the caller-provided invariant spec §4.5 names — see `DESIGN.md`).
pub fn union_fast(a: &[u8], b: &[u8], key_tid: TypeId, val_tid: TypeId, map_tid: TypeId, heap: &mut Heap, registry: &TypeRegistry) -> Result<[u8; 8], FatalReason> {
    let (kw, vw) = widths(key_tid, val_tid, registry)?;
    let rec = kw + vw;
    let ea = entries(a, key_tid, val_tid, registry, heap)?;
    let eb = entries(b, key_tid, val_tid, registry, heap)?;
    let mut merged = Vec::with_capacity(ea.len() + eb.len());
    let (mut i, mut j) = (0, 0);
    let na = ea.len() / rec;
    let nb = eb.len() / rec;
    while i < na && j < nb {
        let ka = &ea[i * rec..i * rec + kw];
        let kb = &eb[j * rec..j * rec + kw];
        match key_cmp(ka, kb, key_tid, registry, heap)? {
            Ordering::Equal => {
                debug_assert!(false, "union_fast: keys must be disjoint");
                merged.extend_from_slice(&ea[i * rec..(i + 1) * rec]);
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                merged.extend_from_slice(&ea[i * rec..(i + 1) * rec]);
                i += 1;
            }
            Ordering::Greater => {
                merged.extend_from_slice(&eb[j * rec..(j + 1) * rec]);
                j += 1;
            }
        }
    }
    merged.extend_from_slice(&ea[i * rec..]);
    merged.extend_from_slice(&eb[j * rec..]);
    build_sorted(&merged, key_tid, val_tid, map_tid, heap, registry)
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
                size_info: SizeInfo { heap_size: 8, inline_size: 8, assign_size: 8 },
                heap_mask: Default::default(),
                inline_mask: Default::default(),
                vtable: Vec::new(),
                key_comparable: true,
                boxed_envelope: None,
            },
            TypeDescriptor {
                tid: 200,
                name: "$MapNatNat".into(),
                category: Category::Collection,
                size_info: SizeInfo {
                    heap_size: node::min_heap_size_for_map(8, 8) as u32,
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

    #[test]
    fn add_get_remove_roundtrip() {
        let reg = registry();
        let mut heap = Heap::new(VmConfig::default());
        let mut slot = empty();
        for k in [5u64, 1, 9, 3] {
            slot = add(&slot, &k.to_le_bytes(), &(k * 10).to_le_bytes(), well_known::NAT, well_known::NAT, 200, &mut heap, &reg).unwrap();
        }
        assert_eq!(count(&slot, &heap), 4);
        assert_eq!(get(&slot, &9u64.to_le_bytes(), well_known::NAT, well_known::NAT, &reg, &heap).unwrap(), &90u64.to_le_bytes());
        assert_eq!(min_key(&slot, well_known::NAT, &reg, &heap).unwrap(), Some(&1u64.to_le_bytes()[..]));
        assert_eq!(max_key(&slot, well_known::NAT, &reg, &heap).unwrap(), Some(&9u64.to_le_bytes()[..]));

        let slot = remove(&slot, &1u64.to_le_bytes(), well_known::NAT, well_known::NAT, 200, &mut heap, &reg).unwrap();
        assert_eq!(count(&slot, &heap), 3);
        assert!(!has(&slot, &1u64.to_le_bytes(), well_known::NAT, well_known::NAT, &reg, &heap).unwrap());
    }

    #[test]
    fn add_duplicate_key_errors() {
        let reg = registry();
        let mut heap = Heap::new(VmConfig::default());
        let slot = add(&empty(), &1u64.to_le_bytes(), &1u64.to_le_bytes(), well_known::NAT, well_known::NAT, 200, &mut heap, &reg).unwrap();
        assert!(add(&slot, &1u64.to_le_bytes(), &2u64.to_le_bytes(), well_known::NAT, well_known::NAT, 200, &mut heap, &reg).is_err());
    }

    #[test]
    fn entries_are_ascending_by_key() {
        let reg = registry();
        let mut heap = Heap::new(VmConfig::default());
        let mut slot = empty();
        for k in [5u64, 1, 9, 3] {
            slot = add(&slot, &k.to_le_bytes(), &k.to_le_bytes(), well_known::NAT, well_known::NAT, 200, &mut heap, &reg).unwrap();
        }
        let flat = entries(&slot, well_known::NAT, well_known::NAT, &reg, &heap).unwrap();
        let keys: Vec<u64> = flat.chunks(16).map(|c| u64::from_le_bytes(c[..8].try_into().unwrap())).collect();
        assert_eq!(keys, vec![1, 3, 5, 9]);
    }
}
