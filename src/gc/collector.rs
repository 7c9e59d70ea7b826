//! Young-generation evacuation and old-generation decrement-queue draining
//! (spec §4.2).
//!
//! Persistent values form a DAG (structural sharing, never cycles — spec
//! §4.5's lists/maps are purely functional), which is what makes the
//! old generation's back-pointer/count split workable at all: an object
//! reachable from exactly one parent can be reclaimed the moment that
//! parent is, with no cycle-collection pass required.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::types::TypeRegistry;

use super::heap::Heap;
use super::metadata::{MetaWord, RcKind};
use super::page::HeapAddr;
use super::roots::RootSet;
use super::trace::trace_value;

/// Summary of one young-generation collection cycle.
///
/// `forwarded` is exposed (rather than kept internal to [`collect_young`])
/// so a caller holding its own copies of root addresses outside the
/// [`RootSet`] it passed in — the evaluator's frame locals, notably — can
/// rewrite those copies too; `collect_young` only ever updates the
/// `RootSet` itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YoungCollectionStats {
    pub objects_evacuated: u32,
    pub bytes_copied: u64,
    pub forwarded: HashMap<HeapAddr, HeapAddr>,
}

/// Summary of one decrement-queue drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecrementDrainStats {
    pub objects_freed: u32,
    pub decrements_applied: u32,
}

/// A FIFO (processed as a stack; order does not affect correctness on a
/// DAG) of old-generation addresses awaiting a decrement, per spec §4.2
/// "Queue drain".
#[derive(Debug, Clone, Default)]
pub struct DecrementQueue {
    pending: Vec<HeapAddr>,
}

impl DecrementQueue {
    pub fn new() -> Self {
        DecrementQueue { pending: Vec::new() }
    }

    /// Queue a decrement against `addr`.
    pub fn enqueue(&mut self, addr: HeapAddr) {
        if addr.to_bits() != 0 {
            self.pending.push(addr);
        }
    }

    /// True once every queued decrement has been applied.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn young(heap: &Heap, addr: HeapAddr) -> bool {
    heap.page(addr.page_index()).young
}

/// Evacuate every young object reachable from `roots` into the old
/// generation, rewriting `roots` in place to the new addresses.
///
/// Objects reachable from more than one edge (either multiple roots, or
/// more than one already-evacuated parent) are given `RcKind::Count`
/// accounting; single-parent objects get `RcKind::BackPointer` pointing at
/// their one owner's new address, per spec §4.2 "Parent accounting".
#[tracing::instrument(level = "trace", skip(heap, registry, roots))]
pub fn collect_young(heap: &mut Heap, registry: &TypeRegistry, roots: &mut RootSet) -> YoungCollectionStats {
    let in_degree = compute_in_degree(heap, registry, roots);
    let mut forwarded: HashMap<HeapAddr, HeapAddr> = HashMap::new();
    let mut stats = YoungCollectionStats::default();

    let root_addrs: Vec<HeapAddr> = roots.iter().collect();
    for root in root_addrs {
        if young(heap, root) {
            evacuate(root, heap, registry, &in_degree, &mut forwarded, None, &mut stats);
        }
    }

    roots.remap(&forwarded);

    let stale_types: Vec<_> = heap.young_pages().map(|(tid, _)| tid).collect();
    for tid in stale_types {
        heap.retire_young_page(tid);
    }

    stats.forwarded = forwarded;
    debug!(evacuated = stats.objects_evacuated, bytes_copied = stats.bytes_copied, "young collection complete");
    stats
}

fn compute_in_degree(heap: &Heap, registry: &TypeRegistry, roots: &RootSet) -> HashMap<HeapAddr, u32> {
    let mut in_degree = HashMap::new();
    let mut visited = HashSet::new();
    for root in roots.iter() {
        if young(heap, root) {
            *in_degree.entry(root).or_insert(0) += 1;
            visit_for_in_degree(root, heap, registry, &mut visited, &mut in_degree);
        }
    }
    in_degree
}

fn visit_for_in_degree(
    addr: HeapAddr,
    heap: &Heap,
    registry: &TypeRegistry,
    visited: &mut HashSet<HeapAddr>,
    in_degree: &mut HashMap<HeapAddr, u32>,
) {
    if !visited.insert(addr) {
        return;
    }
    heap.verify_debug_canary(addr);
    let tid = heap.page(addr.page_index()).owning_type;
    let bytes = heap.bytes_at(addr);
    for child in trace_value(bytes, tid, registry) {
        if young(heap, child) {
            *in_degree.entry(child).or_insert(0) += 1;
            visit_for_in_degree(child, heap, registry, visited, in_degree);
        }
    }
}

fn evacuate(
    addr: HeapAddr,
    heap: &mut Heap,
    registry: &TypeRegistry,
    in_degree: &HashMap<HeapAddr, u32>,
    forwarded: &mut HashMap<HeapAddr, HeapAddr>,
    parent_new_addr: Option<HeapAddr>,
    stats: &mut YoungCollectionStats,
) -> HeapAddr {
    if let Some(&new) = forwarded.get(&addr) {
        return new;
    }
    heap.verify_debug_canary(addr);
    trace!(addr = addr.to_bits(), "evacuating young object");

    let tid = heap.page(addr.page_index()).owning_type;
    let original_bytes = heap.bytes_at(addr).to_vec();

    // Reserve the destination first, with the original (pre-rewrite) bytes,
    // so children can be handed this object's *new* address as their
    // parent before any of them have themselves been evacuated.
    let new_addr = heap.promote(tid, &original_bytes);

    let degree = in_degree.get(&addr).copied().unwrap_or(1);
    let rc_word = if degree > 1 {
        MetaWord::with_count(degree as u64)
    } else {
        match parent_new_addr {
            Some(parent) => MetaWord::back_pointer(parent.to_bits()),
            None => MetaWord::with_count(1),
        }
    };
    heap.set_meta_at(new_addr, rc_word);
    heap.set_meta_at(addr, MetaWord::forwarding(new_addr.to_bits()));
    forwarded.insert(addr, new_addr);
    stats.objects_evacuated += 1;
    stats.bytes_copied += original_bytes.len() as u64;

    let children = trace_value(&original_bytes, tid, registry);
    if !children.is_empty() {
        let mut patched = heap.bytes_at(new_addr).to_vec();
        for child in children {
            if !young(heap, child) {
                continue;
            }
            let child_new = evacuate(child, heap, registry, in_degree, forwarded, Some(new_addr), stats);
            rewrite_pointer(&mut patched, child.to_bits(), child_new.to_bits());
        }
        heap.bytes_at_mut(new_addr).copy_from_slice(&patched);
    }

    new_addr
}

/// Replace every occurrence of `old_bits` with `new_bits` among the
/// word-aligned `u64` slots of a byte buffer. Scanning only 8-byte-aligned
/// positions (rather than every byte offset) is required, not just an
/// optimization: pointer fields are always word-aligned, and a sub-word
/// scan could misfire on an unrelated sibling field whose value happens to
/// coincide with `old_bits` (e.g. a small `Nat`/`Int` equal to a low-page
/// `HeapAddr`'s bits).
fn rewrite_pointer(bytes: &mut [u8], old_bits: u64, new_bits: u64) {
    if old_bits == 0 {
        return;
    }
    let old_le = old_bits.to_le_bytes();
    let new_le = new_bits.to_le_bytes();
    let mut i = 0;
    while i + 8 <= bytes.len() {
        if bytes[i..i + 8] == old_le {
            bytes[i..i + 8].copy_from_slice(&new_le);
        }
        i += 8;
    }
}

/// Apply every queued decrement, cascading to children of any object whose
/// count reaches zero or whose sole back-pointer owner released it (spec
/// §4.2 "Queue drain").
#[tracing::instrument(level = "trace", skip(queue, heap, registry))]
pub fn drain_decrements(queue: &mut DecrementQueue, heap: &mut Heap, registry: &TypeRegistry) -> DecrementDrainStats {
    let mut stats = DecrementDrainStats::default();
    while let Some(addr) = queue.pending.pop() {
        let meta = heap.meta_at(addr);
        if !meta.allocated() || meta.is_forwarding() {
            continue;
        }
        heap.verify_debug_canary(addr);
        stats.decrements_applied += 1;

        let should_free = match meta.rc_kind() {
            RcKind::BackPointer => true,
            RcKind::Count => {
                let count = meta.count().unwrap_or(0);
                if count <= 1 {
                    true
                } else {
                    heap.set_meta_at(addr, MetaWord::with_count(count - 1).with_mark(meta.marked()));
                    false
                }
            }
        };

        if should_free {
            let tid = heap.page(addr.page_index()).owning_type;
            let bytes = heap.bytes_at(addr).to_vec();
            for child in trace_value(&bytes, tid, registry) {
                if !young(heap, child) {
                    queue.enqueue(child);
                }
            }
            heap.release(addr);
            stats.objects_freed += 1;
        }
    }
    debug!(freed = stats.objects_freed, applied = stats.decrements_applied, "decrement drain complete");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::types::{Category, SizeInfo, TupleLayout, TypeDescriptor};

    fn registry() -> TypeRegistry {
        let leaf = TypeDescriptor {
            tid: 2,
            name: "Leaf".into(),
            category: Category::Collection,
            size_info: SizeInfo::default(),
            heap_mask: Default::default(),
            inline_mask: Default::default(),
            vtable: Vec::new(),
            key_comparable: false,
            boxed_envelope: None,
        };
        let node = TypeDescriptor {
            tid: 1,
            name: "Node".into(),
            category: Category::Struct(StructShapeAlias::Tuple(TupleLayout {
                max_index: 0,
                ttypes: vec![2],
                idx_offsets: vec![0],
            })),
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
        };
        TypeRegistry::new([leaf, node])
    }

    use crate::types::StructShape as StructShapeAlias;

    #[test]
    fn single_root_gets_back_pointer_discipline() {
        let reg = registry();
        let mut heap = Heap::new(VmConfig::default());
        let child = heap.allocate(2, &reg).unwrap();
        let parent = heap.allocate(1, &reg).unwrap();
        heap.bytes_at_mut(parent).copy_from_slice(&child.to_bits().to_le_bytes());

        let mut roots = RootSet::new();
        roots.push(parent);

        let stats = collect_young(&mut heap, &reg, &mut roots);
        assert_eq!(stats.objects_evacuated, 2);

        let new_parent = roots.iter().next().unwrap();
        assert!(!young(&heap, new_parent));
        let parent_meta = heap.meta_at(new_parent);
        assert_eq!(parent_meta.rc_kind(), RcKind::Count);
        assert_eq!(parent_meta.count(), Some(1));

        let new_child_bits = u64::from_le_bytes(heap.bytes_at(new_parent).try_into().unwrap());
        let new_child = HeapAddr::from_bits(new_child_bits);
        let child_meta = heap.meta_at(new_child);
        assert_eq!(child_meta.rc_kind(), RcKind::BackPointer);
        assert_eq!(child_meta.back_pointer_target(), Some(new_parent.to_bits()));
    }

    #[test]
    fn shared_child_gets_count_discipline() {
        let reg = registry();
        let mut heap = Heap::new(VmConfig::default());
        let child = heap.allocate(2, &reg).unwrap();
        let parent_a = heap.allocate(1, &reg).unwrap();
        let parent_b = heap.allocate(1, &reg).unwrap();
        heap.bytes_at_mut(parent_a).copy_from_slice(&child.to_bits().to_le_bytes());
        heap.bytes_at_mut(parent_b).copy_from_slice(&child.to_bits().to_le_bytes());

        let mut roots = RootSet::new();
        roots.push(parent_a);
        roots.push(parent_b);

        collect_young(&mut heap, &reg, &mut roots);

        let new_parents: Vec<_> = roots.iter().collect();
        let new_child_bits_a = u64::from_le_bytes(heap.bytes_at(new_parents[0]).try_into().unwrap());
        let new_child_bits_b = u64::from_le_bytes(heap.bytes_at(new_parents[1]).try_into().unwrap());
        assert_eq!(new_child_bits_a, new_child_bits_b);
        let child_meta = heap.meta_at(HeapAddr::from_bits(new_child_bits_a));
        assert_eq!(child_meta.rc_kind(), RcKind::Count);
        assert_eq!(child_meta.count(), Some(2));
    }

    #[test]
    fn decrement_queue_frees_back_pointer_chain() {
        let reg = registry();
        let mut heap = Heap::new(VmConfig::default());
        let child = heap.promote(2, &[0u8; 8]);
        let parent = heap.promote(1, &child.to_bits().to_le_bytes());
        heap.set_meta_at(child, MetaWord::back_pointer(parent.to_bits()));
        heap.set_meta_at(parent, MetaWord::with_count(1));

        let mut queue = DecrementQueue::new();
        queue.enqueue(parent);
        let stats = drain_decrements(&mut queue, &mut heap, &reg);

        assert_eq!(stats.objects_freed, 2);
        assert!(!heap.meta_at(parent).allocated());
        assert!(!heap.meta_at(child).allocated());
    }

    #[test]
    fn decrement_above_one_just_decrements() {
        let reg = registry();
        let mut heap = Heap::new(VmConfig::default());
        let obj = heap.promote(2, &[0u8; 8]);
        heap.set_meta_at(obj, MetaWord::with_count(3));

        let mut queue = DecrementQueue::new();
        queue.enqueue(obj);
        let stats = drain_decrements(&mut queue, &mut heap, &reg);

        assert_eq!(stats.objects_freed, 0);
        assert_eq!(heap.meta_at(obj).count(), Some(2));
    }
}
