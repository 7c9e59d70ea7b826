//! Structural pointer tracing: given a value's static `TypeID` and its slot
//! bytes, enumerate the heap addresses it references.
//!
//! Struct-shaped categories (`Struct`/`BoxedStruct`/`Ref`) are traced via
//! each field's own declared type and byte offset (`TupleLayout`/
//! `RecordLayout`/`EntityLayout`), not by walking the flat
//! [`crate::types::ReferenceMask`] word-by-word — a struct's field offsets
//! are already authoritative and self-describing, so re-deriving them from
//! a generic mask string would just be a second, redundant encoding of the
//! same information. The flat reference mask remains useful as a quick
//! "does this leaf value need tracing at all" summary and for display/
//! debug tooling, but is not consulted here. This is a deliberate
//! resolution of an ambiguity in how composite (`String`, union) slots,
//! which are wider than one machine word, would otherwise need bespoke
//! multi-word mask conventions; see `DESIGN.md`.

use crate::consts::{STRING_SLOT_LEN_BYTE, UNION_UNIVERSAL_PAYLOAD_WORDS, WORD_SIZE};
use crate::types::{Category, StructShape, TypeId, TypeRegistry};

use super::page::HeapAddr;

fn read_u64(bytes: &[u8], word_index: usize) -> u64 {
    let start = word_index * WORD_SIZE;
    u64::from_le_bytes(bytes[start..start + WORD_SIZE].try_into().unwrap())
}

fn read_u32(bytes: &[u8], word_index: usize) -> u32 {
    read_u64(bytes, word_index) as u32
}

fn push_if_live(out: &mut Vec<HeapAddr>, bits: u64) {
    if bits != 0 {
        out.push(HeapAddr::from_bits(bits));
    }
}

/// Every heap address directly reachable from one value of static type
/// `tid`, read from `bytes` (exactly `tid`'s slot width).
pub fn trace_value(bytes: &[u8], tid: TypeId, registry: &TypeRegistry) -> Vec<HeapAddr> {
    let Some(desc) = registry.get(tid) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    match &desc.category {
        Category::Empty | Category::Register | Category::BigNum => {}
        Category::Struct(shape) | Category::BoxedStruct(shape) | Category::Ref(shape) => {
            trace_struct_shape(bytes, shape, registry, &mut out);
        }
        Category::UnionRef(_) => {
            push_if_live(&mut out, read_u64(bytes, 0));
        }
        Category::Collection => {
            // A `Collection`-typed slot (local/field) is one pointer word;
            // a `Collection`-typed heap *node* is wider and self-describing
            // (see `collection_layout`) — the two share one `TypeID`, so
            // length is what disambiguates them here.
            if bytes.len() <= WORD_SIZE {
                push_if_live(&mut out, read_u64(bytes, 0));
            } else {
                trace_collection_node(bytes, registry, &mut out);
            }
        }
        Category::String | Category::ByteBuffer => {
            // Spec §4.6: inline iff the 16th byte is nonzero, or it is zero
            // and the first word is null (the all-zero empty string) — so
            // a slot is heap-resident exactly when byte 15 is zero and the
            // first word is not. `ByteBuffer` reuses the identical 16-byte
            // inline-or-heap slot convention.
            if bytes.len() > STRING_SLOT_LEN_BYTE && bytes[STRING_SLOT_LEN_BYTE] == 0 {
                push_if_live(&mut out, read_u64(bytes, 0));
            }
        }
        Category::UnionInline(_) => {
            let tag = read_u32(bytes, 0);
            if tag != crate::consts::INTERNAL_TYPE_ID {
                if let Some(member) = registry.get(tag) {
                    let width = member.slot_width();
                    if bytes.len() >= WORD_SIZE + width {
                        out.extend(trace_value(&bytes[WORD_SIZE..WORD_SIZE + width], tag, registry));
                    }
                }
            }
        }
        Category::UnionUniversal(_) => {
            let tag = read_u32(bytes, 0);
            if tag != crate::consts::INTERNAL_TYPE_ID {
                if let Some(member) = registry.get(tag) {
                    let budget = WORD_SIZE * UNION_UNIVERSAL_PAYLOAD_WORDS;
                    if member.slot_width() <= budget {
                        let width = member.slot_width();
                        out.extend(trace_value(&bytes[WORD_SIZE..WORD_SIZE + width], tag, registry));
                    } else {
                        push_if_live(&mut out, read_u64(bytes, 1));
                    }
                }
            }
        }
    }
    out
}

/// Trace a heap-resident collection node (spec §4.5): its children (list
/// tree fork, map tree fork) and any inline element/key/value payload that
/// is itself reference-bearing, using the element/key/value `TypeID`(s) the
/// node recorded in its own header at construction time.
fn trace_collection_node(bytes: &[u8], registry: &TypeRegistry, out: &mut Vec<HeapAddr>) {
    use super::collection_layout as layout;

    match layout::shape(bytes) {
        layout::SHAPE_LIST_PV => {
            let elem_tid = layout::primary_tid(bytes);
            let Some(elem_desc) = registry.get(elem_tid) else { return };
            let width = elem_desc.slot_width();
            let n = layout::count(bytes) as usize;
            for i in 0..n {
                let start = layout::PAYLOAD_OFFSET + i * width;
                if start + width > bytes.len() {
                    break;
                }
                out.extend(trace_value(&bytes[start..start + width], elem_tid, registry));
            }
        }
        layout::SHAPE_LIST_TREE => {
            push_if_live(out, layout::left_bits(bytes));
            push_if_live(out, layout::right_bits(bytes));
        }
        layout::SHAPE_MAP_TREE => {
            push_if_live(out, layout::left_bits(bytes));
            push_if_live(out, layout::right_bits(bytes));
            let key_tid = layout::primary_tid(bytes);
            let val_tid = layout::secondary_tid(bytes);
            if let Some(key_desc) = registry.get(key_tid) {
                let kw = key_desc.slot_width();
                let start = layout::MAP_KEY_OFFSET;
                if start + kw <= bytes.len() {
                    out.extend(trace_value(&bytes[start..start + kw], key_tid, registry));
                    if let Some(val_desc) = registry.get(val_tid) {
                        let vw = val_desc.slot_width();
                        let vstart = start + kw;
                        if vstart + vw <= bytes.len() {
                            out.extend(trace_value(&bytes[vstart..vstart + vw], val_tid, registry));
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

fn trace_struct_shape(bytes: &[u8], shape: &StructShape, registry: &TypeRegistry, out: &mut Vec<HeapAddr>) {
    match shape {
        StructShape::Tuple(t) => {
            for (&fty, &off) in t.ttypes.iter().zip(&t.idx_offsets) {
                trace_field(bytes, fty, off, registry, out);
            }
        }
        StructShape::Record(r) => {
            for (&fty, &off) in r.rtypes.iter().zip(&r.property_offsets) {
                trace_field(bytes, fty, off, registry, out);
            }
        }
        StructShape::Entity(e) => {
            for (&fty, &off) in e.ftypes.iter().zip(&e.field_offsets) {
                trace_field(bytes, fty, off, registry, out);
            }
        }
        StructShape::EphemeralList(e) => {
            for (&fty, &off) in e.etypes.iter().zip(&e.idx_offsets) {
                trace_field(bytes, fty, off, registry, out);
            }
        }
    }
}

fn trace_field(bytes: &[u8], fty: TypeId, offset: u32, registry: &TypeRegistry, out: &mut Vec<HeapAddr>) {
    let Some(fdesc) = registry.get(fty) else { return };
    let width = fdesc.slot_width();
    let start = offset as usize;
    if start + width > bytes.len() {
        return;
    }
    out.extend(trace_value(&bytes[start..start + width], fty, registry));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, RecordLayout, SizeInfo, TypeDescriptor};

    fn ref_desc(tid: TypeId) -> TypeDescriptor {
        TypeDescriptor {
            tid,
            name: "Holder".into(),
            category: Category::Collection,
            size_info: SizeInfo::default(),
            heap_mask: Default::default(),
            inline_mask: Default::default(),
            vtable: Vec::new(),
            key_comparable: false,
            boxed_envelope: None,
        }
    }

    fn record_desc(tid: TypeId, field_ty: TypeId) -> TypeDescriptor {
        TypeDescriptor {
            tid,
            name: "Rec".into(),
            category: Category::Struct(StructShape::Record(RecordLayout {
                property_ids: vec![1],
                rtypes: vec![field_ty],
                property_offsets: vec![0],
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
        }
    }

    #[test]
    fn collection_slot_traces_its_pointer() {
        let registry = TypeRegistry::new([ref_desc(1)]);
        let addr = HeapAddr::new(3, 4);
        let bytes = addr.to_bits().to_le_bytes();
        let out = trace_value(&bytes, 1, &registry);
        assert_eq!(out, vec![addr]);
    }

    #[test]
    fn record_field_traces_through_to_nested_pointer() {
        let registry = TypeRegistry::new([record_desc(1, 2), ref_desc(2)]);
        let addr = HeapAddr::new(7, 1);
        let bytes = addr.to_bits().to_le_bytes();
        let out = trace_value(&bytes, 1, &registry);
        assert_eq!(out, vec![addr]);
    }

    #[test]
    fn null_pointer_slot_traces_to_nothing() {
        let registry = TypeRegistry::new([ref_desc(1)]);
        let bytes = [0u8; 8];
        assert!(trace_value(&bytes, 1, &registry).is_empty());
    }
}
