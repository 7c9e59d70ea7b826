//! `TypeDescriptor`: the immutable per-type record spec §3 requires.
//!
//! Dispatch of `store`/`clear`/`index`/`coerce`/`keyCmp`/`display` and the
//! four GC functors is done by a category switch against the data held
//! here (see `crate::value` and `crate::gc::collector`), rather than by
//! storing function pointers on the descriptor itself — the teacher's own
//! instruction dispatch (`interpreter/executors/instruction.rs`) is a
//! single `match`, not an indirect-call vtable, and Design Notes §9 offers
//! either as valid; we keep descriptors plain data so they stay trivially
//! `Clone`/`Debug` and safely shareable from an immutable registry.

use super::{Category, TypeId};

/// Layout sizes for a type, per spec §3 "TypeDescriptor".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeInfo {
    /// Size, in bytes, of the heap-allocated representation (0 if the
    /// category never heap-allocates its own storage, e.g. `Register`).
    pub heap_size: u32,
    /// Size, in bytes, occupied inline in any slot of this type.
    pub inline_size: u32,
    /// Size, in bytes, copied by a `store`/assignment of this type.
    pub assign_size: u32,
}

/// The full immutable descriptor for one `TypeID`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    /// This type's process-unique identifier.
    pub tid: TypeId,
    /// Human-readable name, used by `display` and diagnostics.
    pub name: String,
    /// The category tag and its per-shape layout data.
    pub category: Category,
    /// Inline/heap/assign sizes.
    pub size_info: SizeInfo,
    /// Reference mask over the object's *heap* representation (traced
    /// during GC when the object is heap-allocated).
    pub heap_mask: super::ReferenceMask,
    /// Reference mask over the object's *inline* representation (traced
    /// when the value sits directly in a frame/struct slot).
    pub inline_mask: super::ReferenceMask,
    /// Virtual dispatch table: for an entity/union type, the invocation
    /// IDs resolved by runtime `TypeID` for `InvokeVirtualFunction`.
    pub vtable: Vec<crate::program::InvokeId>,
    /// Whether this type supports `keyCmp` (spec §4.3: "Float, Decimal,
    /// Rational, and non-comparable aggregates have `keyCmp = ⊥`").
    pub key_comparable: bool,
    /// For a struct category that has an associated boxed-envelope type,
    /// used when coercing a struct into a `UnionUniversal` (spec §4.3
    /// coerce table, "auto-box"). `None` when no such envelope exists or
    /// the struct always fits inline.
    pub boxed_envelope: Option<TypeId>,
}

impl TypeDescriptor {
    /// Spec §8 invariant 1: for Struct category, `inlineSize == assignSize
    /// == heapSize == sizeof(slot)`.
    pub fn struct_size_invariant_holds(&self) -> bool {
        use super::category::StructShape;
        match &self.category {
            Category::Struct(StructShape::EphemeralList(_)) | Category::Struct(_) => {
                self.size_info.heap_size == self.size_info.inline_size
                    && self.size_info.inline_size == self.size_info.assign_size
            }
            _ => true,
        }
    }

    /// Spec §8 invariant 2: for Ref category, `inlineSize == sizeof(pointer)`.
    pub fn ref_size_invariant_holds(&self) -> bool {
        match &self.category {
            Category::Ref(_) => self.size_info.inline_size as usize == crate::consts::WORD_SIZE,
            _ => true,
        }
    }

    /// Number of bytes this type occupies in any slot (register/struct
    /// inline, or one pointer word for ref/collection/string/union-ref,
    /// or the fixed union-inline/union-universal slot widths).
    pub fn slot_width(&self) -> usize {
        match &self.category {
            Category::Empty => 0,
            Category::Register | Category::BigNum | Category::Struct(_) => {
                self.size_info.inline_size as usize
            }
            Category::BoxedStruct(_) => crate::consts::WORD_SIZE,
            Category::Ref(_) | Category::Collection | Category::UnionRef(_) => {
                crate::consts::WORD_SIZE
            }
            Category::String | Category::ByteBuffer => 16,
            Category::UnionInline(_) => crate::consts::WORD_SIZE + self.size_info.inline_size as usize,
            Category::UnionUniversal(_) => {
                crate::consts::WORD_SIZE * (1 + crate::consts::UNION_UNIVERSAL_PAYLOAD_WORDS)
            }
        }
    }
}
