//! The `Category` tag and its per-shape extension data (spec §3
//! "Category", "Tuple/Record/Entity/Ephemeral-list descriptor").

use super::TypeId;

/// Layout extension for tuple-shaped structs/refs: positional slots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TupleLayout {
    /// Highest valid positional index.
    pub max_index: u32,
    /// Declared type of each positional slot.
    pub ttypes: Vec<TypeId>,
    /// Byte offset of each positional slot within the struct.
    pub idx_offsets: Vec<u32>,
}

/// Layout extension for record-shaped structs/refs: named (interned
/// property-id) slots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordLayout {
    /// Globally interned property identifiers, in declaration order.
    pub property_ids: Vec<u32>,
    /// Declared type of each property.
    pub rtypes: Vec<TypeId>,
    /// Byte offset of each property within the struct.
    pub property_offsets: Vec<u32>,
}

/// Layout extension for entity-shaped structs/refs: named fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityLayout {
    /// Field identifiers (interned), in declaration order.
    pub field_ids: Vec<u32>,
    /// Byte offset of each field within the struct.
    pub field_offsets: Vec<u32>,
    /// Declared type of each field.
    pub ftypes: Vec<TypeId>,
}

/// Layout extension for a stack-only ephemeral list: a fixed-layout tuple
/// that is never heap-allocated and never a union variant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EphemeralListLayout {
    /// Declared type of each slot.
    pub etypes: Vec<TypeId>,
    /// Byte offset of each slot.
    pub idx_offsets: Vec<u32>,
}

/// Layout extension for the three union disciplines: the set of concrete
/// member types a value of this union type may hold at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnionLayout {
    /// Concrete member `TypeID`s this union may hold.
    pub subtypes: Vec<TypeId>,
}

/// The category tag of a [`super::TypeDescriptor`] (spec §3).
///
/// Carries per-variant layout data rather than being a bare enum, per
/// Design Notes §9 ("re-architect as a tagged sum of descriptor shapes ...
/// with per-variant data").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    /// The unit/absent-value type (`None`, `Nothing`).
    Empty,
    /// A scalar register value (`Bool`, `Nat`, `Int`, `Float`, ...) that
    /// lives fully inline in its storage slot.
    Register,
    /// A struct value (tuple/record/entity) that lives fully inline.
    Struct(StructShape),
    /// A heap-allocated envelope around a struct, used to carry a struct
    /// through a universal union.
    BoxedStruct(StructShape),
    /// An arbitrary-precision number (`BigNat`, `BigInt`), inline.
    BigNum,
    /// A UTF-8 string (spec §4.6).
    String,
    /// A raw byte buffer (spec §4.6), laid out exactly like `String` (inline
    /// short buffer or heap leaf/concat-tree slot) but with no UTF-8
    /// encoding constraint on its contents.
    ByteBuffer,
    /// A persistent list or map (spec §4.5); one pointer slot.
    Collection,
    /// A heap-allocated struct accessed through one pointer slot.
    Ref(StructShape),
    /// Sum type, pointer-only discipline: one pointer slot, concrete type
    /// recovered from the payload's owning page.
    UnionRef(UnionLayout),
    /// Sum type, inline discipline: `(descriptor*, inline-bytes)` in a
    /// fixed-size slot.
    UnionInline(UnionLayout),
    /// Sum type, universal discipline: fixed 5-word slot
    /// `(descriptor*, 4 words of payload)`, auto-boxing oversize structs.
    UnionUniversal(UnionLayout),
}

/// The struct-shape variants a `Struct`/`BoxedStruct`/`Ref` descriptor may
/// carry (spec §3's four descriptor extensions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructShape {
    /// A positional tuple.
    Tuple(TupleLayout),
    /// A named-property record.
    Record(RecordLayout),
    /// A named-field entity (nominal class/struct).
    Entity(EntityLayout),
    /// A stack-only ephemeral list (only valid under `Category::Struct`,
    /// never `BoxedStruct`/`Ref`, per spec §3).
    EphemeralList(EphemeralListLayout),
}

impl Category {
    /// True for categories whose value lives fully inline in its slot
    /// (spec §3 invariants: "Register, Struct, BigNum values live fully
    /// inline").
    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Category::Empty | Category::Register | Category::Struct(_) | Category::BigNum
        )
    }

    /// True for categories that occupy exactly one pointer-sized slot with
    /// a heap-allocated payload.
    pub fn is_single_pointer(&self) -> bool {
        matches!(
            self,
            Category::Ref(_) | Category::Collection | Category::String | Category::ByteBuffer | Category::UnionRef(_)
        )
    }

    /// The union layout, if this category is one of the three union
    /// disciplines.
    pub fn union_layout(&self) -> Option<&UnionLayout> {
        match self {
            Category::UnionRef(u) | Category::UnionInline(u) | Category::UnionUniversal(u) => {
                Some(u)
            }
            _ => None,
        }
    }
}
