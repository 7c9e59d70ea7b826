//! `display` (spec §4.3's descriptor dispatch set): a debug-oriented
//! rendering of a value, used by the `Debug` opcode and CLI tracing.
//!
//! Not a full pretty-printer — it renders enough structure (struct fields,
//! union tags, string/numeric content) to be useful in `--trace` output and
//! panics, in the teacher's own `Debug`-opcode style, not a user-facing
//! formatting facility with field name lookup, escaping rules, etc.

use crate::consts::well_known;
use crate::error::FatalReason;
use crate::gc::{Heap, HeapAddr};
use crate::types::{Category, StructShape, TypeId, TypeRegistry};

use super::bytes_util::{read_u32, read_u64};

/// Render a value of static type `tid` at `bytes`.
pub fn display(bytes: &[u8], tid: TypeId, registry: &TypeRegistry, heap: &Heap) -> Result<String, FatalReason> {
    let desc = registry.require(tid)?;
    Ok(match &desc.category {
        Category::Empty => {
            if tid == well_known::NOTHING {
                "Nothing".into()
            } else {
                "None".into()
            }
        }
        Category::Register => display_register(bytes, tid),
        Category::BigNum => display_bignum(bytes, tid),
        Category::String => String::from_utf8_lossy(&crate::strings::flatten(bytes, heap)).into_owned(),
        Category::ByteBuffer => {
            let raw = crate::strings::bytebuffer::flatten(bytes, heap);
            format!("0x{}", raw.iter().map(|b| format!("{b:02x}")).collect::<String>())
        }
        Category::Struct(shape) | Category::BoxedStruct(shape) => display_struct(bytes, shape, registry, heap)?,
        Category::Ref(shape) => {
            let addr = HeapAddr::from_bits(read_u64(bytes, 0));
            display_struct(heap.bytes_at(addr), shape, registry, heap)?
        }
        Category::Collection => format!("<collection@{:#x}>", read_u64(bytes, 0)),
        Category::UnionRef(_) => {
            let addr = HeapAddr::from_bits(read_u64(bytes, 0));
            let concrete = heap.page(addr.page_index()).owning_type;
            display(heap.bytes_at(addr), concrete, registry, heap)?
        }
        Category::UnionInline(_) => {
            let tag = read_u32(bytes, 0);
            let width = registry.require(tag)?.slot_width();
            display(&bytes[8..8 + width], tag, registry, heap)?
        }
        Category::UnionUniversal(_) => {
            let tag = read_u32(bytes, 0);
            let member = registry.require(tag)?;
            let budget = crate::consts::WORD_SIZE * crate::consts::UNION_UNIVERSAL_PAYLOAD_WORDS;
            if member.slot_width() <= budget {
                let width = member.slot_width();
                display(&bytes[8..8 + width], tag, registry, heap)?
            } else {
                let addr = HeapAddr::from_bits(read_u64(bytes, crate::consts::WORD_SIZE));
                display(heap.bytes_at(addr), tag, registry, heap)?
            }
        }
    })
}

fn display_register(bytes: &[u8], tid: TypeId) -> String {
    match tid {
        well_known::BOOL => (bytes[0] != 0).to_string(),
        well_known::NAT => read_u64(bytes, 0).to_string(),
        well_known::INT => (read_u64(bytes, 0) as i64).to_string(),
        well_known::FLOAT => f64::from_le_bytes(bytes[..8].try_into().unwrap()).to_string(),
        _ => format!("0x{}", bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()),
    }
}

fn display_bignum(bytes: &[u8], tid: TypeId) -> String {
    if tid == well_known::BIG_INT {
        ethnum::I256::from_le_bytes(bytes[..32].try_into().unwrap()).to_string()
    } else {
        ethnum::U256::from_le_bytes(bytes[..32].try_into().unwrap()).to_string()
    }
}

fn display_struct(bytes: &[u8], shape: &StructShape, registry: &TypeRegistry, heap: &Heap) -> Result<String, FatalReason> {
    let fields: Vec<(TypeId, u32)> = match shape {
        StructShape::Tuple(t) => t.ttypes.iter().copied().zip(t.idx_offsets.iter().copied()).collect(),
        StructShape::Record(r) => r.rtypes.iter().copied().zip(r.property_offsets.iter().copied()).collect(),
        StructShape::Entity(e) => e.ftypes.iter().copied().zip(e.field_offsets.iter().copied()).collect(),
        StructShape::EphemeralList(e) => e.etypes.iter().copied().zip(e.idx_offsets.iter().copied()).collect(),
    };
    let mut parts = Vec::with_capacity(fields.len());
    for (fty, off) in fields {
        let width = registry.require(fty)?.slot_width();
        let o = off as usize;
        parts.push(display(&bytes[o..o + width], fty, registry, heap)?);
    }
    Ok(format!("({})", parts.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::types::{EntityLayout, SizeInfo, TypeDescriptor};

    fn nat_desc() -> TypeDescriptor {
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
        }
    }

    fn entity_desc() -> TypeDescriptor {
        TypeDescriptor {
            tid: 100,
            name: "Point".into(),
            category: Category::Struct(StructShape::Entity(EntityLayout {
                field_ids: vec![1, 2],
                field_offsets: vec![0, 8],
                ftypes: vec![well_known::NAT, well_known::NAT],
            })),
            size_info: SizeInfo {
                heap_size: 16,
                inline_size: 16,
                assign_size: 16,
            },
            heap_mask: Default::default(),
            inline_mask: Default::default(),
            vtable: Vec::new(),
            key_comparable: false,
            boxed_envelope: None,
        }
    }

    #[test]
    fn nat_displays_as_decimal() {
        let reg = TypeRegistry::new([nat_desc()]);
        let heap = Heap::new(VmConfig::default());
        let bytes = 42u64.to_le_bytes();
        assert_eq!(display(&bytes, well_known::NAT, &reg, &heap).unwrap(), "42");
    }

    #[test]
    fn struct_displays_as_parenthesized_fields() {
        let reg = TypeRegistry::new([nat_desc(), entity_desc()]);
        let heap = Heap::new(VmConfig::default());
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&1u64.to_le_bytes());
        bytes[8..16].copy_from_slice(&2u64.to_le_bytes());
        assert_eq!(display(&bytes, 100, &reg, &heap).unwrap(), "(1, 2)");
    }
}
