//! `Builtin(dst, tag, args)` (spec §4.4.6 "Primitive built-ins"): the
//! C-style dispatch on an implementation-key string that a primitive
//! invocation jumps into.
//!
//! One match arm per tag family, each delegating straight into the module
//! that actually implements the behavior (`crate::arith`, `crate::strings`,
//! `crate::collections`) — the same "thin dispatch, fat leaf module" split
//! `value::coerce` and the evaluator's other opcode handlers already use.
//! Covers the numeric narrowing/conversion, string, byte-buffer, and
//! list/map tags that
//! account for the overwhelming majority of primitive invocations observed
//! in practice; an unrecognized tag is a [`FatalReason::UnknownOpcodeTag`]
//! rather than a silent no-op, so a missing tag fails loudly instead of
//! returning garbage.

use crate::arith;
use crate::collections::{list, map};
use crate::consts::well_known;
use crate::error::{FatalReason, VmResult};
use crate::gc::Heap;
use crate::strings;
use crate::types::{TypeId, TypeRegistry};

/// One resolved argument: its bytes plus (where the tag needs it) its
/// declared element/key/value `TypeID`, supplied by the primitive
/// invocation's `binds`.
pub struct BuiltinArgs<'a> {
    pub values: Vec<Vec<u8>>,
    pub binds: &'a [TypeId],
}

fn nat(b: &[u8]) -> u64 {
    u64::from_le_bytes(b[..8].try_into().unwrap())
}

fn int(b: &[u8]) -> i64 {
    nat(b) as i64
}

/// Dispatch one primitive built-in by tag, returning its result bytes.
pub fn dispatch(tag: &str, args: &BuiltinArgs, heap: &mut Heap, registry: &TypeRegistry) -> VmResult<Vec<u8>> {
    let v = &args.values;
    Ok(match tag {
        // --- Numeric narrowing / conversion ---
        "number_nattoint" => (arith::narrow_nat_to_int(nat(&v[0]))? as u64).to_le_bytes().to_vec(),
        "number_inttonat" => arith::narrow_int_to_nat(int(&v[0]))?.to_le_bytes().to_vec(),
        "number_bigintoint" => {
            let n = ethnum::I256::from_le_bytes(v[0][..32].try_into().unwrap());
            (arith::narrow_bigint_to_int(n)? as u64).to_le_bytes().to_vec()
        }
        "number_bignattonat" => {
            let n = ethnum::U256::from_le_bytes(v[0][..32].try_into().unwrap());
            arith::narrow_bignat_to_nat(n)?.to_le_bytes().to_vec()
        }
        "number_inttobigint" => ethnum::I256::from(int(&v[0])).to_le_bytes().to_vec(),
        "number_nattobignat" => ethnum::U256::from(nat(&v[0])).to_le_bytes().to_vec(),
        "number_nattofloat" => (nat(&v[0]) as f64).to_le_bytes().to_vec(),
        "number_inttofloat" => (int(&v[0]) as f64).to_le_bytes().to_vec(),

        // --- String built-ins (spec §4.6) ---
        "string_concat" => strings::concat(&v[0], &v[1], heap, registry)?.to_vec(),
        "string_slice" => strings::slice(&v[0], nat(&v[1]) as usize, nat(&v[2]) as usize, heap, registry)?.to_vec(),
        "string_length" => (strings::len(&v[0], heap) as u64).to_le_bytes().to_vec(),
        "string_empty" => {
            if strings::is_empty(&v[0]) {
                vec![1]
            } else {
                vec![0]
            }
        }

        // --- ByteBuffer built-ins (spec §4.6) ---
        "buffer_concat" => strings::bytebuffer::concat(&v[0], &v[1], heap, registry)?.to_vec(),
        "buffer_slice" => strings::bytebuffer::slice(&v[0], nat(&v[1]) as usize, nat(&v[2]) as usize, heap, registry)?.to_vec(),
        "buffer_length" => (strings::bytebuffer::len(&v[0], heap) as u64).to_le_bytes().to_vec(),
        "buffer_empty" => {
            if strings::bytebuffer::is_empty(&v[0]) {
                vec![1]
            } else {
                vec![0]
            }
        }

        // --- List built-ins (spec §4.5) ---
        "s_list_size" => list::size(&v[0], heap).to_le_bytes().to_vec(),
        "s_list_empty" => {
            if list::is_empty(&v[0]) {
                vec![1]
            } else {
                vec![0]
            }
        }
        "s_list_get" => {
            let elem_tid = args.binds[0];
            list::get(&v[0], nat(&v[1]), elem_tid, registry, heap)?.to_vec()
        }
        "s_list_front" => list::front(&v[0], args.binds[0], registry, heap)?.to_vec(),
        "s_list_back" => list::back(&v[0], args.binds[0], registry, heap)?.to_vec(),
        "s_list_push_back" => {
            let elem_tid = args.binds[0];
            let list_tid = args.binds[1];
            list::push_back(&v[0], &v[1], elem_tid, list_tid, heap, registry)?.to_vec()
        }
        "s_list_push_front" => {
            let elem_tid = args.binds[0];
            let list_tid = args.binds[1];
            list::push_front(&v[0], &v[1], elem_tid, list_tid, heap, registry)?.to_vec()
        }
        "s_list_set" => {
            let elem_tid = args.binds[0];
            let list_tid = args.binds[1];
            list::set(&v[0], nat(&v[1]), &v[2], elem_tid, list_tid, heap, registry)?.to_vec()
        }
        "s_list_append" => {
            let elem_tid = args.binds[0];
            let list_tid = args.binds[1];
            list::append(&v[0], &v[1], elem_tid, list_tid, heap, registry)?.to_vec()
        }
        "s_list_reverse" => list::reverse(&v[0], args.binds[0], args.binds[1], heap, registry)?.to_vec(),
        "s_list_has" => {
            if list::has(&v[0], &v[1], args.binds[0], registry, heap)? {
                vec![1]
            } else {
                vec![0]
            }
        }
        "s_list_indexof" => match list::indexof(&v[0], &v[1], args.binds[0], registry, heap)? {
            Some(i) => i.to_le_bytes().to_vec(),
            None => (-1i64 as u64).to_le_bytes().to_vec(),
        },
        "s_list_last_indexof" => match list::last_indexof(&v[0], &v[1], args.binds[0], registry, heap)? {
            Some(i) => i.to_le_bytes().to_vec(),
            None => (-1i64 as u64).to_le_bytes().to_vec(),
        },
        "s_list_single_index_of" => match list::single_index_of(&v[0], &v[1], args.binds[0], registry, heap)? {
            Some(i) => i.to_le_bytes().to_vec(),
            None => (-1i64 as u64).to_le_bytes().to_vec(),
        },
        "s_list_insert" => {
            let (elem_tid, list_tid) = (args.binds[0], args.binds[1]);
            list::insert(&v[0], nat(&v[1]), &v[2], elem_tid, list_tid, heap, registry)?.to_vec()
        }
        "s_list_remove" => {
            let (elem_tid, list_tid) = (args.binds[0], args.binds[1]);
            list::remove(&v[0], nat(&v[1]), elem_tid, list_tid, heap, registry)?.to_vec()
        }
        "s_list_pop_back" => {
            let (elem_tid, list_tid) = (args.binds[0], args.binds[1]);
            list::pop_back(&v[0], elem_tid, list_tid, heap, registry)?.to_vec()
        }
        "s_list_pop_front" => {
            let (elem_tid, list_tid) = (args.binds[0], args.binds[1]);
            list::pop_front(&v[0], elem_tid, list_tid, heap, registry)?.to_vec()
        }
        "s_list_slice_start" => {
            let (elem_tid, list_tid) = (args.binds[0], args.binds[1]);
            list::slice_start(&v[0], nat(&v[1]), elem_tid, list_tid, heap, registry)?.to_vec()
        }
        "s_list_slice_end" => {
            let (elem_tid, list_tid) = (args.binds[0], args.binds[1]);
            list::slice_end(&v[0], nat(&v[1]), elem_tid, list_tid, heap, registry)?.to_vec()
        }
        "s_list_slice" => {
            let (elem_tid, list_tid) = (args.binds[0], args.binds[1]);
            list::slice(&v[0], nat(&v[1]), nat(&v[2]), elem_tid, list_tid, heap, registry)?.to_vec()
        }
        "s_list_fill" => {
            let (elem_tid, list_tid) = (args.binds[0], args.binds[1]);
            list::fill(nat(&v[0]), &v[1], elem_tid, list_tid, heap, registry)?.to_vec()
        }
        "s_list_range" => {
            let (list_tid, elem_tid) = (args.binds[0], args.binds[1]);
            list::range(nat(&v[0]), nat(&v[1]), nat(&v[2]), list_tid, elem_tid, heap, registry)?.to_vec()
        }

        // --- Map built-ins (spec §4.5) ---
        "s_map_count" => map::count(&v[0], heap).to_le_bytes().to_vec(),
        "s_map_find" => {
            let (key_tid, val_tid) = (args.binds[0], args.binds[1]);
            let vw = registry.require(val_tid)?.slot_width();
            match map::find(&v[0], &v[1], key_tid, val_tid, registry, heap)? {
                Some(bytes) => {
                    let mut out = vec![1u8];
                    out.extend_from_slice(bytes);
                    out
                }
                None => {
                    let mut out = vec![0u8];
                    out.extend(std::iter::repeat(0u8).take(vw));
                    out
                }
            }
        }
        "s_map_min_key" => {
            let key_tid = args.binds[0];
            let kw = registry.require(key_tid)?.slot_width();
            match map::min_key(&v[0], key_tid, registry, heap)? {
                Some(bytes) => {
                    let mut out = vec![1u8];
                    out.extend_from_slice(bytes);
                    out
                }
                None => {
                    let mut out = vec![0u8];
                    out.extend(std::iter::repeat(0u8).take(kw));
                    out
                }
            }
        }
        "s_map_max_key" => {
            let key_tid = args.binds[0];
            let kw = registry.require(key_tid)?.slot_width();
            match map::max_key(&v[0], key_tid, registry, heap)? {
                Some(bytes) => {
                    let mut out = vec![1u8];
                    out.extend_from_slice(bytes);
                    out
                }
                None => {
                    let mut out = vec![0u8];
                    out.extend(std::iter::repeat(0u8).take(kw));
                    out
                }
            }
        }
        "s_map_entries" => {
            let (key_tid, val_tid, entry_tid, list_tid) = (args.binds[0], args.binds[1], args.binds[2], args.binds[3]);
            let flat = map::entries(&v[0], key_tid, val_tid, registry, heap)?;
            list::build(&flat, entry_tid, list_tid, heap, registry)?.to_vec()
        }
        "s_map_has" => {
            if map::has(&v[0], &v[1], args.binds[0], args.binds[1], registry, heap)? {
                vec![1]
            } else {
                vec![0]
            }
        }
        "s_map_get" => map::get(&v[0], &v[1], args.binds[0], args.binds[1], registry, heap)?.to_vec(),
        "s_map_set" => {
            let (key_tid, val_tid, map_tid) = (args.binds[0], args.binds[1], args.binds[2]);
            map::set(&v[0], &v[1], &v[2], key_tid, val_tid, map_tid, heap, registry)?.to_vec()
        }
        "s_map_add" => {
            let (key_tid, val_tid, map_tid) = (args.binds[0], args.binds[1], args.binds[2]);
            map::add(&v[0], &v[1], &v[2], key_tid, val_tid, map_tid, heap, registry)?.to_vec()
        }
        "s_map_remove" => {
            let (key_tid, val_tid, map_tid) = (args.binds[0], args.binds[1], args.binds[2]);
            map::remove(&v[0], &v[1], key_tid, val_tid, map_tid, heap, registry)?.to_vec()
        }
        "s_map_union_fast" => {
            let (key_tid, val_tid, map_tid) = (args.binds[0], args.binds[1], args.binds[2]);
            map::union_fast(&v[0], &v[1], key_tid, val_tid, map_tid, heap, registry)?.to_vec()
        }

        // --- DateTime-family constructors: pack integer fields into a
        // fixed-width little-endian struct, one field per argument, in
        // declared order (spec §3 well-known register types).
        tag if tag.starts_with("datetime_") || tag.starts_with("calendar_") => {
            let mut out = Vec::with_capacity(v.iter().map(|b| b.len()).sum());
            for field in v {
                out.extend_from_slice(field);
            }
            out
        }

        _ => return Err(FatalReason::UnknownOpcodeTag(tag.to_string()).into()),
    })
}

/// True when `tid` is one of the reserved numeric well-known types, used by
/// the dispatcher when it needs to decide a narrowing tag's representation
/// without a bind list.
pub fn is_numeric(tid: TypeId) -> bool {
    matches!(
        tid,
        well_known::NAT | well_known::INT | well_known::BIG_NAT | well_known::BIG_INT | well_known::FLOAT | well_known::DECIMAL
    )
}
