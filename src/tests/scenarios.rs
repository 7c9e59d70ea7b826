//! End-to-end scenarios: small hand-built programs driven through
//! [`crate::evaluator::run`], one per named scenario below.

use crate::config::VmConfig;
use crate::consts::well_known;
use crate::error::{FatalReason, VmError};
use crate::evaluator;
use crate::program::{
    ArgKind, ArgRef, BodyInvocation, ConstDecl, ConstPool, FieldKey, FieldShape, FieldUpdate, InterpOp, InvocationDecl, Opcode,
    ParamInfo, Program, SourceInfo, TargetVar,
};
use crate::types::{Category, SizeInfo, StructShape, TupleLayout, TypeDescriptor, TypeRegistry, UnionLayout};

fn op(o: InterpOp, ssrc: &str) -> Opcode {
    Opcode { op: o, sinfo: SourceInfo { line: 1, column: 1 }, ssrc: ssrc.into() }
}

fn local(offset: u32) -> ArgRef {
    ArgRef { kind: ArgKind::Local, location: offset }
}

fn constant(idx: u32) -> ArgRef {
    ArgRef { kind: ArgKind::Constant, location: idx }
}

fn int_const(buffer: &mut Vec<u8>, decls: &mut Vec<ConstDecl>, value: i64) -> u32 {
    let idx = decls.len() as u32;
    let offset = buffer.len() as u32;
    buffer.extend_from_slice(&(value as u64).to_le_bytes());
    decls.push(ConstDecl { ttype: well_known::INT, offset, len: 8 });
    idx
}

fn int_desc() -> TypeDescriptor {
    TypeDescriptor {
        tid: well_known::INT,
        name: "Int".into(),
        category: Category::Register,
        size_info: SizeInfo { heap_size: 8, inline_size: 8, assign_size: 8 },
        heap_mask: Default::default(),
        inline_mask: Default::default(),
        vtable: Vec::new(),
        key_comparable: true,
        boxed_envelope: None,
    }
}

fn bool_desc() -> TypeDescriptor {
    TypeDescriptor {
        tid: well_known::BOOL,
        name: "Bool".into(),
        category: Category::Register,
        size_info: SizeInfo { heap_size: 1, inline_size: 1, assign_size: 1 },
        heap_mask: Default::default(),
        inline_mask: Default::default(),
        vtable: Vec::new(),
        key_comparable: true,
        boxed_envelope: None,
    }
}

// --- S1: arithmetic & control — f(3, 4) = 3 + 4 * 2, expect 11 ---

#[test]
fn s1_arithmetic_and_control_calls_a_function_and_returns_its_result() {
    let registry = TypeRegistry::new([int_desc()]);

    let mut buffer = Vec::new();
    let mut decls = Vec::new();
    let c3 = int_const(&mut buffer, &mut decls, 3);
    let c4 = int_const(&mut buffer, &mut decls, 4);
    let c2 = int_const(&mut buffer, &mut decls, 2);
    let const_pool = ConstPool::new(decls, buffer);

    // main: a = 3; b = 4; result = f(a, b); return result
    let main = BodyInvocation {
        name: "main".into(),
        stack_bytes: 24,
        mask_slots: 0,
        params: vec![],
        result_type: well_known::INT,
        result_offset: 16,
        body: vec![
            op(InterpOp::LoadConst { dst: TargetVar { offset: 0 }, const_ref: c3, ttype: well_known::INT }, "a = 3"),
            op(InterpOp::LoadConst { dst: TargetVar { offset: 8 }, const_ref: c4, ttype: well_known::INT }, "b = 4"),
            op(
                InterpOp::Invoke {
                    trgt: TargetVar { offset: 16 },
                    invoke_id: 1,
                    args: vec![local(0), local(8)],
                    sguard: None,
                    optmask_offset: None,
                    virtual_dispatch: false,
                },
                "result = f(a, b)",
            ),
            op(InterpOp::ReturnAssign { dst: TargetVar { offset: 16 }, src: local(16) }, "return result"),
        ],
    };

    // f(a, b): tmp = b * 2; return a + tmp
    let f = BodyInvocation {
        name: "f".into(),
        stack_bytes: 32,
        mask_slots: 0,
        params: vec![
            ParamInfo { ptype: well_known::INT, frame_offset: 0, is_optional: false },
            ParamInfo { ptype: well_known::INT, frame_offset: 8, is_optional: false },
        ],
        result_type: well_known::INT,
        result_offset: 24,
        body: vec![
            op(
                InterpOp::CheckedArith {
                    dst: TargetVar { offset: 16 },
                    op: crate::program::CheckedArithOp::Mul,
                    ttype: well_known::INT,
                    lhs: local(8),
                    rhs: Some(constant(c2)),
                },
                "tmp = b * 2",
            ),
            op(
                InterpOp::CheckedArith {
                    dst: TargetVar { offset: 24 },
                    op: crate::program::CheckedArithOp::Add,
                    ttype: well_known::INT,
                    lhs: local(0),
                    rhs: Some(local(16)),
                },
                "a + tmp",
            ),
            op(InterpOp::ReturnAssign { dst: TargetVar { offset: 24 }, src: local(24) }, "return a + tmp"),
        ],
    };

    let program = Program::new(
        registry,
        vec![InvocationDecl::Body(main), InvocationDecl::Body(f)],
        const_pool,
        vec![],
        0,
    );

    let (result_type, bytes) = evaluator::run(&program, VmConfig::default()).expect("program runs to completion");
    assert_eq!(result_type, well_known::INT);
    let value = i64::from_le_bytes(bytes.try_into().unwrap());
    assert_eq!(value, 11);
}

// --- S2: tuple project + update ---
//
// Start from tuple (1, 2, 3) : [Int, Int, Int]. Load field 1 (unused past
// exercising the opcode), update field 2 to 9, then check both that the
// updated tuple reads 9 at field 2 and that the original tuple's field 2 is
// still 3 — folded into one Int return (`original * 100 + updated`, i.e.
// `3 * 100 + 9 = 309`) since a program can only return one value.

const TUPLE_TID: u32 = well_known::FIRST_USER_TYPE_ID;

fn tuple_desc() -> TypeDescriptor {
    TypeDescriptor {
        tid: TUPLE_TID,
        name: "(Int, Int, Int)".into(),
        category: Category::Struct(StructShape::Tuple(TupleLayout {
            max_index: 2,
            ttypes: vec![well_known::INT, well_known::INT, well_known::INT],
            idx_offsets: vec![0, 8, 16],
        })),
        size_info: SizeInfo { heap_size: 24, inline_size: 24, assign_size: 24 },
        heap_mask: Default::default(),
        inline_mask: Default::default(),
        vtable: Vec::new(),
        key_comparable: false,
        boxed_envelope: None,
    }
}

fn tuple_field(index: u32, offset: u32) -> FieldKey {
    FieldKey { key: index, offset, ttype: well_known::INT }
}

#[test]
fn s2_tuple_project_and_update_leaves_the_original_tuple_untouched() {
    let registry = TypeRegistry::new([int_desc(), tuple_desc()]);

    let mut buffer = Vec::new();
    let mut decls = Vec::new();
    let c1 = int_const(&mut buffer, &mut decls, 1);
    let c2v = int_const(&mut buffer, &mut decls, 2);
    let c3 = int_const(&mut buffer, &mut decls, 3);
    let c9 = int_const(&mut buffer, &mut decls, 9);
    let c100 = int_const(&mut buffer, &mut decls, 100);
    let const_pool = ConstPool::new(decls, buffer);

    let main = BodyInvocation {
        name: "main".into(),
        stack_bytes: 88,
        mask_slots: 0,
        params: vec![],
        result_type: well_known::INT,
        result_offset: 80,
        body: vec![
            // tuple0 @ 0..24 = (1, 2, 3)
            op(
                InterpOp::Constructor {
                    shape: FieldShape::Tuple,
                    trgt: TargetVar { offset: 0 },
                    oftype: TUPLE_TID,
                    args: vec![constant(c1), constant(c2v), constant(c3)],
                    from_ephemeral: false,
                },
                "tuple0 = (1, 2, 3)",
            ),
            // field 1 of tuple0, read directly (exercises LoadField, unused downstream)
            op(
                InterpOp::LoadField {
                    shape: FieldShape::Tuple,
                    dst: TargetVar { offset: 24 },
                    arg: local(0),
                    arg_type: TUPLE_TID,
                    field: tuple_field(1, 8),
                    virtual_access: false,
                    set_guard: None,
                },
                "tuple0[1]",
            ),
            // tuple1 @ 32..56 = tuple0 with field 2 set to 9
            op(
                InterpOp::Update {
                    shape: FieldShape::Tuple,
                    trgt: TargetVar { offset: 32 },
                    trgt_type: TUPLE_TID,
                    arg: local(0),
                    arg_type: TUPLE_TID,
                    updates: vec![FieldUpdate { field: tuple_field(2, 16), value: constant(c9) }],
                },
                "tuple1 = tuple0 with [2] = 9",
            ),
            // updated @ 56 = tuple1[2]   (expect 9)
            op(
                InterpOp::LoadField {
                    shape: FieldShape::Tuple,
                    dst: TargetVar { offset: 56 },
                    arg: local(32),
                    arg_type: TUPLE_TID,
                    field: tuple_field(2, 16),
                    virtual_access: false,
                    set_guard: None,
                },
                "updated = tuple1[2]",
            ),
            // original @ 64 = tuple0[2]  (expect still 3)
            op(
                InterpOp::LoadField {
                    shape: FieldShape::Tuple,
                    dst: TargetVar { offset: 64 },
                    arg: local(0),
                    arg_type: TUPLE_TID,
                    field: tuple_field(2, 16),
                    virtual_access: false,
                    set_guard: None,
                },
                "original = tuple0[2]",
            ),
            op(
                InterpOp::CheckedArith {
                    dst: TargetVar { offset: 72 },
                    op: crate::program::CheckedArithOp::Mul,
                    ttype: well_known::INT,
                    lhs: local(64),
                    rhs: Some(constant(c100)),
                },
                "original * 100",
            ),
            op(
                InterpOp::CheckedArith {
                    dst: TargetVar { offset: 80 },
                    op: crate::program::CheckedArithOp::Add,
                    ttype: well_known::INT,
                    lhs: local(72),
                    rhs: Some(local(56)),
                },
                "+ updated",
            ),
            op(InterpOp::ReturnAssign { dst: TargetVar { offset: 80 }, src: local(80) }, "return"),
        ],
    };

    let program = Program::new(registry, vec![InvocationDecl::Body(main)], const_pool, vec![], 0);

    let (result_type, bytes) = evaluator::run(&program, VmConfig::default()).expect("program runs to completion");
    assert_eq!(result_type, well_known::INT);
    let value = i64::from_le_bytes(bytes.try_into().unwrap());
    assert_eq!(value, 309, "original tuple field must read 3 (x100) and updated tuple field must read 9");
}

// --- S3: union narrowing on None ---

const UNION_TID: u32 = well_known::FIRST_USER_TYPE_ID + 1;

fn union_desc() -> TypeDescriptor {
    TypeDescriptor {
        tid: UNION_TID,
        name: "Int | None".into(),
        category: Category::UnionInline(UnionLayout { subtypes: vec![well_known::INT] }),
        size_info: SizeInfo { heap_size: 8, inline_size: 8, assign_size: 8 },
        heap_mask: Default::default(),
        inline_mask: Default::default(),
        vtable: Vec::new(),
        key_comparable: false,
        boxed_envelope: None,
    }
}

#[test]
fn s3_is_none_is_true_for_a_freshly_initialized_union() {
    let registry = TypeRegistry::new([int_desc(), bool_desc(), union_desc()]);
    let const_pool = ConstPool::new(vec![], vec![]);

    let main = BodyInvocation {
        name: "main".into(),
        stack_bytes: 17,
        mask_slots: 0,
        params: vec![],
        result_type: well_known::BOOL,
        result_offset: 16,
        body: vec![
            op(InterpOp::NoneInitUnion { dst: TargetVar { offset: 0 }, union_type: UNION_TID }, "u = None"),
            op(InterpOp::IsNone { dst: TargetVar { offset: 16 }, arg: local(0) }, "isNone(u)"),
            op(InterpOp::ReturnAssign { dst: TargetVar { offset: 16 }, src: local(16) }, "return isNone(u)"),
        ],
    };

    let program = Program::new(registry, vec![InvocationDecl::Body(main)], const_pool, vec![], 0);

    let (result_type, bytes) = evaluator::run(&program, VmConfig::default()).expect("program runs to completion");
    assert_eq!(result_type, well_known::BOOL);
    assert_eq!(bytes[0], 1, "IsNone must report true for a freshly None-initialized union");
}

#[test]
fn s3_extract_on_a_none_union_aborts_via_the_invariant_violation_path() {
    let registry = TypeRegistry::new([int_desc(), union_desc()]);
    let const_pool = ConstPool::new(vec![], vec![]);

    let main = BodyInvocation {
        name: "main".into(),
        stack_bytes: 24,
        mask_slots: 0,
        params: vec![],
        result_type: well_known::INT,
        result_offset: 16,
        body: vec![
            op(InterpOp::NoneInitUnion { dst: TargetVar { offset: 0 }, union_type: UNION_TID }, "u = None"),
            op(
                InterpOp::Extract {
                    dst: TargetVar { offset: 16 },
                    into: well_known::INT,
                    src: local(0),
                    from: UNION_TID,
                    sguard: None,
                },
                "extract(Int, u)",
            ),
            op(InterpOp::ReturnAssign { dst: TargetVar { offset: 16 }, src: local(16) }, "return"),
        ],
    };

    let program = Program::new(registry, vec![InvocationDecl::Body(main)], const_pool, vec![], 0);

    let err = evaluator::run(&program, VmConfig::default()).expect_err("extracting Int out of a None union must fail");
    match err {
        VmError::Fatal(FatalReason::UnionNarrowingFailed) => {}
        other => panic!("expected UnionNarrowingFailed, got {other:?}"),
    }
}

// --- S4 / S5: list and map pipelines ---
//
// Neither `map`/`filter`/`reduce` (S4) nor the map round-trip operations
// (S5) are exposed as bytecode-level `Builtin`/primitive-invocation tags —
// `collections::list`/`collections::map`'s higher-order helpers take plain
// Rust closures (the callback is a bytecode invocation only the evaluator
// can dispatch; these modules just supply the data-structure mechanics).
// These scenarios drive the same operations directly against a real
// `Heap`, which is exactly how the evaluator's own `Builtin` dispatch would
// use them.

const LIST_TID: u32 = well_known::FIRST_USER_TYPE_ID + 2;
const MAP_TID: u32 = well_known::FIRST_USER_TYPE_ID + 3;

fn list_desc() -> TypeDescriptor {
    TypeDescriptor {
        tid: LIST_TID,
        name: "List<Int>".into(),
        category: Category::Collection,
        size_info: SizeInfo {
            heap_size: crate::gc::collection_layout::min_heap_size_for_list(8) as u32,
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

fn map_desc() -> TypeDescriptor {
    TypeDescriptor {
        tid: MAP_TID,
        name: "Map<Int, Int>".into(),
        category: Category::Collection,
        size_info: SizeInfo {
            heap_size: crate::gc::collection_layout::min_heap_size_for_map(8, 8) as u32,
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

fn int_bytes(v: i64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

fn int_of(bytes: &[u8]) -> i64 {
    i64::from_le_bytes(bytes[..8].try_into().unwrap())
}

#[test]
fn s4_list_pipeline_range_map_filter_reduce() {
    use crate::collections::list;

    let registry = TypeRegistry::new([int_desc(), list_desc()]);
    let mut heap = crate::gc::Heap::new(VmConfig::default());

    let nums = list::range(1, 7, 1, LIST_TID, well_known::INT, &mut heap, &registry).expect("range builds");
    let doubled =
        list::map(&nums, well_known::INT, well_known::INT, LIST_TID, &mut heap, &registry, |b, _h| Ok(int_bytes(int_of(b) * 2)))
            .expect("map succeeds");
    let at_most_ten = list::filter_pred(&doubled, well_known::INT, LIST_TID, &mut heap, &registry, |b, _h| Ok(int_of(b) <= 10))
        .expect("filter succeeds");
    let total = list::reduce(&at_most_ten, well_known::INT, &registry, &heap, int_bytes(0), |acc, elem, _h| {
        Ok(int_bytes(int_of(acc) + int_of(elem)))
    })
    .expect("reduce succeeds");

    assert_eq!(int_of(&total), 30, "[2,4,6,8,10] (doubled 1..6, capped at 10) sums to 30");
}

#[test]
fn s5_map_round_trip_add_entries_min_max_get_remove_has_count() {
    use crate::collections::map;

    let registry = TypeRegistry::new([int_desc(), map_desc()]);
    let mut heap = crate::gc::Heap::new(VmConfig::default());

    let mut slot = map::empty();
    for (k, v) in [(3i64, 30i64), (1, 10), (2, 20)] {
        slot = map::add(&slot, &int_bytes(k), &int_bytes(v), well_known::INT, well_known::INT, MAP_TID, &mut heap, &registry)
            .expect("add succeeds");
    }

    assert_eq!(map::count(&slot, &heap), 3);
    assert!(map::has(&slot, &int_bytes(1), well_known::INT, well_known::INT, &registry, &heap).unwrap());
    assert_eq!(
        int_of(map::get(&slot, &int_bytes(2), well_known::INT, well_known::INT, &registry, &heap).unwrap()),
        20
    );
    assert_eq!(int_of(map::min_key(&slot, well_known::INT, &registry, &heap).unwrap().unwrap()), 1);
    assert_eq!(int_of(map::max_key(&slot, well_known::INT, &registry, &heap).unwrap().unwrap()), 3);

    let removed = map::remove(&slot, &int_bytes(2), well_known::INT, well_known::INT, MAP_TID, &mut heap, &registry).expect("remove succeeds");
    assert_eq!(map::count(&removed, &heap), 2);
    assert!(!map::has(&removed, &int_bytes(2), well_known::INT, well_known::INT, &registry, &heap).unwrap());
    assert!(map::has(&removed, &int_bytes(1), well_known::INT, well_known::INT, &registry, &heap).unwrap());
    assert!(map::has(&removed, &int_bytes(3), well_known::INT, well_known::INT, &registry, &heap).unwrap());
}

// --- S6: GC correctness (scaled down from the scenario's 1M tuples) ---
//
// Allocates a generation's worth of tuples, ties a survivor fraction into
// roots, forces a young collection, and checks every retained value's
// payload is still intact post-collection (spec §8 "retain every 10th").

#[test]
fn s6_gc_retains_rooted_objects_across_a_young_collection() {
    use crate::gc::{collect_young, Heap, HeapAddr, RootSet};

    const N: usize = 2000;

    let registry = TypeRegistry::new([tuple_desc()]);
    let mut heap = Heap::new(VmConfig::default());
    let mut roots = RootSet::new();
    let mut retained: Vec<(HeapAddr, i64)> = Vec::new();

    for i in 0..N {
        let addr = heap.allocate(TUPLE_TID, &registry).expect("allocation succeeds");
        let payload = (i as i64, i as i64 * 2, i as i64 * 3);
        {
            let bytes = heap.bytes_at_mut(addr);
            bytes[0..8].copy_from_slice(&payload.0.to_le_bytes());
            bytes[8..16].copy_from_slice(&payload.1.to_le_bytes());
            bytes[16..24].copy_from_slice(&payload.2.to_le_bytes());
        }
        // Skip `i == 0`: its address can pack to all-zero bits (page 0,
        // slot 0), the same sentinel `RootSet::push`/`DecrementQueue::enqueue`
        // treat as "absent" — rooting it would be silently ignored.
        if i % 10 == 5 {
            roots.push(addr);
            retained.push((addr, payload.0));
        }
    }

    let stats = collect_young(&mut heap, &registry, &mut roots);
    assert!(stats.objects_evacuated > 0, "a young collection with live roots must evacuate something");

    for (old_addr, expected_first_field) in retained {
        let current = stats.forwarded.get(&old_addr).copied().unwrap_or(old_addr);
        let bytes = heap.bytes_at(current);
        let first = i64::from_le_bytes(bytes[0..8].try_into().unwrap());
        assert_eq!(first, expected_first_field, "a rooted tuple's payload must survive collection intact");
    }
}
