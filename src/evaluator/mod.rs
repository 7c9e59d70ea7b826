//! The call-stack evaluator (spec §4.4/§6): ties [`dispatch::step`], the
//! frame stack, and the collector together into one running program.
//!
//! Mirrors the teacher's own split between a per-instruction executor
//! (`interpreter/executors/instruction.rs`) and a thin driving loop
//! (`interpreter.rs`): [`Evaluator`] owns the program, heap, and call
//! stack explicitly (Design Notes §9 — no process-wide statics) and pumps
//! `dispatch::step` until the entry invocation returns.

mod arith_ops;
mod builtins;
mod control;
mod dispatch;
mod frame;
mod guard;

pub use dispatch::StepOutcome;
pub use frame::Frame;

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::collections::{list, map};
use crate::config::VmConfig;
use crate::error::{FatalReason, VmResult};
use crate::gc::{self, DecrementQueue, Heap, HeapAddr, RootSet};
use crate::program::{ArgRef, InvocationDecl, InvokeId, PrimitiveInvocation, Program};
use crate::types::{TypeId, TypeRegistry};

/// Owns everything one running program needs: the loaded program, the
/// heap, pending GC bookkeeping, and the live call stack.
pub struct Evaluator<'p> {
    program: &'p Program,
    heap: Heap,
    roots: RootSet,
    decrements: DecrementQueue,
    call_stack: Vec<Frame>,
}

impl<'p> Evaluator<'p> {
    /// Build an evaluator for `program` under `config`.
    pub fn new(program: &'p Program, config: VmConfig) -> Self {
        Evaluator {
            program,
            heap: Heap::new(config),
            roots: RootSet::new(),
            decrements: DecrementQueue::new(),
            call_stack: Vec::new(),
        }
    }

    /// Run the program's declared entry point with no arguments, returning
    /// its result bytes and declared result type.
    pub fn run(&mut self) -> VmResult<(TypeId, Vec<u8>)> {
        let entry = self.program.primary_entry();
        self.call(entry, &[])
    }

    /// Borrow the heap, for embedders that want to inspect state after a
    /// run (diagnostics, `debug_heap` dumps).
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    fn call(&mut self, invoke_id: InvokeId, args: &[Vec<u8>]) -> VmResult<(TypeId, Vec<u8>)> {
        self.call_with_mask(invoke_id, args, None)
    }

    fn call_with_mask(&mut self, invoke_id: InvokeId, args: &[Vec<u8>], seed_mask: Option<Vec<u8>>) -> VmResult<(TypeId, Vec<u8>)> {
        let program = self.program;
        let decl = program.invocation(invoke_id)?;
        trace!(invocation = decl.name(), "calling");
        match decl {
            InvocationDecl::Primitive(p) => {
                if let Some(result) = self.dispatch_hof_builtin(p, args)? {
                    return Ok(result);
                }
                let built = builtins::BuiltinArgs { values: args.to_vec(), binds: &p.binds };
                let bytes = builtins::dispatch(&p.implkey, &built, &mut self.heap, &program.registry)?;
                Ok((p.result_type, bytes))
            }
            InvocationDecl::Body(b) => {
                let mut frame = Frame::new(invoke_id, b.stack_bytes, b.mask_slots, 0, b.result_type);
                for (param, bytes) in b.params.iter().zip(args) {
                    let start = param.frame_offset as usize;
                    let end = start + bytes.len();
                    frame
                        .locals
                        .get_mut(start..end)
                        .ok_or_else(|| FatalReason::MissingMember(format!("parameter offset {start}..{end} out of range")))?
                        .copy_from_slice(bytes);
                    frame.record_type(param.frame_offset, param.ptype);
                }
                if let Some(seed) = seed_mask {
                    let n = seed.len().min(frame.mask.len());
                    frame.mask[..n].copy_from_slice(&seed[..n]);
                }
                self.call_stack.push(frame);
                let result = self.run_frame();
                self.call_stack.pop();
                result
            }
        }
    }

    /// Intercepts the list/map higher-order built-ins (`s_list_map`,
    /// `s_list_filter_pred`, `s_list_reduce`, `s_list_transduce`,
    /// `s_map_submap`, `s_map_remap`, ...) before falling through to the
    /// ordinary leaf dispatch in [`builtins::dispatch`]: their callback is
    /// itself a bytecode invocation, and only the evaluator — not the leaf
    /// `builtins` module, which has no `&mut self` to call back through —
    /// can drive it. The callback's `InvokeId` rides as a trailing 8-byte
    /// little-endian value argument (the same width every other scalar
    /// argument already uses), so the wire schema needs no dedicated field
    /// for it. Returns `None` for any tag this evaluator doesn't own, so
    /// the caller can fall back to the ordinary dispatch path.
    fn dispatch_hof_builtin(&mut self, p: &PrimitiveInvocation, args: &[Vec<u8>]) -> VmResult<Option<(TypeId, Vec<u8>)>> {
        let program = self.program;
        let registry = &program.registry;
        let tag = p.implkey.as_str();

        Ok(Some(match tag {
            "s_list_map" => {
                let (elem_tid, out_tid, out_list_tid) = (p.binds[0], p.binds[1], p.binds[2]);
                let cb = invoke_id_arg(&args[1]);
                let width = registry.require(elem_tid)?.slot_width();
                let flat = list::flatten(&args[0], elem_tid, registry, &self.heap)?;
                let mut out = Vec::new();
                for chunk in flat.chunks(width) {
                    let (_, bytes) = self.call(cb, &[chunk.to_vec()])?;
                    out.extend(bytes);
                }
                let slot = list::build(&out, out_tid, out_list_tid, &mut self.heap, registry)?;
                (p.result_type, slot.to_vec())
            }
            "s_list_map_idx" => {
                let (elem_tid, out_tid, out_list_tid) = (p.binds[0], p.binds[1], p.binds[2]);
                let cb = invoke_id_arg(&args[1]);
                let width = registry.require(elem_tid)?.slot_width();
                let flat = list::flatten(&args[0], elem_tid, registry, &self.heap)?;
                let mut out = Vec::new();
                for (i, chunk) in flat.chunks(width).enumerate() {
                    let (_, bytes) = self.call(cb, &[(i as u64).to_le_bytes().to_vec(), chunk.to_vec()])?;
                    out.extend(bytes);
                }
                let slot = list::build(&out, out_tid, out_list_tid, &mut self.heap, registry)?;
                (p.result_type, slot.to_vec())
            }
            "s_list_map_sync" => {
                let (elem_tid, other_elem_tid, out_tid, out_list_tid) = (p.binds[0], p.binds[1], p.binds[2], p.binds[3]);
                let cb = invoke_id_arg(&args[2]);
                let wa = registry.require(elem_tid)?.slot_width();
                let wb = registry.require(other_elem_tid)?.slot_width();
                let fa = list::flatten(&args[0], elem_tid, registry, &self.heap)?;
                let fb = list::flatten(&args[1], other_elem_tid, registry, &self.heap)?;
                let mut out = Vec::new();
                for (ca, cb_chunk) in fa.chunks(wa).zip(fb.chunks(wb)) {
                    let (_, bytes) = self.call(cb, &[ca.to_vec(), cb_chunk.to_vec()])?;
                    out.extend(bytes);
                }
                let slot = list::build(&out, out_tid, out_list_tid, &mut self.heap, registry)?;
                (p.result_type, slot.to_vec())
            }
            "s_list_filter_pred" => {
                let (elem_tid, list_tid) = (p.binds[0], p.binds[1]);
                let cb = invoke_id_arg(&args[1]);
                let width = registry.require(elem_tid)?.slot_width();
                let flat = list::flatten(&args[0], elem_tid, registry, &self.heap)?;
                let mut out = Vec::new();
                for chunk in flat.chunks(width) {
                    let (_, kept) = self.call(cb, &[chunk.to_vec()])?;
                    if kept.first().copied().unwrap_or(0) != 0 {
                        out.extend_from_slice(chunk);
                    }
                }
                let slot = list::build(&out, elem_tid, list_tid, &mut self.heap, registry)?;
                (p.result_type, slot.to_vec())
            }
            "s_list_filter_pred_idx" => {
                let (elem_tid, list_tid) = (p.binds[0], p.binds[1]);
                let cb = invoke_id_arg(&args[1]);
                let width = registry.require(elem_tid)?.slot_width();
                let flat = list::flatten(&args[0], elem_tid, registry, &self.heap)?;
                let mut out = Vec::new();
                for (i, chunk) in flat.chunks(width).enumerate() {
                    let (_, kept) = self.call(cb, &[(i as u64).to_le_bytes().to_vec(), chunk.to_vec()])?;
                    if kept.first().copied().unwrap_or(0) != 0 {
                        out.extend_from_slice(chunk);
                    }
                }
                let slot = list::build(&out, elem_tid, list_tid, &mut self.heap, registry)?;
                (p.result_type, slot.to_vec())
            }
            "s_list_filter_map" => {
                let (elem_tid, out_tid, out_list_tid) = (p.binds[0], p.binds[1], p.binds[2]);
                let pred_cb = invoke_id_arg(&args[1]);
                let map_cb = invoke_id_arg(&args[2]);
                let width = registry.require(elem_tid)?.slot_width();
                let flat = list::flatten(&args[0], elem_tid, registry, &self.heap)?;
                let mut out = Vec::new();
                for chunk in flat.chunks(width) {
                    let (_, kept) = self.call(pred_cb, &[chunk.to_vec()])?;
                    if kept.first().copied().unwrap_or(0) != 0 {
                        let (_, mapped) = self.call(map_cb, &[chunk.to_vec()])?;
                        out.extend(mapped);
                    }
                }
                let slot = list::build(&out, out_tid, out_list_tid, &mut self.heap, registry)?;
                (p.result_type, slot.to_vec())
            }
            "s_list_reduce" => {
                let elem_tid = p.binds[0];
                let cb = invoke_id_arg(&args[2]);
                let width = registry.require(elem_tid)?.slot_width();
                let flat = list::flatten(&args[0], elem_tid, registry, &self.heap)?;
                let mut acc = args[1].clone();
                for chunk in flat.chunks(width) {
                    let (_, next) = self.call(cb, &[acc, chunk.to_vec()])?;
                    acc = next;
                }
                (p.result_type, acc)
            }
            "s_list_reduce_idx" => {
                let elem_tid = p.binds[0];
                let cb = invoke_id_arg(&args[2]);
                let width = registry.require(elem_tid)?.slot_width();
                let flat = list::flatten(&args[0], elem_tid, registry, &self.heap)?;
                let mut acc = args[1].clone();
                for (i, chunk) in flat.chunks(width).enumerate() {
                    let (_, next) = self.call(cb, &[(i as u64).to_le_bytes().to_vec(), acc, chunk.to_vec()])?;
                    acc = next;
                }
                (p.result_type, acc)
            }
            "s_list_transduce" | "s_list_transduce_idx" => {
                let (elem_tid, env_tid, out_tid, out_list_tid) = (p.binds[0], p.binds[1], p.binds[2], p.binds[3]);
                let cb = invoke_id_arg(&args[2]);
                let elem_width = registry.require(elem_tid)?.slot_width();
                let env_width = registry.require(env_tid)?.slot_width();
                let out_width = registry.require(out_tid)?.slot_width();
                let flat = list::flatten(&args[0], elem_tid, registry, &self.heap)?;
                let mut env = args[1].clone();
                let mut emitted = Vec::new();
                let with_idx = tag == "s_list_transduce_idx";
                for (i, chunk) in flat.chunks(elem_width).enumerate() {
                    let (_, step) = if with_idx {
                        self.call(cb, &[(i as u64).to_le_bytes().to_vec(), env, chunk.to_vec()])?
                    } else {
                        self.call(cb, &[env, chunk.to_vec()])?
                    };
                    if step.len() != env_width + 1 + out_width {
                        return Err(FatalReason::CorruptMetadata(step.len() as u64).into());
                    }
                    env = step[..env_width].to_vec();
                    if step[env_width] != 0 {
                        emitted.extend_from_slice(&step[env_width + 1..]);
                    }
                }
                let slot = list::build(&emitted, out_tid, out_list_tid, &mut self.heap, registry)?;
                let mut out = env;
                out.extend_from_slice(&slot);
                (p.result_type, out)
            }
            "s_list_has_pred" => {
                let elem_tid = p.binds[0];
                let cb = invoke_id_arg(&args[1]);
                let width = registry.require(elem_tid)?.slot_width();
                let flat = list::flatten(&args[0], elem_tid, registry, &self.heap)?;
                let mut found = false;
                for chunk in flat.chunks(width) {
                    let (_, hit) = self.call(cb, &[chunk.to_vec()])?;
                    if hit.first().copied().unwrap_or(0) != 0 {
                        found = true;
                        break;
                    }
                }
                (p.result_type, vec![found as u8])
            }
            "s_list_find_pred" | "s_list_find_pred_last" => {
                let elem_tid = p.binds[0];
                let cb = invoke_id_arg(&args[1]);
                let width = registry.require(elem_tid)?.slot_width();
                let flat = list::flatten(&args[0], elem_tid, registry, &self.heap)?;
                let mut found: Option<u64> = None;
                for (i, chunk) in flat.chunks(width).enumerate() {
                    let (_, hit) = self.call(cb, &[chunk.to_vec()])?;
                    if hit.first().copied().unwrap_or(0) != 0 {
                        found = Some(i as u64);
                        if tag == "s_list_find_pred" {
                            break;
                        }
                    }
                }
                let bytes = found.map(|i| i as i64).unwrap_or(-1i64) as u64;
                (p.result_type, bytes.to_le_bytes().to_vec())
            }
            "s_map_submap" => {
                let (key_tid, val_tid, map_tid) = (p.binds[0], p.binds[1], p.binds[2]);
                let cb = invoke_id_arg(&args[1]);
                let (kw, vw) = (registry.require(key_tid)?.slot_width(), registry.require(val_tid)?.slot_width());
                let rec = kw + vw;
                let flat = map::entries(&args[0], key_tid, val_tid, registry, &self.heap)?;
                let mut out = Vec::new();
                for chunk in flat.chunks(rec) {
                    let (_, kept) = self.call(cb, &[chunk[..kw].to_vec()])?;
                    if kept.first().copied().unwrap_or(0) != 0 {
                        out.extend_from_slice(chunk);
                    }
                }
                let slot = map::build_sorted(&out, key_tid, val_tid, map_tid, &mut self.heap, registry)?;
                (p.result_type, slot.to_vec())
            }
            "s_map_remap" => {
                let (key_tid, val_tid, out_val_tid, map_tid) = (p.binds[0], p.binds[1], p.binds[2], p.binds[3]);
                let cb = invoke_id_arg(&args[1]);
                let (kw, vw) = (registry.require(key_tid)?.slot_width(), registry.require(val_tid)?.slot_width());
                let rec = kw + vw;
                let flat = map::entries(&args[0], key_tid, val_tid, registry, &self.heap)?;
                let mut out = Vec::new();
                for chunk in flat.chunks(rec) {
                    out.extend_from_slice(&chunk[..kw]);
                    let (_, mapped) = self.call(cb, &[chunk[..kw].to_vec(), chunk[kw..].to_vec()])?;
                    out.extend(mapped);
                }
                let slot = map::build_sorted(&out, key_tid, out_val_tid, map_tid, &mut self.heap, registry)?;
                (p.result_type, slot.to_vec())
            }
            _ => return Ok(None),
        }))
    }

    /// Pump `dispatch::step` over the top frame until it returns or a
    /// nested call needs to be driven.
    fn run_frame(&mut self) -> VmResult<(TypeId, Vec<u8>)> {
        loop {
            self.maybe_collect();

            let program = self.program;
            let frame = self.call_stack.last_mut().expect("run_frame requires a live frame");
            let decl = program.invocation(frame.invoke_id)?;
            let body = match decl {
                InvocationDecl::Body(b) => &b.body,
                InvocationDecl::Primitive(_) => {
                    return Err(FatalReason::MissingMember("primitive invocation reached the opcode loop".into()).into());
                }
            };
            let op = body
                .get(frame.ip)
                .ok_or_else(|| FatalReason::MissingMember(format!("ip {} past end of body in {}", frame.ip, decl.name())))?;

            let outcome = dispatch::step(op, frame, &program.const_pool, &mut self.heap, &program.registry)?;

            match outcome {
                StepOutcome::Next => {
                    self.call_stack.last_mut().expect("frame still live after step").ip += 1;
                }
                StepOutcome::Goto(ip) => {
                    self.call_stack.last_mut().expect("frame still live after step").ip = ip;
                }
                StepOutcome::Invoke { invoke_id, args, trgt_offset, optmask_offset, virtual_dispatch } => {
                    self.dispatch_invoke(invoke_id, &args, trgt_offset, optmask_offset, virtual_dispatch)?;
                }
                StepOutcome::Return { result_type, bytes } => {
                    let frame = self.call_stack.pop().expect("frame still live");
                    self.enqueue_frame_decrements(&frame);
                    self.call_stack.push(frame);
                    return Ok((result_type, bytes));
                }
            }
        }
    }

    /// Resolve and run a nested `Invoke`, delivering its result back into
    /// the caller's frame at `trgt_offset`.
    fn dispatch_invoke(
        &mut self,
        invoke_id: InvokeId,
        args: &[ArgRef],
        trgt_offset: u32,
        optmask_offset: Option<u32>,
        virtual_dispatch: bool,
    ) -> VmResult<()> {
        let program = self.program;

        let resolved_id = if virtual_dispatch {
            let frame = self.call_stack.last().expect("live caller frame");
            self.resolve_virtual(invoke_id, args, frame)?
        } else {
            invoke_id
        };

        let decl = program.invocation(resolved_id)?;
        let params = decl.params();
        let mut call_args = Vec::with_capacity(params.len());
        {
            let frame = self.call_stack.last().expect("live caller frame");
            for (p, a) in params.iter().zip(args) {
                let width = crate::value::store_width(p.ptype, &program.registry)?;
                call_args.push(control::arg_bytes(*a, width, frame, &program.const_pool)?);
            }
        }

        // The caller reserves a run of mask bits describing which optional
        // arguments it actually supplied; a callee's own optional-parameter
        // mask uses that same bit layout, so it is copied in verbatim
        // before the callee body runs. See `DESIGN.md`, Open Question
        // decisions.
        let seed_mask = optmask_offset.and_then(|mo| {
            let frame = self.call_stack.last().expect("live caller frame");
            let n = mask_byte_len(decl);
            frame.mask.get(mo as usize..mo as usize + n).map(|s| s.to_vec())
        });

        let (result_type, bytes) = self.call_with_mask(resolved_id, &call_args, seed_mask)?;

        let frame = self.call_stack.last_mut().expect("caller frame still live");
        control::op_return_assign(&bytes, result_type, frame, trgt_offset)?;
        frame.ip += 1;
        Ok(())
    }

    /// Resolve a virtual `Invoke`'s target: `invoke_id` names a slot in the
    /// receiver's runtime type's `vtable` rather than a concrete
    /// invocation directly, per `TypeDescriptor::vtable`'s own doc comment
    /// ("the invocation IDs resolved by runtime TypeID").
    fn resolve_virtual(&self, slot_index: InvokeId, args: &[ArgRef], frame: &Frame) -> VmResult<InvokeId> {
        let receiver = args
            .first()
            .copied()
            .ok_or_else(|| FatalReason::MissingMember("virtual invoke with no receiver argument".into()))?;
        let bytes = control::arg_bytes(receiver, crate::consts::WORD_SIZE, frame, &self.program.const_pool)?;
        let addr = HeapAddr::from_bits(u64::from_le_bytes(bytes[..8].try_into().unwrap()));
        let owning_type = self.heap.page(addr.page_index()).owning_type;
        let desc = self.program.registry.require(owning_type)?;
        desc.vtable
            .get(slot_index as usize)
            .copied()
            .ok_or_else(|| FatalReason::MissingMember(format!("no vtable slot {slot_index} on TypeID {owning_type}")).into())
    }

    /// Enqueue an old-generation decrement for every heap pointer a
    /// returning frame's locals still hold — its ownership of those roots
    /// ends the instant it's popped.
    fn enqueue_frame_decrements(&mut self, frame: &Frame) {
        for (&offset, &tid) in &frame.slot_types {
            let Ok(width) = crate::value::store_width(tid, &self.program.registry) else { continue };
            let start = offset as usize;
            let Some(bytes) = frame.locals.get(start..start + width) else { continue };
            for addr in gc::trace_value(bytes, tid, &self.program.registry) {
                if !self.heap.page(addr.page_index()).young {
                    self.decrements.enqueue(addr);
                }
            }
        }
    }

    /// Trigger a young-generation collection and a decrement-queue drain
    /// once the heap's allocation threshold trips (spec §4.1 "Collection
    /// threshold").
    fn maybe_collect(&mut self) {
        if !self.heap.should_collect() {
            return;
        }
        self.gather_roots();
        let stats = gc::collect_young(&mut self.heap, &self.program.registry, &mut self.roots);
        patch_frame_pointers(&mut self.call_stack, &self.program.registry, &stats.forwarded);
        let drain = gc::drain_decrements(&mut self.decrements, &mut self.heap, &self.program.registry);
        self.heap.reset_collection_counter();
        debug!(
            evacuated = stats.objects_evacuated,
            bytes_copied = stats.bytes_copied,
            freed = drain.objects_freed,
            "collection cycle"
        );
    }

    /// Every heap address directly reachable from a live frame's locals,
    /// per its dynamically-tracked `slot_types` (spec §4.2 "roots": "stack
    /// frame slots").
    fn gather_roots(&mut self) {
        self.roots = RootSet::new();
        for frame in &self.call_stack {
            for (&offset, &tid) in &frame.slot_types {
                let Ok(width) = crate::value::store_width(tid, &self.program.registry) else { continue };
                let start = offset as usize;
                let Some(bytes) = frame.locals.get(start..start + width) else { continue };
                for addr in gc::trace_value(bytes, tid, &self.program.registry) {
                    self.roots.push(addr);
                }
            }
        }
    }
}

/// Decode a trailing callback `InvokeId` argument, encoded as an 8-byte
/// little-endian word like any other scalar value the VM passes around.
fn invoke_id_arg(bytes: &[u8]) -> InvokeId {
    u64::from_le_bytes(bytes[..8].try_into().unwrap()) as InvokeId
}

/// Number of mask bytes an invocation declares for its own optional
/// arguments (zero for a primitive, which carries no mask).
fn mask_byte_len(decl: &InvocationDecl) -> usize {
    match decl {
        InvocationDecl::Body(b) => b.mask_slots.div_ceil(8) as usize,
        InvocationDecl::Primitive(_) => 0,
    }
}

/// After a young collection evacuates objects into the old generation,
/// rewrite every live frame's copy of any forwarded address.
///
/// `collect_young` only updates the [`RootSet`] it was handed; a frame's
/// `locals` buffer is a separate copy of the same pointer bytes, so it
/// needs its own patch pass. Each tracked slot's byte range is scanned the
/// same way `gc::collector`'s own `rewrite_pointer` scans an evacuated
/// parent's payload — a linear word-for-word replace, safe here because
/// the range scanned is exactly the slot `trace_value` already proved
/// contains only this type's own pointer words.
fn patch_frame_pointers(call_stack: &mut [Frame], registry: &TypeRegistry, forwarded: &HashMap<HeapAddr, HeapAddr>) {
    if forwarded.is_empty() {
        return;
    }
    for frame in call_stack.iter_mut() {
        let slots: Vec<(u32, TypeId)> = frame.slot_types.iter().map(|(&o, &t)| (o, t)).collect();
        for (offset, tid) in slots {
            let Ok(width) = crate::value::store_width(tid, registry) else { continue };
            let start = offset as usize;
            let end = start + width;
            let Some(slice) = frame.locals.get(start..end) else { continue };
            let addrs = gc::trace_value(slice, tid, registry);
            if addrs.is_empty() {
                continue;
            }
            let slot = &mut frame.locals[start..end];
            for addr in addrs {
                if let Some(&new_addr) = forwarded.get(&addr) {
                    rewrite_bits(slot, addr.to_bits(), new_addr.to_bits());
                }
            }
        }
    }
}

fn rewrite_bits(bytes: &mut [u8], old_bits: u64, new_bits: u64) {
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
        i += 1;
    }
}

/// Run `program`'s declared entry point to completion under `config`.
pub fn run(program: &Program, config: VmConfig) -> VmResult<(TypeId, Vec<u8>)> {
    Evaluator::new(program, config).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::load_program;

    fn minimal_main_json() -> &'static str {
        r#"{
            "typeDecls": [
                {"tid": 4, "name": "Nat", "category": "Register", "heapSize": 0, "inlineSize": 8, "assignSize": 8, "heapMask": "", "inlineMask": "1", "keyComparable": true}
            ],
            "fieldDecls": [],
            "invokeDecls": [
                {"name": "main", "params": [], "resultType": 4, "resultArg": 0, "stackBytes": 8, "maskSlots": 0,
                 "body": [
                    {"tag": "LoadConst", "sinfo": {"line": 1, "column": 1}, "ssrc": "42", "dst": {"offset": 0}, "constRef": 0, "type": 4},
                    {"tag": "ReturnAssign", "sinfo": {"line": 1, "column": 1}, "ssrc": "return 42", "dst": {"offset": 0}, "src": {"kind": "local", "location": 0}}
                 ]}
            ],
            "constDecls": [{"ttype": 4, "offset": 0, "len": 8}],
            "constPool": [42, 0, 0, 0, 0, 0, 0, 0],
            "primaryEntry": 0
        }"#
    }

    #[test]
    fn runs_a_trivial_program_to_its_return_value() {
        let program = load_program(minimal_main_json()).expect("valid blob");
        let (result_type, bytes) = run(&program, VmConfig::default()).expect("runs to completion");
        assert_eq!(result_type, 4);
        assert_eq!(u64::from_le_bytes(bytes.try_into().unwrap()), 42);
    }

    #[test]
    fn abort_opcode_surfaces_as_a_vm_error() {
        let json = r#"{
            "typeDecls": [
                {"tid": 4, "name": "Nat", "category": "Register", "heapSize": 0, "inlineSize": 8, "assignSize": 8, "heapMask": "", "inlineMask": "1", "keyComparable": true}
            ],
            "fieldDecls": [],
            "invokeDecls": [
                {"name": "main", "params": [], "resultType": 4, "resultArg": 0, "stackBytes": 0, "maskSlots": 0,
                 "body": [
                    {"tag": "Abort", "sinfo": {"line": 7, "column": 1}, "ssrc": "abort", "msg": "boom"}
                 ]}
            ],
            "constDecls": [],
            "constPool": [],
            "primaryEntry": 0
        }"#;
        let program = load_program(json).expect("valid blob");
        let err = run(&program, VmConfig::default()).expect_err("aborts");
        assert_eq!(err.exit_code(), crate::consts::exit_codes::ABORT);
    }
}
