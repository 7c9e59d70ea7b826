//! One activation record (spec §4.4 "Frame").
//!
//! The spec's own `Frame` struct names a `cstackBase` field, implying one
//! shared, bump-allocated call-stack byte arena indexed by a running base
//! offset. We instead give each [`Frame`] its own `Vec<u8>` locals buffer,
//! allocated from the ordinary Rust allocator (never the GC heap) and
//! pushed/popped on the evaluator's own `Vec<Frame>` call stack. Control
//! flow is still strictly LIFO, so the observable behavior is identical;
//! this just replaces one pointer-arithmetic trick with a `Vec` per call,
//! which is the shape the teacher's own `interpreter/frame.rs` and
//! `interpreter/internal.rs` use for their (unrelated) `CallFrame`
//! bookkeeping — a plain owned struct per activation, not a shared arena.
//! See `DESIGN.md`, Open Question decisions.

use std::collections::HashMap;

use crate::program::{InvokeId, SourceInfo};
use crate::types::TypeId;

/// One live activation: the callee's parameter/local byte buffer, its
/// optional-argument/guard mask, and its instruction pointer.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Which invocation this frame is executing.
    pub invoke_id: InvokeId,
    /// Flat byte buffer backing every `Parameter`/`Local`/`Register`
    /// argument offset this frame's opcodes reference (spec §6 "Argument
    /// references": kind selects which *logical* space the offset is in;
    /// in this implementation all three share one physical buffer, since
    /// the distinction is the compiler's own bookkeeping and is never
    /// runtime-visible — see `DESIGN.md`).
    pub locals: Vec<u8>,
    /// Bit-packed guard/optional-argument mask, `ceil(mask_slots / 8)`
    /// bytes (spec §4.4 "Masks").
    pub mask: Vec<u8>,
    /// Index into the invocation's opcode body of the next instruction to
    /// execute.
    pub ip: usize,
    /// Byte offset within `locals` the caller's `ReturnAssign`/
    /// `ReturnAssignOfCons` should write the result to, in the *caller's*
    /// frame — held here so `Invoke`'s handler knows where to deliver the
    /// callee's result once it returns.
    pub return_offset: u32,
    /// Source position of the opcode currently executing, kept for
    /// `Abort`/`Assert`/debugger reporting after a frame has already
    /// returned (its own `ip` is gone by the time the error bubbles up).
    pub current_source: SourceInfo,
    /// This invocation's declared result type, so a `ReturnAssign` knows
    /// how many bytes to read regardless of which kind of slot `src`
    /// refers to.
    pub result_type: TypeId,
    /// The declared type last written to each occupied local slot,
    /// updated by every opcode handler that writes a target (see
    /// `control::write_target`). The program blob carries per-local type
    /// declarations only implicitly, via the type each writing opcode
    /// already names (`LoadUninit`'s `ttype`, `DirectAssign`'s `into`,
    /// etc.) — tracking them here as they're written gives the collector
    /// a precise, always-current root map without needing a separate
    /// static local-type table. See `DESIGN.md`, Open Question decisions.
    pub slot_types: HashMap<u32, TypeId>,
}

impl Frame {
    /// Build a fresh frame with zeroed locals and mask storage.
    pub fn new(invoke_id: InvokeId, stack_bytes: u32, mask_slots: u32, return_offset: u32, result_type: TypeId) -> Self {
        Frame {
            invoke_id,
            locals: vec![0u8; stack_bytes as usize],
            mask: vec![0u8; mask_slots.div_ceil(8) as usize],
            ip: 0,
            return_offset,
            current_source: SourceInfo::default(),
            result_type,
            slot_types: HashMap::new(),
        }
    }

    /// Record that `offset` now holds a value of declared type `tid`,
    /// superseding whatever type (if any) previously occupied that slot.
    pub fn record_type(&mut self, offset: u32, tid: TypeId) {
        self.slot_types.insert(offset, tid);
    }

    /// Read one guard/optional-argument mask bit.
    pub fn mask_bit(&self, mask_offset: u32, index: u32) -> bool {
        let bit = mask_offset as usize * 8 + index as usize;
        let byte = bit / 8;
        let shift = bit % 8;
        self.mask.get(byte).is_some_and(|b| (b >> shift) & 1 != 0)
    }

    /// Write one guard/optional-argument mask bit.
    pub fn set_mask_bit(&mut self, mask_offset: u32, index: u32, value: bool) {
        let bit = mask_offset as usize * 8 + index as usize;
        let byte = bit / 8;
        let shift = bit % 8;
        if byte >= self.mask.len() {
            self.mask.resize(byte + 1, 0);
        }
        if value {
            self.mask[byte] |= 1 << shift;
        } else {
            self.mask[byte] &= !(1 << shift);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_bits_round_trip() {
        let mut f = Frame::new(0, 16, 3, 0, 0);
        assert!(!f.mask_bit(0, 2));
        f.set_mask_bit(0, 2, true);
        assert!(f.mask_bit(0, 2));
        f.set_mask_bit(0, 2, false);
        assert!(!f.mask_bit(0, 2));
    }

    #[test]
    fn locals_start_zeroed() {
        let f = Frame::new(0, 24, 0, 0, 0);
        assert_eq!(f.locals.len(), 24);
        assert!(f.locals.iter().all(|&b| b == 0));
    }
}
