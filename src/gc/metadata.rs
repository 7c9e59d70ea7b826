//! The per-object heap metadata word (spec §3 "Heap object metadata").
//!
//! A typed wrapper around the packed `u64`, per Design Notes §9
//! ("Metadata word bit-packing": "Define a typed wrapper whose operations
//! encode/decode the six fields ... and panic on contradictory states. Do
//! not scatter bit-mask literals through the collector.").

use crate::error::FatalReason;

const BIT_ALLOCATED: u64 = 1 << 63;
const BIT_DEC_PENDING: u64 = 1 << 62;
const BIT_IS_FWD_PTR: u64 = 1 << 61;
const BIT_RC_KIND: u64 = 1 << 60;
const RC_DATA_SHIFT: u32 = 2;
const RC_DATA_MASK: u64 = 0x0FFF_FFFF_FFFF_FFFC; // bits 59..2
const BIT_MARK: u64 = 1 << 1;
const BIT_YOUNG: u64 = 1;

/// Which discipline an object's RC-data bits encode, per spec §3: "Exactly
/// one of {count semantics, back-pointer semantics} is in effect per
/// object in the old generation."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcKind {
    /// RC-data is a reference count.
    Count,
    /// RC-data is a single owning parent's address, shifted left 2.
    BackPointer,
}

/// A decoded view of the metadata word. Encoding/decoding is the only place
/// that touches the raw bit layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaWord(u64);

impl MetaWord {
    /// The all-zero word: not allocated, not young, not marked — the state
      /// a freshly-reset freelist slot starts in.
    pub const ZERO: MetaWord = MetaWord(0);

    /// Build the initial word for a freshly bump/freelist-allocated young
    /// object: `Allocated | Young`, no RC-data yet (spec §4.1 step 2).
    pub fn fresh_young() -> Self {
        MetaWord(BIT_ALLOCATED | BIT_YOUNG)
    }

    /// Build a forwarding-pointer word for an evacuated young object (spec
    /// §4.2 "Young evacuation": `IS_FWD_PTR | newAddress<<2`).
    pub fn forwarding(new_address: u64) -> Self {
        MetaWord(BIT_ALLOCATED | BIT_IS_FWD_PTR | ((new_address << RC_DATA_SHIFT) & RC_DATA_MASK))
    }

    /// Build a back-pointer-discipline word identifying `parent` as the
    /// sole owner (spec §4.2 "Parent accounting").
    pub fn back_pointer(parent: u64) -> Self {
        MetaWord(BIT_ALLOCATED | ((parent << RC_DATA_SHIFT) & RC_DATA_MASK))
    }

    /// Build a count-discipline word with the given reference count.
    pub fn with_count(count: u64) -> Self {
        MetaWord(BIT_ALLOCATED | BIT_RC_KIND | ((count << RC_DATA_SHIFT) & RC_DATA_MASK))
    }

    /// Raw bits, for persisting into a page's metadata array.
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Reconstruct from raw bits (e.g. when reading a page's metadata
    /// array back). Does not validate; use [`MetaWord::validate`] at
    /// trust boundaries.
    pub fn from_bits(bits: u64) -> Self {
        MetaWord(bits)
    }

    /// `true` if the Allocated bit is set.
    pub fn allocated(self) -> bool {
        self.0 & BIT_ALLOCATED != 0
    }

    /// `true` if a decrement for this object is queued.
    pub fn dec_pending(self) -> bool {
        self.0 & BIT_DEC_PENDING != 0
    }

    /// `true` if this word is currently a forwarding pointer rather than
    /// live object metadata — the sole disambiguator during evacuation
    /// (Design Notes §9 "Forwarding pointers during GC").
    pub fn is_forwarding(self) -> bool {
        self.0 & BIT_IS_FWD_PTR != 0
    }

    /// The forwarded-to address, if this word is a forwarding pointer.
    pub fn forward_target(self) -> Option<u64> {
        self.is_forwarding().then(|| self.rc_data_raw())
    }

    /// Which RC discipline is in effect.
    pub fn rc_kind(self) -> RcKind {
        if self.0 & BIT_RC_KIND != 0 {
            RcKind::Count
        } else {
            RcKind::BackPointer
        }
    }

    fn rc_data_raw(self) -> u64 {
        (self.0 & RC_DATA_MASK) >> RC_DATA_SHIFT
    }

    /// The reference count, if `rc_kind() == Count`.
    pub fn count(self) -> Option<u64> {
        matches!(self.rc_kind(), RcKind::Count).then(|| self.rc_data_raw())
    }

    /// The owning parent's address, if `rc_kind() == BackPointer`.
    pub fn back_pointer_target(self) -> Option<u64> {
        matches!(self.rc_kind(), RcKind::BackPointer).then(|| self.rc_data_raw())
    }

    /// `true` if the Mark bit is set (used only during old-gen major work;
    /// young objects are reclaimed by evacuation, not marking).
    pub fn marked(self) -> bool {
        self.0 & BIT_MARK != 0
    }

    /// `true` if this object is in the young generation.
    pub fn young(self) -> bool {
        self.0 & BIT_YOUNG != 0
    }

    /// Spec §3 invariant: "An object is live iff `(RC-data ≠ 0) ∨ mark =
    /// 1`." Meaningless on a forwarding word; callers must resolve
    /// forwarding first.
    pub fn is_live(self) -> bool {
        debug_assert!(!self.is_forwarding(), "is_live on a forwarding word");
        self.rc_data_raw() != 0 || self.marked()
    }

    /// Set the Mark bit, returning the updated word.
    pub fn with_mark(self, mark: bool) -> Self {
        MetaWord(if mark { self.0 | BIT_MARK } else { self.0 & !BIT_MARK })
    }

    /// Clear the Young bit (object was promoted or the generation as a
    /// whole aged), returning the updated word.
    pub fn with_young(self, young: bool) -> Self {
        MetaWord(if young { self.0 | BIT_YOUNG } else { self.0 & !BIT_YOUNG })
    }

    /// Set/clear the Dec-pending bit, returning the updated word.
    pub fn with_dec_pending(self, pending: bool) -> Self {
        MetaWord(if pending {
            self.0 | BIT_DEC_PENDING
        } else {
            self.0 & !BIT_DEC_PENDING
        })
    }

    /// Upgrade a back-pointer word to a count word with the given count,
    /// the transition Design Notes §9 calls out as needing to be explicit
    /// and well-tested ("misclassification corrupts decrement
    /// accounting").
    pub fn upgrade_to_count(self, count: u64) -> Self {
        debug_assert_eq!(self.rc_kind(), RcKind::BackPointer, "upgrade from non-back-pointer word");
        MetaWord::with_count(count).with_mark(self.marked()).with_young(self.young())
    }

    /// Reject states spec §3 never allows: a young object carrying
    /// non-trivial RC-data, or a forwarding word also claiming to be
    /// marked/young.
    pub fn validate(self) -> Result<Self, FatalReason> {
        if self.is_forwarding() {
            return Ok(self);
        }
        if self.young() && self.rc_data_raw() != 0 {
            return Err(FatalReason::CorruptMetadata(self.0));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_young_is_allocated_and_young_with_no_rc_data() {
        let m = MetaWord::fresh_young();
        assert!(m.allocated());
        assert!(m.young());
        assert!(!m.is_live());
        assert!(m.validate().is_ok());
    }

    #[test]
    fn forwarding_is_disambiguated_by_its_own_bit() {
        let m = MetaWord::forwarding(0xABCD);
        assert!(m.is_forwarding());
        assert_eq!(m.forward_target(), Some(0xABCD));
    }

    #[test]
    fn back_pointer_then_count_upgrade() {
        let bp = MetaWord::back_pointer(0x1000);
        assert_eq!(bp.rc_kind(), RcKind::BackPointer);
        assert_eq!(bp.back_pointer_target(), Some(0x1000));
        assert!(bp.is_live());

        let upgraded = bp.upgrade_to_count(2);
        assert_eq!(upgraded.rc_kind(), RcKind::Count);
        assert_eq!(upgraded.count(), Some(2));
    }

    #[test]
    fn young_object_with_rc_data_is_invalid() {
        let bad = MetaWord::back_pointer(5).with_young(true);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn mark_and_young_bits_are_independent_of_rc_kind() {
        let m = MetaWord::with_count(3).with_mark(true);
        assert!(m.marked());
        assert_eq!(m.count(), Some(3));
    }
}
