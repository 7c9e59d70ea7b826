//! Guard and statement-guard evaluation (spec §4.4 "Masks", "Statement
//! guard").
//!
//! [`crate::program::Guard`] gives no explicit discriminant for "read a
//! mask bit" versus "read a frame variable" — its three fields
//! (`mask_offset`, `index`, `var_offset`) have to serve both. We use the
//! sentinel `index == u32::MAX` to mean "ignore `mask_offset` and read a
//! one-byte boolean frame variable at `var_offset`" instead, since `index`
//! is otherwise always a small bit position within one mask word and
//! `u32::MAX` can never be a legitimate one. See `DESIGN.md`, Open
//! Question decisions.

use crate::program::{Guard, StatementGuard};

use super::frame::Frame;

/// Sentinel `Guard::index` meaning "read `var_offset` as a frame-local
/// bool" rather than a mask bit.
pub const VAR_GUARD_INDEX: u32 = u32::MAX;

/// Evaluate one [`Guard`] to a boolean.
pub fn eval_guard(guard: Guard, frame: &Frame) -> bool {
    if guard.index == VAR_GUARD_INDEX {
        frame.locals.get(guard.var_offset as usize).is_some_and(|&b| b != 0)
    } else {
        frame.mask_bit(guard.mask_offset, guard.index)
    }
}

/// Outcome of consulting a [`StatementGuard`] before running an opcode's
/// effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Run the opcode's normal effect.
    RunEffect,
    /// Guard suppressed the effect; the opcode's destination should instead
    /// be assigned from `default_var` (or left untouched if there is none).
    UseDefault { default_var: u32 },
    /// Guard suppressed the effect and there is no default to apply.
    Skip,
}

/// Decide what a [`StatementGuard`]-wrapped opcode should do this step.
pub fn resolve(sguard: Option<StatementGuard>, frame: &Frame) -> GuardOutcome {
    let Some(sg) = sguard else {
        return GuardOutcome::RunEffect;
    };
    if !sg.enabled || eval_guard(sg.guard, frame) {
        return GuardOutcome::RunEffect;
    }
    if sg.use_default_on {
        GuardOutcome::UseDefault { default_var: sg.default_var }
    } else {
        GuardOutcome::Skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_guard_reads_mask_bit() {
        let mut f = Frame::new(0, 8, 2, 0, 0);
        f.set_mask_bit(0, 1, true);
        let g = Guard { mask_offset: 0, index: 1, var_offset: 0 };
        assert!(eval_guard(g, &f));
    }

    #[test]
    fn var_guard_reads_frame_local() {
        let mut f = Frame::new(0, 8, 0, 0, 0);
        f.locals[3] = 1;
        let g = Guard { mask_offset: 0, index: VAR_GUARD_INDEX, var_offset: 3 };
        assert!(eval_guard(g, &f));
    }

    #[test]
    fn disabled_statement_guard_always_runs_effect() {
        let f = Frame::new(0, 8, 1, 0, 0);
        let sg = StatementGuard {
            guard: Guard { mask_offset: 0, index: 0, var_offset: 0 },
            default_var: 0,
            use_default_on: true,
            enabled: false,
        };
        assert_eq!(resolve(Some(sg), &f), GuardOutcome::RunEffect);
    }

    #[test]
    fn suppressed_guard_without_default_skips() {
        let f = Frame::new(0, 8, 1, 0, 0);
        let sg = StatementGuard {
            guard: Guard { mask_offset: 0, index: 0, var_offset: 0 },
            default_var: 0,
            use_default_on: false,
            enabled: true,
        };
        assert_eq!(resolve(Some(sg), &f), GuardOutcome::Skip);
    }
}
