//! Checked primitive arithmetic, per spec §4.4 "Primitive arithmetic".
//!
//! Every helper here returns the fixed [`AbortReason`] spec §7 requires;
//! callers attach the faulting opcode's [`SourceLocation`] to build a
//! [`VmError::Abort`]. Shape follows `arith.rs` in the teacher almost
//! verbatim (`checked_add_word` etc.), generalized from a single `Word`
//! type to per-width `Nat`/`Int` kinds and extended with the divide,
//! negate, and float/decimal order checks spec.md names.

use crate::error::AbortReason;

/// Checked `Nat` (unsigned) addition.
#[inline]
pub fn checked_add_nat(a: u64, b: u64) -> Result<u64, AbortReason> {
    a.checked_add(b).ok_or(AbortReason::NatAdditionOverflow)
}

/// Checked `Nat` subtraction.
#[inline]
pub fn checked_sub_nat(a: u64, b: u64) -> Result<u64, AbortReason> {
    a.checked_sub(b)
        .ok_or(AbortReason::NatSubtractionUnderflow)
}

/// Checked `Nat` multiplication.
#[inline]
pub fn checked_mul_nat(a: u64, b: u64) -> Result<u64, AbortReason> {
    a.checked_mul(b)
        .ok_or(AbortReason::NatMultiplicationOverflow)
}

/// Checked `Int` (signed) addition.
#[inline]
pub fn checked_add_int(a: i64, b: i64) -> Result<i64, AbortReason> {
    a.checked_add(b).ok_or(AbortReason::IntAdditionOverflow)
}

/// Checked `Int` subtraction.
#[inline]
pub fn checked_sub_int(a: i64, b: i64) -> Result<i64, AbortReason> {
    a.checked_sub(b).ok_or(AbortReason::IntSubtractionOverflow)
}

/// Checked `Int` multiplication.
#[inline]
pub fn checked_mul_int(a: i64, b: i64) -> Result<i64, AbortReason> {
    a.checked_mul(b)
        .ok_or(AbortReason::IntMultiplicationOverflow)
}

/// Checked `Int` negation (overflows only for `i64::MIN`).
#[inline]
pub fn checked_neg_int(a: i64) -> Result<i64, AbortReason> {
    a.checked_neg().ok_or(AbortReason::IntNegationOverflow)
}

/// Checked integer division, aborting on divisor zero.
#[inline]
pub fn checked_div_int(a: i64, b: i64) -> Result<i64, AbortReason> {
    if b == 0 {
        return Err(AbortReason::DivisionByZero);
    }
    // checked_div (not raw `/`) avoids panicking on i64::MIN / -1.
    a.checked_div(b).ok_or(AbortReason::IntDivisionOverflow)
}

/// Checked unsigned division, aborting on divisor zero.
#[inline]
pub fn checked_div_nat(a: u64, b: u64) -> Result<u64, AbortReason> {
    if b == 0 {
        return Err(AbortReason::DivisionByZero);
    }
    Ok(a / b)
}

/// `BigNat`/`BigInt` addition is unchecked ("safe" per spec — these are
/// 256-bit words that do not realistically overflow at VM scale).
#[inline]
pub fn safe_add_big(a: ethnum::I256, b: ethnum::I256) -> ethnum::I256 {
    a.wrapping_add(b)
}

/// `BigNat`/`BigInt` subtraction, unchecked.
#[inline]
pub fn safe_sub_big(a: ethnum::I256, b: ethnum::I256) -> ethnum::I256 {
    a.wrapping_sub(b)
}

/// `BigNat`/`BigInt` multiplication, unchecked.
#[inline]
pub fn safe_mul_big(a: ethnum::I256, b: ethnum::I256) -> ethnum::I256 {
    a.wrapping_mul(b)
}

/// Float/decimal ordered-less, aborting on `NaN` or opposite infinities.
#[inline]
pub fn checked_float_less(a: f64, b: f64) -> Result<bool, AbortReason> {
    if a.is_nan() || b.is_nan() {
        return Err(AbortReason::NaNOrder);
    }
    if a.is_infinite() && b.is_infinite() && a.signum() != b.signum() {
        return Err(AbortReason::InfiniteOrder);
    }
    Ok(a < b)
}

/// Float/decimal ordered-less-or-equal, aborting on `NaN` or opposite
/// infinities.
#[inline]
pub fn checked_float_le(a: f64, b: f64) -> Result<bool, AbortReason> {
    if a.is_nan() || b.is_nan() {
        return Err(AbortReason::NaNOrder);
    }
    if a.is_infinite() && b.is_infinite() && a.signum() != b.signum() {
        return Err(AbortReason::InfiniteOrder);
    }
    Ok(a <= b)
}

/// Narrow a `Nat` to an `Int`, aborting if the value doesn't fit.
#[inline]
pub fn narrow_nat_to_int(n: u64) -> Result<i64, AbortReason> {
    i64::try_from(n).map_err(|_| AbortReason::OutOfBoundsNatToInt)
}

/// Narrow an `Int` to a `Nat`, aborting if negative or doesn't fit.
#[inline]
pub fn narrow_int_to_nat(n: i64) -> Result<u64, AbortReason> {
    u64::try_from(n).map_err(|_| AbortReason::OutOfBoundsIntToNat)
}

/// Narrow a `BigInt` to an `Int`, aborting if out of range.
#[inline]
pub fn narrow_bigint_to_int(n: ethnum::I256) -> Result<i64, AbortReason> {
    i64::try_from(n).map_err(|_| AbortReason::OutOfBoundsBigIntToInt)
}

/// Narrow a `BigNat` to a `Nat`, aborting if out of range.
#[inline]
pub fn narrow_bignat_to_nat(n: ethnum::U256) -> Result<u64, AbortReason> {
    u64::try_from(n).map_err(|_| AbortReason::OutOfBoundsBigNatToNat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(i64::MAX, 1 => Err(AbortReason::IntAdditionOverflow); "int add overflow")]
    #[test_case(1, 2 => Ok(3); "int add ok")]
    fn add_int(a: i64, b: i64) -> Result<i64, AbortReason> {
        checked_add_int(a, b)
    }

    #[test]
    fn div_by_zero_aborts() {
        assert_eq!(checked_div_int(10, 0), Err(AbortReason::DivisionByZero));
        assert_eq!(checked_div_nat(10, 0), Err(AbortReason::DivisionByZero));
    }

    #[test]
    fn int_negation_overflow_only_at_min() {
        assert_eq!(checked_neg_int(5), Ok(-5));
        assert_eq!(
            checked_neg_int(i64::MIN),
            Err(AbortReason::IntNegationOverflow)
        );
    }

    #[test]
    fn nan_and_infinity_order() {
        assert_eq!(checked_float_less(f64::NAN, 1.0), Err(AbortReason::NaNOrder));
        assert_eq!(
            checked_float_less(f64::INFINITY, f64::NEG_INFINITY),
            Err(AbortReason::InfiniteOrder)
        );
        assert_eq!(checked_float_less(1.0, 2.0), Ok(true));
        // Equal infinities are ordered fine (same sign).
        assert_eq!(checked_float_le(f64::INFINITY, f64::INFINITY), Ok(true));
    }

    #[test]
    fn narrowing_bounds() {
        assert_eq!(narrow_int_to_nat(-1), Err(AbortReason::OutOfBoundsIntToNat));
        assert_eq!(narrow_int_to_nat(5), Ok(5));
        assert_eq!(
            narrow_nat_to_int(u64::MAX),
            Err(AbortReason::OutOfBoundsNatToInt)
        );
    }
}
