//! `CheckedArith`/`FloatOrder` and `KeyEq`/`KeyLess` (spec §4.4 "Primitive
//! arithmetic", "Key-eq / key-less").
//!
//! Which concrete Rust numeric representation backs a `ttype` is decided
//! by comparing it against `crate::consts::well_known`'s reserved
//! `TypeID`s — the same convention `crate::value::keycmp::cmp_register`
//! already established for key comparison, reused here for arithmetic.

use std::cmp::Ordering;

use crate::arith;
use crate::consts::well_known;
use crate::error::{AbortReason, FatalReason, SourceLocation, VmError, VmResult};
use crate::gc::Heap;
use crate::program::{CheckedArithOp, KeyCompareMode, SourceInfo};
use crate::types::TypeRegistry;
use crate::value;

fn abort(reason: AbortReason, sinfo: &SourceInfo) -> VmError {
    VmError::abort(reason, SourceLocation { file: "<program>".into(), line: sinfo.line })
}

fn u64_of(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(bytes[..8].try_into().unwrap())
}

fn i64_of(bytes: &[u8]) -> i64 {
    u64_of(bytes) as i64
}

fn f64_of(bytes: &[u8]) -> f64 {
    f64::from_le_bytes(bytes[..8].try_into().unwrap())
}

fn i256_of(bytes: &[u8]) -> ethnum::I256 {
    ethnum::I256::from_le_bytes(bytes[..32].try_into().unwrap())
}

fn u256_of(bytes: &[u8]) -> ethnum::U256 {
    ethnum::U256::from_le_bytes(bytes[..32].try_into().unwrap())
}

/// `CheckedArith(dst, op, ttype, lhs, rhs)`: dispatches the fixed-width
/// checked operation named by `op` over the representation `ttype`
/// selects, aborting with the matching spec §7 message on overflow.
pub fn checked_arith(op: CheckedArithOp, ttype: u32, lhs: &[u8], rhs: Option<&[u8]>, sinfo: &SourceInfo) -> VmResult<Vec<u8>> {
    macro_rules! checked {
        ($call:expr) => {
            $call.map_err(|e| abort(e, sinfo))?
        };
    }
    Ok(match ttype {
        well_known::NAT => {
            let a = u64_of(lhs);
            let v = match op {
                CheckedArithOp::Add => checked!(arith::checked_add_nat(a, u64_of(rhs.unwrap()))),
                CheckedArithOp::Sub => checked!(arith::checked_sub_nat(a, u64_of(rhs.unwrap()))),
                CheckedArithOp::Mul => checked!(arith::checked_mul_nat(a, u64_of(rhs.unwrap()))),
                CheckedArithOp::Div => checked!(arith::checked_div_nat(a, u64_of(rhs.unwrap()))),
                CheckedArithOp::Negate => {
                    if a == 0 {
                        0
                    } else {
                        return Err(abort(AbortReason::NatSubtractionUnderflow, sinfo));
                    }
                }
            };
            v.to_le_bytes().to_vec()
        }
        well_known::INT => {
            let a = i64_of(lhs);
            let v = match op {
                CheckedArithOp::Add => checked!(arith::checked_add_int(a, i64_of(rhs.unwrap()))),
                CheckedArithOp::Sub => checked!(arith::checked_sub_int(a, i64_of(rhs.unwrap()))),
                CheckedArithOp::Mul => checked!(arith::checked_mul_int(a, i64_of(rhs.unwrap()))),
                CheckedArithOp::Div => checked!(arith::checked_div_int(a, i64_of(rhs.unwrap()))),
                CheckedArithOp::Negate => checked!(arith::checked_neg_int(a)),
            };
            (v as u64).to_le_bytes().to_vec()
        }
        well_known::BIG_NAT => {
            let a = u256_of(lhs);
            let v = match op {
                CheckedArithOp::Add => a.wrapping_add(u256_of(rhs.unwrap())),
                CheckedArithOp::Sub => a.wrapping_sub(u256_of(rhs.unwrap())),
                CheckedArithOp::Mul => a.wrapping_mul(u256_of(rhs.unwrap())),
                CheckedArithOp::Div => {
                    let b = u256_of(rhs.unwrap());
                    if b == ethnum::U256::ZERO {
                        return Err(abort(AbortReason::DivisionByZero, sinfo));
                    }
                    a / b
                }
                CheckedArithOp::Negate => {
                    if a == ethnum::U256::ZERO {
                        ethnum::U256::ZERO
                    } else {
                        return Err(abort(AbortReason::NatSubtractionUnderflow, sinfo));
                    }
                }
            };
            v.to_le_bytes().to_vec()
        }
        well_known::BIG_INT => {
            let a = i256_of(lhs);
            let v = match op {
                CheckedArithOp::Add => arith::safe_add_big(a, i256_of(rhs.unwrap())),
                CheckedArithOp::Sub => arith::safe_sub_big(a, i256_of(rhs.unwrap())),
                CheckedArithOp::Mul => arith::safe_mul_big(a, i256_of(rhs.unwrap())),
                CheckedArithOp::Div => {
                    let b = i256_of(rhs.unwrap());
                    if b == ethnum::I256::ZERO {
                        return Err(abort(AbortReason::DivisionByZero, sinfo));
                    }
                    a / b
                }
                CheckedArithOp::Negate => -a,
            };
            v.to_le_bytes().to_vec()
        }
        well_known::FLOAT | well_known::DECIMAL => {
            let a = f64_of(lhs);
            let v = match op {
                CheckedArithOp::Add => a + f64_of(rhs.unwrap()),
                CheckedArithOp::Sub => a - f64_of(rhs.unwrap()),
                CheckedArithOp::Mul => a * f64_of(rhs.unwrap()),
                CheckedArithOp::Div => a / f64_of(rhs.unwrap()),
                CheckedArithOp::Negate => -a,
            };
            v.to_le_bytes().to_vec()
        }
        _ => return Err(VmError::Fatal(FatalReason::MissingMember(format!("CheckedArith on TypeID {ttype}")))),
    })
}

/// `FloatOrder(dst, lessOrEqual, lhs, rhs)`.
pub fn float_order(less_or_equal: bool, lhs: &[u8], rhs: &[u8], sinfo: &SourceInfo) -> VmResult<bool> {
    let a = f64_of(lhs);
    let b = f64_of(rhs);
    let r = if less_or_equal { arith::checked_float_le(a, b) } else { arith::checked_float_less(a, b) };
    r.map_err(|e| abort(e, sinfo))
}

/// `KeyEq`/`KeyLess`, all three [`KeyCompareMode`]s.
///
/// `Fast` assumes both operands are already known-concrete of the same
/// descriptor, so it's just `key_cmp` under `lhs_type`. `Static`/`Virtual`
/// differ only in whether the descriptors are statically guaranteed equal;
/// since `key_cmp` itself already handles the union-vs-union and
/// union-vs-concrete dispatch via each side's declared type, all three
/// modes reduce to the same call here — the distinction exists for the
/// compiler's own code-selection, not for runtime semantics.
pub fn key_compare(
    mode: KeyCompareMode,
    lhs: &[u8],
    rhs: &[u8],
    lhs_type: u32,
    rhs_type: u32,
    heap: &Heap,
    registry: &TypeRegistry,
) -> VmResult<Ordering> {
    let _ = mode;
    if lhs_type == rhs_type {
        return Ok(value::key_cmp(lhs, rhs, lhs_type, registry, heap)?);
    }
    // Differing static types only happens under `Virtual`: order by
    // TypeID first, payloads are incomparable across distinct concrete
    // types.
    Ok(lhs_type.cmp(&rhs_type))
}
