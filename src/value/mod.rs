//! Value operations (spec §4.3): `store`/`clear`, `index`, `coerce`, and
//! `keyCmp`/`display` dispatch over a [`crate::types::TypeDescriptor`]'s
//! category.
//!
//! Every function here takes its operand's `TypeId` explicitly rather than
//! reading a type tag out of the bytes themselves — per spec §3, a storage
//! slot carries no runtime type header of its own (only unions do, and only
//! in their own header word); the caller (the evaluator, which already
//! knows the statically-declared type from the opcode stream) always
//! supplies it.

mod bytes_util;
mod coerce;
mod display;
mod index;
mod keycmp;
mod ops;

pub use coerce::coerce;
pub use display::display;
pub use index::{index, read_field, resolve_virtual_field, Location};
pub use keycmp::key_cmp;
pub use ops::{clear, store, store_width};
