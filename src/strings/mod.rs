//! The string engine (spec §4.6): a 16-byte slot that is either inline
//! (≤15 bytes) or a heap pointer to a K-repr leaf or concat-tree node.
//!
//! Multi-byte characters are out of scope (spec §4.6): this engine handles
//! ASCII content correctly and panics on malformed UTF-8 rather than
//! attempting codepoint-aware indexing.

pub mod bytebuffer;
mod iter;
mod ops;
mod repr;

pub use iter::{ForwardByteIter, ReverseByteIter};
pub use ops::{concat, slice};
pub use repr::{build, empty_slot, flatten, inline_len, internal_type_descriptors, is_empty, is_heap, len};
