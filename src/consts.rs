//! Fixed parameters of the interpreter core.

/// Page size in bytes. Every page base address is aligned to this boundary,
/// so an object's page (and its metadata word) can be recovered by masking
/// the low `PAGE_BITS` bits off the object's logical address.
pub const PAGE_SIZE: usize = 8 * 1024;

/// Number of low bits masked off an address to recover its page offset.
pub const PAGE_BITS: u32 = 13;

static_assertions::const_assert_eq!(1usize << PAGE_BITS, PAGE_SIZE);

/// Maximum heap size of an ordinary (non-collection-node) object, in bytes.
pub const MAX_ORDINARY_OBJECT_SIZE: usize = 496;

/// Maximum heap size of an enlarged collection node block, in bytes.
pub const MAX_COLLECTION_NODE_SIZE: usize = 16 * MAX_ORDINARY_OBJECT_SIZE + 16;

/// Lower bound of the configurable GC allocation-threshold knob, in bytes.
pub const GC_THRESHOLD_MIN: u64 = 2 * 1024 * 1024;

/// Upper bound of the configurable GC allocation-threshold knob, in bytes.
pub const GC_THRESHOLD_MAX: u64 = 16 * 1024 * 1024;

/// Default GC allocation-threshold, in bytes.
pub const GC_THRESHOLD_DEFAULT: u64 = 8 * 1024 * 1024;

/// Machine word size, in bytes, used when reading reference masks.
pub const WORD_SIZE: usize = 8;

/// Maximum number of bytes an inline string slot may hold directly.
pub const INLINE_STRING_MAX_LEN: usize = 15;

/// The byte-index within a 16-byte string slot that carries the inline
/// length (and disambiguates inline-vs-heap representation).
pub const STRING_SLOT_LEN_BYTE: usize = 15;

/// K-repr capacity ladder for heap-allocated strings.
pub const KREPR_CAPACITIES: [usize; 5] = [16, 32, 64, 96, 128];

/// Strings larger than this many bytes are represented as a concat tree of
/// K-repr leaves rather than a single K-repr buffer.
pub const KREPR_MAX_LEAF: usize = 128;

/// K-repr capacity ladder for heap-allocated byte buffers. Same widths as
/// [`KREPR_CAPACITIES`], kept as its own constant since a buffer's ladder is
/// the byte-buffer engine's own tuning knob, not an alias of the string
/// engine's.
pub const BUFFER_KREPR_CAPACITIES: [usize; 5] = [16, 32, 64, 96, 128];

/// Maximum number of bytes an inline byte-buffer slot may hold directly —
/// same 16-byte slot convention as [`INLINE_STRING_MAX_LEN`].
pub const INLINE_BUFFER_MAX_LEN: usize = 15;

/// The byte-index within a 16-byte buffer slot that carries the inline
/// length (and disambiguates inline-vs-heap representation) — same
/// convention as [`STRING_SLOT_LEN_BYTE`].
pub const BUFFER_SLOT_LEN_BYTE: usize = 15;

/// Maximum number of elements held inline by a partial-vector list leaf.
pub const PARTIAL_VECTOR_MAX: usize = 8;

/// Number of words in a `UnionUniversal` slot: one descriptor pointer word
/// plus four payload words.
pub const UNION_UNIVERSAL_PAYLOAD_WORDS: usize = 4;

/// Sentinel `TypeID` reserved for internal, not user-visible types.
pub const INTERNAL_TYPE_ID: u32 = 0;

/// Well-known primitive `TypeID`s, reserved at process start.
pub mod well_known {
    /// `None` (unit absence marker).
    pub const NONE: u32 = 1;
    /// `Nothing` (bottom / never type).
    pub const NOTHING: u32 = 2;
    /// `Bool`.
    pub const BOOL: u32 = 3;
    /// `Nat` (unsigned fixed-width).
    pub const NAT: u32 = 4;
    /// `Int` (signed fixed-width).
    pub const INT: u32 = 5;
    /// `BigNat`.
    pub const BIG_NAT: u32 = 6;
    /// `BigInt`.
    pub const BIG_INT: u32 = 7;
    /// `Float`.
    pub const FLOAT: u32 = 8;
    /// `Decimal`.
    pub const DECIMAL: u32 = 9;
    /// `Rational`.
    pub const RATIONAL: u32 = 10;
    /// `String`.
    pub const STRING: u32 = 11;
    /// `ByteBuffer`.
    pub const BYTE_BUFFER: u32 = 12;
    /// `DateTime`.
    pub const DATE_TIME: u32 = 13;
    /// `UTCDateTime`.
    pub const UTC_DATE_TIME: u32 = 14;
    /// `CalendarDate`.
    pub const CALENDAR_DATE: u32 = 15;
    /// `RelativeTime`.
    pub const RELATIVE_TIME: u32 = 16;
    /// `TickTime`.
    pub const TICK_TIME: u32 = 17;
    /// `LogicalTime`.
    pub const LOGICAL_TIME: u32 = 18;
    /// `ISOTimeStamp`.
    pub const ISO_TIME_STAMP: u32 = 19;
    /// `UUID4`.
    pub const UUID4: u32 = 20;
    /// `UUID7`.
    pub const UUID7: u32 = 21;
    /// `SHAContentHash`.
    pub const SHA_CONTENT_HASH: u32 = 22;
    /// `LatLongCoordinate`.
    pub const LAT_LONG_COORDINATE: u32 = 23;
    /// `Regex`.
    pub const REGEX: u32 = 24;

    /// Internal heap payload type for a 16-byte K-repr string buffer.
    pub const KREPR_16: u32 = 25;
    /// Internal heap payload type for a 32-byte K-repr string buffer.
    pub const KREPR_32: u32 = 26;
    /// Internal heap payload type for a 64-byte K-repr string buffer.
    pub const KREPR_64: u32 = 27;
    /// Internal heap payload type for a 96-byte K-repr string buffer.
    pub const KREPR_96: u32 = 28;
    /// Internal heap payload type for a 128-byte K-repr string buffer.
    pub const KREPR_128: u32 = 29;
    /// Internal heap payload type for a string concatenation-tree node.
    pub const STRING_CONCAT_NODE: u32 = 30;
    /// Internal placeholder type used only as the declared field type of a
    /// concat-tree node's two children: `Category::Collection`, i.e. "one
    /// owned pointer, concrete type recovered from the payload's page" —
    /// reused here since a child may be either a K-repr leaf or another
    /// concat node.
    pub const STRING_CHILD_PTR: u32 = 31;

    /// Internal heap payload type for a 16-byte K-repr byte-buffer leaf.
    pub const BUFFER_KREPR_16: u32 = 32;
    /// Internal heap payload type for a 32-byte K-repr byte-buffer leaf.
    pub const BUFFER_KREPR_32: u32 = 33;
    /// Internal heap payload type for a 64-byte K-repr byte-buffer leaf.
    pub const BUFFER_KREPR_64: u32 = 34;
    /// Internal heap payload type for a 96-byte K-repr byte-buffer leaf.
    pub const BUFFER_KREPR_96: u32 = 35;
    /// Internal heap payload type for a 128-byte K-repr byte-buffer leaf.
    pub const BUFFER_KREPR_128: u32 = 36;
    /// Internal heap payload type for a byte-buffer concatenation-tree node.
    pub const BUFFER_CONCAT_NODE: u32 = 37;
    /// Internal placeholder type for a buffer concat-tree node's children,
    /// mirroring [`STRING_CHILD_PTR`] ("one owned pointer, concrete type
    /// recovered from the pointee's page") for the buffer leaf/node chain.
    pub const BUFFER_CHILD_PTR: u32 = 38;

    /// First `TypeID` available for user-declared types.
    pub const FIRST_USER_TYPE_ID: u32 = 39;
}

/// Abort exit codes, per spec §6.
pub mod exit_codes {
    /// Assertion failure.
    pub const ASSERTION: i32 = 2;
    /// Explicit `Abort` opcode.
    pub const ABORT: i32 = 3;
    /// Uncategorized / internal-invariant fatal error.
    pub const UNCATEGORIZED: i32 = 5;
}
