/// Magic bytes at the start of every cue block.
pub const MAGIC: [u8; 4] = [b'B', b'O', b'B', 0];

/// Fallback block size, used when neither the configuration nor the
/// filesystem provides a usable value.
pub const DEFAULT_BLOCK_SIZE: usize = 32_768;

/// Minimum allowed block size.
pub const MIN_BLOCK_SIZE: usize = 512;

/// Maximum allowed block size.
pub const MAX_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Multiplier applied to the block size when no usable cue size is
/// configured.
pub const CUE_SIZE_MULTIPLIER: usize = 32;

/// Maximum possible cue size.
pub const MAX_CUE_SIZE: usize = 1024 * 1024 * 1024;

/// Header tag terminating the tag/value sequence.
pub const TAG_END: u64 = 0;

/// Header tag carrying the block size.
pub const TAG_BLOCK_SIZE: u64 = 1;

/// Header tag carrying the cue size.
pub const TAG_CUE_SIZE: u64 = 2;

/// Record kind whose body is the full new blob contents.
///
/// The only kind defined so far; the kind varint is the format's extension
/// point, and unknown kinds are treated as corruption.
pub const RECORD_REWRITE: u64 = 1;
