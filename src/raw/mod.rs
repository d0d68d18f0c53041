//! The raw block codec.
//!
//! One block compresses up to [`MAX_COMPRESS_LEN`](crate::MAX_COMPRESS_LEN)
//! input bytes independently of every other block. A compressed block starts
//! with a little-endian u32 bit cursor, followed by two LSB-first bitstreams
//! sharing one byte region: the match extra bits from bit 32 up to the
//! cursor, then the code book and the Huffman-coded symbol stream. Blocks
//! that would not shrink are stored verbatim behind a 3-byte header with the
//! high bit of the third byte set, which caps the overhead of
//! [`compress_block`] at the 3 bytes promised by [`compress_bound`].

mod compress;
mod decompress;

pub use compress::*;
pub use decompress::*;

pub(crate) const MAX_MATCH_LEN: usize = 256;
pub(crate) const MIN_MATCH_LEN: usize = 4;
pub(crate) const MAX_CODE_LENGTH: u8 = 9;
pub(crate) const MAX_BOOK_CODE_LENGTH: u8 = 7;
pub(crate) const MAX_BOOK_CODES: usize = MAX_CODE_LENGTH as usize + 4;
pub(crate) const SYMBOL_TERM: u16 = 256;
pub(crate) const MATCH_OFFSET: u16 = SYMBOL_TERM + 1;
pub(crate) const MAX_MATCH_CODE: u16 = 127;
pub(crate) const SYMBOL_COUNT: usize = MATCH_OFFSET as usize + MAX_MATCH_CODE as usize + 1;
pub(crate) const HASH_CONSTANT: u32 = 0x9E37_79B9;
pub(crate) const LEN_SHIFT: u32 = 4;
pub(crate) const DIST_MASK: u16 = 0xF;
pub(crate) const REPEAT_VALUE_INDEX: usize = MAX_CODE_LENGTH as usize + 1;
pub(crate) const REPEAT_ZERO_LONG_INDEX: usize = MAX_CODE_LENGTH as usize + 2;
pub(crate) const REPEAT_ZERO_SHORT_INDEX: usize = MAX_CODE_LENGTH as usize + 3;

/// Marks a stored (incompressible) block in bit 23 of the 3-byte header.
/// A compressed block's bit cursor is always far below 2^23, so the bit is
/// free as a discriminator.
pub(crate) const RAW_BLOCK_FLAG: u32 = 1 << 23;

/// A match's class code packs ⌊log₂(len − 3)⌋ above ⌊log₂(dist)⌋; the class
/// alone determines how many extra bits refine each component.
pub(crate) fn match_code(len: usize, dist: usize) -> u16 {
    let len_bits = 31 - ((len - 3) as u32).leading_zeros();
    let dist_bits = 31 - (dist as u32).leading_zeros();
    ((len_bits << LEN_SHIFT) | dist_bits) as u16
}

pub(crate) fn len_extra_bits(code: u16) -> u32 {
    u32::from(code) >> LEN_SHIFT
}

pub(crate) fn dist_extra_bits(code: u16) -> u32 {
    u32::from(code & DIST_MASK)
}

pub(crate) fn len_base(code: u16) -> usize {
    (1 << len_extra_bits(code)) - 1
}

pub(crate) fn dist_base(code: u16) -> usize {
    1 << dist_extra_bits(code)
}
