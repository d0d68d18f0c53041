use byteorder::{ByteOrder, LE};
use fehler::{throw, throws};
use thiserror::Error;

use super::*;
use crate::bitstream::{BitReader, Overflow};
use crate::huffman::{self, CodeLength, LookupEntry};

/// Errors when decompressing a block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Error)]
pub enum DecodeError {
    #[error("block stream ended prematurely. Either your input was truncated or you're trying to decompress garbage.")]
    UnexpectedEnd,
    #[error("output capacity exhausted before the end-of-stream symbol")]
    OutputOverflow,
    #[error("malformed code book (invalid run in the length table, or a code no canonical assignment produces)")]
    BadCodeBook,
    #[error("match distance reaches back past the start of the block")]
    InvalidDistance,
}
type Error = DecodeError;

impl From<Overflow> for DecodeError {
    fn from(_: Overflow) -> DecodeError {
        DecodeError::UnexpectedEnd
    }
}

/// Decompress one block produced by [`compress_block`](super::compress_block)
/// into `out`, returning the number of bytes written.
///
/// `out` must be at least as large as the block's original input. Match
/// expansion copies 32 bytes at a time and may scribble up to 31 bytes past
/// the end of a match, so every capacity check keeps 32 bytes of slack; the
/// encoder's tail-literal rule guarantees that slack exists for any honest
/// block whose original size fits in `out`.
#[throws]
pub fn decompress_block(input: &[u8], out: &mut [u8]) -> usize {
    if input.len() < 3 {
        throw!(Error::UnexpectedEnd);
    }
    let header =
        u32::from(input[0]) | (u32::from(input[1]) << 8) | (u32::from(input[2]) << 16);
    if header & RAW_BLOCK_FLAG != 0 {
        let raw_len = (header & !RAW_BLOCK_FLAG) as usize;
        if raw_len > input.len() - 3 {
            throw!(Error::UnexpectedEnd);
        }
        if raw_len > out.len() {
            throw!(Error::OutputOverflow);
        }
        out[..raw_len].copy_from_slice(&input[3..3 + raw_len]);
        return raw_len;
    }

    if input.len() < 4 {
        throw!(Error::UnexpectedEnd);
    }
    let symbol_bit_offset = u64::from(LE::read_u32(input)) + 32;
    let mut reader = BitReader::at(input, symbol_bit_offset);

    let mut book = [CodeLength::default(); MAX_BOOK_CODES];
    for cl in book.iter_mut() {
        cl.len = reader.try_read(3)? as u8;
    }
    huffman::assign_codes(&mut book, MAX_BOOK_CODE_LENGTH);
    let book_lookup = huffman::build_lookup(&book, MAX_BOOK_CODE_LENGTH);

    let mut code_lengths = [CodeLength::default(); SYMBOL_COUNT];
    read_code_lengths(&mut reader, &book_lookup, &mut code_lengths)?;
    huffman::assign_codes(&mut code_lengths, MAX_CODE_LENGTH);
    let lookup = huffman::build_lookup(&code_lengths, MAX_CODE_LENGTH);

    read_symbols(&mut reader, BitReader::at(input, 32), &lookup, out)?
}

/// Reconstruct the primary length table through the book code.
#[throws]
fn read_code_lengths(
    reader: &mut BitReader,
    book_lookup: &[LookupEntry],
    code_lengths: &mut [CodeLength; SYMBOL_COUNT],
) {
    let mut last_len = 0u8;
    let mut i = 0;
    while i < SYMBOL_COUNT {
        if reader.bits_available() < u32::from(MAX_BOOK_CODE_LENGTH) {
            reader.load()?;
        }
        let entry = book_lookup[reader.peek(u32::from(MAX_BOOK_CODE_LENGTH)) as usize];
        if entry.len == 0 {
            throw!(Error::BadCodeBook);
        }
        reader.advance(u32::from(entry.len));

        let symbol = usize::from(entry.symbol);
        if symbol < REPEAT_VALUE_INDEX {
            code_lengths[i].len = symbol as u8;
            last_len = symbol as u8;
            i += 1;
        } else if symbol == REPEAT_VALUE_INDEX {
            if i == 0 || last_len == 0 {
                throw!(Error::BadCodeBook);
            }
            let repeat = reader.try_read(2)? as usize + 3;
            if i + repeat > SYMBOL_COUNT {
                throw!(Error::BadCodeBook);
            }
            for _ in 0..repeat {
                code_lengths[i].len = last_len;
                i += 1;
            }
        } else if symbol == REPEAT_ZERO_LONG_INDEX {
            let zeros = reader.try_read(7)? as usize + 11;
            if i + zeros > SYMBOL_COUNT {
                throw!(Error::BadCodeBook);
            }
            i += zeros;
        } else {
            let zeros = reader.try_read(3)? as usize + 3;
            if i + zeros > SYMBOL_COUNT {
                throw!(Error::BadCodeBook);
            }
            i += zeros;
        }
    }
}

/// Drive the symbol-stream reader and the extra-bit reader in parallel until
/// the terminator symbol.
#[throws]
fn read_symbols(
    reader: &mut BitReader,
    mut extra: BitReader,
    lookup: &[LookupEntry],
    out: &mut [u8],
) -> usize {
    let mut pos = 0;
    loop {
        if reader.bits_available() < u32::from(MAX_CODE_LENGTH) {
            reader.load()?;
        }
        let entry = lookup[reader.peek(u32::from(MAX_CODE_LENGTH)) as usize];
        if entry.len == 0 {
            throw!(Error::BadCodeBook);
        }
        reader.advance(u32::from(entry.len));

        if entry.symbol < SYMBOL_TERM {
            if pos >= out.len() {
                throw!(Error::OutputOverflow);
            }
            out[pos] = entry.symbol as u8;
            pos += 1;
        } else if entry.symbol == SYMBOL_TERM {
            return pos;
        } else {
            let code = entry.symbol - MATCH_OFFSET;
            let len_bits = len_extra_bits(code);
            let dist_bits = dist_extra_bits(code);
            // Worst case is 7 length bits plus 15 distance bits.
            if extra.bits_available() < 7 + 15 {
                extra.load()?;
            }
            let len = MIN_MATCH_LEN + len_base(code) + extra.peek(len_bits) as usize;
            extra.advance(len_bits);
            let dist = dist_base(code) + extra.peek(dist_bits) as usize;
            extra.advance(dist_bits);

            if pos + len + 32 > out.len() {
                throw!(Error::OutputOverflow);
            }
            if dist > pos {
                throw!(Error::InvalidDistance);
            }
            copy_match(out, pos, dist, len);
            pos += len;
        }
    }
}

/// Expand a match. When source and destination are at least 32 bytes apart
/// the copy runs in 32-byte chunks and is allowed to overshoot the match by
/// up to 31 bytes (the caller reserved the slack); overlapping matches fall
/// back to a byte loop, which naturally replays freshly written bytes.
fn copy_match(out: &mut [u8], pos: usize, dist: usize, len: usize) {
    if dist >= 32 {
        let mut src = pos - dist;
        let mut dst = pos;
        let end = pos + len;
        while dst < end {
            let (head, tail) = out.split_at_mut(dst);
            tail[..32].copy_from_slice(&head[src..src + 32]);
            src += 32;
            dst += 32;
        }
    } else {
        for offset in 0..len {
            out[pos + offset] = out[pos + offset - dist];
        }
    }
}
