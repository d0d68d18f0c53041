use byteorder::{ByteOrder, LE};
use fehler::{throw, throws};
use thiserror::Error;

use super::*;
use crate::bitstream::{BitWriter, Overflow};
use crate::huffman::{self, CodeLength};
use crate::MAX_COMPRESS_LEN;

/// Errors when compressing a block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Error)]
pub enum EncodeError {
    #[error("input is larger than the maximum block size")]
    BlockTooLarge,
    #[error("output buffer is smaller than compress_bound(input.len())")]
    OutputTooSmall,
}
type Error = EncodeError;

/// Maximum number of bytes [`compress_block`] can write for `len` input
/// bytes. The 3-byte overhead is the stored-block header; a Huffman-coded
/// block that would exceed this is stored verbatim instead.
pub fn compress_bound(len: usize) -> usize {
    len + 3
}

/// Compress one block of at most `MAX_COMPRESS_LEN` bytes into `out` and
/// return the number of bytes written. `out` must hold at least
/// [`compress_bound`]`(input.len())` bytes. The output is a pure function of
/// `input`: the Huffman attempt always runs against a buffer of exactly
/// `compress_bound` bytes, no matter how much room the caller gave us.
#[throws]
pub fn compress_block(input: &[u8], out: &mut [u8]) -> usize {
    if input.len() > MAX_COMPRESS_LEN {
        throw!(Error::BlockTooLarge);
    }
    let bound = compress_bound(input.len());
    if out.len() < bound {
        throw!(Error::OutputTooSmall);
    }

    match try_compress(input, &mut out[..bound]) {
        Ok(written) => written,
        Err(Overflow) => write_raw_block(input, out),
    }
}

/// Attempt the Huffman encoding; any bitstream overflow means the block does
/// not fit within `compress_bound` and must be stored instead.
fn try_compress(input: &[u8], out: &mut [u8]) -> Result<usize, Overflow> {
    if out.len() < 4 {
        return Err(Overflow);
    }

    let mut symbols = Vec::with_capacity(input.len() + 2);
    let mut frequencies = [0u32; SYMBOL_COUNT];
    let extra_bit_cursor = find_matches(input, out, &mut symbols, &mut frequencies)?;

    let mut code_lengths = [CodeLength::default(); SYMBOL_COUNT];
    huffman::assign_lengths(&frequencies, &mut code_lengths, MAX_CODE_LENGTH);
    huffman::assign_codes(&mut code_lengths, MAX_CODE_LENGTH);

    let events = book_events(&code_lengths);
    let mut book_frequencies = [0u32; MAX_BOOK_CODES];
    for event in &events {
        book_frequencies[event.book_symbol()] += 1;
    }
    let mut book = [CodeLength::default(); MAX_BOOK_CODES];
    huffman::assign_lengths(&book_frequencies, &mut book, MAX_BOOK_CODE_LENGTH);
    huffman::assign_codes(&mut book, MAX_BOOK_CODE_LENGTH);

    write_block(&code_lengths, &book, &events, &symbols, out, extra_bit_cursor)
}

/// Store the block verbatim: u24 LE length with the raw flag in bit 23,
/// then the payload.
fn write_raw_block(input: &[u8], out: &mut [u8]) -> usize {
    let header = input.len() as u32 | RAW_BLOCK_FLAG;
    out[0] = header as u8;
    out[1] = (header >> 8) as u8;
    out[2] = (header >> 16) as u8;
    out[3..3 + input.len()].copy_from_slice(input);
    3 + input.len()
}

/// Greedy LZ77 scan. Emits the symbol stream (terminated by `SYMBOL_TERM`)
/// and the per-symbol frequencies, writes the match extra bits into
/// `out[4..]`, and records the extra-bit end cursor in `out[..4]`.
#[throws(Overflow)]
fn find_matches(
    input: &[u8],
    out: &mut [u8],
    symbols: &mut Vec<u16>,
    frequencies: &mut [u32; SYMBOL_COUNT],
) -> u32 {
    let mut table = vec![0u16; 1 << 16];
    let mut extra = BitWriter::new(&mut out[4..]);

    // Matches never start inside the final MAX_MATCH_LEN + 32 bytes: the 32
    // bytes are the decoder's overcopy slack, the rest keeps the comparison
    // loop in bounds without per-byte checks.
    let max = if input.len() >= 32 + MAX_MATCH_LEN {
        input.len() - (32 + MAX_MATCH_LEN)
    } else {
        0
    };

    let mut i = 0;
    while i < max {
        let key = LE::read_u32(&input[i..]);
        let slot = (key.wrapping_mul(HASH_CONSTANT) >> 16) as usize;
        let dist = usize::from((i as u16).wrapping_sub(table[slot]));
        table[slot] = i as u16;

        let len = if dist > 0 {
            matching_len(&input[i - dist..][..MAX_MATCH_LEN], &input[i..][..MAX_MATCH_LEN])
        } else {
            0
        };

        if len >= MIN_MATCH_LEN {
            let code = match_code(len, dist);
            let len_extra = (len - len_base(code) - MIN_MATCH_LEN) as u64;
            let dist_extra = (dist - dist_base(code)) as u64;
            extra.write(
                (dist_extra << len_extra_bits(code)) | len_extra,
                len_extra_bits(code) + dist_extra_bits(code),
            )?;

            let symbol = MATCH_OFFSET + code;
            frequencies[usize::from(symbol)] += 1;
            symbols.push(symbol);

            // Skipping over the match leaves the table stale; re-seed the
            // first few positions inside it.
            for j in i + 1..i + 4 {
                let key = LE::read_u32(&input[j..]);
                table[(key.wrapping_mul(HASH_CONSTANT) >> 16) as usize] = j as u16;
            }
            i += len;
        } else {
            frequencies[usize::from(input[i])] += 1;
            symbols.push(u16::from(input[i]));
            i += 1;
        }
    }
    for &byte in &input[i..] {
        frequencies[usize::from(byte)] += 1;
        symbols.push(u16::from(byte));
    }

    let extra_bit_cursor = extra.finish()? as u32;
    LE::write_u32(&mut out[..4], extra_bit_cursor);

    symbols.push(SYMBOL_TERM);
    frequencies[usize::from(SYMBOL_TERM)] += 1;
    extra_bit_cursor
}

/// Longest common prefix of two equally sized slices, a register at a time.
fn matching_len(a: &[u8], b: &[u8]) -> usize {
    let mut len = 0;
    for (x, y) in a.chunks_exact(8).zip(b.chunks_exact(8)) {
        let xor = LE::read_u64(x) ^ LE::read_u64(y);
        if xor != 0 {
            return len + (xor.trailing_zeros() / 8) as usize;
        }
        len += 8;
    }
    len
}

/// One event of the run-length code that packs the primary length table.
/// Deriving the sequence once keeps the frequency scan and the emission in
/// lockstep.
enum BookEvent {
    /// A literal code length 0..=9.
    Length(u8),
    /// Repeat the previous non-zero length `count` times (3..=6).
    Repeat(u8),
    /// A run of `count` zeros (3..=10).
    ZeroShort(u8),
    /// A run of `count` zeros (11..=138).
    ZeroLong(u8),
}

impl BookEvent {
    fn book_symbol(&self) -> usize {
        match *self {
            BookEvent::Length(len) => usize::from(len),
            BookEvent::Repeat(_) => REPEAT_VALUE_INDEX,
            BookEvent::ZeroShort(_) => REPEAT_ZERO_SHORT_INDEX,
            BookEvent::ZeroLong(_) => REPEAT_ZERO_LONG_INDEX,
        }
    }
}

fn book_events(code_lengths: &[CodeLength]) -> Vec<BookEvent> {
    let mut events = Vec::new();
    let mut last_len = 0u8;
    let mut i = 0;
    while i < code_lengths.len() {
        let len = code_lengths[i].len;
        if len != 0 {
            if len == last_len {
                let mut repeat = 1;
                while i + repeat < code_lengths.len()
                    && code_lengths[i + repeat].len == last_len
                    && repeat < 6
                {
                    repeat += 1;
                }
                if repeat >= 3 {
                    events.push(BookEvent::Repeat(repeat as u8));
                    i += repeat;
                    last_len = 0;
                    continue;
                }
            }
            events.push(BookEvent::Length(len));
            last_len = len;
            i += 1;
        } else {
            let mut run = 1;
            while i + run < code_lengths.len() && code_lengths[i + run].len == 0 {
                run += 1;
            }
            if run >= 11 {
                let capped = run.min(138);
                events.push(BookEvent::ZeroLong(capped as u8));
                i += capped;
            } else if run >= 3 {
                events.push(BookEvent::ZeroShort(run as u8));
                i += run;
            } else {
                events.push(BookEvent::Length(0));
                i += 1;
            }
            last_len = 0;
        }
    }
    events
}

/// Append the code book and the symbol stream after the extra bits, pad with
/// 128 zero bits for the decoder's speculative loads, and return the block's
/// total byte length.
#[throws(Overflow)]
fn write_block(
    code_lengths: &[CodeLength; SYMBOL_COUNT],
    book: &[CodeLength; MAX_BOOK_CODES],
    events: &[BookEvent],
    symbols: &[u16],
    out: &mut [u8],
    extra_bit_cursor: u32,
) -> usize {
    let mut writer = BitWriter::with_offset(&mut out[4..], u64::from(extra_bit_cursor));

    for cl in book.iter() {
        writer.write(u64::from(cl.len), 3)?;
    }
    for event in events {
        let cl = book[event.book_symbol()];
        writer.write(u64::from(cl.code), u32::from(cl.len))?;
        match *event {
            BookEvent::Length(_) => {}
            BookEvent::Repeat(count) => writer.write(u64::from(count - 3), 2)?,
            BookEvent::ZeroShort(count) => writer.write(u64::from(count - 3), 3)?,
            BookEvent::ZeroLong(count) => writer.write(u64::from(count - 11), 7)?,
        }
    }
    for &symbol in symbols {
        let cl = code_lengths[usize::from(symbol)];
        writer.write(u64::from(cl.code), u32::from(cl.len))?;
    }
    writer.write(0, 64)?;
    writer.write(0, 64)?;
    let total_bits = writer.finish()?;

    // Mask the unused high bits of the final byte so the block is a pure
    // function of the input, not of whatever the caller's buffer held.
    let written = ((total_bits + 7) / 8) as usize;
    let tail_bits = (total_bits % 8) as u32;
    if tail_bits != 0 {
        out[3 + written] &= (1u8 << tail_bits) - 1;
    }
    written
}
