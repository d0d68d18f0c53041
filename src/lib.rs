#![forbid(unsafe_code)]

//! Block-parallel lossless compression.
//!
//! The codec pairs a greedy LZ77 match finder with a canonical,
//! length-limited Huffman coder; the code lengths themselves are compressed
//! through a secondary "book" Huffman code with run-length escapes. Files
//! are cut into 64 KiB chunks that compress independently, which is what the
//! parallel pipeline in [`framed`] exploits.
//!
//! Use [`raw`] to work with single in-memory blocks and [`framed`] to
//! (de)compress whole files across worker threads.

pub mod bitstream;
pub mod huffman;
pub mod raw;
#[cfg(unix)]
pub mod framed;

/// Hard upper bound on a single block's input, and the pipeline chunk size.
pub const MAX_COMPRESS_LEN: usize = 64 * 1024;

#[cfg(test)]
mod tests {
    use crate::raw::{compress_block, compress_bound, decompress_block};
    use crate::MAX_COMPRESS_LEN;
    use std::str;

    fn compress(input: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; compress_bound(input.len())];
        let written = compress_block(input, &mut buf).unwrap();
        buf.truncate(written);
        buf
    }

    fn decompress(compressed: &[u8], capacity: usize) -> Vec<u8> {
        let mut buf = vec![0u8; capacity];
        let read = decompress_block(compressed, &mut buf).unwrap();
        buf.truncate(read);
        buf
    }

    /// Test that the compressed bytes decompress to the original bytes.
    fn inverse_bytes(input: &[u8]) {
        let compressed = compress(input);
        assert!(compressed.len() <= compress_bound(input.len()));
        let decompressed = decompress(&compressed, input.len().max(32));
        assert_eq!(decompressed, input);
    }

    /// Test that the compressed string decompresses to the original string.
    fn inverse(s: &str) {
        inverse_bytes(s.as_bytes());
    }

    #[test]
    fn shakespear() {
        inverse("to live or not to live");
        inverse("Love is a wonderful terrible thing");
        inverse("There is nothing either good or bad, but thinking makes it so.");
        inverse("I burn, I pine, I perish.");
    }

    #[test]
    fn save_the_pandas() {
        inverse("To cute to die! Save the red panda!");
        inverse("You are 60% water. Save 60% of yourself!");
        inverse("The average panda eats as much as 9 to 14 kg of bamboo shoots a day.");
        inverse("The Empress Dowager Bo was buried with a panda skull in her vault");
    }

    #[test]
    fn not_compressible() {
        inverse("as6yhol.;jrew5tyuikbfewedfyjltre22459ba");
        inverse("jhflkdjshaf9p8u89ybkvjsdbfkhvg4ut08yfrr");
    }

    #[test]
    fn short() {
        inverse("ahhd");
        inverse("ahd");
        inverse("x-29");
        inverse("x");
        inverse("k");
        inverse(".");
        inverse("ajsdh");
    }

    #[test]
    fn empty_string() {
        inverse("");
    }

    #[test]
    fn nulls() {
        inverse("\0\0\0\0\0\0\0\0\0\0\0\0\0");
    }

    #[test]
    fn one_repeated_byte() {
        // Maximal match density: every symbol after the warm-up is a match.
        inverse_bytes(&vec![b'z'; MAX_COMPRESS_LEN]);
        inverse_bytes(&vec![0u8; 1000]);
    }

    #[test]
    fn all_byte_values() {
        // Maximal alphabet, repeated so matches appear too.
        let mut input = Vec::with_capacity(8192);
        for round in 0..32 {
            for value in 0..=255u8 {
                input.push(value.wrapping_add(round));
            }
        }
        inverse_bytes(&input);
    }

    #[test]
    fn no_matches_possible() {
        // Every 4-byte window is distinct (the counter's high byte stays
        // below 8, so the 0xAA/0x55 sentinels pin each window's phase), so
        // no match symbols are emitted and the whole block is literals.
        let mut input = Vec::with_capacity(8192);
        for i in 0..2048u16 {
            let [lo, hi] = i.to_le_bytes();
            input.extend_from_slice(&[lo, hi, 0xAA, 0x55]);
        }
        inverse_bytes(&input);
    }

    #[test]
    fn exactly_one_full_block() {
        let input: Vec<u8> = (0..MAX_COMPRESS_LEN as u32)
            .map(|i| (i / 7 % 256) as u8)
            .collect();
        assert_eq!(input.len(), MAX_COMPRESS_LEN);
        inverse_bytes(&input);
    }

    #[test]
    fn compression_works() {
        let s = "The Read trait allows for reading bytes from a source. Implementors of \
                 the Read trait are called 'readers'. Readers are defined by one required \
                 method, read().";
        let input: Vec<u8> = s.as_bytes().iter().cycle().take(16384).copied().collect();

        inverse_bytes(&input);
        assert!(compress(&input).len() < input.len());
        assert!(str::from_utf8(&input).is_ok());
    }

    #[test]
    fn big_compression() {
        let mut input = Vec::with_capacity(MAX_COMPRESS_LEN);
        for n in 0..MAX_COMPRESS_LEN {
            input.push((n as u8).wrapping_mul(0xA).wrapping_add(33) ^ 0xA2);
        }
        inverse_bytes(&input);
    }
}
