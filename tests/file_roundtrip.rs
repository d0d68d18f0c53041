#![cfg(unix)]

use czip::framed::{compress_file, decompress_file, DecompressionError};
use czip::MAX_COMPRESS_LEN;
use rand::prelude::*;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use tempfile::tempfile;

fn file_with(contents: &[u8]) -> File {
    let mut file = tempfile().unwrap();
    file.write_all(contents).unwrap();
    file
}

fn contents_of(file: &mut File) -> Vec<u8> {
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.read_to_end(&mut buf).unwrap();
    buf
}

fn round_trip(contents: &[u8]) {
    let input = file_with(contents);
    let compressed = tempfile().unwrap();
    compress_file(&input, 0, &compressed, 0).unwrap();

    let mut restored = tempfile().unwrap();
    decompress_file(&compressed, 0, &restored, 0).unwrap();
    assert_eq!(contents_of(&mut restored), contents);
}

#[test]
fn multi_chunk_mixed_data() {
    // Five full chunks plus a short tail: compressible text, raw noise and
    // long zero runs, so both block flavors appear in one file.
    let mut data = Vec::with_capacity(5 * MAX_COMPRESS_LEN + 999);
    while data.len() < 2 * MAX_COMPRESS_LEN {
        data.extend_from_slice(b"What a piece of work is a man! How noble in reason! ");
    }
    let noise_until = 3 * MAX_COMPRESS_LEN + 500;
    let mut noise = vec![0u8; noise_until - data.len()];
    thread_rng().fill(&mut noise[..]);
    data.extend_from_slice(&noise);
    data.resize(5 * MAX_COMPRESS_LEN + 999, 0);

    round_trip(&data);
}

#[test]
fn single_short_chunk() {
    round_trip(b"just one tiny chunk");
}

#[test]
fn exactly_chunk_aligned() {
    let data: Vec<u8> = (0..2 * MAX_COMPRESS_LEN).map(|i| (i / 9) as u8).collect();
    round_trip(&data);
}

#[test]
fn offsets_are_respected() {
    let contents = b"0123456789abcdef0123456789abcdef".repeat(64);
    let mut input = file_with(b"SKIP");
    input.write_all(&contents).unwrap();

    let compressed = file_with(b"PREFIX--");
    compress_file(&input, 4, &compressed, 8).unwrap();

    let mut restored = tempfile().unwrap();
    decompress_file(&compressed, 8, &restored, 0).unwrap();
    assert_eq!(contents_of(&mut restored), contents);
}

#[test]
fn compressed_output_is_smaller_for_text() {
    let mut data = Vec::new();
    while data.len() < 4 * MAX_COMPRESS_LEN {
        data.extend_from_slice(b"the quick brown fox jumps over the lazy dog. ");
    }
    let input = file_with(&data);
    let compressed = tempfile().unwrap();
    compress_file(&input, 0, &compressed, 0).unwrap();
    assert!(compressed.metadata().unwrap().len() < data.len() as u64);
}

#[test]
fn empty_input_is_rejected() {
    let input = tempfile().unwrap();
    let output = tempfile().unwrap();
    assert!(compress_file(&input, 0, &output, 0).is_err());
    assert!(decompress_file(&input, 0, &output, 0).is_err());

    // An offset at or past the end is just as empty.
    let input = file_with(b"abc");
    assert!(compress_file(&input, 3, &output, 0).is_err());
}

#[test]
fn non_regular_files_are_rejected() {
    let devnull = File::open("/dev/null").unwrap();
    let regular = file_with(b"some perfectly fine bytes");
    let output = tempfile().unwrap();
    assert!(compress_file(&devnull, 0, &output, 0).is_err());
    assert!(compress_file(&regular, 0, &devnull, 0).is_err());
    assert!(decompress_file(&devnull, 0, &output, 0).is_err());
}

#[test]
fn corrupt_length_prefix_fails_cleanly() {
    let data = vec![42u8; 3 * MAX_COMPRESS_LEN];
    let input = file_with(&data);
    let compressed = tempfile().unwrap();
    compress_file(&input, 0, &compressed, 0).unwrap();

    // Claim the first block is absurdly long.
    compressed.write_all_at(&u32::MAX.to_le_bytes(), 0).unwrap();
    let restored = tempfile().unwrap();
    match decompress_file(&compressed, 0, &restored, 0) {
        Err(DecompressionError::OversizedBlock) => {}
        other => panic!("expected OversizedBlock, got {:?}", other),
    }

    // Claim a length that runs off the end of the file.
    let plausible = (MAX_COMPRESS_LEN as u32).to_le_bytes();
    compressed.write_all_at(&plausible, 0).unwrap();
    match decompress_file(&compressed, 0, &restored, 0) {
        Err(DecompressionError::TruncatedBlock) | Err(DecompressionError::Codec(_)) => {}
        other => panic!("expected a scan or codec error, got {:?}", other),
    }
}

#[test]
fn corrupt_block_payload_fails_cleanly() {
    let mut data = Vec::new();
    while data.len() < MAX_COMPRESS_LEN {
        data.extend_from_slice(b"round and round the rugged rock ");
    }
    let input = file_with(&data);
    let compressed = tempfile().unwrap();
    compress_file(&input, 0, &compressed, 0).unwrap();

    // Scramble bytes inside the first block's payload.
    compressed.write_all_at(&[0xFF; 16], 32).unwrap();
    let restored = tempfile().unwrap();
    let _ = decompress_file(&compressed, 0, &restored, 0);
}

#[test]
fn zero_terminator_ends_the_stream() {
    let data = b"a block that will be followed by a terminator and trailing junk".repeat(100);
    let input = file_with(&data);
    let compressed = tempfile().unwrap();
    compress_file(&input, 0, &compressed, 0).unwrap();

    // Anything after the zero terminator must be ignored.
    let end = compressed.metadata().unwrap().len();
    compressed.write_all_at(b"JUNKJUNKJUNK", end).unwrap();
    let mut restored = tempfile().unwrap();
    decompress_file(&compressed, 0, &restored, 0).unwrap();
    assert_eq!(contents_of(&mut restored), data);
}
