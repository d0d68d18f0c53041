use byteorder::{ByteOrder, LE};
use fehler::{throw, throws};
use log::debug;
use std::fs::File;
use std::hint;
use std::io;
use std::os::unix::fs::FileExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::SeqCst};
use std::thread;
use thiserror::Error;

use super::{read_full_at, MAX_PROCS};
use crate::raw::{compress_block, compress_bound, EncodeError};
use crate::MAX_COMPRESS_LEN;

/// Errors when compressing a file.
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("input and output must both be regular files")]
    NotRegularFile,
    #[error("there is nothing to compress at the given offset")]
    EmptyInput,
    #[error("error reading from or writing to a file")]
    Io(#[from] io::Error),
    #[error("the block encoder rejected a chunk")]
    Encode(#[from] EncodeError),
}
type Error = CompressionError;

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        io::Error::new(io::ErrorKind::Other, e)
    }
}

/// `next_write` holds this while a worker owns the write slot.
const WRITE_SLOT_BUSY: u64 = u64::MAX;

/// Shared by all workers; everything mutable is an atomic.
struct Control {
    next_chunk: AtomicU64,
    next_write: AtomicU64,
    out_offset: AtomicU64,
    failed: AtomicBool,
    chunks: u64,
    in_offset: u64,
}

/// Compress everything from `in_offset` to the end of `input` into `output`
/// at `out_offset`, as length-prefixed blocks of `MAX_COMPRESS_LEN`-sized
/// chunks followed by a zero-length terminator. Chunks are compressed in
/// parallel but land in the output strictly in order.
#[throws]
pub fn compress_file(input: &File, in_offset: u64, output: &File, out_offset: u64) {
    let in_meta = input.metadata()?;
    let out_meta = output.metadata()?;
    if !in_meta.is_file() || !out_meta.is_file() {
        throw!(Error::NotRegularFile);
    }
    let size = in_meta.len();
    if size <= in_offset {
        throw!(Error::EmptyInput);
    }

    let chunk_size = MAX_COMPRESS_LEN as u64;
    let chunks = (size - in_offset + chunk_size - 1) / chunk_size;
    let procs = chunks.min(MAX_PROCS);
    let control = Control {
        next_chunk: AtomicU64::new(0),
        next_write: AtomicU64::new(0),
        out_offset: AtomicU64::new(out_offset),
        failed: AtomicBool::new(false),
        chunks,
        in_offset,
    };
    debug!(
        "compressing {} bytes as {} chunks on {} workers",
        size - in_offset,
        chunks,
        procs
    );

    let result = thread::scope(|scope| {
        let mut workers = Vec::with_capacity(procs as usize - 1);
        for _ in 1..procs {
            workers.push(scope.spawn(|| run_worker(&control, input, output)));
        }
        let mut result = run_worker(&control, input, output);
        for worker in workers {
            match worker.join() {
                Ok(worker_result) => {
                    if result.is_ok() {
                        result = worker_result;
                    }
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        result
    });
    result?;

    output.write_all_at(&[0u8; 4], control.out_offset.load(SeqCst))?;
}

fn run_worker(control: &Control, input: &File, output: &File) -> Result<(), Error> {
    let mut in_buf = vec![0u8; MAX_COMPRESS_LEN];
    let mut out_buf = vec![0u8; 4 + compress_bound(MAX_COMPRESS_LEN)];
    loop {
        let chunk = control.next_chunk.fetch_add(1, SeqCst);
        if chunk >= control.chunks || control.failed.load(SeqCst) {
            return Ok(());
        }
        if let Err(error) = compress_chunk(control, input, output, chunk, &mut in_buf, &mut out_buf)
        {
            control.failed.store(true, SeqCst);
            return Err(error);
        }
    }
}

#[throws]
fn compress_chunk(
    control: &Control,
    input: &File,
    output: &File,
    chunk: u64,
    in_buf: &mut [u8],
    out_buf: &mut [u8],
) {
    let read = read_full_at(
        input,
        in_buf,
        control.in_offset + chunk * MAX_COMPRESS_LEN as u64,
    )?;
    let len = compress_block(&in_buf[..read], &mut out_buf[4..])?;
    LE::write_u32(&mut out_buf[..4], len as u32);

    // Spin until this chunk owns the write slot. A sibling that failed while
    // holding an earlier slot will never release it, so bail on its flag
    // instead of spinning forever.
    while control
        .next_write
        .compare_exchange(chunk, WRITE_SLOT_BUSY, SeqCst, SeqCst)
        .is_err()
    {
        if control.failed.load(SeqCst) {
            return;
        }
        hint::spin_loop();
    }

    let out_offset = control.out_offset.load(SeqCst);
    let written = output.write_all_at(&out_buf[..len + 4], out_offset);
    control.out_offset.fetch_add(len as u64 + 4, SeqCst);
    control.next_write.store(chunk + 1, SeqCst);
    written?;
}
