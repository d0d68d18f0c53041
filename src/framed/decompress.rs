use byteorder::{ByteOrder, LE};
use fehler::{throw, throws};
use log::debug;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::SeqCst};
use std::thread;
use thiserror::Error;

use super::MAX_PROCS;
use crate::raw::{compress_bound, decompress_block, DecodeError};
use crate::MAX_COMPRESS_LEN;

/// Errors when decompressing a file.
#[derive(Error, Debug)]
pub enum DecompressionError {
    #[error("input and output must both be regular files")]
    NotRegularFile,
    #[error("there is nothing to decompress at the given offset")]
    EmptyInput,
    #[error("a block length prefix points past the end of the file")]
    TruncatedBlock,
    #[error("a block length prefix exceeds the maximum block size")]
    OversizedBlock,
    #[error("the block decoder failed (data corruption?)")]
    Codec(#[from] DecodeError),
    #[error("error reading from or writing to a file")]
    Io(#[from] io::Error),
}
type Error = DecompressionError;

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        io::Error::new(io::ErrorKind::Other, e)
    }
}

/// Shared by all workers. Decompression writes at a fixed stride, so the
/// only moving part is the chunk counter.
struct Control {
    next_chunk: AtomicU64,
    failed: AtomicBool,
    /// (payload offset, payload length) per chunk, from the prefix scan.
    chunk_spans: Vec<(u64, u32)>,
    out_offset: u64,
}

/// Decompress a file written by
/// [`compress_file`](super::compress_file), starting at `in_offset`, into
/// `output` at `out_offset`.
///
/// A single pass over the length prefixes derives every chunk's offset up
/// front; corrupt prefixes fail here, before any worker runs. The output is
/// then preallocated so the workers' fixed-stride pwrites can land in any
/// order.
#[throws]
pub fn decompress_file(input: &File, in_offset: u64, output: &File, out_offset: u64) {
    let in_meta = input.metadata()?;
    let out_meta = output.metadata()?;
    if !in_meta.is_file() || !out_meta.is_file() {
        throw!(Error::NotRegularFile);
    }
    let size = in_meta.len();
    if size <= in_offset {
        throw!(Error::EmptyInput);
    }

    let mut chunk_spans = Vec::new();
    let mut offset = in_offset;
    let mut prefix = [0u8; 4];
    while offset + 4 <= size {
        input.read_exact_at(&mut prefix, offset)?;
        let len = LE::read_u32(&prefix);
        if len == 0 {
            break;
        }
        if len as usize > compress_bound(MAX_COMPRESS_LEN) {
            throw!(Error::OversizedBlock);
        }
        let payload = offset + 4;
        if payload + u64::from(len) > size {
            throw!(Error::TruncatedBlock);
        }
        chunk_spans.push((payload, len));
        offset = payload + u64::from(len);
    }

    let chunks = chunk_spans.len() as u64;
    if chunks == 0 {
        output.set_len(out_offset)?;
        return;
    }
    let procs = chunks.min(MAX_PROCS);
    debug!("decompressing {} chunks on {} workers", chunks, procs);

    // Sparse preallocation; the final chunk's write sets the exact size.
    output.set_len(out_offset + (chunks - 1) * MAX_COMPRESS_LEN as u64)?;

    let control = Control {
        next_chunk: AtomicU64::new(0),
        failed: AtomicBool::new(false),
        chunk_spans,
        out_offset,
    };

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
}

fn run_worker(control: &Control, input: &File, output: &File) -> Result<(), Error> {
    let mut in_buf = vec![0u8; compress_bound(MAX_COMPRESS_LEN)];
    let mut out_buf = vec![0u8; MAX_COMPRESS_LEN];
    loop {
        let chunk = control.next_chunk.fetch_add(1, SeqCst);
        if chunk >= control.chunk_spans.len() as u64 || control.failed.load(SeqCst) {
            return Ok(());
        }
        if let Err(error) =
            decompress_chunk(control, input, output, chunk, &mut in_buf, &mut out_buf)
        {
            control.failed.store(true, SeqCst);
            return Err(error);
        }
    }
}

#[throws]
fn decompress_chunk(
    control: &Control,
    input: &File,
    output: &File,
    chunk: u64,
    in_buf: &mut [u8],
    out_buf: &mut [u8],
) {
    let (payload, len) = control.chunk_spans[chunk as usize];
    let block = &mut in_buf[..len as usize];
    input.read_exact_at(block, payload)?;
    let written = decompress_block(block, out_buf)?;
    output.write_all_at(
        &out_buf[..written],
        control.out_offset + chunk * MAX_COMPRESS_LEN as u64,
    )?;
}
