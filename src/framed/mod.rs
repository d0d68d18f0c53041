//! The czip file format and its parallel pipeline.
//!
//! A compressed file is a plain concatenation of blocks, each prefixed by a
//! little-endian u32 byte length; a zero length terminates the file. Every
//! block covers exactly [`MAX_COMPRESS_LEN`](crate::MAX_COMPRESS_LEN) input
//! bytes (the last one may be short), so decompression can write every chunk
//! at a fixed stride with no coordination at all, while compression enforces
//! in-order output through a CAS-then-store handshake on a shared atomic.
//!
//! Workers are plain scoped threads sharing a mutex-free control block of
//! sequentially consistent atomics: a fetch-and-add hands out chunks, and
//! for compression exactly one worker at a time owns the write slot.

mod compress;
mod decompress;

pub use compress::*;
pub use decompress::*;

use fehler::{throw, throws};
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

/// Upper bound on pipeline workers, including the calling thread.
pub(crate) const MAX_PROCS: u64 = 8;

/// pread as much as is available at `offset`, short only at end-of-file.
#[throws(io::Error)]
pub(crate) fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => throw!(e),
        }
    }
    filled
}
