use byteorder::{ByteOrder, LE};
use czip::framed::{compress_file, decompress_file};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::process::exit;

const CZIP_MAGIC: u32 = 0xCC33_7711;
const CZIP_VERSION: u8 = 0;
/// u32 magic + u8 version ahead of the block stream.
const FILE_HEADER_LEN: u64 = 5;
const SUFFIX: &str = ".cz";

#[derive(Default)]
struct Config {
    decompress: bool,
    keep: bool,
    help: bool,
    version: bool,
    file: Option<String>,
}

fn parse_args() -> Result<Config, String> {
    let mut config = Config::default();
    for arg in env::args().skip(1) {
        if !arg.starts_with('-') {
            if config.file.is_some() {
                return Err("multiple files specified".into());
            }
            config.file = Some(arg);
            continue;
        }
        match arg.as_str() {
            "-d" | "--decompress" => config.decompress = true,
            "-k" | "--keep" => config.keep = true,
            "-h" | "--help" => config.help = true,
            "-v" | "--version" => config.version = true,
            "-c" | "--console" => {
                return Err("streaming to the console is not supported".into())
            }
            other => return Err(format!("illegal option: '{}'", other)),
        }
    }
    Ok(config)
}

fn usage() {
    println!("Usage: czip [OPTION]... [FILE]");
    println!("-d, --decompress    decompress");
    println!("-h, --help          print this message");
    println!("-v, --version       print version");
    println!("-k, --keep          keep original file");
}

fn open_output(path: &str) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)
}

fn compress(path: &str, keep: bool) -> Result<(), String> {
    let input = File::open(path).map_err(|e| format!("could not open '{}': {}", path, e))?;
    let out_path = format!("{}{}", path, SUFFIX);
    let output =
        open_output(&out_path).map_err(|e| format!("could not open '{}': {}", out_path, e))?;

    let mut header = [0u8; FILE_HEADER_LEN as usize];
    LE::write_u32(&mut header[..4], CZIP_MAGIC);
    header[4] = CZIP_VERSION;
    output
        .write_all_at(&header, 0)
        .and_then(|_| compress_file(&input, 0, &output, FILE_HEADER_LEN).map_err(io::Error::from))
        .map_err(|e| format!("compressing '{}' failed: {}", path, e))?;

    if !keep {
        fs::remove_file(path).map_err(|e| format!("could not remove '{}': {}", path, e))?;
    }
    Ok(())
}

fn decompress(path: &str, keep: bool) -> Result<(), String> {
    let out_path = path
        .strip_suffix(SUFFIX)
        .ok_or_else(|| format!("'{}' does not end in {}", path, SUFFIX))?
        .to_string();
    let input = File::open(path).map_err(|e| format!("could not open '{}': {}", path, e))?;

    let mut header = [0u8; FILE_HEADER_LEN as usize];
    input
        .read_exact_at(&mut header, 0)
        .map_err(|e| format!("could not read header of '{}': {}", path, e))?;
    if LE::read_u32(&header[..4]) != CZIP_MAGIC || header[4] != CZIP_VERSION {
        return Err(format!("'{}' is not a czip file (bad magic or version)", path));
    }

    let output =
        open_output(&out_path).map_err(|e| format!("could not open '{}': {}", out_path, e))?;
    decompress_file(&input, FILE_HEADER_LEN, &output, 0)
        .map_err(|e| format!("decompressing '{}' failed: {}", path, e))?;

    if !keep {
        fs::remove_file(path).map_err(|e| format!("could not remove '{}': {}", path, e))?;
    }
    Ok(())
}

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{}", message);
            usage();
            exit(1);
        }
    };

    if config.version {
        println!("czip {}", env!("CARGO_PKG_VERSION"));
        return;
    }
    if config.help {
        usage();
        return;
    }
    let path = match config.file {
        Some(ref path) => path,
        None => {
            eprintln!("file name must be specified");
            usage();
            exit(1);
        }
    };

    let result = if config.decompress {
        decompress(path, config.keep)
    } else {
        compress(path, config.keep)
    };
    if let Err(message) = result {
        eprintln!("{}", message);
        exit(1);
    }
}
