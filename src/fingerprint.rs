//! Content fingerprints for change detection.
//!
//! A fingerprint is the lowercase hex SHA-256 of a file's bytes, read in
//! fixed-size blocks so large files are never buffered whole.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

const BLOCK_SIZE: usize = 8192;

/// Hash everything `reader` yields.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut block = [0u8; BLOCK_SIZE];
    loop {
        let n = reader.read(&mut block)?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash the file at `path`.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    fingerprint_reader(file).map_err(|e| Error::io(path, e))
}
