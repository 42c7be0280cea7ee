//! Content addressing helpers
//!
//! Segments and fragments are named by the lowercase hex SHA-256 of their
//! bytes. Files are written through a temporary sibling and renamed so a
//! partially written file is never visible under its final name.

use crate::error::Result;
use crate::HASH_HEX_LEN;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Raw SHA-256 of `data`
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// Whether `name` is a 64-character lowercase hex digest
pub fn is_hash_name(name: &str) -> bool {
    name.len() == HASH_HEX_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Write `data` to `path` via a temporary sibling file and an atomic rename
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = tmp_sibling(path);
    let result = (|| -> io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    Ok(result?)
}

/// Hash `data` and store it in `dir` under its own hash
pub fn write_content_addressed(dir: &Path, data: &[u8]) -> Result<(String, PathBuf)> {
    let hash = sha256_hex(data);
    let path = dir.join(&hash);
    write_atomic(&path, data)?;
    Ok((hash, path))
}

/// Fill `buf` from `reader`, stopping early only at end of input.
///
/// Returns the number of bytes read.
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
