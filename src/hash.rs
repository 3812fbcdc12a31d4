//! Content hashing
//!
//! Snapshot entries carry the MD5 of the file content as 32 lowercase hex
//! characters. The hash is opaque everywhere else; it is only compared.

use std::path::Path;

use tokio::io::AsyncReadExt;

/// Bytes read per iteration when hashing a file
const READ_BLOCK: usize = 64 * 1024;

/// Compute the MD5 hex digest of a byte slice
pub fn compute_hash(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Compute the MD5 hex digest of a file without loading it whole
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; READ_BLOCK];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Blocking variant of [`hash_file`] for directory scans
pub fn hash_file_blocking(path: &Path) -> std::io::Result<String> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; READ_BLOCK];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Check that a string looks like an MD5 hex digest
pub fn is_content_hash(value: &str) -> bool {
    value.len() == 32 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
