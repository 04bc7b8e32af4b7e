//! DEFLATE (RFC 1950 zlib stream) for request bodies

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

/// Compress `data` into a zlib stream
pub fn zlib(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Compress `data`, or `None` if compression failed or did not make it
/// smaller. Callers send the raw data in that case.
pub fn deflate(data: &[u8]) -> Option<Vec<u8>> {
    let compressed = zlib(data).ok()?;
    (compressed.len() < data.len()).then_some(compressed)
}

/// Decompress a zlib stream
pub fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
