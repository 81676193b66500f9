//! Buffer compression.
//!
//! Two codecs live here: deflate (via `flate2`) for chunk payloads and
//! the self-contained headered container, and a byte-oriented RLE used by
//! state snapshots. The headered container frames a deflated payload with
//! magic, original/compressed sizes and a CRC so it can be validated
//! standalone.

use super::types::FileError;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Crc;
use std::io::{Read, Write};

/// Magic identifying a headered compressed buffer.
const COMPRESSION_MAGIC: u32 = u32::from_le_bytes(*b"VCMP");
/// Bytes of the headered-container prefix.
pub const COMPRESSION_HEADER_SIZE: usize = 16;

/// Raw deflate of a buffer at the given level (0-9).
pub fn deflate_compress(input: &[u8], level: u32) -> Result<Vec<u8>, FileError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), flate2::Compression::new(level.min(9)));
    encoder
        .write_all(input)
        .map_err(|e| FileError::CompressionError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| FileError::CompressionError(e.to_string()))
}

/// Inverse of [`deflate_compress`]. `expected_size` bounds the output and
/// catches truncated or inflated payloads.
pub fn deflate_decompress(input: &[u8], expected_size: usize) -> Result<Vec<u8>, FileError> {
    let mut output = Vec::with_capacity(expected_size);
    let mut decoder = DeflateDecoder::new(input).take(expected_size as u64 + 1);
    decoder
        .read_to_end(&mut output)
        .map_err(|e| FileError::CompressionError(e.to_string()))?;
    if output.len() != expected_size {
        return Err(FileError::CompressionError(format!(
            "decompressed {} bytes, expected {}",
            output.len(),
            expected_size
        )));
    }
    Ok(output)
}

/// CRC-32 (poly 0xEDB88320) of a buffer.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    crc.sum()
}

/// Compress into the headered container: magic, original size,
/// compressed size, CRC-32 of the original bytes, deflate payload.
pub fn compress_buffer(input: &[u8], level: u32) -> Result<Vec<u8>, FileError> {
    let payload = deflate_compress(input, level)?;
    let mut output = Vec::with_capacity(COMPRESSION_HEADER_SIZE + payload.len());
    output.extend_from_slice(&COMPRESSION_MAGIC.to_le_bytes());
    output.extend_from_slice(&(input.len() as u32).to_le_bytes());
    output.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    output.extend_from_slice(&crc32(input).to_le_bytes());
    output.extend_from_slice(&payload);
    Ok(output)
}

/// Decompress a headered container produced by [`compress_buffer`].
pub fn decompress_buffer(input: &[u8]) -> Result<Vec<u8>, FileError> {
    if input.len() < COMPRESSION_HEADER_SIZE {
        return Err(FileError::CompressionError(
            "input shorter than compression header".to_string(),
        ));
    }
    let word = |at: usize| {
        u32::from_le_bytes([input[at], input[at + 1], input[at + 2], input[at + 3]])
    };
    if word(0) != COMPRESSION_MAGIC {
        return Err(FileError::CompressionError(
            "bad compression magic".to_string(),
        ));
    }
    let original_size = word(4) as usize;
    let compressed_size = word(8) as usize;
    let checksum = word(12);
    let payload = &input[COMPRESSION_HEADER_SIZE..];
    if payload.len() != compressed_size {
        return Err(FileError::CompressionError(format!(
            "payload is {} bytes, header says {}",
            payload.len(),
            compressed_size
        )));
    }
    let output = deflate_decompress(payload, original_size)?;
    if crc32(&output) != checksum {
        return Err(FileError::CorruptedData(
            "compressed buffer checksum mismatch".to_string(),
        ));
    }
    Ok(output)
}

/// Whether a buffer starts with the headered-container magic.
pub fn is_compressed_buffer(input: &[u8]) -> bool {
    input.len() >= 4 && input[..4] == COMPRESSION_MAGIC.to_le_bytes()
}

/// Run-length encode: pairs of `(run_length, byte)` with runs capped at
/// 255.
pub fn rle_encode(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::new();
    let mut i = 0;
    while i < input.len() {
        let value = input[i];
        let mut run = 1usize;
        while i + run < input.len() && run < 255 && input[i + run] == value {
            run += 1;
        }
        output.push(run as u8);
        output.push(value);
        i += run;
    }
    output
}

/// Inverse of [`rle_encode`]. A trailing half-pair is corruption.
pub fn rle_decode(input: &[u8]) -> Result<Vec<u8>, FileError> {
    if input.len() % 2 != 0 {
        return Err(FileError::CorruptedData(
            "RLE stream has a dangling half-pair".to_string(),
        ));
    }
    let mut output = Vec::new();
    for pair in input.chunks_exact(2) {
        let count = pair[0] as usize;
        let value = pair[1];
        output.extend(std::iter::repeat(value).take(count));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deflate_roundtrip() {
        let data: Vec<u8> = (0..2048u32).map(|i| (i % 7) as u8).collect();
        let packed = deflate_compress(&data, 6).unwrap();
        assert!(packed.len() < data.len());
        let unpacked = deflate_decompress(&packed, data.len()).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn test_headered_container_roundtrip() {
        let data = b"the same bytes over and over and over and over again".repeat(20);
        let packed = compress_buffer(&data, 9).unwrap();
        assert!(is_compressed_buffer(&packed));
        assert_eq!(decompress_buffer(&packed).unwrap(), data);
    }

    #[test]
    fn test_container_detects_corruption() {
        let data = vec![42u8; 512];
        let mut packed = compress_buffer(&data, 6).unwrap();
        // Flip a payload byte; either inflate fails or the CRC catches it.
        let last = packed.len() - 1;
        packed[last] ^= 0xFF;
        assert!(decompress_buffer(&packed).is_err());
    }

    #[test]
    fn test_container_rejects_bad_magic() {
        let mut packed = compress_buffer(&[1, 2, 3], 6).unwrap();
        packed[0] = b'X';
        assert!(matches!(
            decompress_buffer(&packed),
            Err(FileError::CompressionError(_))
        ));
    }

    #[test]
    fn test_rle_roundtrip() {
        let data = [0u8, 0, 0, 1, 1, 2, 3, 3, 3, 3];
        let packed = rle_encode(&data);
        assert_eq!(rle_decode(&packed).unwrap(), data);
    }

    #[test]
    fn test_rle_long_runs_split_at_255() {
        let data = vec![9u8; 600];
        let packed = rle_encode(&data);
        assert_eq!(packed.len(), 6);
        assert_eq!(packed[0], 255);
        assert_eq!(rle_decode(&packed).unwrap(), data);
    }

    #[test]
    fn test_rle_rejects_dangling_pair() {
        assert!(rle_decode(&[3]).is_err());
    }

    #[test]
    fn test_crc32_known_value() {
        // CRC-32 of "123456789" under poly 0xEDB88320.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }
}
