//! Little-endian binary framing over `Read`/`Write`.
//!
//! Strings are length-prefixed: a u32 byte count followed by UTF-8. On
//! read, a prefix beyond 1 MiB is treated as corruption rather than an
//! allocation request.

use super::types::{constants, FileError};
use std::io::{Read, Write};

/// Little-endian writer that tracks how many bytes it has produced.
pub struct BinaryWriter<W: Write> {
    inner: W,
    bytes_written: u64,
}

impl<W: Write> BinaryWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), FileError> {
        self.inner
            .write_all(bytes)
            .map_err(FileError::from_write)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), FileError> {
        self.write_bytes(&[value])
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), FileError> {
        self.write_u8(value as u8)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), FileError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), FileError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), FileError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), FileError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), FileError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), FileError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// u32 length prefix followed by UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) -> Result<(), FileError> {
        self.write_u32(value.len() as u32)?;
        self.write_bytes(value.as_bytes())
    }

    /// u32 length prefix followed by raw bytes.
    pub fn write_blob(&mut self, value: &[u8]) -> Result<(), FileError> {
        self.write_u32(value.len() as u32)?;
        self.write_bytes(value)
    }

    pub fn write_vec3(&mut self, value: [f32; 3]) -> Result<(), FileError> {
        for component in value {
            self.write_f32(component)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), FileError> {
        self.inner.flush().map_err(FileError::from_write)
    }
}

/// Little-endian reader that tracks how many bytes it has consumed.
pub struct BinaryReader<R: Read> {
    inner: R,
    bytes_read: u64,
}

impl<R: Read> BinaryReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, FileError> {
        let mut buffer = vec![0u8; len];
        self.inner
            .read_exact(&mut buffer)
            .map_err(FileError::from_read)?;
        self.bytes_read += len as u64;
        Ok(buffer)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FileError> {
        let mut buffer = [0u8; N];
        self.inner
            .read_exact(&mut buffer)
            .map_err(FileError::from_read)?;
        self.bytes_read += N as u64;
        Ok(buffer)
    }

    pub fn read_u8(&mut self) -> Result<u8, FileError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, FileError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, FileError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, FileError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a u32 if the stream has more data; `Ok(None)` at a clean end
    /// of stream, an error on a partial value.
    pub fn try_read_u32(&mut self) -> Result<Option<u32>, FileError> {
        let mut buffer = [0u8; 4];
        let mut filled = 0;
        while filled < buffer.len() {
            match self.inner.read(&mut buffer[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(FileError::CorruptedData(
                        "truncated value at end of stream".to_string(),
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FileError::from_read(e)),
            }
        }
        self.bytes_read += 4;
        Ok(Some(u32::from_le_bytes(buffer)))
    }

    pub fn read_u64(&mut self) -> Result<u64, FileError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, FileError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, FileError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, FileError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_string(&mut self) -> Result<String, FileError> {
        let len = self.read_u32()?;
        if len > constants::MAX_STRING_LEN {
            return Err(FileError::CorruptedData(format!(
                "string length {len} exceeds limit"
            )));
        }
        let bytes = self.read_bytes(len as usize)?;
        String::from_utf8(bytes)
            .map_err(|e| FileError::CorruptedData(format!("invalid UTF-8 string: {e}")))
    }

    pub fn read_blob(&mut self) -> Result<Vec<u8>, FileError> {
        let len = self.read_u32()?;
        if len > constants::MAX_CHUNK_SIZE {
            return Err(FileError::CorruptedData(format!(
                "blob length {len} exceeds limit"
            )));
        }
        self.read_bytes(len as usize)
    }

    pub fn read_vec3(&mut self) -> Result<[f32; 3], FileError> {
        Ok([self.read_f32()?, self.read_f32()?, self.read_f32()?])
    }

    /// Discard `len` bytes.
    pub fn skip(&mut self, len: u64) -> Result<(), FileError> {
        let copied = std::io::copy(&mut self.inner.by_ref().take(len), &mut std::io::sink())
            .map_err(FileError::from_read)?;
        if copied != len {
            return Err(FileError::CorruptedData(
                "unexpected end of file while skipping".to_string(),
            ));
        }
        self.bytes_read += len;
        Ok(())
    }
}
