use std::io::{self, Read, Seek, Write};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::result::{Error, Result};

const CHUNK: usize = 8192;

/// Forward-reading view over the byte source that keeps track of the
/// absolute stream offset, so primitive positions can be patched later.
#[derive(Debug)]
pub(crate) struct StreamCursor<R> {
    inner: R,
    position: u64,
}

impl<R> StreamCursor<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<R: Seek> StreamCursor<R> {
    /// Starts counting from wherever the source currently is, so recorded
    /// offsets stay valid for seek-back patching.
    pub fn at_stream_position(mut inner: R) -> Result<Self> {
        let position = inner.stream_position()?;
        Ok(Self { inner, position })
    }
}

impl<R: Read> StreamCursor<R> {
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(short_read)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Reads `len` bytes without trusting `len` enough to preallocate it.
    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; CHUNK];
        let mut remaining = len;
        while remaining > 0 {
            let take = remaining.min(CHUNK);
            self.fill(&mut chunk[..take])?;
            buf.extend_from_slice(&chunk[..take]);
            remaining -= take;
        }
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let v = self.inner.read_u8().map_err(short_read)?;
        self.position += 1;
        Ok(v)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        let v = self.inner.read_i8().map_err(short_read)?;
        self.position += 1;
        Ok(v)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let v = self.inner.read_i16::<LittleEndian>().map_err(short_read)?;
        self.position += 2;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let v = self.inner.read_u16::<LittleEndian>().map_err(short_read)?;
        self.position += 2;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let v = self.inner.read_i32::<LittleEndian>().map_err(short_read)?;
        self.position += 4;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let v = self.inner.read_u32::<LittleEndian>().map_err(short_read)?;
        self.position += 4;
        Ok(v)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let v = self.inner.read_i64::<LittleEndian>().map_err(short_read)?;
        self.position += 8;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let v = self.inner.read_u64::<LittleEndian>().map_err(short_read)?;
        self.position += 8;
        Ok(v)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let v = self.inner.read_f32::<LittleEndian>().map_err(short_read)?;
        self.position += 4;
        Ok(v)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let v = self.inner.read_f64::<LittleEndian>().map_err(short_read)?;
        self.position += 8;
        Ok(v)
    }
}

impl<R: Read + Write + Seek> StreamCursor<R> {
    /// Writes `bytes` at `pos` and restores the prior read position.
    pub fn patch(&mut self, pos: u64, bytes: &[u8]) -> Result<()> {
        self.inner.seek(io::SeekFrom::Start(pos))?;
        self.inner.write_all(bytes)?;
        self.inner.seek(io::SeekFrom::Start(self.position))?;
        Ok(())
    }
}

fn short_read(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::Truncated
    } else {
        Error::IoFailed(err)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn truncation_is_not_an_io_error() {
        let mut cursor = StreamCursor::new(io::Cursor::new(vec![1u8, 2]));
        assert_eq!(cursor.read_u16().unwrap(), 0x0201);
        assert_matches!(cursor.read_u32(), Err(Error::Truncated));
    }

    #[test]
    fn position_tracks_reads() {
        let mut cursor = StreamCursor::new(io::Cursor::new(vec![0u8; 16]));
        cursor.read_u8().unwrap();
        cursor.read_i32().unwrap();
        cursor.read_f64().unwrap();
        assert_eq!(cursor.position(), 13);
    }
}
