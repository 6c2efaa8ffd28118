use crate::error::{Error, Result};
use byteorder::{ReadBytesExt, BE, LE};
use std::io::{self, Cursor, Read, Seek, SeekFrom};

const CSTR_CHUNK: usize = 64;

/// A seekable byte source whose length is known up front.
///
/// Every read is checked against that length before any buffer is allocated,
/// so a lying header can never make us read past the end of the file.
#[derive(Debug)]
pub struct Stream<R> {
    inner: R,
    len: u64,
}

impl<R: Read + Seek> Stream<R> {
    pub fn new(mut inner: R) -> io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads `len` bytes from the start of the stream, or `None` if the file
    /// is too short or the read fails.
    pub fn probe(&mut self, len: usize) -> Option<Vec<u8>> {
        self.probe_at(0, len)
    }

    pub fn probe_at(&mut self, offset: u64, len: usize) -> Option<Vec<u8>> {
        let end = offset.checked_add(len as u64)?;
        if end > self.len {
            return None;
        }
        let mut buf = vec![0u8; len];
        self.inner.seek(SeekFrom::Start(offset)).ok()?;
        self.inner.read_exact(&mut buf).ok()?;
        Some(buf)
    }

    /// Reads exactly `len` bytes at `offset`.
    ///
    /// `what` names the region in the error message.
    pub fn read_at(&mut self, offset: u64, len: u64, what: &str) -> Result<Vec<u8>> {
        let end = offset.checked_add(len).ok_or_else(|| {
            Error::malformed(format!("{what}: offset {offset:#x} + size {len:#x} overflows"))
        })?;
        if end > self.len {
            return Err(Error::malformed(format!(
                "{what}: range {offset:#x}..{end:#x} exceeds file length {:#x}",
                self.len
            )));
        }
        let size = usize::try_from(len)
            .map_err(|_| Error::malformed(format!("{what}: size {len:#x} is not addressable")))?;

        let mut buf = vec![0u8; size];
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a NUL-terminated string of at most `limit` bytes, terminator
    /// included, starting at `offset`.
    ///
    /// Running out of the limit or the file before a terminator is a
    /// malformed binary.
    pub fn read_cstr_at(&mut self, offset: u64, limit: u64, what: &str) -> Result<String> {
        let end = offset.saturating_add(limit).min(self.len);
        let mut bytes = Vec::new();
        let mut pos = offset;
        loop {
            if pos >= end {
                return Err(Error::malformed(format!(
                    "{what}: unterminated string at {offset:#x}"
                )));
            }
            let take = (end - pos).min(CSTR_CHUNK as u64);
            let chunk = self.read_at(pos, take, what)?;
            if let Some(nul) = chunk.iter().position(|&b| b == 0) {
                bytes.extend_from_slice(&chunk[..nul]);
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
            bytes.extend_from_slice(&chunk);
            pos += take;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Sequential field decoder over a record that has already been read in full.
///
/// Running off the end of the record means the record itself was too short,
/// which is reported as a malformed binary rather than an I/O failure.
pub struct Fields<'a> {
    cur: Cursor<&'a [u8]>,
    endian: Endian,
}

fn short(e: io::Error) -> Error {
    Error::malformed(format!("record too short: {e}"))
}

impl<'a> Fields<'a> {
    pub fn new(buf: &'a [u8], endian: Endian) -> Self {
        Self {
            cur: Cursor::new(buf),
            endian,
        }
    }

    pub fn le(buf: &'a [u8]) -> Self {
        Self::new(buf, Endian::Little)
    }

    pub fn skip(&mut self, n: u64) {
        let pos = self.cur.position();
        self.cur.set_position(pos.saturating_add(n));
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.cur.read_u8().map_err(short)
    }

    pub fn u16(&mut self) -> Result<u16> {
        match self.endian {
            Endian::Little => self.cur.read_u16::<LE>(),
            Endian::Big => self.cur.read_u16::<BE>(),
        }
        .map_err(short)
    }

    pub fn u32(&mut self) -> Result<u32> {
        match self.endian {
            Endian::Little => self.cur.read_u32::<LE>(),
            Endian::Big => self.cur.read_u32::<BE>(),
        }
        .map_err(short)
    }

    pub fn u64(&mut self) -> Result<u64> {
        match self.endian {
            Endian::Little => self.cur.read_u64::<LE>(),
            Endian::Big => self.cur.read_u64::<BE>(),
        }
        .map_err(short)
    }

    /// Reads an address-sized field, widening 32-bit values.
    pub fn word(&mut self, wide: bool) -> Result<u64> {
        if wide {
            self.u64()
        } else {
            self.u32().map(u64::from)
        }
    }

    pub fn bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        self.cur.read_exact(&mut out).map_err(short)?;
        Ok(out)
    }
}

/// Decodes a fixed-width, NUL-padded name field.
pub fn fixed_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
