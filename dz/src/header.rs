//! Gzip header, RA extra field and trailer encoding
//!
//! ```text
//! +---+---+---+---+---+---+---+---+---+---+
//! |x1f|x8b| 8 |FLG|     MTIME     |XFL|OS |   FLG has FEXTRA set
//! +---+---+---+---+---+---+---+---+---+---+
//! | XLEN  |'R'|'A'|  LEN  |  VER  | CHLEN | CHCNT | size[0] ... size[CHCNT-1]
//! +-------+---+---+-------+-------+-------+-------+----------------------------
//! ```
//!
//! All multi-byte integers are little-endian. `XLEN = 10 + 2 * CHCNT` and
//! `LEN = 6 + 2 * CHCNT`. The trailer is CRC-32 followed by ISIZE.

use std::io::{self, Read};

use crate::error::{DictZipError, Result};

pub const GZIP_ID1: u8 = 0x1f;
pub const GZIP_ID2: u8 = 0x8b;
pub const CM_DEFLATE: u8 = 8;

pub const FLG_TEXT: u8 = 0x01;
pub const FLG_HCRC: u8 = 0x02;
pub const FLG_EXTRA: u8 = 0x04;
pub const FLG_NAME: u8 = 0x08;
pub const FLG_COMMENT: u8 = 0x10;

/// Extra flags value for "maximum compression"
pub const XFL_MAX: u8 = 2;
pub const OS_UNIX: u8 = 3;

pub const HEADER_SIZE: usize = 10;
pub const TRAILER_SIZE: usize = 8;

/// Subfield identifier of the chunk table
pub const RA_ID: [u8; 2] = *b"RA";
pub const RA_VERSION: u16 = 1;

/// Bytes of the RA subfield payload preceding the chunk sizes (VER, CHLEN, CHCNT)
const RA_FIXED_LEN: usize = 6;

/// Most chunks whose sizes still fit in the 16-bit XLEN
pub const MAX_CHUNK_COUNT: usize = (u16::MAX as usize - 4 - RA_FIXED_LEN) / 2;

/// Location of one compressed chunk within the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Start of the chunk relative to the first payload byte
    pub offset: u64,
    /// Length of the compressed chunk in bytes
    pub compressed_size: u32,
}

/// Parsed container header
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    pub flags: u8,
    pub mtime: u32,
    /// Uncompressed length of every chunk but the last
    pub chunk_len: usize,
    pub chunks: Vec<ChunkDescriptor>,
    /// Absolute file offset of the first compressed chunk
    pub payload_offset: u64,
}

impl ContainerHeader {
    /// Total compressed bytes covered by the chunk table
    pub fn compressed_len(&self) -> u64 {
        self.chunks
            .last()
            .map(|c| c.offset + u64::from(c.compressed_size))
            .unwrap_or(0)
    }
}

/// Gzip trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// CRC-32 of the whole uncompressed stream
    pub crc32: u32,
    /// Uncompressed size modulo 2^32
    pub size: u32,
}

impl Trailer {
    pub fn encode(&self) -> [u8; TRAILER_SIZE] {
        let mut buf = [0u8; TRAILER_SIZE];
        buf[..4].copy_from_slice(&self.crc32.to_le_bytes());
        buf[4..].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; TRAILER_SIZE]) -> Self {
        Self {
            crc32: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

/// Encode the fixed 10-byte header of a dictzip file
pub fn encode_header(mtime: u32) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0] = GZIP_ID1;
    header[1] = GZIP_ID2;
    header[2] = CM_DEFLATE;
    header[3] = FLG_EXTRA;
    header[4..8].copy_from_slice(&mtime.to_le_bytes());
    header[8] = XFL_MAX;
    header[9] = OS_UNIX;
    header
}

/// Encode XLEN plus the RA subfield for the given chunk sizes
pub fn encode_extra(chunk_len: usize, sizes: &[u32]) -> Result<Vec<u8>> {
    if chunk_len == 0 || chunk_len > crate::MAX_CHUNK_LEN {
        return Err(DictZipError::InvalidChunkLen(chunk_len));
    }
    if sizes.len() > MAX_CHUNK_COUNT {
        return Err(DictZipError::TooManyChunks { count: sizes.len() });
    }

    let len = RA_FIXED_LEN + 2 * sizes.len();
    let xlen = 4 + len;

    let mut extra = Vec::with_capacity(2 + xlen);
    extra.extend_from_slice(&(xlen as u16).to_le_bytes());
    extra.extend_from_slice(&RA_ID);
    extra.extend_from_slice(&(len as u16).to_le_bytes());
    extra.extend_from_slice(&RA_VERSION.to_le_bytes());
    extra.extend_from_slice(&(chunk_len as u16).to_le_bytes());
    extra.extend_from_slice(&(sizes.len() as u16).to_le_bytes());
    for &size in sizes {
        let size = u16::try_from(size).map_err(|_| DictZipError::ChunkTooLarge {
            size: size as usize,
        })?;
        extra.extend_from_slice(&size.to_le_bytes());
    }

    Ok(extra)
}

/// Reads header fields while keeping track of the absolute position
struct HeaderParser<'a, R> {
    inner: &'a mut R,
    pos: u64,
}

impl<'a, R: Read> HeaderParser<'a, R> {
    fn new(inner: &'a mut R) -> Self {
        Self { inner, pos: 0 }
    }

    fn bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf).map_err(truncated)?;
        self.pos += N as u64;
        Ok(buf)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.bytes::<2>()?))
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        let copied = io::copy(&mut self.inner.by_ref().take(n), &mut io::sink())?;
        if copied != n {
            return Err(DictZipError::MalformedHeader("unexpected end of file".to_string()));
        }
        self.pos += n;
        Ok(())
    }

    fn skip_zero_terminated(&mut self) -> Result<()> {
        loop {
            let [b] = self.bytes::<1>()?;
            if b == 0 {
                return Ok(());
            }
        }
    }
}

fn truncated(e: io::Error) -> DictZipError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        DictZipError::MalformedHeader("unexpected end of file".to_string())
    } else {
        DictZipError::Io(e)
    }
}

/// Parse the header, chunk table and optional fields from the start of a file
///
/// On return the reader is positioned at the first compressed chunk.
pub fn read_header<R: Read>(reader: &mut R) -> Result<ContainerHeader> {
    let mut p = HeaderParser::new(reader);

    let header = p.bytes::<HEADER_SIZE>().map_err(|e| match e {
        DictZipError::MalformedHeader(_) => DictZipError::NotGzip,
        other => other,
    })?;
    if header[0] != GZIP_ID1 || header[1] != GZIP_ID2 {
        return Err(DictZipError::NotGzip);
    }
    if header[2] != CM_DEFLATE {
        return Err(DictZipError::UnsupportedMethod(header[2]));
    }
    let flags = header[3];
    if flags & FLG_EXTRA == 0 {
        return Err(DictZipError::NotRandomAccess);
    }
    let mtime = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    let xlen = u64::from(p.u16()?);
    let extra_end = p.pos + xlen;
    let mut table: Option<(usize, Vec<ChunkDescriptor>)> = None;

    while p.pos < extra_end {
        if extra_end - p.pos < 4 {
            return Err(DictZipError::MalformedHeader("truncated extra subfield".to_string()));
        }
        let id = p.bytes::<2>()?;
        let len = u64::from(p.u16()?);
        if p.pos + len > extra_end {
            return Err(DictZipError::MalformedHeader(format!(
                "subfield length {} overruns extra field",
                len
            )));
        }

        if id != RA_ID || table.is_some() {
            p.skip(len)?;
            continue;
        }

        if len < RA_FIXED_LEN as u64 {
            return Err(DictZipError::MalformedHeader("RA subfield too short".to_string()));
        }
        let version = p.u16()?;
        if version != RA_VERSION {
            return Err(DictZipError::UnsupportedVersion(version));
        }
        let chunk_len = usize::from(p.u16()?);
        if chunk_len == 0 {
            return Err(DictZipError::InvalidChunkLen(0));
        }
        let count = usize::from(p.u16()?);
        let table_len = (RA_FIXED_LEN + 2 * count) as u64;
        if table_len > len {
            return Err(DictZipError::MalformedHeader(format!(
                "RA subfield holds {} bytes, {} chunks need {}",
                len, count, table_len
            )));
        }

        let mut chunks = Vec::with_capacity(count);
        let mut offset = 0u64;
        for _ in 0..count {
            let compressed_size = u32::from(p.u16()?);
            chunks.push(ChunkDescriptor {
                offset,
                compressed_size,
            });
            offset += u64::from(compressed_size);
        }
        p.skip(len - table_len)?;
        table = Some((chunk_len, chunks));
    }

    let (chunk_len, chunks) = table.ok_or(DictZipError::MissingChunkTable)?;

    if flags & FLG_NAME != 0 {
        p.skip_zero_terminated()?;
    }
    if flags & FLG_COMMENT != 0 {
        p.skip_zero_terminated()?;
    }
    if flags & FLG_HCRC != 0 {
        p.skip(2)?;
    }

    Ok(ContainerHeader {
        flags,
        mtime,
        chunk_len,
        chunks,
        payload_offset: p.pos,
    })
}
