//! Random-access dictzip reader
//!
//! Only one inflated chunk is cached at a time. Seeking and reading both
//! mutate that cache, so a reader must not be shared between threads
//! without external locking.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crc32fast::Hasher;
use flate2::{Decompress, FlushDecompress, Status};
use tracing::debug;

use crate::error::{DictZipError, Result};
use crate::header::{ChunkDescriptor, ContainerHeader, TRAILER_SIZE, Trailer, read_header};

/// Byte-addressable view over the uncompressed stream of a dictzip container
pub struct DictZipReader<R = BufReader<File>> {
    inner: R,
    header: ContainerHeader,
    trailer: Trailer,
    decompress: Decompress,
    /// Compressed bytes of the chunk being inflated
    compressed: Vec<u8>,
    /// Inflated bytes of `current`
    buffer: Vec<u8>,
    current: Option<usize>,
    /// Cursor within `buffer`
    pos: usize,
    /// Chunk and in-chunk offset the cursor is at when that chunk failed to inflate
    failed: Option<(usize, usize)>,
}

impl DictZipReader<BufReader<File>> {
    /// Open a dictzip file for reading
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "Opening dictzip file");
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> DictZipReader<R> {
    /// Parse the header and trailer of a container
    pub fn new(mut inner: R) -> Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        let header = read_header(&mut inner)?;

        let file_len = inner.seek(SeekFrom::End(0))?;
        let data_end = header.payload_offset + header.compressed_len();
        if data_end + TRAILER_SIZE as u64 > file_len {
            return Err(DictZipError::MalformedHeader(format!(
                "chunk table needs {} bytes, file has {}",
                data_end + TRAILER_SIZE as u64,
                file_len
            )));
        }

        inner.seek(SeekFrom::End(-(TRAILER_SIZE as i64)))?;
        let mut buf = [0u8; TRAILER_SIZE];
        inner.read_exact(&mut buf)?;
        let trailer = Trailer::decode(&buf);

        debug!(
            chunk_len = header.chunk_len,
            chunks = header.chunks.len(),
            payload_offset = header.payload_offset,
            "Opened dictzip container"
        );

        Ok(Self {
            inner,
            buffer: Vec::with_capacity(header.chunk_len + 1),
            header,
            trailer,
            decompress: Decompress::new(false),
            compressed: Vec::new(),
            current: None,
            pos: 0,
            failed: None,
        })
    }

    /// Position the cursor at `pos` in the uncompressed stream
    ///
    /// Inflates the chunk holding `pos`. Fails when `pos` lies at or beyond
    /// the end of the stream.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        let chunk_len = self.header.chunk_len as u64;
        let target = pos / chunk_len;
        let within = (pos % chunk_len) as usize;

        if target >= self.header.chunks.len() as u64 {
            return Err(DictZipError::SeekOutOfRange { pos });
        }

        if let Err(e) = self.load_chunk(target as usize) {
            self.failed = Some((target as usize, within));
            return Err(e);
        }
        self.failed = None;

        // The last chunk can be shorter than the chunk length
        if within >= self.buffer.len() {
            self.pos = self.buffer.len();
            return Err(DictZipError::SeekOutOfRange { pos });
        }

        self.pos = within;
        Ok(())
    }

    /// Copy up to `buf.len()` bytes from the cursor onwards
    ///
    /// Returns fewer bytes when the end of the stream is reached, and 0 once
    /// the stream is exhausted. A chunk that failed to inflate is retried by
    /// the next read; the cursor does not move past it.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut read = 0;

        if let Some((chunk, within)) = self.failed {
            self.load_chunk(chunk)?;
            self.failed = None;
            self.pos = within.min(self.buffer.len());
        }

        while read < buf.len() {
            if self.pos >= self.buffer.len() {
                let next = self.current.map_or(0, |c| c + 1);
                if next >= self.header.chunks.len() {
                    break;
                }
                if let Err(e) = self.load_chunk(next) {
                    self.failed = Some((next, 0));
                    return Err(e);
                }
            }

            let n = (self.buffer.len() - self.pos).min(buf.len() - read);
            buf[read..read + n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
            self.pos += n;
            read += n;
        }

        Ok(read)
    }

    /// Inflate every chunk and check the result against the trailer
    ///
    /// The cursor is back at the start of the stream afterwards.
    pub fn verify(&mut self) -> Result<()> {
        let mut crc = Hasher::new();
        let mut total = 0u64;

        for n in 0..self.header.chunks.len() {
            if let Err(e) = self.load_chunk(n) {
                self.rewind();
                return Err(e);
            }
            crc.update(&self.buffer);
            total += self.buffer.len() as u64;
        }
        self.rewind();

        let actual = crc.finalize();
        if actual != self.trailer.crc32 {
            return Err(DictZipError::ChecksumMismatch {
                expected: self.trailer.crc32,
                actual,
            });
        }
        if total as u32 != self.trailer.size {
            return Err(DictZipError::SizeMismatch {
                expected: self.trailer.size,
                actual: total as u32,
            });
        }

        Ok(())
    }

    /// Move the cursor back to the start of the stream
    pub fn rewind(&mut self) {
        self.current = None;
        self.buffer.clear();
        self.pos = 0;
        self.failed = None;
    }

    /// Current cursor offset in the uncompressed stream
    pub fn position(&self) -> u64 {
        let chunk_len = self.header.chunk_len as u64;
        if let Some((chunk, within)) = self.failed {
            return chunk as u64 * chunk_len + within as u64;
        }
        self.current.map_or(0, |c| c as u64 * chunk_len + self.pos as u64)
    }

    pub fn chunk_len(&self) -> usize {
        self.header.chunk_len
    }

    pub fn chunk_count(&self) -> usize {
        self.header.chunks.len()
    }

    pub fn chunks(&self) -> &[ChunkDescriptor] {
        &self.header.chunks
    }

    /// Absolute file offset of the first compressed chunk
    pub fn payload_offset(&self) -> u64 {
        self.header.payload_offset
    }

    pub fn mtime(&self) -> u32 {
        self.header.mtime
    }

    pub fn trailer(&self) -> Trailer {
        self.trailer
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn load_chunk(&mut self, n: usize) -> Result<()> {
        if self.current == Some(n) {
            self.pos = 0;
            return Ok(());
        }

        let chunk = self.header.chunks[n];
        let chunk_len = self.header.chunk_len;
        self.current = None;
        self.buffer.clear();
        self.pos = 0;

        self.inner
            .seek(SeekFrom::Start(self.header.payload_offset + chunk.offset))?;
        self.compressed.resize(chunk.compressed_size as usize, 0);
        self.inner.read_exact(&mut self.compressed)?;

        // One spare byte of room tells an oversized chunk apart from a full one
        self.buffer.reserve(chunk_len + 1);
        self.decompress.reset(false);
        let status = self
            .decompress
            .decompress_vec(&self.compressed, &mut self.buffer, FlushDecompress::Sync)
            .map_err(|source| DictZipError::Inflate { chunk: n, source })?;

        if self.buffer.len() > chunk_len {
            self.buffer.clear();
            return Err(DictZipError::CorruptChunk {
                chunk: n,
                reason: format!("inflates past the chunk length of {}", chunk_len),
            });
        }
        let leftover = (self.decompress.total_in() as usize) < self.compressed.len();
        if status != Status::StreamEnd && leftover {
            self.buffer.clear();
            return Err(DictZipError::CorruptChunk {
                chunk: n,
                reason: "compressed data left after inflating".to_string(),
            });
        }
        let last = n + 1 == self.header.chunks.len();
        if !last && self.buffer.len() != chunk_len {
            let len = self.buffer.len();
            self.buffer.clear();
            return Err(DictZipError::CorruptChunk {
                chunk: n,
                reason: format!("inflated to {} bytes, expected {}", len, chunk_len),
            });
        }

        self.current = Some(n);
        Ok(())
    }
}

impl<R: Read + Seek> Read for DictZipReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        DictZipReader::read(self, buf).map_err(io::Error::other)
    }
}
