//! Chunked dictzip writer
//!
//! Incoming bytes are buffered up to the chunk length, then deflated with a
//! full flush so the chunk can be inflated without its neighbours. The chunk
//! table precedes the data in the file but is only known at the end, so the
//! compressed chunks are staged (temporary file or memory) and copied behind
//! the header when the writer is finished.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crc32fast::Hasher;
use flate2::{Compress, Compression, FlushCompress, Status};
use tracing::{debug, error, info};

use crate::error::{DictZipError, Result};
use crate::header::{self, MAX_CHUNK_COUNT, Trailer};
use crate::{DEFAULT_CHUNK_LEN, MAX_CHUNK_LEN, MAX_COMPRESSED_CHUNK};

/// Where compressed chunks are kept until the chunk table is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Staging {
    /// Anonymous temporary file, removed when the writer goes away
    #[default]
    TempFile,
    /// In-memory buffer
    Memory,
}

/// Options for writing a dictzip container
#[derive(Debug, Clone)]
pub struct DictZipOptions {
    /// Uncompressed length of each chunk
    pub chunk_len: usize,
    /// DEFLATE compression level
    pub level: Compression,
    /// Staging area for compressed chunks
    pub staging: Staging,
    /// Header modification time, defaults to now
    pub mtime: Option<u32>,
}

impl Default for DictZipOptions {
    fn default() -> Self {
        Self {
            chunk_len: DEFAULT_CHUNK_LEN,
            level: Compression::best(),
            staging: Staging::default(),
            mtime: None,
        }
    }
}

enum StagingArea {
    File(BufWriter<File>),
    Memory(Vec<u8>),
}

impl StagingArea {
    fn new(staging: Staging) -> io::Result<Self> {
        match staging {
            Staging::TempFile => Ok(StagingArea::File(BufWriter::new(tempfile::tempfile()?))),
            Staging::Memory => Ok(StagingArea::Memory(Vec::new())),
        }
    }

    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            StagingArea::File(file) => file.write_all(data),
            StagingArea::Memory(buf) => {
                buf.extend_from_slice(data);
                Ok(())
            }
        }
    }

    /// Copy everything staged so far into `sink`, returning the byte count
    fn copy_into<W: Write>(self, sink: &mut W) -> io::Result<u64> {
        match self {
            StagingArea::File(file) => {
                let mut file = file.into_inner().map_err(|e| e.into_error())?;
                file.seek(SeekFrom::Start(0))?;
                io::copy(&mut file, sink)
            }
            StagingArea::Memory(buf) => {
                sink.write_all(&buf)?;
                Ok(buf.len() as u64)
            }
        }
    }
}

/// Writes a dictzip container to any byte sink
///
/// The container is completed by [`DictZipWriter::finish`]. Dropping an
/// unfinished writer finishes it as well; errors at that point can only be
/// logged.
pub struct DictZipWriter<W: Write> {
    sink: Option<W>,
    options: DictZipOptions,
    buffer: Vec<u8>,
    compress: Compress,
    staging: Option<StagingArea>,
    sizes: Vec<u32>,
    crc: Hasher,
    total: u64,
    aborted: bool,
}

impl DictZipWriter<BufWriter<File>> {
    /// Create (or truncate) a dictzip file at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_options(path, DictZipOptions::default())
    }

    /// Create (or truncate) a dictzip file at `path` with custom options
    pub fn create_with_options(path: impl AsRef<Path>, options: DictZipOptions) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "Created dictzip file");
        Self::with_options(BufWriter::new(file), options)
    }
}

impl<W: Write> DictZipWriter<W> {
    /// Wrap a sink using the default options
    pub fn new(sink: W) -> Result<Self> {
        Self::with_options(sink, DictZipOptions::default())
    }

    /// Wrap a sink
    pub fn with_options(sink: W, options: DictZipOptions) -> Result<Self> {
        if options.chunk_len == 0 || options.chunk_len > MAX_CHUNK_LEN {
            return Err(DictZipError::InvalidChunkLen(options.chunk_len));
        }

        let staging = StagingArea::new(options.staging)?;
        let compress = Compress::new(options.level, false);

        Ok(Self {
            sink: Some(sink),
            buffer: Vec::with_capacity(options.chunk_len),
            compress,
            staging: Some(staging),
            sizes: Vec::new(),
            crc: Hasher::new(),
            total: 0,
            aborted: false,
            options,
        })
    }

    /// Append bytes to the uncompressed stream
    pub fn write(&mut self, mut data: &[u8]) -> Result<()> {
        if self.aborted || self.sink.is_none() {
            return Err(DictZipError::Aborted);
        }

        while !data.is_empty() {
            let room = self.options.chunk_len - self.buffer.len();
            let n = room.min(data.len());
            self.buffer.extend_from_slice(&data[..n]);
            data = &data[n..];

            if self.buffer.len() == self.options.chunk_len
                && let Err(e) = self.flush_chunk()
            {
                self.aborted = true;
                return Err(e);
            }
        }

        Ok(())
    }

    /// Uncompressed bytes accepted so far
    pub fn uncompressed_len(&self) -> u64 {
        self.total + self.buffer.len() as u64
    }

    /// Chunks compressed so far
    pub fn chunk_count(&self) -> usize {
        self.sizes.len()
    }

    pub fn chunk_len(&self) -> usize {
        self.options.chunk_len
    }

    /// Flush the last chunk, write header, chunk table, data and trailer
    pub fn finish(mut self) -> Result<W> {
        self.finalize()
    }

    fn finalize(&mut self) -> Result<W> {
        if self.aborted {
            return Err(DictZipError::Aborted);
        }
        let mut sink = self.sink.take().ok_or(DictZipError::Aborted)?;

        match self.finalize_into(&mut sink) {
            Ok(()) => Ok(sink),
            Err(e) => {
                self.aborted = true;
                Err(e)
            }
        }
    }

    fn finalize_into(&mut self, sink: &mut W) -> Result<()> {
        self.flush_chunk()?;

        // The final empty block is not part of any chunk
        let mut tail = Vec::with_capacity(64);
        loop {
            let status = self.compress.compress_vec(&[], &mut tail, FlushCompress::Finish)?;
            if status == Status::StreamEnd {
                break;
            }
            tail.reserve(64);
        }

        let mut staging = self.staging.take().ok_or(DictZipError::Aborted)?;
        staging.append(&tail)?;

        let mtime = self.options.mtime.unwrap_or_else(current_mtime);
        sink.write_all(&header::encode_header(mtime))?;
        sink.write_all(&header::encode_extra(self.options.chunk_len, &self.sizes)?)?;
        let compressed = staging.copy_into(sink)?;

        let trailer = Trailer {
            crc32: self.crc.clone().finalize(),
            size: self.total as u32,
        };
        sink.write_all(&trailer.encode())?;
        sink.flush()?;

        info!(
            chunks = self.sizes.len(),
            uncompressed = self.total,
            compressed,
            "Finished dictzip container"
        );
        Ok(())
    }

    fn flush_chunk(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        if self.sizes.len() >= MAX_CHUNK_COUNT {
            return Err(DictZipError::TooManyChunks {
                count: self.sizes.len() + 1,
            });
        }

        let mut out = Vec::with_capacity(self.buffer.len() + self.buffer.len() / 1000 + 64);
        let start = self.compress.total_in();
        loop {
            let consumed = (self.compress.total_in() - start) as usize;
            self.compress
                .compress_vec(&self.buffer[consumed..], &mut out, FlushCompress::Full)?;
            let consumed = (self.compress.total_in() - start) as usize;

            // The flush is complete once deflate stops short of the output capacity
            if consumed == self.buffer.len() && out.len() < out.capacity() {
                break;
            }
            out.reserve(out.capacity().max(1024));
        }

        if out.len() > MAX_COMPRESSED_CHUNK {
            return Err(DictZipError::ChunkTooLarge { size: out.len() });
        }

        self.staging
            .as_mut()
            .ok_or(DictZipError::Aborted)?
            .append(&out)?;
        self.sizes.push(out.len() as u32);
        self.crc.update(&self.buffer);
        self.total += self.buffer.len() as u64;
        self.buffer.clear();

        Ok(())
    }
}

impl<W: Write> Write for DictZipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        DictZipWriter::write(self, buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    /// Chunks are only cut at the chunk length, so there is nothing to flush early
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: Write> Drop for DictZipWriter<W> {
    fn drop(&mut self) {
        if self.sink.is_none() || self.aborted {
            return;
        }
        if let Err(e) = self.finalize() {
            error!(error = %e, "Failed to finish dictzip container on drop");
        }
    }
}

/// Seconds since the epoch, or 0 when it does not fit a signed 32-bit value
fn current_mtime() -> u32 {
    let now = chrono::Utc::now().timestamp();
    u32::try_from(now).ok().filter(|&t| t <= i32::MAX as u32).unwrap_or(0)
}
