//! dictzip - random-access gzip containers
//!
//! A dictzip file is an ordinary gzip file whose DEFLATE stream is cut into
//! chunks with full flushes, so every chunk can be inflated on its own. The
//! compressed size of each chunk is recorded in an `RA` subfield of the gzip
//! extra field, which lets a reader jump to any uncompressed offset after
//! inflating at most one chunk.
//!
//! # Layout
//!
//! ```text
//! corpus.data.dz
//! ├── gzip header        # FEXTRA set, mtime, XFL, OS
//! ├── extra field        # "RA" v1: chunk length, chunk count, compressed sizes
//! ├── chunk 0 .. n-1     # raw DEFLATE, each ending on a full flush
//! ├── final empty block  # terminates the DEFLATE stream for plain gunzip
//! └── trailer            # CRC-32 and size mod 2^32 of the whole stream
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dictzip::{DictZipReader, DictZipWriter};
//!
//! let mut writer = DictZipWriter::create("corpus.data.dz")?;
//! writer.write(b"<a/><b/>")?;
//! writer.finish()?;
//!
//! let mut reader = DictZipReader::open("corpus.data.dz")?;
//! reader.seek(4)?;
//! let mut buf = [0u8; 4];
//! reader.read(&mut buf)?;
//! ```

mod error;
pub mod header;
mod reader;
mod writer;

pub use error::{DictZipError, Result};
pub use header::{ChunkDescriptor, ContainerHeader, Trailer};
pub use reader::DictZipReader;
pub use writer::{DictZipOptions, DictZipWriter, Staging};

/// Compression level accepted by [`DictZipOptions`]
pub use flate2::Compression;

/// Largest compressed chunk the 16-bit chunk table can describe
pub const MAX_COMPRESSED_CHUNK: usize = u16::MAX as usize;

/// Largest uncompressed chunk length accepted by the writer
pub const MAX_CHUNK_LEN: usize = (MAX_COMPRESSED_CHUNK - 12) * 999 / 1000;

/// Default uncompressed chunk length (58315 bytes)
///
/// Many dictunzip implementations use this as a fixed buffer size, so it is
/// preferred over [`MAX_CHUNK_LEN`].
pub const DEFAULT_CHUNK_LEN: usize = (MAX_COMPRESSED_CHUNK - 12) * 89 / 100;
