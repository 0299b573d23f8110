//! Dictzip error types

use thiserror::Error;

/// Errors that can occur while writing or reading a dictzip container
#[derive(Debug, Error)]
pub enum DictZipError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a gzip file")]
    NotGzip,

    #[error("Unknown compression method: {0}")]
    UnsupportedMethod(u8),

    #[error("No extra field, cannot be a dictzip file")]
    NotRandomAccess,

    #[error("Extra field has no RA chunk table")]
    MissingChunkTable,

    #[error("Unknown dictzip version: {0}")]
    UnsupportedVersion(u16),

    #[error("Malformed gzip header: {0}")]
    MalformedHeader(String),

    #[error("Invalid chunk length {0}, expected 1..={max}", max = crate::MAX_CHUNK_LEN)]
    InvalidChunkLen(usize),

    #[error("Compressed chunk of {size} bytes does not fit the chunk table")]
    ChunkTooLarge { size: usize },

    #[error("Too many chunks ({count}) for the extra field")]
    TooManyChunks { count: usize },

    #[error("Cannot seek to offset {pos}: beyond end of stream")]
    SeekOutOfRange { pos: u64 },

    #[error("Deflate error: {0}")]
    Deflate(#[from] flate2::CompressError),

    #[error("Inflate error in chunk {chunk}: {source}")]
    Inflate {
        chunk: usize,
        #[source]
        source: flate2::DecompressError,
    },

    #[error("Corrupt chunk {chunk}: {reason}")]
    CorruptChunk { chunk: usize, reason: String },

    #[error("CRC-32 mismatch: trailer has {expected:#010x}, data has {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Size mismatch: trailer has {expected}, data has {actual} (mod 2^32)")]
    SizeMismatch { expected: u32, actual: u32 },

    #[error("Writer aborted after an earlier error")]
    Aborted,
}

impl DictZipError {
    /// Check if this error means the input is not a usable dictzip container
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            DictZipError::NotGzip
                | DictZipError::UnsupportedMethod(_)
                | DictZipError::NotRandomAccess
                | DictZipError::MissingChunkTable
                | DictZipError::UnsupportedVersion(_)
                | DictZipError::MalformedHeader(_)
                | DictZipError::InvalidChunkLen(_)
        )
    }

    /// Check if this error came from the compression engine or from corrupt data
    pub fn is_codec_error(&self) -> bool {
        matches!(
            self,
            DictZipError::Deflate(_)
                | DictZipError::Inflate { .. }
                | DictZipError::CorruptChunk { .. }
                | DictZipError::ChunkTooLarge { .. }
                | DictZipError::TooManyChunks { .. }
                | DictZipError::ChecksumMismatch { .. }
                | DictZipError::SizeMismatch { .. }
        )
    }
}

/// Result alias for dictzip operations
pub type Result<T> = std::result::Result<T, DictZipError>;
