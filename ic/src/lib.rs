//! indexedcorpus - named XML documents in a random-access compressed file
//!
//! An indexed corpus is a pair of files sharing a base name. The data file
//! is a dictzip container holding the concatenated payloads of all entries,
//! the index file maps each entry name to a byte range of the uncompressed
//! data. Reading an entry inflates only the chunks its range covers.
//!
//! # Layout
//!
//! ```text
//! treebank.data.dz      # dictzip container, entries back to back
//! treebank.index        # one line per entry, in write order:
//!                       #   name<TAB>offset<TAB>length
//! ```
//!
//! Offsets and lengths are written with the compact encoding in [`b64`].
//!
//! # Example
//!
//! ```ignore
//! use indexedcorpus::{CorpusReader, IndexedCorpusReader, IndexedCorpusWriter};
//!
//! let writer = IndexedCorpusWriter::create("treebank")?;
//! writer.write("1.xml", b"<alpino_ds/>")?;
//! writer.finish()?;
//!
//! let reader = IndexedCorpusReader::open("treebank.index")?;
//! for name in reader.entries() {
//!     let xml = reader.read_to_string(name)?;
//! }
//! ```

pub mod b64;
pub mod config;
mod corpus;
mod error;
mod order;
mod reader;
mod writer;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub use config::Config;
pub use corpus::{CorpusReader, Entries};
pub use error::{BatchError, CorpusError, Result};
pub use order::{SortOrder, natural_cmp};
pub use reader::{IndexEntry, IndexedCorpusReader};
pub use writer::IndexedCorpusWriter;

/// Suffix of the data file
pub const DATA_EXT: &str = ".data.dz";

/// Suffix of the index file
pub const INDEX_EXT: &str = ".index";

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(base.as_os_str());
    path.push(suffix);
    PathBuf::from(path)
}

/// Data file path for a corpus base name
pub fn data_path(base: impl AsRef<Path>) -> PathBuf {
    with_suffix(base.as_ref(), DATA_EXT)
}

/// Index file path for a corpus base name
pub fn index_path(base: impl AsRef<Path>) -> PathBuf {
    with_suffix(base.as_ref(), INDEX_EXT)
}

/// Strip the data or index suffix from a corpus file path
///
/// Returns `None` for paths that are neither.
pub fn base_path(path: impl AsRef<Path>) -> Option<PathBuf> {
    let path = path.as_ref().to_str()?;
    [DATA_EXT, INDEX_EXT]
        .iter()
        .find_map(|ext| path.strip_suffix(ext))
        .filter(|base| !base.is_empty())
        .map(PathBuf::from)
}
