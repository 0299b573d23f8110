//! Common interface of corpus readers

use crate::error::{CorpusError, Result};
use crate::order::{SortOrder, natural_cmp};

/// Finite sequence of entry names
pub type Entries<'a> = Box<dyn Iterator<Item = &'a str> + 'a>;

/// Read access to a corpus of named documents
///
/// Implementors must be shareable between threads; reads on a shared reader
/// are synchronized by the implementation.
pub trait CorpusReader: Send + Sync {
    /// Name of the corpus, usually its path
    fn name(&self) -> &str;

    /// Entry names in the corpus' own order
    ///
    /// Every call starts a fresh iteration.
    fn entries(&self) -> Entries<'_>;

    /// Payload of an entry
    fn read(&self, entry: &str) -> Result<Vec<u8>>;

    /// Number of entries
    fn size(&self) -> usize;

    /// Payload of an entry as text
    fn read_to_string(&self, entry: &str) -> Result<String> {
        let bytes = self.read(entry)?;
        String::from_utf8(bytes).map_err(|_| CorpusError::InvalidUtf8(entry.to_string()))
    }

    /// Entry names in the requested order
    fn entries_ordered(&self, order: SortOrder) -> Entries<'_> {
        match order {
            SortOrder::Natural => self.entries(),
            SortOrder::Numerical => {
                let mut names: Vec<&str> = self.entries().collect();
                names.sort_by(|a, b| natural_cmp(a, b));
                Box::new(names.into_iter())
            }
        }
    }
}
