//! Indexed corpus writer

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use dictzip::{DictZipOptions, DictZipWriter};
use tracing::{debug, info, warn};

use crate::b64;
use crate::config::Config;
use crate::corpus::CorpusReader;
use crate::error::{BatchError, CorpusError, Result};

struct WriterState<D: Write, I: Write> {
    data: DictZipWriter<D>,
    index: I,
    /// Uncompressed offset of the next entry
    offset: u64,
    entries: usize,
    seen: HashSet<String>,
}

/// Append-only writer for an indexed corpus
///
/// Entries are appended to the data container and recorded in the index in
/// call order. All writes go through one lock, so a writer can be shared
/// between threads without entries interleaving.
///
/// Call [`IndexedCorpusWriter::finish`] to complete both files and see any
/// error. Dropping the writer finishes them too, logging failures.
pub struct IndexedCorpusWriter<D: Write = BufWriter<File>, I: Write = BufWriter<File>> {
    state: Mutex<WriterState<D, I>>,
    warn_duplicates: bool,
}

impl IndexedCorpusWriter<BufWriter<File>, BufWriter<File>> {
    /// Create (or truncate) `<base>.data.dz` and `<base>.index`
    pub fn create(base: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_config(base, &Config::default())
    }

    pub fn create_with_config(base: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let data_path = crate::data_path(&base);
        let index_path = crate::index_path(&base);

        let data = File::create(&data_path).map_err(|e| CorpusError::open(&data_path, e))?;
        let index = File::create(&index_path).map_err(|e| CorpusError::open(&index_path, e))?;
        debug!(base = %base.as_ref().display(), "Created indexed corpus files");

        Self::with_options(
            BufWriter::new(data),
            BufWriter::new(index),
            config.dictzip_options(),
            config.warn_duplicates,
        )
    }
}

impl<D: Write, I: Write> IndexedCorpusWriter<D, I> {
    /// Write to arbitrary sinks with the default options
    pub fn new(data: D, index: I) -> Result<Self> {
        Self::with_options(data, index, DictZipOptions::default(), true)
    }

    pub fn with_options(
        data: D,
        index: I,
        options: DictZipOptions,
        warn_duplicates: bool,
    ) -> Result<Self> {
        let data = DictZipWriter::with_options(data, options)?;
        Ok(Self {
            state: Mutex::new(WriterState {
                data,
                index,
                offset: 0,
                entries: 0,
                seen: HashSet::new(),
            }),
            warn_duplicates,
        })
    }

    /// Append one entry
    pub fn write(&self, name: &str, payload: &[u8]) -> Result<()> {
        validate_name(name)?;

        let mut guard = self.state.lock().map_err(|_| CorpusError::Poisoned)?;
        let state = &mut *guard;

        let line = format!(
            "{}\t{}\t{}\n",
            name,
            b64::encode(state.offset),
            b64::encode(payload.len() as u64)
        );

        // Once the payload is in the data stream the offset must count it,
        // even if its index line is lost
        state.data.write(payload)?;
        state.offset += payload.len() as u64;
        state.index.write_all(line.as_bytes())?;
        state.entries += 1;

        if self.warn_duplicates && !state.seen.insert(name.to_string()) {
            warn!(name, "Entry written twice, readers will only find the last one");
        }

        Ok(())
    }

    /// Copy every entry of another corpus, in its own order
    ///
    /// With `fail_first` the first failing entry aborts the copy and its error
    /// is returned; entries copied before it stay written. Otherwise failing
    /// entries are skipped and reported together in a [`BatchError`] once all
    /// entries have been tried.
    pub fn write_corpus(&self, corpus: &dyn CorpusReader, fail_first: bool) -> Result<()> {
        if fail_first {
            for name in corpus.entries() {
                let payload = corpus.read(name)?;
                self.write(name, &payload)?;
            }
            return Ok(());
        }

        let mut batch = BatchError::new();
        for name in corpus.entries() {
            if let Err(e) = corpus.read(name).and_then(|payload| self.write(name, &payload)) {
                warn!(corpus = corpus.name(), name, error = %e, "Failed to copy entry");
                batch.push(name, e);
            }
        }

        if batch.is_empty() {
            Ok(())
        } else {
            Err(batch.into())
        }
    }

    /// Number of entries written
    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).entries
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Uncompressed offset the next entry will be written at
    pub fn offset(&self) -> u64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).offset
    }

    /// Complete the data container and flush the index
    pub fn finish(self) -> Result<(D, I)> {
        let WriterState {
            data,
            mut index,
            offset,
            entries,
            ..
        } = self.state.into_inner().map_err(|_| CorpusError::Poisoned)?;

        let data = data.finish()?;
        index.flush()?;

        info!(entries, bytes = offset, "Finished indexed corpus");
        Ok((data, index))
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim() != name || name.is_empty() || name.contains(['\t', '\r', '\n']) {
        return Err(CorpusError::InvalidName(name.to_string()));
    }
    Ok(())
}
