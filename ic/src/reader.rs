//! Indexed corpus reader

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dictzip::DictZipReader;
use tracing::{debug, warn};

use crate::b64;
use crate::corpus::{CorpusReader, Entries};
use crate::error::{CorpusError, Result};

/// Location of one entry in the uncompressed data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub name: String,
    pub offset: u64,
    pub length: u64,
}

impl IndexEntry {
    /// Parse one index line
    ///
    /// A line with exactly two tabs is split on tabs, so names may contain
    /// spaces. Anything else is split on whitespace. Whitespace around the
    /// name is not part of it.
    fn parse(line: &str) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = if line.matches('\t').count() == 2 {
            line.split('\t').collect()
        } else {
            line.split_whitespace().collect()
        };

        let [name, offset, length] = fields[..] else {
            return Err(format!("expected 3 fields, found {}", fields.len()));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err("empty entry name".to_string());
        }

        let offset = b64::decode(offset.trim()).map_err(|e| format!("offset: {}", e))?;
        let length = b64::decode(length.trim()).map_err(|e| format!("length: {}", e))?;

        Ok(Self {
            name: name.to_string(),
            offset,
            length,
        })
    }
}

/// Read-only view of an indexed corpus
///
/// The index is loaded once at open time. Reads share one dictzip reader
/// behind a mutex, so a reader can be used from several threads at once.
pub struct IndexedCorpusReader<R = BufReader<File>> {
    name: String,
    entries: Vec<IndexEntry>,
    /// Position in `entries` of the last entry with a given name
    lookup: HashMap<String, usize>,
    data: Mutex<DictZipReader<R>>,
}

impl IndexedCorpusReader<BufReader<File>> {
    /// Open a corpus from the path of either its data or its index file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let base = crate::base_path(path)
            .ok_or_else(|| CorpusError::open(path, "not an indexed (.dz) corpus file"))?;
        Self::open_files(
            &crate::data_path(&base),
            &crate::index_path(&base),
            base.display().to_string(),
        )
    }

    /// Open a corpus from an explicit data and index file
    pub fn open_pair(data: impl AsRef<Path>, index: impl AsRef<Path>) -> Result<Self> {
        let data = data.as_ref();
        let name = crate::base_path(data).unwrap_or_else(|| data.to_path_buf());
        Self::open_files(data, index.as_ref(), name.display().to_string())
    }

    fn open_files(data: &Path, index: &Path, name: String) -> Result<Self> {
        for path in [data, index] {
            let meta = std::fs::metadata(path).map_err(|e| CorpusError::open(path, e))?;
            if !meta.is_file() {
                return Err(CorpusError::open(path, "not a regular file"));
            }
        }

        let index_file = File::open(index).map_err(|e| CorpusError::open(index, e))?;
        let data_file = File::open(data).map_err(|e| CorpusError::open(data, e))?;

        Self::load(name, BufReader::new(data_file), BufReader::new(index_file), data, index)
    }
}

impl<R: Read + Seek> IndexedCorpusReader<R> {
    /// Open a corpus over an arbitrary data source and index
    pub fn from_readers(name: impl Into<String>, data: R, index: impl BufRead) -> Result<Self> {
        let name = name.into();
        let label = PathBuf::from(&name);
        Self::load(name, data, index, &label, &label)
    }

    fn load(
        name: String,
        data: R,
        index: impl BufRead,
        data_label: &Path,
        index_label: &Path,
    ) -> Result<Self> {
        let (entries, lookup) = parse_index(index, index_label)?;
        let data = DictZipReader::new(data).map_err(|e| CorpusError::open(data_label, e))?;

        debug!(
            corpus = %name,
            entries = entries.len(),
            chunk_len = data.chunk_len(),
            chunks = data.chunk_count(),
            "Opened indexed corpus"
        );

        Ok(Self {
            name,
            entries,
            lookup,
            data: Mutex::new(data),
        })
    }

    /// Index entries in file order
    pub fn index_entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Index entry for a name, the last one when the name occurs twice
    pub fn get(&self, name: &str) -> Option<&IndexEntry> {
        self.lookup.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    /// Payload of an entry
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .get(name)
            .ok_or_else(|| CorpusError::UnknownEntry(name.to_string()))?;
        if entry.length == 0 {
            return Ok(Vec::new());
        }

        let mut data = self.data.lock().map_err(|_| CorpusError::Poisoned)?;
        data.seek(entry.offset)?;

        // Grow with the data actually read, the recorded length is not trusted
        let mut payload = Vec::with_capacity(entry.length.min(data.chunk_len() as u64) as usize);
        let mut buf = vec![0u8; data.chunk_len()];
        let mut remaining = entry.length;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = data.read(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            payload.extend_from_slice(&buf[..n]);
            remaining -= n as u64;
        }

        if remaining > 0 {
            return Err(CorpusError::Truncated {
                name: name.to_string(),
                expected: entry.length,
                actual: payload.len() as u64,
            });
        }

        Ok(payload)
    }

    /// Check every chunk of the data file against its trailer checksum
    pub fn verify(&self) -> Result<()> {
        let mut data = self.data.lock().map_err(|_| CorpusError::Poisoned)?;
        data.verify()?;
        Ok(())
    }
}

fn parse_index(
    index: impl BufRead,
    path: &Path,
) -> Result<(Vec<IndexEntry>, HashMap<String, usize>)> {
    let mut entries = Vec::new();
    let mut lookup = HashMap::new();

    for (n, line) in index.lines().enumerate() {
        let line = line.map_err(|e| CorpusError::open(path, e))?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let entry = IndexEntry::parse(line)
            .map_err(|reason| CorpusError::malformed_line(path, n + 1, reason))?;
        if let Some(previous) = lookup.insert(entry.name.clone(), entries.len()) {
            warn!(
                name = %entry.name,
                line = n + 1,
                previous_line = previous + 1,
                "Duplicate entry in index, the later one shadows the earlier"
            );
        }
        entries.push(entry);
    }

    Ok((entries, lookup))
}

impl<R: Read + Seek + Send> CorpusReader for IndexedCorpusReader<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn entries(&self) -> Entries<'_> {
        Box::new(self.entries.iter().map(|e| e.name.as_str()))
    }

    fn read(&self, entry: &str) -> Result<Vec<u8>> {
        IndexedCorpusReader::read(self, entry)
    }

    fn size(&self) -> usize {
        self.entries.len()
    }
}
