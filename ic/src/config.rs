//! Configuration for corpus writers

use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use dictzip::{Compression, DictZipOptions, Staging};

/// Where the data writer keeps compressed chunks until the file is finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StagingMode {
    #[default]
    TempFile,
    Memory,
}

impl From<StagingMode> for Staging {
    fn from(mode: StagingMode) -> Self {
        match mode {
            StagingMode::TempFile => Staging::TempFile,
            StagingMode::Memory => Staging::Memory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Uncompressed length of each data file chunk
    #[serde(default = "default_chunk_len")]
    pub chunk_len: usize,

    /// DEFLATE level, 0-9
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    #[serde(default)]
    pub staging: StagingMode,

    /// Log a warning when an entry name is written twice
    #[serde(default = "default_warn_duplicates")]
    pub warn_duplicates: bool,
}

fn default_chunk_len() -> usize {
    dictzip::DEFAULT_CHUNK_LEN
}

fn default_compression_level() -> u32 {
    Compression::best().level()
}

fn default_warn_duplicates() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_len: default_chunk_len(),
            compression_level: default_compression_level(),
            staging: StagingMode::default(),
            warn_duplicates: default_warn_duplicates(),
        }
    }
}

impl Config {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            return Self::load_file(config_path);
        }

        // Try default locations
        let default_paths = [
            Some(PathBuf::from(".indexedcorpus.yml")),
            dirs::config_dir().map(|p| p.join("indexedcorpus").join("indexedcorpus.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                match Self::load_file(path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Ignoring unusable config file")
                    }
                }
            }
        }

        Ok(Config::default())
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .context(format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is in range
    pub fn validate(&self) -> Result<()> {
        if self.chunk_len == 0 || self.chunk_len > dictzip::MAX_CHUNK_LEN {
            bail!(
                "chunk-len must be between 1 and {}, got {}",
                dictzip::MAX_CHUNK_LEN,
                self.chunk_len
            );
        }
        if self.compression_level > 9 {
            bail!("compression-level must be between 0 and 9, got {}", self.compression_level);
        }
        Ok(())
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Options for the data file writer
    pub fn dictzip_options(&self) -> DictZipOptions {
        DictZipOptions {
            chunk_len: self.chunk_len,
            level: Compression::new(self.compression_level.min(9)),
            staging: self.staging.into(),
            mtime: None,
        }
    }
}
