use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::ProjectDirs;
use log::debug;
use tokio::fs;
use wallet_core::{StateStorage, StorageError};

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// `~/.config/wallet_conn/storage` on Linux, `%APPDATA%\wallet_conn\storage` on Windows, etc.
    pub fn new() -> io::Result<Self> {
        let proj = ProjectDirs::from("", "", "wallet_conn")
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Unable to locate config dir"))?;
        Self::in_dir(proj.config_dir().join("storage"))
    }

    /// Uses (and creates) an explicit directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys may contain characters that are not valid in file names (`:` in
    /// particular); those are replaced with `_`.
    fn file_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

#[async_trait]
impl StateStorage for FileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.file_for(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes to a temporary file first so a crash never leaves half a record.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.file_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;
        debug!("Wrote {} bytes to {:?}", value.len(), path);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.file_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
