//! The container seam between archive transport and the log index.

use async_trait::async_trait;

use super::error::BoxError;
use crate::io::ReadAt;
use crate::zip::{ZipFileEntry, ZipReader};

/// One entry of a directory-like container
pub trait ArchiveEntry {
    /// Archive-relative path, as stored in the container
    fn path(&self) -> &str;

    fn is_directory(&self) -> bool;
}

/// A container of entries whose contents can be read on demand
#[async_trait]
pub trait EntrySource: Send + Sync {
    type Entry: ArchiveEntry + Send + Sync;

    /// All entries, in container order
    async fn entries(&self) -> Result<Vec<Self::Entry>, BoxError>;

    /// The full contents of one entry
    async fn read(&self, entry: &Self::Entry) -> Result<Vec<u8>, BoxError>;
}

impl ArchiveEntry for ZipFileEntry {
    fn path(&self) -> &str {
        &self.file_name
    }

    fn is_directory(&self) -> bool {
        self.is_directory
    }
}

#[async_trait]
impl<R: ReadAt + 'static> EntrySource for ZipReader<R> {
    type Entry = ZipFileEntry;

    async fn entries(&self) -> Result<Vec<ZipFileEntry>, BoxError> {
        Ok(self.list_files().await?)
    }

    async fn read(&self, entry: &ZipFileEntry) -> Result<Vec<u8>, BoxError> {
        Ok(self.read_entry(entry).await?)
    }
}
