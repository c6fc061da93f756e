use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::io::Read;
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Reads entries out of a ZIP archive into memory
pub struct ZipReader<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipReader<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all entries in the archive, directories included
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files().await
    }

    /// Decompress an entry's data into memory.
    ///
    /// The result is checked against the directory's uncompressed size and
    /// CRC-32.
    pub async fn read_entry(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        if entry.is_encrypted() {
            bail!("Encrypted entries are not supported: {}", entry.file_name);
        }

        let data_offset = self.parser.get_data_offset(entry).await?;
        let source_size = self.parser.reader().size();
        if data_offset
            .checked_add(entry.compressed_size)
            .is_none_or(|end| end > source_size)
        {
            bail!(
                "Entry {} claims {} bytes at offset {}, past the end of the {} byte archive",
                entry.file_name,
                entry.compressed_size,
                data_offset,
                source_size
            );
        }
        let compressed_len = usize::try_from(entry.compressed_size)
            .context("Entry too large to hold in memory")?;
        let mut compressed = vec![0u8; compressed_len];
        self.parser
            .reader()
            .read_exact_at(data_offset, &mut compressed)
            .await?;

        let data = match entry.compression_method {
            CompressionMethod::Stored => compressed,
            CompressionMethod::Deflate => {
                let mut out = Vec::new();
                // One byte past the declared size is enough to detect a lie
                DeflateDecoder::new(compressed.as_slice())
                    .take(entry.uncompressed_size.saturating_add(1))
                    .read_to_end(&mut out)
                    .with_context(|| format!("Failed to inflate {}", entry.file_name))?;
                out
            }
            CompressionMethod::Unknown(method) => bail!(
                "Unsupported compression method {} for {} (only STORED and DEFLATE are supported)",
                method,
                entry.file_name
            ),
        };

        if data.len() as u64 != entry.uncompressed_size {
            bail!(
                "Size mismatch for {}: expected {} bytes, got {}",
                entry.file_name,
                entry.uncompressed_size,
                data.len()
            );
        }

        let mut crc = Crc::new();
        crc.update(&data);
        if crc.sum() != entry.crc32 {
            bail!(
                "CRC-32 mismatch for {}: expected {:08x}, got {:08x}",
                entry.file_name,
                entry.crc32,
                crc.sum()
            );
        }

        Ok(data)
    }
}
