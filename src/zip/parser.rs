//! Low-level ZIP archive parser.
//!
//! Reads the End of Central Directory record from the tail of the source,
//! follows it (through the ZIP64 records when needed) to the Central
//! Directory, and decodes one [`ZipFileEntry`] per directory record. Only the
//! tail and the directory are fetched, which keeps listing cheap over HTTP
//! Range requests.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};
use tracing::debug;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP file parser over a random-access source.
///
/// Typically used through [`ZipReader`](super::ZipReader) rather than
/// directly.
pub struct ZipParser<R: ReadAt> {
    reader: Arc<R>,
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Searches backwards from the end of the source, accepting the first
    /// signature whose comment length runs exactly to the end of the data.
    /// Returns the record together with its offset.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let eocd_size = EndOfCentralDirectory::SIZE as u64;
        if self.size < eocd_size {
            bail!("Not a valid ZIP file: {} bytes is too short", self.size);
        }

        // Without a comment (the common case) only the final 22 bytes are
        // fetched.
        let mut search_size = eocd_size;
        loop {
            let search_start = self.size - search_size;
            let mut buf = vec![0u8; search_size as usize];
            self.reader.read_exact_at(search_start, &mut buf).await?;

            for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
                if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                    continue;
                }
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(&buf[i..])?;
                    return Ok((eocd, search_start + i as u64));
                }
            }

            let widest = (MAX_COMMENT_SIZE + eocd_size).min(self.size);
            if search_size == widest {
                bail!("Not a valid ZIP file");
            }
            search_size = widest;
        }
    }

    /// Locate the Central Directory, consulting the ZIP64 records when the
    /// regular EOCD fields are saturated.
    pub async fn central_directory(&self) -> Result<CentralDirectory> {
        let (eocd, eocd_offset) = self.find_eocd().await?;
        if !eocd.is_zip64() {
            return Ok(eocd.central_directory());
        }

        // The locator sits immediately before the regular EOCD
        let locator_offset = eocd_offset
            .checked_sub(Zip64Locator::SIZE as u64)
            .context("Invalid ZIP64 format: no room for the locator")?;
        let mut locator = vec![0u8; Zip64Locator::SIZE];
        self.reader.read_exact_at(locator_offset, &mut locator).await?;
        let eocd64_offset = Zip64Locator::eocd64_offset(&locator)?;

        let mut record = vec![0u8; Zip64EndOfCentralDirectory::MIN_SIZE];
        self.reader.read_exact_at(eocd64_offset, &mut record).await?;
        Zip64EndOfCentralDirectory::central_directory(&record)
    }

    /// List all entries in the archive, in Central Directory order.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let cd = self.central_directory().await?;

        if cd.offset.saturating_add(cd.size) > self.size {
            bail!(
                "Central Directory ({} bytes at {}) extends past the end of the archive",
                cd.size,
                cd.offset
            );
        }

        // One read for the whole directory keeps HTTP sources at a single
        // Range request.
        let mut cd_data = vec![0u8; cd.size as usize];
        self.reader.read_exact_at(cd.offset, &mut cd_data).await?;

        let mut cursor = Cursor::new(cd_data.as_slice());
        let mut entries = Vec::with_capacity(cd.entries.min(u16::MAX as u64) as usize);
        for index in 0..cd.entries {
            let entry = parse_cdfh(&mut cursor)
                .with_context(|| format!("Malformed Central Directory record #{}", index))?;
            entries.push(entry);
        }

        debug!(entries = entries.len(), "read central directory");
        Ok(entries)
    }

    /// Offset of an entry's data, past its Local File Header.
    ///
    /// The local header's variable-length fields may differ from the
    /// directory's copy, so it has to be read.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh = [0u8; LFH_SIZE];
        self.reader.read_exact_at(entry.lfh_offset, &mut lfh).await?;

        if &lfh[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header for {}", entry.file_name);
        }

        let file_name_length = u16::from_le_bytes([lfh[26], lfh[27]]) as u64;
        let extra_field_length = u16::from_le_bytes([lfh[28], lfh[29]]) as u64;

        Ok(entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length)
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

/// Decode one Central Directory File Header at the cursor's position.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
    let len = cursor.get_ref().len() as u64;
    if len.saturating_sub(cursor.position()) < CDFH_MIN_SIZE as u64 {
        bail!("Truncated Central Directory File Header");
    }

    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        bail!("Invalid Central Directory File Header");
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let file_comment_length = cursor.read_u16::<LittleEndian>()?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let _external_attrs = cursor.read_u32::<LittleEndian>()?;
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut file_name_bytes = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name_bytes)?;
    // Job names are UTF-8; anything else is kept readable rather than fatal
    let file_name = String::from_utf8_lossy(&file_name_bytes).into_owned();
    let is_directory = file_name.ends_with('/');

    // ZIP64 values appear in the extra field, in this fixed order, only for
    // the header fields that are saturated.
    let extra_field_end = cursor.position() + extra_field_length as u64;
    while cursor.position() + 4 <= extra_field_end {
        let header_id = cursor.read_u16::<LittleEndian>()?;
        let field_size = cursor.read_u16::<LittleEndian>()? as u64;
        let field_end = (cursor.position() + field_size).min(extra_field_end);

        if header_id == ZIP64_EXTRA_ID {
            for value in [&mut uncompressed_size, &mut compressed_size, &mut lfh_offset] {
                if *value == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    *value = cursor.read_u64::<LittleEndian>()?;
                }
            }
        }
        cursor.set_position(field_end);
    }

    let record_end = extra_field_end + file_comment_length as u64;
    if record_end > len {
        bail!(
            "Central Directory record for {} runs {} bytes past the directory",
            file_name,
            record_end - len
        );
    }
    cursor.set_position(record_end);

    Ok(ZipFileEntry {
        file_name,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
        flags,
        is_directory,
    })
}
