use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use anyhow::{Result, bail};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }
}

/// Where the central directory lives and how many records it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CentralDirectory {
    pub offset: u64,
    pub size: u64,
    pub entries: u64,
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, Copy)]
pub struct EndOfCentralDirectory {
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid End of Central Directory");
        }

        // Skip disk numbers and per-disk entry count; multi-disk archives
        // are not produced by the log service.
        let mut cursor = Cursor::new(&data[10..]);

        Ok(Self {
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Any saturated field means the real values live in the ZIP64 record.
    pub fn is_zip64(&self) -> bool {
        self.total_entries == 0xFFFF || self.cd_size == 0xFFFFFFFF || self.cd_offset == 0xFFFFFFFF
    }

    pub fn central_directory(&self) -> CentralDirectory {
        CentralDirectory {
            offset: self.cd_offset as u64,
            size: self.cd_size as u64,
            entries: self.total_entries as u64,
        }
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64Locator;

impl Zip64Locator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    /// Returns the offset of the ZIP64 EOCD record.
    pub fn eocd64_offset(data: &[u8]) -> Result<u64> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 End of Central Directory Locator");
        }
        Ok(Cursor::new(&data[8..16]).read_u64::<LittleEndian>()?)
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EndOfCentralDirectory;

impl Zip64EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn central_directory(data: &[u8]) -> Result<CentralDirectory> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 End of Central Directory");
        }

        // Total entry count, directory size and offset are the last three
        // fixed fields of the record.
        let mut cursor = Cursor::new(&data[32..56]);

        let entries = cursor.read_u64::<LittleEndian>()?;
        let size = cursor.read_u64::<LittleEndian>()?;
        let offset = cursor.read_u64::<LittleEndian>()?;

        Ok(CentralDirectory {
            offset,
            size,
            entries,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// ZIP64 extended information extra field
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// General purpose flag bit 0: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub flags: u16,
    pub is_directory: bool,
}

impl ZipFileEntry {
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eocd(entries: u16, cd_size: u32, cd_offset: u32) -> Vec<u8> {
        let mut buf = EndOfCentralDirectory::SIGNATURE.to_vec();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(&entries.to_le_bytes());
        buf.extend_from_slice(&entries.to_le_bytes());
        buf.extend_from_slice(&cd_size.to_le_bytes());
        buf.extend_from_slice(&cd_offset.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf
    }

    #[test]
    fn test_eocd_fields() {
        let record = EndOfCentralDirectory::from_bytes(&eocd(3, 120, 4000)).unwrap();
        assert!(!record.is_zip64());
        assert_eq!(
            record.central_directory(),
            CentralDirectory {
                offset: 4000,
                size: 120,
                entries: 3
            }
        );
    }

    #[test]
    fn test_eocd_saturated_fields_mean_zip64() {
        let record = EndOfCentralDirectory::from_bytes(&eocd(0xFFFF, 10, 10)).unwrap();
        assert!(record.is_zip64());
    }

    #[test]
    fn test_bad_signature_rejected() {
        let mut data = eocd(1, 1, 1);
        data[3] = 0x07;
        assert!(EndOfCentralDirectory::from_bytes(&data).is_err());
        assert!(EndOfCentralDirectory::from_bytes(&data[..10]).is_err());
    }

    #[test]
    fn test_zip64_record_fields() {
        let mut data = Zip64EndOfCentralDirectory::SIGNATURE.to_vec();
        data.extend_from_slice(&44u64.to_le_bytes()); // record size
        data.extend_from_slice(&[45, 0, 45, 0]); // versions
        data.extend_from_slice(&[0; 8]); // disk numbers
        data.extend_from_slice(&7u64.to_le_bytes()); // entries on disk
        data.extend_from_slice(&7u64.to_le_bytes()); // total entries
        data.extend_from_slice(&512u64.to_le_bytes());
        data.extend_from_slice(&(5u64 << 32).to_le_bytes());

        let cd = Zip64EndOfCentralDirectory::central_directory(&data).unwrap();
        assert_eq!(cd.entries, 7);
        assert_eq!(cd.size, 512);
        assert_eq!(cd.offset, 5u64 << 32);
    }
}
