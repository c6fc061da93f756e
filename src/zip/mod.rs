//! ZIP container access for run log archives.
//!
//! - [`structures`]: fixed-layout records (EOCD, ZIP64 records, entry metadata)
//! - [`parser`]: locating and decoding the Central Directory
//! - [`reader`]: reading an entry's data into memory
//!
//! The End of Central Directory record is read first, from the end of the
//! source, then the Central Directory; entry data is fetched only on demand.
//! This suits HTTP Range requests against large archives.
//!
//! STORED and DEFLATE entries are supported, as are ZIP64 archives.
//! Encryption and multi-disk archives are not.

mod parser;
mod reader;
mod structures;

pub use parser::ZipParser;
pub use reader::ZipReader;
pub use structures::*;
