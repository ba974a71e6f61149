//! This library handles reading from and creating **EARC** archives used by the *Luminous* engine.
//!
//! # EARC Archive Format Documentation
//!
//! An EARC file packages many named game assets into a single container. Every asset is addressed
//! by a URI (`data://character/nh/nh00/model_000/nh00_000.gmdl`) and carries a relative path that
//! mirrors the engine's on-disk layout. EARC files are typically identified with the `.earc`
//! extension.
//!
//! ## File Structure
//!
//! An EARC file consists of a fixed header, a table of fixed-width file records, a URI string
//! table, a relative path string table and finally the data region.
//!
//! | Offset (bytes) | Field                  | Description                                                |
//! |----------------|------------------------|------------------------------------------------------------|
//! | 0x0000         | Magic number           | 4 bytes: "CRAF"                                            |
//! | 0x0004         | Version                | 4 bytes: Format version, high bit marks a protected archive|
//! | 0x0008         | File Count             | 4 bytes: Number of records in the archive                  |
//! | 0x000C         | Block Size             | 4 bytes: Alignment of the data region, always 512          |
//! | 0x0010         | File Headers Offset    | 4 bytes: Offset to the record table, always 64             |
//! | 0x0014         | URI List Offset        | 4 bytes: Offset to the URI string table                    |
//! | 0x0018         | Path List Offset       | 4 bytes: Offset to the relative path string table          |
//! | 0x001C         | Data Offset            | 4 bytes: Offset to the data region                         |
//! | 0x0020         | Flags                  | 4 bytes: Archive flags, see [`types::HeaderFlags`]         |
//! | 0x0024         | Chunk Size             | 4 bytes: Size of a compression chunk in KiB                |
//! | 0x0028         | Hash                   | 8 bytes: Hash of the header computed with this field zeroed|
//! | 0x0030         | Padding                | 16 bytes: Zero                                             |
//!
//! ### File Records
//!
//! Each record is 40 bytes wide. Unless a record carries
//! [`types::FileFlags::MASK_PROTECTED`], its size, processed size and data offset are stored XORed
//! against a running hash chain seeded from the header hash (see [`cipher::MaskState`]). The chain
//! only decodes correctly when the records are walked in storage order.
//!
//! | Offset (bytes) | Field                  | Description                                             |
//! |----------------|------------------------|---------------------------------------------------------|
//! | 0x0000         | URI Type Hash          | 8 bytes: Combined hash of the URI and its type          |
//! | 0x0008         | Size                   | 4 bytes: Logical size of the file (masked)              |
//! | 0x000C         | Processed Size         | 4 bytes: Size of the data on disk (masked)              |
//! | 0x0010         | Flags                  | 4 bytes: File flags, see [`types::FileFlags`]           |
//! | 0x0014         | URI Offset             | 4 bytes: Absolute offset of the URI string              |
//! | 0x0018         | Data Offset            | 8 bytes: Absolute offset of the data (masked)           |
//! | 0x0020         | Path Offset            | 4 bytes: Absolute offset of the relative path string    |
//! | 0x0024         | Localization Type      | 1 byte                                                  |
//! | 0x0025         | Locale                 | 1 byte                                                  |
//! | 0x0026         | Key                    | 2 bytes: Keystream key for the first 8 bytes of data    |
//!
//! ### String Tables
//!
//! URIs and relative paths are stored as NUL terminated UTF-8 strings. Each string starts on an
//! 8 byte boundary and both tables start on an 8 byte boundary.
//!
//! ### Data Region
//!
//! The data region starts on a 512 byte boundary and every file's data is padded to the next
//! 512 byte boundary. When the key of a record is non-zero, the first 8 bytes of its data are
//! XORed with a keystream derived from it. Compressed files are stored as a sequence of zlib
//! chunks, see [`compression`].
//!
//! ## Additional Information
//!
//! - **File Extension**: `.earc`
//! - **Endianness**: Little-endian for all multi-byte integers
//!

pub mod cipher;
pub mod compression;
pub mod entry;
pub mod error;
pub mod hash;
pub mod read;
pub mod types;
pub mod write;

pub use cipher::PayloadCipher;
pub use entry::{EarcEntry, Payload};
pub use read::{read_file_by_query, EarcArchive};
pub use types::{FileFlags, HeaderFlags};
pub use write::{EarcWriter, EarcWriterOptions};
