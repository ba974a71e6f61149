//! Base types for structure of EARC file.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};
use bitflags::bitflags;

use crate::error::Result;
use crate::hash;

/// Size of the fixed archive header
pub const HEADER_SIZE: u32 = 64;

/// Size of a single file record
pub const RECORD_SIZE: u32 = 40;

/// Alignment of the data region and of every file's data
pub const BLOCK_SIZE: u32 = 512;

/// Alignment of the string tables and of each string inside them
pub const POINTER_SIZE: u32 = 8;

/// Version written into new archives
pub const DEFAULT_VERSION: u32 = 0x0003_0014;

/// Bit set on the version of a protected archive
pub const PROTECTED_VERSION_BIT: u32 = 0x8000_0000;

/// Default compression chunk size, in KiB
pub const DEFAULT_CHUNK_SIZE_KIB: u32 = 128;

/// Range of versions (without the protected bit) this library knows the layout of
pub const SUPPORTED_VERSIONS: std::ops::RangeInclusive<u32> = 0x0002_0000..=0x0003_FFFF;

bitflags! {
    /// Archive wide flags
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct HeaderFlags: u32 {
        const HAS_LOOSE_DATA = 1;
        const HAS_LOCALE_DATA = 2;
        const DEBUG_ARCHIVE = 4;
        /// Seeds the record masking chain with an additional constant
        const COPYGUARD = 8;
    }
}

bitflags! {
    /// Per file flags
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct FileFlags: u32 {
        /// Loaded eagerly by the engine, sorted after every other file
        const AUTOLOAD = 1;
        /// Data is stored as zlib chunks
        const COMPRESSED = 2;
        /// Data lives in another archive
        const REFERENCE = 4;
        const NO_EARC = 8;
        const PATCHED = 16;
        const PATCHED_DELETED = 32;
        /// Data is transformed with the external [`crate::cipher::PayloadCipher`]
        const ENCRYPTED = 64;
        /// Record fields are stored without the masking chain
        const MASK_PROTECTED = 128;
    }
}

/// Rounds `value` up to the next multiple of `alignment`
#[inline]
pub const fn align(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// EARC file header
///
/// Defines the header of the EARC file which always starts with "CRAF".
/// All data is stored in little endian format
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(magic = b"CRAF", little)]
pub struct EarcHeader {
    /// Format version, optionally combined with [`PROTECTED_VERSION_BIT`]
    pub version: u32,

    /// The number of records stored in the file
    pub file_count: u32,

    /// Alignment of the data region, always [`BLOCK_SIZE`]
    pub block_size: u32,

    /// The offset from the beginning of the file where the records start
    pub file_headers_offset: u32,

    /// The offset of the URI string table
    pub uri_list_offset: u32,

    /// The offset of the relative path string table
    pub path_list_offset: u32,

    /// The offset of the data region
    pub data_offset: u32,

    /// Raw [`HeaderFlags`]
    pub flags: u32,

    /// Size of a compression chunk in KiB
    pub chunk_size: u32,

    /// Signature over the header, see [`EarcHeader::compute_hash`]
    #[brw(pad_after = 16)]
    pub hash: u64,
}

impl Default for EarcHeader {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            file_count: Default::default(),
            block_size: BLOCK_SIZE,
            file_headers_offset: HEADER_SIZE,
            uri_list_offset: Default::default(),
            path_list_offset: Default::default(),
            data_offset: Default::default(),
            flags: Default::default(),
            chunk_size: DEFAULT_CHUNK_SIZE_KIB,
            hash: Default::default(),
        }
    }
}

impl EarcHeader {
    /// Typed view of the header flags, unknown bits are kept
    pub fn header_flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_retain(self.flags)
    }

    /// Whether the archive uses the copyguard seed for its masking chain
    pub fn is_copyguarded(&self) -> bool {
        self.header_flags().contains(HeaderFlags::COPYGUARD)
    }

    /// Whether files of this archive get a keystream key assigned when written
    pub fn is_protected(&self) -> bool {
        self.is_copyguarded() || self.version & PROTECTED_VERSION_BIT != 0
    }

    /// Version without the protected marker
    pub fn base_version(&self) -> u32 {
        self.version & !PROTECTED_VERSION_BIT
    }

    /// Whether the version falls into [`SUPPORTED_VERSIONS`]
    pub fn is_supported_version(&self) -> bool {
        SUPPORTED_VERSIONS.contains(&self.base_version())
    }

    /// Size of a compression chunk in bytes
    pub fn chunk_size_bytes(&self) -> usize {
        self.chunk_size as usize * 1024
    }

    /// Hashes the serialized header with the hash field zeroed
    pub fn compute_hash(&self) -> Result<u64> {
        let mut buffer = Cursor::new(Vec::with_capacity(HEADER_SIZE as usize));
        EarcHeader { hash: 0, ..*self }.write(&mut buffer)?;
        Ok(hash::content_hash(buffer.get_ref()))
    }
}

/// EARC file record
///
/// Defines an entry in the EARC file. Values read straight from a file are still masked,
/// see [`crate::cipher::apply_mask`].
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct EarcRecord {
    /// See [`crate::hash::uri_type_hash`]
    pub uri_type_hash: u64,

    /// The logical size of the file
    pub size: u32,

    /// The size of the file's data in the archive
    pub processed_size: u32,

    /// Raw [`FileFlags`]
    pub flags: u32,

    /// Absolute offset of the URI string
    pub uri_offset: u32,

    /// Absolute offset of the file's data
    pub data_offset: u64,

    /// Absolute offset of the relative path string
    pub relative_path_offset: u32,

    pub localization_type: u8,

    pub locale: u8,

    /// Keystream key, zero when the data is stored as is
    pub key: u16,
}

impl EarcRecord {
    /// Typed view of the file flags, unknown bits are kept
    pub fn file_flags(&self) -> FileFlags {
        FileFlags::from_bits_retain(self.flags)
    }
}
