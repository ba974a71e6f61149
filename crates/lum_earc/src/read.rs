//! Types for reading EARC archives
//!

use binrw::BinRead;
use byteorder::ReadBytesExt;
use indexmap::IndexMap;
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
    sync::Arc,
};
use tracing::{debug, instrument, warn};

use crate::{
    cipher::{self, MaskState, PayloadCipher},
    compression,
    entry::{EarcEntry, Payload},
    error::{Error, FileNotFoundError, Result},
    hash,
    types::{EarcHeader, EarcRecord, FileFlags, RECORD_SIZE},
    write::{EarcWriter, EarcWriterOptions},
};

/// Structure representing an EARC file entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EarcFileData {
    /// URI identifying the file
    pub uri: Box<str>,
    /// Path of the file relative to the data root
    pub relative_path: Box<str>,
    /// Combined hash of the URI and its type
    pub uri_type_hash: u64,
    /// Type component of [`EarcFileData::uri_type_hash`]
    pub type_hash: u64,
    /// URI component of [`EarcFileData::uri_type_hash`]
    pub uri_hash: u64,
    /// Size of the file when extracted
    pub size: u32,
    /// Size of the file's data in the archive
    pub processed_size: u32,
    /// Flags of the file
    pub flags: FileFlags,
    /// Specifies where the URI string starts
    pub uri_offset: u32,
    /// Specifies where the relative path string starts
    pub relative_path_offset: u32,
    /// Specifies where the data of the file starts
    pub data_offset: u64,
    pub localization_type: u8,
    pub locale: u8,
    /// Keystream key of the first 8 bytes of data
    pub key: u16,
}

impl EarcFileData {
    fn from_record(record: EarcRecord, uri: String, relative_path: String) -> Self {
        let (type_hash, uri_hash) = hash::split_uri_type_hash(record.uri_type_hash);
        Self {
            uri: uri.into(),
            relative_path: relative_path.into(),
            uri_type_hash: record.uri_type_hash,
            type_hash,
            uri_hash,
            size: record.size,
            processed_size: record.processed_size,
            flags: record.file_flags(),
            uri_offset: record.uri_offset,
            relative_path_offset: record.relative_path_offset,
            data_offset: record.data_offset,
            localization_type: record.localization_type,
            locale: record.locale,
            key: record.key,
        }
    }

    pub fn is_reference(&self) -> bool {
        self.flags.contains(FileFlags::REFERENCE)
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.contains(FileFlags::COMPRESSED)
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags.contains(FileFlags::ENCRYPTED)
    }
}

#[derive(Debug)]
pub(crate) struct Shared {
    header: EarcHeader,
    hash_matches: bool,
    files: IndexMap<Box<str>, EarcFileData>,
    duplicates: Vec<Box<str>>,
}

/// EARC archive reader
///
/// Opening an archive only reads the header, the records and their strings. File data is read
/// when requested.
///
/// ```no_run
/// fn list_earc_contents(reader: impl std::io::Read + std::io::Seek) -> lum_earc::error::Result<()> {
///     let mut earc = lum_earc::EarcArchive::new(reader)?;
///
///     for i in 0..earc.len() {
///         let uri = earc.by_index(i)?.uri.clone();
///         let data = earc.materialize(i)?;
///         println!("{uri}: {} bytes", data.len());
///     }
///
///     Ok(())
/// }
/// ```
pub struct EarcArchive<R> {
    reader: R,
    shared: Arc<Shared>,
    cipher: Option<Arc<dyn PayloadCipher>>,
}

impl<R> EarcArchive<R> {
    /// The parsed archive header
    pub fn header(&self) -> &EarcHeader {
        &self.shared.header
    }

    /// Whether the stored header hash matched the recomputed one
    pub fn hash_matches(&self) -> bool {
        self.shared.hash_matches
    }

    /// URIs of records that were skipped because an earlier record used the same URI
    pub fn duplicate_uris(&self) -> impl Iterator<Item = &str> {
        self.shared.duplicates.iter().map(|s| s.as_ref())
    }

    /// Whether the archive version is one this library knows the layout of
    pub fn is_supported_version(&self) -> bool {
        self.shared.header.is_supported_version()
    }

    /// Total size of the files in the archive, if it can be known. Doesn't include references.
    pub fn decompressed_size(&self) -> Option<u128> {
        let mut total = 0u128;
        for file in self.shared.files.values() {
            total = total.checked_add(file.size as u128)?;
        }
        Some(total)
    }

    /// Attach the transform used for files flagged [`FileFlags::ENCRYPTED`]
    pub fn with_cipher(mut self, cipher: Arc<dyn PayloadCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Number of entries contained in this EARC.
    pub fn len(&self) -> usize {
        self.shared.files.len()
    }

    /// Whether this EARC archive contains no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over all the URIs in this archive, in storage order.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.shared.files.keys().map(|s| s.as_ref())
    }

    /// Returns an iterator over the metadata of every entry, in storage order.
    pub fn files(&self) -> impl Iterator<Item = &EarcFileData> {
        self.shared.files.values()
    }

    /// Get the index of a file entry by URI, if it's present.
    #[inline(always)]
    pub fn index_for_name(&self, uri: &str) -> Option<usize> {
        self.shared.files.get_index_of(uri)
    }

    /// Get the URI of a file entry, if it's present.
    #[inline(always)]
    pub fn name_for_index(&self, index: usize) -> Option<&str> {
        self.shared
            .files
            .get_index(index)
            .map(|(uri, _)| uri.as_ref())
    }

    /// Whether an entry with exactly this URI exists
    pub fn has_file(&self, uri: &str) -> bool {
        self.shared.files.contains_key(uri)
    }

    /// The first URI ending with `query`
    pub fn uri_by_query(&self, query: &str) -> Option<&str> {
        self.file_names().find(|uri| uri.ends_with(query))
    }

    /// Get the metadata of a contained file by index
    pub fn by_index(&self, index: usize) -> Result<&EarcFileData> {
        self.shared
            .files
            .get_index(index)
            .map(|(_, data)| data)
            .ok_or(Error::FileNotFound(FileNotFoundError::Index(index)))
    }

    /// Search for the metadata of a file entry by URI
    pub fn by_name(&self, uri: &str) -> Result<&EarcFileData> {
        self.shared
            .files
            .get(uri)
            .ok_or_else(|| Error::FileNotFound(FileNotFoundError::Name(uri.to_owned())))
    }

    /// Unwrap and return the inner reader object
    ///
    /// The position of the reader is undefined.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek> EarcArchive<R> {
    /// Read an EARC archive collecting the files it contains.
    #[instrument(skip_all, err)]
    pub fn new(mut reader: R) -> Result<EarcArchive<R>> {
        let shared = Self::get_metadata(&mut reader)?;
        Ok(EarcArchive {
            reader,
            shared: shared.into(),
            cipher: None,
        })
    }

    /// Read the stored bytes of a file with the keystream removed
    ///
    /// The result is still compressed or encrypted according to the file's flags.
    #[instrument(skip(self), err)]
    pub fn read_raw(&mut self, index: usize) -> Result<Vec<u8>> {
        let file = self.by_index(index)?;
        if file.is_reference() {
            return Err(Error::PayloadNotLoaded(file.uri.to_string()));
        }
        let (offset, stored, key) = (file.data_offset, file.processed_size, file.key);

        self.reader.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; stored as usize];
        self.reader.read_exact(&mut buffer)?;

        cipher::apply_keystream(key, &mut buffer);
        Ok(buffer)
    }

    /// Read and decode the content of a file
    #[instrument(skip(self), err)]
    pub fn materialize(&mut self, index: usize) -> Result<Vec<u8>> {
        let buffer = self.read_raw(index)?;
        let file = self.by_index(index)?;

        let mut buffer = if file.is_compressed() {
            compression::decompress(
                &buffer,
                file.size as usize,
                self.shared.header.chunk_size_bytes(),
                self.shared.header.data_offset as u64,
            )?
        } else if file.is_encrypted() {
            self.cipher
                .as_ref()
                .ok_or_else(|| Error::CipherUnavailable(file.uri.to_string()))?
                .decrypt(&buffer)?
        } else {
            buffer
        };

        buffer.truncate(file.size as usize);
        Ok(buffer)
    }

    /// Read and decode the content of a file by its exact URI
    pub fn read_by_name(&mut self, uri: &str) -> Result<Vec<u8>> {
        let index = self
            .index_for_name(uri)
            .ok_or_else(|| Error::FileNotFound(FileNotFoundError::Name(uri.to_owned())))?;
        self.materialize(index)
    }

    /// Read the first file whose URI contains `query`, ignoring case
    ///
    /// Returns the matched URI together with the content.
    #[instrument(skip(self), err)]
    pub fn by_query(&mut self, query: &str) -> Result<(String, Vec<u8>)> {
        let needle = query.to_lowercase();
        let (index, uri) = self
            .file_names()
            .enumerate()
            .find(|(_, uri)| uri.to_lowercase().contains(&needle))
            .map(|(index, uri)| (index, uri.to_owned()))
            .ok_or_else(|| Error::FileNotFound(FileNotFoundError::Query(query.to_owned())))?;

        Ok((uri, self.materialize(index)?))
    }

    /// Read every file whose URI contains `query`
    ///
    /// References are skipped since they carry no data.
    #[instrument(skip(self), err)]
    pub fn files_by_query(&mut self, query: &str) -> Result<IndexMap<String, Vec<u8>>> {
        let matches = self
            .files()
            .enumerate()
            .filter(|(_, file)| file.uri.contains(query) && !file.is_reference())
            .map(|(index, file)| (index, file.uri.to_string()))
            .collect::<Vec<_>>();

        matches
            .into_iter()
            .map(|(index, uri)| -> Result<(String, Vec<u8>)> {
                Ok((uri, self.materialize(index)?))
            })
            .collect()
    }

    /// Read every file and turn the archive into a writer holding the same entries
    ///
    /// The header version, flags and chunk size are carried over, as is the stored identifier of
    /// every file. Encrypted files are kept in their stored form when no cipher is attached.
    ///
    /// URIs that were not valid UTF-8 were decoded lossily when the archive was opened and are
    /// written back in that form. Fails with [`Error::DuplicateEntry`] when the archive holds
    /// several records for the same URI, since only the first one is readable.
    #[instrument(skip(self), err)]
    pub fn into_writer(mut self) -> Result<EarcWriter> {
        if let Some(uri) = self.shared.duplicates.first() {
            return Err(Error::DuplicateEntry(uri.to_string()));
        }

        let header = self.shared.header;
        let mut writer = EarcWriter::new(
            EarcWriterOptions::builder()
                .version(header.version)
                .flags(header.header_flags())
                .chunk_size_kib(header.chunk_size)
                .build(),
        );
        if let Some(cipher) = &self.cipher {
            writer = writer.with_cipher(cipher.clone());
        }

        let files = self.files().cloned().collect::<Vec<_>>();
        for (index, file) in files.into_iter().enumerate() {
            let payload = if file.is_reference() {
                Payload::Reference
            } else if file.is_encrypted() && !file.is_compressed() && self.cipher.is_none() {
                Payload::Processed {
                    size: file.size,
                    data: self.read_raw(index)?,
                }
            } else {
                Payload::Owned(self.materialize(index)?)
            };

            writer.add_entry(
                EarcEntry::builder()
                    .uri(file.uri.to_string())
                    .relative_path(file.relative_path.to_string())
                    .flags(file.flags)
                    .localization_type(file.localization_type)
                    .locale(file.locale)
                    .key(file.key)
                    .uri_type_hash(file.uri_type_hash)
                    .payload(payload)
                    .build(),
            )?;
        }

        Ok(writer)
    }

    fn get_header(reader: &mut R) -> Result<EarcHeader> {
        match EarcHeader::read(reader) {
            Ok(header) => Ok(header),
            Err(binrw::Error::BadMagic { .. }) => Err(Error::InvalidArchive),
            Err(e) => Err(Error::MalformedHeader(e.to_string())),
        }
    }

    fn get_records(reader: &mut R, header: &EarcHeader) -> Result<Vec<EarcRecord>> {
        (0..header.file_count as u64)
            .map(|i| {
                reader.seek(SeekFrom::Start(
                    header.file_headers_offset as u64 + i * RECORD_SIZE as u64,
                ))?;
                EarcRecord::read(reader).map_err(Error::from)
            })
            .collect()
    }

    fn get_string(reader: &mut R, offset: u32) -> Result<String> {
        reader.seek(SeekFrom::Start(offset as u64))?;

        let mut raw: Vec<u8> = Vec::new();
        loop {
            let char = reader.read_u8()?;
            if char == b'\0' {
                break;
            }
            raw.push(char);
        }
        match String::from_utf8(raw) {
            Ok(string) => Ok(string),
            Err(e) => {
                let lossy = String::from_utf8_lossy(e.as_bytes()).into_owned();
                warn!(offset, string = %lossy, "string is not valid utf-8, decoding lossily");
                Ok(lossy)
            }
        }
    }

    fn get_metadata(reader: &mut R) -> Result<Shared> {
        let header = Self::get_header(reader)?;

        if !header.is_supported_version() {
            warn!(
                version = %format!("{:#x}", header.base_version()),
                "unsupported archive version, reading on a best effort basis"
            );
        }

        let hash_matches = header.compute_hash()? == header.hash;
        if !hash_matches {
            warn!(hash = %format!("{:#018x}", header.hash), "archive header hash mismatch");
        }

        let records = Self::get_records(reader, &header)?;
        let (_, records) = cipher::apply_mask(MaskState::new(&header), records);

        let mut files = IndexMap::with_capacity(header.file_count as usize);
        let mut duplicates = Vec::new();
        for record in records {
            let uri = Self::get_string(reader, record.uri_offset)?;
            let relative_path = Self::get_string(reader, record.relative_path_offset)?;
            debug!(%uri, size = record.size, flags = record.flags, "read record");

            if files.contains_key(uri.as_str()) {
                warn!(%uri, "duplicate uri in archive, keeping the first entry");
                duplicates.push(uri.into());
                continue;
            }

            let file = EarcFileData::from_record(record, uri, relative_path);
            files.insert(file.uri.clone(), file);
        }

        Ok(Shared {
            header,
            hash_matches,
            files,
            duplicates,
        })
    }
}

/// Open the archive at `path` and read the first file whose URI contains `query`
pub fn read_file_by_query(path: impl AsRef<Path>, query: &str) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut earc = EarcArchive::new(file)?;
    earc.by_query(query).map(|(_, data)| data)
}
