//! Types for writing EARC archives
//!

use binrw::BinWrite;
use bon::Builder;
use flate2::Compression;
use indexmap::IndexMap;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, trace};

use crate::cipher::{self, MaskState, PayloadCipher};
use crate::compression;
use crate::entry::{EarcEntry, Payload};
use crate::error::{Error, FileNotFoundError, Result};
use crate::types::{
    align, EarcHeader, EarcRecord, FileFlags, HeaderFlags, BLOCK_SIZE, DEFAULT_CHUNK_SIZE_KIB,
    DEFAULT_VERSION, HEADER_SIZE, POINTER_SIZE, PROTECTED_VERSION_BIT, RECORD_SIZE,
};

/// Options for how the EARC file should be written
#[derive(Debug, Clone, Copy, Builder)]
pub struct EarcWriterOptions {
    /// The format version, the protected bit is added for copyguarded archives
    #[builder(default = DEFAULT_VERSION)]
    pub version: u32,

    /// The archive flags
    #[builder(default)]
    pub flags: HeaderFlags,

    /// The size of a compression chunk in KiB
    #[builder(default = DEFAULT_CHUNK_SIZE_KIB)]
    pub chunk_size_kib: u32,

    /// The zlib level used for compressed files
    #[builder(default)]
    pub compression: Compression,
}

impl Default for EarcWriterOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Position of the string tables and each entry's strings
#[derive(Debug, Default)]
struct Layout {
    uri_list_offset: u32,
    path_list_offset: u32,
    data_offset: u32,
    uri_table: Vec<u8>,
    uri_offsets: Vec<u32>,
    path_table: Vec<u8>,
    path_offsets: Vec<u32>,
}

fn to_u32(value: u64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::CustomError("archive tables exceed the 32 bit offset range".into()))
}

/// Lays out NUL terminated strings, each starting on a [`POINTER_SIZE`] boundary
fn string_table<'a>(
    strings: impl Iterator<Item = &'a str>,
    base: u32,
) -> Result<(Vec<u8>, Vec<u32>)> {
    let mut table = Vec::new();
    let mut offsets = Vec::new();
    for string in strings {
        offsets.push(to_u32(base as u64 + table.len() as u64)?);
        table.extend_from_slice(string.as_bytes());
        table.push(0);
        table.resize(align(table.len() as u64, POINTER_SIZE as u64) as usize, 0);
    }
    Ok((table, offsets))
}

impl Layout {
    fn new(entries: &[&EarcEntry]) -> Result<Self> {
        let records = entries.len() as u64 * RECORD_SIZE as u64;
        let uri_list_offset = to_u32(HEADER_SIZE as u64 + align(records, POINTER_SIZE as u64))?;
        let (uri_table, uri_offsets) =
            string_table(entries.iter().map(|e| e.uri()), uri_list_offset)?;

        let path_list_offset = to_u32(align(
            uri_list_offset as u64 + uri_table.len() as u64,
            POINTER_SIZE as u64,
        ))?;
        let (path_table, path_offsets) =
            string_table(entries.iter().map(|e| e.relative_path()), path_list_offset)?;

        let data_offset = to_u32(align(
            path_list_offset as u64 + path_table.len() as u64,
            BLOCK_SIZE as u64,
        ))?;

        Ok(Self {
            uri_list_offset,
            path_list_offset,
            data_offset,
            uri_table,
            uri_offsets,
            path_table,
            path_offsets,
        })
    }
}

/// EARC archive generator
///
/// Holds the entries of an archive until they are serialized with [`EarcWriter::finish`].
///
/// ```
/// # fn doit() -> lum_earc::error::Result<()>
/// # {
/// use lum_earc::{EarcArchive, EarcWriter, EarcWriterOptions};
///
/// let mut earc = EarcWriter::new(EarcWriterOptions::default());
/// earc.add_file("data://test/a.txt", b"hello".to_vec())?;
/// earc.add_reference("data://test/b.txt", false)?;
///
/// let bytes = earc.to_bytes()?;
///
/// let mut archive = EarcArchive::new(std::io::Cursor::new(bytes))?;
/// assert_eq!(archive.read_by_name("data://test/a.txt")?, b"hello".to_vec());
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
#[derive(Debug)]
pub struct EarcWriter {
    options: EarcWriterOptions,
    cipher: Option<Arc<dyn PayloadCipher>>,
    entries: IndexMap<Box<str>, EarcEntry>,
}

impl Default for EarcWriter {
    fn default() -> Self {
        Self::new(EarcWriterOptions::default())
    }
}

impl EarcWriter {
    /// Initializes an empty archive.
    pub fn new(options: EarcWriterOptions) -> EarcWriter {
        EarcWriter {
            options,
            cipher: None,
            entries: IndexMap::new(),
        }
    }

    /// Attach the transform used for files flagged [`FileFlags::ENCRYPTED`]
    pub fn with_cipher(mut self, cipher: Arc<dyn PayloadCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn options(&self) -> &EarcWriterOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut EarcWriterOptions {
        &mut self.options
    }

    /// Number of entries in the archive
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry with exactly this URI exists
    pub fn has_file(&self, uri: &str) -> bool {
        self.entries.contains_key(uri)
    }

    /// The entries in insertion order
    pub fn entries(&self) -> impl Iterator<Item = &EarcEntry> {
        self.entries.values()
    }

    /// Get an entry by its exact URI
    pub fn entry(&self, uri: &str) -> Result<&EarcEntry> {
        self.entries
            .get(uri)
            .ok_or_else(|| Error::FileNotFound(FileNotFoundError::Name(uri.to_owned())))
    }

    /// Get a mutable entry by its exact URI
    pub fn entry_mut(&mut self, uri: &str) -> Result<&mut EarcEntry> {
        self.entries
            .get_mut(uri)
            .ok_or_else(|| Error::FileNotFound(FileNotFoundError::Name(uri.to_owned())))
    }

    /// Add a prepared entry
    pub fn add_entry(&mut self, entry: EarcEntry) -> Result<()> {
        if self.entries.contains_key(entry.uri()) {
            return Err(Error::DuplicateEntry(entry.uri().to_owned()));
        }
        self.entries.insert(entry.uri().into(), entry);
        Ok(())
    }

    fn add(&mut self, uri: String, flags: FileFlags, payload: Payload) -> Result<()> {
        self.add_entry(
            EarcEntry::builder()
                .uri(uri)
                .flags(flags)
                .payload(payload)
                .build(),
        )
    }

    /// Add a file stored as is
    pub fn add_file(&mut self, uri: impl Into<String>, data: Vec<u8>) -> Result<()> {
        self.add(uri.into(), FileFlags::empty(), Payload::Owned(data))
    }

    /// Add a file stored as zlib chunks
    pub fn add_compressed_file(
        &mut self,
        uri: impl Into<String>,
        data: Vec<u8>,
        autoload: bool,
    ) -> Result<()> {
        let mut flags = FileFlags::COMPRESSED;
        flags.set(FileFlags::AUTOLOAD, autoload);
        self.add(uri.into(), flags, Payload::Owned(data))
    }

    /// Add a file the engine loads eagerly
    pub fn add_autoload_file(&mut self, uri: impl Into<String>, data: Vec<u8>) -> Result<()> {
        self.add(uri.into(), FileFlags::AUTOLOAD, Payload::Owned(data))
    }

    /// Add a reference to a file stored in another archive
    pub fn add_reference(&mut self, uri: impl Into<String>, autoload: bool) -> Result<()> {
        let mut flags = FileFlags::REFERENCE;
        flags.set(FileFlags::AUTOLOAD, autoload);
        self.add(uri.into(), flags, Payload::Reference)
    }

    /// Replace the content of the first file whose URI ends with `query`
    #[instrument(skip(self, data), err)]
    pub fn update_file(&mut self, query: &str, data: Vec<u8>) -> Result<()> {
        let entry = self
            .entries
            .values_mut()
            .find(|entry| entry.uri().ends_with(query))
            .ok_or_else(|| Error::FileNotFound(FileNotFoundError::Query(query.to_owned())))?;

        entry.set_data(data);
        Ok(())
    }

    fn index_ignore_case(&self, uri: &str) -> Result<usize> {
        let needle = uri.to_lowercase();
        self.entries
            .keys()
            .position(|key| key.to_lowercase() == needle)
            .ok_or_else(|| Error::FileNotFound(FileNotFoundError::Name(uri.to_owned())))
    }

    /// Replace the content of a file with data already in its stored form
    ///
    /// The URI is matched ignoring case.
    #[instrument(skip(self, data), err)]
    pub fn update_file_with_processed_data(
        &mut self,
        uri: &str,
        size: u32,
        data: Vec<u8>,
    ) -> Result<()> {
        let index = self.index_ignore_case(uri)?;
        if let Some((_, entry)) = self.entries.get_index_mut(index) {
            entry.set_processed_data(size, data);
        }
        Ok(())
    }

    /// Remove a file, matching the URI ignoring case
    #[instrument(skip(self), err)]
    pub fn remove_file(&mut self, uri: &str) -> Result<EarcEntry> {
        let index = self.index_ignore_case(uri)?;
        self.entries
            .shift_remove_index(index)
            .map(|(_, entry)| entry)
            .ok_or_else(|| Error::FileNotFound(FileNotFoundError::Index(index)))
    }

    /// The entries in the order they are stored in the archive
    fn sorted_entries(&self) -> Vec<&EarcEntry> {
        let mut entries = self.entries.values().collect::<Vec<_>>();
        entries.sort_by_cached_key(|entry| entry.sort_key());
        entries
    }

    fn build_header(&self, layout: &Layout, file_count: usize) -> Result<EarcHeader> {
        let mut version = self.options.version;
        if self.options.flags.contains(HeaderFlags::COPYGUARD) {
            version |= PROTECTED_VERSION_BIT;
        }

        let mut header = EarcHeader {
            version,
            file_count: to_u32(file_count as u64)?,
            block_size: BLOCK_SIZE,
            file_headers_offset: HEADER_SIZE,
            uri_list_offset: layout.uri_list_offset,
            path_list_offset: layout.path_list_offset,
            data_offset: layout.data_offset,
            flags: self.options.flags.bits(),
            chunk_size: self.options.chunk_size_kib,
            hash: 0,
        };
        header.hash = header.compute_hash()?;
        Ok(header)
    }

    /// Key stored for an entry, only compressed or encrypted files carry one
    fn assign_key(header: &EarcHeader, entry: &EarcEntry) -> u16 {
        if !entry
            .flags()
            .intersects(FileFlags::COMPRESSED | FileFlags::ENCRYPTED)
        {
            return 0;
        }

        match entry.key() {
            0 if header.is_protected() => cipher::derive_key(entry.uri()),
            key => key,
        }
    }

    /// Returns the logical size and the stored bytes of an entry, without keystream
    fn encode(&self, header: &EarcHeader, entry: &EarcEntry) -> Result<(u32, Vec<u8>)> {
        let data = match entry.payload() {
            Payload::Reference => return Ok((0, Vec::new())),
            Payload::Processed { size, data } => return Ok((*size, data.clone())),
            Payload::Owned(data) => data,
        };

        let size =
            u32::try_from(data.len()).map_err(|_| Error::EntryTooLarge(entry.uri().to_owned()))?;

        let stored = if entry.flags().contains(FileFlags::COMPRESSED) {
            compression::compress(
                data,
                header.chunk_size_bytes(),
                header.data_offset as u64,
                self.options.compression,
            )?
        } else if entry.flags().contains(FileFlags::ENCRYPTED) {
            self.cipher
                .as_ref()
                .ok_or_else(|| Error::CipherUnavailable(entry.uri().to_owned()))?
                .encrypt(data)?
        } else {
            data.clone()
        };

        Ok((size, stored))
    }

    /// Serializes the data region, returning the unmasked records alongside it
    fn serialize_data(
        &self,
        header: &EarcHeader,
        entries: &[&EarcEntry],
        layout: &Layout,
    ) -> Result<(Vec<EarcRecord>, Vec<u8>)> {
        let mut rng = StdRng::seed_from_u64(header.hash);
        let mut data = Vec::new();
        let mut records = Vec::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            let key = Self::assign_key(header, entry);
            let data_offset = header.data_offset as u64 + data.len() as u64;

            let (size, mut stored) = self.encode(header, entry)?;
            cipher::apply_keystream(key, &mut stored);

            let processed_size = u32::try_from(stored.len())
                .map_err(|_| Error::EntryTooLarge(entry.uri().to_owned()))?;
            trace!(uri = entry.uri(), size, processed_size, data_offset, key, "serialized file");

            let padded = align(stored.len() as u64, BLOCK_SIZE as u64) as usize;
            let mut padding = vec![0u8; padded - stored.len()];
            rng.fill_bytes(&mut padding);

            data.extend_from_slice(&stored);
            data.extend_from_slice(&padding);

            records.push(EarcRecord {
                uri_type_hash: entry.uri_type_hash(),
                size,
                processed_size,
                flags: entry.flags().bits(),
                uri_offset: layout.uri_offsets[index],
                data_offset,
                relative_path_offset: layout.path_offsets[index],
                localization_type: entry.localization_type(),
                locale: entry.locale(),
                key,
            });
        }

        Ok((records, data))
    }

    /// Serialize the archive and write it to `inner`
    ///
    /// The entries stay untouched, the writer can be modified and finished again.
    #[instrument(skip_all, err, fields(files = self.entries.len()))]
    pub fn finish<W: Write>(&self, mut inner: W) -> Result<W> {
        info!("packing archive");

        let entries = self.sorted_entries();
        let layout = Layout::new(&entries)?;
        let header = self.build_header(&layout, entries.len())?;
        debug!(
            uri_list_offset = header.uri_list_offset,
            path_list_offset = header.path_list_offset,
            data_offset = header.data_offset,
            hash = %format!("{:#018x}", header.hash),
            "laid out archive"
        );

        let (records, data) = self.serialize_data(&header, &entries, &layout)?;
        let (_, records) = cipher::apply_mask(MaskState::new(&header), records);

        let mut output = Cursor::new(Vec::with_capacity(header.data_offset as usize + data.len()));
        header.write(&mut output)?;
        for record in &records {
            record.write(&mut output)?;
        }

        let mut output = output.into_inner();
        output.resize(header.uri_list_offset as usize, 0);
        output.extend_from_slice(&layout.uri_table);
        output.resize(header.path_list_offset as usize, 0);
        output.extend_from_slice(&layout.path_table);
        output.resize(header.data_offset as usize, 0);
        output.extend_from_slice(&data);

        inner.write_all(&output)?;
        Ok(inner)
    }

    /// Serialize the archive into a buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.finish(Vec::new())
    }

    /// Serialize the archive into the file at `path`, replacing it
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()), err)]
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes()?;
        File::create(path)?.write_all(&bytes)?;
        Ok(())
    }
}
