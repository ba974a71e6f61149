//! Owned file entries used when building an archive.

use bon::bon;

use crate::hash;
use crate::types::FileFlags;

/// Content of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// The data lives in another archive
    Reference,

    /// Raw file content, encoded by the writer according to the entry's flags
    Owned(Vec<u8>),

    /// Data already in its stored form (compressed and/or encrypted, without the keystream),
    /// written as is
    Processed {
        /// Logical size of the data once decoded
        size: u32,
        /// The stored bytes
        data: Vec<u8>,
    },
}

impl Payload {
    /// Logical size of the content
    pub fn size(&self) -> u64 {
        match self {
            Payload::Reference => 0,
            Payload::Owned(data) => data.len() as u64,
            Payload::Processed { size, .. } => u64::from(*size),
        }
    }
}

/// Derives the packaged relative path of a URI
///
/// The scheme is dropped and source extensions are replaced by the extension the engine loads.
///
/// ```
/// use lum_earc::entry::uri_to_relative_path;
///
/// assert_eq!(uri_to_relative_path("data://chr/nh00.gmdl"), "chr/nh00.gmdl.gfxbin");
/// assert_eq!(uri_to_relative_path("data://ui/icon.TIF"), "ui/icon.btex");
/// assert_eq!(uri_to_relative_path("data://test/a.txt"), "test/a.txt");
/// ```
pub fn uri_to_relative_path(uri: &str) -> String {
    let path = uri.split_once("://").map_or(uri, |(_, path)| path);
    let name_start = path.rfind('/').map_or(0, |i| i + 1);

    let Some(dot) = path[name_start..].find('.') else {
        return path.to_owned();
    };

    let (stem, extension) = path.split_at(name_start + dot + 1);
    let packaged = match extension.to_lowercase().as_str() {
        "tif" | "tga" | "png" | "dds" | "exr" => "btex",
        "gmdl" => "gmdl.gfxbin",
        "gmtl" => "gmtl.gfxbin",
        "ebex" | "prefab" => "exml",
        _ => return path.to_owned(),
    };

    format!("{stem}{packaged}")
}

/// A file owned by an [`crate::write::EarcWriter`]
///
/// An entry flagged [`FileFlags::REFERENCE`] never holds data, and an entry holding
/// [`Payload::Reference`] is always flagged as a reference.
#[derive(Debug, Clone, PartialEq)]
pub struct EarcEntry {
    uri: Box<str>,
    relative_path: Box<str>,
    flags: FileFlags,
    localization_type: u8,
    locale: u8,
    key: u16,
    uri_type_hash: Option<u64>,
    payload: Payload,
}

#[bon]
impl EarcEntry {
    /// Creates an entry, deriving the relative path from the URI when none is given
    ///
    /// `uri_type_hash` pins the stored identifier, it is computed from the URI otherwise.
    ///
    /// ```
    /// use lum_earc::{EarcEntry, FileFlags, Payload};
    ///
    /// let entry = EarcEntry::builder()
    ///     .uri("data://test/b.txt")
    ///     .flags(FileFlags::REFERENCE)
    ///     .build();
    ///
    /// assert!(entry.is_reference());
    /// assert_eq!(entry.payload(), &Payload::Reference);
    /// ```
    #[builder]
    pub fn new(
        #[builder(into)] uri: String,
        #[builder(into)] relative_path: Option<String>,
        #[builder(default)] flags: FileFlags,
        #[builder(default)] localization_type: u8,
        #[builder(default)] locale: u8,
        #[builder(default)] key: u16,
        uri_type_hash: Option<u64>,
        payload: Option<Payload>,
    ) -> Self {
        let mut flags = flags;
        let payload = match payload {
            _ if flags.contains(FileFlags::REFERENCE) => Payload::Reference,
            Some(Payload::Reference) => {
                flags |= FileFlags::REFERENCE;
                Payload::Reference
            }
            Some(payload) => payload,
            None => Payload::Owned(Vec::new()),
        };

        let relative_path = relative_path.unwrap_or_else(|| uri_to_relative_path(&uri));

        Self {
            uri: uri.into(),
            relative_path: relative_path.into(),
            flags,
            localization_type,
            locale,
            key,
            uri_type_hash,
            payload,
        }
    }
}

impl EarcEntry {
    /// The URI identifying the file
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The path of the file relative to the data root
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn flags(&self) -> FileFlags {
        self.flags
    }

    pub fn localization_type(&self) -> u8 {
        self.localization_type
    }

    pub fn locale(&self) -> u8 {
        self.locale
    }

    /// The keystream key, zero when none is assigned yet
    pub fn key(&self) -> u16 {
        self.key
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Logical size of the content
    pub fn size(&self) -> u64 {
        self.payload.size()
    }

    pub fn is_reference(&self) -> bool {
        self.flags.contains(FileFlags::REFERENCE)
    }

    pub fn is_autoload(&self) -> bool {
        self.flags.contains(FileFlags::AUTOLOAD)
    }

    /// The stored identifier, [`hash::uri_type_hash`] of the URI unless one was pinned
    pub fn uri_type_hash(&self) -> u64 {
        self.uri_type_hash
            .unwrap_or_else(|| hash::uri_type_hash(&self.uri))
    }

    /// Replaces the content with raw data, turning a reference into a regular file
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.flags.remove(FileFlags::REFERENCE);
        self.payload = Payload::Owned(data);
    }

    /// Replaces the content with data already in its stored form
    ///
    /// The data must match the entry's [`FileFlags::COMPRESSED`] and [`FileFlags::ENCRYPTED`]
    /// flags, it is written without being encoded again.
    pub fn set_processed_data(&mut self, size: u32, data: Vec<u8>) {
        self.flags.remove(FileFlags::REFERENCE);
        self.payload = Payload::Processed { size, data };
    }

    /// Replaces the flags, dropping the content when the entry becomes a reference
    pub fn set_flags(&mut self, flags: FileFlags) {
        self.flags = flags;
        if self.is_reference() {
            self.payload = Payload::Reference;
        } else if self.payload == Payload::Reference {
            self.payload = Payload::Owned(Vec::new());
        }
    }

    pub fn set_relative_path(&mut self, relative_path: impl Into<String>) {
        self.relative_path = relative_path.into().into();
    }

    pub fn set_localization_type(&mut self, localization_type: u8) {
        self.localization_type = localization_type;
    }

    pub fn set_locale(&mut self, locale: u8) {
        self.locale = locale;
    }

    pub fn set_key(&mut self, key: u16) {
        self.key = key;
    }

    pub fn set_uri_type_hash(&mut self, uri_type_hash: Option<u64>) {
        self.uri_type_hash = uri_type_hash;
    }

    /// Position of the entry in the written archive
    pub(crate) fn sort_key(&self) -> (bool, bool, bool, u64, u64) {
        let (type_hash, uri_hash) = hash::split_uri_type_hash(self.uri_type_hash());
        (
            self.is_autoload(),
            self.uri.ends_with(".autoext"),
            self.is_reference(),
            type_hash,
            uri_hash,
        )
    }
}
