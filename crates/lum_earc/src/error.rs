//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// file is an invalid earc archive
    #[error("file is an invalid earc archive")]
    InvalidArchive,

    /// archive header is malformed: {0}
    #[error("archive header is malformed: {0}")]
    MalformedHeader(String),

    /// unable to find requested file
    #[error("unable to find requested file")]
    FileNotFound(#[from] FileNotFoundError),

    /// archive already contains {0}
    #[error("archive already contains {0}")]
    #[diagnostic(help("remove the existing entry or update it in place"))]
    DuplicateEntry(String),

    /// {0} is a reference and has no data in this archive
    #[error("{0} is a reference and has no data in this archive")]
    PayloadNotLoaded(String),

    /// {0} is encrypted but no cipher was provided
    #[error("{0} is encrypted but no cipher was provided")]
    #[diagnostic(help("attach a cipher with `with_cipher` before reading or writing encrypted files"))]
    CipherUnavailable(String),

    /// {0} does not fit into a 32 bit size field
    #[error("{0} does not fit into a 32 bit size field")]
    EntryTooLarge(String),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Error type to provide further information when a file has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested file")]
pub enum FileNotFoundError {
    /// at index {0}
    #[error("at index {0}")]
    Index(usize),

    /// by uri {0}
    #[error("by uri {0}")]
    Name(String),

    /// matching query {0}
    #[error("matching query {0}")]
    Query(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
