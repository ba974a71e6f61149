//! Chunked compression and decompression handling.
//!
//! Compressed files are split into chunks of the archive's chunk size. Each chunk is deflated on
//! its own and stored as:
//!
//! | Offset (bytes) | Field                  | Description                                     |
//! |----------------|------------------------|-------------------------------------------------|
//! | 0x0000         | Compressed Size        | 4 bytes: Size of the zlib stream                |
//! | 0x0004         | Decompressed Size      | 4 bytes: Size of the chunk once inflated        |
//! | 0x0008         | Data                   | (Compressed Size) bytes: zlib stream            |
//!
//! Every chunk after the first starts on a 4 byte boundary of the archive's data region offset
//! plus the position inside the file's data, so both directions take that region offset.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use binrw::{BinRead, BinWrite};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use tracing::{instrument, trace};

use crate::error::{Error, Result};
use crate::types::align;

/// Alignment of every chunk after the first
pub const CHUNK_ALIGNMENT: u64 = 4;

/// Length prefix of a compressed chunk
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct ChunkHeader {
    /// The size of the zlib stream following this header
    pub compressed_size: u32,

    /// The size of the chunk once inflated
    pub decompressed_size: u32,
}

/// Number of chunks a file of `size` bytes is split into
pub fn chunk_count(size: usize, chunk_size: usize) -> usize {
    size.div_ceil(chunk_size)
}

fn padding(position: u64) -> u64 {
    align(position, CHUNK_ALIGNMENT) - position
}

fn check_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(Error::CustomError("chunk size must not be zero".into()));
    }
    Ok(())
}

/// Compresses `data` into the chunked container
///
/// `base` is the offset of the archive's data region.
#[instrument(skip(data), fields(size = data.len()), err)]
pub fn compress(data: &[u8], chunk_size: usize, base: u64, level: Compression) -> Result<Vec<u8>> {
    check_chunk_size(chunk_size)?;

    let mut output = Cursor::new(Vec::with_capacity(data.len() / 2));
    for (index, chunk) in data.chunks(chunk_size).enumerate() {
        if index > 0 {
            let pad = padding(base + output.position());
            output.write_all(&[0u8; CHUNK_ALIGNMENT as usize][..pad as usize])?;
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), level);
        encoder.write_all(chunk)?;
        let compressed = encoder.finish()?;

        let header = ChunkHeader {
            compressed_size: u32::try_from(compressed.len())
                .map_err(|_| Error::CustomError("compressed chunk exceeds 4 GiB".into()))?,
            decompressed_size: u32::try_from(chunk.len())
                .map_err(|_| Error::CustomError("chunk exceeds 4 GiB".into()))?,
        };
        trace!(index, ?header, "compressed chunk");

        header.write(&mut output)?;
        output.write_all(&compressed)?;
    }

    Ok(output.into_inner())
}

/// Inflates a file of `size` bytes from the chunked container
///
/// `base` is the offset of the archive's data region. Bytes after the last chunk are ignored.
#[instrument(skip(data), fields(stored = data.len()), err)]
pub fn decompress(data: &[u8], size: usize, chunk_size: usize, base: u64) -> Result<Vec<u8>> {
    check_chunk_size(chunk_size)?;

    let mut input = Cursor::new(data);
    let mut output = Vec::with_capacity(size);
    for index in 0..chunk_count(size, chunk_size) {
        if index > 0 {
            let pad = padding(base + input.position());
            input.seek(SeekFrom::Current(pad as i64))?;
        }

        let header = ChunkHeader::read(&mut input)?;
        trace!(index, ?header, "inflating chunk");

        let start = input.position() as usize;
        let end = start + header.compressed_size as usize;
        let compressed = data.get(start..end).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "chunk exceeds file data")
        })?;
        input.set_position(end as u64);

        ZlibDecoder::new(compressed)
            .take(u64::from(header.decompressed_size))
            .read_to_end(&mut output)?;
    }

    output.truncate(size);
    Ok(output)
}
