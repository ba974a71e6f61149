//! Obfuscation layers applied to records and file data.
//!
//! Two independent mechanisms exist, both keyed off values stored in the archive itself:
//!
//! - the record masking chain, a fold over the records in storage order ([`apply_mask`])
//! - the data keystream, which XORs the first 8 bytes of a file's data ([`apply_keystream`])
//!
//! Files flagged [`crate::types::FileFlags::ENCRYPTED`] additionally go through an external
//! [`PayloadCipher`] supplied by the caller.

use std::fmt::Debug;

use crate::error::Result;
use crate::hash::{self, merge};
use crate::types::{EarcHeader, EarcRecord, FileFlags};

/// Multiplier of the keystream generator
pub const KEY_MULTIPLIER: u64 = 1_103_515_245;

/// Increment of the keystream generator
pub const KEY_ADDITIVE: u64 = 12_345;

/// Key assigned when the derived key of a file would be zero
pub const FALLBACK_KEY: u16 = 57_005;

/// Base seed of the record masking chain
pub const FILE_HEADER_HASH: u64 = 14_695_981_039_346_656_037;

/// Mixed into the seed of the record masking chain for copyguarded archives
pub const COPYGUARD_HASH: u64 = 10_026_789_885_951_819_402;

/// Symmetric transform applied to files flagged as encrypted
///
/// The algorithm and its key live outside of this crate. Implementations are shared between
/// threads, so they must be `Send + Sync`.
pub trait PayloadCipher: Debug + Send + Sync {
    /// Transforms plain data into its stored form
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Transforms stored data back into plain data, trailing padding may remain
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// The 8 keystream bytes for `key`
pub fn keystream(key: u16) -> [u8; 8] {
    let partial = u64::from(key)
        .wrapping_mul(KEY_MULTIPLIER)
        .wrapping_add(KEY_ADDITIVE);
    let key = partial
        .wrapping_mul(KEY_MULTIPLIER)
        .wrapping_add(KEY_ADDITIVE);

    let mut stream = [0u8; 8];
    stream[..4].copy_from_slice(&((key >> 32) as u32).to_le_bytes());
    stream[4..].copy_from_slice(&(key as u32).to_le_bytes());
    stream
}

/// XORs the first 8 bytes of `data` with the keystream of `key`
///
/// A zero key leaves the data untouched. Data shorter than 8 bytes only has its available prefix
/// transformed. Applying the keystream twice restores the input.
pub fn apply_keystream(key: u16, data: &mut [u8]) {
    if key == 0 {
        return;
    }

    data.iter_mut()
        .zip(keystream(key))
        .for_each(|(byte, mask)| *byte ^= mask);
}

/// Turns a 32 bit string hash into a keystream key
pub fn fold_key(code: i32) -> u16 {
    match ((code >> 16) ^ code) as u16 {
        0 => FALLBACK_KEY,
        key => key,
    }
}

/// Derives the keystream key for a newly packed file
pub fn derive_key(uri: &str) -> u16 {
    fold_key(hash::hash_str(uri) as u32 as i32)
}

/// State of the record masking chain between two records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskState(u64);

impl MaskState {
    /// Initial state for the records of an archive
    pub fn new(header: &EarcHeader) -> Self {
        let mut seed = FILE_HEADER_HASH ^ header.hash;
        if header.is_copyguarded() {
            seed ^= COPYGUARD_HASH;
        }
        MaskState(seed)
    }

    /// The raw chain value
    pub fn value(self) -> u64 {
        self.0
    }

    /// Masks or unmasks a single record and advances the chain
    ///
    /// Records flagged [`FileFlags::MASK_PROTECTED`] pass through and leave the chain untouched.
    pub fn step(self, record: EarcRecord) -> (MaskState, EarcRecord) {
        if record.file_flags().contains(FileFlags::MASK_PROTECTED) {
            return (self, record);
        }

        let sub = merge(self.0, record.uri_type_hash);
        let next = merge(sub, !record.uri_type_hash);

        (
            MaskState(next),
            EarcRecord {
                size: record.size ^ (sub >> 32) as u32,
                processed_size: record.processed_size ^ sub as u32,
                data_offset: record.data_offset ^ next,
                ..record
            },
        )
    }
}

/// Folds the masking chain over `records`, which must be in storage order
///
/// The transform is its own inverse: the writer uses it to mask and the reader to unmask.
pub fn apply_mask<I>(initial: MaskState, records: I) -> (MaskState, Vec<EarcRecord>)
where
    I: IntoIterator<Item = EarcRecord>,
{
    records
        .into_iter()
        .fold((initial, Vec::new()), |(state, mut masked), record| {
            let (state, record) = state.step(record);
            masked.push(record);
            (state, masked)
        })
}
