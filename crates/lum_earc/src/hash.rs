//! Hashing primitives shared by the reader and the writer.
//!
//! Every function here is plain wrapping integer arithmetic so that the values written by
//! [`crate::write::EarcWriter`] are reproduced exactly by [`crate::read::EarcArchive`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

/// FNV-1a 64 bit offset basis
pub const FNV_OFFSET_BASIS: u64 = 0xCBF2_9CE4_8422_2325;

/// FNV-1a 64 bit prime, also used as the multiplier of [`merge`]
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;

/// Mask for the URI component of a [`uri_type_hash`]
pub const URI_HASH_MASK: u64 = 0x0000_0FFF_FFFF_FFFF;

/// Number of bits the type component is shifted by inside a [`uri_type_hash`]
pub const TYPE_HASH_SHIFT: u32 = 44;

/// FNV-1a over raw bytes
pub fn hash_bytes(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// FNV-1a over the UTF-8 representation of a string
pub fn hash_str(value: &str) -> u64 {
    hash_bytes(value.as_bytes())
}

/// Hash used to sign the archive header
///
/// The data is digested with SHA-256, the digest is base64 encoded and the resulting text is
/// hashed with [`hash_str`].
pub fn content_hash(data: &[u8]) -> u64 {
    let digest = Sha256::digest(data);
    hash_str(&STANDARD.encode(digest))
}

/// Folds `value` into the running chain `hash`
#[inline]
pub fn merge(hash: u64, value: u64) -> u64 {
    (hash ^ value).wrapping_mul(FNV_PRIME)
}

/// Returns the type of a URI, which is everything after the first `.` of the last path segment.
///
/// ```
/// assert_eq!(lum_earc::hash::uri_type("data://a/b/model.gmdl.gfxbin"), "gmdl.gfxbin");
/// assert_eq!(lum_earc::hash::uri_type("data://a/b/noext"), "");
/// ```
pub fn uri_type(uri: &str) -> String {
    let name = uri.rsplit('/').next().unwrap_or(uri);
    name.split_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Identifier of a file inside an archive, combining the hash of its type and its URI
pub fn uri_type_hash(uri: &str) -> u64 {
    let uri_hash = hash_str(uri) & URI_HASH_MASK;
    let type_hash = hash_str(&uri_type(uri));
    (type_hash << TYPE_HASH_SHIFT) | uri_hash
}

/// Splits a [`uri_type_hash`] into its `(type_hash, uri_hash)` components
#[inline]
pub fn split_uri_type_hash(value: u64) -> (u64, u64) {
    (value >> TYPE_HASH_SHIFT, value & URI_HASH_MASK)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn fnv_reference_values() {
        assert_eq!(hash_str(""), FNV_OFFSET_BASIS);
        assert_eq!(hash_str("a"), 0xAF63_DC4C_8601_EC8C);
        assert_eq!(hash_str("foobar"), 0x8594_4171_F739_67E8);
    }

    #[test]
    fn merge_is_order_dependent() {
        let seed = 0x1234_5678_9ABC_DEF0;
        let (a, b) = (hash_str("data://a.txt"), hash_str("data://b.txt"));

        assert_ne!(merge(merge(seed, a), b), merge(merge(seed, b), a));
        assert_eq!(merge(merge(seed, a), b), merge(merge(seed, a), b));
    }

    #[test]
    fn content_hash_is_stable() {
        let data = [0u8; 64];
        assert_eq!(content_hash(&data), content_hash(&data));

        let mut other = data;
        other[12] = 1;
        assert_ne!(content_hash(&data), content_hash(&other));
    }

    #[test]
    fn uri_type_hash_decomposes() {
        let uri = "data://character/nh/nh00/nh00_000.gmdl.gfxbin";
        let (type_hash, uri_hash) = split_uri_type_hash(uri_type_hash(uri));

        assert_eq!(uri_hash, hash_str(uri) & URI_HASH_MASK);
        assert_eq!(type_hash, hash_str("gmdl.gfxbin") & 0xF_FFFF);
    }

    #[test]
    fn uri_type_is_lowercase_extension() {
        assert_eq!(uri_type("data://test/a.TXT"), "txt");
        assert_eq!(uri_type("data://dir.with.dots/file"), "");
        assert_eq!(uri_type("file.tar.gz"), "tar.gz");
    }
}
