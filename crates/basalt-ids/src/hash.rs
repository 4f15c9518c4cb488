//! 32-byte content digest type.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha512};
use thiserror::Error;

use crate::HASH_LEN;

/// A 256-bit content digest.
///
/// Hashes identify ledgers, trie nodes, and every other stored object. They
/// are computed as the first half of the SHA-512 digest of the object's
/// bytes.
///
/// # Examples
///
/// ```
/// use basalt_ids::Hash;
///
/// let hash = Hash::digest(b"hello world");
/// assert!(!hash.is_zero());
/// assert_eq!(hash, Hash::digest(b"hello world"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; HASH_LEN]);

/// Errors that can occur when constructing a hash.
#[derive(Debug, Error)]
pub enum HashError {
    /// The input has the wrong length.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The hex decoding failed.
    #[error("hex decoding failed: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl Hash {
    /// The zero hash, used to mark an absent root.
    pub const ZERO: Self = Self([0u8; HASH_LEN]);

    /// Creates a hash from a 32-byte array.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates a hash from a slice, returning an error if the length is wrong.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::InvalidLength`] if the slice is not exactly
    /// 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != HASH_LEN {
            return Err(HashError::InvalidLength {
                expected: HASH_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Computes the content digest of the given bytes.
    ///
    /// The digest is SHA-512 truncated to its first 256 bits.
    #[must_use]
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(data);
        let full = hasher.finalize();
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(&full[..HASH_LEN]);
        Self(arr)
    }

    /// Returns the hash as a byte array reference.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Returns true if this is the zero hash.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// Returns the hex-encoded representation of this hash.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; HASH_LEN]> for Hash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "{}..", hex::encode(&self.0[..4]))
    }
}

impl FromStr for Hash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_deterministic() {
        let a = Hash::digest(b"basalt");
        let b = Hash::digest(b"basalt");
        assert_eq!(a, b);
        assert_ne!(a, Hash::digest(b"basalt!"));
    }

    #[test]
    fn test_digest_is_truncated_sha512() {
        use sha2::{Digest, Sha512};
        let full = Sha512::digest(b"abc");
        let hash = Hash::digest(b"abc");
        assert_eq!(hash.as_bytes().as_slice(), &full[..32]);
    }

    #[test]
    fn test_zero() {
        assert!(Hash::ZERO.is_zero());
        assert!(!Hash::digest(b"").is_zero());
        assert_eq!(Hash::default(), Hash::ZERO);
    }

    #[test]
    fn test_from_slice() {
        let bytes = [7u8; 32];
        let hash = Hash::from_slice(&bytes).unwrap();
        assert_eq!(hash.as_bytes(), &bytes);

        assert!(matches!(
            Hash::from_slice(&[0u8; 16]),
            Err(HashError::InvalidLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_hex_round_trip() {
        let hash = Hash::digest(b"round trip");
        let parsed: Hash = hash.to_hex().parse().unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn test_ordering_is_byte_order() {
        let lo = Hash::from_bytes([0u8; 32]);
        let mut hi_bytes = [0u8; 32];
        hi_bytes[0] = 1;
        let hi = Hash::from_bytes(hi_bytes);
        assert!(lo < hi);
    }
}
