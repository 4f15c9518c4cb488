//! Ledger header and its byte codec.

use basalt_codec::{Packer, UnpackError, Unpacker};
use basalt_ids::Hash;
use thiserror::Error;

/// 32-bit magic prefixed to a serialized header before digesting and
/// storing it ("LHDR").
pub const LEDGER_HEADER_PREFIX: u32 = 0x4C48_4452;

/// Serialized size of a prefixed header in bytes.
const PREFIXED_LEN: usize = 4 + 4 + 8 + 8 + 32 + 32 + 32;

/// Errors that can occur decoding a ledger header.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// The blob does not start with [`LEDGER_HEADER_PREFIX`].
    #[error("bad header prefix: {0:#010x}")]
    BadPrefix(u32),

    /// The blob is malformed.
    #[error("malformed header: {0}")]
    Malformed(#[from] UnpackError),
}

/// The fixed-size header describing one ledger.
///
/// A header carries everything needed to walk ledger history: its own
/// sequence, the hash of its parent, and the roots of the account-state
/// and transaction tries. The ledger's identity is the digest of the
/// prefixed header bytes, so headers round-trip through storage like any
/// other content-addressed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerHeader {
    /// Ledger sequence number.
    pub seq: u32,
    /// Total coins in circulation at this ledger.
    pub total_coins: u64,
    /// Close time, seconds since the network epoch.
    pub close_time: u64,
    /// Hash of the parent ledger.
    pub parent_hash: Hash,
    /// Root of the account-state trie.
    pub account_hash: Hash,
    /// Root of the transaction trie.
    pub tx_hash: Hash,
}

impl LedgerHeader {
    /// Serializes the header with its storage prefix.
    ///
    /// This is the exact blob stored in the node store, keyed by its own
    /// digest.
    #[must_use]
    pub fn to_prefixed_bytes(&self) -> Vec<u8> {
        let mut packer = Packer::new(PREFIXED_LEN);
        packer.pack_int(LEDGER_HEADER_PREFIX);
        packer.pack_int(self.seq);
        packer.pack_long(self.total_coins);
        packer.pack_long(self.close_time);
        packer.pack_fixed_bytes(self.parent_hash.as_bytes());
        packer.pack_fixed_bytes(self.account_hash.as_bytes());
        packer.pack_fixed_bytes(self.tx_hash.as_bytes());
        packer.into_bytes()
    }

    /// Decodes a prefixed header blob.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::BadPrefix`] if the magic is wrong and
    /// [`HeaderError::Malformed`] on any length problem.
    pub fn from_prefixed_bytes(bytes: &[u8]) -> Result<Self, HeaderError> {
        let mut unpacker = Unpacker::new(bytes);
        let prefix = unpacker.unpack_int()?;
        if prefix != LEDGER_HEADER_PREFIX {
            return Err(HeaderError::BadPrefix(prefix));
        }
        let seq = unpacker.unpack_int()?;
        let total_coins = unpacker.unpack_long()?;
        let close_time = unpacker.unpack_long()?;
        let parent_hash = Hash::from_bytes(unpacker.unpack_fixed_bytes::<32>()?);
        let account_hash = Hash::from_bytes(unpacker.unpack_fixed_bytes::<32>()?);
        let tx_hash = Hash::from_bytes(unpacker.unpack_fixed_bytes::<32>()?);
        unpacker.finish()?;
        Ok(Self {
            seq,
            total_coins,
            close_time,
            parent_hash,
            account_hash,
            tx_hash,
        })
    }

    /// Returns the ledger hash: the digest of the prefixed header bytes.
    #[must_use]
    pub fn hash(&self) -> Hash {
        Hash::digest(&self.to_prefixed_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LedgerHeader {
        LedgerHeader {
            seq: 12345,
            total_coins: 99_999_999_999,
            close_time: 1_234_567,
            parent_hash: Hash::digest(b"parent"),
            account_hash: Hash::digest(b"state"),
            tx_hash: Hash::digest(b"txs"),
        }
    }

    #[test]
    fn test_round_trip() {
        let header = sample();
        let bytes = header.to_prefixed_bytes();
        assert_eq!(bytes.len(), PREFIXED_LEN);
        let decoded = LedgerHeader::from_prefixed_bytes(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_hash_covers_prefix() {
        let header = sample();
        assert_eq!(header.hash(), Hash::digest(&header.to_prefixed_bytes()));
        // A different field changes the hash.
        let mut other = header;
        other.seq += 1;
        assert_ne!(header.hash(), other.hash());
    }

    #[test]
    fn test_bad_prefix_rejected() {
        let mut bytes = sample().to_prefixed_bytes();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            LedgerHeader::from_prefixed_bytes(&bytes),
            Err(HeaderError::BadPrefix(_))
        ));
    }

    #[test]
    fn test_truncated_rejected() {
        let bytes = sample().to_prefixed_bytes();
        assert!(matches!(
            LedgerHeader::from_prefixed_bytes(&bytes[..bytes.len() - 1]),
            Err(HeaderError::Malformed(_))
        ));
        let mut extended = bytes;
        extended.push(0);
        assert!(matches!(
            LedgerHeader::from_prefixed_bytes(&extended),
            Err(HeaderError::Malformed(UnpackError::TrailingBytes(1)))
        ));
    }
}
