//! At-rest encryption seam

use crate::error::EncryptionError;

/// Symmetric transform applied to each stored block.
///
/// Storage calls `encrypt` on every payload before framing it and
/// `decrypt` after reading it back. The framed length is the encrypted
/// length, so an implementation may grow its input.
pub trait DataEncryption: Send + Sync {
    /// Encrypt a single payload
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, EncryptionError>;

    /// Decrypt a payload previously produced by [`encrypt`](Self::encrypt)
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, EncryptionError>;
}
