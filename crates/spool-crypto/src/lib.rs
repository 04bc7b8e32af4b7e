//! At-rest encryption for Spool
//!
//! Provides [`AtRestEncryption`], a ChaCha20-Poly1305 implementation of
//! [`spool_core::DataEncryption`] that storage applies to every block.

pub mod at_rest;
pub mod error;

pub use at_rest::{
    AtRestEncryption, ENCRYPTION_OVERHEAD, NONCE_SIZE, STORAGE_KEY_SIZE, TAG_SIZE, generate_storage_key,
};
pub use error::{CryptoError, CryptoResult};
