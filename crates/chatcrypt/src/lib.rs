//! Per-conversation message encryption.
//! - AES-256-GCM with a random 12-byte IV, serialized as `iv:ciphertext:tag` hex.
//! - Conversation keys from the sorted participant pair; user keys from the
//!   user id plus a process-wide secret.
//! - A structural classifier to tell envelopes from legacy plaintext.

pub mod cipher;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod kdf;

pub use cipher::{decrypt, decrypt_str, encrypt, encrypt_to_string, Context};
pub use codec::{Codec, ProfileFields, UNAVAILABLE_PLACEHOLDER};
pub use config::{CryptoConfig, SECRET_ENV};
pub use envelope::{is_envelope, Envelope};
pub use error::{Error, Result};
pub use kdf::{derive_conversation_key, derive_password_key, Key, KeyDerivation};
