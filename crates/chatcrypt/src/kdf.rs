//! Key derivation.
//!
//! Conversation keys are a SHA-256 digest of the two participant ids, sorted
//! so that either side derives the same key. User keys mix the user id with
//! the process-wide secret. Keys are never cached: every call re-derives.

use core::fmt;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::config::CryptoConfig;
use crate::error::{Error, Result};

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 32;
pub const PBKDF2_ROUNDS: u32 = 100_000;

const PAIR_SEPARATOR: &str = ":";

/// 256-bit symmetric key, wiped on drop.
#[derive(Clone)]
pub struct Key(Zeroizing<[u8; KEY_LEN]>);

impl Key {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Parse the external 64-character hex form.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let mut out = Zeroizing::new([0u8; KEY_LEN]);
        hex::decode_to_slice(hex_key, &mut out[..]).map_err(|_| Error::InvalidKey)?;
        Ok(Self(out))
    }

    /// Lowercase hex, 64 characters.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.0[..]))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

impl Eq for Key {}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(<redacted>)")
    }
}

fn digest(parts: &[&[u8]]) -> Key {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let bytes: [u8; KEY_LEN] = hasher.finalize().into();
    Key::from_bytes(bytes)
}

/// Key for the conversation between `user_a` and `user_b`. Commutative.
pub fn derive_conversation_key(user_a: &str, user_b: &str) -> Key {
    let (lo, hi) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    digest(&[lo.as_bytes(), PAIR_SEPARATOR.as_bytes(), hi.as_bytes()])
}

/// Stretch a password with PBKDF2-HMAC-SHA256.
///
/// With no salt a fresh 32-byte one is drawn from the OS RNG. The salt is
/// returned as hex so it can be stored next to whatever the key protects.
pub fn derive_password_key(password: &str, salt_hex: Option<&str>) -> Result<(Key, String)> {
    let mut salt = [0u8; SALT_LEN];
    match salt_hex {
        Some(s) => hex::decode_to_slice(s, &mut salt).map_err(|_| Error::InvalidSalt)?,
        None => OsRng.fill_bytes(&mut salt),
    }
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ROUNDS, &mut out[..]);
    Ok((Key(out), hex::encode(salt)))
}

/// Per-user key derivation bound to the process-wide secret.
#[derive(Debug, Clone)]
pub struct KeyDerivation {
    config: CryptoConfig,
}

impl KeyDerivation {
    pub fn new(config: CryptoConfig) -> Self {
        Self { config }
    }

    /// SHA-256 over `user_id || secret`.
    pub fn derive_user_key(&self, user_id: &str) -> Key {
        digest(&[user_id.as_bytes(), self.config.secret().as_bytes()])
    }

    pub fn derive_conversation_key(&self, user_a: &str, user_b: &str) -> Key {
        derive_conversation_key(user_a, user_b)
    }
}
