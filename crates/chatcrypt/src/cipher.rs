//! AES-256-GCM over text messages.
//! - Fresh 12-byte IV from the OS RNG on every call.
//! - The context label is bound in as associated data.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};

use crate::envelope::{Envelope, IV_LEN};
use crate::error::{Error, Result};
use crate::kdf::Key;

/// Use-case label mixed into authentication.
///
/// Ciphertext sealed under one context never opens under another, even when
/// the keys coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    PeerSupportChat,
    UserData,
}

impl Context {
    pub fn label(self) -> &'static str {
        match self {
            Context::PeerSupportChat => "peer-support-chat",
            Context::UserData => "user-data",
        }
    }
}

pub fn encrypt(plaintext: &str, key: &Key, context: Context) -> Result<Envelope> {
    if plaintext.is_empty() {
        return Err(Error::EmptyPlaintext);
    }
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| Error::InvalidKey)?;
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext.as_bytes(),
                aad: context.label().as_bytes(),
            },
        )
        .map_err(|_| Error::Encrypt)?;
    Envelope::from_sealed(iv, sealed).ok_or(Error::Encrypt)
}

pub fn decrypt(envelope: &Envelope, key: &Key, context: Context) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| Error::InvalidKey)?;
    let plain = cipher
        .decrypt(
            Nonce::from_slice(&envelope.iv),
            Payload {
                msg: &envelope.sealed_bytes(),
                aad: context.label().as_bytes(),
            },
        )
        .map_err(|_| Error::AuthenticationFailed)?;
    String::from_utf8(plain).map_err(|_| Error::AuthenticationFailed)
}

/// Encrypt and serialize in one step.
pub fn encrypt_to_string(plaintext: &str, key: &Key, context: Context) -> Result<String> {
    encrypt(plaintext, key, context).map(|e| e.to_string())
}

/// Parse and decrypt in one step.
pub fn decrypt_str(envelope: &str, key: &Key, context: Context) -> Result<String> {
    let envelope: Envelope = envelope.parse()?;
    decrypt(&envelope, key, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::derive_conversation_key;

    #[test]
    fn seal_open_roundtrip() {
        let key = derive_conversation_key("u1", "u2");
        let env = encrypt("hi there", &key, Context::PeerSupportChat).unwrap();
        assert_eq!(env.ciphertext.len(), "hi there".len());
        let out = decrypt(&env, &key, Context::PeerSupportChat).unwrap();
        assert_eq!(out, "hi there");
    }

    #[test]
    fn wire_lengths() {
        let key = derive_conversation_key("u1", "u2");
        let s = encrypt_to_string("héllo", &key, Context::PeerSupportChat).unwrap();
        let parts: Vec<&str> = s.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 24);
        assert_eq!(parts[1].len(), 2 * "héllo".len());
        assert_eq!(parts[2].len(), 32);
        assert!(s.chars().all(|c| c == ':' || matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn wrong_key_fails() {
        let env = encrypt("secret", &derive_conversation_key("a", "b"), Context::UserData).unwrap();
        let err = decrypt(&env, &derive_conversation_key("a", "c"), Context::UserData).unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed));
    }

    #[test]
    fn wrong_context_fails() {
        let key = derive_conversation_key("a", "b");
        let env = encrypt("secret", &key, Context::UserData).unwrap();
        let err = decrypt(&env, &key, Context::PeerSupportChat).unwrap_err();
        assert!(err.is_undecryptable());
    }

    #[test]
    fn empty_plaintext_is_rejected() {
        let key = derive_conversation_key("a", "b");
        assert!(matches!(
            encrypt("", &key, Context::PeerSupportChat),
            Err(Error::EmptyPlaintext)
        ));
    }

    #[test]
    fn fresh_iv_per_call() {
        let key = derive_conversation_key("a", "b");
        let a = encrypt("same", &key, Context::PeerSupportChat).unwrap();
        let b = encrypt("same", &key, Context::PeerSupportChat).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn decrypt_str_rejects_garbage() {
        let key = derive_conversation_key("a", "b");
        assert!(matches!(
            decrypt_str("hello world", &key, Context::PeerSupportChat),
            Err(Error::MalformedEnvelope)
        ));
        assert!(matches!(
            decrypt_str("a:b:c", &key, Context::PeerSupportChat),
            Err(Error::MalformedEnvelope)
        ));
    }
}
