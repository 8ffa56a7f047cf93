//! Conversation and profile codecs built on the key derivation and cipher.

use crate::cipher::{self, Context};
use crate::config::CryptoConfig;
use crate::envelope::is_envelope;
use crate::error::Result;
use crate::kdf::KeyDerivation;

/// Shown in place of a message that fails to decrypt.
pub const UNAVAILABLE_PLACEHOLDER: &str = "[message unavailable]";

/// Encrypts chat messages per conversation and profile fields per user.
///
/// Construction requires a [`CryptoConfig`], so a process without the
/// key-derivation secret cannot build one and cannot touch any message.
#[derive(Debug, Clone)]
pub struct Codec {
    kdf: KeyDerivation,
}

impl Codec {
    pub fn new(config: CryptoConfig) -> Self {
        Self {
            kdf: KeyDerivation::new(config),
        }
    }

    pub fn key_derivation(&self) -> &KeyDerivation {
        &self.kdf
    }

    pub fn encrypt_for_conversation(&self, message: &str, user_a: &str, user_b: &str) -> Result<String> {
        let key = self.kdf.derive_conversation_key(user_a, user_b);
        cipher::encrypt_to_string(message, &key, Context::PeerSupportChat)
    }

    pub fn decrypt_for_conversation(&self, envelope: &str, user_a: &str, user_b: &str) -> Result<String> {
        let key = self.kdf.derive_conversation_key(user_a, user_b);
        cipher::decrypt_str(envelope, &key, Context::PeerSupportChat)
    }

    pub fn encrypt_profile_field(&self, value: &str, user_id: &str) -> Result<String> {
        let key = self.kdf.derive_user_key(user_id);
        cipher::encrypt_to_string(value, &key, Context::UserData)
    }

    pub fn decrypt_profile_field(&self, envelope: &str, user_id: &str) -> Result<String> {
        let key = self.kdf.derive_user_key(user_id);
        cipher::decrypt_str(envelope, &key, Context::UserData)
    }

    /// Read-path decode for a stored message.
    ///
    /// Rows that are not envelopes predate encryption and pass through.
    /// Envelopes that fail to open become [`UNAVAILABLE_PLACEHOLDER`], so one
    /// bad row never takes down a conversation view.
    pub fn open_message(&self, stored: &str, viewer: &str, peer: &str) -> String {
        if !is_envelope(stored) {
            return stored.to_owned();
        }
        match self.decrypt_for_conversation(stored, viewer, peer) {
            Ok(plain) => plain,
            Err(e) => {
                tracing::warn!(viewer, peer, error = %e, "message could not be decrypted");
                UNAVAILABLE_PLACEHOLDER.to_owned()
            }
        }
    }

    /// Encrypt every non-empty profile field that is not already an envelope.
    pub fn seal_profile(&self, profile: &ProfileFields, user_id: &str) -> Result<ProfileFields> {
        let seal = |field: &Option<String>| -> Result<Option<String>> {
            match field.as_deref() {
                Some(v) if !v.is_empty() && !is_envelope(v) => {
                    self.encrypt_profile_field(v, user_id).map(Some)
                }
                _ => Ok(field.clone()),
            }
        };
        Ok(ProfileFields {
            date_of_birth: seal(&profile.date_of_birth)?,
            location: seal(&profile.location)?,
            gender: seal(&profile.gender)?,
        })
    }

    /// Decrypt envelope fields; anything else is returned untouched.
    pub fn open_profile(&self, profile: &ProfileFields, user_id: &str) -> Result<ProfileFields> {
        let open = |field: &Option<String>| -> Result<Option<String>> {
            match field.as_deref() {
                Some(v) if is_envelope(v) => self.decrypt_profile_field(v, user_id).map(Some),
                _ => Ok(field.clone()),
            }
        };
        Ok(ProfileFields {
            date_of_birth: open(&profile.date_of_birth)?,
            location: open(&profile.location)?,
            gender: open(&profile.gender)?,
        })
    }
}

/// The profile columns kept encrypted at rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFields {
    pub date_of_birth: Option<String>,
    pub location: Option<String>,
    pub gender: Option<String>,
}
