//! `IV:CIPHERTEXT:TAG` envelope format and the structural classifier.
//!
//! All three segments are lowercase hex on output. The IV is 12 bytes and the
//! tag 16; the ciphertext is exactly as long as the UTF-8 plaintext.

use core::fmt;
use core::str::FromStr;

use crate::error::Error;

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const SEPARATOR: char = ':';

/// Heuristic shape test: exactly two `:` and three non-empty segments.
///
/// This does not check hex or try to authenticate. Any plaintext that happens
/// to look like `a:b:c` is classified as already encrypted; migrations skip
/// such rows and readers will show them as unavailable.
pub fn is_envelope(text: &str) -> bool {
    let mut segments = 0usize;
    for segment in text.split(SEPARATOR) {
        if segment.is_empty() {
            return false;
        }
        segments += 1;
        if segments > 3 {
            return false;
        }
    }
    segments == 3
}

#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl Envelope {
    /// Split AEAD output (`ciphertext || tag`) into an envelope.
    pub(crate) fn from_sealed(iv: [u8; IV_LEN], mut sealed: Vec<u8>) -> Option<Self> {
        if sealed.len() < TAG_LEN {
            return None;
        }
        let split = sealed.len() - TAG_LEN;
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&sealed[split..]);
        sealed.truncate(split);
        Some(Self {
            iv,
            ciphertext: sealed,
            tag,
        })
    }

    /// Rejoin into the `ciphertext || tag` layout the AEAD expects.
    pub(crate) fn sealed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            hex::encode(self.iv),
            hex::encode(&self.ciphertext),
            hex::encode(self.tag)
        )
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Envelope({self})")
    }
}

impl FromStr for Envelope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_envelope(s) {
            return Err(Error::MalformedEnvelope);
        }
        let mut parts = s.split(SEPARATOR);
        let (Some(iv_hex), Some(ct_hex), Some(tag_hex)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::MalformedEnvelope);
        };

        let mut iv = [0u8; IV_LEN];
        hex::decode_to_slice(iv_hex, &mut iv).map_err(|_| Error::MalformedEnvelope)?;
        let mut tag = [0u8; TAG_LEN];
        hex::decode_to_slice(tag_hex, &mut tag).map_err(|_| Error::MalformedEnvelope)?;
        let ciphertext = hex::decode(ct_hex).map_err(|_| Error::MalformedEnvelope)?;

        Ok(Self {
            iv,
            ciphertext,
            tag,
        })
    }
}
