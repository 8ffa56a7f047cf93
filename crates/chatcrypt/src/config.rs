use core::fmt;

use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Environment variable holding the process-wide key-derivation secret.
pub const SECRET_ENV: &str = "ENCRYPTION_SECRET";

/// Process-wide configuration for per-user key derivation.
///
/// Built once at startup and handed to [`crate::KeyDerivation`]; nothing in
/// this crate reads the environment on its own.
#[derive(Clone)]
pub struct CryptoConfig {
    secret: Zeroizing<String>,
}

impl CryptoConfig {
    /// Build from an explicit secret. Empty secrets are a configuration error.
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = Zeroizing::new(secret.into());
        if secret.trim().is_empty() {
            return Err(Error::Configuration(format!("{SECRET_ENV} is empty")));
        }
        Ok(Self { secret })
    }

    /// Read the secret from `ENCRYPTION_SECRET`.
    pub fn from_env() -> Result<Self> {
        match std::env::var(SECRET_ENV) {
            Ok(v) => Self::new(v),
            Err(_) => Err(Error::Configuration(format!("{SECRET_ENV} is not set"))),
        }
    }

    pub(crate) fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(CryptoConfig::new(""), Err(Error::Configuration(_))));
        assert!(matches!(CryptoConfig::new("   "), Err(Error::Configuration(_))));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let cfg = CryptoConfig::new("hunter2").unwrap();
        let shown = format!("{cfg:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("redacted"));
    }
}
