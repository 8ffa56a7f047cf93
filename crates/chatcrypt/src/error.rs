use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid key material: expected 64 hex characters")]
    InvalidKey,
    #[error("invalid salt: expected 64 hex characters")]
    InvalidSalt,
    #[error("refusing to encrypt an empty message")]
    EmptyPlaintext,
    #[error("encryption failed")]
    Encrypt,
    // Both decrypt failures share one message; callers must not be able to
    // tell a bad tag from a bad shape.
    #[error("cannot decrypt message")]
    MalformedEnvelope,
    #[error("cannot decrypt message")]
    AuthenticationFailed,
}

impl Error {
    /// True for the failures a reader should render as "message unavailable".
    pub fn is_undecryptable(&self) -> bool {
        matches!(self, Error::MalformedEnvelope | Error::AuthenticationFailed)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
