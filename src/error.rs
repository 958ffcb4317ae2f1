//! Error types for mysocks

use std::io;
use thiserror::Error;

/// mysocks error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(String),

    #[error("randomness error: {0}")]
    Randomness(String),

    #[error("key/subkey derivation error: {0}")]
    Derivation(String),

    #[error("SOCKS5 handshake error: {0}")]
    Handshake(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transport error after framing {written} plaintext byte(s): {message}")]
    PartialWrite { written: usize, message: String },

    #[error("framing error: {0}")]
    Framing(String),

    #[error("AEAD authentication failed")]
    Auth,

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn unsupported_cipher<S: Into<String>>(msg: S) -> Self {
        Error::UnsupportedCipher(msg.into())
    }

    pub fn randomness<S: Into<String>>(msg: S) -> Self {
        Error::Randomness(msg.into())
    }

    pub fn derivation<S: Into<String>>(msg: S) -> Self {
        Error::Derivation(msg.into())
    }

    pub fn handshake<S: Into<String>>(msg: S) -> Self {
        Error::Handshake(msg.into())
    }

    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Error::Transport(msg.into())
    }

    /// A write failed partway through a multi-frame call. `written` carries
    /// the count of plaintext bytes already framed and flushed before the
    /// failure, so the caller isn't left guessing what made it onto the wire.
    pub fn partial_write<S: Into<String>>(written: usize, msg: S) -> Self {
        Error::PartialWrite {
            written,
            message: msg.into(),
        }
    }

    pub fn framing<S: Into<String>>(msg: S) -> Self {
        Error::Framing(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}

/// Result type alias using mysocks's Error
pub type Result<T> = std::result::Result<T, Error>;
