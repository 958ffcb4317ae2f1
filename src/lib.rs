//! mysocks: a SOCKS5-to-Shadowsocks AEAD tunneling client.
//!
//! Accepts local SOCKS5 CONNECT requests and relays them, AEAD-encrypted,
//! to a remote Shadowsocks server.
//!
//! # Architecture
//!
//! ```text
//! local SOCKS5 client
//!        |
//!        v
//!   socks/   (greeting + CONNECT parsing -> TargetAddress)
//!        |
//!        v
//!   relay/   (accept loop, per-connection task, bidirectional copy)
//!        |
//!        v
//!   stream/  (Shadow Stream: AEAD framing over the outbound TCP socket)
//!        |
//!        v
//!   crypto/  (key derivation + AEAD cipher factory)
//! ```

pub mod crypto;
pub mod error;
pub mod net;
pub mod relay;
pub mod socks;
pub mod stream;

pub use error::{Error, Result};

/// mysocks version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
