//! The Shadow Stream: an AEAD-framed byte-stream adaptor over a TCP
//! connection.
//!
//! On first use in each direction a random salt is exchanged (written in
//! the clear, read in full before any frame) and a per-session subkey is
//! derived. After that, every write is chunked into frames of at most
//! `MAX_PAYLOAD` bytes, each sealed as an independent length chunk followed
//! by an independent payload chunk, both consuming the next nonce value in
//! that direction's counter.
//!
//! The two directions are represented as separate halves
//! (`ShadowReadHalf`/`ShadowWriteHalf`) so one reader task and one writer
//! task can drive the same underlying socket without sharing session state.

use crate::crypto::{increment_nonce, AeadPrimitive, CipherSpec};
use crate::{Error, Result};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Maximum plaintext payload per frame: 14-bit length field, `2^14 - 1`.
pub const MAX_PAYLOAD: usize = 0x3FFF;

/// Split a connected TCP socket into Shadow Stream halves bound to a shared
/// cipher configuration. Each half owns its own nonce counter and salt
/// state; they share only the underlying socket via `into_split`.
pub fn wrap(stream: TcpStream, cipher: Arc<CipherSpec>) -> (ShadowReadHalf, ShadowWriteHalf) {
    let (r, w) = stream.into_split();
    (
        ShadowReadHalf::new(r, cipher.clone()),
        ShadowWriteHalf::new(w, cipher),
    )
}

/// Read `buf.len()` bytes from `reader`, distinguishing a clean end-of-stream
/// (zero bytes read before any data arrived) from a truncated frame
/// (some bytes arrived, then EOF).
async fn fill_or_eof<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(|e| Error::transport(format!("read failed: {e}")))?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(Error::framing("connection closed mid-frame"));
        }
        filled += n;
    }
    Ok(true)
}

/// The write half of a Shadow Stream: frames and seals outbound plaintext.
pub struct ShadowWriteHalf {
    inner: OwnedWriteHalf,
    cipher: Arc<CipherSpec>,
    encrypter: Option<AeadPrimitive>,
    nonce: Vec<u8>,
}

impl ShadowWriteHalf {
    fn new(inner: OwnedWriteHalf, cipher: Arc<CipherSpec>) -> Self {
        ShadowWriteHalf {
            inner,
            cipher,
            encrypter: None,
            nonce: Vec::new(),
        }
    }

    async fn ensure_initialized(&mut self) -> Result<()> {
        if self.encrypter.is_some() {
            return Ok(());
        }
        let salt = self.cipher.gen_salt()?;
        let encrypter = self.cipher.encrypter(&salt)?;
        self.inner
            .write_all(&salt)
            .await
            .map_err(|e| Error::transport(format!("writing salt: {e}")))?;
        self.nonce = self.cipher.gen_nonce();
        self.encrypter = Some(encrypter);
        Ok(())
    }

    fn next_nonce(&mut self) -> Vec<u8> {
        let current = self.nonce.clone();
        increment_nonce(&mut self.nonce);
        current
    }

    /// Frame and seal `data`, writing it to the underlying socket.
    /// Returns the number of plaintext bytes successfully framed and
    /// flushed. A write failure partway through aborts the call, but the
    /// plaintext byte count already delivered before the failing frame is
    /// still reported back via [`Error::PartialWrite`] rather than lost.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_initialized().await?;

        let mut written = 0;
        for chunk in data.chunks(MAX_PAYLOAD) {
            let len_nonce = self.next_nonce();
            let len_bytes = (chunk.len() as u16).to_be_bytes();
            let encrypter = self.encrypter.as_ref().expect("initialized above");
            let sealed_len = encrypter.seal(&len_nonce, &len_bytes, &[])?;

            let payload_nonce = self.next_nonce();
            let sealed_payload = encrypter.seal(&payload_nonce, chunk, &[])?;

            let mut frame = Vec::with_capacity(sealed_len.len() + sealed_payload.len());
            frame.extend_from_slice(&sealed_len);
            frame.extend_from_slice(&sealed_payload);

            if let Err(e) = self.inner.write_all(&frame).await {
                return Err(Error::partial_write(written, format!("writing frame: {e}")));
            }
            written += chunk.len();
        }
        Ok(written)
    }

    /// Half-close the write side: the remote server can still finish
    /// draining its response after this.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| Error::transport(format!("shutdown failed: {e}")))
    }
}

/// The read half of a Shadow Stream: reads and authenticates inbound
/// frames, handing back plaintext.
pub struct ShadowReadHalf {
    inner: OwnedReadHalf,
    cipher: Arc<CipherSpec>,
    decrypter: Option<AeadPrimitive>,
    nonce: Vec<u8>,
    carry: BytesMut,
}

impl ShadowReadHalf {
    fn new(inner: OwnedReadHalf, cipher: Arc<CipherSpec>) -> Self {
        ShadowReadHalf {
            inner,
            cipher,
            decrypter: None,
            nonce: Vec::new(),
            carry: BytesMut::new(),
        }
    }

    async fn ensure_initialized(&mut self) -> Result<bool> {
        if self.decrypter.is_some() {
            return Ok(true);
        }
        let mut salt = vec![0u8; self.cipher.salt_size()];
        if !fill_or_eof(&mut self.inner, &mut salt).await? {
            return Ok(false);
        }
        self.decrypter = Some(self.cipher.decrypter(&salt)?);
        self.nonce = self.cipher.gen_nonce();
        Ok(true)
    }

    fn next_nonce(&mut self) -> Vec<u8> {
        let current = self.nonce.clone();
        increment_nonce(&mut self.nonce);
        current
    }

    /// Read decrypted plaintext into `buf`, returning the number of bytes
    /// written (0 signals a clean end-of-stream at a frame boundary).
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if !self.carry.is_empty() {
            let n = buf.len().min(self.carry.len());
            buf[..n].copy_from_slice(&self.carry[..n]);
            let _ = self.carry.split_to(n);
            return Ok(n);
        }

        if !self.ensure_initialized().await? {
            return Ok(0);
        }

        let tag_size = self.cipher.tag_size();

        let mut len_frame = vec![0u8; 2 + tag_size];
        if !fill_or_eof(&mut self.inner, &mut len_frame).await? {
            return Ok(0);
        }
        let len_nonce = self.next_nonce();
        let decrypter = self.decrypter.as_ref().expect("initialized above");
        let len_bytes = decrypter.open(&len_nonce, &len_frame, &[])?;
        if len_bytes.len() != 2 {
            return Err(Error::framing("decrypted length field is not 2 bytes"));
        }
        let raw_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]);
        if raw_len & 0xC000 != 0 {
            return Err(Error::framing(format!(
                "frame length {raw_len:#06x} has reserved bits set"
            )));
        }
        if raw_len == 0 {
            return Err(Error::framing("frame length is zero"));
        }
        let payload_len = raw_len as usize;

        let mut payload_frame = vec![0u8; payload_len + tag_size];
        if !fill_or_eof(&mut self.inner, &mut payload_frame).await? {
            return Err(Error::framing("connection closed mid-frame"));
        }
        let payload_nonce = self.next_nonce();
        let decrypter = self.decrypter.as_ref().expect("initialized above");
        let plaintext = decrypter.open(&payload_nonce, &payload_frame, &[])?;

        if plaintext.len() <= buf.len() {
            buf[..plaintext.len()].copy_from_slice(&plaintext);
            Ok(plaintext.len())
        } else {
            buf.copy_from_slice(&plaintext[..buf.len()]);
            self.carry.extend_from_slice(&plaintext[buf.len()..]);
            Ok(buf.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CipherSpec;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let accept = listener.accept();
        let (client_res, server_res) = tokio::join!(connect, accept);
        let client = client_res.unwrap();
        let (server, _) = server_res.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn round_trip_small_message() {
        let (a, b) = connected_pair().await;
        let cipher = Arc::new(CipherSpec::new("aes-128-gcm", "hunter2").unwrap());
        let (_r_a, mut w_a) = wrap(a, cipher.clone());
        let (mut r_b, _w_b) = wrap(b, cipher);

        w_a.write(b"hello shadow stream").await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = r_b.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello shadow stream");
    }

    #[tokio::test]
    async fn round_trip_survives_tiny_read_buffer() {
        let (a, b) = connected_pair().await;
        let cipher = Arc::new(CipherSpec::new("aes-256-gcm", "correct horse battery staple").unwrap());
        let (_r_a, mut w_a) = wrap(a, cipher.clone());
        let (mut r_b, _w_b) = wrap(b, cipher);

        let message = b"the quick brown fox jumps over the lazy dog".to_vec();
        w_a.write(&message).await.unwrap();

        let mut received = Vec::new();
        let mut tiny = [0u8; 1];
        while received.len() < message.len() {
            let n = r_b.read(&mut tiny).await.unwrap();
            assert!(n > 0);
            received.extend_from_slice(&tiny[..n]);
        }
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn exactly_max_payload_is_one_frame() {
        let (a, b) = connected_pair().await;
        let cipher = Arc::new(CipherSpec::new("aes-128-gcm", "pw").unwrap());
        let (_r_a, mut w_a) = wrap(a, cipher.clone());
        let (mut r_b, _w_b) = wrap(b, cipher);

        let data = vec![0xAB; MAX_PAYLOAD];
        w_a.write(&data).await.unwrap();

        let mut buf = vec![0u8; MAX_PAYLOAD + 1];
        let n = r_b.read(&mut buf).await.unwrap();
        assert_eq!(n, MAX_PAYLOAD);
    }

    #[tokio::test]
    async fn one_byte_over_max_payload_is_two_frames() {
        let (a, b) = connected_pair().await;
        let cipher = Arc::new(CipherSpec::new("aes-128-gcm", "pw").unwrap());
        let (_r_a, mut w_a) = wrap(a, cipher.clone());
        let (mut r_b, _w_b) = wrap(b, cipher);

        let data = vec![0xCD; MAX_PAYLOAD + 1];
        w_a.write(&data).await.unwrap();

        let mut buf = vec![0u8; MAX_PAYLOAD + 1];
        let n1 = r_b.read(&mut buf).await.unwrap();
        assert_eq!(n1, MAX_PAYLOAD);
        let n2 = r_b.read(&mut buf).await.unwrap();
        assert_eq!(n2, 1);
    }

    #[tokio::test]
    async fn clean_eof_before_any_frame_is_end_of_stream() {
        let (a, b) = connected_pair().await;
        let cipher = Arc::new(CipherSpec::new("aes-128-gcm", "pw").unwrap());
        drop(a);
        let (mut r_b, _w_b) = wrap(b, cipher);

        let mut buf = vec![0u8; 16];
        let n = r_b.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn reject_frame_with_reserved_bits_set() {
        let (mut a, b) = connected_pair().await;
        let cipher = Arc::new(CipherSpec::new("aes-128-gcm", "pw").unwrap());
        let (mut r_b, _w_b) = wrap(b, cipher.clone());

        // Write a salt, then a length frame that decrypts to 0x4000.
        let salt = cipher.gen_salt().unwrap();
        let enc = cipher.encrypter(&salt).unwrap();
        let nonce = cipher.gen_nonce();
        a.write_all(&salt).await.unwrap();
        let bad_len = 0x4000u16.to_be_bytes();
        let sealed = enc.seal(&nonce, &bad_len, &[]).unwrap();
        a.write_all(&sealed).await.unwrap();

        let mut buf = vec![0u8; 16];
        let err = r_b.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
    }
}
