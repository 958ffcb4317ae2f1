//! SOCKS5 greeting/CONNECT parsing (RFC 1928 subset).
//!
//! Only the "no authentication required" method and the CONNECT command are
//! supported; IPv6 destination addresses (ATYP 0x04) are explicitly
//! rejected. This module produces the `TargetAddress` that seeds the first
//! plaintext bytes of the outbound encrypted stream.

use crate::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const SOCKS5_VERSION: u8 = 0x05;
const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const AUTH_NO_AUTH: u8 = 0x00;

/// The Shadowsocks-format destination header: `ATYP || addr-body || port`,
/// written verbatim as the first plaintext bytes of the client->server
/// direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddress {
    atyp: u8,
    addr_body: Vec<u8>,
    port: u16,
}

impl TargetAddress {
    /// Serialize as `ATYP || addr-body || port` (big-endian port), the
    /// exact prelude bytes the Shadow Stream writer sends first.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.addr_body.len() + 2);
        buf.push(self.atyp);
        buf.extend_from_slice(&self.addr_body);
        buf.extend_from_slice(&self.port.to_be_bytes());
        buf
    }
}

/// Read the SOCKS5 greeting (`VER, NMETHODS, METHODS...`), discard the
/// offered methods, and unconditionally reply selecting "no authentication
/// required". Aborts with `HandshakeError` if `VER != 0x05`; no reply is
/// sent in that case.
pub async fn negotiate_no_auth<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut head = [0u8; 2];
    stream
        .read_exact(&mut head)
        .await
        .map_err(|e| Error::handshake(format!("reading greeting header: {e}")))?;

    if head[0] != SOCKS5_VERSION {
        return Err(Error::handshake(format!(
            "unsupported SOCKS version: {}",
            head[0]
        )));
    }

    let nmethods = head[1] as usize;
    let mut methods = vec![0u8; nmethods];
    stream
        .read_exact(&mut methods)
        .await
        .map_err(|e| Error::handshake(format!("reading methods: {e}")))?;

    stream
        .write_all(&[SOCKS5_VERSION, AUTH_NO_AUTH])
        .await
        .map_err(|e| Error::handshake(format!("writing auth selection: {e}")))?;
    Ok(())
}

/// Read the SOCKS5 CONNECT request header and destination address, and
/// write the canned success reply (`05 00 00 01 00 00 00 00 00 00`).
/// Rejects BIND/UDP ASSOCIATE and ATYP 0x04 (IPv6) with `HandshakeError`.
pub async fn read_connect_request<S>(stream: &mut S) -> Result<TargetAddress>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|e| Error::handshake(format!("reading request header: {e}")))?;

    if header[0] != SOCKS5_VERSION {
        return Err(Error::handshake(format!(
            "unsupported SOCKS version: {}",
            header[0]
        )));
    }
    if header[1] != CMD_CONNECT {
        return Err(Error::handshake(format!(
            "unsupported command: {} (only CONNECT is supported)",
            header[1]
        )));
    }

    let atyp = header[3];
    let addr_body = match atyp {
        ATYP_IPV4 => {
            let mut buf = [0u8; 4];
            stream
                .read_exact(&mut buf)
                .await
                .map_err(|e| Error::handshake(format!("reading IPv4 address: {e}")))?;
            buf.to_vec()
        }
        ATYP_DOMAIN => {
            let mut len_buf = [0u8; 1];
            stream
                .read_exact(&mut len_buf)
                .await
                .map_err(|e| Error::handshake(format!("reading domain length: {e}")))?;
            let mut name = vec![0u8; len_buf[0] as usize];
            stream
                .read_exact(&mut name)
                .await
                .map_err(|e| Error::handshake(format!("reading domain name: {e}")))?;
            let mut body = Vec::with_capacity(1 + name.len());
            body.push(len_buf[0]);
            body.extend_from_slice(&name);
            body
        }
        ATYP_IPV6 => {
            return Err(Error::handshake("IPv6 destination addresses (ATYP 0x04) are not supported"));
        }
        other => {
            return Err(Error::handshake(format!("invalid address type: {other}")));
        }
    };

    let mut port_buf = [0u8; 2];
    stream
        .read_exact(&mut port_buf)
        .await
        .map_err(|e| Error::handshake(format!("reading destination port: {e}")))?;
    let port = u16::from_be_bytes(port_buf);

    stream
        .write_all(&[0x05, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
        .await
        .map_err(|e| Error::handshake(format!("writing CONNECT reply: {e}")))?;

    Ok(TargetAddress {
        atyp,
        addr_body,
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn negotiate_accepts_no_auth_offer() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

        negotiate_no_auth(&mut server).await.unwrap();

        let mut resp = [0u8; 2];
        client.read_exact(&mut resp).await.unwrap();
        assert_eq!(resp, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn negotiate_rejects_bad_version() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

        let err = negotiate_no_auth(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::Handshake(_)));
    }

    #[tokio::test]
    async fn connect_request_ipv4() {
        let (mut client, mut server) = duplex(64);
        // CONNECT 127.0.0.1:80
        client
            .write_all(&[0x05, 0x01, 0x00, 0x01, 0x7F, 0x00, 0x00, 0x01, 0x00, 0x50])
            .await
            .unwrap();

        let target = read_connect_request(&mut server).await.unwrap();
        assert_eq!(
            target.to_bytes(),
            vec![0x01, 0x7F, 0x00, 0x00, 0x01, 0x00, 0x50]
        );

        let mut resp = [0u8; 10];
        client.read_exact(&mut resp).await.unwrap();
        assert_eq!(resp, [0x05, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn connect_request_domain() {
        let (mut client, mut server) = duplex(128);
        let domain = b"www.example.com";
        let mut req = vec![0x05, 0x01, 0x00, 0x03, domain.len() as u8];
        req.extend_from_slice(domain);
        req.extend_from_slice(&443u16.to_be_bytes());
        client.write_all(&req).await.unwrap();

        let target = read_connect_request(&mut server).await.unwrap();
        assert_eq!(
            target.to_bytes(),
            vec![
                0x03, 0x0F, 0x77, 0x77, 0x77, 0x2E, 0x65, 0x78, 0x61, 0x6D, 0x70, 0x6C, 0x65,
                0x2E, 0x63, 0x6F, 0x6D, 0x01, 0xBB,
            ]
        );
    }

    #[tokio::test]
    async fn connect_request_rejects_ipv6() {
        let (mut client, mut server) = duplex(64);
        let mut req = vec![0x05, 0x01, 0x00, 0x04];
        req.extend_from_slice(&[0u8; 16]);
        req.extend_from_slice(&80u16.to_be_bytes());
        client.write_all(&req).await.unwrap();

        let err = read_connect_request(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::Handshake(_)));
    }

    #[tokio::test]
    async fn connect_request_rejects_bind_command() {
        let (mut client, mut server) = duplex(64);
        client
            .write_all(&[0x05, 0x02, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .await
            .unwrap();

        let err = read_connect_request(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::Handshake(_)));
    }
}
