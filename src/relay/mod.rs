//! The Relay Front-End: accepts local SOCKS5 connections, negotiates
//! CONNECT, dials the remote Shadowsocks server, and relays bytes
//! bidirectionally through a Shadow Stream.

use crate::crypto::CipherSpec;
use crate::net::configure_tcp_stream;
use crate::socks;
use crate::stream::{self, ShadowReadHalf, ShadowWriteHalf};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

const COPY_BUF_SIZE: usize = 16 * 1024;

/// Static, process-lifetime configuration for the relay.
pub struct RelayConfig {
    pub listen_port: u16,
    pub server_addr: String,
    pub cipher: Arc<CipherSpec>,
}

/// Bind the local SOCKS5 listener and accept connections until Ctrl-C.
pub async fn run(config: RelayConfig) -> Result<()> {
    let listen_addr = format!("127.0.0.1:{}", config.listen_port);
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| Error::transport(format!("failed to bind {listen_addr}: {e}")))?;
    info!("mysocks listening on {listen_addr}, relaying to {}", config.server_addr);

    let server_addr = Arc::new(config.server_addr);
    let cipher = config.cipher;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received interrupt, shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        configure_tcp_stream(&stream);
                        let server_addr = server_addr.clone();
                        let cipher = cipher.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &server_addr, cipher).await {
                                debug!("connection from {peer_addr} ended: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        warn!("accept error: {e}");
                    }
                }
            }
        }
    }
}

/// Negotiate, dial upstream, and relay a single accepted local connection.
/// `pub` so integration tests can drive one connection without binding a
/// real listener through [`run`].
pub async fn handle_connection(
    mut local: TcpStream,
    server_addr: &str,
    cipher: Arc<CipherSpec>,
) -> Result<()> {
    socks::negotiate_no_auth(&mut local).await?;
    let target = socks::read_connect_request(&mut local).await?;

    let outbound = TcpStream::connect(server_addr)
        .await
        .map_err(|e| Error::transport(format!("failed to dial {server_addr}: {e}")))?;
    configure_tcp_stream(&outbound);
    let (mut shadow_r, mut shadow_w) = stream::wrap(outbound, cipher);

    // The target address is the first plaintext bytes of the outbound
    // encrypted stream, framed like any other chunk.
    shadow_w.write(&target.to_bytes()).await?;

    let (local_r, local_w) = local.into_split();

    let mut local_to_shadow = tokio::spawn(copy_local_to_shadow(local_r, shadow_w));
    let mut shadow_to_local = tokio::spawn(copy_shadow_to_local(shadow_r, local_w));

    // The two directions tear down asymmetrically: local->shadow ending only
    // half-closes the outbound write side, so shadow->local is left running
    // to drain whatever the remote still has in flight. But shadow->local
    // ending means the local socket is fully closed, and a local->shadow
    // task blocked on a read that will never come (the peer has nothing left
    // to say) would otherwise leak forever, so it is aborted instead of
    // awaited.
    tokio::select! {
        res = &mut local_to_shadow => {
            if let Err(e) = res {
                error!("local->shadow task panicked: {e}");
            }
            if let Err(e) = shadow_to_local.await {
                error!("shadow->local task panicked: {e}");
            }
        }
        res = &mut shadow_to_local => {
            if let Err(e) = res {
                error!("shadow->local task panicked: {e}");
            }
            local_to_shadow.abort();
            if let Err(e) = local_to_shadow.await {
                if !e.is_cancelled() {
                    error!("local->shadow task panicked: {e}");
                }
            }
        }
    }

    Ok(())
}

/// local -> shadow: on EOF or error, half-close the outbound write side so
/// the remote server can finish draining its response.
async fn copy_local_to_shadow(mut local_r: OwnedReadHalf, mut shadow_w: ShadowWriteHalf) {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let n = match local_r.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("local->shadow read error: {e}");
                break;
            }
        };
        if let Err(e) = shadow_w.write(&buf[..n]).await {
            debug!("local->shadow write error: {e}");
            break;
        }
    }
    if let Err(e) = shadow_w.shutdown().await {
        debug!("half-close of outbound write side failed: {e}");
    }
}

/// shadow -> local: on EOF or error, shut down the local write half.
/// [`handle_connection`] completes the teardown by aborting the sibling
/// local->shadow task, which owns the local read half, so the local socket
/// ends up fully closed rather than half-open indefinitely.
async fn copy_shadow_to_local(mut shadow_r: ShadowReadHalf, mut local_w: OwnedWriteHalf) {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let n = match shadow_r.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("shadow->local read error: {e}");
                break;
            }
        };
        if let Err(e) = local_w.write_all(&buf[..n]).await {
            debug!("shadow->local write error: {e}");
            break;
        }
    }
    let _ = local_w.shutdown().await;
}
