//! Small TCP socket tuning helper shared by both ends of the relay.

use socket2::SockRef;
use tokio::net::TcpStream;

/// Disable Nagle's algorithm and enable keepalive on an accepted or dialed
/// TCP stream. Best-effort: failures are not fatal to the connection.
#[inline]
pub fn configure_tcp_stream(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    let sock = SockRef::from(stream);
    let _ = sock.set_keepalive(true);
}
