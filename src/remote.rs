//! Best-effort datagram forwarding to a remote engine.
//!
//! A session in client mode does not run code locally: orchestra and score
//! text is sent as raw UDP payloads to an engine listening on a
//! caller-specified host and port (the `--port` option on the remote
//! side). There is no framing, no acknowledgement and no retry. Designed
//! for low-latency live control, explicitly lossy.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::error::{Result, SessionError};

/// UDP sender targeting one remote engine.
///
/// The socket is bound once to an ephemeral port and reused for every
/// send.
pub struct RemoteDispatch {
    sock: UdpSocket,
    target: SocketAddr,
}

impl RemoteDispatch {
    /// Create a dispatcher targeting `addr:port`.
    pub fn new(addr: &str, port: u16) -> Result<Self> {
        let target = (addr, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| SessionError::usage(format!("cannot resolve address '{addr}'")))?;
        let sock = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self { sock, target })
    }

    /// The remote address this dispatcher targets.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one payload. Fire and forget: a successful return only means
    /// the datagram left this host.
    pub fn send(&self, payload: &str) -> Result<()> {
        log::debug!("dispatching {} bytes to {}", payload.len(), self.target);
        self.sock.send_to(payload.as_bytes(), self.target)?;
        Ok(())
    }
}

impl std::fmt::Debug for RemoteDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDispatch")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_send_delivers_literal_payload() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = listener.local_addr().unwrap().port();

        let dispatch = RemoteDispatch::new("127.0.0.1", port).unwrap();
        dispatch.send("instr 1\nout oscili(0.2, 440)\nendin").unwrap();

        let mut buf = [0u8; 1024];
        let (n, _) = listener.recv_from(&mut buf).unwrap();
        assert_eq!(
            &buf[..n],
            b"instr 1\nout oscili(0.2, 440)\nendin" as &[u8]
        );
    }

    #[test]
    fn test_unresolvable_address_is_rejected() {
        assert!(RemoteDispatch::new("not an address", 12894).is_err());
    }
}
