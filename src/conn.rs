//! TCP connection to the camera server (§4.4).
//!
//! Handles socket lifecycle and framed I/O. No protocol logic lives here —
//! callers (the command engine, the receiver worker) drive what gets sent
//! and how a decoded packet is used.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Once;
use std::time::Duration;

use crate::error::{CameraError, Result};
use crate::protocol::{Packet, GENERIC_HEADER_SIZE};

static IGNORE_SIGPIPE: Once = Once::new();

/// Mask SIGPIPE so a dead peer surfaces as an `EPIPE` return code on `send`
/// rather than terminating the process (§4.4). Idempotent; safe to call from
/// every `Connection::connect`.
fn ignore_sigpipe() {
    IGNORE_SIGPIPE.call_once(|| unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    });
}

/// An established connection to the camera server.
pub struct Connection {
    stream: TcpStream,
    configured_camera_id: u8,
}

impl Connection {
    /// Resolve `host:port`, connect with a timeout, then configure the socket
    /// per §4.4: restore blocking mode, set `TCP_NODELAY`, set the reception
    /// timeout.
    pub fn connect(
        addr: impl ToSocketAddrs,
        connect_timeout: Duration,
        reception_timeout: Duration,
        configured_camera_id: u8,
    ) -> Result<Self> {
        ignore_sigpipe();

        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| CameraError::state("no address resolved for camera host"))?;

        // `TcpStream::connect_timeout` performs a non-blocking connect and
        // waits on writability up to `connect_timeout` before checking the
        // socket's pending error state — exactly the sequence described in
        // §4.4, implemented by the standard library.
        let stream = TcpStream::connect_timeout(&addr, connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(reception_timeout))?;

        log::info!("connected to camera server at {addr}");
        Ok(Self { stream, configured_camera_id })
    }

    /// Wrap an already-connected stream (used by tests against a loopback
    /// listener, and by any caller that wants to perform its own DNS/connect
    /// policy).
    pub fn from_stream(stream: TcpStream, reception_timeout: Duration, configured_camera_id: u8) -> Result<Self> {
        ignore_sigpipe();
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(reception_timeout))?;
        Ok(Self { stream, configured_camera_id })
    }

    /// Blocking write of the entire encoded buffer (§4.4). A short write is
    /// treated as an error — this protocol has no partial-message recovery.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        Ok(())
    }

    /// Length-prefix-driven receive (§4.4): read the fixed-size generic
    /// header, then read exactly the remaining `packet_length -
    /// GENERIC_HEADER_SIZE` bytes, then decode the complete packet.
    pub fn recv_packet(&mut self) -> Result<Packet> {
        let mut buf = vec![0u8; GENERIC_HEADER_SIZE];
        self.read_exact_mapped(&mut buf)?;

        let header = crate::protocol::GenericHeader::read_specific(&buf)?;
        let total = header.packet_length as usize;
        if total < GENERIC_HEADER_SIZE {
            return Err(crate::error::WireError::unexpected_length("GenericHeader", GENERIC_HEADER_SIZE, total).into());
        }
        buf.resize(total, 0);
        self.read_exact_mapped(&mut buf[GENERIC_HEADER_SIZE..])?;

        Ok(Packet::decode(&buf, self.configured_camera_id)?)
    }

    /// `Read::read_exact` that maps a short read caused by the peer closing
    /// the connection mid-frame into a transport error, and a read-timeout
    /// into `CameraError::Timeout` via the blanket `From<io::Error>` impl.
    fn read_exact_mapped(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.stream.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(CameraError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "peer closed connection mid-frame",
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn peer_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.stream.shutdown(std::net::Shutdown::Both)?;
        Ok(())
    }

    pub fn try_clone(&self) -> Result<Connection> {
        Ok(Connection {
            stream: self.stream.try_clone()?,
            configured_camera_id: self.configured_camera_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AckPacket, CommandPacket};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn send_and_recv_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut header = [0u8; GENERIC_HEADER_SIZE];
            sock.read_exact(&mut header).unwrap();
            let parsed = crate::protocol::GenericHeader::read_specific(&header).unwrap();
            let mut rest = vec![0u8; parsed.packet_length as usize - GENERIC_HEADER_SIZE];
            sock.read_exact(&mut rest).unwrap();

            let ack = AckPacket { camera_identifier: 1, accepted: 1 };
            sock.write_all(&ack.total_write()).unwrap();
        });

        let mut conn = Connection::connect(addr, Duration::from_secs(1), Duration::from_secs(1), 1).unwrap();
        let cmd = CommandPacket::new(1, crate::protocol::command::function::GET_STATUS, vec![]);
        conn.send(&cmd.total_write()).unwrap();

        match conn.recv_packet().unwrap() {
            Packet::Ack(a) => assert!(a.accepted()),
            other => panic!("expected Ack, got {other:?}"),
        }

        server.join().unwrap();
    }

    #[test]
    fn recv_times_out_on_silent_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (_sock, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(200));
        });

        let mut conn = Connection::connect(addr, Duration::from_secs(1), Duration::from_millis(50), 1).unwrap();
        let result = conn.recv_packet();
        assert!(matches!(result, Err(CameraError::Timeout { .. })));
        server.join().unwrap();
    }
}
