//! Command engine (§4.6): serializes all outbound commands behind a single
//! mutex, optionally waiting for an acknowledgement and a typed data answer.
//!
//! The socket is genuinely half-duplex-protected (§5): the engine owns the
//! write half (behind the mutex below) and only ever sends; the receiver
//! worker owns the read half exclusively and is the only thread that ever
//! calls [`crate::conn::Connection::recv_packet`]. Both sides share one TCP
//! socket via `Connection::try_clone`, which duplicates the file descriptor —
//! safe because TCP is full-duplex and each side only ever does one
//! direction of I/O.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::conn::Connection;
use crate::demux::Demultiplexer;
use crate::error::{CameraError, Result};
use crate::protocol::{AnswerPacket, CommandPacket, GroupId, Packet};

pub struct CommandEngine {
    /// The mutex *is* the single-command-at-a-time discipline (§3 invariant,
    /// §5 ordering guarantee): holding this lock for the send-then-wait
    /// sequence is what makes ack/answer pairing positional without sequence
    /// numbers.
    send_conn: Mutex<Connection>,
    demux: Arc<Demultiplexer>,
    camera_id: u8,
    wait_packet_timeout: Duration,
}

impl CommandEngine {
    pub fn new(send_conn: Connection, demux: Arc<Demultiplexer>, camera_id: u8, wait_packet_timeout: Duration) -> Self {
        Self { send_conn: Mutex::new(send_conn), demux, camera_id, wait_packet_timeout }
    }

    /// Send a command and return immediately without waiting for anything
    /// (§4.6 "fire-and-forget, used for specific server commands").
    pub fn send_fire_and_forget(&self, function_number: u16, payload: Vec<u8>) -> Result<()> {
        let mut conn = self.send_conn.lock().unwrap();
        let cmd = CommandPacket::new(self.camera_id, function_number, payload);
        conn.send(&cmd.total_write())
    }

    /// Send a command, then wait for the acknowledgement. Returns
    /// `ProtocolError` if the peer refuses (`accepted == 0`).
    pub fn send_command(&self, function_number: u16, payload: Vec<u8>) -> Result<()> {
        let conn = self.send_conn.lock().unwrap();
        self.send_and_await_ack(conn, function_number, payload)
    }

    /// Send a command, await its acknowledgement, then await a data answer
    /// belonging to `expected_group` (§4.6, e.g. `GetStatus → Status`).
    pub fn send_command_wait_answer(
        &self,
        function_number: u16,
        payload: Vec<u8>,
        expected_group: GroupId,
    ) -> Result<AnswerPacket> {
        let conn = self.send_conn.lock().unwrap();
        self.send_and_await_ack(conn, function_number, payload)?;

        let queue = self
            .demux
            .group(expected_group)
            .ok_or_else(|| CameraError::state(format!("no queue managed for group {expected_group:#06x}")))?;

        match queue.take_with_timeout(self.wait_packet_timeout) {
            Some(Packet::Answer(answer)) => {
                if answer.error_code != 0 {
                    Err(CameraError::protocol(format!("data answer error_code={}", answer.error_code)))
                } else {
                    Ok(answer)
                }
            }
            Some(_other) => Err(CameraError::state("queue yielded a packet of the wrong kind")),
            None => Err(CameraError::timeout("data answer")),
        }
    }

    /// Shared tail of send+ack used by both public entry points above. Takes
    /// the already-acquired mutex guard so the send and the ack wait happen
    /// under the same critical section.
    fn send_and_await_ack(
        &self,
        mut conn: std::sync::MutexGuard<'_, Connection>,
        function_number: u16,
        payload: Vec<u8>,
    ) -> Result<()> {
        let cmd = CommandPacket::new(self.camera_id, function_number, payload);
        conn.send(&cmd.total_write())?;

        match self.demux.ack_queue().take_with_timeout(self.wait_packet_timeout) {
            Some(Packet::Ack(ack)) if ack.accepted() => Ok(()),
            Some(Packet::Ack(_)) => Err(CameraError::protocol("command rejected (accepted = 0)")),
            Some(_other) => Err(CameraError::state("ack queue yielded a packet of the wrong kind")),
            None => Err(CameraError::timeout("acknowledgement")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AckPacket, AnswerPayload};

    fn engine_with_demux() -> (CommandEngine, Arc<Demultiplexer>, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server_sock, _) = listener.accept().unwrap();

        let conn = Connection::from_stream(client, Duration::from_secs(1), 1).unwrap();
        let demux = Arc::new(Demultiplexer::new(Duration::from_millis(200)));
        let engine = CommandEngine::new(conn, demux.clone(), 1, Duration::from_millis(200));
        (engine, demux, server_sock)
    }

    #[test]
    fn accepted_ack_succeeds() {
        let (engine, demux, _server) = engine_with_demux();
        demux.route(Packet::Ack(AckPacket { camera_identifier: 1, accepted: 1 }));
        assert!(engine.send_command(crate::protocol::command::function::GET_STATUS, vec![]).is_ok());
    }

    #[test]
    fn refused_ack_is_protocol_error() {
        let (engine, demux, _server) = engine_with_demux();
        demux.route(Packet::Ack(AckPacket { camera_identifier: 1, accepted: 0 }));
        match engine.send_command(crate::protocol::command::function::SET_EXPOSURE_TIME, vec![]) {
            Err(CameraError::Protocol { .. }) => {}
            other => panic!("expected ProtocolError, got {other:?}"),
        }
    }

    #[test]
    fn missing_ack_times_out() {
        let (engine, _demux, _server) = engine_with_demux();
        match engine.send_command(crate::protocol::command::function::GET_STATUS, vec![]) {
            Err(CameraError::Timeout { .. }) => {}
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[test]
    fn wait_answer_returns_payload_after_ack() {
        let (engine, demux, _server) = engine_with_demux();
        demux.route(Packet::Ack(AckPacket { camera_identifier: 1, accepted: 1 }));
        demux.route(Packet::Answer(AnswerPacket {
            camera_identifier: 1,
            error_code: 0,
            payload: AnswerPayload::Status("server.flags = 1\n".into()),
        }));
        let answer = engine
            .send_command_wait_answer(
                crate::protocol::command::function::GET_STATUS,
                vec![],
                crate::protocol::answer::data_type::STATUS,
            )
            .unwrap();
        assert!(matches!(answer.payload, AnswerPayload::Status(_)));
    }

    #[test]
    fn nonzero_error_code_on_answer_is_protocol_error() {
        let (engine, demux, _server) = engine_with_demux();
        demux.route(Packet::Ack(AckPacket { camera_identifier: 1, accepted: 1 }));
        demux.route(Packet::Answer(AnswerPacket {
            camera_identifier: 1,
            error_code: 3,
            payload: AnswerPayload::Status(String::new()),
        }));
        match engine.send_command_wait_answer(
            crate::protocol::command::function::GET_STATUS,
            vec![],
            crate::protocol::answer::data_type::STATUS,
        ) {
            Err(CameraError::Protocol { .. }) => {}
            other => panic!("expected ProtocolError, got {other:?}"),
        }
    }
}
