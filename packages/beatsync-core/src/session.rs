//! Per-connection session state (C4).
//!
//! A `Session` owns no room state — it only knows which room it's enrolled
//! in and how to send frames to its own socket. Fan-out to every session in
//! a room happens through the room's broadcast channel, not by a session
//! reaching into another session directly.

use tokio::sync::mpsc;

use crate::wire::ServerMessage;

/// An outbound instruction to close the underlying socket with a close
/// frame, delivered over its own channel so the WS write task can select
/// over it alongside ordinary outbound messages.
#[derive(Debug, Clone)]
pub struct CloseRequest {
    pub code: u16,
    pub reason: String,
}

/// Per-connection identity and outbound send handle.
#[derive(Debug, Clone)]
pub struct Session {
    pub client_id: String,
    pub username: String,
    pub room_id: String,
    sender: mpsc::UnboundedSender<ServerMessage>,
    close_sender: mpsc::UnboundedSender<CloseRequest>,
}

impl Session {
    pub fn new(
        client_id: String,
        username: String,
        room_id: String,
        sender: mpsc::UnboundedSender<ServerMessage>,
        close_sender: mpsc::UnboundedSender<CloseRequest>,
    ) -> Self {
        Self {
            client_id,
            username,
            room_id,
            sender,
            close_sender,
        }
    }

    /// Enqueues a frame addressed only to this session. Ordering within a
    /// single session's queue is preserved; delivery is best-effort (a
    /// closed socket simply drops the send).
    pub fn send(&self, message: ServerMessage) {
        let _ = self.sender.send(message);
    }

    /// Requests the socket close with the given close code/reason (§5
    /// heartbeat timeout uses `1000, "Connection timeout"`).
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.close_sender.send(CloseRequest {
            code,
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session() -> (Session, mpsc::UnboundedReceiver<ServerMessage>, mpsc::UnboundedReceiver<CloseRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        (
            Session::new("c1".into(), "alice".into(), "123456".into(), tx, close_tx),
            rx,
            close_rx,
        )
    }

    #[test]
    fn send_on_closed_receiver_does_not_panic() {
        let (session, rx, _close_rx) = test_session();
        drop(rx);
        session.send(ServerMessage::invalid_format());
    }

    #[test]
    fn send_delivers_in_order() {
        let (session, mut rx, _close_rx) = test_session();
        session.send(ServerMessage::Error {
            message: "one".into(),
        });
        session.send(ServerMessage::Error {
            message: "two".into(),
        });
        match rx.try_recv().unwrap() {
            ServerMessage::Error { message } => assert_eq!(message, "one"),
            _ => panic!("wrong variant"),
        }
        match rx.try_recv().unwrap() {
            ServerMessage::Error { message } => assert_eq!(message, "two"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn close_enqueues_a_close_request() {
        let (session, _rx, mut close_rx) = test_session();
        session.close(1000, "Connection timeout");
        let request = close_rx.try_recv().unwrap();
        assert_eq!(request.code, 1000);
        assert_eq!(request.reason, "Connection timeout");
    }
}
