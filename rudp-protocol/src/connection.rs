//! Connection State Machine
//!
//! Drives the SYN / SYN+ACK / ACK open and the FIN / ACK close. The machine
//! performs no I/O: callers feed it decoded frames and timeouts and carry out
//! the returned [`Action`].

use crate::packet::Frame;
use thiserror::Error;

/// Sequence number carried by SYN and SYN+ACK
pub const INITIAL_SEQ: u32 = 0;

/// Which side opened the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection
    Closed,
    /// Responder waiting for SYN
    Listen,
    /// SYN sent, waiting for SYN+ACK
    SynSent,
    /// SYN+ACK sent, waiting for the final ACK
    SynRcvd,
    /// Handshake complete
    Established,
    /// FIN sent, waiting for its ACK
    FinSent,
}

/// What the caller should do after feeding the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Transmit this frame and keep waiting
    Reply(Frame),
    /// Handshake complete; transmit the frame first if one is given
    Established(Option<Frame>),
    /// Teardown complete
    Closed,
    /// Nothing to do
    Ignore,
}

/// Connection errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Connection is {actual:?}, operation requires {expected:?}")]
    InvalidState {
        expected: ConnectionState,
        actual: ConnectionState,
    },

    #[error("Only the initiator can open a connection")]
    NotInitiator,
}

/// Handshake and teardown state for one endpoint
#[derive(Debug, Clone)]
pub struct Connection {
    role: Role,
    state: ConnectionState,
    /// Sequence carried by our SYN / SYN+ACK
    local_seq: u32,
    /// Peer's SYN / SYN+ACK sequence once seen
    remote_seq: Option<u32>,
    /// Sequence of our outstanding FIN
    fin_seq: Option<u32>,
}

impl Connection {
    /// Active opener, starts `Closed`
    pub fn initiator() -> Self {
        Connection {
            role: Role::Initiator,
            state: ConnectionState::Closed,
            local_seq: INITIAL_SEQ,
            remote_seq: None,
            fin_seq: None,
        }
    }

    /// Passive opener, starts in `Listen`
    pub fn responder() -> Self {
        Connection {
            role: Role::Responder,
            state: ConnectionState::Listen,
            local_seq: INITIAL_SEQ,
            remote_seq: None,
            fin_seq: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn remote_seq(&self) -> Option<u32> {
        self.remote_seq
    }

    pub fn is_established(&self) -> bool {
        self.state == ConnectionState::Established
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::trace!(role = ?self.role, from = ?self.state, to = ?state, "Connection state change");
            self.state = state;
        }
    }

    /// Begin the handshake, returning the SYN to send
    pub fn open(&mut self) -> Result<Frame, ConnectionError> {
        if self.role != Role::Initiator {
            return Err(ConnectionError::NotInitiator);
        }
        if self.state != ConnectionState::Closed {
            return Err(ConnectionError::InvalidState {
                expected: ConnectionState::Closed,
                actual: self.state,
            });
        }
        self.set_state(ConnectionState::SynSent);
        Ok(Frame::syn(self.local_seq))
    }

    /// Begin teardown, returning the FIN to send
    pub fn close(&mut self, seq: u32) -> Result<Frame, ConnectionError> {
        if self.state != ConnectionState::Established {
            return Err(ConnectionError::InvalidState {
                expected: ConnectionState::Established,
                actual: self.state,
            });
        }
        self.fin_seq = Some(seq);
        self.set_state(ConnectionState::FinSent);
        Ok(Frame::fin(seq))
    }

    /// Return a responder to `Listen` for the next handshake
    pub fn listen(&mut self) {
        self.role = Role::Responder;
        self.remote_seq = None;
        self.fin_seq = None;
        self.set_state(ConnectionState::Listen);
    }

    /// The peer closed its side; returns the ACK for its FIN
    pub fn peer_closed(&mut self, fin: &Frame) -> Frame {
        self.set_state(ConnectionState::Closed);
        Frame::ack(INITIAL_SEQ, fin.seq)
    }

    /// Frame to retransmit when the current wait times out
    pub fn on_timeout(&self) -> Option<Frame> {
        match self.state {
            ConnectionState::SynSent => Some(Frame::syn(self.local_seq)),
            ConnectionState::SynRcvd => self
                .remote_seq
                .map(|remote| Frame::syn_ack(self.local_seq, remote)),
            ConnectionState::FinSent => self.fin_seq.map(Frame::fin),
            _ => None,
        }
    }

    /// Feed a decoded frame
    pub fn on_frame(&mut self, frame: &Frame) -> Action {
        match self.state {
            ConnectionState::SynSent => {
                if frame.is_syn_ack() {
                    self.remote_seq = Some(frame.seq);
                    self.set_state(ConnectionState::Established);
                    Action::Established(Some(Frame::ack(self.local_seq, frame.seq)))
                } else {
                    Action::Ignore
                }
            }
            ConnectionState::Listen => {
                if frame.is_syn() && !frame.is_syn_ack() {
                    self.remote_seq = Some(frame.seq);
                    self.set_state(ConnectionState::SynRcvd);
                    Action::Reply(Frame::syn_ack(self.local_seq, frame.seq))
                } else if frame.is_fin() {
                    // Late FIN retransmission from a finished connection
                    Action::Reply(Frame::ack(INITIAL_SEQ, frame.seq))
                } else {
                    Action::Ignore
                }
            }
            ConnectionState::SynRcvd => {
                if frame.is_syn_ack() {
                    Action::Ignore
                } else if frame.is_syn() {
                    self.remote_seq = Some(frame.seq);
                    Action::Reply(Frame::syn_ack(self.local_seq, frame.seq))
                } else {
                    // Final ACK, or the initiator already moved on to data
                    self.set_state(ConnectionState::Established);
                    Action::Established(None)
                }
            }
            ConnectionState::Established => match self.role {
                Role::Initiator if frame.is_syn_ack() => {
                    Action::Reply(Frame::ack(self.local_seq, frame.seq))
                }
                Role::Responder if frame.is_syn() && !frame.is_syn_ack() => {
                    Action::Reply(Frame::syn_ack(self.local_seq, frame.seq))
                }
                _ => Action::Ignore,
            },
            ConnectionState::FinSent => {
                if frame.is_plain_ack() && Some(frame.ack) == self.fin_seq {
                    self.set_state(ConnectionState::Closed);
                    Action::Closed
                } else {
                    Action::Ignore
                }
            }
            ConnectionState::Closed => {
                if frame.is_fin() {
                    Action::Reply(Frame::ack(INITIAL_SEQ, frame.seq))
                } else {
                    Action::Ignore
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn establish() -> (Connection, Connection) {
        let mut client = Connection::initiator();
        let mut server = Connection::responder();

        let syn = client.open().unwrap();
        let syn_ack = match server.on_frame(&syn) {
            Action::Reply(frame) => frame,
            other => panic!("unexpected {:?}", other),
        };
        let ack = match client.on_frame(&syn_ack) {
            Action::Established(Some(frame)) => frame,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(server.on_frame(&ack), Action::Established(None));
        (client, server)
    }

    #[test]
    fn test_handshake_frames() {
        let mut client = Connection::initiator();
        let mut server = Connection::responder();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(server.state(), ConnectionState::Listen);

        let syn = client.open().unwrap();
        assert_eq!(syn, Frame::syn(0));
        assert_eq!(client.state(), ConnectionState::SynSent);

        let action = server.on_frame(&syn);
        assert_eq!(action, Action::Reply(Frame::syn_ack(0, 0)));
        assert_eq!(server.state(), ConnectionState::SynRcvd);

        let action = client.on_frame(&Frame::syn_ack(0, 0));
        assert_eq!(action, Action::Established(Some(Frame::ack(0, 0))));
        assert!(client.is_established());

        assert_eq!(server.on_frame(&Frame::ack(0, 0)), Action::Established(None));
        assert!(server.is_established());
    }

    #[test]
    fn test_initiator_ignores_non_syn_ack() {
        let mut client = Connection::initiator();
        client.open().unwrap();
        assert_eq!(client.on_frame(&Frame::ack(0, 0)), Action::Ignore);
        assert_eq!(client.on_frame(&Frame::syn(0)), Action::Ignore);
        assert_eq!(client.on_timeout(), Some(Frame::syn(0)));
    }

    #[test]
    fn test_responder_repeated_syn() {
        let mut server = Connection::responder();
        server.on_frame(&Frame::syn(0));
        assert_eq!(
            server.on_frame(&Frame::syn(0)),
            Action::Reply(Frame::syn_ack(0, 0))
        );
        assert_eq!(server.on_timeout(), Some(Frame::syn_ack(0, 0)));
        assert_eq!(server.state(), ConnectionState::SynRcvd);
    }

    #[test]
    fn test_responder_established_by_data() {
        let mut server = Connection::responder();
        server.on_frame(&Frame::syn(0));
        let data = Frame::data(0, Bytes::from_static(b"GET"));
        assert_eq!(server.on_frame(&data), Action::Established(None));
        assert!(server.is_established());
    }

    #[test]
    fn test_stray_syn_ack_after_established() {
        let (mut client, _) = establish();
        assert_eq!(
            client.on_frame(&Frame::syn_ack(0, 0)),
            Action::Reply(Frame::ack(0, 0))
        );
        assert!(client.is_established());
    }

    #[test]
    fn test_teardown_requires_matching_ack() {
        let (mut client, _) = establish();
        let fin = client.close(7).unwrap();
        assert_eq!(fin, Frame::fin(7));
        assert_eq!(client.state(), ConnectionState::FinSent);
        assert_eq!(client.on_timeout(), Some(Frame::fin(7)));

        assert_eq!(client.on_frame(&Frame::ack(0, 6)), Action::Ignore);
        assert_eq!(client.on_frame(&Frame::syn_ack(0, 7)), Action::Ignore);
        assert_eq!(client.on_frame(&Frame::ack(0, 7)), Action::Closed);
        assert!(client.is_closed());
    }

    #[test]
    fn test_peer_closed() {
        let (_, mut server) = establish();
        let ack = server.peer_closed(&Frame::fin(3));
        assert_eq!(ack, Frame::ack(0, 3));
        assert!(server.is_closed());

        // A retransmitted FIN is still acknowledged
        assert_eq!(
            server.on_frame(&Frame::fin(3)),
            Action::Reply(Frame::ack(0, 3))
        );

        server.listen();
        assert_eq!(server.state(), ConnectionState::Listen);
        assert_eq!(
            server.on_frame(&Frame::fin(3)),
            Action::Reply(Frame::ack(0, 3))
        );
    }

    #[test]
    fn test_invalid_transitions() {
        let mut server = Connection::responder();
        assert_eq!(server.open(), Err(ConnectionError::NotInitiator));
        assert_eq!(
            server.close(0),
            Err(ConnectionError::InvalidState {
                expected: ConnectionState::Established,
                actual: ConnectionState::Listen,
            })
        );

        let mut client = Connection::initiator();
        client.open().unwrap();
        assert!(client.open().is_err());
    }
}
