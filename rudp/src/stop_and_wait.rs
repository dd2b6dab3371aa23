//! Stop-and-wait ARQ
//!
//! One data frame in flight, numbered with an alternating bit. Each
//! direction keeps its own bit: `send_bit` for frames we originate,
//! `expected` for frames we accept.

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::stats::{EngineCounters, EngineStats};
use crate::transport::{Delivery, Transport};
use bytes::Bytes;
use rudp_protocol::{Action, AltBit, Frame};
use std::net::SocketAddr;
use std::time::Instant;

/// Alternating-bit engine over one endpoint
#[derive(Debug)]
pub struct StopAndWait {
    endpoint: Endpoint,
    /// Bit carried by our next data frame
    send_bit: AltBit,
    /// Bit of the next data frame we accept
    expected: AltBit,
    counters: EngineCounters,
}

impl StopAndWait {
    pub fn new(endpoint: Endpoint) -> Self {
        StopAndWait {
            endpoint,
            send_bit: AltBit::ZERO,
            expected: AltBit::ZERO,
            counters: EngineCounters::default(),
        }
    }

    pub fn send_bit(&self) -> AltBit {
        self.send_bit
    }

    pub fn expected_bit(&self) -> AltBit {
        self.expected
    }

    /// Give the endpoint back, e.g. to accept the next connection
    pub fn into_endpoint(self) -> Endpoint {
        self.endpoint
    }

    /// Retransmit `payload` until the peer acknowledges it
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let remote = self.endpoint.require_remote()?;
        let frame = Frame::data(self.send_bit.value(), Bytes::copy_from_slice(payload));
        self.endpoint.check_fits(&frame)?;

        let timeout = self.endpoint.config().timeout();
        let mut retry = self.endpoint.config().retry_policy().start();
        loop {
            retry.attempt().map_err(TransportError::exhausted("send"))?;
            let resend = retry.attempts() > 1;
            if resend {
                tracing::debug!(seq = frame.seq, attempt = retry.attempts(), "Retransmitting");
            }
            self.counters.transmitted(resend);
            self.endpoint.send_data(&frame, remote)?;

            let deadline = Instant::now() + timeout;
            while let Some((reply, from)) = self.endpoint.recv_frame(deadline, false)? {
                if from != remote {
                    continue;
                }
                if reply.is_plain_ack() && self.send_bit.matches(reply.ack) {
                    tracing::trace!(seq = frame.seq, "Acknowledged");
                    self.send_bit.flip();
                    return Ok(());
                }
                // Any other reply from the peer triggers a retransmission
                self.handle_stray(&reply, from)?;
                break;
            }
        }
    }

    /// Block until the next new payload or end of stream
    pub fn receive(&mut self) -> Result<Delivery> {
        let timeout = self.endpoint.config().timeout();
        let mut retry = self.endpoint.config().retry_policy().start();
        loop {
            let deadline = Instant::now() + timeout;
            let Some((frame, from)) = self.endpoint.recv_frame(deadline, false)? else {
                retry.attempt().map_err(TransportError::exhausted("receive"))?;
                continue;
            };
            if self.endpoint.remote_addr().map_or(false, |remote| remote != from) {
                tracing::trace!(%from, "Ignoring frame from unknown peer");
                continue;
            }

            if frame.is_fin() {
                let ack = self.endpoint.connection_mut().peer_closed(&frame);
                self.endpoint.send_control(&ack, from)?;
                tracing::info!(remote = %from, "FIN received, connection closing");
                return Ok(Delivery::EndOfStream);
            }
            if !frame.is_data() {
                self.handle_stray(&frame, from)?;
                continue;
            }

            // Every data frame is acknowledged; only the expected one is new
            self.endpoint.send_control(&Frame::ack(0, frame.seq), from)?;
            if self.expected.matches(frame.seq) {
                self.expected.flip();
                self.endpoint.set_remote(from);
                self.counters.delivered();
                return Ok(Delivery::Data(frame.payload));
            }
            tracing::debug!(seq = frame.seq, "Duplicate data frame, re-acknowledged");
            self.counters.duplicate();
        }
    }

    /// FIN teardown, acknowledging peer retransmissions meanwhile
    pub fn close(&mut self) -> Result<()> {
        let expected = self.expected;
        let fin_seq = self.send_bit.value();
        self.endpoint.teardown(fin_seq, |endpoint, frame, from| {
            if frame.is_data() && !expected.matches(frame.seq) {
                endpoint.send_control(&Frame::ack(0, frame.seq), from)?;
            }
            Ok(())
        })
    }

    /// Frames that are neither the awaited ACK nor new data
    fn handle_stray(&mut self, frame: &Frame, from: SocketAddr) -> Result<()> {
        if frame.is_syn() {
            // Peer missed the end of the handshake
            if let Action::Reply(reply) = self.endpoint.connection_mut().on_frame(frame) {
                tracing::debug!(%frame, "Repeating handshake reply");
                self.endpoint.send_control(&reply, from)?;
            }
        } else if frame.is_data() && !self.expected.matches(frame.seq) {
            // Our ACK for their last frame was lost
            self.counters.duplicate();
            self.endpoint.send_control(&Frame::ack(0, frame.seq), from)?;
        } else if frame.is_fin() {
            self.endpoint.send_control(&Frame::ack(0, frame.seq), from)?;
        } else {
            tracing::trace!(%frame, "Ignoring frame");
        }
        Ok(())
    }
}

impl Transport for StopAndWait {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        StopAndWait::send(self, payload)
    }

    fn receive(&mut self) -> Result<Delivery> {
        StopAndWait::receive(self)
    }

    fn close(&mut self) -> Result<()> {
        StopAndWait::close(self)
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn into_endpoint(self: Box<Self>) -> Endpoint {
        StopAndWait::into_endpoint(*self)
    }

    fn stats(&self) -> EngineStats {
        self.counters.snapshot()
    }
}
