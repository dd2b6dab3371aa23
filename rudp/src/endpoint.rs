//! Connection endpoint
//!
//! An [`Endpoint`] owns a bound fault-injecting channel, the remote address
//! and the handshake state machine. [`connect`](Endpoint::connect) and
//! [`accept`](Endpoint::accept) run the three-way open over the clean
//! channel paths; ARQ engines take the endpoint over afterwards.

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use bytes::Bytes;
use rudp_io::{ChannelStats, DatagramSocket, FaultModel, LossyChannel};
use rudp_protocol::{decode, Action, Connection, ConnectionState, Frame};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// One side of a connection
#[derive(Debug)]
pub struct Endpoint {
    /// Socket with fault injection, shared with background receivers
    channel: Arc<LossyChannel>,
    /// Validated settings
    config: TransportConfig,
    /// Handshake and teardown state
    connection: Connection,
    /// Peer address, configured or learned
    remote: Option<SocketAddr>,
}

impl Endpoint {
    /// Bind with the random fault model described by `config`
    pub fn bind(addr: SocketAddr, config: TransportConfig) -> Result<Self> {
        config.validate()?;
        let faults = config.fault_model()?;
        Self::bind_with_faults(addr, config, faults)
    }

    /// Bind with an explicit fault model
    pub fn bind_with_faults(
        addr: SocketAddr,
        config: TransportConfig,
        faults: impl FaultModel + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let socket = DatagramSocket::bind(addr, config.timeout())?;
        let channel = LossyChannel::new(socket, faults, config.max_datagram);
        tracing::debug!(
            local = ?channel.local_addr().ok(),
            loss = config.loss_probability,
            corruption = config.corruption_probability,
            "Endpoint bound"
        );

        Ok(Endpoint {
            channel: Arc::new(channel),
            config,
            connection: Connection::initiator(),
            remote: None,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.channel.local_addr()?)
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Address data to `remote` without a handshake
    pub fn set_remote(&mut self, remote: SocketAddr) {
        self.remote = Some(remote);
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn channel_stats(&self) -> ChannelStats {
        self.channel.stats()
    }

    pub(crate) fn channel(&self) -> &Arc<LossyChannel> {
        &self.channel
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub(crate) fn require_remote(&self) -> Result<SocketAddr> {
        self.remote.ok_or(TransportError::NotConnected)
    }

    /// Open a connection to `remote` as the initiator
    pub fn connect(&mut self, remote: SocketAddr) -> Result<()> {
        self.connection = Connection::initiator();
        self.remote = Some(remote);
        let syn = self.connection.open()?;

        let timeout = self.config.timeout();
        let mut retry = self.config.retry_policy().start();
        retry.attempt().map_err(TransportError::exhausted("connect"))?;
        tracing::info!(%remote, "Connecting");
        self.send_control(&syn, remote)?;

        let mut deadline = Instant::now() + timeout;
        loop {
            match self.recv_frame(deadline, true)? {
                Some((frame, from)) if from == remote => match self.connection.on_frame(&frame) {
                    Action::Established(ack) => {
                        if let Some(ack) = ack {
                            self.send_control(&ack, remote)?;
                        }
                        tracing::info!(%remote, "Connection established");
                        return Ok(());
                    }
                    Action::Reply(reply) => self.send_control(&reply, remote)?,
                    _ => tracing::trace!(%frame, "Ignoring frame during handshake"),
                },
                Some((_, from)) => tracing::trace!(%from, "Ignoring frame from unknown peer"),
                None => {
                    retry.attempt().map_err(TransportError::exhausted("connect"))?;
                    if let Some(frame) = self.connection.on_timeout() {
                        tracing::debug!(%remote, "Retransmitting SYN");
                        self.send_control(&frame, remote)?;
                    }
                    deadline = Instant::now() + timeout;
                }
            }
        }
    }

    /// Wait for a peer to open a connection; returns its address
    pub fn accept(&mut self) -> Result<SocketAddr> {
        self.connection.listen();
        self.remote = None;

        let timeout = self.config.timeout();
        let mut retry = self.config.retry_policy().start();
        retry.attempt().map_err(TransportError::exhausted("accept"))?;
        tracing::debug!(local = ?self.channel.local_addr().ok(), "Waiting for SYN");

        let mut deadline = Instant::now() + timeout;
        loop {
            match self.recv_frame(deadline, true)? {
                Some((frame, from)) => {
                    if self.remote.map_or(false, |remote| remote != from) {
                        tracing::trace!(%from, "Ignoring frame from second peer");
                        continue;
                    }
                    match self.connection.on_frame(&frame) {
                        Action::Reply(reply) => {
                            if self.remote.is_none()
                                && self.connection.state() == ConnectionState::SynRcvd
                            {
                                tracing::debug!(%from, "SYN received");
                                self.remote = Some(from);
                                deadline = Instant::now() + timeout;
                            }
                            self.send_control(&reply, from)?;
                        }
                        Action::Established(_) => {
                            tracing::info!(remote = %from, "Connection accepted");
                            return Ok(from);
                        }
                        _ => tracing::trace!(%frame, "Ignoring frame while accepting"),
                    }
                }
                None => {
                    retry.attempt().map_err(TransportError::exhausted("accept"))?;
                    if let (Some(frame), Some(remote)) = (self.connection.on_timeout(), self.remote)
                    {
                        tracing::debug!(%remote, "Retransmitting SYN+ACK");
                        self.send_control(&frame, remote)?;
                    }
                    deadline = Instant::now() + timeout;
                }
            }
        }
    }

    /// Send FIN and wait for its acknowledgment
    pub fn close(&mut self) -> Result<()> {
        self.teardown(0, |_, _, _| Ok(()))
    }

    /// FIN / ACK close carrying `fin_seq`
    ///
    /// Frames other than the matching ACK go to `on_frame`; a FIN from the
    /// peer is acknowledged first.
    pub(crate) fn teardown<F>(&mut self, fin_seq: u32, mut on_frame: F) -> Result<()>
    where
        F: FnMut(&Endpoint, &Frame, SocketAddr) -> Result<()>,
    {
        let remote = self.require_remote()?;
        let fin = self.connection.close(fin_seq)?;

        let timeout = self.config.timeout();
        let mut retry = self.config.retry_policy().start();
        retry.attempt().map_err(TransportError::exhausted("close"))?;
        tracing::info!(%remote, "Closing connection");
        self.send_control(&fin, remote)?;

        let mut deadline = Instant::now() + timeout;
        loop {
            match self.recv_frame(deadline, false)? {
                Some((frame, from)) if from == remote => {
                    if self.connection.on_frame(&frame) == Action::Closed {
                        tracing::info!(%remote, "Connection closed");
                        return Ok(());
                    }
                    if frame.is_fin() {
                        self.send_control(&Frame::ack(0, frame.seq), remote)?;
                    } else {
                        on_frame(self, &frame, from)?;
                    }
                }
                Some(_) => {}
                None => {
                    retry.attempt().map_err(TransportError::exhausted("close"))?;
                    if let Some(frame) = self.connection.on_timeout() {
                        tracing::debug!(%remote, "Retransmitting FIN");
                        self.send_control(&frame, remote)?;
                    }
                    deadline = Instant::now() + timeout;
                }
            }
        }
    }

    /// Refuse frames the peer could not receive whole
    pub(crate) fn check_fits(&self, frame: &Frame) -> Result<()> {
        let len = frame.encoded_len();
        if len > self.config.max_datagram {
            return Err(TransportError::PayloadTooLarge {
                len,
                max: self.config.max_datagram,
            });
        }
        Ok(())
    }

    fn encode(&self, frame: &Frame) -> Result<Bytes> {
        self.check_fits(frame)?;
        Ok(frame.to_bytes())
    }

    /// Transmit a data frame subject to simulated loss
    pub(crate) fn send_data(&self, frame: &Frame, target: SocketAddr) -> Result<bool> {
        let bytes = self.encode(frame)?;
        tracing::trace!(%frame, %target, "Sending data");
        Ok(self.channel.send_lossy(&bytes, target)?)
    }

    /// Transmit a control frame, never dropped
    pub(crate) fn send_control(&self, frame: &Frame, target: SocketAddr) -> Result<()> {
        let bytes = self.encode(frame)?;
        tracing::trace!(%frame, %target, "Sending control");
        Ok(self.channel.send_reliable(&bytes, target)?)
    }

    /// Next valid frame before `deadline`
    ///
    /// Frames that fail decoding are discarded. `clean` bypasses corruption.
    pub(crate) fn recv_frame(
        &self,
        deadline: Instant,
        clean: bool,
    ) -> Result<Option<(Frame, SocketAddr)>> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.channel.socket().set_read_timeout(remaining)?;

            let received = if clean {
                self.channel.recv_clean()?
            } else {
                self.channel.recv()?
            };
            let Some((bytes, from)) = received else {
                continue;
            };
            match decode(&bytes) {
                Some(frame) => {
                    tracing::trace!(%frame, %from, "Received");
                    return Ok(Some((frame, from)));
                }
                None => tracing::trace!(%from, len = bytes.len(), "Discarding invalid frame"),
            }
        }
    }
}
