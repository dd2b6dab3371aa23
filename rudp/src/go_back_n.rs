//! Go-Back-N ARQ
//!
//! A background receipt thread is the only reader of the socket. It applies
//! cumulative ACKs to the shared [`SendWindow`] and wakes the sender, and it
//! runs the strict in-order receive side, handing payloads to
//! [`GoBackN::receive`] over a channel.

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::stats::{EngineCounters, EngineStats};
use crate::transport::{Delivery, Transport};
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use rudp_io::LossyChannel;
use rudp_protocol::{decode, Action, Connection, Frame, SendWindow, SeqSpace};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest the receipt thread blocks before checking for shutdown
const RECEIPT_POLL: Duration = Duration::from_millis(50);

/// Sender-side state guarded by one lock
#[derive(Debug)]
struct SendState {
    window: SendWindow,
    /// Sequence of our outstanding FIN
    fin: Option<u32>,
    fin_acked: bool,
}

/// State shared between the caller and the receipt thread
#[derive(Debug)]
struct Shared {
    send: Mutex<SendState>,
    /// Signalled when the window advances or our FIN is acknowledged
    advanced: Condvar,
    remote: Mutex<Option<SocketAddr>>,
    shutdown: AtomicBool,
    counters: EngineCounters,
}

/// Receive-side state, owned by the receipt thread
struct Receipt {
    shared: Arc<Shared>,
    channel: Arc<LossyChannel>,
    space: SeqSpace,
    /// Established handshake state, for answering stray SYN / SYN+ACK
    handshake: Connection,
    /// Next in-order sequence
    expected_seq: u32,
    peer_closed: bool,
    deliveries: Sender<Delivery>,
}

impl Receipt {
    fn run(mut self) {
        tracing::debug!("Receipt thread started");
        while !self.shared.shutdown.load(Ordering::Acquire) {
            let received = match self.channel.recv() {
                Ok(Some(received)) => received,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Receipt thread stopping on socket error");
                    break;
                }
            };
            let (bytes, from) = received;
            let Some(frame) = decode(&bytes) else {
                tracing::trace!(%from, len = bytes.len(), "Discarding invalid frame");
                continue;
            };
            tracing::trace!(%frame, %from, "Received");
            if let Err(e) = self.handle(frame, from) {
                tracing::warn!(error = %e, "Receipt thread stopping");
                break;
            }
        }
        tracing::debug!("Receipt thread stopped");
    }

    fn handle(&mut self, frame: Frame, from: SocketAddr) -> Result<()> {
        let remote = *self.shared.remote.lock();
        if remote.map_or(false, |remote| remote != from) {
            tracing::trace!(%from, "Ignoring frame from unknown peer");
            return Ok(());
        }

        if frame.is_plain_ack() {
            self.on_ack(&frame);
        } else if frame.is_fin() {
            self.reply(&Frame::ack(0, frame.seq), from)?;
            if !self.peer_closed {
                self.peer_closed = true;
                tracing::info!(remote = %from, "FIN received, connection closing");
                let _ = self.deliveries.send(Delivery::EndOfStream);
            }
        } else if frame.is_syn() {
            if let Action::Reply(reply) = self.handshake.on_frame(&frame) {
                tracing::debug!(%frame, "Repeating handshake reply");
                self.reply(&reply, from)?;
            }
        } else if frame.seq == self.expected_seq {
            self.reply(&Frame::ack(0, frame.seq), from)?;
            self.expected_seq = self.space.next(self.expected_seq);
            if remote.is_none() {
                *self.shared.remote.lock() = Some(from);
            }
            self.shared.counters.delivered();
            let _ = self.deliveries.send(Delivery::Data(frame.payload));
        } else {
            // Out of order or duplicate: repeat the last in-order ACK
            let last = self.space.prev(self.expected_seq);
            tracing::debug!(seq = frame.seq, expected = self.expected_seq, "Out-of-order frame");
            self.shared.counters.duplicate();
            self.reply(&Frame::ack(0, last), from)?;
        }
        Ok(())
    }

    fn on_ack(&self, frame: &Frame) {
        let mut state = self.shared.send.lock();
        if state.fin == Some(frame.ack) {
            state.fin_acked = true;
            self.shared.advanced.notify_all();
        } else if let Some(acked) = state.window.on_ack(frame.ack) {
            tracing::trace!(ack = frame.ack, acked, base = state.window.base_seq(), "Window advanced");
            self.shared.advanced.notify_all();
        } else {
            tracing::trace!(ack = frame.ack, "Ignoring ACK outside window");
        }
    }

    fn reply(&self, frame: &Frame, target: SocketAddr) -> Result<()> {
        self.channel.send_reliable(&frame.to_bytes(), target)?;
        Ok(())
    }
}

impl Drop for Receipt {
    /// However the thread ends, the sender must stop waiting on it
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.advanced.notify_all();
    }
}

/// Stops the receipt thread when dropped
#[derive(Debug)]
struct ReceiptHandle {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl ReceiptHandle {
    /// Signal and wait for the thread to exit
    fn stop(mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Receipt thread panicked");
            }
        }
    }
}

impl Drop for ReceiptHandle {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
    }
}

/// Sliding-window engine over one endpoint
#[derive(Debug)]
pub struct GoBackN {
    endpoint: Endpoint,
    shared: Arc<Shared>,
    deliveries: Receiver<Delivery>,
    receipt: ReceiptHandle,
}

impl GoBackN {
    /// Take over the endpoint and start its receipt thread
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        let space = endpoint.config().seq_space()?;
        let channel = Arc::clone(endpoint.channel());
        channel
            .socket()
            .set_read_timeout(endpoint.config().timeout().min(RECEIPT_POLL))?;

        let shared = Arc::new(Shared {
            send: Mutex::new(SendState {
                window: SendWindow::new(space),
                fin: None,
                fin_acked: false,
            }),
            advanced: Condvar::new(),
            remote: Mutex::new(endpoint.remote_addr()),
            shutdown: AtomicBool::new(false),
            counters: EngineCounters::default(),
        });

        let (tx, rx) = channel::unbounded();
        let receipt = Receipt {
            shared: Arc::clone(&shared),
            channel,
            space,
            handshake: endpoint.connection().clone(),
            expected_seq: 0,
            peer_closed: false,
            deliveries: tx,
        };
        let thread = thread::Builder::new()
            .name("rudp-receipt".to_string())
            .spawn(move || receipt.run())
            .map_err(rudp_io::SocketError::from)?;

        Ok(GoBackN {
            endpoint,
            shared: Arc::clone(&shared),
            deliveries: rx,
            receipt: ReceiptHandle {
                shared,
                thread: Some(thread),
            },
        })
    }

    /// Stop the receipt thread and give the endpoint back
    pub fn into_endpoint(self) -> Endpoint {
        let GoBackN {
            mut endpoint,
            shared,
            receipt,
            ..
        } = self;
        receipt.stop();
        if let Some(remote) = *shared.remote.lock() {
            endpoint.set_remote(remote);
        }
        endpoint
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        *self.shared.remote.lock()
    }

    fn require_remote(&self) -> Result<SocketAddr> {
        self.remote_addr().ok_or(TransportError::NotConnected)
    }

    /// Deliver every payload in order, returning once all are acknowledged
    pub fn send_batch(&self, payloads: &[Bytes]) -> Result<()> {
        let remote = self.require_remote()?;
        // Widest sequence number gives the longest encoding
        let widest = self.endpoint.config().sequence_modulus - 1;
        for payload in payloads {
            self.endpoint
                .check_fits(&Frame::data(widest, payload.clone()))?;
        }

        let timeout = self.endpoint.config().timeout();
        let mut retry = self.endpoint.config().retry_policy().start();
        retry.attempt().map_err(TransportError::exhausted("send"))?;

        let mut state = self.shared.send.lock();
        state.window.reset(payloads.len());

        loop {
            for frame in state.window.fill(payloads, Instant::now()) {
                self.shared.counters.transmitted(false);
                self.endpoint.send_data(&frame, remote)?;
            }
            if state.window.is_complete() {
                break;
            }

            let deadline = state
                .window
                .next_deadline(timeout)
                .unwrap_or_else(|| Instant::now() + timeout);
            self.shared.advanced.wait_until(&mut state, deadline);
            if state.window.is_complete() {
                break;
            }
            if self.shared.shutdown.load(Ordering::Acquire) {
                return Err(TransportError::Closed);
            }

            let expired = state.window.expired(Instant::now(), timeout);
            if !expired.is_empty() {
                retry.attempt().map_err(TransportError::exhausted("send"))?;
                tracing::debug!(
                    count = expired.len(),
                    base = state.window.base_seq(),
                    "Retransmitting window"
                );
                for frame in expired {
                    self.shared.counters.transmitted(true);
                    self.endpoint.send_data(&frame, remote)?;
                }
            }
        }

        tracing::trace!(count = payloads.len(), next = state.window.next_seq(), "Batch acknowledged");
        Ok(())
    }

    /// Next in-order payload or end of stream
    pub fn receive(&self) -> Result<Delivery> {
        let timeout = self.endpoint.config().timeout();
        let mut retry = self.endpoint.config().retry_policy().start();
        loop {
            match self.deliveries.recv_timeout(timeout) {
                Ok(delivery) => return Ok(delivery),
                Err(RecvTimeoutError::Timeout) => {
                    retry.attempt().map_err(TransportError::exhausted("receive"))?;
                }
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Closed),
            }
        }
    }

    /// FIN teardown; the receipt thread observes the ACK
    pub fn close(&mut self) -> Result<()> {
        let remote = self.require_remote()?;
        self.endpoint.set_remote(remote);

        let fin_seq = {
            let mut state = self.shared.send.lock();
            let seq = state.window.next_seq();
            state.fin = Some(seq);
            state.fin_acked = false;
            seq
        };
        let fin = self.endpoint.connection_mut().close(fin_seq)?;

        let timeout = self.endpoint.config().timeout();
        let mut retry = self.endpoint.config().retry_policy().start();
        retry.attempt().map_err(TransportError::exhausted("close"))?;
        tracing::info!(%remote, "Closing connection");
        self.endpoint.send_control(&fin, remote)?;

        let mut state = self.shared.send.lock();
        loop {
            let deadline = Instant::now() + timeout;
            while !state.fin_acked && !self.shared.shutdown.load(Ordering::Acquire) {
                if self.shared.advanced.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
            if state.fin_acked {
                state.fin = None;
                drop(state);
                self.endpoint.connection_mut().on_frame(&Frame::ack(0, fin_seq));
                tracing::info!(%remote, "Connection closed");
                return Ok(());
            }
            if self.shared.shutdown.load(Ordering::Acquire) {
                return Err(TransportError::Closed);
            }
            retry.attempt().map_err(TransportError::exhausted("close"))?;
            tracing::debug!(%remote, "Retransmitting FIN");
            self.endpoint.send_control(&fin, remote)?;
        }
    }
}

impl Transport for GoBackN {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.send_batch(&[Bytes::copy_from_slice(payload)])
    }

    fn receive(&mut self) -> Result<Delivery> {
        GoBackN::receive(self)
    }

    fn close(&mut self) -> Result<()> {
        GoBackN::close(self)
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn into_endpoint(self: Box<Self>) -> Endpoint {
        GoBackN::into_endpoint(*self)
    }

    fn stats(&self) -> EngineStats {
        self.shared.counters.snapshot()
    }
}
