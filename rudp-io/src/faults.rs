//! Fault injection
//!
//! [`LossyChannel`] wraps a [`DatagramSocket`] and consults a [`FaultModel`]
//! on every lossy send and every corrupting receive. Dropped datagrams never
//! touch the socket. Corrupted datagrams have one byte XORed with `0xFF`
//! before the caller sees them.

use crate::socket::{DatagramSocket, SocketError};
use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Fault configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FaultError {
    #[error("Probability {0} is outside [0, 1]")]
    InvalidProbability(f64),
}

/// Source of drop and corruption decisions
pub trait FaultModel: Send {
    /// Whether the next outbound datagram is lost
    fn drop_outbound(&mut self) -> bool;

    /// Possibly damage an inbound datagram in place; returns true if it did
    fn corrupt_inbound(&mut self, datagram: &mut [u8]) -> bool;
}

/// Perfect channel
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultModel for NoFaults {
    fn drop_outbound(&mut self) -> bool {
        false
    }

    fn corrupt_inbound(&mut self, _datagram: &mut [u8]) -> bool {
        false
    }
}

/// Independent Bernoulli loss and corruption
#[derive(Debug, Clone)]
pub struct RandomFaults {
    loss: f64,
    corruption: f64,
    rng: StdRng,
}

impl RandomFaults {
    /// Seeded from OS entropy
    pub fn new(loss: f64, corruption: f64) -> Result<Self, FaultError> {
        Self::build(loss, corruption, StdRng::from_entropy())
    }

    /// Deterministic sequence of draws
    pub fn with_seed(loss: f64, corruption: f64, seed: u64) -> Result<Self, FaultError> {
        Self::build(loss, corruption, StdRng::seed_from_u64(seed))
    }

    fn build(loss: f64, corruption: f64, rng: StdRng) -> Result<Self, FaultError> {
        for p in [loss, corruption] {
            if !(0.0..=1.0).contains(&p) {
                return Err(FaultError::InvalidProbability(p));
            }
        }
        Ok(RandomFaults {
            loss,
            corruption,
            rng,
        })
    }
}

impl FaultModel for RandomFaults {
    fn drop_outbound(&mut self) -> bool {
        self.rng.gen_bool(self.loss)
    }

    fn corrupt_inbound(&mut self, datagram: &mut [u8]) -> bool {
        if datagram.is_empty() || !self.rng.gen_bool(self.corruption) {
            return false;
        }
        let index = self.rng.gen_range(0..datagram.len());
        datagram[index] ^= 0xFF;
        true
    }
}

/// Predetermined fault sequence
///
/// Each queue is consumed one entry per decision; once empty, no further
/// faults are injected.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFaults {
    drops: VecDeque<bool>,
    corruptions: VecDeque<Option<usize>>,
}

impl ScriptedFaults {
    pub fn new() -> Self {
        ScriptedFaults::default()
    }

    /// Decisions for successive lossy sends
    pub fn drops(mut self, script: impl IntoIterator<Item = bool>) -> Self {
        self.drops.extend(script);
        self
    }

    /// Byte index to flip for successive receives, `None` to pass one through
    pub fn corruptions(mut self, script: impl IntoIterator<Item = Option<usize>>) -> Self {
        self.corruptions.extend(script);
        self
    }
}

impl FaultModel for ScriptedFaults {
    fn drop_outbound(&mut self) -> bool {
        self.drops.pop_front().unwrap_or(false)
    }

    fn corrupt_inbound(&mut self, datagram: &mut [u8]) -> bool {
        match self.corruptions.pop_front().flatten() {
            Some(index) if !datagram.is_empty() => {
                datagram[index % datagram.len()] ^= 0xFF;
                true
            }
            _ => false,
        }
    }
}

/// Snapshot of channel counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Lossy sends requested
    pub attempts: u64,
    /// Lossy sends discarded by the fault model
    pub dropped: u64,
    /// Datagrams written to the socket (both paths)
    pub sent: u64,
    /// Datagrams read from the socket (both paths)
    pub received: u64,
    /// Received datagrams damaged by the fault model
    pub corrupted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    attempts: AtomicU64,
    dropped: AtomicU64,
    sent: AtomicU64,
    received: AtomicU64,
    corrupted: AtomicU64,
}

/// Datagram channel with injected loss and corruption
pub struct LossyChannel {
    socket: DatagramSocket,
    faults: Mutex<Box<dyn FaultModel>>,
    counters: Counters,
    max_datagram: usize,
}

impl LossyChannel {
    /// Wrap a bound socket
    ///
    /// Datagrams longer than `max_datagram` are truncated on receive.
    pub fn new(socket: DatagramSocket, faults: impl FaultModel + 'static, max_datagram: usize) -> Self {
        LossyChannel {
            socket,
            faults: Mutex::new(Box::new(faults)),
            counters: Counters::default(),
            max_datagram,
        }
    }

    /// Channel without faults
    pub fn perfect(socket: DatagramSocket, max_datagram: usize) -> Self {
        Self::new(socket, NoFaults, max_datagram)
    }

    pub fn socket(&self) -> &DatagramSocket {
        &self.socket
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        self.socket.local_addr()
    }

    /// Send subject to loss; returns whether the datagram reached the socket
    pub fn send_lossy(&self, datagram: &[u8], target: SocketAddr) -> Result<bool, SocketError> {
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);
        if self.faults.lock().drop_outbound() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(%target, len = datagram.len(), "Simulated loss");
            return Ok(false);
        }
        self.transmit(datagram, target)?;
        Ok(true)
    }

    /// Send without loss
    pub fn send_reliable(&self, datagram: &[u8], target: SocketAddr) -> Result<(), SocketError> {
        self.transmit(datagram, target)
    }

    fn transmit(&self, datagram: &[u8], target: SocketAddr) -> Result<(), SocketError> {
        self.socket.send_to(datagram, target)?;
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Receive subject to corruption, `None` on read timeout
    pub fn recv(&self) -> Result<Option<(Bytes, SocketAddr)>, SocketError> {
        let Some((mut buf, from)) = self.read()? else {
            return Ok(None);
        };
        if self.faults.lock().corrupt_inbound(&mut buf) {
            self.counters.corrupted.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(%from, len = buf.len(), "Simulated corruption");
        }
        Ok(Some((Bytes::from(buf), from)))
    }

    /// Receive without corruption, `None` on read timeout
    pub fn recv_clean(&self) -> Result<Option<(Bytes, SocketAddr)>, SocketError> {
        Ok(self.read()?.map(|(buf, from)| (Bytes::from(buf), from)))
    }

    fn read(&self) -> Result<Option<(Vec<u8>, SocketAddr)>, SocketError> {
        let mut buf = vec![0u8; self.max_datagram];
        let Some((n, from)) = self.socket.recv_from(&mut buf)? else {
            return Ok(None);
        };
        buf.truncate(n);
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        Ok(Some((buf, from)))
    }

    /// Current counter values
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            sent: self.counters.sent.load(Ordering::Relaxed),
            received: self.counters.received.load(Ordering::Relaxed),
            corrupted: self.counters.corrupted.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for LossyChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LossyChannel")
            .field("socket", &self.socket)
            .field("max_datagram", &self.max_datagram)
            .field("stats", &self.stats())
            .finish()
    }
}
