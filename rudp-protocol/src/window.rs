//! Go-Back-N send window
//!
//! Tracks one batch of payloads by absolute index (`base`, `next`, `total`)
//! while frames carry wire sequence numbers modulo the [`SeqSpace`]. Wire
//! numbering continues from one batch to the next so a receiver's expected
//! sequence stays aligned across calls.

use crate::packet::Frame;
use crate::sequence::SeqSpace;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Frame awaiting acknowledgment
#[derive(Debug, Clone)]
struct InFlight {
    /// The encoded-ready frame
    frame: Frame,
    /// Time of the last (re)transmission
    last_sent: Instant,
    /// Number of times this frame has been sent
    send_count: u32,
}

/// Sliding send window with cumulative acknowledgment
#[derive(Debug)]
pub struct SendWindow {
    space: SeqSpace,
    /// Wire sequence of absolute index 0 in the current batch
    origin: u32,
    /// Oldest unacknowledged index
    base: usize,
    /// Next index to transmit
    next: usize,
    /// Number of payloads in the batch
    total: usize,
    /// Outstanding frames keyed by absolute index
    in_flight: BTreeMap<usize, InFlight>,
}

impl SendWindow {
    pub fn new(space: SeqSpace) -> Self {
        SendWindow {
            space,
            origin: 0,
            base: 0,
            next: 0,
            total: 0,
            in_flight: BTreeMap::new(),
        }
    }

    pub fn space(&self) -> SeqSpace {
        self.space
    }

    /// Start a new batch of `total` payloads
    ///
    /// Numbering resumes after the last frame transmitted in the previous
    /// batch.
    pub fn reset(&mut self, total: usize) {
        self.origin = self.wire(self.next);
        self.base = 0;
        self.next = 0;
        self.total = total;
        self.in_flight.clear();
    }

    /// Wire sequence for an absolute index
    #[inline]
    fn wire(&self, index: usize) -> u32 {
        self.space.wrap(self.origin as u64 + index as u64)
    }

    /// Wire sequence of the oldest unacknowledged frame
    pub fn base_seq(&self) -> u32 {
        self.wire(self.base)
    }

    /// Wire sequence the next new frame will carry
    pub fn next_seq(&self) -> u32 {
        self.wire(self.next)
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn next(&self) -> usize {
        self.next
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Every payload of the batch has been acknowledged
    pub fn is_complete(&self) -> bool {
        self.base >= self.total
    }

    /// Frames that may be sent now: unsent, inside the window, within the batch
    pub fn fill(&mut self, payloads: &[Bytes], now: Instant) -> Vec<Frame> {
        let mut frames = Vec::new();
        while self.next < self.total && self.space.in_window(self.base_seq(), self.next_seq()) {
            let Some(payload) = payloads.get(self.next) else {
                break;
            };
            let frame = Frame::data(self.next_seq(), payload.clone());
            self.in_flight.insert(
                self.next,
                InFlight {
                    frame: frame.clone(),
                    last_sent: now,
                    send_count: 1,
                },
            );
            frames.push(frame);
            self.next += 1;
        }
        frames
    }

    /// Apply a cumulative ACK
    ///
    /// Returns how many frames it newly acknowledged, or `None` when the ACK
    /// is outside the window or names a frame not yet transmitted.
    pub fn on_ack(&mut self, ack: u32) -> Option<usize> {
        let base_seq = self.base_seq();
        if !self.space.in_window(base_seq, ack) {
            return None;
        }
        let index = self.base + self.space.distance(base_seq, ack) as usize;
        if index >= self.next {
            return None;
        }

        let acked = index + 1 - self.base;
        self.base = index + 1;
        self.in_flight = self.in_flight.split_off(&self.base);
        Some(acked)
    }

    /// Frames whose last transmission is at least `timeout` old
    ///
    /// Their timestamps are refreshed as they are returned for resending.
    pub fn expired(&mut self, now: Instant, timeout: Duration) -> Vec<Frame> {
        self.in_flight
            .values_mut()
            .filter(|entry| now.saturating_duration_since(entry.last_sent) >= timeout)
            .map(|entry| {
                entry.last_sent = now;
                entry.send_count += 1;
                entry.frame.clone()
            })
            .collect()
    }

    /// Earliest instant at which an outstanding frame expires
    pub fn next_deadline(&self, timeout: Duration) -> Option<Instant> {
        self.in_flight
            .values()
            .map(|entry| entry.last_sent + timeout)
            .min()
    }

    /// Times the frame at wire sequence `seq` has been sent, if outstanding
    pub fn send_count(&self, seq: u32) -> Option<u32> {
        self.in_flight
            .values()
            .find(|entry| entry.frame.seq == seq)
            .map(|entry| entry.send_count)
    }
}
