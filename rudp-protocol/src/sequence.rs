//! Sequence Number Handling
//!
//! Go-Back-N numbers frames modulo a small sequence space (256 by default)
//! and bounds the outstanding set with a window. Stop-and-wait uses a single
//! alternating bit.

use std::fmt;

/// Default Go-Back-N sequence space
pub const DEFAULT_MODULUS: u32 = 256;

/// Default Go-Back-N window size
pub const DEFAULT_WINDOW: u32 = 4;

/// Modular sequence space with a fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    modulus: u32,
    window: u32,
}

impl SeqSpace {
    /// Create a sequence space
    ///
    /// # Panics
    /// Panics if `window` is zero or not smaller than `modulus`
    pub fn new(modulus: u32, window: u32) -> Self {
        assert!(
            window > 0 && window < modulus,
            "Window {} does not fit sequence space {}",
            window,
            modulus
        );
        SeqSpace { modulus, window }
    }

    #[inline]
    pub fn modulus(&self) -> u32 {
        self.modulus
    }

    #[inline]
    pub fn window(&self) -> u32 {
        self.window
    }

    /// Reduce an arbitrary counter into the sequence space
    #[inline]
    pub fn wrap(&self, value: u64) -> u32 {
        (value % self.modulus as u64) as u32
    }

    /// `seq + n` modulo the space
    #[inline]
    pub fn add(&self, seq: u32, n: u32) -> u32 {
        self.wrap(seq as u64 + n as u64)
    }

    #[inline]
    pub fn next(&self, seq: u32) -> u32 {
        self.add(seq, 1)
    }

    #[inline]
    pub fn prev(&self, seq: u32) -> u32 {
        self.add(seq, self.modulus - 1)
    }

    /// Forward distance from `from` to `to`, in `[0, modulus)`
    #[inline]
    pub fn distance(&self, from: u32, to: u32) -> u32 {
        self.wrap(to as u64 + self.modulus as u64 - self.wrap(from as u64) as u64)
    }

    /// Whether `seq` lies in `[base, base + window)` modulo the space
    ///
    /// Either `base <= seq < base + window` directly, or the window wraps
    /// past the modulus and `seq < (base + window) mod modulus`.
    pub fn in_window(&self, base: u32, seq: u32) -> bool {
        let base = base as u64;
        let seq = seq as u64;
        let end = base + self.window as u64;
        let modulus = self.modulus as u64;

        (base <= seq && seq < end) || (end >= modulus && seq < end % modulus)
    }
}

impl Default for SeqSpace {
    fn default() -> Self {
        SeqSpace::new(DEFAULT_MODULUS, DEFAULT_WINDOW)
    }
}

/// One-bit sequence number used by stop-and-wait
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct AltBit(bool);

impl AltBit {
    pub const ZERO: AltBit = AltBit(false);
    pub const ONE: AltBit = AltBit(true);

    /// Wire value (0 or 1)
    #[inline]
    pub fn value(self) -> u32 {
        self.0 as u32
    }

    /// Flip to the other bit
    #[inline]
    pub fn flip(&mut self) {
        self.0 = !self.0;
    }

    /// The other bit
    #[inline]
    pub fn other(self) -> AltBit {
        AltBit(!self.0)
    }

    /// Whether a wire sequence number carries this bit
    #[inline]
    pub fn matches(self, seq: u32) -> bool {
        seq == self.value()
    }
}

impl fmt::Debug for AltBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AltBit({})", self.value())
    }
}

impl fmt::Display for AltBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}
