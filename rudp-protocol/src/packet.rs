//! Frame Structure and Serialization
//!
//! Every datagram exchanged between peers is a single textual frame:
//!
//! ```text
//! <digest>|<sequence>|<ack>|<flags>|<payload bytes>
//! ```
//!
//! `digest` is the 32-character lowercase hex MD5 of everything after the
//! first delimiter. `sequence` and `ack` are decimal integers, `flags` is a
//! decimal bitmask. Parsing splits on the first four delimiters only, so the
//! payload may contain `|` freely.

use bytes::{BufMut, Bytes, BytesMut};
use md5::{Digest, Md5};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use thiserror::Error;

/// Field delimiter. Never appears before the payload.
pub const DELIMITER: u8 = b'|';

/// Width of the hex digest field in bytes
pub const DIGEST_LEN: usize = 32;

/// Number of delimited fields in a frame (digest, seq, ack, flags, payload)
const FIELD_COUNT: usize = 5;

/// Frame flag bitset
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
    /// No flags (plain data frame)
    pub const NONE: Flags = Flags(0);
    /// Synchronize (connection open)
    pub const SYN: Flags = Flags(0x01);
    /// Acknowledgment field is meaningful
    pub const ACK: Flags = Flags(0x02);
    /// Finish (connection close)
    pub const FIN: Flags = Flags(0x04);

    /// Build from raw bits, keeping unknown bits as-is
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    /// Raw bitmask as carried on the wire
    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// True if every bit of `other` is set in `self`
    #[inline]
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags({})", self)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }
        let mut names = Vec::with_capacity(3);
        if self.contains(Flags::SYN) {
            names.push("SYN");
        }
        if self.contains(Flags::ACK) {
            names.push("ACK");
        }
        if self.contains(Flags::FIN) {
            names.push("FIN");
        }
        let unknown = self.0 & !(Flags::SYN.0 | Flags::ACK.0 | Flags::FIN.0);
        if unknown != 0 {
            return write!(f, "{}+0x{:02x}", names.join("|"), unknown);
        }
        write!(f, "{}", names.join("|"))
    }
}

/// A decoded, digest-verified frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number (alternating bit or Go-Back-N sequence)
    pub seq: u32,
    /// Acknowledged sequence number
    pub ack: u32,
    /// Flag bitset
    pub flags: Flags,
    /// Opaque payload bytes
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(seq: u32, ack: u32, flags: Flags, payload: impl Into<Bytes>) -> Self {
        Frame {
            seq,
            ack,
            flags,
            payload: payload.into(),
        }
    }

    /// Connection request
    pub fn syn(seq: u32) -> Self {
        Frame::new(seq, 0, Flags::SYN, Bytes::new())
    }

    /// Connection request reply, acknowledging the peer's SYN sequence
    pub fn syn_ack(seq: u32, ack: u32) -> Self {
        Frame::new(seq, ack, Flags::SYN | Flags::ACK, Bytes::new())
    }

    /// Pure acknowledgment of sequence `ack`
    pub fn ack(seq: u32, ack: u32) -> Self {
        Frame::new(seq, ack, Flags::ACK, Bytes::new())
    }

    /// Close request
    pub fn fin(seq: u32) -> Self {
        Frame::new(seq, 0, Flags::FIN, Bytes::new())
    }

    /// Data frame (no flags)
    pub fn data(seq: u32, payload: impl Into<Bytes>) -> Self {
        Frame::new(seq, 0, Flags::NONE, payload)
    }

    #[inline]
    pub fn is_syn(&self) -> bool {
        self.flags.contains(Flags::SYN)
    }

    #[inline]
    pub fn is_fin(&self) -> bool {
        self.flags.contains(Flags::FIN)
    }

    /// True for a SYN+ACK handshake reply
    #[inline]
    pub fn is_syn_ack(&self) -> bool {
        self.flags.contains(Flags::SYN | Flags::ACK)
    }

    /// True for an acknowledgment that is not part of the handshake
    #[inline]
    pub fn is_plain_ack(&self) -> bool {
        self.flags.contains(Flags::ACK) && !self.is_syn()
    }

    /// True when no control flag is set
    #[inline]
    pub fn is_data(&self) -> bool {
        !self.flags.contains(Flags::SYN)
            && !self.flags.contains(Flags::ACK)
            && !self.flags.contains(Flags::FIN)
    }

    /// Size of the encoded frame on the wire
    pub fn encoded_len(&self) -> usize {
        DIGEST_LEN + 1 + header_text(self.seq, self.ack, self.flags).len() + self.payload.len()
    }

    /// Serialize the frame to wire bytes
    pub fn to_bytes(&self) -> Bytes {
        encode(self.seq, self.ack, self.flags, &self.payload)
    }

    /// Parse and verify a frame
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let fields: Vec<&[u8]> = bytes.splitn(FIELD_COUNT, |&b| b == DELIMITER).collect();
        if fields.len() != FIELD_COUNT {
            return Err(FrameError::MissingFields {
                expected: FIELD_COUNT,
                found: fields.len(),
            });
        }

        let digest = fields[0];
        let covered = &bytes[digest.len() + 1..];
        let expected = digest_hex(covered);
        if digest != expected.as_bytes() {
            if digest.len() != DIGEST_LEN || !digest.iter().all(u8::is_ascii_hexdigit) {
                return Err(FrameError::InvalidDigest);
            }
            return Err(FrameError::DigestMismatch);
        }

        let seq = parse_decimal::<u32>(fields[1], "sequence")?;
        let ack = parse_decimal::<u32>(fields[2], "ack")?;
        let flags = Flags::from_bits(parse_decimal::<u8>(fields[3], "flags")?);

        Ok(Frame {
            seq,
            ack,
            flags,
            payload: Bytes::copy_from_slice(fields[4]),
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} seq={} ack={} len={}]",
            self.flags,
            self.seq,
            self.ack,
            self.payload.len()
        )
    }
}

/// Encode a frame from its parts
pub fn encode(seq: u32, ack: u32, flags: Flags, payload: &[u8]) -> Bytes {
    let header = header_text(seq, ack, flags);

    let mut covered = BytesMut::with_capacity(header.len() + payload.len());
    covered.put_slice(header.as_bytes());
    covered.put_slice(payload);

    let digest = digest_hex(&covered);

    let mut buf = BytesMut::with_capacity(DIGEST_LEN + 1 + covered.len());
    buf.put_slice(digest.as_bytes());
    buf.put_u8(DELIMITER);
    buf.put_slice(&covered);
    buf.freeze()
}

/// Decode a frame, discarding the rejection reason
pub fn decode(bytes: &[u8]) -> Option<Frame> {
    Frame::from_bytes(bytes).ok()
}

/// `<seq>|<ack>|<flags>|`
fn header_text(seq: u32, ack: u32, flags: Flags) -> String {
    format!("{seq}|{ack}|{}|", flags.bits())
}

fn digest_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

fn parse_decimal<T: std::str::FromStr>(field: &[u8], name: &'static str) -> Result<T, FrameError> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return Err(FrameError::InvalidNumber(name));
    }
    // ASCII digits are valid UTF-8
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(FrameError::InvalidNumber(name))
}

/// Frame parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Expected {expected} delimited fields, found {found}")]
    MissingFields { expected: usize, found: usize },

    #[error("Digest field is not {DIGEST_LEN} hex characters")]
    InvalidDigest,

    #[error("Digest does not match frame contents")]
    DigestMismatch,

    #[error("Invalid {0} field")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_combination() {
        let flags = Flags::SYN | Flags::ACK;
        assert_eq!(flags.bits(), 3);
        assert!(flags.contains(Flags::SYN));
        assert!(flags.contains(Flags::ACK));
        assert!(!flags.contains(Flags::FIN));
        assert_eq!(flags.to_string(), "SYN|ACK");
        assert_eq!(Flags::NONE.to_string(), "-");
    }

    #[test]
    fn test_wire_layout() {
        let bytes = encode(1, 0, Flags::NONE, b"hi");
        let text = std::str::from_utf8(&bytes).unwrap();

        let (digest, rest) = text.split_at(DIGEST_LEN);
        assert_eq!(rest, "|1|0|0|hi");
        assert_eq!(digest, hex::encode(Md5::digest(b"1|0|0|hi")));
    }

    #[test]
    fn test_known_digest() {
        let bytes = Frame::syn(0).to_bytes();
        assert_eq!(bytes.len(), DIGEST_LEN + 1 + "0|0|1|".len());
        assert!(bytes.ends_with(b"|0|0|1|"));
        assert!(bytes[..DIGEST_LEN].iter().all(|b| b.is_ascii_hexdigit()
            && !b.is_ascii_uppercase()));
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = Frame::new(255, 17, Flags::ACK, Bytes::from_static(b"payload"));
        let decoded = Frame::from_bytes(&frame.to_bytes()).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(frame.encoded_len(), frame.to_bytes().len());
    }

    #[test]
    fn test_payload_may_contain_delimiter() {
        let payload = b"a|b||c|";
        let frame = Frame::data(3, Bytes::from_static(payload));
        let decoded = decode(&frame.to_bytes()).unwrap();
        assert_eq!(&decoded.payload[..], payload);
    }

    #[test]
    fn test_empty_payload() {
        let decoded = decode(&Frame::fin(1).to_bytes()).unwrap();
        assert!(decoded.is_fin());
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert_eq!(
            Frame::from_bytes(b"abc|1|2"),
            Err(FrameError::MissingFields {
                expected: 5,
                found: 3
            })
        );
        assert_eq!(decode(b""), None);
    }

    #[test]
    fn test_corrupted_byte_rejected() {
        let bytes = Frame::data(1, Bytes::from_static(b"hello")).to_bytes();
        for i in 0..bytes.len() {
            let mut corrupted = bytes.to_vec();
            corrupted[i] ^= 0xFF;
            assert!(decode(&corrupted).is_none(), "flip at {} accepted", i);
        }
    }

    #[test]
    fn test_digest_mismatch_reason() {
        let mut bytes = Frame::data(0, Bytes::from_static(b"x")).to_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] = b'y';
        assert_eq!(Frame::from_bytes(&bytes), Err(FrameError::DigestMismatch));

        bytes[0] = b'Z';
        assert_eq!(Frame::from_bytes(&bytes), Err(FrameError::InvalidDigest));
    }

    #[test]
    fn test_non_decimal_fields_rejected() {
        // Valid digest over a body with a signed sequence number
        let body = b"-1|0|0|x";
        let mut bytes = hex::encode(Md5::digest(body)).into_bytes();
        bytes.push(DELIMITER);
        bytes.extend_from_slice(body);
        assert_eq!(
            Frame::from_bytes(&bytes),
            Err(FrameError::InvalidNumber("sequence"))
        );
    }

    #[test]
    fn test_frame_predicates() {
        assert!(Frame::syn_ack(0, 0).is_syn_ack());
        assert!(!Frame::syn_ack(0, 0).is_plain_ack());
        assert!(Frame::ack(0, 1).is_plain_ack());
        assert!(Frame::data(0, Bytes::new()).is_data());
        assert!(!Frame::fin(0).is_data());
    }
}
